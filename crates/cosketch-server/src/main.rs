//! CoSketch WebSocket Relay Server
//!
//! Relays scene operations, selections and cursors between clients in the
//! same room. The server keeps the winning record per element so late joiners
//! receive the same scene the room converged to. It merges nothing: an
//! operation older than the one already held is simply dropped.
//!
//! ## Protocol
//!
//! Messages are JSON with the following format:
//! ```json
//! { "type": "join", "room": "room-id", "name": "Ann", "color": "#ff0000" }
//! { "type": "operation", "op": { "id": "...", "type": "update", "element_id": "rect-1", ... } }
//! { "type": "cursor", "x": 100, "y": 200 }
//! ```

use axum::{
    Router,
    extract::{
        State,
        ws::{Message, WebSocket, WebSocketUpgrade},
    },
    response::IntoResponse,
    routing::get,
};
use cosketch_core::sync::{ClientMessage, Peer, RoomState, ServerMessage};
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use tokio::sync::broadcast;
use tower_http::cors::CorsLayer;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Server configuration
const CHANNEL_CAPACITY: usize = 256;
const DEFAULT_ADDR: &str = "0.0.0.0:3030";

/// Room state
struct Room {
    /// Broadcast channel for this room
    tx: broadcast::Sender<(String, ServerMessage)>,
    /// Members, element records, selections and cursors
    state: RoomState,
}

impl Room {
    fn new() -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            tx,
            state: RoomState::new(),
        }
    }
}

/// Shared application state
struct AppState {
    /// Active rooms
    rooms: DashMap<String, Room>,
}

impl AppState {
    fn new() -> Self {
        Self {
            rooms: DashMap::new(),
        }
    }

    /// Add peer to room, returning its receiver and the `joined` snapshot
    fn join_room(
        &self,
        room_id: &str,
        peer: Peer,
    ) -> (broadcast::Receiver<(String, ServerMessage)>, ServerMessage) {
        let mut room = self.rooms.entry(room_id.to_string()).or_insert_with(Room::new);
        let rx = room.tx.subscribe();
        let joined = room.state.join(room_id, peer);
        (rx, joined)
    }

    /// Remove peer from room
    fn leave_room(&self, room_id: &str, user_id: &str) {
        if let Some(mut room) = self.rooms.get_mut(room_id) {
            room.state.leave(user_id);
            // Clean up empty rooms
            if room.state.is_empty() {
                drop(room);
                self.rooms.remove(room_id);
                debug!("Room {} closed", room_id);
            }
        }
    }

    /// Apply a member's message to the room and relay the result
    fn relay(&self, room_id: &str, from: &str, msg: ClientMessage) {
        let relayed = self
            .rooms
            .get_mut(room_id)
            .and_then(|mut room| room.state.handle(from, msg));
        if let Some(relayed) = relayed {
            self.broadcast(room_id, from, relayed);
        }
    }

    /// Broadcast message to room
    fn broadcast(&self, room_id: &str, from: &str, msg: ServerMessage) {
        if let Some(room) = self.rooms.get(room_id) {
            let _ = room.tx.send((from.to_string(), msg));
        }
    }

    fn peer_count(&self, room_id: &str) -> usize {
        self.rooms
            .get(room_id)
            .map_or(0, |room| room.state.peer_count())
    }
}

#[tokio::main]
async fn main() -> std::io::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "cosketch_server=info,tower_http=info".into()),
        )
        .init();

    let state = Arc::new(AppState::new());

    let app = Router::new()
        .route("/", get(index))
        .route("/ws", get(ws_handler))
        .route("/health", get(health))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let addr = std::env::var("COSKETCH_ADDR").unwrap_or_else(|_| DEFAULT_ADDR.to_string());
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    info!("CoSketch relay server listening on {}", listener.local_addr()?);
    info!("WebSocket endpoint: ws://{}/ws", addr);

    axum::serve(listener, app).await
}

/// Index page
async fn index() -> &'static str {
    "CoSketch Relay Server - Connect via WebSocket at /ws"
}

/// Health check
async fn health() -> &'static str {
    "ok"
}

/// WebSocket upgrade handler
async fn ws_handler(
    ws: WebSocketUpgrade,
    State(state): State<Arc<AppState>>,
) -> impl IntoResponse {
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

fn encode(msg: &ServerMessage) -> Option<Message> {
    match serde_json::to_string(msg) {
        Ok(json) => Some(Message::Text(json.into())),
        Err(e) => {
            warn!("Failed to encode {:?}: {}", msg, e);
            None
        }
    }
}

/// Handle a WebSocket connection
async fn handle_socket(socket: WebSocket, state: Arc<AppState>) {
    let user_id = Uuid::new_v4().to_string();
    info!("New connection: {}", user_id);

    let (mut sender, mut receiver) = socket.split();
    let mut current_room: Option<String> = None;
    let mut room_rx: Option<broadcast::Receiver<(String, ServerMessage)>> = None;

    loop {
        tokio::select! {
            // Handle incoming messages from client
            msg = receiver.next() => {
                match msg {
                    Some(Ok(Message::Text(text))) => {
                        let client_msg = match serde_json::from_str::<ClientMessage>(text.as_str()) {
                            Ok(client_msg) => client_msg,
                            Err(e) => {
                                warn!("Invalid message from {}: {}", user_id, e);
                                let err = ServerMessage::Error {
                                    message: format!("Invalid message: {}", e),
                                };
                                if let Some(reply) = encode(&err) {
                                    let _ = sender.send(reply).await;
                                }
                                continue;
                            }
                        };
                        match client_msg {
                            ClientMessage::Join { room, name, color } => {
                                // Leave current room if any
                                if let Some(old_room) = current_room.take() {
                                    state.leave_room(&old_room, &user_id);
                                    state.broadcast(&old_room, &user_id, ServerMessage::PeerLeft {
                                        user_id: user_id.clone(),
                                    });
                                }

                                let peer = Peer {
                                    user_id: user_id.clone(),
                                    name,
                                    color,
                                };
                                let (rx, joined) = state.join_room(&room, peer.clone());
                                room_rx = Some(rx);
                                current_room = Some(room.clone());

                                // Send the room snapshot
                                let Some(reply) = encode(&joined) else {
                                    break;
                                };
                                if sender.send(reply).await.is_err() {
                                    break;
                                }

                                // Notify others
                                state.broadcast(&room, &user_id, ServerMessage::PeerJoined { peer });
                                info!(
                                    "Peer {} joined room {} ({} peers)",
                                    user_id,
                                    room,
                                    state.peer_count(&room)
                                );
                            }
                            ClientMessage::Leave => {
                                if let Some(room) = current_room.take() {
                                    state.leave_room(&room, &user_id);
                                    state.broadcast(&room, &user_id, ServerMessage::PeerLeft {
                                        user_id: user_id.clone(),
                                    });
                                    info!("Peer {} left room {}", user_id, room);
                                }
                                room_rx = None;
                            }
                            other => match &current_room {
                                Some(room) => state.relay(room, &user_id, other),
                                None => {
                                    let err = ServerMessage::Error {
                                        message: "Not in a room".to_string(),
                                    };
                                    if let Some(reply) = encode(&err) {
                                        let _ = sender.send(reply).await;
                                    }
                                }
                            },
                        }
                    }
                    Some(Ok(Message::Binary(_))) => {
                        warn!("Ignoring binary message from {}", user_id);
                    }
                    Some(Ok(Message::Close(_))) | None => {
                        break;
                    }
                    Some(Ok(_)) => {} // Ignore ping/pong
                    Some(Err(e)) => {
                        warn!("WebSocket error for {}: {}", user_id, e);
                        break;
                    }
                }
            }

            // Handle broadcast messages from room
            msg = async {
                match &mut room_rx {
                    Some(rx) => rx.recv().await.ok(),
                    None => {
                        // No room joined, just wait forever
                        std::future::pending::<Option<(String, ServerMessage)>>().await
                    }
                }
            } => {
                if let Some((from, server_msg)) = msg {
                    // Don't echo back to sender
                    if from != user_id {
                        let Some(out) = encode(&server_msg) else {
                            continue;
                        };
                        if sender.send(out).await.is_err() {
                            break;
                        }
                    }
                }
            }
        }
    }

    // Cleanup on disconnect
    if let Some(ref room) = current_room {
        state.leave_room(room, &user_id);
        state.broadcast(room, &user_id, ServerMessage::PeerLeft {
            user_id: user_id.clone(),
        });
    }
    info!("Connection closed: {}", user_id);
}
