//! WebSocket transport for native platforms.
//!
//! The socket runs on a background thread; commands and events cross over
//! channels so the editor can poll without blocking.

use std::sync::mpsc::{Receiver, Sender, TryRecvError, channel};
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tungstenite::{Message, connect};
use url::Url;

use crate::sync::protocol::{ClientMessage, ServerMessage};
use crate::sync::transport::{ConnectionState, Transport, TransportError, TransportEvent};

/// Commands sent to the WebSocket thread.
enum WsCommand {
    Send(String),
    Close,
}

/// WebSocket client for the relay server.
pub struct WebSocketTransport {
    state: ConnectionState,
    /// Channel to send commands to the WebSocket thread.
    cmd_tx: Option<Sender<WsCommand>>,
    /// Channel to receive events from the WebSocket thread.
    event_rx: Option<Receiver<TransportEvent>>,
    _thread: Option<JoinHandle<()>>,
}

impl WebSocketTransport {
    /// Create a new disconnected client.
    pub fn new() -> Self {
        Self {
            state: ConnectionState::Disconnected,
            cmd_tx: None,
            event_rx: None,
            _thread: None,
        }
    }

    /// Connect to a `ws://` or `wss://` URL.
    pub fn connect(&mut self, url: &str) -> Result<(), TransportError> {
        if self.cmd_tx.is_some() {
            return Err(TransportError::AlreadyConnected);
        }

        let parsed = Url::parse(url).map_err(|e| TransportError::InvalidUrl(e.to_string()))?;
        if parsed.scheme() != "ws" && parsed.scheme() != "wss" {
            return Err(TransportError::InvalidUrl(format!(
                "unsupported scheme: {}",
                parsed.scheme()
            )));
        }

        self.state = ConnectionState::Connecting;

        let (cmd_tx, cmd_rx) = channel::<WsCommand>();
        let (event_tx, event_rx) = channel::<TransportEvent>();
        let url = url.to_string();

        let handle = thread::spawn(move || run_socket(&url, cmd_rx, event_tx));

        self.cmd_tx = Some(cmd_tx);
        self.event_rx = Some(event_rx);
        self._thread = Some(handle);
        Ok(())
    }

    /// Close the connection. Safe to call when already disconnected.
    pub fn disconnect(&mut self) {
        if let Some(tx) = self.cmd_tx.take() {
            let _ = tx.send(WsCommand::Close);
        }
        self.event_rx = None;
        self._thread = None;
        self.state = ConnectionState::Disconnected;
    }
}

impl Transport for WebSocketTransport {
    fn send(&mut self, message: &ClientMessage) -> Result<(), TransportError> {
        let Some(tx) = &self.cmd_tx else {
            return Err(TransportError::NotConnected);
        };
        let text = serde_json::to_string(message)?;
        tx.send(WsCommand::Send(text))
            .map_err(|_| TransportError::Closed)
    }

    fn poll_events(&mut self) -> Vec<TransportEvent> {
        let mut events = Vec::new();
        let Some(rx) = &self.event_rx else {
            return events;
        };
        while let Ok(event) = rx.try_recv() {
            match &event {
                TransportEvent::Connected => self.state = ConnectionState::Connected,
                TransportEvent::Disconnected => self.state = ConnectionState::Disconnected,
                TransportEvent::Error { .. } => self.state = ConnectionState::Error,
                TransportEvent::Received(_) => {}
            }
            events.push(event);
        }
        // The thread is gone; allow a fresh connect
        if matches!(self.state, ConnectionState::Disconnected | ConnectionState::Error) {
            self.cmd_tx = None;
        }
        events
    }

    fn state(&self) -> ConnectionState {
        self.state
    }
}

impl Default for WebSocketTransport {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for WebSocketTransport {
    fn drop(&mut self) {
        self.disconnect();
    }
}

fn run_socket(url: &str, cmd_rx: Receiver<WsCommand>, event_tx: Sender<TransportEvent>) {
    log::info!("WebSocket thread: connecting to {}", url);

    let mut socket = match connect(url) {
        Ok((socket, response)) => {
            log::info!("WebSocket connected, status: {}", response.status());
            socket
        }
        Err(e) => {
            log::error!("WebSocket connection failed: {}", e);
            let _ = event_tx.send(TransportEvent::Error {
                message: format!("Connection failed: {}", e),
            });
            return;
        }
    };
    let _ = event_tx.send(TransportEvent::Connected);

    // Short read timeout so outgoing commands are not starved
    if let tungstenite::stream::MaybeTlsStream::Plain(tcp) = socket.get_mut() {
        let _ = tcp.set_read_timeout(Some(Duration::from_millis(50)));
        let _ = tcp.set_write_timeout(Some(Duration::from_secs(5)));
    }

    loop {
        match cmd_rx.try_recv() {
            Ok(WsCommand::Send(text)) => {
                log::debug!("WebSocket sending: {}", &text[..text.len().min(100)]);
                if let Err(e) = socket.send(Message::Text(text)) {
                    log::error!("WebSocket send error: {}", e);
                    break;
                }
            }
            Ok(WsCommand::Close) => {
                log::info!("WebSocket close requested");
                let _ = socket.close(None);
                break;
            }
            Err(TryRecvError::Disconnected) => {
                log::info!("WebSocket command channel disconnected");
                break;
            }
            Err(TryRecvError::Empty) => {}
        }

        match socket.read() {
            Ok(Message::Text(text)) => match serde_json::from_str::<ServerMessage>(&text) {
                Ok(message) => {
                    let _ = event_tx.send(TransportEvent::Received(message));
                }
                Err(e) => log::warn!("Failed to parse server message: {} ({})", text, e),
            },
            Ok(Message::Ping(data)) => {
                let _ = socket.send(Message::Pong(data));
            }
            Ok(Message::Close(_)) => {
                log::info!("WebSocket received close frame");
                break;
            }
            Ok(_) => {}
            Err(tungstenite::Error::Io(ref e))
                if e.kind() == std::io::ErrorKind::WouldBlock
                    || e.kind() == std::io::ErrorKind::TimedOut => {}
            Err(e) => {
                log::error!("WebSocket read error: {}", e);
                break;
            }
        }
    }

    log::info!("WebSocket thread exiting");
    let _ = event_tx.send(TransportEvent::Disconnected);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rejects_non_websocket_urls() {
        let mut transport = WebSocketTransport::new();
        assert!(matches!(
            transport.connect("http://localhost:3030"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert!(matches!(
            transport.connect("not a url"),
            Err(TransportError::InvalidUrl(_))
        ));
        assert_eq!(transport.state(), ConnectionState::Disconnected);
    }

    #[test]
    fn test_send_requires_connection() {
        let mut transport = WebSocketTransport::new();
        assert!(matches!(
            transport.send(&ClientMessage::Leave),
            Err(TransportError::NotConnected)
        ));
        assert!(transport.poll_events().is_empty());
    }
}
