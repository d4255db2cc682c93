//! Mirrors local scene edits to the room and folds remote edits back in.
//!
//! The engine keeps a shared table of element records (the local copy of the
//! room's keyed mapping) next to the [`Scene`]. Every record carries its last
//! author and time; concurrent writes to one element are ordered by the
//! configured [`ConflictResolver`] so all participants converge per element.

use std::collections::{BTreeMap, HashMap};
use std::rc::Rc;

use crate::clock::{Clock, Millis};
use crate::config::SyncConfig;
use crate::element::{Element, ElementId, ElementPatch, ElementRecord, UserId};
use crate::history::History;
use crate::scene::Scene;
use crate::sync::conflict::{ConflictResolver, resolver_for};
use crate::sync::operation::{OperationKind, SyncOperation};
use crate::sync::presence::{Presence, PresenceManager};
use crate::sync::protocol::{ClientMessage, CursorPosition, Identity, Peer, ServerMessage};
use crate::sync::throttle::CursorThrottle;
use crate::sync::transport::{ConnectionState, Transport, TransportEvent};

/// Result of a local update request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateOutcome {
    Applied,
    /// Applied, but another participant wrote the element moments ago.
    AppliedWithConflictWarning,
    /// No such element in the shared table; nothing changed.
    Missing,
}

impl UpdateOutcome {
    pub fn is_applied(&self) -> bool {
        !matches!(self, UpdateOutcome::Missing)
    }
}

/// What [`SyncEngine::poll`] observed.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncNotice {
    Connected,
    Disconnected,
    /// Joined a room; the scene now holds the room snapshot.
    Joined { room: String, peer_count: usize },
    PeerJoined(UserId),
    PeerLeft(UserId),
    /// A remote operation arrived; `applied` is false if it lost to newer state.
    RemoteOperation { element_id: ElementId, applied: bool },
    RemoteSelection(UserId),
    RemoteCursor(UserId),
    Error(String),
}

impl SyncNotice {
    /// True if the scene may have changed.
    pub fn changes_scene(&self) -> bool {
        matches!(
            self,
            SyncNotice::Joined { .. } | SyncNotice::RemoteOperation { applied: true, .. }
        )
    }
}

/// Local operation statistics.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct SyncMetrics {
    pub operation_count: u64,
    pub average_latency_ms: Millis,
    pub last_update: Option<Millis>,
}

impl SyncMetrics {
    fn record(&mut self, latency: Millis, at: Millis) {
        self.operation_count += 1;
        let n = self.operation_count as f64;
        self.average_latency_ms += (latency - self.average_latency_ms) / n;
        self.last_update = Some(at);
    }
}

/// Collaboration engine for one participant.
pub struct SyncEngine {
    transport: Box<dyn Transport>,
    clock: Rc<dyn Clock>,
    config: SyncConfig,
    resolver: Box<dyn ConflictResolver>,
    identity: Identity,
    room: String,
    user_id: UserId,
    joined: bool,
    shared: HashMap<ElementId, ElementRecord>,
    shared_order: Vec<ElementId>,
    /// Latest operation seen per element; deletes stay here as tombstones.
    last_ops: HashMap<ElementId, SyncOperation>,
    peers: BTreeMap<UserId, Peer>,
    selections: HashMap<UserId, Vec<ElementId>>,
    cursors: HashMap<UserId, CursorPosition>,
    presence: PresenceManager,
    throttle: CursorThrottle,
    metrics: SyncMetrics,
    last_local_edit: Option<Millis>,
}

impl std::fmt::Debug for SyncEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncEngine")
            .field("room", &self.room)
            .field("user_id", &self.user_id)
            .field("joined", &self.joined)
            .field("state", &self.transport.state())
            .field("resolver", &self.resolver.name())
            .field("elements", &self.shared.len())
            .finish()
    }
}

impl SyncEngine {
    pub fn new(
        transport: Box<dyn Transport>,
        clock: Rc<dyn Clock>,
        config: SyncConfig,
        identity: Identity,
        room: impl Into<String>,
    ) -> Self {
        let resolver = resolver_for(config.strategy);
        log::info!("sync engine using {} resolution", resolver.name());
        Self {
            transport,
            clock,
            resolver,
            presence: PresenceManager::new(config.presence_timeout_ms, config.presence_sweep_ms),
            throttle: CursorThrottle::new(config.cursor_throttle_ms),
            config,
            identity,
            room: room.into(),
            user_id: crate::element::generate_id("local"),
            joined: false,
            shared: HashMap::new(),
            shared_order: Vec::new(),
            last_ops: HashMap::new(),
            peers: BTreeMap::new(),
            selections: HashMap::new(),
            cursors: HashMap::new(),
            metrics: SyncMetrics::default(),
            last_local_edit: None,
        }
    }

    /// Replace the conflict resolver.
    pub fn set_resolver(&mut self, resolver: Box<dyn ConflictResolver>) {
        log::info!("switching to {} resolution", resolver.name());
        self.resolver = resolver;
    }

    pub fn user_id(&self) -> &str {
        &self.user_id
    }

    pub fn room(&self) -> &str {
        &self.room
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.transport.state()
    }

    /// Connected and joined to the room.
    pub fn is_online(&self) -> bool {
        self.joined && self.transport.is_connected()
    }

    pub fn metrics(&self) -> SyncMetrics {
        self.metrics
    }

    pub fn presence(&self) -> &PresenceManager {
        &self.presence
    }

    pub fn presence_mut(&mut self) -> &mut PresenceManager {
        &mut self.presence
    }

    pub fn record(&self, id: &str) -> Option<&ElementRecord> {
        self.shared.get(id)
    }

    /// Shared records in insertion order.
    pub fn records(&self) -> impl Iterator<Item = &ElementRecord> {
        self.shared_order.iter().filter_map(|id| self.shared.get(id))
    }

    pub fn selection_of(&self, user_id: &str) -> &[ElementId] {
        self.selections.get(user_id).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn cursor_of(&self, user_id: &str) -> CursorPosition {
        self.cursors.get(user_id).copied().unwrap_or_default()
    }

    // --- Local edits -------------------------------------------------------

    /// Stamp and publish a new element, mirroring it into the scene.
    pub fn create_element(
        &mut self,
        scene: &mut Scene,
        history: &mut History,
        element: Element,
    ) -> ElementRecord {
        let started = self.clock.now();
        let at = self.stamp_time(&element.id, started);
        let record = ElementRecord::stamped(element, &self.user_id, at);
        self.commit_local(
            scene,
            SyncOperation::with_record(OperationKind::Insert, record.clone()),
        );
        history.add_to_history(scene);
        self.finish_local(started);
        record
    }

    /// Merge a partial update into a shared element.
    pub fn update_element(
        &mut self,
        scene: &mut Scene,
        history: &mut History,
        id: &str,
        patch: &ElementPatch,
    ) -> UpdateOutcome {
        self.edit(scene, history, OperationKind::Update, &[(id.to_string(), patch.clone())])
            .pop()
            .unwrap_or(UpdateOutcome::Missing)
    }

    /// Update several elements as one undo step.
    pub fn update_elements(
        &mut self,
        scene: &mut Scene,
        history: &mut History,
        edits: &[(ElementId, ElementPatch)],
    ) -> Vec<UpdateOutcome> {
        self.edit(scene, history, OperationKind::Update, edits)
    }

    /// An update tagged as a move.
    pub fn move_element(
        &mut self,
        scene: &mut Scene,
        history: &mut History,
        id: &str,
        patch: &ElementPatch,
    ) -> UpdateOutcome {
        self.edit(scene, history, OperationKind::Move, &[(id.to_string(), patch.clone())])
            .pop()
            .unwrap_or(UpdateOutcome::Missing)
    }

    /// Move several elements as one undo step.
    pub fn move_elements(
        &mut self,
        scene: &mut Scene,
        history: &mut History,
        moves: &[(ElementId, ElementPatch)],
    ) -> Vec<UpdateOutcome> {
        self.edit(scene, history, OperationKind::Move, moves)
    }

    /// Delete an element, leaving a tombstone against older concurrent writes.
    pub fn delete_element(&mut self, scene: &mut Scene, history: &mut History, id: &str) -> bool {
        self.delete_elements(scene, history, &[id.to_string()]) == 1
    }

    /// Delete several elements as one undo step. Returns how many existed.
    pub fn delete_elements(
        &mut self,
        scene: &mut Scene,
        history: &mut History,
        ids: &[ElementId],
    ) -> usize {
        let started = self.clock.now();
        let mut deleted = 0;
        for id in ids {
            if !self.shared.contains_key(id) {
                log::warn!("delete of unknown element {}", id);
                continue;
            }
            let at = self.stamp_time(id, started);
            self.commit_local(scene, SyncOperation::delete(id.clone(), &self.user_id, at));
            deleted += 1;
        }
        if deleted > 0 {
            history.add_to_history(scene);
            self.finish_local(started);
        }
        deleted
    }

    fn edit(
        &mut self,
        scene: &mut Scene,
        history: &mut History,
        kind: OperationKind,
        edits: &[(ElementId, ElementPatch)],
    ) -> Vec<UpdateOutcome> {
        let started = self.clock.now();
        let mut outcomes = Vec::with_capacity(edits.len());
        for (id, patch) in edits {
            let Some(existing) = self.shared.get(id) else {
                log::warn!("update of missing element {}", id);
                outcomes.push(UpdateOutcome::Missing);
                continue;
            };

            // Negative means the other clock runs ahead; no overlap to report
            let elapsed = started - existing.last_modified;
            let outcome = if existing.last_modified_by != self.user_id
                && (0.0..self.config.conflict_window_ms).contains(&elapsed)
            {
                log::warn!(
                    "possible conflict on {}: {} wrote it {:.1}ms ago",
                    id,
                    existing.last_modified_by,
                    elapsed
                );
                UpdateOutcome::AppliedWithConflictWarning
            } else {
                UpdateOutcome::Applied
            };

            let mut record = existing.clone();
            record.element.apply_patch(patch);
            let at = self.stamp_time(id, started);
            record.restamp(&self.user_id, at);
            self.commit_local(scene, SyncOperation::with_record(kind, record));
            outcomes.push(outcome);
        }
        if outcomes.iter().any(UpdateOutcome::is_applied) {
            history.add_to_history(scene);
            self.finish_local(started);
        }
        outcomes
    }

    /// Time to stamp a local write with. Never earlier than the operation
    /// already held for the element, so the local write wins everywhere.
    fn stamp_time(&self, id: &str, now: Millis) -> Millis {
        match self.last_ops.get(id) {
            Some(held) if held.timestamp >= now => held.timestamp.next_up(),
            _ => now,
        }
    }

    /// Apply a local operation to the shared table and the scene, then send it.
    fn commit_local(&mut self, scene: &mut Scene, op: SyncOperation) {
        self.store(scene, &op);
        self.last_ops.insert(op.element_id.clone(), op.clone());
        self.publish(ClientMessage::Operation { op });
    }

    fn finish_local(&mut self, started: Millis) {
        let now = self.clock.now();
        self.throttle.mark(now);
        self.last_local_edit = Some(now);
        let user_id = self.user_id.clone();
        self.revive_presence(&user_id, now);
        self.presence.touch(&user_id, now);
        self.metrics.record(now - started, now);
    }

    fn publish(&mut self, message: ClientMessage) {
        if !self.is_online() {
            return;
        }
        if let Err(e) = self.transport.send(&message) {
            log::warn!("failed to send to room {}: {}", self.room, e);
        }
    }

    /// Write an operation's effect into the shared table and the scene.
    fn store(&mut self, scene: &mut Scene, op: &SyncOperation) {
        if op.is_delete() {
            if self.shared.remove(&op.element_id).is_some() {
                self.shared_order.retain(|id| id != &op.element_id);
            }
            scene.remove_element(&op.element_id);
            return;
        }
        let Some(record) = &op.payload else {
            log::warn!("operation {} on {} has no payload", op.id, op.element_id);
            return;
        };
        mirror_into_scene(scene, &record.element);
        if self
            .shared
            .insert(op.element_id.clone(), record.clone())
            .is_none()
        {
            self.shared_order.push(op.element_id.clone());
        }
    }

    // --- Presence ----------------------------------------------------------

    /// Share the local cursor. Returns false if the update was throttled.
    pub fn update_user_cursor(&mut self, position: CursorPosition) -> bool {
        let now = self.clock.now();
        if !self.throttle.try_acquire(now) {
            return false;
        }
        self.cursors.insert(self.user_id.clone(), position);
        let user_id = self.user_id.clone();
        self.revive_presence(&user_id, now);
        self.presence.update_cursor(&user_id, position, now);
        self.publish(ClientMessage::Cursor {
            x: position.x,
            y: position.y,
        });
        true
    }

    /// Share the local selection.
    pub fn update_selection(&mut self, ids: Vec<ElementId>) {
        let now = self.clock.now();
        self.selections.insert(self.user_id.clone(), ids.clone());
        let user_id = self.user_id.clone();
        self.revive_presence(&user_id, now);
        self.presence.update_selection(&user_id, ids.iter().cloned(), now);
        self.publish(ClientMessage::Selection { ids });
    }

    /// Recreate the presence record of a connected participant after a sweep
    /// purged it.
    fn revive_presence(&mut self, user_id: &str, now: Millis) {
        if self.presence.contains(user_id) {
            return;
        }
        if let Some(peer) = self.peers.get(user_id) {
            log::debug!("presence restored for {}", user_id);
            self.presence.join(peer, now);
        }
    }

    /// Connected participants with their cursors and selections, limited to
    /// those with a live presence record.
    pub fn presence_roster(&self) -> Vec<Presence> {
        self.peers
            .values()
            .filter_map(|peer| {
                let live = self.presence.get(&peer.user_id)?;
                Some(Presence {
                    user_id: peer.user_id.clone(),
                    display_name: peer.name.clone(),
                    color: peer.color.clone(),
                    cursor: self.cursor_of(&peer.user_id),
                    selection: self.selection_of(&peer.user_id).iter().cloned().collect(),
                    last_seen: live.last_seen,
                })
            })
            .collect()
    }

    /// Run periodic presence maintenance. Returns purged participants.
    pub fn tick(&mut self) -> Vec<UserId> {
        let now = self.clock.now();
        self.presence.tick(now)
    }

    /// True for a short while after the last local edit.
    pub fn is_actively_drawing(&self) -> bool {
        let now = self.clock.now();
        self.last_local_edit
            .is_some_and(|at| now - at < self.config.activity_window_ms)
    }

    // --- Remote state ------------------------------------------------------

    /// Drain transport events into the scene.
    pub fn poll(&mut self, scene: &mut Scene, history: &mut History) -> Vec<SyncNotice> {
        let events = self.transport.poll_events();
        let mut notices = Vec::with_capacity(events.len());
        for event in events {
            notices.extend(self.handle_event(event, scene, history));
        }
        notices
    }

    pub fn handle_event(
        &mut self,
        event: TransportEvent,
        scene: &mut Scene,
        history: &mut History,
    ) -> Option<SyncNotice> {
        match event {
            TransportEvent::Connected => {
                log::info!("connected, joining room {}", self.room);
                let join = ClientMessage::Join {
                    room: self.room.clone(),
                    name: self.identity.name.clone(),
                    color: self.identity.color.clone(),
                };
                if let Err(e) = self.transport.send(&join) {
                    log::error!("failed to join room {}: {}", self.room, e);
                }
                Some(SyncNotice::Connected)
            }
            TransportEvent::Disconnected => {
                log::warn!("disconnected from room {}, continuing offline", self.room);
                self.go_offline();
                Some(SyncNotice::Disconnected)
            }
            TransportEvent::Error { message } => {
                log::error!("transport error: {}", message);
                self.go_offline();
                Some(SyncNotice::Error(message))
            }
            TransportEvent::Received(message) => self.handle_message(message, scene, history),
        }
    }

    fn go_offline(&mut self) {
        self.joined = false;
        self.peers.clear();
        self.cursors.clear();
        self.selections.clear();
        self.presence.clear();
    }

    fn handle_message(
        &mut self,
        message: ServerMessage,
        scene: &mut Scene,
        history: &mut History,
    ) -> Option<SyncNotice> {
        let now = self.clock.now();
        match message {
            ServerMessage::Joined {
                room,
                user_id,
                peers,
                elements,
                selections,
                cursors,
            } => {
                log::info!(
                    "joined room {} as {} ({} peers, {} elements)",
                    room,
                    user_id,
                    peers.len(),
                    elements.len()
                );
                self.go_offline();
                self.room = room.clone();
                self.user_id = user_id;
                self.joined = true;

                self.shared.clear();
                self.shared_order.clear();
                self.last_ops.clear();
                for record in &elements {
                    self.last_ops
                        .insert(record.element.id.clone(), SyncOperation::from_record(record));
                    if self.shared.insert(record.element.id.clone(), record.clone()).is_none() {
                        self.shared_order.push(record.element.id.clone());
                    }
                }
                scene.import_state(self.records().map(|r| r.element.clone()).collect());
                history.reset_to(scene);

                for peer in &peers {
                    self.presence.join(peer, now);
                    self.peers.insert(peer.user_id.clone(), peer.clone());
                }
                for (user, ids) in selections {
                    self.presence.update_selection(&user, ids.iter().cloned(), now);
                    self.selections.insert(user, ids);
                }
                for (user, cursor) in cursors {
                    self.presence.update_cursor(&user, cursor, now);
                    self.cursors.insert(user, cursor);
                }
                Some(SyncNotice::Joined {
                    room,
                    peer_count: peers.len(),
                })
            }
            ServerMessage::PeerJoined { peer } => {
                log::info!("{} ({}) joined", peer.name, peer.user_id);
                self.presence.join(&peer, now);
                let user_id = peer.user_id.clone();
                self.peers.insert(user_id.clone(), peer);
                Some(SyncNotice::PeerJoined(user_id))
            }
            ServerMessage::PeerLeft { user_id } => {
                log::info!("{} left", user_id);
                self.peers.remove(&user_id);
                self.cursors.remove(&user_id);
                self.selections.remove(&user_id);
                self.presence.remove(&user_id);
                Some(SyncNotice::PeerLeft(user_id))
            }
            ServerMessage::Operation { from, op } => {
                self.revive_presence(&from, now);
                self.presence.touch(&from, now);
                let element_id = op.element_id.clone();
                let applied = self.apply_remote_op(scene, op);
                if applied {
                    history.refresh_present(scene);
                }
                Some(SyncNotice::RemoteOperation { element_id, applied })
            }
            ServerMessage::Selection { from, ids } => {
                self.revive_presence(&from, now);
                self.presence.update_selection(&from, ids.iter().cloned(), now);
                self.selections.insert(from.clone(), ids);
                Some(SyncNotice::RemoteSelection(from))
            }
            ServerMessage::Cursor { from, x, y } => {
                let cursor = CursorPosition::new(x, y);
                self.revive_presence(&from, now);
                self.presence.update_cursor(&from, cursor, now);
                self.cursors.insert(from.clone(), cursor);
                Some(SyncNotice::RemoteCursor(from))
            }
            ServerMessage::Error { message } => {
                log::warn!("server error: {}", message);
                Some(SyncNotice::Error(message))
            }
        }
    }

    /// Apply a remote operation if it wins over what is held for its element.
    pub fn apply_remote_op(&mut self, scene: &mut Scene, op: SyncOperation) -> bool {
        if op.origin_user == self.user_id {
            return false;
        }
        let winners = match self.last_ops.get(&op.element_id) {
            None => vec![op],
            Some(held) => {
                let held_id = held.id.clone();
                let resolved = self.resolver.resolve(vec![held.clone(), op]);
                let start = resolved
                    .iter()
                    .position(|o| o.id == held_id)
                    .map_or(0, |p| p + 1);
                resolved.into_iter().skip(start).collect()
            }
        };
        if winners.is_empty() {
            log::debug!("discarded stale remote operation");
            return false;
        }
        for op in winners {
            log::debug!("applying remote {:?} on {} from {}", op.kind, op.element_id, op.origin_user);
            self.store(scene, &op);
            self.last_ops.insert(op.element_id.clone(), op);
        }
        true
    }

    /// Fold every remotely authored record into the scene. Returns how many
    /// elements changed.
    pub fn apply_remote(&self, scene: &mut Scene) -> usize {
        self.records()
            .filter(|r| r.last_modified_by != self.user_id)
            .filter(|r| mirror_into_scene(scene, &r.element))
            .count()
    }

    /// Bring the shared table and the scene back in line after undo or redo.
    ///
    /// Remote edits are re-applied over the restored snapshot; differences in
    /// locally authored elements are published as new operations.
    pub fn reconcile_after_history(&mut self, scene: &mut Scene) {
        self.apply_remote(scene);

        let started = self.clock.now();
        let mut ops = Vec::new();
        let mut deleted_remotely = Vec::new();

        for element in scene.iter() {
            match self.shared.get(&element.id) {
                Some(record) if record.element == *element => {}
                Some(record) if record.last_modified_by != self.user_id => {}
                Some(record) => {
                    let mut record = record.clone();
                    record.element = element.clone();
                    record.restamp(&self.user_id, self.stamp_time(&element.id, started));
                    ops.push(SyncOperation::with_record(OperationKind::Update, record));
                }
                None => {
                    let tombstoned = self
                        .last_ops
                        .get(&element.id)
                        .is_some_and(|op| op.is_delete() && op.origin_user != self.user_id);
                    if tombstoned {
                        deleted_remotely.push(element.id.clone());
                        continue;
                    }
                    let record = ElementRecord::stamped(
                        element.clone(),
                        &self.user_id,
                        self.stamp_time(&element.id, started),
                    );
                    ops.push(SyncOperation::with_record(OperationKind::Insert, record));
                }
            }
        }

        for record in self.records() {
            if !scene.contains(&record.element.id) && record.last_modified_by == self.user_id {
                ops.push(SyncOperation::delete(
                    record.element.id.clone(),
                    &self.user_id,
                    self.stamp_time(&record.element.id, started),
                ));
            }
        }

        // Deleted by someone else: drop the restored copy locally only
        for id in &deleted_remotely {
            scene.remove_element(id);
        }
        if ops.is_empty() {
            return;
        }
        for op in ops {
            self.commit_local(scene, op);
        }
        self.finish_local(started);
    }
}

/// Patch an existing scene element to match `element`, or append it.
/// Returns true if the scene changed.
fn mirror_into_scene(scene: &mut Scene, element: &Element) -> bool {
    match scene.get(&element.id) {
        Some(current) if current == element => false,
        Some(_) => {
            let patch = ElementPatch {
                kind: Some(element.kind.clone()),
                attributes: element.attributes.clone(),
                content: Some(element.content.clone()),
            };
            scene.update_element(&element.id, &patch)
        }
        None => {
            scene.add_element(element.clone());
            true
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::ResolutionStrategy;
    use crate::element::kind;
    use crate::sync::transport::{MemoryHub, MemoryTransport};

    struct Participant {
        engine: SyncEngine,
        scene: Scene,
        history: History,
    }

    impl Participant {
        fn poll(&mut self) -> Vec<SyncNotice> {
            self.engine.poll(&mut self.scene, &mut self.history)
        }

        fn create(&mut self, element: Element) -> ElementRecord {
            self.engine
                .create_element(&mut self.scene, &mut self.history, element)
        }

        fn update(&mut self, id: &str, patch: ElementPatch) -> UpdateOutcome {
            self.engine
                .update_element(&mut self.scene, &mut self.history, id, &patch)
        }
    }

    fn participant(hub: &MemoryHub, clock: &Rc<ManualClock>, name: &str) -> Participant {
        participant_with(hub, clock, name, SyncConfig::default())
    }

    fn participant_with(
        hub: &MemoryHub,
        clock: &Rc<ManualClock>,
        name: &str,
        config: SyncConfig,
    ) -> Participant {
        let transport: MemoryTransport = hub.connect();
        let mut p = Participant {
            engine: SyncEngine::new(
                Box::new(transport),
                clock.clone(),
                config,
                Identity::new(name, "#ff0000"),
                "room",
            ),
            scene: Scene::new(),
            history: History::default(),
        };
        p.poll();
        p.poll();
        p
    }

    fn rect(id: &str) -> Element {
        Element::new(id, kind::RECT)
            .with_attr("x", "0")
            .with_attr("fill", "#ffffff")
    }

    #[test]
    fn test_create_reaches_peers() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(0.0));
        let mut a = participant(&hub, &clock, "Ann");
        let mut b = participant(&hub, &clock, "Ben");
        a.poll();
        assert!(a.engine.is_online() && b.engine.is_online());

        let record = a.create(rect("r1"));
        assert_eq!(record.last_modified_by, a.engine.user_id());
        assert_eq!(a.scene.len(), 1);
        assert!(a.history.can_undo());

        b.poll();
        assert_eq!(b.scene.get("r1"), Some(&record.element));
        // Remote edits do not create undo steps
        assert!(!b.history.can_undo());
    }

    #[test]
    fn test_late_joiner_receives_snapshot() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(0.0));
        let mut a = participant(&hub, &clock, "Ann");
        a.create(rect("r1"));
        a.create(rect("r2"));

        let b = participant(&hub, &clock, "Ben");
        assert_eq!(b.scene.ids(), &["r1".to_string(), "r2".to_string()]);
        assert!(!b.history.can_undo());
        assert_eq!(b.engine.presence_roster().len(), 2);
    }

    #[test]
    fn test_concurrent_updates_converge() {
        for strategy in [ResolutionStrategy::LastWriteWins, ResolutionStrategy::CausalTransform] {
            let config = SyncConfig {
                strategy,
                ..SyncConfig::default()
            };
            let hub = MemoryHub::new();
            let clock = Rc::new(ManualClock::new(0.0));
            let mut a = participant_with(&hub, &clock, "Ann", config.clone());
            let mut b = participant_with(&hub, &clock, "Ben", config.clone());
            a.poll();
            a.create(rect("r1"));
            b.poll();

            clock.advance(100.0);
            a.update("r1", ElementPatch::attributes([("fill", "#ff0000")]));
            clock.advance(5.0);
            // Ben has not seen Ann's write yet
            b.update("r1", ElementPatch::attributes([("fill", "#0000ff")]));

            a.poll();
            b.poll();
            assert_eq!(a.scene.get("r1").unwrap().attr("fill"), Some("#0000ff"));
            assert_eq!(a.scene, b.scene);
        }
    }

    #[test]
    fn test_late_joiner_matches_room_after_reordered_writes() {
        let hub = MemoryHub::new();
        let ann_clock = Rc::new(ManualClock::new(0.0));
        let ben_clock = Rc::new(ManualClock::new(0.0));
        let mut a = participant(&hub, &ann_clock, "Ann");
        let mut b = participant(&hub, &ben_clock, "Ben");
        a.poll();
        a.create(rect("r1"));
        b.poll();

        // Ben's clock runs ahead, and his write reaches the relay first
        ann_clock.set(150.0);
        ben_clock.set(200.0);
        b.update("r1", ElementPatch::attributes([("fill", "#0000ff")]));
        a.update("r1", ElementPatch::attributes([("fill", "#ff0000")]));
        a.poll();
        b.poll();
        assert_eq!(a.scene.get("r1").unwrap().attr("fill"), Some("#0000ff"));
        assert_eq!(a.scene, b.scene);

        let c = participant(&hub, &ben_clock, "Cid");
        assert_eq!(c.scene, a.scene);
    }

    #[test]
    fn test_arrival_order_independent() {
        let build = |reverse: bool| {
            let clock = Rc::new(ManualClock::new(0.0));
            let hub = MemoryHub::new();
            let mut p = participant(&hub, &clock, "Ann");
            let base = ElementRecord::stamped(rect("r1"), "x", 1.0);
            let older = SyncOperation::with_record(OperationKind::Insert, base.clone());
            let mut changed = base.clone();
            changed.element.set_attr("fill", "#00ff00");
            changed.restamp("y", 2.0);
            let newer = SyncOperation::with_record(OperationKind::Update, changed);

            let mut ops = vec![older, newer];
            if reverse {
                ops.reverse();
            }
            for op in ops {
                p.engine.apply_remote_op(&mut p.scene, op);
            }
            p.scene
        };
        let forward = build(false);
        assert_eq!(forward.get("r1").unwrap().attr("fill"), Some("#00ff00"));
        assert_eq!(forward, build(true));
    }

    #[test]
    fn test_delete_tombstone_blocks_older_update() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(10.0));
        let mut a = participant(&hub, &clock, "Ann");
        a.create(rect("r1"));
        let stale = {
            let mut record = a.engine.record("r1").unwrap().clone();
            record.restamp("someone", 5.0);
            SyncOperation::with_record(OperationKind::Update, record)
        };
        clock.advance(10.0);
        assert!(a.engine.delete_element(&mut a.scene, &mut a.history, "r1"));
        assert!(!a.engine.apply_remote_op(&mut a.scene, stale));
        assert!(!a.scene.contains("r1"));
    }

    #[test]
    fn test_update_missing_and_conflict_warning() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(0.0));
        let mut a = participant(&hub, &clock, "Ann");
        let mut b = participant(&hub, &clock, "Ben");
        a.poll();

        assert_eq!(a.update("nope", ElementPatch::default()), UpdateOutcome::Missing);
        assert!(!a.history.can_undo());

        a.create(rect("r1"));
        b.poll();
        clock.advance(20.0);
        let outcome = b.update("r1", ElementPatch::attributes([("x", "5")]));
        assert_eq!(outcome, UpdateOutcome::AppliedWithConflictWarning);
        assert_eq!(b.scene.get("r1").unwrap().attr("x"), Some("5"));

        clock.advance(100.0);
        assert_eq!(
            b.update("r1", ElementPatch::attributes([("x", "6")])),
            UpdateOutcome::Applied
        );
    }

    #[test]
    fn test_update_merges_and_restamps() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(0.0));
        let mut a = participant(&hub, &clock, "Ann");
        a.create(rect("r1").with_attr("stroke", "#000000"));
        clock.advance(3.0);
        a.update("r1", ElementPatch::attributes([("fill", "#123456")]));

        let record = a.engine.record("r1").unwrap();
        assert_eq!(record.element.attr("stroke"), Some("#000000"));
        assert_eq!(record.element.attr("fill"), Some("#123456"));
        assert_eq!(record.last_modified, 3.0);
        assert_eq!(a.engine.metrics().operation_count, 2);
    }

    #[test]
    fn test_cursor_throttle_and_roster() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(0.0));
        let mut a = participant(&hub, &clock, "Ann");
        let mut b = participant(&hub, &clock, "Ben");
        a.poll();

        let mut applied = 0;
        for i in 0..1000 {
            clock.set(i as f64 * 0.01);
            if a.engine.update_user_cursor(CursorPosition::new(i as f64, 0.0)) {
                applied += 1;
            }
        }
        assert!(applied <= 2);

        a.engine.update_selection(vec!["r9".to_string()]);
        b.poll();
        let ann = a.engine.user_id().to_string();
        let roster = b.engine.presence_roster();
        let entry = roster.iter().find(|p| p.user_id == ann).unwrap();
        assert_eq!(entry.display_name, "Ann");
        assert_eq!(entry.cursor, a.engine.cursor_of(&ann));
        assert_eq!(b.engine.cursor_of("nobody"), CursorPosition::default());
        assert_eq!(entry.selection.len(), 1);
    }

    #[test]
    fn test_disconnect_keeps_local_editing() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(0.0));
        let transport = hub.connect();
        let id = transport.id();
        let mut a = Participant {
            engine: SyncEngine::new(
                Box::new(transport),
                clock.clone(),
                SyncConfig::default(),
                Identity::new("Ann", "#ff0000"),
                "room",
            ),
            scene: Scene::new(),
            history: History::default(),
        };
        a.poll();
        a.poll();
        let mut b = participant(&hub, &clock, "Ben");
        b.create(rect("shared"));
        a.poll();
        assert!(a.scene.contains("shared"));

        hub.drop_connection(id);
        assert!(a.poll().contains(&SyncNotice::Disconnected));
        assert!(a.engine.presence_roster().is_empty());

        a.create(rect("offline"));
        assert!(a.scene.contains("offline"));
        assert!(a.history.undo(&mut a.scene));
        assert!(!a.scene.contains("offline"));

        // Reconnecting replaces the scene with the room snapshot
        hub.restore_connection(id);
        a.poll();
        a.poll();
        assert!(a.engine.is_online());
        assert_eq!(a.scene.ids(), &["shared".to_string()]);
        assert!(!a.history.can_undo());
    }

    #[test]
    fn test_undo_publishes_inverse() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(0.0));
        let mut a = participant(&hub, &clock, "Ann");
        let mut b = participant(&hub, &clock, "Ben");
        a.poll();

        a.create(rect("r1"));
        clock.advance(10.0);
        a.update("r1", ElementPatch::attributes([("fill", "#ff0000")]));
        b.poll();
        assert_eq!(b.scene.get("r1").unwrap().attr("fill"), Some("#ff0000"));

        clock.advance(10.0);
        assert!(a.history.undo(&mut a.scene));
        a.engine.reconcile_after_history(&mut a.scene);
        b.poll();
        assert_eq!(b.scene.get("r1").unwrap().attr("fill"), Some("#ffffff"));

        clock.advance(10.0);
        assert!(a.history.undo(&mut a.scene));
        a.engine.reconcile_after_history(&mut a.scene);
        b.poll();
        assert!(!b.scene.contains("r1"));
        assert_eq!(a.scene, b.scene);
    }

    #[test]
    fn test_undo_keeps_remote_edits() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(0.0));
        let mut a = participant(&hub, &clock, "Ann");
        let mut b = participant(&hub, &clock, "Ben");
        a.poll();

        a.create(rect("mine"));
        b.poll();
        clock.advance(100.0);
        b.create(rect("theirs"));
        a.poll();

        // Undoing Ann's create must not drop Ben's element
        assert!(a.history.undo(&mut a.scene));
        a.engine.reconcile_after_history(&mut a.scene);
        assert!(a.scene.contains("theirs"));
        assert!(!a.scene.contains("mine"));
        b.poll();
        assert_eq!(a.scene, b.scene);
    }

    #[test]
    fn test_activity_window() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(0.0));
        let mut a = participant(&hub, &clock, "Ann");
        assert!(!a.engine.is_actively_drawing());
        a.create(rect("r1"));
        assert!(a.engine.is_actively_drawing());
        clock.advance(1_000.0);
        assert!(!a.engine.is_actively_drawing());
    }

    #[test]
    fn test_presence_expires_on_tick() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(0.0));
        let mut a = participant(&hub, &clock, "Ann");
        let _b = participant(&hub, &clock, "Ben");
        a.poll();
        assert_eq!(a.engine.presence_roster().len(), 2);

        for at in [0.0, 30_000.0, 60_000.0, 61_000.0] {
            clock.set(at);
            assert!(a.engine.tick().is_empty());
        }
        clock.set(90_000.0);
        assert_eq!(a.engine.tick().len(), 2);
        assert!(a.engine.presence_roster().is_empty());
    }

    #[test]
    fn test_presence_returns_after_activity() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(0.0));
        let mut a = participant(&hub, &clock, "Ann");
        let mut b = participant(&hub, &clock, "Ben");
        a.poll();

        clock.set(90_000.0);
        assert_eq!(a.engine.tick().len(), 2);
        assert_eq!(b.engine.tick().len(), 2);

        clock.set(95_000.0);
        assert!(b.engine.update_user_cursor(CursorPosition::new(4.0, 2.0)));
        b.engine.update_selection(vec!["r1".to_string()]);
        a.poll();

        let ben = b.engine.user_id().to_string();
        let roster = a.engine.presence_roster();
        assert_eq!(roster.len(), 1);
        assert_eq!(roster[0].user_id, ben);
        assert_eq!(roster[0].display_name, "Ben");
        assert_eq!(roster[0].cursor, CursorPosition::new(4.0, 2.0));
        assert_eq!(roster[0].last_seen, 95_000.0);
        assert!(b.engine.presence().contains(&ben));

        // Ann comes back through a local edit
        a.create(rect("r1"));
        assert_eq!(a.engine.presence_roster().len(), 2);
    }

    #[test]
    fn test_no_conflict_warning_for_future_stamp() {
        let hub = MemoryHub::new();
        let clock = Rc::new(ManualClock::new(1_000.0));
        let mut a = participant(&hub, &clock, "Ann");
        let op = SyncOperation::with_record(
            OperationKind::Insert,
            ElementRecord::stamped(rect("r1"), "peer-ahead", 600_000.0),
        );
        assert!(a.engine.apply_remote_op(&mut a.scene, op));

        let outcome = a.update("r1", ElementPatch::attributes([("x", "9")]));
        assert_eq!(outcome, UpdateOutcome::Applied);
        assert!(a.engine.record("r1").unwrap().last_modified > 600_000.0);
    }
}
