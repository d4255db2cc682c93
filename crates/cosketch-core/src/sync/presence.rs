//! Participant presence with inactivity expiry.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::clock::Millis;
use crate::element::{ElementId, UserId};
use crate::sync::protocol::{CursorPosition, Peer};

/// What others see of a participant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Presence {
    pub user_id: UserId,
    pub display_name: String,
    pub color: String,
    pub cursor: CursorPosition,
    pub selection: BTreeSet<ElementId>,
    pub last_seen: Millis,
}

/// Handle returned by [`PresenceManager::subscribe`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SubscriptionId(u64);

type Listener = Box<dyn FnMut(&[Presence])>;

/// Presence records keyed by user, purged after a period of inactivity.
///
/// Subscribers receive the full roster after every change and every purge.
pub struct PresenceManager {
    records: BTreeMap<UserId, Presence>,
    listeners: Vec<(SubscriptionId, Listener)>,
    next_subscription: u64,
    timeout: Millis,
    sweep_interval: Millis,
    last_sweep: Option<Millis>,
}

impl std::fmt::Debug for PresenceManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PresenceManager")
            .field("records", &self.records)
            .field("listeners", &self.listeners.len())
            .field("timeout", &self.timeout)
            .field("sweep_interval", &self.sweep_interval)
            .finish()
    }
}

impl PresenceManager {
    pub fn new(timeout: Millis, sweep_interval: Millis) -> Self {
        Self {
            records: BTreeMap::new(),
            listeners: Vec::new(),
            next_subscription: 0,
            timeout,
            sweep_interval,
            last_sweep: None,
        }
    }

    pub fn subscribe(&mut self, listener: impl FnMut(&[Presence]) + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_subscription);
        self.next_subscription += 1;
        self.listeners.push((id, Box::new(listener)));
        id
    }

    pub fn unsubscribe(&mut self, id: SubscriptionId) {
        self.listeners.retain(|(other, _)| *other != id);
    }

    /// Create or refresh a participant's identity.
    pub fn join(&mut self, peer: &Peer, now: Millis) {
        let record = self
            .records
            .entry(peer.user_id.clone())
            .or_insert_with(|| Presence {
                user_id: peer.user_id.clone(),
                display_name: peer.name.clone(),
                color: peer.color.clone(),
                cursor: CursorPosition::default(),
                selection: BTreeSet::new(),
                last_seen: now,
            });
        record.display_name = peer.name.clone();
        record.color = peer.color.clone();
        record.last_seen = now;
        self.notify();
    }

    /// Record a cursor move. Unknown users are ignored.
    pub fn update_cursor(&mut self, user_id: &str, cursor: CursorPosition, now: Millis) -> bool {
        let Some(record) = self.records.get_mut(user_id) else {
            return false;
        };
        record.cursor = cursor;
        record.last_seen = now;
        self.notify();
        true
    }

    /// Record a selection change. Unknown users are ignored.
    pub fn update_selection(
        &mut self,
        user_id: &str,
        selection: impl IntoIterator<Item = ElementId>,
        now: Millis,
    ) -> bool {
        let Some(record) = self.records.get_mut(user_id) else {
            return false;
        };
        record.selection = selection.into_iter().collect();
        record.last_seen = now;
        self.notify();
        true
    }

    /// Mark a participant as active without changing anything else.
    pub fn touch(&mut self, user_id: &str, now: Millis) {
        if let Some(record) = self.records.get_mut(user_id) {
            record.last_seen = now;
        }
    }

    pub fn remove(&mut self, user_id: &str) -> Option<Presence> {
        let removed = self.records.remove(user_id);
        if removed.is_some() {
            self.notify();
        }
        removed
    }

    /// Run a sweep if the sweep interval has elapsed since the last one.
    pub fn tick(&mut self, now: Millis) -> Vec<UserId> {
        let due = self
            .last_sweep
            .is_none_or(|last| now - last >= self.sweep_interval);
        if !due {
            return Vec::new();
        }
        self.sweep(now)
    }

    /// Purge records idle for longer than the timeout.
    pub fn sweep(&mut self, now: Millis) -> Vec<UserId> {
        self.last_sweep = Some(now);
        let expired: Vec<UserId> = self
            .records
            .values()
            .filter(|p| now - p.last_seen > self.timeout)
            .map(|p| p.user_id.clone())
            .collect();
        for user_id in &expired {
            log::info!("presence expired for {}", user_id);
            self.records.remove(user_id);
        }
        if !expired.is_empty() {
            self.notify();
        }
        expired
    }

    /// Drop every record.
    pub fn clear(&mut self) {
        if self.records.is_empty() {
            return;
        }
        self.records.clear();
        self.notify();
    }

    pub fn get(&self, user_id: &str) -> Option<&Presence> {
        self.records.get(user_id)
    }

    pub fn contains(&self, user_id: &str) -> bool {
        self.records.contains_key(user_id)
    }

    pub fn roster(&self) -> Vec<Presence> {
        self.records.values().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    fn notify(&mut self) {
        if self.listeners.is_empty() {
            return;
        }
        let roster = self.roster();
        for (_, listener) in &mut self.listeners {
            listener(&roster);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;
    use std::rc::Rc;

    fn peer(id: &str) -> Peer {
        Peer {
            user_id: id.to_string(),
            name: id.to_uppercase(),
            color: "#123456".to_string(),
        }
    }

    #[test]
    fn test_expiry_after_next_sweep() {
        let mut presence = PresenceManager::new(60_000.0, 30_000.0);
        presence.join(&peer("a"), 0.0);
        presence.tick(0.0);

        let mut t = 0.0;
        while t <= 61_000.0 {
            presence.tick(t);
            t += 1_000.0;
        }
        // Last sweep ran at 60s, when the record was exactly at the limit
        assert!(presence.contains("a"));

        let purged = presence.tick(90_000.0);
        assert_eq!(purged, vec!["a".to_string()]);
        assert!(presence.is_empty());
    }

    #[test]
    fn test_activity_keeps_record_alive() {
        let mut presence = PresenceManager::new(60_000.0, 30_000.0);
        presence.join(&peer("a"), 0.0);
        presence.update_cursor("a", CursorPosition::new(1.0, 2.0), 50_000.0);
        assert!(presence.sweep(100_000.0).is_empty());
        assert_eq!(presence.get("a").unwrap().cursor, CursorPosition::new(1.0, 2.0));
    }

    #[test]
    fn test_subscribers_notified() {
        let mut presence = PresenceManager::new(60_000.0, 30_000.0);
        let seen = Rc::new(RefCell::new(Vec::new()));
        let sink = seen.clone();
        let sub = presence.subscribe(move |roster| sink.borrow_mut().push(roster.len()));

        presence.join(&peer("a"), 0.0);
        presence.join(&peer("b"), 0.0);
        presence.update_selection("a", ["e1".to_string()], 1.0);
        presence.sweep(120_000.0);
        assert_eq!(*seen.borrow(), vec![1, 2, 2, 0]);

        presence.unsubscribe(sub);
        presence.join(&peer("c"), 0.0);
        assert_eq!(seen.borrow().len(), 4);
    }

    #[test]
    fn test_unknown_user_updates_ignored() {
        let mut presence = PresenceManager::new(60_000.0, 30_000.0);
        assert!(!presence.update_cursor("ghost", CursorPosition::default(), 0.0));
        assert!(!presence.update_selection("ghost", Vec::new(), 0.0));
        assert!(presence.remove("ghost").is_none());
    }
}
