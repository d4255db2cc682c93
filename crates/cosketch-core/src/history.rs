//! Bounded whole-scene undo/redo history.

use std::collections::VecDeque;

use crate::scene::{Scene, Snapshot};

/// Default number of undo states to keep.
pub const DEFAULT_MAX_HISTORY: usize = 50;

/// Snapshot history with a bounded past.
///
/// `present` mirrors the scene as of the last recorded edit. Recording a new
/// edit clears the redo future.
#[derive(Debug, Clone)]
pub struct History {
    past: VecDeque<Snapshot>,
    present: Snapshot,
    future: VecDeque<Snapshot>,
    capacity: usize,
}

impl Default for History {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_HISTORY)
    }
}

impl History {
    /// Create an empty history keeping at most `capacity` undo states.
    pub fn new(capacity: usize) -> Self {
        Self {
            past: VecDeque::new(),
            present: Snapshot::new(),
            future: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    /// Record the live scene as a new history entry.
    pub fn add_to_history(&mut self, scene: &Scene) {
        if self.past.len() >= self.capacity {
            self.past.pop_front();
        }
        let previous = std::mem::replace(&mut self.present, scene.export_state());
        self.past.push_back(previous);
        self.future.clear();
    }

    /// Step back one entry and apply it to the scene.
    /// Returns false if there is nothing to undo.
    pub fn undo(&mut self, scene: &mut Scene) -> bool {
        let Some(previous) = self.past.pop_back() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, previous);
        self.future.push_front(current);
        scene.import_state(self.present.clone());
        true
    }

    /// Step forward one entry and apply it to the scene.
    /// Returns false if there is nothing to redo.
    pub fn redo(&mut self, scene: &mut Scene) -> bool {
        let Some(next) = self.future.pop_front() else {
            return false;
        };
        let current = std::mem::replace(&mut self.present, next);
        self.past.push_back(current);
        scene.import_state(self.present.clone());
        true
    }

    pub fn can_undo(&self) -> bool {
        !self.past.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.future.is_empty()
    }

    /// Drop all entries.
    pub fn reset(&mut self) {
        self.past.clear();
        self.present.clear();
        self.future.clear();
    }

    /// Drop all entries and start over from the live scene.
    pub fn reset_to(&mut self, scene: &Scene) {
        self.reset();
        self.present = scene.export_state();
    }

    /// Replace the present entry with the live scene without recording an
    /// undo step. Used when remote edits change the scene underneath.
    pub fn refresh_present(&mut self, scene: &Scene) {
        self.present = scene.export_state();
    }

    pub fn present(&self) -> &Snapshot {
        &self.present
    }

    pub fn undo_len(&self) -> usize {
        self.past.len()
    }

    pub fn redo_len(&self) -> usize {
        self.future.len()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Element, kind};

    fn edit(scene: &mut Scene, history: &mut History, n: usize) {
        scene.add_element(Element::new(format!("e{n}"), kind::RECT));
        history.add_to_history(scene);
    }

    #[test]
    fn test_undo_redo_inverse() {
        let mut scene = Scene::new();
        let mut history = History::default();
        for n in 0..3 {
            edit(&mut scene, &mut history, n);
        }
        let before = scene.export_state();

        assert!(history.undo(&mut scene));
        assert_eq!(scene.len(), 2);
        assert!(history.redo(&mut scene));
        assert_eq!(scene.export_state(), before);
    }

    #[test]
    fn test_undo_all_then_redo_all() {
        let mut scene = Scene::new();
        let mut history = History::default();
        let empty = scene.export_state();
        let edits = 5;
        for n in 0..edits {
            edit(&mut scene, &mut history, n);
        }
        let last = scene.export_state();

        for _ in 0..edits {
            assert!(history.undo(&mut scene));
        }
        assert!(!history.undo(&mut scene));
        assert_eq!(scene.export_state(), empty);

        for _ in 0..edits {
            assert!(history.redo(&mut scene));
        }
        assert!(!history.redo(&mut scene));
        assert_eq!(scene.export_state(), last);
    }

    #[test]
    fn test_undo_on_empty_is_noop() {
        let mut scene = Scene::new();
        let mut history = History::default();
        assert!(!history.can_undo());
        assert!(!history.undo(&mut scene));
        assert!(!history.redo(&mut scene));
        assert!(scene.is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut scene = Scene::new();
        let mut history = History::default();
        let mut snapshots = Vec::new();
        for n in 0..60 {
            edit(&mut scene, &mut history, n);
            snapshots.push(scene.export_state());
        }
        assert_eq!(history.undo_len(), DEFAULT_MAX_HISTORY);

        for _ in 0..DEFAULT_MAX_HISTORY {
            assert!(history.undo(&mut scene));
        }
        assert!(!history.undo(&mut scene));
        // Edit 10 (index 9) is the oldest state still reachable
        assert_eq!(scene.export_state(), snapshots[9]);
    }

    #[test]
    fn test_new_edit_invalidates_redo() {
        let mut scene = Scene::new();
        let mut history = History::default();
        edit(&mut scene, &mut history, 0);
        edit(&mut scene, &mut history, 1);

        assert!(history.undo(&mut scene));
        assert!(history.can_redo());

        edit(&mut scene, &mut history, 2);
        assert!(!history.can_redo());
        assert!(!history.redo(&mut scene));
    }

    #[test]
    fn test_reset_to_seeds_present() {
        let mut scene = Scene::new();
        let mut history = History::default();
        edit(&mut scene, &mut history, 0);
        edit(&mut scene, &mut history, 1);

        history.reset_to(&scene);
        assert!(!history.can_undo());
        assert_eq!(history.present(), &scene.export_state());

        edit(&mut scene, &mut history, 2);
        assert!(history.undo(&mut scene));
        assert_eq!(scene.len(), 2);
    }
}
