//! Selection manager.

use kurbo::Rect;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::element::ElementId;

/// Set of selected element ids, ordered for stable iteration.
pub type SelectionSet = BTreeSet<ElementId>;

/// The local participant's selection.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Selection {
    elements: SelectionSet,
    anchors: BTreeSet<String>,
    bounds: Option<Rect>,
}

impl Selection {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the selected elements.
    pub fn set_selected(&mut self, ids: impl IntoIterator<Item = ElementId>) {
        self.elements = ids.into_iter().collect();
    }

    /// Replace the selection with a function of the previous one.
    pub fn update(&mut self, f: impl FnOnce(&SelectionSet) -> SelectionSet) {
        self.elements = f(&self.elements);
    }

    /// Add `id` if absent, remove it if present.
    pub fn toggle(&mut self, id: &str) {
        if !self.elements.remove(id) {
            self.elements.insert(id.to_string());
        }
    }

    /// Drop one id. Returns true if it was selected.
    pub fn remove(&mut self, id: &str) -> bool {
        self.elements.remove(id)
    }

    /// Empty ids, anchors and bounds.
    pub fn clear(&mut self) {
        self.elements.clear();
        self.anchors.clear();
        self.bounds = None;
    }

    pub fn is_selected(&self, id: &str) -> bool {
        self.elements.contains(id)
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn ids(&self) -> &SelectionSet {
        &self.elements
    }

    pub fn anchors(&self) -> &BTreeSet<String> {
        &self.anchors
    }

    pub fn set_anchors(&mut self, anchors: impl IntoIterator<Item = String>) {
        self.anchors = anchors.into_iter().collect();
    }

    pub fn bounds(&self) -> Option<Rect> {
        self.bounds
    }

    pub fn set_bounds(&mut self, bounds: Option<Rect>) {
        self.bounds = bounds;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_clear() {
        let mut selection = Selection::new();
        selection.set_selected(["a".to_string(), "b".to_string()]);
        selection.set_anchors(["a:0".to_string()]);
        selection.set_bounds(Some(Rect::new(0.0, 0.0, 1.0, 1.0)));
        assert_eq!(selection.len(), 2);

        selection.clear();
        assert!(selection.is_empty());
        assert!(selection.anchors().is_empty());
        assert!(selection.bounds().is_none());
    }

    #[test]
    fn test_updater_form_toggles() {
        let mut selection = Selection::new();
        selection.set_selected(["a".to_string()]);
        selection.update(|prev| {
            let mut next = prev.clone();
            next.insert("b".to_string());
            next
        });
        assert!(selection.is_selected("a"));
        assert!(selection.is_selected("b"));
    }

    #[test]
    fn test_toggle() {
        let mut selection = Selection::new();
        selection.toggle("a");
        assert!(selection.is_selected("a"));
        selection.toggle("a");
        assert!(!selection.is_selected("a"));
        assert!(!selection.remove("a"));
    }
}
