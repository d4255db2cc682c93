//! Scene store: the canonical ordered collection of elements.

use kurbo::Point;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use thiserror::Error;

use crate::element::{Element, ElementId, ElementPatch};
use crate::geometry::element_bounds;

/// Full ordered list of elements at one instant.
pub type Snapshot = Vec<Element>;

/// Errors raised when decoding a scene snapshot.
#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("Invalid snapshot JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("Duplicate element id in snapshot: {0}")]
    DuplicateId(ElementId),
}

/// The live scene. Insertion order is paint order (back to front).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Scene {
    elements: HashMap<ElementId, Element>,
    order: Vec<ElementId>,
}

impl Scene {
    /// Create an empty scene.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an element at the top of the paint order.
    ///
    /// An element whose id already exists replaces the old one in place.
    pub fn add_element(&mut self, element: Element) {
        if !self.elements.contains_key(&element.id) {
            self.order.push(element.id.clone());
        }
        self.elements.insert(element.id.clone(), element);
    }

    /// Merge a partial update into an existing element.
    /// Returns false if no element has this id.
    pub fn update_element(&mut self, id: &str, patch: &ElementPatch) -> bool {
        match self.elements.get_mut(id) {
            Some(element) => {
                element.apply_patch(patch);
                true
            }
            None => false,
        }
    }

    /// Remove an element from the scene.
    pub fn remove_element(&mut self, id: &str) -> Option<Element> {
        let removed = self.elements.remove(id)?;
        self.order.retain(|other| other != id);
        Some(removed)
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    /// Remove every element.
    pub fn clear(&mut self) {
        self.elements.clear();
        self.order.clear();
    }

    /// Element ids in paint order.
    pub fn ids(&self) -> &[ElementId] {
        &self.order
    }

    /// Iterate elements in paint order.
    pub fn iter(&self) -> impl Iterator<Item = &Element> {
        self.order.iter().filter_map(|id| self.elements.get(id))
    }

    /// Capture the scene as a snapshot.
    pub fn export_state(&self) -> Snapshot {
        self.iter().cloned().collect()
    }

    /// Replace the scene contents with a snapshot.
    ///
    /// Later duplicates of an id replace earlier ones, keeping the first position.
    pub fn import_state(&mut self, snapshot: Snapshot) {
        self.clear();
        for element in snapshot {
            self.add_element(element);
        }
    }

    /// Build a scene from a snapshot.
    pub fn from_snapshot(snapshot: Snapshot) -> Self {
        let mut scene = Self::new();
        scene.import_state(snapshot);
        scene
    }

    /// Serialize the scene as a JSON snapshot.
    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&self.export_state())
    }

    /// Parse a JSON snapshot. Duplicate ids are rejected.
    pub fn from_json(json: &str) -> Result<Self, SnapshotError> {
        let snapshot: Snapshot = serde_json::from_str(json)?;
        let mut scene = Self::new();
        for element in snapshot {
            if scene.contains(&element.id) {
                return Err(SnapshotError::DuplicateId(element.id));
            }
            scene.add_element(element);
        }
        Ok(scene)
    }

    /// Topmost element whose bounds contain `point`.
    pub fn element_at(&self, point: Point) -> Option<&Element> {
        self.order
            .iter()
            .rev()
            .filter_map(|id| self.elements.get(id))
            .find(|el| element_bounds(el).is_some_and(|b| b.contains(point)))
    }
}

// Serialized form is the snapshot list.
impl Serialize for Scene {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(self.iter())
    }
}

impl<'de> Deserialize<'de> for Scene {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        Snapshot::deserialize(deserializer).map(Scene::from_snapshot)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::kind;

    fn rect(id: &str, x: f64, y: f64, w: f64, h: f64) -> Element {
        Element::new(id, kind::RECT)
            .with_attr("x", x.to_string())
            .with_attr("y", y.to_string())
            .with_attr("width", w.to_string())
            .with_attr("height", h.to_string())
    }

    #[test]
    fn test_add_and_remove() {
        let mut scene = Scene::new();
        scene.add_element(rect("a", 0.0, 0.0, 10.0, 10.0));
        scene.add_element(rect("b", 0.0, 0.0, 10.0, 10.0));
        assert_eq!(scene.len(), 2);
        assert_eq!(scene.ids(), ["a", "b"]);

        assert!(scene.remove_element("a").is_some());
        assert!(scene.remove_element("a").is_none());
        assert_eq!(scene.ids(), ["b"]);
    }

    #[test]
    fn test_add_existing_id_replaces_in_place() {
        let mut scene = Scene::new();
        scene.add_element(rect("a", 0.0, 0.0, 10.0, 10.0));
        scene.add_element(rect("b", 0.0, 0.0, 10.0, 10.0));
        scene.add_element(rect("a", 5.0, 5.0, 1.0, 1.0));

        assert_eq!(scene.len(), 2);
        assert_eq!(scene.ids(), ["a", "b"]);
        assert_eq!(scene.get("a").unwrap().attr("x"), Some("5"));
    }

    #[test]
    fn test_update_merges_attributes() {
        let mut scene = Scene::new();
        scene.add_element(rect("a", 0.0, 0.0, 10.0, 10.0).with_attr("fill", "#000"));

        assert!(scene.update_element("a", &ElementPatch::attributes([("stroke", "#fff")])));
        let el = scene.get("a").unwrap();
        assert_eq!(el.attr("fill"), Some("#000"));
        assert_eq!(el.attr("stroke"), Some("#fff"));

        assert!(!scene.update_element("missing", &ElementPatch::default()));
    }

    #[test]
    fn test_export_import_round_trip() {
        let mut scene = Scene::new();
        scene.add_element(rect("a", 1.0, 2.0, 3.0, 4.0));
        scene.add_element(Element::new("t", "text").with_attr("x", "3"));

        let exported = scene.export_state();
        let mut other = Scene::new();
        other.add_element(rect("z", 0.0, 0.0, 1.0, 1.0));
        other.import_state(exported.clone());

        assert_eq!(other, scene);
        assert_eq!(other.export_state(), exported);
    }

    #[test]
    fn test_json_round_trip() {
        let mut scene = Scene::new();
        scene.add_element(rect("a", 1.0, 2.0, 3.0, 4.0));
        let mut text = Element::new("t", "text");
        text.content = "hello".to_string();
        scene.add_element(text);

        let json = scene.to_json().unwrap();
        let restored = Scene::from_json(&json).unwrap();
        assert_eq!(restored, scene);
    }

    #[test]
    fn test_from_json_rejects_duplicates() {
        let json = r#"[{"id":"a","type":"rect"},{"id":"a","type":"path"}]"#;
        assert!(matches!(
            Scene::from_json(json),
            Err(SnapshotError::DuplicateId(id)) if id == "a"
        ));
        assert!(matches!(Scene::from_json("{"), Err(SnapshotError::Json(_))));
    }

    #[test]
    fn test_element_at_prefers_topmost() {
        let mut scene = Scene::new();
        scene.add_element(rect("bottom", 0.0, 0.0, 100.0, 100.0));
        scene.add_element(rect("top", 50.0, 50.0, 100.0, 100.0));

        assert_eq!(scene.element_at(Point::new(60.0, 60.0)).unwrap().id, "top");
        assert_eq!(scene.element_at(Point::new(10.0, 10.0)).unwrap().id, "bottom");
        assert!(scene.element_at(Point::new(500.0, 500.0)).is_none());
    }
}
