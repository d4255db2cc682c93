//! Vector element definitions shared by the scene, history and sync layers.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

use crate::clock::Millis;

/// Element identifier, unique within a scene.
pub type ElementId = String;

/// Participant identifier assigned by the collaboration transport.
pub type UserId = String;

/// Named element properties (SVG attribute name -> value).
pub type Attributes = BTreeMap<String, String>;

/// Element type tags understood by the tools and the rendering layer.
pub mod kind {
    pub const RECT: &str = "rect";
    pub const ELLIPSE: &str = "ellipse";
    pub const PATH: &str = "path";

    /// Kinds that can be picked and dragged with the select tool.
    pub const DRAGGABLE: [&str; 3] = [RECT, ELLIPSE, PATH];
}

/// Generate a fresh element id such as `rect-1b4e…`.
pub fn generate_id(prefix: &str) -> ElementId {
    format!("{}-{}", prefix, Uuid::new_v4())
}

/// Format a coordinate for use as an attribute value.
///
/// Integral values print without a fractional part (`40`, not `40.0`).
pub fn format_number(value: f64) -> String {
    if value == 0.0 {
        // Avoid "-0"
        return "0".to_string();
    }
    format!("{}", value)
}

/// A single vector element as stored in the scene and in snapshots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Element {
    pub id: ElementId,
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub attributes: Attributes,
    #[serde(default)]
    pub content: String,
}

impl Element {
    /// Create an element with no attributes.
    pub fn new(id: impl Into<ElementId>, kind: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            kind: kind.into(),
            attributes: Attributes::new(),
            content: String::new(),
        }
    }

    /// Builder-style attribute setter.
    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.attributes.insert(name.to_string(), value.into());
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attributes.get(name).map(String::as_str)
    }

    /// Numeric attribute value, if present and parseable.
    pub fn attr_f64(&self, name: &str) -> Option<f64> {
        self.attr(name).and_then(|v| v.trim().parse::<f64>().ok())
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        self.attributes.insert(name.to_string(), value.into());
    }

    /// Set a numeric attribute using [`format_number`].
    pub fn set_number(&mut self, name: &str, value: f64) {
        self.set_attr(name, format_number(value));
    }

    pub fn is_draggable(&self) -> bool {
        kind::DRAGGABLE.contains(&self.kind.as_str())
    }

    /// Merge a partial update into this element.
    ///
    /// Top-level fields are replaced only when the patch carries them; attributes
    /// are merged key by key so unmentioned attributes survive.
    pub fn apply_patch(&mut self, patch: &ElementPatch) {
        if let Some(kind) = &patch.kind {
            self.kind = kind.clone();
        }
        if let Some(content) = &patch.content {
            self.content = content.clone();
        }
        for (name, value) in &patch.attributes {
            self.attributes.insert(name.clone(), value.clone());
        }
    }
}

/// A partial element update.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ElementPatch {
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub kind: Option<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

impl ElementPatch {
    /// Patch touching only the given attributes.
    pub fn attributes<K, V>(attrs: impl IntoIterator<Item = (K, V)>) -> Self
    where
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            attributes: attrs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            ..Self::default()
        }
    }

    pub fn with_content(mut self, content: impl Into<String>) -> Self {
        self.content = Some(content.into());
        self
    }

    pub fn is_empty(&self) -> bool {
        self.kind.is_none() && self.content.is_none() && self.attributes.is_empty()
    }
}

/// An element as held in the shared collaboration table, with sync metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ElementRecord {
    #[serde(flatten)]
    pub element: Element,
    pub last_modified_by: UserId,
    pub last_modified: Millis,
    pub sync_checksum: String,
}

impl ElementRecord {
    /// Wrap an element with fresh authorship metadata.
    pub fn stamped(element: Element, user: &str, at: Millis) -> Self {
        Self {
            element,
            last_modified_by: user.to_string(),
            last_modified: at,
            sync_checksum: checksum(user, at),
        }
    }

    pub fn id(&self) -> &str {
        &self.element.id
    }

    /// Re-stamp after a local modification.
    pub fn restamp(&mut self, user: &str, at: Millis) {
        self.last_modified_by = user.to_string();
        self.last_modified = at;
        self.sync_checksum = checksum(user, at);
    }
}

/// Checksum used to detect which write a record reflects.
pub fn checksum(user: &str, at: Millis) -> String {
    format!("{}-{}", user, at)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(40.0), "40");
        assert_eq!(format_number(-0.0), "0");
        assert_eq!(format_number(12.5), "12.5");
    }

    #[test]
    fn test_patch_merges_attributes() {
        let mut el = Element::new("r1", kind::RECT)
            .with_attr("fill", "#000")
            .with_attr("x", "1");
        el.apply_patch(&ElementPatch::attributes([("stroke", "#fff")]));

        assert_eq!(el.attr("fill"), Some("#000"));
        assert_eq!(el.attr("stroke"), Some("#fff"));
        assert_eq!(el.attr("x"), Some("1"));
        assert_eq!(el.kind, kind::RECT);
    }

    #[test]
    fn test_patch_replaces_top_level_fields() {
        let mut el = Element::new("t1", "text");
        el.apply_patch(&ElementPatch::default().with_content("hello"));
        assert_eq!(el.content, "hello");
        assert!(ElementPatch::default().is_empty());
    }

    #[test]
    fn test_record_serializes_flat() {
        let record = ElementRecord::stamped(Element::new("e1", kind::PATH), "alice", 12.5);
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["id"], "e1");
        assert_eq!(json["type"], "path");
        assert_eq!(json["last_modified_by"], "alice");
        assert_eq!(json["sync_checksum"], "alice-12.5");
    }

    #[test]
    fn test_generated_ids_are_unique() {
        let a = generate_id("rect");
        let b = generate_id("rect");
        assert!(a.starts_with("rect-"));
        assert_ne!(a, b);
    }
}
