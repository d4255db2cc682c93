//! Rendering layer contract and the scene-diff reconciler that drives it.
//!
//! The scene is the source of truth. A [`RenderReconciler`] remembers what the
//! layer currently shows and pushes only the differences after each change.

use kurbo::Rect;
use std::collections::{BTreeSet, HashMap};

use crate::element::{Attributes, Element, ElementId};
use crate::geometry::element_bounds;
use crate::scene::Scene;
use crate::selection::Selection;

/// Primitives a host renderer must provide.
pub trait RenderLayer {
    /// Instantiate a primitive for `element.kind`, set its attributes and
    /// content, and register it by id on top of the paint order.
    fn create(&mut self, element: &Element);

    /// Replace all attributes of a registered element.
    fn set_attributes(&mut self, id: &str, attributes: &Attributes);

    /// Replace the text content of a registered element.
    fn set_content(&mut self, id: &str, content: &str);

    fn remove(&mut self, id: &str);

    fn contains(&self, id: &str) -> bool;

    fn bounding_box(&self, id: &str) -> Option<Rect>;

    /// Restack registered elements back to front.
    fn set_order(&mut self, order: &[ElementId]);

    /// Toggle selection emphasis on one element.
    fn set_emphasis(&mut self, id: &str, emphasized: bool);

    /// Remove selection emphasis from every element.
    fn clear_emphasis(&mut self);

    /// Show or hide the in-progress tool preview.
    fn set_preview(&mut self, preview: Option<&Element>);
}

/// Tracks the state last pushed to a [`RenderLayer`].
#[derive(Debug, Default)]
pub struct RenderReconciler {
    rendered: HashMap<ElementId, Element>,
    order: Vec<ElementId>,
    emphasized: BTreeSet<ElementId>,
}

impl RenderReconciler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Push scene differences to the layer.
    pub fn sync_scene(&mut self, scene: &Scene, layer: &mut dyn RenderLayer) {
        let stale: Vec<ElementId> = self
            .rendered
            .keys()
            .filter(|id| !scene.contains(id))
            .cloned()
            .collect();
        for id in stale {
            layer.remove(&id);
            self.rendered.remove(&id);
            self.emphasized.remove(&id);
        }

        for element in scene.iter() {
            match self.rendered.get(&element.id) {
                None => layer.create(element),
                Some(previous) if previous.kind != element.kind || !layer.contains(&element.id) => {
                    layer.remove(&element.id);
                    layer.create(element);
                }
                Some(previous) => {
                    if previous.attributes != element.attributes {
                        layer.set_attributes(&element.id, &element.attributes);
                    }
                    if previous.content != element.content {
                        layer.set_content(&element.id, &element.content);
                    }
                }
            }
            self.rendered.insert(element.id.clone(), element.clone());
        }

        if self.order != scene.ids() {
            self.order = scene.ids().to_vec();
            layer.set_order(&self.order);
        }
    }

    /// Push selection emphasis differences to the layer.
    pub fn sync_selection(&mut self, selection: &Selection, layer: &mut dyn RenderLayer) {
        if selection.is_empty() {
            if !self.emphasized.is_empty() {
                layer.clear_emphasis();
                self.emphasized.clear();
            }
            return;
        }
        let dropped: Vec<ElementId> = self
            .emphasized
            .iter()
            .filter(|id| !selection.is_selected(id))
            .cloned()
            .collect();
        for id in dropped {
            layer.set_emphasis(&id, false);
            self.emphasized.remove(&id);
        }
        for id in selection.ids() {
            if self.rendered.contains_key(id) && self.emphasized.insert(id.clone()) {
                layer.set_emphasis(id, true);
            }
        }
    }

    /// Forget everything pushed so far; the next sync recreates all elements.
    pub fn invalidate(&mut self) {
        self.rendered.clear();
        self.order.clear();
        self.emphasized.clear();
    }
}

/// Headless renderer that records the displayed scene in memory.
#[derive(Debug, Default)]
pub struct MemoryRenderer {
    elements: HashMap<ElementId, Element>,
    order: Vec<ElementId>,
    emphasized: BTreeSet<ElementId>,
    preview: Option<Element>,
    /// Number of primitive operations received.
    pub operations: usize,
}

impl MemoryRenderer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: &str) -> Option<&Element> {
        self.elements.get(id)
    }

    pub fn len(&self) -> usize {
        self.elements.len()
    }

    pub fn is_empty(&self) -> bool {
        self.elements.is_empty()
    }

    /// Displayed elements back to front.
    pub fn displayed(&self) -> Vec<&Element> {
        self.order
            .iter()
            .filter_map(|id| self.elements.get(id))
            .collect()
    }

    pub fn is_emphasized(&self, id: &str) -> bool {
        self.emphasized.contains(id)
    }

    pub fn preview(&self) -> Option<&Element> {
        self.preview.as_ref()
    }
}

impl RenderLayer for MemoryRenderer {
    fn create(&mut self, element: &Element) {
        self.operations += 1;
        if self.elements.insert(element.id.clone(), element.clone()).is_none() {
            self.order.push(element.id.clone());
        }
    }

    fn set_attributes(&mut self, id: &str, attributes: &Attributes) {
        self.operations += 1;
        match self.elements.get_mut(id) {
            Some(element) => element.attributes = attributes.clone(),
            None => log::warn!("render: set_attributes on unknown element {}", id),
        }
    }

    fn set_content(&mut self, id: &str, content: &str) {
        self.operations += 1;
        if let Some(element) = self.elements.get_mut(id) {
            element.content = content.to_string();
        }
    }

    fn remove(&mut self, id: &str) {
        self.operations += 1;
        self.elements.remove(id);
        self.order.retain(|other| other != id);
        self.emphasized.remove(id);
    }

    fn contains(&self, id: &str) -> bool {
        self.elements.contains_key(id)
    }

    fn bounding_box(&self, id: &str) -> Option<Rect> {
        self.elements.get(id).and_then(element_bounds)
    }

    fn set_order(&mut self, order: &[ElementId]) {
        self.operations += 1;
        let mut next: Vec<ElementId> = order
            .iter()
            .filter(|id| self.elements.contains_key(*id))
            .cloned()
            .collect();
        // Keep anything the caller did not mention on top
        for id in &self.order {
            if !next.contains(id) {
                next.push(id.clone());
            }
        }
        self.order = next;
    }

    fn set_emphasis(&mut self, id: &str, emphasized: bool) {
        self.operations += 1;
        if emphasized {
            self.emphasized.insert(id.to_string());
        } else {
            self.emphasized.remove(id);
        }
    }

    fn clear_emphasis(&mut self) {
        self.operations += 1;
        self.emphasized.clear();
    }

    fn set_preview(&mut self, preview: Option<&Element>) {
        self.preview = preview.cloned();
    }
}
