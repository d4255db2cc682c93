//! Tool state machine: turns pointer input into scene edits and selection changes.

mod brush;
mod pen;

pub use brush::BrushStroke;
pub use pen::{PenPolygon, PenStep, polygon_element};

use kurbo::{Point, Vec2};
use serde::{Deserialize, Serialize};
use std::borrow::Cow;

use crate::config::{EditorConfig, SizeRange};
use crate::element::{Element, ElementId, ElementPatch, generate_id, kind};
use crate::geometry::{element_bounds, translation_patch};
use crate::input::Modifiers;
use crate::scene::Scene;
use crate::selection::Selection;

/// Available tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ToolKind {
    Select,
    Brush,
    Pen,
    Rectangle,
    Ellipse,
}

impl ToolKind {
    pub const ALL: [ToolKind; 5] = [
        ToolKind::Select,
        ToolKind::Brush,
        ToolKind::Pen,
        ToolKind::Rectangle,
        ToolKind::Ellipse,
    ];

    /// Single-letter activation key.
    pub fn key(&self) -> char {
        match self {
            ToolKind::Select => 'v',
            ToolKind::Brush => 'b',
            ToolKind::Pen => 'p',
            ToolKind::Rectangle => 'r',
            ToolKind::Ellipse => 'e',
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ToolKind::Select => "Select",
            ToolKind::Brush => "Brush",
            ToolKind::Pen => "Pen",
            ToolKind::Rectangle => "Rectangle",
            ToolKind::Ellipse => "Ellipse",
        }
    }
}

/// Shape drawn by dragging out a box.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShapeKind {
    Rectangle,
    Ellipse,
}

/// Which tool color to change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColorTarget {
    Fill,
    Stroke,
}

impl ColorTarget {
    pub fn attribute(&self) -> &'static str {
        match self {
            ColorTarget::Fill => "fill",
            ColorTarget::Stroke => "stroke",
        }
    }
}

/// State of the current tool interaction.
#[derive(Debug, Clone, Default)]
pub enum ToolState {
    #[default]
    Idle,
    DrawingBrush(BrushStroke),
    DrawingShape {
        kind: ShapeKind,
        id: ElementId,
        anchor: Point,
        current: Point,
    },
    CollectingPenPoints(PenPolygon),
    DraggingSelection {
        /// Pointer position minus the bounding-box origin of the clicked element.
        offset: Vec2,
        /// Bounding-box origin of the clicked element when the drag began.
        origin: Point,
        /// Selected elements as they were when the drag began.
        originals: Vec<Element>,
    },
}

/// A finished edit to record and broadcast.
#[derive(Debug, Clone, PartialEq)]
pub enum Commit {
    Create(Element),
    Move(Vec<(ElementId, ElementPatch)>),
}

/// What a pointer event did.
#[derive(Debug, Clone, PartialEq)]
pub enum ToolEffect {
    None,
    /// The in-progress preview changed.
    Preview,
    SelectionChanged,
    /// Live drag positions, applied without recording history.
    Drag(Vec<(ElementId, ElementPatch)>),
    Commit(Commit),
}

/// Manages the active tool, its settings and its state.
#[derive(Debug, Clone)]
pub struct ToolManager {
    active: Option<ToolKind>,
    state: ToolState,
    brush_size: f64,
    pen_size: f64,
    fill_color: String,
    stroke_color: String,
    brush_range: SizeRange,
    pen_range: SizeRange,
    brush_flush_points: usize,
    pen_close_distance: f64,
}

impl Default for ToolManager {
    fn default() -> Self {
        Self::new(&EditorConfig::default())
    }
}

impl ToolManager {
    pub fn new(config: &EditorConfig) -> Self {
        Self {
            active: None,
            state: ToolState::Idle,
            brush_size: config.brush_size.default,
            pen_size: config.pen_size.default,
            fill_color: config.fill_color.clone(),
            stroke_color: config.stroke_color.clone(),
            brush_range: config.brush_size,
            pen_range: config.pen_size,
            brush_flush_points: config.brush_flush_points,
            pen_close_distance: config.pen_close_distance,
        }
    }

    pub fn active(&self) -> Option<ToolKind> {
        self.active
    }

    /// Change the active tool. Any interaction in progress is dropped.
    pub fn set_tool(&mut self, tool: Option<ToolKind>) {
        if self.active != tool {
            log::debug!("tool changed: {:?} -> {:?}", self.active, tool);
        }
        self.active = tool;
        self.state = ToolState::Idle;
    }

    pub fn state(&self) -> &ToolState {
        &self.state
    }

    pub fn is_idle(&self) -> bool {
        matches!(self.state, ToolState::Idle)
    }

    pub fn brush_size(&self) -> f64 {
        self.brush_size
    }

    pub fn set_brush_size(&mut self, size: f64) {
        self.brush_size = self.brush_range.clamp(size);
        self.restyle_brush();
    }

    pub fn pen_size(&self) -> f64 {
        self.pen_size
    }

    pub fn set_pen_size(&mut self, size: f64) {
        self.pen_size = self.pen_range.clamp(size);
    }

    pub fn fill_color(&self) -> &str {
        &self.fill_color
    }

    pub fn stroke_color(&self) -> &str {
        &self.stroke_color
    }

    pub fn set_color(&mut self, target: ColorTarget, color: impl Into<String>) {
        match target {
            ColorTarget::Fill => self.fill_color = color.into(),
            ColorTarget::Stroke => self.stroke_color = color.into(),
        }
        self.restyle_brush();
    }

    fn restyle_brush(&mut self) {
        if let ToolState::DrawingBrush(stroke) = &mut self.state {
            stroke.restyle(&self.fill_color, self.brush_size);
        }
    }

    /// Abort the in-progress interaction.
    /// Returns true if a pen polygon was discarded.
    pub fn cancel(&mut self) -> bool {
        let had_polygon = matches!(&self.state, ToolState::CollectingPenPoints(pen) if !pen.is_empty());
        self.state = ToolState::Idle;
        had_polygon
    }

    /// Pointer pressed at `point` (scene coordinates).
    pub fn pointer_down(
        &mut self,
        point: Point,
        modifiers: Modifiers,
        scene: &Scene,
        selection: &mut Selection,
    ) -> ToolEffect {
        let Some(tool) = self.active else {
            return ToolEffect::None;
        };
        match tool {
            ToolKind::Select => self.begin_select(point, modifiers, scene, selection),
            ToolKind::Brush => {
                let stroke = BrushStroke::begin(
                    point,
                    self.brush_flush_points,
                    &self.fill_color,
                    self.brush_size,
                );
                self.state = ToolState::DrawingBrush(stroke);
                ToolEffect::Preview
            }
            ToolKind::Rectangle | ToolKind::Ellipse => {
                let (shape, prefix) = if tool == ToolKind::Rectangle {
                    (ShapeKind::Rectangle, "rect")
                } else {
                    (ShapeKind::Ellipse, "ellipse")
                };
                self.state = ToolState::DrawingShape {
                    kind: shape,
                    id: generate_id(prefix),
                    anchor: point,
                    current: point,
                };
                ToolEffect::Preview
            }
            ToolKind::Pen => self.pen_click(point),
        }
    }

    /// Pointer moved to `point` (scene coordinates).
    pub fn pointer_move(&mut self, point: Point) -> ToolEffect {
        if matches!(self.state, ToolState::DraggingSelection { .. }) {
            return ToolEffect::Drag(self.drag_patches(point));
        }
        match &mut self.state {
            ToolState::Idle => ToolEffect::None,
            ToolState::DrawingBrush(stroke) => {
                stroke.push(point);
                ToolEffect::Preview
            }
            ToolState::DrawingShape { current, .. } => {
                *current = point;
                ToolEffect::Preview
            }
            ToolState::CollectingPenPoints(pen) => {
                pen.hover(point);
                ToolEffect::Preview
            }
            ToolState::DraggingSelection { .. } => ToolEffect::None,
        }
    }

    /// Pointer released at `point` (scene coordinates).
    pub fn pointer_up(&mut self, point: Point) -> ToolEffect {
        // Pen vertices persist across clicks
        if matches!(self.state, ToolState::CollectingPenPoints(_)) {
            return ToolEffect::None;
        }
        if matches!(self.state, ToolState::DraggingSelection { .. }) {
            let moved = self.drag_patches(point);
            let delta = self.drag_delta(point);
            self.state = ToolState::Idle;
            if delta == Vec2::ZERO || moved.is_empty() {
                return ToolEffect::None;
            }
            return ToolEffect::Commit(Commit::Move(moved));
        }

        match std::mem::take(&mut self.state) {
            ToolState::DrawingBrush(mut stroke) => {
                stroke.flush();
                if stroke.segments() == 0 {
                    return ToolEffect::None;
                }
                ToolEffect::Commit(Commit::Create(stroke.to_element()))
            }
            ToolState::DrawingShape {
                kind: shape,
                id,
                anchor,
                ..
            } => {
                if anchor == point {
                    log::debug!("discarding zero-size shape {}", id);
                    return ToolEffect::None;
                }
                ToolEffect::Commit(Commit::Create(self.shape_element(shape, id, anchor, point)))
            }
            _ => ToolEffect::None,
        }
    }

    /// Element for the interaction in progress, if any.
    pub fn preview(&self) -> Option<Cow<'_, Element>> {
        match &self.state {
            ToolState::DrawingBrush(stroke) => Some(Cow::Borrowed(stroke.preview())),
            ToolState::DrawingShape {
                kind: shape,
                id,
                anchor,
                current,
            } => Some(Cow::Owned(self.shape_element(*shape, id.clone(), *anchor, *current))),
            ToolState::CollectingPenPoints(pen) => {
                let d = pen.preview_path()?;
                let mut element = Element::new("pen-preview", kind::PATH)
                    .with_attr("d", d)
                    .with_attr("fill", "none")
                    .with_attr("stroke", self.stroke_color.clone());
                element.set_number("stroke-width", self.pen_size);
                Some(Cow::Owned(element))
            }
            _ => None,
        }
    }

    fn begin_select(
        &mut self,
        point: Point,
        modifiers: Modifiers,
        scene: &Scene,
        selection: &mut Selection,
    ) -> ToolEffect {
        let hit = scene
            .element_at(point)
            .filter(|el| el.is_draggable())
            .and_then(|el| element_bounds(el).map(|b| (el.id.clone(), b.origin())));

        let Some((id, origin)) = hit else {
            self.state = ToolState::Idle;
            if modifiers.shift {
                return ToolEffect::None;
            }
            selection.clear();
            return ToolEffect::SelectionChanged;
        };

        if modifiers.shift {
            selection.toggle(&id);
        } else {
            selection.set_selected([id]);
        }

        let originals = selection
            .ids()
            .iter()
            .filter_map(|id| scene.get(id).cloned())
            .collect();
        self.state = ToolState::DraggingSelection {
            offset: point - origin,
            origin,
            originals,
        };
        ToolEffect::SelectionChanged
    }

    fn drag_delta(&self, point: Point) -> Vec2 {
        match &self.state {
            ToolState::DraggingSelection { offset, origin, .. } => (point - *offset) - *origin,
            _ => Vec2::ZERO,
        }
    }

    fn drag_patches(&self, point: Point) -> Vec<(ElementId, ElementPatch)> {
        let ToolState::DraggingSelection { originals, .. } = &self.state else {
            return Vec::new();
        };
        let delta = self.drag_delta(point);
        originals
            .iter()
            .filter_map(|el| translation_patch(el, delta).map(|patch| (el.id.clone(), patch)))
            .collect()
    }

    fn pen_click(&mut self, point: Point) -> ToolEffect {
        if !matches!(self.state, ToolState::CollectingPenPoints(_)) {
            self.state = ToolState::CollectingPenPoints(PenPolygon::new());
        }
        let ToolState::CollectingPenPoints(pen) = &mut self.state else {
            return ToolEffect::None;
        };
        match pen.click(point, self.pen_close_distance) {
            PenStep::Extended => ToolEffect::Preview,
            PenStep::Closed(points) => {
                let element =
                    polygon_element(&points, &self.fill_color, &self.stroke_color, self.pen_size);
                ToolEffect::Commit(Commit::Create(element))
            }
        }
    }

    fn shape_element(&self, shape: ShapeKind, id: ElementId, anchor: Point, current: Point) -> Element {
        let dx = (current.x - anchor.x).abs();
        let dy = (current.y - anchor.y).abs();
        let mut element = match shape {
            ShapeKind::Rectangle => {
                let mut el = Element::new(id, kind::RECT);
                el.set_number("x", anchor.x.min(current.x));
                el.set_number("y", anchor.y.min(current.y));
                el.set_number("width", dx);
                el.set_number("height", dy);
                el
            }
            ShapeKind::Ellipse => {
                let mut el = Element::new(id, kind::ELLIPSE);
                el.set_number("cx", anchor.x);
                el.set_number("cy", anchor.y);
                el.set_number("rx", dx);
                el.set_number("ry", dy);
                el
            }
        };
        element.set_attr("fill", self.fill_color.clone());
        element.set_attr("stroke", self.stroke_color.clone());
        element
    }
}
