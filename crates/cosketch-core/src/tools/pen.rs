//! Click-by-click polygon construction.

use kurbo::Point;

use crate::element::{Element, generate_id, kind};
use crate::geometry::polyline_path;

/// Result of adding a vertex.
#[derive(Debug, Clone, PartialEq)]
pub enum PenStep {
    /// The vertex was appended; the polygon is still open.
    Extended,
    /// The click landed near the first vertex; these are the closed polygon's vertices.
    Closed(Vec<Point>),
}

/// Vertices collected by the pen tool.
#[derive(Debug, Clone, Default)]
pub struct PenPolygon {
    points: Vec<Point>,
    hover: Option<Point>,
}

impl PenPolygon {
    pub fn new() -> Self {
        Self::default()
    }

    /// Handle a click. With at least three vertices, a click strictly within
    /// `close_distance` of the first vertex closes the polygon and resets it.
    pub fn click(&mut self, point: Point, close_distance: f64) -> PenStep {
        if self.points.len() > 2 {
            if let Some(first) = self.points.first() {
                if first.distance(point) < close_distance {
                    self.hover = None;
                    return PenStep::Closed(std::mem::take(&mut self.points));
                }
            }
        }
        self.points.push(point);
        PenStep::Extended
    }

    /// Track the pointer for the rubber-band preview segment.
    pub fn hover(&mut self, point: Point) {
        if !self.points.is_empty() {
            self.hover = Some(point);
        }
    }

    pub fn points(&self) -> &[Point] {
        &self.points
    }

    pub fn is_empty(&self) -> bool {
        self.points.is_empty()
    }

    /// Drop all collected vertices.
    pub fn cancel(&mut self) {
        self.points.clear();
        self.hover = None;
    }

    /// Open preview path through the vertices and the hover point.
    pub fn preview_path(&self) -> Option<String> {
        if self.points.is_empty() {
            return None;
        }
        let mut points = self.points.clone();
        points.extend(self.hover);
        Some(polyline_path(&points, false))
    }
}

/// Build the closed polygon element.
pub fn polygon_element(points: &[Point], fill: &str, stroke: &str, width: f64) -> Element {
    let mut element = Element::new(generate_id("polygon"), kind::PATH)
        .with_attr("d", polyline_path(points, true))
        .with_attr("fill", fill)
        .with_attr("stroke", stroke);
    element.set_number("stroke-width", width);
    element
}
