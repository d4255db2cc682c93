//! Freehand brush stroke accumulation.

use kurbo::Point;

use crate::element::{Element, generate_id, kind};
use crate::geometry::{extend_path, polyline_path};

/// A brush stroke in progress.
///
/// Points are buffered and written into the path description in batches.
/// The live element grows one segment per point, so drawing the preview
/// never rebuilds the path.
#[derive(Debug, Clone)]
pub struct BrushStroke {
    d: String,
    pending: Vec<Point>,
    segments: usize,
    flush_every: usize,
    live: Element,
}

impl BrushStroke {
    pub fn begin(start: Point, flush_every: usize, color: &str, width: f64) -> Self {
        let d = polyline_path(&[start], false);
        let mut live = Element::new(generate_id("brush"), kind::PATH)
            .with_attr("d", d.clone())
            .with_attr("fill", "none")
            .with_attr("stroke-linecap", "round")
            .with_attr("stroke-linejoin", "round");
        style(&mut live, color, width);
        Self {
            d,
            pending: Vec::new(),
            segments: 0,
            flush_every: flush_every.max(1),
            live,
        }
    }

    pub fn id(&self) -> &str {
        &self.live.id
    }

    /// Append a point, flushing the buffer when it is full.
    pub fn push(&mut self, point: Point) {
        if let Some(d) = self.live.attributes.get_mut("d") {
            extend_path(d, &[point]);
        }
        self.pending.push(point);
        self.segments += 1;
        if self.pending.len() >= self.flush_every {
            self.flush();
        }
    }

    /// Write buffered points into the description.
    pub fn flush(&mut self) {
        extend_path(&mut self.d, &self.pending);
        self.pending.clear();
    }

    /// Flushed description plus any buffered points.
    pub fn description(&self) -> &str {
        self.live.attr("d").unwrap_or_default()
    }

    /// Description as written so far, without the buffer.
    pub fn flushed(&self) -> &str {
        &self.d
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }

    /// Line segments drawn so far.
    pub fn segments(&self) -> usize {
        self.segments
    }

    /// Change colour or width mid-stroke.
    pub fn restyle(&mut self, color: &str, width: f64) {
        style(&mut self.live, color, width);
    }

    /// The stroke as drawn so far.
    pub fn preview(&self) -> &Element {
        &self.live
    }

    /// Build the path element for this stroke.
    pub fn to_element(&self) -> Element {
        self.live.clone()
    }
}

fn style(element: &mut Element, color: &str, width: f64) {
    element.set_attr("stroke", color);
    element.set_number("stroke-width", width);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flushes_in_batches() {
        let mut stroke = BrushStroke::begin(Point::new(0.0, 0.0), 32, "#000000", 20.0);
        for i in 1..=31 {
            stroke.push(Point::new(i as f64, 0.0));
        }
        assert_eq!(stroke.flushed(), "M 0,0");
        assert_eq!(stroke.pending_len(), 31);

        stroke.push(Point::new(32.0, 0.0));
        assert_eq!(stroke.pending_len(), 0);
        assert!(stroke.flushed().ends_with("L 32,0"));
        assert_eq!(stroke.segments(), 32);
    }

    #[test]
    fn test_description_includes_buffer() {
        let mut stroke = BrushStroke::begin(Point::new(1.0, 1.0), 32, "#ff0000", 20.0);
        stroke.push(Point::new(2.0, 3.0));
        assert_eq!(stroke.description(), "M 1,1 L 2,3");
    }

    #[test]
    fn test_element_attributes() {
        let mut stroke = BrushStroke::begin(Point::new(1.0, 1.0), 32, "#ff0000", 20.0);
        stroke.push(Point::new(5.0, 5.0));
        let el = stroke.to_element();

        assert_eq!(el.kind, kind::PATH);
        assert!(el.id.starts_with("brush-"));
        assert_eq!(el.attr("fill"), Some("none"));
        assert_eq!(el.attr("stroke"), Some("#ff0000"));
        assert_eq!(el.attr("stroke-width"), Some("20"));
        assert_eq!(el.attr("stroke-linecap"), Some("round"));
        assert_eq!(el.attr("stroke-linejoin"), Some("round"));
    }

    #[test]
    fn test_preview_grows_in_place() {
        let mut stroke = BrushStroke::begin(Point::new(0.0, 0.0), 2, "#000000", 4.0);
        stroke.push(Point::new(1.0, 0.0));
        assert_eq!(stroke.preview().attr("d"), Some("M 0,0 L 1,0"));
        assert_eq!(stroke.flushed(), "M 0,0");

        stroke.push(Point::new(2.0, 0.0));
        stroke.push(Point::new(3.0, 1.0));
        assert_eq!(stroke.preview().attr("d"), Some("M 0,0 L 1,0 L 2,0 L 3,1"));
        assert_eq!(stroke.flushed(), "M 0,0 L 1,0 L 2,0");

        stroke.restyle("#123456", 8.0);
        assert_eq!(stroke.preview().attr("stroke"), Some("#123456"));
        assert_eq!(stroke.preview().attr("stroke-width"), Some("8"));
        assert_eq!(stroke.to_element(), *stroke.preview());
    }
}
