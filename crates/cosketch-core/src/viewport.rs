//! Viewport controller for zoom and pan.

use kurbo::{Affine, Point, Vec2};
use serde::{Deserialize, Serialize};

pub const DEFAULT_MIN_ZOOM: f64 = 0.1;
pub const DEFAULT_MAX_ZOOM: f64 = 10.0;

/// View transform applied to the scene.
///
/// Zoom is always kept inside `[min_zoom, max_zoom]`; the pan offset is
/// unconstrained.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Viewport {
    zoom: f64,
    pan_offset: Vec2,
    min_zoom: f64,
    max_zoom: f64,
}

impl Default for Viewport {
    fn default() -> Self {
        Self {
            zoom: 1.0,
            pan_offset: Vec2::ZERO,
            min_zoom: DEFAULT_MIN_ZOOM,
            max_zoom: DEFAULT_MAX_ZOOM,
        }
    }
}

impl Viewport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a viewport with custom zoom limits. Swapped limits are reordered.
    pub fn with_limits(min_zoom: f64, max_zoom: f64) -> Self {
        let (min_zoom, max_zoom) = if min_zoom <= max_zoom {
            (min_zoom, max_zoom)
        } else {
            (max_zoom, min_zoom)
        };
        let mut viewport = Self {
            min_zoom,
            max_zoom,
            ..Self::default()
        };
        viewport.set_zoom(1.0);
        viewport
    }

    pub fn zoom(&self) -> f64 {
        self.zoom
    }

    pub fn pan_offset(&self) -> Vec2 {
        self.pan_offset
    }

    pub fn min_zoom(&self) -> f64 {
        self.min_zoom
    }

    pub fn max_zoom(&self) -> f64 {
        self.max_zoom
    }

    /// Set the zoom level, clamped into the allowed range.
    pub fn set_zoom(&mut self, zoom: f64) {
        if zoom.is_nan() {
            return;
        }
        self.zoom = zoom.clamp(self.min_zoom, self.max_zoom);
    }

    pub fn set_pan_offset(&mut self, offset: Vec2) {
        self.pan_offset = offset;
    }

    /// Pan by a delta in screen coordinates.
    pub fn pan(&mut self, delta: Vec2) {
        self.pan_offset += delta;
    }

    /// Restore zoom 1 and no pan.
    pub fn reset(&mut self) {
        self.pan_offset = Vec2::ZERO;
        self.set_zoom(1.0);
    }

    /// World to screen transform.
    pub fn transform(&self) -> Affine {
        Affine::translate(self.pan_offset) * Affine::scale(self.zoom)
    }

    pub fn screen_to_world(&self, screen_point: Point) -> Point {
        self.transform().inverse() * screen_point
    }

    pub fn world_to_screen(&self, world_point: Point) -> Point {
        self.transform() * world_point
    }

    /// Zoom by `factor`, keeping the world point under `screen_point` fixed.
    pub fn zoom_at(&mut self, screen_point: Point, factor: f64) {
        let world_point = self.screen_to_world(screen_point);
        self.set_zoom(self.zoom * factor);

        let new_screen = self.world_to_screen(world_point);
        self.pan_offset += screen_point - new_screen;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_viewport() {
        let viewport = Viewport::new();
        assert_eq!(viewport.zoom(), 1.0);
        assert_eq!(viewport.pan_offset(), Vec2::ZERO);
    }

    #[test]
    fn test_set_zoom_clamps() {
        let mut viewport = Viewport::new();
        viewport.set_zoom(0.001);
        assert_eq!(viewport.zoom(), DEFAULT_MIN_ZOOM);
        viewport.set_zoom(1000.0);
        assert_eq!(viewport.zoom(), DEFAULT_MAX_ZOOM);
        viewport.set_zoom(f64::NAN);
        assert_eq!(viewport.zoom(), DEFAULT_MAX_ZOOM);
    }

    #[test]
    fn test_pan_is_unclamped() {
        let mut viewport = Viewport::new();
        viewport.set_pan_offset(Vec2::new(-1e6, 1e6));
        assert_eq!(viewport.pan_offset(), Vec2::new(-1e6, 1e6));
    }

    #[test]
    fn test_reset() {
        let mut viewport = Viewport::new();
        viewport.set_zoom(3.0);
        viewport.pan(Vec2::new(10.0, 20.0));
        viewport.reset();
        assert_eq!(viewport, Viewport::new());
    }

    #[test]
    fn test_screen_to_world() {
        let mut viewport = Viewport::new();
        viewport.set_pan_offset(Vec2::new(50.0, 100.0));
        viewport.set_zoom(2.0);
        let world = viewport.screen_to_world(Point::new(150.0, 300.0));
        assert!((world.x - 50.0).abs() < 1e-10);
        assert!((world.y - 100.0).abs() < 1e-10);

        let back = viewport.world_to_screen(world);
        assert!((back.x - 150.0).abs() < 1e-10);
        assert!((back.y - 300.0).abs() < 1e-10);
    }

    #[test]
    fn test_zoom_at_keeps_point_fixed() {
        let mut viewport = Viewport::new();
        let anchor = Point::new(200.0, 120.0);
        let before = viewport.screen_to_world(anchor);
        viewport.zoom_at(anchor, 2.5);
        let after = viewport.screen_to_world(anchor);

        assert!((viewport.zoom() - 2.5).abs() < 1e-10);
        assert!((before.x - after.x).abs() < 1e-9);
        assert!((before.y - after.y).abs() < 1e-9);
    }

    #[test]
    fn test_custom_limits() {
        let mut viewport = Viewport::with_limits(4.0, 2.0);
        assert_eq!(viewport.min_zoom(), 2.0);
        assert_eq!(viewport.zoom(), 2.0);
        viewport.set_zoom(10.0);
        assert_eq!(viewport.zoom(), 4.0);
    }
}
