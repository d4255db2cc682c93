//! Path descriptions and element bounds.

use kurbo::{Affine, BezPath, PathEl, Point, Rect, Shape, Vec2};

use crate::element::{Element, ElementPatch, format_number, kind};

fn push_point(out: &mut String, cmd: char, p: Point) {
    if !out.is_empty() {
        out.push(' ');
    }
    out.push(cmd);
    out.push(' ');
    out.push_str(&format_number(p.x));
    out.push(',');
    out.push_str(&format_number(p.y));
}

/// Build `M x,y L x,y …` from a list of points, optionally closed with `Z`.
pub fn polyline_path(points: &[Point], closed: bool) -> String {
    let mut out = String::new();
    let Some((first, rest)) = points.split_first() else {
        return out;
    };
    push_point(&mut out, 'M', *first);
    for p in rest {
        push_point(&mut out, 'L', *p);
    }
    if closed {
        out.push_str(" Z");
    }
    out
}

/// Append line segments to an existing description.
pub fn extend_path(d: &mut String, points: &[Point]) {
    for p in points {
        push_point(d, 'L', *p);
    }
}

/// Parse a path description. Returns `None` for malformed input.
pub fn parse_path(d: &str) -> Option<BezPath> {
    BezPath::from_svg(d).ok()
}

/// Serialize a path with absolute commands.
pub fn write_path(path: &BezPath) -> String {
    let mut out = String::new();
    for el in path.elements() {
        match *el {
            PathEl::MoveTo(p) => push_point(&mut out, 'M', p),
            PathEl::LineTo(p) => push_point(&mut out, 'L', p),
            PathEl::QuadTo(p1, p2) => {
                push_point(&mut out, 'Q', p1);
                out.push(' ');
                out.push_str(&format!("{},{}", format_number(p2.x), format_number(p2.y)));
            }
            PathEl::CurveTo(p1, p2, p3) => {
                push_point(&mut out, 'C', p1);
                for p in [p2, p3] {
                    out.push(' ');
                    out.push_str(&format!("{},{}", format_number(p.x), format_number(p.y)));
                }
            }
            PathEl::ClosePath => out.push_str(" Z"),
        }
    }
    out
}

/// Move every coordinate pair of a path description by `delta`.
///
/// Malformed descriptions are returned unchanged.
pub fn translate_path(d: &str, delta: Vec2) -> String {
    match parse_path(d) {
        Some(mut path) => {
            path.apply_affine(Affine::translate(delta));
            write_path(&path)
        }
        None => {
            log::warn!("cannot translate malformed path description {:?}", d);
            d.to_string()
        }
    }
}

/// Axis-aligned bounds of an element's geometry, if its kind has any.
pub fn element_bounds(element: &Element) -> Option<Rect> {
    match element.kind.as_str() {
        kind::RECT => {
            let x = element.attr_f64("x").unwrap_or(0.0);
            let y = element.attr_f64("y").unwrap_or(0.0);
            let w = element.attr_f64("width")?;
            let h = element.attr_f64("height")?;
            Some(Rect::new(x, y, x + w, y + h))
        }
        kind::ELLIPSE => {
            let cx = element.attr_f64("cx").unwrap_or(0.0);
            let cy = element.attr_f64("cy").unwrap_or(0.0);
            let rx = element.attr_f64("rx")?;
            let ry = element.attr_f64("ry")?;
            Some(Rect::new(cx - rx, cy - ry, cx + rx, cy + ry))
        }
        kind::PATH => {
            let path = parse_path(element.attr("d")?)?;
            if path.elements().is_empty() {
                return None;
            }
            Some(path.bounding_box())
        }
        _ => None,
    }
}

/// Attribute changes that move an element by `delta`.
///
/// Returns `None` for kinds without a known position.
pub fn translation_patch(element: &Element, delta: Vec2) -> Option<ElementPatch> {
    let shift = |name: &str, by: f64| -> (String, String) {
        let value = element.attr_f64(name).unwrap_or(0.0) + by;
        (name.to_string(), format_number(value))
    };
    match element.kind.as_str() {
        kind::RECT => Some(ElementPatch::attributes([shift("x", delta.x), shift("y", delta.y)])),
        kind::ELLIPSE => Some(ElementPatch::attributes([
            shift("cx", delta.x),
            shift("cy", delta.y),
        ])),
        kind::PATH => {
            let d = element.attr("d")?;
            Some(ElementPatch::attributes([("d", translate_path(d, delta))]))
        }
        _ => None,
    }
}

/// Union of the bounds of several elements.
pub fn union_bounds<'a>(elements: impl IntoIterator<Item = &'a Element>) -> Option<Rect> {
    elements
        .into_iter()
        .filter_map(element_bounds)
        .reduce(|acc, r| acc.union(r))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_polyline_path() {
        let pts = [Point::new(0.0, 0.0), Point::new(100.0, 0.0), Point::new(50.0, 80.0)];
        assert_eq!(polyline_path(&pts, true), "M 0,0 L 100,0 L 50,80 Z");
        assert_eq!(polyline_path(&pts[..1], false), "M 0,0");
        assert_eq!(polyline_path(&[], true), "");
    }

    #[test]
    fn test_extend_path() {
        let mut d = polyline_path(&[Point::new(1.0, 2.0)], false);
        extend_path(&mut d, &[Point::new(3.5, 4.0)]);
        assert_eq!(d, "M 1,2 L 3.5,4");
    }

    #[test]
    fn test_translate_path() {
        let d = "M 10,10 L 20,30 Z";
        assert_eq!(translate_path(d, Vec2::new(5.0, -10.0)), "M 15,0 L 25,20 Z");
    }

    #[test]
    fn test_translate_malformed_path_is_unchanged() {
        assert_eq!(translate_path("not a path", Vec2::new(1.0, 1.0)), "not a path");
    }

    #[test]
    fn test_element_bounds() {
        let rect = Element::new("r", kind::RECT)
            .with_attr("x", "40")
            .with_attr("y", "30")
            .with_attr("width", "60")
            .with_attr("height", "70");
        assert_eq!(element_bounds(&rect), Some(Rect::new(40.0, 30.0, 100.0, 100.0)));

        let ellipse = Element::new("e", kind::ELLIPSE)
            .with_attr("cx", "50")
            .with_attr("cy", "50")
            .with_attr("rx", "10")
            .with_attr("ry", "20");
        assert_eq!(element_bounds(&ellipse), Some(Rect::new(40.0, 30.0, 60.0, 70.0)));

        let path = Element::new("p", kind::PATH).with_attr("d", "M 0,0 L 10,5 L 4,20 Z");
        assert_eq!(element_bounds(&path), Some(Rect::new(0.0, 0.0, 10.0, 20.0)));

        assert_eq!(element_bounds(&Element::new("t", "text")), None);
    }

    #[test]
    fn test_translation_patch() {
        let ellipse = Element::new("e", kind::ELLIPSE)
            .with_attr("cx", "50")
            .with_attr("cy", "50")
            .with_attr("rx", "10")
            .with_attr("ry", "20");
        let patch = translation_patch(&ellipse, Vec2::new(5.0, -5.0)).unwrap();
        assert_eq!(patch.attributes["cx"], "55");
        assert_eq!(patch.attributes["cy"], "45");
        assert!(!patch.attributes.contains_key("rx"));

        let path = Element::new("p", kind::PATH).with_attr("d", "M 0,0 L 10,10");
        let patch = translation_patch(&path, Vec2::new(1.0, 2.0)).unwrap();
        assert_eq!(patch.attributes["d"], "M 1,2 L 11,12");

        assert!(translation_patch(&Element::new("t", "text"), Vec2::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn test_union_bounds() {
        let a = Element::new("a", kind::RECT)
            .with_attr("x", "0")
            .with_attr("y", "0")
            .with_attr("width", "10")
            .with_attr("height", "10");
        let b = Element::new("b", kind::RECT)
            .with_attr("x", "20")
            .with_attr("y", "5")
            .with_attr("width", "10")
            .with_attr("height", "10");
        assert_eq!(union_bounds([&a, &b]), Some(Rect::new(0.0, 0.0, 30.0, 15.0)));
        assert_eq!(union_bounds(std::iter::empty()), None);
    }
}
