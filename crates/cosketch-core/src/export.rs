//! Standalone SVG export of the canvas.

use thiserror::Error;

use crate::background::{BackgroundError, escape_into, sanitize_svg};
use crate::element::{Element, format_number};
use crate::scene::Scene;

const SVG_NS: &str = "http://www.w3.org/2000/svg";

/// Errors raised while exporting.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ExportError {
    #[error("Exported markup failed validation: {0}")]
    Invalid(#[from] BackgroundError),
}

/// Build an SVG document of `width` x `height` units holding the background
/// artwork (if any) under the drawing, each in its own group.
///
/// The result goes through [`sanitize_svg`], so attributes written by remote
/// participants cannot smuggle active content into the file.
pub fn export_svg(
    scene: &Scene,
    background: Option<&str>,
    width: f64,
    height: f64,
) -> Result<String, ExportError> {
    let (w, h) = (format_number(width), format_number(height));
    let mut out = format!(
        r#"<svg xmlns="{}" width="{}" height="{}" viewBox="0 0 {} {}">"#,
        SVG_NS, w, h, w, h
    );
    if let Some(markup) = background {
        out.push_str("<g>");
        out.push_str(markup);
        out.push_str("</g>");
    }
    out.push_str("<g>");
    for element in scene.iter() {
        write_element(element, &mut out);
    }
    out.push_str("</g></svg>");

    let clean = sanitize_svg(&out)?;
    log::info!("exported {} elements as SVG ({} bytes)", scene.len(), clean.len());
    Ok(clean)
}

/// File name for an export made at `timestamp` (`YYYY-MM-DDTHH-MM-SS`).
pub fn export_file_name(timestamp: &str) -> String {
    format!("canvas-export-{}.svg", timestamp.replace(':', "-"))
}

fn write_element(element: &Element, out: &mut String) {
    if !is_xml_name(&element.kind) {
        log::warn!("export: skipping {} with invalid type {:?}", element.id, element.kind);
        return;
    }
    out.push('<');
    out.push_str(&element.kind);
    out.push_str(" id=\"");
    escape_into(&element.id, out, true);
    out.push('"');
    for (name, value) in &element.attributes {
        if name == "id" || !is_xml_name(name) {
            log::warn!("export: skipping attribute {:?} on {}", name, element.id);
            continue;
        }
        out.push(' ');
        out.push_str(name);
        out.push_str("=\"");
        escape_into(value, out, true);
        out.push('"');
    }
    if element.content.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    escape_into(&element.content, out, false);
    out.push_str("</");
    out.push_str(&element.kind);
    out.push('>');
}

/// Unprefixed XML name: a letter or `_`, then letters, digits, `-`, `_` or `.`.
fn is_xml_name(name: &str) -> bool {
    let mut chars = name.chars();
    chars
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}
