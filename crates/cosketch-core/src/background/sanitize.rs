//! Background markup validation and sanitization.

use roxmltree::{Document, Node, ParsingOptions};

use super::BackgroundError;

const XML_NS: &str = "http://www.w3.org/XML/1998/namespace";

/// Elements dropped together with their subtree.
const BLOCKED_ELEMENTS: [&str; 7] = [
    "script",
    "object",
    "embed",
    "foreignobject",
    "iframe",
    "handler",
    "listener",
];

/// Attributes that may carry a URL.
const URL_ATTRIBUTES: [&str; 3] = ["href", "src", "action"];

/// Animation attributes holding the values written into the target attribute.
const ANIMATION_VALUES: [&str; 4] = ["to", "from", "values", "by"];

/// Validate SVG markup and strip active content.
///
/// The markup must be well-formed XML with an `svg` root. Script-capable
/// elements, every `on*` attribute and `javascript:` URLs are removed.
pub fn sanitize_svg(markup: &str) -> Result<String, BackgroundError> {
    if markup.trim().is_empty() {
        return Err(BackgroundError::Empty);
    }
    let options = ParsingOptions {
        allow_dtd: true,
        ..ParsingOptions::default()
    };
    let doc = Document::parse_with_options(markup, options)
        .map_err(|e| BackgroundError::Malformed(e.to_string()))?;

    let root = doc.root_element();
    let root_name = root.tag_name().name();
    if !root_name.eq_ignore_ascii_case("svg") {
        return Err(BackgroundError::NotSvg(root_name.to_string()));
    }

    let mut out = String::with_capacity(markup.len());
    write_element(root, &mut out);
    Ok(out)
}

fn is_blocked(node: Node) -> bool {
    let name = node.tag_name().name().to_ascii_lowercase();
    BLOCKED_ELEMENTS.contains(&name.as_str()) || is_unsafe_animation(node, &name)
}

/// `set` and `animate*` can write a script URL into a link after load, or
/// rewrite an event handler.
fn is_unsafe_animation(node: Node, name: &str) -> bool {
    if name != "set" && !name.starts_with("animate") {
        return false;
    }
    let target = node
        .attributes()
        .find(|a| a.name() == "attributeName")
        .map(|a| a.value().to_ascii_lowercase())
        .unwrap_or_default();
    // Drop any namespace prefix, as in xlink:href
    let local = target.rsplit(':').next().unwrap_or_default();
    if URL_ATTRIBUTES.contains(&local) || local.starts_with("on") {
        return true;
    }
    node.attributes()
        .filter(|a| ANIMATION_VALUES.contains(&a.name()))
        .any(|a| a.value().split(';').any(is_script_url))
}

fn is_script_url(value: &str) -> bool {
    let compact: String = value
        .chars()
        .filter(|c| !c.is_whitespace() && !c.is_control())
        .collect();
    compact.to_ascii_lowercase().starts_with("javascript:")
}

fn qualified_name(node: Node, namespace: Option<&str>, local: &str) -> String {
    let prefix = match namespace {
        Some(XML_NS) => Some("xml"),
        Some(uri) => node.lookup_prefix(uri),
        None => None,
    };
    match prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, local),
        _ => local.to_string(),
    }
}

fn write_element(node: Node, out: &mut String) {
    let name = qualified_name(node, node.tag_name().namespace(), node.tag_name().name());
    out.push('<');
    out.push_str(&name);

    // Declare namespaces not already in scope on the parent element
    let parent = node.parent_element();
    for ns in node.namespaces() {
        if ns.uri() == XML_NS {
            continue;
        }
        let inherited = parent.is_some_and(|p| {
            p.namespaces()
                .any(|other| other.name() == ns.name() && other.uri() == ns.uri())
        });
        if inherited {
            continue;
        }
        match ns.name() {
            Some(prefix) => out.push_str(&format!(" xmlns:{}=\"", prefix)),
            None => out.push_str(" xmlns=\""),
        }
        escape_into(ns.uri(), out, true);
        out.push('"');
    }

    for attr in node.attributes() {
        let local = attr.name();
        if local.to_ascii_lowercase().starts_with("on") {
            log::debug!("sanitize: dropping event handler attribute {}", local);
            continue;
        }
        if URL_ATTRIBUTES.contains(&local.to_ascii_lowercase().as_str()) && is_script_url(attr.value()) {
            log::debug!("sanitize: dropping script URL in {}", local);
            continue;
        }
        out.push(' ');
        out.push_str(&qualified_name(node, attr.namespace(), local));
        out.push_str("=\"");
        escape_into(attr.value(), out, true);
        out.push('"');
    }

    let children: Vec<Node> = node
        .children()
        .filter(|child| {
            if child.is_element() {
                if is_blocked(*child) {
                    log::debug!("sanitize: dropping <{}>", child.tag_name().name());
                    return false;
                }
                return true;
            }
            child.is_text()
        })
        .collect();

    if children.is_empty() {
        out.push_str("/>");
        return;
    }
    out.push('>');
    for child in children {
        if child.is_element() {
            write_element(child, out);
        } else if let Some(text) = child.text() {
            escape_into(text, out, false);
        }
    }
    out.push_str("</");
    out.push_str(&name);
    out.push('>');
}

pub(crate) fn escape_into(text: &str, out: &mut String, attribute: bool) {
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' if attribute => out.push_str("&quot;"),
            _ => out.push(c),
        }
    }
}
