//! XML rendering of nodes for diagnostics and `Display` output

use std::fmt::Write;

use crate::document::Document;
use crate::node::{NodeId, NodeKind};

/// Render a node and its subtree as compact XML. The document node renders
/// its children.
pub fn to_xml_string(doc: &Document, id: NodeId) -> String {
    let mut out = String::new();
    render(doc, id, &mut out);
    out
}

fn render(doc: &Document, id: NodeId, out: &mut String) {
    match doc.kind(id) {
        Some(NodeKind::Document) => {
            for child in doc.children(id) {
                render(doc, *child, out);
            }
        }
        Some(NodeKind::Element) => {
            let name = doc.name(id).map(|n| n.qualified()).unwrap_or_default();
            out.push('<');
            out.push_str(&name);
            for attribute in doc.attributes(id) {
                let _ = write!(
                    out,
                    " {}=\"{}\"",
                    attribute.name.qualified(),
                    escape(&attribute.value, true)
                );
            }
            let children = doc.children(id);
            if children.is_empty() {
                out.push_str("/>");
                return;
            }
            out.push('>');
            for child in children {
                render(doc, *child, out);
            }
            let _ = write!(out, "</{}>", name);
        }
        Some(NodeKind::Text) => out.push_str(&escape(doc.text(id).unwrap_or_default(), false)),
        Some(NodeKind::Comment) => {
            let _ = write!(out, "<!--{}-->", doc.text(id).unwrap_or_default());
        }
        Some(NodeKind::Attribute) | None => {}
    }
}

fn escape(text: &str, attribute: bool) -> String {
    let mut escaped = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            '"' if attribute => escaped.push_str("&quot;"),
            _ => escaped.push(c),
        }
    }
    escaped
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_render_nested() {
        let mut doc = Document::with_root("a");
        let root = doc.document_element().unwrap();
        let b = doc.create_element("b");
        doc.set_attribute(b, "id", "5").unwrap();
        doc.set_text_content(b, "x < y").unwrap();
        doc.append_child(root, b).unwrap();
        let empty = doc.create_element("c");
        doc.append_child(root, empty).unwrap();
        assert_eq!(
            to_xml_string(&doc, doc.document_node()),
            "<a><b id=\"5\">x &lt; y</b><c/></a>"
        );
    }

    #[test]
    fn test_render_attribute_quotes_and_comment() {
        let mut doc = Document::with_root("a");
        let root = doc.document_element().unwrap();
        doc.set_attribute(root, "title", "say \"hi\"").unwrap();
        let comment = doc.create_comment(" note ");
        doc.append_child(root, comment).unwrap();
        assert_eq!(
            to_xml_string(&doc, root),
            "<a title=\"say &quot;hi&quot;\"><!-- note --></a>"
        );
    }
}
