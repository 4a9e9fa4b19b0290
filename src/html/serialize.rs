//! HTML serialization.

use super::dom::{Element, HtmlDocument, Node};
use crate::utils::html::{escape_attr, escape_text, is_raw_text_element, is_void_element};

/// Serialize a document back to HTML source.
pub fn to_html(doc: &HtmlDocument) -> String {
    let mut out = String::new();
    if let Some(doctype) = &doc.doctype {
        out.push_str("<!");
        out.push_str(doctype);
        out.push('>');
    }
    write_nodes(&doc.children, false, &mut out);
    out
}

/// Serialize a list of nodes (e.g. an element's children).
pub fn nodes_to_html(nodes: &[Node]) -> String {
    let mut out = String::new();
    write_nodes(nodes, false, &mut out);
    out
}

/// Serialize one element including its own tag.
pub fn element_to_html(elem: &Element) -> String {
    let mut out = String::new();
    write_element(elem, &mut out);
    out
}

fn write_nodes(nodes: &[Node], raw: bool, out: &mut String) {
    for node in nodes {
        match node {
            Node::Element(e) => write_element(e, out),
            Node::Text(t) if raw => out.push_str(t),
            Node::Text(t) => out.push_str(&escape_text(t)),
            Node::Comment(c) => {
                out.push_str("<!--");
                out.push_str(c);
                out.push_str("-->");
            }
        }
    }
}

fn write_element(elem: &Element, out: &mut String) {
    out.push('<');
    out.push_str(&elem.tag);
    for (name, value) in &elem.attrs {
        out.push(' ');
        out.push_str(name);
        if let Some(value) = value {
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
    }
    out.push('>');

    if is_void_element(&elem.tag) {
        return;
    }

    write_nodes(&elem.children, is_raw_text_element(&elem.tag), out);
    out.push_str("</");
    out.push_str(&elem.tag);
    out.push('>');
}

#[cfg(test)]
mod tests {
    use super::super::parse::parse_document;
    use super::*;

    #[test]
    fn test_roundtrip_keeps_markup() {
        let src = "<!DOCTYPE html><html><head><link rel=\"stylesheet\" href=\"a.css\"></head>\
                   <body><img src=\"a.png\" alt=\"A &quot;b&quot;\"><p>x &lt; y</p><!-- note --></body></html>";
        let doc = parse_document(src).unwrap();
        let html = to_html(&doc);

        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("<link rel=\"stylesheet\" href=\"a.css\">"));
        assert!(html.contains("alt=\"A &quot;b&quot;\""));
        assert!(html.contains("<p>x &lt; y</p>"));
        assert!(html.contains("<!-- note -->"));
        assert!(!html.contains("</img>"));
    }

    #[test]
    fn test_script_body_not_escaped() {
        let doc = parse_document("<script>if (a < b && c) {}</script>").unwrap();
        assert_eq!(to_html(&doc), "<script>if (a < b && c) {}</script>");
    }

    #[test]
    fn test_boolean_attribute() {
        let doc = parse_document("<script src=\"x.js\" defer></script>").unwrap();
        assert_eq!(to_html(&doc), "<script src=\"x.js\" defer></script>");
    }
}
