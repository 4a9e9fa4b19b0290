//! HTML parsing via `tl`, converted into the mutable document tree.
//!
//! `tl` does not treat `<script>`/`<style>` bodies as raw text, so those
//! bodies are swapped for slot markers before parsing and restored on the
//! converted elements.

use std::borrow::Cow;

use super::dom::{Element, HtmlDocument, Node};
use crate::utils::html::{is_raw_text_element, unescape};

/// Private-use delimiters around a raw text slot index.
const SLOT_OPEN: char = '\u{E000}';
const SLOT_CLOSE: char = '\u{E001}';

/// Parse a full HTML document.
pub fn parse_document(source: &str) -> Result<HtmlDocument, String> {
    let mut doc = HtmlDocument::new();
    let (doctype, body) = split_doctype(source);
    doc.doctype = doctype;
    doc.children = parse_into(&mut doc, body)?;
    Ok(doc)
}

/// Parse an HTML fragment, allocating element ids from `doc`.
///
/// The returned nodes are detached; insert them with `insert_after` or
/// `append_child`.
pub fn parse_fragment(doc: &mut HtmlDocument, source: &str) -> Result<Vec<Node>, String> {
    parse_into(doc, source)
}

fn parse_into(doc: &mut HtmlDocument, source: &str) -> Result<Vec<Node>, String> {
    let (protected, slots) = protect_raw_text(source);

    let dom = tl::parse(&protected, tl::ParserOptions::default()).map_err(|e| e.to_string())?;
    let parser = dom.parser();

    let mut nodes = Vec::new();
    for handle in dom.children() {
        if let Some(node) = convert(doc, *handle, parser, &slots) {
            nodes.push(node);
        }
    }
    Ok(nodes)
}

/// Convert a tl node handle into a document node.
fn convert(
    doc: &mut HtmlDocument,
    handle: tl::NodeHandle,
    parser: &tl::Parser,
    slots: &[String],
) -> Option<Node> {
    let node = handle.get(parser)?;

    match node {
        tl::Node::Tag(tag) => {
            let tag_name = tag.name().as_utf8_str().to_lowercase();
            let mut elem = Element {
                id: doc.alloc_id(),
                tag: tag_name,
                attrs: collect_attrs(tag),
                children: Vec::new(),
            };

            for child_handle in tag.children().top().iter() {
                if let Some(child) = convert(doc, *child_handle, parser, slots) {
                    elem.children.push(child);
                }
            }

            if is_raw_text_element(&elem.tag) {
                let body = restore_slots(&elem.text_content(), slots);
                elem.set_text_content(body);
            }

            Some(Node::Element(elem))
        }
        tl::Node::Raw(bytes) => {
            let text = bytes.as_utf8_str();
            if text.is_empty() {
                None
            } else if text.contains(SLOT_OPEN) {
                Some(Node::Text(text.into_owned()))
            } else {
                Some(Node::Text(unescape(&text).into_owned()))
            }
        }
        tl::Node::Comment(bytes) => {
            let raw = bytes.as_utf8_str();
            let inner = raw
                .strip_prefix("<!--")
                .map(|s| s.strip_suffix("-->").unwrap_or(s))
                .unwrap_or(&raw);
            Some(Node::Comment(inner.to_string()))
        }
    }
}

/// Attributes in source order with decoded values.
fn collect_attrs(tag: &tl::HTMLTag<'_>) -> Vec<(String, Option<String>)> {
    let tag_attrs = tag.attributes();
    let decode = |v: Cow<'_, str>| unescape(&v).into_owned();

    let mut attrs: Vec<(String, Option<String>)> = tag_attrs
        .iter()
        .map(|(key, value)| {
            let key_str: &str = key.as_ref();
            (key_str.to_ascii_lowercase(), value.map(decode))
        })
        .collect();

    // `id` and `class` are stored apart from the other attributes
    for name in ["id", "class"] {
        if attrs.iter().any(|(k, _)| k == name) {
            continue;
        }
        if let Some(value) = tag_attrs.get(name) {
            attrs.push((name.to_string(), value.map(|v| decode(v.as_utf8_str()))));
        }
    }

    let raw = tag.raw().as_utf8_str();
    let open_tag = find_tag_end(&raw, 0).map_or(&*raw, |end| &raw[..end]);
    let open_lower = open_tag.to_ascii_lowercase();
    attrs.sort_by_key(|(k, _)| attr_position(&open_lower, k));
    attrs
}

/// Byte offset of the attribute `name` inside a lowercased opening tag.
fn attr_position(open_lower: &str, name: &str) -> usize {
    let bytes = open_lower.as_bytes();
    open_lower
        .match_indices(name)
        .map(|(at, _)| at)
        .find(|&at| {
            let before = at.checked_sub(1).map(|i| bytes[i]);
            let after = bytes.get(at + name.len()).copied();
            before.is_some_and(|b| b.is_ascii_whitespace() || b == b'"' || b == b'\'')
                && after.is_none_or(|b| b.is_ascii_whitespace() || matches!(b, b'=' | b'/' | b'>'))
        })
        .unwrap_or(usize::MAX)
}

/// Replace slot markers with the raw text they stand for.
fn restore_slots(text: &str, slots: &[String]) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find(SLOT_OPEN) {
        out.push_str(&rest[..open]);
        let after = &rest[open + SLOT_OPEN.len_utf8()..];
        let Some(close) = after.find(SLOT_CLOSE) else {
            rest = &rest[open..];
            break;
        };
        match after[..close].parse::<usize>().ok().and_then(|i| slots.get(i)) {
            Some(body) => out.push_str(body),
            None => out.push_str(&rest[open..open + SLOT_OPEN.len_utf8() + close + SLOT_CLOSE.len_utf8()]),
        }
        rest = &after[close + SLOT_CLOSE.len_utf8()..];
    }
    out.push_str(rest);
    out
}

/// Split a leading `<!DOCTYPE ...>` off the source.
fn split_doctype(source: &str) -> (Option<String>, &str) {
    let trimmed = source.trim_start();
    let is_doctype = trimmed
        .get(..9)
        .is_some_and(|head| head.eq_ignore_ascii_case("<!doctype"));
    if !is_doctype {
        return (None, source);
    }
    match trimmed.find('>') {
        Some(end) => (
            Some(trimmed[2..end].trim().to_string()),
            &trimmed[end + 1..],
        ),
        None => (None, source),
    }
}

/// Cut raw text element bodies out of the source.
///
/// `<script src=a.js>body</script>` becomes
/// `<script src=a.js>\u{E000}0\u{E001}</script>` and `body` is returned
/// in slot 0.
fn protect_raw_text(source: &str) -> (String, Vec<String>) {
    let lower = source.to_ascii_lowercase();
    let mut out = String::with_capacity(source.len());
    let mut slots = Vec::new();
    let mut pos = 0;

    while let Some((open_start, tag)) = next_raw_open(&lower, pos) {
        let Some(open_end) = find_tag_end(source, open_start) else {
            break;
        };
        let close_pat = format!("</{tag}");
        let body_start = open_end + 1;
        let body_end = lower[body_start..]
            .find(&close_pat)
            .map_or(source.len(), |i| body_start + i);

        out.push_str(&source[pos..body_start]);
        out.push(SLOT_OPEN);
        out.push_str(&slots.len().to_string());
        out.push(SLOT_CLOSE);
        slots.push(source[body_start..body_end].to_string());

        if body_end == source.len() {
            out.push_str(&format!("</{tag}>"));
        }
        pos = body_end;
    }

    out.push_str(&source[pos..]);
    (out, slots)
}

/// Find the next `<script` or `<style` opening tag at or after `from`.
fn next_raw_open(lower: &str, from: usize) -> Option<(usize, &'static str)> {
    let mut search = from;
    while let Some(rel) = lower[search..].find('<') {
        let at = search + rel;
        for tag in ["script", "style"] {
            let after = at + 1 + tag.len();
            if lower[at + 1..].starts_with(tag)
                && is_raw_text_element(tag)
                && lower[after..]
                    .chars()
                    .next()
                    .is_some_and(|c| c.is_ascii_whitespace() || c == '>' || c == '/')
            {
                return Some((at, tag));
            }
        }
        search = at + 1;
    }
    None
}

/// Position of the `>` closing the tag that starts at `start`, skipping quoted values.
fn find_tag_end(source: &str, start: usize) -> Option<usize> {
    let mut quote = None;
    for (i, c) in source[start..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(c),
            (None, '>') => return Some(start + i),
            _ => {}
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_document_structure() {
        let doc = parse_document(
            "<!DOCTYPE html>\n<html><head><title>T</title></head><body><p class=\"x\">Hi &amp; bye</p></body></html>",
        )
        .unwrap();

        assert_eq!(doc.doctype.as_deref(), Some("DOCTYPE html"));
        let p = doc.get_elements_by_tag_name("p")[0];
        assert_eq!(p.get_attr("class"), Some("x"));
        assert_eq!(p.text_content(), "Hi & bye");
    }

    #[test]
    fn test_script_body_is_raw_text() {
        let doc = parse_document(
            "<body><script>if (a < b) { document.write('<div>Howdy</div>'); }</script></body>",
        )
        .unwrap();

        assert!(doc.get_elements_by_tag_name("div").is_empty());
        let script = doc.get_elements_by_tag_name("script")[0];
        assert_eq!(
            script.text_content(),
            "if (a < b) { document.write('<div>Howdy</div>'); }"
        );
        assert_eq!(script.attrs.len(), 0);
    }

    #[test]
    fn test_external_script_keeps_attributes() {
        let doc = parse_document("<script src=\"app.js\" defer></script><style>a{}</style>").unwrap();
        let script = doc.get_elements_by_tag_name("script")[0];
        assert_eq!(script.get_attr("src"), Some("app.js"));
        assert!(script.children.is_empty());

        let style = doc.get_elements_by_tag_name("style")[0];
        assert_eq!(style.text_content(), "a{}");
    }

    #[test]
    fn test_protect_raw_text_unclosed() {
        let (out, slots) = protect_raw_text("<script>var x = 1;");
        assert_eq!(slots, vec!["var x = 1;".to_string()]);
        assert!(out.ends_with("</script>"));
    }

    #[test]
    fn test_attribute_order_follows_source() {
        let doc = parse_document(
            "<img class=\"hero\" src=\"a.png\" alt=\"A\" id=\"main\" loading=\"lazy\">",
        )
        .unwrap();
        let img = doc.get_elements_by_tag_name("img")[0];
        let names: Vec<&str> = img.attrs.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(names, ["class", "src", "alt", "id", "loading"]);
        assert_eq!(img.get_attr("id"), Some("main"));
    }

    #[test]
    fn test_fragment_ids_come_from_document() {
        let mut doc = parse_document("<body></body>").unwrap();
        let nodes = parse_fragment(&mut doc, "<div>Howdy</div>").unwrap();
        let div = nodes[0].as_element().unwrap();
        assert_eq!(div.tag, "div");
        assert_eq!(div.first_child().and_then(Node::node_value), Some("Howdy"));
        assert!(doc.element(div.id).is_none());
    }
}
