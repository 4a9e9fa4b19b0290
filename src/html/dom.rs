//! Mutable HTML document tree.
//!
//! Every element carries a `NodeId` that stays valid while the tree is
//! edited, so relations can point at elements without holding references.

use std::fmt;

/// Stable element identifier, unique within one document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    Element(Element),
    /// Decoded text. Inside raw text elements this is the raw source.
    Text(String),
    Comment(String),
}

impl Node {
    /// DOM-style `nodeValue`: text and comment content, `None` for elements.
    pub fn node_value(&self) -> Option<&str> {
        match self {
            Self::Text(t) | Self::Comment(t) => Some(t),
            Self::Element(_) => None,
        }
    }

    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Self::Element(e) => Some(e),
            _ => None,
        }
    }

    fn as_element_mut(&mut self) -> Option<&mut Element> {
        match self {
            Self::Element(e) => Some(e),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Element {
    pub id: NodeId,
    /// Lowercased tag name.
    pub tag: String,
    /// Attributes in source order. `None` marks a bare boolean attribute.
    pub attrs: Vec<(String, Option<String>)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_deref().unwrap_or(""))
    }

    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|(k, _)| k.eq_ignore_ascii_case(name))
    }

    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = Some(value.into());
        match self
            .attrs
            .iter_mut()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
        {
            Some((_, v)) => *v = value,
            None => self.attrs.push((name.to_ascii_lowercase(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> bool {
        let before = self.attrs.len();
        self.attrs.retain(|(k, _)| !k.eq_ignore_ascii_case(name));
        before != self.attrs.len()
    }

    pub fn first_child(&self) -> Option<&Node> {
        self.children.first()
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    /// Replace all children with a single text node.
    pub fn set_text_content(&mut self, text: impl Into<String>) {
        let text = text.into();
        self.children.clear();
        if !text.is_empty() {
            self.children.push(Node::Text(text));
        }
    }

    /// Whether the element has a case-insensitive token in its `rel` attribute.
    pub fn has_rel(&self, token: &str) -> bool {
        self.get_attr("rel")
            .is_some_and(|rel| rel.split_whitespace().any(|t| t.eq_ignore_ascii_case(token)))
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(t) => out.push_str(t),
            Node::Element(e) => collect_text(&e.children, out),
            Node::Comment(_) => {}
        }
    }
}

/// A parsed HTML document.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct HtmlDocument {
    /// Doctype declaration without the surrounding `<!` and `>`.
    pub doctype: Option<String>,
    pub children: Vec<Node>,
    next_id: u32,
}

impl HtmlDocument {
    pub fn new() -> Self {
        Self::default()
    }

    /// Allocate a fresh id for an element built outside the parser.
    pub fn alloc_id(&mut self) -> NodeId {
        let id = NodeId(self.next_id);
        self.next_id += 1;
        id
    }

    /// Create a detached element with a fresh id.
    pub fn create_element(&mut self, tag: &str) -> Element {
        Element {
            id: self.alloc_id(),
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn element(&self, id: NodeId) -> Option<&Element> {
        find_in(&self.children, id)
    }

    pub fn element_mut(&mut self, id: NodeId) -> Option<&mut Element> {
        find_in_mut(&mut self.children, id)
    }

    /// All elements with the given tag, in document order.
    pub fn get_elements_by_tag_name(&self, tag: &str) -> Vec<&Element> {
        let mut out = Vec::new();
        self.walk(&mut |e| {
            if e.tag.eq_ignore_ascii_case(tag) {
                out.push(e);
            }
        });
        out
    }

    pub fn get_element_by_id(&self, id_attr: &str) -> Option<&Element> {
        let mut found = None;
        self.walk(&mut |e| {
            if found.is_none() && e.get_attr("id") == Some(id_attr) {
                found = Some(e.id);
            }
        });
        found.and_then(|id| self.element(id))
    }

    pub fn body(&self) -> Option<&Element> {
        self.get_elements_by_tag_name("body").into_iter().next()
    }

    pub fn head(&self) -> Option<&Element> {
        self.get_elements_by_tag_name("head").into_iter().next()
    }

    /// Visit every element depth-first in document order.
    pub fn walk<'a>(&'a self, f: &mut dyn FnMut(&'a Element)) {
        walk_nodes(&self.children, f);
    }

    /// Insert nodes directly after the element `anchor`, as its siblings.
    ///
    /// Returns false if the anchor is not in the tree.
    pub fn insert_after(&mut self, anchor: NodeId, nodes: Vec<Node>) -> bool {
        let Some((siblings, index)) = locate_mut(&mut self.children, anchor) else {
            return false;
        };
        let at = index + 1;
        siblings.splice(at..at, nodes);
        true
    }

    /// Append a node to the element `parent`, or to the top level when `None`.
    pub fn append_child(&mut self, parent: Option<NodeId>, node: Node) -> bool {
        match parent {
            None => {
                self.children.push(node);
                true
            }
            Some(id) => match self.element_mut(id) {
                Some(elem) => {
                    elem.children.push(node);
                    true
                }
                None => false,
            },
        }
    }

    /// Detach an element (with its subtree) from the tree.
    pub fn remove(&mut self, id: NodeId) -> Option<Element> {
        let (siblings, index) = locate_mut(&mut self.children, id)?;
        match siblings.remove(index) {
            Node::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Re-number a detached subtree so it can be inserted into this document.
    pub fn adopt(&mut self, mut nodes: Vec<Node>) -> Vec<Node> {
        for node in &mut nodes {
            self.renumber(node);
        }
        nodes
    }

    fn renumber(&mut self, node: &mut Node) {
        if let Some(elem) = node.as_element_mut() {
            elem.id = self.alloc_id();
            for child in &mut elem.children {
                self.renumber(child);
            }
        }
    }
}

fn walk_nodes<'a>(nodes: &'a [Node], f: &mut dyn FnMut(&'a Element)) {
    for node in nodes {
        if let Node::Element(e) = node {
            f(e);
            walk_nodes(&e.children, f);
        }
    }
}

fn find_in(nodes: &[Node], id: NodeId) -> Option<&Element> {
    nodes.iter().filter_map(Node::as_element).find_map(|e| {
        if e.id == id {
            Some(e)
        } else {
            find_in(&e.children, id)
        }
    })
}

fn find_in_mut(nodes: &mut [Node], id: NodeId) -> Option<&mut Element> {
    for node in nodes.iter_mut() {
        if let Node::Element(e) = node {
            if e.id == id {
                return Some(e);
            }
            if let Some(found) = find_in_mut(&mut e.children, id) {
                return Some(found);
            }
        }
    }
    None
}

/// Find the sibling list holding `id` and the element's index in it.
fn locate_mut(nodes: &mut Vec<Node>, id: NodeId) -> Option<(&mut Vec<Node>, usize)> {
    if let Some(index) = nodes
        .iter()
        .position(|n| n.as_element().is_some_and(|e| e.id == id))
    {
        return Some((nodes, index));
    }
    for node in nodes.iter_mut() {
        if let Node::Element(e) = node
            && let Some(found) = locate_mut(&mut e.children, id)
        {
            return Some(found);
        }
    }
    None
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (HtmlDocument, NodeId, NodeId) {
        let mut doc = HtmlDocument::new();
        let mut body = doc.create_element("body");
        let mut p = doc.create_element("p");
        p.set_attr("id", "intro");
        p.children.push(Node::Text("Hello".into()));
        let p_id = p.id;
        body.children.push(Node::Element(p));
        let body_id = body.id;
        doc.children.push(Node::Element(body));
        (doc, body_id, p_id)
    }

    #[test]
    fn test_lookup_by_id_and_tag() {
        let (doc, body_id, p_id) = sample();
        assert_eq!(doc.element(p_id).unwrap().tag, "p");
        assert_eq!(doc.body().unwrap().id, body_id);
        assert_eq!(doc.get_element_by_id("intro").unwrap().id, p_id);
        assert_eq!(doc.get_elements_by_tag_name("P").len(), 1);
    }

    #[test]
    fn test_insert_after_keeps_ids() {
        let (mut doc, body_id, p_id) = sample();
        let div = doc.create_element("div");
        let div_id = div.id;
        assert!(doc.insert_after(p_id, vec![Node::Element(div)]));

        let body = doc.element(body_id).unwrap();
        assert_eq!(body.children.len(), 2);
        assert_eq!(body.children[1].as_element().unwrap().id, div_id);
        assert!(doc.element(p_id).is_some());
    }

    #[test]
    fn test_remove_and_text_content() {
        let (mut doc, body_id, p_id) = sample();
        assert_eq!(doc.element(body_id).unwrap().text_content(), "Hello");

        let removed = doc.remove(p_id).unwrap();
        assert_eq!(removed.tag, "p");
        assert!(doc.element(p_id).is_none());
        assert_eq!(doc.element(body_id).unwrap().text_content(), "");
    }

    #[test]
    fn test_attr_helpers() {
        let mut doc = HtmlDocument::new();
        let mut link = doc.create_element("LINK");
        link.attrs.push(("rel".into(), Some("Stylesheet alternate".into())));
        link.attrs.push(("disabled".into(), None));

        assert_eq!(link.tag, "link");
        assert!(link.has_rel("stylesheet"));
        assert_eq!(link.get_attr("disabled"), Some(""));
        link.set_attr("href", "a.css");
        assert_eq!(link.get_attr("HREF"), Some("a.css"));
        assert!(link.remove_attr("disabled"));
        assert!(!link.has_attr("disabled"));
    }
}
