//! `DomHost` backed by an HTML document.

use super::eval::{Child, DomHost};
use crate::html::{Element, HtmlDocument, Node, NodeId, parse_fragment};

/// Applies script effects to the document containing the script.
///
/// Elements created by the script live in a scratch list until they are
/// appended somewhere. `document.write` output is collected and inserted
/// after the script element by [`HtmlDomHost::finish`].
pub struct HtmlDomHost<'d> {
    doc: &'d mut HtmlDocument,
    script: NodeId,
    detached: HtmlDocument,
    written: String,
}

impl<'d> HtmlDomHost<'d> {
    pub fn new(doc: &'d mut HtmlDocument, script: NodeId) -> Self {
        Self {
            doc,
            script,
            detached: HtmlDocument::new(),
            written: String::new(),
        }
    }

    /// Insert collected `document.write` output after the script element.
    ///
    /// Returns the number of top-level elements inserted.
    pub fn finish(self) -> Result<usize, String> {
        if self.written.is_empty() {
            return Ok(0);
        }
        let doc = self.doc;
        let nodes = parse_fragment(doc, &self.written)?;
        let elements = nodes.iter().filter(|n| n.as_element().is_some()).count();
        if !doc.insert_after(self.script, nodes) {
            return Err(format!("script element {} is no longer in the document", self.script));
        }
        Ok(elements)
    }

    fn with_element<T>(
        &mut self,
        node: NodeId,
        f: impl FnOnce(&mut Element) -> T,
    ) -> Result<T, String> {
        if let Some(elem) = self.doc.element_mut(node) {
            return Ok(f(elem));
        }
        match self.detached.element_mut(node) {
            Some(elem) => Ok(f(elem)),
            None => Err(format!("unknown element {node}")),
        }
    }

    fn element(&self, node: NodeId) -> Option<&Element> {
        self.doc.element(node).or_else(|| self.detached.element(node))
    }
}

impl DomHost for HtmlDomHost<'_> {
    fn write(&mut self, html: &str) {
        self.written.push_str(html);
    }

    fn create_element(&mut self, tag: &str) -> NodeId {
        let elem = self.doc.create_element(tag);
        let id = elem.id;
        self.detached.children.push(Node::Element(elem));
        id
    }

    fn append_child(&mut self, parent: NodeId, child: Child) -> Result<(), String> {
        let node = match child {
            Child::Text(text) => Node::Text(text),
            Child::Element(id) => {
                let moved = self
                    .detached
                    .remove(id)
                    .or_else(|| self.doc.remove(id))
                    .ok_or_else(|| format!("unknown element {id}"))?;
                Node::Element(moved)
            }
        };
        self.with_element(parent, |elem| elem.children.push(node))
    }

    fn set_attribute(&mut self, node: NodeId, name: &str, value: &str) -> Result<(), String> {
        self.with_element(node, |elem| elem.set_attr(name, value))
    }

    fn get_attribute(&self, node: NodeId, name: &str) -> Option<String> {
        self.element(node)?.get_attr(name).map(str::to_string)
    }

    fn set_text(&mut self, node: NodeId, text: &str) -> Result<(), String> {
        self.with_element(node, |elem| elem.set_text_content(text))
    }

    fn set_inner_html(&mut self, node: NodeId, html: &str) -> Result<(), String> {
        let nodes = parse_fragment(self.doc, html)?;
        self.with_element(node, |elem| elem.children = nodes)
    }

    fn text(&self, node: NodeId) -> Option<String> {
        self.element(node).map(|e| e.text_content())
    }

    fn body(&self) -> Option<NodeId> {
        self.doc.body().map(|e| e.id)
    }

    fn head(&self) -> Option<NodeId> {
        self.doc.head().map(|e| e.id)
    }

    fn element_by_id(&self, id: &str) -> Option<NodeId> {
        self.doc
            .get_element_by_id(id)
            .or_else(|| self.detached.get_element_by_id(id))
            .map(|e| e.id)
    }
}

#[cfg(test)]
mod tests {
    use super::super::eval::run_script;
    use super::*;
    use crate::html::{parse_document, to_html};

    fn script_id(doc: &HtmlDocument) -> NodeId {
        doc.get_elements_by_tag_name("script")[0].id
    }

    #[test]
    fn test_write_inserts_after_script() {
        let mut doc = parse_document(
            "<body><script>if (theEnvironment) { document.write('<div>Howdy</div>'); }</script><p>x</p></body>",
        )
        .unwrap();
        let script = script_id(&doc);
        let source = doc.element(script).unwrap().text_content();

        let mut host = HtmlDomHost::new(&mut doc, script);
        run_script(&source, "theEnvironment", &mut host).unwrap();
        assert_eq!(host.finish(), Ok(1));

        let divs = doc.get_elements_by_tag_name("div");
        assert_eq!(divs.len(), 1);
        assert_eq!(divs[0].text_content(), "Howdy");
        assert!(to_html(&doc).contains("</script><div>Howdy</div><p>x</p>"));
    }

    #[test]
    fn test_append_to_body() {
        let mut doc = parse_document("<body><script></script></body>").unwrap();
        let script = script_id(&doc);

        let mut host = HtmlDomHost::new(&mut doc, script);
        run_script(
            "var d = document.createElement('div'); d.id = 'greeting'; d.textContent = 'Hi'; document.body.appendChild(d);",
            "theEnvironment",
            &mut host,
        )
        .unwrap();
        assert_eq!(host.finish(), Ok(0));

        let div = doc.get_element_by_id("greeting").unwrap();
        assert_eq!(div.text_content(), "Hi");
        assert_eq!(to_html(&doc), "<body><script></script><div id=\"greeting\">Hi</div></body>");
    }
}
