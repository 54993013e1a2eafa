//! Owned markup tree.

/// What a node represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NodeKind {
    Document,
    Element,
    Text,
    Comment,
    Declaration,
    ProcessingInstruction,
}

/// A node of a parsed page. Children are owned, so the tree has no cycles.
#[derive(Debug, Clone, PartialEq)]
pub struct MarkupNode {
    pub kind: NodeKind,
    /// Lower-case tag name; empty for non-element nodes.
    pub name: String,
    /// Attributes in source order with lower-case names and decoded values.
    pub attrs: Vec<(String, String)>,
    /// Content of text, comment, declaration and processing-instruction nodes.
    pub text: String,
    pub children: Vec<MarkupNode>,
}

impl MarkupNode {
    pub fn document() -> Self {
        Self::with_kind(NodeKind::Document, String::new(), String::new())
    }

    pub fn element(name: impl Into<String>, attrs: Vec<(String, String)>) -> Self {
        let mut node = Self::with_kind(NodeKind::Element, name.into(), String::new());
        node.attrs = attrs;
        node
    }

    pub fn text_node(text: impl Into<String>) -> Self {
        Self::with_kind(NodeKind::Text, String::new(), text.into())
    }

    pub(crate) fn with_kind(kind: NodeKind, name: String, text: String) -> Self {
        Self {
            kind,
            name,
            attrs: Vec::new(),
            text,
            children: Vec::new(),
        }
    }

    pub fn is_element(&self) -> bool {
        self.kind == NodeKind::Element
    }

    /// Value of an attribute, if present.
    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    /// Concatenated text of all descendant text nodes, in document order.
    pub fn text_content(&self) -> String {
        let mut out = String::new();
        if self.kind == NodeKind::Text {
            out.push_str(&self.text);
        }
        for node in self.descendants() {
            if node.kind == NodeKind::Text {
                out.push_str(&node.text);
            }
        }
        out
    }

    /// Pre-order iterator over all descendants, excluding `self`.
    pub fn descendants(&self) -> Descendants<'_> {
        Descendants {
            stack: self.children.iter().rev().collect(),
        }
    }
}

/// Iterator returned by [`MarkupNode::descendants`].
pub struct Descendants<'a> {
    stack: Vec<&'a MarkupNode>,
}

impl<'a> Iterator for Descendants<'a> {
    type Item = &'a MarkupNode;

    fn next(&mut self) -> Option<Self::Item> {
        let node = self.stack.pop()?;
        self.stack.extend(node.children.iter().rev());
        Some(node)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> MarkupNode {
        let mut doc = MarkupNode::document();
        let mut div = MarkupNode::element("div", vec![("class".into(), "a b".into())]);
        let mut span = MarkupNode::element("span", vec![]);
        span.children.push(MarkupNode::text_node("one"));
        div.children.push(span);
        div.children.push(MarkupNode::text_node(" two"));
        doc.children.push(div);
        doc.children.push(MarkupNode::element("p", vec![]));
        doc
    }

    #[test]
    fn test_descendants_pre_order() {
        let doc = sample();
        let names: Vec<_> = doc
            .descendants()
            .filter(|n| n.is_element())
            .map(|n| n.name.as_str())
            .collect();
        assert_eq!(names, vec!["div", "span", "p"]);
    }

    #[test]
    fn test_text_content_concatenates() {
        let doc = sample();
        assert_eq!(doc.text_content(), "one two");
    }

    #[test]
    fn test_attr_lookup() {
        let doc = sample();
        let div = &doc.children[0];
        assert_eq!(div.attr("class"), Some("a b"));
        assert_eq!(div.attr("CLASS"), Some("a b"));
        assert_eq!(div.attr("id"), None);
    }
}
