//! Markup output
//!
//! Turns arena nodes back into HTML. Snapshots, the head merge and tracked
//! element fingerprints all compare pages through this text form, so the
//! output is canonical: attributes in stored order, boolean attributes
//! written bare, no self-closing syntax.

use veer_dom::{DomTree, ElementData, NodeData, NodeId};

/// Elements that never have an end tag
const VOID_TAGS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source", "track", "wbr",
];

/// Elements whose text is written verbatim
const VERBATIM_TAGS: &[&str] = &["script", "style"];

/// Writes subtrees of a [`DomTree`] as HTML
#[derive(Debug, Default)]
pub struct HtmlSerializer {
    out: String,
}

impl HtmlSerializer {
    pub fn new() -> Self {
        Self::default()
    }

    /// `node` followed by its subtree
    pub fn write_node(mut self, tree: &DomTree, node: NodeId) -> String {
        self.node(tree, node);
        self.out
    }

    /// The subtree below `node`
    pub fn write_children(mut self, tree: &DomTree, node: NodeId) -> String {
        self.children(tree, node);
        self.out
    }

    fn node(&mut self, tree: &DomTree, id: NodeId) {
        let Some(node) = tree.get(id) else { return };
        match &node.data {
            NodeData::Document | NodeData::Fragment => self.children(tree, id),
            NodeData::Element(element) => self.element(tree, id, element),
            NodeData::Text(text) => escape_into(&mut self.out, text, false),
            NodeData::Comment(text) => {
                self.out.push_str("<!--");
                self.out.push_str(text);
                self.out.push_str("-->");
            }
            NodeData::Doctype { name } => {
                self.out.push_str("<!DOCTYPE ");
                self.out.push_str(name);
                self.out.push('>');
            }
        }
    }

    fn element(&mut self, tree: &DomTree, id: NodeId, element: &ElementData) {
        let tag = element.tag.as_str();
        self.out.push('<');
        self.out.push_str(tag);
        for attr in &element.attrs {
            self.out.push(' ');
            self.out.push_str(&attr.name);
            if attr.value.is_empty() {
                continue;
            }
            self.out.push_str("=\"");
            escape_into(&mut self.out, &attr.value, true);
            self.out.push('"');
        }
        self.out.push('>');

        if VOID_TAGS.contains(&tag) {
            return;
        }
        if VERBATIM_TAGS.contains(&tag) {
            let text: String = tree.children(id).filter_map(|c| tree.get(c)?.as_text()).collect();
            self.out.push_str(&text);
        } else {
            self.children(tree, id);
        }
        self.out.push_str("</");
        self.out.push_str(tag);
        self.out.push('>');
    }

    fn children(&mut self, tree: &DomTree, id: NodeId) {
        for child in tree.children(id) {
            self.node(tree, child);
        }
    }
}

/// Append `text` to `out` with markup characters replaced. Quotes only
/// need escaping inside attribute values.
fn escape_into(out: &mut String, text: &str, attribute: bool) {
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

/// Markup of the children of `node`
pub fn inner_html(tree: &DomTree, node: NodeId) -> String {
    HtmlSerializer::new().write_children(tree, node)
}

/// Markup of `node` itself
pub fn outer_html(tree: &DomTree, node: NodeId) -> String {
    HtmlSerializer::new().write_node(tree, node)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn escaped(text: &str, attribute: bool) -> String {
        let mut out = String::new();
        escape_into(&mut out, text, attribute);
        out
    }

    #[test]
    fn test_quotes_escaped_only_in_attributes() {
        assert_eq!(escaped(r#"say "a<b" & go"#, false), r#"say "a&lt;b" &amp; go"#);
        assert_eq!(escaped(r#"say "a<b" & go"#, true), "say &quot;a&lt;b&quot; &amp; go");
    }

    #[test]
    fn test_element_markup() {
        let mut tree = DomTree::new();
        let root = tree.root();
        let div = tree.create_element_with_attrs("div", &[("id", "x"), ("hidden", "")]);
        let br = tree.create_element("br");
        let text = tree.create_text("a < b");
        tree.append_child(root, div);
        tree.append_child(div, text);
        tree.append_child(div, br);

        assert_eq!(outer_html(&tree, div), r#"<div id="x" hidden>a &lt; b<br></div>"#);
        assert_eq!(inner_html(&tree, div), "a &lt; b<br>");
    }

    #[test]
    fn test_script_text_is_verbatim() {
        let mut tree = DomTree::new();
        let root = tree.root();
        let script = tree.create_element("script");
        let code = tree.create_text("if (a < b) {}");
        tree.append_child(root, script);
        tree.append_child(script, code);
        assert_eq!(outer_html(&tree, script), "<script>if (a < b) {}</script>");
    }
}
