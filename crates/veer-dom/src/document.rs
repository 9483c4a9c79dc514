//! Document - High-level document API

use crate::{DomTree, NodeId};

/// HTML Document
#[derive(Debug, Clone)]
pub struct Document {
    /// The DOM tree
    pub tree: DomTree,
    /// Document URL
    url: String,
    /// Cached reference to <html> element
    html_element: NodeId,
    /// Cached reference to <head> element
    head_element: NodeId,
    /// Cached reference to <body> element
    body_element: NodeId,
}

impl Document {
    /// Create a new document with an empty html/head/body skeleton
    pub fn new(url: &str) -> Self {
        let mut tree = DomTree::new();

        let html = tree.create_element("html");
        let head = tree.create_element("head");
        let body = tree.create_element("body");

        let root = tree.root();
        tree.append_child(root, html);
        tree.append_child(html, head);
        tree.append_child(html, body);

        Self {
            tree,
            url: url.to_string(),
            html_element: html,
            head_element: head,
            body_element: body,
        }
    }

    /// Wrap an existing tree, locating html/head/body
    pub fn from_tree(tree: DomTree, url: &str) -> Self {
        let mut document = Self {
            tree,
            url: url.to_string(),
            html_element: NodeId::NONE,
            head_element: NodeId::NONE,
            body_element: NodeId::NONE,
        };
        document.finalize();
        document
    }

    /// Locate (or create) the html, head and body elements
    pub fn finalize(&mut self) {
        let root = self.tree.root();
        let found = self.tree.children(root).find(|&c| self.tree.has_tag(c, "html"));
        let html = match found {
            Some(html) => html,
            None => {
                let html = self.tree.create_element("html");
                self.tree.append_child(root, html);
                html
            }
        };
        let found = self.tree.children(html).find(|&c| self.tree.has_tag(c, "head"));
        let head = match found {
            Some(head) => head,
            None => {
                let head = self.tree.create_element("head");
                let first = self.tree.first_child(html);
                self.tree.insert_before(html, head, first);
                head
            }
        };
        let found = self.tree.children(html).find(|&c| self.tree.has_tag(c, "body"));
        let body = match found {
            Some(body) => body,
            None => {
                let body = self.tree.create_element("body");
                self.tree.append_child(html, body);
                body
            }
        };
        self.html_element = html;
        self.head_element = head;
        self.body_element = body;
    }

    /// A copy without the detached nodes the live tree has accumulated
    pub fn compacted(&self) -> Document {
        Document::from_tree(self.tree.compacted(), &self.url)
    }

    /// Get document URL
    pub fn url(&self) -> &str {
        &self.url
    }

    pub fn set_url(&mut self, url: &str) {
        self.url = url.to_string();
    }

    /// Get document title
    pub fn title(&self) -> String {
        self.tree
            .children(self.head_element)
            .find(|&c| self.tree.has_tag(c, "title"))
            .map(|t| self.tree.text_content(t).trim().to_string())
            .unwrap_or_default()
    }

    /// Get <html> element
    pub fn document_element(&self) -> NodeId {
        self.html_element
    }

    /// Get <head> element
    pub fn head(&self) -> NodeId {
        self.head_element
    }

    /// Get <body> element
    pub fn body(&self) -> NodeId {
        self.body_element
    }

    /// Swap in a new body element. The old body is detached and returned.
    pub fn replace_body(&mut self, new_body: NodeId) -> NodeId {
        let old = self.body_element;
        self.tree.replace_node(old, new_body);
        if self.tree.parent(new_body).is_none() {
            self.tree.append_child(self.html_element, new_body);
        }
        self.body_element = new_body;
        old
    }

    /// Swap in a new head element. The old head is detached and returned.
    pub fn replace_head(&mut self, new_head: NodeId) -> NodeId {
        let old = self.head_element;
        self.tree.replace_node(old, new_head);
        if self.tree.parent(new_head).is_none() {
            let first = self.tree.first_child(self.html_element);
            self.tree.insert_before(self.html_element, new_head, first);
        }
        self.head_element = new_head;
        old
    }

    /// Get element by ID anywhere in the document
    pub fn get_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.tree.get_element_by_id(self.tree.root(), id)
    }

    /// `content` of `<meta name="...">` in the head
    pub fn meta_content(&self, name: &str) -> Option<&str> {
        self.tree
            .find_first(self.head_element, |e| e.tag == "meta" && e.get_attr("name") == Some(name))
            .and_then(|meta| self.tree.attr(meta, "content"))
    }

    /// Access the DOM tree
    pub fn tree(&self) -> &DomTree {
        &self.tree
    }

    /// Access the DOM tree mutably
    pub fn tree_mut(&mut self) -> &mut DomTree {
        &mut self.tree
    }

    /// Memory usage in bytes
    pub fn memory_usage(&self) -> usize {
        self.tree.memory_usage() + self.url.capacity()
    }
}

impl Default for Document {
    fn default() -> Self {
        Self::new("about:blank")
    }
}
