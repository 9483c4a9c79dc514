//! HTML5 Parser implementation
//!
//! Uses html5ever's RcDom and converts to our arena DOM.

use html5ever::parse_document;
use html5ever::tendril::TendrilSink;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};
use veer_dom::{Document, DomTree, NodeId};

/// Elements whose whitespace-only text is significant
const WHITESPACE_PRESERVING: &[&str] = &["pre", "textarea", "script", "style"];

/// HTML5 parser
pub struct HtmlParser;

impl HtmlParser {
    /// Create a new HTML parser
    pub fn new() -> Self {
        Self
    }

    /// Parse HTML string into a Document
    pub fn parse(&self, html: &str) -> Document {
        self.parse_with_url(html, "about:blank")
    }

    /// Parse HTML with a base URL
    pub fn parse_with_url(&self, html: &str, url: &str) -> Document {
        tracing::debug!("Parsing HTML document: {}", url);

        let dom = parse_document(RcDom::default(), Default::default()).one(html);

        let mut tree = DomTree::new();
        let root = tree.root();
        self.convert_children(&dom.document, &mut tree, root);

        let document = Document::from_tree(tree, url);
        tracing::debug!("Parsed {} nodes", document.tree().len());
        document
    }

    /// Parse a fragment. Any content model is accepted, including table
    /// rows, head elements and nested templates, because the markup is
    /// parsed as the contents of a `<template>`.
    pub fn parse_fragment(&self, html: &str) -> DomTree {
        let wrapped = format!("<template>{html}</template>");
        let dom = parse_document(RcDom::default(), Default::default()).one(wrapped);

        let mut tree = DomTree::new_fragment();
        let root = tree.root();
        if let Some(contents) = find_template_contents(&dom.document) {
            self.convert_children(&contents, &mut tree, root);
        }
        tree
    }

    fn convert_children(&self, handle: &Handle, tree: &mut DomTree, parent: NodeId) {
        for child in handle.children.borrow().iter() {
            self.convert_node(child, tree, parent);
        }
    }

    /// Convert an RcDom node to our DOM format
    fn convert_node(&self, handle: &Handle, tree: &mut DomTree, parent: NodeId) {
        match &handle.data {
            RcNodeData::Document => {
                self.convert_children(handle, tree, parent);
            }
            RcNodeData::Doctype { name, .. } => {
                let id = tree.create_doctype(name);
                tree.append_child(parent, id);
            }
            RcNodeData::Text { contents } => {
                let text = contents.borrow().to_string();
                let preserve = tree
                    .tag(parent)
                    .is_some_and(|tag| WHITESPACE_PRESERVING.contains(&tag));
                if preserve || !text.trim().is_empty() {
                    let id = tree.create_text(&text);
                    tree.append_child(parent, id);
                }
            }
            RcNodeData::Comment { contents } => {
                let id = tree.create_comment(contents);
                tree.append_child(parent, id);
            }
            RcNodeData::Element { name, attrs, template_contents, .. } => {
                let id = tree.create_element(&name.local);
                for attr in attrs.borrow().iter() {
                    tree.set_attr(id, &attr.name.local, &attr.value);
                }
                tree.append_child(parent, id);

                // Template contents become ordinary children so they can be
                // imported like any other subtree
                if let Some(contents) = template_contents.borrow().as_ref() {
                    self.convert_children(contents, tree, id);
                }
                self.convert_children(handle, tree, id);
            }
            RcNodeData::ProcessingInstruction { .. } => {
                // Ignore processing instructions
            }
        }
    }
}

impl Default for HtmlParser {
    fn default() -> Self {
        Self::new()
    }
}

/// Depth-first search for the first `<template>` and return its contents
fn find_template_contents(handle: &Handle) -> Option<Handle> {
    if let RcNodeData::Element { name, template_contents, .. } = &handle.data {
        if &*name.local == "template" {
            return template_contents.borrow().clone();
        }
    }
    handle.children.borrow().iter().find_map(find_template_contents)
}
