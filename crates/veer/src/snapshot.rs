//! Page snapshots
//!
//! A snapshot owns a complete document, either captured from the live page
//! or parsed from a response. Policy flags come from `<meta name="veer-*">`
//! elements in its head.

use veer_dom::{Document, DomTree, NodeId};
use veer_html::outer_html;

/// Marks an element that survives renders by identity
pub const PERMANENT_ATTRIBUTE: &str = "data-veer-permanent";

/// Head tracking marker
pub const TRACK_ATTRIBUTE: &str = "data-veer-track";

/// Set on the document element while a cached preview is showing
pub const PREVIEW_ATTRIBUTE: &str = "data-veer-preview";

/// How a same-page refresh is rendered
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshMethod {
    #[default]
    Replace,
    Morph,
}

impl RefreshMethod {
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some("morph") => RefreshMethod::Morph,
            _ => RefreshMethod::Replace,
        }
    }
}

/// What happens to the scroll position on a same-page refresh
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RefreshScroll {
    #[default]
    Reset,
    Preserve,
}

impl RefreshScroll {
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some("preserve") => RefreshScroll::Preserve,
            _ => RefreshScroll::Reset,
        }
    }
}

/// An owned copy of a page
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    document: Document,
}

impl PageSnapshot {
    /// Capture the live page, leaving its detached nodes behind
    pub fn from_document(document: &Document) -> Self {
        Self { document: document.compacted() }
    }

    /// Parse a fetched page
    pub fn from_html(html: &str, url: &str) -> Self {
        Self { document: veer_html::parse_document(html, url) }
    }

    pub fn document(&self) -> &Document {
        &self.document
    }

    pub fn into_document(self) -> Document {
        self.document
    }

    pub fn tree(&self) -> &DomTree {
        self.document.tree()
    }

    pub fn url(&self) -> &str {
        self.document.url()
    }

    pub fn head(&self) -> NodeId {
        self.document.head()
    }

    pub fn body(&self) -> NodeId {
        self.document.body()
    }

    pub fn setting(&self, name: &str) -> Option<&str> {
        self.document.meta_content(&format!("veer-{name}"))
    }

    pub fn cache_control(&self) -> Option<&str> {
        self.setting("cache-control")
    }

    pub fn is_cacheable(&self) -> bool {
        self.cache_control() != Some("no-cache")
    }

    /// Usable as an instant preview while the real page loads
    pub fn is_previewable(&self) -> bool {
        self.cache_control() != Some("no-preview") && !self.is_preview()
    }

    /// False when the page asks to always be loaded natively
    pub fn is_visitable(&self) -> bool {
        self.setting("visit-control") != Some("reload")
    }

    /// Captured while a preview was on screen
    pub fn is_preview(&self) -> bool {
        self.tree().has_attr(self.document.document_element(), PREVIEW_ATTRIBUTE)
    }

    pub fn refresh_method(&self) -> RefreshMethod {
        RefreshMethod::from_attribute(self.setting("refresh-method"))
    }

    pub fn refresh_scroll(&self) -> RefreshScroll {
        RefreshScroll::from_attribute(self.setting("refresh-scroll"))
    }

    /// Root path declared by the page
    pub fn root_location(&self) -> Option<&str> {
        self.setting("root")
    }

    /// Head elements tracked for asset changes
    pub fn tracked_elements(&self) -> Vec<NodeId> {
        self.tree()
            .find_all(self.head(), |e| e.get_attr(TRACK_ATTRIBUTE) == Some("reload"))
    }

    /// Markup of every tracked element, in order. Two pages with different
    /// signatures load different assets.
    pub fn tracked_element_signature(&self) -> String {
        tracked_element_signature(&self.document)
    }

    /// `[id][data-veer-permanent]` elements in the body
    pub fn permanent_elements(&self) -> Vec<NodeId> {
        permanent_elements(self.tree(), self.body())
    }

    pub fn permanent_element_by_id(&self, id: &str) -> Option<NodeId> {
        self.permanent_elements()
            .into_iter()
            .find(|&e| self.tree().element_id(e) == Some(id))
    }

    /// The first element under the body carrying `autofocus`
    pub fn autofocus_element(&self) -> Option<NodeId> {
        self.tree().find_first(self.body(), |e| e.has_attr("autofocus"))
    }
}

/// Tracked-element signature of any document, live or not
pub fn tracked_element_signature(document: &Document) -> String {
    document
        .tree()
        .find_all(document.head(), |e| e.get_attr(TRACK_ATTRIBUTE) == Some("reload"))
        .into_iter()
        .map(|e| outer_html(document.tree(), e))
        .collect()
}

/// Permanent elements under `root`
pub(crate) fn permanent_elements(tree: &DomTree, root: NodeId) -> Vec<NodeId> {
    tree.find_all(root, |e| e.id().is_some() && e.has_attr(PERMANENT_ATTRIBUTE))
}

#[cfg(test)]
mod tests {
    use super::*;

    const PAGE: &str = r#"<html><head>
        <meta name="veer-cache-control" content="no-preview">
        <meta name="veer-refresh-method" content="morph">
        <meta name="veer-refresh-scroll" content="preserve">
        <link rel="stylesheet" href="/a.css" data-veer-track="reload">
        <script src="/a.js" data-veer-track="reload"></script>
        <link rel="stylesheet" href="/b.css">
        </head><body><div id="player" data-veer-permanent></div><div data-veer-permanent></div></body></html>"#;

    #[test]
    fn test_flags() {
        let snapshot = PageSnapshot::from_html(PAGE, "https://example.com/");
        assert!(snapshot.is_cacheable());
        assert!(!snapshot.is_previewable());
        assert!(snapshot.is_visitable());
        assert_eq!(snapshot.refresh_method(), RefreshMethod::Morph);
        assert_eq!(snapshot.refresh_scroll(), RefreshScroll::Preserve);
    }

    #[test]
    fn test_defaults_without_meta() {
        let snapshot = PageSnapshot::from_html("<p>x</p>", "https://example.com/");
        assert!(snapshot.is_cacheable());
        assert!(snapshot.is_previewable());
        assert!(snapshot.is_visitable());
        assert_eq!(snapshot.refresh_method(), RefreshMethod::Replace);
        assert_eq!(snapshot.tracked_element_signature(), "");
    }

    #[test]
    fn test_tracked_signature_and_permanents() {
        let snapshot = PageSnapshot::from_html(PAGE, "https://example.com/");
        let signature = snapshot.tracked_element_signature();
        assert!(signature.contains("/a.css"));
        assert!(signature.contains("/a.js"));
        assert!(!signature.contains("/b.css"));

        let permanents = snapshot.permanent_elements();
        assert_eq!(permanents.len(), 1);
        assert!(snapshot.permanent_element_by_id("player").is_some());
    }

    #[test]
    fn test_capture_is_insulated() {
        let mut live = veer_html::parse_document("<p id=\"a\">x</p>", "https://example.com/");
        let snapshot = PageSnapshot::from_document(&live);
        let p = live.get_element_by_id("a").unwrap();
        live.tree_mut().set_attr(p, "class", "changed");
        let copy = snapshot.document().get_element_by_id("a").unwrap();
        assert_eq!(snapshot.tree().attr(copy, "class"), None);
    }

    #[test]
    fn test_capture_leaves_detached_nodes_behind() {
        let mut live = veer_html::parse_document("<ul><li>1</li><li>2</li></ul>", "https://example.com/");
        let stale = live.tree_mut().create_element("section");
        let text = live.tree_mut().create_text("gone");
        live.tree_mut().append_child(stale, text);

        let snapshot = PageSnapshot::from_document(&live);
        let mut reachable = live.clone();
        assert!(reachable.tree_mut().collect_garbage() >= 2);
        assert_eq!(snapshot.tree().len(), reachable.tree().len());
        assert_eq!(veer_html::outer_html(snapshot.tree(), snapshot.body()), veer_html::outer_html(live.tree(), live.body()));
    }
}
