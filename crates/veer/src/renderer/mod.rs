//! Renderers
//!
//! A [`Renderer`] carries one incoming snapshot into the live document.
//! Page renders (replace, morph, error) work on the whole document, frame
//! renders on a single `<veer-frame>`. Every variant runs its mutation
//! inside [`permanent::preserve`].

pub mod head;
pub mod morph;
pub mod permanent;
mod frame;
mod page;

use crate::adapter::{BehaviorHost, ReloadReason};
use crate::events::{EventBus, EventDetail, EventName, RenderFn};
use crate::snapshot::{self, PageSnapshot, RefreshMethod, PREVIEW_ATTRIBUTE};
use head::HeadMergeStats;
use morph::MorphStats;
use veer_dom::{Document, NodeId};

/// Which render to perform
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RenderKind {
    /// Swap the body
    Replace,
    /// Reconcile the body in place
    Morph,
    /// Replace the children of the live frame `target` with those of
    /// `source`, an element of the snapshot's tree
    Frame { target: NodeId, source: NodeId },
    /// Swap head and body of a failed response
    Error,
}

/// What a render did to the live document
#[derive(Debug, Clone, Default)]
pub struct RenderOutcome {
    pub morph: Option<MorphStats>,
    /// `refresh="morph"` frames the caller should reload
    pub frames_to_reload: Vec<NodeId>,
    /// Script elements that entered the document and would execute
    pub scripts_activated: Vec<NodeId>,
    pub autofocus: Option<NodeId>,
    /// Elements the render inserted, for behavior hosts
    pub inserted: Vec<NodeId>,
}

/// A pending render of `snapshot`
pub struct Renderer {
    pub kind: RenderKind,
    snapshot: PageSnapshot,
    /// Substituted by a `BeforeRender` or `BeforeFrameRender` listener
    pub custom_render: Option<RenderFn>,
    pub is_preview: bool,
    pub will_render: bool,
    head: HeadMergeStats,
}

impl Renderer {
    pub fn new(kind: RenderKind, snapshot: PageSnapshot) -> Self {
        Self {
            kind,
            snapshot,
            custom_render: None,
            is_preview: false,
            will_render: true,
            head: HeadMergeStats::default(),
        }
    }

    pub fn replace(snapshot: PageSnapshot) -> Self {
        Self::new(RenderKind::Replace, snapshot)
    }

    pub fn morph(snapshot: PageSnapshot) -> Self {
        Self::new(RenderKind::Morph, snapshot)
    }

    pub fn error(snapshot: PageSnapshot) -> Self {
        Self::new(RenderKind::Error, snapshot)
    }

    /// A page renderer for the given refresh method
    pub fn for_method(method: RefreshMethod, snapshot: PageSnapshot) -> Self {
        match method {
            RefreshMethod::Morph => Self::morph(snapshot),
            RefreshMethod::Replace => Self::replace(snapshot),
        }
    }

    pub fn preview(mut self) -> Self {
        self.is_preview = true;
        self
    }

    pub fn snapshot(&self) -> &PageSnapshot {
        &self.snapshot
    }

    pub fn method(&self) -> RefreshMethod {
        match self.kind {
            RenderKind::Morph => RefreshMethod::Morph,
            _ => RefreshMethod::Replace,
        }
    }

    fn is_page(&self) -> bool {
        matches!(self.kind, RenderKind::Replace | RenderKind::Morph)
    }

    /// Whether the snapshot may be rendered into `current` at all. A
    /// failure means the page has to be reloaded natively.
    pub fn should_render(&self, current: &Document) -> Result<(), ReloadReason> {
        if !self.is_page() {
            return Ok(());
        }
        if !self.snapshot.is_visitable() {
            return Err(ReloadReason::NotVisitable);
        }
        if self.snapshot.tracked_element_signature() != snapshot::tracked_element_signature(current) {
            return Err(ReloadReason::TrackedElementMismatch);
        }
        Ok(())
    }

    /// Merge the head and flag previews
    pub fn prepare_to_render(&mut self, document: &mut Document) {
        if !self.is_page() {
            return;
        }
        self.head = head::merge(document, &self.snapshot);
        let root = document.document_element();
        if self.is_preview {
            document.tree_mut().set_attr(root, PREVIEW_ATTRIBUTE, "");
        } else {
            document.tree_mut().remove_attr(root, PREVIEW_ATTRIBUTE);
        }
    }

    /// Carry the snapshot into `document`, then free whatever the render
    /// detached
    pub fn render(&mut self, document: &mut Document, events: &EventBus, behaviors: &dyn BehaviorHost) -> RenderOutcome {
        let outcome = self.apply(document, events, behaviors);
        document.tree_mut().collect_garbage();
        outcome
    }

    fn apply(&mut self, document: &mut Document, events: &EventBus, behaviors: &dyn BehaviorHost) -> RenderOutcome {
        let mut outcome = RenderOutcome {
            scripts_activated: std::mem::take(&mut self.head.scripts_activated),
            ..Default::default()
        };

        if let Some(custom) = self.custom_render.clone() {
            tracing::debug!(kind = ?self.kind, "custom render");
            custom(document, self.snapshot.document());
            return outcome;
        }

        match self.kind.clone() {
            RenderKind::Replace => {
                let body = page::replace_body(document, &self.snapshot);
                if !self.is_preview {
                    outcome.scripts_activated.extend(page::scripts(document, body));
                }
                outcome.autofocus = page::autofocus(document, body);
            }
            RenderKind::Morph => {
                let result = page::morph_body(document, &self.snapshot, events);
                events.notify(
                    EventName::Morph,
                    EventDetail { render_method: Some(RefreshMethod::Morph), ..Default::default() },
                );
                outcome.morph = Some(result.stats);
                outcome.frames_to_reload = result.frames_to_reload;
                outcome.autofocus = page::autofocus(document, document.body());
            }
            RenderKind::Error => {
                let (head, body) = page::replace_document(document, &self.snapshot);
                outcome.scripts_activated.extend(page::scripts(document, head));
                outcome.scripts_activated.extend(page::scripts(document, body));
                outcome.autofocus = page::autofocus(document, body);
            }
            RenderKind::Frame { target, source } => {
                let result = frame::render(document, target, self.snapshot.tree(), source, behaviors);
                outcome.frames_to_reload = result.frames_to_reload;
                outcome.scripts_activated.extend(result.scripts);
                outcome.autofocus = result.autofocus;
                outcome.inserted = result.inserted;
            }
        }
        tracing::debug!(
            kind = ?self.kind,
            preview = self.is_preview,
            scripts = outcome.scripts_activated.len(),
            "rendered"
        );
        outcome
    }
}

impl std::fmt::Debug for Renderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Renderer")
            .field("kind", &self.kind)
            .field("url", &self.snapshot.url())
            .field("is_preview", &self.is_preview)
            .field("custom_render", &self.custom_render.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::NoopBehaviorHost;

    const URL: &str = "https://example.com/";

    fn render(doc: &mut Document, mut renderer: Renderer) -> RenderOutcome {
        renderer.prepare_to_render(doc);
        renderer.render(doc, &EventBus::new(), &NoopBehaviorHost)
    }

    #[test]
    fn test_should_render_checks_tracked_signature() {
        let current = veer_html::parse_document(
            r#"<head><script src="/v1.js" data-veer-track="reload"></script></head>"#,
            URL,
        );
        let same = PageSnapshot::from_html(
            r#"<head><script src="/v1.js" data-veer-track="reload"></script></head><body>x</body>"#,
            URL,
        );
        let changed = PageSnapshot::from_html(
            r#"<head><script src="/v2.js" data-veer-track="reload"></script></head>"#,
            URL,
        );
        let opted_out = PageSnapshot::from_html(
            r#"<head><meta name="veer-visit-control" content="reload"><script src="/v1.js" data-veer-track="reload"></script></head>"#,
            URL,
        );

        assert_eq!(Renderer::replace(same).should_render(&current), Ok(()));
        assert_eq!(
            Renderer::morph(changed).should_render(&current),
            Err(ReloadReason::TrackedElementMismatch)
        );
        assert_eq!(Renderer::replace(opted_out).should_render(&current), Err(ReloadReason::NotVisitable));
    }

    #[test]
    fn test_replace_render() {
        let mut doc = veer_html::parse_document("<title>A</title><p>old</p>", URL);
        let snapshot = PageSnapshot::from_html(
            r#"<title>B</title><p>new</p><input id="q" autofocus><script>boot()</script>"#,
            URL,
        );
        let outcome = render(&mut doc, Renderer::replace(snapshot));

        assert_eq!(doc.title(), "B");
        assert_eq!(doc.tree().text_content(doc.body()).trim(), "newboot()");
        assert_eq!(outcome.autofocus, doc.get_element_by_id("q"));
        assert_eq!(outcome.scripts_activated.len(), 1);
        assert!(!doc.tree().has_attr(doc.document_element(), PREVIEW_ATTRIBUTE));
    }

    #[test]
    fn test_preview_flag() {
        let mut doc = veer_html::parse_document("<p>old</p>", URL);
        let snapshot = PageSnapshot::from_html("<p>cached</p>", URL);
        render(&mut doc, Renderer::replace(snapshot).preview());
        assert!(doc.tree().has_attr(doc.document_element(), PREVIEW_ATTRIBUTE));

        let snapshot = PageSnapshot::from_html("<p>fresh</p>", URL);
        render(&mut doc, Renderer::replace(snapshot));
        assert!(!doc.tree().has_attr(doc.document_element(), PREVIEW_ATTRIBUTE));
    }

    #[test]
    fn test_morph_render_keeps_nodes() {
        let mut doc = veer_html::parse_document(r#"<ul><li id="a">A</li><li id="b">B</li></ul>"#, URL);
        let a = doc.get_element_by_id("a").unwrap();
        let snapshot = PageSnapshot::from_html(r#"<ul><li id="b">B</li><li id="a">A2</li></ul>"#, URL);
        let outcome = render(&mut doc, Renderer::morph(snapshot));

        assert_eq!(doc.get_element_by_id("a"), Some(a));
        assert_eq!(doc.tree().text_content(a), "A2");
        assert!(outcome.morph.is_some_and(|s| !s.is_noop()));
    }

    #[test]
    fn test_error_render_replaces_head_and_body() {
        let mut doc = veer_html::parse_document("<title>App</title><p>page</p>", URL);
        let snapshot = PageSnapshot::from_html(
            "<title>Oops</title><script>report()</script><h1>500</h1>",
            URL,
        );
        let outcome = render(&mut doc, Renderer::error(snapshot));
        assert_eq!(doc.title(), "Oops");
        assert_eq!(doc.tree().text_content(doc.body()).trim(), "500");
        assert_eq!(outcome.scripts_activated.len(), 1);
    }

    #[test]
    fn test_custom_render_substitutes() {
        let mut doc = veer_html::parse_document("<p>old</p>", URL);
        let mut renderer = Renderer::replace(PageSnapshot::from_html("<p>new</p>", URL));
        renderer.custom_render = Some(std::rc::Rc::new(|doc: &mut Document, _new: &Document| {
            let body = doc.body();
            doc.tree_mut().set_text_content(body, "custom");
        }));
        render(&mut doc, renderer);
        assert_eq!(doc.tree().text_content(doc.body()), "custom");
    }
}
