//! Frames
//!
//! A `<veer-frame id=...>` is a region of the page that navigates on its
//! own. Each connected frame gets a [`FrameController`] in the session's
//! [`FrameRegistry`]. Eager frames load as soon as they connect, lazy ones
//! when the embedder reports them visible.

use crate::error::{Result, VeerError};
use crate::events::{EventDetail, EventName, LifecycleEvent};
use crate::navigator;
use crate::renderer::{RenderKind, Renderer};
use crate::session::Session;
use crate::snapshot::PageSnapshot;
use crate::visit::{VisitAction, VisitOptions};
use smol::future::{BoxedLocal, FutureExt};
use std::collections::HashMap;
use veer_dom::{Document, DomTree, NodeId};
use veer_net::{AbortSignal, FetchRequest, FetchResponse, Location, NetError};

/// Tag name of frame elements
pub const FRAME_TAG: &str = "veer-frame";

/// Rendered into a frame whose response lacks it
const MISSING_CONTENT: &str = r#"<strong class="veer-frame-error">Content missing</strong>"#;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FrameLoading {
    #[default]
    Eager,
    Lazy,
}

impl FrameLoading {
    pub fn from_attribute(value: Option<&str>) -> Self {
        match value {
            Some("lazy") => FrameLoading::Lazy,
            _ => FrameLoading::Eager,
        }
    }
}

/// Load state of one frame
#[derive(Debug)]
pub struct FrameController {
    id: String,
    loading: FrameLoading,
    appeared: bool,
    loaded: Option<Location>,
    /// The live element this controller drives, with its arena generation
    element: (NodeId, u32),
    signal: AbortSignal,
}

impl FrameController {
    pub fn new(id: &str, loading: FrameLoading) -> Self {
        Self {
            id: id.to_string(),
            loading,
            appeared: false,
            loaded: None,
            element: (NodeId::NONE, 0),
            signal: AbortSignal::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn loading(&self) -> FrameLoading {
        self.loading
    }

    pub fn has_appeared(&self) -> bool {
        self.appeared
    }

    pub fn loaded_location(&self) -> Option<&Location> {
        self.loaded.as_ref()
    }

    /// Whether `src` still has to be fetched. Lazy frames wait until they
    /// have appeared.
    pub fn should_load(&self, src: &Location) -> bool {
        let ready = self.loading == FrameLoading::Eager || self.appeared;
        ready && self.loaded.as_ref() != Some(src)
    }

    /// Start a new request, aborting the previous one
    fn begin(&mut self) -> AbortSignal {
        self.signal.abort();
        self.signal = AbortSignal::new();
        self.signal.clone()
    }

    /// Point the controller at `element`. A new element under the same id
    /// starts from scratch.
    fn attach(&mut self, element: (NodeId, u32), loading: FrameLoading) {
        self.loading = loading;
        if self.element == element {
            return;
        }
        if self.element.0.is_valid() {
            tracing::debug!(frame = %self.id, "frame element replaced");
        }
        self.begin();
        self.element = element;
        self.appeared = false;
        self.loaded = None;
    }
}

/// Controllers of the frames on the page, by id
#[derive(Debug, Default)]
pub struct FrameRegistry {
    controllers: HashMap<String, FrameController>,
}

impl FrameRegistry {
    pub fn get(&self, id: &str) -> Option<&FrameController> {
        self.controllers.get(id)
    }

    fn get_mut(&mut self, id: &str) -> Option<&mut FrameController> {
        self.controllers.get_mut(id)
    }

    /// The controller of frame `id`, attached to the live `element`
    fn controller(&mut self, id: &str, tree: &DomTree, element: NodeId, loading: FrameLoading) -> &mut FrameController {
        let controller = self.controllers.entry(id.to_string()).or_insert_with(|| FrameController::new(id, loading));
        controller.attach((element, tree.generation(element)), loading);
        controller
    }

    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Drop controllers whose frame left the page
    fn retain(&mut self, ids: &[String]) {
        self.controllers.retain(|id, controller| {
            let keep = ids.contains(id);
            if !keep {
                controller.signal.abort();
            }
            keep
        });
    }
}

/// The live frame element with `id`
pub fn find_frame(document: &Document, id: &str) -> Option<NodeId> {
    document.get_element_by_id(id).filter(|&f| document.tree().has_tag(f, FRAME_TAG))
}

fn frame_ids(tree: &DomTree, root: NodeId) -> Vec<(String, NodeId)> {
    tree.find_all(root, |e| e.tag == FRAME_TAG)
        .into_iter()
        .filter_map(|f| tree.element_id(f).map(|id| (id.to_string(), f)))
        .collect()
}

fn navigable(document: &Document, id: &str) -> Option<String> {
    let frame = find_frame(document, id)?;
    (!document.tree().has_attr(frame, "disabled")).then(|| id.to_string())
}

/// The frame a navigation from `element` (a link, form or submitter)
/// should go to, or `None` for a page visit
pub fn target_frame(document: &Document, element: NodeId) -> Option<String> {
    let tree = document.tree();
    let explicit = tree
        .closest(element, |e| e.has_attr("data-veer-frame"))
        .and_then(|e| tree.attr(e, "data-veer-frame"));
    if let Some(target) = explicit {
        return match target {
            "_top" => None,
            id => navigable(document, id),
        };
    }
    let frame = tree.ancestors(element).find(|&a| tree.has_tag(a, FRAME_TAG))?;
    match tree.attr(frame, "target") {
        Some("_top") => None,
        Some(id) => navigable(document, id),
        None => navigable(document, tree.element_id(frame)?),
    }
}

/// Register the frames on the page and load the eager ones
pub(crate) fn connect(session: Session) -> BoxedLocal<Result<()>> {
    async move {
        let inner = &session.inner;
        let pending = {
            let document = inner.document.borrow();
            let base = session.location();
            let frames = frame_ids(document.tree(), document.body());
            let mut registry = inner.frames.borrow_mut();
            registry.retain(&frames.iter().map(|(id, _)| id.clone()).collect::<Vec<_>>());
            let mut pending = Vec::new();
            for (id, frame) in frames {
                let tree = document.tree();
                let loading = FrameLoading::from_attribute(tree.attr(frame, "loading"));
                let controller = registry.controller(&id, tree, frame, loading);
                let src = tree.attr(frame, "src").and_then(|src| base.join(src).ok());
                // Restored from a snapshot with its content
                if controller.loaded.is_none() && tree.has_attr(frame, "complete") {
                    controller.loaded = src;
                    continue;
                }
                if let Some(src) = src.filter(|src| controller.should_load(src)) {
                    pending.push((id, src));
                }
            }
            pending
        };

        let mut first_error = None;
        for (id, src) in pending {
            if let Err(error) = navigate(session.clone(), id, FetchRequest::get(src), None).await {
                tracing::warn!(%error, "frame failed to load");
                first_error.get_or_insert(error);
            }
        }
        first_error.map_or(Ok(()), Err)
    }
    .boxed_local()
}

/// A lazy frame scrolled into view
pub(crate) fn appeared(session: Session, id: String) -> BoxedLocal<Result<()>> {
    async move {
        let src = {
            let document = session.inner.document.borrow();
            let frame = find_frame(&document, &id).ok_or_else(|| VeerError::UnknownFrame(id.clone()))?;
            let tree = document.tree();
            let loading = FrameLoading::from_attribute(tree.attr(frame, "loading"));
            let mut registry = session.inner.frames.borrow_mut();
            let controller = registry.controller(&id, tree, frame, loading);
            controller.appeared = true;
            tree.attr(frame, "src")
                .and_then(|src| session.location().join(src).ok())
                .filter(|src| controller.should_load(src))
        };
        match src {
            Some(src) => navigate(session, id, FetchRequest::get(src), None).await,
            None => Ok(()),
        }
    }
    .boxed_local()
}

/// Fetch a frame's `src` again, even if it is already loaded
pub(crate) fn reload(session: Session, id: String) -> BoxedLocal<Result<()>> {
    async move {
        let src = {
            let document = session.inner.document.borrow();
            let frame = find_frame(&document, &id).ok_or_else(|| VeerError::UnknownFrame(id.clone()))?;
            document.tree().attr(frame, "src").and_then(|src| session.location().join(src).ok())
        };
        match src {
            Some(src) => navigate(session, id, FetchRequest::get(src), None).await,
            None => Ok(()),
        }
    }
    .boxed_local()
}

enum Extracted {
    Found(NodeId),
    Nested(Location),
    Missing,
}

fn extract(snapshot: &PageSnapshot, id: &str) -> Extracted {
    let tree = snapshot.tree();
    let root = tree.root();
    if let Some(frame) = tree.find_first(root, |e| e.tag == FRAME_TAG && e.id() == Some(id)) {
        return Extracted::Found(frame);
    }
    let nested = tree.find_first(root, |e| {
        e.tag == FRAME_TAG
            && e.has_attr("src")
            && e.get_attr("recurse").is_some_and(|r| r.split_ascii_whitespace().any(|t| t == id))
    });
    let src = nested
        .and_then(|f| tree.attr(f, "src"))
        .and_then(|src| Location::parse(snapshot.url()).and_then(|base| base.join(src)).ok());
    match src {
        Some(src) => Extracted::Nested(src),
        None => Extracted::Missing,
    }
}

fn set_busy(session: &Session, id: &str, busy: bool) {
    let mut document = session.inner.document.borrow_mut();
    let Some(frame) = find_frame(&document, id) else { return };
    let tree = document.tree_mut();
    if busy {
        tree.set_attr(frame, "busy", "");
        tree.set_attr(frame, "aria-busy", "true");
        tree.remove_attr(frame, "complete");
    } else {
        tree.remove_attr(frame, "busy");
        tree.remove_attr(frame, "aria-busy");
    }
}

/// Clear the busy flag after an aborted request, unless a newer navigation
/// of the frame is under way
fn release_aborted(session: &Session, id: &str) {
    let superseded = session.inner.frames.borrow().get(id).is_some_and(|c| !c.signal.is_aborted());
    if !superseded {
        set_busy(session, id, false);
    }
}

/// Navigate frame `id` with `request`. With an `action`, the navigation is
/// promoted to a page visit once the frame has rendered.
pub(crate) fn navigate(
    session: Session,
    id: String,
    request: FetchRequest,
    action: Option<VisitAction>,
) -> BoxedLocal<Result<()>> {
    async move {
        let inner = &session.inner;
        let (signal, page_snapshot) = {
            let document = inner.document.borrow();
            let frame = find_frame(&document, &id).ok_or_else(|| VeerError::UnknownFrame(id.clone()))?;
            let loading = FrameLoading::from_attribute(document.tree().attr(frame, "loading"));
            let signal = inner.frames.borrow_mut().controller(&id, document.tree(), frame, loading).begin();
            let snapshot = action.map(|_| PageSnapshot::from_document(&document));
            (signal, snapshot)
        };
        tracing::debug!(frame = %id, location = %request.location, "frame navigation");
        set_busy(&session, &id, true);

        let mut response = match session.fetch(request.with_frame(&id), &signal).await {
            Ok(Some(response)) => response,
            Ok(None) => {
                set_busy(&session, &id, false);
                return Ok(());
            }
            Err(NetError::Aborted) => {
                release_aborted(&session, &id);
                return Ok(());
            }
            Err(error) => {
                set_busy(&session, &id, false);
                return Err(error.into());
            }
        };

        let mut depth = 0;
        let (snapshot, source) = loop {
            let html = response.html_body().unwrap_or_default();
            let snapshot = PageSnapshot::from_html(&html, response.location.href());
            match extract(&snapshot, &id) {
                Extracted::Found(source) => break (snapshot, Some(source)),
                Extracted::Nested(src) if depth < inner.config.frame_recursion_limit => {
                    depth += 1;
                    tracing::debug!(frame = %id, %src, depth, "following nested frame");
                    response = match session.fetch(FetchRequest::get(src).with_frame(&id), &signal).await {
                        Ok(Some(response)) => response,
                        Ok(None) => {
                            set_busy(&session, &id, false);
                            return Ok(());
                        }
                        Err(NetError::Aborted) => {
                            release_aborted(&session, &id);
                            return Ok(());
                        }
                        Err(error) => {
                            set_busy(&session, &id, false);
                            return Err(error.into());
                        }
                    };
                }
                _ => break (snapshot, None),
            }
        };

        let Some(source) = source else {
            return missing(&session, &id, response).await;
        };
        let target = find_frame(&inner.document.borrow(), &id).ok_or_else(|| VeerError::UnknownFrame(id.clone()))?;

        let before = inner.events.dispatch(LifecycleEvent::new(
            EventName::BeforeFrameRender,
            EventDetail {
                element: Some(target),
                frame_id: Some(id.clone()),
                location: Some(response.location.clone()),
                ..Default::default()
            },
        ));
        if before.default_prevented() {
            set_busy(&session, &id, false);
            return Ok(());
        }

        smol::future::yield_now().await;
        if signal.is_aborted() {
            release_aborted(&session, &id);
            return Ok(());
        }

        let mut renderer = Renderer::new(RenderKind::Frame { target, source }, snapshot);
        renderer.custom_render = before.custom_render;
        let outcome = {
            let mut document = inner.document.borrow_mut();
            let outcome = renderer.render(&mut document, &inner.events, inner.behaviors.as_ref());
            let tree = document.tree_mut();
            tree.set_attr(target, "src", response.location.href());
            tree.set_attr(target, "complete", "");
            outcome
        };
        set_busy(&session, &id, false);
        if let Some(controller) = inner.frames.borrow_mut().get_mut(&id) {
            controller.loaded = Some(response.location.clone());
        }

        {
            let document = inner.document.borrow();
            let mut view = inner.view.borrow_mut();
            if let Some(element) = outcome.autofocus {
                view.focus(element);
            }
            if document.tree().has_attr(target, "autoscroll") {
                view.scroll_to_element(target);
            }
        }
        let detail = EventDetail {
            element: Some(target),
            frame_id: Some(id.clone()),
            location: Some(response.location.clone()),
            status: Some(response.status),
            ..Default::default()
        };
        inner.events.notify(EventName::FrameRender, detail.clone());
        inner.events.notify(EventName::FrameLoad, detail);

        for frame in outcome.frames_to_reload {
            let nested = inner.document.borrow().tree().element_id(frame).map(str::to_string);
            if let Some(nested) = nested.filter(|nested| *nested != id) {
                reload(session.clone(), nested).await?;
            }
        }
        connect(session.clone()).await?;

        if let (Some(action), Some(page_snapshot)) = (action, page_snapshot) {
            promote(&session, &id, action, &response, page_snapshot).await;
        }
        Ok(())
    }
    .boxed_local()
}

/// The response had no matching frame
async fn missing(session: &Session, id: &str, response: FetchResponse) -> Result<()> {
    let inner = &session.inner;
    set_busy(session, id, false);
    let target = find_frame(&inner.document.borrow(), id);
    let event = inner.events.dispatch(LifecycleEvent::new(
        EventName::FrameMissing,
        EventDetail {
            element: target,
            frame_id: Some(id.to_string()),
            location: Some(response.location.clone()),
            status: Some(response.status),
            ..Default::default()
        },
    ));
    if event.visit {
        tracing::debug!(frame = %id, location = %response.location, "missing frame becomes a page visit");
        let location = response.location.clone();
        let options = VisitOptions { response: Some(response), ..Default::default() };
        navigator::propose_visit(session.clone(), location, options).await;
        return Ok(());
    }
    if event.default_prevented() {
        return Ok(());
    }

    tracing::warn!(frame = %id, location = %response.location, "response has no matching frame");
    if let Some(target) = target {
        let content = veer_html::parse_fragment(MISSING_CONTENT);
        let mut document = inner.document.borrow_mut();
        let tree = document.tree_mut();
        let fragment = tree.import_children(&content, content.root());
        for old in tree.descendants(target) {
            if tree.is_element(old) {
                inner.behaviors.disconnect(tree, old);
            }
        }
        tree.remove_children(target);
        for child in tree.child_ids(fragment) {
            tree.append_child(target, child);
        }
    }
    Err(VeerError::FrameMissing { id: id.to_string(), location: response.location.href().to_string() })
}

/// Turn a frame navigation into a page visit that does not render again
async fn promote(session: &Session, id: &str, action: VisitAction, response: &FetchResponse, page: PageSnapshot) {
    let action = if response.redirected && response.location.is_same_page(&session.location()) {
        VisitAction::Replace
    } else {
        action
    };
    tracing::debug!(frame = %id, action = action.as_str(), location = %response.location, "promoting frame navigation");
    let html = session.html();
    let options = VisitOptions {
        action,
        will_render: false,
        response: Some(FetchResponse::html(response.location.clone(), &html)),
        snapshot_to_cache: Some(page),
        frame: Some(id.to_string()),
        ..Default::default()
    };
    navigator::propose_visit(session.clone(), response.location.clone(), options).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;
    use veer_net::StubTransport;

    const PAGE: &str = r#"
        <veer-frame id="list"><a id="in-list" href="/a">a</a></veer-frame>
        <veer-frame id="off" disabled><a id="in-off" href="/b">b</a></veer-frame>
        <veer-frame id="escape" target="_top"><a id="in-escape" href="/c">c</a></veer-frame>
        <veer-frame id="redirect" target="list"><a id="in-redirect" href="/d">d</a></veer-frame>
        <a id="outside" href="/e">e</a>
        <a id="aimed" href="/f" data-veer-frame="list">f</a>
        <a id="unknown" href="/g" data-veer-frame="nope">g</a>
        <div data-veer-frame="_top"><veer-frame id="inner"><a id="forced-top" href="/h">h</a></veer-frame></div>
    "#;

    #[test]
    fn test_target_frame() {
        let doc = veer_html::parse_document(PAGE, "https://example.com/");
        let target = |id: &str| target_frame(&doc, doc.get_element_by_id(id).unwrap());
        assert_eq!(target("in-list").as_deref(), Some("list"));
        assert_eq!(target("in-off"), None);
        assert_eq!(target("in-escape"), None);
        assert_eq!(target("in-redirect").as_deref(), Some("list"));
        assert_eq!(target("outside"), None);
        assert_eq!(target("aimed").as_deref(), Some("list"));
        assert_eq!(target("unknown"), None);
        assert_eq!(target("forced-top"), None);
    }

    #[test]
    fn test_extract() {
        let direct = PageSnapshot::from_html(
            r#"<veer-frame id="list"><p>x</p></veer-frame>"#,
            "https://example.com/list",
        );
        assert!(matches!(extract(&direct, "list"), Extracted::Found(_)));

        let nested = PageSnapshot::from_html(
            r#"<veer-frame id="outer" src="/outer" recurse="list other"></veer-frame>"#,
            "https://example.com/page",
        );
        match extract(&nested, "list") {
            Extracted::Nested(src) => assert_eq!(src.href(), "https://example.com/outer"),
            _ => panic!("expected a nested frame"),
        }
        assert!(matches!(extract(&nested, "else"), Extracted::Missing));
    }

    #[test]
    fn test_lazy_controller_waits() {
        let src = Location::parse("https://example.com/f").unwrap();
        let mut controller = FrameController::new("f", FrameLoading::Lazy);
        assert!(!controller.should_load(&src));
        controller.appeared = true;
        assert!(controller.should_load(&src));
        controller.loaded = Some(src.clone());
        assert!(!controller.should_load(&src));
    }

    #[test]
    fn test_new_frame_element_resets_controller() {
        let mut tree = DomTree::new();
        let first = tree.create_element(FRAME_TAG);
        let second = tree.create_element(FRAME_TAG);
        let src = Location::parse("https://example.com/f").unwrap();
        let mut registry = FrameRegistry::default();

        let controller = registry.controller("f", &tree, first, FrameLoading::Eager);
        controller.loaded = Some(src.clone());
        let old_signal = controller.signal.clone();
        assert!(!registry.controller("f", &tree, first, FrameLoading::Eager).should_load(&src));

        let controller = registry.controller("f", &tree, second, FrameLoading::Eager);
        assert!(controller.should_load(&src));
        assert!(old_signal.is_aborted());
        assert_eq!(registry.len(), 1);

        // A freed slot handed to a new frame element counts as a new element
        registry.controller("f", &tree, second, FrameLoading::Eager).loaded = Some(src.clone());
        tree.collect_garbage();
        let reused = tree.create_element(FRAME_TAG);
        assert_eq!(reused, second);
        assert!(registry.controller("f", &tree, reused, FrameLoading::Eager).should_load(&src));
    }

    #[test]
    fn test_aborted_load_clears_busy() {
        let stub = Rc::new(StubTransport::new());
        stub.page("https://example.com/f", r#"<veer-frame id="f"><p>f</p></veer-frame>"#)
            .hold("https://example.com/f");
        let session = Session::builder("https://example.com/", r#"<veer-frame id="f" src="/f"></veer-frame>"#)
            .transport(stub.clone())
            .build()
            .unwrap();

        session.run(async {
            let task = session.spawn(connect(session.clone()));
            while stub.request_count("https://example.com/f") == 0 {
                smol::future::yield_now().await;
            }
            let frame = find_frame(&session.document(), "f").unwrap();
            assert!(session.document().tree().has_attr(frame, "busy"));

            session.inner.frames.borrow().get("f").unwrap().signal.abort();
            stub.release("https://example.com/f");
            task.await.unwrap();

            let document = session.document();
            assert!(!document.tree().has_attr(frame, "busy"));
            assert!(!document.tree().has_attr(frame, "aria-busy"));
            assert!(!document.tree().has_attr(frame, "complete"));
        });
    }
}
