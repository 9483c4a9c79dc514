//! Session
//!
//! The entry point an embedder talks to. A [`Session`] owns the live
//! document and everything that acts on it: history, caches, the navigator,
//! frames and streams. It is a cheap `Rc` handle; clones share state.
//!
//! All work is single-threaded. Futures returned by the session run on its
//! own [`smol::LocalExecutor`] through [`Session::run`]. Event listeners run
//! while the document may be borrowed, so they must not call back into the
//! session's document accessors.

use crate::adapter::{Adapter, BehaviorHost, BrowserAdapter, NoopBehaviorHost, ReloadReason};
use crate::cache::{PrefetchCache, SnapshotCache};
use crate::config::Config;
use crate::error::{Result, VeerError};
use crate::events::{EventBus, EventDetail, EventName, LifecycleEvent};
use crate::form_submission::{self, FormSubmission};
use crate::frame;
use crate::history::{BrowserHistory, HistoryBridge, HistoryState, MemoryHistory};
use crate::navigator::{self, Navigator};
use crate::scheduler::{Debouncer, RecentRequests};
use crate::snapshot::{RefreshMethod, RefreshScroll};
use crate::stream;
use crate::view::View;
use crate::visit::{VisitAction, VisitOptions, VisitOutcome};
use smol::channel::Receiver;
use smol::{LocalExecutor, Task};
use std::cell::{Ref, RefCell, RefMut};
use std::future::Future;
use std::rc::{Rc, Weak};
use veer_dom::{Document, NodeId};
use veer_net::sse::EventStreamParser;
use veer_net::{
    AbortSignal, FetchRequest, FetchResponse, HttpTransport, Location, NetError, RequestIdGenerator, Transport,
};

pub(crate) struct Inner {
    pub(crate) config: Config,
    pub(crate) document: RefCell<Document>,
    pub(crate) view: RefCell<View>,
    pub(crate) history: RefCell<HistoryBridge>,
    pub(crate) cache: RefCell<SnapshotCache>,
    pub(crate) prefetch: RefCell<PrefetchCache>,
    pub(crate) navigator: Navigator,
    pub(crate) frames: RefCell<frame::FrameRegistry>,
    pub(crate) events: EventBus,
    pub(crate) adapter: Rc<dyn Adapter>,
    pub(crate) behaviors: Rc<dyn BehaviorHost>,
    pub(crate) transport: Rc<dyn Transport>,
    pub(crate) request_ids: RequestIdGenerator,
    pub(crate) recent_requests: RefCell<RecentRequests>,
    pub(crate) refresh: Debouncer,
    pub(crate) executor: Rc<LocalExecutor<'static>>,
}

/// Handle to a navigation session
#[derive(Clone)]
pub struct Session {
    pub(crate) inner: Rc<Inner>,
}

/// Builds a [`Session`] around an initial page
pub struct SessionBuilder {
    location: String,
    html: String,
    config: Config,
    transport: Option<Rc<dyn Transport>>,
    adapter: Option<Rc<dyn Adapter>>,
    behaviors: Option<Rc<dyn BehaviorHost>>,
    history: Option<Box<dyn BrowserHistory>>,
}

impl SessionBuilder {
    pub fn new(location: &str, html: &str) -> Self {
        Self {
            location: location.to_string(),
            html: html.to_string(),
            config: Config::default(),
            transport: None,
            adapter: None,
            behaviors: None,
            history: None,
        }
    }

    pub fn config(mut self, config: Config) -> Self {
        self.config = config;
        self
    }

    pub fn transport(mut self, transport: Rc<dyn Transport>) -> Self {
        self.transport = Some(transport);
        self
    }

    pub fn adapter(mut self, adapter: Rc<dyn Adapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    pub fn behaviors(mut self, behaviors: Rc<dyn BehaviorHost>) -> Self {
        self.behaviors = Some(behaviors);
        self
    }

    pub fn history(mut self, history: Box<dyn BrowserHistory>) -> Self {
        self.history = Some(history);
        self
    }

    pub fn build(self) -> Result<Session> {
        let location = Location::parse(&self.location)?;
        let config = self.config;
        let transport: Rc<dyn Transport> = match self.transport {
            Some(transport) => transport,
            None => Rc::new(HttpTransport::with_options(&config.user_agent, config.request_timeout)?),
        };
        let adapter = self
            .adapter
            .unwrap_or_else(|| Rc::new(BrowserAdapter::new(config.progress_bar_delay)));
        let history = self.history.unwrap_or_else(|| Box::new(MemoryHistory::new(&location)));
        let document = veer_html::parse_document(&self.html, location.href());

        tracing::info!(%location, cache_size = config.cache_size, "session started");
        let inner = Inner {
            document: RefCell::new(document),
            view: RefCell::new(View::new()),
            history: RefCell::new(HistoryBridge::new(history, &location)),
            cache: RefCell::new(SnapshotCache::new(config.cache_size)),
            prefetch: RefCell::new(PrefetchCache::new(config.prefetch_ttl)),
            navigator: Navigator::new(),
            frames: RefCell::new(frame::FrameRegistry::default()),
            events: EventBus::new(),
            adapter,
            behaviors: self.behaviors.unwrap_or_else(|| Rc::new(NoopBehaviorHost)),
            transport,
            request_ids: RequestIdGenerator::new(),
            recent_requests: RefCell::new(RecentRequests::new(config.recent_request_limit)),
            refresh: Debouncer::new(config.refresh_debounce),
            executor: Rc::new(LocalExecutor::new()),
            config,
        };
        Ok(Session { inner: Rc::new(inner) })
    }
}

impl Session {
    pub fn builder(location: &str, html: &str) -> SessionBuilder {
        SessionBuilder::new(location, html)
    }

    fn from_weak(inner: &Weak<Inner>) -> Option<Self> {
        inner.upgrade().map(|inner| Session { inner })
    }

    // ------------------------------------------------------------------
    // Driving futures
    // ------------------------------------------------------------------

    /// Block on `future`, running the session's background tasks alongside
    pub fn run<T>(&self, future: impl Future<Output = T>) -> T {
        let executor = self.inner.executor.clone();
        smol::block_on(executor.run(future))
    }

    /// Spawn a task on the session's executor
    pub fn spawn<T: 'static>(&self, future: impl Future<Output = T> + 'static) -> Task<T> {
        self.inner.executor.spawn(future)
    }

    /// Wait for debounced work (stream refreshes) to finish
    pub async fn settle(&self) {
        while let Some(task) = self.inner.refresh.take() {
            task.await;
        }
    }

    // ------------------------------------------------------------------
    // State
    // ------------------------------------------------------------------

    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    pub fn events(&self) -> &EventBus {
        &self.inner.events
    }

    /// Location of the current history entry
    pub fn location(&self) -> Location {
        self.inner.history.borrow().location().clone()
    }

    pub fn document(&self) -> Ref<'_, Document> {
        self.inner.document.borrow()
    }

    /// Mutable access for embedders simulating user input
    pub fn document_mut(&self) -> RefMut<'_, Document> {
        self.inner.document.borrow_mut()
    }

    /// The live page as markup
    pub fn html(&self) -> String {
        let document = self.inner.document.borrow();
        veer_html::outer_html(document.tree(), document.tree().root())
    }

    pub fn view(&self) -> Ref<'_, View> {
        self.inner.view.borrow()
    }

    pub fn view_mut(&self) -> RefMut<'_, View> {
        self.inner.view.borrow_mut()
    }

    pub fn history(&self) -> Ref<'_, HistoryBridge> {
        self.inner.history.borrow()
    }

    pub fn snapshot_cache(&self) -> Ref<'_, SnapshotCache> {
        self.inner.cache.borrow()
    }

    pub fn frames(&self) -> Ref<'_, frame::FrameRegistry> {
        self.inner.frames.borrow()
    }

    pub fn navigator(&self) -> &Navigator {
        &self.inner.navigator
    }

    /// Locations outside this root are left to native navigation. The
    /// page's `veer-root` setting wins over the configured one.
    pub fn root(&self) -> Location {
        let location = self.location();
        let declared = self.inner.document.borrow().meta_content("veer-root").map(str::to_string);
        let root = declared.unwrap_or_else(|| self.inner.config.root.clone());
        location.join(&root).unwrap_or(location)
    }

    fn resolve(&self, href: &str) -> Result<Location> {
        Ok(self.location().join(href)?)
    }

    // ------------------------------------------------------------------
    // Navigation
    // ------------------------------------------------------------------

    /// Visit `href`, resolved against the current location
    pub async fn visit(&self, href: &str, options: VisitOptions) -> Result<VisitOutcome> {
        let location = self.resolve(href)?;
        Ok(navigator::propose_visit(self.clone(), location, options).await)
    }

    /// Reload the current page in place
    pub async fn refresh(&self, method: Option<RefreshMethod>) -> VisitOutcome {
        self.refresh_with(method, None).await
    }

    async fn refresh_with(&self, method: Option<RefreshMethod>, scroll: Option<RefreshScroll>) -> VisitOutcome {
        let options = VisitOptions {
            action: VisitAction::Replace,
            is_refresh: true,
            render_method: method,
            refresh_scroll: scroll,
            should_cache_snapshot: false,
            ..Default::default()
        };
        navigator::propose_visit(self.clone(), self.location(), options).await
    }

    /// Debounce a stream-triggered refresh. Refreshes caused by this
    /// session's own requests are ignored.
    pub(crate) fn schedule_refresh(
        &self,
        request_id: Option<&str>,
        method: Option<RefreshMethod>,
        scroll: Option<RefreshScroll>,
    ) {
        if let Some(id) = request_id {
            if self.inner.recent_requests.borrow().has(id) {
                tracing::debug!(request_id = %id, "ignoring refresh caused by our own request");
                return;
            }
        }
        let weak = Rc::downgrade(&self.inner);
        self.inner.refresh.schedule(&self.inner.executor, async move {
            if let Some(session) = Session::from_weak(&weak) {
                session.refresh_with(method, scroll).await;
            }
        });
    }

    /// Activate a link. Links inside or aimed at a frame navigate the
    /// frame; everything else proposes a page visit.
    pub async fn click_link(&self, element: NodeId) -> Result<VisitOutcome> {
        let (link, location, driven, frame_id, action) = {
            let document = self.inner.document.borrow();
            let tree = document.tree();
            let link = tree
                .closest(element, |e| e.tag == "a" && e.has_attr("href"))
                .ok_or(VeerError::InvalidElement("a link"))?;
            let href = tree.attr(link, "href").unwrap_or_default();
            let location = self.resolve(href)?;
            let driven = tree.closest(link, |e| e.has_attr("data-veer")).and_then(|e| tree.attr(e, "data-veer"))
                != Some("false")
                && tree.attr(link, "target").is_none_or(|t| t == "_self")
                && !tree.has_attr(link, "download");
            let frame_id = frame::target_frame(&document, link);
            let action = VisitAction::from_attribute(tree.attr(link, "data-veer-action")).or_else(|| {
                let frame = frame_id.as_deref().and_then(|id| frame::find_frame(&document, id))?;
                VisitAction::from_attribute(tree.attr(frame, "data-veer-action"))
            });
            (link, location, driven, frame_id, action)
        };

        if !driven {
            self.inner.adapter.visit_external(&location);
            return Ok(VisitOutcome::External);
        }
        if !self.inner.events.notify(
            EventName::Click,
            EventDetail { element: Some(link), location: Some(location.clone()), ..Default::default() },
        ) {
            return Ok(VisitOutcome::Prevented);
        }

        match frame_id {
            Some(id) if location.is_visitable(&self.root()) => {
                frame::navigate(self.clone(), id, FetchRequest::get(location), action).await?;
                Ok(VisitOutcome::Completed)
            }
            _ => {
                let options = VisitOptions::with_action(action.unwrap_or_default());
                Ok(navigator::propose_visit(self.clone(), location, options).await)
            }
        }
    }

    /// Submit `form`, optionally through `submitter`
    pub async fn submit_form(&self, form: NodeId, submitter: Option<NodeId>) -> Result<VisitOutcome> {
        let (submission, frame_id, action, driven) = {
            let document = self.inner.document.borrow();
            let tree = document.tree();
            if !tree.has_tag(form, "form") {
                return Err(VeerError::InvalidElement("a form"));
            }
            let submission =
                FormSubmission::new(self.inner.request_ids.next_id(), tree, &self.location(), form, submitter)?;
            let origin = submitter.unwrap_or(form);
            let frame_id = frame::target_frame(&document, origin);
            let action = submitter
                .and_then(|s| VisitAction::from_attribute(tree.attr(s, "data-veer-action")))
                .or_else(|| VisitAction::from_attribute(tree.attr(form, "data-veer-action")))
                .or_else(|| {
                    let frame = frame_id.as_deref().and_then(|id| frame::find_frame(&document, id))?;
                    VisitAction::from_attribute(tree.attr(frame, "data-veer-action"))
                });
            let driven = tree.closest(origin, |e| e.has_attr("data-veer")).and_then(|e| tree.attr(e, "data-veer"))
                != Some("false");
            (submission, frame_id, action, driven)
        };

        let location = submission.location().clone();
        if !driven || !self.inner.config.drive_enabled || !location.is_visitable(&self.root()) {
            self.inner.adapter.visit_external(&location);
            return Ok(VisitOutcome::External);
        }
        if let Some(id) = frame_id {
            frame::navigate(self.clone(), id, submission.request(), action).await?;
            return Ok(VisitOutcome::Completed);
        }

        let submission = Rc::new(submission);
        self.inner.navigator.start_submission(submission.clone());
        form_submission::perform(self.clone(), submission).await
    }

    /// The browser popped a history entry
    pub async fn history_popped(&self, location: Location, state: Option<HistoryState>) -> VisitOutcome {
        let referrer = self.location();
        let popped = self.inner.history.borrow_mut().popped(location, state);
        self.restore(referrer, popped).await
    }

    /// Move `delta` entries through history
    pub async fn go(&self, delta: i64) -> VisitOutcome {
        let referrer = self.location();
        let popped = self.inner.history.borrow_mut().go(delta);
        self.restore(referrer, popped).await
    }

    async fn restore(&self, referrer: Location, popped: Option<crate::history::PoppedEntry>) -> VisitOutcome {
        let Some(popped) = popped else {
            return VisitOutcome::Canceled;
        };
        if popped.location.is_anchor_jump_from(&referrer) {
            let inner = &self.inner;
            inner.document.borrow_mut().set_url(popped.location.href());
            let document = inner.document.borrow();
            let mut view = inner.view.borrow_mut();
            if let Some(anchor) = popped.location.anchor() {
                view.scroll_to_anchor(&document, anchor);
                return VisitOutcome::Completed;
            }
            let data = inner.history.borrow().restoration_data(&popped.restoration_identifier);
            match data.scroll_position {
                Some(position) => view.scroll_to_position(position),
                None => view.scroll_to_top(),
            }
            return VisitOutcome::Completed;
        }
        let options = VisitOptions {
            action: VisitAction::Restore,
            referrer: Some(referrer),
            restoration_identifier: Some(popped.restoration_identifier),
            direction: popped.direction,
            ..Default::default()
        };
        navigator::propose_visit(self.clone(), popped.location, options).await
    }

    // ------------------------------------------------------------------
    // Frames, streams, prefetch
    // ------------------------------------------------------------------

    /// Register the page's frames and load the eager ones
    pub async fn connect_frames(&self) -> Result<()> {
        frame::connect(self.clone()).await
    }

    /// A lazy frame became visible
    pub async fn frame_appeared(&self, id: &str) -> Result<()> {
        frame::appeared(self.clone(), id.to_string()).await
    }

    /// Apply a stream message. Returns how many actions ran.
    pub fn receive_stream_message(&self, html: &str) -> usize {
        stream::process_message(self, html)
    }

    /// Consume an event stream until its sender closes
    pub async fn connect_stream_source(&self, source: Receiver<String>) {
        let mut parser = EventStreamParser::new();
        while let Ok(chunk) = source.recv().await {
            for event in parser.feed(&chunk) {
                if event.event_type == "message" {
                    self.receive_stream_message(&event.data);
                }
            }
        }
        tracing::debug!(last_event_id = parser.last_event_id(), "stream source closed");
    }

    /// Fetch `href` ahead of a likely visit. Returns false when a listener
    /// vetoed it or it is not ours to fetch.
    pub async fn prefetch(&self, href: &str) -> Result<bool> {
        let location = self.resolve(href)?;
        if !location.is_visitable(&self.root()) || location.is_same_page(&self.location()) {
            return Ok(false);
        }
        if !self.inner.events.notify(
            EventName::BeforePrefetch,
            EventDetail { location: Some(location.clone()), ..Default::default() },
        ) {
            return Ok(false);
        }
        let request = FetchRequest::get(location.clone()).with_header("X-Sec-Purpose", "prefetch");
        match self.fetch(request, &AbortSignal::new()).await? {
            Some(response) if response.succeeded() && response.is_html() => {
                self.inner.prefetch.borrow_mut().put(&location, response);
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    // ------------------------------------------------------------------
    // Plumbing
    // ------------------------------------------------------------------

    /// Issue `request` through the transport. `Ok(None)` means a
    /// `BeforeFetchRequest` listener vetoed it.
    pub(crate) async fn fetch(
        &self,
        request: FetchRequest,
        signal: &AbortSignal,
    ) -> std::result::Result<Option<FetchResponse>, NetError> {
        let inner = &self.inner;
        let id = inner.request_ids.next_id();
        inner.recent_requests.borrow_mut().add(&id);
        let mut request = request.with_request_id(&id).with_header("Referer", self.location().href());

        let event = inner.events.dispatch(LifecycleEvent::new(
            EventName::BeforeFetchRequest,
            EventDetail {
                location: Some(request.location.clone()),
                request: Some(request.clone()),
                ..Default::default()
            },
        ));
        if event.default_prevented() {
            tracing::debug!(location = %request.location, "request prevented");
            return Ok(None);
        }
        if let Some(changed) = event.detail.request {
            request = changed;
        }

        tracing::debug!(method = request.method.as_str(), location = %request.location, "fetch");
        let location = request.location.clone();
        let transport = inner.transport.clone();
        let result = transport.fetch(request, signal.clone()).await.and_then(|response| {
            signal.check()?;
            Ok(response)
        });
        let response = match result {
            Ok(response) => response,
            Err(NetError::Aborted) => return Err(NetError::Aborted),
            Err(error) => {
                inner.events.notify(
                    EventName::FetchRequestError,
                    EventDetail { location: Some(location), error: Some(error.to_string()), ..Default::default() },
                );
                return Err(error);
            }
        };

        inner.events.notify(
            EventName::BeforeFetchResponse,
            EventDetail {
                location: Some(response.location.clone()),
                status: Some(response.status),
                ..Default::default()
            },
        );
        Ok(Some(response))
    }

    /// Attach frames after a page render. Failures are logged, the page
    /// itself is already up.
    pub(crate) async fn frames_rendered(&self) {
        if let Err(error) = frame::connect(self.clone()).await {
            tracing::warn!(%error, "frame failed to load after render");
        }
    }

    /// Give up on in-page rendering and ask the adapter for a native load
    pub(crate) fn reload(&self, reason: ReloadReason, location: &Location) {
        tracing::info!(%location, %reason, "reloading");
        self.inner.events.notify(
            EventName::Reload,
            EventDetail { location: Some(location.clone()), reason: Some(reason), ..Default::default() },
        );
        self.inner.adapter.reload(reason, location);
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("location", &self.location())
            .field("history", &self.inner.history.borrow())
            .finish()
    }
}
