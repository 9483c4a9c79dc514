//! Visits
//!
//! A [`Visit`] is one page navigation. It moves through
//! `Initialized -> Started -> {Completed, Failed, Canceled}` and owns the
//! abort signal of its request. [`perform`] drives a started visit: preview
//! from cache, fetch, render, cache the page left behind, scroll.

use crate::adapter::ReloadReason;
use crate::events::{EventDetail, EventName};
use crate::history::{Direction, RestorationData};
use crate::renderer::Renderer;
use crate::session::Session;
use crate::snapshot::{PageSnapshot, RefreshMethod, RefreshScroll};
use crate::stream;
use smol::future::{BoxedLocal, FutureExt};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;
use std::time::{Duration, Instant};
use veer_net::{AbortSignal, FetchRequest, FetchResponse, Location, NetError, STREAM_MIME_TYPE};

/// How a visit touches history
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum VisitAction {
    /// Push a new entry
    #[default]
    Advance,
    /// Overwrite the current entry
    Replace,
    /// Back/forward to an existing entry
    Restore,
}

impl VisitAction {
    pub fn as_str(self) -> &'static str {
        match self {
            VisitAction::Advance => "advance",
            VisitAction::Replace => "replace",
            VisitAction::Restore => "restore",
        }
    }

    /// Parse a `data-veer-action` value
    pub fn from_attribute(value: Option<&str>) -> Option<Self> {
        match value.map(str::trim) {
            Some("advance") => Some(VisitAction::Advance),
            Some("replace") => Some(VisitAction::Replace),
            Some("restore") => Some(VisitAction::Restore),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitState {
    Initialized,
    Started,
    Canceled,
    Failed,
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimingMark {
    VisitStart,
    RequestStart,
    RequestEnd,
    VisitEnd,
}

/// When each phase of a visit happened
#[derive(Debug, Clone, Default)]
pub struct TimingMetrics {
    marks: HashMap<TimingMark, Instant>,
}

impl TimingMetrics {
    pub fn get(&self, mark: TimingMark) -> Option<Instant> {
        self.marks.get(&mark).copied()
    }

    pub fn has(&self, mark: TimingMark) -> bool {
        self.marks.contains_key(&mark)
    }

    /// Time between two recorded marks
    pub fn between(&self, from: TimingMark, to: TimingMark) -> Option<Duration> {
        Some(self.get(to)?.saturating_duration_since(self.get(from)?))
    }
}

/// Knobs for a single visit
#[derive(Debug, Clone)]
pub struct VisitOptions {
    pub action: VisitAction,
    /// The page being left; defaults to the current location
    pub referrer: Option<Location>,
    /// Restore visits carry the identifier of the popped entry
    pub restoration_identifier: Option<String>,
    /// A response obtained elsewhere (form submission, frame promotion)
    pub response: Option<FetchResponse>,
    pub will_render: bool,
    pub update_history: bool,
    pub should_cache_snapshot: bool,
    pub accepts_stream_response: bool,
    /// Cache this instead of the live page when leaving it
    pub snapshot_to_cache: Option<PageSnapshot>,
    pub render_method: Option<RefreshMethod>,
    /// Overrides the page's `veer-refresh-scroll` setting on refreshes
    pub refresh_scroll: Option<RefreshScroll>,
    pub is_refresh: bool,
    /// Frame that initiated the visit
    pub frame: Option<String>,
    pub direction: Direction,
}

impl Default for VisitOptions {
    fn default() -> Self {
        Self {
            action: VisitAction::Advance,
            referrer: None,
            restoration_identifier: None,
            response: None,
            will_render: true,
            update_history: true,
            should_cache_snapshot: true,
            accepts_stream_response: false,
            snapshot_to_cache: None,
            render_method: None,
            refresh_scroll: None,
            is_refresh: false,
            frame: None,
            direction: Direction::Forward,
        }
    }
}

impl VisitOptions {
    pub fn with_action(action: VisitAction) -> Self {
        Self { action, ..Default::default() }
    }
}

/// How a visit ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VisitOutcome {
    Completed,
    /// The server answered with an error page, which was rendered
    Failed,
    Canceled,
    /// Handed to the adapter for a native reload
    Reloaded,
    /// Vetoed by a listener
    Prevented,
    /// Not ours to handle; handed to the adapter as a native navigation
    External,
}

/// One navigation
#[derive(Debug)]
pub struct Visit {
    id: String,
    location: Location,
    action: VisitAction,
    restoration_identifier: String,
    pub(crate) options: VisitOptions,
    state: Cell<VisitState>,
    signal: AbortSignal,
    timing: RefCell<TimingMetrics>,
}

impl Visit {
    pub fn new(id: String, location: Location, options: VisitOptions) -> Self {
        let restoration_identifier = options.restoration_identifier.clone().unwrap_or_default();
        Self {
            id,
            location,
            action: options.action,
            restoration_identifier,
            options,
            state: Cell::new(VisitState::Initialized),
            signal: AbortSignal::new(),
            timing: RefCell::new(TimingMetrics::default()),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn action(&self) -> VisitAction {
        self.action
    }

    pub fn state(&self) -> VisitState {
        self.state.get()
    }

    pub fn options(&self) -> &VisitOptions {
        &self.options
    }

    pub fn restoration_identifier(&self) -> &str {
        &self.restoration_identifier
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    pub fn timing(&self) -> TimingMetrics {
        self.timing.borrow().clone()
    }

    pub(crate) fn mark(&self, mark: TimingMark) {
        self.timing.borrow_mut().marks.entry(mark).or_insert_with(Instant::now);
    }

    fn transition(&self, from: VisitState, to: VisitState) -> bool {
        if self.state.get() != from {
            return false;
        }
        tracing::debug!(visit = %self.id, ?from, ?to, "visit transition");
        self.state.set(to);
        true
    }

    pub fn start(&self) -> bool {
        self.transition(VisitState::Initialized, VisitState::Started)
    }

    /// Cancel a started visit, aborting its request
    pub fn cancel(&self) -> bool {
        let canceled = self.transition(VisitState::Started, VisitState::Canceled);
        if canceled {
            self.signal.abort();
        }
        canceled
    }

    pub fn complete(&self) -> bool {
        self.transition(VisitState::Started, VisitState::Completed)
    }

    pub fn fail(&self) -> bool {
        self.transition(VisitState::Started, VisitState::Failed)
    }

    fn is_canceled(&self) -> bool {
        self.state.get() == VisitState::Canceled || self.signal.is_aborted()
    }
}

/// Drive `visit` to an outcome
pub(crate) fn perform(session: Session, visit: Rc<Visit>) -> BoxedLocal<VisitOutcome> {
    async move {
        let outcome = Performer { session: &session, visit: &visit, pending_cache: None, cached: false }
            .run()
            .await;
        tracing::info!(visit = %visit.id(), location = %visit.location(), ?outcome, "visit finished");
        outcome
    }
    .boxed_local()
}

struct Performer<'a> {
    session: &'a Session,
    visit: &'a Visit,
    /// The page left behind, written to the cache once the new one is up
    pending_cache: Option<(Location, PageSnapshot)>,
    cached: bool,
}

impl Performer<'_> {
    async fn run(mut self) -> VisitOutcome {
        let visit = self.visit;
        if !visit.start() {
            return VisitOutcome::Canceled;
        }
        let session = self.session;
        let inner = &session.inner;
        visit.mark(TimingMark::VisitStart);
        inner.adapter.visit_started(visit);
        inner.events.notify(
            EventName::Visit,
            EventDetail {
                location: Some(visit.location().clone()),
                action: Some(visit.action()),
                ..Default::default()
            },
        );
        let position = inner.view.borrow().scroll_position();
        inner
            .history
            .borrow_mut()
            .update_restoration_data(RestorationData { scroll_position: Some(position) });

        let referrer = self.referrer();
        let location = visit.location().clone();

        if self.is_same_page_anchor(&referrer) {
            self.update_history(&location);
            {
                let document = inner.document.borrow();
                let mut view = inner.view.borrow_mut();
                match location.anchor() {
                    Some(anchor) => {
                        view.scroll_to_anchor(&document, anchor);
                    }
                    None => view.scroll_to_top(),
                }
            }
            inner.document.borrow_mut().set_url(location.href());
            visit.complete();
            visit.mark(TimingMark::VisitEnd);
            inner.adapter.visit_completed(visit);
            return VisitOutcome::Completed;
        }

        self.update_history(&location);

        if let Some(outcome) = self.render_cached_snapshot().await {
            return outcome;
        }
        if visit.is_canceled() {
            return VisitOutcome::Canceled;
        }

        let response = match self.obtain_response(&location).await {
            Ok(response) => response,
            Err(outcome) => return outcome,
        };
        if visit.is_canceled() {
            return VisitOutcome::Canceled;
        }
        self.load_response(response).await
    }

    fn referrer(&self) -> Location {
        self.visit
            .options
            .referrer
            .clone()
            .unwrap_or_else(|| self.session.inner.history.borrow().location().clone())
    }

    fn is_same_page_anchor(&self, referrer: &Location) -> bool {
        let location = self.visit.location();
        self.visit.options.response.is_none()
            && self.visit.action() != VisitAction::Restore
            && location.is_anchor_jump_from(referrer)
    }

    fn is_page_refresh(&self) -> bool {
        self.visit.options.is_refresh
            || (self.visit.action() == VisitAction::Replace && self.visit.location().is_same_page(&self.referrer()))
    }

    fn update_history(&self, location: &Location) {
        if !self.visit.options.update_history {
            return;
        }
        let mut history = self.session.inner.history.borrow_mut();
        match self.visit.action() {
            VisitAction::Advance if history.location() != location => history.push(location),
            VisitAction::Advance | VisitAction::Replace => history.replace(location),
            VisitAction::Restore => {}
        }
    }

    /// Capture the page being left, once per visit
    fn capture_snapshot(&mut self) {
        if self.cached || !self.visit.options.should_cache_snapshot {
            return;
        }
        self.cached = true;
        let inner = &self.session.inner;
        let referrer = self.referrer();
        inner.events.notify(
            EventName::BeforeCache,
            EventDetail { location: Some(referrer.clone()), ..Default::default() },
        );
        let snapshot = match &self.visit.options.snapshot_to_cache {
            Some(snapshot) => snapshot.clone(),
            None => PageSnapshot::from_document(&inner.document.borrow()),
        };
        self.pending_cache = Some((referrer, snapshot));
    }

    fn write_cache(&mut self) {
        if let Some((location, snapshot)) = self.pending_cache.take() {
            if snapshot.is_cacheable() {
                self.session.inner.cache.borrow_mut().put(&location, &snapshot);
            }
        }
    }

    /// Show a cached copy of the target. A restore with a cached copy needs
    /// nothing else.
    async fn render_cached_snapshot(&mut self) -> Option<VisitOutcome> {
        let visit = self.visit;
        let options = &visit.options;
        if options.response.is_some() || !options.will_render || self.is_page_refresh() {
            return None;
        }
        let session = self.session;
        let inner = &session.inner;
        let cached = inner.cache.borrow_mut().get(visit.location())?;
        let is_restore = visit.action() == VisitAction::Restore;
        if !is_restore && !cached.is_previewable() {
            return None;
        }

        let renderer = Renderer::replace(cached);
        let check = renderer.should_render(&inner.document.borrow());
        if let Err(reason) = check {
            if is_restore {
                return Some(self.reload(reason));
            }
            return None;
        }
        let renderer = if is_restore { renderer } else { renderer.preview() };

        self.capture_snapshot();
        smol::future::yield_now().await;
        if visit.is_canceled() {
            return Some(VisitOutcome::Canceled);
        }
        self.render(renderer);
        self.write_cache();

        if !is_restore {
            tracing::debug!(location = %visit.location(), "showing preview");
            return None;
        }
        self.scroll(false);
        let outcome = self.finish();
        session.frames_rendered().await;
        Some(outcome)
    }

    /// The response handed in, a prefetched one, or a fresh fetch
    async fn obtain_response(&self, location: &Location) -> Result<FetchResponse, VisitOutcome> {
        let visit = self.visit;
        let inner = &self.session.inner;
        if let Some(response) = visit.options.response.clone() {
            return Ok(response);
        }
        let prefetched = inner.prefetch.borrow_mut().take(location);
        if let Some(response) = prefetched {
            tracing::debug!(%location, "using prefetched response");
            return Ok(response);
        }

        visit.mark(TimingMark::RequestStart);
        inner.adapter.visit_request_started(visit);
        let mut request = FetchRequest::get(location.clone());
        if visit.options.accepts_stream_response {
            request = request.accept(STREAM_MIME_TYPE);
        }
        if let Some(frame) = &visit.options.frame {
            request = request.with_frame(frame);
        }

        let result = self.session.fetch(request, visit.signal()).await;
        visit.mark(TimingMark::RequestEnd);
        inner.adapter.visit_request_finished(visit);
        match result {
            Ok(Some(response)) => {
                inner.adapter.visit_request_completed(visit);
                Ok(response)
            }
            Ok(None) => {
                visit.cancel();
                Err(VisitOutcome::Prevented)
            }
            Err(NetError::Aborted) => Err(VisitOutcome::Canceled),
            Err(_) if visit.is_canceled() => Err(VisitOutcome::Canceled),
            Err(error) => {
                tracing::warn!(%location, %error, "visit request failed");
                inner.adapter.visit_request_failed_with_status(visit, 0);
                Err(self.reload(ReloadReason::RequestFailed))
            }
        }
    }

    async fn load_response(&mut self, response: FetchResponse) -> VisitOutcome {
        let visit = self.visit;
        let session = self.session;
        let inner = &session.inner;

        if response.is_stream() && visit.options.accepts_stream_response {
            stream::process_response(session, &response);
            return self.finish();
        }

        let location = if response.redirected {
            let final_location = match response.location.anchor() {
                Some(_) => response.location.clone(),
                None => response.location.with_anchor(visit.location().anchor()),
            };
            if visit.options.update_history {
                inner.history.borrow_mut().rewrite_location(&final_location);
            }
            final_location
        } else {
            visit.location().clone()
        };

        let Some(html) = response.html_body() else {
            return self.reload(ReloadReason::NonHtmlResponse);
        };
        let snapshot = PageSnapshot::from_html(&html, location.href());

        if !visit.options.will_render {
            self.capture_snapshot();
            inner.document.borrow_mut().set_url(location.href());
            self.write_cache();
            inner.adapter.visit_rendered(visit);
            return self.finish();
        }

        if response.failed() {
            inner.adapter.visit_request_failed_with_status(visit, response.status);
            self.capture_snapshot();
            smol::future::yield_now().await;
            if visit.is_canceled() {
                return VisitOutcome::Canceled;
            }
            self.render(Renderer::error(snapshot));
            inner.document.borrow_mut().set_url(location.href());
            self.write_cache();
            inner.view.borrow_mut().scroll_to_top();
            visit.fail();
            visit.mark(TimingMark::VisitEnd);
            session.frames_rendered().await;
            return VisitOutcome::Failed;
        }

        let is_refresh = self.is_page_refresh();
        let method = match visit.options.render_method {
            Some(method) => method,
            None if is_refresh => snapshot.refresh_method(),
            None => RefreshMethod::Replace,
        };
        let scroll = visit.options.refresh_scroll.unwrap_or_else(|| snapshot.refresh_scroll());
        let preserve_scroll = is_refresh && scroll == RefreshScroll::Preserve;
        let renderer = Renderer::for_method(method, snapshot);
        let check = renderer.should_render(&inner.document.borrow());
        if let Err(reason) = check {
            return self.reload(reason);
        }

        self.capture_snapshot();
        smol::future::yield_now().await;
        if visit.is_canceled() {
            return VisitOutcome::Canceled;
        }
        let outcome = self.render(renderer);
        inner.document.borrow_mut().set_url(location.href());
        self.write_cache();
        self.scroll(preserve_scroll);
        inner.adapter.visit_rendered(visit);

        for frame in outcome.frames_to_reload {
            let id = inner.document.borrow().tree().element_id(frame).map(str::to_string);
            if let Some(id) = id {
                if let Err(error) = crate::frame::reload(session.clone(), id).await {
                    tracing::warn!(%error, "frame reload after morph failed");
                }
            }
        }
        let outcome = self.finish();
        session.frames_rendered().await;
        outcome
    }

    fn render(&self, renderer: Renderer) -> crate::renderer::RenderOutcome {
        let inner = &self.session.inner;
        let mut document = inner.document.borrow_mut();
        inner.view.borrow_mut().render(&mut document, renderer, &inner.events, inner.behaviors.as_ref())
    }

    fn scroll(&self, preserve: bool) {
        if preserve {
            return;
        }
        let inner = &self.session.inner;
        let document = inner.document.borrow();
        let mut view = inner.view.borrow_mut();
        if let Some(anchor) = self.visit.location().anchor() {
            view.scroll_to_anchor(&document, anchor);
            return;
        }
        if self.visit.action() == VisitAction::Restore {
            let data = inner.history.borrow().restoration_data(self.visit.restoration_identifier());
            if let Some(position) = data.scroll_position {
                view.scroll_to_position(position);
                return;
            }
        }
        view.scroll_to_top();
    }

    fn reload(&self, reason: ReloadReason) -> VisitOutcome {
        self.visit.fail();
        self.session.reload(reason, self.visit.location());
        VisitOutcome::Reloaded
    }

    fn finish(&self) -> VisitOutcome {
        let visit = self.visit;
        let inner = &self.session.inner;
        if !visit.complete() {
            return VisitOutcome::Canceled;
        }
        visit.mark(TimingMark::VisitEnd);
        inner.adapter.visit_completed(visit);
        inner.events.notify(
            EventName::Load,
            EventDetail {
                location: Some(visit.location().clone()),
                action: Some(visit.action()),
                timing: Some(visit.timing()),
                ..Default::default()
            },
        );
        VisitOutcome::Completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn visit(options: VisitOptions) -> Visit {
        Visit::new("v1".into(), Location::parse("https://example.com/a").unwrap(), options)
    }

    #[test]
    fn test_state_machine() {
        let v = visit(VisitOptions::default());
        assert_eq!(v.state(), VisitState::Initialized);
        assert!(!v.complete());
        assert!(v.start());
        assert!(!v.start());
        assert!(v.complete());
        assert!(!v.cancel());
        assert!(!v.fail());
        assert_eq!(v.state(), VisitState::Completed);
    }

    #[test]
    fn test_cancel_aborts_signal() {
        let v = visit(VisitOptions::default());
        assert!(!v.cancel());
        assert!(!v.signal().is_aborted());
        v.start();
        assert!(v.cancel());
        assert!(v.signal().is_aborted());
        assert_eq!(v.state(), VisitState::Canceled);
    }

    #[test]
    fn test_timing_marks() {
        let v = visit(VisitOptions::default());
        v.mark(TimingMark::VisitStart);
        v.mark(TimingMark::VisitEnd);
        let timing = v.timing();
        assert!(timing.has(TimingMark::VisitStart));
        assert!(!timing.has(TimingMark::RequestStart));
        assert!(timing.between(TimingMark::VisitStart, TimingMark::VisitEnd).is_some());
    }

    #[test]
    fn test_action_from_attribute() {
        assert_eq!(VisitAction::from_attribute(Some("replace")), Some(VisitAction::Replace));
        assert_eq!(VisitAction::from_attribute(Some("bogus")), None);
        assert_eq!(VisitOptions::default().action, VisitAction::Advance);
        assert!(VisitOptions::default().will_render);
    }
}
