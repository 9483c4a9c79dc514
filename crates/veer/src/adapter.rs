//! Adapter
//!
//! The adapter is told about every visit and form submission and owns the
//! side effects the navigation layer cannot perform itself: native reloads,
//! navigations away from the application, and the progress indicator.

use crate::visit::{Visit, VisitAction};
use std::cell::{Cell, RefCell};
use std::fmt;
use std::time::{Duration, Instant};
use veer_net::Location;

/// Why an in-page render was abandoned for a native reload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReloadReason {
    /// No response at all
    RequestFailed,
    /// 2xx without an HTML body
    NonHtmlResponse,
    /// Tracked head assets changed
    TrackedElementMismatch,
    /// The new page opted out of in-page visits
    NotVisitable,
}

impl ReloadReason {
    pub fn as_str(self) -> &'static str {
        match self {
            ReloadReason::RequestFailed => "request_failed",
            ReloadReason::NonHtmlResponse => "non_html_response",
            ReloadReason::TrackedElementMismatch => "tracked_element_mismatch",
            ReloadReason::NotVisitable => "visit_control_is_reload",
        }
    }
}

impl fmt::Display for ReloadReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Navigation hooks. Everything except `reload` and `visit_external` is
/// informational.
pub trait Adapter {
    fn visit_proposed_to_location(&self, _location: &Location, _action: VisitAction) {}
    fn visit_started(&self, _visit: &Visit) {}
    fn visit_request_started(&self, _visit: &Visit) {}
    fn visit_request_completed(&self, _visit: &Visit) {}
    fn visit_request_failed_with_status(&self, _visit: &Visit, _status: u16) {}
    fn visit_request_finished(&self, _visit: &Visit) {}
    fn visit_rendered(&self, _visit: &Visit) {}
    fn visit_completed(&self, _visit: &Visit) {}
    fn form_submission_started(&self, _location: &Location) {}
    fn form_submission_finished(&self, _location: &Location) {}

    /// Perform a native reload of `location`
    fn reload(&self, reason: ReloadReason, location: &Location);

    /// Leave the application for `location`
    fn visit_external(&self, location: &Location);
}

/// Progress indicator that only shows once a request has been pending
/// longer than its delay
#[derive(Debug)]
pub struct ProgressBar {
    delay: Duration,
    started_at: Cell<Option<Instant>>,
    value: Cell<f64>,
}

impl ProgressBar {
    pub fn new(delay: Duration) -> Self {
        Self { delay, started_at: Cell::new(None), value: Cell::new(0.0) }
    }

    pub fn start(&self) {
        if self.started_at.get().is_none() {
            self.started_at.set(Some(Instant::now()));
            self.value.set(0.0);
        }
    }

    pub fn set_value(&self, value: f64) {
        self.value.set(value.clamp(0.0, 1.0));
    }

    pub fn value(&self) -> f64 {
        self.value.get()
    }

    pub fn finish(&self) {
        self.value.set(1.0);
        self.started_at.set(None);
    }

    pub fn is_active(&self) -> bool {
        self.started_at.get().is_some()
    }

    /// Active and past the delay
    pub fn is_visible(&self) -> bool {
        self.started_at.get().is_some_and(|t| t.elapsed() >= self.delay)
    }
}

/// Default adapter: logs, drives a [`ProgressBar`] and records the native
/// navigations it was asked to perform so an embedder can carry them out.
#[derive(Debug)]
pub struct BrowserAdapter {
    progress: ProgressBar,
    reloads: RefCell<Vec<(ReloadReason, Location)>>,
    external: RefCell<Vec<Location>>,
}

impl BrowserAdapter {
    pub fn new(progress_bar_delay: Duration) -> Self {
        Self {
            progress: ProgressBar::new(progress_bar_delay),
            reloads: RefCell::new(Vec::new()),
            external: RefCell::new(Vec::new()),
        }
    }

    pub fn progress(&self) -> &ProgressBar {
        &self.progress
    }

    /// Reloads requested so far
    pub fn reloads(&self) -> Vec<(ReloadReason, Location)> {
        self.reloads.borrow().clone()
    }

    /// External navigations requested so far
    pub fn external_visits(&self) -> Vec<Location> {
        self.external.borrow().clone()
    }
}

impl Default for BrowserAdapter {
    fn default() -> Self {
        Self::new(Duration::from_millis(500))
    }
}

impl Adapter for BrowserAdapter {
    fn visit_proposed_to_location(&self, location: &Location, action: VisitAction) {
        tracing::debug!(%location, action = action.as_str(), "visit proposed");
    }

    fn visit_started(&self, visit: &Visit) {
        tracing::info!(id = visit.id(), location = %visit.location(), action = visit.action().as_str(), "visit started");
    }

    fn visit_request_started(&self, _visit: &Visit) {
        self.progress.start();
    }

    fn visit_request_completed(&self, _visit: &Visit) {
        self.progress.set_value(1.0);
    }

    fn visit_request_failed_with_status(&self, visit: &Visit, status: u16) {
        tracing::warn!(location = %visit.location(), status, "visit request failed");
    }

    fn visit_request_finished(&self, _visit: &Visit) {
        self.progress.finish();
    }

    fn visit_completed(&self, visit: &Visit) {
        tracing::info!(id = visit.id(), location = %visit.location(), "visit completed");
    }

    fn form_submission_started(&self, _location: &Location) {
        self.progress.start();
    }

    fn form_submission_finished(&self, _location: &Location) {
        self.progress.finish();
    }

    fn reload(&self, reason: ReloadReason, location: &Location) {
        tracing::info!(%location, %reason, "native reload");
        self.progress.finish();
        self.reloads.borrow_mut().push((reason, location.clone()));
    }

    fn visit_external(&self, location: &Location) {
        tracing::info!(%location, "external navigation");
        self.external.borrow_mut().push(location.clone());
    }
}

/// Connects element-scoped behavior objects as nodes enter and leave the
/// page
pub trait BehaviorHost {
    fn connect(&self, tree: &veer_dom::DomTree, element: veer_dom::NodeId);
    fn disconnect(&self, tree: &veer_dom::DomTree, element: veer_dom::NodeId);
}

/// Behavior host that does nothing
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopBehaviorHost;

impl BehaviorHost for NoopBehaviorHost {
    fn connect(&self, _tree: &veer_dom::DomTree, _element: veer_dom::NodeId) {}
    fn disconnect(&self, _tree: &veer_dom::DomTree, _element: veer_dom::NodeId) {}
}
