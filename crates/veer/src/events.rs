//! Lifecycle events
//!
//! Every major transition dispatches a [`LifecycleEvent`] through the
//! session's [`EventBus`]. Listeners run synchronously, in registration
//! order, at the point in the algorithm where the event fires. A listener
//! may call [`LifecycleEvent::prevent_default`] on cancelable events or fill
//! in a substitution field.

use crate::snapshot::RefreshMethod;
use crate::visit::{TimingMetrics, VisitAction};
use crate::ReloadReason;
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;
use veer_dom::{Document, NodeId};
use veer_net::{FetchRequest, Location};

/// Lifecycle event types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    // Navigation
    Click,
    BeforeVisit,
    Visit,
    BeforeCache,
    BeforeRender,
    Render,
    Load,
    Reload,

    // Fetch
    BeforeFetchRequest,
    BeforeFetchResponse,
    FetchRequestError,
    BeforePrefetch,

    // Forms
    SubmitStart,
    SubmitEnd,

    // Frames
    BeforeFrameRender,
    FrameRender,
    FrameLoad,
    FrameMissing,

    // Morphing
    BeforeMorphElement,
    BeforeMorphAttribute,
    Morph,

    // Streams
    BeforeStreamRender,
}

impl EventName {
    /// Whether `prevent_default` has any effect
    pub fn is_cancelable(self) -> bool {
        matches!(
            self,
            EventName::Click
                | EventName::BeforeVisit
                | EventName::BeforeFetchRequest
                | EventName::BeforePrefetch
                | EventName::BeforeFrameRender
                | EventName::FrameMissing
                | EventName::BeforeMorphElement
                | EventName::BeforeMorphAttribute
                | EventName::BeforeStreamRender
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            EventName::Click => "veer:click",
            EventName::BeforeVisit => "veer:before-visit",
            EventName::Visit => "veer:visit",
            EventName::BeforeCache => "veer:before-cache",
            EventName::BeforeRender => "veer:before-render",
            EventName::Render => "veer:render",
            EventName::Load => "veer:load",
            EventName::Reload => "veer:reload",
            EventName::BeforeFetchRequest => "veer:before-fetch-request",
            EventName::BeforeFetchResponse => "veer:before-fetch-response",
            EventName::FetchRequestError => "veer:fetch-request-error",
            EventName::BeforePrefetch => "veer:before-prefetch",
            EventName::SubmitStart => "veer:submit-start",
            EventName::SubmitEnd => "veer:submit-end",
            EventName::BeforeFrameRender => "veer:before-frame-render",
            EventName::FrameRender => "veer:frame-render",
            EventName::FrameLoad => "veer:frame-load",
            EventName::FrameMissing => "veer:frame-missing",
            EventName::BeforeMorphElement => "veer:before-morph-element",
            EventName::BeforeMorphAttribute => "veer:before-morph-attribute",
            EventName::Morph => "veer:morph",
            EventName::BeforeStreamRender => "veer:before-stream-render",
        }
    }
}

impl fmt::Display for EventName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A render substituted by a `BeforeRender` or `BeforeFrameRender`
/// listener. Receives the live document and the incoming one.
pub type RenderFn = Rc<dyn Fn(&mut Document, &Document)>;

/// Event payload. Only the fields relevant to an event are set.
#[derive(Debug, Clone, Default)]
pub struct EventDetail {
    pub location: Option<Location>,
    pub action: Option<VisitAction>,
    pub element: Option<NodeId>,
    pub frame_id: Option<String>,
    pub attribute: Option<String>,
    pub status: Option<u16>,
    pub error: Option<String>,
    pub reason: Option<ReloadReason>,
    /// Mutable for `BeforeFetchRequest` listeners that add headers
    pub request: Option<FetchRequest>,
    pub timing: Option<TimingMetrics>,
    pub stream_action: Option<String>,
    pub render_method: Option<RefreshMethod>,
    pub is_preview: bool,
}

/// A dispatched lifecycle event
pub struct LifecycleEvent {
    pub name: EventName,
    pub detail: EventDetail,
    /// Replaces the default render (`BeforeRender`, `BeforeFrameRender`)
    pub custom_render: Option<RenderFn>,
    /// Turns a missing frame into a full page visit (`FrameMissing`)
    pub visit: bool,
    default_prevented: bool,
}

impl LifecycleEvent {
    pub fn new(name: EventName, detail: EventDetail) -> Self {
        Self { name, detail, custom_render: None, visit: false, default_prevented: false }
    }

    /// Veto the default behavior. Ignored for events that are not
    /// cancelable.
    pub fn prevent_default(&mut self) {
        if self.name.is_cancelable() {
            self.default_prevented = true;
        }
    }

    pub fn default_prevented(&self) -> bool {
        self.default_prevented
    }
}

impl fmt::Debug for LifecycleEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LifecycleEvent")
            .field("name", &self.name)
            .field("detail", &self.detail)
            .field("custom_render", &self.custom_render.is_some())
            .field("visit", &self.visit)
            .field("default_prevented", &self.default_prevented)
            .finish()
    }
}

/// Listener handle for [`EventBus::off`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

type Listener = Rc<dyn Fn(&mut LifecycleEvent)>;

/// Ordered listeners per event
#[derive(Default)]
pub struct EventBus {
    listeners: RefCell<HashMap<EventName, Vec<(ListenerId, Listener)>>>,
    next_id: Cell<u64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a listener; it runs after those registered earlier
    pub fn on(&self, name: EventName, listener: impl Fn(&mut LifecycleEvent) + 'static) -> ListenerId {
        let id = ListenerId(self.next_id.get());
        self.next_id.set(id.0 + 1);
        self.listeners.borrow_mut().entry(name).or_default().push((id, Rc::new(listener)));
        id
    }

    pub fn off(&self, id: ListenerId) {
        for list in self.listeners.borrow_mut().values_mut() {
            list.retain(|(lid, _)| *lid != id);
        }
    }

    pub fn has_listeners(&self, name: EventName) -> bool {
        self.listeners.borrow().get(&name).is_some_and(|l| !l.is_empty())
    }

    /// Run every listener for `event.name` and hand the event back
    pub fn dispatch(&self, mut event: LifecycleEvent) -> LifecycleEvent {
        // Snapshot the list so listeners can register or remove others
        let listeners: Vec<Listener> = self
            .listeners
            .borrow()
            .get(&event.name)
            .map(|l| l.iter().map(|(_, f)| f.clone()).collect())
            .unwrap_or_default();
        tracing::trace!(event = %event.name, listeners = listeners.len(), "dispatch");
        for listener in listeners {
            listener(&mut event);
        }
        event
    }

    /// Dispatch and report whether the default behavior should proceed
    pub fn notify(&self, name: EventName, detail: EventDetail) -> bool {
        !self.dispatch(LifecycleEvent::new(name, detail)).default_prevented()
    }
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let counts: HashMap<EventName, usize> =
            self.listeners.borrow().iter().map(|(k, v)| (*k, v.len())).collect();
        f.debug_struct("EventBus").field("listeners", &counts).finish()
    }
}
