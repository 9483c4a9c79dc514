//! Navigator
//!
//! Owns the in-flight visit and form submission. At most one of each is
//! active; starting either stops both.

use crate::events::{EventDetail, EventName};
use crate::form_submission::FormSubmission;
use crate::session::Session;
use crate::visit::{self, Visit, VisitOptions, VisitOutcome};
use smol::future::{BoxedLocal, FutureExt};
use std::cell::RefCell;
use std::rc::Rc;
use veer_net::Location;

#[derive(Debug, Default)]
pub struct Navigator {
    current_visit: RefCell<Option<Rc<Visit>>>,
    current_submission: RefCell<Option<Rc<FormSubmission>>>,
}

impl Navigator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn current_visit(&self) -> Option<Rc<Visit>> {
        self.current_visit.borrow().clone()
    }

    pub fn current_submission(&self) -> Option<Rc<FormSubmission>> {
        self.current_submission.borrow().clone()
    }

    /// Make `visit` the active one
    pub fn start_visit(&self, visit: Rc<Visit>) {
        self.stop();
        *self.current_visit.borrow_mut() = Some(visit);
    }

    pub fn start_submission(&self, submission: Rc<FormSubmission>) {
        self.stop();
        *self.current_submission.borrow_mut() = Some(submission);
    }

    /// Cancel whatever is in flight
    pub fn stop(&self) {
        if let Some(visit) = self.current_visit.borrow_mut().take() {
            if visit.cancel() {
                tracing::debug!(visit = %visit.id(), "visit superseded");
            }
        }
        if let Some(submission) = self.current_submission.borrow_mut().take() {
            submission.stop();
        }
    }
}

/// Propose a page visit to `location`. Listeners may veto it, and
/// locations outside the application are handed to the adapter.
pub(crate) fn propose_visit(session: Session, location: Location, mut options: VisitOptions) -> BoxedLocal<VisitOutcome> {
    async move {
        let inner = &session.inner;
        let current = session.location();
        let same_page_anchor = options.response.is_none() && location.is_anchor_jump_from(&current);

        if !same_page_anchor
            && !inner.events.notify(
                EventName::BeforeVisit,
                EventDetail { location: Some(location.clone()), action: Some(options.action), ..Default::default() },
            )
        {
            tracing::debug!(%location, "visit prevented");
            return VisitOutcome::Prevented;
        }

        if !inner.config.drive_enabled || !location.is_visitable(&session.root()) {
            inner.adapter.visit_external(&location);
            return VisitOutcome::External;
        }

        inner.adapter.visit_proposed_to_location(&location, options.action);
        if options.referrer.is_none() {
            options.referrer = Some(current);
        }
        let visit = Rc::new(Visit::new(inner.request_ids.next_id(), location, options));
        inner.navigator.start_visit(visit.clone());
        visit::perform(session.clone(), visit).await
    }
    .boxed_local()
}
