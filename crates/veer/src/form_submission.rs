//! Form submissions
//!
//! A [`FormSubmission`] snapshots a form's data when it is created, issues
//! one request and turns the response into a visit, a rendered error page,
//! or a batch of stream actions.

use crate::adapter::ReloadReason;
use crate::error::{Result, VeerError};
use crate::events::{EventDetail, EventName};
use crate::navigator;
use crate::renderer::Renderer;
use crate::session::Session;
use crate::snapshot::PageSnapshot;
use crate::stream;
use crate::visit::{VisitAction, VisitOptions, VisitOutcome};
use smol::future::{BoxedLocal, FutureExt};
use std::cell::Cell;
use std::rc::Rc;
use veer_dom::{DomTree, NodeId};
use veer_net::{AbortSignal, FetchRequest, Location, Method, NetError, STREAM_MIME_TYPE};

const URLENCODED: &str = "application/x-www-form-urlencoded";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormSubmissionState {
    Initialized,
    Requesting,
    Waiting,
    Receiving,
    Stopping,
    Stopped,
}

/// One submission of a form
#[derive(Debug)]
pub struct FormSubmission {
    id: String,
    form: NodeId,
    submitter: Option<NodeId>,
    method: Method,
    location: Location,
    enctype: String,
    form_data: Vec<(String, String)>,
    state: Cell<FormSubmissionState>,
    signal: AbortSignal,
}

impl FormSubmission {
    /// Read `form` (and the `form*` overrides of `submitter`) out of `tree`.
    /// Relative actions resolve against `base`.
    pub fn new(id: String, tree: &DomTree, base: &Location, form: NodeId, submitter: Option<NodeId>) -> Result<Self> {
        let attr = |name: &str, override_name: &str| {
            submitter
                .and_then(|s| tree.attr(s, override_name))
                .or_else(|| tree.attr(form, name))
                .map(str::trim)
                .filter(|v| !v.is_empty())
        };
        let method = Method::from_attribute(attr("method", "formmethod"));
        let location = match attr("action", "formaction") {
            Some(action) => base.join(action)?,
            None => base.clone(),
        };
        let enctype = attr("enctype", "formenctype").unwrap_or(URLENCODED).to_ascii_lowercase();
        if enctype != URLENCODED {
            tracing::debug!(%enctype, "encoding form data as urlencoded");
        }
        Ok(Self {
            id,
            form,
            submitter,
            method,
            location,
            enctype,
            form_data: form_data(tree, form, submitter),
            state: Cell::new(FormSubmissionState::Initialized),
            signal: AbortSignal::new(),
        })
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn form(&self) -> NodeId {
        self.form
    }

    pub fn submitter(&self) -> Option<NodeId> {
        self.submitter
    }

    pub fn method(&self) -> Method {
        self.method
    }

    pub fn is_safe(&self) -> bool {
        self.method.is_safe()
    }

    pub fn location(&self) -> &Location {
        &self.location
    }

    pub fn enctype(&self) -> &str {
        &self.enctype
    }

    pub fn form_data(&self) -> &[(String, String)] {
        &self.form_data
    }

    pub fn state(&self) -> FormSubmissionState {
        self.state.get()
    }

    pub fn signal(&self) -> &AbortSignal {
        &self.signal
    }

    fn set_state(&self, state: FormSubmissionState) {
        tracing::trace!(submission = %self.id, ?state, "form submission state");
        self.state.set(state);
    }

    /// The request this submission sends. Non-GET submissions opt in to
    /// stream responses.
    pub fn request(&self) -> FetchRequest {
        let request = FetchRequest::new(self.method, self.location.clone()).with_form_data(&self.form_data);
        if self.is_safe() { request } else { request.accept(STREAM_MIME_TYPE) }
    }

    /// Abort the request of a submission still in flight
    pub fn stop(&self) {
        match self.state.get() {
            FormSubmissionState::Stopping | FormSubmissionState::Stopped => {}
            _ => {
                self.set_state(FormSubmissionState::Stopping);
                self.signal.abort();
                self.set_state(FormSubmissionState::Stopped);
            }
        }
    }
}

/// Successful controls of `form` as name/value pairs, in tree order
pub fn form_data(tree: &DomTree, form: NodeId, submitter: Option<NodeId>) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    for node in tree.descendants(form) {
        let Some(el) = tree.element(node) else { continue };
        let Some(name) = el.get_attr("name").filter(|n| !n.is_empty()) else { continue };
        if el.has_attr("disabled") {
            continue;
        }
        match el.tag.as_str() {
            "input" => {
                let kind = el.get_attr("type").unwrap_or("text").to_ascii_lowercase();
                match kind.as_str() {
                    "submit" | "button" | "image" | "reset" => {
                        if Some(node) == submitter {
                            pairs.push((name.to_string(), el.value().unwrap_or("").to_string()));
                        }
                    }
                    "checkbox" | "radio" => {
                        if el.checked() {
                            pairs.push((name.to_string(), el.value().unwrap_or("on").to_string()));
                        }
                    }
                    "file" => {}
                    _ => pairs.push((name.to_string(), el.value().unwrap_or("").to_string())),
                }
            }
            "textarea" => {
                let value = el.state.value.clone().unwrap_or_else(|| tree.text_content(node));
                pairs.push((name.to_string(), value));
            }
            "select" => {
                let options = tree.find_all(node, |e| e.tag == "option");
                let mut selected: Vec<NodeId> = options
                    .iter()
                    .copied()
                    .filter(|&o| tree.element(o).is_some_and(|e| e.selected()))
                    .collect();
                if selected.is_empty() && !el.has_attr("multiple") {
                    selected.extend(options.first().copied());
                }
                if !el.has_attr("multiple") {
                    selected.truncate(1);
                }
                for option in selected {
                    let value = tree
                        .attr(option, "value")
                        .map(str::to_string)
                        .unwrap_or_else(|| tree.text_content(option).trim().to_string());
                    pairs.push((name.to_string(), value));
                }
            }
            "button" => {
                if Some(node) == submitter {
                    pairs.push((name.to_string(), el.get_attr("value").unwrap_or("").to_string()));
                }
            }
            _ => {}
        }
    }
    pairs
}

/// Send `submission` and act on the response
pub(crate) fn perform(session: Session, submission: Rc<FormSubmission>) -> BoxedLocal<Result<VisitOutcome>> {
    async move {
        let inner = &session.inner;
        let location = submission.location().clone();
        submission.set_state(FormSubmissionState::Requesting);
        inner.events.notify(
            EventName::SubmitStart,
            EventDetail { element: Some(submission.form()), location: Some(location.clone()), ..Default::default() },
        );
        inner.adapter.form_submission_started(&location);

        submission.set_state(FormSubmissionState::Waiting);
        let result = session.fetch(submission.request(), submission.signal()).await;
        submission.set_state(FormSubmissionState::Receiving);

        let end = |status: Option<u16>, error: Option<String>| {
            inner.events.notify(
                EventName::SubmitEnd,
                EventDetail {
                    element: Some(submission.form()),
                    location: Some(location.clone()),
                    status,
                    error,
                    ..Default::default()
                },
            );
            inner.adapter.form_submission_finished(&location);
        };

        let response = match result {
            Ok(Some(response)) => response,
            Ok(None) => {
                submission.stop();
                end(None, None);
                return Ok(VisitOutcome::Prevented);
            }
            Err(NetError::Aborted) => {
                end(None, Some(NetError::Aborted.to_string()));
                return Ok(VisitOutcome::Canceled);
            }
            Err(error) => {
                tracing::warn!(%location, %error, "form submission failed");
                end(None, Some(error.to_string()));
                submission.set_state(FormSubmissionState::Stopped);
                session.reload(ReloadReason::RequestFailed, &location);
                return Ok(VisitOutcome::Reloaded);
            }
        };
        end(Some(response.status), None);
        submission.set_state(FormSubmissionState::Stopped);

        if response.is_stream() {
            stream::process_response(&session, &response);
            return Ok(VisitOutcome::Completed);
        }

        if response.succeeded() {
            if !submission.is_safe() && !response.redirected {
                tracing::warn!(%location, "form responses must redirect to another location");
                return Err(VeerError::FormResponseMustRedirect);
            }
            if !submission.is_safe() {
                inner.cache.borrow_mut().clear();
            }
            let action = follow_up_action(&session, &submission, &response.location);
            let options = VisitOptions { action, response: Some(response.clone()), ..Default::default() };
            return Ok(navigator::propose_visit(session.clone(), response.location.clone(), options).await);
        }

        let Some(html) = response.html_body() else {
            session.reload(ReloadReason::NonHtmlResponse, &location);
            return Ok(VisitOutcome::Reloaded);
        };
        let snapshot = PageSnapshot::from_html(&html, response.location.href());
        let renderer = if response.server_error() { Renderer::error(snapshot) } else { Renderer::replace(snapshot) };
        smol::future::yield_now().await;
        {
            let mut document = inner.document.borrow_mut();
            inner.view.borrow_mut().render(&mut document, renderer, &inner.events, inner.behaviors.as_ref());
        }
        inner.view.borrow_mut().scroll_to_top();
        session.frames_rendered().await;
        Ok(VisitOutcome::Failed)
    }
    .boxed_local()
}

/// `data-veer-action` on the submitter or form, else `Replace` when the
/// response lands on the page we are on, else `Advance`
fn follow_up_action(session: &Session, submission: &FormSubmission, response_location: &Location) -> VisitAction {
    let explicit = {
        let document = session.inner.document.borrow();
        let tree = document.tree();
        submission
            .submitter()
            .and_then(|s| VisitAction::from_attribute(tree.attr(s, "data-veer-action")))
            .or_else(|| VisitAction::from_attribute(tree.attr(submission.form(), "data-veer-action")))
    };
    match explicit {
        Some(action) => action,
        None if response_location == &session.location() => VisitAction::Replace,
        None => VisitAction::Advance,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const FORM: &str = r#"<form id="f" action="/people" method="post">
        <input name="name" value="Ann">
        <input name="nick" value="x" disabled>
        <input type="checkbox" name="admin">
        <input type="checkbox" name="agree" value="yes" checked>
        <input type="radio" name="role" value="a">
        <input type="radio" name="role" value="b" checked>
        <select name="size"><option>S</option><option value="m" selected>M</option></select>
        <select name="color"><option value="red">Red</option><option value="blue">Blue</option></select>
        <textarea name="bio">Hello</textarea>
        <button name="commit" value="save" id="save">Save</button>
        <button name="commit" value="draft" id="draft" formmethod="get" formaction="/drafts">Draft</button>
    </form>"#;

    fn parse() -> veer_dom::Document {
        veer_html::parse_document(FORM, "https://example.com/new")
    }

    fn pairs(list: &[(&str, &str)]) -> Vec<(String, String)> {
        list.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect()
    }

    #[test]
    fn test_form_data_collects_successful_controls() {
        let doc = parse();
        let form = doc.get_element_by_id("f").unwrap();
        let save = doc.get_element_by_id("save");
        assert_eq!(
            form_data(doc.tree(), form, save),
            pairs(&[
                ("name", "Ann"),
                ("agree", "yes"),
                ("role", "b"),
                ("size", "m"),
                ("color", "red"),
                ("bio", "Hello"),
                ("commit", "save"),
            ])
        );
    }

    #[test]
    fn test_live_state_wins_over_markup() {
        let mut doc = parse();
        let form = doc.get_element_by_id("f").unwrap();
        let input = doc.tree().find_first(form, |e| e.get_attr("name") == Some("name")).unwrap();
        doc.tree_mut().element_mut(input).unwrap().state.value = Some("Bo".into());
        let data = form_data(doc.tree(), form, None);
        assert_eq!(data[0], ("name".to_string(), "Bo".to_string()));
        assert!(!data.iter().any(|(k, _)| k == "commit"));
    }

    #[test]
    fn test_submitter_overrides() {
        let doc = parse();
        let base = Location::parse("https://example.com/new").unwrap();
        let form = doc.get_element_by_id("f").unwrap();

        let post = FormSubmission::new("1".into(), doc.tree(), &base, form, doc.get_element_by_id("save")).unwrap();
        assert_eq!(post.method(), Method::Post);
        assert_eq!(post.location().href(), "https://example.com/people");
        let request = post.request();
        assert!(request.header("Accept").is_some_and(|a| a.starts_with(STREAM_MIME_TYPE)));
        assert!(request.body.is_some());

        let draft = FormSubmission::new("2".into(), doc.tree(), &base, form, doc.get_element_by_id("draft")).unwrap();
        assert!(draft.is_safe());
        let request = draft.request();
        assert!(request.location.href().starts_with("https://example.com/drafts?name=Ann"));
        assert!(request.location.href().ends_with("commit=draft"));
        assert!(request.body.is_none());
        assert!(!request.header("Accept").is_some_and(|a| a.contains(STREAM_MIME_TYPE)));
    }

    #[test]
    fn test_stop_aborts() {
        let doc = parse();
        let base = Location::parse("https://example.com/new").unwrap();
        let form = doc.get_element_by_id("f").unwrap();
        let submission = FormSubmission::new("1".into(), doc.tree(), &base, form, None).unwrap();
        submission.stop();
        assert_eq!(submission.state(), FormSubmissionState::Stopped);
        assert!(submission.signal().is_aborted());
    }
}
