//! Stream actions
//!
//! A stream message is a run of
//! `<veer-stream action=... target=...|targets=...><template>...</template></veer-stream>`
//! elements, each applying one small mutation to the live page. Messages
//! arrive as form responses, through [`Session::receive_stream_message`],
//! or from an event-stream source.

use crate::adapter::BehaviorHost;
use crate::events::{EventBus, EventDetail, EventName, LifecycleEvent};
use crate::renderer::morph;
use crate::renderer::permanent;
use crate::session::Session;
use crate::snapshot::{RefreshMethod, RefreshScroll};
use std::collections::HashSet;
use veer_dom::{Document, DomTree, NodeId, Selector};
use veer_net::FetchResponse;

/// Tag name of stream elements
pub const STREAM_TAG: &str = "veer-stream";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamAction {
    After,
    Append,
    Before,
    Prepend,
    Remove,
    Replace,
    Update,
    Refresh,
}

impl StreamAction {
    pub fn from_attribute(value: &str) -> Option<Self> {
        Some(match value.trim() {
            "after" => StreamAction::After,
            "append" => StreamAction::Append,
            "before" => StreamAction::Before,
            "prepend" => StreamAction::Prepend,
            "remove" => StreamAction::Remove,
            "replace" => StreamAction::Replace,
            "update" => StreamAction::Update,
            "refresh" => StreamAction::Refresh,
            _ => return None,
        })
    }

    pub fn as_str(self) -> &'static str {
        match self {
            StreamAction::After => "after",
            StreamAction::Append => "append",
            StreamAction::Before => "before",
            StreamAction::Prepend => "prepend",
            StreamAction::Remove => "remove",
            StreamAction::Replace => "replace",
            StreamAction::Update => "update",
            StreamAction::Refresh => "refresh",
        }
    }
}

/// `target` names one element by id, `targets` selects any number
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StreamTarget {
    Id(String),
    Selector(String),
}

/// One parsed `<veer-stream>`
#[derive(Debug, Clone)]
pub struct StreamElement {
    pub action: StreamAction,
    pub target: Option<StreamTarget>,
    /// Template contents; the root is a fragment
    pub template: DomTree,
    pub request_id: Option<String>,
    pub method: Option<RefreshMethod>,
    pub scroll: Option<RefreshScroll>,
}

impl StreamElement {
    /// Every stream element in `html`. Unknown actions are skipped.
    pub fn parse_all(html: &str) -> Vec<StreamElement> {
        let tree = veer_html::parse_fragment(html);
        tree.find_all(tree.root(), |e| e.tag == STREAM_TAG)
            .into_iter()
            .filter_map(|node| Self::from_element(&tree, node))
            .collect()
    }

    fn from_element(tree: &DomTree, node: NodeId) -> Option<Self> {
        let el = tree.element(node)?;
        let Some(action) = el.get_attr("action").and_then(StreamAction::from_attribute) else {
            tracing::warn!(action = ?el.get_attr("action"), "unknown stream action");
            return None;
        };
        let target = match (el.get_attr("target"), el.get_attr("targets")) {
            (Some(id), _) if !id.is_empty() => Some(StreamTarget::Id(id.to_string())),
            (_, Some(selector)) if !selector.is_empty() => Some(StreamTarget::Selector(selector.to_string())),
            _ => None,
        };

        let mut template = DomTree::new_fragment();
        let root = template.root();
        if let Some(source) = tree.children(node).find(|&c| tree.has_tag(c, "template")) {
            for child in tree.child_ids(source) {
                let copy = template.import(tree, child);
                template.append_child(root, copy);
            }
        }

        Some(Self {
            action,
            target,
            template,
            request_id: el.get_attr("request-id").map(str::to_string),
            method: el.get_attr("method").map(|m| RefreshMethod::from_attribute(Some(m))),
            scroll: el.get_attr("scroll").map(|s| RefreshScroll::from_attribute(Some(s))),
        })
    }

    /// Live elements this action applies to
    pub fn target_elements(&self, document: &Document) -> Vec<NodeId> {
        match &self.target {
            Some(StreamTarget::Id(id)) => document.get_element_by_id(id).into_iter().collect(),
            Some(StreamTarget::Selector(selector)) => match Selector::parse(selector) {
                Ok(selector) => document.tree().query_selector_all(document.tree().root(), &selector),
                Err(error) => {
                    tracing::warn!(%selector, %error, "invalid stream targets");
                    Vec::new()
                }
            },
            None => Vec::new(),
        }
    }
}

/// Elements a stream action added and removed
#[derive(Debug, Clone, Default)]
pub struct StreamOutcome {
    pub inserted: Vec<NodeId>,
    pub removed: Vec<NodeId>,
}

fn elements_within(tree: &DomTree, roots: &[NodeId]) -> Vec<NodeId> {
    let mut out = Vec::new();
    for &root in roots {
        if tree.is_element(root) {
            out.push(root);
        }
        out.extend(tree.descendants(root).into_iter().filter(|&n| tree.is_element(n)));
    }
    out
}

/// Apply a DOM-mutating stream action to `document`. `Refresh` is not a
/// DOM mutation and is left to the caller.
pub fn apply(
    document: &mut Document,
    element: &StreamElement,
    events: &EventBus,
    behaviors: &dyn BehaviorHost,
) -> StreamOutcome {
    let mut outcome = StreamOutcome::default();
    for target in element.target_elements(document) {
        let single = apply_to(document, element, target, events);
        outcome.inserted.extend(single.inserted);
        outcome.removed.extend(single.removed);
    }

    // Nodes that were moved back in (permanent elements) count as neither
    let tree = document.tree();
    let inserted: HashSet<NodeId> = outcome.inserted.iter().copied().collect();
    outcome.removed.retain(|&n| !tree.is_connected(n) && !inserted.contains(&n));
    outcome.inserted.retain(|&n| tree.is_connected(n));
    for &node in &outcome.removed {
        behaviors.disconnect(tree, node);
    }
    for &node in &outcome.inserted {
        behaviors.connect(tree, node);
    }
    tracing::debug!(
        action = element.action.as_str(),
        inserted = outcome.inserted.len(),
        removed = outcome.removed.len(),
        "stream action applied"
    );
    outcome
}

fn apply_to(document: &mut Document, element: &StreamElement, target: NodeId, events: &EventBus) -> StreamOutcome {
    let mut outcome = StreamOutcome::default();
    let fragment = document.tree_mut().import_children(&element.template, element.template.root());
    let tree = document.tree_mut();
    let children = tree.child_ids(fragment);

    match element.action {
        StreamAction::After => {
            outcome.inserted = elements_within(tree, &children);
            let mut anchor = target;
            for child in children {
                tree.insert_after(anchor, child);
                anchor = child;
            }
        }
        StreamAction::Before => {
            outcome.inserted = elements_within(tree, &children);
            if let Some(parent) = tree.parent(target) {
                for child in children {
                    tree.insert_before(parent, child, Some(target));
                }
            }
        }
        StreamAction::Append | StreamAction::Prepend => {
            outcome.removed = remove_duplicate_children(tree, target, &children);
            outcome.inserted = elements_within(tree, &children);
            let reference = match element.action {
                StreamAction::Prepend => tree.first_child(target),
                _ => None,
            };
            for child in children {
                tree.insert_before(target, child, reference);
            }
        }
        StreamAction::Remove => {
            outcome.removed = elements_within(tree, &[target]);
            tree.detach(target);
        }
        StreamAction::Replace => {
            outcome.removed = elements_within(tree, &[target]);
            if element.method == Some(RefreshMethod::Morph) {
                let replacement = children.iter().copied().find(|&c| tree.is_element(c));
                if let Some(replacement) = replacement {
                    morph::morph(tree, target, replacement, Some(events));
                }
                outcome.removed.clear();
            } else {
                outcome.inserted = elements_within(tree, &children);
                permanent::preserve(document, target, fragment, |doc| {
                    let tree = doc.tree_mut();
                    if let Some(parent) = tree.parent(target) {
                        for child in tree.child_ids(fragment) {
                            tree.insert_before(parent, child, Some(target));
                        }
                        tree.detach(target);
                    }
                });
            }
        }
        StreamAction::Update => {
            let old_children = tree.child_ids(target);
            if element.method == Some(RefreshMethod::Morph) {
                morph::morph_children(tree, target, fragment, Some(events));
            } else {
                outcome.removed = elements_within(tree, &old_children);
                outcome.inserted = elements_within(tree, &children);
                permanent::preserve(document, target, fragment, |doc| {
                    let tree = doc.tree_mut();
                    tree.remove_children(target);
                    for child in tree.child_ids(fragment) {
                        tree.append_child(target, child);
                    }
                });
            }
        }
        StreamAction::Refresh => {}
    }
    outcome
}

/// Remove children of `target` whose id matches one of `incoming`, so an
/// append or prepend moves rather than duplicates them
fn remove_duplicate_children(tree: &mut DomTree, target: NodeId, incoming: &[NodeId]) -> Vec<NodeId> {
    let ids: HashSet<String> = incoming
        .iter()
        .filter_map(|&c| tree.element_id(c).map(str::to_string))
        .collect();
    if ids.is_empty() {
        return Vec::new();
    }
    let duplicates: Vec<NodeId> = tree
        .element_children(target)
        .into_iter()
        .filter(|&c| tree.element_id(c).is_some_and(|id| ids.contains(id)))
        .collect();
    let removed = elements_within(tree, &duplicates);
    for node in duplicates {
        tree.detach(node);
    }
    removed
}

/// Apply every element of a stream message. Returns how many were
/// rendered.
pub(crate) fn process_message(session: &Session, html: &str) -> usize {
    let inner = &session.inner;
    let mut rendered = 0;
    for element in StreamElement::parse_all(html) {
        let event = inner.events.dispatch(LifecycleEvent::new(
            EventName::BeforeStreamRender,
            EventDetail { stream_action: Some(element.action.as_str().to_string()), ..Default::default() },
        ));
        if event.default_prevented() {
            continue;
        }
        if element.action == StreamAction::Refresh {
            session.schedule_refresh(element.request_id.as_deref(), element.method, element.scroll);
        } else {
            let mut document = inner.document.borrow_mut();
            apply(&mut document, &element, &inner.events, inner.behaviors.as_ref());
        }
        rendered += 1;
    }
    if rendered > 0 {
        inner.document.borrow_mut().tree_mut().collect_garbage();
    }
    rendered
}

pub(crate) fn process_response(session: &Session, response: &FetchResponse) -> usize {
    process_message(session, &response.text())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::adapter::NoopBehaviorHost;

    fn run(page: &str, message: &str) -> Document {
        let mut doc = veer_html::parse_document(page, "https://example.com/");
        for element in StreamElement::parse_all(message) {
            apply(&mut doc, &element, &EventBus::new(), &NoopBehaviorHost);
        }
        doc
    }

    fn body(doc: &Document) -> String {
        veer_html::inner_html(doc.tree(), doc.body())
    }

    #[test]
    fn test_parse() {
        let elements = StreamElement::parse_all(concat!(
            r#"<veer-stream action="append" target="list"><template><li>x</li></template></veer-stream>"#,
            r#"<veer-stream action="remove" targets=".old"></veer-stream>"#,
            r#"<veer-stream action="explode" target="x"></veer-stream>"#,
            r#"<veer-stream action="refresh" request-id="abc" method="morph" scroll="preserve"></veer-stream>"#,
        ));
        assert_eq!(elements.len(), 3);
        assert_eq!(elements[0].target, Some(StreamTarget::Id("list".into())));
        assert_eq!(elements[1].target, Some(StreamTarget::Selector(".old".into())));
        assert_eq!(elements[2].action, StreamAction::Refresh);
        assert_eq!(elements[2].request_id.as_deref(), Some("abc"));
        assert_eq!(elements[2].method, Some(RefreshMethod::Morph));
        assert_eq!(elements[2].scroll, Some(RefreshScroll::Preserve));
    }

    #[test]
    fn test_append_dedupes_by_id() {
        let doc = run(
            r#"<ul id="list"><li id="a">a</li><li id="b">b</li></ul>"#,
            r#"<veer-stream action="append" target="list"><template><li id="a">a2</li><li id="c">c</li></template></veer-stream>"#,
        );
        assert_eq!(body(&doc), r#"<ul id="list"><li id="b">b</li><li id="a">a2</li><li id="c">c</li></ul>"#);
    }

    #[test]
    fn test_prepend() {
        let doc = run(
            r#"<ul id="list"><li id="b">b</li></ul>"#,
            r#"<veer-stream action="prepend" target="list"><template><li id="x">x</li><li id="y">y</li></template></veer-stream>"#,
        );
        assert_eq!(body(&doc), r#"<ul id="list"><li id="x">x</li><li id="y">y</li><li id="b">b</li></ul>"#);
    }

    #[test]
    fn test_before_after_remove() {
        let doc = run(
            r#"<p id="mid">m</p><p class="old">o1</p><p class="old">o2</p>"#,
            concat!(
                r#"<veer-stream action="before" target="mid"><template><i>1</i><i>2</i></template></veer-stream>"#,
                r#"<veer-stream action="after" target="mid"><template><b>3</b><b>4</b></template></veer-stream>"#,
                r#"<veer-stream action="remove" targets="p.old"></veer-stream>"#,
            ),
        );
        assert_eq!(body(&doc), r#"<i>1</i><i>2</i><p id="mid">m</p><b>3</b><b>4</b>"#);
    }

    #[test]
    fn test_replace_and_update_keep_permanent_elements() {
        let mut doc = veer_html::parse_document(
            r#"<div id="box"><video id="v" data-veer-permanent>playing</video><p>old</p></div>"#,
            "https://example.com/",
        );
        let video = doc.get_element_by_id("v").unwrap();
        let message = r#"<veer-stream action="update" target="box"><template><p>new</p><video id="v" data-veer-permanent></video></template></veer-stream>"#;
        for element in StreamElement::parse_all(message) {
            apply(&mut doc, &element, &EventBus::new(), &NoopBehaviorHost);
        }
        assert_eq!(doc.get_element_by_id("v"), Some(video));
        assert_eq!(doc.tree().text_content(video), "playing");

        let message = r#"<veer-stream action="replace" target="box"><template><section id="box2"><video id="v" data-veer-permanent></video></section></template></veer-stream>"#;
        for element in StreamElement::parse_all(message) {
            apply(&mut doc, &element, &EventBus::new(), &NoopBehaviorHost);
        }
        assert!(doc.get_element_by_id("box").is_none());
        assert_eq!(doc.get_element_by_id("v"), Some(video));
        let parent = doc.tree().parent(video).unwrap();
        assert_eq!(doc.tree().element_id(parent), Some("box2"));
    }

    #[test]
    fn test_update_with_morph_keeps_nodes() {
        let mut doc = veer_html::parse_document(
            r#"<ul id="list"><li id="a">a</li><li id="b">b</li></ul>"#,
            "https://example.com/",
        );
        let a = doc.get_element_by_id("a").unwrap();
        let message = r#"<veer-stream action="update" target="list" method="morph"><template><li id="b">b</li><li id="a">A</li></template></veer-stream>"#;
        for element in StreamElement::parse_all(message) {
            apply(&mut doc, &element, &EventBus::new(), &NoopBehaviorHost);
        }
        assert_eq!(doc.get_element_by_id("a"), Some(a));
        assert_eq!(body(&doc), r#"<ul id="list"><li id="b">b</li><li id="a">A</li></ul>"#);
    }

    #[test]
    fn test_missing_target_is_ignored() {
        let doc = run(
            "<p>x</p>",
            r#"<veer-stream action="append" target="nope"><template><b>y</b></template></veer-stream>"#,
        );
        assert_eq!(body(&doc), "<p>x</p>");
    }
}
