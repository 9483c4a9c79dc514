//! Page renders

use super::morph::{self, MorphResult};
use super::permanent;
use crate::events::EventBus;
use crate::snapshot::PageSnapshot;
use veer_dom::{Document, NodeId};

/// Swap in the snapshot's body, returning the new live body
pub(super) fn replace_body(document: &mut Document, snapshot: &PageSnapshot) -> NodeId {
    let new_body = document.tree_mut().import(snapshot.tree(), snapshot.body());
    let current = document.body();
    permanent::preserve(document, current, new_body, |doc| {
        doc.replace_body(new_body);
    });
    new_body
}

/// Reconcile the live body with the snapshot's
pub(super) fn morph_body(document: &mut Document, snapshot: &PageSnapshot, events: &EventBus) -> MorphResult {
    let new_body = document.tree_mut().import(snapshot.tree(), snapshot.body());
    let current = document.body();
    permanent::preserve(document, current, new_body, |doc| {
        morph::morph(doc.tree_mut(), current, new_body, Some(events))
    })
}

/// Swap both head and body, returning the new live pair
pub(super) fn replace_document(document: &mut Document, snapshot: &PageSnapshot) -> (NodeId, NodeId) {
    let new_head = document.tree_mut().import(snapshot.tree(), snapshot.head());
    let new_body = document.tree_mut().import(snapshot.tree(), snapshot.body());
    let current = document.body();
    permanent::preserve(document, current, new_body, |doc| {
        doc.replace_head(new_head);
        doc.replace_body(new_body);
    });
    (new_head, new_body)
}

pub(super) fn scripts(document: &Document, root: NodeId) -> Vec<NodeId> {
    document.tree().find_all(root, |e| e.tag == "script")
}

pub(super) fn autofocus(document: &Document, root: NodeId) -> Option<NodeId> {
    document.tree().find_first(root, |e| e.has_attr("autofocus"))
}
