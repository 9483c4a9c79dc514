//! Head merging
//!
//! Page renders never swap the head wholesale. Stylesheets and tracked
//! assets accumulate, provisional elements (title, meta and the like)
//! follow the new page, scripts that are new get activated, and stale
//! `data-veer-track="dynamic"` elements go away.

use crate::snapshot::{PageSnapshot, TRACK_ATTRIBUTE};
use std::collections::HashSet;
use veer_dom::{Document, DomTree, NodeId};
use veer_html::outer_html;

/// What a head merge did
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HeadMergeStats {
    pub added: usize,
    pub removed: usize,
    /// Newly inserted script elements, in document order
    pub scripts_activated: Vec<NodeId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum HeadKind {
    Tracked,
    Stylesheet,
    Script,
    Provisional,
}

fn classify(tree: &DomTree, element: NodeId) -> HeadKind {
    let Some(el) = tree.element(element) else {
        return HeadKind::Provisional;
    };
    if el.get_attr(TRACK_ATTRIBUTE) == Some("reload") {
        HeadKind::Tracked
    } else if el.tag == "script" {
        HeadKind::Script
    } else if el.tag == "style" || (el.tag == "link" && el.get_attr("rel") == Some("stylesheet")) {
        HeadKind::Stylesheet
    } else {
        HeadKind::Provisional
    }
}

struct HeadEntry {
    node: NodeId,
    kind: HeadKind,
    html: String,
}

fn entries(tree: &DomTree, head: NodeId) -> Vec<HeadEntry> {
    tree.element_children(head)
        .into_iter()
        .map(|node| HeadEntry { node, kind: classify(tree, node), html: outer_html(tree, node) })
        .collect()
}

/// Merge the head of `snapshot` into the live document's head
pub fn merge(document: &mut Document, snapshot: &PageSnapshot) -> HeadMergeStats {
    let head = document.head();
    let current = entries(document.tree(), head);
    let incoming = entries(snapshot.tree(), snapshot.head());
    let current_html: HashSet<&str> = current.iter().map(|e| e.html.as_str()).collect();
    let incoming_html: HashSet<&str> = incoming.iter().map(|e| e.html.as_str()).collect();
    let mut stats = HeadMergeStats::default();
    let tree = document.tree_mut();

    // Stale dynamic assets and provisional elements the new page lacks
    for entry in &current {
        let dynamic = tree.attr(entry.node, TRACK_ATTRIBUTE) == Some("dynamic");
        let stale = !incoming_html.contains(entry.html.as_str());
        if stale && (dynamic || entry.kind == HeadKind::Provisional) {
            tree.detach(entry.node);
            stats.removed += 1;
        }
    }

    for entry in &incoming {
        if current_html.contains(entry.html.as_str()) {
            continue;
        }
        let copy = tree.import(snapshot.tree(), entry.node);
        tree.append_child(head, copy);
        stats.added += 1;
        if entry.kind == HeadKind::Script {
            stats.scripts_activated.push(copy);
        }
    }

    tracing::debug!(added = stats.added, removed = stats.removed, "head merged");
    stats
}
