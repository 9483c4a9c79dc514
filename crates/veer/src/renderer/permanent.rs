//! Permanent-element preservation
//!
//! Before a render, every incoming counterpart of a live permanent element
//! is swapped for a placeholder. After the render the live element is moved
//! into the placeholder's slot, so it keeps its identity and state.

use crate::snapshot::{permanent_elements, PERMANENT_ATTRIBUTE};
use veer_dom::{Document, NodeId};

const PLACEHOLDER_ATTRIBUTE: &str = "data-veer-permanent-placeholder";

/// Run `render` with the permanent elements under `current_root` kept alive
/// across it. `incoming_root` is the detached new content in the same
/// arena.
pub fn preserve<R>(
    document: &mut Document,
    current_root: NodeId,
    incoming_root: NodeId,
    render: impl FnOnce(&mut Document) -> R,
) -> R {
    let tree = document.tree_mut();
    let mut placeholders = Vec::new();

    for current in permanent_elements(tree, current_root) {
        let Some(id) = tree.element_id(current).map(str::to_string) else {
            continue;
        };
        let incoming = tree.find_first(incoming_root, |e| {
            e.id() == Some(id.as_str()) && e.has_attr(PERMANENT_ATTRIBUTE)
        });
        if let Some(incoming) = incoming {
            let placeholder = tree.create_element_with_attrs("meta", &[(PLACEHOLDER_ATTRIBUTE, id.as_str())]);
            tree.replace_node(incoming, placeholder);
            placeholders.push((placeholder, current));
        }
    }

    let result = render(document);

    if !placeholders.is_empty() {
        tracing::trace!(count = placeholders.len(), "restoring permanent elements");
    }
    let tree = document.tree_mut();
    for (placeholder, current) in placeholders {
        tree.replace_node(placeholder, current);
    }
    result
}
