//! Frame renders

use super::permanent;
use crate::adapter::BehaviorHost;
use crate::frame::FRAME_TAG;
use std::collections::HashSet;
use veer_dom::{Document, DomTree, NodeId};

#[derive(Debug, Default)]
pub(super) struct FrameRenderResult {
    pub inserted: Vec<NodeId>,
    pub frames_to_reload: Vec<NodeId>,
    pub scripts: Vec<NodeId>,
    pub autofocus: Option<NodeId>,
}

/// Replace the children of the live frame `target` with copies of the
/// children of `source`
pub(super) fn render(
    document: &mut Document,
    target: NodeId,
    source_tree: &DomTree,
    source: NodeId,
    behaviors: &dyn BehaviorHost,
) -> FrameRenderResult {
    let before: Vec<NodeId> = elements(document.tree(), target);
    let fragment = document.tree_mut().import_children(source_tree, source);

    permanent::preserve(document, target, fragment, |doc| {
        let tree = doc.tree_mut();
        tree.remove_children(target);
        for child in tree.child_ids(fragment) {
            tree.append_child(target, child);
        }
    });

    let tree = document.tree();
    let kept: HashSet<NodeId> = before.iter().copied().filter(|&e| tree.contains(target, e)).collect();
    for &old in &before {
        if !kept.contains(&old) {
            behaviors.disconnect(tree, old);
        }
    }

    let after = elements(tree, target);
    let mut result = FrameRenderResult::default();
    for &element in &after {
        if kept.contains(&element) {
            continue;
        }
        behaviors.connect(tree, element);
        result.inserted.push(element);
        let Some(data) = tree.element(element) else { continue };
        if data.tag == "script" {
            result.scripts.push(element);
        }
        if data.tag == FRAME_TAG && data.get_attr("refresh") == Some("morph") && data.has_attr("src") {
            result.frames_to_reload.push(element);
        }
        if result.autofocus.is_none() && data.has_attr("autofocus") {
            result.autofocus = Some(element);
        }
    }
    tracing::debug!(inserted = result.inserted.len(), "frame rendered");
    result
}

fn elements(tree: &DomTree, root: NodeId) -> Vec<NodeId> {
    tree.descendants(root).into_iter().filter(|&n| tree.is_element(n)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::cell::RefCell;

    #[derive(Default)]
    struct Recorder {
        connected: RefCell<Vec<String>>,
        disconnected: RefCell<Vec<String>>,
    }

    impl BehaviorHost for Recorder {
        fn connect(&self, tree: &DomTree, element: NodeId) {
            self.connected.borrow_mut().push(tree.tag(element).unwrap_or("").to_string());
        }
        fn disconnect(&self, tree: &DomTree, element: NodeId) {
            self.disconnected.borrow_mut().push(tree.tag(element).unwrap_or("").to_string());
        }
    }

    #[test]
    fn test_frame_render_swaps_children() {
        let mut doc = veer_html::parse_document(
            r#"<veer-frame id="f"><span>old</span><div id="keep" data-veer-permanent>kept</div></veer-frame>"#,
            "https://example.com/",
        );
        let frame = doc.get_element_by_id("f").unwrap();
        let keep = doc.get_element_by_id("keep").unwrap();
        let incoming = veer_html::parse_document(
            r#"<veer-frame id="f"><em>new</em><div id="keep" data-veer-permanent>fresh</div><veer-frame id="inner" src="/i" refresh="morph"></veer-frame></veer-frame>"#,
            "https://example.com/",
        );
        let source = incoming.get_element_by_id("f").unwrap();
        let host = Recorder::default();

        let result = render(&mut doc, frame, incoming.tree(), source, &host);

        assert_eq!(doc.tree().text_content(frame), "newkept");
        assert_eq!(doc.get_element_by_id("keep"), Some(keep));
        assert_eq!(*host.disconnected.borrow(), vec!["span"]);
        assert_eq!(*host.connected.borrow(), vec!["em", "veer-frame"]);
        assert_eq!(result.frames_to_reload.len(), 1);
    }
}
