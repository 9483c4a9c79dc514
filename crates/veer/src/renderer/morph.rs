//! Tree reconciliation
//!
//! Morphs an old subtree into the shape of a new one in place. Both subtrees
//! live in the same arena: the new one is imported, detached, before the
//! morph starts, so "inserting" a new node just moves it.
//!
//! Matching uses id sets. Every element carrying an id contributes that id
//! to its own set and to the set of each ancestor up to the morph root. Two
//! elements *hard match* when they share a tag and either carry the same id
//! or have intersecting id sets. A *soft match* only needs the same tag, and
//! is refused when the old node carries an id the new one does not, or when
//! a later new sibling will claim the old node through its ids.
//!
//! The children walk keeps a cursor into the old children. For each new
//! child a hard match at or after the cursor wins, then a soft match, then
//! the new node is inserted before the cursor. Old nodes skipped over to
//! reach a match are removed unless a later new sibling needs them. Old
//! children left past the cursor at the end are removed.

use crate::events::{EventBus, EventDetail, EventName};
use crate::frame::FRAME_TAG;
use crate::snapshot::PERMANENT_ATTRIBUTE;
use std::collections::{HashMap, HashSet};
use veer_dom::{Attribute, DomTree, NodeData, NodeId};

/// What a morph changed
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MorphStats {
    pub attributes_changed: usize,
    pub nodes_inserted: usize,
    pub nodes_removed: usize,
    pub nodes_moved: usize,
    pub text_updated: usize,
    /// Elements left alone by a listener, or permanent
    pub elements_skipped: usize,
}

impl MorphStats {
    /// True when the morph changed nothing
    pub fn is_noop(&self) -> bool {
        self.attributes_changed == 0
            && self.nodes_inserted == 0
            && self.nodes_removed == 0
            && self.nodes_moved == 0
            && self.text_updated == 0
    }
}

/// Morph result
#[derive(Debug, Clone, Default)]
pub struct MorphResult {
    pub stats: MorphStats,
    /// `refresh="morph"` frames that were kept and should be reloaded
    pub frames_to_reload: Vec<NodeId>,
}

/// Morph `old` (and its subtree) into `new`
pub fn morph(tree: &mut DomTree, old: NodeId, new: NodeId, events: Option<&EventBus>) -> MorphResult {
    let mut morpher = Morpher::new(events);
    morpher.index_ids(tree, old);
    morpher.index_ids(tree, new);
    morpher.morph_node(tree, old, new);
    morpher.finish()
}

/// Morph only the children of `old_parent` into those of `new_parent`
pub fn morph_children(
    tree: &mut DomTree,
    old_parent: NodeId,
    new_parent: NodeId,
    events: Option<&EventBus>,
) -> MorphResult {
    let mut morpher = Morpher::new(events);
    morpher.index_ids(tree, old_parent);
    morpher.index_ids(tree, new_parent);
    morpher.morph_children(tree, old_parent, new_parent);
    morpher.finish()
}

/// Ids claimed by the new siblings the children walk has not reached yet,
/// counted so that duplicate ids stay claimed until their last owner
#[derive(Default)]
struct PendingIds {
    counts: HashMap<String, usize>,
}

impl PendingIds {
    fn add(&mut self, ids: &HashSet<String>) {
        for id in ids {
            *self.counts.entry(id.clone()).or_default() += 1;
        }
    }

    fn release(&mut self, ids: &HashSet<String>) {
        for id in ids {
            if let Some(count) = self.counts.get_mut(id) {
                *count -= 1;
                if *count == 0 {
                    self.counts.remove(id);
                }
            }
        }
    }

    fn claims_any(&self, ids: &HashSet<String>) -> bool {
        !self.counts.is_empty() && ids.iter().any(|id| self.counts.contains_key(id))
    }
}

struct Morpher<'a> {
    events: Option<&'a EventBus>,
    id_sets: HashMap<NodeId, HashSet<String>>,
    stats: MorphStats,
    frames_to_reload: Vec<NodeId>,
}

fn is_permanent(tree: &DomTree, node: NodeId) -> bool {
    tree.element(node).is_some_and(|e| e.id().is_some() && e.has_attr(PERMANENT_ATTRIBUTE))
}

fn is_reloading_frame(tree: &DomTree, node: NodeId) -> bool {
    tree.element(node).is_some_and(|e| {
        e.tag == FRAME_TAG && e.get_attr("refresh") == Some("morph") && e.has_attr("src")
    })
}

impl<'a> Morpher<'a> {
    fn new(events: Option<&'a EventBus>) -> Self {
        Self { events, id_sets: HashMap::new(), stats: MorphStats::default(), frames_to_reload: Vec::new() }
    }

    fn finish(self) -> MorphResult {
        tracing::debug!(stats = ?self.stats, "morph finished");
        MorphResult { stats: self.stats, frames_to_reload: self.frames_to_reload }
    }

    fn index_ids(&mut self, tree: &DomTree, root: NodeId) {
        let mut nodes = tree.descendants(root);
        nodes.push(root);
        for node in nodes {
            let Some(id) = tree.element_id(node) else {
                continue;
            };
            let mut current = Some(node);
            while let Some(n) = current {
                self.id_sets.entry(n).or_default().insert(id.to_string());
                if n == root {
                    break;
                }
                current = tree.parent(n);
            }
        }
    }

    /// Whether a later new sibling will claim `node` through its ids
    fn is_claimed(&self, node: NodeId, pending: &PendingIds) -> bool {
        self.id_sets.get(&node).is_some_and(|set| pending.claims_any(set))
    }

    fn is_hard_match(&self, tree: &DomTree, old: NodeId, new: NodeId) -> bool {
        let (Some(old_el), Some(new_el)) = (tree.element(old), tree.element(new)) else {
            return false;
        };
        if old_el.tag != new_el.tag || is_permanent(tree, old) {
            return false;
        }
        if old_el.id().is_some() && old_el.id() == new_el.id() {
            return true;
        }
        match (self.id_sets.get(&old), self.id_sets.get(&new)) {
            (Some(a), Some(b)) => !a.is_disjoint(b),
            _ => false,
        }
    }

    fn is_soft_match(&self, tree: &DomTree, old: NodeId, new: NodeId) -> bool {
        let (Some(old_node), Some(new_node)) = (tree.get(old), tree.get(new)) else {
            return false;
        };
        match (&old_node.data, &new_node.data) {
            (NodeData::Text(_), NodeData::Text(_)) | (NodeData::Comment(_), NodeData::Comment(_)) => true,
            (NodeData::Element(o), NodeData::Element(n)) => {
                o.tag == n.tag && !is_permanent(tree, old) && (o.id().is_none() || o.id() == n.id())
            }
            _ => false,
        }
    }

    fn find_hard_match(&self, tree: &DomTree, cursor: Option<NodeId>, new: NodeId) -> Option<NodeId> {
        if !tree.is_element(new) {
            return None;
        }
        let mut node = cursor;
        while let Some(n) = node {
            if self.is_hard_match(tree, n, new) {
                return Some(n);
            }
            node = tree.next_sibling(n);
        }
        None
    }

    fn find_soft_match(
        &self,
        tree: &DomTree,
        cursor: Option<NodeId>,
        new: NodeId,
        pending: &PendingIds,
    ) -> Option<NodeId> {
        let mut node = cursor;
        while let Some(n) = node {
            // Do not reach past a node a later sibling will claim
            if self.is_claimed(n, pending) {
                return None;
            }
            if self.is_soft_match(tree, n, new) {
                return Some(n);
            }
            node = tree.next_sibling(n);
        }
        None
    }

    fn remove(&mut self, tree: &mut DomTree, node: NodeId) {
        tree.detach(node);
        self.stats.nodes_removed += 1;
    }

    /// Remove the old nodes in `[from, until)` that no later sibling needs.
    /// Returns the new cursor: the first kept node, or `until`.
    fn remove_skipped(
        &mut self,
        tree: &mut DomTree,
        from: Option<NodeId>,
        until: NodeId,
        pending: &PendingIds,
    ) -> Option<NodeId> {
        let mut first_kept = None;
        let mut node = from;
        while let Some(n) = node {
            if n == until {
                break;
            }
            node = tree.next_sibling(n);
            if self.is_claimed(n, pending) {
                first_kept.get_or_insert(n);
            } else {
                self.remove(tree, n);
            }
        }
        first_kept.or(Some(until))
    }

    fn morph_children(&mut self, tree: &mut DomTree, old_parent: NodeId, new_parent: NodeId) {
        let new_children = tree.child_ids(new_parent);
        let mut cursor = tree.first_child(old_parent);

        let mut pending = PendingIds::default();
        for child in &new_children {
            if let Some(set) = self.id_sets.get(child) {
                pending.add(set);
            }
        }

        for &new_child in &new_children {
            if let Some(set) = self.id_sets.get(&new_child) {
                pending.release(set);
            }
            let matched = self
                .find_hard_match(tree, cursor, new_child)
                .or_else(|| self.find_soft_match(tree, cursor, new_child, &pending));

            let Some(old_child) = matched else {
                tree.insert_before(old_parent, new_child, cursor);
                self.stats.nodes_inserted += 1;
                continue;
            };

            if cursor != Some(old_child) {
                cursor = self.remove_skipped(tree, cursor, old_child, &pending);
                if cursor != Some(old_child) {
                    tree.insert_before(old_parent, old_child, cursor);
                    self.stats.nodes_moved += 1;
                }
            }
            if cursor == Some(old_child) {
                cursor = tree.next_sibling(old_child);
            }
            self.morph_node(tree, old_child, new_child);
        }

        while let Some(node) = cursor {
            cursor = tree.next_sibling(node);
            self.remove(tree, node);
        }
    }

    fn morph_node(&mut self, tree: &mut DomTree, old: NodeId, new: NodeId) {
        if !tree.is_element(old) {
            if let Some(text) = tree.char_data(new).map(str::to_string) {
                if tree.set_char_data(old, &text) {
                    self.stats.text_updated += 1;
                }
            }
            return;
        }

        if is_permanent(tree, old) || !self.allow(EventName::BeforeMorphElement, old, None) {
            self.stats.elements_skipped += 1;
            return;
        }
        if is_reloading_frame(tree, old) {
            self.frames_to_reload.push(old);
            return;
        }

        self.sync_attributes(tree, old, new);
        self.morph_children(tree, old, new);
    }

    fn allow(&self, name: EventName, element: NodeId, attribute: Option<&str>) -> bool {
        let Some(events) = self.events else {
            return true;
        };
        events.notify(
            name,
            EventDetail {
                element: Some(element),
                attribute: attribute.map(str::to_string),
                ..Default::default()
            },
        )
    }

    fn sync_attributes(&mut self, tree: &mut DomTree, old: NodeId, new: NodeId) {
        let Some(new_el) = tree.element(new).cloned() else {
            return;
        };
        let Some(old_el) = tree.element(old).cloned() else {
            return;
        };

        for Attribute { name, value } in &new_el.attrs {
            if old_el.get_attr(name) != Some(value.as_str())
                && self.allow(EventName::BeforeMorphAttribute, old, Some(name))
                && tree.set_attr(old, name, value)
            {
                self.stats.attributes_changed += 1;
            }
        }
        for Attribute { name, .. } in &old_el.attrs {
            if !new_el.has_attr(name)
                && self.allow(EventName::BeforeMorphAttribute, old, Some(name))
                && tree.remove_attr(old, name).is_some()
            {
                self.stats.attributes_changed += 1;
            }
        }

        // Live form state only follows the server when the server's value
        // changed; otherwise pending user input survives
        let textarea_changed =
            old_el.tag == "textarea" && tree.text_content(old) != tree.text_content(new);
        if let Some(el) = tree.element_mut(old) {
            if old_el.get_attr("value") != new_el.get_attr("value") || textarea_changed {
                el.state.value = new_el.state.value.clone();
            }
            if old_el.has_attr("checked") != new_el.has_attr("checked") {
                el.state.checked = new_el.state.checked;
            }
            if old_el.has_attr("selected") != new_el.has_attr("selected") {
                el.state.selected = new_el.state.selected;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veer_html::{inner_html, parse_fragment};

    /// Parse `old` and `new` into one arena; returns the two container ids
    fn setup(old: &str, new: &str) -> (DomTree, NodeId, NodeId) {
        let mut tree = DomTree::new();
        let root = tree.root();
        let old_root = tree.create_element("div");
        tree.append_child(root, old_root);
        let old_frag = parse_fragment(old);
        let imported = tree.import_children(&old_frag, old_frag.root());
        tree.append_child(old_root, imported);

        let new_root = tree.create_element("div");
        let new_frag = parse_fragment(new);
        let imported = tree.import_children(&new_frag, new_frag.root());
        tree.append_child(new_root, imported);
        (tree, old_root, new_root)
    }

    #[test]
    fn test_keyed_reorder_keeps_identity() {
        let (mut tree, old, new) = setup(
            r#"<ul><li id="a">1</li><li id="b">2</li></ul>"#,
            r#"<ul><li id="b">2</li><li id="a">1</li></ul>"#,
        );
        let a = tree.get_element_by_id(old, "a").unwrap();
        let b = tree.get_element_by_id(old, "b").unwrap();

        let result = morph_children(&mut tree, old, new, None);

        let ul = tree.first_child(old).unwrap();
        assert_eq!(tree.child_ids(ul), vec![b, a]);
        assert_eq!(result.stats.nodes_inserted, 0);
        assert_eq!(result.stats.nodes_removed, 0);
        assert_eq!(result.stats.nodes_moved, 1);
    }

    #[test]
    fn test_text_and_attributes_update_in_place() {
        let (mut tree, old, new) = setup(
            r#"<p class="a" data-x="1">hello</p>"#,
            r#"<p class="b">world</p>"#,
        );
        let p = tree.first_child(old).unwrap();
        let result = morph_children(&mut tree, old, new, None);

        assert_eq!(tree.first_child(old), Some(p));
        assert_eq!(inner_html(&tree, old), r#"<p class="b">world</p>"#);
        assert_eq!(result.stats.attributes_changed, 2);
        assert_eq!(result.stats.text_updated, 1);
    }

    #[test]
    fn test_second_pass_is_noop() {
        let html = r#"<section id="s"><h1 class="t">T</h1><ul><li id="x">x</li></ul></section>"#;
        let (mut tree, old, new) = setup("<p>old</p>", html);
        morph_children(&mut tree, old, new, None);

        let again = parse_fragment(html);
        let second = tree.import_children(&again, again.root());
        let holder = tree.create_element("div");
        tree.append_child(holder, second);
        let result = morph_children(&mut tree, old, holder, None);

        assert_eq!(result.stats.attributes_changed, 0);
        assert!(result.stats.is_noop());
        assert_eq!(inner_html(&tree, old), html);
    }

    #[test]
    fn test_insert_and_remove() {
        let (mut tree, old, new) = setup("<p>1</p><span>2</span><em>3</em>", "<p>1</p><b>new</b>");
        let result = morph_children(&mut tree, old, new, None);
        assert_eq!(inner_html(&tree, old), "<p>1</p><b>new</b>");
        assert_eq!(result.stats.nodes_inserted, 1);
        assert_eq!(result.stats.nodes_removed, 2);
    }

    #[test]
    fn test_id_in_subtree_drives_match() {
        let (mut tree, old, new) = setup(
            r#"<div class="card"><input id="name"></div><div class="other"></div>"#,
            r#"<div class="other"></div><div class="card"><input id="name"></div>"#,
        );
        let input = tree.get_element_by_id(old, "name").unwrap();
        morph_children(&mut tree, old, new, None);
        assert_eq!(tree.get_element_by_id(old, "name"), Some(input));
        assert_eq!(
            inner_html(&tree, old),
            r#"<div class="other"></div><div class="card"><input id="name"></div>"#
        );
    }

    #[test]
    fn test_user_input_survives_unchanged_server_value() {
        let (mut tree, old, new) = setup(
            r#"<input id="q" value="a"><input id="r" value="a">"#,
            r#"<input id="q" value="a"><input id="r" value="b">"#,
        );
        let q = tree.get_element_by_id(old, "q").unwrap();
        let r = tree.get_element_by_id(old, "r").unwrap();
        tree.element_mut(q).unwrap().state.value = Some("typed".into());
        tree.element_mut(r).unwrap().state.value = Some("typed".into());

        morph_children(&mut tree, old, new, None);

        assert_eq!(tree.element(q).unwrap().value(), Some("typed"));
        assert_eq!(tree.element(r).unwrap().value(), Some("b"));
    }

    #[test]
    fn test_checkbox_state() {
        let (mut tree, old, new) = setup(
            r#"<input id="c" type="checkbox">"#,
            r#"<input id="c" type="checkbox" checked>"#,
        );
        let c = tree.get_element_by_id(old, "c").unwrap();
        tree.element_mut(c).unwrap().state.checked = Some(false);
        morph_children(&mut tree, old, new, None);
        assert!(tree.element(c).unwrap().checked());
    }

    #[test]
    fn test_permanent_element_is_never_matched() {
        let (mut tree, old, new) = setup(
            r#"<div id="p" data-veer-permanent class="keep">live</div>"#,
            r#"<div id="p" data-veer-permanent class="server">server</div>"#,
        );
        let p = tree.get_element_by_id(old, "p").unwrap();
        let result = morph_children(&mut tree, old, new, None);

        // Without placeholders the new copy takes the slot
        assert!(!tree.contains(old, p));
        assert_eq!(inner_html(&tree, old), r#"<div id="p" data-veer-permanent class="server">server</div>"#);
        assert_eq!(tree.attr(p, "class"), Some("keep"));
        assert_eq!(result.stats.nodes_inserted, 1);
    }

    #[test]
    fn test_permanent_element_stays_connected_when_preserved() {
        let url = "https://example.com/";
        let mut doc = veer_html::parse_document(
            r#"<div id="p" data-veer-permanent class="keep">live</div><p>old</p>"#,
            url,
        );
        let p = doc.get_element_by_id("p").unwrap();
        let incoming = veer_html::parse_document(
            r#"<div id="p" data-veer-permanent class="server">server</div><p>new</p>"#,
            url,
        );
        let new_body = doc.tree_mut().import(incoming.tree(), incoming.body());
        let body = doc.body();
        crate::renderer::permanent::preserve(&mut doc, body, new_body, |doc| {
            morph(doc.tree_mut(), body, new_body, None)
        });

        assert!(doc.tree().is_connected(p));
        assert_eq!(doc.get_element_by_id("p"), Some(p));
        assert_eq!(doc.tree().attr(p, "class"), Some("keep"));
        assert_eq!(doc.tree().text_content(p), "live");
        assert!(doc.tree().text_content(body).contains("new"));
    }

    fn keyed_list(ids: impl Iterator<Item = usize>) -> String {
        let items: String = ids.map(|i| format!(r#"<li id="item-{i}">{i}</li>"#)).collect();
        format!("<ul>{items}</ul>")
    }

    #[test]
    fn test_large_identical_list_is_noop() {
        let html = keyed_list(0..3000);
        let (mut tree, old, new) = setup(&html, &html);
        let first = tree.get_element_by_id(old, "item-0").unwrap();

        let result = morph_children(&mut tree, old, new, None);

        assert!(result.stats.is_noop());
        assert_eq!(tree.get_element_by_id(old, "item-0"), Some(first));
        assert_eq!(inner_html(&tree, old), html);
    }

    #[test]
    fn test_reversed_list_keeps_every_node() {
        let (mut tree, old, new) = setup(&keyed_list(0..200), &keyed_list((0..200).rev()));
        let last = tree.get_element_by_id(old, "item-199").unwrap();

        let result = morph_children(&mut tree, old, new, None);

        assert_eq!(result.stats.nodes_inserted, 0);
        assert_eq!(result.stats.nodes_removed, 0);
        assert_eq!(inner_html(&tree, old), keyed_list((0..200).rev()));
        let ul = tree.first_child(old).unwrap();
        assert_eq!(tree.first_child(ul), Some(last));
    }

    #[test]
    fn test_listener_can_skip_element_and_attribute() {
        let bus = EventBus::new();
        bus.on(EventName::BeforeMorphAttribute, |e| {
            if e.detail.attribute.as_deref() == Some("aria-expanded") {
                e.prevent_default();
            }
        });
        let (mut tree, old, new) = setup(
            r#"<details id="d" aria-expanded="true" class="a"></details>"#,
            r#"<details id="d" aria-expanded="false" class="b"></details>"#,
        );
        let d = tree.get_element_by_id(old, "d").unwrap();
        morph_children(&mut tree, old, new, Some(&bus));
        assert_eq!(tree.attr(d, "aria-expanded"), Some("true"));
        assert_eq!(tree.attr(d, "class"), Some("b"));

        let skip_all = EventBus::new();
        skip_all.on(EventName::BeforeMorphElement, |e| e.prevent_default());
        let (mut tree, old, new) = setup(r#"<p class="a">x</p>"#, r#"<p class="b">y</p>"#);
        let result = morph_children(&mut tree, old, new, Some(&skip_all));
        assert_eq!(inner_html(&tree, old), r#"<p class="a">x</p>"#);
        assert_eq!(result.stats.elements_skipped, 1);
    }

    #[test]
    fn test_refresh_morph_frame_is_reloaded_not_morphed() {
        let (mut tree, old, new) = setup(
            r#"<veer-frame id="f" src="/f" refresh="morph"><p>loaded</p></veer-frame>"#,
            r#"<veer-frame id="f" src="/f" refresh="morph"></veer-frame>"#,
        );
        let frame = tree.get_element_by_id(old, "f").unwrap();
        let result = morph_children(&mut tree, old, new, None);
        assert_eq!(result.frames_to_reload, vec![frame]);
        assert_eq!(tree.text_content(frame), "loaded");
    }

    #[test]
    fn test_malformed_input_degrades() {
        let (mut tree, old, new) = setup("<table><p>x</table>", "<<div>>< /p>text");
        morph_children(&mut tree, old, new, None);
        assert!(tree.text_content(old).contains("text"));
    }
}
