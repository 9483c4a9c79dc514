//! View
//!
//! Scroll and focus state for the live page, and the prepare / render /
//! finish sequence around a [`Renderer`].

use crate::adapter::BehaviorHost;
use crate::events::{EventBus, EventDetail, EventName, LifecycleEvent};
use crate::renderer::{RenderOutcome, Renderer};
use veer_dom::{Document, NodeId};

/// Scroll offset in CSS pixels
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct ScrollPosition {
    pub x: f64,
    pub y: f64,
}

/// Where the last scroll went
#[derive(Debug, Clone, PartialEq, Default)]
pub enum ScrollTarget {
    #[default]
    Top,
    Position(ScrollPosition),
    Anchor(String),
    Element(NodeId),
}

/// Scroll and focus bookkeeping
#[derive(Debug, Default)]
pub struct View {
    position: ScrollPosition,
    last_scroll: ScrollTarget,
    focused: Option<NodeId>,
    rendering: bool,
}

impl View {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scroll_position(&self) -> ScrollPosition {
        self.position
    }

    /// Record a user scroll
    pub fn set_scroll_position(&mut self, position: ScrollPosition) {
        self.position = position;
    }

    pub fn last_scroll(&self) -> &ScrollTarget {
        &self.last_scroll
    }

    pub fn scroll_to_top(&mut self) {
        self.position = ScrollPosition::default();
        self.last_scroll = ScrollTarget::Top;
    }

    pub fn scroll_to_position(&mut self, position: ScrollPosition) {
        self.position = position;
        self.last_scroll = ScrollTarget::Position(position);
    }

    /// Scroll to the element named by `anchor` (an id, or a legacy
    /// `<a name>`), falling back to the top
    pub fn scroll_to_anchor(&mut self, document: &Document, anchor: &str) -> bool {
        let target = document.get_element_by_id(anchor).or_else(|| {
            document
                .tree()
                .find_first(document.body(), |e| e.tag == "a" && e.get_attr("name") == Some(anchor))
        });
        match target {
            Some(_) => {
                self.last_scroll = ScrollTarget::Anchor(anchor.to_string());
                true
            }
            None => {
                self.scroll_to_top();
                false
            }
        }
    }

    pub fn scroll_to_element(&mut self, element: NodeId) {
        self.last_scroll = ScrollTarget::Element(element);
    }

    pub fn focused(&self) -> Option<NodeId> {
        self.focused
    }

    pub fn focus(&mut self, element: NodeId) {
        self.focused = Some(element);
    }

    pub fn blur(&mut self) {
        self.focused = None;
    }

    pub fn is_rendering(&self) -> bool {
        self.rendering
    }

    /// Run a renderer against the live document. `BeforeRender` may
    /// substitute the render; `Render` fires once it is done.
    pub fn render(
        &mut self,
        document: &mut Document,
        mut renderer: Renderer,
        events: &EventBus,
        behaviors: &dyn BehaviorHost,
    ) -> RenderOutcome {
        let before = events.dispatch(LifecycleEvent::new(
            EventName::BeforeRender,
            EventDetail {
                is_preview: renderer.is_preview,
                render_method: Some(renderer.method()),
                ..Default::default()
            },
        ));
        if let Some(custom) = before.custom_render {
            renderer.custom_render = Some(custom);
        }

        self.rendering = true;
        renderer.prepare_to_render(document);
        let outcome = renderer.render(document, events, behaviors);
        self.rendering = false;

        // Focus the new autofocus element unless focus is still on a
        // connected node
        let keep_focus = self.focused.is_some_and(|f| document.tree().is_connected(f));
        if !keep_focus {
            self.focused = outcome.autofocus;
        }

        events.notify(
            EventName::Render,
            EventDetail {
                is_preview: renderer.is_preview,
                render_method: Some(renderer.method()),
                ..Default::default()
            },
        );
        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scroll_to_anchor() {
        let doc = veer_html::parse_document(
            "<h2 id=\"intro\">x</h2><a name=\"legacy\"></a>",
            "https://example.com/",
        );
        let mut view = View::new();
        view.set_scroll_position(ScrollPosition { x: 0.0, y: 50.0 });

        assert!(view.scroll_to_anchor(&doc, "intro"));
        assert_eq!(view.last_scroll(), &ScrollTarget::Anchor("intro".into()));
        assert!(view.scroll_to_anchor(&doc, "legacy"));

        assert!(!view.scroll_to_anchor(&doc, "missing"));
        assert_eq!(view.last_scroll(), &ScrollTarget::Top);
        assert_eq!(view.scroll_position(), ScrollPosition::default());
    }

    #[test]
    fn test_scroll_to_position() {
        let mut view = View::new();
        let pos = ScrollPosition { x: 1.0, y: 2.0 };
        view.scroll_to_position(pos);
        assert_eq!(view.scroll_position(), pos);
        assert_eq!(view.last_scroll(), &ScrollTarget::Position(pos));
    }
}
