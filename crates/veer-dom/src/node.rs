//! DOM Node
//!
//! Nodes link to their relatives through [`NodeId`]s instead of pointers, so
//! a whole tree can be cloned with a plain `Vec` clone.

use crate::NodeId;

/// DOM Node - Core structure
#[derive(Debug, Clone)]
pub struct Node {
    /// Parent node (NONE if detached or root)
    pub parent: NodeId,
    /// First child
    pub first_child: NodeId,
    /// Last child (for O(1) append)
    pub last_child: NodeId,
    /// Previous sibling
    pub prev_sibling: NodeId,
    /// Next sibling
    pub next_sibling: NodeId,
    /// Node-specific data
    pub data: NodeData,
}

impl Node {
    pub(crate) fn with_data(data: NodeData) -> Self {
        Self {
            parent: NodeId::NONE,
            first_child: NodeId::NONE,
            last_child: NodeId::NONE,
            prev_sibling: NodeId::NONE,
            next_sibling: NodeId::NONE,
            data,
        }
    }

    /// Check if this is an element
    #[inline]
    pub fn is_element(&self) -> bool {
        matches!(self.data, NodeData::Element(_))
    }

    /// Check if this is text
    #[inline]
    pub fn is_text(&self) -> bool {
        matches!(self.data, NodeData::Text(_))
    }

    /// Get element data if this is an element
    #[inline]
    pub fn as_element(&self) -> Option<&ElementData> {
        match &self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Get mutable element data
    #[inline]
    pub fn as_element_mut(&mut self) -> Option<&mut ElementData> {
        match &mut self.data {
            NodeData::Element(e) => Some(e),
            _ => None,
        }
    }

    /// Get text content if this is a text node
    #[inline]
    pub fn as_text(&self) -> Option<&str> {
        match &self.data {
            NodeData::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Node-specific data
#[derive(Debug, Clone, PartialEq)]
pub enum NodeData {
    /// Document root
    Document,
    /// Detached container for parsed fragments and template contents
    Fragment,
    /// DOCTYPE
    Doctype { name: String },
    /// Element
    Element(ElementData),
    /// Text content
    Text(String),
    /// Comment
    Comment(String),
}

/// Live state of a form control.
///
/// `None` means the control still mirrors its markup (the `value`, `checked`
/// or `selected` attribute). Setting a field models user input that has not
/// been submitted yet.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FormState {
    pub value: Option<String>,
    pub checked: Option<bool>,
    pub selected: Option<bool>,
}

/// Element-specific data
#[derive(Debug, Clone, PartialEq)]
pub struct ElementData {
    /// Lowercase tag name
    pub tag: String,
    /// Attributes in source order
    pub attrs: Vec<Attribute>,
    /// Live form-control state
    pub state: FormState,
}

/// Attribute
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Attribute {
    pub name: String,
    pub value: String,
}

impl ElementData {
    pub fn new(tag: &str) -> Self {
        Self {
            tag: tag.to_ascii_lowercase(),
            attrs: Vec::new(),
            state: FormState::default(),
        }
    }

    /// Get an attribute value
    pub fn get_attr(&self, name: &str) -> Option<&str> {
        self.attrs.iter()
            .find(|a| a.name == name)
            .map(|a| a.value.as_str())
    }

    /// Check for an attribute
    pub fn has_attr(&self, name: &str) -> bool {
        self.attrs.iter().any(|a| a.name == name)
    }

    /// Set an attribute, returning true when the element changed
    pub fn set_attr(&mut self, name: &str, value: &str) -> bool {
        for attr in self.attrs.iter_mut() {
            if attr.name == name {
                if attr.value == value {
                    return false;
                }
                attr.value = value.to_string();
                return true;
            }
        }
        self.attrs.push(Attribute { name: name.to_string(), value: value.to_string() });
        true
    }

    /// Remove an attribute, returning its previous value
    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let pos = self.attrs.iter().position(|a| a.name == name)?;
        Some(self.attrs.remove(pos).value)
    }

    /// The `id` attribute, if non-empty
    pub fn id(&self) -> Option<&str> {
        self.get_attr("id").filter(|id| !id.is_empty())
    }

    /// Whitespace-separated class names
    pub fn classes(&self) -> impl Iterator<Item = &str> {
        self.get_attr("class").unwrap_or("").split_ascii_whitespace()
    }

    pub fn has_class(&self, class: &str) -> bool {
        self.classes().any(|c| c == class)
    }

    /// Whether this element carries user-editable state
    pub fn is_form_control(&self) -> bool {
        matches!(self.tag.as_str(), "input" | "textarea" | "select" | "option")
    }

    /// Current value: live state first, then markup
    pub fn value(&self) -> Option<&str> {
        self.state.value.as_deref().or_else(|| self.get_attr("value"))
    }

    /// Current checkedness of checkboxes and radios
    pub fn checked(&self) -> bool {
        self.state.checked.unwrap_or_else(|| self.has_attr("checked"))
    }

    /// Current selectedness of options
    pub fn selected(&self) -> bool {
        self.state.selected.unwrap_or_else(|| self.has_attr("selected"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_attr_reports_change() {
        let mut el = ElementData::new("DIV");
        assert_eq!(el.tag, "div");
        assert!(el.set_attr("class", "a"));
        assert!(!el.set_attr("class", "a"));
        assert!(el.set_attr("class", "b"));
        assert_eq!(el.get_attr("class"), Some("b"));
        assert_eq!(el.remove_attr("class"), Some("b".to_string()));
        assert!(!el.has_attr("class"));
    }

    #[test]
    fn test_live_state_overrides_markup() {
        let mut el = ElementData::new("input");
        el.set_attr("value", "server");
        assert_eq!(el.value(), Some("server"));
        el.state.value = Some("typed".into());
        assert_eq!(el.value(), Some("typed"));

        el.set_attr("checked", "");
        assert!(el.checked());
        el.state.checked = Some(false);
        assert!(!el.checked());
    }

    #[test]
    fn test_empty_id_is_none() {
        let mut el = ElementData::new("p");
        el.set_attr("id", "");
        assert_eq!(el.id(), None);
    }
}
