//! veer DOM - Document Object Model
//!
//! Arena-allocated document tree. Nodes are addressed by [`NodeId`] and keep
//! their identity while they are moved around, which is what the morph and
//! permanent-element machinery in `veer` relies on.

mod node;
mod tree;
mod document;
mod selector;

pub use node::{Node, NodeData, ElementData, Attribute, FormState};
pub use tree::DomTree;
pub use document::Document;
pub use selector::{Selector, SelectorError};

/// Node identifier (index into arena)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    /// Root node ID
    pub const ROOT: NodeId = NodeId(0);

    /// Sentinel for "no node"
    pub const NONE: NodeId = NodeId(u32::MAX);

    /// Check whether this id points at a node
    #[inline]
    pub fn is_valid(self) -> bool {
        self != Self::NONE
    }

    /// Arena index
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }

    pub(crate) fn from_option(id: Option<NodeId>) -> NodeId {
        id.unwrap_or(NodeId::NONE)
    }

    pub(crate) fn to_option(self) -> Option<NodeId> {
        self.is_valid().then_some(self)
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}
