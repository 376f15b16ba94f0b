//! Arena-backed document tree for swap targets.
//!
//! Nodes live in an [`indextree::Arena`] and are addressed by [`NodeId`]. Removing
//! content only detaches it, so ids held by callers (a captured focus target, an
//! element referenced by a pending settle task) remain valid and can be checked
//! with [`Document::is_connected`].

mod host;
mod parser;
mod printing;
mod query;
mod serialize;
mod tree;

pub use host::{ScrollBehavior, ScrollEdge, ScrollRecord, SelectionRange};
pub use indextree::NodeId;
pub use parser::ParsedFragment;

use indextree::Arena;
use smallvec::SmallVec;

/// Inline attribute storage; most elements carry only a handful.
pub type Attributes = SmallVec<[(String, String); 4]>;

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum NodeKind {
    #[default]
    Document,
    /// Detached container produced by fragment parsing.
    Fragment,
    Element {
        tag: String,
    },
    Text {
        text: String,
    },
    Comment {
        text: String,
    },
}

#[derive(Debug, Clone, Default)]
pub struct DomNode {
    pub kind: NodeKind,
    pub attrs: Attributes,
}

impl DomNode {
    /// Element node with the given tag, lowercased.
    pub fn element(tag: &str) -> Self {
        Self {
            kind: NodeKind::Element {
                tag: tag.to_ascii_lowercase(),
            },
            attrs: Attributes::new(),
        }
    }

    pub fn text(text: &str) -> Self {
        Self {
            kind: NodeKind::Text {
                text: text.to_owned(),
            },
            attrs: Attributes::new(),
        }
    }

    /// Tag name for elements, `None` otherwise.
    pub fn tag(&self) -> Option<&str> {
        match &self.kind {
            NodeKind::Element { tag } => Some(tag.as_str()),
            _ => None,
        }
    }

    pub fn is_element(&self) -> bool {
        matches!(self.kind, NodeKind::Element { .. })
    }
}

/// A live document: the node arena plus the host state a swap touches
/// (title, focus, selection and scroll requests).
pub struct Document {
    pub(crate) arena: Arena<DomNode>,
    pub(crate) root: NodeId,
    pub(crate) title: String,
    pub(crate) host: host::HostState,
}
