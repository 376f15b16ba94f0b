//! Host-side document state touched by swaps: title, focus, text selection
//! and scroll requests.
//!
//! There is no layout here, so scrolling is recorded as requests that a host
//! (or a test) can inspect via [`Document::scroll_records`].

use crate::Document;
use indextree::NodeId;
use log::trace;
use serde::Deserialize;
use std::mem;

/// Text selection inside the focused element, as character offsets.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRange {
    pub start: usize,
    pub end: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollEdge {
    Top,
    Bottom,
}

/// How a scroll request should animate.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollBehavior {
    #[default]
    Instant,
    Smooth,
    Auto,
}

/// A recorded scroll request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScrollRecord {
    /// Scroll an element's own viewport to an edge (`scrollTop`).
    Element { node: NodeId, edge: ScrollEdge },
    /// Bring an element into view, aligned to an edge.
    IntoView {
        node: NodeId,
        edge: ScrollEdge,
        behavior: ScrollBehavior,
    },
    /// Scroll the window to an edge.
    Window {
        edge: ScrollEdge,
        behavior: ScrollBehavior,
    },
}

#[derive(Debug, Default)]
pub(crate) struct HostState {
    active: Option<NodeId>,
    selection: Option<SelectionRange>,
    scrolls: Vec<ScrollRecord>,
}

/// Elements that accept focus without a `tabindex`.
const FOCUSABLE_TAGS: &[&str] = &["a", "button", "input", "select", "textarea"];

impl Document {
    #[inline]
    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: &str) {
        trace!("document title set to {title:?}");
        title.clone_into(&mut self.title);
    }

    pub fn is_focusable(&self, node: NodeId) -> bool {
        self.tag_name(node)
            .is_some_and(|tag| FOCUSABLE_TAGS.contains(&tag))
            || self.has_attribute(node, "tabindex")
    }

    /// Currently focused element, if it is still connected.
    pub fn active_element(&self) -> Option<NodeId> {
        self.host.active.filter(|node| self.is_connected(*node))
    }

    /// Focus a connected focusable element. Unless `prevent_scroll` is set the
    /// element is also scrolled into view. Returns whether focus moved.
    pub fn focus(&mut self, node: NodeId, prevent_scroll: bool) -> bool {
        if !self.is_connected(node) || !self.is_focusable(node) {
            return false;
        }
        if self.host.active != Some(node) {
            self.host.selection = None;
        }
        self.host.active = Some(node);
        if !prevent_scroll {
            self.scroll_into_view(node, ScrollEdge::Top, ScrollBehavior::Auto);
        }
        true
    }

    pub fn blur(&mut self) {
        self.host.active = None;
        self.host.selection = None;
    }

    /// Selection inside the active element.
    pub fn selection(&self) -> Option<SelectionRange> {
        self.active_element().and(self.host.selection)
    }

    /// Set the selection inside the active element; ignored without focus.
    pub fn set_selection_range(&mut self, start: usize, end: usize) {
        if self.active_element().is_some() {
            self.host.selection = Some(SelectionRange {
                start: start.min(end),
                end: start.max(end),
            });
        }
    }

    /// Scroll an element's own content to an edge.
    pub fn scroll_to(&mut self, node: NodeId, edge: ScrollEdge) {
        self.host.scrolls.push(ScrollRecord::Element { node, edge });
    }

    pub fn scroll_into_view(&mut self, node: NodeId, edge: ScrollEdge, behavior: ScrollBehavior) {
        self.host.scrolls.push(ScrollRecord::IntoView {
            node,
            edge,
            behavior,
        });
    }

    pub fn scroll_window(&mut self, edge: ScrollEdge, behavior: ScrollBehavior) {
        self.host.scrolls.push(ScrollRecord::Window { edge, behavior });
    }

    pub fn scroll_records(&self) -> &[ScrollRecord] {
        &self.host.scrolls
    }

    /// Drain recorded scroll requests.
    pub fn take_scroll_records(&mut self) -> Vec<ScrollRecord> {
        mem::take(&mut self.host.scrolls)
    }
}
