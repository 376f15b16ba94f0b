//! HTML serialization and text extraction.

use crate::{Document, NodeKind};
use indextree::NodeId;

/// Elements that never have an end tag.
const VOID_ELEMENTS: &[&str] = &[
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "source", "track",
    "wbr",
];

/// Elements whose text children are emitted without escaping.
const RAW_TEXT_ELEMENTS: &[&str] = &["script", "style", "xmp", "iframe", "noembed", "noframes"];

fn escape_text(text: &str, out: &mut String) {
    for ch in text.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

fn escape_attr(value: &str, out: &mut String) {
    for ch in value.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '"' => out.push_str("&quot;"),
            '\u{a0}' => out.push_str("&nbsp;"),
            _ => out.push(ch),
        }
    }
}

impl Document {
    /// Serialized markup of the children of `node`.
    pub fn inner_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        let raw = self
            .tag_name(node)
            .is_some_and(|tag| RAW_TEXT_ELEMENTS.contains(&tag));
        for child in self.children(node) {
            self.write_node(child, raw, &mut out);
        }
        out
    }

    /// Serialized markup of `node` itself.
    pub fn outer_html(&self, node: NodeId) -> String {
        let mut out = String::new();
        self.write_node(node, false, &mut out);
        out
    }

    /// Concatenated text of all descendant text nodes.
    pub fn text_content(&self, node: NodeId) -> String {
        if !self.is_live(node) {
            return String::new();
        }
        node.descendants(&self.arena)
            .filter_map(|id| match self.kind(id) {
                Some(NodeKind::Text { text }) => Some(text.as_str()),
                _ => None,
            })
            .collect()
    }

    fn write_node(&self, node: NodeId, raw_text: bool, out: &mut String) {
        let Some(data) = self.node(node) else {
            return;
        };
        match &data.kind {
            NodeKind::Document | NodeKind::Fragment => {
                for child in node.children(&self.arena) {
                    self.write_node(child, false, out);
                }
            }
            NodeKind::Text { text } => {
                if raw_text {
                    out.push_str(text);
                } else {
                    escape_text(text, out);
                }
            }
            NodeKind::Comment { text } => {
                out.push_str("<!--");
                out.push_str(text);
                out.push_str("-->");
            }
            NodeKind::Element { tag } => {
                out.push('<');
                out.push_str(tag);
                for (name, value) in &data.attrs {
                    out.push(' ');
                    out.push_str(name);
                    out.push_str("=\"");
                    escape_attr(value, out);
                    out.push('"');
                }
                out.push('>');
                if VOID_ELEMENTS.contains(&tag.as_str()) {
                    return;
                }
                let raw = RAW_TEXT_ELEMENTS.contains(&tag.as_str());
                for child in node.children(&self.arena) {
                    self.write_node(child, raw, out);
                }
                out.push_str("</");
                out.push_str(tag);
                out.push('>');
            }
        }
    }
}
