use core::fmt;

use crate::{Attributes, Document, DomNode, NodeKind};
use indextree::NodeId;

use serde_json::{Map, Value, json};

fn sorted_attrs(attrs: &Attributes) -> Vec<(&str, &str)> {
    let mut pairs: Vec<(&str, &str)> = attrs
        .iter()
        .map(|(name, value)| (name.as_str(), value.as_str()))
        .collect();
    pairs.sort_by(|left, right| left.0.cmp(right.0));
    pairs
}

fn flush_text(children: &mut Vec<Value>, text_buf: &mut String) {
    if !text_buf.trim().is_empty() {
        children.push(json!({ "type": "text", "text": text_buf.clone() }));
    }
    text_buf.clear();
}

/// Children as JSON, merging adjacent text nodes and dropping blank ones.
fn coalesce_children(doc: &Document, id: NodeId) -> Vec<Value> {
    let mut children = Vec::new();
    let mut text_buf = String::new();
    for child in id.children(&doc.arena) {
        if let Some(NodeKind::Text { text }) = doc.kind(child) {
            text_buf.push_str(text);
            continue;
        }
        flush_text(&mut children, &mut text_buf);
        let value = node_to_json(doc, child);
        if !value.is_null() {
            children.push(value);
        }
    }
    flush_text(&mut children, &mut text_buf);
    children
}

fn node_to_json(doc: &Document, id: NodeId) -> Value {
    let Some(DomNode { kind, attrs }) = doc.node(id) else {
        return Value::Null;
    };
    match kind {
        NodeKind::Document => json!({ "type": "document", "children": coalesce_children(doc, id) }),
        NodeKind::Fragment => json!({ "type": "fragment", "children": coalesce_children(doc, id) }),
        NodeKind::Element { tag } => {
            let mut attrs_obj = Map::new();
            for (name, value) in sorted_attrs(attrs) {
                attrs_obj.insert(name.to_owned(), Value::String(value.to_owned()));
            }
            json!({
                "type": "element",
                "tag": tag,
                "attrs": Value::Object(attrs_obj),
                "children": coalesce_children(doc, id),
            })
        }
        NodeKind::Text { text } => {
            if text.trim().is_empty() {
                Value::Null
            } else {
                json!({ "type": "text", "text": text })
            }
        }
        NodeKind::Comment { .. } => Value::Null,
    }
}

fn escape_debug_text(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '\\' => out.push_str("\\\\"),
            '"' => out.push_str("\\\""),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            _ => out.push(ch),
        }
    }
    out
}

fn write_indent(formatter: &mut fmt::Formatter<'_>, depth: usize) -> fmt::Result {
    for _ in 0..depth {
        formatter.write_str("  ")?;
    }
    Ok(())
}

fn fmt_node(
    doc: &Document,
    id: NodeId,
    formatter: &mut fmt::Formatter<'_>,
    depth: usize,
) -> fmt::Result {
    let Some(DomNode { kind, attrs }) = doc.node(id) else {
        return Ok(());
    };
    match kind {
        NodeKind::Document | NodeKind::Fragment => {
            write_indent(formatter, depth)?;
            let label = if matches!(kind, NodeKind::Document) {
                "#document"
            } else {
                "#fragment"
            };
            writeln!(formatter, "{label}")?;
            for child in id.children(&doc.arena) {
                fmt_node(doc, child, formatter, depth + 1)?;
            }
        }
        NodeKind::Element { tag } => {
            write_indent(formatter, depth)?;
            write!(formatter, "<{tag}")?;
            for (name, value) in sorted_attrs(attrs) {
                write!(formatter, " {name}=\"{}\"", escape_debug_text(value))?;
            }
            writeln!(formatter, ">")?;
            for child in id.children(&doc.arena) {
                fmt_node(doc, child, formatter, depth + 1)?;
            }
            write_indent(formatter, depth)?;
            writeln!(formatter, "</{tag}>")?;
        }
        NodeKind::Text { text } => {
            // Whitespace-only text is noise in tree dumps.
            if text.chars().all(char::is_whitespace) {
                return Ok(());
            }
            write_indent(formatter, depth)?;
            writeln!(formatter, "\"{}\"", escape_debug_text(text))?;
        }
        NodeKind::Comment { text } => {
            write_indent(formatter, depth)?;
            writeln!(formatter, "<!--{}-->", escape_debug_text(text))?;
        }
    }
    Ok(())
}

impl fmt::Debug for Document {
    fn fmt(&self, formatter: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(formatter, "Document {:?}", self.title)?;
        fmt_node(self, self.root, formatter, 0)
    }
}

impl Document {
    /// Build a deterministic JSON representation of the subtree at `node`.
    /// Schema:
    /// - Document: { "type":"document", "children":[ ... ] }
    /// - Fragment: { "type":"fragment", "children":[ ... ] }
    /// - Element: { "type":"element", "tag": "div", "attrs": {..}, "children":[ ... ] }
    /// - Text: { "type":"text", "text":"..." }
    ///
    /// Comments and whitespace-only text are omitted.
    pub fn to_json_value(&self, node: NodeId) -> Value {
        node_to_json(self, node)
    }
}
