//! HTML5 parsing using html5ever.
//!
//! html5ever builds an `RcDom`, which is then copied into the document arena.
//! Fragments are parsed inside a `<template>` so that table parts and other
//! context-sensitive tags survive without being hoisted or dropped.

use crate::host::HostState;
use crate::{Document, DomNode, NodeKind};
use anyhow::Result;
use html5ever::tendril::TendrilSink as _;
use html5ever::tree_builder::TreeBuilderOpts;
use html5ever::{ParseOpts, parse_document};
use indextree::{Arena, NodeId};
use log::trace;
use markup5ever_rcdom::{Handle, NodeData as RcNodeData, RcDom};

/// A detached fragment produced from markup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedFragment {
    /// `NodeKind::Fragment` container holding the parsed content.
    pub root: NodeId,
    /// Text of a top-level `<title>`, which is removed from the content.
    pub title: Option<String>,
}

fn parse_opts() -> ParseOpts {
    ParseOpts {
        tree_builder: TreeBuilderOpts {
            exact_errors: false,
            scripting_enabled: false,
            ..TreeBuilderOpts::default()
        },
        ..ParseOpts::default()
    }
}

fn parse_rcdom(html: &str) -> Result<RcDom> {
    let dom = parse_document(RcDom::default(), parse_opts())
        .from_utf8()
        .read_from(&mut html.as_bytes())?;
    Ok(dom)
}

/// Whether markup is a whole document rather than body content.
fn is_full_document(html: &str) -> bool {
    let head = html.trim_start();
    let prefix: String = head.chars().take(9).collect::<String>().to_ascii_lowercase();
    ["<!doctype", "<html", "<head", "<body"]
        .iter()
        .any(|start| prefix.starts_with(start))
}

fn find_element(handle: &Handle, tag: &str) -> Option<Handle> {
    if let RcNodeData::Element { name, .. } = &handle.data {
        if &*name.local == tag {
            return Some(Handle::clone(handle));
        }
    }
    handle
        .children
        .borrow()
        .iter()
        .find_map(|child| find_element(child, tag))
}

fn rc_text(handle: &Handle) -> String {
    let mut out = String::new();
    collect_rc_text(handle, &mut out);
    out
}

fn collect_rc_text(handle: &Handle, out: &mut String) {
    if let RcNodeData::Text { contents } = &handle.data {
        out.push_str(&contents.borrow());
    }
    for child in handle.children.borrow().iter() {
        collect_rc_text(child, out);
    }
}

/// Copy an html5ever node (and its subtree) under `parent`.
fn convert_node(arena: &mut Arena<DomNode>, rc_node: &Handle, parent: NodeId) {
    match &rc_node.data {
        RcNodeData::Document => {
            for child in rc_node.children.borrow().iter() {
                convert_node(arena, child, parent);
            }
        }
        RcNodeData::Text { contents } => {
            let node = arena.new_node(DomNode::text(&contents.borrow()));
            parent.append(node, arena);
        }
        RcNodeData::Comment { contents } => {
            let node = arena.new_node(DomNode {
                kind: NodeKind::Comment {
                    text: contents.to_string(),
                },
                ..DomNode::default()
            });
            parent.append(node, arena);
        }
        RcNodeData::Element {
            name,
            attrs,
            template_contents,
            ..
        } => {
            let mut data = DomNode::element(&name.local);
            data.attrs = attrs
                .borrow()
                .iter()
                .map(|attr| (attr.name.local.to_string(), attr.value.to_string()))
                .collect();
            let node = arena.new_node(data);
            parent.append(node, arena);
            // Template content lives in a separate document; flatten it into the element.
            if let Some(contents) = template_contents.borrow().as_ref() {
                convert_node(arena, contents, node);
            }
            for child in rc_node.children.borrow().iter() {
                convert_node(arena, child, node);
            }
        }
        RcNodeData::Doctype { .. } | RcNodeData::ProcessingInstruction { .. } => {}
    }
}

impl Document {
    /// Parse a complete document. Body-only markup is placed in the body.
    ///
    /// # Errors
    /// Returns error if the input cannot be decoded.
    pub fn parse(html: &str) -> Result<Self> {
        let dom = parse_rcdom(html)?;
        let mut arena = Arena::new();
        let root = arena.new_node(DomNode::default());
        convert_node(&mut arena, &dom.document, root);
        let title = find_element(&dom.document, "title")
            .map(|title| rc_text(&title).trim().to_owned())
            .unwrap_or_default();
        Ok(Self {
            arena,
            root,
            title,
            host: HostState::default(),
        })
    }

    /// Parse markup into a detached fragment owned by this document.
    ///
    /// Whole documents contribute their body children and head title; anything
    /// else is parsed as body content with context-free tag handling.
    ///
    /// # Errors
    /// Returns error if the input cannot be decoded.
    pub fn parse_fragment(&mut self, html: &str) -> Result<ParsedFragment> {
        let fragment = self.create_fragment();
        if is_full_document(html) {
            let dom = parse_rcdom(html)?;
            if let Some(body) = find_element(&dom.document, "body") {
                for child in body.children.borrow().iter() {
                    convert_node(&mut self.arena, child, fragment);
                }
            }
            let title = find_element(&dom.document, "title").map(|title| rc_text(&title));
            trace!("parsed full document response into fragment {fragment}");
            return Ok(ParsedFragment {
                root: fragment,
                title,
            });
        }

        let wrapped = format!("<body><template>{html}</template></body>");
        let dom = parse_rcdom(&wrapped)?;
        if let Some(template) = find_element(&dom.document, "template") {
            if let RcNodeData::Element {
                template_contents, ..
            } = &template.data
            {
                if let Some(contents) = template_contents.borrow().as_ref() {
                    convert_node(&mut self.arena, contents, fragment);
                }
            }
        }
        let title = self.take_top_level_title(fragment);
        Ok(ParsedFragment {
            root: fragment,
            title,
        })
    }

    /// Parse markup and append the resulting nodes to `parent`.
    ///
    /// # Errors
    /// Returns error if parsing or insertion fails.
    pub fn append_html(&mut self, parent: NodeId, html: &str) -> Result<Vec<NodeId>> {
        let fragment = self.parse_fragment(html)?;
        let nodes = self.take_children(fragment.root);
        for node in &nodes {
            self.append_child(parent, *node)?;
        }
        Ok(nodes)
    }

    fn take_top_level_title(&mut self, fragment: NodeId) -> Option<String> {
        let title = self
            .children(fragment)
            .into_iter()
            .find(|child| self.tag_name(*child) == Some("title"))?;
        let text = self.text_content(title);
        self.detach(title);
        Some(text)
    }
}
