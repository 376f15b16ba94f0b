//! Content insertion strategies and their registry.
//!
//! Each swap style is a named [`InsertionStrategy`]. The built-in styles are
//! registered by default and hosts may add their own under new names.

use crate::settle::{SettleInfo, SettleTask};
use anyhow::{Result, anyhow};
use dom::{Document, NodeId};
use std::collections::HashMap;
use std::sync::Arc;

/// What a strategy inserts.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SwapContent {
    /// Detached fragment holding parsed nodes.
    Fragment(NodeId),
    /// Raw text for strategies that do not parse markup.
    Text(String),
}

/// Mutable access handed to a strategy for one swap.
pub struct SwapContext<'ctx> {
    pub document: &'ctx mut Document,
    pub settle: &'ctx mut SettleInfo,
    attributes_to_settle: &'ctx [String],
    inserted: Vec<NodeId>,
}

impl<'ctx> SwapContext<'ctx> {
    pub fn new(
        document: &'ctx mut Document,
        settle: &'ctx mut SettleInfo,
        attributes_to_settle: &'ctx [String],
    ) -> Self {
        Self {
            document,
            settle,
            attributes_to_settle,
            inserted: Vec::new(),
        }
    }

    /// Nodes inserted so far, in insertion order.
    pub fn inserted(&self) -> &[NodeId] {
        &self.inserted
    }

    /// Turn content into a fragment, wrapping raw text in a text node.
    pub fn fragment_of(&mut self, content: SwapContent) -> NodeId {
        match content {
            SwapContent::Fragment(fragment) => fragment,
            SwapContent::Text(text) => {
                let fragment = self.document.create_fragment();
                let node = self.document.create_text(&text);
                if let Err(err) = self.document.append_child(fragment, node) {
                    log::warn!("could not wrap text content: {err:#}");
                }
                fragment
            }
        }
    }

    /// Move the children of `fragment` into `parent` before `before` (or at
    /// the end), settling attributes of elements that replace old ones.
    ///
    /// # Errors
    /// Fails if the tree rejects an insertion.
    pub fn insert_nodes(
        &mut self,
        parent: NodeId,
        before: Option<NodeId>,
        fragment: NodeId,
    ) -> Result<Vec<NodeId>> {
        self.settle_attributes(parent, fragment);
        let nodes = self.document.take_children(fragment);
        for node in &nodes {
            match before {
                Some(reference) => self.document.insert_before(reference, *node)?,
                None => self.document.append_child(parent, *node)?,
            }
        }
        self.inserted.extend(nodes.iter().copied());
        Ok(nodes)
    }

    /// New elements whose id matches an old element below `parent` start out
    /// with the old values of the settled attributes; their own values come
    /// back in the settle phase.
    fn settle_attributes(&mut self, parent: NodeId, fragment: NodeId) {
        if self.attributes_to_settle.is_empty() {
            return;
        }
        let incoming: Vec<NodeId> = self
            .document
            .descendants(fragment)
            .into_iter()
            .filter(|node| self.document.id_of(*node).is_some())
            .collect();
        for new_node in incoming {
            let Some(old_node) = self.find_old_counterpart(parent, new_node) else {
                continue;
            };
            let mut values = Vec::with_capacity(self.attributes_to_settle.len());
            for name in self.attributes_to_settle {
                values.push((name.clone(), self.document.attribute(new_node, name).map(ToOwned::to_owned)));
                match self.document.attribute(old_node, name).map(ToOwned::to_owned) {
                    Some(old_value) => self.document.set_attribute(new_node, name, &old_value),
                    None => {
                        let _replaced = self.document.remove_attribute(new_node, name);
                    }
                }
            }
            self.settle.push(SettleTask::RestoreAttributes {
                node: new_node,
                values,
            });
        }
    }

    fn find_old_counterpart(&self, parent: NodeId, new_node: NodeId) -> Option<NodeId> {
        let tag = self.document.tag_name(new_node)?;
        let id = self.document.id_of(new_node)?;
        self.document.descendants(parent).into_iter().find(|old| {
            self.document.tag_name(*old) == Some(tag) && self.document.id_of(*old) == Some(id)
        })
    }
}

/// A named way of applying content to a target.
pub trait InsertionStrategy: Send + Sync {
    /// Whether the response is parsed as markup. Strategies that take raw text
    /// never see out-of-band markers or titles.
    fn parses_markup(&self) -> bool {
        true
    }

    /// Apply `content` to `target`.
    ///
    /// # Errors
    /// Fails when the target cannot take the content (for example a detached
    /// target for a sibling insertion).
    fn apply(&self, ctx: &mut SwapContext<'_>, target: NodeId, content: SwapContent) -> Result<()>;
}

fn parent_of(document: &Document, target: NodeId) -> Result<NodeId> {
    document
        .parent(target)
        .ok_or_else(|| anyhow!("swap target {target} has no parent"))
}

pub struct InnerHtml;

impl InsertionStrategy for InnerHtml {
    fn apply(&self, ctx: &mut SwapContext<'_>, target: NodeId, content: SwapContent) -> Result<()> {
        let fragment = ctx.fragment_of(content);
        let old_children = ctx.document.children(target);
        ctx.insert_nodes(target, None, fragment)?;
        for child in old_children {
            ctx.document.detach(child);
        }
        Ok(())
    }
}

pub struct OuterHtml;

impl InsertionStrategy for OuterHtml {
    fn apply(&self, ctx: &mut SwapContext<'_>, target: NodeId, content: SwapContent) -> Result<()> {
        if ctx.document.tag_name(target) == Some("body") {
            return InnerHtml.apply(ctx, target, content);
        }
        let fragment = ctx.fragment_of(content);
        let parent = parent_of(ctx.document, target)?;
        let nodes = ctx.insert_nodes(parent, Some(target), fragment)?;
        ctx.document.detach(target);
        ctx.settle.elts.retain(|elt| *elt != target);
        ctx.settle.elts.extend(
            nodes
                .into_iter()
                .filter(|node| ctx.document.is_element(*node)),
        );
        Ok(())
    }
}

pub struct BeforeBegin;

impl InsertionStrategy for BeforeBegin {
    fn apply(&self, ctx: &mut SwapContext<'_>, target: NodeId, content: SwapContent) -> Result<()> {
        let fragment = ctx.fragment_of(content);
        let parent = parent_of(ctx.document, target)?;
        ctx.insert_nodes(parent, Some(target), fragment)?;
        Ok(())
    }
}

pub struct AfterBegin;

impl InsertionStrategy for AfterBegin {
    fn apply(&self, ctx: &mut SwapContext<'_>, target: NodeId, content: SwapContent) -> Result<()> {
        let fragment = ctx.fragment_of(content);
        let first = ctx.document.children(target).first().copied();
        ctx.insert_nodes(target, first, fragment)?;
        Ok(())
    }
}

pub struct BeforeEnd;

impl InsertionStrategy for BeforeEnd {
    fn apply(&self, ctx: &mut SwapContext<'_>, target: NodeId, content: SwapContent) -> Result<()> {
        let fragment = ctx.fragment_of(content);
        ctx.insert_nodes(target, None, fragment)?;
        Ok(())
    }
}

pub struct AfterEnd;

impl InsertionStrategy for AfterEnd {
    fn apply(&self, ctx: &mut SwapContext<'_>, target: NodeId, content: SwapContent) -> Result<()> {
        let fragment = ctx.fragment_of(content);
        let parent = parent_of(ctx.document, target)?;
        let siblings = ctx.document.children(parent);
        let next = siblings
            .iter()
            .position(|node| *node == target)
            .and_then(|index| siblings.get(index + 1))
            .copied();
        ctx.insert_nodes(parent, next, fragment)?;
        Ok(())
    }
}

pub struct Delete;

impl InsertionStrategy for Delete {
    fn apply(&self, ctx: &mut SwapContext<'_>, target: NodeId, _content: SwapContent) -> Result<()> {
        ctx.document.detach(target);
        Ok(())
    }
}

/// `none`: the target is left alone; out-of-band content still applies.
pub struct NoSwap;

impl InsertionStrategy for NoSwap {
    fn apply(&self, _ctx: &mut SwapContext<'_>, _target: NodeId, _content: SwapContent) -> Result<()> {
        Ok(())
    }
}

pub struct TextContent;

impl InsertionStrategy for TextContent {
    fn parses_markup(&self) -> bool {
        false
    }

    fn apply(&self, ctx: &mut SwapContext<'_>, target: NodeId, content: SwapContent) -> Result<()> {
        let text = match content {
            SwapContent::Text(text) => text,
            SwapContent::Fragment(fragment) => ctx.document.text_content(fragment),
        };
        ctx.document.set_text_content(target, &text)
    }
}

/// Style name to strategy lookup.
pub struct StrategyRegistry {
    strategies: HashMap<String, Arc<dyn InsertionStrategy>>,
}

impl StrategyRegistry {
    /// Registry holding the built-in styles.
    pub fn new() -> Self {
        let mut registry = Self::empty();
        registry.register("innerHTML", InnerHtml);
        registry.register("outerHTML", OuterHtml);
        registry.register("beforebegin", BeforeBegin);
        registry.register("afterbegin", AfterBegin);
        registry.register("beforeend", BeforeEnd);
        registry.register("afterend", AfterEnd);
        registry.register("delete", Delete);
        registry.register("none", NoSwap);
        registry.register("textContent", TextContent);
        registry
    }

    pub fn empty() -> Self {
        Self {
            strategies: HashMap::new(),
        }
    }

    /// Register (or replace) the strategy for a style name.
    pub fn register<S>(&mut self, name: impl Into<String>, strategy: S)
    where
        S: InsertionStrategy + 'static,
    {
        self.strategies.insert(name.into(), Arc::new(strategy));
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn InsertionStrategy>> {
        self.strategies.get(name).cloned()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.strategies.contains_key(name)
    }
}

impl Default for StrategyRegistry {
    fn default() -> Self {
        Self::new()
    }
}
