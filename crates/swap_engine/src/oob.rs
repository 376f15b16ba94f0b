//! Out-of-band swaps: response elements that go to their own targets.
//!
//! An element marked with `hx-swap-oob` is taken out of the main content. Its
//! marker is `true` (replace the element with the same id), a style (swap into
//! the element with the same id) or `style:selector`. `hx-select-oob` on the
//! trigger picks elements by id the same way without a marker.

use crate::config::SwapConfig;
use crate::events::{EventBus, SwapEvent};
use crate::selector::query_all_ext;
use crate::strategy::{InsertionStrategy, StrategyRegistry, SwapContent, SwapContext};
use crate::swap_spec::{SwapSpecification, parse_swap_spec};
use anyhow::Result;
use dom::{Document, NodeId};
use log::{debug, warn};

const MARKERS: [&str; 2] = ["hx-swap-oob", "data-hx-swap-oob"];

/// An element pulled out of a response, with where and how it goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OobFragment {
    /// Detached element carrying the content.
    pub element: NodeId,
    /// Extended selector of the targets; `None` when the element has no id to
    /// fall back on.
    pub selector: Option<String>,
    pub spec: SwapSpecification,
}

/// Split a marker value into style and explicit selector.
fn parse_marker(value: &str) -> (&str, Option<&str>) {
    let value = value.trim();
    if value.is_empty() || value == "true" {
        return ("outerHTML", None);
    }
    match value.split_once(':') {
        Some((style, selector)) if !style.is_empty() => (style, Some(selector.trim())),
        _ => (value, None),
    }
}

fn marker_of(document: &Document, node: NodeId) -> Option<String> {
    MARKERS
        .iter()
        .find_map(|name| document.attribute(node, name))
        .map(ToOwned::to_owned)
}

fn build(
    document: &mut Document,
    element: NodeId,
    marker: &str,
    config: &SwapConfig,
) -> OobFragment {
    let (style, selector) = parse_marker(marker);
    let selector = selector
        .filter(|sel| !sel.is_empty())
        .map(ToOwned::to_owned)
        .or_else(|| document.id_of(element).map(|id| format!("#{id}")));
    for name in MARKERS {
        let _marker = document.remove_attribute(element, name);
    }
    document.detach(element);
    OobFragment {
        element,
        selector,
        spec: parse_swap_spec(style, "outerHTML", config),
    }
}

/// Remove every marked element from `fragment` and return them in document
/// order. Markers inside another marked element stay part of its content.
pub fn extract_oob(document: &mut Document, fragment: NodeId, config: &SwapConfig) -> Vec<OobFragment> {
    let mut marked: Vec<(NodeId, String)> = Vec::new();
    for node in document.descendants(fragment) {
        let Some(marker) = marker_of(document, node) else {
            continue;
        };
        if marked.iter().any(|(outer, _)| document.contains(*outer, node)) {
            continue;
        }
        if !config.allow_nested_oob_swaps && document.parent(node) != Some(fragment) {
            debug!("skipping nested out-of-band element {node}");
            continue;
        }
        marked.push((node, marker));
    }
    marked
        .into_iter()
        .map(|(element, marker)| build(document, element, &marker, config))
        .collect()
}

/// Pull elements named by an `hx-select-oob` value (`#id[:marker], ...`) out of
/// `fragment`. Ids that are not in the response are skipped.
pub fn select_oob(document: &mut Document, fragment: NodeId, value: &str, config: &SwapConfig) -> Vec<OobFragment> {
    let mut selected = Vec::new();
    for part in value.split(',') {
        let (id, marker) = match part.split_once(':') {
            Some((id, marker)) => (id.trim(), marker.trim()),
            None => (part.trim(), "true"),
        };
        let id = id.strip_prefix('#').unwrap_or(id);
        if id.is_empty() {
            continue;
        }
        let found = document
            .descendants(fragment)
            .into_iter()
            .find(|node| document.is_element(*node) && document.id_of(*node) == Some(id));
        match found {
            Some(element) => selected.push(build(document, element, marker, config)),
            None => debug!("select-oob id {id:?} not in response"),
        }
    }
    selected
}

/// Content handed to the strategy for one target: the element itself for
/// `outerHTML`, otherwise its children.
fn content_for(document: &mut Document, element: NodeId, style: &str) -> Result<NodeId> {
    if style != "outerHTML" {
        return Ok(element);
    }
    let fragment = document.create_fragment();
    document.append_child(fragment, element)?;
    Ok(fragment)
}

/// Swap one out-of-band fragment into each of its targets. The first target
/// gets the element, later ones get clones. Returns how many targets were
/// swapped.
pub fn apply_oob(
    ctx: &mut SwapContext<'_>,
    strategies: &StrategyRegistry,
    events: &EventBus,
    oob: OobFragment,
) -> usize {
    let targets = oob
        .selector
        .as_deref()
        .map(|selector| query_all_ext(ctx.document, ctx.document.root(), selector))
        .unwrap_or_default();
    if targets.is_empty() {
        warn!("no target for out-of-band swap {:?}", oob.selector);
        events.emit(SwapEvent::OobErrorNoTarget {
            selector: oob.selector,
        });
        return 0;
    }
    let Some(strategy) = strategies.get(&oob.spec.style) else {
        warn!("unknown out-of-band swap style {:?}", oob.spec.style);
        return 0;
    };

    let mut swapped = 0;
    let last = targets.len() - 1;
    for (index, target) in targets.into_iter().enumerate() {
        let element = if index == last {
            Ok(oob.element)
        } else {
            ctx.document.deep_clone(oob.element)
        };
        let result = element.and_then(|element| {
            swap_into(ctx, strategy.as_ref(), events, &oob.spec.style, target, element)
        });
        match result {
            Ok(()) => swapped += 1,
            Err(err) => warn!("out-of-band {} swap failed: {err:#}", oob.spec.style),
        }
    }
    swapped
}

fn swap_into(
    ctx: &mut SwapContext<'_>,
    strategy: &dyn InsertionStrategy,
    events: &EventBus,
    style: &str,
    target: NodeId,
    element: NodeId,
) -> Result<()> {
    events.emit(SwapEvent::OobBeforeSwap {
        target,
        fragment: element,
    });
    let content = content_for(ctx.document, element, style)?;
    let content = if strategy.parses_markup() {
        SwapContent::Fragment(content)
    } else {
        SwapContent::Text(ctx.document.text_content(content))
    };
    strategy.apply(ctx, target, content)?;
    events.emit(SwapEvent::OobAfterSwap {
        target,
        fragment: element,
    });
    Ok(())
}
