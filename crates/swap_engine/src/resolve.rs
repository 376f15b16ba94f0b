//! Target, swap and error-path resolution.
//!
//! Successful responses use `hx-target` / `hx-swap`. Failed responses look at
//! `hx-error-target` / `hx-error-swap` first; each is an [`Override`] that is
//! either explicit, `mirror` (use what success would use) or absent (use the
//! global error default, where `mirror` means the same, and finally the
//! success value).

use crate::config::SwapConfig;
use crate::outcome::ResolvedOutcome;
use crate::selector::query_ext;
use crate::strategy::StrategyRegistry;
use crate::swap_spec::{SwapSpecification, parse_swap_spec};
use dom::{Document, NodeId};
use log::{debug, warn};
use std::iter;

/// Keyword that makes a failure-path setting follow the success path.
pub const MIRROR: &str = "mirror";

/// A three-way failure-path setting.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Override<T> {
    Explicit(T),
    Mirror,
    Absent,
}

impl<T: AsRef<str>> Override<T> {
    /// Classify an optional raw value.
    pub fn from_value(value: Option<T>) -> Self {
        match value {
            None => Self::Absent,
            Some(raw) if raw.as_ref().trim().eq_ignore_ascii_case(MIRROR) => Self::Mirror,
            Some(raw) => Self::Explicit(raw),
        }
    }
}

/// An attribute value found on the trigger or one of its ancestors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InheritedAttr {
    pub value: String,
    /// Element carrying the attribute; `this` refers to it.
    pub declared_on: NodeId,
}

impl AsRef<str> for InheritedAttr {
    fn as_ref(&self) -> &str {
        &self.value
    }
}

/// The swap-related attributes in effect for a trigger element.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TriggerAttributes {
    pub target: Option<InheritedAttr>,
    pub swap: Option<InheritedAttr>,
    pub error_target: Option<InheritedAttr>,
    pub error_swap: Option<InheritedAttr>,
    pub select_oob: Option<InheritedAttr>,
}

/// Nearest inclusive ancestor declaring `hx-<name>` or `data-hx-<name>`.
fn inherited(document: &Document, trigger: NodeId, name: &str) -> Option<InheritedAttr> {
    let plain = format!("hx-{name}");
    let prefixed = format!("data-hx-{name}");
    iter::once(trigger)
        .chain(document.ancestors(trigger))
        .filter(|node| document.is_element(*node))
        .find_map(|node| {
            document
                .attribute(node, &plain)
                .or_else(|| document.attribute(node, &prefixed))
                .map(|value| InheritedAttr {
                    value: value.to_owned(),
                    declared_on: node,
                })
        })
}

impl TriggerAttributes {
    /// Read the attributes by plain ancestor inheritance.
    pub fn collect(document: &Document, trigger: NodeId) -> Self {
        Self {
            target: inherited(document, trigger, "target"),
            swap: inherited(document, trigger, "swap"),
            error_target: inherited(document, trigger, "error-target"),
            error_swap: inherited(document, trigger, "error-swap"),
            select_oob: inherited(document, trigger, "select-oob"),
        }
    }

    /// Whether a failed response has anywhere to go: an element-level error
    /// attribute or a global error default.
    pub fn error_path_engaged(&self, config: &SwapConfig) -> bool {
        self.error_target.is_some()
            || self.error_swap.is_some()
            || config.default_error_target.is_some()
            || config.default_error_swap_style.is_some()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolutionPath {
    Success,
    Failure,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// `None` when the target selector matched nothing.
    pub target: Option<NodeId>,
    /// The selector that produced `target`, for error reporting.
    pub target_selector: Option<String>,
    pub spec: SwapSpecification,
    pub path: ResolutionPath,
}

/// Resolve a target attribute value; `this` names the declaring element.
fn resolve_target_value(
    document: &Document,
    trigger: NodeId,
    value: &str,
    declared_on: NodeId,
) -> Option<NodeId> {
    if value.trim() == "this" {
        return Some(declared_on);
    }
    query_ext(document, trigger, value)
}

fn success_target(document: &Document, trigger: NodeId, attrs: &TriggerAttributes) -> (Option<NodeId>, Option<String>) {
    match &attrs.target {
        Some(attr) => (
            resolve_target_value(document, trigger, &attr.value, attr.declared_on),
            Some(attr.value.clone()),
        ),
        None => (Some(trigger), None),
    }
}

fn success_spec(attrs: &TriggerAttributes, config: &SwapConfig) -> SwapSpecification {
    let directive = attrs.swap.as_ref().map_or("", |attr| attr.value.as_str());
    parse_swap_spec(directive, &config.default_swap_style, config)
}

/// Style a failure-path directive falls back to when it names none or an unknown one.
fn error_default_style(config: &SwapConfig) -> &str {
    config
        .default_error_swap_style
        .as_deref()
        .filter(|style| !style.eq_ignore_ascii_case(MIRROR))
        .unwrap_or(&config.default_swap_style)
}

/// Resolve where and how a response is swapped.
pub fn resolve_swap(
    document: &Document,
    trigger: NodeId,
    attrs: &TriggerAttributes,
    outcome: &ResolvedOutcome,
    config: &SwapConfig,
    strategies: &StrategyRegistry,
) -> Resolution {
    let (mut target, mut target_selector) = success_target(document, trigger, attrs);
    let mut spec = success_spec(attrs, config);
    let path = if outcome.is_error {
        ResolutionPath::Failure
    } else {
        ResolutionPath::Success
    };

    if path == ResolutionPath::Failure {
        match Override::from_value(attrs.error_target.as_ref()) {
            Override::Explicit(attr) => {
                target = resolve_target_value(document, trigger, &attr.value, attr.declared_on);
                target_selector = Some(attr.value.clone());
            }
            Override::Mirror => {}
            Override::Absent => {
                if let Override::Explicit(selector) =
                    Override::from_value(config.default_error_target.as_deref())
                {
                    target = query_ext(document, trigger, selector);
                    target_selector = Some(selector.to_owned());
                }
            }
        }

        let error_style = error_default_style(config);
        match Override::from_value(attrs.error_swap.as_ref()) {
            Override::Explicit(attr) => spec = parse_swap_spec(&attr.value, error_style, config),
            Override::Mirror => {}
            Override::Absent => {
                if let Override::Explicit(style) =
                    Override::from_value(config.default_error_swap_style.as_deref())
                {
                    spec = parse_swap_spec(style, error_style, config);
                }
            }
        }
        if !strategies.contains(&spec.style) {
            warn!("unknown error swap style {:?}, using {error_style:?}", spec.style);
            error_style.clone_into(&mut spec.style);
        }
    }

    if let Some(selector) = &outcome.target_override {
        target = query_ext(document, trigger, selector);
        target_selector = Some(selector.clone());
    }
    if let Some(directive) = &outcome.swap_override {
        let current = spec.style.clone();
        spec = parse_swap_spec(directive, &current, config);
    }

    if !strategies.contains(&spec.style) {
        warn!(
            "unknown swap style {:?}, using {:?}",
            spec.style, config.default_swap_style
        );
        config.default_swap_style.clone_into(&mut spec.style);
    }
    debug!("resolved {path:?} swap {:?} onto {target:?}", spec.style);
    Resolution {
        target,
        target_selector,
        spec,
        path,
    }
}

/// Apply `HX-Retarget` and `HX-Reswap` response headers, which win over
/// everything resolved from attributes and rules.
pub fn apply_response_headers(
    resolution: &mut Resolution,
    document: &Document,
    trigger: NodeId,
    retarget: Option<&str>,
    reswap: Option<&str>,
    config: &SwapConfig,
    strategies: &StrategyRegistry,
) {
    if let Some(selector) = retarget {
        resolution.target = query_ext(document, trigger, selector);
        resolution.target_selector = Some(selector.to_owned());
    }
    if let Some(directive) = reswap {
        let current = resolution.spec.style.clone();
        resolution.spec = parse_swap_spec(directive, &current, config);
        if !strategies.contains(&resolution.spec.style) {
            warn!("unknown reswap style {:?}", resolution.spec.style);
            resolution.spec.style = current;
        }
    }
}
