//! Swap directive parsing (`hx-swap` and friends).
//!
//! A directive is a style keyword followed by `key:value` modifiers, e.g.
//! `outerHTML swap:100ms settle:1s scroll:#list:bottom`. Parsing never fails:
//! unknown tokens and malformed values are ignored.

use crate::config::SwapConfig;
use dom::ScrollEdge;
use log::trace;

/// Where to scroll (or what to show) after settling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScrollSpec {
    pub edge: ScrollEdge,
    /// Extended selector resolved against the first settled element; `window` for `show`.
    pub target: Option<String>,
}

/// A fully parsed swap directive.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapSpecification {
    /// Style keyword, kept verbatim even when no strategy is registered for it.
    pub style: String,
    pub swap_delay_ms: u64,
    pub settle_delay_ms: u64,
    pub ignore_title: bool,
    pub scroll: Option<ScrollSpec>,
    pub show: Option<ScrollSpec>,
    /// `None` defers to the configured default.
    pub focus_scroll: Option<bool>,
    pub transition: bool,
}

impl SwapSpecification {
    /// Directive with the given style and the configured default delays.
    pub fn with_style(style: &str, config: &SwapConfig) -> Self {
        Self {
            style: style.to_owned(),
            swap_delay_ms: config.default_swap_delay,
            settle_delay_ms: config.default_settle_delay,
            ignore_title: false,
            scroll: None,
            show: None,
            focus_scroll: None,
            transition: false,
        }
    }
}

/// Parse a time interval: `250`, `250ms`, `2s` or `1m`, in milliseconds.
/// Fractions are truncated; negative or malformed values yield `None`.
pub fn parse_interval(text: &str) -> Option<u64> {
    let text = text.trim();
    let (number, scale) = if let Some(millis) = text.strip_suffix("ms") {
        (millis, 1.0)
    } else if let Some(secs) = text.strip_suffix('s') {
        (secs, 1_000.0)
    } else if let Some(mins) = text.strip_suffix('m') {
        (mins, 60_000.0)
    } else {
        (text, 1.0)
    };
    let value: f64 = number.trim().parse().ok()?;
    let scaled = value * scale;
    if !scaled.is_finite() || scaled < 0.0 {
        return None;
    }
    Some(scaled as u64)
}

fn parse_bool(value: &str) -> Option<bool> {
    match value {
        "true" => Some(true),
        "false" => Some(false),
        _ => None,
    }
}

fn parse_edge(value: &str) -> Option<ScrollEdge> {
    match value {
        "top" => Some(ScrollEdge::Top),
        "bottom" => Some(ScrollEdge::Bottom),
        _ => None,
    }
}

/// `[<selector>:]<top|bottom>`; the selector may itself contain colons.
fn parse_scroll_value(value: &str) -> Option<ScrollSpec> {
    let (selector, edge) = match value.rsplit_once(':') {
        Some((selector, edge)) => (Some(selector), edge),
        None => (None, value),
    };
    let edge = parse_edge(edge)?;
    Some(ScrollSpec {
        edge,
        target: selector
            .filter(|sel| !sel.is_empty())
            .map(ToOwned::to_owned),
    })
}

/// Parse a swap directive.
///
/// The first token that is not a recognized `key:value` modifier becomes the
/// style; `default_style` applies when there is none. Modifier order does not
/// matter and the last duplicate wins.
pub fn parse_swap_spec(directive: &str, default_style: &str, config: &SwapConfig) -> SwapSpecification {
    let mut spec = SwapSpecification::with_style(default_style, config);
    let mut style: Option<&str> = None;
    for token in directive.split_ascii_whitespace() {
        let Some((key, value)) = token.split_once(':') else {
            if style.is_none() {
                style = Some(token);
            }
            continue;
        };
        match key {
            "swap" => {
                if let Some(delay) = parse_interval(value) {
                    spec.swap_delay_ms = delay;
                }
            }
            "settle" => {
                if let Some(delay) = parse_interval(value) {
                    spec.settle_delay_ms = delay;
                }
            }
            "transition" => {
                if let Some(flag) = parse_bool(value) {
                    spec.transition = flag;
                }
            }
            "ignoreTitle" => {
                if let Some(flag) = parse_bool(value) {
                    spec.ignore_title = flag;
                }
            }
            "focus-scroll" => {
                if let Some(flag) = parse_bool(value) {
                    spec.focus_scroll = Some(flag);
                }
            }
            "scroll" => {
                if let Some(scroll) = parse_scroll_value(value) {
                    spec.scroll = Some(scroll);
                }
            }
            "show" => {
                if value == "none" {
                    spec.show = None;
                } else if let Some(show) = parse_scroll_value(value) {
                    spec.show = Some(show);
                }
            }
            _ => {
                trace!("ignoring unknown swap modifier {token:?}");
                if style.is_none() {
                    style = Some(token);
                }
            }
        }
    }
    if let Some(style) = style {
        style.clone_into(&mut spec.style);
    }
    spec
}
