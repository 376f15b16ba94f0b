//! Engine configuration.
//!
//! `SwapConfig` deserializes from the camelCase JSON used by `htmx-config`
//! meta tags, so a page can carry its own settings. Every field has a default
//! and partial documents only override what they name.

use crate::outcome::ResponseRule;
use anyhow::{Context as _, Result};
use dom::{Document, ScrollBehavior};
use log::{debug, warn};
use serde::Deserialize;
use std::env;

/// Engine-wide settings, read-only while a response is being resolved.
#[derive(Clone, Debug, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct SwapConfig {
    /// Style used when a swap directive names none
    pub default_swap_style: String,
    /// Swap delay in milliseconds when a directive has no `swap:` modifier
    pub default_swap_delay: u64,
    /// Settle delay in milliseconds when a directive has no `settle:` modifier
    pub default_settle_delay: u64,
    /// Style for failed responses without an element-level error swap; `mirror` follows the success path
    pub default_error_swap_style: Option<String>,
    /// Target for failed responses without an element-level error target; `mirror` follows the success path
    pub default_error_target: Option<String>,
    /// Non-success statuses that swap (as errors) when no response rule matches
    pub http_error_codes_to_swap: Vec<u16>,
    /// Ordered status policy; the first matching rule wins
    pub response_handling: Vec<ResponseRule>,
    /// Class on a target while its swap is pending
    pub swapping_class: String,
    /// Class on settle elements until the settle phase runs
    pub settling_class: String,
    /// Class on freshly inserted elements until the settle phase runs
    pub added_class: String,
    /// Attributes that show their old values until settle
    pub attributes_to_settle: Vec<String>,
    /// Never apply titles found in responses
    pub ignore_title: bool,
    /// Scroll restored focus into view unless a swap directive says otherwise
    pub default_focus_scroll: bool,
    pub scroll_behavior: ScrollBehavior,
    /// Process `hx-swap-oob` markers below the top level of a response
    pub allow_nested_oob_swaps: bool,
    /// Keep `<script>` elements in swapped content and report them to the host
    pub allow_script_tags: bool,
}

impl Default for SwapConfig {
    fn default() -> Self {
        Self {
            default_swap_style: String::from("innerHTML"),
            default_swap_delay: 0,
            default_settle_delay: 0,
            default_error_swap_style: None,
            default_error_target: None,
            http_error_codes_to_swap: Vec::new(),
            response_handling: Vec::new(),
            swapping_class: String::from("htmx-swapping"),
            settling_class: String::from("htmx-settling"),
            added_class: String::from("htmx-added"),
            attributes_to_settle: ["class", "style", "width", "height"]
                .into_iter()
                .map(String::from)
                .collect(),
            ignore_title: false,
            default_focus_scroll: false,
            scroll_behavior: ScrollBehavior::Instant,
            allow_nested_oob_swaps: true,
            allow_script_tags: true,
        }
    }
}

/// Parse a boolean environment value (`1`/`true`/`yes`, `0`/`false`/`no`).
fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" => Some(true),
        "0" | "false" | "no" => Some(false),
        _ => None,
    }
}

/// Empty values clear an optional setting.
fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_owned())
}

impl SwapConfig {
    /// Parse a (possibly partial) JSON configuration.
    ///
    /// # Errors
    /// Returns error if the JSON is malformed or a field has the wrong type.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("invalid swap configuration JSON")
    }

    /// Read `<meta name="htmx-config" content="...">` from a document.
    /// Without the tag this is the default configuration.
    ///
    /// # Errors
    /// Returns error if the tag's content is not valid configuration JSON.
    pub fn from_meta(document: &Document) -> Result<Self> {
        let Some(meta) = document.query_selector(document.root(), "meta[name=htmx-config]") else {
            return Ok(Self::default());
        };
        let content = document.attribute(meta, "content").unwrap_or("{}");
        debug!("loading swap configuration from meta tag");
        Self::from_json(content)
    }

    /// Load configuration from environment variables.
    ///
    /// Reads the following environment variables:
    /// - `SWAP_ENGINE_CONFIG`: a JSON document used as the base
    /// - `SWAP_DEFAULT_STYLE`: default swap style
    /// - `SWAP_DEFAULT_SWAP_DELAY_MS` / `SWAP_DEFAULT_SETTLE_DELAY_MS`: default delays
    /// - `SWAP_DEFAULT_ERROR_STYLE` / `SWAP_DEFAULT_ERROR_TARGET`: failure defaults (empty clears)
    /// - `SWAP_IGNORE_TITLE`: set to "1" to never apply response titles
    ///
    /// Malformed values are logged and ignored.
    #[must_use]
    pub fn from_env() -> Self {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Same as [`SwapConfig::from_env`] with an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match lookup("SWAP_ENGINE_CONFIG").map(|json| Self::from_json(&json)) {
            Some(Ok(parsed)) => parsed,
            Some(Err(err)) => {
                warn!("ignoring SWAP_ENGINE_CONFIG: {err:#}");
                Self::default()
            }
            None => Self::default(),
        };
        if let Some(style) = lookup("SWAP_DEFAULT_STYLE").and_then(non_empty) {
            config.default_swap_style = style;
        }
        if let Some(delay) = lookup("SWAP_DEFAULT_SWAP_DELAY_MS").and_then(|val| val.trim().parse().ok()) {
            config.default_swap_delay = delay;
        }
        if let Some(delay) = lookup("SWAP_DEFAULT_SETTLE_DELAY_MS").and_then(|val| val.trim().parse().ok()) {
            config.default_settle_delay = delay;
        }
        if let Some(style) = lookup("SWAP_DEFAULT_ERROR_STYLE") {
            config.default_error_swap_style = non_empty(style);
        }
        if let Some(target) = lookup("SWAP_DEFAULT_ERROR_TARGET") {
            config.default_error_target = non_empty(target);
        }
        if let Some(flag) = lookup("SWAP_IGNORE_TITLE").as_deref().and_then(parse_flag) {
            config.ignore_title = flag;
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn partial_json_keeps_defaults() {
        let config = SwapConfig::from_json(
            r##"{"defaultSwapStyle":"outerHTML","defaultErrorTarget":"#errors","httpErrorCodesToSwap":[422]}"##,
        )
        .unwrap();
        assert_eq!(config.default_swap_style, "outerHTML");
        assert_eq!(config.default_error_target.as_deref(), Some("#errors"));
        assert_eq!(config.http_error_codes_to_swap, vec![422]);
        assert_eq!(config.settling_class, "htmx-settling");
        assert!(config.allow_nested_oob_swaps);
    }

    #[test]
    fn malformed_json_is_an_error() {
        assert!(SwapConfig::from_json(r#"{"defaultSwapDelay":"soon"}"#).is_err());
    }

    #[test]
    fn meta_tag_overrides() {
        let doc = Document::parse(
            r#"<html><head><meta name="htmx-config" content='{"defaultSettleDelay":20,"scrollBehavior":"smooth"}'></head><body></body></html>"#,
        )
        .unwrap();
        let config = SwapConfig::from_meta(&doc).unwrap();
        assert_eq!(config.default_settle_delay, 20);
        assert_eq!(config.scroll_behavior, ScrollBehavior::Smooth);

        let plain = Document::parse("<p></p>").unwrap();
        assert_eq!(SwapConfig::from_meta(&plain).unwrap().default_settle_delay, 0);
    }

    #[test]
    fn lookup_layers_over_json() {
        let vars: HashMap<&str, &str> = [
            ("SWAP_ENGINE_CONFIG", r#"{"defaultErrorSwapStyle":"innerHTML"}"#),
            ("SWAP_DEFAULT_SWAP_DELAY_MS", "15"),
            ("SWAP_DEFAULT_SETTLE_DELAY_MS", "later"),
            ("SWAP_DEFAULT_ERROR_TARGET", "#errorContainer"),
            ("SWAP_IGNORE_TITLE", "1"),
        ]
        .into_iter()
        .collect();
        let config = SwapConfig::from_lookup(|key| vars.get(key).map(|val| (*val).to_owned()));
        assert_eq!(config.default_error_swap_style.as_deref(), Some("innerHTML"));
        assert_eq!(config.default_swap_delay, 15);
        assert_eq!(config.default_settle_delay, 0);
        assert_eq!(config.default_error_target.as_deref(), Some("#errorContainer"));
        assert!(config.ignore_title);
    }
}
