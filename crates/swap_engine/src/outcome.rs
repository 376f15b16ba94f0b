//! Response classification: status code to verdict and policy.
//!
//! The configured rule table is consulted in order and the first matching rule
//! wins. Without a match, 2xx and 3xx responses swap and everything else is an
//! error that does not swap, unless its code is on the `httpErrorCodesToSwap`
//! allow-list. The response body is never consulted.

use crate::config::SwapConfig;
use anyhow::{Error, anyhow, bail};
use log::debug;
use serde::Deserialize;

/// One position of a three-digit code pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DigitClass {
    Any,
    Exact(u8),
    OneOf(Vec<u8>),
}

impl DigitClass {
    fn matches(&self, digit: u8) -> bool {
        match self {
            Self::Any => true,
            Self::Exact(expected) => *expected == digit,
            Self::OneOf(set) => set.contains(&digit),
        }
    }
}

/// Status code matcher: `404`, `4xx`, `4..`, `[45]..`, `400-499`, `*` or `...`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(try_from = "String")]
pub enum CodePattern {
    Exact(u16),
    /// Inclusive range.
    Range(u16, u16),
    Digits([DigitClass; 3]),
    Any,
}

impl CodePattern {
    pub fn matches(&self, status: u16) -> bool {
        match self {
            Self::Exact(code) => *code == status,
            Self::Range(low, high) => (*low..=*high).contains(&status),
            Self::Digits(classes) => {
                if status > 999 {
                    return false;
                }
                let digits = [(status / 100) as u8, (status / 10 % 10) as u8, (status % 10) as u8];
                classes
                    .iter()
                    .zip(digits)
                    .all(|(class, digit)| class.matches(digit))
            }
            Self::Any => true,
        }
    }

    /// Parse a pattern.
    ///
    /// # Errors
    /// Returns error for anything other than the documented pattern forms.
    pub fn parse(text: &str) -> Result<Self, Error> {
        let text = text.trim();
        if text == "*" {
            return Ok(Self::Any);
        }
        if let Some((low, high)) = text.split_once('-') {
            let low: u16 = low.trim().parse()?;
            let high: u16 = high.trim().parse()?;
            if low > high {
                bail!("empty status range {text:?}");
            }
            return Ok(Self::Range(low, high));
        }
        if !text.is_empty() && text.bytes().all(|byte| byte.is_ascii_digit()) {
            return Ok(Self::Exact(text.parse()?));
        }
        let classes = parse_digit_classes(text)?;
        if classes.iter().all(|class| *class == DigitClass::Any) {
            return Ok(Self::Any);
        }
        Ok(Self::Digits(classes))
    }
}

fn parse_digit_classes(text: &str) -> Result<[DigitClass; 3], Error> {
    let mut classes = Vec::with_capacity(3);
    let mut chars = text.chars();
    while let Some(ch) = chars.next() {
        let class = match ch {
            'x' | 'X' | '.' => DigitClass::Any,
            '0'..='9' => DigitClass::Exact(ch as u8 - b'0'),
            '[' => {
                let mut set = Vec::new();
                loop {
                    match chars.next() {
                        Some(']') => break,
                        Some(digit @ '0'..='9') => set.push(digit as u8 - b'0'),
                        _ => bail!("malformed digit class in {text:?}"),
                    }
                }
                if set.is_empty() {
                    bail!("empty digit class in {text:?}");
                }
                DigitClass::OneOf(set)
            }
            _ => bail!("unexpected {ch:?} in status pattern {text:?}"),
        };
        classes.push(class);
    }
    <[DigitClass; 3]>::try_from(classes)
        .map_err(|_| anyhow!("status pattern {text:?} must cover three digits"))
}

impl TryFrom<String> for CodePattern {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

/// A row of the response-handling policy table.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResponseRule {
    pub code: CodePattern,
    #[serde(default)]
    pub swap: bool,
    #[serde(default)]
    pub error: bool,
    #[serde(default)]
    pub ignore_title: bool,
    /// Event reported to the host when this rule matches.
    #[serde(default)]
    pub event: Option<String>,
    /// Extended selector replacing the resolved target.
    #[serde(default)]
    pub target: Option<String>,
    /// Swap directive replacing the resolved one.
    #[serde(default)]
    pub swap_override: Option<String>,
}

impl ResponseRule {
    pub fn new(code: CodePattern, swap: bool, error: bool) -> Self {
        Self {
            code,
            swap,
            error,
            ignore_title: false,
            event: None,
            target: None,
            swap_override: None,
        }
    }
}

/// Which part of the policy produced a verdict.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutcomeSource {
    /// Index into `responseHandling`.
    Rule(usize),
    /// `httpErrorCodesToSwap`.
    AllowList,
    Default,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedOutcome {
    pub is_error: bool,
    pub should_swap: bool,
    pub ignore_title: bool,
    pub event_name: Option<String>,
    pub target_override: Option<String>,
    pub swap_override: Option<String>,
    pub source: OutcomeSource,
}

/// Classify a response status.
pub fn classify(status: u16, config: &SwapConfig) -> ResolvedOutcome {
    if let Some((index, rule)) = config
        .response_handling
        .iter()
        .enumerate()
        .find(|(_, rule)| rule.code.matches(status))
    {
        debug!("status {status} matched response rule {index}");
        return ResolvedOutcome {
            is_error: rule.error,
            should_swap: rule.swap,
            ignore_title: rule.ignore_title,
            event_name: rule.event.clone(),
            target_override: rule.target.clone(),
            swap_override: rule.swap_override.clone(),
            source: OutcomeSource::Rule(index),
        };
    }
    let success = (200..400).contains(&status);
    let allowed = !success && config.http_error_codes_to_swap.contains(&status);
    if allowed {
        debug!("status {status} is on the error swap allow-list");
    }
    ResolvedOutcome {
        is_error: !success,
        should_swap: success || allowed,
        ignore_title: false,
        event_name: None,
        target_override: None,
        swap_override: None,
        source: if allowed {
            OutcomeSource::AllowList
        } else {
            OutcomeSource::Default
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let config = SwapConfig::default();
        for status in [200, 204, 299, 300, 302, 399] {
            let outcome = classify(status, &config);
            assert!(outcome.should_swap && !outcome.is_error, "{status}");
        }
        for status in [0, 100, 199, 400, 404, 422, 500, 599] {
            let outcome = classify(status, &config);
            assert!(!outcome.should_swap && outcome.is_error, "{status}");
            assert_eq!(outcome.source, OutcomeSource::Default);
        }
    }

    #[test]
    fn pattern_forms() {
        assert!(CodePattern::parse("404").unwrap().matches(404));
        assert!(!CodePattern::parse("404").unwrap().matches(405));
        let wildcard = CodePattern::parse("4xx").unwrap();
        assert!(wildcard.matches(400) && wildcard.matches(499) && !wildcard.matches(500));
        assert_eq!(CodePattern::parse("4..").unwrap(), wildcard);
        let class = CodePattern::parse("[45]..").unwrap();
        assert!(class.matches(404) && class.matches(503) && !class.matches(302));
        let range = CodePattern::parse("400-499").unwrap();
        assert!(range.matches(400) && range.matches(499) && !range.matches(500));
        assert_eq!(CodePattern::parse("...").unwrap(), CodePattern::Any);
        assert_eq!(CodePattern::parse("*").unwrap(), CodePattern::Any);
        assert!(CodePattern::parse("4x").is_err());
        assert!(CodePattern::parse("[4").is_err());
        assert!(CodePattern::parse("500-400").is_err());
    }

    #[test]
    fn first_matching_rule_wins() {
        let mut specific = ResponseRule::new(CodePattern::Exact(422), true, true);
        specific.event = Some("validation".into());
        specific.target = Some("#errors".into());
        let config = SwapConfig {
            response_handling: vec![
                specific,
                ResponseRule::new(CodePattern::parse("4xx").unwrap(), false, true),
                ResponseRule::new(CodePattern::Any, true, false),
            ],
            ..SwapConfig::default()
        };
        let validation = classify(422, &config);
        assert!(validation.should_swap && validation.is_error);
        assert_eq!(validation.event_name.as_deref(), Some("validation"));
        assert_eq!(validation.target_override.as_deref(), Some("#errors"));
        assert_eq!(validation.source, OutcomeSource::Rule(0));

        assert_eq!(classify(404, &config).source, OutcomeSource::Rule(1));
        let server = classify(500, &config);
        assert!(server.should_swap && !server.is_error);
    }

    #[test]
    fn allow_list_applies_only_without_rule() {
        let config = SwapConfig {
            http_error_codes_to_swap: vec![422, 204],
            response_handling: vec![ResponseRule::new(CodePattern::Range(500, 599), false, true)],
            ..SwapConfig::default()
        };
        let allowed = classify(422, &config);
        assert!(allowed.should_swap && allowed.is_error);
        assert_eq!(allowed.source, OutcomeSource::AllowList);
        assert_eq!(classify(204, &config).source, OutcomeSource::Default);
    }

    #[test]
    fn rules_deserialize_from_config_json() {
        let config = SwapConfig::from_json(
            r#"{"responseHandling":[{"code":"[45]..","swap":true,"error":true,"swapOverride":"outerHTML"},{"code":"*","swap":true}]}"#,
        )
        .unwrap();
        assert_eq!(config.response_handling.len(), 2);
        let outcome = classify(503, &config);
        assert_eq!(outcome.swap_override.as_deref(), Some("outerHTML"));
        assert!(SwapConfig::from_json(r#"{"responseHandling":[{"code":"4y4"}]}"#).is_err());
    }
}
