//! Extended selectors used by target attributes.
//!
//! On top of plain CSS the following forms are resolved relative to an anchor:
//! `this`, `closest <css>`, `find <css>`, `next [<css>]`, `previous [<css>]`,
//! `global <css>`, `document` and `body`. A selector may be wrapped as `<css/>`
//! (or `<css>`) to be taken literally. Comma separated alternatives are resolved
//! independently and concatenated without duplicates.

use dom::{Document, NodeId};
use log::info;

/// Split on commas that are not inside a `<...>` escape.
fn split_alternatives(selector: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut start = 0;
    for (index, ch) in selector.char_indices() {
        match ch {
            '<' => depth = depth.saturating_add(1),
            '>' => depth = depth.saturating_sub(1),
            ',' if depth == 0 => {
                parts.push(&selector[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&selector[start..]);
    parts
}

/// Strip the `<css/>` or `<css>` escape form.
fn normalize_css(selector: &str) -> &str {
    let trimmed = selector.trim();
    let Some(inner) = trimmed.strip_prefix('<') else {
        return trimmed;
    };
    inner
        .strip_suffix("/>")
        .or_else(|| inner.strip_suffix('>'))
        .map_or(trimmed, str::trim)
}

/// Keyword argument, or `*` when the keyword stands alone.
fn keyword_argument(rest: &str) -> &str {
    let css = normalize_css(rest);
    if css.is_empty() { "*" } else { css }
}

/// Split `keyword rest` on the first run of whitespace.
fn split_keyword(selector: &str) -> (&str, &str) {
    match selector.split_once(char::is_whitespace) {
        Some((keyword, rest)) => (keyword, rest.trim()),
        None => (selector, ""),
    }
}

/// First element after `anchor` in document order, outside its subtree, matching `css`.
fn scan_forward(document: &Document, anchor: NodeId, css: &str) -> Option<NodeId> {
    let mut after_anchor = false;
    for node in document.descendants(document.root()) {
        if node == anchor {
            after_anchor = true;
            continue;
        }
        if after_anchor && !document.contains(anchor, node) && document.matches(node, css) {
            return Some(node);
        }
    }
    None
}

/// Last element before `anchor` in document order, excluding its ancestors, matching `css`.
fn scan_backward(document: &Document, anchor: NodeId, css: &str) -> Option<NodeId> {
    let mut found = None;
    for node in document.descendants(document.root()) {
        if node == anchor {
            break;
        }
        if !document.contains(node, anchor) && document.matches(node, css) {
            found = Some(node);
        }
    }
    found
}

fn resolve_alternative(document: &Document, anchor: NodeId, selector: &str) -> Vec<NodeId> {
    let (keyword, rest) = split_keyword(selector);
    match keyword {
        "this" if rest.is_empty() => vec![anchor],
        "document" if rest.is_empty() => vec![document.root()],
        "body" if rest.is_empty() => document.body().into_iter().collect(),
        "closest" => document
            .closest(anchor, keyword_argument(rest))
            .into_iter()
            .collect(),
        "find" => document
            .query_selector(anchor, keyword_argument(rest))
            .into_iter()
            .collect(),
        "next" if rest.is_empty() => document.next_element_sibling(anchor).into_iter().collect(),
        "next" => scan_forward(document, anchor, keyword_argument(rest))
            .into_iter()
            .collect(),
        "previous" if rest.is_empty() => document
            .previous_element_sibling(anchor)
            .into_iter()
            .collect(),
        "previous" => scan_backward(document, anchor, keyword_argument(rest))
            .into_iter()
            .collect(),
        "global" => document.query_selector_all(document.root(), keyword_argument(rest)),
        _ => document.query_selector_all(document.root(), normalize_css(selector)),
    }
}

/// Resolve an extended selector to every matching element.
/// An empty result means "no target" and is never an error.
pub fn query_all_ext(document: &Document, anchor: NodeId, selector: &str) -> Vec<NodeId> {
    let mut found: Vec<NodeId> = Vec::new();
    for alternative in split_alternatives(selector) {
        let alternative = alternative.trim();
        if alternative.is_empty() {
            continue;
        }
        for node in resolve_alternative(document, anchor, alternative) {
            if !found.contains(&node) {
                found.push(node);
            }
        }
    }
    if found.is_empty() {
        info!("selector {selector:?} matched nothing");
    }
    found
}

/// First element of [`query_all_ext`].
pub fn query_ext(document: &Document, anchor: NodeId, selector: &str) -> Option<NodeId> {
    query_all_ext(document, anchor, selector).into_iter().next()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn siblings() -> Document {
        Document::parse(concat!(
            "<div id=\"wrap\">",
            "<div id=\"d3\"></div>",
            "<button id=\"b1\"><span id=\"inner\"></span></button>",
            "<div id=\"d1\"></div>",
            "<div id=\"d2\"></div>",
            "</div>",
        ))
        .unwrap()
    }

    fn ids(doc: &Document, nodes: &[NodeId]) -> Vec<String> {
        nodes
            .iter()
            .map(|node| doc.id_of(*node).unwrap_or_default().to_owned())
            .collect()
    }

    #[test]
    fn next_and_previous() {
        let doc = siblings();
        let button = doc.element_by_id("b1").unwrap();
        for selector in ["next div", "next <div/>", "next"] {
            assert_eq!(ids(&doc, &query_all_ext(&doc, button, selector)), ["d1"], "{selector}");
        }
        for selector in ["previous div", "previous <div/>", "previous"] {
            assert_eq!(ids(&doc, &query_all_ext(&doc, button, selector)), ["d3"], "{selector}");
        }
        assert_eq!(query_ext(&doc, button, "next span"), None);
        let wrap = doc.element_by_id("wrap").unwrap();
        let d1 = doc.element_by_id("d1").unwrap();
        // The enclosing wrapper precedes d1 but is its ancestor.
        assert_ne!(query_ext(&doc, d1, "previous div"), Some(wrap));
    }

    #[test]
    fn relative_keywords() {
        let doc = siblings();
        let inner = doc.element_by_id("inner").unwrap();
        let wrap = doc.element_by_id("wrap").unwrap();
        assert_eq!(query_all_ext(&doc, inner, "this"), vec![inner]);
        assert_eq!(query_ext(&doc, inner, "closest div"), Some(wrap));
        assert_eq!(query_ext(&doc, inner, "closest <div/>"), Some(wrap));
        assert_eq!(ids(&doc, &query_all_ext(&doc, wrap, "find div")), ["d3"]);
        assert_eq!(query_ext(&doc, wrap, "body"), doc.body());
        assert_eq!(query_ext(&doc, wrap, "document"), Some(doc.root()));
    }

    #[test]
    fn plain_css_and_alternatives() {
        let doc = siblings();
        let button = doc.element_by_id("b1").unwrap();
        assert_eq!(ids(&doc, &query_all_ext(&doc, button, "#d2")), ["d2"]);
        assert_eq!(ids(&doc, &query_all_ext(&doc, button, "<#d2/>")), ["d2"]);
        assert_eq!(
            ids(&doc, &query_all_ext(&doc, button, "#d2, next, #d2")),
            ["d2", "d1"]
        );
        assert!(query_all_ext(&doc, button, "bad").is_empty());
        assert!(query_all_ext(&doc, button, "").is_empty());
    }
}
