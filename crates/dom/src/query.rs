//! Selector queries over the document, backed by `css_selectors`.

use crate::Document;
use css_selectors::{SelectorList, SelectorTree, parse_selector_list};
use indextree::NodeId;
use log::trace;

impl SelectorTree for Document {
    type Handle = NodeId;

    fn parent_of(&self, element: NodeId) -> Option<NodeId> {
        self.parent_element(element)
    }

    fn previous_element(&self, element: NodeId) -> Option<NodeId> {
        self.previous_element_sibling(element)
    }

    fn local_name(&self, element: NodeId) -> &str {
        self.tag_name(element).unwrap_or_default()
    }

    fn id(&self, element: NodeId) -> Option<&str> {
        self.id_of(element)
    }

    fn has_class_token(&self, element: NodeId, class: &str) -> bool {
        self.has_class(element, class)
    }

    fn attribute_value(&self, element: NodeId, name: &str) -> Option<&str> {
        self.attribute(element, name)
    }
}

impl Document {
    /// Whether `node` is an element matching a parsed selector list.
    pub fn matches_list(&self, node: NodeId, list: &SelectorList) -> bool {
        self.is_element(node) && list.matches(self, node)
    }

    /// Whether `node` matches `selector`. Unsupported selectors match nothing.
    pub fn matches(&self, node: NodeId, selector: &str) -> bool {
        self.matches_list(node, &parse_selector_list(selector))
    }

    /// All matching descendants of `scope`, in document order.
    pub fn query_selector_all(&self, scope: NodeId, selector: &str) -> Vec<NodeId> {
        if !self.is_live(scope) {
            return Vec::new();
        }
        let list = parse_selector_list(selector);
        if list.is_empty() {
            trace!("selector {selector:?} has no supported alternatives");
            return Vec::new();
        }
        scope
            .descendants(&self.arena)
            .skip(1)
            .filter(|node| self.matches_list(*node, &list))
            .collect()
    }

    /// First matching descendant of `scope`.
    pub fn query_selector(&self, scope: NodeId, selector: &str) -> Option<NodeId> {
        let list = parse_selector_list(selector);
        if list.is_empty() || !self.is_live(scope) {
            return None;
        }
        scope
            .descendants(&self.arena)
            .skip(1)
            .find(|node| self.matches_list(*node, &list))
    }

    /// Nearest inclusive ancestor matching `selector`.
    pub fn closest(&self, node: NodeId, selector: &str) -> Option<NodeId> {
        let list = parse_selector_list(selector);
        if list.is_empty() || !self.is_live(node) {
            return None;
        }
        node.ancestors(&self.arena)
            .find(|candidate| self.matches_list(*candidate, &list))
    }

    /// First connected element with the given id.
    pub fn element_by_id(&self, id: &str) -> Option<NodeId> {
        if id.is_empty() {
            return None;
        }
        self.root
            .descendants(&self.arena)
            .find(|node| self.is_element(*node) && self.id_of(*node) == Some(id))
    }
}

#[cfg(test)]
mod tests {
    use crate::Document;

    fn doc() -> Document {
        Document::parse(
            r#"<div id="outer" class="box"><p class="x">a</p><section><p id="inner">b</p></section></div><p class="x">c</p>"#,
        )
        .unwrap()
    }

    #[test]
    fn queries_in_document_order() {
        let doc = doc();
        let root = doc.root();
        let found = doc.query_selector_all(root, "p");
        assert_eq!(found.len(), 3);
        assert_eq!(doc.text_content(found[1]), "b");
        assert_eq!(doc.query_selector_all(root, ".box > p").len(), 1);
        assert_eq!(doc.query_selector_all(root, "div p").len(), 2);
        assert!(doc.query_selector_all(root, "p:first-child").is_empty());
    }

    #[test]
    fn closest_and_by_id() {
        let doc = doc();
        let inner = doc.element_by_id("inner").unwrap();
        let outer = doc.element_by_id("outer").unwrap();
        assert_eq!(doc.closest(inner, "div"), Some(outer));
        assert_eq!(doc.closest(inner, "p"), Some(inner));
        assert_eq!(doc.closest(inner, "table"), None);
        assert_eq!(doc.query_selector(outer, "#inner"), Some(inner));
    }
}
