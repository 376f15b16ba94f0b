//! Document building and mutation through parsed markup.

use dom::{Document, NodeKind};

#[cfg(test)]
mod tests {
    use super::*;

    fn init() {
        let _ = env_logger::builder().is_test(true).try_init();
    }

    /// Moving parsed nodes keeps the old subtree detached but addressable.
    ///
    /// # Panics
    /// Panics if parsing or insertion fails
    #[test]
    fn replaced_content_stays_addressable() {
        init();
        let mut doc = Document::parse(r#"<div id="d1"><input id="i1" value="x"></div>"#).unwrap();
        let target = doc.element_by_id("d1").unwrap();
        let old_input = doc.element_by_id("i1").unwrap();

        let removed = doc.take_children(target);
        assert_eq!(removed, vec![old_input]);
        doc.append_html(target, r#"<input id="i1" value="y">"#).unwrap();

        let new_input = doc.element_by_id("i1").unwrap();
        assert_ne!(new_input, old_input);
        assert!(!doc.is_connected(old_input));
        assert_eq!(doc.attribute(old_input, "value"), Some("x"));
        assert_eq!(doc.inner_html(target), r#"<input id="i1" value="y">"#);
    }

    /// Fragments are detached containers until their children are moved.
    ///
    /// # Panics
    /// Panics if parsing fails
    #[test]
    fn fragments_are_detached() {
        init();
        let mut doc = Document::new();
        let fragment = doc.parse_fragment("<p>a</p><p>b</p>").unwrap();
        assert_eq!(doc.kind(fragment.root), Some(&NodeKind::Fragment));
        assert!(!doc.is_connected(fragment.root));
        assert_eq!(doc.query_selector_all(fragment.root, "p").len(), 2);

        let body = doc.body().unwrap();
        for child in doc.take_children(fragment.root) {
            doc.append_child(body, child).unwrap();
        }
        assert_eq!(doc.inner_html(body), "<p>a</p><p>b</p>");
        assert!(doc.children(fragment.root).is_empty());
    }

    /// Text content replaces every child with a single text node.
    ///
    /// # Panics
    /// Panics if parsing fails
    #[test]
    fn text_content_round_trip() {
        init();
        let mut doc = Document::parse(r#"<div id="d"><b>bold</b> tail</div>"#).unwrap();
        let div = doc.element_by_id("d").unwrap();
        assert_eq!(doc.text_content(div), "bold tail");
        doc.set_text_content(div, "<i>raw</i>").unwrap();
        assert_eq!(doc.inner_html(div), "&lt;i&gt;raw&lt;/i&gt;");
        assert_eq!(doc.element_children(div).len(), 0);
    }
}
