//! CSS selector subset used to resolve swap targets and select-oob ids.
//!
//! Supported:
//! - universal, type, class, id and attribute (`[name]`, `[name=value]`) selectors
//! - descendant, child, adjacent sibling and general sibling combinators
//! - comma separated groups
//!
//! Parsing is permissive. An alternative using anything outside this subset
//! (pseudo-classes, attribute operators other than `=`) is dropped from its
//! group, so `"a:hover, p"` behaves like `"p"` and `"a:hover"` matches nothing.

mod matcher;
mod parser;

pub use matcher::{matches_complex, matches_compound, matches_selector_list};
pub use parser::{parse_complex_selector, parse_selector_list};

/// Read-only view of an element tree that selectors can be matched against.
pub trait SelectorTree {
    type Handle: Copy + Eq;

    /// Parent element. Document and fragment roots are not elements.
    fn parent_of(&self, element: Self::Handle) -> Option<Self::Handle>;

    /// Closest preceding sibling that is an element.
    fn previous_element(&self, element: Self::Handle) -> Option<Self::Handle>;

    /// ASCII-lowercase tag name.
    fn local_name(&self, element: Self::Handle) -> &str;

    fn id(&self, element: Self::Handle) -> Option<&str>;

    fn has_class_token(&self, element: Self::Handle, class: &str) -> bool;

    fn attribute_value(&self, element: Self::Handle, name: &str) -> Option<&str>;
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub enum SimpleSelector {
    Type(String),
    Class(String),
    IdSelector(String),
    /// `[name]`
    AttrExists { name: String },
    /// `[name=value]`, compared case-sensitively.
    AttrEquals { name: String, value: String },
    Universal,
}

/// Simple selectors that all apply to one element.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct CompoundSelector {
    pub simples: Vec<SimpleSelector>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Combinator {
    /// whitespace
    Descendant,
    /// `>`
    Child,
    /// `+`
    AdjacentSibling,
    /// `~`
    GeneralSibling,
}

/// Compounds joined by combinators, left to right.
/// `rest[i].0` joins the compound before it with `rest[i].1`.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct ComplexSelector {
    pub first: CompoundSelector,
    pub rest: Vec<(Combinator, CompoundSelector)>,
}

/// Comma separated alternatives.
#[derive(Clone, Debug, PartialEq, Eq, Default)]
pub struct SelectorList {
    pub selectors: Vec<ComplexSelector>,
}

impl SelectorList {
    pub fn parse(input: &str) -> Self {
        parse_selector_list(input)
    }

    /// True when no alternative survived parsing. An empty list matches nothing.
    pub fn is_empty(&self) -> bool {
        self.selectors.is_empty()
    }

    pub fn matches<T: SelectorTree>(&self, tree: &T, element: T::Handle) -> bool {
        matches_selector_list(tree, element, self)
    }
}
