//! Right-to-left selector matching.

use crate::{
    Combinator, ComplexSelector, CompoundSelector, SelectorTree, SelectorList, SimpleSelector,
};

/// True if any alternative in `list` matches `element`.
pub fn matches_selector_list<T: SelectorTree>(
    tree: &T,
    element: T::Handle,
    list: &SelectorList,
) -> bool {
    list.selectors
        .iter()
        .any(|selector_item| matches_complex(tree, element, selector_item))
}

/// `element` is matched against the rightmost compound first.
pub fn matches_complex<T: SelectorTree>(
    tree: &T,
    element: T::Handle,
    sel: &ComplexSelector,
) -> bool {
    matches_at(tree, element, sel, sel.rest.len())
}

/// Compound at position `index`, where 0 is `sel.first`.
fn compound_at(sel: &ComplexSelector, index: usize) -> Option<&CompoundSelector> {
    if index == 0 {
        return Some(&sel.first);
    }
    sel.rest.get(index - 1).map(|pair| &pair.1)
}

/// Match compounds `0..=index` with `element` as the subject of compound `index`.
/// Descendant and general sibling combinators backtrack over every candidate.
fn matches_at<T: SelectorTree>(
    tree: &T,
    element: T::Handle,
    sel: &ComplexSelector,
    index: usize,
) -> bool {
    let Some(compound) = compound_at(sel, index) else {
        return false;
    };
    if !matches_compound(tree, element, compound) {
        return false;
    }
    if index == 0 {
        return true;
    }
    let Some(&(combinator, _)) = sel.rest.get(index - 1) else {
        return false;
    };
    let left = index - 1;
    match combinator {
        Combinator::Descendant => {
            let mut cursor = tree.parent_of(element);
            while let Some(ancestor) = cursor {
                if matches_at(tree, ancestor, sel, left) {
                    return true;
                }
                cursor = tree.parent_of(ancestor);
            }
            false
        }
        Combinator::Child => tree
            .parent_of(element)
            .is_some_and(|parent| matches_at(tree, parent, sel, left)),
        Combinator::AdjacentSibling => tree
            .previous_element(element)
            .is_some_and(|sibling| matches_at(tree, sibling, sel, left)),
        Combinator::GeneralSibling => {
            let mut cursor = tree.previous_element(element);
            while let Some(sibling) = cursor {
                if matches_at(tree, sibling, sel, left) {
                    return true;
                }
                cursor = tree.previous_element(sibling);
            }
            false
        }
    }
}

pub fn matches_compound<T: SelectorTree>(
    tree: &T,
    element: T::Handle,
    compound: &CompoundSelector,
) -> bool {
    compound.simples.iter().all(|simple| match simple {
        SimpleSelector::Universal => true,
        SimpleSelector::Type(type_name) => {
            !type_name.is_empty() && tree.local_name(element).eq_ignore_ascii_case(type_name)
        }
        SimpleSelector::Class(class_name) => tree.has_class_token(element, class_name),
        SimpleSelector::IdSelector(id) => tree.id(element) == Some(id.as_str()),
        SimpleSelector::AttrExists { name } => tree.attribute_value(element, name).is_some(),
        SimpleSelector::AttrEquals { name, value } => {
            tree.attribute_value(element, name) == Some(value.as_str())
        }
    })
}
