//! CSS selector parsing.

use crate::{Combinator, ComplexSelector, CompoundSelector, SelectorList, SimpleSelector};
use core::mem::take;
use log::trace;

#[derive(Clone, Debug, PartialEq, Eq)]
/// Internal tokenizer token kinds.
pub enum Tok {
    /// A combinator token like child/adjacent/general sibling.
    Combinator(Combinator),
    /// Whitespace that implies a descendant combinator.
    DescendantWS,
    /// A simple selector token (type, class, id, attribute, universal).
    Simple(SimpleSelector),
    /// A construct outside the supported subset (pseudo-classes, namespaces, ...).
    Unsupported(u8),
}

/// Tokenizer over a selector string.
pub struct SelectorTokenizer<'input> {
    /// Selector bytes.
    input_bytes: &'input [u8],
    /// Current cursor index into `input_bytes`.
    index: usize,
    /// Whether a token has been produced yet; leading whitespace is not a combinator.
    emitted: bool,
}

impl<'input> SelectorTokenizer<'input> {
    /// Construct a tokenizer from input.
    #[inline]
    pub(crate) fn new(input: &'input str) -> Self {
        Self {
            input_bytes: input.as_bytes(),
            index: 0,
            emitted: false,
        }
    }

    /// Return the next selector token, if any.
    #[inline]
    pub(crate) fn next_token(&mut self) -> Option<Tok> {
        let had_space = self.skip_spaces();
        // Trailing whitespace is not a combinator.
        let &current = self.input_bytes.get(self.index)?;
        if had_space && self.emitted {
            return Some(Tok::DescendantWS);
        }
        self.emitted = true;
        let token = match current {
            b'*' => {
                self.advance();
                Tok::Simple(SimpleSelector::Universal)
            }
            b'.' => self.consume_class(),
            b'#' => self.consume_id(),
            b'[' => self.consume_attr(),
            b'>' => {
                self.advance();
                Tok::Combinator(Combinator::Child)
            }
            b'+' => {
                self.advance();
                Tok::Combinator(Combinator::AdjacentSibling)
            }
            b'~' => {
                self.advance();
                Tok::Combinator(Combinator::GeneralSibling)
            }
            byte if is_ident_byte(byte) => self.consume_type(),
            other => {
                self.advance();
                Tok::Unsupported(other)
            }
        };
        Some(token)
    }

    #[inline]
    fn advance(&mut self) {
        self.index = self.index.saturating_add(1);
    }

    /// Consume an identifier; case is preserved.
    #[inline]
    fn consume_ident(&mut self) -> String {
        let start = self.index;
        while let Some(&byte) = self.input_bytes.get(self.index) {
            if is_ident_byte(byte) {
                self.advance();
            } else {
                break;
            }
        }
        let slice = self.input_bytes.get(start..self.index).unwrap_or(&[]);
        String::from_utf8_lossy(slice).into_owned()
    }

    /// Parse a type selector identifier into a `SimpleSelector::Type`.
    #[inline]
    fn consume_type(&mut self) -> Tok {
        let ident = self.consume_ident();
        Tok::Simple(SimpleSelector::Type(ident.to_ascii_lowercase()))
    }

    /// Parse a class selector following '.' into `SimpleSelector::Class`.
    #[inline]
    fn consume_class(&mut self) -> Tok {
        self.advance();
        let ident = self.consume_ident();
        if ident.is_empty() {
            return Tok::Unsupported(b'.');
        }
        Tok::Simple(SimpleSelector::Class(ident))
    }

    /// Parse an id selector following '#' into `SimpleSelector::IdSelector`.
    #[inline]
    fn consume_id(&mut self) -> Tok {
        self.advance();
        let ident = self.consume_ident();
        if ident.is_empty() {
            return Tok::Unsupported(b'#');
        }
        Tok::Simple(SimpleSelector::IdSelector(ident))
    }

    /// Parse an attribute selector, supporting `[name]` and `[name=value]` (quoted or unquoted).
    #[inline]
    fn consume_attr(&mut self) -> Tok {
        self.advance();
        self.skip_spaces();
        let name = self.consume_ident().to_ascii_lowercase();
        self.skip_spaces();
        let token = match self.input_bytes.get(self.index) {
            Some(b'=') => {
                self.advance();
                self.skip_spaces();
                let value = match self.input_bytes.get(self.index) {
                    Some(&quote @ (b'"' | b'\'')) => {
                        self.advance();
                        self.consume_quoted_attr_value(quote)
                    }
                    _ => self.consume_unquoted_attr_value(),
                };
                Tok::Simple(SimpleSelector::AttrEquals { name, value })
            }
            Some(b']') => Tok::Simple(SimpleSelector::AttrExists { name }),
            // Operators such as `^=` or `~=` are outside the supported subset.
            _ => Tok::Unsupported(b'['),
        };
        self.skip_spaces();
        while let Some(&byte) = self.input_bytes.get(self.index) {
            self.advance();
            if byte == b']' {
                break;
            }
        }
        if matches!(&token, Tok::Simple(SimpleSelector::AttrExists { name } | SimpleSelector::AttrEquals { name, .. }) if name.is_empty())
        {
            return Tok::Unsupported(b'[');
        }
        token
    }

    /// Consume an unquoted attribute value until whitespace or a closing bracket.
    #[inline]
    fn consume_unquoted_attr_value(&mut self) -> String {
        let start = self.index;
        while let Some(&byte) = self.input_bytes.get(self.index) {
            if byte.is_ascii_whitespace() || byte == b']' {
                break;
            }
            self.advance();
        }
        let slice = self.input_bytes.get(start..self.index).unwrap_or(&[]);
        String::from_utf8_lossy(slice).into_owned()
    }

    /// Consume a quoted attribute value until the matching quote byte.
    #[inline]
    fn consume_quoted_attr_value(&mut self, quote: u8) -> String {
        let start = self.index;
        while matches!(self.input_bytes.get(self.index), Some(&byte) if byte != quote) {
            self.advance();
        }
        let slice = self.input_bytes.get(start..self.index).unwrap_or(&[]);
        let out = String::from_utf8_lossy(slice).into_owned();
        if self.input_bytes.get(self.index).is_some() {
            self.advance();
        }
        out
    }

    /// Skip ASCII whitespace, reporting whether any was skipped.
    #[inline]
    fn skip_spaces(&mut self) -> bool {
        let start = self.index;
        while matches!(self.input_bytes.get(self.index), Some(byte) if byte.is_ascii_whitespace()) {
            self.advance();
        }
        self.index > start
    }
}

/// Identifier bytes: ASCII alphanumerics, '-', '_' and any non-ASCII byte.
#[inline]
fn is_ident_byte(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_' || byte >= 0x80
}

/// Split a selector group on commas that are not inside brackets or quotes.
fn split_group(input: &str) -> Vec<&str> {
    let mut parts = Vec::new();
    let mut depth = 0_usize;
    let mut quote: Option<char> = None;
    let mut start = 0;
    for (index, ch) in input.char_indices() {
        match (quote, ch) {
            (Some(open), _) if ch == open => quote = None,
            (Some(_), _) => {}
            (None, '"' | '\'') => quote = Some(ch),
            (None, '[' | '(') => depth = depth.saturating_add(1),
            (None, ']' | ')') => depth = depth.saturating_sub(1),
            (None, ',') if depth == 0 => {
                parts.push(&input[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    parts.push(&input[start..]);
    parts
}

/// Parse a comma separated group, dropping unsupported alternatives.
pub fn parse_selector_list(input: &str) -> SelectorList {
    let mut list = SelectorList::default();
    for part in split_group(input) {
        match parse_complex_selector(part.trim()) {
            Some(sel) => list.selectors.push(sel),
            None => trace!("dropping unsupported selector {part:?}"),
        }
    }
    list
}

/// Parse one complex selector (permissive). Returns `None` when the text is
/// empty or uses a construct outside the supported subset.
pub fn parse_complex_selector(input: &str) -> Option<ComplexSelector> {
    let mut tokens = SelectorTokenizer::new(input);
    let mut current = CompoundSelector::default();
    let mut first: Option<CompoundSelector> = None;
    let mut rest: Vec<(Combinator, CompoundSelector)> = Vec::new();
    let mut pending_combinator: Option<Combinator> = None;

    while let Some(token) = tokens.next_token() {
        match token {
            Tok::Unsupported(_) => return None,
            Tok::Combinator(comb) => {
                if current.simples.is_empty() {
                    // `a > b` arrives as descendant whitespace then `>`; the explicit one wins.
                    if first.is_none() {
                        return None;
                    }
                    pending_combinator = Some(comb);
                    continue;
                }
                push_compound(&mut first, &mut rest, pending_combinator, take(&mut current));
                pending_combinator = Some(comb);
            }
            Tok::DescendantWS => {
                if !current.simples.is_empty() {
                    push_compound(&mut first, &mut rest, pending_combinator, take(&mut current));
                    pending_combinator = Some(Combinator::Descendant);
                }
            }
            Tok::Simple(simple) => current.simples.push(simple),
        }
    }

    if current.simples.is_empty() {
        // A dangling combinator (`div >`) leaves nothing to its right.
        if pending_combinator.is_some() {
            return None;
        }
        return first.map(|head| ComplexSelector { first: head, rest });
    }
    push_compound(&mut first, &mut rest, pending_combinator, current);
    first.map(|head| ComplexSelector { first: head, rest })
}

fn push_compound(
    first: &mut Option<CompoundSelector>,
    rest: &mut Vec<(Combinator, CompoundSelector)>,
    combinator: Option<Combinator>,
    compound: CompoundSelector,
) {
    if first.is_none() {
        *first = Some(compound);
    } else {
        rest.push((combinator.unwrap_or(Combinator::Descendant), compound));
    }
}
