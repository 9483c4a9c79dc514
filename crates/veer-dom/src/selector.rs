//! CSS selectors
//!
//! Just enough of Selectors Level 3 to resolve stream targets and metadata
//! lookups: type, universal, `#id`, `.class`, attribute selectors
//! (`[a]`, `[a=v]`, `[a~=v]`, `[a^=v]`, `[a*=v]`), descendant and child
//! combinators, and comma-separated lists.

use crate::{DomTree, NodeId};

/// Selector parse error
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SelectorError {
    #[error("empty selector")]
    Empty,

    #[error("unexpected character {found:?} at offset {offset}")]
    Unexpected { found: char, offset: usize },

    #[error("unterminated attribute selector")]
    UnterminatedAttribute,
}

/// A parsed selector list
#[derive(Debug, Clone, PartialEq)]
pub struct Selector {
    alternatives: Vec<Complex>,
}

#[derive(Debug, Clone, PartialEq)]
struct Complex {
    /// Compounds left to right; each carries the combinator that links it to
    /// the previous compound
    parts: Vec<(Combinator, Compound)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Combinator {
    Descendant,
    Child,
}

#[derive(Debug, Clone, Default, PartialEq)]
struct Compound {
    tag: Option<String>,
    ids: Vec<String>,
    classes: Vec<String>,
    attrs: Vec<AttrSelector>,
}

#[derive(Debug, Clone, PartialEq)]
struct AttrSelector {
    name: String,
    op: AttrOp,
}

#[derive(Debug, Clone, PartialEq)]
enum AttrOp {
    Exists,
    Equals(String),
    Includes(String),
    Prefix(String),
    Substring(String),
}

impl Selector {
    /// Parse a selector list
    pub fn parse(input: &str) -> Result<Self, SelectorError> {
        let chars: Vec<char> = input.chars().collect();
        let mut alternatives = Vec::new();
        let mut parser = Parser { chars: &chars, pos: 0 };

        loop {
            alternatives.push(parser.complex()?);
            parser.skip_whitespace();
            match parser.peek() {
                Some(',') => parser.pos += 1,
                None => break,
                Some(found) => return Err(SelectorError::Unexpected { found, offset: parser.pos }),
            }
        }

        Ok(Self { alternatives })
    }

    /// Check whether an element matches any alternative
    pub fn matches(&self, tree: &DomTree, id: NodeId) -> bool {
        tree.is_element(id)
            && self.alternatives.iter().any(|c| matches_from(tree, &c.parts, c.parts.len() - 1, id))
    }
}

impl std::str::FromStr for Selector {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

fn matches_from(tree: &DomTree, parts: &[(Combinator, Compound)], idx: usize, id: NodeId) -> bool {
    let (combinator, compound) = &parts[idx];
    if !compound.matches(tree, id) {
        return false;
    }
    if idx == 0 {
        return true;
    }
    match combinator {
        Combinator::Child => tree
            .parent(id)
            .filter(|&p| tree.is_element(p))
            .is_some_and(|p| matches_from(tree, parts, idx - 1, p)),
        Combinator::Descendant => tree
            .ancestors(id)
            .filter(|&a| tree.is_element(a))
            .any(|a| matches_from(tree, parts, idx - 1, a)),
    }
}

impl Compound {
    fn is_empty(&self) -> bool {
        self.tag.is_none() && self.ids.is_empty() && self.classes.is_empty() && self.attrs.is_empty()
    }

    fn matches(&self, tree: &DomTree, id: NodeId) -> bool {
        let Some(el) = tree.element(id) else {
            return false;
        };
        if let Some(tag) = &self.tag {
            if &el.tag != tag {
                return false;
            }
        }
        if !self.ids.iter().all(|want| el.id() == Some(want.as_str())) {
            return false;
        }
        if !self.classes.iter().all(|want| el.has_class(want)) {
            return false;
        }
        self.attrs.iter().all(|attr| {
            let Some(value) = el.get_attr(&attr.name) else {
                return false;
            };
            match &attr.op {
                AttrOp::Exists => true,
                AttrOp::Equals(v) => value == v,
                AttrOp::Includes(v) => value.split_ascii_whitespace().any(|w| w == v),
                AttrOp::Prefix(v) => !v.is_empty() && value.starts_with(v.as_str()),
                AttrOp::Substring(v) => !v.is_empty() && value.contains(v.as_str()),
            }
        })
    }
}

struct Parser<'a> {
    chars: &'a [char],
    pos: usize,
}

impl Parser<'_> {
    fn peek(&self) -> Option<char> {
        self.chars.get(self.pos).copied()
    }

    fn skip_whitespace(&mut self) -> bool {
        let start = self.pos;
        while self.peek().is_some_and(char::is_whitespace) {
            self.pos += 1;
        }
        self.pos > start
    }

    fn unexpected(&self) -> SelectorError {
        match self.peek() {
            Some(found) => SelectorError::Unexpected { found, offset: self.pos },
            None => SelectorError::Empty,
        }
    }

    fn complex(&mut self) -> Result<Complex, SelectorError> {
        let mut parts = Vec::new();
        let mut combinator = Combinator::Descendant;
        loop {
            self.skip_whitespace();
            match self.peek() {
                None | Some(',') => break,
                Some('>') => {
                    if parts.is_empty() {
                        return Err(self.unexpected());
                    }
                    combinator = Combinator::Child;
                    self.pos += 1;
                }
                Some(_) => {
                    let compound = self.compound()?;
                    parts.push((combinator, compound));
                    combinator = Combinator::Descendant;
                }
            }
        }
        if parts.is_empty() {
            return Err(SelectorError::Empty);
        }
        Ok(Complex { parts })
    }

    fn compound(&mut self) -> Result<Compound, SelectorError> {
        let mut compound = Compound::default();
        let mut universal = false;

        if self.peek() == Some('*') {
            universal = true;
            self.pos += 1;
        } else if self.peek().is_some_and(is_ident_char) {
            compound.tag = Some(self.ident().to_ascii_lowercase());
        }

        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    let id = self.ident();
                    if id.is_empty() {
                        return Err(self.unexpected());
                    }
                    compound.ids.push(id);
                }
                Some('.') => {
                    self.pos += 1;
                    let class = self.ident();
                    if class.is_empty() {
                        return Err(self.unexpected());
                    }
                    compound.classes.push(class);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.attribute()?);
                }
                _ => break,
            }
        }

        if compound.is_empty() && !universal {
            return Err(self.unexpected());
        }
        Ok(compound)
    }

    fn attribute(&mut self) -> Result<AttrSelector, SelectorError> {
        self.skip_whitespace();
        let name = self.ident().to_ascii_lowercase();
        if name.is_empty() {
            return Err(self.unexpected());
        }
        self.skip_whitespace();

        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrSelector { name, op: AttrOp::Exists });
            }
            Some('=') => {
                self.pos += 1;
                '='
            }
            Some(c @ ('~' | '^' | '*')) if self.chars.get(self.pos + 1) == Some(&'=') => {
                self.pos += 2;
                c
            }
            None => return Err(SelectorError::UnterminatedAttribute),
            Some(_) => return Err(self.unexpected()),
        };

        self.skip_whitespace();
        let value = self.value()?;
        self.skip_whitespace();
        if self.peek() != Some(']') {
            return Err(SelectorError::UnterminatedAttribute);
        }
        self.pos += 1;

        let op = match op {
            '~' => AttrOp::Includes(value),
            '^' => AttrOp::Prefix(value),
            '*' => AttrOp::Substring(value),
            _ => AttrOp::Equals(value),
        };
        Ok(AttrSelector { name, op })
    }

    fn value(&mut self) -> Result<String, SelectorError> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err(SelectorError::UnterminatedAttribute);
                }
                let value: String = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                Ok(value)
            }
            _ => Ok(self.ident()),
        }
    }

    fn ident(&mut self) -> String {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        self.chars[start..self.pos].iter().collect()
    }
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_' || !c.is_ascii()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> (DomTree, NodeId, NodeId, NodeId) {
        let mut tree = DomTree::new();
        let root = tree.root();
        let div = tree.create_element_with_attrs("div", &[("id", "main"), ("class", "box wide")]);
        let ul = tree.create_element("ul");
        let li = tree.create_element_with_attrs("li", &[("data-kind", "item primary")]);
        tree.append_child(root, div);
        tree.append_child(div, ul);
        tree.append_child(ul, li);
        (tree, div, ul, li)
    }

    #[test]
    fn test_simple_selectors() {
        let (tree, div, ul, li) = sample();
        assert!(Selector::parse("div").unwrap().matches(&tree, div));
        assert!(Selector::parse("#main").unwrap().matches(&tree, div));
        assert!(Selector::parse(".wide").unwrap().matches(&tree, div));
        assert!(Selector::parse("div.box.wide#main").unwrap().matches(&tree, div));
        assert!(!Selector::parse("div.missing").unwrap().matches(&tree, div));
        assert!(Selector::parse("*").unwrap().matches(&tree, ul));
        assert!(Selector::parse("[data-kind~=primary]").unwrap().matches(&tree, li));
        assert!(Selector::parse("li[data-kind^='item']").unwrap().matches(&tree, li));
    }

    #[test]
    fn test_combinators() {
        let (tree, _, ul, li) = sample();
        assert!(Selector::parse("#main li").unwrap().matches(&tree, li));
        assert!(Selector::parse("ul > li").unwrap().matches(&tree, li));
        assert!(!Selector::parse("#main > li").unwrap().matches(&tree, li));
        assert!(Selector::parse("p, ul").unwrap().matches(&tree, ul));
    }

    #[test]
    fn test_query_selector_all() {
        let (tree, _, _, li) = sample();
        let sel: Selector = "div li".parse().unwrap();
        assert_eq!(tree.query_selector_all(tree.root(), &sel), vec![li]);
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(Selector::parse(""), Err(SelectorError::Empty));
        assert!(Selector::parse("div[").is_err());
        assert!(Selector::parse("[a='b").is_err());
        assert!(Selector::parse("> p").is_err());
        assert!(Selector::parse("#").is_err());
    }
}
