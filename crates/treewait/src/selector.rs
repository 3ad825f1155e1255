//! CSS-like selectors over a [`ComponentTree`].
//!
//! Supported grammar:
//!
//! ```text
//! list      := complex ("," complex)*
//! complex   := compound (combinator compound)*
//! combinator:= whitespace | ">"
//! compound  := (tag | "*")? (  "#" id
//!                            | "." class
//!                            | "[" attr (op value)? "]" )*
//! op        := "=" | "^=" | "$=" | "*="
//! ```
//!
//! Tag names match composite component names too, so `SearchForm input`
//! works across component boundaries.

use crate::result::{HarnessError, HarnessResult};
use crate::tree::{ComponentTree, ElementInfo, NodeId};

/// One attribute test inside brackets
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttrCondition {
    /// `[key]`
    Exists {
        /// Attribute name
        key: String,
    },
    /// `[key=value]`
    Eq {
        /// Attribute name
        key: String,
        /// Expected value
        value: String,
    },
    /// `[key^=value]`
    StartsWith {
        /// Attribute name
        key: String,
        /// Expected prefix
        value: String,
    },
    /// `[key$=value]`
    EndsWith {
        /// Attribute name
        key: String,
        /// Expected suffix
        value: String,
    },
    /// `[key*=value]`
    Contains {
        /// Attribute name
        key: String,
        /// Expected substring
        value: String,
    },
}

impl AttrCondition {
    fn matches(&self, element: &ElementInfo) -> bool {
        match self {
            Self::Exists { key } => element.attribute(key).is_some(),
            Self::Eq { key, value } => element.attribute(key) == Some(value.as_str()),
            Self::StartsWith { key, value } => element
                .attribute(key)
                .is_some_and(|v| v.starts_with(value.as_str())),
            Self::EndsWith { key, value } => element
                .attribute(key)
                .is_some_and(|v| v.ends_with(value.as_str())),
            Self::Contains { key, value } => element
                .attribute(key)
                .is_some_and(|v| v.contains(value.as_str())),
        }
    }
}

/// Tests applying to a single node
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Compound {
    /// Required tag or component name
    pub tag: Option<String>,
    /// Required id
    pub id: Option<String>,
    /// Required classes
    pub classes: Vec<String>,
    /// Attribute tests
    pub attrs: Vec<AttrCondition>,
}

impl Compound {
    /// Check one element against every test
    #[must_use]
    pub fn matches(&self, element: &ElementInfo) -> bool {
        if let Some(tag) = &self.tag {
            if !element.tag.eq_ignore_ascii_case(tag) {
                return false;
            }
        }
        if let Some(id) = &self.id {
            if element.id() != Some(id.as_str()) {
                return false;
            }
        }
        self.classes.iter().all(|c| element.has_class(c))
            && self.attrs.iter().all(|a| a.matches(element))
    }
}

/// Relation between a compound and the one to its left
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Combinator {
    /// Whitespace: any ancestor
    Descendant,
    /// `>`: direct parent
    Child,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Part {
    compound: Compound,
    // Relation to the previous (left) part
    combinator: Option<Combinator>,
}

/// A parsed selector list
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selector {
    source: String,
    alternatives: Vec<Vec<Part>>,
}

impl Selector {
    /// Parse a selector string
    pub fn parse(source: &str) -> HarnessResult<Self> {
        let invalid = |reason: &str| HarnessError::InvalidSelector {
            selector: source.to_string(),
            reason: reason.to_string(),
        };
        if source.trim().is_empty() {
            return Err(invalid("selector is empty"));
        }
        let mut parser = Parser {
            chars: source.chars().collect(),
            pos: 0,
        };
        let alternatives = parser.parse_list().map_err(|reason| invalid(&reason))?;
        Ok(Self {
            source: source.to_string(),
            alternatives,
        })
    }

    /// Selector matching `[attribute="value"]`, optionally restricted to a tag
    #[must_use]
    pub fn attribute_equals(attribute: &str, value: &str, tag: Option<&str>) -> Self {
        let compound = Compound {
            tag: tag.map(str::to_string),
            attrs: vec![AttrCondition::Eq {
                key: attribute.to_string(),
                value: value.to_string(),
            }],
            ..Compound::default()
        };
        let source = format!("{}[{attribute}={value:?}]", tag.unwrap_or_default());
        Self {
            source,
            alternatives: vec![vec![Part {
                compound,
                combinator: None,
            }]],
        }
    }

    /// Original selector text
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.source
    }

    /// Check whether `node` matches any alternative of this selector
    #[must_use]
    pub fn matches(&self, tree: &dyn ComponentTree, node: NodeId, element: &ElementInfo) -> bool {
        self.alternatives.iter().any(|parts| {
            let last = parts.len() - 1;
            parts[last].compound.matches(element) && Self::matches_left(tree, node, parts, last)
        })
    }

    // `node` already matched `parts[index]`; check the parts left of it
    fn matches_left(tree: &dyn ComponentTree, node: NodeId, parts: &[Part], index: usize) -> bool {
        if index == 0 {
            return true;
        }
        let target = &parts[index - 1];
        let matches_at = |candidate: NodeId| {
            tree.element(candidate).is_some_and(|el| target.compound.matches(&el))
                && Self::matches_left(tree, candidate, parts, index - 1)
        };
        match parts[index].combinator {
            Some(Combinator::Child) => tree.parent(node).is_some_and(matches_at),
            Some(Combinator::Descendant) | None => {
                let mut ancestor = tree.parent(node);
                while let Some(candidate) = ancestor {
                    if matches_at(candidate) {
                        return true;
                    }
                    ancestor = tree.parent(candidate);
                }
                false
            }
        }
    }
}

impl std::fmt::Display for Selector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.source)
    }
}

impl std::str::FromStr for Selector {
    type Err = HarnessError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

struct Parser {
    chars: Vec<char>,
    pos: usize,
}

fn is_ident_char(c: char) -> bool {
    c.is_alphanumeric() || c == '-' || c == '_'
}

impl Parser {
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

    fn parse_list(&mut self) -> Result<Vec<Vec<Part>>, String> {
        let mut list = Vec::new();
        loop {
            self.skip_whitespace();
            list.push(self.parse_complex()?);
            match self.peek() {
                Some(',') => self.pos += 1,
                None => return Ok(list),
                Some(c) => return Err(format!("unexpected {c:?} at {}", self.pos)),
            }
        }
    }

    fn parse_complex(&mut self) -> Result<Vec<Part>, String> {
        let mut parts = vec![Part {
            compound: self.parse_compound()?,
            combinator: None,
        }];
        loop {
            let spaced = self.skip_whitespace();
            let combinator = match self.peek() {
                None | Some(',') => return Ok(parts),
                Some('>') => {
                    self.pos += 1;
                    self.skip_whitespace();
                    Combinator::Child
                }
                Some(_) if spaced => Combinator::Descendant,
                Some(c) => return Err(format!("unexpected {c:?} at {}", self.pos)),
            };
            parts.push(Part {
                compound: self.parse_compound()?,
                combinator: Some(combinator),
            });
        }
    }

    fn parse_compound(&mut self) -> Result<Compound, String> {
        let start = self.pos;
        let mut compound = Compound::default();
        if self.peek() == Some('*') {
            self.pos += 1;
        } else if self.peek().is_some_and(is_ident_char) {
            compound.tag = Some(self.parse_ident()?);
        }
        loop {
            match self.peek() {
                Some('#') => {
                    self.pos += 1;
                    compound.id = Some(self.parse_ident()?);
                }
                Some('.') => {
                    self.pos += 1;
                    compound.classes.push(self.parse_ident()?);
                }
                Some('[') => {
                    self.pos += 1;
                    compound.attrs.push(self.parse_attr()?);
                }
                _ => break,
            }
        }
        if self.pos == start {
            return Err(format!("expected a simple selector at {start}"));
        }
        Ok(compound)
    }

    fn parse_ident(&mut self) -> Result<String, String> {
        let start = self.pos;
        while self.peek().is_some_and(is_ident_char) {
            self.pos += 1;
        }
        if self.pos == start {
            return Err(format!("expected a name at {start}"));
        }
        Ok(self.chars[start..self.pos].iter().collect())
    }

    fn parse_attr(&mut self) -> Result<AttrCondition, String> {
        self.skip_whitespace();
        let key = self.parse_ident()?;
        self.skip_whitespace();
        let op = match self.peek() {
            Some(']') => {
                self.pos += 1;
                return Ok(AttrCondition::Exists { key });
            }
            Some('=') => {
                self.pos += 1;
                '='
            }
            Some(c @ ('^' | '$' | '*')) if self.chars.get(self.pos + 1) == Some(&'=') => {
                self.pos += 2;
                c
            }
            other => return Err(format!("unexpected {other:?} in attribute selector")),
        };
        self.skip_whitespace();
        let value = self.parse_attr_value()?;
        self.skip_whitespace();
        if self.peek() != Some(']') {
            return Err("unterminated attribute selector".to_string());
        }
        self.pos += 1;
        Ok(match op {
            '^' => AttrCondition::StartsWith { key, value },
            '$' => AttrCondition::EndsWith { key, value },
            '*' => AttrCondition::Contains { key, value },
            _ => AttrCondition::Eq { key, value },
        })
    }

    fn parse_attr_value(&mut self) -> Result<String, String> {
        match self.peek() {
            Some(quote @ ('"' | '\'')) => {
                self.pos += 1;
                let start = self.pos;
                while self.peek().is_some_and(|c| c != quote) {
                    self.pos += 1;
                }
                if self.peek().is_none() {
                    return Err("unterminated quoted value".to_string());
                }
                let value = self.chars[start..self.pos].iter().collect();
                self.pos += 1;
                Ok(value)
            }
            _ => self.parse_ident(),
        }
    }
}
