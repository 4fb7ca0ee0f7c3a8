//! Recursive-descent parser for C++-template-like signatures.
//!
//! The same grammar covers raw type signatures (`Out<SharedPointer<IFoo>>`)
//! and annotation signatures (`Buffer<2,5,0x100>`):
//!
//! ```text
//! list    := single (',' single)*
//! single  := NAME ('<' list '>')? (' ' TRAILER)?
//! NAME    := run of characters excluding '<' ',' '>' ' '
//! TRAILER := run of characters excluding '<' ',' '>'
//! ```
//!
//! A trailing `const&` is dropped from names and trailers. End of input
//! terminates the current token; an unclosed `<` is an error.

use std::fmt;
use std::iter::Peekable;
use std::str::CharIndices;

use serde::Serialize;

use crate::error::ParseError;

const BY_REF_MARKER: &str = "const&";

/// One parsed signature element.
///
/// # Examples
///
/// ```
/// use ipc_schema_core::parse_signature_list;
///
/// let list = parse_signature_list("Out<SharedPointer<IFoo>> const&, u32").unwrap();
/// assert_eq!(list.len(), 2);
/// assert_eq!(list[0].before, "Out");
/// assert_eq!(list[0].to_string(), "Out<SharedPointer<IFoo>>");
/// assert_eq!(list[1].to_string(), "u32");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SyntaxNode {
    /// Leading name (the tag of generic signatures).
    pub before: String,
    /// Generic arguments, present only when `<...>` was parsed.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub inside: Option<Vec<SyntaxNode>>,
    /// Trailing qualifier with any by-reference marker removed.
    #[serde(skip_serializing_if = "String::is_empty")]
    pub after: String,
}

impl SyntaxNode {
    /// Builds a node, dropping by-reference markers from name and trailer.
    pub fn new(before: &str, inside: Option<Vec<SyntaxNode>>, after: &str) -> Self {
        Self {
            before: strip_by_ref(before).to_string(),
            inside,
            after: strip_by_ref(after).to_string(),
        }
    }

    /// A bare name with no generics and no trailer.
    pub fn name(name: &str) -> Self {
        Self::new(name, None, "")
    }

    /// Returns `true` if the node is just a name.
    pub fn is_bare(&self) -> bool {
        self.inside.is_none() && self.after.is_empty()
    }

    /// Returns the `index`-th generic argument.
    pub fn arg(&self, index: usize) -> Option<&SyntaxNode> {
        self.inside.as_ref().and_then(|inside| inside.get(index))
    }

    /// Number of generic arguments (zero when no `<...>` was parsed).
    pub fn arity(&self) -> usize {
        self.inside.as_ref().map_or(0, Vec::len)
    }
}

impl fmt::Display for SyntaxNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.before)?;
        if let Some(inside) = &self.inside {
            f.write_str("<")?;
            for (i, node) in inside.iter().enumerate() {
                if i > 0 {
                    f.write_str(", ")?;
                }
                write!(f, "{node}")?;
            }
            f.write_str(">")?;
        }
        if !self.after.is_empty() {
            write!(f, " {}", self.after)?;
        }
        Ok(())
    }
}

/// Result of [`parse_signature`]: either a full tree or, when structure was
/// not forced, a bare name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Signature {
    Name(String),
    Node(SyntaxNode),
}

impl Signature {
    /// Converts into a tree, wrapping bare names.
    pub fn into_node(self) -> SyntaxNode {
        match self {
            Self::Name(name) => SyntaxNode::name(&name),
            Self::Node(node) => node,
        }
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name(name) => f.write_str(name),
            Self::Node(node) => write!(f, "{node}"),
        }
    }
}

/// Parses a comma-separated signature list.
///
/// An empty (or all-space) input yields an empty list.
pub fn parse_signature_list(input: &str) -> Result<Vec<SyntaxNode>, ParseError> {
    let mut cursor = Cursor::new(input);
    let list = cursor.parse_list()?;
    match cursor.peek() {
        None => Ok(list),
        Some(ch) => Err(cursor.error(format!("unexpected '{ch}' after signature list"))),
    }
}

/// Parses a single signature.
///
/// With `force_structured == false`, a leaf without generics or trailer is
/// returned as [`Signature::Name`].
///
/// # Examples
///
/// ```
/// use ipc_schema_core::{Signature, parse_signature};
///
/// assert_eq!(
///     parse_signature("nn::Uid const&", false).unwrap(),
///     Signature::Name("nn::Uid".into())
/// );
/// assert!(matches!(parse_signature("Out<u32>", false).unwrap(), Signature::Node(_)));
/// ```
pub fn parse_signature(input: &str, force_structured: bool) -> Result<Signature, ParseError> {
    let mut cursor = Cursor::new(input);
    cursor.skip_spaces();
    let node = cursor.parse_single()?;
    if let Some(ch) = cursor.peek() {
        return Err(cursor.error(format!("unexpected '{ch}' after signature")));
    }
    if !force_structured && node.is_bare() {
        Ok(Signature::Name(node.before))
    } else {
        Ok(Signature::Node(node))
    }
}

fn strip_by_ref(token: &str) -> &str {
    let token = token.trim_end();
    match token.strip_suffix(BY_REF_MARKER) {
        Some(rest) => rest.trim_end_matches(' '),
        None => token,
    }
}

struct Cursor<'a> {
    input: &'a str,
    chars: Peekable<CharIndices<'a>>,
}

impl<'a> Cursor<'a> {
    fn new(input: &'a str) -> Self {
        Self {
            input,
            chars: input.char_indices().peekable(),
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().map(|&(_, ch)| ch)
    }

    fn offset(&mut self) -> usize {
        self.chars
            .peek()
            .map_or(self.input.len(), |&(offset, _)| offset)
    }

    fn bump(&mut self) {
        self.chars.next();
    }

    fn error(&mut self, message: String) -> ParseError {
        ParseError {
            input: self.input.to_string(),
            offset: self.offset(),
            message,
        }
    }

    fn skip_spaces(&mut self) {
        while self.peek() == Some(' ') {
            self.bump();
        }
    }

    fn take_while(&mut self, stop: &[char]) -> &'a str {
        let start = self.offset();
        while let Some(ch) = self.peek() {
            if stop.contains(&ch) {
                break;
            }
            self.bump();
        }
        let end = self.offset();
        let input = self.input;
        &input[start..end]
    }

    fn parse_list(&mut self) -> Result<Vec<SyntaxNode>, ParseError> {
        let mut list = Vec::new();
        loop {
            self.skip_spaces();
            if self.peek().is_none() {
                // A list cut off after a comma still ends with an (empty) element.
                if !list.is_empty() {
                    list.push(SyntaxNode::name(""));
                }
                return Ok(list);
            }
            list.push(self.parse_single()?);
            match self.peek() {
                Some(',') => self.bump(),
                Some('>') | None => return Ok(list),
                Some(ch) => return Err(self.error(format!("unexpected '{ch}' in list"))),
            }
        }
    }

    fn parse_single(&mut self) -> Result<SyntaxNode, ParseError> {
        let before = self.take_while(&['<', ',', '>', ' ']);
        let mut inside = None;
        match self.peek() {
            Some('<') => {
                self.bump();
                inside = Some(self.parse_list()?);
                match self.peek() {
                    Some('>') => self.bump(),
                    None => return Err(self.error(format!("unterminated generic '{before}<'"))),
                    Some(ch) => return Err(self.error(format!("expected '>', found '{ch}'"))),
                }
            }
            Some(' ') => {}
            _ => return Ok(SyntaxNode::new(before, None, "")),
        }
        self.skip_spaces();
        let after = self.take_while(&['<', ',', '>']);
        Ok(SyntaxNode::new(before, inside, after))
    }
}
