//! Parse-location tree - (line, column) of every field occurrence
//!
//! The C++ text-format parser hands indexers a `ParseInfoTree`; the Rust
//! text-format library parses values but exposes no locations, so this
//! module recovers them with a token scanner over the same grammar surface:
//! `key: value` fields, `{}`/`<>` message values (colon optional), `[a, b]`
//! list values, `[fully.qualified.name]` extension keys, quoted strings with
//! escapes and adjacent concatenation, and `#` comments.
//!
//! The scanner runs only on input the schema-aware parser has already
//! accepted, so its own failures indicate an indexer defect rather than bad
//! user input. Coordinates are 0-indexed (line and character column), the
//! same convention the C++ parser reports; extension occurrences are located
//! at the qualified name inside the brackets.

use crate::{Error, Result};
use std::collections::HashMap;

/// Location of one field occurrence, 0-indexed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ParseLocation {
    pub line: u32,
    pub column: u32,
}

/// Per-message map from field key to occurrence locations and nested trees.
///
/// The key is the field name as written in the input; for extensions it is
/// the fully-qualified name that appeared between the brackets.
#[derive(Debug, Default)]
pub struct ParseInfoTree {
    locations: HashMap<String, Vec<ParseLocation>>,
    children: HashMap<(String, usize), ParseInfoTree>,
}

impl ParseInfoTree {
    /// Build the location tree for a full textproto buffer.
    pub fn parse(text: &str) -> Result<Self> {
        let mut scanner = Scanner::new(text);
        let mut root = ParseInfoTree::default();
        scanner.parse_body(&mut root, None)?;
        Ok(root)
    }

    /// Location of the `index`-th occurrence of a field; `None` index means
    /// the first (singular) occurrence. `None` result means the field is
    /// absent from the input.
    pub fn location(&self, field: &str, index: Option<usize>) -> Option<ParseLocation> {
        self.locations
            .get(field)
            .and_then(|occurrences| occurrences.get(index.unwrap_or(0)))
            .copied()
    }

    /// Number of occurrences recorded for a field.
    pub fn occurrence_count(&self, field: &str) -> usize {
        self.locations.get(field).map_or(0, Vec::len)
    }

    /// Nested tree for the `index`-th occurrence of a message-typed field.
    pub fn child(&self, field: &str, index: usize) -> Option<&ParseInfoTree> {
        self.children.get(&(field.to_string(), index))
    }

    fn record(&mut self, key: &str, location: ParseLocation) -> usize {
        let occurrences = self.locations.entry(key.to_string()).or_default();
        occurrences.push(location);
        occurrences.len() - 1
    }
}

struct Scanner<'a> {
    chars: std::iter::Peekable<std::str::Chars<'a>>,
    line: u32,
    column: u32,
}

impl<'a> Scanner<'a> {
    fn new(text: &'a str) -> Self {
        Self {
            chars: text.chars().peekable(),
            line: 0,
            column: 0,
        }
    }

    fn here(&self) -> ParseLocation {
        ParseLocation {
            line: self.line,
            column: self.column,
        }
    }

    fn peek(&mut self) -> Option<char> {
        self.chars.peek().copied()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.chars.next()?;
        if c == '\n' {
            self.line += 1;
            self.column = 0;
        } else {
            self.column += 1;
        }
        Some(c)
    }

    fn error(&self, message: impl Into<String>) -> Error {
        Error::Parse(format!(
            "{} at line {}, column {}",
            message.into(),
            self.line + 1,
            self.column
        ))
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c.is_whitespace() {
                self.bump();
            } else if c == '#' {
                while let Some(c) = self.bump() {
                    if c == '\n' {
                        break;
                    }
                }
            } else {
                break;
            }
        }
    }

    // Parses fields until `terminator` (or end of input for the root).
    fn parse_body(&mut self, tree: &mut ParseInfoTree, terminator: Option<char>) -> Result<()> {
        loop {
            self.skip_trivia();
            match (self.peek(), terminator) {
                (None, None) => return Ok(()),
                (None, Some(t)) => return Err(self.error(format!("expected {:?}", t))),
                (Some(c), Some(t)) if c == t => {
                    self.bump();
                    return Ok(());
                }
                (Some(_), _) => self.parse_field(tree)?,
            }
        }
    }

    fn parse_field(&mut self, tree: &mut ParseInfoTree) -> Result<()> {
        let (key, location) = self.parse_key()?;

        self.skip_trivia();
        let has_colon = self.peek() == Some(':');
        if has_colon {
            self.bump();
            self.skip_trivia();
        }

        match self.peek() {
            Some('[') if has_colon => {
                // Short-form repeated value: one occurrence per element.
                self.bump();
                self.skip_trivia();
                if self.peek() == Some(']') {
                    self.bump();
                } else {
                    loop {
                        let index = tree.record(&key, location);
                        self.parse_value(tree, &key, index)?;
                        self.skip_trivia();
                        match self.bump() {
                            Some(',') => self.skip_trivia(),
                            Some(']') => break,
                            _ => return Err(self.error("expected ',' or ']' in list")),
                        }
                    }
                }
            }
            Some('{') | Some('<') => {
                let index = tree.record(&key, location);
                self.parse_value(tree, &key, index)?;
            }
            Some(_) if has_colon => {
                let index = tree.record(&key, location);
                self.parse_value(tree, &key, index)?;
            }
            _ => return Err(self.error(format!("expected value for field {:?}", key))),
        }

        // Optional separator between fields.
        self.skip_trivia();
        if matches!(self.peek(), Some(',') | Some(';')) {
            self.bump();
        }
        Ok(())
    }

    // A plain identifier, or `[fully.qualified/name]` for extensions and
    // Any type URLs. Whitespace padding inside the brackets is legal; the
    // recorded key is the trimmed inner text, located at the name itself.
    fn parse_key(&mut self) -> Result<(String, ParseLocation)> {
        if self.peek() == Some('[') {
            self.bump();
            self.skip_whitespace();

            let location = self.here();
            let mut name = String::new();
            while let Some(c) = self.peek() {
                if c.is_whitespace() || c == ']' {
                    break;
                }
                name.push(c);
                self.bump();
            }

            self.skip_whitespace();
            if self.bump() != Some(']') {
                return Err(self.error("unterminated extension name"));
            }
            if name.is_empty() {
                return Err(self.error("empty extension name"));
            }
            return Ok((name, location));
        }

        let location = self.here();
        let mut name = String::new();
        while let Some(c) = self.peek() {
            if c.is_ascii_alphanumeric() || c == '_' {
                name.push(c);
                self.bump();
            } else {
                break;
            }
        }
        if name.is_empty() {
            return Err(self.error("expected field name"));
        }
        Ok((name, location))
    }

    fn skip_whitespace(&mut self) {
        while matches!(self.peek(), Some(c) if c.is_whitespace()) {
            self.bump();
        }
    }

    fn parse_value(&mut self, tree: &mut ParseInfoTree, key: &str, index: usize) -> Result<()> {
        match self.peek() {
            Some(open @ ('{' | '<')) => {
                self.bump();
                let close = if open == '{' { '}' } else { '>' };
                let mut child = ParseInfoTree::default();
                self.parse_body(&mut child, Some(close))?;
                tree.children.insert((key.to_string(), index), child);
                Ok(())
            }
            Some('"') | Some('\'') => {
                self.parse_string()?;
                // Adjacent string literals concatenate into one value.
                loop {
                    self.skip_trivia();
                    if matches!(self.peek(), Some('"') | Some('\'')) {
                        self.parse_string()?;
                    } else {
                        return Ok(());
                    }
                }
            }
            Some(_) => self.parse_scalar_token(),
            None => Err(self.error("expected value")),
        }
    }

    fn parse_string(&mut self) -> Result<()> {
        let quote = self.bump().ok_or_else(|| self.error("expected string"))?;
        loop {
            match self.bump() {
                Some('\\') => {
                    self.bump();
                }
                Some(c) if c == quote => return Ok(()),
                Some('\n') | None => return Err(self.error("unterminated string")),
                Some(_) => {}
            }
        }
    }

    fn parse_scalar_token(&mut self) -> Result<()> {
        let mut any = false;
        while let Some(c) = self.peek() {
            if c.is_whitespace() || matches!(c, ',' | ';' | ']' | '}' | '>' | '#') {
                break;
            }
            any = true;
            self.bump();
        }
        if any {
            Ok(())
        } else {
            Err(self.error("expected scalar value"))
        }
    }
}
