/*
 * lexer.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Character-level rules shared by the statement and expression grammars.
//!
//! The [`Cursor`] is a backtracking scanner over the template source. Grammar
//! rules save the current offset, try to match, and restore the offset on
//! failure. Whitespace and `{# ... #}` comments are skipped with
//! [`Cursor::skip_spacing`].

use crate::ast::Position;
use crate::error::{ParseError, ParseErrorKind};

pub const OPEN_CODE: &str = "{%";
pub const CLOSE_CODE: &str = "%}";
pub const OPEN_FAST: &str = "{{";
pub const CLOSE_FAST: &str = "}}";
pub const OPEN_COMMENT: &str = "{#";
pub const CLOSE_COMMENT: &str = "#}";

/// Reserved words, never accepted as identifiers.
pub const KEYWORDS: &[&str] = &[
    "if",
    "elseif",
    "else",
    "endif",
    "for",
    "in",
    "endfor",
    "block",
    "endblock",
    "extends",
    "include",
    "set",
    "verbatim",
    "endverbatim",
    "filter",
    "true",
    "false",
    "null",
    "and",
    "or",
    "not",
    "matches",
    "startsWith",
    "endsWith",
];

pub fn is_letter(c: char) -> bool {
    c.is_ascii_alphabetic() || c == '_' || c == '$'
}

pub fn is_letter_or_digit(c: char) -> bool {
    is_letter(c) || c.is_ascii_digit()
}

pub fn is_keyword(word: &str) -> bool {
    KEYWORDS.contains(&word)
}

fn is_whitespace(c: char) -> bool {
    matches!(c, ' ' | '\t' | '\r' | '\n' | '\x0c')
}

/// Backtracking scanner over template source.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    source: &'a str,
    offset: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(source: &'a str) -> Self {
        Self { source, offset: 0 }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    pub fn reset(&mut self, offset: usize) {
        self.offset = offset;
    }

    pub fn rest(&self) -> &'a str {
        let source = self.source;
        &source[self.offset..]
    }

    pub fn is_eof(&self) -> bool {
        self.offset >= self.source.len()
    }

    pub fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    pub fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8();
        Some(c)
    }

    pub fn starts_with(&self, text: &str) -> bool {
        self.rest().starts_with(text)
    }

    /// Consume `text` if it comes next.
    pub fn eat(&mut self, text: &str) -> bool {
        if self.starts_with(text) {
            self.offset += text.len();
            true
        } else {
            false
        }
    }

    /// Consume `text` followed by optional spacing.
    pub fn eat_free(&mut self, text: &str) -> bool {
        if self.eat(text) {
            self.skip_spacing();
            true
        } else {
            false
        }
    }

    /// Consume a keyword (not followed by an identifier character) and the
    /// spacing after it.
    pub fn eat_keyword(&mut self, keyword: &str) -> bool {
        if self.peek_keyword(keyword) {
            self.offset += keyword.len();
            self.skip_spacing();
            true
        } else {
            false
        }
    }

    /// Check for a keyword without consuming it.
    pub fn peek_keyword(&self, keyword: &str) -> bool {
        self.starts_with(keyword)
            && !self.rest()[keyword.len()..]
                .chars()
                .next()
                .is_some_and(is_letter_or_digit)
    }

    /// Skip whitespace and `{# ... #}` comments. An unterminated comment is
    /// left in place.
    pub fn skip_spacing(&mut self) {
        loop {
            let before = self.offset;
            while self.peek().is_some_and(is_whitespace) {
                self.bump();
            }
            self.skip_comment();
            if self.offset == before {
                break;
            }
        }
    }

    /// Skip one `{# ... #}` comment if one starts here.
    pub fn skip_comment(&mut self) -> bool {
        if !self.starts_with(OPEN_COMMENT) {
            return false;
        }
        let body = &self.rest()[OPEN_COMMENT.len()..];
        match body.find(CLOSE_COMMENT) {
            Some(end) => {
                self.offset += OPEN_COMMENT.len() + end + CLOSE_COMMENT.len();
                true
            }
            None => false,
        }
    }

    /// Scan an identifier that is not a keyword.
    pub fn identifier(&mut self) -> Option<&'a str> {
        let start = self.offset;
        let rest = self.rest();
        if !rest.chars().next().is_some_and(is_letter) {
            return None;
        }
        let len = rest
            .find(|c: char| !is_letter_or_digit(c))
            .unwrap_or(rest.len());
        let word = &rest[..len];
        if is_keyword(word) {
            return None;
        }
        self.offset = start + len;
        Some(word)
    }

    /// Scan `-?[0-9]+` as an integer.
    pub fn integer(&mut self) -> Option<i64> {
        let start = self.offset;
        let digits = self.signed_digits()?;
        match digits.parse() {
            Ok(n) => Some(n),
            Err(_) => {
                self.offset = start;
                None
            }
        }
    }

    /// Scan `-?[0-9]+\.[0-9]+` as a double.
    pub fn double(&mut self) -> Option<f64> {
        let start = self.offset;
        self.signed_digits()?;
        if !self.eat(".") || self.digits().is_none() {
            self.offset = start;
            return None;
        }
        match self.source[start..self.offset].parse() {
            Ok(n) => Some(n),
            Err(_) => {
                self.offset = start;
                None
            }
        }
    }

    fn signed_digits(&mut self) -> Option<&'a str> {
        let source = self.source;
        let start = self.offset;
        self.eat("-");
        if self.digits().is_none() {
            self.offset = start;
            return None;
        }
        Some(&source[start..self.offset])
    }

    fn digits(&mut self) -> Option<&'a str> {
        let source = self.source;
        let start = self.offset;
        while self.peek().is_some_and(|c| c.is_ascii_digit()) {
            self.bump();
        }
        if self.offset > start {
            Some(&source[start..self.offset])
        } else {
            None
        }
    }

    /// Scan `'x'` where `x` is a single ASCII letter (character range bound).
    pub fn char_literal(&mut self) -> Option<char> {
        let mut chars = self.rest().chars();
        match (chars.next(), chars.next(), chars.next()) {
            (Some('\''), Some(c), Some('\'')) if c.is_ascii_alphabetic() => {
                self.offset += 3;
                Some(c)
            }
            _ => None,
        }
    }

    /// Scan a `"..."` or `'...'` string literal, decoding escapes.
    ///
    /// Returns `Ok(None)` when no quote starts here.
    pub fn string_literal(&mut self) -> Result<Option<String>, ParseError> {
        let start = self.offset;
        let quote = match self.peek() {
            Some(q @ ('"' | '\'')) => q,
            _ => return Ok(None),
        };
        self.bump();
        let mut value = String::new();
        loop {
            match self.peek() {
                Some(c) if c == quote => {
                    self.bump();
                    return Ok(Some(value));
                }
                Some('\\') => {
                    let escape_start = self.offset;
                    match decode_escape(&self.rest()[1..]) {
                        Some((decoded, len)) => {
                            value.push(decoded);
                            self.offset += 1 + len;
                        }
                        None => {
                            return Err(self.error_at(
                                ParseErrorKind::InvalidEscape,
                                escape_start,
                                start,
                            ));
                        }
                    }
                }
                None | Some('\r' | '\n') => {
                    return Err(self.error_at(
                        ParseErrorKind::UnterminatedString,
                        self.offset,
                        start,
                    ));
                }
                Some(c) => {
                    value.push(c);
                    self.bump();
                }
            }
        }
    }

    /// Build an error at `offset`, quoting the source from `snippet_start`.
    pub fn error_at(&self, kind: ParseErrorKind, offset: usize, snippet_start: usize) -> ParseError {
        let offset = offset.min(self.source.len());
        let snippet_start = snippet_start.min(offset);
        ParseError {
            kind,
            position: Position::from_offset(self.source, offset),
            snippet: self.source[snippet_start..offset].to_string(),
        }
    }

    /// Build an error at the current offset.
    pub fn error(&self, kind: ParseErrorKind, snippet_start: usize) -> ParseError {
        self.error_at(kind, self.offset, snippet_start)
    }

    pub fn position_of(&self, offset: usize) -> Position {
        Position::from_offset(self.source, offset)
    }
}

/// Decode one escape sequence; `input` starts after the backslash.
///
/// Returns the decoded character and the number of bytes consumed.
pub fn decode_escape(input: &str) -> Option<(char, usize)> {
    let bytes = input.as_bytes();
    let first = *bytes.first()?;
    let simple = match first {
        b'b' => Some('\u{8}'),
        b't' => Some('\t'),
        b'n' => Some('\n'),
        b'f' => Some('\u{c}'),
        b'r' => Some('\r'),
        b'"' => Some('"'),
        b'\'' => Some('\''),
        b'\\' => Some('\\'),
        _ => None,
    };
    if let Some(c) = simple {
        return Some((c, 1));
    }

    if (b'0'..=b'7').contains(&first) {
        let is_octal = |i: usize| bytes.get(i).is_some_and(|b| (b'0'..=b'7').contains(b));
        let len = if first <= b'3' && is_octal(1) && is_octal(2) {
            3
        } else if is_octal(1) {
            2
        } else {
            1
        };
        let code = u32::from_str_radix(&input[..len], 8).ok()?;
        return char::from_u32(code).map(|c| (c, len));
    }

    if first == b'u' {
        let u_count = bytes.iter().take_while(|b| **b == b'u').count();
        let hex = input.get(u_count..u_count + 4)?;
        if !hex.bytes().all(|b| b.is_ascii_hexdigit()) {
            return None;
        }
        let code = u32::from_str_radix(hex, 16).ok()?;
        return char::from_u32(code).map(|c| (c, u_count + 4));
    }

    None
}
