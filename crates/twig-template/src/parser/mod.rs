/*
 * mod.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template parser.
//!
//! Turns template text into a [`Document`]. The grammar is a hand-written
//! backtracking recursive descent over a [`Cursor`]:
//!
//! - [`statement`] parses text runs, output tags and directives into [`Content`]
//! - [`expression`] parses the expression sub-language
//! - this module decides between a root and an extending document
//!
//! [`Content`]: crate::ast::Content

mod expression;
mod statement;

use crate::ast::{Directive, Document, ExtendingDocument, ExtendsDirective, Expression, RootDocument};
use crate::error::{ParseError, ParseErrorKind};
use crate::lexer::Cursor;
use std::collections::HashSet;

pub(crate) type ParseResult<T> = Result<T, ParseError>;

/// Parser state for one template source.
pub(crate) struct Parser<'a> {
    pub(crate) cursor: Cursor<'a>,
    /// Block names seen so far; names must be unique per document.
    pub(crate) block_names: HashSet<String>,
}

impl<'a> Parser<'a> {
    pub(crate) fn new(source: &'a str) -> Self {
        Self {
            cursor: Cursor::new(source),
            block_names: HashSet::new(),
        }
    }

    fn document(mut self) -> ParseResult<Document> {
        let mut probe = self.cursor.clone();
        probe.skip_spacing();
        let saved = self.cursor.offset();
        self.cursor.reset(probe.offset());
        if self.peek_code_word() == Some("extends") {
            return self.extending_document().map(Document::Extending);
        }
        self.cursor.reset(saved);
        self.root_document().map(Document::Root)
    }

    fn root_document(&mut self) -> ParseResult<RootDocument> {
        let content = self.content()?;
        if !self.cursor.is_eof() {
            let start = self.cursor.offset();
            let keyword = self.peek_code_word().unwrap_or_default().to_string();
            self.cursor.eat(crate::lexer::OPEN_CODE);
            self.cursor.skip_spacing();
            return Err(self
                .cursor
                .error(ParseErrorKind::UnexpectedClause(keyword), start));
        }
        Ok(RootDocument { content })
    }

    fn extending_document(&mut self) -> ParseResult<ExtendingDocument> {
        let start = self.cursor.offset();
        self.open_directive("extends")?;
        let Some(name) = self.cursor.string_literal()? else {
            return Err(self
                .cursor
                .error(ParseErrorKind::Expected("template name"), start));
        };
        self.close_code(Directive::Extends, start)?;
        let extends = ExtendsDirective {
            name,
            position: self.cursor.position_of(start),
        };

        let mut blocks = Vec::new();
        loop {
            self.cursor.skip_spacing();
            if self.cursor.is_eof() {
                break;
            }
            if self.peek_code_word() != Some("block") {
                return Err(self.only_blocks_error());
            }
            blocks.push(self.block()?);
        }

        Ok(ExtendingDocument { extends, blocks })
    }

    /// `ExtendMayOnlyBlocks` quoting the offending line.
    fn only_blocks_error(&self) -> ParseError {
        let rest = self.cursor.rest();
        let line = rest.lines().next().unwrap_or_default();
        ParseError {
            kind: ParseErrorKind::ExtendMayOnlyBlocks,
            position: self.cursor.position_of(self.cursor.offset()),
            snippet: line.chars().take(40).collect(),
        }
    }
}

impl Document {
    /// Parse template text.
    ///
    /// A template whose first directive (after whitespace and comments) is
    /// `{% extends "name" %}` becomes an [`Document::Extending`] and may contain
    /// nothing but `block` directives afterwards. Anything else is a
    /// [`Document::Root`] whose content starts at the very first character.
    pub fn parse(source: &str) -> Result<Document, ParseError> {
        let document = Parser::new(source).document()?;
        tracing::trace!(
            extending = matches!(document, Document::Extending(_)),
            "Parsed template"
        );
        Ok(document)
    }
}

/// Parse a standalone expression such as `user.name | upper`.
pub fn parse_expression(source: &str) -> Result<Expression, ParseError> {
    let mut parser = Parser::new(source);
    parser.cursor.skip_spacing();
    let start = parser.cursor.offset();
    let expression = parser.required_expression()?;
    if !parser.cursor.is_eof() {
        return Err(parser
            .cursor
            .error(ParseErrorKind::Expected("end of expression"), start));
    }
    Ok(expression)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_extending_document() {
        let source = "{# child #}\n{% extends \"base\" %}\n{% block a %}A{% endblock %}\n{% block b %}B{% endblock b %}\n";
        let Document::Extending(doc) = Document::parse(source).unwrap() else {
            panic!("expected an extending document");
        };
        assert_eq!(doc.extends.name, "base");
        assert_eq!(doc.extends.position.line, 2);
        let names: Vec<&str> = doc.blocks.iter().map(|b| b.name.as_str()).collect();
        assert_eq!(names, vec!["a", "b"]);
    }

    #[test]
    fn test_extends_with_stray_text() {
        let err = Document::parse("{% extends \"base\" %}stray{% block a %}{% endblock %}")
            .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExtendMayOnlyBlocks);
        assert!(err.snippet.starts_with("stray"));
    }

    #[test]
    fn test_extends_with_output() {
        let err = Document::parse("{% extends \"base\" %}{{ x }}").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExtendMayOnlyBlocks);
    }

    #[test]
    fn test_duplicate_block_override() {
        let err = Document::parse(
            "{% extends \"base\" %}{% block a %}1{% endblock %}{% block a %}2{% endblock %}",
        )
        .unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::DuplicateBlock("a".to_string()));
    }

    #[test]
    fn test_root_keeps_leading_whitespace() {
        let Document::Root(root) = Document::parse("\n  hello").unwrap() else {
            panic!("expected a root document");
        };
        let Node::Text(text) = &root.content.nodes()[0] else {
            panic!("expected text");
        };
        assert_eq!(text.text, "\n  hello");
    }

    #[test]
    fn test_extends_later_in_file_is_unknown() {
        let err = Document::parse("text {% extends \"base\" %}").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::UnknownExpression);
    }

    #[test]
    fn test_parse_expression_rejects_trailing_input() {
        let err = parse_expression("1 + 2 )").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Expected("end of expression"));
    }

    #[test]
    fn test_empty_template() {
        let Document::Root(root) = Document::parse("").unwrap() else {
            panic!("expected a root document");
        };
        assert!(root.content.is_empty());
    }
}
