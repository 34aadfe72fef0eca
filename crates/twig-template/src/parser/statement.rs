/*
 * statement.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Statement grammar: text runs, `{{ }}` output and `{% %}` directives.

use super::{ParseResult, Parser};
use crate::ast::{
    Block, Content, Directive, Expression, ForNode, ForTarget, IfNode, IncludeDirective, Node,
    Output, SetNode, Text,
};
use crate::error::ParseErrorKind;
use crate::lexer::{CLOSE_CODE, CLOSE_FAST, OPEN_CODE, OPEN_FAST, is_letter_or_digit};

/// Clauses that end the current content and belong to an enclosing directive.
pub(crate) const CLOSING_CLAUSES: &[&str] = &["endblock", "endfor", "endif", "elseif", "else"];

impl<'a> Parser<'a> {
    /// Parse nodes until end of input or a closing clause.
    pub(crate) fn content(&mut self) -> ParseResult<Content> {
        let mut nodes = Vec::new();
        let mut text = String::new();

        while !self.cursor.is_eof() {
            if self.cursor.starts_with(OPEN_FAST) {
                flush_text(&mut nodes, &mut text);
                nodes.push(Node::Output(self.output()?));
            } else if self.cursor.starts_with(OPEN_CODE) {
                match self.peek_code_word() {
                    Some(word) if CLOSING_CLAUSES.contains(&word) => break,
                    Some("verbatim") => text.push_str(&self.verbatim()?),
                    _ => {
                        flush_text(&mut nodes, &mut text);
                        nodes.push(self.statement()?);
                    }
                }
            } else if !self.cursor.skip_comment() {
                if let Some(c) = self.cursor.bump() {
                    text.push(c);
                }
            }
        }

        flush_text(&mut nodes, &mut text);
        Ok(Content::new(nodes))
    }

    /// The word following `{%`, if the cursor is at a code opener.
    pub(crate) fn peek_code_word(&self) -> Option<&'a str> {
        let mut probe = self.cursor.clone();
        if !probe.eat(OPEN_CODE) {
            return None;
        }
        probe.skip_spacing();
        let rest = probe.rest();
        let len = rest
            .find(|c: char| !is_letter_or_digit(c))
            .unwrap_or(rest.len());
        (len > 0).then(|| &rest[..len])
    }

    fn statement(&mut self) -> ParseResult<Node> {
        let start = self.cursor.offset();
        match self.peek_code_word() {
            Some("block") => self.block().map(Node::Block),
            Some("include") => self.include().map(Node::Include),
            Some("for") => self.for_node().map(Node::For),
            Some("if") => self.if_node().map(Node::If),
            Some("set") => self.set().map(Node::Set),
            _ => {
                self.cursor.eat(OPEN_CODE);
                self.cursor.skip_spacing();
                Err(self.cursor.error(ParseErrorKind::UnknownExpression, start))
            }
        }
    }

    /// Consume `{% keyword` and the spacing after it.
    pub(crate) fn open_directive(&mut self, keyword: &'static str) -> ParseResult<()> {
        let start = self.cursor.offset();
        if self.cursor.eat(OPEN_CODE) {
            self.cursor.skip_spacing();
            if self.cursor.eat_keyword(keyword) {
                return Ok(());
            }
        }
        let err = self.cursor.error(ParseErrorKind::Expected(keyword), start);
        self.cursor.reset(start);
        Err(err)
    }

    /// Consume the `%}` ending a directive tag.
    pub(crate) fn close_code(&mut self, directive: Directive, start: usize) -> ParseResult<()> {
        self.cursor.skip_spacing();
        if self.cursor.eat(CLOSE_CODE) {
            Ok(())
        } else {
            Err(self
                .cursor
                .error(ParseErrorKind::MissingEndCode(directive), start))
        }
    }

    /// Consume `{% end<keyword> %}` or fail with `MissingEndClause`.
    fn end_clause(
        &mut self,
        keyword: &'static str,
        directive: Directive,
        start: usize,
    ) -> ParseResult<()> {
        if self.peek_code_word() != Some(keyword) {
            return Err(self
                .cursor
                .error(ParseErrorKind::MissingEndClause(directive), start));
        }
        self.open_directive(keyword)?;
        if directive == Directive::Block {
            // `{% endblock name %}`
            self.cursor.identifier();
        }
        self.close_code(directive, start)
    }

    fn output(&mut self) -> ParseResult<Output> {
        let start = self.cursor.offset();
        self.cursor.eat(OPEN_FAST);
        self.cursor.skip_spacing();
        let expression = self.required_expression()?;
        self.cursor.skip_spacing();
        if !self.cursor.eat(CLOSE_FAST) {
            return Err(self
                .cursor
                .error(ParseErrorKind::MissingEndCode(Directive::Output), start));
        }
        Ok(Output {
            expression,
            position: self.cursor.position_of(start),
        })
    }

    pub(crate) fn block(&mut self) -> ParseResult<Block> {
        let start = self.cursor.offset();
        self.open_directive("block")?;
        let name_offset = self.cursor.offset();
        let Some(name) = self.cursor.identifier() else {
            return Err(self
                .cursor
                .error(ParseErrorKind::Expected("block name"), start));
        };
        let name = name.to_string();
        self.close_code(Directive::Block, start)?;
        if !self.block_names.insert(name.clone()) {
            return Err(self.cursor.error_at(
                ParseErrorKind::DuplicateBlock(name),
                name_offset,
                start,
            ));
        }

        let content = self.content()?;
        self.end_clause("endblock", Directive::Block, start)?;
        Ok(Block {
            name,
            content,
            position: self.cursor.position_of(start),
        })
    }

    fn include(&mut self) -> ParseResult<IncludeDirective> {
        let start = self.cursor.offset();
        self.open_directive("include")?;
        let Some(name) = self.cursor.string_literal()? else {
            return Err(self
                .cursor
                .error(ParseErrorKind::Expected("template name"), start));
        };
        self.close_code(Directive::Include, start)?;
        Ok(IncludeDirective {
            name,
            position: self.cursor.position_of(start),
        })
    }

    fn for_node(&mut self) -> ParseResult<ForNode> {
        let start = self.cursor.offset();
        self.open_directive("for")?;

        let first = self.loop_variable(start)?;
        let target = if self.cursor.eat_free(",") {
            ForTarget::Pair(first, self.loop_variable(start)?)
        } else {
            ForTarget::Value(first)
        };
        if !self.cursor.eat_keyword("in") {
            return Err(self.cursor.error(ParseErrorKind::Expected("'in'"), start));
        }
        let iterable = self.required_expression()?;

        let mut filters = Vec::new();
        loop {
            let save = self.cursor.offset();
            if !(self.cursor.eat_free("|") && self.cursor.eat_keyword("filter")) {
                self.cursor.reset(save);
                break;
            }
            match self.function_reference()? {
                Some(filter) => filters.push(filter),
                None => {
                    return Err(self
                        .cursor
                        .error(ParseErrorKind::Expected("filter function"), start));
                }
            }
        }
        self.close_code(Directive::For, start)?;

        let body = self.content()?;
        self.end_clause("endfor", Directive::For, start)?;
        Ok(ForNode {
            target,
            iterable,
            filters,
            body,
            position: self.cursor.position_of(start),
        })
    }

    fn loop_variable(&mut self, start: usize) -> ParseResult<String> {
        match self.cursor.identifier() {
            Some(name) => {
                self.cursor.skip_spacing();
                Ok(name.to_string())
            }
            None => Err(self
                .cursor
                .error(ParseErrorKind::Expected("loop variable"), start)),
        }
    }

    fn if_node(&mut self) -> ParseResult<IfNode> {
        let start = self.cursor.offset();
        self.open_directive("if")?;
        let condition = self.required_expression()?;
        self.close_code(Directive::If, start)?;

        let mut branches = vec![(condition, self.content()?)];
        let mut else_branch = None;
        loop {
            match self.peek_code_word() {
                Some("elseif") if else_branch.is_none() => {
                    self.open_directive("elseif")?;
                    let condition = self.required_expression()?;
                    self.close_code(Directive::If, start)?;
                    branches.push((condition, self.content()?));
                }
                Some("else") if else_branch.is_none() => {
                    self.open_directive("else")?;
                    self.close_code(Directive::If, start)?;
                    else_branch = Some(self.content()?);
                }
                _ => break,
            }
        }
        self.end_clause("endif", Directive::If, start)?;

        Ok(IfNode {
            branches,
            else_branch,
            position: self.cursor.position_of(start),
        })
    }

    fn set(&mut self) -> ParseResult<SetNode> {
        let start = self.cursor.offset();
        self.open_directive("set")?;
        let Some(name) = self.cursor.identifier() else {
            return Err(self
                .cursor
                .error(ParseErrorKind::Expected("variable name"), start));
        };
        let name = name.to_string();
        self.cursor.skip_spacing();
        if !self.cursor.eat_free("=") {
            return Err(self.cursor.error(ParseErrorKind::Expected("'='"), start));
        }
        let assignment: Expression = self.required_expression()?;
        self.close_code(Directive::Set, start)?;
        Ok(SetNode {
            name,
            assignment,
            position: self.cursor.position_of(start),
        })
    }

    /// `{% verbatim %}raw{% endverbatim %}`, returning the raw body.
    fn verbatim(&mut self) -> ParseResult<String> {
        let start = self.cursor.offset();
        self.open_directive("verbatim")?;
        self.close_code(Directive::Verbatim, start)?;

        let source = self.cursor.source();
        let body_start = self.cursor.offset();
        let mut search = body_start;
        while let Some(found) = source[search..].find(OPEN_CODE) {
            let at = search + found;
            self.cursor.reset(at);
            if self.peek_code_word() == Some("endverbatim") {
                self.open_directive("endverbatim")?;
                self.close_code(Directive::Verbatim, start)?;
                return Ok(source[body_start..at].to_string());
            }
            search = at + OPEN_CODE.len();
        }

        self.cursor.reset(source.len());
        Err(self
            .cursor
            .error(ParseErrorKind::MissingEndClause(Directive::Verbatim), start))
    }
}

fn flush_text(nodes: &mut Vec<Node>, text: &mut String) {
    if !text.is_empty() {
        nodes.push(Node::Text(Text {
            text: std::mem::take(text),
        }));
    }
}
