/*
 * ast.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template AST types.
//!
//! This module defines the abstract syntax tree for parsed templates: the
//! two document shapes, the statement nodes that make up [`Content`], and the
//! expression sub-language. Statement nodes carry the [`Position`] of their
//! opening delimiter for error reporting.

use std::fmt;

/// A location in the template source.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Position {
    /// Byte offset into the source.
    pub offset: usize,
    /// 1-based line number.
    pub line: usize,
    /// 1-based column, counted in characters.
    pub column: usize,
}

impl Position {
    /// Compute the line and column of a byte offset.
    pub fn from_offset(source: &str, offset: usize) -> Self {
        let mut offset = offset.min(source.len());
        while !source.is_char_boundary(offset) {
            offset -= 1;
        }
        let before = &source[..offset];
        let line = before.matches('\n').count() + 1;
        let line_start = before.rfind('\n').map_or(0, |i| i + 1);
        let column = before[line_start..].chars().count() + 1;
        Self {
            offset,
            line,
            column,
        }
    }
}

/// The kind of directive a node or error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Directive {
    /// Inline output `{{ ... }}`.
    Output,
    If,
    For,
    Set,
    Block,
    Include,
    Extends,
    Verbatim,
}

impl fmt::Display for Directive {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Directive::Output => "{{",
            Directive::If => "if",
            Directive::For => "for",
            Directive::Set => "set",
            Directive::Block => "block",
            Directive::Include => "include",
            Directive::Extends => "extends",
            Directive::Verbatim => "verbatim",
        };
        f.write_str(name)
    }
}

/// A parsed template: either plain content or an `extends` with overrides.
#[derive(Debug, Clone, PartialEq)]
pub enum Document {
    Root(RootDocument),
    Extending(ExtendingDocument),
}

/// A template that does not extend another one.
#[derive(Debug, Clone, PartialEq)]
pub struct RootDocument {
    pub content: Content,
}

/// A template starting with `{% extends "parent" %}` followed only by blocks.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendingDocument {
    pub extends: ExtendsDirective,
    /// Block overrides in source order; names are unique.
    pub blocks: Vec<Block>,
}

/// `{% extends "name" %}`
#[derive(Debug, Clone, PartialEq)]
pub struct ExtendsDirective {
    pub name: String,
    pub position: Position,
}

/// An ordered sequence of renderable nodes.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Content {
    nodes: Vec<Node>,
}

impl Content {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub(crate) fn nodes_mut(&mut self) -> &mut [Node] {
        &mut self.nodes
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }
}

/// A node in a [`Content`] list.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal text (including `verbatim` bodies).
    Text(Text),
    /// Output expression: `{{ expr }}`
    Output(Output),
    /// Overridable block: `{% block name %}...{% endblock %}`
    Block(Block),
    /// `{% include "name" %}`
    Include(IncludeDirective),
    /// `{% if %}...{% elseif %}...{% else %}...{% endif %}`
    If(IfNode),
    /// `{% for x in xs %}...{% endfor %}`
    For(ForNode),
    /// `{% set x = expr %}`
    Set(SetNode),
}

#[derive(Debug, Clone, PartialEq)]
pub struct Text {
    pub text: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Output {
    pub expression: Expression,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    pub name: String,
    pub content: Content,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct IncludeDirective {
    pub name: String,
    pub position: Position,
}

/// Conditional: branches are tried in order, first truthy condition wins.
#[derive(Debug, Clone, PartialEq)]
pub struct IfNode {
    /// The `if` branch followed by every `elseif` branch.
    pub branches: Vec<(Expression, Content)>,
    pub else_branch: Option<Content>,
    pub position: Position,
}

/// Loop variables of a `for` directive.
#[derive(Debug, Clone, PartialEq)]
pub enum ForTarget {
    /// `for x in ...`
    Value(String),
    /// `for k, v in ...`
    Pair(String, String),
}

#[derive(Debug, Clone, PartialEq)]
pub struct ForNode {
    pub target: ForTarget,
    pub iterable: Expression,
    /// `| filter f` clauses applied to the whole collection, in order.
    pub filters: Vec<Expression>,
    pub body: Content,
    pub position: Position,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SetNode {
    pub name: String,
    pub assignment: Expression,
    pub position: Position,
}

/// An expression of the template sub-language.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    Literal(Literal),
    List(ListExpression),
    /// `{ key: expr, ... }` in source order.
    Map(Vec<(String, Expression)>),
    Variable(String),
    FunctionCall(FunctionCall),
    /// `base.step.step`
    Selection(Selection),
    /// `var["key"]`
    MapSelection(MapSelection),
    /// `base | stage | stage`
    Composition(Composition),
    Binary(BinaryOperation),
    Unary(UnaryOperation),
    Ternary(Ternary),
}

#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Int(i64),
    Float(f64),
    Char(char),
    String(String),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ListExpression {
    /// `[a, b, c]`
    Enumeration(Vec<Expression>),
    /// `1..5`, inclusive.
    IntRange(i64, i64),
    /// `'a'..'e'`, inclusive.
    CharRange(char, char),
}

#[derive(Debug, Clone, PartialEq)]
pub struct FunctionCall {
    pub name: String,
    pub arguments: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Selection {
    pub base: Box<Expression>,
    /// Each step is a `Variable`, `FunctionCall` or `MapSelection`.
    pub steps: Vec<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct MapSelection {
    pub variable: String,
    pub key: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Composition {
    pub base: Box<Expression>,
    /// Each stage is a `FunctionCall` or a `Variable` naming a function.
    pub stages: Vec<Expression>,
}

/// A left-associative operator chain of one precedence level.
///
/// Invariant: `operators.len() == operands.len() - 1`.
#[derive(Debug, Clone, PartialEq)]
pub struct BinaryOperation {
    pub operands: Vec<Expression>,
    pub operators: Vec<Operator>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct UnaryOperation {
    pub operator: UnaryOperator,
    pub operand: Box<Expression>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Ternary {
    pub condition: Box<Expression>,
    pub if_true: Box<Expression>,
    pub if_false: Box<Expression>,
}

/// Prefix operators. `not` is the only one the grammar has.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOperator {
    Not,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Not => "not",
        }
    }
}

/// Binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operator {
    StartsWith,
    EndsWith,
    Matches,
    In,
    Or,
    And,
    Equal,
    Different,
    LessOrEqual,
    GreaterOrEqual,
    Less,
    Greater,
    Add,
    Sub,
    IntDiv,
    IntTimes,
    Times,
    Div,
    Mod,
}

impl Operator {
    /// The operator's source symbol.
    pub fn symbol(self) -> &'static str {
        match self {
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
            Operator::Matches => "matches",
            Operator::In => "in",
            Operator::Or => "or",
            Operator::And => "and",
            Operator::Equal => "==",
            Operator::Different => "!=",
            Operator::LessOrEqual => "<=",
            Operator::GreaterOrEqual => ">=",
            Operator::Less => "<",
            Operator::Greater => ">",
            Operator::Add => "+",
            Operator::Sub => "-",
            Operator::IntDiv => "//",
            Operator::IntTimes => "**",
            Operator::Times => "*",
            Operator::Div => "/",
            Operator::Mod => "%",
        }
    }

    /// Word operators must not be followed by an identifier character.
    pub fn is_word(self) -> bool {
        self.symbol().starts_with(|c: char| c.is_ascii_alphabetic())
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_from_offset() {
        let source = "ab\ncd\néf";
        assert_eq!(
            Position::from_offset(source, 0),
            Position {
                offset: 0,
                line: 1,
                column: 1
            }
        );
        assert_eq!(Position::from_offset(source, 4).line, 2);
        assert_eq!(Position::from_offset(source, 4).column, 2);
        // 'é' is two bytes but one column
        let pos = Position::from_offset(source, 8);
        assert_eq!((pos.line, pos.column), (3, 2));
    }

    #[test]
    fn test_position_clamps_offset() {
        let pos = Position::from_offset("abc", 100);
        assert_eq!(pos.offset, 3);
        assert_eq!(pos.column, 4);
    }

    #[test]
    fn test_word_operators() {
        assert!(Operator::And.is_word());
        assert!(Operator::StartsWith.is_word());
        assert!(!Operator::IntDiv.is_word());
        assert!(!Operator::LessOrEqual.is_word());
    }

    #[test]
    fn test_directive_display() {
        assert_eq!(Directive::Output.to_string(), "{{");
        assert_eq!(Directive::Verbatim.to_string(), "verbatim");
    }
}
