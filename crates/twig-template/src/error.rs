/*
 * error.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Error types for template parsing, compilation and rendering.
//!
//! The taxonomy follows the pipeline:
//!
//! - [`ParseError`]: the grammar could not match the template text
//! - [`CompileError`]: resolving `extends` failed (loader or parse failure)
//! - [`CalculateError`]: an expression could not be evaluated
//! - [`RenderError`]: rendering aborted, wrapping one of the above
//!
//! [`TemplateError`] is the umbrella type returned by the convenience APIs.

use crate::ast::{Directive, Position};
use crate::functions::FunctionError;
use crate::resolver::LoadError;
use std::fmt;
use thiserror::Error;

/// What went wrong while parsing.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParseErrorKind {
    /// A directive was opened but its closing `%}` or `}}` is missing.
    MissingEndCode(Directive),
    /// A directive was opened but its `end<keyword>` clause is missing.
    MissingEndClause(Directive),
    /// An expression was required but none could be parsed.
    ExpectingExpression,
    /// `{%` followed by something that is not a known directive.
    UnknownExpression,
    /// An extending template contains content outside `block` directives.
    ExtendMayOnlyBlocks,
    /// Unrecognized escape sequence inside a string literal.
    InvalidEscape,
    /// String literal without its closing quote.
    UnterminatedString,
    /// The same block name appears twice in one template.
    DuplicateBlock(String),
    /// A closing clause (`endif`, `else`, ...) without a matching opener.
    UnexpectedClause(String),
    /// A specific token was expected.
    Expected(&'static str),
}

impl fmt::Display for ParseErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseErrorKind::MissingEndCode(directive) => {
                write!(f, "missing end of code for '{}'", directive)
            }
            ParseErrorKind::MissingEndClause(directive) => {
                write!(f, "missing end clause for '{}'", directive)
            }
            ParseErrorKind::ExpectingExpression => write!(f, "expecting an expression"),
            ParseErrorKind::UnknownExpression => write!(f, "unknown expression"),
            ParseErrorKind::ExtendMayOnlyBlocks => {
                write!(f, "extending templates may only contain blocks")
            }
            ParseErrorKind::InvalidEscape => write!(f, "invalid escape sequence"),
            ParseErrorKind::UnterminatedString => write!(f, "unterminated string literal"),
            ParseErrorKind::DuplicateBlock(name) => write!(f, "duplicate block '{}'", name),
            ParseErrorKind::UnexpectedClause(keyword) => {
                write!(f, "unexpected '{}' without matching opener", keyword)
            }
            ParseErrorKind::Expected(what) => write!(f, "expected {}", what),
        }
    }
}

/// Error parsing the template syntax.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Parse error at line {}, column {}: {kind} (near '{snippet}')", position.line, position.column)]
pub struct ParseError {
    pub kind: ParseErrorKind,
    pub position: Position,
    /// Source text matched so far by the failing directive.
    pub snippet: String,
}

/// Errors resolving template inheritance.
#[derive(Debug, Error)]
pub enum CompileError {
    /// The resource loader could not provide the template.
    #[error("Cannot load template '{name}': {source}")]
    Load {
        name: String,
        #[source]
        source: LoadError,
    },

    /// A loaded template failed to parse.
    #[error("Cannot parse template '{name}': {source}")]
    Parse {
        name: String,
        #[source]
        source: ParseError,
    },

    /// Too many `extends` levels, usually a cycle.
    #[error("Recursive template inheritance detected (depth > {max_depth}): {name}")]
    RecursiveInheritance { name: String, max_depth: usize },
}

/// Errors evaluating an expression.
#[derive(Debug, Error)]
pub enum CalculateError {
    #[error("Unresolved variable: {0}")]
    UnresolvedVariable(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Function '{name}' failed: {source}")]
    Function {
        name: String,
        #[source]
        source: FunctionError,
    },

    #[error("No property '{property}' on {found}")]
    UnknownProperty {
        property: String,
        found: &'static str,
    },

    #[error("Operator '{operator}' cannot be applied to {left} and {right}")]
    TypeMismatch {
        operator: &'static str,
        left: &'static str,
        right: &'static str,
    },

    #[error("Division by zero")]
    DivisionByZero,

    #[error("Integer overflow in '{0}'")]
    Overflow(&'static str),

    #[error("Range {from}..{to} has more than {max} elements")]
    RangeTooLarge { from: String, to: String, max: usize },

    #[error("Invalid regular expression: {0}")]
    InvalidRegex(#[from] regex::Error),
}

/// Errors that abort a render call.
#[derive(Debug, Error)]
pub enum RenderError {
    /// An expression inside a directive could not be evaluated.
    #[error("Error rendering '{directive}' at line {}, column {}: {source}", position.line, position.column)]
    Calculate {
        directive: Directive,
        position: Position,
        #[source]
        source: CalculateError,
    },

    /// An included template could not be loaded or compiled.
    #[error("Cannot include '{name}': {source}")]
    Include {
        name: String,
        #[source]
        source: CompileError,
    },

    /// Recursive include detected.
    #[error("Recursive include detected (depth > {max_depth}): {name}")]
    RecursiveInclude { name: String, max_depth: usize },

    /// Writing to the output sink failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Errors that can occur during template operations.
#[derive(Debug, Error)]
pub enum TemplateError {
    #[error(transparent)]
    Parse(#[from] ParseError),

    #[error(transparent)]
    Compile(#[from] CompileError),

    #[error(transparent)]
    Render(#[from] RenderError),
}

/// Result type for template operations.
pub type TemplateResult<T> = Result<T, TemplateError>;
