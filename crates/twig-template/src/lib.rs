/*
 * lib.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Twig-style template engine with block inheritance.
//!
//! Templates mix literal text with:
//!
//! - Output: `{{ user.name | upper }}`
//! - Conditionals: `{% if a %}...{% elseif b %}...{% else %}...{% endif %}`
//! - Loops: `{% for item in items %}...{% endfor %}`, `{% for k, v in map | filter f %}`
//! - Assignment: `{% set total = price * count %}`
//! - Inheritance: `{% extends "base" %}` with `{% block name %}...{% endblock %}` overrides
//! - Includes: `{% include "header" %}`
//! - Raw text: `{% verbatim %}{{ not evaluated }}{% endverbatim %}`
//! - Comments: `{# ignored #}`
//!
//! # Architecture
//!
//! Text is parsed into a [`Document`], compiled (inheritance resolved) into a
//! [`Content`] tree, then rendered against a [`TemplateContext`]. The
//! [`Environment`] supplies the [`ResourceLoader`] that resolves template
//! names, the [`FunctionRegistry`], and the [`EngineConfig`].
//!
//! # Example
//!
//! ```ignore
//! use twig_template::{Environment, MemoryLoader, TemplateContext};
//!
//! let env = Environment::new(MemoryLoader::with_templates([
//!     ("base", "Hello {% block greeting %}World{% endblock %}!"),
//!     ("child", "{% extends \"base\" %}{% block greeting %}{{ name }}{% endblock %}"),
//! ]));
//!
//! let template = env.get_template("child")?;
//! let ctx = TemplateContext::new().with("name", "Ada");
//! assert_eq!(template.render(&env, &ctx)?, "Hello Ada!");
//! ```

pub mod ast;
mod compile;
pub mod config;
pub mod context;
pub mod environment;
pub mod error;
pub mod eval_context;
pub mod evaluator;
pub mod functions;
pub mod lexer;
pub mod operators;
pub mod parser;
pub mod resolver;

// Re-export main types at crate root
pub use ast::{Content, Directive, Document, Expression, Node, Position};
pub use config::EngineConfig;
pub use context::{TemplateContext, TemplateValue};
pub use environment::{Environment, Template};
pub use error::{
    CalculateError, CompileError, ParseError, ParseErrorKind, RenderError, TemplateError,
    TemplateResult,
};
pub use eval_context::EvalContext;
pub use functions::{FunctionError, FunctionRegistry, FunctionResult};
pub use parser::parse_expression;
pub use resolver::{FileSystemLoader, LoadError, MemoryLoader, NullLoader, ResourceLoader};
