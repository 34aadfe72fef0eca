/*
 * eval_context.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Evaluation context for template rendering.
//!
//! [`EvalContext`] is threaded through all evaluation functions. It holds:
//!
//! 1. **Scope**: a stack of frames layered over the caller's read-only
//!    [`TemplateContext`]
//! 2. **State tracking**: include nesting depth for recursion protection
//! 3. **Environment**: loader, functions and configuration

use crate::context::{TemplateContext, TemplateValue};
use crate::environment::Environment;
use std::collections::HashMap;

type Frame = HashMap<String, TemplateValue>;

/// Context for one render call.
pub struct EvalContext<'a> {
    /// Loader, function registry and configuration.
    pub env: &'a Environment,

    /// Caller-supplied variables (never modified).
    variables: &'a TemplateContext,

    /// Innermost frame last. Never empty.
    frames: Vec<Frame>,

    /// Current include nesting depth.
    pub include_depth: usize,
}

impl<'a> EvalContext<'a> {
    /// Create a context with one empty frame over `variables`.
    pub fn new(env: &'a Environment, variables: &'a TemplateContext) -> Self {
        Self {
            env,
            variables,
            frames: vec![Frame::new()],
            include_depth: 0,
        }
    }

    /// Whether undefined variables are errors.
    pub fn strict_mode(&self) -> bool {
        self.env.config().strict_variables
    }

    /// Look a variable up from the innermost frame outwards, then in the
    /// caller's context.
    pub fn lookup(&self, name: &str) -> Option<&TemplateValue> {
        self.frames
            .iter()
            .rev()
            .find_map(|frame| frame.get(name))
            .or_else(|| self.variables.get(name))
    }

    /// Bind a variable in the innermost frame.
    pub fn set(&mut self, name: impl Into<String>, value: TemplateValue) {
        if let Some(frame) = self.frames.last_mut() {
            frame.insert(name.into(), value);
        }
    }

    pub fn push_frame(&mut self) {
        self.frames.push(Frame::new());
    }

    /// Discard the innermost frame. The bottom frame is never removed.
    pub fn pop_frame(&mut self) {
        if self.frames.len() > 1 {
            self.frames.pop();
        }
    }
}
