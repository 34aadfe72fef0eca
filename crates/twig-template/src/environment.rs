/*
 * environment.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template environment and compiled templates.
//!
//! An [`Environment`] bundles the collaborators every template needs: the
//! [`ResourceLoader`] used for `extends` and `include`, the
//! [`FunctionRegistry`], and the [`EngineConfig`]. It is cheap to share
//! between threads; each render gets its own evaluation context.

use crate::ast::{Content, Document};
use crate::config::EngineConfig;
use crate::context::TemplateContext;
use crate::error::{CompileError, RenderError, TemplateResult};
use crate::eval_context::EvalContext;
use crate::evaluator::render_content;
use crate::functions::FunctionRegistry;
use crate::resolver::{NullLoader, ResourceLoader};
use std::fmt;
use std::sync::Arc;

/// Loader, functions and configuration shared by a set of templates.
#[derive(Clone)]
pub struct Environment {
    loader: Arc<dyn ResourceLoader>,
    functions: FunctionRegistry,
    config: EngineConfig,
}

impl fmt::Debug for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Environment")
            .field("functions", &self.functions)
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl Default for Environment {
    /// An environment that cannot load templates, with the built-in functions.
    fn default() -> Self {
        Self::new(NullLoader)
    }
}

impl Environment {
    /// Create an environment with the built-in functions and default config.
    pub fn new(loader: impl ResourceLoader + 'static) -> Self {
        Self {
            loader: Arc::new(loader),
            functions: FunctionRegistry::with_builtins(),
            config: EngineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn with_functions(mut self, functions: FunctionRegistry) -> Self {
        self.functions = functions;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn functions(&self) -> &FunctionRegistry {
        &self.functions
    }

    /// Mutable access for registering host functions.
    pub fn functions_mut(&mut self) -> &mut FunctionRegistry {
        &mut self.functions
    }

    pub fn loader(&self) -> &dyn ResourceLoader {
        self.loader.as_ref()
    }

    /// Load and parse a template by name.
    pub fn load_document(&self, name: &str) -> Result<Document, CompileError> {
        let source = self
            .loader
            .load(name)
            .map_err(|source| CompileError::Load {
                name: name.to_string(),
                source,
            })?;
        tracing::debug!(name, bytes = source.len(), "Loaded template");
        Document::parse(&source).map_err(|source| CompileError::Parse {
            name: name.to_string(),
            source,
        })
    }

    /// Load, parse and compile a named template.
    pub fn get_template(&self, name: &str) -> TemplateResult<Template> {
        let content = self.load_document(name)?.compile(self)?;
        Ok(Template::from_content(Some(name.to_string()), content))
    }

    /// Parse and compile template text. `extends` and `include` targets are
    /// resolved through this environment's loader.
    pub fn template_from_str(&self, source: &str) -> TemplateResult<Template> {
        let content = Document::parse(source)?.compile(self)?;
        Ok(Template::from_content(None, content))
    }

    /// Compile and render template text in one call.
    pub fn render_str(&self, source: &str, context: &TemplateContext) -> TemplateResult<String> {
        let template = self.template_from_str(source)?;
        Ok(template.render(self, context)?)
    }
}

/// A compiled template: inheritance resolved, ready to render.
#[derive(Debug, Clone, PartialEq)]
pub struct Template {
    name: Option<String>,
    content: Content,
}

impl Template {
    pub fn from_content(name: Option<String>, content: Content) -> Self {
        Self { name, content }
    }

    /// Compile template text without a loader.
    ///
    /// `extends` and `include` need an [`Environment`] with a loader; use
    /// [`Environment::template_from_str`] for those.
    pub fn from_source(source: &str) -> TemplateResult<Self> {
        Environment::default().template_from_str(source)
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    pub fn content(&self) -> &Content {
        &self.content
    }

    /// Render this template to a string.
    pub fn render(&self, env: &Environment, context: &TemplateContext) -> Result<String, RenderError> {
        let mut buffer = Vec::new();
        self.render_to(env, context, &mut buffer)?;
        Ok(String::from_utf8_lossy(&buffer).into_owned())
    }

    /// Render this template to an output sink.
    pub fn render_to<W: std::io::Write>(
        &self,
        env: &Environment,
        context: &TemplateContext,
        out: &mut W,
    ) -> Result<(), RenderError> {
        tracing::trace!(template = ?self.name, "Rendering template");
        let mut ctx = EvalContext::new(env, context);
        render_content(&self.content, &mut ctx, out)
    }
}
