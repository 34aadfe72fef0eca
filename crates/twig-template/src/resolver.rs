/*
 * resolver.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template resource loading.
//!
//! This module provides the [`ResourceLoader`] trait used to resolve
//! `extends` and `include` targets, and implementations that load from the
//! filesystem or from memory.

use std::collections::HashMap;
use std::path::{Component, Path, PathBuf};
use thiserror::Error;

/// Errors returned by a [`ResourceLoader`].
#[derive(Debug, Error)]
pub enum LoadError {
    /// No template with this name exists.
    #[error("template not found: {0}")]
    NotFound(String),

    /// The template exists but could not be read.
    #[error("cannot read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Trait for loading template sources by name.
///
/// Implementations own any caching or retry policy; the engine calls
/// [`load`](Self::load) every time it resolves an `extends` or `include`.
pub trait ResourceLoader: Send + Sync {
    /// Load the raw template text for `name`.
    fn load(&self, name: &str) -> Result<String, LoadError>;
}

/// Loader that reads templates below a root directory.
///
/// Path resolution rules:
/// - Names are relative to the root directory
/// - If the name has no extension and a default extension is configured, it is appended
/// - Names that would escape the root (`..`, absolute paths) are not found
#[derive(Debug, Clone)]
pub struct FileSystemLoader {
    root: PathBuf,
    default_extension: Option<String>,
}

impl FileSystemLoader {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            default_extension: None,
        }
    }

    /// Append `extension` to names that have none (e.g., `"twig"`).
    pub fn with_default_extension(mut self, extension: impl Into<String>) -> Self {
        self.default_extension = Some(extension.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

impl ResourceLoader for FileSystemLoader {
    fn load(&self, name: &str) -> Result<String, LoadError> {
        let path = resolve_template_path(&self.root, name, self.default_extension.as_deref())
            .ok_or_else(|| LoadError::NotFound(name.to_string()))?;
        tracing::debug!(name, path = %path.display(), "Loading template from filesystem");
        std::fs::read_to_string(&path).map_err(|source| {
            if source.kind() == std::io::ErrorKind::NotFound {
                LoadError::NotFound(name.to_string())
            } else {
                LoadError::Io { path, source }
            }
        })
    }
}

/// Loader that never finds anything.
///
/// Use this loader for standalone templates that don't use `extends` or
/// `include`.
#[derive(Debug, Clone, Default)]
pub struct NullLoader;

impl ResourceLoader for NullLoader {
    fn load(&self, name: &str) -> Result<String, LoadError> {
        Err(LoadError::NotFound(name.to_string()))
    }
}

/// Loader that serves templates from an in-memory map.
///
/// Useful for testing and for templates bundled into the application.
#[derive(Debug, Clone, Default)]
pub struct MemoryLoader {
    templates: HashMap<String, String>,
}

impl MemoryLoader {
    /// Create a new empty memory loader.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a template to the loader.
    pub fn add(&mut self, name: impl Into<String>, content: impl Into<String>) -> &mut Self {
        self.templates.insert(name.into(), content.into());
        self
    }

    /// Create a loader with the given templates.
    pub fn with_templates(
        templates: impl IntoIterator<Item = (impl Into<String>, impl Into<String>)>,
    ) -> Self {
        let mut loader = Self::new();
        for (name, content) in templates {
            loader.add(name, content);
        }
        loader
    }
}

impl ResourceLoader for MemoryLoader {
    fn load(&self, name: &str) -> Result<String, LoadError> {
        self.templates
            .get(name)
            .cloned()
            .ok_or_else(|| LoadError::NotFound(name.to_string()))
    }
}

/// Resolve a template name to a path below `root`.
///
/// Returns `None` for names that would leave the root directory.
///
/// # Examples
///
/// ```ignore
/// // root: /templates, name: "base", ext: Some("twig") → /templates/base.twig
/// // root: /templates, name: "base.html", ext: Some("twig") → /templates/base.html
/// // root: /templates, name: "../secret" → None
/// ```
pub fn resolve_template_path(root: &Path, name: &str, default_extension: Option<&str>) -> Option<PathBuf> {
    let relative = Path::new(name);
    if relative
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }

    let path = root.join(relative);
    match default_extension {
        Some(ext) if relative.extension().is_none() && !ext.is_empty() => {
            Some(path.with_extension(ext))
        }
        _ => Some(path),
    }
}
