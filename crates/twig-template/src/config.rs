/*
 * config.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Engine configuration.

use serde::Deserialize;

/// Default nesting limit for `include` and `extends`.
pub const DEFAULT_MAX_DEPTH: usize = 50;

/// Default upper bound on the number of elements a range literal expands to.
pub const DEFAULT_MAX_RANGE_LENGTH: usize = 100_000;

/// Settings shared by every template of an [`Environment`](crate::Environment).
///
/// Missing fields take their default when deserialized, so
/// `{"strict_variables": false}` is a complete configuration.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Fail on variables that are not defined (otherwise they evaluate to null).
    pub strict_variables: bool,

    /// Maximum nesting of `include` directives.
    pub max_include_depth: usize,

    /// Maximum length of an `extends` chain.
    pub max_inheritance_depth: usize,

    /// Maximum number of elements produced by `a..b` ranges.
    pub max_range_length: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            strict_variables: true,
            max_include_depth: DEFAULT_MAX_DEPTH,
            max_inheritance_depth: DEFAULT_MAX_DEPTH,
            max_range_length: DEFAULT_MAX_RANGE_LENGTH,
        }
    }
}

impl EngineConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_strict_variables(mut self, strict: bool) -> Self {
        self.strict_variables = strict;
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }

    pub fn with_max_inheritance_depth(mut self, depth: usize) -> Self {
        self.max_inheritance_depth = depth;
        self
    }

    pub fn with_max_range_length(mut self, length: usize) -> Self {
        self.max_range_length = length;
        self
    }

    /// Parse a configuration from JSON text.
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(config.strict_variables);
        assert_eq!(config.max_include_depth, 50);
        assert_eq!(config.max_inheritance_depth, 50);
        assert_eq!(config.max_range_length, 100_000);
    }

    #[test]
    fn test_from_json_partial() {
        let config = EngineConfig::from_json(r#"{"strict_variables": false}"#).unwrap();
        assert_eq!(
            config,
            EngineConfig::default().with_strict_variables(false)
        );
    }

    #[test]
    fn test_from_json_rejects_wrong_types() {
        assert!(EngineConfig::from_json(r#"{"max_include_depth": "ten"}"#).is_err());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_max_include_depth(3)
            .with_max_inheritance_depth(4)
            .with_max_range_length(10);
        assert_eq!(config.max_include_depth, 3);
        assert_eq!(config.max_inheritance_depth, 4);
        assert_eq!(config.max_range_length, 10);
    }
}
