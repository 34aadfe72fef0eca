/*
 * functions.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Function and filter registry.
//!
//! Functions are pure value transforms looked up by name. The same registry
//! serves direct calls (`name(a, b)`), bare calls (`name value`), composition
//! stages (`value | name(b)`, where the piped value becomes the first
//! argument) and `for` loop filters.

use crate::context::TemplateValue;
use indexmap::IndexMap;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use thiserror::Error;

/// Errors raised by individual functions.
#[derive(Debug, Error)]
pub enum FunctionError {
    /// Wrong number of arguments.
    #[error("expected {expected} argument(s), got {found}")]
    Arity { expected: String, found: usize },

    /// An argument has the wrong type or value.
    #[error("invalid argument {index}: {message}")]
    InvalidArgument { index: usize, message: String },

    /// Any other failure.
    #[error("{0}")]
    Failed(String),
}

/// Signature shared by all registered functions.
pub type FunctionResult = Result<TemplateValue, FunctionError>;

type BoxedFunction = Arc<dyn Fn(&[TemplateValue]) -> FunctionResult + Send + Sync>;

/// Name → function mapping injected into an [`Environment`](crate::Environment).
#[derive(Clone, Default)]
pub struct FunctionRegistry {
    functions: HashMap<String, BoxedFunction>,
}

impl fmt::Debug for FunctionRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&str> = self.functions.keys().map(String::as_str).collect();
        names.sort_unstable();
        f.debug_struct("FunctionRegistry")
            .field("functions", &names)
            .finish()
    }
}

impl FunctionRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a registry with the built-in functions.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry
            .register("format", format)
            .register("json_encode", json_encode)
            .register("upper", upper)
            .register("lower", lower)
            .register("capitalize", capitalize)
            .register("trim", trim)
            .register("length", length)
            .register("join", join)
            .register("reverse", reverse)
            .register("sort", sort)
            .register("first", first)
            .register("last", last)
            .register("keys", keys)
            .register("default", default);
        registry
    }

    /// Register (or replace) a function.
    pub fn register<F>(&mut self, name: impl Into<String>, function: F) -> &mut Self
    where
        F: Fn(&[TemplateValue]) -> FunctionResult + Send + Sync + 'static,
    {
        self.functions.insert(name.into(), Arc::new(function));
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.functions.contains_key(name)
    }

    /// Call a function by name. Returns `None` if it is not registered.
    pub fn call(&self, name: &str, arguments: &[TemplateValue]) -> Option<FunctionResult> {
        self.functions.get(name).map(|f| f(arguments))
    }
}

fn require_args(args: &[TemplateValue], min: usize, max: usize) -> Result<(), FunctionError> {
    if args.len() < min || args.len() > max {
        let expected = if min == max {
            min.to_string()
        } else {
            format!("{} to {}", min, max)
        };
        return Err(FunctionError::Arity {
            expected,
            found: args.len(),
        });
    }
    Ok(())
}

fn string_arg(args: &[TemplateValue], index: usize) -> Result<String, FunctionError> {
    match &args[index] {
        TemplateValue::String(s) => Ok(s.clone()),
        TemplateValue::Char(c) => Ok(c.to_string()),
        other => Err(FunctionError::InvalidArgument {
            index,
            message: format!("expected a string, got {}", other.type_name()),
        }),
    }
}

/// `format("I like %s and %s.", a, b)`: `%s` placeholders, `%%` for a literal `%`.
fn format(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, usize::MAX)?;
    let pattern = string_arg(args, 0)?;
    let mut values = args[1..].iter();
    let mut output = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c != '%' {
            output.push(c);
            continue;
        }
        match chars.next() {
            Some('s') => match values.next() {
                Some(value) => output.push_str(&value.render()),
                None => {
                    return Err(FunctionError::Failed(
                        "not enough arguments for format string".to_string(),
                    ));
                }
            },
            Some('%') => output.push('%'),
            Some(other) => {
                return Err(FunctionError::Failed(format!(
                    "unsupported format specifier '%{}'",
                    other
                )));
            }
            None => output.push('%'),
        }
    }
    Ok(TemplateValue::String(output))
}

fn json_encode(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, 1)?;
    if args[0] == TemplateValue::Null {
        return Err(FunctionError::InvalidArgument {
            index: 0,
            message: "value must not be null".to_string(),
        });
    }
    serde_json::to_string(&args[0])
        .map(TemplateValue::String)
        .map_err(|e| FunctionError::Failed(e.to_string()))
}

fn upper(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, 1)?;
    Ok(TemplateValue::String(args[0].render().to_uppercase()))
}

fn lower(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, 1)?;
    Ok(TemplateValue::String(args[0].render().to_lowercase()))
}

fn capitalize(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, 1)?;
    let text = args[0].render();
    let mut chars = text.chars();
    let capitalized = match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    };
    Ok(TemplateValue::String(capitalized))
}

fn trim(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, 1)?;
    Ok(TemplateValue::String(args[0].render().trim().to_string()))
}

fn length(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, 1)?;
    let len = match &args[0] {
        TemplateValue::Null => 0,
        TemplateValue::String(s) => s.chars().count(),
        TemplateValue::List(items) => items.len(),
        TemplateValue::Map(map) => map.len(),
        _ => 1,
    };
    Ok(TemplateValue::from(len))
}

fn join(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, 2)?;
    let separator = if args.len() == 2 {
        string_arg(args, 1)?
    } else {
        String::new()
    };
    match &args[0] {
        TemplateValue::List(items) => Ok(TemplateValue::String(
            items
                .iter()
                .map(TemplateValue::render)
                .collect::<Vec<_>>()
                .join(&separator),
        )),
        TemplateValue::Null => Ok(TemplateValue::String(String::new())),
        other => Ok(TemplateValue::String(other.render())),
    }
}

fn reverse(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, 1)?;
    match &args[0] {
        TemplateValue::List(items) => Ok(TemplateValue::List(items.iter().rev().cloned().collect())),
        TemplateValue::String(s) => Ok(TemplateValue::String(s.chars().rev().collect())),
        TemplateValue::Map(map) => Ok(TemplateValue::Map(
            map.iter()
                .rev()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        )),
        other => Ok(other.clone()),
    }
}

fn sort(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, 1)?;
    let TemplateValue::List(items) = &args[0] else {
        return Err(FunctionError::InvalidArgument {
            index: 0,
            message: format!("expected a list, got {}", args[0].type_name()),
        });
    };
    let mut sorted = items.clone();
    if sorted.iter().all(TemplateValue::is_number) {
        sorted.sort_by(|a, b| {
            let (a, b) = (a.as_f64().unwrap_or(0.0), b.as_f64().unwrap_or(0.0));
            a.total_cmp(&b)
        });
    } else {
        sorted.sort_by_key(TemplateValue::render);
    }
    Ok(TemplateValue::List(sorted))
}

fn first(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, 1)?;
    Ok(match &args[0] {
        TemplateValue::List(items) => items.first().cloned().unwrap_or_default(),
        TemplateValue::String(s) => s.chars().next().map_or(TemplateValue::Null, TemplateValue::Char),
        TemplateValue::Map(map) => map.values().next().cloned().unwrap_or_default(),
        other => other.clone(),
    })
}

fn last(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, 1)?;
    Ok(match &args[0] {
        TemplateValue::List(items) => items.last().cloned().unwrap_or_default(),
        TemplateValue::String(s) => s.chars().next_back().map_or(TemplateValue::Null, TemplateValue::Char),
        TemplateValue::Map(map) => map.values().next_back().cloned().unwrap_or_default(),
        other => other.clone(),
    })
}

fn keys(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 1, 1)?;
    match &args[0] {
        TemplateValue::Map(map) => Ok(TemplateValue::List(
            map.keys().cloned().map(TemplateValue::String).collect(),
        )),
        TemplateValue::List(items) => Ok(TemplateValue::List(
            (0..items.len()).map(TemplateValue::from).collect(),
        )),
        other => Err(FunctionError::InvalidArgument {
            index: 0,
            message: format!("expected a map or list, got {}", other.type_name()),
        }),
    }
}

/// `default(value, fallback)`: fallback when value is null or empty.
fn default(args: &[TemplateValue]) -> FunctionResult {
    require_args(args, 2, 2)?;
    let empty = match &args[0] {
        TemplateValue::Null => true,
        TemplateValue::String(s) => s.is_empty(),
        TemplateValue::List(items) => items.is_empty(),
        TemplateValue::Map(map) => map.is_empty(),
        _ => false,
    };
    Ok(if empty { args[1].clone() } else { args[0].clone() })
}

/// Convenience for building map values in tests and host code.
pub fn map_value<K, V>(entries: impl IntoIterator<Item = (K, V)>) -> TemplateValue
where
    K: Into<String>,
    V: Into<TemplateValue>,
{
    TemplateValue::Map(
        entries
            .into_iter()
            .map(|(k, v)| (k.into(), v.into()))
            .collect::<IndexMap<_, _>>(),
    )
}
