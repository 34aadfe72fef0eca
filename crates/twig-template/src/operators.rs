/*
 * operators.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Operator semantics over [`TemplateValue`]s.
//!
//! Binary operation chains are folded left to right by the evaluator, which
//! calls [`apply_binary`] once per operator.

use crate::ast::{Operator, UnaryOperator};
use crate::context::TemplateValue;
use crate::error::CalculateError;
use regex::Regex;
use std::cmp::Ordering;

type OperatorResult = Result<TemplateValue, CalculateError>;

/// Apply a binary operator to two evaluated operands.
pub fn apply_binary(operator: Operator, left: TemplateValue, right: TemplateValue) -> OperatorResult {
    match operator {
        Operator::Or => Ok(TemplateValue::Bool(left.is_truthy() || right.is_truthy())),
        Operator::And => Ok(TemplateValue::Bool(left.is_truthy() && right.is_truthy())),
        Operator::Equal => Ok(TemplateValue::Bool(values_equal(&left, &right))),
        Operator::Different => Ok(TemplateValue::Bool(!values_equal(&left, &right))),
        Operator::Less => compare(operator, &left, &right, Ordering::is_lt),
        Operator::LessOrEqual => compare(operator, &left, &right, Ordering::is_le),
        Operator::Greater => compare(operator, &left, &right, Ordering::is_gt),
        Operator::GreaterOrEqual => compare(operator, &left, &right, Ordering::is_ge),
        Operator::Add => add(left, right),
        Operator::Sub => arithmetic(operator, &left, &right, i64::checked_sub, |a, b| a - b),
        Operator::Times => arithmetic(operator, &left, &right, i64::checked_mul, |a, b| a * b),
        Operator::Div => divide(&left, &right),
        Operator::IntDiv => integer_divide(&left, &right),
        Operator::IntTimes => integer_times(&left, &right),
        Operator::Mod => remainder(&left, &right),
        Operator::StartsWith => starts_or_ends_with(operator, &left, &right),
        Operator::EndsWith => starts_or_ends_with(operator, &left, &right),
        Operator::Matches => matches(&left, &right),
        Operator::In => contains(&left, &right),
    }
}

/// Apply a unary operator. `not` negates truthiness and never fails.
pub fn apply_unary(operator: UnaryOperator, operand: TemplateValue) -> TemplateValue {
    match operator {
        UnaryOperator::Not => TemplateValue::Bool(!operand.is_truthy()),
    }
}

/// Equality used by `==`, `in` and list `startsWith`/`endsWith`.
///
/// Numbers compare by value across Int and Float; a character equals the
/// one-character string holding it.
pub fn values_equal(left: &TemplateValue, right: &TemplateValue) -> bool {
    match (left, right) {
        (TemplateValue::Int(a), TemplateValue::Int(b)) => a == b,
        (TemplateValue::Char(c), TemplateValue::String(s))
        | (TemplateValue::String(s), TemplateValue::Char(c)) => {
            let mut chars = s.chars();
            chars.next() == Some(*c) && chars.next().is_none()
        }
        (TemplateValue::List(a), TemplateValue::List(b)) => {
            a.len() == b.len() && a.iter().zip(b).all(|(x, y)| values_equal(x, y))
        }
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a == b,
            _ => left == right,
        },
    }
}

fn mismatch(operator: Operator, left: &TemplateValue, right: &TemplateValue) -> CalculateError {
    CalculateError::TypeMismatch {
        operator: operator.symbol(),
        left: left.type_name(),
        right: right.type_name(),
    }
}

fn compare(
    operator: Operator,
    left: &TemplateValue,
    right: &TemplateValue,
    accept: fn(Ordering) -> bool,
) -> OperatorResult {
    let ordering = match (left, right) {
        (TemplateValue::Int(a), TemplateValue::Int(b)) => Some(a.cmp(b)),
        _ if left.is_number() && right.is_number() => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b),
            _ => None,
        },
        _ if left.is_text() && right.is_text() => Some(left.to_string().cmp(&right.to_string())),
        _ => return Err(mismatch(operator, left, right)),
    };
    // NaN compares false both ways.
    Ok(TemplateValue::Bool(ordering.is_some_and(accept)))
}

fn add(left: TemplateValue, right: TemplateValue) -> OperatorResult {
    if left.is_text() || right.is_text() {
        return Ok(TemplateValue::String(format!("{}{}", left, right)));
    }
    match (left, right) {
        (TemplateValue::List(mut a), TemplateValue::List(b)) => {
            a.extend(b);
            Ok(TemplateValue::List(a))
        }
        (left, right) => arithmetic(Operator::Add, &left, &right, i64::checked_add, |a, b| a + b),
    }
}

/// Int op Int stays Int (checked); anything involving a Float is Float.
fn arithmetic(
    operator: Operator,
    left: &TemplateValue,
    right: &TemplateValue,
    int_op: fn(i64, i64) -> Option<i64>,
    float_op: fn(f64, f64) -> f64,
) -> OperatorResult {
    match (left, right) {
        (TemplateValue::Int(a), TemplateValue::Int(b)) => int_op(*a, *b)
            .map(TemplateValue::Int)
            .ok_or(CalculateError::Overflow(operator.symbol())),
        _ => match (left.as_f64(), right.as_f64()) {
            (Some(a), Some(b)) => Ok(TemplateValue::Float(float_op(a, b))),
            _ => Err(mismatch(operator, left, right)),
        },
    }
}

fn numbers(
    operator: Operator,
    left: &TemplateValue,
    right: &TemplateValue,
) -> Result<(f64, f64), CalculateError> {
    match (left.as_f64(), right.as_f64()) {
        (Some(a), Some(b)) => Ok((a, b)),
        _ => Err(mismatch(operator, left, right)),
    }
}

fn divide(left: &TemplateValue, right: &TemplateValue) -> OperatorResult {
    let (a, b) = numbers(Operator::Div, left, right)?;
    if b == 0.0 {
        return Err(CalculateError::DivisionByZero);
    }
    Ok(TemplateValue::Float(a / b))
}

/// Convert a float result back to an integer, truncating toward zero.
fn truncate(operator: Operator, value: f64) -> OperatorResult {
    let truncated = value.trunc();
    if truncated.is_finite() && truncated >= i64::MIN as f64 && truncated < i64::MAX as f64 {
        Ok(TemplateValue::Int(truncated as i64))
    } else {
        Err(CalculateError::Overflow(operator.symbol()))
    }
}

fn integer_divide(left: &TemplateValue, right: &TemplateValue) -> OperatorResult {
    if let (TemplateValue::Int(a), TemplateValue::Int(b)) = (left, right) {
        if *b == 0 {
            return Err(CalculateError::DivisionByZero);
        }
        return a
            .checked_div(*b)
            .map(TemplateValue::Int)
            .ok_or(CalculateError::Overflow(Operator::IntDiv.symbol()));
    }
    let (a, b) = numbers(Operator::IntDiv, left, right)?;
    if b == 0.0 {
        return Err(CalculateError::DivisionByZero);
    }
    truncate(Operator::IntDiv, a / b)
}

fn integer_times(left: &TemplateValue, right: &TemplateValue) -> OperatorResult {
    if let (TemplateValue::Int(a), TemplateValue::Int(b)) = (left, right) {
        return a
            .checked_mul(*b)
            .map(TemplateValue::Int)
            .ok_or(CalculateError::Overflow(Operator::IntTimes.symbol()));
    }
    let (a, b) = numbers(Operator::IntTimes, left, right)?;
    truncate(Operator::IntTimes, a * b)
}

fn remainder(left: &TemplateValue, right: &TemplateValue) -> OperatorResult {
    if let (TemplateValue::Int(a), TemplateValue::Int(b)) = (left, right) {
        if *b == 0 {
            return Err(CalculateError::DivisionByZero);
        }
        return a
            .checked_rem(*b)
            .map(TemplateValue::Int)
            .ok_or(CalculateError::Overflow(Operator::Mod.symbol()));
    }
    let (a, b) = numbers(Operator::Mod, left, right)?;
    if b == 0.0 {
        return Err(CalculateError::DivisionByZero);
    }
    Ok(TemplateValue::Float(a % b))
}

fn starts_or_ends_with(
    operator: Operator,
    left: &TemplateValue,
    right: &TemplateValue,
) -> OperatorResult {
    let starts = operator == Operator::StartsWith;
    match left {
        TemplateValue::List(items) => {
            let edge = if starts { items.first() } else { items.last() };
            Ok(TemplateValue::Bool(
                edge.is_some_and(|item| values_equal(item, right)),
            ))
        }
        _ if left.is_text() => {
            let (text, affix) = (left.to_string(), right.to_string());
            let found = if starts {
                text.starts_with(&affix)
            } else {
                text.ends_with(&affix)
            };
            Ok(TemplateValue::Bool(found))
        }
        _ => Err(mismatch(operator, left, right)),
    }
}

/// Whole-string regular expression match.
fn matches(left: &TemplateValue, right: &TemplateValue) -> OperatorResult {
    if !left.is_text() || !right.is_text() {
        return Err(mismatch(Operator::Matches, left, right));
    }
    let pattern = right.to_string();
    // Reject unbalanced patterns before wrapping, so `a)|(b` cannot escape the group.
    Regex::new(&pattern)?;
    let anchored = Regex::new(&format!("^(?:{})$", pattern))?;
    Ok(TemplateValue::Bool(anchored.is_match(&left.to_string())))
}

fn contains(needle: &TemplateValue, haystack: &TemplateValue) -> OperatorResult {
    let found = match haystack {
        TemplateValue::List(items) => items.iter().any(|item| values_equal(item, needle)),
        TemplateValue::Map(map) => map.contains_key(&needle.to_string()),
        _ if haystack.is_text() => haystack.to_string().contains(&needle.to_string()),
        _ => return Err(mismatch(Operator::In, needle, haystack)),
    };
    Ok(TemplateValue::Bool(found))
}

#[cfg(test)]
mod tests {
    use super::*;
    use indexmap::IndexMap;

    fn int(n: i64) -> TemplateValue {
        TemplateValue::Int(n)
    }

    fn s(text: &str) -> TemplateValue {
        TemplateValue::from(text)
    }

    #[test]
    fn test_integer_arithmetic_stays_integer() {
        assert_eq!(apply_binary(Operator::Add, int(2), int(3)).unwrap(), int(5));
        assert_eq!(apply_binary(Operator::Sub, int(2), int(3)).unwrap(), int(-1));
        assert_eq!(apply_binary(Operator::Times, int(4), int(3)).unwrap(), int(12));
        assert_eq!(apply_binary(Operator::Mod, int(7), int(3)).unwrap(), int(1));
    }

    #[test]
    fn test_float_promotion() {
        assert_eq!(
            apply_binary(Operator::Add, int(1), TemplateValue::Float(0.5)).unwrap(),
            TemplateValue::Float(1.5)
        );
        assert_eq!(
            apply_binary(Operator::Div, int(10), int(4)).unwrap(),
            TemplateValue::Float(2.5)
        );
        assert_eq!(
            apply_binary(Operator::Div, int(10), int(2)).unwrap().render(),
            "5.0"
        );
    }

    #[test]
    fn test_integer_division_and_times() {
        assert_eq!(apply_binary(Operator::IntDiv, int(7), int(2)).unwrap(), int(3));
        assert_eq!(apply_binary(Operator::IntDiv, int(-7), int(2)).unwrap(), int(-3));
        assert_eq!(
            apply_binary(Operator::IntTimes, TemplateValue::Float(2.5), int(3)).unwrap(),
            int(7)
        );
    }

    #[test]
    fn test_division_by_zero() {
        for operator in [Operator::Div, Operator::IntDiv, Operator::Mod] {
            assert!(matches!(
                apply_binary(operator, int(1), int(0)),
                Err(CalculateError::DivisionByZero)
            ));
        }
    }

    #[test]
    fn test_overflow() {
        assert!(matches!(
            apply_binary(Operator::Add, int(i64::MAX), int(1)),
            Err(CalculateError::Overflow("+"))
        ));
    }

    #[test]
    fn test_add_concatenates_text() {
        assert_eq!(apply_binary(Operator::Add, s("a"), int(1)).unwrap(), s("a1"));
        assert_eq!(
            apply_binary(Operator::Add, TemplateValue::Char('x'), s("y")).unwrap(),
            s("xy")
        );
        assert_eq!(
            apply_binary(
                Operator::Add,
                TemplateValue::from(vec![1]),
                TemplateValue::from(vec![2])
            )
            .unwrap(),
            TemplateValue::from(vec![1, 2])
        );
    }

    #[test]
    fn test_type_mismatch() {
        let err = apply_binary(Operator::Sub, s("a"), int(1)).unwrap_err();
        assert!(matches!(
            err,
            CalculateError::TypeMismatch {
                operator: "-",
                left: "string",
                right: "integer"
            }
        ));
    }

    #[test]
    fn test_equality() {
        assert!(values_equal(&int(1), &TemplateValue::Float(1.0)));
        assert!(values_equal(&TemplateValue::Char('a'), &s("a")));
        assert!(!values_equal(&TemplateValue::Char('a'), &s("ab")));
        assert!(!values_equal(&int(1), &s("1")));
    }

    #[test]
    fn test_comparison() {
        assert_eq!(
            apply_binary(Operator::Less, int(1), TemplateValue::Float(1.5)).unwrap(),
            TemplateValue::Bool(true)
        );
        assert_eq!(
            apply_binary(Operator::GreaterOrEqual, s("b"), s("a")).unwrap(),
            TemplateValue::Bool(true)
        );
        assert!(apply_binary(Operator::Less, int(1), s("a")).is_err());
    }

    #[test]
    fn test_text_operators() {
        assert_eq!(
            apply_binary(Operator::StartsWith, s("hello"), s("he")).unwrap(),
            TemplateValue::Bool(true)
        );
        assert_eq!(
            apply_binary(Operator::EndsWith, TemplateValue::from(vec![1, 2]), int(2)).unwrap(),
            TemplateValue::Bool(true)
        );
        assert_eq!(
            apply_binary(Operator::Matches, s("abc123"), s("[a-z]+[0-9]+")).unwrap(),
            TemplateValue::Bool(true)
        );
        // whole-string match
        assert_eq!(
            apply_binary(Operator::Matches, s("xabc"), s("abc")).unwrap(),
            TemplateValue::Bool(false)
        );
        assert!(matches!(
            apply_binary(Operator::Matches, s("a"), s("(")),
            Err(CalculateError::InvalidRegex(_))
        ));
        assert!(matches!(
            apply_binary(Operator::Matches, s("xxb"), s("a)|(b")),
            Err(CalculateError::InvalidRegex(_))
        ));
        assert_eq!(
            apply_binary(Operator::Matches, s("b"), s("a|b")).unwrap(),
            TemplateValue::Bool(true)
        );
        assert_eq!(
            apply_binary(Operator::Matches, s("ab"), s("a|b")).unwrap(),
            TemplateValue::Bool(false)
        );
    }

    #[test]
    fn test_in_operator() {
        assert_eq!(
            apply_binary(Operator::In, int(2), TemplateValue::from(vec![1, 2, 3])).unwrap(),
            TemplateValue::Bool(true)
        );
        assert_eq!(
            apply_binary(Operator::In, s("ell"), s("hello")).unwrap(),
            TemplateValue::Bool(true)
        );
        let mut map = IndexMap::new();
        map.insert("k".to_string(), TemplateValue::Null);
        assert_eq!(
            apply_binary(Operator::In, s("k"), TemplateValue::Map(map)).unwrap(),
            TemplateValue::Bool(true)
        );
    }

    #[test]
    fn test_logic_and_not() {
        assert_eq!(
            apply_binary(Operator::And, int(1), s("")).unwrap(),
            TemplateValue::Bool(false)
        );
        assert_eq!(
            apply_binary(Operator::Or, TemplateValue::Null, s("x")).unwrap(),
            TemplateValue::Bool(true)
        );
        assert_eq!(
            apply_unary(UnaryOperator::Not, TemplateValue::Null),
            TemplateValue::Bool(true)
        );
        assert_eq!(
            apply_unary(UnaryOperator::Not, s("x")),
            TemplateValue::Bool(false)
        );
    }
}
