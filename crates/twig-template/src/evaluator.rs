/*
 * evaluator.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Template evaluation engine.
//!
//! This module walks compiled [`Content`] against an [`EvalContext`] and
//! writes the output to a sink. Expressions are evaluated by [`evaluate`].

use crate::ast::{
    Composition, Content, Directive, Expression, ForNode, ForTarget, FunctionCall, IfNode,
    IncludeDirective, ListExpression, Literal, MapSelection, Node, Position, Selection,
};
use crate::context::TemplateValue;
use crate::error::{CalculateError, CompileError, RenderError};
use crate::eval_context::EvalContext;
use crate::operators::{apply_binary, apply_unary};
use indexmap::IndexMap;
use std::io::Write;

type CalculateResult = Result<TemplateValue, CalculateError>;

/// Render a content tree.
pub fn render_content(
    content: &Content,
    ctx: &mut EvalContext,
    out: &mut dyn Write,
) -> Result<(), RenderError> {
    for node in content.nodes() {
        render_node(node, ctx, out)?;
    }
    Ok(())
}

fn render_node(node: &Node, ctx: &mut EvalContext, out: &mut dyn Write) -> Result<(), RenderError> {
    match node {
        Node::Text(text) => out.write_all(text.text.as_bytes())?,

        Node::Output(output) => {
            let value = evaluate(&output.expression, ctx)
                .map_err(calculate_error(Directive::Output, output.position))?;
            write!(out, "{}", value)?;
        }

        Node::Block(block) => render_content(&block.content, ctx, out)?,

        Node::If(if_node) => render_if(if_node, ctx, out)?,

        Node::For(for_node) => render_for(for_node, ctx, out)?,

        Node::Set(set) => {
            let value = evaluate(&set.assignment, ctx)
                .map_err(calculate_error(Directive::Set, set.position))?;
            ctx.set(set.name.as_str(), value);
        }

        Node::Include(include) => render_include(include, ctx, out)?,
    }
    Ok(())
}

fn calculate_error(
    directive: Directive,
    position: Position,
) -> impl FnOnce(CalculateError) -> RenderError {
    move |source| RenderError::Calculate {
        directive,
        position,
        source,
    }
}

fn render_if(if_node: &IfNode, ctx: &mut EvalContext, out: &mut dyn Write) -> Result<(), RenderError> {
    for (condition, body) in &if_node.branches {
        let value = evaluate(condition, ctx).map_err(calculate_error(Directive::If, if_node.position))?;
        if value.is_truthy() {
            return render_content(body, ctx, out);
        }
    }
    match &if_node.else_branch {
        Some(else_body) => render_content(else_body, ctx, out),
        None => Ok(()),
    }
}

/// Evaluate a for loop.
///
/// Lists yield `(index, element)`, maps yield `(key, value)`. Null iterates
/// zero times and any other value once. Each iteration runs in its own frame
/// with `loop` bound to `{index, index1, first, last, length}`.
fn render_for(for_node: &ForNode, ctx: &mut EvalContext, out: &mut dyn Write) -> Result<(), RenderError> {
    let mut collection = evaluate(&for_node.iterable, ctx)
        .map_err(calculate_error(Directive::For, for_node.position))?;
    for filter in &for_node.filters {
        collection = apply_stage(filter, collection, ctx)
            .map_err(calculate_error(Directive::For, for_node.position))?;
    }

    let entries: Vec<(TemplateValue, TemplateValue)> = match collection {
        TemplateValue::Null => Vec::new(),
        TemplateValue::List(items) => items
            .into_iter()
            .enumerate()
            .map(|(index, item)| (TemplateValue::from(index), item))
            .collect(),
        TemplateValue::Map(map) => map
            .into_iter()
            .map(|(key, value)| (TemplateValue::String(key), value))
            .collect(),
        single => vec![(TemplateValue::Int(0), single)],
    };

    let length = entries.len();
    for (index, (key, value)) in entries.into_iter().enumerate() {
        ctx.push_frame();
        match &for_node.target {
            ForTarget::Value(name) => ctx.set(name.as_str(), value),
            ForTarget::Pair(key_name, value_name) => {
                ctx.set(key_name.as_str(), key);
                ctx.set(value_name.as_str(), value);
            }
        }
        ctx.set("loop", loop_variable(index, length));
        let result = render_content(&for_node.body, ctx, out);
        ctx.pop_frame();
        result?;
    }
    Ok(())
}

fn loop_variable(index: usize, length: usize) -> TemplateValue {
    let mut map = IndexMap::new();
    map.insert("index".to_string(), TemplateValue::from(index));
    map.insert("index1".to_string(), TemplateValue::from(index + 1));
    map.insert("first".to_string(), TemplateValue::Bool(index == 0));
    map.insert("last".to_string(), TemplateValue::Bool(index + 1 == length));
    map.insert("length".to_string(), TemplateValue::from(length));
    TemplateValue::Map(map)
}

fn render_include(
    include: &IncludeDirective,
    ctx: &mut EvalContext,
    out: &mut dyn Write,
) -> Result<(), RenderError> {
    let env = ctx.env;
    let max_depth = env.config().max_include_depth;
    if ctx.include_depth >= max_depth {
        return Err(RenderError::RecursiveInclude {
            name: include.name.clone(),
            max_depth,
        });
    }

    tracing::debug!(name = %include.name, depth = ctx.include_depth, "Including template");
    let to_include_error = |source: CompileError| RenderError::Include {
        name: include.name.clone(),
        source,
    };
    let document = env.load_document(&include.name).map_err(to_include_error)?;
    let content = document.compile(env).map_err(to_include_error)?;

    ctx.include_depth += 1;
    let result = render_content(&content, ctx, out);
    ctx.include_depth -= 1;
    result
}

/// Evaluate an expression to a value.
pub fn evaluate(expression: &Expression, ctx: &EvalContext) -> CalculateResult {
    match expression {
        Expression::Literal(literal) => Ok(literal_value(literal)),

        Expression::List(list) => evaluate_list(list, ctx),

        Expression::Map(entries) => {
            let mut map = IndexMap::with_capacity(entries.len());
            for (key, value) in entries {
                map.insert(key.clone(), evaluate(value, ctx)?);
            }
            Ok(TemplateValue::Map(map))
        }

        Expression::Variable(name) => resolve_variable(name, ctx),

        Expression::FunctionCall(call) => {
            let arguments = evaluate_all(&call.arguments, ctx)?;
            call_function(&call.name, &arguments, ctx)
        }

        Expression::Selection(selection) => evaluate_selection(selection, ctx),

        Expression::MapSelection(MapSelection { variable, key }) => {
            let base = resolve_variable(variable, ctx)?;
            index_map(&base, key)
        }

        Expression::Composition(Composition { base, stages }) => {
            let mut value = evaluate(base, ctx)?;
            for stage in stages {
                value = apply_stage(stage, value, ctx)?;
            }
            Ok(value)
        }

        Expression::Binary(binary) => {
            let mut operands = binary.operands.iter();
            let Some(first) = operands.next() else {
                return Ok(TemplateValue::Null);
            };
            let mut accumulated = evaluate(first, ctx)?;
            for (operator, operand) in binary.operators.iter().zip(operands) {
                let right = evaluate(operand, ctx)?;
                accumulated = apply_binary(*operator, accumulated, right)?;
            }
            Ok(accumulated)
        }

        Expression::Unary(unary) => Ok(apply_unary(unary.operator, evaluate(&unary.operand, ctx)?)),

        Expression::Ternary(ternary) => {
            if evaluate(&ternary.condition, ctx)?.is_truthy() {
                evaluate(&ternary.if_true, ctx)
            } else {
                evaluate(&ternary.if_false, ctx)
            }
        }
    }
}

fn literal_value(literal: &Literal) -> TemplateValue {
    match literal {
        Literal::Null => TemplateValue::Null,
        Literal::Bool(b) => TemplateValue::Bool(*b),
        Literal::Int(n) => TemplateValue::Int(*n),
        Literal::Float(x) => TemplateValue::Float(*x),
        Literal::Char(c) => TemplateValue::Char(*c),
        Literal::String(s) => TemplateValue::String(s.clone()),
    }
}

/// Ranges are inclusive and count down when the start is above the end.
fn evaluate_list(list: &ListExpression, ctx: &EvalContext) -> CalculateResult {
    let items = match list {
        ListExpression::Enumeration(items) => evaluate_all(items, ctx)?,
        ListExpression::IntRange(from, to) => {
            check_range_length(from, to, i128::from(*to) - i128::from(*from), ctx)?;
            if from <= to {
                (*from..=*to).map(TemplateValue::Int).collect()
            } else {
                (*to..=*from).rev().map(TemplateValue::Int).collect()
            }
        }
        ListExpression::CharRange(from, to) => {
            check_range_length(from, to, i128::from(*to as u32) - i128::from(*from as u32), ctx)?;
            if from <= to {
                (*from..=*to).map(TemplateValue::Char).collect()
            } else {
                (*to..=*from).rev().map(TemplateValue::Char).collect()
            }
        }
    };
    Ok(TemplateValue::List(items))
}

/// `span` is `to - from`; the range holds `|span| + 1` elements.
fn check_range_length(
    from: &impl ToString,
    to: &impl ToString,
    span: i128,
    ctx: &EvalContext,
) -> Result<(), CalculateError> {
    let max = ctx.env.config().max_range_length;
    if span.unsigned_abs() >= max as u128 {
        return Err(CalculateError::RangeTooLarge {
            from: from.to_string(),
            to: to.to_string(),
            max,
        });
    }
    Ok(())
}

fn evaluate_all(expressions: &[Expression], ctx: &EvalContext) -> Result<Vec<TemplateValue>, CalculateError> {
    expressions.iter().map(|e| evaluate(e, ctx)).collect()
}

fn resolve_variable(name: &str, ctx: &EvalContext) -> CalculateResult {
    match ctx.lookup(name) {
        Some(value) => Ok(value.clone()),
        None if ctx.strict_mode() => Err(CalculateError::UnresolvedVariable(name.to_string())),
        None => Ok(TemplateValue::Null),
    }
}

fn call_function(name: &str, arguments: &[TemplateValue], ctx: &EvalContext) -> CalculateResult {
    match ctx.env.functions().call(name, arguments) {
        Some(result) => result.map_err(|source| CalculateError::Function {
            name: name.to_string(),
            source,
        }),
        None => Err(CalculateError::UnknownFunction(name.to_string())),
    }
}

/// Call a stage with `value` prepended to its arguments.
fn apply_stage(stage: &Expression, value: TemplateValue, ctx: &EvalContext) -> CalculateResult {
    match stage {
        Expression::FunctionCall(FunctionCall { name, arguments }) => {
            let mut all = Vec::with_capacity(arguments.len() + 1);
            all.push(value);
            for argument in arguments {
                all.push(evaluate(argument, ctx)?);
            }
            call_function(name, &all, ctx)
        }
        Expression::Variable(name) => call_function(name, &[value], ctx),
        other => Err(CalculateError::UnknownFunction(format!("{:?}", other))),
    }
}

fn evaluate_selection(selection: &Selection, ctx: &EvalContext) -> CalculateResult {
    let mut value = evaluate(&selection.base, ctx)?;
    for step in &selection.steps {
        value = match step {
            Expression::Variable(property) => read_property(&value, property)?,
            Expression::FunctionCall(_) => apply_stage(step, value, ctx)?,
            Expression::MapSelection(MapSelection { variable, key }) => {
                let inner = read_property(&value, variable)?;
                index_map(&inner, key)?
            }
            other => evaluate(other, ctx)?,
        };
    }
    Ok(value)
}

fn read_property(value: &TemplateValue, property: &str) -> CalculateResult {
    match value {
        TemplateValue::Map(map) => {
            map.get(property)
                .cloned()
                .ok_or_else(|| CalculateError::UnknownProperty {
                    property: property.to_string(),
                    found: value.type_name(),
                })
        }
        _ => Err(CalculateError::UnknownProperty {
            property: property.to_string(),
            found: value.type_name(),
        }),
    }
}

/// `map["key"]`: a missing key is null.
fn index_map(value: &TemplateValue, key: &str) -> CalculateResult {
    match value {
        TemplateValue::Map(map) => Ok(map.get(key).cloned().unwrap_or_default()),
        _ => Err(CalculateError::UnknownProperty {
            property: key.to_string(),
            found: value.type_name(),
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::TemplateContext;
    use crate::environment::Environment;
    use crate::functions::map_value;
    use crate::parser::parse_expression;
    use crate::{EngineConfig, Template};
    use pretty_assertions::assert_eq;

    fn eval(source: &str, vars: &TemplateContext) -> CalculateResult {
        let env = Environment::default();
        let ctx = EvalContext::new(&env, vars);
        evaluate(&parse_expression(source).unwrap(), &ctx)
    }

    fn eval_ok(source: &str) -> TemplateValue {
        eval(source, &TemplateContext::new()).unwrap()
    }

    fn render(source: &str, vars: &TemplateContext) -> String {
        Environment::default().render_str(source, vars).unwrap()
    }

    #[test]
    fn test_left_fold() {
        assert_eq!(eval_ok("10 - 2 - 3"), TemplateValue::Int(5));
        assert_eq!(eval_ok("2 + 3 * 4"), TemplateValue::Int(14));
        assert_eq!(eval_ok("(2 + 3) * 4"), TemplateValue::Int(20));
    }

    #[test]
    fn test_ranges() {
        assert_eq!(eval_ok("1..3"), TemplateValue::from(vec![1, 2, 3]));
        assert_eq!(eval_ok("3..1"), TemplateValue::from(vec![3, 2, 1]));
        assert_eq!(eval_ok("'a'..'c'"), TemplateValue::from(vec!['a', 'b', 'c']));
    }

    #[test]
    fn test_oversized_range_is_rejected() {
        let vars = TemplateContext::new();
        for source in ["0..9223372036854775807", "-9223372036854775808..0", "5..-200000"] {
            assert!(matches!(
                eval(source, &vars),
                Err(CalculateError::RangeTooLarge { max: 100_000, .. })
            ));
        }

        let env = Environment::default()
            .with_config(EngineConfig::default().with_max_range_length(3));
        let ctx = EvalContext::new(&env, &vars);
        let three = parse_expression("1..3").unwrap();
        assert_eq!(evaluate(&three, &ctx).unwrap(), TemplateValue::from(vec![1, 2, 3]));
        let four = parse_expression("'a'..'d'").unwrap();
        assert!(matches!(
            evaluate(&four, &ctx),
            Err(CalculateError::RangeTooLarge { max: 3, .. })
        ));

        let err = env
            .render_str("{% for i in 1..10000000000 %}{{ i }}{% endfor %}", &vars)
            .unwrap_err();
        assert!(matches!(
            err,
            crate::TemplateError::Render(RenderError::Calculate {
                directive: Directive::For,
                source: CalculateError::RangeTooLarge { .. },
                ..
            })
        ));
    }

    #[test]
    fn test_map_literal_keeps_order() {
        assert_eq!(eval_ok("{ b: 1, a: 2 }").render(), "{b=1, a=2}");
    }

    #[test]
    fn test_unresolved_variable() {
        assert!(matches!(
            eval("missing", &TemplateContext::new()),
            Err(CalculateError::UnresolvedVariable(name)) if name == "missing"
        ));
    }

    #[test]
    fn test_lenient_variables() {
        let env =
            Environment::default().with_config(EngineConfig::default().with_strict_variables(false));
        let vars = TemplateContext::new();
        let ctx = EvalContext::new(&env, &vars);
        let value = evaluate(&parse_expression("missing").unwrap(), &ctx).unwrap();
        assert_eq!(value, TemplateValue::Null);
    }

    #[test]
    fn test_selection() {
        let vars = TemplateContext::new().with(
            "user",
            map_value([
                ("name", TemplateValue::from("ada")),
                ("tags", map_value([("lang", "rust")])),
            ]),
        );
        assert_eq!(eval("user.name", &vars).unwrap(), TemplateValue::from("ada"));
        assert_eq!(
            eval("user.tags[\"lang\"]", &vars).unwrap(),
            TemplateValue::from("rust")
        );
        assert_eq!(
            eval("user.name.upper()", &vars).unwrap(),
            TemplateValue::from("ADA")
        );
        assert!(matches!(
            eval("user.age", &vars),
            Err(CalculateError::UnknownProperty { found: "map", .. })
        ));
        assert!(matches!(
            eval("user.name.first_letter", &vars),
            Err(CalculateError::UnknownProperty { found: "string", .. })
        ));
    }

    #[test]
    fn test_map_selection_missing_key_is_null() {
        let vars = TemplateContext::new().with("config", map_value([("a", 1)]));
        assert_eq!(eval("config[\"b\"]", &vars).unwrap(), TemplateValue::Null);
        let vars = TemplateContext::new().with("config", 3);
        assert!(eval("config[\"b\"]", &vars).is_err());
    }

    #[test]
    fn test_composition_prepends_value() {
        assert_eq!(
            eval_ok("\"  hi \" | trim | upper"),
            TemplateValue::from("HI")
        );
        assert_eq!(
            eval_ok("[1, 2, 3] | join(\"-\")"),
            TemplateValue::from("1-2-3")
        );
    }

    #[test]
    fn test_unknown_function() {
        assert!(matches!(
            eval("nope(1)", &TemplateContext::new()),
            Err(CalculateError::UnknownFunction(name)) if name == "nope"
        ));
    }

    #[test]
    fn test_function_error_is_wrapped() {
        assert!(matches!(
            eval("json_encode()", &TemplateContext::new()),
            Err(CalculateError::Function { name, .. }) if name == "json_encode"
        ));
    }

    #[test]
    fn test_ternary_evaluates_one_branch() {
        // the untaken branch refers to an undefined variable
        assert_eq!(eval_ok("true ? 1 : undefined"), TemplateValue::Int(1));
        assert_eq!(eval_ok("0 ? undefined : 2"), TemplateValue::Int(2));
    }

    #[test]
    fn test_not_and_logic() {
        assert_eq!(eval_ok("not 1 == 2"), TemplateValue::Bool(false));
        assert_eq!(eval_ok("not (1 == 2)"), TemplateValue::Bool(true));
        assert_eq!(eval_ok("1 < 2 and 3 > 2"), TemplateValue::Bool(true));
    }

    #[test]
    fn test_if_branches() {
        let vars = TemplateContext::new();
        assert_eq!(render("{% if 1 == 1 %}A{% else %}B{% endif %}", &vars), "A");
        assert_eq!(render("{% if 1 == 2 %}A{% else %}B{% endif %}", &vars), "B");
        assert_eq!(
            render("{% if false %}A{% elseif true %}C{% endif %}", &vars),
            "C"
        );
        assert_eq!(render("{% if false %}A{% endif %}", &vars), "");
    }

    #[test]
    fn test_for_value_and_pair() {
        let vars = TemplateContext::new().with("m", map_value([("a", 1), ("b", 2)]));
        assert_eq!(
            render("{% for x in [1,2,3] %}{{ x }}{% endfor %}", &vars),
            "123"
        );
        assert_eq!(
            render("{% for k, v in m %}{{ k }}={{ v }};{% endfor %}", &vars),
            "a=1;b=2;"
        );
        assert_eq!(
            render("{% for v in m %}{{ v }}{% endfor %}", &vars),
            "12"
        );
        assert_eq!(
            render("{% for i, c in 'a'..'c' %}{{ i }}{{ c }}{% endfor %}", &vars),
            "0a1b2c"
        );
    }

    #[test]
    fn test_for_over_null_and_scalar() {
        let vars = TemplateContext::new()
            .with("nothing", TemplateValue::Null)
            .with("one", 7);
        assert_eq!(render("{% for x in nothing %}x{% endfor %}", &vars), "");
        assert_eq!(render("{% for x in one %}[{{ x }}]{% endfor %}", &vars), "[7]");
    }

    #[test]
    fn test_loop_variable() {
        let vars = TemplateContext::new();
        assert_eq!(
            render(
                "{% for x in ['a','b','c'] %}{{ loop.index1 }}{{ x }}{% if not loop.last %},{% endif %}{% endfor %}",
                &vars
            ),
            "1a,2b,3c"
        );
    }

    #[test]
    fn test_for_filters() {
        let vars = TemplateContext::new();
        assert_eq!(
            render("{% for x in [3,1,2] | filter sort | filter reverse %}{{ x }}{% endfor %}", &vars),
            "321"
        );
    }

    #[test]
    fn test_loop_frame_is_discarded() {
        let vars = TemplateContext::new();
        let env = Environment::default()
            .with_config(EngineConfig::default().with_strict_variables(false));
        let output = env
            .render_str(
                "{% set outer = 1 %}{% for x in [1] %}{% set inner = 2 %}{% set outer = 3 %}{% endfor %}{{ inner }}{{ outer }}",
                &vars,
            )
            .unwrap();
        // `set` inside the loop binds in the iteration frame
        assert_eq!(output, "1");
    }

    #[test]
    fn test_set_and_output() {
        let vars = TemplateContext::new();
        assert_eq!(render("{% set x = 1 + 2 %}{{ x }}", &vars), "3");
        assert_eq!(render("{{ 10 / 4 }} {{ 10 / 2 }}", &vars), "2.5 5.0");
    }

    #[test]
    fn test_render_error_carries_directive_and_position() {
        let template = Template::from_source("ab\n  {{ missing }}").unwrap();
        let err = template
            .render(&Environment::default(), &TemplateContext::new())
            .unwrap_err();
        match err {
            RenderError::Calculate {
                directive,
                position,
                source: CalculateError::UnresolvedVariable(name),
            } => {
                assert_eq!(directive, Directive::Output);
                assert_eq!((position.line, position.column), (2, 3));
                assert_eq!(name, "missing");
            }
            other => panic!("unexpected error: {:?}", other),
        }
    }

    #[test]
    fn test_render_is_idempotent() {
        let template =
            Template::from_source("{% set n = n + 1 %}{{ n }}{% for i in 1..2 %}{{ i }}{% endfor %}")
                .unwrap();
        let env = Environment::default();
        let vars = TemplateContext::new().with("n", 1);
        let first = template.render(&env, &vars).unwrap();
        let second = template.render(&env, &vars).unwrap();
        assert_eq!(first, "212");
        assert_eq!(first, second);
    }
}
