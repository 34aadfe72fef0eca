/*
 * expression.rs
 * Copyright (c) 2025 Posit, PBC
 */

//! Expression grammar.
//!
//! Precedence levels, loosest first:
//!
//! 1. `startsWith` `endsWith` `matches` `in`
//! 2. `or`
//! 3. `and`
//! 4. `==` `!=`
//! 5. `<=` `>=` `<` `>` (operands may be prefixed with `not`)
//! 6. `+` `-`
//! 7. `//` `**` `*` `/` `%`
//! 8. ternary `primary ? expr : expr`, or a primary
//!
//! Every rule consumes the spacing that follows it. Rules returning
//! `Ok(None)` leave the cursor where they found it.

use super::{ParseResult, Parser};
use crate::ast::{
    BinaryOperation, Composition, Expression, FunctionCall, ListExpression, Literal,
    MapSelection, Operator, Selection, Ternary, UnaryOperation, UnaryOperator,
};
use crate::error::ParseErrorKind;

const TEST_OPERATORS: &[Operator] = &[
    Operator::StartsWith,
    Operator::EndsWith,
    Operator::Matches,
    Operator::In,
];
const OR_OPERATORS: &[Operator] = &[Operator::Or];
const AND_OPERATORS: &[Operator] = &[Operator::And];
const EQUALITY_OPERATORS: &[Operator] = &[Operator::Equal, Operator::Different];
const RELATIONAL_OPERATORS: &[Operator] = &[
    Operator::LessOrEqual,
    Operator::GreaterOrEqual,
    Operator::Less,
    Operator::Greater,
];
const ADDITIVE_OPERATORS: &[Operator] = &[Operator::Add, Operator::Sub];
// Longest symbols first so `//` and `**` are not read as `/` and `*`.
const MULTIPLICATIVE_OPERATORS: &[Operator] = &[
    Operator::IntDiv,
    Operator::IntTimes,
    Operator::Times,
    Operator::Div,
    Operator::Mod,
];

type OperandRule<'a> = fn(&mut Parser<'a>) -> ParseResult<Option<Expression>>;

impl<'a> Parser<'a> {
    /// Parse an expression if one starts here.
    pub(crate) fn expression(&mut self) -> ParseResult<Option<Expression>> {
        self.binary_level(TEST_OPERATORS, Self::or_expression)
    }

    /// Parse an expression, failing with `ExpectingExpression` if none starts here.
    pub(crate) fn required_expression(&mut self) -> ParseResult<Expression> {
        let start = self.cursor.offset();
        match self.expression()? {
            Some(expression) => Ok(expression),
            None => Err(self
                .cursor
                .error(ParseErrorKind::ExpectingExpression, start)),
        }
    }

    fn or_expression(&mut self) -> ParseResult<Option<Expression>> {
        self.binary_level(OR_OPERATORS, Self::and_expression)
    }

    fn and_expression(&mut self) -> ParseResult<Option<Expression>> {
        self.binary_level(AND_OPERATORS, Self::equality_expression)
    }

    fn equality_expression(&mut self) -> ParseResult<Option<Expression>> {
        self.binary_level(EQUALITY_OPERATORS, Self::relational_expression)
    }

    fn relational_expression(&mut self) -> ParseResult<Option<Expression>> {
        self.binary_level(RELATIONAL_OPERATORS, Self::relational_operand)
    }

    fn relational_operand(&mut self) -> ParseResult<Option<Expression>> {
        let start = self.cursor.offset();
        if !self.cursor.eat_keyword(UnaryOperator::Not.symbol()) {
            return self.additive_expression();
        }
        match self.additive_expression()? {
            Some(operand) => Ok(Some(Expression::Unary(UnaryOperation {
                operator: UnaryOperator::Not,
                operand: Box::new(operand),
            }))),
            None => Err(self
                .cursor
                .error(ParseErrorKind::ExpectingExpression, start)),
        }
    }

    fn additive_expression(&mut self) -> ParseResult<Option<Expression>> {
        self.binary_level(ADDITIVE_OPERATORS, Self::multiplicative_expression)
    }

    fn multiplicative_expression(&mut self) -> ParseResult<Option<Expression>> {
        self.binary_level(MULTIPLICATIVE_OPERATORS, Self::extended_primary)
    }

    /// One precedence level: `operand (operator operand)*`, collected flat.
    ///
    /// An operator not followed by an operand is left unconsumed, so `%` in
    /// front of `}` is seen as the end of a directive.
    fn binary_level(
        &mut self,
        operators: &[Operator],
        operand: OperandRule<'a>,
    ) -> ParseResult<Option<Expression>> {
        let Some(first) = operand(self)? else {
            return Ok(None);
        };

        let mut operands = vec![first];
        let mut found = Vec::new();
        loop {
            let save = self.cursor.offset();
            let Some(operator) = self.operator(operators) else {
                break;
            };
            match operand(self)? {
                Some(next) => {
                    operands.push(next);
                    found.push(operator);
                }
                None => {
                    self.cursor.reset(save);
                    break;
                }
            }
        }

        Ok(Some(simplify(operands, found)))
    }

    fn operator(&mut self, operators: &[Operator]) -> Option<Operator> {
        operators.iter().copied().find(|operator| {
            if operator.is_word() {
                self.cursor.eat_keyword(operator.symbol())
            } else {
                self.cursor.eat_free(operator.symbol())
            }
        })
    }

    fn extended_primary(&mut self) -> ParseResult<Option<Expression>> {
        let start = self.cursor.offset();
        let Some(condition) = self.primary()? else {
            return Ok(None);
        };
        if !self.cursor.eat_free("?") {
            return Ok(Some(condition));
        }

        let if_true = self.required_expression()?;
        if !self.cursor.eat_free(":") {
            return Err(self.cursor.error(ParseErrorKind::Expected("':'"), start));
        }
        let if_false = self.required_expression()?;
        Ok(Some(Expression::Ternary(Ternary {
            condition: Box::new(condition),
            if_true: Box::new(if_true),
            if_false: Box::new(if_false),
        })))
    }

    /// A basic or parenthesized expression, then `.step`s, then `| stage`s.
    pub(crate) fn primary(&mut self) -> ParseResult<Option<Expression>> {
        let base = if self.cursor.starts_with("(") {
            self.parenthesized()?
        } else {
            match self.basic()? {
                Some(base) => base,
                None => return Ok(None),
            }
        };
        let selected = self.selection_chain(base)?;
        self.composition_chain(selected).map(Some)
    }

    fn parenthesized(&mut self) -> ParseResult<Expression> {
        let start = self.cursor.offset();
        self.cursor.eat_free("(");
        let inner = self.required_expression()?;
        if !self.cursor.eat_free(")") {
            return Err(self.cursor.error(ParseErrorKind::Expected("')'"), start));
        }
        Ok(inner)
    }

    fn selection_chain(&mut self, base: Expression) -> ParseResult<Expression> {
        let mut steps = Vec::new();
        loop {
            let save = self.cursor.offset();
            if self.cursor.starts_with("..") || !self.cursor.eat_free(".") {
                break;
            }
            match self.selection_step()? {
                Some(step) => steps.push(step),
                None => {
                    self.cursor.reset(save);
                    break;
                }
            }
        }

        if steps.is_empty() {
            Ok(base)
        } else {
            Ok(Expression::Selection(Selection {
                base: Box::new(base),
                steps,
            }))
        }
    }

    fn selection_step(&mut self) -> ParseResult<Option<Expression>> {
        let Some(name) = self.cursor.identifier() else {
            return Ok(None);
        };
        if let Some(key) = self.map_key()? {
            return Ok(Some(Expression::MapSelection(MapSelection {
                variable: name.to_string(),
                key,
            })));
        }
        if let Some(arguments) = self.arguments()? {
            return Ok(Some(function_call(name, arguments)));
        }
        self.cursor.skip_spacing();
        Ok(Some(Expression::Variable(name.to_string())))
    }

    fn composition_chain(&mut self, base: Expression) -> ParseResult<Expression> {
        let mut stages = Vec::new();
        loop {
            let save = self.cursor.offset();
            if !self.cursor.eat_free("|") {
                break;
            }
            match self.function_reference()? {
                Some(stage) => stages.push(stage),
                None => {
                    self.cursor.reset(save);
                    break;
                }
            }
        }

        if stages.is_empty() {
            Ok(base)
        } else {
            Ok(Expression::Composition(Composition {
                base: Box::new(base),
                stages,
            }))
        }
    }

    /// A composition stage or `for` filter: `name(args)` or a bare `name`.
    pub(crate) fn function_reference(&mut self) -> ParseResult<Option<Expression>> {
        let Some(name) = self.cursor.identifier() else {
            return Ok(None);
        };
        if let Some(arguments) = self.arguments()? {
            return Ok(Some(function_call(name, arguments)));
        }
        self.cursor.skip_spacing();
        Ok(Some(Expression::Variable(name.to_string())))
    }

    fn basic(&mut self) -> ParseResult<Option<Expression>> {
        if let Some(list) = self.list_literal()? {
            return Ok(Some(Expression::List(list)));
        }
        if let Some(map) = self.map_literal()? {
            return Ok(Some(map));
        }
        if let Some(literal) = self.scalar_literal()? {
            return Ok(Some(Expression::Literal(literal)));
        }
        self.declared()
    }

    fn list_literal(&mut self) -> ParseResult<Option<ListExpression>> {
        let start = self.cursor.offset();

        if let Some(from) = self.cursor.integer() {
            self.cursor.skip_spacing();
            if self.cursor.eat_free("..") {
                if let Some(to) = self.cursor.integer() {
                    self.cursor.skip_spacing();
                    return Ok(Some(ListExpression::IntRange(from, to)));
                }
            }
            self.cursor.reset(start);
        }

        if let Some(from) = self.cursor.char_literal() {
            self.cursor.skip_spacing();
            if self.cursor.eat_free("..") {
                if let Some(to) = self.cursor.char_literal() {
                    self.cursor.skip_spacing();
                    return Ok(Some(ListExpression::CharRange(from, to)));
                }
            }
            self.cursor.reset(start);
        }

        if !self.cursor.eat_free("[") {
            return Ok(None);
        }
        let mut items = Vec::new();
        if !self.cursor.eat_free("]") {
            items.push(self.required_expression()?);
            while self.cursor.eat_free(",") {
                items.push(self.required_expression()?);
            }
            if !self.cursor.eat_free("]") {
                return Err(self.cursor.error(ParseErrorKind::Expected("']'"), start));
            }
        }
        Ok(Some(ListExpression::Enumeration(items)))
    }

    fn map_literal(&mut self) -> ParseResult<Option<Expression>> {
        let start = self.cursor.offset();
        if !self.cursor.eat_free("{") {
            return Ok(None);
        }

        let mut entries = Vec::new();
        if self.cursor.eat_free("}") {
            return Ok(Some(Expression::Map(entries)));
        }
        loop {
            let key = match self.cursor.identifier() {
                Some(key) => key.to_string(),
                None => match self.cursor.string_literal()? {
                    Some(key) => key,
                    None => {
                        return Err(self
                            .cursor
                            .error(ParseErrorKind::Expected("map key"), start));
                    }
                },
            };
            self.cursor.skip_spacing();
            if !self.cursor.eat_free(":") {
                return Err(self.cursor.error(ParseErrorKind::Expected("':'"), start));
            }
            entries.push((key, self.required_expression()?));

            if self.cursor.eat_free(",") {
                continue;
            }
            if self.cursor.eat_free("}") {
                return Ok(Some(Expression::Map(entries)));
            }
            return Err(self.cursor.error(ParseErrorKind::Expected("'}'"), start));
        }
    }

    fn scalar_literal(&mut self) -> ParseResult<Option<Literal>> {
        let literal = if let Some(text) = self.cursor.string_literal()? {
            Literal::String(text)
        } else if self.cursor.eat_keyword("true") {
            return Ok(Some(Literal::Bool(true)));
        } else if self.cursor.eat_keyword("false") {
            return Ok(Some(Literal::Bool(false)));
        } else if let Some(value) = self.cursor.double() {
            Literal::Float(value)
        } else if let Some(value) = self.cursor.integer() {
            Literal::Int(value)
        } else if self.cursor.eat_keyword("null") {
            return Ok(Some(Literal::Null));
        } else {
            return Ok(None);
        };
        self.cursor.skip_spacing();
        Ok(Some(literal))
    }

    /// Map selection, function call or variable.
    fn declared(&mut self) -> ParseResult<Option<Expression>> {
        let Some(name) = self.cursor.identifier() else {
            return Ok(None);
        };

        if let Some(key) = self.map_key()? {
            return Ok(Some(Expression::MapSelection(MapSelection {
                variable: name.to_string(),
                key,
            })));
        }
        if let Some(arguments) = self.arguments()? {
            return Ok(Some(function_call(name, arguments)));
        }

        self.cursor.skip_spacing();
        // `name primary` calls `name` with a single argument. A leading `-`
        // stays an operator so `a -1` is a subtraction.
        if !self.cursor.starts_with("-") {
            let save = self.cursor.offset();
            if let Some(argument) = self.primary()? {
                return Ok(Some(function_call(name, vec![argument])));
            }
            self.cursor.reset(save);
        }
        Ok(Some(Expression::Variable(name.to_string())))
    }

    /// `["key"]` directly after a name.
    fn map_key(&mut self) -> ParseResult<Option<String>> {
        let save = self.cursor.offset();
        if !self.cursor.eat_free("[") {
            return Ok(None);
        }
        if let Some(key) = self.cursor.string_literal()? {
            self.cursor.skip_spacing();
            if self.cursor.eat_free("]") {
                return Ok(Some(key));
            }
        }
        self.cursor.reset(save);
        Ok(None)
    }

    /// `(e1, e2, ...)` directly after a name.
    fn arguments(&mut self) -> ParseResult<Option<Vec<Expression>>> {
        let start = self.cursor.offset();
        if !self.cursor.eat_free("(") {
            return Ok(None);
        }
        let mut arguments = Vec::new();
        if self.cursor.eat_free(")") {
            return Ok(Some(arguments));
        }
        arguments.push(self.required_expression()?);
        while self.cursor.eat_free(",") {
            arguments.push(self.required_expression()?);
        }
        if !self.cursor.eat_free(")") {
            return Err(self.cursor.error(ParseErrorKind::Expected("')'"), start));
        }
        Ok(Some(arguments))
    }
}

fn function_call(name: &str, arguments: Vec<Expression>) -> Expression {
    Expression::FunctionCall(FunctionCall {
        name: name.to_string(),
        arguments,
    })
}

/// A level that matched a single operand yields that operand.
fn simplify(mut operands: Vec<Expression>, operators: Vec<Operator>) -> Expression {
    if operators.is_empty() {
        if let Some(single) = operands.pop() {
            return single;
        }
    }
    Expression::Binary(BinaryOperation {
        operands,
        operators,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_expression;
    use pretty_assertions::assert_eq;

    fn var(name: &str) -> Expression {
        Expression::Variable(name.to_string())
    }

    fn int(n: i64) -> Expression {
        Expression::Literal(Literal::Int(n))
    }

    fn string(s: &str) -> Expression {
        Expression::Literal(Literal::String(s.to_string()))
    }

    fn binary(operands: Vec<Expression>, operators: Vec<Operator>) -> Expression {
        Expression::Binary(BinaryOperation {
            operands,
            operators,
        })
    }

    #[test]
    fn test_single_operand_is_simplified() {
        assert_eq!(parse_expression("42").unwrap(), int(42));
        assert_eq!(parse_expression("  name  ").unwrap(), var("name"));
    }

    #[test]
    fn test_flat_left_associative_chain() {
        assert_eq!(
            parse_expression("10 - 2 - 3").unwrap(),
            binary(
                vec![int(10), int(2), int(3)],
                vec![Operator::Sub, Operator::Sub]
            )
        );
    }

    #[test]
    fn test_precedence_levels() {
        // a or b and c == 1  ->  a or (b and (c == 1))
        let expected = binary(
            vec![
                var("a"),
                binary(
                    vec![
                        var("b"),
                        binary(vec![var("c"), int(1)], vec![Operator::Equal]),
                    ],
                    vec![Operator::And],
                ),
            ],
            vec![Operator::Or],
        );
        assert_eq!(parse_expression("a or b and c == 1").unwrap(), expected);

        let expected = binary(
            vec![
                int(1),
                binary(vec![int(2), int(3)], vec![Operator::Times]),
            ],
            vec![Operator::Add],
        );
        assert_eq!(parse_expression("1 + 2 * 3").unwrap(), expected);
    }

    #[test]
    fn test_longest_operator_wins() {
        assert_eq!(
            parse_expression("7 // 2").unwrap(),
            binary(vec![int(7), int(2)], vec![Operator::IntDiv])
        );
        assert_eq!(
            parse_expression("a <= b").unwrap(),
            binary(vec![var("a"), var("b")], vec![Operator::LessOrEqual])
        );
    }

    #[test]
    fn test_not_operand() {
        assert_eq!(
            parse_expression("not a == b").unwrap(),
            binary(
                vec![
                    Expression::Unary(UnaryOperation {
                        operator: UnaryOperator::Not,
                        operand: Box::new(var("a")),
                    }),
                    var("b"),
                ],
                vec![Operator::Equal]
            )
        );
    }

    #[test]
    fn test_word_operators() {
        assert_eq!(
            parse_expression("name startsWith \"A\"").unwrap(),
            binary(vec![var("name"), string("A")], vec![Operator::StartsWith])
        );
        assert_eq!(
            parse_expression("x in [1, 2]").unwrap(),
            binary(
                vec![
                    var("x"),
                    Expression::List(ListExpression::Enumeration(vec![int(1), int(2)]))
                ],
                vec![Operator::In]
            )
        );
    }

    #[test]
    fn test_ranges() {
        assert_eq!(
            parse_expression("1..5").unwrap(),
            Expression::List(ListExpression::IntRange(1, 5))
        );
        assert_eq!(
            parse_expression("'a' .. 'e'").unwrap(),
            Expression::List(ListExpression::CharRange('a', 'e'))
        );
        assert_eq!(parse_expression("'a'").unwrap(), string("a"));
    }

    #[test]
    fn test_literals() {
        assert_eq!(
            parse_expression("3.5").unwrap(),
            Expression::Literal(Literal::Float(3.5))
        );
        assert_eq!(
            parse_expression("-4").unwrap(),
            Expression::Literal(Literal::Int(-4))
        );
        assert_eq!(
            parse_expression("null").unwrap(),
            Expression::Literal(Literal::Null)
        );
        assert_eq!(
            parse_expression("true").unwrap(),
            Expression::Literal(Literal::Bool(true))
        );
        assert_eq!(parse_expression("trueish").unwrap(), var("trueish"));
    }

    #[test]
    fn test_map_literal() {
        assert_eq!(
            parse_expression("{ a: 1, \"b c\": x }").unwrap(),
            Expression::Map(vec![
                ("a".to_string(), int(1)),
                ("b c".to_string(), var("x")),
            ])
        );
        assert_eq!(parse_expression("{}").unwrap(), Expression::Map(vec![]));
    }

    #[test]
    fn test_selection_and_composition() {
        let expected = Expression::Composition(Composition {
            base: Box::new(Expression::Selection(Selection {
                base: Box::new(var("user")),
                steps: vec![
                    var("address"),
                    Expression::MapSelection(MapSelection {
                        variable: "lines".to_string(),
                        key: "first".to_string(),
                    }),
                ],
            })),
            stages: vec![
                var("upper"),
                function_call("default", vec![string("n/a")]),
            ],
        });
        assert_eq!(
            parse_expression("user.address.lines[\"first\"] | upper | default(\"n/a\")")
                .unwrap(),
            expected
        );
    }

    #[test]
    fn test_function_forms() {
        assert_eq!(
            parse_expression("format(\"%s\", a, 1)").unwrap(),
            function_call("format", vec![string("%s"), var("a"), int(1)])
        );
        assert_eq!(
            parse_expression("now()").unwrap(),
            function_call("now", vec![])
        );
        assert_eq!(
            parse_expression("upper name").unwrap(),
            function_call("upper", vec![var("name")])
        );
        // a leading minus is subtraction, not a bare argument
        assert_eq!(
            parse_expression("a -1").unwrap(),
            binary(vec![var("a"), int(1)], vec![Operator::Sub])
        );
    }

    #[test]
    fn test_ternary() {
        assert_eq!(
            parse_expression("flag ? \"yes\" : \"no\"").unwrap(),
            Expression::Ternary(Ternary {
                condition: Box::new(var("flag")),
                if_true: Box::new(string("yes")),
                if_false: Box::new(string("no")),
            })
        );
    }

    #[test]
    fn test_parenthesized_overrides_precedence() {
        assert_eq!(
            parse_expression("(1 + 2) * 3").unwrap(),
            binary(
                vec![
                    binary(vec![int(1), int(2)], vec![Operator::Add]),
                    int(3)
                ],
                vec![Operator::Times]
            )
        );
    }

    #[test]
    fn test_map_selection() {
        assert_eq!(
            parse_expression("config[\"key\"]").unwrap(),
            Expression::MapSelection(MapSelection {
                variable: "config".to_string(),
                key: "key".to_string(),
            })
        );
    }

    #[test]
    fn test_missing_operand_after_comma() {
        let err = parse_expression("f(1, )").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectingExpression);
    }

    #[test]
    fn test_unclosed_list() {
        let err = parse_expression("[1, 2").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::Expected("']'"));
    }

    #[test]
    fn test_not_without_operand() {
        let err = parse_expression("not").unwrap_err();
        assert_eq!(err.kind, ParseErrorKind::ExpectingExpression);
    }
}
