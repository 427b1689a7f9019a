//! Row filter for expression conditions in the in-memory store.
//!
//! The SQL text is parsed with `sqlparser` (PostgreSQL dialect) and lowered
//! into a small condition tree: comparisons, `IS [NOT] NULL`,
//! `[NOT] LIKE` / `ILIKE`, `[NOT] IN (...)`, `[NOT] BETWEEN`, `AND` / `OR` /
//! `NOT`, plain or qualified (`t.age`) or quoted (`"age"`) column names and
//! literals. Constructs outside that set are rejected at parse time.
//! Comparisons follow SQL three-valued logic; a row matches only when the
//! whole expression is true.

use crate::persistence::{Row, StoreError, StoreResult};
use regex::Regex;
use serde_json::{Number, Value};
use sqlparser::ast::{BinaryOperator, Expr as SqlExpr, UnaryOperator, Value as SqlValue};
use sqlparser::dialect::PostgreSqlDialect;
use sqlparser::parser::Parser;
use sqlparser::tokenizer::Token;
use std::cmp::Ordering;

#[derive(Debug, Clone, Copy, PartialEq)]
enum CompareOp {
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
}

impl CompareOp {
    fn from_sql(op: &BinaryOperator) -> StoreResult<Self> {
        Ok(match op {
            BinaryOperator::Eq => CompareOp::Eq,
            BinaryOperator::NotEq => CompareOp::NotEq,
            BinaryOperator::Lt => CompareOp::Lt,
            BinaryOperator::LtEq => CompareOp::LtEq,
            BinaryOperator::Gt => CompareOp::Gt,
            BinaryOperator::GtEq => CompareOp::GtEq,
            other => return Err(query_error(format!("unsupported operator '{other}'"))),
        })
    }

    fn holds(self, ordering: Ordering) -> bool {
        match self {
            CompareOp::Eq => ordering == Ordering::Equal,
            CompareOp::NotEq => ordering != Ordering::Equal,
            CompareOp::Lt => ordering == Ordering::Less,
            CompareOp::LtEq => ordering != Ordering::Greater,
            CompareOp::Gt => ordering == Ordering::Greater,
            CompareOp::GtEq => ordering != Ordering::Less,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Operand {
    Column(String),
    Literal(Value),
}

#[derive(Debug, Clone)]
enum Condition {
    And(Box<Condition>, Box<Condition>),
    Or(Box<Condition>, Box<Condition>),
    Not(Box<Condition>),
    Compare(Operand, CompareOp, Operand),
    IsNull {
        operand: Operand,
        negated: bool,
    },
    Like {
        operand: Operand,
        pattern: Regex,
        negated: bool,
    },
    InList {
        operand: Operand,
        list: Vec<Operand>,
        negated: bool,
    },
    Between {
        operand: Operand,
        low: Operand,
        high: Operand,
        negated: bool,
    },
    Truthy(Operand),
}

/// A parsed expression condition
#[derive(Debug, Clone)]
pub struct Predicate(Condition);

impl Predicate {
    pub fn parse(sql: &str) -> StoreResult<Self> {
        let dialect = PostgreSqlDialect {};
        let mut parser = Parser::new(&dialect)
            .try_with_sql(sql)
            .map_err(|e| query_error(format!("invalid expression '{sql}': {e}")))?;
        let expr = parser
            .parse_expr()
            .map_err(|e| query_error(format!("invalid expression '{sql}': {e}")))?;

        let trailing = parser.peek_token();
        if trailing.token != Token::EOF {
            return Err(query_error(format!(
                "unexpected '{}' in '{sql}'",
                trailing.token
            )));
        }

        lower_condition(expr).map(Predicate)
    }

    pub fn matches(&self, row: &Row) -> bool {
        evaluate(&self.0, row) == Some(true)
    }
}

fn query_error(reason: String) -> StoreError {
    StoreError::QueryFailed { reason }
}

fn boxed(expr: SqlExpr) -> StoreResult<Box<Condition>> {
    lower_condition(expr).map(Box::new)
}

fn lower_condition(expr: SqlExpr) -> StoreResult<Condition> {
    match expr {
        SqlExpr::Nested(inner) => lower_condition(*inner),
        SqlExpr::BinaryOp { left, op, right } => match op {
            BinaryOperator::And => Ok(Condition::And(boxed(*left)?, boxed(*right)?)),
            BinaryOperator::Or => Ok(Condition::Or(boxed(*left)?, boxed(*right)?)),
            other => Ok(Condition::Compare(
                lower_operand(*left)?,
                CompareOp::from_sql(&other)?,
                lower_operand(*right)?,
            )),
        },
        SqlExpr::UnaryOp {
            op: UnaryOperator::Not,
            expr,
        } => Ok(Condition::Not(boxed(*expr)?)),
        SqlExpr::IsNull(inner) => Ok(Condition::IsNull {
            operand: lower_operand(*inner)?,
            negated: false,
        }),
        SqlExpr::IsNotNull(inner) => Ok(Condition::IsNull {
            operand: lower_operand(*inner)?,
            negated: true,
        }),
        SqlExpr::Like {
            negated,
            expr,
            pattern,
            escape_char,
            ..
        } => {
            if escape_char.is_some() {
                return Err(query_error("LIKE ... ESCAPE is not supported".to_string()));
            }
            lower_like(*expr, *pattern, negated, false)
        }
        SqlExpr::ILike {
            negated,
            expr,
            pattern,
            escape_char,
            ..
        } => {
            if escape_char.is_some() {
                return Err(query_error("ILIKE ... ESCAPE is not supported".to_string()));
            }
            lower_like(*expr, *pattern, negated, true)
        }
        SqlExpr::InList {
            expr,
            list,
            negated,
        } => Ok(Condition::InList {
            operand: lower_operand(*expr)?,
            list: list
                .into_iter()
                .map(lower_operand)
                .collect::<StoreResult<Vec<_>>>()?,
            negated,
        }),
        SqlExpr::Between {
            expr,
            negated,
            low,
            high,
        } => Ok(Condition::Between {
            operand: lower_operand(*expr)?,
            low: lower_operand(*low)?,
            high: lower_operand(*high)?,
            negated,
        }),
        other => lower_operand(other).map(Condition::Truthy),
    }
}

fn lower_like(
    expr: SqlExpr,
    pattern: SqlExpr,
    negated: bool,
    case_insensitive: bool,
) -> StoreResult<Condition> {
    let Operand::Literal(Value::String(pattern)) = lower_operand(pattern)? else {
        return Err(query_error(
            "LIKE patterns must be string literals".to_string(),
        ));
    };
    Ok(Condition::Like {
        operand: lower_operand(expr)?,
        pattern: like_regex(&pattern, case_insensitive)?,
        negated,
    })
}

/// `%` matches any run, `_` any single character; everything else is literal
fn like_regex(pattern: &str, case_insensitive: bool) -> StoreResult<Regex> {
    let mut source = String::with_capacity(pattern.len() + 8);
    source.push_str(if case_insensitive { "(?is)^" } else { "(?s)^" });
    for c in pattern.chars() {
        match c {
            '%' => source.push_str(".*"),
            '_' => source.push('.'),
            c => source.push_str(&regex::escape(c.encode_utf8(&mut [0; 4]))),
        }
    }
    source.push('$');
    Regex::new(&source).map_err(|e| query_error(format!("invalid LIKE pattern '{pattern}': {e}")))
}

fn lower_operand(expr: SqlExpr) -> StoreResult<Operand> {
    match expr {
        SqlExpr::Nested(inner) => lower_operand(*inner),
        SqlExpr::Identifier(ident) => Ok(Operand::Column(ident.value)),
        // `t.age` resolves against the row by its last part
        SqlExpr::CompoundIdentifier(parts) => parts
            .into_iter()
            .last()
            .map(|ident| Operand::Column(ident.value))
            .ok_or_else(|| query_error("empty identifier".to_string())),
        SqlExpr::Value(value) => lower_literal(value.value).map(Operand::Literal),
        SqlExpr::UnaryOp {
            op: UnaryOperator::Minus,
            expr,
        } => match lower_operand(*expr)? {
            Operand::Literal(Value::Number(n)) => negate(&n).map(Operand::Literal),
            _ => Err(query_error("unary minus applies to numbers only".to_string())),
        },
        other => Err(query_error(format!("unsupported expression '{other}'"))),
    }
}

fn lower_literal(value: SqlValue) -> StoreResult<Value> {
    match value {
        SqlValue::Number(text, _) => parse_number(&text),
        SqlValue::SingleQuotedString(text) => Ok(Value::String(text)),
        SqlValue::Boolean(b) => Ok(Value::Bool(b)),
        SqlValue::Null => Ok(Value::Null),
        other => Err(query_error(format!("unsupported literal {other}"))),
    }
}

fn parse_number(text: &str) -> StoreResult<Value> {
    if let Ok(i) = text.parse::<i64>() {
        return Ok(Value::from(i));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| query_error(format!("invalid number '{text}'")))
}

fn negate(n: &Number) -> StoreResult<Value> {
    if let Some(i) = n.as_i64() {
        return Ok(Value::from(-i));
    }
    n.as_f64()
        .and_then(|f| Number::from_f64(-f))
        .map(Value::Number)
        .ok_or_else(|| query_error(format!("cannot negate {n}")))
}

fn resolve<'a>(operand: &'a Operand, row: &'a Row) -> &'a Value {
    match operand {
        Operand::Column(column) => row.get(column).unwrap_or(&Value::Null),
        Operand::Literal(value) => value,
    }
}

fn compare(left: &Value, op: CompareOp, right: &Value) -> Option<bool> {
    compare_values(left, right).map(|ordering| op.holds(ordering))
}

fn and(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(false), _) | (_, Some(false)) => Some(false),
        (Some(true), Some(true)) => Some(true),
        _ => None,
    }
}

fn or(left: Option<bool>, right: Option<bool>) -> Option<bool> {
    match (left, right) {
        (Some(true), _) | (_, Some(true)) => Some(true),
        (Some(false), Some(false)) => Some(false),
        _ => None,
    }
}

fn negate_if(result: Option<bool>, negated: bool) -> Option<bool> {
    result.map(|v| v != negated)
}

fn evaluate(condition: &Condition, row: &Row) -> Option<bool> {
    match condition {
        Condition::And(left, right) => and(evaluate(left, row), evaluate(right, row)),
        Condition::Or(left, right) => or(evaluate(left, row), evaluate(right, row)),
        Condition::Not(inner) => evaluate(inner, row).map(|v| !v),
        Condition::IsNull { operand, negated } => {
            Some(resolve(operand, row).is_null() != *negated)
        }
        Condition::Truthy(operand) => match resolve(operand, row) {
            Value::Bool(b) => Some(*b),
            _ => None,
        },
        Condition::Compare(left, op, right) => {
            compare(resolve(left, row), *op, resolve(right, row))
        }
        Condition::Like {
            operand,
            pattern,
            negated,
        } => {
            let matched = match resolve(operand, row) {
                Value::String(text) => Some(pattern.is_match(text)),
                _ => None,
            };
            negate_if(matched, *negated)
        }
        Condition::InList {
            operand,
            list,
            negated,
        } => {
            let value = resolve(operand, row);
            let found = list.iter().fold(Some(false), |acc, item| {
                or(acc, compare(value, CompareOp::Eq, resolve(item, row)))
            });
            negate_if(found, *negated)
        }
        Condition::Between {
            operand,
            low,
            high,
            negated,
        } => {
            let value = resolve(operand, row);
            let within = and(
                compare(value, CompareOp::GtEq, resolve(low, row)),
                compare(value, CompareOp::LtEq, resolve(high, row)),
            );
            negate_if(within, *negated)
        }
    }
}

/// SQL-style comparison; `None` when either side is NULL or types differ
pub(crate) fn compare_values(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn matches(sql: &str, value: Value) -> bool {
        Predicate::parse(sql).unwrap().matches(&row(value))
    }

    #[test]
    fn evaluates_comparisons_and_connectives() {
        let user = json!({"id": 1, "name": "O'Neil", "age": 41, "active": true, "team": null});

        assert!(matches("age > 40 AND active = TRUE", user.clone()));
        assert!(matches("(age < 18 OR name = 'O''Neil') AND (active = TRUE)", user.clone()));
        assert!(matches("NOT age <= 40", user.clone()));
        assert!(matches("team IS NULL AND name IS NOT NULL", user.clone()));
        assert!(matches("t.age >= 41 AND age <> 40 AND age != 39", user.clone()));
        assert!(!matches("age = 41 AND active = FALSE", user));
    }

    #[test]
    fn like_in_and_between() {
        let user = json!({"name": "ann", "age": 30, "team": null});

        assert!(matches("name LIKE 'a%'", user.clone()));
        assert!(matches("name LIKE '_n_'", user.clone()));
        assert!(!matches("name LIKE 'A%'", user.clone()));
        assert!(matches("name ILIKE 'A%'", user.clone()));
        assert!(matches("name NOT LIKE 'b%'", user.clone()));
        assert!(matches("name LIKE 'a.n' OR name LIKE 'ann'", user.clone()));
        assert!(!matches("name LIKE 'a.n'", user.clone()));

        assert!(matches("age IN (30, 50)", user.clone()));
        assert!(!matches("age NOT IN (30, 50)", user.clone()));
        assert!(!matches("age IN (10, NULL)", user.clone()));
        assert!(!matches("NOT age IN (10, NULL)", user.clone()));
        assert!(!matches("team IN ('red')", user.clone()));

        assert!(matches("age BETWEEN 25 AND 60", user.clone()));
        assert!(matches("age BETWEEN 30 AND 30", user.clone()));
        assert!(matches("age NOT BETWEEN 31 AND 60", user.clone()));
        assert!(!matches("team BETWEEN 1 AND 2", user));
    }

    #[test]
    fn quoted_identifiers_name_columns() {
        let user = json!({"age": 30, "Display Name": "Ann"});
        assert!(matches("\"age\" > 1", user.clone()));
        assert!(matches("\"Display Name\" = 'Ann'", user));
    }

    #[test]
    fn null_comparisons_are_never_true() {
        let user = json!({"team": null});
        assert!(!matches("team = 'red'", user.clone()));
        assert!(!matches("NOT team = 'red'", user.clone()));
        assert!(matches("team = 'red' OR 1 = 1", user));
    }

    #[test]
    fn bare_boolean_columns_are_predicates() {
        assert!(matches("active", json!({"active": true})));
        assert!(!matches("active", json!({"active": false})));
        assert!(!matches("active", json!({})));
    }

    #[test]
    fn numbers_compare_across_int_and_float() {
        assert!(matches("score = 2", json!({"score": 2.0})));
        assert!(matches("score > -1.5", json!({"score": -1})));
        assert!(matches("score = -3", json!({"score": -3})));
    }

    #[test]
    fn malformed_expressions_fail_to_parse() {
        for sql in ["age >", "(age = 1", "age = 1)", "name = 'open", "a ; b", "x IS 3"] {
            assert!(Predicate::parse(sql).is_err(), "{sql}");
        }
    }

    #[test]
    fn unsupported_constructs_fail_to_parse() {
        for sql in ["age + 1 > 2", "lower(name) = 'ann'", "name LIKE other_column"] {
            assert!(
                matches!(Predicate::parse(sql), Err(StoreError::QueryFailed { .. })),
                "{sql}"
            );
        }
    }
}
