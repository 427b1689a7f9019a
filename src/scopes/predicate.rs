//! # Active Predicate Injection
//!
//! Augments any condition shape with `<active attribute> = true`.
//!
//! | Input | Output |
//! |---|---|
//! | empty | `{active: true}` |
//! | `{x: 1}` | `{x: 1, active: true}` (an existing `active` entry is overwritten) |
//! | `"x = 1"` | `"(x = 1) AND (active = TRUE)"` |
//! | `["x = ?", 1]` | `["(x = ?) AND (active = TRUE)", 1]` |
//!
//! The true-literal is rendered by the persistence collaborator so the
//! expression stays dialect-correct.

use super::condition::QueryCondition;
use super::registry::ActiveAttribute;
use crate::error::Result;
use crate::persistence::QuoteLiteral;
use serde_json::Value;

/// Return `condition` constrained to active rows
pub fn inject_active_predicate(
    condition: QueryCondition,
    attribute: &ActiveAttribute,
    quoter: &dyn QuoteLiteral,
) -> QueryCondition {
    match condition {
        QueryCondition::Empty => QueryCondition::eq(attribute.as_str(), true),
        QueryCondition::Predicates(mut predicates) => {
            predicates.insert(attribute.to_string(), Value::Bool(true));
            QueryCondition::Predicates(predicates)
        }
        QueryCondition::Expression(sql) if sql.trim().is_empty() => {
            QueryCondition::eq(attribute.as_str(), true)
        }
        QueryCondition::Expression(sql) => {
            QueryCondition::Expression(conjoin_active(&sql, attribute, quoter))
        }
        QueryCondition::Parameterized { fragment, binds } if fragment.trim().is_empty() => {
            QueryCondition::Parameterized {
                fragment: active_clause(attribute, quoter),
                binds,
            }
        }
        QueryCondition::Parameterized { fragment, binds } => QueryCondition::Parameterized {
            fragment: conjoin_active(&fragment, attribute, quoter),
            binds,
        },
    }
}

/// Parse a loosely-typed condition and inject the active predicate.
///
/// Fails with `UnsupportedConditionShape` for JSON that is not one of the
/// accepted condition shapes.
pub fn inject_active_predicate_value(
    condition: Value,
    attribute: &ActiveAttribute,
    quoter: &dyn QuoteLiteral,
) -> Result<QueryCondition> {
    let condition = QueryCondition::try_from(condition)?;
    Ok(inject_active_predicate(condition, attribute, quoter))
}

fn active_clause(attribute: &ActiveAttribute, quoter: &dyn QuoteLiteral) -> String {
    format!("{} = {}", attribute, quoter.quote_literal(&Value::Bool(true)))
}

fn conjoin_active(sql: &str, attribute: &ActiveAttribute, quoter: &dyn QuoteLiteral) -> String {
    format!("({sql}) AND ({})", active_clause(attribute, quoter))
}
