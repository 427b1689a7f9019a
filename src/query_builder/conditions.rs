//! WHERE clause rendering for scoped conditions

use crate::persistence::{QuoteLiteral, StoreError, StoreResult};
use crate::scopes::registry::validate_identifier;
use crate::scopes::QueryCondition;
use serde_json::Value;

/// ANSI SQL literal quoting (`TRUE`, `'it''s'`, `NULL`). Used by both bundled
/// stores.
#[derive(Debug, Clone, Copy, Default)]
pub struct SqlQuoter;

impl QuoteLiteral for SqlQuoter {
    fn quote_literal(&self, value: &Value) -> String {
        format_value(value)
    }
}

/// Format a JSON value for SQL
pub fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => format!("'{}'", s.replace('\'', "''")),
        _ => format!("'{}'", value.to_string().replace('\'', "''")),
    }
}

/// Render a condition as a WHERE fragment; `None` when it constrains nothing
pub fn render_condition(
    condition: &QueryCondition,
    quoter: &dyn QuoteLiteral,
) -> StoreResult<Option<String>> {
    match condition {
        QueryCondition::Empty => Ok(None),
        QueryCondition::Predicates(predicates) if predicates.is_empty() => Ok(None),
        QueryCondition::Predicates(predicates) => {
            let mut parts = Vec::with_capacity(predicates.len());
            for (field, value) in predicates {
                validate_identifier(field).map_err(|reason| StoreError::QueryFailed {
                    reason: format!("invalid predicate field '{field}': {reason}"),
                })?;
                if value.is_null() {
                    parts.push(format!("{field} IS NULL"));
                } else {
                    parts.push(format!("{field} = {}", quoter.quote_literal(value)));
                }
            }
            Ok(Some(parts.join(" AND ")))
        }
        QueryCondition::Expression(sql) if sql.trim().is_empty() => Ok(None),
        QueryCondition::Expression(sql) => Ok(Some(sql.clone())),
        QueryCondition::Parameterized { fragment, .. } if fragment.trim().is_empty() => Ok(None),
        QueryCondition::Parameterized { fragment, binds } => {
            substitute_binds(fragment, binds, quoter).map(Some)
        }
    }
}

/// Replace each `?` outside string literals with the next bind, quoted
pub fn substitute_binds(
    fragment: &str,
    binds: &[Value],
    quoter: &dyn QuoteLiteral,
) -> StoreResult<String> {
    let mut sql = String::with_capacity(fragment.len() + binds.len() * 4);
    let mut binds_iter = binds.iter();
    let mut in_string = false;

    for c in fragment.chars() {
        match c {
            '\'' => {
                in_string = !in_string;
                sql.push(c);
            }
            '?' if !in_string => {
                let bind = binds_iter.next().ok_or_else(|| StoreError::QueryFailed {
                    reason: format!(
                        "condition '{fragment}' has more placeholders than binds ({})",
                        binds.len()
                    ),
                })?;
                sql.push_str(&quoter.quote_literal(bind));
            }
            _ => sql.push(c),
        }
    }

    if binds_iter.next().is_some() {
        return Err(StoreError::QueryFailed {
            reason: format!(
                "condition '{fragment}' has fewer placeholders than binds ({})",
                binds.len()
            ),
        });
    }

    Ok(sql)
}
