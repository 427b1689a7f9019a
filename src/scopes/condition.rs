//! # Query Conditions
//!
//! The condition forms the host query layer accepts. The scope policy must
//! treat every form uniformly, so they share one enum.

use crate::error::{Result, SoftDeleteError};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// A read condition in one of the shapes the query layer understands
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "shape", content = "value")]
pub enum QueryCondition {
    /// No constraint at all
    #[default]
    Empty,
    /// Field-to-value equality constraints, all of which must hold
    Predicates(BTreeMap<String, Value>),
    /// An already-built boolean expression, opaque to this crate
    Expression(String),
    /// An expression fragment with positional `?` placeholders and their binds
    Parameterized { fragment: String, binds: Vec<Value> },
}

impl QueryCondition {
    pub fn empty() -> Self {
        QueryCondition::Empty
    }

    /// Single equality constraint
    pub fn eq(field: impl Into<String>, value: impl Into<Value>) -> Self {
        let mut predicates = BTreeMap::new();
        predicates.insert(field.into(), value.into());
        QueryCondition::Predicates(predicates)
    }

    pub fn predicates<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        QueryCondition::Predicates(
            pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }

    pub fn expression(sql: impl Into<String>) -> Self {
        QueryCondition::Expression(sql.into())
    }

    pub fn parameterized(fragment: impl Into<String>, binds: Vec<Value>) -> Self {
        QueryCondition::Parameterized {
            fragment: fragment.into(),
            binds,
        }
    }

    /// Add (or overwrite) an equality constraint. Only valid on the empty and
    /// structured shapes; expressions are returned unchanged.
    pub fn and_eq(self, field: impl Into<String>, value: impl Into<Value>) -> Self {
        match self {
            QueryCondition::Empty => QueryCondition::eq(field, value),
            QueryCondition::Predicates(mut predicates) => {
                predicates.insert(field.into(), value.into());
                QueryCondition::Predicates(predicates)
            }
            other => other,
        }
    }

    /// True when the condition constrains nothing
    pub fn is_empty(&self) -> bool {
        match self {
            QueryCondition::Empty => true,
            QueryCondition::Predicates(predicates) => predicates.is_empty(),
            QueryCondition::Expression(sql) => sql.trim().is_empty(),
            QueryCondition::Parameterized { fragment, .. } => fragment.trim().is_empty(),
        }
    }

    pub fn shape_name(&self) -> &'static str {
        match self {
            QueryCondition::Empty => "empty",
            QueryCondition::Predicates(_) => "predicates",
            QueryCondition::Expression(_) => "expression",
            QueryCondition::Parameterized { .. } => "parameterized",
        }
    }
}

impl From<&str> for QueryCondition {
    fn from(sql: &str) -> Self {
        QueryCondition::Expression(sql.to_string())
    }
}

impl From<String> for QueryCondition {
    fn from(sql: String) -> Self {
        QueryCondition::Expression(sql)
    }
}

impl From<BTreeMap<String, Value>> for QueryCondition {
    fn from(predicates: BTreeMap<String, Value>) -> Self {
        QueryCondition::Predicates(predicates)
    }
}

impl From<Option<QueryCondition>> for QueryCondition {
    fn from(condition: Option<QueryCondition>) -> Self {
        condition.unwrap_or_default()
    }
}

/// Loosely-typed conditions as they arrive from dynamic callers:
///
/// - `null` -> empty
/// - object of scalars -> predicates
/// - string -> expression
/// - `["fragment ?", bind, ...]` -> parameterized
impl TryFrom<Value> for QueryCondition {
    type Error = SoftDeleteError;

    fn try_from(value: Value) -> Result<Self> {
        match value {
            Value::Null => Ok(QueryCondition::Empty),
            Value::String(sql) => Ok(QueryCondition::Expression(sql)),
            Value::Object(map) => {
                let mut predicates = BTreeMap::new();
                for (field, value) in map {
                    if value.is_array() || value.is_object() {
                        return Err(unsupported(format!(
                            "predicate '{field}' must compare against a scalar, got {value}"
                        )));
                    }
                    predicates.insert(field, value);
                }
                Ok(QueryCondition::Predicates(predicates))
            }
            Value::Array(mut items) => {
                if items.is_empty() {
                    return Err(unsupported("empty array".to_string()));
                }
                match items.remove(0) {
                    Value::String(fragment) => Ok(QueryCondition::Parameterized {
                        fragment,
                        binds: items,
                    }),
                    other => Err(unsupported(format!(
                        "array condition must start with an expression string, got {other}"
                    ))),
                }
            }
            other => Err(unsupported(format!("bare scalar {other}"))),
        }
    }
}

fn unsupported(shape: String) -> SoftDeleteError {
    SoftDeleteError::UnsupportedConditionShape { shape }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_each_supported_shape() {
        assert_eq!(QueryCondition::try_from(Value::Null).unwrap(), QueryCondition::Empty);
        assert_eq!(
            QueryCondition::try_from(json!({"x": 1})).unwrap(),
            QueryCondition::eq("x", 1)
        );
        assert_eq!(
            QueryCondition::try_from(json!("x = 1")).unwrap(),
            QueryCondition::expression("x = 1")
        );
        assert_eq!(
            QueryCondition::try_from(json!(["x = ? AND y = ?", 1, "a"])).unwrap(),
            QueryCondition::parameterized("x = ? AND y = ?", vec![json!(1), json!("a")])
        );
    }

    #[test]
    fn rejects_unparseable_shapes() {
        for value in [json!(42), json!(true), json!([]), json!([1, 2]), json!({"x": [1]})] {
            let err = QueryCondition::try_from(value).unwrap_err();
            assert!(matches!(err, SoftDeleteError::UnsupportedConditionShape { .. }));
        }
    }

    #[test]
    fn and_eq_merges_into_structured_conditions() {
        let condition = QueryCondition::empty().and_eq("role", "admin").and_eq("age", 30);
        assert_eq!(
            condition,
            QueryCondition::predicates([("role", json!("admin")), ("age", json!(30))])
        );

        let expression = QueryCondition::expression("age > 3").and_eq("role", "admin");
        assert_eq!(expression, QueryCondition::expression("age > 3"));
    }

    #[test]
    fn blank_expressions_are_empty() {
        assert!(QueryCondition::expression("   ").is_empty());
        assert!(QueryCondition::predicates(Vec::<(String, Value)>::new()).is_empty());
        assert!(!QueryCondition::expression("x = 1").is_empty());
    }
}
