use proptest::prelude::*;
use proptest::strategy::Just;
use serde_json::{json, Value};
use std::collections::BTreeMap;
use tasker_soft_delete::QueryCondition;

/// Strategy for generating valid column names
pub fn column_name_strategy() -> impl Strategy<Value = String> {
    "[a-z_][a-z0-9_]{0,15}"
}

/// Strategy for generating scalar predicate values
pub fn scalar_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        (-1000i64..1000).prop_map(Value::from),
        "[a-z ]{0,8}".prop_map(Value::from),
    ]
}

/// Strategy for structured equality sets, possibly naming the active column
pub fn predicates_strategy() -> impl Strategy<Value = BTreeMap<String, Value>> {
    prop::collection::btree_map(
        prop_oneof![3 => column_name_strategy(), 1 => Just("active".to_string())],
        scalar_strategy(),
        0..4,
    )
}

/// Strategy for expressions over the `age` and `name` columns of the user fixtures
pub fn age_expression_strategy() -> impl Strategy<Value = String> {
    let comparison = (
        prop_oneof![
            Just("="),
            Just("<>"),
            Just("<"),
            Just("<="),
            Just(">"),
            Just(">=")
        ],
        0i64..100,
    )
        .prop_map(|(op, age)| format!("age {op} {age}"));

    prop_oneof![
        comparison.clone(),
        (comparison.clone(), comparison.clone()).prop_map(|(a, b)| format!("{a} OR {b}")),
        comparison.clone().prop_map(|c| format!("NOT {c}")),
        Just("name IS NOT NULL".to_string()),
        Just("name = 'u1'".to_string()),
    ]
}

/// Strategy for every condition shape the query layer accepts
pub fn condition_strategy() -> impl Strategy<Value = QueryCondition> {
    prop_oneof![
        Just(QueryCondition::Empty),
        predicates_strategy().prop_map(QueryCondition::Predicates),
        age_expression_strategy().prop_map(QueryCondition::expression),
        (0i64..100).prop_map(|age| QueryCondition::parameterized("age >= ?", vec![json!(age)])),
    ]
}

/// Strategy for conditions the in-memory store can evaluate against user rows
pub fn user_condition_strategy() -> impl Strategy<Value = QueryCondition> {
    prop_oneof![
        Just(QueryCondition::Empty),
        (0i64..100).prop_map(|age| QueryCondition::eq("age", age)),
        any::<bool>().prop_map(|active| QueryCondition::eq("active", active)),
        age_expression_strategy().prop_map(QueryCondition::expression),
        (0i64..100).prop_map(|age| QueryCondition::parameterized("age < ?", vec![json!(age)])),
    ]
}

/// Strategy for user rows as (age, active) pairs
pub fn user_rows_strategy() -> impl Strategy<Value = Vec<(i64, bool)>> {
    prop::collection::vec((0i64..100, any::<bool>()), 0..20)
}
