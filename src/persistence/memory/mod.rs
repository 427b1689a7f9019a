//! # In-Memory Store
//!
//! A [`Persistence`] implementation over JSON rows held in process memory.
//! Tables are created on first insert; rows are keyed by their integer `id`.
//! Transactions stage writes and apply them under a single write lock on
//! commit, so readers never observe a partially applied transaction.
//!
//! The store also records every committed attribute write and can be told to
//! fail writes or commits, which is what the lifecycle tests lean on.

mod expression;

pub use expression::Predicate;

use super::{
    Persistence, PersistenceTransaction, QueryOutput, QuoteLiteral, Row, StoreError, StoreResult,
};
use crate::constants::PRIMARY_KEY;
use crate::lifecycle::read::{AggregateFunction, ReadOperation};
use crate::query_builder::{format_value, substitute_binds, SqlQuoter};
use crate::scopes::QueryCondition;
use async_trait::async_trait;
use expression::compare_values;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering as AtomicOrdering};
use std::sync::Arc;
use tracing::{debug, trace};

/// One committed single-attribute write
#[derive(Debug, Clone, PartialEq)]
pub struct AttributeWrite {
    pub table: String,
    pub record_id: i64,
    pub attribute: String,
    pub value: Value,
}

#[derive(Debug, Default)]
struct StoreInner {
    tables: RwLock<HashMap<String, BTreeMap<i64, Row>>>,
    next_id: AtomicI64,
    writes: Mutex<Vec<AttributeWrite>>,
    failing_writes: RwLock<HashSet<(String, i64)>>,
    fail_commits: AtomicBool,
}

/// Thread-safe in-memory persistence; clones share the same data
#[derive(Debug, Clone, Default)]
pub struct InMemoryStore {
    inner: Arc<StoreInner>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row, assigning an `id` when it has none. Returns the stored row.
    pub fn insert(&self, table: &str, mut attributes: Row) -> Row {
        let id = match attributes.get(PRIMARY_KEY).and_then(Value::as_i64) {
            Some(id) => {
                self.inner.next_id.fetch_max(id, AtomicOrdering::SeqCst);
                id
            }
            None => self.inner.next_id.fetch_add(1, AtomicOrdering::SeqCst) + 1,
        };
        attributes.insert(PRIMARY_KEY.to_string(), Value::from(id));

        self.inner
            .tables
            .write()
            .entry(table.to_string())
            .or_default()
            .insert(id, attributes.clone());

        trace!(table = %table, record_id = id, "Inserted row");
        attributes
    }

    /// Raw, unscoped row access
    pub fn row(&self, table: &str, record_id: i64) -> Option<Row> {
        self.inner
            .tables
            .read()
            .get(table)
            .and_then(|rows| rows.get(&record_id))
            .cloned()
    }

    /// Every committed single-attribute write, in commit order
    pub fn attribute_writes(&self) -> Vec<AttributeWrite> {
        self.inner.writes.lock().clone()
    }

    /// Make every write to this row fail until [`clear_failures`](Self::clear_failures)
    pub fn fail_writes_for(&self, table: &str, record_id: i64) {
        self.inner
            .failing_writes
            .write()
            .insert((table.to_string(), record_id));
    }

    /// Make every commit fail until [`clear_failures`](Self::clear_failures)
    pub fn fail_commits(&self) {
        self.inner.fail_commits.store(true, AtomicOrdering::SeqCst);
    }

    pub fn clear_failures(&self) {
        self.inner.failing_writes.write().clear();
        self.inner.fail_commits.store(false, AtomicOrdering::SeqCst);
    }

    fn check_write(&self, table: &str, record_id: i64) -> StoreResult<()> {
        if self
            .inner
            .failing_writes
            .read()
            .contains(&(table.to_string(), record_id))
        {
            return Err(StoreError::WriteFailed {
                table: table.to_string(),
                record_id,
                reason: "write rejected by store".to_string(),
            });
        }

        let exists = self
            .inner
            .tables
            .read()
            .get(table)
            .is_some_and(|rows| rows.contains_key(&record_id));
        if !exists {
            return Err(StoreError::RecordNotFound {
                table: table.to_string(),
                record_id,
            });
        }
        Ok(())
    }

    fn apply(&self, writes: Vec<AttributeWrite>) {
        let mut tables = self.inner.tables.write();
        let mut log = self.inner.writes.lock();
        for write in writes {
            if let Some(row) = tables
                .get_mut(&write.table)
                .and_then(|rows| rows.get_mut(&write.record_id))
            {
                row.insert(write.attribute.clone(), write.value.clone());
            }
            log.push(write);
        }
    }
}

impl QuoteLiteral for InMemoryStore {
    fn quote_literal(&self, value: &Value) -> String {
        format_value(value)
    }
}

#[async_trait]
impl Persistence for InMemoryStore {
    type Transaction = InMemoryTransaction;

    async fn begin(&self) -> StoreResult<InMemoryTransaction> {
        Ok(InMemoryTransaction {
            store: self.clone(),
            pending: Vec::new(),
        })
    }

    async fn update_single_attribute(
        &self,
        table: &str,
        record_id: i64,
        attribute: &str,
        value: Value,
    ) -> StoreResult<()> {
        self.check_write(table, record_id)?;
        self.apply(vec![AttributeWrite {
            table: table.to_string(),
            record_id,
            attribute: attribute.to_string(),
            value,
        }]);
        Ok(())
    }

    async fn execute_query(
        &self,
        table: &str,
        operation: &ReadOperation,
        condition: &QueryCondition,
    ) -> StoreResult<QueryOutput> {
        let filter = RowFilter::compile(condition)?;
        let tables = self.inner.tables.read();
        let matching: Vec<&Row> = tables
            .get(table)
            .map(|rows| rows.values().filter(|row| filter.matches(row)).collect())
            .unwrap_or_default();

        let output = match operation {
            ReadOperation::Find { id } => QueryOutput::Row(
                matching
                    .into_iter()
                    .find(|row| row.get(PRIMARY_KEY).and_then(Value::as_i64) == Some(*id))
                    .cloned(),
            ),
            ReadOperation::All => QueryOutput::Rows(matching.into_iter().cloned().collect()),
            ReadOperation::First => QueryOutput::Row(matching.first().map(|row| (*row).clone())),
            ReadOperation::Exists => QueryOutput::Scalar(Value::Bool(!matching.is_empty())),
            aggregate => {
                let (function, column) =
                    aggregate.aggregate().ok_or_else(|| StoreError::QueryFailed {
                        reason: format!("unsupported read {aggregate:?}"),
                    })?;
                QueryOutput::Scalar(aggregate_rows(&matching, function, column)?)
            }
        };

        Ok(output)
    }
}

/// Staged writes, applied atomically on commit
#[derive(Debug)]
pub struct InMemoryTransaction {
    store: InMemoryStore,
    pending: Vec<AttributeWrite>,
}

#[async_trait]
impl PersistenceTransaction for InMemoryTransaction {
    async fn update_single_attribute(
        &mut self,
        table: &str,
        record_id: i64,
        attribute: &str,
        value: Value,
    ) -> StoreResult<()> {
        self.store.check_write(table, record_id)?;
        self.pending.push(AttributeWrite {
            table: table.to_string(),
            record_id,
            attribute: attribute.to_string(),
            value,
        });
        Ok(())
    }

    async fn commit(self) -> StoreResult<()> {
        if self.store.inner.fail_commits.load(AtomicOrdering::SeqCst) {
            return Err(StoreError::TransactionFailed {
                reason: "commit rejected by store".to_string(),
            });
        }
        debug!(writes = self.pending.len(), "Committing in-memory transaction");
        self.store.apply(self.pending);
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        debug!(discarded = self.pending.len(), "Rolling back in-memory transaction");
        Ok(())
    }
}

enum RowFilter {
    All,
    Equals(BTreeMap<String, Value>),
    Expression(Predicate),
}

impl RowFilter {
    fn compile(condition: &QueryCondition) -> StoreResult<Self> {
        Ok(match condition {
            QueryCondition::Empty => RowFilter::All,
            QueryCondition::Predicates(predicates) => RowFilter::Equals(predicates.clone()),
            QueryCondition::Expression(sql) if sql.trim().is_empty() => RowFilter::All,
            QueryCondition::Expression(sql) => RowFilter::Expression(Predicate::parse(sql)?),
            QueryCondition::Parameterized { fragment, .. } if fragment.trim().is_empty() => {
                RowFilter::All
            }
            QueryCondition::Parameterized { fragment, binds } => {
                let sql = substitute_binds(fragment, binds, &SqlQuoter)?;
                RowFilter::Expression(Predicate::parse(&sql)?)
            }
        })
    }

    fn matches(&self, row: &Row) -> bool {
        match self {
            RowFilter::All => true,
            RowFilter::Equals(predicates) => predicates.iter().all(|(field, expected)| {
                let actual = row.get(field).unwrap_or(&Value::Null);
                if expected.is_null() {
                    actual.is_null()
                } else {
                    compare_values(actual, expected) == Some(Ordering::Equal)
                }
            }),
            RowFilter::Expression(predicate) => predicate.matches(row),
        }
    }
}

fn aggregate_rows(
    rows: &[&Row],
    function: AggregateFunction,
    column: Option<&str>,
) -> StoreResult<Value> {
    let Some(column) = column else {
        return match function {
            AggregateFunction::Count => Ok(Value::from(rows.len() as i64)),
            other => Err(StoreError::QueryFailed {
                reason: format!("{} requires a column", other.sql_name()),
            }),
        };
    };

    let values: Vec<&Value> = rows
        .iter()
        .filter_map(|row| row.get(column))
        .filter(|value| !value.is_null())
        .collect();

    match function {
        AggregateFunction::Count => Ok(Value::from(values.len() as i64)),
        AggregateFunction::Sum | AggregateFunction::Average => {
            if values.is_empty() {
                return Ok(Value::Null);
            }
            let numbers = values
                .iter()
                .map(|value| match value {
                    Value::Number(n) => Ok(n),
                    other => Err(StoreError::QueryFailed {
                        reason: format!("cannot {} non-numeric value {other}", function.sql_name()),
                    }),
                })
                .collect::<StoreResult<Vec<_>>>()?;

            let float_sum: f64 = numbers.iter().filter_map(|n| n.as_f64()).sum();
            if function == AggregateFunction::Average {
                return Ok(Value::from(float_sum / numbers.len() as f64));
            }
            let int_sum = numbers
                .iter()
                .map(|n| n.as_i64())
                .try_fold(0i64, |acc, n| n.and_then(|n| acc.checked_add(n)));
            Ok(int_sum.map(Value::from).unwrap_or_else(|| Value::from(float_sum)))
        }
        AggregateFunction::Minimum | AggregateFunction::Maximum => {
            let wanted = if function == AggregateFunction::Minimum {
                Ordering::Less
            } else {
                Ordering::Greater
            };
            let mut best: Option<&Value> = None;
            for value in values {
                best = match best {
                    None => Some(value),
                    Some(current) => match compare_values(value, current) {
                        Some(ordering) if ordering == wanted => Some(value),
                        Some(_) => Some(current),
                        None => {
                            return Err(StoreError::QueryFailed {
                                reason: format!(
                                    "cannot compare {value} with {current} in {}",
                                    function.sql_name()
                                ),
                            })
                        }
                    },
                };
            }
            Ok(best.cloned().unwrap_or(Value::Null))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    fn seeded() -> InMemoryStore {
        let store = InMemoryStore::new();
        store.insert("users", row(json!({"name": "ann", "age": 30, "active": true})));
        store.insert("users", row(json!({"name": "bob", "age": 45, "active": false})));
        store.insert("users", row(json!({"name": "cy", "age": 12.5, "active": true})));
        store
    }

    #[tokio::test]
    async fn assigns_sequential_ids() {
        let store = seeded();
        assert_eq!(store.row("users", 2).unwrap()["name"], json!("bob"));

        let explicit = store.insert("users", row(json!({"id": 10, "name": "dee"})));
        assert_eq!(explicit["id"], json!(10));
        let next = store.insert("users", row(json!({"name": "eve"})));
        assert_eq!(next["id"], json!(11));
    }

    #[tokio::test]
    async fn filters_by_each_condition_shape() {
        let store = seeded();

        let by_predicate = store
            .execute_query("users", &ReadOperation::All, &QueryCondition::eq("active", true))
            .await
            .unwrap();
        let QueryOutput::Rows(rows) = by_predicate else { panic!("expected rows") };
        assert_eq!(rows.len(), 2);

        let by_expression = store
            .execute_query("users", &ReadOperation::Count, &QueryCondition::expression("age > 20"))
            .await
            .unwrap();
        assert_eq!(by_expression, QueryOutput::Scalar(json!(2)));

        let by_binds = store
            .execute_query(
                "users",
                &ReadOperation::First,
                &QueryCondition::parameterized("name = ?", vec![json!("bob")]),
            )
            .await
            .unwrap();
        let QueryOutput::Row(Some(bob)) = by_binds else { panic!("expected bob") };
        assert_eq!(bob["id"], json!(2));
    }

    #[tokio::test]
    async fn computes_aggregates() {
        let store = seeded();
        let run = |op: ReadOperation| {
            let store = store.clone();
            async move {
                match store.execute_query("users", &op, &QueryCondition::Empty).await.unwrap() {
                    QueryOutput::Scalar(value) => value,
                    other => panic!("expected scalar, got {other:?}"),
                }
            }
        };

        assert_eq!(run(ReadOperation::Sum { column: "age".into() }).await, json!(87.5));
        assert_eq!(run(ReadOperation::Minimum { column: "name".into() }).await, json!("ann"));
        assert_eq!(run(ReadOperation::Maximum { column: "age".into() }).await, json!(45));
        assert_eq!(
            run(ReadOperation::Average { column: "age".into() }).await,
            json!(87.5 / 3.0)
        );
        assert_eq!(run(ReadOperation::Sum { column: "missing".into() }).await, json!(null));
        assert_eq!(run(ReadOperation::Exists).await, json!(true));
    }

    #[tokio::test]
    async fn integer_sums_stay_integers() {
        let store = InMemoryStore::new();
        store.insert("orders", row(json!({"total": 5})));
        store.insert("orders", row(json!({"total": 7})));
        let sum = store
            .execute_query("orders", &ReadOperation::Sum { column: "total".into() }, &QueryCondition::Empty)
            .await
            .unwrap();
        assert_eq!(sum, QueryOutput::Scalar(json!(12)));
    }

    #[tokio::test]
    async fn transactions_apply_only_on_commit() {
        let store = seeded();

        let mut tx = store.begin().await.unwrap();
        tx.update_single_attribute("users", 1, "active", json!(false)).await.unwrap();
        assert_eq!(store.row("users", 1).unwrap()["active"], json!(true));
        tx.commit().await.unwrap();
        assert_eq!(store.row("users", 1).unwrap()["active"], json!(false));

        let mut tx = store.begin().await.unwrap();
        tx.update_single_attribute("users", 3, "active", json!(false)).await.unwrap();
        tx.rollback().await.unwrap();
        assert_eq!(store.row("users", 3).unwrap()["active"], json!(true));

        assert_eq!(store.attribute_writes().len(), 1);
    }

    #[tokio::test]
    async fn injected_failures_surface_as_store_errors() {
        let store = seeded();
        store.fail_writes_for("users", 2);

        let err = store
            .update_single_attribute("users", 2, "active", json!(true))
            .await
            .unwrap_err();
        assert!(matches!(err, StoreError::WriteFailed { record_id: 2, .. }));

        let missing = store
            .update_single_attribute("users", 99, "active", json!(true))
            .await
            .unwrap_err();
        assert!(matches!(missing, StoreError::RecordNotFound { .. }));

        store.fail_commits();
        let tx = store.begin().await.unwrap();
        assert!(matches!(tx.commit().await, Err(StoreError::TransactionFailed { .. })));

        store.clear_failures();
        assert!(store
            .update_single_attribute("users", 2, "active", json!(true))
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn unknown_tables_read_as_empty() {
        let store = InMemoryStore::new();
        let output = store
            .execute_query("nothing", &ReadOperation::Count, &QueryCondition::Empty)
            .await
            .unwrap();
        assert_eq!(output, QueryOutput::Scalar(json!(0)));
    }
}
