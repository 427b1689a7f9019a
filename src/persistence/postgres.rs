//! # PostgreSQL Store
//!
//! [`Persistence`] over a `sqlx` connection pool. Every read is rendered by
//! [`QueryBuilder::for_read`] into a statement returning one `jsonb` column,
//! so rows and aggregates decode the same way regardless of table shape.

use super::{
    Persistence, PersistenceTransaction, QueryOutput, QuoteLiteral, Row, StoreError, StoreResult,
};
use crate::constants::PRIMARY_KEY;
use crate::lifecycle::read::ReadOperation;
use crate::query_builder::{format_value, QueryBuilder};
use crate::scopes::registry::{validate_identifier, validate_table_name};
use crate::scopes::QueryCondition;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, Row as _, Transaction};
use tracing::debug;

#[derive(Debug, Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

/// `UPDATE <table> SET <attribute> = <literal> WHERE id = <record_id>`
pub fn update_attribute_sql(
    table: &str,
    record_id: i64,
    attribute: &str,
    value: &Value,
) -> StoreResult<String> {
    validate_table_name(table).map_err(|reason| StoreError::QueryFailed {
        reason: format!("invalid table name '{table}': {reason}"),
    })?;
    validate_identifier(attribute).map_err(|reason| StoreError::QueryFailed {
        reason: format!("invalid attribute '{attribute}': {reason}"),
    })?;
    Ok(format!(
        "UPDATE {table} SET {attribute} = {} WHERE {PRIMARY_KEY} = {record_id}",
        format_value(value)
    ))
}

fn ensure_updated(rows_affected: u64, table: &str, record_id: i64) -> StoreResult<()> {
    if rows_affected == 0 {
        return Err(StoreError::RecordNotFound {
            table: table.to_string(),
            record_id,
        });
    }
    Ok(())
}

fn into_row(value: Value) -> StoreResult<Row> {
    match value {
        Value::Object(row) => Ok(row),
        other => Err(StoreError::QueryFailed {
            reason: format!("expected a row object, got {other}"),
        }),
    }
}

impl QuoteLiteral for PgStore {
    fn quote_literal(&self, value: &Value) -> String {
        format_value(value)
    }
}

#[async_trait]
impl Persistence for PgStore {
    type Transaction = PgTransaction;

    async fn begin(&self) -> StoreResult<PgTransaction> {
        let tx = self.pool.begin().await?;
        Ok(PgTransaction { tx })
    }

    async fn update_single_attribute(
        &self,
        table: &str,
        record_id: i64,
        attribute: &str,
        value: Value,
    ) -> StoreResult<()> {
        let sql = update_attribute_sql(table, record_id, attribute, &value)?;
        let result = sqlx::query(&sql).execute(&self.pool).await?;
        ensure_updated(result.rows_affected(), table, record_id)
    }

    async fn execute_query(
        &self,
        table: &str,
        operation: &ReadOperation,
        condition: &QueryCondition,
    ) -> StoreResult<QueryOutput> {
        let sql = QueryBuilder::for_read(table, operation, condition, self)?;
        debug!(table = %table, sql = %sql, "Executing scoped read");

        let output = match operation {
            ReadOperation::All => {
                let rows = sqlx::query(&sql).fetch_all(&self.pool).await?;
                let rows = rows
                    .iter()
                    .map(|row| row.try_get::<Json<Value>, _>(0).map(|json| json.0))
                    .collect::<Result<Vec<_>, _>>()?
                    .into_iter()
                    .map(into_row)
                    .collect::<StoreResult<Vec<_>>>()?;
                QueryOutput::Rows(rows)
            }
            ReadOperation::Find { .. } | ReadOperation::First => {
                let row = sqlx::query(&sql).fetch_optional(&self.pool).await?;
                let row = row
                    .map(|row| row.try_get::<Json<Value>, _>(0).map(|json| json.0))
                    .transpose()?
                    .map(into_row)
                    .transpose()?;
                QueryOutput::Row(row)
            }
            _ => {
                let row = sqlx::query(&sql).fetch_one(&self.pool).await?;
                let value = row
                    .try_get::<Option<Json<Value>>, _>(0)?
                    .map(|json| json.0)
                    .unwrap_or(Value::Null);
                QueryOutput::Scalar(value)
            }
        };

        Ok(output)
    }
}

pub struct PgTransaction {
    tx: Transaction<'static, Postgres>,
}

#[async_trait]
impl PersistenceTransaction for PgTransaction {
    async fn update_single_attribute(
        &mut self,
        table: &str,
        record_id: i64,
        attribute: &str,
        value: Value,
    ) -> StoreResult<()> {
        let sql = update_attribute_sql(table, record_id, attribute, &value)?;
        let result = sqlx::query(&sql).execute(&mut *self.tx).await?;
        ensure_updated(result.rows_affected(), table, record_id)
    }

    async fn commit(self) -> StoreResult<()> {
        self.tx.commit().await?;
        Ok(())
    }

    async fn rollback(self) -> StoreResult<()> {
        self.tx.rollback().await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn update_sql_quotes_the_literal() {
        let sql = update_attribute_sql("users", 7, "active", &json!(false)).unwrap();
        assert_eq!(sql, "UPDATE users SET active = FALSE WHERE id = 7");
    }

    #[test]
    fn update_sql_rejects_unsafe_identifiers() {
        assert!(update_attribute_sql("users", 7, "active = TRUE, role", &json!(false)).is_err());
        assert!(update_attribute_sql("users;", 7, "active", &json!(false)).is_err());
    }

    #[test]
    fn zero_affected_rows_is_not_found() {
        assert!(matches!(
            ensure_updated(0, "users", 3),
            Err(StoreError::RecordNotFound { record_id: 3, .. })
        ));
        assert!(ensure_updated(1, "users", 3).is_ok());
    }

    #[test]
    fn rows_must_be_objects() {
        assert!(into_row(json!({"id": 1})).is_ok());
        assert!(into_row(json!([1])).is_err());
    }
}
