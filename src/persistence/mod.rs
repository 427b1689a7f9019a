//! # Persistence Collaborators
//!
//! The interfaces this crate requires from the host persistence layer, plus
//! two implementations:
//!
//! - [`InMemoryStore`]: thread-safe JSON rows, used by tests and embedded hosts
//! - [`PgStore`]: `sqlx` / PostgreSQL (feature `postgres`)
//!
//! The controller only ever needs four things: run a read with a given
//! condition, update one attribute, group writes in a transaction, and quote
//! a literal for inclusion in an expression string.

pub mod memory;
#[cfg(feature = "postgres")]
pub mod postgres;

use crate::lifecycle::read::ReadOperation;
use crate::scopes::QueryCondition;
use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;

pub use memory::InMemoryStore;
#[cfg(feature = "postgres")]
pub use postgres::PgStore;

/// One persisted row, keyed by column name
pub type Row = serde_json::Map<String, Value>;

/// Collaborator failures
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Write failed for {table} record {record_id}: {reason}")]
    WriteFailed {
        table: String,
        record_id: i64,
        reason: String,
    },

    #[error("{table} record {record_id} not found")]
    RecordNotFound { table: String, record_id: i64 },

    #[error("Query failed: {reason}")]
    QueryFailed { reason: String },

    #[error("Transaction failed: {reason}")]
    TransactionFailed { reason: String },

    #[cfg(feature = "postgres")]
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Result of [`Persistence::execute_query`]
#[derive(Debug, Clone, PartialEq)]
pub enum QueryOutput {
    /// Point lookup or `first`
    Row(Option<Row>),
    /// Bulk fetch, ordered by primary key
    Rows(Vec<Row>),
    /// Aggregate or existence check
    Scalar(Value),
}

/// Renders a value safely for inclusion in an opaque expression string
pub trait QuoteLiteral: Send + Sync {
    fn quote_literal(&self, value: &Value) -> String;
}

/// Host persistence layer
#[async_trait]
pub trait Persistence: QuoteLiteral {
    type Transaction: PersistenceTransaction;

    /// Open a transaction. Dropping it without commit discards its writes.
    async fn begin(&self) -> StoreResult<Self::Transaction>;

    /// Persist one attribute of one row outside any explicit transaction
    async fn update_single_attribute(
        &self,
        table: &str,
        record_id: i64,
        attribute: &str,
        value: Value,
    ) -> StoreResult<()>;

    /// Run a read against `table` with exactly the given condition
    async fn execute_query(
        &self,
        table: &str,
        operation: &ReadOperation,
        condition: &QueryCondition,
    ) -> StoreResult<QueryOutput>;
}

/// Writes grouped into one atomic unit
#[async_trait]
pub trait PersistenceTransaction: Send {
    async fn update_single_attribute(
        &mut self,
        table: &str,
        record_id: i64,
        attribute: &str,
        value: Value,
    ) -> StoreResult<()>;

    async fn commit(self) -> StoreResult<()>;

    async fn rollback(self) -> StoreResult<()>;
}
