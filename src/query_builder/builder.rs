use super::conditions::render_condition;
use crate::constants::PRIMARY_KEY;
use crate::lifecycle::read::ReadOperation;
use crate::persistence::{QuoteLiteral, StoreError, StoreResult};
use crate::scopes::registry::{validate_identifier, validate_table_name};
use crate::scopes::QueryCondition;

/// Alias every statement gives the base table
const TABLE_ALIAS: &str = "t";

/// SELECT statement builder for scoped reads.
///
/// Every statement yields a single `jsonb` column so the store can decode
/// rows and aggregates uniformly.
#[derive(Debug, Clone)]
pub struct QueryBuilder {
    base_table: String,
    select_fields: Vec<String>,
    where_clauses: Vec<String>,
    order_by: Vec<String>,
    limit: Option<u32>,
}

impl QueryBuilder {
    /// Create a new query builder for the given table
    pub fn new(table: &str) -> Self {
        Self {
            base_table: table.to_string(),
            select_fields: vec![format!("to_jsonb({TABLE_ALIAS}.*)")],
            where_clauses: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Set specific fields to select
    pub fn select(mut self, fields: &[&str]) -> Self {
        self.select_fields = fields.iter().map(|f| f.to_string()).collect();
        self
    }

    /// Add a raw WHERE fragment; fragments are parenthesized and ANDed
    pub fn where_sql(mut self, sql: impl Into<String>) -> Self {
        self.where_clauses.push(sql.into());
        self
    }

    /// Add ORDER BY ASC
    pub fn order_asc(mut self, field: &str) -> Self {
        self.order_by.push(format!("{field} ASC"));
        self
    }

    /// Add LIMIT clause
    pub fn limit(mut self, limit: u32) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build the complete SQL query string
    pub fn build_sql(&self) -> String {
        let mut sql = format!(
            "SELECT {} FROM {} AS {TABLE_ALIAS}",
            self.select_fields.join(", "),
            self.base_table
        );

        sql.push_str(&self.where_sql_fragment());

        if !self.order_by.is_empty() {
            sql.push_str(&format!(" ORDER BY {}", self.order_by.join(", ")));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        sql
    }

    fn where_sql_fragment(&self) -> String {
        match self.where_clauses.as_slice() {
            [] => String::new(),
            [only] => format!(" WHERE {only}"),
            many => {
                let parts: Vec<String> = many.iter().map(|c| format!("({c})")).collect();
                format!(" WHERE {}", parts.join(" AND "))
            }
        }
    }

    /// Statement for `operation` against `table` constrained by `condition`
    pub fn for_read(
        table: &str,
        operation: &ReadOperation,
        condition: &QueryCondition,
        quoter: &dyn QuoteLiteral,
    ) -> StoreResult<String> {
        validate_table_name(table).map_err(|reason| StoreError::QueryFailed {
            reason: format!("invalid table name '{table}': {reason}"),
        })?;

        let mut builder = QueryBuilder::new(table);
        if let Some(fragment) = render_condition(condition, quoter)? {
            builder = builder.where_sql(fragment);
        }

        let sql = match operation {
            ReadOperation::Find { id } => builder
                .where_sql(format!("{TABLE_ALIAS}.{PRIMARY_KEY} = {id}"))
                .limit(1)
                .build_sql(),
            ReadOperation::All => builder
                .order_asc(&format!("{TABLE_ALIAS}.{PRIMARY_KEY}"))
                .build_sql(),
            ReadOperation::First => builder
                .order_asc(&format!("{TABLE_ALIAS}.{PRIMARY_KEY}"))
                .limit(1)
                .build_sql(),
            ReadOperation::Exists => {
                let inner = builder.select(&["1"]).limit(1).build_sql();
                format!("SELECT to_jsonb(EXISTS({inner}))")
            }
            aggregate => {
                let Some((function, column)) = aggregate.aggregate() else {
                    return Err(StoreError::QueryFailed {
                        reason: format!("unsupported read {aggregate:?}"),
                    });
                };
                let target = match column {
                    Some(column) => {
                        validate_identifier(column).map_err(|reason| StoreError::QueryFailed {
                            reason: format!("invalid aggregate column '{column}': {reason}"),
                        })?;
                        format!("{TABLE_ALIAS}.{column}")
                    }
                    None => "*".to_string(),
                };
                let select = format!("to_jsonb({}({target}))", function.sql_name());
                builder.select(&[select.as_str()]).build_sql()
            }
        };

        Ok(sql)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::lifecycle::read::AggregateFunction;
    use crate::query_builder::SqlQuoter;
    use serde_json::json;

    #[test]
    fn test_basic_query_building() {
        let sql = QueryBuilder::new("users")
            .where_sql("role = 'admin'")
            .order_asc("t.id")
            .limit(10)
            .build_sql();

        assert_eq!(
            sql,
            "SELECT to_jsonb(t.*) FROM users AS t WHERE role = 'admin' ORDER BY t.id ASC LIMIT 10"
        );
    }

    #[test]
    fn find_parenthesizes_the_scoped_condition() {
        let sql = QueryBuilder::for_read(
            "users",
            &ReadOperation::Find { id: 42 },
            &QueryCondition::expression("(a = 1 OR b = 2) AND (active = TRUE)"),
            &SqlQuoter,
        )
        .unwrap();

        assert_eq!(
            sql,
            "SELECT to_jsonb(t.*) FROM users AS t \
             WHERE ((a = 1 OR b = 2) AND (active = TRUE)) AND (t.id = 42) LIMIT 1"
        );
    }

    #[test]
    fn aggregates_select_jsonb_scalars() {
        let sql = QueryBuilder::for_read(
            "crm.accounts",
            &ReadOperation::Sum {
                column: "balance".to_string(),
            },
            &QueryCondition::eq("active", true),
            &SqlQuoter,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT to_jsonb(SUM(t.balance)) FROM crm.accounts AS t WHERE active = TRUE"
        );

        let count = QueryBuilder::for_read(
            "accounts",
            &ReadOperation::Calculate {
                function: AggregateFunction::Count,
                column: None,
            },
            &QueryCondition::Empty,
            &SqlQuoter,
        )
        .unwrap();
        assert_eq!(count, "SELECT to_jsonb(COUNT(*)) FROM accounts AS t");
    }

    #[test]
    fn exists_wraps_a_limited_subquery() {
        let sql = QueryBuilder::for_read(
            "users",
            &ReadOperation::Exists,
            &QueryCondition::parameterized("age > ?", vec![json!(18)]),
            &SqlQuoter,
        )
        .unwrap();
        assert_eq!(
            sql,
            "SELECT to_jsonb(EXISTS(SELECT 1 FROM users AS t WHERE age > 18 LIMIT 1))"
        );
    }

    #[test]
    fn rejects_unsafe_identifiers() {
        let bad_column = QueryBuilder::for_read(
            "users",
            &ReadOperation::Maximum {
                column: "x); DROP TABLE users; --".to_string(),
            },
            &QueryCondition::Empty,
            &SqlQuoter,
        );
        assert!(bad_column.is_err());

        let bad_table = QueryBuilder::for_read(
            "users u",
            &ReadOperation::All,
            &QueryCondition::Empty,
            &SqlQuoter,
        );
        assert!(bad_table.is_err());
    }
}
