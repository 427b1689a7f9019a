//! # Read Visibility
//!
//! Whether the default active scope applies is decided per call, by the
//! [`Visibility`] value the caller passes down with the query. Nothing here
//! is shared between calls, so concurrent filtered and unfiltered reads of
//! the same entity type cannot observe each other's choice.

use super::condition::QueryCondition;
use super::predicate::inject_active_predicate;
use super::registry::{EntityTypeConfig, ScopeRegistry};
use crate::persistence::QuoteLiteral;
use std::sync::Arc;
use tracing::trace;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum Visibility {
    /// Default scope: only rows whose active attribute is true
    #[default]
    ActiveOnly,
    /// Default scope suspended for this one read
    IncludeInactive,
}

impl Visibility {
    pub fn is_filtered(self) -> bool {
        matches!(self, Visibility::ActiveOnly)
    }
}

/// A condition resolved against the registry, ready for the persistence layer
#[derive(Debug, Clone, PartialEq)]
pub struct ScopedQuery {
    pub entity_type: String,
    pub table_name: String,
    pub condition: QueryCondition,
    pub visibility: Visibility,
}

/// Apply the default scope of `config` (if any) to `condition`.
///
/// Unregistered types (`config == None`) and bypassed reads pass through
/// unchanged.
pub fn apply_default_scope(
    config: Option<&EntityTypeConfig>,
    condition: QueryCondition,
    visibility: Visibility,
    quoter: &dyn QuoteLiteral,
) -> QueryCondition {
    match (config, visibility) {
        (Some(config), Visibility::ActiveOnly) => {
            inject_active_predicate(condition, &config.active_attribute, quoter)
        }
        _ => condition,
    }
}

impl ScopeRegistry {
    /// Build the query a read of `entity_type` should actually run
    pub fn scoped_query(
        &self,
        entity_type: &str,
        condition: QueryCondition,
        visibility: Visibility,
        quoter: &dyn QuoteLiteral,
    ) -> ScopedQuery {
        let config: Option<Arc<EntityTypeConfig>> = self.config_for(entity_type);
        let table_name = config
            .as_ref()
            .map(|c| c.table_name.clone())
            .unwrap_or_else(|| entity_type.to_string());
        let condition = apply_default_scope(config.as_deref(), condition, visibility, quoter);

        trace!(
            entity_type = %entity_type,
            visibility = ?visibility,
            shape = condition.shape_name(),
            "Scoped read condition"
        );

        ScopedQuery {
            entity_type: entity_type.to_string(),
            table_name,
            condition,
            visibility,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query_builder::SqlQuoter;
    use crate::scopes::RegistrationOptions;

    #[test]
    fn filtered_reads_of_registered_types_are_scoped() {
        let registry = ScopeRegistry::new();
        registry
            .register("users", RegistrationOptions::with_attribute("enabled").table("app_users"))
            .unwrap();

        let query = registry.scoped_query(
            "users",
            QueryCondition::eq("role", "admin"),
            Visibility::ActiveOnly,
            &SqlQuoter,
        );

        assert_eq!(query.table_name, "app_users");
        assert_eq!(
            query.condition,
            QueryCondition::eq("role", "admin").and_eq("enabled", true)
        );
    }

    #[test]
    fn bypassed_reads_keep_the_caller_condition() {
        let registry = ScopeRegistry::new();
        registry.register("users", RegistrationOptions::default()).unwrap();

        let query = registry.scoped_query(
            "users",
            QueryCondition::expression("age > 30"),
            Visibility::IncludeInactive,
            &SqlQuoter,
        );

        assert_eq!(query.condition, QueryCondition::expression("age > 30"));
        assert!(!query.visibility.is_filtered());
    }

    #[test]
    fn unregistered_types_are_not_scoped() {
        let registry = ScopeRegistry::new();
        let query = registry.scoped_query(
            "audit_events",
            QueryCondition::Empty,
            Visibility::ActiveOnly,
            &SqlQuoter,
        );
        assert_eq!(query.condition, QueryCondition::Empty);
        assert_eq!(query.table_name, "audit_events");
    }
}
