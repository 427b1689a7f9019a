//! # Lifecycle Controller
//!
//! Mediates every change to an entity's active flag and every destroy, and
//! owns the read entry points: default reads filtered to active rows, plus
//! the explicit bypass path for whitelisted read kinds.
//!
//! ## Destroy protocol
//!
//! 1. Before hooks run in registration order; the first cancel aborts the
//!    destroy with `DestroyCancelled` and the entity is left untouched.
//! 2. A persisted entity has its active attribute set to false inside a
//!    transaction. A failed write rolls back and restores the attribute.
//! 3. The transaction commits, then the instance is frozen.
//! 4. After hooks run; their failures are logged and swallowed.
//!
//! Unsaved entities skip the write but still freeze and still run both hook
//! lists.

use super::hooks::{
    AfterDestroyHook, BeforeDestroyHook, DestroyCallbacks, HookDecision, HookResult,
};
use super::read::{AggregateFunction, ReadKind, ReadOperation};
use crate::config::SoftDeleteConfig;
use crate::constants::{operations, DEFAULT_BYPASS_OPERATIONS};
use crate::error::{Result, SoftDeleteError};
use crate::logging::log_lifecycle_operation;
use crate::models::{Record, SoftDeletable};
use crate::persistence::{Persistence, PersistenceTransaction, QueryOutput, Row, StoreError};
use crate::scopes::{
    EntityTypeConfig, QueryCondition, Registration, RegistrationOptions, ScopeRegistry,
    Visibility,
};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, error, info, instrument, warn};

/// Result of a read, with rows hydrated into [`Record`]s
#[derive(Debug, Clone, PartialEq)]
pub enum ReadResult {
    Record(Option<Record>),
    Records(Vec<Record>),
    Value(Value),
}

impl ReadResult {
    pub fn into_record(self) -> Option<Record> {
        match self {
            ReadResult::Record(record) => record,
            ReadResult::Records(records) => records.into_iter().next(),
            ReadResult::Value(_) => None,
        }
    }

    pub fn into_records(self) -> Vec<Record> {
        match self {
            ReadResult::Record(record) => record.into_iter().collect(),
            ReadResult::Records(records) => records,
            ReadResult::Value(_) => Vec::new(),
        }
    }

    pub fn into_value(self) -> Value {
        match self {
            ReadResult::Value(value) => value,
            _ => Value::Null,
        }
    }
}

pub struct LifecycleController<P: Persistence> {
    store: Arc<P>,
    registry: Arc<ScopeRegistry>,
    callbacks: DestroyCallbacks,
    bypass_operations: HashSet<ReadKind>,
}

impl<P: Persistence> std::fmt::Debug for LifecycleController<P> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LifecycleController")
            .field("registered_types", &self.registry.len())
            .field("callbacks", &self.callbacks)
            .field("bypass_operations", &self.bypass_operations)
            .finish()
    }
}

pub struct LifecycleControllerBuilder<P: Persistence> {
    store: Arc<P>,
    registry: Option<Arc<ScopeRegistry>>,
    config: SoftDeleteConfig,
    callbacks: DestroyCallbacks,
}

impl<P: Persistence> LifecycleControllerBuilder<P> {
    /// Share an existing registry instead of creating one from the config
    pub fn registry(mut self, registry: Arc<ScopeRegistry>) -> Self {
        self.registry = Some(registry);
        self
    }

    pub fn config(mut self, config: &SoftDeleteConfig) -> Self {
        self.config = config.clone();
        self
    }

    pub fn before_destroy(
        mut self,
        entity_type: impl Into<String>,
        hook: Arc<dyn BeforeDestroyHook>,
    ) -> Self {
        self.callbacks.add_before(entity_type, hook);
        self
    }

    pub fn after_destroy(
        mut self,
        entity_type: impl Into<String>,
        hook: Arc<dyn AfterDestroyHook>,
    ) -> Self {
        self.callbacks.add_after(entity_type, hook);
        self
    }

    pub fn build(self) -> Result<LifecycleController<P>> {
        self.config.validate()?;
        let registry = match self.registry {
            Some(registry) => registry,
            None => Arc::new(ScopeRegistry::with_default_attribute(
                self.config.default_attribute()?,
            )),
        };

        Ok(LifecycleController {
            store: self.store,
            registry,
            callbacks: self.callbacks,
            bypass_operations: self.config.bypass_operations.iter().copied().collect(),
        })
    }
}

impl<P: Persistence> LifecycleController<P> {
    pub fn builder(store: Arc<P>) -> LifecycleControllerBuilder<P> {
        LifecycleControllerBuilder {
            store,
            registry: None,
            config: SoftDeleteConfig::default(),
            callbacks: DestroyCallbacks::new(),
        }
    }

    /// Controller with default configuration and no hooks
    pub fn new(store: Arc<P>) -> Self {
        Self {
            store,
            registry: Arc::new(ScopeRegistry::new()),
            callbacks: DestroyCallbacks::new(),
            bypass_operations: DEFAULT_BYPASS_OPERATIONS.into_iter().collect(),
        }
    }

    pub fn store(&self) -> &Arc<P> {
        &self.store
    }

    pub fn registry(&self) -> &Arc<ScopeRegistry> {
        &self.registry
    }

    pub fn allows_bypass(&self, kind: ReadKind) -> bool {
        self.bypass_operations.contains(&kind)
    }

    /// Opt an entity type into soft delete. First registration wins.
    pub fn register(
        &self,
        entity_type: &str,
        options: RegistrationOptions,
    ) -> Result<Registration> {
        self.registry.register(entity_type, options)
    }

    /// True only when the active attribute holds boolean `true`
    pub fn is_active(&self, entity: &dyn SoftDeletable) -> bool {
        let attribute = self
            .registry
            .config_for(entity.entity_type())
            .map(|config| config.active_attribute.to_string())
            .unwrap_or_else(|| self.registry.default_attribute().to_string());
        matches!(entity.read_attribute(&attribute), Some(Value::Bool(true)))
    }

    pub async fn activate(&self, entity: &mut dyn SoftDeletable) -> Result<()> {
        self.set_active(entity, true, operations::ACTIVATE).await
    }

    pub async fn deactivate(&self, entity: &mut dyn SoftDeletable) -> Result<()> {
        self.set_active(entity, false, operations::DEACTIVATE).await
    }

    #[instrument(
        skip(self, entity),
        fields(entity_type = %entity.entity_type(), record_id = ?entity.record_id())
    )]
    async fn set_active(
        &self,
        entity: &mut dyn SoftDeletable,
        value: bool,
        operation: &'static str,
    ) -> Result<()> {
        let config = self.mutation_target(&*entity, operation)?;
        let record_id = persisted_id(&*entity, operation)?;
        let attribute = config.active_attribute.as_str();

        let previous = entity.read_attribute(attribute);
        entity.write_attribute(attribute, Value::Bool(value))?;

        if let Err(err) = self
            .store
            .update_single_attribute(&config.table_name, record_id, attribute, Value::Bool(value))
            .await
        {
            restore_attribute(entity, attribute, previous);
            log_lifecycle_operation(
                operation,
                &config.entity_type,
                Some(record_id),
                "failed",
                Some(&err.to_string()),
            );
            return Err(err.into());
        }

        log_lifecycle_operation(
            operation,
            &config.entity_type,
            Some(record_id),
            "completed",
            None,
        );
        Ok(())
    }

    /// Soft-delete `entity` under the full before/after hook protocol
    #[instrument(
        skip(self, entity),
        fields(entity_type = %entity.entity_type(), record_id = ?entity.record_id())
    )]
    pub async fn destroy(&self, entity: &mut dyn SoftDeletable) -> Result<()> {
        let config = self.mutation_target(&*entity, operations::DESTROY)?;
        let record_id = if entity.is_new() {
            None
        } else {
            Some(persisted_id(&*entity, operations::DESTROY)?)
        };

        let mut tx = self.store.begin().await?;

        match self.run_before_hooks(&*entity).await {
            Ok(HookDecision::Continue) => {}
            Ok(HookDecision::Cancel { reason }) => {
                rollback_quietly(tx).await;
                log_lifecycle_operation(
                    operations::DESTROY,
                    &config.entity_type,
                    record_id,
                    "cancelled",
                    Some(&reason),
                );
                return Err(SoftDeleteError::DestroyCancelled {
                    entity_type: config.entity_type.clone(),
                    record_id,
                    reason,
                });
            }
            Err(err) => {
                rollback_quietly(tx).await;
                error!(error = %err, "Before-destroy hook failed");
                return Err(err.into());
            }
        }

        if let Some(record_id) = record_id {
            let attribute = config.active_attribute.as_str();
            let previous = entity.read_attribute(attribute);
            if let Err(err) = entity.write_attribute(attribute, Value::Bool(false)) {
                rollback_quietly(tx).await;
                log_lifecycle_operation(
                    operations::DESTROY,
                    &config.entity_type,
                    Some(record_id),
                    "rolled_back",
                    Some(&err.to_string()),
                );
                return Err(err);
            }

            if let Err(err) = tx
                .update_single_attribute(
                    &config.table_name,
                    record_id,
                    attribute,
                    Value::Bool(false),
                )
                .await
            {
                restore_attribute(entity, attribute, previous.clone());
                rollback_quietly(tx).await;
                log_lifecycle_operation(
                    operations::DESTROY,
                    &config.entity_type,
                    Some(record_id),
                    "rolled_back",
                    Some(&err.to_string()),
                );
                return Err(err.into());
            }

            if let Err(err) = tx.commit().await {
                restore_attribute(entity, attribute, previous);
                log_lifecycle_operation(
                    operations::DESTROY,
                    &config.entity_type,
                    Some(record_id),
                    "commit_failed",
                    Some(&err.to_string()),
                );
                return Err(err.into());
            }
        } else {
            tx.commit().await?;
        }

        entity.freeze();
        self.run_after_hooks(&*entity).await;

        log_lifecycle_operation(
            operations::DESTROY,
            &config.entity_type,
            record_id,
            "completed",
            None,
        );
        Ok(())
    }

    /// Deactivate (when persisted) and freeze, with no hooks and no transaction
    pub async fn destroy_without_callbacks(&self, entity: &mut dyn SoftDeletable) -> Result<()> {
        let config = self.mutation_target(&*entity, operations::DESTROY_WITHOUT_CALLBACKS)?;
        let mut record_id = None;

        if !entity.is_new() {
            let id = persisted_id(&*entity, operations::DESTROY_WITHOUT_CALLBACKS)?;
            let attribute = config.active_attribute.as_str();
            let previous = entity.read_attribute(attribute);
            entity.write_attribute(attribute, Value::Bool(false))?;

            if let Err(err) = self
                .store
                .update_single_attribute(&config.table_name, id, attribute, Value::Bool(false))
                .await
            {
                restore_attribute(entity, attribute, previous);
                return Err(err.into());
            }
            record_id = Some(id);
        }

        entity.freeze();
        log_lifecycle_operation(
            operations::DESTROY_WITHOUT_CALLBACKS,
            &config.entity_type,
            record_id,
            "completed",
            None,
        );
        Ok(())
    }

    /// Frozen → `FrozenStateViolation`, unregistered → `NotRegistered`
    fn mutation_target(
        &self,
        entity: &dyn SoftDeletable,
        operation: &str,
    ) -> Result<Arc<EntityTypeConfig>> {
        if entity.is_frozen() {
            return Err(SoftDeleteError::frozen(
                entity.entity_type(),
                entity.record_id(),
                operation,
            ));
        }
        self.registry.require(entity.entity_type())
    }

    async fn run_before_hooks(&self, entity: &dyn SoftDeletable) -> HookResult<HookDecision> {
        for hook in self.callbacks.before_hooks(entity.entity_type()) {
            let decision = hook.before_destroy(entity).await?;
            if let HookDecision::Cancel { .. } = decision {
                debug!(hook = hook.description(), "Destroy cancelled by hook");
                return Ok(decision);
            }
        }
        Ok(HookDecision::Continue)
    }

    async fn run_after_hooks(&self, entity: &dyn SoftDeletable) {
        for hook in self.callbacks.after_hooks(entity.entity_type()) {
            if let Err(err) = hook.after_destroy(entity).await {
                warn!(
                    hook = hook.description(),
                    entity_type = %entity.entity_type(),
                    record_id = ?entity.record_id(),
                    error = %err,
                    "After-destroy hook failed; destroy already committed"
                );
            }
        }
    }

    /// Run `operation` with the given visibility. `IncludeInactive` is held to
    /// the same whitelist as [`Self::read_including_inactive`].
    pub async fn read(
        &self,
        entity_type: &str,
        operation: ReadOperation,
        condition: QueryCondition,
        visibility: Visibility,
    ) -> Result<ReadResult> {
        match visibility {
            Visibility::ActiveOnly => {
                self.execute_read(entity_type, operation, condition, visibility)
                    .await
            }
            Visibility::IncludeInactive => {
                self.read_including_inactive(entity_type, operation, condition)
                    .await
            }
        }
    }

    #[instrument(skip(self, condition), fields(kind = %operation.kind()))]
    async fn execute_read(
        &self,
        entity_type: &str,
        operation: ReadOperation,
        condition: QueryCondition,
        visibility: Visibility,
    ) -> Result<ReadResult> {
        let query = self.registry.scoped_query(
            entity_type,
            condition,
            visibility,
            self.store.as_ref(),
        );

        let output = self
            .store
            .execute_query(&query.table_name, &operation, &query.condition)
            .await?;

        Ok(match output {
            QueryOutput::Row(row) => {
                ReadResult::Record(row.map(|row| hydrate(entity_type, row)).transpose()?)
            }
            QueryOutput::Rows(rows) => ReadResult::Records(
                rows.into_iter()
                    .map(|row| hydrate(entity_type, row))
                    .collect::<Result<Vec<_>>>()?,
            ),
            QueryOutput::Scalar(value) => ReadResult::Value(value),
        })
    }

    /// Run a whitelisted read with the active scope suspended for this call only
    pub async fn read_including_inactive(
        &self,
        entity_type: &str,
        operation: ReadOperation,
        condition: QueryCondition,
    ) -> Result<ReadResult> {
        let kind = operation.kind();
        if !self.allows_bypass(kind) {
            warn!(entity_type = %entity_type, kind = %kind, "Rejected bypass read");
            return Err(SoftDeleteError::UnsupportedOperation {
                operation: kind.to_string(),
            });
        }

        info!(
            entity_type = %entity_type,
            kind = %kind,
            operation = operations::READ_INCLUDING_INACTIVE,
            "Reading with inactive rows included"
        );
        self.execute_read(entity_type, operation, condition, Visibility::IncludeInactive)
            .await
    }

    // Default reads: the active scope applies to registered types.

    pub async fn find(&self, entity_type: &str, id: i64) -> Result<Option<Record>> {
        self.read(
            entity_type,
            ReadOperation::Find { id },
            QueryCondition::Empty,
            Visibility::ActiveOnly,
        )
        .await
        .map(ReadResult::into_record)
    }

    pub async fn all(&self, entity_type: &str, condition: QueryCondition) -> Result<Vec<Record>> {
        self.read(entity_type, ReadOperation::All, condition, Visibility::ActiveOnly)
            .await
            .map(ReadResult::into_records)
    }

    pub async fn first(
        &self,
        entity_type: &str,
        condition: QueryCondition,
    ) -> Result<Option<Record>> {
        self.read(entity_type, ReadOperation::First, condition, Visibility::ActiveOnly)
            .await
            .map(ReadResult::into_record)
    }

    pub async fn count(&self, entity_type: &str, condition: QueryCondition) -> Result<i64> {
        let value = self
            .read(entity_type, ReadOperation::Count, condition, Visibility::ActiveOnly)
            .await?
            .into_value();
        count_from(value)
    }

    pub async fn sum(
        &self,
        entity_type: &str,
        column: &str,
        condition: QueryCondition,
    ) -> Result<Value> {
        let operation = ReadOperation::Sum {
            column: column.to_string(),
        };
        self.scalar(entity_type, operation, condition, Visibility::ActiveOnly)
            .await
    }

    pub async fn average(
        &self,
        entity_type: &str,
        column: &str,
        condition: QueryCondition,
    ) -> Result<Value> {
        let operation = ReadOperation::Average {
            column: column.to_string(),
        };
        self.scalar(entity_type, operation, condition, Visibility::ActiveOnly)
            .await
    }

    pub async fn minimum(
        &self,
        entity_type: &str,
        column: &str,
        condition: QueryCondition,
    ) -> Result<Value> {
        let operation = ReadOperation::Minimum {
            column: column.to_string(),
        };
        self.scalar(entity_type, operation, condition, Visibility::ActiveOnly)
            .await
    }

    pub async fn maximum(
        &self,
        entity_type: &str,
        column: &str,
        condition: QueryCondition,
    ) -> Result<Value> {
        let operation = ReadOperation::Maximum {
            column: column.to_string(),
        };
        self.scalar(entity_type, operation, condition, Visibility::ActiveOnly)
            .await
    }

    pub async fn calculate(
        &self,
        entity_type: &str,
        function: AggregateFunction,
        column: Option<&str>,
        condition: QueryCondition,
    ) -> Result<Value> {
        let operation = ReadOperation::Calculate {
            function,
            column: column.map(str::to_string),
        };
        self.scalar(entity_type, operation, condition, Visibility::ActiveOnly)
            .await
    }

    pub async fn exists(&self, entity_type: &str, condition: QueryCondition) -> Result<bool> {
        let value = self
            .scalar(entity_type, ReadOperation::Exists, condition, Visibility::ActiveOnly)
            .await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    async fn scalar(
        &self,
        entity_type: &str,
        operation: ReadOperation,
        condition: QueryCondition,
        visibility: Visibility,
    ) -> Result<Value> {
        let result = self
            .read(entity_type, operation, condition, visibility)
            .await?;
        Ok(result.into_value())
    }

    // Bypass reads: each is read_including_inactive with a fixed operation.

    pub async fn find_with_inactive(&self, entity_type: &str, id: i64) -> Result<Option<Record>> {
        self.read_including_inactive(entity_type, ReadOperation::Find { id }, QueryCondition::Empty)
            .await
            .map(ReadResult::into_record)
    }

    pub async fn all_with_inactive(
        &self,
        entity_type: &str,
        condition: QueryCondition,
    ) -> Result<Vec<Record>> {
        self.read_including_inactive(entity_type, ReadOperation::All, condition)
            .await
            .map(ReadResult::into_records)
    }

    pub async fn count_with_inactive(
        &self,
        entity_type: &str,
        condition: QueryCondition,
    ) -> Result<i64> {
        let value = self
            .read_including_inactive(entity_type, ReadOperation::Count, condition)
            .await?
            .into_value();
        count_from(value)
    }

    pub async fn sum_with_inactive(
        &self,
        entity_type: &str,
        column: &str,
        condition: QueryCondition,
    ) -> Result<Value> {
        let operation = ReadOperation::Sum {
            column: column.to_string(),
        };
        self.scalar(entity_type, operation, condition, Visibility::IncludeInactive)
            .await
    }

    pub async fn average_with_inactive(
        &self,
        entity_type: &str,
        column: &str,
        condition: QueryCondition,
    ) -> Result<Value> {
        let operation = ReadOperation::Average {
            column: column.to_string(),
        };
        self.scalar(entity_type, operation, condition, Visibility::IncludeInactive)
            .await
    }

    pub async fn minimum_with_inactive(
        &self,
        entity_type: &str,
        column: &str,
        condition: QueryCondition,
    ) -> Result<Value> {
        let operation = ReadOperation::Minimum {
            column: column.to_string(),
        };
        self.scalar(entity_type, operation, condition, Visibility::IncludeInactive)
            .await
    }

    pub async fn maximum_with_inactive(
        &self,
        entity_type: &str,
        column: &str,
        condition: QueryCondition,
    ) -> Result<Value> {
        let operation = ReadOperation::Maximum {
            column: column.to_string(),
        };
        self.scalar(entity_type, operation, condition, Visibility::IncludeInactive)
            .await
    }

    pub async fn calculate_with_inactive(
        &self,
        entity_type: &str,
        function: AggregateFunction,
        column: Option<&str>,
        condition: QueryCondition,
    ) -> Result<Value> {
        let operation = ReadOperation::Calculate {
            function,
            column: column.map(str::to_string),
        };
        self.scalar(entity_type, operation, condition, Visibility::IncludeInactive)
            .await
    }
}

fn persisted_id(entity: &dyn SoftDeletable, operation: &str) -> Result<i64> {
    if entity.is_new() {
        return Err(SoftDeleteError::invalid_state(
            entity.entity_type(),
            operation,
            "entity has not been persisted",
        ));
    }
    entity.record_id().ok_or_else(|| {
        SoftDeleteError::invalid_state(
            entity.entity_type(),
            operation,
            "persisted entity has no record id",
        )
    })
}

/// Put back the value seen before a failed write; an absent attribute is removed again
fn restore_attribute(entity: &mut dyn SoftDeletable, attribute: &str, previous: Option<Value>) {
    let restored = match previous {
        Some(value) => entity.write_attribute(attribute, value),
        None => entity.remove_attribute(attribute),
    };
    if let Err(err) = restored {
        error!(
            error = %err,
            attribute = %attribute,
            "Failed to restore attribute after write failure"
        );
    }
}

async fn rollback_quietly<T: PersistenceTransaction>(tx: T) {
    if let Err(err) = tx.rollback().await {
        warn!(error = %err, "Rollback failed");
    }
}

fn hydrate(entity_type: &str, row: Row) -> Result<Record> {
    Record::persisted(entity_type, row)
}

fn count_from(value: Value) -> Result<i64> {
    value.as_i64().ok_or_else(|| {
        StoreError::QueryFailed {
            reason: format!("count returned a non-integer value: {value}"),
        }
        .into()
    })
}
