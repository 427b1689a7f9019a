use crate::constants::{operations, PRIMARY_KEY};
use crate::error::{Result, SoftDeleteError};
use crate::persistence::Row;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Whether an entity has been stored yet
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistenceState {
    New,
    Persisted,
}

/// Frozen is terminal: no attribute write is accepted afterwards
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Mutability {
    Mutable,
    Frozen,
}

/// What the lifecycle controller needs from an entity instance.
///
/// Host models implement this to take part in soft delete; [`Record`] is a
/// ready-made implementation over a JSON attribute map.
pub trait SoftDeletable: Send + Sync {
    fn entity_type(&self) -> &str;

    /// Primary key; `None` until persisted
    fn record_id(&self) -> Option<i64>;

    fn persistence_state(&self) -> PersistenceState;

    fn read_attribute(&self, name: &str) -> Option<Value>;

    /// Must fail with `FrozenStateViolation` once the entity is frozen
    fn write_attribute(&mut self, name: &str, value: Value) -> Result<()>;

    /// Drop an attribute entirely. Same frozen rule as `write_attribute`.
    fn remove_attribute(&mut self, name: &str) -> Result<()>;

    fn mutability(&self) -> Mutability;

    fn freeze(&mut self);

    fn is_new(&self) -> bool {
        self.persistence_state() == PersistenceState::New
    }

    fn is_frozen(&self) -> bool {
        self.mutability() == Mutability::Frozen
    }
}

/// A generic entity instance: a type name plus a map of attributes
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    entity_type: String,
    attributes: Row,
    state: PersistenceState,
    mutability: Mutability,
}

impl Record {
    /// An unsaved record
    pub fn new(entity_type: impl Into<String>, attributes: Row) -> Self {
        Self {
            entity_type: entity_type.into(),
            attributes,
            state: PersistenceState::New,
            mutability: Mutability::Mutable,
        }
    }

    /// A record loaded from storage; the row must carry an integer `id`
    pub fn persisted(entity_type: impl Into<String>, attributes: Row) -> Result<Self> {
        let entity_type = entity_type.into();
        if attributes.get(PRIMARY_KEY).and_then(Value::as_i64).is_none() {
            return Err(SoftDeleteError::InvalidState {
                entity_type,
                operation: "load".to_string(),
                reason: format!("persisted rows require an integer '{PRIMARY_KEY}'"),
            });
        }
        Ok(Self {
            entity_type,
            attributes,
            state: PersistenceState::Persisted,
            mutability: Mutability::Mutable,
        })
    }

    /// Record the outcome of an external save
    pub fn mark_persisted(&mut self, record_id: i64) -> Result<()> {
        self.write_attribute(PRIMARY_KEY, Value::from(record_id))?;
        self.state = PersistenceState::Persisted;
        Ok(())
    }

    pub fn attributes(&self) -> &Row {
        &self.attributes
    }

    pub fn get(&self, name: &str) -> Option<&Value> {
        self.attributes.get(name)
    }
}

impl SoftDeletable for Record {
    fn entity_type(&self) -> &str {
        &self.entity_type
    }

    fn record_id(&self) -> Option<i64> {
        self.attributes.get(PRIMARY_KEY).and_then(Value::as_i64)
    }

    fn persistence_state(&self) -> PersistenceState {
        self.state
    }

    fn read_attribute(&self, name: &str) -> Option<Value> {
        self.attributes.get(name).cloned()
    }

    fn write_attribute(&mut self, name: &str, value: Value) -> Result<()> {
        if self.is_frozen() {
            return Err(SoftDeleteError::frozen(
                &self.entity_type,
                self.record_id(),
                operations::WRITE_ATTRIBUTE,
            ));
        }
        self.attributes.insert(name.to_string(), value);
        Ok(())
    }

    fn remove_attribute(&mut self, name: &str) -> Result<()> {
        if self.is_frozen() {
            return Err(SoftDeleteError::frozen(
                &self.entity_type,
                self.record_id(),
                operations::WRITE_ATTRIBUTE,
            ));
        }
        self.attributes.remove(name);
        Ok(())
    }

    fn mutability(&self) -> Mutability {
        self.mutability
    }

    fn freeze(&mut self) {
        self.mutability = Mutability::Frozen;
    }
}
