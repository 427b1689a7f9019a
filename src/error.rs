//! # Error Types
//!
//! Structured error handling for soft-delete lifecycle and scope operations.
//! Every failure is surfaced synchronously to the caller; nothing here is
//! retried internally.

use crate::config::ConfigurationError;
use crate::lifecycle::hooks::HookError;
use crate::persistence::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SoftDeleteError {
    #[error("Unsupported condition shape: {shape}")]
    UnsupportedConditionShape { shape: String },

    #[error("Invalid state for {operation} on {entity_type}: {reason}")]
    InvalidState {
        entity_type: String,
        operation: String,
        reason: String,
    },

    #[error("{entity_type} record {record_id:?} is frozen: {operation} is not permitted")]
    FrozenStateViolation {
        entity_type: String,
        record_id: Option<i64>,
        operation: String,
    },

    #[error("Destroy of {entity_type} record {record_id:?} cancelled: {reason}")]
    DestroyCancelled {
        entity_type: String,
        record_id: Option<i64>,
        reason: String,
    },

    #[error("Persistence error: {0}")]
    Persistence(#[from] StoreError),

    #[error("Operation '{operation}' cannot bypass the active scope")]
    UnsupportedOperation { operation: String },

    #[error("Invalid active attribute name '{name}': {reason}")]
    InvalidAttributeName { name: String, reason: String },

    #[error("Entity type '{entity_type}' is not registered for soft delete")]
    NotRegistered { entity_type: String },

    #[error("Destroy callback failed: {0}")]
    Callback(#[from] HookError),

    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigurationError),
}

impl SoftDeleteError {
    /// True for any failure caused by the entity's persistence or mutability
    /// state, including operations attempted on frozen entities.
    pub fn is_invalid_state(&self) -> bool {
        matches!(
            self,
            SoftDeleteError::InvalidState { .. } | SoftDeleteError::FrozenStateViolation { .. }
        )
    }

    pub(crate) fn frozen(entity_type: &str, record_id: Option<i64>, operation: &str) -> Self {
        SoftDeleteError::FrozenStateViolation {
            entity_type: entity_type.to_string(),
            record_id,
            operation: operation.to_string(),
        }
    }

    pub(crate) fn invalid_state(entity_type: &str, operation: &str, reason: impl Into<String>) -> Self {
        SoftDeleteError::InvalidState {
            entity_type: entity_type.to_string(),
            operation: operation.to_string(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, SoftDeleteError>;
