//! Before/after destroy callbacks.
//!
//! A before hook may veto a destroy; after hooks are notifications whose
//! failures are logged and never propagated.

use crate::models::SoftDeletable;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;

/// Outcome of a before-destroy hook
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookDecision {
    Continue,
    Cancel { reason: String },
}

impl HookDecision {
    pub fn cancel(reason: impl Into<String>) -> Self {
        HookDecision::Cancel {
            reason: reason.into(),
        }
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{hook} failed: {message}")]
pub struct HookError {
    pub hook: String,
    pub message: String,
}

impl HookError {
    pub fn new(hook: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            hook: hook.into(),
            message: message.into(),
        }
    }
}

pub type HookResult<T> = Result<T, HookError>;

/// Runs before the soft-delete write and may cancel the destroy
#[async_trait]
pub trait BeforeDestroyHook: Send + Sync {
    async fn before_destroy(&self, entity: &dyn SoftDeletable) -> HookResult<HookDecision>;

    /// Get a description of this hook for logging
    fn description(&self) -> &'static str;
}

/// Runs after the entity has been deactivated and frozen
#[async_trait]
pub trait AfterDestroyHook: Send + Sync {
    async fn after_destroy(&self, entity: &dyn SoftDeletable) -> HookResult<()>;

    /// Get a description of this hook for logging
    fn description(&self) -> &'static str;
}

/// Hooks per entity type, in registration order
#[derive(Default, Clone)]
pub struct DestroyCallbacks {
    before: HashMap<String, Vec<Arc<dyn BeforeDestroyHook>>>,
    after: HashMap<String, Vec<Arc<dyn AfterDestroyHook>>>,
}

impl DestroyCallbacks {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_before(&mut self, entity_type: impl Into<String>, hook: Arc<dyn BeforeDestroyHook>) {
        self.before.entry(entity_type.into()).or_default().push(hook);
    }

    pub fn add_after(&mut self, entity_type: impl Into<String>, hook: Arc<dyn AfterDestroyHook>) {
        self.after.entry(entity_type.into()).or_default().push(hook);
    }

    pub fn before_hooks(&self, entity_type: &str) -> &[Arc<dyn BeforeDestroyHook>] {
        self.before.get(entity_type).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn after_hooks(&self, entity_type: &str) -> &[Arc<dyn AfterDestroyHook>] {
        self.after.get(entity_type).map(Vec::as_slice).unwrap_or(&[])
    }
}

fn hook_counts<T: ?Sized>(hooks: &HashMap<String, Vec<Arc<T>>>) -> HashMap<String, usize> {
    hooks.iter().map(|(k, v)| (k.clone(), v.len())).collect()
}

impl std::fmt::Debug for DestroyCallbacks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DestroyCallbacks")
            .field("before", &hook_counts(&self.before))
            .field("after", &hook_counts(&self.after))
            .finish()
    }
}

/// Vetoes every destroy with a fixed reason
pub struct RejectDestroyHook {
    reason: String,
}

impl RejectDestroyHook {
    pub fn new(reason: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
        }
    }
}

#[async_trait]
impl BeforeDestroyHook for RejectDestroyHook {
    async fn before_destroy(&self, _entity: &dyn SoftDeletable) -> HookResult<HookDecision> {
        Ok(HookDecision::cancel(self.reason.clone()))
    }

    fn description(&self) -> &'static str {
        "Reject all destroys"
    }
}
