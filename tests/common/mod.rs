//! Shared fixtures for the integration tests
#![allow(dead_code)]

pub mod strategies;

use async_trait::async_trait;
use parking_lot::Mutex;
use serde_json::{json, Value};
use std::sync::Arc;
use tasker_soft_delete::lifecycle::{HookError, HookResult};
use tasker_soft_delete::persistence::memory::InMemoryStore;
use tasker_soft_delete::persistence::Row;
use tasker_soft_delete::{
    AfterDestroyHook, BeforeDestroyHook, HookDecision, LifecycleController, Record,
    RegistrationOptions, SoftDeletable,
};

pub const USERS: &str = "users";

pub fn row(value: Value) -> Row {
    value.as_object().cloned().expect("fixture rows are JSON objects")
}

/// ann (active, 30), bob (inactive, 40), cid (active, 50), dee (inactive, 20)
pub fn seed_users(store: &InMemoryStore) -> Vec<Row> {
    [
        json!({"name": "ann", "age": 30, "active": true}),
        json!({"name": "bob", "age": 40, "active": false}),
        json!({"name": "cid", "age": 50, "active": true}),
        json!({"name": "dee", "age": 20, "active": false}),
    ]
    .into_iter()
    .map(|value| store.insert(USERS, row(value)))
    .collect()
}

/// Store plus a controller with `users` registered under the defaults
pub fn users_controller() -> (Arc<InMemoryStore>, LifecycleController<InMemoryStore>) {
    let store = Arc::new(InMemoryStore::new());
    let controller = LifecycleController::new(Arc::clone(&store));
    controller
        .register(USERS, RegistrationOptions::default())
        .expect("users registers");
    (store, controller)
}

/// Insert an active user and load it back as a persisted record
pub fn persisted_user(store: &InMemoryStore, name: &str) -> Record {
    let stored = store.insert(USERS, row(json!({"name": name, "active": true})));
    Record::persisted(USERS, stored).expect("stored rows carry an id")
}

pub fn new_user(name: &str) -> Record {
    Record::new(USERS, row(json!({"name": name, "active": true})))
}

/// Shared, ordered log of hook invocations
#[derive(Debug, Clone, Default)]
pub struct HookLog(Arc<Mutex<Vec<String>>>);

impl HookLog {
    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }
}

/// Before hook that records the entity's state and then continues, cancels
/// or fails
pub struct RecordingBeforeHook {
    pub log: HookLog,
    pub cancel_with: Option<String>,
    pub fail: bool,
}

impl RecordingBeforeHook {
    pub fn continuing(log: &HookLog) -> Self {
        Self {
            log: log.clone(),
            cancel_with: None,
            fail: false,
        }
    }

    pub fn cancelling(log: &HookLog, reason: &str) -> Self {
        Self {
            cancel_with: Some(reason.to_string()),
            ..Self::continuing(log)
        }
    }

    pub fn failing(log: &HookLog) -> Self {
        Self {
            fail: true,
            ..Self::continuing(log)
        }
    }
}

#[async_trait]
impl BeforeDestroyHook for RecordingBeforeHook {
    async fn before_destroy(&self, entity: &dyn SoftDeletable) -> HookResult<HookDecision> {
        self.log.push(format!(
            "before:{}:frozen={}",
            entity.entity_type(),
            entity.is_frozen()
        ));
        if self.fail {
            return Err(HookError::new("recording", "permission service unavailable"));
        }
        Ok(match &self.cancel_with {
            Some(reason) => HookDecision::cancel(reason.clone()),
            None => HookDecision::Continue,
        })
    }

    fn description(&self) -> &'static str {
        "Recording before-destroy hook"
    }
}

/// After hook that records what it saw, optionally failing afterwards
pub struct RecordingAfterHook {
    pub log: HookLog,
    pub fail: bool,
}

#[async_trait]
impl AfterDestroyHook for RecordingAfterHook {
    async fn after_destroy(&self, entity: &dyn SoftDeletable) -> HookResult<()> {
        self.log.push(format!(
            "after:{}:frozen={}:active={}",
            entity.entity_type(),
            entity.is_frozen(),
            entity.read_attribute("active").unwrap_or(Value::Null)
        ));
        if self.fail {
            return Err(HookError::new("recording", "notification sink unavailable"));
        }
        Ok(())
    }

    fn description(&self) -> &'static str {
        "Recording after-destroy hook"
    }
}

/// Controller over a fresh store with `users` registered and both hooks installed
pub fn hooked_controller(
    cancel_with: Option<&str>,
    fail_after: bool,
) -> (Arc<InMemoryStore>, LifecycleController<InMemoryStore>, HookLog) {
    let store = Arc::new(InMemoryStore::new());
    let log = HookLog::default();
    let controller = LifecycleController::builder(Arc::clone(&store))
        .before_destroy(
            USERS,
            Arc::new(match cancel_with {
                Some(reason) => RecordingBeforeHook::cancelling(&log, reason),
                None => RecordingBeforeHook::continuing(&log),
            }),
        )
        .after_destroy(
            USERS,
            Arc::new(RecordingAfterHook {
                log: log.clone(),
                fail: fail_after,
            }),
        )
        .build()
        .expect("default config is valid");
    controller
        .register(USERS, RegistrationOptions::default())
        .expect("users registers");
    (store, controller, log)
}
