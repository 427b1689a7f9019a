#![allow(clippy::doc_markdown)] // Allow technical terms like PostgreSQL, SQLx in docs
#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Tasker Soft Delete
//!
//! Soft-delete lifecycle management with transparent query scoping.
//!
//! ## Overview
//!
//! Records of an opted-in entity type are never physically removed by normal
//! application code. Destroying one marks it inactive and freezes the
//! instance, and every ordinary read is filtered to active rows unless the
//! caller explicitly asks to see inactive ones for that single call.
//!
//! ## Module Organization
//!
//! - [`scopes`] - Per-type registration and active predicate injection
//! - [`lifecycle`] - Activate/deactivate/destroy and scoped reads
//! - [`models`] - The entity contract and a generic [`Record`]
//! - [`persistence`] - Collaborator traits plus in-memory and PostgreSQL stores
//! - [`query_builder`] - SQL rendering for conditions and reads
//! - [`config`] - TOML + environment configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Structured error handling
//!
//! ## Quick Start
//!
//! ```rust
//! use std::sync::Arc;
//! use serde_json::json;
//! use tasker_soft_delete::persistence::memory::InMemoryStore;
//! use tasker_soft_delete::{
//!     LifecycleController, QueryCondition, Record, RegistrationOptions, SoftDeletable,
//! };
//!
//! # #[tokio::main]
//! # async fn main() -> tasker_soft_delete::Result<()> {
//! let store = Arc::new(InMemoryStore::new());
//! let controller = LifecycleController::new(Arc::clone(&store));
//! controller.register("users", RegistrationOptions::default())?;
//!
//! let row = store.insert(
//!     "users",
//!     json!({"name": "ann", "active": true}).as_object().cloned().unwrap_or_default(),
//! );
//! let mut user = Record::persisted("users", row)?;
//!
//! controller.destroy(&mut user).await?;
//! assert!(user.is_frozen());
//! assert_eq!(controller.count("users", QueryCondition::Empty).await?, 0);
//! assert_eq!(controller.count_with_inactive("users", QueryCondition::Empty).await?, 1);
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod constants;
pub mod error;
pub mod lifecycle;
pub mod logging;
pub mod models;
pub mod persistence;
pub mod query_builder;
pub mod scopes;

pub use config::{ConfigManager, LoggingConfig, SoftDeleteConfig};
pub use error::{Result, SoftDeleteError};
pub use lifecycle::{
    AfterDestroyHook, AggregateFunction, BeforeDestroyHook, HookDecision, HookError,
    LifecycleController, ReadKind, ReadOperation, ReadResult,
};
pub use models::{Mutability, PersistenceState, Record, SoftDeletable};
pub use persistence::{Persistence, PersistenceTransaction, QuoteLiteral, StoreError};
pub use scopes::{
    inject_active_predicate, ActiveAttribute, QueryCondition, Registration, RegistrationOptions,
    ScopeRegistry, Visibility,
};
