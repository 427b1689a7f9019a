//! # Scope Policy Engine
//!
//! Guarantees that, unless a caller explicitly bypasses it, every read of an
//! opted-in entity type is constrained to rows whose active attribute is true.
//!
//! ## Components
//!
//! - [`QueryCondition`]: the condition shapes the query layer accepts
//! - [`ScopeRegistry`]: per-type configuration, first registration wins
//! - [`inject_active_predicate`]: shape-polymorphic predicate injection
//! - [`Visibility`] / [`ScopedQuery`]: per-call filtering decision
//!
//! ## Usage
//!
//! ```rust
//! use tasker_soft_delete::query_builder::SqlQuoter;
//! use tasker_soft_delete::scopes::{
//!     QueryCondition, RegistrationOptions, ScopeRegistry, Visibility,
//! };
//!
//! let registry = ScopeRegistry::new();
//! registry.register("users", RegistrationOptions::default()).unwrap();
//!
//! let query = registry.scoped_query(
//!     "users",
//!     QueryCondition::expression("age > 30"),
//!     Visibility::ActiveOnly,
//!     &SqlQuoter,
//! );
//! assert_eq!(
//!     query.condition,
//!     QueryCondition::expression("(age > 30) AND (active = TRUE)")
//! );
//! ```

pub mod condition;
pub mod predicate;
pub mod registry;
pub mod visibility;

pub use condition::QueryCondition;
pub use predicate::{inject_active_predicate, inject_active_predicate_value};
pub use registry::{
    ActiveAttribute, EntityTypeConfig, Registration, RegistrationOptions, ScopeRegistry,
};
pub use visibility::{apply_default_scope, ScopedQuery, Visibility};
