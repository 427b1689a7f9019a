//! # Query Builder
//!
//! SQL rendering for scoped reads: literal quoting, WHERE fragments for every
//! condition shape, and one SELECT per read operation.
//!
//! Literals are quoted inline rather than bound, because the active
//! predicate may have to be spliced into a caller-supplied expression
//! string, which can only be done textually.

pub mod builder;
pub mod conditions;

pub use builder::QueryBuilder;
pub use conditions::{format_value, render_condition, substitute_binds, SqlQuoter};
