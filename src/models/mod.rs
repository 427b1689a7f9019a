//! Entity instances as seen by the lifecycle controller

pub mod record;

pub use record::{Mutability, PersistenceState, Record, SoftDeletable};
