//! # Lifecycle
//!
//! Activate, deactivate and destroy for registered entity types, and the
//! read entry points that apply or explicitly bypass the active scope.

pub mod controller;
pub mod hooks;
pub mod read;

pub use controller::{LifecycleController, LifecycleControllerBuilder, ReadResult};
pub use hooks::{
    AfterDestroyHook, BeforeDestroyHook, DestroyCallbacks, HookDecision, HookError, HookResult,
    RejectDestroyHook,
};
pub use read::{AggregateFunction, ReadKind, ReadOperation};
