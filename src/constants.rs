//! # System Constants
//!
//! Defaults shared by the scope registry, the lifecycle controller and the
//! configuration loader.

use crate::lifecycle::read::ReadKind;

/// Attribute used as the liveness flag when a registration does not name one
pub const DEFAULT_ACTIVE_ATTRIBUTE: &str = "active";

/// Primary key column every soft-deletable table is addressed by
pub const PRIMARY_KEY: &str = "id";

/// Environment variable prefix consulted by the configuration loader
pub const ENV_PREFIX: &str = "SOFT_DELETE";

/// Read kinds that may run with the active scope suspended unless configured otherwise
pub const DEFAULT_BYPASS_OPERATIONS: [ReadKind; 8] = [
    ReadKind::Find,
    ReadKind::All,
    ReadKind::Count,
    ReadKind::Sum,
    ReadKind::Average,
    ReadKind::Minimum,
    ReadKind::Maximum,
    ReadKind::Calculate,
];

/// Lifecycle operation names used in logs and error messages
pub mod operations {
    pub const REGISTER: &str = "register";
    pub const ACTIVATE: &str = "activate";
    pub const DEACTIVATE: &str = "deactivate";
    pub const DESTROY: &str = "destroy";
    pub const DESTROY_WITHOUT_CALLBACKS: &str = "destroy_without_callbacks";
    pub const READ_INCLUDING_INACTIVE: &str = "read_including_inactive";
    pub const WRITE_ATTRIBUTE: &str = "write_attribute";
}
