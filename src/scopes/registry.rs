//! # Scope Registry
//!
//! Per-entity-type soft delete configuration. An entity type opts in once;
//! its configuration is then read-only for the life of the process.
//!
//! Registration is idempotent and the first registration wins: registering
//! the same type again, even with a different attribute name, changes
//! nothing and reports [`Registration::AlreadyRegistered`] with the
//! configuration that is actually in force.

use crate::constants::{operations, DEFAULT_ACTIVE_ATTRIBUTE};
use crate::error::{Result, SoftDeleteError};
use crate::logging::log_registry_operation;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::fmt;
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

const MAX_IDENTIFIER_LENGTH: usize = 63;

/// Validated name of the boolean liveness column
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ActiveAttribute(String);

impl ActiveAttribute {
    pub fn parse(name: &str) -> Result<Self> {
        validate_identifier(name).map_err(|reason| SoftDeleteError::InvalidAttributeName {
            name: name.to_string(),
            reason,
        })?;
        Ok(ActiveAttribute(name.to_string()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for ActiveAttribute {
    fn default() -> Self {
        ActiveAttribute(DEFAULT_ACTIVE_ATTRIBUTE.to_string())
    }
}

impl fmt::Display for ActiveAttribute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for ActiveAttribute {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Check a SQL identifier: `[A-Za-z_][A-Za-z0-9_]*`, at most 63 bytes.
pub(crate) fn validate_identifier(name: &str) -> std::result::Result<(), String> {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return Err("identifier must not be empty".to_string());
    };
    if !(first.is_ascii_alphabetic() || first == '_') {
        return Err("identifier must start with a letter or underscore".to_string());
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("identifier may only contain letters, digits and underscores".to_string());
    }
    if name.len() > MAX_IDENTIFIER_LENGTH {
        return Err(format!(
            "identifier exceeds {MAX_IDENTIFIER_LENGTH} characters"
        ));
    }
    Ok(())
}

/// Table names may be schema-qualified (`audit.users`)
pub(crate) fn validate_table_name(name: &str) -> std::result::Result<(), String> {
    name.split('.').try_for_each(validate_identifier)
}

/// Configuration for one opted-in entity type
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityTypeConfig {
    pub entity_type: String,
    pub active_attribute: ActiveAttribute,
    pub table_name: String,
}

/// Optional settings supplied at opt-in time
#[derive(Debug, Clone, Default)]
pub struct RegistrationOptions {
    /// Liveness column; the registry default when `None`
    pub active_attribute: Option<String>,
    /// Backing table; the entity type name when `None`
    pub table_name: Option<String>,
}

impl RegistrationOptions {
    pub fn with_attribute(name: impl Into<String>) -> Self {
        Self {
            active_attribute: Some(name.into()),
            table_name: None,
        }
    }

    pub fn table(mut self, table_name: impl Into<String>) -> Self {
        self.table_name = Some(table_name.into());
        self
    }
}

/// Outcome of [`ScopeRegistry::register`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registration {
    Registered(Arc<EntityTypeConfig>),
    AlreadyRegistered(Arc<EntityTypeConfig>),
}

impl Registration {
    /// The configuration in force after the call
    pub fn config(&self) -> &Arc<EntityTypeConfig> {
        match self {
            Registration::Registered(config) | Registration::AlreadyRegistered(config) => config,
        }
    }

    pub fn is_new(&self) -> bool {
        matches!(self, Registration::Registered(_))
    }
}

/// Registry of opted-in entity types keyed by type name
#[derive(Debug)]
pub struct ScopeRegistry {
    entries: DashMap<String, Arc<EntityTypeConfig>>,
    default_attribute: ActiveAttribute,
}

static GLOBAL_REGISTRY: OnceLock<Arc<ScopeRegistry>> = OnceLock::new();

impl Default for ScopeRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ScopeRegistry {
    pub fn new() -> Self {
        Self::with_default_attribute(ActiveAttribute::default())
    }

    pub fn with_default_attribute(default_attribute: ActiveAttribute) -> Self {
        Self {
            entries: DashMap::new(),
            default_attribute,
        }
    }

    /// Process-wide registry using the built-in default attribute
    pub fn global() -> Arc<ScopeRegistry> {
        Arc::clone(GLOBAL_REGISTRY.get_or_init(|| Arc::new(ScopeRegistry::new())))
    }

    /// Opt an entity type into soft delete scoping.
    ///
    /// Fails only when the attribute or table name is not a valid identifier.
    pub fn register(
        &self,
        entity_type: &str,
        options: RegistrationOptions,
    ) -> Result<Registration> {
        let active_attribute = match options.active_attribute.as_deref() {
            Some(name) => ActiveAttribute::parse(name)?,
            None => self.default_attribute.clone(),
        };
        let table_name = options
            .table_name
            .unwrap_or_else(|| entity_type.to_string());
        validate_table_name(&table_name).map_err(|reason| SoftDeleteError::InvalidState {
            entity_type: entity_type.to_string(),
            operation: operations::REGISTER.to_string(),
            reason: format!("invalid table name '{table_name}': {reason}"),
        })?;

        match self.entries.entry(entity_type.to_string()) {
            Entry::Occupied(existing) => {
                let existing = Arc::clone(existing.get());
                if existing.active_attribute != active_attribute {
                    warn!(
                        entity_type = %entity_type,
                        registered = %existing.active_attribute,
                        requested = %active_attribute,
                        "Ignoring re-registration with a different active attribute; first registration wins"
                    );
                } else {
                    debug!(entity_type = %entity_type, "Entity type already registered");
                }
                Ok(Registration::AlreadyRegistered(existing))
            }
            Entry::Vacant(slot) => {
                let config = Arc::new(EntityTypeConfig {
                    entity_type: entity_type.to_string(),
                    active_attribute,
                    table_name,
                });
                slot.insert(Arc::clone(&config));
                log_registry_operation(entity_type, config.active_attribute.as_str(), "registered");
                Ok(Registration::Registered(config))
            }
        }
    }

    pub fn config_for(&self, entity_type: &str) -> Option<Arc<EntityTypeConfig>> {
        self.entries.get(entity_type).map(|entry| Arc::clone(entry.value()))
    }

    /// Configuration for a type that must already be registered
    pub fn require(&self, entity_type: &str) -> Result<Arc<EntityTypeConfig>> {
        self.config_for(entity_type)
            .ok_or_else(|| SoftDeleteError::NotRegistered {
                entity_type: entity_type.to_string(),
            })
    }

    pub fn is_registered(&self, entity_type: &str) -> bool {
        self.entries.contains_key(entity_type)
    }

    pub fn default_attribute(&self) -> &ActiveAttribute {
        &self.default_attribute
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn attribute_names_must_be_identifiers() {
        assert!(ActiveAttribute::parse("active").is_ok());
        assert!(ActiveAttribute::parse("_is_live2").is_ok());

        let too_long = "a".repeat(64);
        for bad in ["", "2fast", "is active", "active;drop", too_long.as_str()] {
            let err = ActiveAttribute::parse(bad).unwrap_err();
            assert!(matches!(err, SoftDeleteError::InvalidAttributeName { .. }), "{bad}");
        }
    }

    #[test]
    fn register_uses_default_attribute_and_table() {
        let registry = ScopeRegistry::new();
        let registration = registry.register("users", RegistrationOptions::default()).unwrap();

        assert!(registration.is_new());
        assert_eq!(registration.config().active_attribute.as_str(), "active");
        assert_eq!(registration.config().table_name, "users");
        assert!(registry.is_registered("users"));
    }

    #[test]
    fn first_registration_wins() {
        let registry = ScopeRegistry::new();
        registry
            .register("accounts", RegistrationOptions::with_attribute("enabled"))
            .unwrap();

        let again = registry
            .register("accounts", RegistrationOptions::with_attribute("live"))
            .unwrap();

        assert!(!again.is_new());
        assert_eq!(again.config().active_attribute.as_str(), "enabled");
        assert_eq!(registry.len(), 1);
        assert_eq!(
            registry.require("accounts").unwrap().active_attribute.as_str(),
            "enabled"
        );
    }

    #[test]
    fn invalid_attribute_fails_registration() {
        let registry = ScopeRegistry::new();
        let err = registry
            .register("users", RegistrationOptions::with_attribute(""))
            .unwrap_err();
        assert!(matches!(err, SoftDeleteError::InvalidAttributeName { .. }));
        assert!(registry.is_empty());
    }

    #[test]
    fn table_names_may_be_schema_qualified() {
        let registry = ScopeRegistry::new();
        let registration = registry
            .register("users", RegistrationOptions::default().table("crm.users"))
            .unwrap();
        assert_eq!(registration.config().table_name, "crm.users");

        assert!(registry
            .register("orders", RegistrationOptions::default().table("crm..orders"))
            .is_err());
    }

    #[test]
    fn global_registry_is_shared() {
        let first = ScopeRegistry::global();
        first
            .register("global_registry_probe", RegistrationOptions::default())
            .unwrap();

        let second = ScopeRegistry::global();
        assert!(Arc::ptr_eq(&first, &second));
        assert!(second.is_registered("global_registry_probe"));
    }

    #[test]
    fn unregistered_types_are_reported() {
        let registry = ScopeRegistry::new();
        assert!(matches!(
            registry.require("ghosts"),
            Err(SoftDeleteError::NotRegistered { .. })
        ));
    }
}
