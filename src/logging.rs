//! # Structured Logging Module
//!
//! Console logging for hosts that do not install their own subscriber, plus
//! structured helpers for lifecycle events.

use crate::config::LoggingConfig;
use chrono::Utc;
use std::sync::OnceLock;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

static LOGGER_INITIALIZED: OnceLock<()> = OnceLock::new();

/// Initialize structured logging from configuration. Safe to call repeatedly;
/// only the first call has any effect.
pub fn init_structured_logging(config: &LoggingConfig) {
    LOGGER_INITIALIZED.get_or_init(|| {
        let filter = EnvFilter::try_new(&config.level).unwrap_or_else(|_| EnvFilter::new("info"));

        let layer = if config.json {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .json()
                .with_filter(filter)
                .boxed()
        } else {
            fmt::layer()
                .with_target(true)
                .with_thread_ids(true)
                .with_level(true)
                .with_ansi(true)
                .with_filter(filter)
                .boxed()
        };

        // A host (or another test) may already own the global subscriber.
        if tracing_subscriber::registry().with(layer).try_init().is_err() {
            tracing::debug!("Global tracing subscriber already initialized - continuing with existing subscriber");
        }

        tracing::info!(
            level = %config.level,
            json = config.json,
            "STRUCTURED LOGGING: Initialized"
        );
    });
}

/// Log structured data for activate/deactivate/destroy
pub fn log_lifecycle_operation(
    operation: &str,
    entity_type: &str,
    record_id: Option<i64>,
    status: &str,
    details: Option<&str>,
) {
    tracing::info!(
        operation = %operation,
        entity_type = %entity_type,
        record_id = record_id,
        status = %status,
        details = details,
        timestamp = %Utc::now().to_rfc3339(),
        "LIFECYCLE_OPERATION"
    );
}

/// Log structured data for scope registrations
pub fn log_registry_operation(entity_type: &str, active_attribute: &str, status: &str) {
    tracing::info!(
        entity_type = %entity_type,
        active_attribute = %active_attribute,
        status = %status,
        timestamp = %Utc::now().to_rfc3339(),
        "SCOPE_REGISTRY_OPERATION"
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_initialization_is_harmless() {
        let config = LoggingConfig {
            level: "debug".to_string(),
            json: true,
        };
        init_structured_logging(&config);
        init_structured_logging(&LoggingConfig::default());
        assert!(LOGGER_INITIALIZED.get().is_some());
    }
}
