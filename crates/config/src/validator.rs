//! Config validation
//!
//! Validation runs after parsing and catches mistakes that are legal YAML
//! but would fail at runtime (unknown backend, missing postgres section).

use crate::{has_unresolved_env_vars, AppConfig, ConfigError, Result};

const KNOWN_BACKENDS: &[&str] = &["memory", "postgres"];
const KNOWN_LOG_FORMATS: &[&str] = &["pretty", "json", "compact"];

/// Validate a parsed configuration
pub fn validate_config(config: &AppConfig) -> Result<()> {
    if config.app.name.is_empty() {
        return Err(ConfigError::Invalid("app.name must not be empty".to_string()));
    }

    if !KNOWN_BACKENDS.contains(&config.store.backend.as_str()) {
        return Err(ConfigError::Invalid(format!(
            "unknown store backend '{}' (expected one of: {})",
            config.store.backend,
            KNOWN_BACKENDS.join(", ")
        )));
    }

    if config.store.backend == "postgres" {
        let pg = config.store.postgres.as_ref().ok_or_else(|| {
            ConfigError::Invalid("store.postgres section required for postgres backend".to_string())
        })?;
        if pg.url.is_empty() {
            return Err(ConfigError::Invalid("store.postgres.url must not be empty".to_string()));
        }
        if has_unresolved_env_vars(&pg.url) {
            return Err(ConfigError::Invalid(format!(
                "store.postgres.url contains an unresolved placeholder: {}",
                pg.url
            )));
        }
        if pg.max_connections == 0 {
            return Err(ConfigError::Invalid(
                "store.postgres.max_connections must be at least 1".to_string(),
            ));
        }
    }

    if !KNOWN_LOG_FORMATS.contains(&config.logging.format.as_str()) {
        return Err(ConfigError::Invalid(format!(
            "unknown log format '{}' (expected one of: {})",
            config.logging.format,
            KNOWN_LOG_FORMATS.join(", ")
        )));
    }

    Ok(())
}
