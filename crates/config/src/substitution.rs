//! Environment variable substitution
//!
//! Supports `${VAR}` (required, errors when unset) and `${VAR:-default}`
//! (falls back to the default when unset or empty).

use regex::Regex;
use std::env;
use tracing::debug;

use crate::{ConfigError, Result};

/// Replace `${VAR}` and `${VAR:-default}` references in a raw config string
pub fn substitute_env_vars(content: &str) -> Result<String> {
    let re = Regex::new(r"\$\{(\w+)(?::-([^}]*))?\}").unwrap();
    let mut result = content.to_string();

    for caps in re.captures_iter(content) {
        let placeholder = caps.get(0).unwrap().as_str();
        let var_name = caps.get(1).unwrap().as_str();
        let default = caps.get(2).map(|m| m.as_str());

        let value = match (env::var(var_name), default) {
            (Ok(v), _) if !v.is_empty() => v,
            (_, Some(default)) => default.to_string(),
            (Ok(v), None) => v,
            (Err(_), None) => return Err(ConfigError::MissingEnvVar(var_name.to_string())),
        };

        debug!(var = var_name, "Substituting environment variable");
        result = result.replace(placeholder, &value);
    }

    Ok(result)
}

/// Check if a string still contains `${...}` placeholders
pub fn has_unresolved_env_vars(content: &str) -> bool {
    let re = Regex::new(r"\$\{(\w+)(?::-([^}]*))?\}").unwrap();
    re.is_match(content)
}
