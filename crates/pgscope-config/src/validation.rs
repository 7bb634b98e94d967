// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.

use crate::diagnostic::ConfigError;
use crate::model::PgScopeConfig;

const LOG_LEVELS: &[&str] = &["trace", "debug", "info", "warn", "error"];

/// Validate a deserialized configuration for semantic correctness.
///
/// Collects every failure rather than stopping at the first one.
pub fn validate_config(config: &PgScopeConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();
    let pool = &config.pool;

    match pool.url.as_deref().map(str::trim) {
        Some(url) => {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                errors.push(ConfigError::validation(
                    "pool.url must start with postgres:// or postgresql://",
                ));
            }
        }
        None => {
            if pool.host.trim().is_empty() {
                errors.push(ConfigError::validation(
                    "pool.host must not be empty when pool.url is not set",
                ));
            }
            if pool.database.trim().is_empty() {
                errors.push(ConfigError::validation(
                    "pool.database must not be empty when pool.url is not set",
                ));
            }
        }
    }

    if pool.max_connections < 1 {
        errors.push(ConfigError::validation(format!(
            "pool.max_connections must be at least 1, got {}",
            pool.max_connections
        )));
    }

    if pool.min_connections > pool.max_connections {
        errors.push(ConfigError::validation(format!(
            "pool.min_connections ({}) must not exceed pool.max_connections ({})",
            pool.min_connections, pool.max_connections
        )));
    }

    if pool.acquire_timeout_secs == 0 {
        errors.push(ConfigError::validation(
            "pool.acquire_timeout_secs must be greater than 0",
        ));
    }

    if !is_plain_identifier(&pool.schema) {
        errors.push(ConfigError::validation(format!(
            "pool.schema `{}` is not a valid identifier",
            pool.schema
        )));
    }

    if !LOG_LEVELS.contains(&config.log.level.to_ascii_lowercase().as_str()) {
        errors.push(ConfigError::validation(format!(
            "log.level `{}` is not one of {}",
            config.log.level,
            LOG_LEVELS.join(", ")
        )));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_plain_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}
