// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./pgscope.toml` > `~/.config/pgscope/pgscope.toml` > `/etc/pgscope/pgscope.toml`
//! with environment variable overrides via `PGSCOPE_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::PgScopeConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/pgscope/pgscope.toml` (system-wide)
/// 3. `~/.config/pgscope/pgscope.toml` (user XDG config)
/// 4. `./pgscope.toml` (local directory)
/// 5. `PGSCOPE_*` environment variables
pub fn load_config() -> Result<PgScopeConfig, figment::Error> {
    build_figment().extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<PgScopeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PgScopeConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<PgScopeConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(PgScopeConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Build the Figment used internally for config loading (exposed for diagnostic use).
///
/// Returns the Figment before extraction so callers can inspect metadata.
pub fn build_figment() -> Figment {
    Figment::new()
        .merge(Serialized::defaults(PgScopeConfig::default()))
        .merge(Toml::file("/etc/pgscope/pgscope.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("pgscope/pgscope.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("pgscope.toml"))
        .merge(env_provider())
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` because key names contain
/// underscores: `PGSCOPE_POOL_MAX_CONNECTIONS` must map to
/// `pool.max_connections`, not `pool.max.connections`.
fn env_provider() -> Env {
    Env::prefixed("PGSCOPE_").map(|key| {
        // `key` arrives with its original case and the prefix stripped.
        let mapped = key
            .as_str()
            .to_ascii_lowercase()
            .replacen("pool_", "pool.", 1)
            .replacen("log_", "log.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn env_overrides_nested_keys() {
        figment::Jail::expect_with(|jail| {
            jail.set_env("PGSCOPE_POOL_MAX_CONNECTIONS", "3");
            jail.set_env("PGSCOPE_POOL_HOST", "db.internal");
            jail.set_env("PGSCOPE_LOG_LEVEL", "debug");

            let config = load_config()?;
            assert_eq!(config.pool.max_connections, 3);
            assert_eq!(config.pool.host, "db.internal");
            assert_eq!(config.log.level, "debug");
            Ok(())
        });
    }

    #[test]
    fn local_file_is_merged() {
        figment::Jail::expect_with(|jail| {
            jail.create_file(
                "pgscope.toml",
                r#"
[pool]
database = "orders"
port = 6432
"#,
            )?;

            let config = load_config()?;
            assert_eq!(config.pool.database, "orders");
            assert_eq!(config.pool.port, 6432);
            assert_eq!(config.pool.user, "postgres");
            Ok(())
        });
    }

    #[test]
    fn explicit_path_wins_over_defaults() {
        figment::Jail::expect_with(|jail| {
            jail.create_file("custom.toml", "[pool]\nschema = \"audit\"\n")?;
            let config = load_config_from_path(Path::new("custom.toml"))?;
            assert_eq!(config.pool.schema, "audit");
            Ok(())
        });
    }
}
