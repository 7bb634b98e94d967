// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `pgscope doctor` command implementation.
//!
//! Runs diagnostic checks against the configured server: configuration,
//! pool construction, a BEGIN/ROLLBACK round trip through the lifecycle
//! adapter, the configured schema, and pool occupancy.

use std::io::IsTerminal;
use std::sync::Arc;
use std::time::{Duration, Instant};

use pgscope_config::PgScopeConfig;
use pgscope_core::{PgScopeError, StorageClientFactory, TransactionId, TransactionService};
use pgscope_storage::{pg_client_factory, ConnectionRegistry, PgTransactionService};
use serde_json::json;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    /// Check passed successfully.
    Pass,
    /// Check passed with a warning.
    Warn,
    /// Check failed.
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check.
    pub name: String,
    /// Check status.
    pub status: CheckStatus,
    /// Human-readable message.
    pub message: String,
    /// Duration the check took.
    pub duration: Duration,
}

impl CheckResult {
    fn new(name: &str, status: CheckStatus, message: impl Into<String>, start: Instant) -> Self {
        Self {
            name: name.to_string(),
            status,
            message: message.into(),
            duration: start.elapsed(),
        }
    }
}

/// Run the `pgscope doctor` command.
///
/// With `plain`, disables colored output. Fails when any check fails.
pub async fn run_doctor(config: &PgScopeConfig, plain: bool) -> Result<(), PgScopeError> {
    let use_color = !plain && std::io::stdout().is_terminal();
    let registry = pg_client_factory(config.pool.clone());
    let results = run_checks(config, &registry).await;
    registry.release_all().await;

    println!();
    println!("  pgscope doctor");
    println!("  {}", "-".repeat(50));

    let mut fail_count = 0;
    let mut warn_count = 0;

    for result in &results {
        match result.status {
            CheckStatus::Pass => {}
            CheckStatus::Warn => warn_count += 1,
            CheckStatus::Fail => fail_count += 1,
        }
        println!("{}", format_line(result, use_color));
    }

    println!();

    if fail_count > 0 || warn_count > 0 {
        let issues = fail_count + warn_count;
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
    } else {
        println!("  All checks passed.");
    }

    println!();

    if fail_count > 0 {
        return Err(PgScopeError::Internal(format!(
            "{fail_count} doctor check(s) failed"
        )));
    }
    Ok(())
}

fn format_line(result: &CheckResult, use_color: bool) -> String {
    let duration_ms = result.duration.as_millis();
    if use_color {
        use colored::Colorize;
        let (symbol, message) = match result.status {
            CheckStatus::Pass => ("✓".green(), result.message.normal()),
            CheckStatus::Warn => ("!".yellow(), result.message.yellow()),
            CheckStatus::Fail => ("✗".red(), result.message.red()),
        };
        format!(
            "    {symbol} {:<20} {message} ({duration_ms}ms)",
            result.name
        )
    } else {
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => "[WARN]",
            CheckStatus::Fail => "[FAIL]",
        };
        format!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        )
    }
}

/// Runs every check. Checks that need a server are skipped when the pool
/// cannot be built.
async fn run_checks(config: &PgScopeConfig, registry: &Arc<ConnectionRegistry>) -> Vec<CheckResult> {
    let mut results = vec![check_config(config)];

    let pool = check_pool(registry).await;
    let reachable = pool.status != CheckStatus::Fail;
    results.push(pool);

    if reachable {
        results.push(check_transaction(registry).await);
        results.push(check_schema(registry).await);
        results.push(check_pool_status(registry));
    }
    results
}

/// Check configuration passes validation.
fn check_config(config: &PgScopeConfig) -> CheckResult {
    let start = Instant::now();
    match pgscope_config::validation::validate_config(config) {
        Ok(()) => {
            let target = match &config.pool.url {
                Some(_) => "url".to_string(),
                None => format!(
                    "{}:{}/{}",
                    config.pool.host, config.pool.port, config.pool.database
                ),
            };
            CheckResult::new("Configuration", CheckStatus::Pass, format!("valid ({target})"), start)
        }
        Err(errors) => CheckResult::new(
            "Configuration",
            CheckStatus::Fail,
            format!("{} error(s)", errors.len()),
            start,
        ),
    }
}

/// Check the pool can be built (opens the first connection).
async fn check_pool(registry: &ConnectionRegistry) -> CheckResult {
    let start = Instant::now();
    match registry
        .pool_initializer()
        .ensure_pool(registry.config())
        .await
    {
        Ok(pool) => CheckResult::new(
            "Connection pool",
            CheckStatus::Pass,
            format!("connected ({})", pool.name()),
            start,
        ),
        Err(e) => CheckResult::new("Connection pool", CheckStatus::Fail, e.to_string(), start),
    }
}

/// Check a transaction can be opened and rolled back through the lifecycle adapter.
async fn check_transaction(registry: &Arc<ConnectionRegistry>) -> CheckResult {
    let start = Instant::now();
    let service = PgTransactionService::new(Arc::clone(registry));
    let id = TransactionId::from(format!("doctor-{}", uuid::Uuid::new_v4()));

    let started = service.on_start(&id).await;
    let cleared = service.on_fail(&id).await;
    match started.and(cleared) {
        Ok(()) => CheckResult::new("Transaction", CheckStatus::Pass, "BEGIN/ROLLBACK ok", start),
        Err(e) => CheckResult::new("Transaction", CheckStatus::Fail, e.to_string(), start),
    }
}

/// Check the configured schema exists and report how many tables it holds.
async fn check_schema(registry: &ConnectionRegistry) -> CheckResult {
    let start = Instant::now();
    let schema = registry.config().schema.clone();
    let id = TransactionId::from(format!("doctor-schema-{}", uuid::Uuid::new_v4()));

    let result = match registry.client(&id).await {
        Ok(client) => {
            client
                .query(
                    "SELECT EXISTS (SELECT 1 FROM pg_namespace WHERE nspname = $1) AS present, \
                     (SELECT count(*) FROM information_schema.tables WHERE table_schema = $1)::int4 AS tables",
                    &[json!(schema)],
                )
                .await
        }
        Err(e) => Err(e),
    };
    registry.release(&id).await;

    let rows = match result {
        Ok(result) => result.rows,
        Err(e) => return CheckResult::new("Schema", CheckStatus::Fail, e.to_string(), start),
    };
    let row = rows.first();
    let present = row.and_then(|r| r.get("present")).and_then(|v| v.as_bool());
    let tables = row.and_then(|r| r.get("tables")).and_then(|v| v.as_i64()).unwrap_or(0);

    match present {
        Some(true) => CheckResult::new(
            "Schema",
            CheckStatus::Pass,
            format!("{schema}: {tables} table(s)"),
            start,
        ),
        _ => CheckResult::new(
            "Schema",
            CheckStatus::Warn,
            format!("{schema}: not found"),
            start,
        ),
    }
}

/// Report pool occupancy. Warns when every allowed connection is open.
fn check_pool_status(registry: &ConnectionRegistry) -> CheckResult {
    let start = Instant::now();
    let Some(pool) = registry.pool_initializer().get() else {
        return CheckResult::new("Pool status", CheckStatus::Warn, "pool not built", start);
    };
    let status = pool.status();
    let max = registry.config().max_connections;
    let message = format!("size {}, idle {}, max {max}", status.size, status.idle);
    let level = if status.size >= max && status.idle == 0 {
        CheckStatus::Warn
    } else {
        CheckStatus::Pass
    };
    CheckResult::new("Pool status", level, message, start)
}
