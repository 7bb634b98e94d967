// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Scripted mock pool for deterministic tests.
//!
//! `MockPool` implements `ConnectionSource`. Every connection it hands out
//! shares one script (canned rows and injected failures, matched by
//! substring against the statement) and one journal of executed statements.

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use pgscope_config::model::PoolConfig;
use pgscope_core::{
    BoxError, ConnectionSource, Notice, PgScopeError, PhysicalConnection, PoolConnector,
    PoolStatus, Row,
};
use thiserror::Error;

/// Error raised by the mock driver.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("mock driver error: {0}")]
pub struct MockDbError(pub String);

/// One statement as seen by the mock driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Executed {
    /// Sequence number of the connection that ran it (1-based).
    pub connection: usize,
    pub sql: String,
    pub params: Vec<serde_json::Value>,
}

/// Builds a [`Row`] from column/value pairs.
pub fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.clone()))
        .collect()
}

#[derive(Default)]
struct Script {
    responses: Vec<(String, Vec<Row>)>,
    failures: Vec<String>,
    notices: Vec<Notice>,
    fail_release: bool,
    fail_connect: bool,
    connect_delay: Option<Duration>,
}

#[derive(Default)]
struct Counters {
    connects: usize,
    releases: usize,
    open: usize,
    journal: Vec<Executed>,
}

#[derive(Default)]
struct Shared {
    script: Mutex<Script>,
    counters: Mutex<Counters>,
}

impl Shared {
    fn script(&self) -> MutexGuard<'_, Script> {
        self.script.lock().expect("mock script lock poisoned")
    }

    fn counters(&self) -> MutexGuard<'_, Counters> {
        self.counters.lock().expect("mock counters lock poisoned")
    }
}

/// An in-memory connection pool with a shared script.
///
/// Cloning yields another reference to the same pool.
#[derive(Clone, Default)]
pub struct MockPool {
    shared: Arc<Shared>,
}

impl MockPool {
    /// Create a pool that answers every statement with zero rows.
    pub fn new() -> Self {
        Self::default()
    }

    /// Answer statements containing `pattern` with `rows`. Earlier
    /// registrations win when several patterns match.
    pub fn respond(&self, pattern: &str, rows: Vec<Row>) -> &Self {
        self.shared
            .script()
            .responses
            .push((pattern.to_string(), rows));
        self
    }

    /// Fail statements containing `pattern`.
    pub fn fail_on(&self, pattern: &str) -> &Self {
        self.shared.script().failures.push(pattern.to_string());
        self
    }

    /// Stop failing statements containing `pattern`.
    pub fn clear_failure(&self, pattern: &str) -> &Self {
        self.shared.script().failures.retain(|p| p != pattern);
        self
    }

    /// Make every `release` return an error (the connection is still
    /// counted as returned).
    pub fn fail_release(&self, fail: bool) -> &Self {
        self.shared.script().fail_release = fail;
        self
    }

    /// Make checkouts fail.
    pub fn fail_connect(&self, fail: bool) -> &Self {
        self.shared.script().fail_connect = fail;
        self
    }

    /// Delay each checkout, so concurrent acquirers overlap.
    pub fn connect_delay(&self, delay: Duration) -> &Self {
        self.shared.script().connect_delay = Some(delay);
        self
    }

    /// Queue a server notice, delivered after the next executed statement.
    pub fn push_notice(&self, severity: &str, message: &str) -> &Self {
        self.shared.script().notices.push(Notice {
            severity: severity.to_string(),
            message: message.to_string(),
        });
        self
    }

    /// Every statement executed so far, in order.
    pub fn executed(&self) -> Vec<Executed> {
        self.shared.counters().journal.clone()
    }

    /// Number of executed statements whose text equals `sql`.
    pub fn count(&self, sql: &str) -> usize {
        self.shared
            .counters()
            .journal
            .iter()
            .filter(|e| e.sql == sql)
            .count()
    }

    /// Total successful checkouts.
    pub fn connects(&self) -> usize {
        self.shared.counters().connects
    }

    /// Total release calls.
    pub fn releases(&self) -> usize {
        self.shared.counters().releases
    }

    /// Connections checked out and not yet released.
    pub fn open_connections(&self) -> usize {
        self.shared.counters().open
    }
}

#[async_trait]
impl ConnectionSource for MockPool {
    fn name(&self) -> &str {
        "mock"
    }

    async fn connect(&self) -> Result<Box<dyn PhysicalConnection>, PgScopeError> {
        let (delay, fail) = {
            let script = self.shared.script();
            (script.connect_delay, script.fail_connect)
        };
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if fail {
            return Err(PgScopeError::Pool {
                source: Box::new(MockDbError("connection refused".into())),
            });
        }

        let number = {
            let mut counters = self.shared.counters();
            counters.connects += 1;
            counters.open += 1;
            counters.connects
        };
        tracing::debug!(connection = number, "mock connection checked out");
        Ok(Box::new(MockConnection {
            number,
            released: false,
            shared: Arc::clone(&self.shared),
        }))
    }

    fn status(&self) -> PoolStatus {
        let counters = self.shared.counters();
        PoolStatus {
            size: counters.open as u32,
            idle: 0,
        }
    }
}

/// A connection handed out by [`MockPool`].
pub struct MockConnection {
    number: usize,
    released: bool,
    shared: Arc<Shared>,
}

impl MockConnection {
    /// Sequence number of this connection within its pool (1-based).
    pub fn number(&self) -> usize {
        self.number
    }
}

#[async_trait]
impl PhysicalConnection for MockConnection {
    async fn execute(
        &mut self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<Vec<Row>, BoxError> {
        if self.released {
            return Err(Box::new(MockDbError(format!(
                "statement on released connection {}",
                self.number
            ))));
        }

        self.shared.counters().journal.push(Executed {
            connection: self.number,
            sql: sql.to_string(),
            params: params.to_vec(),
        });

        let script = self.shared.script();
        if let Some(pattern) = script.failures.iter().find(|p| sql.contains(p.as_str())) {
            return Err(Box::new(MockDbError(format!("injected failure on `{pattern}`"))));
        }
        Ok(script
            .responses
            .iter()
            .find(|(pattern, _)| sql.contains(pattern.as_str()))
            .map(|(_, rows)| rows.clone())
            .unwrap_or_default())
    }

    async fn release(&mut self) -> Result<(), BoxError> {
        if self.released {
            return Err(Box::new(MockDbError("double release".into())));
        }
        self.released = true;
        {
            let mut counters = self.shared.counters();
            counters.releases += 1;
            counters.open -= 1;
        }
        if self.shared.script().fail_release {
            return Err(Box::new(MockDbError("release failed".into())));
        }
        Ok(())
    }

    fn take_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.shared.script().notices)
    }
}

/// Pool connector that always yields the same [`MockPool`] and counts builds.
pub struct MockConnector {
    pool: MockPool,
    builds: AtomicUsize,
    fail: AtomicBool,
    delay: Option<Duration>,
}

impl MockConnector {
    pub fn new(pool: MockPool) -> Self {
        Self {
            pool,
            builds: AtomicUsize::new(0),
            fail: AtomicBool::new(false),
            delay: None,
        }
    }

    /// Delay each build, so concurrent first calls overlap.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Make subsequent builds fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::SeqCst);
    }

    /// Number of build attempts, successful or not.
    pub fn builds(&self) -> usize {
        self.builds.load(Ordering::SeqCst)
    }

    pub fn pool(&self) -> &MockPool {
        &self.pool
    }
}

#[async_trait]
impl PoolConnector for MockConnector {
    async fn build(
        &self,
        config: &PoolConfig,
    ) -> Result<Arc<dyn ConnectionSource>, PgScopeError> {
        self.builds.fetch_add(1, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if self.fail.load(Ordering::SeqCst) {
            return Err(PgScopeError::Pool {
                source: Box::new(MockDbError(format!(
                    "cannot reach {}:{}",
                    config.host, config.port
                ))),
            });
        }
        Ok(Arc::new(self.pool.clone()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn scripted_rows_are_returned() {
        let pool = MockPool::new();
        pool.respond("FROM users", vec![row(&[("id", json!(1))])]);

        let mut conn = pool.connect().await.unwrap();
        let rows = conn.execute("SELECT id FROM users", &[]).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0]["id"], json!(1));
        assert!(conn.execute("SELECT 1", &[]).await.unwrap().is_empty());
        assert_eq!(pool.executed().len(), 2);
    }

    #[tokio::test]
    async fn injected_failures_and_release_accounting() {
        let pool = MockPool::new();
        pool.fail_on("ROLLBACK");

        let mut conn = pool.connect().await.unwrap();
        assert!(conn.execute("ROLLBACK", &[]).await.is_err());
        assert_eq!(pool.open_connections(), 1);

        conn.release().await.unwrap();
        assert_eq!(pool.open_connections(), 0);
        assert_eq!(pool.releases(), 1);
        assert!(conn.execute("SELECT 1", &[]).await.is_err());
        assert!(conn.release().await.is_err());
    }

    #[tokio::test]
    async fn notices_are_drained_once() {
        let pool = MockPool::new();
        pool.push_notice("NOTICE", "relation already exists");

        let mut conn = pool.connect().await.unwrap();
        assert_eq!(conn.take_notices().len(), 1);
        assert!(conn.take_notices().is_empty());
    }

    #[tokio::test]
    async fn connector_counts_builds() {
        let connector = MockConnector::new(MockPool::new());
        connector.build(&PoolConfig::default()).await.unwrap();
        connector.set_failing(true);
        assert!(connector.build(&PoolConfig::default()).await.is_err());
        assert_eq!(connector.builds(), 2);
    }
}
