// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Driver-facing traits: the pool, its connections, and how the pool is built.

use std::sync::Arc;

use async_trait::async_trait;
use pgscope_config::model::PoolConfig;

use crate::error::{BoxError, PgScopeError};
use crate::types::{Notice, PoolStatus, Row};

/// One physical database connection checked out of a pool.
///
/// Implementations are owned exclusively by a single connection handle, which
/// serializes every call, so `&mut self` is enough.
#[async_trait]
pub trait PhysicalConnection: Send + 'static {
    /// Executes `sql` with positional `params` and returns the result rows.
    async fn execute(
        &mut self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<Vec<Row>, BoxError>;

    /// Returns the connection to its pool. Called at most once.
    async fn release(&mut self) -> Result<(), BoxError>;

    /// Drains server notices received since the last call. Drivers that
    /// relay notices through their own logging return nothing.
    fn take_notices(&mut self) -> Vec<Notice> {
        Vec::new()
    }
}

/// A shared pool handing out physical connections.
#[async_trait]
pub trait ConnectionSource: Send + Sync + 'static {
    /// Short name of the backing driver, for logs and diagnostics.
    fn name(&self) -> &str;

    /// Checks out a connection, waiting for one to become available.
    async fn connect(&self) -> Result<Box<dyn PhysicalConnection>, PgScopeError>;

    /// Current pool occupancy.
    fn status(&self) -> PoolStatus;
}

/// Builds a [`ConnectionSource`] from pool configuration.
#[async_trait]
pub trait PoolConnector: Send + Sync + 'static {
    async fn build(&self, config: &PoolConfig) -> Result<Arc<dyn ConnectionSource>, PgScopeError>;
}
