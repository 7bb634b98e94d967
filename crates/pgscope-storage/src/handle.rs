// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection handle: sole owner of one pooled connection and its transaction state.
//!
//! State machine:
//!
//! ```text
//! Idle --begin--> InTransaction --commit--> Committed
//!   |                  |
//!   +----rollback------+--------rollback--> RolledBack
//!
//! any state --release/finalize--> Released
//! ```
//!
//! `begin`, `commit`, and `query` report failures. `rollback` and `release`
//! run on cleanup paths, so they log driver failures and always complete.

use async_trait::async_trait;
use tokio::sync::Mutex;
use tracing::{debug, error, warn};

use pgscope_core::{
    HandleState, InvalidStateError, PgScopeError, PhysicalConnection, QueryError, QueryResult,
    Row, StorageClient,
};

use crate::schema;

/// Schema used by the column helpers when none is configured.
pub const DEFAULT_SCHEMA: &str = "public";

struct Inner {
    conn: Option<Box<dyn PhysicalConnection>>,
    state: HandleState,
}

/// Exclusive owner of one physical connection.
///
/// Statements on one handle are serialized by an internal async mutex, so a
/// handle can be shared (`Arc`) between tasks working on the same transaction.
pub struct ConnectionHandle {
    id: String,
    schema: String,
    inner: Mutex<Inner>,
}

impl ConnectionHandle {
    /// Wraps `conn` in a new `Idle` handle tagged with a fresh UUID.
    pub fn new(conn: Box<dyn PhysicalConnection>) -> Self {
        let id = uuid::Uuid::new_v4().to_string();
        debug!(handle_id = %id, "connection created");
        Self {
            id,
            schema: DEFAULT_SCHEMA.to_string(),
            inner: Mutex::new(Inner {
                conn: Some(conn),
                state: HandleState::Idle,
            }),
        }
    }

    /// Sets the schema searched by [`table_columns`](StorageClient::table_columns).
    pub fn with_schema(mut self, schema: impl Into<String>) -> Self {
        self.schema = schema.into();
        self
    }

    /// Correlation id for logs. Distinct from the transaction id.
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn schema(&self) -> &str {
        &self.schema
    }

    pub async fn state(&self) -> HandleState {
        self.inner.lock().await.state
    }

    /// Opens a transaction. A handle already in a transaction is left as is.
    pub async fn begin(&self) -> Result<(), PgScopeError> {
        let mut inner = self.inner.lock().await;
        match inner.state {
            HandleState::Idle => {}
            HandleState::InTransaction => {
                debug!(handle_id = %self.id, "begin skipped, transaction already open");
                return Ok(());
            }
            state => return Err(self.invalid("begin", state)),
        }

        debug!(handle_id = %self.id, "Begin");
        self.run(&mut inner, "begin", "BEGIN", &[]).await?;
        inner.state = HandleState::InTransaction;
        Ok(())
    }

    /// Executes `sql` with positional `params`.
    pub async fn query(
        &self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<QueryResult, PgScopeError> {
        let mut inner = self.inner.lock().await;
        if inner.state.is_terminal() {
            return Err(self.invalid("query", inner.state));
        }

        debug!(
            handle_id = %self.id,
            statement = sql,
            params = %format_params(params),
            "pg query"
        );
        let rows = self.run(&mut inner, "query", sql, params).await?;
        debug!(handle_id = %self.id, rows = rows.len(), "pg query done");
        Ok(QueryResult::new(rows))
    }

    /// Commits the open transaction.
    pub async fn commit(&self) -> Result<(), PgScopeError> {
        let mut inner = self.inner.lock().await;
        if inner.state != HandleState::InTransaction {
            return Err(self.invalid("commit", inner.state));
        }

        debug!(handle_id = %self.id, "Commit");
        self.run(&mut inner, "commit", "COMMIT", &[]).await?;
        inner.state = HandleState::Committed;
        Ok(())
    }

    /// Rolls back the open transaction. Never fails.
    ///
    /// The handle is `RolledBack` afterwards even if the driver rejected the
    /// statement: the transaction is abandoned either way.
    pub async fn rollback(&self) {
        let mut inner = self.inner.lock().await;
        match inner.state {
            HandleState::Idle | HandleState::InTransaction => {}
            HandleState::Released => {
                warn!(handle_id = %self.id, "rollback on released connection ignored");
                return;
            }
            state => {
                debug!(handle_id = %self.id, %state, "rollback skipped");
                return;
            }
        }

        debug!(handle_id = %self.id, "ROLLBACK");
        if let Err(e) = self.run(&mut inner, "rollback", "ROLLBACK", &[]).await {
            error!(handle_id = %self.id, error = %e, "error on pg rollback");
        }
        inner.state = HandleState::RolledBack;
    }

    /// Returns the connection to the pool. Never fails; repeat calls are no-ops.
    pub async fn release(&self) {
        let mut inner = self.inner.lock().await;
        let Some(mut conn) = inner.conn.take() else {
            debug!(handle_id = %self.id, "connection already released");
            return;
        };
        inner.state = HandleState::Released;

        match conn.release().await {
            Ok(()) => debug!(handle_id = %self.id, "connection released"),
            Err(e) => error!(handle_id = %self.id, error = %e, "error on pg release"),
        }
    }

    /// Same as [`release`](Self::release).
    pub async fn finalize(&self) {
        self.release().await;
    }

    async fn run(
        &self,
        inner: &mut Inner,
        operation: &'static str,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<Vec<Row>, PgScopeError> {
        let state = inner.state;
        let Some(conn) = inner.conn.as_mut() else {
            return Err(self.invalid(operation, state));
        };

        let result = conn.execute(sql, params).await;
        for notice in conn.take_notices() {
            warn!(
                handle_id = %self.id,
                severity = %notice.severity,
                "pg notice: {}",
                notice.message
            );
        }

        result.map_err(|cause| {
            error!(
                handle_id = %self.id,
                statement = sql,
                params = %format_params(params),
                error = %cause,
                "pg query failed"
            );
            QueryError::new(&self.id, sql, params, cause).into()
        })
    }

    fn invalid(&self, operation: &'static str, state: HandleState) -> PgScopeError {
        InvalidStateError {
            handle_id: self.id.clone(),
            operation,
            state,
        }
        .into()
    }
}

impl Drop for ConnectionHandle {
    fn drop(&mut self) {
        if self.inner.get_mut().conn.is_some() {
            warn!(handle_id = %self.id, "connection handle dropped without release");
        }
    }
}

impl std::fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("id", &self.id)
            .field("schema", &self.schema)
            .finish_non_exhaustive()
    }
}

fn format_params(params: &[serde_json::Value]) -> String {
    serde_json::Value::Array(params.to_vec()).to_string()
}

#[async_trait]
impl StorageClient for ConnectionHandle {
    async fn query(
        &self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<QueryResult, PgScopeError> {
        ConnectionHandle::query(self, sql, params).await
    }

    async fn begin(&self) -> Result<(), PgScopeError> {
        ConnectionHandle::begin(self).await
    }

    async fn commit(&self) -> Result<(), PgScopeError> {
        ConnectionHandle::commit(self).await
    }

    async fn rollback(&self) {
        ConnectionHandle::rollback(self).await
    }

    async fn release(&self) {
        ConnectionHandle::release(self).await
    }

    async fn finalize(&self) {
        ConnectionHandle::finalize(self).await
    }

    async fn table_columns(&self, table: &str) -> Result<Vec<String>, PgScopeError> {
        schema::list_writable_columns(self, table).await
    }

    async fn table_unique_key(&self, table: &str) -> Result<String, PgScopeError> {
        schema::unique_key_columns(self, table).await
    }
}
