// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The client interface handed to callers for one transaction.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PgScopeError;
use crate::types::{QueryResult, TransactionId};

/// Query and transaction control over one exclusively-held connection.
///
/// `rollback`, `release`, and `finalize` are cleanup operations: they never
/// fail, and any driver error they hit is logged by the implementation.
#[async_trait]
pub trait StorageClient: Send + Sync {
    /// Executes a statement and returns its rows.
    async fn query(
        &self,
        sql: &str,
        params: &[serde_json::Value],
    ) -> Result<QueryResult, PgScopeError>;

    /// Opens a transaction.
    async fn begin(&self) -> Result<(), PgScopeError>;

    /// Commits the open transaction.
    async fn commit(&self) -> Result<(), PgScopeError>;

    /// Rolls back the open transaction.
    async fn rollback(&self);

    /// Returns the connection to the pool.
    async fn release(&self);

    /// Same as [`release`](StorageClient::release), logging the outcome.
    async fn finalize(&self);

    /// Columns of `table` that a client may write explicitly.
    async fn table_columns(&self, table: &str) -> Result<Vec<String>, PgScopeError>;

    /// Comma-joined columns of the unique, non-primary key of `table`.
    async fn table_unique_key(&self, table: &str) -> Result<String, PgScopeError>;
}

/// Hands out the client bound to a transaction identifier.
#[async_trait]
pub trait StorageClientFactory: Send + Sync {
    async fn client(&self, id: &TransactionId) -> Result<Arc<dyn StorageClient>, PgScopeError>;
}
