// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction-scoped Postgres connections for pgscope.
//!
//! A [`ConnectionRegistry`] hands out one [`ConnectionHandle`] per transaction
//! identifier from a lazily built pool. [`PgTransactionService`] ties those
//! handles to an orchestrator's start/success/fail events so each transaction
//! gets `BEGIN` on start, `COMMIT` or `ROLLBACK` at the end, and its
//! connection returned to the pool either way.

pub mod handle;
pub mod lifecycle;
pub mod pool;
pub mod postgres;
pub mod processor;
pub mod registry;
pub mod schema;

use std::sync::Arc;

use pgscope_config::model::PoolConfig;

pub use handle::{ConnectionHandle, DEFAULT_SCHEMA};
pub use lifecycle::{register_in_transaction_service, PgTransactionService};
pub use pool::PoolInitializer;
pub use postgres::{PgConnection, PgConnector, PgSource};
pub use processor::TransactionProcessor;
pub use registry::ConnectionRegistry;
pub use schema::{list_writable_columns, list_writable_columns_in, unique_key_columns};

/// A registry backed by the sqlx Postgres driver. The pool is built on the
/// first acquisition.
pub fn pg_client_factory(config: PoolConfig) -> Arc<ConnectionRegistry> {
    let pool = Arc::new(PoolInitializer::new(Arc::new(PgConnector::new())));
    Arc::new(ConnectionRegistry::new(pool, config))
}
