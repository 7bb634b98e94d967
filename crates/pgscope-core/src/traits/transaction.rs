// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction orchestrator seam.

use std::sync::Arc;

use async_trait::async_trait;

use crate::error::PgScopeError;
use crate::types::TransactionId;

/// Lifecycle callbacks an orchestrator drives for every transaction.
///
/// The orchestrator calls exactly one of `on_success`/`on_fail` after each
/// `on_start` for the same id, and does not reuse an id until that terminal
/// call has returned.
#[async_trait]
pub trait TransactionService: Send + Sync {
    /// Name used in orchestrator logs.
    fn name(&self) -> &str;

    async fn on_start(&self, id: &TransactionId) -> Result<(), PgScopeError>;

    async fn on_success(&self, id: &TransactionId) -> Result<(), PgScopeError>;

    async fn on_fail(&self, id: &TransactionId) -> Result<(), PgScopeError>;
}

/// Registration point for [`TransactionService`]s.
pub trait TransactionOrchestrator: Send + Sync {
    fn register_transaction_service(&self, service: Arc<dyn TransactionService>);
}
