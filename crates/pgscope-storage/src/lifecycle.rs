// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Transaction lifecycle adapter: maps orchestrator events onto handle operations.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use pgscope_core::{PgScopeError, TransactionId, TransactionOrchestrator, TransactionService};

use crate::registry::ConnectionRegistry;

/// Opens a transaction on start, commits or rolls back at the end, and always
/// returns the connection to the pool once the transaction is over.
pub struct PgTransactionService {
    registry: Arc<ConnectionRegistry>,
}

impl PgTransactionService {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }
}

#[async_trait]
impl TransactionService for PgTransactionService {
    fn name(&self) -> &str {
        "postgres"
    }

    async fn on_start(&self, id: &TransactionId) -> Result<(), PgScopeError> {
        debug!(transaction_id = %id, "transaction start");
        let handle = self.registry.acquire(id).await?;
        handle.begin().await
    }

    async fn on_success(&self, id: &TransactionId) -> Result<(), PgScopeError> {
        debug!(transaction_id = %id, "transaction success");
        let committed = match self.registry.acquire(id).await {
            Ok(handle) => handle.commit().await,
            Err(e) => Err(e),
        };
        self.registry.release(id).await;

        if let Err(e) = &committed {
            warn!(transaction_id = %id, error = %e, "commit failed, connection released");
        }
        committed
    }

    async fn on_fail(&self, id: &TransactionId) -> Result<(), PgScopeError> {
        debug!(transaction_id = %id, "transaction fail");
        let acquired = self.registry.acquire(id).await;
        if let Ok(handle) = &acquired {
            handle.rollback().await;
        }
        self.registry.release(id).await;
        acquired.map(|_| ())
    }
}

/// Builds the Postgres lifecycle service on `registry` and registers it with
/// `orchestrator`.
pub fn register_in_transaction_service(
    registry: Arc<ConnectionRegistry>,
    orchestrator: &dyn TransactionOrchestrator,
) -> Arc<PgTransactionService> {
    let service = Arc::new(PgTransactionService::new(registry));
    orchestrator.register_transaction_service(service.clone());
    info!(service = service.name(), "transaction service registered");
    service
}
