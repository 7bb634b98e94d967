// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! In-process transaction orchestrator.
//!
//! Fans lifecycle events out to every registered [`TransactionService`] in
//! registration order.

use std::future::Future;
use std::sync::{Arc, RwLock};

use tracing::{debug, warn};

use pgscope_core::{PgScopeError, TransactionId, TransactionOrchestrator, TransactionService};

/// Drives registered services through start, success, and failure.
#[derive(Default)]
pub struct TransactionProcessor {
    services: RwLock<Vec<Arc<dyn TransactionService>>>,
}

impl TransactionProcessor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of registered services.
    pub fn len(&self) -> usize {
        self.snapshot().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(&self) -> Vec<Arc<dyn TransactionService>> {
        match self.services.read() {
            Ok(services) => services.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Starts `id` on every service. On the first failure, services started
    /// so far (the failing one included) are failed and the error returned.
    pub async fn start(&self, id: &TransactionId) -> Result<(), PgScopeError> {
        let services = self.snapshot();
        for (i, service) in services.iter().enumerate() {
            if let Err(e) = service.on_start(id).await {
                warn!(
                    transaction_id = %id,
                    service = service.name(),
                    error = %e,
                    "transaction start failed"
                );
                for started in services[..=i].iter().rev() {
                    if let Err(cleanup) = started.on_fail(id).await {
                        warn!(
                            transaction_id = %id,
                            service = started.name(),
                            error = %cleanup,
                            "cleanup after failed start failed"
                        );
                    }
                }
                return Err(e);
            }
        }
        debug!(transaction_id = %id, services = services.len(), "transaction started");
        Ok(())
    }

    /// Completes `id` successfully on every service. Returns the first error.
    pub async fn succeed(&self, id: &TransactionId) -> Result<(), PgScopeError> {
        let mut first = None;
        for service in self.snapshot() {
            if let Err(e) = service.on_success(id).await {
                warn!(transaction_id = %id, service = service.name(), error = %e, "on_success failed");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Fails `id` on every service. Returns the first error.
    pub async fn fail(&self, id: &TransactionId) -> Result<(), PgScopeError> {
        let mut first = None;
        for service in self.snapshot() {
            if let Err(e) = service.on_fail(id).await {
                warn!(transaction_id = %id, service = service.name(), error = %e, "on_fail failed");
                first.get_or_insert(e);
            }
        }
        first.map_or(Ok(()), Err)
    }

    /// Runs `body` inside a transaction: succeed when it returns `Ok`, fail
    /// when it returns `Err`. A body error takes precedence over a cleanup error.
    pub async fn run<T, F, Fut>(&self, id: &TransactionId, body: F) -> Result<T, PgScopeError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, PgScopeError>>,
    {
        self.start(id).await?;
        match body().await {
            Ok(value) => {
                self.succeed(id).await?;
                Ok(value)
            }
            Err(e) => {
                if let Err(cleanup) = self.fail(id).await {
                    warn!(transaction_id = %id, error = %cleanup, "cleanup after failed body failed");
                }
                Err(e)
            }
        }
    }
}

impl TransactionOrchestrator for TransactionProcessor {
    fn register_transaction_service(&self, service: Arc<dyn TransactionService>) {
        debug!(service = service.name(), "registering transaction service");
        match self.services.write() {
            Ok(mut services) => services.push(service),
            Err(poisoned) => poisoned.into_inner().push(service),
        }
    }
}

impl std::fmt::Debug for TransactionProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<String> = self
            .snapshot()
            .iter()
            .map(|s| s.name().to_string())
            .collect();
        f.debug_struct("TransactionProcessor")
            .field("services", &names)
            .finish()
    }
}
