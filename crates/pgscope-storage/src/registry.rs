// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Connection registry: one handle per in-flight transaction identifier.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use pgscope_config::model::PoolConfig;
use pgscope_core::{PgScopeError, StorageClient, StorageClientFactory, TransactionId};

use crate::handle::ConnectionHandle;
use crate::pool::PoolInitializer;

enum Slot {
    /// Created, no handle yet. The first locker checks a connection out.
    Vacant,
    Occupied(Arc<ConnectionHandle>),
    /// Removed from the map. Late lockers start over with a fresh slot.
    Retired,
}

/// Maps transaction identifiers to their connection handles.
///
/// Acquisition is single-flight per identifier: each entry carries its own
/// async mutex, held across the pool checkout, so concurrent callers for one
/// identifier observe the same handle and cause exactly one checkout. The map
/// itself is only touched synchronously.
pub struct ConnectionRegistry {
    pool: Arc<PoolInitializer>,
    config: PoolConfig,
    entries: DashMap<TransactionId, Arc<Mutex<Slot>>>,
}

impl ConnectionRegistry {
    pub fn new(pool: Arc<PoolInitializer>, config: PoolConfig) -> Self {
        Self {
            pool,
            config,
            entries: DashMap::new(),
        }
    }

    /// Returns the handle for `id`, checking a connection out on first use.
    pub async fn acquire(&self, id: &TransactionId) -> Result<Arc<ConnectionHandle>, PgScopeError> {
        loop {
            let slot = Arc::clone(
                self.entries
                    .entry(id.clone())
                    .or_insert_with(|| Arc::new(Mutex::new(Slot::Vacant)))
                    .value(),
            );

            let mut guard = slot.lock().await;
            match &*guard {
                Slot::Occupied(handle) => return Ok(Arc::clone(handle)),
                Slot::Retired => continue,
                Slot::Vacant => {}
            }

            match self.connect().await {
                Ok(handle) => {
                    debug!(
                        transaction_id = %id,
                        handle_id = handle.id(),
                        "connection acquired"
                    );
                    *guard = Slot::Occupied(Arc::clone(&handle));
                    return Ok(handle);
                }
                Err(e) => {
                    *guard = Slot::Retired;
                    drop(guard);
                    self.entries.remove_if(id, |_, s| Arc::ptr_eq(s, &slot));
                    warn!(transaction_id = %id, error = %e, "connection acquire failed");
                    return Err(e);
                }
            }
        }
    }

    async fn connect(&self) -> Result<Arc<ConnectionHandle>, PgScopeError> {
        let pool = self.pool.ensure_pool(&self.config).await?;
        let conn = pool.connect().await?;
        Ok(Arc::new(
            ConnectionHandle::new(conn).with_schema(self.config.schema.clone()),
        ))
    }

    /// Releases the handle for `id` and forgets it. Missing ids are ignored.
    ///
    /// Waits for an in-flight acquisition of the same id and releases its result.
    pub async fn release(&self, id: &TransactionId) {
        let Some((_, slot)) = self.entries.remove(id) else {
            debug!(transaction_id = %id, "release of unknown transaction ignored");
            return;
        };

        let previous = std::mem::replace(&mut *slot.lock().await, Slot::Retired);
        if let Slot::Occupied(handle) = previous {
            handle.release().await;
            debug!(transaction_id = %id, handle_id = handle.id(), "transaction cleared");
        }
    }

    /// Releases every tracked handle.
    pub async fn release_all(&self) {
        let ids: Vec<TransactionId> = self.entries.iter().map(|e| e.key().clone()).collect();
        if ids.is_empty() {
            return;
        }
        warn!(count = ids.len(), "releasing open connections");
        futures::future::join_all(ids.iter().map(|id| self.release(id))).await;
    }

    /// True if `id` has an entry, including one still being acquired.
    pub fn contains(&self, id: &TransactionId) -> bool {
        self.entries.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn pool_initializer(&self) -> &Arc<PoolInitializer> {
        &self.pool
    }

    pub fn config(&self) -> &PoolConfig {
        &self.config
    }
}

impl std::fmt::Debug for ConnectionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConnectionRegistry")
            .field("entries", &self.entries.len())
            .field("pool", &self.pool)
            .finish()
    }
}

#[async_trait]
impl StorageClientFactory for ConnectionRegistry {
    async fn client(&self, id: &TransactionId) -> Result<Arc<dyn StorageClient>, PgScopeError> {
        let handle: Arc<dyn StorageClient> = self.acquire(id).await?;
        Ok(handle)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgscope_core::HandleState;
    use pgscope_test_utils::{MockConnector, MockPool};
    use std::time::Duration;

    fn registry(pool: &MockPool) -> ConnectionRegistry {
        let connector = Arc::new(MockConnector::new(pool.clone()));
        ConnectionRegistry::new(
            Arc::new(PoolInitializer::new(connector)),
            PoolConfig::default(),
        )
    }

    #[tokio::test]
    async fn acquire_returns_same_handle_for_same_id() {
        let pool = MockPool::new();
        let registry = registry(&pool);
        let id = TransactionId::from("tx");

        let a = registry.acquire(&id).await.unwrap();
        let b = registry.acquire(&id).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(pool.connects(), 1);
        assert_eq!(registry.len(), 1);
        registry.release(&id).await;
    }

    #[tokio::test]
    async fn distinct_ids_get_distinct_handles() {
        let pool = MockPool::new();
        let registry = registry(&pool);

        let a = registry.acquire(&"a".into()).await.unwrap();
        let b = registry.acquire(&"b".into()).await.unwrap();
        assert_ne!(a.id(), b.id());
        assert_eq!(pool.connects(), 2);
        registry.release_all().await;
        assert!(registry.is_empty());
        assert_eq!(pool.open_connections(), 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_acquire_is_single_flight() {
        let pool = MockPool::new();
        pool.connect_delay(Duration::from_millis(50));
        let registry = Arc::new(registry(&pool));
        let id = TransactionId::from("shared");

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let registry = Arc::clone(&registry);
                let id = id.clone();
                tokio::spawn(async move { registry.acquire(&id).await })
            })
            .collect();
        let handles: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert!(handles.iter().all(|h| Arc::ptr_eq(h, &handles[0])));
        assert_eq!(pool.connects(), 1);
        registry.release(&id).await;
    }

    #[tokio::test]
    async fn release_is_idempotent_and_ignores_unknown_ids() {
        let pool = MockPool::new();
        let registry = registry(&pool);
        let id = TransactionId::from("tx");

        registry.release(&"never-seen".into()).await;

        let handle = registry.acquire(&id).await.unwrap();
        registry.release(&id).await;
        registry.release(&id).await;
        assert!(!registry.contains(&id));
        assert_eq!(handle.state().await, HandleState::Released);
        assert_eq!(pool.releases(), 1);
    }

    #[tokio::test]
    async fn release_waits_for_pending_acquire() {
        let pool = MockPool::new();
        pool.connect_delay(Duration::from_millis(50));
        let registry = Arc::new(registry(&pool));
        let id = TransactionId::from("racing");

        let pending = {
            let registry = Arc::clone(&registry);
            let id = id.clone();
            tokio::spawn(async move { registry.acquire(&id).await })
        };
        while !registry.contains(&id) {
            tokio::task::yield_now().await;
        }
        registry.release(&id).await;

        let handle = pending.await.unwrap().unwrap();
        assert_eq!(handle.state().await, HandleState::Released);
        assert_eq!(pool.connects(), 1);
        assert_eq!(pool.releases(), 1);
        assert_eq!(pool.open_connections(), 0);
        assert!(!registry.contains(&id));
    }

    #[tokio::test]
    async fn failed_checkout_leaves_no_entry() {
        let pool = MockPool::new();
        pool.fail_connect(true);
        let registry = registry(&pool);
        let id = TransactionId::from("tx");

        assert!(matches!(
            registry.acquire(&id).await,
            Err(PgScopeError::Pool { .. })
        ));
        assert!(!registry.contains(&id));

        pool.fail_connect(false);
        registry.acquire(&id).await.unwrap();
        assert!(registry.contains(&id));
        registry.release(&id).await;
    }

    #[tokio::test]
    async fn reacquire_after_release_gets_new_handle() {
        let pool = MockPool::new();
        let registry = registry(&pool);
        let id = TransactionId::from("tx");

        let first = registry.acquire(&id).await.unwrap();
        registry.release(&id).await;
        let second = registry.acquire(&id).await.unwrap();
        assert!(!Arc::ptr_eq(&first, &second));
        assert_ne!(first.id(), second.id());
        registry.release(&id).await;
    }

    #[tokio::test]
    async fn handles_use_configured_schema() {
        let pool = MockPool::new();
        let connector = Arc::new(MockConnector::new(pool.clone()));
        let config = PoolConfig {
            schema: "sales".into(),
            ..PoolConfig::default()
        };
        let registry = ConnectionRegistry::new(Arc::new(PoolInitializer::new(connector)), config);

        let handle = registry.acquire(&"tx".into()).await.unwrap();
        assert_eq!(handle.schema(), "sales");
        registry.release_all().await;
    }

    #[tokio::test]
    async fn factory_hands_out_registered_client() {
        let pool = MockPool::new();
        let registry = registry(&pool);
        let id = TransactionId::from("tx");

        let client = registry.client(&id).await.unwrap();
        client.begin().await.unwrap();
        assert_eq!(registry.acquire(&id).await.unwrap().state().await, HandleState::InTransaction);
        registry.release(&id).await;
    }
}
