// SPDX-FileCopyrightText: 2026 pgscope Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lazy, single-flight construction of the process-wide connection pool.

use std::sync::Arc;

use tokio::sync::OnceCell;
use tracing::{debug, info};

use pgscope_config::model::PoolConfig;
use pgscope_core::{ConnectionSource, PgScopeError, PoolConnector};

/// Builds the pool on first use and hands out the same instance afterwards.
///
/// Concurrent first callers wait on a single build. A failed build leaves the
/// initializer empty, so the next caller retries.
pub struct PoolInitializer {
    connector: Arc<dyn PoolConnector>,
    pool: OnceCell<Arc<dyn ConnectionSource>>,
}

impl PoolInitializer {
    /// Create an initializer. Nothing is opened until [`ensure_pool`](Self::ensure_pool).
    pub fn new(connector: Arc<dyn PoolConnector>) -> Self {
        Self {
            connector,
            pool: OnceCell::new(),
        }
    }

    /// Returns the pool, building it from `config` if this is the first call.
    pub async fn ensure_pool(
        &self,
        config: &PoolConfig,
    ) -> Result<Arc<dyn ConnectionSource>, PgScopeError> {
        let pool = self
            .pool
            .get_or_try_init(|| async {
                debug!(host = %config.host, port = config.port, "building connection pool");
                let pool = self.connector.build(config).await?;
                info!(
                    driver = pool.name(),
                    max_connections = config.max_connections,
                    "connection pool ready"
                );
                Ok::<_, PgScopeError>(pool)
            })
            .await?;
        Ok(Arc::clone(pool))
    }

    /// The pool, if it has been built.
    pub fn get(&self) -> Option<Arc<dyn ConnectionSource>> {
        self.pool.get().cloned()
    }

    pub fn is_initialized(&self) -> bool {
        self.pool.initialized()
    }
}

impl std::fmt::Debug for PoolInitializer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PoolInitializer")
            .field("initialized", &self.is_initialized())
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pgscope_test_utils::{MockConnector, MockPool};
    use std::time::Duration;

    #[tokio::test]
    async fn pool_is_built_lazily_and_once() {
        let connector = Arc::new(MockConnector::new(MockPool::new()));
        let init = PoolInitializer::new(connector.clone());
        assert!(!init.is_initialized());
        assert!(init.get().is_none());

        let config = PoolConfig::default();
        let a = init.ensure_pool(&config).await.unwrap();
        let b = init.ensure_pool(&config).await.unwrap();
        assert!(Arc::ptr_eq(&a, &b));
        assert_eq!(connector.builds(), 1);
        assert!(init.is_initialized());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn concurrent_first_calls_share_one_build() {
        let connector = Arc::new(
            MockConnector::new(MockPool::new()).with_delay(Duration::from_millis(50)),
        );
        let init = Arc::new(PoolInitializer::new(connector.clone()));

        let tasks: Vec<_> = (0..8)
            .map(|_| {
                let init = Arc::clone(&init);
                tokio::spawn(async move { init.ensure_pool(&PoolConfig::default()).await })
            })
            .collect();
        let pools: Vec<_> = futures::future::join_all(tasks)
            .await
            .into_iter()
            .map(|r| r.unwrap().unwrap())
            .collect();

        assert_eq!(connector.builds(), 1);
        assert!(pools.iter().all(|p| Arc::ptr_eq(p, &pools[0])));
    }

    #[tokio::test]
    async fn failed_build_is_retried() {
        let connector = Arc::new(MockConnector::new(MockPool::new()));
        connector.set_failing(true);
        let init = PoolInitializer::new(connector.clone());
        let config = PoolConfig::default();

        let err = match init.ensure_pool(&config).await {
            Err(e) => e,
            Ok(_) => panic!("build should fail while the connector is down"),
        };
        assert!(err.to_string().contains("localhost:5432"));
        assert!(!init.is_initialized());

        connector.set_failing(false);
        init.ensure_pool(&config).await.unwrap();
        assert_eq!(connector.builds(), 2);
    }
}
