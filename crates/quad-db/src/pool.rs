//! Connection pool registry for target databases
//!
//! One pool per distinct (host, port, database, user). Pools are created
//! lazily on first use and shared by every request addressing the same
//! target until [`PoolRegistry::close_all`] drains them at shutdown.

use crate::executor::{PgExecutor, SqlExecutor};
use async_trait::async_trait;
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use quad_core::{ConnectionTarget, PoolConfig, PoolKey};
use serde::{Deserialize, Serialize};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use std::sync::Arc;
use std::time::Duration;

/// Result of a connection test, reported to the operator verbatim
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectionTest {
    pub success: bool,
    pub message: String,
}

impl ConnectionTest {
    pub fn ok() -> Self {
        Self {
            success: true,
            message: "Connection successful".to_string(),
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
        }
    }
}

/// Hands out executors for target databases
#[async_trait]
pub trait ExecutorProvider: Send + Sync {
    fn executor(&self, target: &ConnectionTarget) -> Arc<dyn SqlExecutor>;

    /// Open a session, run a trivial query and release it. Never fails.
    async fn test(&self, target: &ConnectionTarget) -> ConnectionTest;

    /// Drain every pool for graceful shutdown
    async fn close_all(&self);
}

/// Sizing and timeouts for one pool
#[derive(Debug, Clone, PartialEq)]
pub struct PoolSettings {
    pub max_connections: u32,
    pub idle_timeout: Duration,
    /// Bound on waiting for a session, including connection establishment
    pub acquire_timeout: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self::targets(&PoolConfig::default())
    }
}

impl PoolSettings {
    /// Settings for target-database pools
    pub fn targets(config: &PoolConfig) -> Self {
        Self {
            max_connections: config.max_connections,
            idle_timeout: Duration::from_secs(config.idle_timeout_secs),
            acquire_timeout: Duration::from_secs(config.connect_timeout_secs),
        }
    }

    /// Settings for the control-plane pool
    pub fn admin(config: &PoolConfig) -> Self {
        Self {
            max_connections: config.admin_max_connections,
            ..Self::targets(config)
        }
    }

    /// Build a pool without touching the network
    pub fn build_lazy(&self, options: PgConnectOptions) -> PgPool {
        PgPoolOptions::new()
            .max_connections(self.max_connections)
            .idle_timeout(self.idle_timeout)
            .acquire_timeout(self.acquire_timeout)
            .connect_lazy_with(options)
    }
}

struct PoolEntry {
    pool: Arc<PgPool>,
    password: String,
}

/// Owned registry of pools, created at startup and injected into handlers
pub struct PoolRegistry {
    settings: PoolSettings,
    pools: DashMap<PoolKey, PoolEntry>,
    admin_pool: Option<PgPool>,
}

impl PoolRegistry {
    pub fn new(settings: PoolSettings) -> Self {
        Self {
            settings,
            pools: DashMap::new(),
            admin_pool: None,
        }
    }

    /// Register the control-plane pool so `close_all` drains it too
    pub fn with_admin_pool(mut self, pool: PgPool) -> Self {
        self.admin_pool = Some(pool);
        self
    }

    /// Shared pool for the target's identity, created on first use.
    ///
    /// A pool built with a different password for the same identity is
    /// replaced, so there is still at most one pool per key.
    pub fn get_pool(&self, target: &ConnectionTarget) -> Arc<PgPool> {
        match self.pools.entry(target.pool_key()) {
            Entry::Occupied(mut entry) => {
                if entry.get().password == target.password {
                    return entry.get().pool.clone();
                }

                tracing::debug!(pool = %entry.key(), "Credentials changed, replacing pool");
                let replacement = self.build_entry(target);
                let pool = replacement.pool.clone();
                entry.insert(replacement);
                pool
            }
            Entry::Vacant(entry) => {
                tracing::debug!(pool = %entry.key(), "Creating pool");
                entry.insert(self.build_entry(target)).pool.clone()
            }
        }
    }

    fn build_entry(&self, target: &ConnectionTarget) -> PoolEntry {
        let options = PgConnectOptions::new()
            .host(&target.host)
            .port(target.port)
            .database(&target.database_name)
            .username(&target.username)
            .password(&target.password);

        PoolEntry {
            pool: Arc::new(self.settings.build_lazy(options)),
            password: target.password.clone(),
        }
    }

    /// Number of live target pools
    pub fn len(&self) -> usize {
        self.pools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pools.is_empty()
    }
}

#[async_trait]
impl ExecutorProvider for PoolRegistry {
    fn executor(&self, target: &ConnectionTarget) -> Arc<dyn SqlExecutor> {
        Arc::new(PgExecutor::new(self.get_pool(target)))
    }

    async fn test(&self, target: &ConnectionTarget) -> ConnectionTest {
        let pool = self.get_pool(target);

        let mut conn = match pool.acquire().await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::debug!(pool = %target.pool_key(), error = %e, "Connection test failed");
                return ConnectionTest::failed(e.to_string());
            }
        };

        // The session returns to the pool when `conn` drops
        match sqlx::query("SELECT 1").execute(&mut *conn).await {
            Ok(_) => ConnectionTest::ok(),
            Err(e) => ConnectionTest::failed(e.to_string()),
        }
    }

    async fn close_all(&self) {
        if let Some(admin_pool) = &self.admin_pool {
            admin_pool.close().await;
        }

        let keys: Vec<PoolKey> = self.pools.iter().map(|e| e.key().clone()).collect();
        for key in keys {
            if let Some((key, entry)) = self.pools.remove(&key) {
                tracing::debug!(pool = %key, "Closing pool");
                entry.pool.close().await;
            }
        }
    }
}
