//! Optional Redis side cache. Every operation degrades to a miss or a no-op.

use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};
use redis::AsyncCommands;
use serde::{Serialize, de::DeserializeOwned};

pub const PATHWAYS_KEY: &str = "learnpath:pathways";

pub fn create_redis_pool(cache: &crate::config::Cache) -> Option<Pool> {
    let url = cache.redis_url()?;

    let timeout = cache.connection_timeout();
    let pool = RedisPoolConfig::from_url(url).builder().ok().and_then(|b| {
        b.max_size(cache.pool_size())
            .wait_timeout(Some(timeout))
            .create_timeout(Some(timeout))
            .runtime(Runtime::Tokio1)
            .build()
            .ok()
    });

    match &pool {
        Some(_) => tracing::info!(
            "redis pool created for {}",
            url.split('@').next_back().unwrap_or("***")
        ),
        None => tracing::warn!("could not create redis pool, caching disabled"),
    }
    pool
}

#[derive(Clone)]
pub struct CacheManager {
    pool: Option<Pool>,
    default_ttl_secs: u64,
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("enabled", &self.pool.is_some())
            .field("default_ttl_secs", &self.default_ttl_secs)
            .finish()
    }
}

impl CacheManager {
    pub fn new(pool: Option<Pool>, default_ttl_secs: u64) -> Self {
        Self {
            pool,
            default_ttl_secs,
        }
    }

    pub fn from_config(cache: &crate::config::Cache) -> Self {
        Self::new(create_redis_pool(cache), cache.default_ttl_secs())
    }

    pub fn disabled() -> Self {
        Self::new(None, 0)
    }

    pub fn is_enabled(&self) -> bool {
        self.pool.is_some()
    }

    pub fn default_ttl_secs(&self) -> u64 {
        self.default_ttl_secs
    }

    pub async fn get_json<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let pool = self.pool.as_ref()?;
        let mut conn = pool
            .get()
            .await
            .inspect_err(|e| tracing::debug!("redis unavailable: {}", e))
            .ok()?;

        let value: Option<String> = conn.get(key).await.ok()?;
        value.and_then(|v| serde_json::from_str(&v).ok())
    }

    pub async fn set_json<T: Serialize>(&self, key: &str, value: &T, ttl_secs: u64) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        let Ok(raw) = serde_json::to_string(value) else {
            return;
        };

        match pool.get().await {
            Ok(mut conn) => {
                if let Err(e) = conn.set_ex::<_, _, ()>(key, raw, ttl_secs).await {
                    tracing::warn!("failed to cache {}: {}", key, e);
                }
            }
            Err(e) => tracing::debug!("redis unavailable: {}", e),
        }
    }

    pub async fn delete(&self, key: &str) {
        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        match pool.get().await {
            Ok(mut conn) => {
                if let Err(e) = conn.del::<_, ()>(key).await {
                    tracing::warn!("failed to invalidate {}: {}", key, e);
                }
            }
            Err(e) => tracing::debug!("redis unavailable: {}", e),
        }
    }
}
