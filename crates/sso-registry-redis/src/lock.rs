//! Redis-backed lock repository.

use std::time::Duration;

use async_trait::async_trait;
use fred::prelude::*;
use sso_core::{Error, Result};
use sso_registry::LockRepository;

use crate::config::RedisConfig;
use crate::error::from_redis_error;

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Named locks over `SET NX PX`.
///
/// Every lock carries the configured lease so a crashed holder cannot
/// block maintenance forever. Release checks the holder before deleting;
/// the check and delete are two commands, which is acceptable because a
/// mistaken delete only lets a second sweep run early.
pub struct RedisLockRepository {
    client: Client,
    config: RedisConfig,
}

impl RedisLockRepository {
    /// Connects to Redis and creates a lock repository.
    ///
    /// ## Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn new(config: RedisConfig) -> Result<Self> {
        let redis_config = Config::from_url(&config.connection_url())
            .map_err(|e| Error::Config(e.to_string()))?;

        let client = Client::new(
            redis_config,
            None,
            None,
            Some(ReconnectPolicy::new_exponential(0, 1000, 30_000, 2)),
        );

        client.init().await.map_err(from_redis_error)?;

        Ok(Self { client, config })
    }

    /// Creates a lock repository over an already connected client.
    pub const fn from_client(client: Client, config: RedisConfig) -> Self {
        Self { client, config }
    }

    async fn try_acquire(&self, key: &str, holder: &str) -> Result<bool> {
        let lease = seconds_safe(self.config.lock_lease_ms);
        let stored: Option<String> = self
            .client
            .set(key, holder, Some(Expiration::PX(lease)), Some(SetOptions::NX), false)
            .await
            .map_err(from_redis_error)?;
        if stored.is_some() {
            return Ok(true);
        }
        // Re-acquisition by the current holder succeeds.
        let current: Option<String> = self.client.get(key).await.map_err(from_redis_error)?;
        Ok(current.as_deref() == Some(holder))
    }
}

#[allow(clippy::cast_possible_wrap)]
const fn seconds_safe(millis: u64) -> i64 {
    millis as i64
}

#[async_trait]
impl LockRepository for RedisLockRepository {
    async fn acquire(&self, name: &str, holder: &str, wait: Duration) -> Result<bool> {
        let key = self.config.lock_key(name);
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if self.try_acquire(&key, holder).await? {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn release(&self, name: &str, holder: &str) -> Result<()> {
        let key = self.config.lock_key(name);
        let current: Option<String> = self.client.get(&key).await.map_err(from_redis_error)?;
        if current.as_deref() == Some(holder) {
            self.client
                .del::<(), _>(&key)
                .await
                .map_err(from_redis_error)?;
        }
        Ok(())
    }
}
