//! Named locks for cluster-wide maintenance work.
//!
//! The reaper uses these so a sweep runs on one node at a time. Locks
//! are an efficiency measure only; registry correctness never depends on
//! holding one.

use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use sso_core::Result;

const POLL_INTERVAL: Duration = Duration::from_millis(10);

/// Repository of named, holder-scoped locks.
#[async_trait]
pub trait LockRepository: Send + Sync {
    /// Tries to take the named lock for `holder`, waiting up to `wait`.
    ///
    /// Returns whether the lock was acquired. Re-acquiring a lock already
    /// held by the same holder succeeds immediately.
    async fn acquire(&self, name: &str, holder: &str, wait: Duration) -> Result<bool>;

    /// Releases the named lock if `holder` holds it.
    ///
    /// Releasing a lock held by someone else, or not held at all, is a
    /// no-op.
    async fn release(&self, name: &str, holder: &str) -> Result<()>;
}

/// Lock repository that grants every request.
///
/// For single-node deployments where nothing contends for maintenance.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpLockRepository;

#[async_trait]
impl LockRepository for NoOpLockRepository {
    async fn acquire(&self, _name: &str, _holder: &str, _wait: Duration) -> Result<bool> {
        Ok(true)
    }

    async fn release(&self, _name: &str, _holder: &str) -> Result<()> {
        Ok(())
    }
}

/// Single-process lock repository backed by a concurrent map.
#[derive(Debug, Default)]
pub struct InMemoryLockRepository {
    holders: DashMap<String, String>,
}

impl InMemoryLockRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn try_acquire(&self, name: &str, holder: &str) -> bool {
        match self.holders.entry(name.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(current) => current.get() == holder,
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(holder.to_string());
                true
            }
        }
    }
}

#[async_trait]
impl LockRepository for InMemoryLockRepository {
    async fn acquire(&self, name: &str, holder: &str, wait: Duration) -> Result<bool> {
        let deadline = tokio::time::Instant::now() + wait;
        loop {
            if self.try_acquire(name, holder) {
                return Ok(true);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(false);
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }

    async fn release(&self, name: &str, holder: &str) -> Result<()> {
        self.holders.remove_if(name, |_, current| current == holder);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn acquire_and_release() {
        let locks = InMemoryLockRepository::new();
        assert!(locks.acquire("sweep", "a", Duration::ZERO).await.unwrap());
        assert!(!locks.acquire("sweep", "b", Duration::ZERO).await.unwrap());

        locks.release("sweep", "a").await.unwrap();
        assert!(locks.acquire("sweep", "b", Duration::ZERO).await.unwrap());
    }

    #[tokio::test]
    async fn reacquire_by_same_holder_succeeds() {
        let locks = InMemoryLockRepository::new();
        assert!(locks.acquire("sweep", "a", Duration::ZERO).await.unwrap());
        assert!(locks.acquire("sweep", "a", Duration::ZERO).await.unwrap());
    }

    #[tokio::test]
    async fn release_by_non_holder_is_a_noop() {
        let locks = InMemoryLockRepository::new();
        assert!(locks.acquire("sweep", "a", Duration::ZERO).await.unwrap());
        locks.release("sweep", "b").await.unwrap();
        assert!(!locks.acquire("sweep", "b", Duration::ZERO).await.unwrap());
    }

    #[tokio::test]
    async fn acquire_waits_for_release() {
        let locks = std::sync::Arc::new(InMemoryLockRepository::new());
        assert!(locks.acquire("sweep", "a", Duration::ZERO).await.unwrap());

        let contender = std::sync::Arc::clone(&locks);
        let waiter = tokio::spawn(async move {
            contender
                .acquire("sweep", "b", Duration::from_secs(2))
                .await
                .unwrap()
        });
        tokio::time::sleep(Duration::from_millis(30)).await;
        locks.release("sweep", "a").await.unwrap();
        assert!(waiter.await.unwrap());
    }

    #[tokio::test]
    async fn noop_always_grants() {
        let locks = NoOpLockRepository;
        assert!(locks.acquire("sweep", "a", Duration::ZERO).await.unwrap());
        assert!(locks.acquire("sweep", "b", Duration::ZERO).await.unwrap());
    }
}
