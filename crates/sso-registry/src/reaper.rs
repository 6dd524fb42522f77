//! Background eviction of expired tickets.
//!
//! Expired tickets are already rejected on read; the reaper reclaims the
//! storage they occupy. Each pass takes a cluster-wide lock so only one
//! node sweeps at a time, streams the expired tickets, and deletes them
//! one by one.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use futures::StreamExt;
use sso_core::{Error, ReaperConfig, Result};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::lock::LockRepository;
use crate::registry::{expired_at, TicketRegistry};

/// Name of the cluster-wide lock serializing sweep passes.
pub const CLEANER_LOCK_NAME: &str = "ticket-registry-cleaner";

/// Periodic sweeper of expired tickets.
pub struct TicketReaper {
    registry: Arc<dyn TicketRegistry>,
    locks: Arc<dyn LockRepository>,
    config: ReaperConfig,
    holder_id: String,
}

impl TicketReaper {
    /// Creates a reaper over the given registry with a unique holder id.
    pub fn new(
        registry: Arc<dyn TicketRegistry>,
        locks: Arc<dyn LockRepository>,
        config: ReaperConfig,
    ) -> Self {
        Self {
            registry,
            locks,
            config,
            holder_id: Uuid::now_v7().to_string(),
        }
    }

    /// Runs one sweep pass, returning how many tickets were removed.
    ///
    /// ## Errors
    ///
    /// Returns [`Error::LockUnavailable`] when the sweep lock cannot be
    /// taken within the configured wait; another node is sweeping and the
    /// run loop retries on the next cycle. Registry errors from the sweep
    /// itself are surfaced as is.
    pub async fn sweep(&self) -> Result<u64> {
        let wait = Duration::from_millis(self.config.lock_wait_timeout_ms);
        if !self
            .locks
            .acquire(CLEANER_LOCK_NAME, &self.holder_id, wait)
            .await?
        {
            return Err(Error::LockUnavailable(CLEANER_LOCK_NAME.to_string()));
        }

        let result = self.sweep_locked().await;
        self.locks.release(CLEANER_LOCK_NAME, &self.holder_id).await?;
        result
    }

    async fn sweep_locked(&self) -> Result<u64> {
        let mut expired = self.registry.get_tickets(expired_at(Utc::now())).await?;
        let mut removed = 0u64;
        while let Some(ticket) = expired.next().await {
            let ticket = ticket?;
            // A concurrent read may have evicted the ticket already.
            match self.registry.delete_ticket(&ticket.id).await {
                Ok(count) => removed += count,
                Err(Error::InvalidTicket) => {}
                Err(e) => return Err(e),
            }
        }
        if removed > 0 {
            tracing::debug!(removed, "swept expired tickets");
        }
        Ok(removed)
    }

    /// Starts the periodic sweep loop.
    ///
    /// With the reaper disabled in configuration the task only waits for
    /// shutdown. The first pass runs after the configured start delay.
    pub fn start(self) -> ReaperHandle {
        let (shutdown_tx, mut shutdown_rx) = oneshot::channel::<()>();
        let task = tokio::spawn(async move {
            if !self.config.enabled {
                let _ = (&mut shutdown_rx).await;
                return;
            }

            tokio::select! {
                _ = &mut shutdown_rx => return,
                () = tokio::time::sleep(Duration::from_secs(self.config.start_delay_secs)) => {}
            }

            let mut interval =
                tokio::time::interval(Duration::from_secs(self.config.interval_secs.max(1)));
            loop {
                tokio::select! {
                    _ = &mut shutdown_rx => return,
                    _ = interval.tick() => {
                        match self.sweep().await {
                            Ok(_) => {}
                            Err(Error::LockUnavailable(_)) => {
                                tracing::debug!("sweep lock held elsewhere, skipping pass");
                            }
                            Err(e) => tracing::warn!(error = %e, "sweep pass failed"),
                        }
                    }
                }
            }
        });
        ReaperHandle { shutdown_tx, task }
    }
}

/// Handle to a running reaper task.
pub struct ReaperHandle {
    shutdown_tx: oneshot::Sender<()>,
    task: JoinHandle<()>,
}

impl ReaperHandle {
    /// Stops the sweep loop and waits for the task to finish.
    pub async fn stop(self) {
        let _ = self.shutdown_tx.send(());
        let _ = self.task.await;
    }
}
