//! Background reaper against a shared registry.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sso_core::{Error, ReaperConfig};
use sso_registry::{
    InMemoryLockRepository, InMemoryTicketRegistry, LockRepository, TicketReaper,
    TicketRegistry, CLEANER_LOCK_NAME,
};
use sso_ticket::{Authentication, ExpirationPolicy, TicketKind};

use crate::common::{eventually, factory, init_tracing};

fn expired_session() -> sso_ticket::Ticket {
    let mut tgt = factory().new_ticket_granting_ticket(Authentication::new("casuser"));
    tgt.expiration_policy = ExpirationPolicy::TimeToLive { ttl_secs: 1 };
    tgt.creation_time = Utc::now() - chrono::TimeDelta::seconds(10);
    tgt
}

#[tokio::test]
async fn reaper_evicts_expired_and_keeps_live_sessions() {
    init_tracing();
    let registry = Arc::new(InMemoryTicketRegistry::new());
    let live = factory().new_ticket_granting_ticket(Authentication::new("alice"));
    registry.add_ticket(live.clone()).await.unwrap();
    registry.add_ticket(expired_session()).await.unwrap();

    let config = ReaperConfig {
        enabled: true,
        interval_secs: 1,
        start_delay_secs: 0,
        lock_wait_timeout_ms: 100,
    };
    let handle = TicketReaper::new(
        registry.clone(),
        Arc::new(InMemoryLockRepository::new()),
        config,
    )
    .start();

    assert!(eventually(async || registry.len() == 1).await);
    assert!(registry
        .get_ticket(&live.id, TicketKind::TicketGranting)
        .await
        .is_ok());
    handle.stop().await;
}

#[tokio::test]
async fn contending_reapers_share_one_lock() {
    init_tracing();
    let registry = Arc::new(InMemoryTicketRegistry::new());
    registry.add_ticket(expired_session()).await.unwrap();

    let locks = Arc::new(InMemoryLockRepository::new());
    locks
        .acquire(CLEANER_LOCK_NAME, "another-node", Duration::ZERO)
        .await
        .unwrap();

    let config = ReaperConfig {
        enabled: true,
        interval_secs: 120,
        start_delay_secs: 0,
        lock_wait_timeout_ms: 20,
    };
    let reaper = TicketReaper::new(registry.clone(), locks.clone(), config);

    // While a peer holds the lock the pass reports contention and
    // removes nothing.
    assert!(matches!(
        reaper.sweep().await,
        Err(Error::LockUnavailable(_))
    ));
    assert_eq!(registry.len(), 1);

    locks.release(CLEANER_LOCK_NAME, "another-node").await.unwrap();
    assert_eq!(reaper.sweep().await.unwrap(), 1);
    assert!(registry.is_empty());
}
