//! Common test utilities and fixtures.

use std::sync::Arc;
use std::time::Duration;

use sso_core::TicketConfig;
use sso_registry::{
    AesGcmTicketCipher, ClusterMapTicketRegistry, InMemoryTicketRegistry, LocalClusterMap,
    NoOpTicketCipher, TicketRegistry,
};
use sso_ticket::TicketFactory;

/// Initializes tracing once for the whole test binary.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter("sso_registry=debug")
        .try_init();
}

/// Factory with production-default lifetimes (30 minute idle, 10 hour
/// maximum sessions, 10 second single-use grants).
pub fn factory() -> TicketFactory {
    TicketFactory::new(TicketConfig::default())
}

/// Every local backend the contract tests run against.
pub fn adapters() -> Vec<(&'static str, Arc<dyn TicketRegistry>)> {
    vec![
        ("memory", Arc::new(InMemoryTicketRegistry::new())),
        (
            "cluster-map",
            Arc::new(ClusterMapTicketRegistry::new(
                Arc::new(LocalClusterMap::new()),
                Arc::new(NoOpTicketCipher),
            )),
        ),
        (
            "cluster-map-encrypted",
            Arc::new(ClusterMapTicketRegistry::new(
                Arc::new(LocalClusterMap::new()),
                Arc::new(
                    AesGcmTicketCipher::from_key_bytes(&AesGcmTicketCipher::generate_key())
                        .unwrap(),
                ),
            )),
        ),
    ]
}

/// Polls `check` until it returns true or a second elapses.
pub async fn eventually<F>(mut check: F) -> bool
where
    F: AsyncFnMut() -> bool,
{
    for _ in 0..100 {
        if check().await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    false
}
