//! Two-node replication over the in-process bus.

use std::sync::Arc;

use sso_core::Error;
use sso_registry::{
    AesGcmTicketCipher, LocalMessageBus, NoOpTicketCipher, ReplicatedTicketRegistry,
    TicketCipher, TicketRegistry,
};
use sso_ticket::{Authentication, TicketKind};

use crate::common::{eventually, factory, init_tracing};

const TOPIC: &str = "sso/tickets";

async fn cluster_of_two(
    cipher_a: Arc<dyn TicketCipher>,
    cipher_b: Arc<dyn TicketCipher>,
) -> (ReplicatedTicketRegistry, ReplicatedTicketRegistry) {
    let bus = Arc::new(LocalMessageBus::new());
    let a = ReplicatedTicketRegistry::new(bus.clone(), cipher_a, TOPIC);
    let b = ReplicatedTicketRegistry::new(bus, cipher_b, TOPIC);
    a.start().await.unwrap();
    b.start().await.unwrap();
    (a, b)
}

#[tokio::test]
async fn session_created_on_one_node_serves_on_another() {
    init_tracing();
    let (a, b) = cluster_of_two(Arc::new(NoOpTicketCipher), Arc::new(NoOpTicketCipher)).await;

    let tgt = factory().new_ticket_granting_ticket(Authentication::new("casuser"));
    a.add_ticket(tgt.clone()).await.unwrap();

    assert!(
        eventually(async || {
            b.get_ticket(&tgt.id, TicketKind::TicketGranting).await.is_ok()
        })
        .await
    );
    let fetched = b
        .get_ticket(&tgt.id, TicketKind::TicketGranting)
        .await
        .unwrap();
    assert_eq!(fetched, tgt);
}

#[tokio::test]
async fn logout_on_one_node_invalidates_everywhere() {
    init_tracing();
    let (a, b) = cluster_of_two(Arc::new(NoOpTicketCipher), Arc::new(NoOpTicketCipher)).await;

    let tgt = factory().new_ticket_granting_ticket(Authentication::new("casuser"));
    a.add_ticket(tgt.clone()).await.unwrap();
    assert!(
        eventually(async || {
            b.get_ticket(&tgt.id, TicketKind::TicketGranting).await.is_ok()
        })
        .await
    );

    b.delete_ticket(&tgt.id).await.unwrap();
    assert!(
        eventually(async || {
            matches!(
                a.get_ticket(&tgt.id, TicketKind::TicketGranting).await,
                Err(Error::InvalidTicket)
            )
        })
        .await
    );
}

#[tokio::test]
async fn commands_replicate_under_a_shared_cipher() {
    init_tracing();
    let key = AesGcmTicketCipher::generate_key();
    let (a, b) = cluster_of_two(
        Arc::new(AesGcmTicketCipher::from_key_bytes(&key).unwrap()),
        Arc::new(AesGcmTicketCipher::from_key_bytes(&key).unwrap()),
    )
    .await;

    let tgt = factory().new_ticket_granting_ticket(Authentication::new("casuser"));
    a.add_ticket(tgt.clone()).await.unwrap();

    assert!(
        eventually(async || {
            b.get_ticket(&tgt.id, TicketKind::TicketGranting).await.is_ok()
        })
        .await
    );
}

#[tokio::test]
async fn mismatched_cipher_drops_peer_commands() {
    init_tracing();
    let (a, b) = cluster_of_two(
        Arc::new(AesGcmTicketCipher::from_key_bytes(&[1u8; 32]).unwrap()),
        Arc::new(AesGcmTicketCipher::from_key_bytes(&[2u8; 32]).unwrap()),
    )
    .await;

    let tgt = factory().new_ticket_granting_ticket(Authentication::new("casuser"));
    a.add_ticket(tgt.clone()).await.unwrap();

    // B cannot open A's payloads; the replica never appears, while A
    // still serves its own store.
    assert!(
        !eventually(async || {
            b.get_ticket(&tgt.id, TicketKind::TicketGranting).await.is_ok()
        })
        .await
    );
    assert!(a
        .get_ticket(&tgt.id, TicketKind::TicketGranting)
        .await
        .is_ok());
}
