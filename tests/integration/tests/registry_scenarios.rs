//! Contract scenarios run against every local backend.

use std::sync::Arc;

use chrono::Utc;
use futures::TryStreamExt;
use sso_core::Error;
use sso_registry::any_ticket;
use sso_ticket::{Authentication, ExpirationPolicy, Ticket, TicketKind};

use crate::common::{adapters, factory, init_tracing};

#[tokio::test]
async fn session_lifecycle_on_every_backend() {
    init_tracing();
    for (name, registry) in adapters() {
        let f = factory();
        let tgt = f.new_ticket_granting_ticket(Authentication::new("casuser"));
        registry.add_ticket(tgt.clone()).await.unwrap();

        let fetched = registry
            .get_ticket(&tgt.id, TicketKind::TicketGranting)
            .await
            .unwrap();
        assert_eq!(fetched, tgt, "{name}: session round trip");

        let st = f.grant_service_ticket(&tgt, "https://app.example.org").unwrap();
        registry.add_ticket(st.clone()).await.unwrap();

        let redeemed = registry
            .get_ticket(&st.id, TicketKind::Service)
            .await
            .unwrap();
        assert_eq!(redeemed.service.as_deref(), Some("https://app.example.org"));
        assert!(
            matches!(
                registry.get_ticket(&st.id, TicketKind::Service).await,
                Err(Error::InvalidTicket)
            ),
            "{name}: second redemption must fail"
        );

        // The session survives its service ticket.
        assert!(registry
            .get_ticket(&tgt.id, TicketKind::TicketGranting)
            .await
            .is_ok());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_redemption_has_one_winner() {
    init_tracing();
    for (name, registry) in adapters() {
        let f = factory();
        let tgt = f.new_ticket_granting_ticket(Authentication::new("casuser"));
        let st = f.grant_service_ticket(&tgt, "https://app.example.org").unwrap();
        registry.add_ticket(tgt).await.unwrap();
        registry.add_ticket(st.clone()).await.unwrap();

        let mut handles = Vec::new();
        for _ in 0..8 {
            let registry = Arc::clone(&registry);
            let id = st.id.clone();
            handles.push(tokio::spawn(async move {
                registry.get_ticket(&id, TicketKind::Service).await
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.unwrap().is_ok() {
                winners += 1;
            }
        }
        assert_eq!(winners, 1, "{name}: exactly one redeemer wins");
    }
}

#[tokio::test]
async fn logout_cascades_over_the_proxy_chain() {
    init_tracing();
    for (name, registry) in adapters() {
        let f = factory();
        let tgt = f.new_ticket_granting_ticket(Authentication::new("casuser"));
        let st = f.grant_service_ticket(&tgt, "https://app.example.org").unwrap();
        let pgt = f
            .grant_proxy_granting_ticket(&st, Authentication::new("casuser"))
            .unwrap();
        let pt = f.grant_proxy_ticket(&pgt, "https://backend.example.org").unwrap();

        for ticket in [&tgt, &st, &pgt, &pt] {
            registry.add_ticket(ticket.clone()).await.unwrap();
        }

        let removed = registry.delete_ticket(&tgt.id).await.unwrap();
        assert_eq!(removed, 4, "{name}: logout removes the whole chain");
        for (id, kind) in [
            (&tgt.id, TicketKind::TicketGranting),
            (&pgt.id, TicketKind::ProxyGranting),
            (&pt.id, TicketKind::Proxy),
        ] {
            assert!(
                matches!(
                    registry.get_ticket(id, kind).await,
                    Err(Error::InvalidTicket)
                ),
                "{name}: {id} must be gone"
            );
        }
    }
}

#[tokio::test]
async fn expired_session_is_rejected_on_read() {
    init_tracing();
    for (name, registry) in adapters() {
        let mut tgt = factory().new_ticket_granting_ticket(Authentication::new("casuser"));
        tgt.expiration_policy = ExpirationPolicy::IdleWithHardTimeout {
            idle_timeout_secs: 60,
            max_lifetime_secs: 600,
        };
        tgt.creation_time = Utc::now() - chrono::TimeDelta::seconds(3600);
        tgt.last_time_used = tgt.creation_time;
        registry.add_ticket(tgt.clone()).await.unwrap();

        assert!(
            matches!(
                registry.get_ticket(&tgt.id, TicketKind::TicketGranting).await,
                Err(Error::InvalidTicket)
            ),
            "{name}: idle session must be rejected"
        );
    }
}

#[tokio::test]
async fn expired_session_invalidates_descendants_immediately() {
    init_tracing();
    for (name, registry) in adapters() {
        let f = factory();
        let mut tgt = f.new_ticket_granting_ticket(Authentication::new("casuser"));
        let st = f.grant_service_ticket(&tgt, "https://app.example.org").unwrap();
        let pgt = f
            .grant_proxy_granting_ticket(&st, Authentication::new("casuser"))
            .unwrap();
        // The session idles out after its grants were minted.
        tgt.last_time_used = Utc::now() - chrono::TimeDelta::seconds(3600);
        for ticket in [&tgt, &st, &pgt] {
            registry.add_ticket(ticket.clone()).await.unwrap();
        }

        assert!(
            matches!(
                registry.get_ticket(&pgt.id, TicketKind::ProxyGranting).await,
                Err(Error::InvalidTicket)
            ),
            "{name}: grant under a dead session must be rejected"
        );
        assert!(
            matches!(
                registry.get_ticket(&st.id, TicketKind::Service).await,
                Err(Error::InvalidTicket)
            ),
            "{name}: service ticket under a dead session must be rejected"
        );
    }
}

#[tokio::test]
async fn usage_updates_are_persisted() {
    init_tracing();
    for (name, registry) in adapters() {
        let mut tgt = factory().new_ticket_granting_ticket(Authentication::new("casuser"));
        registry.add_ticket(tgt.clone()).await.unwrap();

        tgt.touch();
        tgt.touch();
        registry.update_ticket(tgt.clone()).await.unwrap();

        let fetched = registry
            .get_ticket(&tgt.id, TicketKind::TicketGranting)
            .await
            .unwrap();
        assert_eq!(fetched.count_of_uses, 2, "{name}: use count persisted");
    }
}

#[tokio::test]
async fn queries_stream_matching_tickets() {
    init_tracing();
    for (name, registry) in adapters() {
        let f = factory();
        let alice = f.new_ticket_granting_ticket(Authentication::new("alice"));
        let bob = f.new_ticket_granting_ticket(Authentication::new("bob"));
        let st = f.grant_service_ticket(&alice, "https://app.example.org").unwrap();
        for ticket in [&alice, &bob, &st] {
            registry.add_ticket(ticket.clone()).await.unwrap();
        }

        let sessions: Vec<Ticket> = registry
            .get_tickets(Arc::new(|t: &Ticket| t.kind == TicketKind::TicketGranting))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(sessions.len(), 2, "{name}: two sessions match");

        let all: Vec<Ticket> = registry
            .get_tickets(any_ticket())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all.len(), 3, "{name}: three tickets stored");
    }
}
