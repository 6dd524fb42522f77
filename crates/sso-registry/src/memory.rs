//! In-memory reference adapter.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use sso_core::{Error, Result};
use sso_ticket::{Ticket, TicketKind};

use crate::registry::{TicketPredicate, TicketRegistry};

/// Single-process registry backed by a concurrent map.
///
/// Correctness of single-use redemption relies only on the map's atomic
/// per-key remove; no locks or replication are involved. Also serves as
/// the local store of [`crate::ReplicatedTicketRegistry`].
#[derive(Debug, Default, Clone)]
pub struct InMemoryTicketRegistry {
    tickets: Arc<DashMap<String, Ticket>>,
}

impl InMemoryTicketRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of tickets currently stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tickets.len()
    }

    /// Whether the registry holds no tickets.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tickets.is_empty()
    }

    /// Inserts or replaces a ticket without the add-time conflict check.
    ///
    /// Used by the replication subscriber, where ADD and UPDATE commands
    /// must apply idempotently whatever the local state.
    pub fn upsert(&self, ticket: Ticket) {
        self.tickets.insert(ticket.id.clone(), ticket);
    }

    /// Resolves `root` plus every ticket whose parent chain reaches it,
    /// in breadth-first order.
    fn with_descendants(&self, root: &str) -> Vec<String> {
        let mut ordered = vec![root.to_string()];
        let mut seen: HashSet<String> = ordered.iter().cloned().collect();
        let mut cursor = 0;
        while cursor < ordered.len() {
            let parent = ordered[cursor].clone();
            for entry in self.tickets.iter() {
                if entry.value().parent_id.as_deref() == Some(parent.as_str())
                    && seen.insert(entry.key().clone())
                {
                    ordered.push(entry.key().clone());
                }
            }
            cursor += 1;
        }
        ordered
    }

    /// Finds the nearest ancestor that is absent or expired, if any.
    ///
    /// A ticket is only as valid as its granting chain: the moment a
    /// session expires, every descendant is unusable, whatever its own
    /// policy says.
    fn broken_ancestor(&self, ticket: &Ticket, now: DateTime<Utc>) -> Option<String> {
        let mut parent = ticket.parent_id.clone();
        let mut seen = HashSet::new();
        while let Some(id) = parent {
            if !seen.insert(id.clone()) {
                return Some(id);
            }
            match self.tickets.get(&id).map(|entry| entry.value().clone()) {
                None => return Some(id),
                Some(ancestor) if ancestor.is_expired(now) => return Some(id),
                Some(ancestor) => parent = ancestor.parent_id,
            }
        }
        None
    }
}

#[async_trait]
impl TicketRegistry for InMemoryTicketRegistry {
    async fn add_ticket(&self, ticket: Ticket) -> Result<()> {
        match self.tickets.entry(ticket.id.clone()) {
            Entry::Occupied(_) => Err(Error::CreationConflict(ticket.id)),
            Entry::Vacant(slot) => {
                slot.insert(ticket);
                Ok(())
            }
        }
    }

    async fn get_ticket(&self, id: &str, kind: TicketKind) -> Result<Ticket> {
        if !kind.matches_id(id) {
            return Err(Error::InvalidTicket);
        }
        let now = Utc::now();

        if kind.is_single_use() {
            // Atomic consume: the remove is the redemption, so exactly one
            // of any set of concurrent callers gets the ticket back.
            let (_, ticket) = self
                .tickets
                .remove_if(id, |_, ticket| ticket.kind == kind)
                .ok_or(Error::InvalidTicket)?;
            if ticket.is_expired(now) {
                return Err(Error::InvalidTicket);
            }
            if let Some(ancestor) = self.broken_ancestor(&ticket, now) {
                let removed = self.delete_ticket(&ancestor).await?;
                tracing::debug!(id, %ancestor, removed, "rejected ticket under expired session");
                return Err(Error::InvalidTicket);
            }
            return Ok(ticket);
        }

        let ticket = self
            .tickets
            .get(id)
            .map(|entry| entry.value().clone())
            .ok_or(Error::InvalidTicket)?;
        if ticket.kind != kind {
            return Err(Error::InvalidTicket);
        }
        if ticket.is_expired(now) {
            let removed = self.delete_ticket(id).await?;
            tracing::debug!(id, removed, "removed expired ticket on read");
            return Err(Error::InvalidTicket);
        }
        if let Some(ancestor) = self.broken_ancestor(&ticket, now) {
            let removed = self.delete_ticket(&ancestor).await?;
            tracing::debug!(id, %ancestor, removed, "rejected ticket under expired session");
            return Err(Error::InvalidTicket);
        }
        Ok(ticket)
    }

    async fn update_ticket(&self, ticket: Ticket) -> Result<Ticket> {
        match self.tickets.get_mut(&ticket.id) {
            Some(mut entry) => {
                *entry = ticket.clone();
                Ok(ticket)
            }
            None => Err(Error::InvalidTicket),
        }
    }

    async fn delete_ticket(&self, id: &str) -> Result<u64> {
        let mut removed = 0u64;
        for ticket_id in self.with_descendants(id) {
            if self.tickets.remove(&ticket_id).is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn delete_all(&self) -> Result<u64> {
        let removed = self.tickets.len() as u64;
        self.tickets.clear();
        Ok(removed)
    }

    async fn get_tickets(
        &self,
        predicate: TicketPredicate,
    ) -> Result<BoxStream<'static, Result<Ticket>>> {
        // No native iteration to defer to; a snapshot keeps the stream
        // stable while concurrent mutations proceed.
        let matched: Vec<Ticket> = self
            .tickets
            .iter()
            .filter(|entry| predicate(entry.value()))
            .map(|entry| entry.value().clone())
            .collect();
        Ok(stream::iter(matched.into_iter().map(Ok)).boxed())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::any_ticket;
    use futures::TryStreamExt;
    use sso_core::TicketConfig;
    use sso_ticket::{Authentication, ExpirationPolicy, TicketFactory};

    fn factory() -> TicketFactory {
        TicketFactory::new(TicketConfig::default())
    }

    #[tokio::test]
    async fn add_then_get_returns_identical_ticket() {
        let registry = InMemoryTicketRegistry::new();
        let tgt = factory().new_ticket_granting_ticket(Authentication::new("casuser"));
        registry.add_ticket(tgt.clone()).await.unwrap();

        let fetched = registry
            .get_ticket(&tgt.id, TicketKind::TicketGranting)
            .await
            .unwrap();
        assert_eq!(fetched, tgt);
    }

    #[tokio::test]
    async fn add_rejects_duplicate_ids() {
        let registry = InMemoryTicketRegistry::new();
        let tgt = factory().new_ticket_granting_ticket(Authentication::new("casuser"));
        registry.add_ticket(tgt.clone()).await.unwrap();

        assert!(matches!(
            registry.add_ticket(tgt).await,
            Err(Error::CreationConflict(_))
        ));
    }

    #[tokio::test]
    async fn get_rejects_wrong_kind_without_consuming() {
        let registry = InMemoryTicketRegistry::new();
        let f = factory();
        let tgt = f.new_ticket_granting_ticket(Authentication::new("casuser"));
        registry.add_ticket(tgt.clone()).await.unwrap();

        assert!(matches!(
            registry.get_ticket(&tgt.id, TicketKind::Service).await,
            Err(Error::InvalidTicket)
        ));
        // the TGT is untouched
        assert!(registry
            .get_ticket(&tgt.id, TicketKind::TicketGranting)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn service_ticket_is_single_use() {
        let registry = InMemoryTicketRegistry::new();
        let f = factory();
        let tgt = f.new_ticket_granting_ticket(Authentication::new("casuser"));
        let st = f.grant_service_ticket(&tgt, "https://app.example.org").unwrap();
        registry.add_ticket(tgt).await.unwrap();
        registry.add_ticket(st.clone()).await.unwrap();

        assert!(registry.get_ticket(&st.id, TicketKind::Service).await.is_ok());
        assert!(matches!(
            registry.get_ticket(&st.id, TicketKind::Service).await,
            Err(Error::InvalidTicket)
        ));
    }

    #[tokio::test]
    async fn expired_ticket_is_invalid_and_removed() {
        let registry = InMemoryTicketRegistry::new();
        let mut tgt = factory().new_ticket_granting_ticket(Authentication::new("casuser"));
        tgt.expiration_policy = ExpirationPolicy::TimeToLive { ttl_secs: 1 };
        tgt.creation_time = Utc::now() - chrono::TimeDelta::seconds(5);
        registry.add_ticket(tgt.clone()).await.unwrap();

        assert!(matches!(
            registry.get_ticket(&tgt.id, TicketKind::TicketGranting).await,
            Err(Error::InvalidTicket)
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn descendants_of_expired_session_are_invalid() {
        let registry = InMemoryTicketRegistry::new();
        let f = factory();
        let mut tgt = f.new_ticket_granting_ticket(Authentication::new("casuser"));
        // idle-expired session; the hard bound is still far away
        tgt.last_time_used = Utc::now() - chrono::TimeDelta::seconds(3600);
        let st = f.grant_service_ticket(&tgt, "https://app.example.org").unwrap();
        let pgt = f
            .grant_proxy_granting_ticket(&st, Authentication::new("casuser"))
            .unwrap();
        for ticket in [&tgt, &st, &pgt] {
            registry.add_ticket(ticket.clone()).await.unwrap();
        }

        // The PGT is fresh by its own policy but its session is gone.
        assert!(matches!(
            registry.get_ticket(&pgt.id, TicketKind::ProxyGranting).await,
            Err(Error::InvalidTicket)
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn grant_under_expired_session_cannot_be_redeemed() {
        let registry = InMemoryTicketRegistry::new();
        let f = factory();
        let mut tgt = f.new_ticket_granting_ticket(Authentication::new("casuser"));
        tgt.last_time_used = Utc::now() - chrono::TimeDelta::seconds(3600);
        let st = f.grant_service_ticket(&tgt, "https://app.example.org").unwrap();
        registry.add_ticket(tgt).await.unwrap();
        registry.add_ticket(st.clone()).await.unwrap();

        assert!(matches!(
            registry.get_ticket(&st.id, TicketKind::Service).await,
            Err(Error::InvalidTicket)
        ));
        assert!(registry.is_empty());
    }

    #[tokio::test]
    async fn delete_cascades_to_descendants() {
        let registry = InMemoryTicketRegistry::new();
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
        assert_eq!(removed, 4);
        assert!(registry.is_empty());
        assert!(matches!(
            registry.get_ticket(&pt.id, TicketKind::Proxy).await,
            Err(Error::InvalidTicket)
        ));
    }

    #[tokio::test]
    async fn update_requires_existing_ticket() {
        let registry = InMemoryTicketRegistry::new();
        let mut tgt = factory().new_ticket_granting_ticket(Authentication::new("casuser"));

        assert!(matches!(
            registry.update_ticket(tgt.clone()).await,
            Err(Error::InvalidTicket)
        ));

        registry.add_ticket(tgt.clone()).await.unwrap();
        tgt.touch();
        let updated = registry.update_ticket(tgt.clone()).await.unwrap();
        assert_eq!(updated.count_of_uses, 1);

        let fetched = registry
            .get_ticket(&tgt.id, TicketKind::TicketGranting)
            .await
            .unwrap();
        assert_eq!(fetched.count_of_uses, 1);
    }

    #[tokio::test]
    async fn get_tickets_filters_by_predicate() {
        let registry = InMemoryTicketRegistry::new();
        let f = factory();
        let tgt = f.new_ticket_granting_ticket(Authentication::new("casuser"));
        let st = f.grant_service_ticket(&tgt, "https://app.example.org").unwrap();
        registry.add_ticket(tgt).await.unwrap();
        registry.add_ticket(st).await.unwrap();

        let services: Vec<Ticket> = registry
            .get_tickets(Arc::new(|t: &Ticket| t.kind == TicketKind::Service))
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(services.len(), 1);

        let all: Vec<Ticket> = registry
            .get_tickets(any_ticket())
            .await
            .unwrap()
            .try_collect()
            .await
            .unwrap();
        assert_eq!(all.len(), 2);
    }

    #[tokio::test]
    async fn delete_all_clears_the_store() {
        let registry = InMemoryTicketRegistry::new();
        let f = factory();
        let tgt = f.new_ticket_granting_ticket(Authentication::new("casuser"));
        registry.add_ticket(tgt).await.unwrap();

        assert_eq!(registry.delete_all().await.unwrap(), 1);
        assert!(registry.is_empty());
    }
}
