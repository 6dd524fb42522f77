//! Registry adapter over a cluster-aware byte map.
//!
//! Covers backends shaped like a distributed map: string keys, opaque
//! byte values, per-entry TTL, atomic put-if-absent and remove. The
//! adapter layers the registry semantics (conflict checks, single-use
//! redemption, cascade delete) on those primitives.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use futures::stream::{self, BoxStream, StreamExt};
use sso_core::{Error, Result};
use sso_ticket::{Ticket, TicketKind};

use crate::cipher::TicketCipher;
use crate::codec::{decode_ticket, encode_ticket};
use crate::registry::{TicketPredicate, TicketRegistry};

/// Minimal cluster map the adapter is written against.
///
/// Implementations wrap an external data grid; [`LocalClusterMap`] is a
/// single-process stand-in for tests and embedded deployments.
#[async_trait]
pub trait ClusterMap: Send + Sync {
    /// Fetches the value stored under `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Stores `value` under `key`, replacing any existing value.
    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()>;

    /// Stores `value` under `key` only if the key is absent.
    ///
    /// Returns whether the value was stored. Must be atomic with respect
    /// to concurrent puts for the same key.
    async fn put_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>)
        -> Result<bool>;

    /// Removes `key`, returning the value it held.
    ///
    /// Must be atomic: of any set of concurrent removers for the same
    /// key, exactly one receives the value.
    async fn remove(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// Snapshot of the keys currently stored.
    async fn keys(&self) -> Result<Vec<String>>;

    /// Removes every entry, returning how many were removed.
    async fn clear(&self) -> Result<u64>;
}

/// Single-process [`ClusterMap`] with lazy TTL enforcement.
#[derive(Debug, Default)]
pub struct LocalClusterMap {
    entries: DashMap<String, (Vec<u8>, Option<Instant>)>,
}

impl LocalClusterMap {
    /// Creates an empty map.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn deadline(ttl: Option<Duration>) -> Option<Instant> {
        ttl.map(|ttl| Instant::now() + ttl)
    }

    fn is_live(deadline: Option<Instant>) -> bool {
        deadline.is_none_or(|deadline| Instant::now() < deadline)
    }
}

#[async_trait]
impl ClusterMap for LocalClusterMap {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        // Copy the entry out before matching so the shard guard is not
        // held across the `remove` in the expired arm.
        let entry = self
            .entries
            .get(key)
            .map(|entry| (entry.value().0.clone(), entry.value().1));
        match entry {
            Some((value, deadline)) if Self::is_live(deadline) => Ok(Some(value)),
            Some(_) => {
                drop(self.entries.remove(key));
                Ok(None)
            }
            None => Ok(None),
        }
    }

    async fn put(&self, key: &str, value: Vec<u8>, ttl: Option<Duration>) -> Result<()> {
        self.entries
            .insert(key.to_string(), (value, Self::deadline(ttl)));
        Ok(())
    }

    async fn put_if_absent(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<Duration>,
    ) -> Result<bool> {
        // An expired entry no longer occupies the slot.
        let live = self
            .entries
            .get(key)
            .is_some_and(|entry| Self::is_live(entry.value().1));
        if !live {
            self.entries.remove(key);
        }
        match self.entries.entry(key.to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => Ok(false),
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert((value, Self::deadline(ttl)));
                Ok(true)
            }
        }
    }

    async fn remove(&self, key: &str) -> Result<Option<Vec<u8>>> {
        Ok(self
            .entries
            .remove(key)
            .filter(|(_, (_, deadline))| Self::is_live(*deadline))
            .map(|(_, (value, _))| value))
    }

    async fn keys(&self) -> Result<Vec<String>> {
        self.entries
            .retain(|_, (_, deadline)| Self::is_live(*deadline));
        Ok(self.entries.iter().map(|entry| entry.key().clone()).collect())
    }

    async fn clear(&self) -> Result<u64> {
        let removed = self.entries.len() as u64;
        self.entries.clear();
        Ok(removed)
    }
}

/// Ticket registry over a [`ClusterMap`].
///
/// Entries carry the ticket's worst-case TTL so the map can evict on its
/// own; the policy is still evaluated on every read, since the horizon
/// only bounds the lifetime from above.
pub struct ClusterMapTicketRegistry {
    map: Arc<dyn ClusterMap>,
    cipher: Arc<dyn TicketCipher>,
}

impl ClusterMapTicketRegistry {
    /// Creates a registry over the given map and cipher.
    pub fn new(map: Arc<dyn ClusterMap>, cipher: Arc<dyn TicketCipher>) -> Self {
        Self { map, cipher }
    }

    async fn load(&self, id: &str) -> Result<Option<Ticket>> {
        match self.map.get(id).await? {
            Some(bytes) => Ok(Some(decode_ticket(self.cipher.as_ref(), &bytes)?)),
            None => Ok(None),
        }
    }

    /// Resolves `root` plus every stored ticket whose parent chain
    /// reaches it. Undecodable records are skipped.
    async fn with_descendants(&self, root: &str) -> Result<Vec<String>> {
        let mut links: Vec<(String, Option<String>)> = Vec::new();
        for key in self.map.keys().await? {
            if let Some(bytes) = self.map.get(&key).await? {
                if let Ok(ticket) = decode_ticket(self.cipher.as_ref(), &bytes) {
                    links.push((key, ticket.parent_id));
                }
            }
        }

        let mut ordered = vec![root.to_string()];
        let mut cursor = 0;
        while cursor < ordered.len() {
            let parent = ordered[cursor].clone();
            for (id, parent_id) in &links {
                if parent_id.as_deref() == Some(parent.as_str()) && !ordered.contains(id) {
                    ordered.push(id.clone());
                }
            }
            cursor += 1;
        }
        Ok(ordered)
    }

    /// Finds the nearest ancestor that is absent or expired, if any.
    ///
    /// A ticket is only as valid as its granting chain: the moment a
    /// session expires, every descendant is unusable, whatever its own
    /// policy says.
    async fn broken_ancestor(
        &self,
        ticket: &Ticket,
        now: DateTime<Utc>,
    ) -> Result<Option<String>> {
        let mut parent = ticket.parent_id.clone();
        let mut seen = HashSet::new();
        while let Some(id) = parent {
            if !seen.insert(id.clone()) {
                return Ok(Some(id));
            }
            match self.load(&id).await? {
                None => return Ok(Some(id)),
                Some(ancestor) if ancestor.is_expired(now) => return Ok(Some(id)),
                Some(ancestor) => parent = ancestor.parent_id,
            }
        }
        Ok(None)
    }
}

#[async_trait]
impl TicketRegistry for ClusterMapTicketRegistry {
    async fn add_ticket(&self, ticket: Ticket) -> Result<()> {
        let bytes = encode_ticket(self.cipher.as_ref(), &ticket)?;
        let ttl = ticket.ttl_horizon(Utc::now());
        if self.map.put_if_absent(&ticket.id, bytes, ttl).await? {
            Ok(())
        } else {
            Err(Error::CreationConflict(ticket.id))
        }
    }

    async fn get_ticket(&self, id: &str, kind: TicketKind) -> Result<Ticket> {
        if !kind.matches_id(id) {
            return Err(Error::InvalidTicket);
        }
        let now = Utc::now();

        if kind.is_single_use() {
            // The map's atomic remove is the redemption.
            let bytes = self.map.remove(id).await?.ok_or(Error::InvalidTicket)?;
            let ticket = decode_ticket(self.cipher.as_ref(), &bytes)?;
            if ticket.kind != kind || ticket.is_expired(now) {
                return Err(Error::InvalidTicket);
            }
            if let Some(ancestor) = self.broken_ancestor(&ticket, now).await? {
                let removed = self.delete_ticket(&ancestor).await?;
                tracing::debug!(id, %ancestor, removed, "rejected ticket under expired session");
                return Err(Error::InvalidTicket);
            }
            return Ok(ticket);
        }

        let ticket = self.load(id).await?.ok_or(Error::InvalidTicket)?;
        if ticket.kind != kind {
            return Err(Error::InvalidTicket);
        }
        if ticket.is_expired(now) {
            let removed = self.delete_ticket(id).await?;
            tracing::debug!(id, removed, "removed expired ticket on read");
            return Err(Error::InvalidTicket);
        }
        if let Some(ancestor) = self.broken_ancestor(&ticket, now).await? {
            let removed = self.delete_ticket(&ancestor).await?;
            tracing::debug!(id, %ancestor, removed, "rejected ticket under expired session");
            return Err(Error::InvalidTicket);
        }
        Ok(ticket)
    }

    async fn update_ticket(&self, ticket: Ticket) -> Result<Ticket> {
        if self.map.get(&ticket.id).await?.is_none() {
            return Err(Error::InvalidTicket);
        }
        let bytes = encode_ticket(self.cipher.as_ref(), &ticket)?;
        let ttl = ticket.ttl_horizon(Utc::now());
        self.map.put(&ticket.id, bytes, ttl).await?;
        Ok(ticket)
    }

    async fn delete_ticket(&self, id: &str) -> Result<u64> {
        let mut removed = 0u64;
        for ticket_id in self.with_descendants(id).await? {
            match self.map.remove(&ticket_id).await {
                Ok(Some(_)) => removed += 1,
                Ok(None) => {}
                // Partial cascade: report what was removed; re-deleting is
                // idempotent and the reaper converges on the remainder.
                Err(e) if removed > 0 => {
                    tracing::warn!(id, error = %e, removed, "cascade delete interrupted");
                    return Ok(removed);
                }
                Err(e) => return Err(e),
            }
        }
        Ok(removed)
    }

    async fn delete_all(&self) -> Result<u64> {
        self.map.clear().await
    }

    async fn get_tickets(
        &self,
        predicate: TicketPredicate,
    ) -> Result<BoxStream<'static, Result<Ticket>>> {
        let keys = self.map.keys().await?;
        let map = Arc::clone(&self.map);
        let cipher = Arc::clone(&self.cipher);
        // Keys are snapshotted; payloads are fetched as the stream is
        // polled, so the full store is never materialized.
        let stream = stream::iter(keys)
            .filter_map(move |key| {
                let map = Arc::clone(&map);
                let cipher = Arc::clone(&cipher);
                let predicate = Arc::clone(&predicate);
                async move {
                    match map.get(&key).await {
                        Ok(Some(bytes)) => match decode_ticket(cipher.as_ref(), &bytes) {
                            Ok(ticket) if predicate(&ticket) => Some(Ok(ticket)),
                            Ok(_) | Err(Error::InvalidTicket) => None,
                            Err(e) => Some(Err(e)),
                        },
                        Ok(None) => None,
                        Err(e) => Some(Err(e)),
                    }
                }
            })
            .boxed();
        Ok(stream)
    }
}
