//! Redis ticket registry.

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fred::prelude::*;
use fred::types::scan::Scanner;
use futures::stream::{self, BoxStream, StreamExt};
use futures::TryStreamExt;
use sso_core::{Error, Result};
use sso_registry::codec::{decode_ticket, encode_ticket};
use sso_registry::{TicketCipher, TicketPredicate, TicketRegistry};
use sso_ticket::{Ticket, TicketKind};

use crate::config::RedisConfig;
use crate::error::from_redis_error;

/// Ticket registry backed by Redis.
///
/// Each ticket is stored under its own key with an expiration set to the
/// policy's worst-case horizon, so Redis evicts expired records natively.
/// A per-granting-ticket set indexes children for cascade deletion, and
/// `GETDEL` makes single-use redemption a single atomic command.
pub struct RedisTicketRegistry {
    client: Client,
    config: RedisConfig,
    cipher: Arc<dyn TicketCipher>,
}

impl RedisTicketRegistry {
    /// Connects to Redis and creates a registry.
    ///
    /// ## Errors
    ///
    /// Returns an error if the connection cannot be established.
    pub async fn new(config: RedisConfig, cipher: Arc<dyn TicketCipher>) -> Result<Self> {
        let redis_config = Config::from_url(&config.connection_url())
            .map_err(|e| Error::Config(e.to_string()))?;

        let client = Client::new(
            redis_config,
            None,
            None,
            Some(ReconnectPolicy::new_exponential(0, 1000, 30_000, 2)),
        );

        client.init().await.map_err(from_redis_error)?;

        Ok(Self {
            client,
            config,
            cipher,
        })
    }

    /// Creates a registry over an already connected client.
    pub fn from_client(client: Client, config: RedisConfig, cipher: Arc<dyn TicketCipher>) -> Self {
        Self {
            client,
            config,
            cipher,
        }
    }

    /// Returns the underlying Redis client.
    #[must_use]
    pub const fn client(&self) -> &Client {
        &self.client
    }

    /// Collects keys from a scan pattern.
    async fn scan_keys(&self, pattern: &str) -> Result<Vec<String>> {
        let mut scanner = self.client.scan(pattern, None, None);
        let mut keys = Vec::new();

        while let Some(result) = scanner.try_next().await.map_err(from_redis_error)? {
            if let Some(page) = result.results() {
                for value in page {
                    if let Some(s) = value.as_str() {
                        keys.push(s.to_string());
                    }
                }
            }
        }

        Ok(keys)
    }

    fn expiration(ticket: &Ticket) -> Option<Expiration> {
        ticket
            .ttl_horizon(Utc::now())
            .map(|ttl| Expiration::EX(seconds_to_i64(ceil_secs(ttl).max(1))))
    }

    async fn load(&self, id: &str) -> Result<Option<Ticket>> {
        let bytes: Option<Vec<u8>> = self
            .client
            .get(self.config.ticket_key(id))
            .await
            .map_err(from_redis_error)?;
        match bytes {
            Some(bytes) => Ok(Some(decode_ticket(self.cipher.as_ref(), &bytes)?)),
            None => Ok(None),
        }
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

    /// Deletes one ticket and its child index, returning the ids its
    /// index named and how many records went away.
    async fn delete_node(&self, id: &str) -> Result<(Vec<String>, u64)> {
        let children: Vec<String> = self
            .client
            .smembers(self.config.children_key(id))
            .await
            .map_err(from_redis_error)?;

        let deleted: i64 = self
            .client
            .del(self.config.ticket_key(id))
            .await
            .map_err(from_redis_error)?;
        let _index: i64 = self
            .client
            .del(self.config.children_key(id))
            .await
            .map_err(from_redis_error)?;
        Ok((children, u64::try_from(deleted).unwrap_or(0)))
    }

    /// Records `child` in its parent's child index.
    ///
    /// The index inherits the parent record's remaining TTL so orphaned
    /// index sets do not accumulate.
    async fn index_child(&self, parent: &str, child: &str) -> Result<()> {
        let children = self.config.children_key(parent);
        let _added: i64 = self
            .client
            .sadd(&children, child)
            .await
            .map_err(from_redis_error)?;

        let parent_ttl: i64 = self
            .client
            .ttl(self.config.ticket_key(parent))
            .await
            .map_err(from_redis_error)?;
        if parent_ttl > 0 {
            let _applied: bool = self
                .client
                .expire(&children, parent_ttl, None)
                .await
                .map_err(from_redis_error)?;
        }
        Ok(())
    }

    async fn unindex_child(&self, parent: &str, child: &str) -> Result<()> {
        let _removed: i64 = self
            .client
            .srem(self.config.children_key(parent), child)
            .await
            .map_err(from_redis_error)?;
        Ok(())
    }
}

/// Safely convert seconds to i64 for Redis expiration.
#[allow(clippy::cast_possible_wrap)]
const fn seconds_to_i64(seconds: u64) -> i64 {
    seconds as i64
}

/// Rounds a TTL up to whole seconds so native expiry never undershoots
/// the policy's bound.
const fn ceil_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs();
    if ttl.subsec_nanos() > 0 {
        secs + 1
    } else {
        secs
    }
}

#[async_trait]
impl TicketRegistry for RedisTicketRegistry {
    async fn add_ticket(&self, ticket: Ticket) -> Result<()> {
        let key = self.config.ticket_key(&ticket.id);
        let bytes = encode_ticket(self.cipher.as_ref(), &ticket)?;

        let stored: Option<String> = self
            .client
            .set(&key, bytes, Self::expiration(&ticket), Some(SetOptions::NX), false)
            .await
            .map_err(from_redis_error)?;
        if stored.is_none() {
            return Err(Error::CreationConflict(ticket.id));
        }

        if let Some(parent) = &ticket.parent_id {
            if let Err(e) = self.index_child(parent, &ticket.id).await {
                // Roll back the stored record so a failed add does not
                // leave an un-indexed ticket behind.
                if let Err(cleanup) = self.client.del::<i64, _>(&key).await {
                    tracing::warn!(id = %ticket.id, error = %cleanup, "failed to roll back stored ticket");
                }
                return Err(e);
            }
        }
        Ok(())
    }

    async fn get_ticket(&self, id: &str, kind: TicketKind) -> Result<Ticket> {
        if !kind.matches_id(id) {
            return Err(Error::InvalidTicket);
        }
        let key = self.config.ticket_key(id);
        let now = Utc::now();

        if kind.is_single_use() {
            // GETDEL is the redemption: one atomic command, one winner.
            let bytes: Option<Vec<u8>> =
                self.client.getdel(&key).await.map_err(from_redis_error)?;
            let ticket = decode_ticket(
                self.cipher.as_ref(),
                &bytes.ok_or(Error::InvalidTicket)?,
            )?;
            if let Some(parent) = &ticket.parent_id {
                self.unindex_child(parent, id).await?;
            }
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

        let bytes: Option<Vec<u8>> = self.client.get(&key).await.map_err(from_redis_error)?;
        let ticket = decode_ticket(self.cipher.as_ref(), &bytes.ok_or(Error::InvalidTicket)?)?;
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
        let key = self.config.ticket_key(&ticket.id);
        let count: i64 = self.client.exists(&key).await.map_err(from_redis_error)?;
        if count == 0 {
            return Err(Error::InvalidTicket);
        }

        let bytes = encode_ticket(self.cipher.as_ref(), &ticket)?;
        self.client
            .set::<(), _, _>(&key, bytes, Self::expiration(&ticket), None, false)
            .await
            .map_err(from_redis_error)?;
        Ok(ticket)
    }

    async fn delete_ticket(&self, id: &str) -> Result<u64> {
        let mut removed = 0u64;
        let mut pending = vec![id.to_string()];
        let mut seen = HashSet::new();

        while let Some(current) = pending.pop() {
            if !seen.insert(current.clone()) {
                continue;
            }
            match self.delete_node(&current).await {
                Ok((children, deleted)) => {
                    pending.extend(children);
                    removed += deleted;
                }
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
        let tickets = self.scan_keys(&self.config.ticket_key("*")).await?;
        let indexes = self.scan_keys(&self.config.children_key("*")).await?;

        let count = tickets.len() as u64;
        for keys in [tickets, indexes] {
            if !keys.is_empty() {
                self.client
                    .del::<(), _>(keys)
                    .await
                    .map_err(from_redis_error)?;
            }
        }
        Ok(count)
    }

    async fn get_tickets(
        &self,
        predicate: TicketPredicate,
    ) -> Result<BoxStream<'static, Result<Ticket>>> {
        let keys = self.scan_keys(&self.config.ticket_key("*")).await?;
        let client = self.client.clone();
        let cipher = Arc::clone(&self.cipher);
        // Keys come from one scan pass; records are fetched and decoded
        // only as the stream is polled.
        let stream = stream::iter(keys)
            .filter_map(move |key| {
                let client = client.clone();
                let cipher = Arc::clone(&cipher);
                let predicate = Arc::clone(&predicate);
                async move {
                    let bytes: std::result::Result<Option<Vec<u8>>, _> = client.get(&key).await;
                    match bytes {
                        Ok(Some(bytes)) => match decode_ticket(cipher.as_ref(), &bytes) {
                            Ok(ticket) if predicate(&ticket) => Some(Ok(ticket)),
                            // A record that fails to decode is skipped, not
                            // surfaced; the reaper would otherwise stall on it.
                            Ok(_) | Err(_) => None,
                        },
                        Ok(None) => None,
                        Err(e) => Some(Err(from_redis_error(e))),
                    }
                }
            })
            .boxed();
        Ok(stream)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_rounds_partial_seconds_up() {
        assert_eq!(ceil_secs(Duration::from_millis(9500)), 10);
        assert_eq!(ceil_secs(Duration::from_secs(10)), 10);
        assert_eq!(ceil_secs(Duration::ZERO), 0);
    }
}
