//! Bus-replicated local-cache registry.
//!
//! Every node serves reads from its own in-memory store and broadcasts
//! its mutations over a [`MessageBus`]; peer commands are applied
//! idempotently on arrival. Reads are local and fast, writes converge
//! eventually. Policy data travels with each ticket, so every node
//! evaluates expiration identically without coordination.

use std::sync::Arc;

use async_trait::async_trait;
use futures::stream::BoxStream;
use sso_core::Result;
use sso_ticket::{Ticket, TicketKind};
use uuid::Uuid;

use crate::cipher::TicketCipher;
use crate::codec::{decode_ticket, encode_ticket};
use crate::memory::InMemoryTicketRegistry;
use crate::registry::{TicketPredicate, TicketRegistry};
use crate::replication::{CommandKind, MessageBus, MessageHandler, ReplicationCommand};

/// Registry that keeps a local store in sync with its peers over a bus.
///
/// Publish failures are logged and do not fail the local operation; the
/// local node stays correct and peers converge through later commands
/// and the reaper.
pub struct ReplicatedTicketRegistry {
    local: InMemoryTicketRegistry,
    bus: Arc<dyn MessageBus>,
    cipher: Arc<dyn TicketCipher>,
    topic: String,
    publisher_id: Uuid,
}

impl ReplicatedTicketRegistry {
    /// Creates a node with an empty local store and a fresh publisher id.
    pub fn new(
        bus: Arc<dyn MessageBus>,
        cipher: Arc<dyn TicketCipher>,
        topic: impl Into<String>,
    ) -> Self {
        Self {
            local: InMemoryTicketRegistry::new(),
            bus,
            cipher,
            topic: topic.into(),
            publisher_id: Uuid::now_v7(),
        }
    }

    /// Subscribes this node to peer commands. Call once before serving.
    ///
    /// ## Errors
    ///
    /// Returns `Replication` if the bus rejects the subscription.
    pub async fn start(&self) -> Result<()> {
        let applier = Arc::new(CommandApplier {
            local: self.local.clone(),
            cipher: Arc::clone(&self.cipher),
            publisher_id: self.publisher_id,
        });
        self.bus.subscribe(&self.topic, applier).await
    }

    /// This node's publisher id, as stamped on its commands.
    #[must_use]
    pub const fn publisher_id(&self) -> Uuid {
        self.publisher_id
    }

    async fn publish(&self, command: ReplicationCommand) {
        let result = match command.to_bytes() {
            Ok(bytes) => self.bus.publish(&self.topic, bytes).await,
            Err(e) => Err(e),
        };
        if let Err(e) = result {
            tracing::warn!(
                topic = %self.topic,
                error = %e,
                "failed to replicate registry mutation"
            );
        }
    }
}

#[async_trait]
impl TicketRegistry for ReplicatedTicketRegistry {
    async fn add_ticket(&self, ticket: Ticket) -> Result<()> {
        self.local.add_ticket(ticket.clone()).await?;
        let bytes = encode_ticket(self.cipher.as_ref(), &ticket)?;
        self.publish(ReplicationCommand::add(self.publisher_id, bytes))
            .await;
        Ok(())
    }

    async fn get_ticket(&self, id: &str, kind: TicketKind) -> Result<Ticket> {
        let ticket = self.local.get_ticket(id, kind).await?;
        if kind.is_single_use() {
            // The local remove was the redemption; peers must drop their
            // copies so the ticket cannot be redeemed again elsewhere.
            self.publish(ReplicationCommand::delete(self.publisher_id, id))
                .await;
        }
        Ok(ticket)
    }

    async fn update_ticket(&self, ticket: Ticket) -> Result<Ticket> {
        let updated = self.local.update_ticket(ticket).await?;
        let bytes = encode_ticket(self.cipher.as_ref(), &updated)?;
        self.publish(ReplicationCommand::update(self.publisher_id, bytes))
            .await;
        Ok(updated)
    }

    async fn delete_ticket(&self, id: &str) -> Result<u64> {
        let removed = self.local.delete_ticket(id).await?;
        self.publish(ReplicationCommand::delete(self.publisher_id, id))
            .await;
        Ok(removed)
    }

    async fn delete_all(&self) -> Result<u64> {
        // Administrative and local only; each node clears its own store.
        self.local.delete_all().await
    }

    async fn get_tickets(
        &self,
        predicate: TicketPredicate,
    ) -> Result<BoxStream<'static, Result<Ticket>>> {
        self.local.get_tickets(predicate).await
    }
}

/// Applies peer commands to the local store.
struct CommandApplier {
    local: InMemoryTicketRegistry,
    cipher: Arc<dyn TicketCipher>,
    publisher_id: Uuid,
}

#[async_trait]
impl MessageHandler for CommandApplier {
    async fn on_message(&self, topic: &str, payload: &[u8]) -> Result<()> {
        let command = ReplicationCommand::from_bytes(payload)?;
        if command.publisher_id == self.publisher_id {
            return Ok(());
        }

        match command.command {
            CommandKind::Add | CommandKind::Update => {
                let ticket = decode_ticket(self.cipher.as_ref(), &command.payload)?;
                tracing::debug!(topic, id = %ticket.id, kind = ?command.command, "applying peer command");
                // Upsert for both kinds keeps redelivered and reordered
                // commands idempotent.
                self.local.upsert(ticket);
            }
            CommandKind::Delete => {
                let id = std::str::from_utf8(&command.payload)
                    .map_err(|e| sso_core::Error::Replication(e.to_string()))?;
                let removed = self.local.delete_ticket(id).await?;
                tracing::debug!(topic, id, removed, "applied peer delete");
            }
        }
        Ok(())
    }
}
