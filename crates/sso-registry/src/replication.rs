//! Mutation replication over a publish/subscribe bus.
//!
//! Each registry mutation becomes a [`ReplicationCommand`] published to a
//! shared topic; every node subscribes and applies peer commands to its
//! local store. Commands are idempotent, so redelivery is harmless, and
//! each carries the publisher's id so a node can skip its own echoes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sso_core::{Error, Result};
use tokio::sync::broadcast;
use uuid::Uuid;

const CHANNEL_CAPACITY: usize = 1024;

/// The kind of mutation a replication command carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CommandKind {
    /// A ticket was added.
    Add,
    /// A ticket was updated.
    Update,
    /// A ticket (and its descendants) was deleted.
    Delete,
}

/// One replicated registry mutation.
///
/// For `Add` and `Update` the payload is the serialized (and possibly
/// sealed) ticket; for `Delete` it is the UTF-8 ticket id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReplicationCommand {
    /// What happened.
    pub command: CommandKind,
    /// Which node published the command.
    pub publisher_id: Uuid,
    /// Command payload, interpreted per [`CommandKind`].
    pub payload: Vec<u8>,
    /// When the command was published.
    pub timestamp: DateTime<Utc>,
}

impl ReplicationCommand {
    fn new(command: CommandKind, publisher_id: Uuid, payload: Vec<u8>) -> Self {
        Self {
            command,
            publisher_id,
            payload,
            timestamp: Utc::now(),
        }
    }

    /// Command announcing an added ticket.
    #[must_use]
    pub fn add(publisher_id: Uuid, ticket_bytes: Vec<u8>) -> Self {
        Self::new(CommandKind::Add, publisher_id, ticket_bytes)
    }

    /// Command announcing an updated ticket.
    #[must_use]
    pub fn update(publisher_id: Uuid, ticket_bytes: Vec<u8>) -> Self {
        Self::new(CommandKind::Update, publisher_id, ticket_bytes)
    }

    /// Command announcing a deleted ticket id.
    #[must_use]
    pub fn delete(publisher_id: Uuid, ticket_id: &str) -> Self {
        Self::new(
            CommandKind::Delete,
            publisher_id,
            ticket_id.as_bytes().to_vec(),
        )
    }

    /// Serializes the command for the wire.
    ///
    /// ## Errors
    ///
    /// Returns `Replication` if serialization fails.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(self).map_err(|e| Error::Replication(e.to_string()))
    }

    /// Parses a command off the wire.
    ///
    /// ## Errors
    ///
    /// Returns `Replication` for malformed messages.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes).map_err(|e| Error::Replication(e.to_string()))
    }
}

/// Receives messages delivered on a subscribed topic.
#[async_trait]
pub trait MessageHandler: Send + Sync {
    /// Handles one delivered message.
    async fn on_message(&self, topic: &str, payload: &[u8]) -> Result<()>;
}

/// Publish/subscribe transport for replication commands.
///
/// Delivery is at-least-once and best-effort ordered; subscribers must
/// tolerate redelivery and missing messages.
#[async_trait]
pub trait MessageBus: Send + Sync {
    /// Publishes a message to every subscriber of `topic`.
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()>;

    /// Registers a handler for messages on `topic`.
    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<()>;
}

/// In-process [`MessageBus`] over broadcast channels.
///
/// Connects registries sharing one process, and stands in for an
/// external broker in tests.
#[derive(Debug, Default)]
pub struct LocalMessageBus {
    topics: DashMap<String, broadcast::Sender<Vec<u8>>>,
}

impl LocalMessageBus {
    /// Creates a bus with no topics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn sender(&self, topic: &str) -> broadcast::Sender<Vec<u8>> {
        self.topics
            .entry(topic.to_string())
            .or_insert_with(|| broadcast::channel(CHANNEL_CAPACITY).0)
            .clone()
    }
}

#[async_trait]
impl MessageBus for LocalMessageBus {
    async fn publish(&self, topic: &str, payload: Vec<u8>) -> Result<()> {
        // A send with no subscribers is not a failure.
        drop(self.sender(topic).send(payload));
        Ok(())
    }

    async fn subscribe(&self, topic: &str, handler: Arc<dyn MessageHandler>) -> Result<()> {
        let mut receiver = self.sender(topic).subscribe();
        let topic = topic.to_string();
        tokio::spawn(async move {
            loop {
                match receiver.recv().await {
                    Ok(payload) => {
                        if let Err(e) = handler.on_message(&topic, &payload).await {
                            tracing::warn!(topic, error = %e, "message handler failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        tracing::warn!(topic, skipped, "subscriber lagged behind the bus");
                    }
                    Err(broadcast::error::RecvError::Closed) => break,
                }
            }
        });
        Ok(())
    }
}
