//! # sso-registry
//!
//! The ticket registry: the storage-agnostic contract every backend
//! implements, plus the adapters and mechanisms that let many server
//! processes share a consistent view of ticket state.
//!
//! ## Contract
//!
//! - [`TicketRegistry`] - CRUD + lazy query over tickets
//!
//! ## Adapters
//!
//! - [`InMemoryTicketRegistry`] - single-process reference adapter
//! - [`ClusterMapTicketRegistry`] - adapter over a cluster-aware map
//! - [`ReplicatedTicketRegistry`] - local cache kept in sync over a
//!   message bus
//!
//! A key-value adapter with native TTL lives in `sso-registry-redis`.
//!
//! ## Mechanisms
//!
//! - [`LockRepository`] - distributed mutual exclusion for maintenance
//! - [`TicketCipher`] - optional at-rest encryption of serialized tickets
//! - [`MessageBus`] / [`ReplicationCommand`] - mutation replication
//! - [`TicketReaper`] - periodic eviction of expired tickets

#![forbid(unsafe_code)]
#![deny(warnings)]
#![deny(missing_docs)]

pub mod cipher;
pub mod cluster_map;
pub mod codec;
pub mod lock;
pub mod memory;
pub mod reaper;
pub mod registry;
pub mod replicated;
pub mod replication;

pub use cipher::{AesGcmTicketCipher, NoOpTicketCipher, TicketCipher};
pub use cluster_map::{ClusterMap, ClusterMapTicketRegistry, LocalClusterMap};
pub use lock::{InMemoryLockRepository, LockRepository, NoOpLockRepository};
pub use memory::InMemoryTicketRegistry;
pub use reaper::{ReaperHandle, TicketReaper, CLEANER_LOCK_NAME};
pub use registry::{any_ticket, expired_at, TicketPredicate, TicketRegistry};
pub use replicated::ReplicatedTicketRegistry;
pub use replication::{
    CommandKind, LocalMessageBus, MessageBus, MessageHandler, ReplicationCommand,
};
