//! Ticket registry contract.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::stream::BoxStream;
use sso_core::Result;
use sso_ticket::{Ticket, TicketKind};

/// Predicate over tickets, used for lazy registry queries.
pub type TicketPredicate = Arc<dyn Fn(&Ticket) -> bool + Send + Sync>;

/// Predicate matching every ticket.
#[must_use]
pub fn any_ticket() -> TicketPredicate {
    Arc::new(|_| true)
}

/// Predicate matching tickets whose policy reports them expired at `now`.
#[must_use]
pub fn expired_at(now: DateTime<Utc>) -> TicketPredicate {
    Arc::new(move |ticket| ticket.is_expired(now))
}

/// The storage-agnostic contract every registry backend implements.
///
/// Implementations must be thread-safe; operations are invoked
/// concurrently from request-handling tasks with no global serialization
/// point. Backends may block on network I/O and surface failures as
/// [`sso_core::Error::Unavailable`].
#[async_trait]
pub trait TicketRegistry: Send + Sync {
    /// Stores a newly created ticket.
    ///
    /// ## Errors
    ///
    /// Returns `CreationConflict` if a ticket with the same id already
    /// exists; the registry never silently overwrites on add.
    async fn add_ticket(&self, ticket: Ticket) -> Result<()>;

    /// Fetches a ticket by id, checking kind and expiration.
    ///
    /// For single-use kinds (service and proxy tickets) a successful call
    /// is a redemption: the ticket is consumed atomically as part of this
    /// operation, and exactly one of any set of concurrent redeemers
    /// wins. The kind is matched against the id prefix before storage is
    /// touched, so a wrong-kind lookup can never consume another kind's
    /// record.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidTicket` if the ticket is absent, expired by its
    /// policy, already consumed, or of the wrong kind.
    async fn get_ticket(&self, id: &str, kind: TicketKind) -> Result<Ticket>;

    /// Persists mutated ticket fields (use count, last-used time).
    ///
    /// Last-writer-wins under concurrent updates; concurrent grants under
    /// the same granting ticket are recorded as independent child records
    /// and are not lost to this.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidTicket` if no ticket with this id exists.
    async fn update_ticket(&self, ticket: Ticket) -> Result<Ticket>;

    /// Removes a ticket and every ticket descending from it.
    ///
    /// Returns the number of tickets actually removed. Deleting an absent
    /// ticket still cascades over any orphaned descendants and is
    /// otherwise a no-op, which keeps retries after partial failures
    /// idempotent.
    async fn delete_ticket(&self, id: &str) -> Result<u64>;

    /// Removes every ticket. Administrative use only.
    async fn delete_all(&self) -> Result<u64>;

    /// Returns a lazy, finite stream of tickets matching the predicate.
    ///
    /// Each call starts a fresh iteration. Backends with native
    /// iteration fetch records as the stream is polled rather than
    /// materializing the store.
    async fn get_tickets(
        &self,
        predicate: TicketPredicate,
    ) -> Result<BoxStream<'static, Result<Ticket>>>;
}
