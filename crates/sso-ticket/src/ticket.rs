//! Ticket model shared by every registry backend.
//!
//! A single `Ticket` struct carries the fields common to all kinds plus
//! the kind-specific optionals; code dispatches by matching on the
//! [`TicketKind`] discriminator rather than by runtime type inspection.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::authentication::Authentication;
use crate::expiration::ExpirationPolicy;

/// Discriminator for the ticket kinds the registry stores.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TicketKind {
    /// Ticket-granting ticket: the established SSO session.
    TicketGranting,
    /// Service ticket: short-lived, single-use grant for one service.
    Service,
    /// Proxy-granting ticket: lets a service request tickets on the
    /// user's behalf.
    ProxyGranting,
    /// Proxy ticket: single-use grant issued from a proxy-granting ticket.
    Proxy,
}

impl TicketKind {
    /// The id prefix for this kind.
    #[must_use]
    pub const fn prefix(&self) -> &'static str {
        match self {
            Self::TicketGranting => "TGT",
            Self::Service => "ST",
            Self::ProxyGranting => "PGT",
            Self::Proxy => "PT",
        }
    }

    /// Whether tickets of this kind are consumed by their first
    /// successful redemption.
    #[must_use]
    pub const fn is_single_use(&self) -> bool {
        matches!(self, Self::Service | Self::Proxy)
    }

    /// Whether tickets of this kind may grant descendant tickets.
    #[must_use]
    pub const fn grants_tickets(&self) -> bool {
        matches!(self, Self::TicketGranting | Self::ProxyGranting)
    }

    /// Whether the given ticket id carries this kind's prefix.
    ///
    /// Checked before any store access so a lookup for the wrong kind can
    /// never touch (or consume) another kind's record.
    #[must_use]
    pub fn matches_id(&self, id: &str) -> bool {
        let prefix = self.prefix();
        id.len() > prefix.len()
            && id.starts_with(prefix)
            && id.as_bytes()[prefix.len()] == b'-'
    }

    /// Infers the kind from a ticket id prefix.
    #[must_use]
    pub fn from_id(id: &str) -> Option<Self> {
        [
            Self::TicketGranting,
            Self::ProxyGranting,
            Self::Proxy,
            Self::Service,
        ]
        .into_iter()
        .find(|kind| kind.matches_id(id))
    }
}

/// A ticket record.
///
/// Lifecycle: created by the catalog, valid until its policy expires it,
/// consumed on first redemption for single-use kinds, and removed by
/// explicit deletion, read-time expiry, or the background reaper.
/// `count_of_uses` and `last_time_used` are mutated only through the
/// registry's update path.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    /// Opaque, globally unique identifier, prefixed by kind.
    pub id: String,
    /// Kind discriminator.
    pub kind: TicketKind,
    /// When the ticket was created.
    pub creation_time: DateTime<Utc>,
    /// When the ticket was last used.
    pub last_time_used: DateTime<Utc>,
    /// How many times the ticket has been used.
    pub count_of_uses: u64,
    /// The policy deciding when this ticket expires.
    pub expiration_policy: ExpirationPolicy,
    /// Id of the ticket that granted this one, if any.
    pub parent_id: Option<String>,
    /// Identity bound to the ticket (TGT/PGT only).
    pub authentication: Option<Authentication>,
    /// The service this ticket was granted for (ST/PT only).
    pub service: Option<String>,
}

impl Ticket {
    /// Creates a new ticket of the given kind.
    #[must_use]
    pub fn new(id: impl Into<String>, kind: TicketKind, policy: ExpirationPolicy) -> Self {
        let now = Utc::now();
        Self {
            id: id.into(),
            kind,
            creation_time: now,
            last_time_used: now,
            count_of_uses: 0,
            expiration_policy: policy,
            parent_id: None,
            authentication: None,
            service: None,
        }
    }

    /// Sets the granting ticket id.
    #[must_use]
    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Sets the authentication payload.
    #[must_use]
    pub fn with_authentication(mut self, authentication: Authentication) -> Self {
        self.authentication = Some(authentication);
        self
    }

    /// Sets the granted service identifier.
    #[must_use]
    pub fn with_service(mut self, service: impl Into<String>) -> Self {
        self.service = Some(service.into());
        self
    }

    /// Records a use of the ticket.
    ///
    /// Callers persist the mutation through the registry's update path;
    /// nothing here touches storage.
    pub fn touch(&mut self) {
        self.count_of_uses += 1;
        self.last_time_used = Utc::now();
    }

    /// Whether this ticket's policy reports it expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expiration_policy.is_expired(self, now)
    }

    /// Worst-case remaining lifetime at `now`, for backends with native
    /// record expiry. `None` means the policy places no time bound.
    #[must_use]
    pub fn ttl_horizon(&self, now: DateTime<Utc>) -> Option<Duration> {
        self.expiration_policy.max_horizon(self, now)
    }

    /// Whether the ticket may be redeemed more than once.
    #[must_use]
    pub const fn is_single_use(&self) -> bool {
        self.kind.is_single_use()
    }
}
