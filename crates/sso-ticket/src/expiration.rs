//! Expiration policies.
//!
//! Pure strategy values that decide, from a ticket's timestamps and use
//! count, whether it is still valid. Policies carry no per-ticket state;
//! everything they need lives on the ticket itself, so evaluation is
//! monotonic in time for a fixed ticket state.

use std::time::Duration;

use chrono::{DateTime, TimeDelta, Utc};
use serde::{Deserialize, Serialize};

use crate::ticket::Ticket;

/// Strategy deciding ticket validity.
///
/// Serialized onto each ticket as its `expiration_policy` descriptor, so
/// every node evaluates the same policy regardless of which node minted
/// the ticket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ExpirationPolicy {
    /// Never expires. Used for non-expiring delegated tickets in test and
    /// administrative contexts.
    NeverExpires,
    /// Expires once `creation_time + ttl <= now`.
    TimeToLive {
        /// Time to live from creation, in seconds.
        ttl_secs: i64,
    },
    /// Expires on inactivity or on reaching a hard lifetime bound,
    /// whichever comes first. The ticket-granting ticket default.
    IdleWithHardTimeout {
        /// Maximum idle time, in seconds.
        idle_timeout_secs: i64,
        /// Hard upper bound from creation, in seconds.
        max_lifetime_secs: i64,
    },
    /// Delegates to a longer fixed lifetime when the originating
    /// authentication asked to be remembered, and to the default policy
    /// otherwise.
    RememberMeDelegating {
        /// Fixed lifetime for remember-me sessions, in seconds.
        remember_me_ttl_secs: i64,
        /// Policy applied to sessions without the remember-me flag.
        default: Box<ExpirationPolicy>,
    },
    /// Expires once the ticket has been used `max_uses` times.
    UsesRemaining {
        /// Number of permitted uses.
        max_uses: u64,
    },
    /// Expires as soon as any member policy expires.
    AnyOf {
        /// Member policies; any one expiring expires the ticket.
        policies: Vec<ExpirationPolicy>,
    },
}

impl ExpirationPolicy {
    /// Whether `ticket` is expired at `now` under this policy.
    #[must_use]
    pub fn is_expired(&self, ticket: &Ticket, now: DateTime<Utc>) -> bool {
        match self {
            Self::NeverExpires => false,
            Self::TimeToLive { ttl_secs } => {
                elapsed_secs(ticket.creation_time, now) >= *ttl_secs
            }
            Self::IdleWithHardTimeout {
                idle_timeout_secs,
                max_lifetime_secs,
            } => {
                elapsed_secs(ticket.last_time_used, now) > *idle_timeout_secs
                    || elapsed_secs(ticket.creation_time, now) > *max_lifetime_secs
            }
            Self::RememberMeDelegating {
                remember_me_ttl_secs,
                default,
            } => {
                if remembers(ticket) {
                    elapsed_secs(ticket.creation_time, now) >= *remember_me_ttl_secs
                } else {
                    default.is_expired(ticket, now)
                }
            }
            Self::UsesRemaining { max_uses } => ticket.count_of_uses >= *max_uses,
            Self::AnyOf { policies } => policies.iter().any(|p| p.is_expired(ticket, now)),
        }
    }

    /// Worst-case remaining lifetime of `ticket` at `now`.
    ///
    /// Used by backends with native record expiry to set a TTL attribute:
    /// the record may be dropped by the store once this horizon passes,
    /// whatever the idle/use state. `None` means the policy places no time
    /// bound on the ticket.
    #[must_use]
    pub fn max_horizon(&self, ticket: &Ticket, now: DateTime<Utc>) -> Option<Duration> {
        match self {
            Self::NeverExpires | Self::UsesRemaining { .. } => None,
            Self::TimeToLive { ttl_secs } => {
                Some(remaining(ticket.creation_time, *ttl_secs, now))
            }
            Self::IdleWithHardTimeout {
                max_lifetime_secs, ..
            } => Some(remaining(ticket.creation_time, *max_lifetime_secs, now)),
            Self::RememberMeDelegating {
                remember_me_ttl_secs,
                default,
            } => {
                if remembers(ticket) {
                    Some(remaining(ticket.creation_time, *remember_me_ttl_secs, now))
                } else {
                    default.max_horizon(ticket, now)
                }
            }
            Self::AnyOf { policies } => policies
                .iter()
                .filter_map(|p| p.max_horizon(ticket, now))
                .min(),
        }
    }
}

fn remembers(ticket: &Ticket) -> bool {
    ticket
        .authentication
        .as_ref()
        .is_some_and(|auth| auth.remember_me)
}

fn elapsed_secs(since: DateTime<Utc>, now: DateTime<Utc>) -> i64 {
    now.signed_duration_since(since).num_seconds()
}

fn remaining(since: DateTime<Utc>, bound_secs: i64, now: DateTime<Utc>) -> Duration {
    let deadline = since + TimeDelta::seconds(bound_secs);
    let left = deadline.signed_duration_since(now);
    // Sub-second remainders matter to backends that round the horizon up
    // for a native TTL, so keep the full precision.
    left.to_std().unwrap_or(Duration::ZERO)
}
