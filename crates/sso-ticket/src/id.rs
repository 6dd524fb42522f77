//! Secure ticket id generation.
//!
//! Ticket ids are the bearer secret of the whole system, so the random
//! segment uses the cryptographically secure thread-local generator.

use rand::distr::{Alphanumeric, SampleString};

/// Random segment length for ticket-granting and proxy-granting tickets.
///
/// 50 alphanumeric characters give roughly 297 bits of entropy
/// (log2(62^50)), far beyond collision or guessing range.
pub const GRANTING_TICKET_ID_LENGTH: usize = 50;

/// Random segment length for service and proxy tickets.
///
/// 20 characters (~119 bits) is ample for a ticket that lives seconds
/// and dies on first use.
pub const SERVICE_TICKET_ID_LENGTH: usize = 20;

/// Generates a cryptographically secure random alphanumeric string.
#[must_use]
pub fn random_alphanumeric(len: usize) -> String {
    let mut rng = rand::rng();
    Alphanumeric.sample_string(&mut rng, len)
}

/// Generates a new ticket id with the given kind prefix.
///
/// The format is `{prefix}-{random}`, e.g. `ST-kJ8f...`; the prefix lets
/// registries reject wrong-kind lookups before touching storage.
#[must_use]
pub fn new_ticket_id(prefix: &str, random_len: usize) -> String {
    format!("{prefix}-{}", random_alphanumeric(random_len))
}
