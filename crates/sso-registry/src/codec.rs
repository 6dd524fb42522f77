//! Serialization of tickets for byte-oriented backends.
//!
//! Every backend that stores serialized tickets (key-value stores,
//! cluster maps, replication payloads) goes through these two functions,
//! so the cipher executor applies uniformly.

use sso_core::{Error, Result};
use sso_ticket::Ticket;

use crate::cipher::TicketCipher;

/// Serializes and seals a ticket for storage or replication.
///
/// ## Errors
///
/// Returns `Serialization` if the ticket cannot be serialized or sealed.
pub fn encode_ticket(cipher: &dyn TicketCipher, ticket: &Ticket) -> Result<Vec<u8>> {
    let plain = serde_json::to_vec(ticket).map_err(|e| Error::Serialization(e.to_string()))?;
    cipher.encode(&plain)
}

/// Opens and deserializes a stored record back into a ticket.
///
/// ## Errors
///
/// Returns `InvalidTicket` for records that fail to open or parse;
/// callers cannot distinguish tampering from absence.
pub fn decode_ticket(cipher: &dyn TicketCipher, data: &[u8]) -> Result<Ticket> {
    let plain = cipher.decode(data)?;
    serde_json::from_slice(&plain).map_err(|_| Error::InvalidTicket)
}
