//! Error handling for the ticket registry.
//!
//! ## NIST 800-53 Rev5: SI-11 (Error Handling)
//!
//! Validation failures are deliberately generic: a caller cannot tell a
//! missing ticket from an expired, wrong-kind, or undecryptable one.

use thiserror::Error;

/// Result type alias using the registry error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for ticket registry operations.
#[derive(Debug, Error)]
pub enum Error {
    /// Ticket is missing, expired, of the wrong kind, or failed to decrypt.
    ///
    /// ## NIST 800-53 Rev5: IA-6 (Authentication Feedback)
    ///
    /// The message carries no detail so the cases are indistinguishable
    /// to callers and cannot be used to probe registry contents.
    #[error("invalid ticket")]
    InvalidTicket,

    /// A ticket with the same id already exists in the registry.
    #[error("ticket already exists: {0}")]
    CreationConflict(String),

    /// The backing store could not be reached or timed out.
    #[error("ticket registry unavailable: {0}")]
    Unavailable(String),

    /// A coordination lock could not be acquired within its timeout.
    ///
    /// Non-fatal for maintenance work; the sweep is skipped and retried
    /// on the next cycle.
    #[error("lock unavailable: {0}")]
    LockUnavailable(String),

    /// Serialization or encryption of a ticket failed.
    #[error("ticket serialization error: {0}")]
    Serialization(String),

    /// Replication command could not be built or published.
    #[error("replication error: {0}")]
    Replication(String),

    /// Invalid configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Returns whether this error represents a normal validation outcome
    /// that callers handle without logging at error level.
    #[must_use]
    pub const fn is_client_error(&self) -> bool {
        matches!(self, Self::InvalidTicket | Self::CreationConflict(_))
    }

    /// Returns whether this error should be logged at error level.
    #[must_use]
    pub const fn is_server_error(&self) -> bool {
        matches!(self, Self::Unavailable(_) | Self::Serialization(_) | Self::Replication(_))
    }
}
