//! Optional at-rest encryption of serialized tickets.
//!
//! ## NIST 800-53 Rev5: SC-28 (Protection of Information at Rest)
//!
//! Clustered backends hold serialized tickets in shared infrastructure;
//! the cipher executor seals them with an authenticated cipher before
//! they leave the process. Decryption failures surface as plain
//! `InvalidTicket` so a tampered record is indistinguishable from an
//! absent or expired one.

use aws_lc_rs::aead::{Aad, LessSafeKey, Nonce, UnboundKey, AES_256_GCM, NONCE_LEN};
use base64::Engine;
use rand::Rng;
use sso_core::{Error, Result};

/// Encrypts and decrypts serialized tickets.
///
/// Applies uniformly regardless of which backend stores the result.
pub trait TicketCipher: Send + Sync {
    /// Seals a serialized ticket for storage.
    ///
    /// ## Errors
    ///
    /// Returns `Serialization` if sealing fails.
    fn encode(&self, plaintext: &[u8]) -> Result<Vec<u8>>;

    /// Opens a stored record back into a serialized ticket.
    ///
    /// ## Errors
    ///
    /// Returns `InvalidTicket` for any record that does not authenticate,
    /// whatever the underlying cause.
    fn decode(&self, data: &[u8]) -> Result<Vec<u8>>;
}

/// Passthrough cipher used when at-rest encryption is disabled.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoOpTicketCipher;

impl TicketCipher for NoOpTicketCipher {
    fn encode(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        Ok(plaintext.to_vec())
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        Ok(data.to_vec())
    }
}

/// AES-256-GCM cipher executor.
///
/// Each record is stored as `nonce || ciphertext || tag` with a fresh
/// random 96-bit nonce per encode.
pub struct AesGcmTicketCipher {
    key: LessSafeKey,
}

impl AesGcmTicketCipher {
    /// Creates a cipher from raw key bytes.
    ///
    /// ## Errors
    ///
    /// Returns `Config` unless the key is exactly 32 bytes.
    pub fn from_key_bytes(key: &[u8]) -> Result<Self> {
        let unbound = UnboundKey::new(&AES_256_GCM, key)
            .map_err(|_| Error::Config("ticket cipher key must be 32 bytes".to_string()))?;
        Ok(Self {
            key: LessSafeKey::new(unbound),
        })
    }

    /// Creates a cipher from a base64-encoded key.
    ///
    /// ## Errors
    ///
    /// Returns `Config` if the key is not valid base64 or has the wrong
    /// length.
    pub fn from_base64_key(key: &str) -> Result<Self> {
        let bytes = base64::engine::general_purpose::STANDARD
            .decode(key)
            .map_err(|e| Error::Config(format!("invalid ticket cipher key: {e}")))?;
        Self::from_key_bytes(&bytes)
    }

    /// Generates a fresh random 256-bit key.
    #[must_use]
    pub fn generate_key() -> [u8; 32] {
        let mut key = [0u8; 32];
        rand::rng().fill(&mut key[..]);
        key
    }
}

impl TicketCipher for AesGcmTicketCipher {
    fn encode(&self, plaintext: &[u8]) -> Result<Vec<u8>> {
        let mut nonce_bytes = [0u8; NONCE_LEN];
        rand::rng().fill(&mut nonce_bytes[..]);

        let mut in_out = plaintext.to_vec();
        self.key
            .seal_in_place_append_tag(
                Nonce::assume_unique_for_key(nonce_bytes),
                Aad::empty(),
                &mut in_out,
            )
            .map_err(|_| Error::Serialization("ticket encryption failed".to_string()))?;

        let mut sealed = Vec::with_capacity(NONCE_LEN + in_out.len());
        sealed.extend_from_slice(&nonce_bytes);
        sealed.extend_from_slice(&in_out);
        Ok(sealed)
    }

    fn decode(&self, data: &[u8]) -> Result<Vec<u8>> {
        if data.len() <= NONCE_LEN {
            return Err(Error::InvalidTicket);
        }
        let (nonce_bytes, ciphertext) = data.split_at(NONCE_LEN);
        let nonce =
            Nonce::try_assume_unique_for_key(nonce_bytes).map_err(|_| Error::InvalidTicket)?;

        let mut in_out = ciphertext.to_vec();
        let plaintext = self
            .key
            .open_in_place(nonce, Aad::empty(), &mut in_out)
            .map_err(|_| Error::InvalidTicket)?;
        Ok(plaintext.to_vec())
    }
}
