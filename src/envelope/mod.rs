//! Self-contained encrypted file envelopes.
//!
//! Version 1 layout:
//!
//! ```text
//! magic "QBEV" | version | algorithm tag | varint kem_ct_len | kem_ct
//!   | hint flag | [varint hint_len | hint] | nonce[12] | ciphertext | tag[16]
//! ```
//!
//! Everything before the nonce is the header; its bytes are passed to
//! AES-GCM as additional authenticated data.

mod codec;
mod varint;

pub use codec::{decode, encode};

use crate::config::{ENVELOPE_MAGIC, ENVELOPE_VERSION, MAX_FILENAME_HINT, NONCE_SIZE, TAG_SIZE};
use crate::error::{Error, Result};
use crate::keys::Algorithm;

/// Envelope header. Everything but the nonce is authenticated as AAD.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnvelopeHeader {
    pub algorithm: Algorithm,
    pub kem_ciphertext: Vec<u8>,
    pub nonce: [u8; NONCE_SIZE],
    pub filename_hint: Option<String>,
}

/// A decoded envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Envelope {
    pub header: EnvelopeHeader,
    pub ciphertext: Vec<u8>,
    pub tag: [u8; TAG_SIZE],
}

impl EnvelopeHeader {
    /// Serialize the authenticated prefix (up to, not including, the nonce).
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let expected = self.algorithm.kem_ciphertext_len();
        if self.kem_ciphertext.len() != expected {
            return Err(Error::malformed(format!(
                "{} KEM ciphertext must be {} bytes, got {}",
                self.algorithm,
                expected,
                self.kem_ciphertext.len()
            )));
        }

        let mut out = Vec::with_capacity(self.capacity_hint());
        out.extend_from_slice(&ENVELOPE_MAGIC);
        out.push(ENVELOPE_VERSION);
        out.push(self.algorithm.tag());
        varint::write(&mut out, self.kem_ciphertext.len() as u64);
        out.extend_from_slice(&self.kem_ciphertext);

        match &self.filename_hint {
            None => out.push(0),
            Some(hint) => {
                if hint.len() > MAX_FILENAME_HINT {
                    return Err(Error::malformed(format!(
                        "filename hint is {} bytes, limit is {}",
                        hint.len(),
                        MAX_FILENAME_HINT
                    )));
                }
                out.push(1);
                varint::write(&mut out, hint.len() as u64);
                out.extend_from_slice(hint.as_bytes());
            }
        }

        Ok(out)
    }

    fn capacity_hint(&self) -> usize {
        ENVELOPE_MAGIC.len()
            + 2
            + 2 * 2
            + 1
            + self.kem_ciphertext.len()
            + self.filename_hint.as_ref().map_or(0, String::len)
    }
}
