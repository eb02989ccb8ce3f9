//! Cryptographic operations for QBits.
//!
//! This module provides:
//! - AES-256-GCM authenticated encryption
//! - HKDF-SHA256 envelope key derivation
//! - Argon2id passphrase key derivation

mod cipher;
mod kdf;

pub use cipher::{open_with_passphrase, seal_with_passphrase, Cipher, Sealed};
pub use kdf::{derive_envelope_key, PassphraseKdf};

use crate::error::{Error, Result};
use crate::keys::{self, Algorithm};

/// Exercise the backends once: entropy, ML-KEM, HKDF, and AES-GCM.
///
/// Meant to run at startup so a broken backend stops the process instead
/// of producing bad envelopes later.
pub fn self_test() -> Result<()> {
    let pair = keys::generate(Algorithm::Kyber768)?;
    let (kem_ciphertext, sent) = pair.encapsulate()?;
    let received = pair.decapsulate(&kem_ciphertext)?;
    if *sent != *received {
        return Err(Error::InternalCryptoFailure(
            "ML-KEM self-test: shared secrets differ".to_string(),
        ));
    }

    let key = derive_envelope_key(Algorithm::Kyber768, &sent)?;
    let cipher = Cipher::new(&key);
    let probe = b"qbits self-test";
    let sealed = cipher.seal(probe, b"aad")?;
    let opened = cipher.open(&sealed.nonce, &sealed.ciphertext, &sealed.tag, b"aad")?;
    if opened != probe {
        return Err(Error::InternalCryptoFailure(
            "AES-GCM self-test: round trip mismatch".to_string(),
        ));
    }

    Ok(())
}
