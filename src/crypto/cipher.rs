//! AES-256-GCM authenticated encryption.

use crate::config::{KdfParams, KEY_SIZE, NONCE_SIZE, TAG_SIZE};
use crate::crypto::kdf::PassphraseKdf;
use crate::error::{Error, Result};
use aes_gcm::aead::AeadInPlace;
use aes_gcm::{Aes256Gcm, Key, KeyInit, Nonce, Tag};
use rand::rngs::OsRng;
use rand::RngCore;
use zeroize::Zeroizing;

/// Output of a single `seal` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sealed {
    /// Random per-call nonce.
    pub nonce: [u8; NONCE_SIZE],
    /// Ciphertext, same length as the plaintext.
    pub ciphertext: Vec<u8>,
    /// Detached authentication tag.
    pub tag: [u8; TAG_SIZE],
}

impl Sealed {
    /// Concatenate as `nonce || ciphertext || tag`.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(NONCE_SIZE + self.ciphertext.len() + TAG_SIZE);
        out.extend_from_slice(&self.nonce);
        out.extend_from_slice(&self.ciphertext);
        out.extend_from_slice(&self.tag);
        out
    }

    /// Split a `nonce || ciphertext || tag` buffer.
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        if data.len() < NONCE_SIZE + TAG_SIZE {
            return Err(Error::AuthenticationFailure);
        }
        let (nonce, rest) = data.split_at(NONCE_SIZE);
        let (ciphertext, tag) = rest.split_at(rest.len() - TAG_SIZE);

        let mut sealed = Sealed {
            nonce: [0u8; NONCE_SIZE],
            ciphertext: ciphertext.to_vec(),
            tag: [0u8; TAG_SIZE],
        };
        sealed.nonce.copy_from_slice(nonce);
        sealed.tag.copy_from_slice(tag);
        Ok(sealed)
    }
}

/// AES-256-GCM cipher wrapper.
pub struct Cipher {
    cipher: Aes256Gcm,
}

impl Cipher {
    /// Create a new cipher from a derived key.
    pub fn new(key: &[u8; KEY_SIZE]) -> Self {
        Self {
            cipher: Aes256Gcm::new(Key::<Aes256Gcm>::from_slice(key)),
        }
    }

    /// Encrypt with a fresh random nonce.
    ///
    /// `aad` is authenticated but not encrypted; the same bytes must be
    /// presented to [`Cipher::open`].
    pub fn seal(&self, plaintext: &[u8], aad: &[u8]) -> Result<Sealed> {
        let mut nonce = [0u8; NONCE_SIZE];
        OsRng.try_fill_bytes(&mut nonce)?;

        let mut buffer = plaintext.to_vec();
        let tag = self
            .cipher
            .encrypt_in_place_detached(Nonce::from_slice(&nonce), aad, &mut buffer)
            .map_err(|e| Error::InternalCryptoFailure(format!("AES-GCM seal: {}", e)))?;

        let mut tag_bytes = [0u8; TAG_SIZE];
        tag_bytes.copy_from_slice(tag.as_slice());

        Ok(Sealed {
            nonce,
            ciphertext: buffer,
            tag: tag_bytes,
        })
    }

    /// Verify the tag and decrypt.
    ///
    /// No plaintext is returned unless the tag verifies.
    pub fn open(
        &self,
        nonce: &[u8; NONCE_SIZE],
        ciphertext: &[u8],
        tag: &[u8; TAG_SIZE],
        aad: &[u8],
    ) -> Result<Vec<u8>> {
        let mut buffer = Zeroizing::new(ciphertext.to_vec());
        self.cipher
            .decrypt_in_place_detached(
                Nonce::from_slice(nonce),
                aad,
                &mut buffer[..],
                Tag::from_slice(tag),
            )
            .map_err(|_| Error::AuthenticationFailure)?;

        Ok(std::mem::take(&mut *buffer))
    }
}

/// Encrypt a secret under a passphrase.
///
/// Uses Argon2id for key derivation and AES-256-GCM for encryption.
/// Returns the salt alongside `nonce || ciphertext || tag`.
pub fn seal_with_passphrase(
    plaintext: &[u8],
    passphrase: &str,
    params: KdfParams,
) -> Result<(PassphraseKdf, Vec<u8>)> {
    let kdf = PassphraseKdf::new(params)?;
    let key = kdf.derive_key(passphrase)?;
    let sealed = Cipher::new(&key).seal(plaintext, &[])?;
    Ok((kdf, sealed.to_bytes()))
}

/// Decrypt a secret sealed by [`seal_with_passphrase`].
pub fn open_with_passphrase(
    sealed: &[u8],
    passphrase: &str,
    kdf: &PassphraseKdf,
) -> Result<Zeroizing<Vec<u8>>> {
    let key = kdf.derive_key(passphrase)?;
    let sealed = Sealed::from_bytes(sealed)?;
    let plaintext = Cipher::new(&key).open(&sealed.nonce, &sealed.ciphertext, &sealed.tag, &[])?;
    Ok(Zeroizing::new(plaintext))
}
