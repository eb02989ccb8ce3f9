//! RSA-2048 key transport: a random 32-byte secret wrapped with OAEP/SHA-256.

use super::SharedSecret;
use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use rsa::pkcs8::{DecodePrivateKey, DecodePublicKey, EncodePrivateKey, EncodePublicKey};
use rsa::traits::PublicKeyParts;
use rsa::{Oaep, RsaPrivateKey, RsaPublicKey};
use sha2::Sha256;
use zeroize::Zeroizing;

/// Modulus size.
pub const KEY_BITS: usize = 2048;

/// OAEP ciphertext length for a 2048-bit modulus.
pub const CIPHERTEXT_LEN: usize = KEY_BITS / 8;

/// Length of the transported secret.
pub const SECRET_LEN: usize = 32;

/// RSA-2048 key pair used as a KEM over OAEP-SHA256.
pub struct RsaKeyPair {
    private: RsaPrivateKey,
    public: RsaPublicKey,
}

impl RsaKeyPair {
    /// Generate a fresh key pair from the OS RNG.
    pub fn generate() -> Result<Self> {
        let private = RsaPrivateKey::new(&mut OsRng, KEY_BITS)
            .map_err(|e| Error::InternalCryptoFailure(format!("RSA key generation: {}", e)))?;
        let public = private.to_public_key();
        Ok(Self { private, public })
    }

    /// Rebuild from SPKI and PKCS#8 DER.
    pub fn from_der(public: &[u8], private: &[u8]) -> Result<Self> {
        let public = RsaPublicKey::from_public_key_der(public)
            .map_err(|e| Error::key_file(format!("RSA public key: {}", e)))?;
        let private = RsaPrivateKey::from_pkcs8_der(private)
            .map_err(|e| Error::key_file(format!("RSA private key: {}", e)))?;

        if private.size() != CIPHERTEXT_LEN {
            return Err(Error::key_file(format!(
                "RSA key must be {} bits, got {}",
                KEY_BITS,
                private.size() * 8
            )));
        }
        if private.to_public_key() != public {
            return Err(Error::key_file("RSA public and private keys do not match"));
        }

        Ok(Self { private, public })
    }

    /// Wrap a random 32-byte secret to the public key.
    pub fn encapsulate(&self) -> Result<(Vec<u8>, SharedSecret)> {
        let mut secret = Zeroizing::new(vec![0u8; SECRET_LEN]);
        OsRng.try_fill_bytes(&mut secret[..])?;

        let ciphertext = self
            .public
            .encrypt(&mut OsRng, Oaep::new::<Sha256>(), &secret)
            .map_err(|e| Error::InternalCryptoFailure(format!("RSA-OAEP encrypt: {}", e)))?;
        Ok((ciphertext, secret))
    }

    /// OAEP padding failures surface as `AuthenticationFailure`, the same as a
    /// bad GCM tag.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<SharedSecret> {
        let secret = Zeroizing::new(
            self.private
                .decrypt(Oaep::new::<Sha256>(), ciphertext)
                .map_err(|_| Error::AuthenticationFailure)?,
        );
        if secret.len() != SECRET_LEN {
            return Err(Error::AuthenticationFailure);
        }
        Ok(secret)
    }

    /// SPKI DER encoding of the public key.
    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        let der = self
            .public
            .to_public_key_der()
            .map_err(|e| Error::InternalCryptoFailure(format!("RSA public key DER: {}", e)))?;
        Ok(der.as_bytes().to_vec())
    }

    /// PKCS#8 DER encoding of the private key, wiped on drop.
    pub fn private_key_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        let der = self
            .private
            .to_pkcs8_der()
            .map_err(|e| Error::InternalCryptoFailure(format!("RSA private key DER: {}", e)))?;
        Ok(Zeroizing::new(der.as_bytes().to_vec()))
    }
}
