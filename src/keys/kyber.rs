//! ML-KEM-768 key encapsulation.

use super::SharedSecret;
use crate::error::{Error, Result};
use ml_kem::kem::{Decapsulate, Encapsulate};
use ml_kem::{Ciphertext, Encoded, EncodedSizeUser, KemCore, MlKem768};
use rand::rngs::OsRng;
use zeroize::Zeroizing;

/// Encoded encapsulation key length.
pub const PUBLIC_KEY_LEN: usize = 1184;

/// Encoded decapsulation key length.
pub const PRIVATE_KEY_LEN: usize = 2400;

/// KEM ciphertext length.
pub const CIPHERTEXT_LEN: usize = 1088;

type DecapsulationKey = <MlKem768 as KemCore>::DecapsulationKey;
type EncapsulationKey = <MlKem768 as KemCore>::EncapsulationKey;

/// ML-KEM-768 key pair.
pub struct KyberKeyPair {
    dk: DecapsulationKey,
    ek: EncapsulationKey,
}

impl KyberKeyPair {
    /// Generate a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        let (dk, ek) = MlKem768::generate(&mut OsRng);
        Self { dk, ek }
    }

    /// Rebuild from encoded keys, checking the two halves belong together.
    pub fn from_bytes(public: &[u8], private: &[u8]) -> Result<Self> {
        let ek_bytes = Encoded::<EncapsulationKey>::try_from(public).map_err(|_| {
            Error::key_file(format!(
                "Kyber-768 public key must be {} bytes, got {}",
                PUBLIC_KEY_LEN,
                public.len()
            ))
        })?;
        let dk_bytes = Encoded::<DecapsulationKey>::try_from(private).map_err(|_| {
            Error::key_file(format!(
                "Kyber-768 private key must be {} bytes, got {}",
                PRIVATE_KEY_LEN,
                private.len()
            ))
        })?;

        let pair = Self {
            dk: DecapsulationKey::from_bytes(&dk_bytes),
            ek: EncapsulationKey::from_bytes(&ek_bytes),
        };

        // Implicit rejection hides a mismatch, so compare a test secret.
        let (check_ct, sent) = pair.encapsulate()?;
        let received = pair.decapsulate(&check_ct)?;
        if *sent != *received {
            return Err(Error::key_file(
                "Kyber-768 public and private keys do not match",
            ));
        }

        Ok(pair)
    }

    /// Encapsulate a fresh shared secret to the public key.
    pub fn encapsulate(&self) -> Result<(Vec<u8>, SharedSecret)> {
        let (ct, shared) = self
            .ek
            .encapsulate(&mut OsRng)
            .map_err(|_| Error::InternalCryptoFailure("ML-KEM encapsulation failed".into()))?;
        Ok((ct.to_vec(), Zeroizing::new(shared.to_vec())))
    }

    /// Recover the shared secret. A wrong key yields a different secret, not an error.
    pub fn decapsulate(&self, ciphertext: &[u8]) -> Result<SharedSecret> {
        let ct = Ciphertext::<MlKem768>::try_from(ciphertext).map_err(|_| {
            Error::malformed(format!(
                "Kyber-768 ciphertext must be {} bytes, got {}",
                CIPHERTEXT_LEN,
                ciphertext.len()
            ))
        })?;
        let shared = self
            .dk
            .decapsulate(&ct)
            .map_err(|_| Error::InternalCryptoFailure("ML-KEM decapsulation failed".into()))?;
        Ok(Zeroizing::new(shared.to_vec()))
    }

    /// Encoded encapsulation key.
    pub fn public_key_bytes(&self) -> Vec<u8> {
        self.ek.as_bytes().to_vec()
    }

    /// Encoded decapsulation key, wiped on drop.
    pub fn private_key_bytes(&self) -> Zeroizing<Vec<u8>> {
        Zeroizing::new(self.dk.as_bytes().to_vec())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encoded_sizes() {
        let pair = KyberKeyPair::generate();
        assert_eq!(pair.public_key_bytes().len(), PUBLIC_KEY_LEN);
        assert_eq!(pair.private_key_bytes().len(), PRIVATE_KEY_LEN);

        let (ct, shared) = pair.encapsulate().unwrap();
        assert_eq!(ct.len(), CIPHERTEXT_LEN);
        assert_eq!(shared.len(), 32);
    }

    #[test]
    fn test_truncated_keys_rejected() {
        let pair = KyberKeyPair::generate();
        let public = pair.public_key_bytes();
        let private = pair.private_key_bytes();

        assert!(matches!(
            KyberKeyPair::from_bytes(&public[..PUBLIC_KEY_LEN - 1], &private),
            Err(Error::InvalidKeyFile(_))
        ));
        assert!(matches!(
            KyberKeyPair::from_bytes(&public, &private[..10]),
            Err(Error::InvalidKeyFile(_))
        ));
    }

    #[test]
    fn test_tampered_ciphertext_changes_secret() {
        let pair = KyberKeyPair::generate();
        let (mut ct, sent) = pair.encapsulate().unwrap();
        ct[0] ^= 0x01;
        let received = pair.decapsulate(&ct).unwrap();
        assert_ne!(*sent, *received);
    }
}
