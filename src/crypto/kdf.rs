//! Key derivation: HKDF for KEM shared secrets, Argon2id for passphrases.

use crate::config::{argon2_params, KdfParams, KEY_SIZE};
use crate::error::{Error, Result};
use crate::keys::Algorithm;
use argon2::{Algorithm as Argon2Algorithm, Argon2, Params, Version};
use hkdf::Hkdf;
use rand::rngs::OsRng;
use rand::RngCore;
use sha2::Sha256;
use zeroize::Zeroizing;

/// HKDF info prefix; the algorithm name is appended.
const ENVELOPE_KEY_INFO: &[u8] = b"qbits-envelope-v1:";

/// Derive the AES-256 envelope key from a KEM shared secret.
///
/// HKDF-SHA256 with no salt. The algorithm name is bound into the info
/// string so secrets never cross between algorithms.
pub fn derive_envelope_key(
    algorithm: Algorithm,
    shared_secret: &[u8],
) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
    let hk = Hkdf::<Sha256>::new(None, shared_secret);

    let mut info = Vec::with_capacity(ENVELOPE_KEY_INFO.len() + 16);
    info.extend_from_slice(ENVELOPE_KEY_INFO);
    info.extend_from_slice(algorithm.name().as_bytes());

    let mut key = Zeroizing::new([0u8; KEY_SIZE]);
    hk.expand(&info, &mut key[..])
        .map_err(|e| Error::InternalCryptoFailure(format!("HKDF expand: {}", e)))?;
    Ok(key)
}

/// Passphrase key derivation using Argon2id.
#[derive(Debug, Clone)]
pub struct PassphraseKdf {
    salt: [u8; argon2_params::SALT_LENGTH],
    params: KdfParams,
}

impl PassphraseKdf {
    /// Create a new KDF with a random salt.
    pub fn new(params: KdfParams) -> Result<Self> {
        params.validate().map_err(Error::InvalidConfig)?;
        let mut salt = [0u8; argon2_params::SALT_LENGTH];
        OsRng.try_fill_bytes(&mut salt)?;
        Ok(Self { salt, params })
    }

    /// Create a KDF from a stored salt and parameters (for unlocking).
    pub fn from_parts(salt: [u8; argon2_params::SALT_LENGTH], params: KdfParams) -> Self {
        Self { salt, params }
    }

    /// Get the salt for storage.
    pub fn salt(&self) -> &[u8; argon2_params::SALT_LENGTH] {
        &self.salt
    }

    /// Get the cost parameters for storage.
    pub fn params(&self) -> KdfParams {
        self.params
    }

    /// Derive a 256-bit key from a passphrase.
    pub fn derive_key(&self, passphrase: &str) -> Result<Zeroizing<[u8; KEY_SIZE]>> {
        let params = Params::new(
            self.params.memory_kib,
            self.params.iterations,
            self.params.parallelism,
            Some(argon2_params::OUTPUT_LENGTH),
        )
        .map_err(|e| Error::InvalidConfig(format!("Argon2 parameters: {}", e)))?;

        let argon2 = Argon2::new(Argon2Algorithm::Argon2id, Version::V0x13, params);

        let mut key = Zeroizing::new([0u8; KEY_SIZE]);
        argon2
            .hash_password_into(passphrase.as_bytes(), &self.salt, &mut key[..])
            .map_err(|e| Error::InternalCryptoFailure(format!("Argon2: {}", e)))?;

        Ok(key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn light() -> KdfParams {
        KdfParams {
            memory_kib: 1024,
            iterations: 1,
            parallelism: 1,
        }
    }

    #[test]
    fn test_envelope_key_deterministic() {
        let k1 = derive_envelope_key(Algorithm::Kyber768, &[9u8; 32]).unwrap();
        let k2 = derive_envelope_key(Algorithm::Kyber768, &[9u8; 32]).unwrap();
        assert_eq!(*k1, *k2);
    }

    #[test]
    fn test_envelope_key_bound_to_algorithm() {
        let kyber = derive_envelope_key(Algorithm::Kyber768, &[9u8; 32]).unwrap();
        let rsa = derive_envelope_key(Algorithm::Rsa2048, &[9u8; 32]).unwrap();
        assert_ne!(*kyber, *rsa);
    }

    #[test]
    fn test_envelope_key_depends_on_secret() {
        let k1 = derive_envelope_key(Algorithm::Hybrid, &[1u8; 64]).unwrap();
        let k2 = derive_envelope_key(Algorithm::Hybrid, &[2u8; 64]).unwrap();
        assert_ne!(*k1, *k2);
    }

    #[test]
    fn test_passphrase_derivation_deterministic() {
        let kdf = PassphraseKdf::from_parts([1u8; 32], light());

        let key1 = kdf.derive_key("password123").unwrap();
        let key2 = kdf.derive_key("password123").unwrap();

        assert_eq!(*key1, *key2);
    }

    #[test]
    fn test_different_passphrases_different_keys() {
        let kdf = PassphraseKdf::from_parts([2u8; 32], light());

        let key1 = kdf.derive_key("password1").unwrap();
        let key2 = kdf.derive_key("password2").unwrap();

        assert_ne!(*key1, *key2);
    }

    #[test]
    fn test_different_salts_different_keys() {
        let kdf1 = PassphraseKdf::from_parts([1u8; 32], light());
        let kdf2 = PassphraseKdf::from_parts([2u8; 32], light());

        let key1 = kdf1.derive_key("password").unwrap();
        let key2 = kdf2.derive_key("password").unwrap();

        assert_ne!(*key1, *key2);
    }

    #[test]
    fn test_new_generates_random_salt() {
        let kdf1 = PassphraseKdf::new(light()).unwrap();
        let kdf2 = PassphraseKdf::new(light()).unwrap();

        assert_ne!(kdf1.salt(), kdf2.salt());
    }

    #[test]
    fn test_new_rejects_out_of_range_params() {
        let params = KdfParams {
            parallelism: 0,
            ..light()
        };
        assert!(matches!(
            PassphraseKdf::new(params),
            Err(Error::InvalidConfig(_))
        ));
    }
}
