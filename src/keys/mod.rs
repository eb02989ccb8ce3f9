//! Key pair generation and key encapsulation.
//!
//! Every algorithm is a variant of [`Algorithm`] and [`KeyPair`]; adding one
//! means adding a variant and satisfying every exhaustive `match`.
//!
//! | Algorithm  | Public key      | KEM ciphertext | Shared secret |
//! |------------|-----------------|----------------|---------------|
//! | `kyber768` | 1184 bytes      | 1088 bytes     | 32 bytes      |
//! | `rsa2048`  | SPKI DER        | 256 bytes      | 32 bytes      |
//! | `hybrid`   | Kyber ‖ RSA     | 1344 bytes     | 64 bytes      |

mod keyfile;
mod kyber;
mod rsa_kem;

pub use keyfile::{KeyFile, PrivateKeyField};
pub use kyber::KyberKeyPair;
pub use rsa_kem::RsaKeyPair;

use crate::error::{Error, Result};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use tracing::debug;
use zeroize::Zeroizing;

/// KEM shared secret. Wiped on drop.
pub type SharedSecret = Zeroizing<Vec<u8>>;

/// Supported key encapsulation algorithms.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Algorithm {
    /// ML-KEM-768 (CRYSTALS-Kyber, FIPS 203).
    Kyber768,
    /// RSA-2048 with OAEP/SHA-256 key transport. Classical; kept for comparison.
    Rsa2048,
    /// Kyber-768 and RSA-2048 combined; secure if either holds.
    Hybrid,
}

impl Algorithm {
    /// Every supported algorithm.
    pub const ALL: [Algorithm; 3] = [Algorithm::Kyber768, Algorithm::Rsa2048, Algorithm::Hybrid];

    /// Canonical lowercase name.
    pub fn name(&self) -> &'static str {
        match self {
            Algorithm::Kyber768 => "kyber768",
            Algorithm::Rsa2048 => "rsa2048",
            Algorithm::Hybrid => "hybrid",
        }
    }

    /// One-byte envelope tag.
    pub fn tag(&self) -> u8 {
        match self {
            Algorithm::Kyber768 => 1,
            Algorithm::Rsa2048 => 2,
            Algorithm::Hybrid => 3,
        }
    }

    /// Look up an envelope tag.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(Algorithm::Kyber768),
            2 => Some(Algorithm::Rsa2048),
            3 => Some(Algorithm::Hybrid),
            _ => None,
        }
    }

    /// Exact KEM ciphertext length this algorithm produces.
    pub fn kem_ciphertext_len(&self) -> usize {
        match self {
            Algorithm::Kyber768 => kyber::CIPHERTEXT_LEN,
            Algorithm::Rsa2048 => rsa_kem::CIPHERTEXT_LEN,
            Algorithm::Hybrid => kyber::CIPHERTEXT_LEN + rsa_kem::CIPHERTEXT_LEN,
        }
    }

    /// Whether the algorithm resists known quantum attacks.
    pub fn is_quantum_safe(&self) -> bool {
        match self {
            Algorithm::Kyber768 | Algorithm::Hybrid => true,
            Algorithm::Rsa2048 => false,
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Algorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let normalized: String = s
            .chars()
            .filter(|c| *c != '-' && *c != '_')
            .collect::<String>()
            .to_ascii_lowercase();
        match normalized.as_str() {
            "kyber768" | "mlkem768" => Ok(Algorithm::Kyber768),
            "rsa2048" => Ok(Algorithm::Rsa2048),
            "hybrid" => Ok(Algorithm::Hybrid),
            _ => Err(Error::UnsupportedAlgorithm(s.to_string())),
        }
    }
}

/// A generated or imported key pair.
pub enum KeyPair {
    Kyber768(KyberKeyPair),
    Rsa2048(RsaKeyPair),
    Hybrid {
        kyber: KyberKeyPair,
        rsa: RsaKeyPair,
    },
}

/// Generate fresh key material.
///
/// Nothing is cached or persisted; the caller owns the result.
pub fn generate(algorithm: Algorithm) -> Result<KeyPair> {
    ensure_entropy()?;
    let pair = match algorithm {
        Algorithm::Kyber768 => KeyPair::Kyber768(KyberKeyPair::generate()),
        Algorithm::Rsa2048 => KeyPair::Rsa2048(RsaKeyPair::generate()?),
        Algorithm::Hybrid => KeyPair::Hybrid {
            kyber: KyberKeyPair::generate(),
            rsa: RsaKeyPair::generate()?,
        },
    };
    debug!(algorithm = %algorithm, "generated key pair");
    Ok(pair)
}

/// Fail with `InternalCryptoFailure` instead of panicking inside a primitive.
fn ensure_entropy() -> Result<()> {
    let mut probe = [0u8; 16];
    OsRng.try_fill_bytes(&mut probe)?;
    Ok(())
}

impl KeyPair {
    /// The algorithm this pair belongs to.
    pub fn algorithm(&self) -> Algorithm {
        match self {
            KeyPair::Kyber768(_) => Algorithm::Kyber768,
            KeyPair::Rsa2048(_) => Algorithm::Rsa2048,
            KeyPair::Hybrid { .. } => Algorithm::Hybrid,
        }
    }

    /// Encapsulate a fresh shared secret to this pair's public key.
    ///
    /// Returns `(kem_ciphertext, shared_secret)`.
    pub fn encapsulate(&self) -> Result<(Vec<u8>, SharedSecret)> {
        ensure_entropy()?;
        match self {
            KeyPair::Kyber768(kyber) => kyber.encapsulate(),
            KeyPair::Rsa2048(rsa) => rsa.encapsulate(),
            KeyPair::Hybrid { kyber, rsa } => {
                let (mut ciphertext, kyber_secret) = kyber.encapsulate()?;
                let (rsa_ciphertext, rsa_secret) = rsa.encapsulate()?;
                ciphertext.extend_from_slice(&rsa_ciphertext);

                let mut secret = Zeroizing::new(Vec::with_capacity(
                    kyber_secret.len() + rsa_secret.len(),
                ));
                secret.extend_from_slice(&kyber_secret);
                secret.extend_from_slice(&rsa_secret);
                Ok((ciphertext, secret))
            }
        }
    }

    /// Recover the shared secret from a KEM ciphertext.
    ///
    /// A Kyber key that does not match yields a wrong secret rather than an
    /// error; callers must rely on the symmetric tag to detect it.
    pub fn decapsulate(&self, kem_ciphertext: &[u8]) -> Result<SharedSecret> {
        let expected = self.algorithm().kem_ciphertext_len();
        if kem_ciphertext.len() != expected {
            return Err(Error::malformed(format!(
                "{} KEM ciphertext must be {} bytes, got {}",
                self.algorithm(),
                expected,
                kem_ciphertext.len()
            )));
        }

        match self {
            KeyPair::Kyber768(kyber) => kyber.decapsulate(kem_ciphertext),
            KeyPair::Rsa2048(rsa) => rsa.decapsulate(kem_ciphertext),
            KeyPair::Hybrid { kyber, rsa } => {
                let (kyber_ct, rsa_ct) = kem_ciphertext.split_at(kyber::CIPHERTEXT_LEN);
                let kyber_secret = kyber.decapsulate(kyber_ct)?;
                let rsa_secret = rsa.decapsulate(rsa_ct)?;

                let mut secret = Zeroizing::new(Vec::with_capacity(
                    kyber_secret.len() + rsa_secret.len(),
                ));
                secret.extend_from_slice(&kyber_secret);
                secret.extend_from_slice(&rsa_secret);
                Ok(secret)
            }
        }
    }

    /// Export the public key. Hybrid keys are `kyber ‖ rsa`.
    pub fn public_key_bytes(&self) -> Result<Vec<u8>> {
        match self {
            KeyPair::Kyber768(kyber) => Ok(kyber.public_key_bytes()),
            KeyPair::Rsa2048(rsa) => rsa.public_key_bytes(),
            KeyPair::Hybrid { kyber, rsa } => {
                let mut out = kyber.public_key_bytes();
                out.extend_from_slice(&rsa.public_key_bytes()?);
                Ok(out)
            }
        }
    }

    /// Export the private key. Hybrid keys are `kyber ‖ rsa`.
    pub fn private_key_bytes(&self) -> Result<Zeroizing<Vec<u8>>> {
        match self {
            KeyPair::Kyber768(kyber) => Ok(kyber.private_key_bytes()),
            KeyPair::Rsa2048(rsa) => rsa.private_key_bytes(),
            KeyPair::Hybrid { kyber, rsa } => {
                let mut out = kyber.private_key_bytes();
                out.extend_from_slice(&rsa.private_key_bytes()?);
                Ok(out)
            }
        }
    }

    /// Rebuild a key pair from exported bytes.
    ///
    /// Fails with `InvalidKeyFile` if either half is malformed or the halves
    /// do not belong together.
    pub fn from_parts(algorithm: Algorithm, public: &[u8], private: &[u8]) -> Result<Self> {
        match algorithm {
            Algorithm::Kyber768 => Ok(KeyPair::Kyber768(KyberKeyPair::from_bytes(
                public, private,
            )?)),
            Algorithm::Rsa2048 => Ok(KeyPair::Rsa2048(RsaKeyPair::from_der(public, private)?)),
            Algorithm::Hybrid => {
                let (kyber_public, rsa_public) =
                    split_fixed(public, kyber::PUBLIC_KEY_LEN, "hybrid public key")?;
                let (kyber_private, rsa_private) =
                    split_fixed(private, kyber::PRIVATE_KEY_LEN, "hybrid private key")?;
                Ok(KeyPair::Hybrid {
                    kyber: KyberKeyPair::from_bytes(kyber_public, kyber_private)?,
                    rsa: RsaKeyPair::from_der(rsa_public, rsa_private)?,
                })
            }
        }
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyPair")
            .field("algorithm", &self.algorithm())
            .field("private_key", &"<redacted>")
            .finish()
    }
}

fn split_fixed<'a>(bytes: &'a [u8], head: usize, what: &str) -> Result<(&'a [u8], &'a [u8])> {
    if bytes.len() <= head {
        return Err(Error::key_file(format!(
            "{} too short: {} bytes",
            what,
            bytes.len()
        )));
    }
    Ok(bytes.split_at(head))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_algorithm_parse() {
        assert_eq!("kyber768".parse::<Algorithm>().unwrap(), Algorithm::Kyber768);
        assert_eq!("Kyber-768".parse::<Algorithm>().unwrap(), Algorithm::Kyber768);
        assert_eq!("ML-KEM-768".parse::<Algorithm>().unwrap(), Algorithm::Kyber768);
        assert_eq!("RSA2048".parse::<Algorithm>().unwrap(), Algorithm::Rsa2048);
        assert_eq!("hybrid".parse::<Algorithm>().unwrap(), Algorithm::Hybrid);

        let err = "dilithium3".parse::<Algorithm>().unwrap_err();
        assert!(matches!(err, Error::UnsupportedAlgorithm(name) if name == "dilithium3"));
    }

    #[test]
    fn test_algorithm_tags_roundtrip() {
        for algorithm in Algorithm::ALL {
            assert_eq!(Algorithm::from_tag(algorithm.tag()), Some(algorithm));
            assert_eq!(algorithm.name().parse::<Algorithm>().unwrap(), algorithm);
        }
        assert_eq!(Algorithm::from_tag(0), None);
        assert_eq!(Algorithm::from_tag(4), None);
    }

    #[test]
    fn test_algorithm_serde_names() {
        let json = serde_json::to_string(&Algorithm::Rsa2048).unwrap();
        assert_eq!(json, "\"rsa2048\"");
        let parsed: Algorithm = serde_json::from_str("\"hybrid\"").unwrap();
        assert_eq!(parsed, Algorithm::Hybrid);
    }

    #[test]
    fn test_kyber_encapsulate_decapsulate() {
        let pair = generate(Algorithm::Kyber768).unwrap();
        let (ciphertext, sent) = pair.encapsulate().unwrap();
        assert_eq!(ciphertext.len(), Algorithm::Kyber768.kem_ciphertext_len());
        assert_eq!(sent.len(), 32);

        let received = pair.decapsulate(&ciphertext).unwrap();
        assert_eq!(*sent, *received);
    }

    #[test]
    fn test_kyber_wrong_key_implicit_rejection() {
        let alice = generate(Algorithm::Kyber768).unwrap();
        let mallory = generate(Algorithm::Kyber768).unwrap();

        let (ciphertext, sent) = alice.encapsulate().unwrap();
        // ML-KEM does not signal the mismatch; it returns a different secret.
        let received = mallory.decapsulate(&ciphertext).unwrap();
        assert_ne!(*sent, *received);
    }

    #[test]
    fn test_decapsulate_rejects_wrong_length() {
        let pair = generate(Algorithm::Kyber768).unwrap();
        let err = pair.decapsulate(&[0u8; 10]).unwrap_err();
        assert!(matches!(err, Error::MalformedEnvelope(_)));
    }

    #[test]
    fn test_kyber_export_import() {
        let pair = generate(Algorithm::Kyber768).unwrap();
        let public = pair.public_key_bytes().unwrap();
        let private = pair.private_key_bytes().unwrap();

        let restored = KeyPair::from_parts(Algorithm::Kyber768, &public, &private).unwrap();
        let (ciphertext, sent) = pair.encapsulate().unwrap();
        assert_eq!(*restored.decapsulate(&ciphertext).unwrap(), *sent);
    }

    #[test]
    fn test_mismatched_halves_rejected() {
        let a = generate(Algorithm::Kyber768).unwrap();
        let b = generate(Algorithm::Kyber768).unwrap();

        let err = KeyPair::from_parts(
            Algorithm::Kyber768,
            &a.public_key_bytes().unwrap(),
            &b.private_key_bytes().unwrap(),
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidKeyFile(_)));
    }

    #[test]
    fn test_debug_redacts_private_key() {
        let pair = generate(Algorithm::Kyber768).unwrap();
        let rendered = format!("{:?}", pair);
        assert!(rendered.contains("redacted"));
        assert!(rendered.contains("Kyber768"));
    }

    #[test]
    fn test_hybrid_roundtrip_and_export() {
        let pair = generate(Algorithm::Hybrid).unwrap();
        let (ciphertext, sent) = pair.encapsulate().unwrap();
        assert_eq!(ciphertext.len(), Algorithm::Hybrid.kem_ciphertext_len());
        assert_eq!(sent.len(), 64);

        let restored = KeyPair::from_parts(
            Algorithm::Hybrid,
            &pair.public_key_bytes().unwrap(),
            &pair.private_key_bytes().unwrap(),
        )
        .unwrap();
        assert_eq!(*restored.decapsulate(&ciphertext).unwrap(), *sent);
    }

    #[test]
    fn test_hybrid_short_public_key_rejected() {
        let err = KeyPair::from_parts(Algorithm::Hybrid, &[0u8; 100], &[0u8; 100]).unwrap_err();
        assert!(matches!(err, Error::InvalidKeyFile(_)));
    }
}
