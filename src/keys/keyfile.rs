//! JSON key export format.
//!
//! A key file carries both halves of a key pair so that a session can be
//! recreated in another process. The private half is either stored as hex or
//! sealed under a passphrase with Argon2id + AES-256-GCM.

use super::{Algorithm, KeyPair};
use crate::config::{argon2_params, KdfParams, KEYFILE_FORMAT, KEYFILE_VERSION};
use crate::crypto::{open_with_passphrase, seal_with_passphrase, PassphraseKdf};
use crate::error::{Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::Path;
use zeroize::{Zeroize, Zeroizing};

/// On-disk key file.
#[derive(Serialize, Deserialize)]
pub struct KeyFile {
    pub format: String,
    pub version: u32,
    pub algorithm: Algorithm,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
    pub created_at: DateTime<Utc>,
    /// Hex-encoded public key.
    pub public_key: String,
    pub private_key: PrivateKeyField,
}

/// Private key storage, tagged by `protection`.
#[derive(Serialize, Deserialize)]
#[serde(tag = "protection", rename_all = "lowercase")]
pub enum PrivateKeyField {
    /// Hex-encoded private key in the clear.
    None { key: String },
    /// Private key sealed under an Argon2id-derived key.
    Passphrase {
        kdf: KdfParams,
        /// Hex-encoded Argon2 salt.
        salt: String,
        /// Hex-encoded `nonce || ciphertext || tag`.
        sealed: String,
    },
}

impl Drop for PrivateKeyField {
    fn drop(&mut self) {
        if let PrivateKeyField::None { key } = self {
            key.zeroize();
        }
    }
}

impl KeyFile {
    /// Export a key pair. With `protection`, the private key is sealed under
    /// the passphrase using the given Argon2 parameters.
    pub fn from_key_pair(
        pair: &KeyPair,
        session_id: Option<&str>,
        created_at: DateTime<Utc>,
        protection: Option<(&str, KdfParams)>,
    ) -> Result<Self> {
        let public = pair.public_key_bytes()?;
        let private = pair.private_key_bytes()?;

        let private_key = match protection {
            None => PrivateKeyField::None {
                key: hex::encode(&private[..]),
            },
            Some((passphrase, params)) => {
                let (kdf, sealed) = seal_with_passphrase(&private, passphrase, params)?;
                PrivateKeyField::Passphrase {
                    kdf: kdf.params(),
                    salt: hex::encode(kdf.salt()),
                    sealed: hex::encode(sealed),
                }
            }
        };

        Ok(Self {
            format: KEYFILE_FORMAT.to_string(),
            version: KEYFILE_VERSION,
            algorithm: pair.algorithm(),
            session_id: session_id.map(str::to_string),
            created_at,
            public_key: hex::encode(public),
            private_key,
        })
    }

    /// Parse and check the envelope of a key file. Key material is not
    /// decoded until [`KeyFile::unlock`].
    pub fn parse(bytes: &[u8]) -> Result<Self> {
        let file: KeyFile =
            serde_json::from_slice(bytes).map_err(|e| Error::key_file(e.to_string()))?;

        if file.format != KEYFILE_FORMAT {
            return Err(Error::key_file(format!(
                "unexpected format marker {:?}",
                file.format
            )));
        }
        if file.version != KEYFILE_VERSION {
            return Err(Error::key_file(format!(
                "unsupported key file version {}",
                file.version
            )));
        }
        Ok(file)
    }

    /// Pretty-printed JSON.
    pub fn to_json(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec_pretty(self)?)
    }

    /// Write the JSON to `path`, readable only by the owner on Unix.
    pub fn write_to(&self, path: &Path) -> Result<()> {
        let json = Zeroizing::new(self.to_json()?);

        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }

        let mut file = options.open(path)?;
        file.write_all(&json)?;
        file.sync_all()?;
        Ok(())
    }

    pub fn is_protected(&self) -> bool {
        matches!(self.private_key, PrivateKeyField::Passphrase { .. })
    }

    /// Decode the key material and rebuild the pair.
    ///
    /// Every failure, including a missing or wrong passphrase, is
    /// `InvalidKeyFile`.
    pub fn unlock(&self, passphrase: Option<&str>) -> Result<KeyPair> {
        let public = hex::decode(&self.public_key)
            .map_err(|e| Error::key_file(format!("public key hex: {}", e)))?;

        let private = match &self.private_key {
            PrivateKeyField::None { key } => Zeroizing::new(
                hex::decode(key).map_err(|e| Error::key_file(format!("private key hex: {}", e)))?,
            ),
            PrivateKeyField::Passphrase { kdf, salt, sealed } => {
                let passphrase = passphrase
                    .ok_or_else(|| Error::key_file("key file is passphrase-protected"))?;
                kdf.validate().map_err(Error::key_file)?;

                let salt = decode_salt(salt)?;
                let sealed = hex::decode(sealed)
                    .map_err(|e| Error::key_file(format!("sealed key hex: {}", e)))?;

                open_with_passphrase(&sealed, passphrase, &PassphraseKdf::from_parts(salt, *kdf))
                    .map_err(|e| match e {
                        Error::AuthenticationFailure => Error::key_file("wrong passphrase"),
                        other => Error::key_file(other.to_string()),
                    })?
            }
        };

        KeyPair::from_parts(self.algorithm, &public, &private)
    }
}

fn decode_salt(salt: &str) -> Result<[u8; argon2_params::SALT_LENGTH]> {
    let bytes = hex::decode(salt).map_err(|e| Error::key_file(format!("salt hex: {}", e)))?;
    bytes.try_into().map_err(|bytes: Vec<u8>| {
        Error::key_file(format!(
            "salt must be {} bytes, got {}",
            argon2_params::SALT_LENGTH,
            bytes.len()
        ))
    })
}

impl fmt::Debug for KeyFile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyFile")
            .field("version", &self.version)
            .field("algorithm", &self.algorithm)
            .field("session_id", &self.session_id)
            .field("created_at", &self.created_at)
            .field("protected", &self.is_protected())
            .field("private_key", &"<redacted>")
            .finish()
    }
}
