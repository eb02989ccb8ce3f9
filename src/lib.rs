//! QBits: post-quantum file encryption
//!
//! Files are sealed into self-contained envelopes: a fresh KEM encapsulation
//! (ML-KEM-768, RSA-2048, or both) yields a shared secret, HKDF turns it into
//! an AES-256-GCM key, and the envelope header is authenticated alongside the
//! ciphertext.
//!
//! # Architecture
//!
//! ```text
//! SessionStore ─ KeyPair ─ encapsulate ─ HKDF ─ AES-256-GCM ─ Envelope
//! ```
//!
//! Key pairs live in memory inside a [`SessionStore`]; they leave the process
//! only as an explicitly exported [`KeyFile`], optionally sealed under a
//! passphrase.
//!
//! # Example
//!
//! ```rust,no_run
//! use qbits::{Algorithm, FileCryptoService, ServiceConfig};
//!
//! let service = FileCryptoService::from_config(&ServiceConfig::default()).unwrap();
//! let session = service.generate_session(Algorithm::Kyber768).unwrap();
//!
//! let envelope = service.encrypt(b"Hidden data", &session).unwrap();
//! let data = service.decrypt(&envelope, &session).unwrap();
//! assert_eq!(data, b"Hidden data");
//! ```

pub mod bench;
pub mod config;
pub mod crypto;
pub mod envelope;
pub mod error;
pub mod keys;
pub mod service;
pub mod session;

pub use config::{KdfParams, ServiceConfig, SessionPolicy};
pub use error::{Error, ErrorKind, Result};
pub use keys::{Algorithm, KeyFile, KeyPair};
pub use service::FileCryptoService;
pub use session::{SessionId, SessionStore};
