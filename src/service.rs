//! Encrypt/decrypt orchestration over a session store.
//!
//! Each call moves through `Requested → KeyResolved → CryptoExecuted` and
//! ends in `EnvelopeEmitted` or `Failed`. Transitions are traced at debug
//! level with the session id and algorithm; key bytes never reach a log line.

use crate::config::{ServiceConfig, MAX_FILENAME_HINT, NONCE_SIZE};
use crate::crypto::{derive_envelope_key, Cipher};
use crate::envelope::{self, EnvelopeHeader};
use crate::error::{Error, Result};
use crate::keys::{self, Algorithm};
use crate::session::{SessionId, SessionStore};
use serde::Serialize;
use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{debug, info, warn};
use walkdir::WalkDir;

/// Suffix appended to encrypted file names.
pub const ENCRYPTED_SUFFIX: &str = ".encrypted";

/// Output name prefix for decrypted files.
const DECRYPTED_PREFIX: &str = "decrypted_";

/// Fallback name when an envelope carries no usable hint.
const DEFAULT_DECRYPTED_NAME: &str = "decrypted_file";

/// Lifecycle of a single encrypt or decrypt call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Requested,
    KeyResolved,
    CryptoExecuted,
    EnvelopeEmitted,
    Failed,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::Requested => "requested",
            Stage::KeyResolved => "key_resolved",
            Stage::CryptoExecuted => "crypto_executed",
            Stage::EnvelopeEmitted => "envelope_emitted",
            Stage::Failed => "failed",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Traces one operation through its stages.
struct Operation<'a> {
    name: &'static str,
    session: &'a SessionId,
    algorithm: Option<Algorithm>,
    stage: Stage,
}

impl<'a> Operation<'a> {
    fn start(name: &'static str, session: &'a SessionId) -> Self {
        debug!(op = name, session = %session, stage = %Stage::Requested, "file crypto");
        Self {
            name,
            session,
            algorithm: None,
            stage: Stage::Requested,
        }
    }

    fn advance(&mut self, stage: Stage) {
        self.stage = stage;
        debug!(
            op = self.name,
            session = %self.session,
            algorithm = self.algorithm.map_or("-", |a| a.name()),
            stage = %stage,
            "file crypto"
        );
    }

    /// Record the terminal stage for `result`.
    fn finish<T>(mut self, result: Result<T>) -> Result<T> {
        match &result {
            Ok(_) => self.advance(Stage::EnvelopeEmitted),
            Err(e) => warn!(
                op = self.name,
                session = %self.session,
                algorithm = self.algorithm.map_or("-", |a| a.name()),
                reached = %self.stage,
                stage = %Stage::Failed,
                kind = %e.kind(),
                "file crypto failed"
            ),
        }
        result
    }
}

/// Plaintext recovered from an envelope.
pub struct Decrypted {
    pub data: Vec<u8>,
    pub filename_hint: Option<String>,
    pub algorithm: Algorithm,
}

impl fmt::Debug for Decrypted {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Decrypted")
            .field("len", &self.data.len())
            .field("filename_hint", &self.filename_hint)
            .field("algorithm", &self.algorithm)
            .finish()
    }
}

/// Outcome of a file-level operation.
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub input: PathBuf,
    pub output: PathBuf,
    pub algorithm: Algorithm,
    pub input_bytes: u64,
    pub output_bytes: u64,
    pub elapsed_ms: f64,
}

impl FileReport {
    /// Output size relative to input, as a percentage.
    pub fn overhead_percent(&self) -> f64 {
        if self.input_bytes == 0 {
            return 0.0;
        }
        (self.output_bytes as f64 / self.input_bytes as f64 - 1.0) * 100.0
    }
}

/// Per-file result inside a directory run.
#[derive(Debug)]
pub struct FileOutcome {
    pub input: PathBuf,
    pub result: Result<FileReport>,
}

/// Outcome of [`FileCryptoService::encrypt_directory`].
#[derive(Debug)]
pub struct DirectoryReport {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub files: Vec<FileOutcome>,
}

impl DirectoryReport {
    pub fn succeeded(&self) -> usize {
        self.files.iter().filter(|f| f.result.is_ok()).count()
    }

    pub fn failed(&self) -> usize {
        self.files.len() - self.succeeded()
    }
}

/// The encrypt/decrypt service. `Send + Sync`; calls are independent.
pub struct FileCryptoService {
    store: SessionStore,
}

impl FileCryptoService {
    pub fn new(store: SessionStore) -> Self {
        Self { store }
    }

    /// Build a service over an in-memory store configured from `config`.
    pub fn from_config(config: &ServiceConfig) -> Result<Self> {
        config.validate().map_err(Error::InvalidConfig)?;
        let store = SessionStore::in_memory(config.session_policy())
            .with_keyfile_kdf(config.keyfile_kdf);
        Ok(Self::new(store))
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    /// Generate a key pair and open a session for it.
    pub fn generate_session(&self, algorithm: Algorithm) -> Result<SessionId> {
        let pair = keys::generate(algorithm)?;
        self.store.create(pair)
    }

    /// Encrypt `data` to the session's public key.
    pub fn encrypt(&self, data: &[u8], session_id: &SessionId) -> Result<Vec<u8>> {
        self.encrypt_with_hint(data, None, session_id)
    }

    /// Encrypt, recording `filename_hint` in the authenticated header.
    pub fn encrypt_with_hint(
        &self,
        data: &[u8],
        filename_hint: Option<&str>,
        session_id: &SessionId,
    ) -> Result<Vec<u8>> {
        self.seal_traced(data, filename_hint, session_id)
            .map(|(bytes, _)| bytes)
    }

    /// Encrypt and report the algorithm of the session that was resolved.
    fn seal_traced(
        &self,
        data: &[u8],
        filename_hint: Option<&str>,
        session_id: &SessionId,
    ) -> Result<(Vec<u8>, Algorithm)> {
        let mut op = Operation::start("encrypt", session_id);
        let result = self.seal(&mut op, data, filename_hint);
        op.finish(result)
    }

    fn seal(
        &self,
        op: &mut Operation<'_>,
        data: &[u8],
        filename_hint: Option<&str>,
    ) -> Result<(Vec<u8>, Algorithm)> {
        let session = self.store.get(op.session)?;
        let algorithm = session.algorithm();
        op.algorithm = Some(algorithm);
        op.advance(Stage::KeyResolved);

        let (kem_ciphertext, shared_secret) = session.key_pair.encapsulate()?;
        let key = derive_envelope_key(algorithm, &shared_secret)?;

        let mut header = EnvelopeHeader {
            algorithm,
            kem_ciphertext,
            nonce: [0u8; NONCE_SIZE],
            filename_hint: filename_hint.map(str::to_string),
        };
        let aad = header.to_bytes()?;
        let sealed = Cipher::new(&key).seal(data, &aad)?;
        header.nonce = sealed.nonce;
        op.advance(Stage::CryptoExecuted);

        let bytes = envelope::encode(&header, &sealed.ciphertext, &sealed.tag)?;
        Ok((bytes, algorithm))
    }

    /// Decrypt an envelope with the session's private key.
    pub fn decrypt(&self, envelope_bytes: &[u8], session_id: &SessionId) -> Result<Vec<u8>> {
        Ok(self.decrypt_with_hint(envelope_bytes, session_id)?.data)
    }

    /// Decrypt, also returning the header's filename hint and algorithm.
    pub fn decrypt_with_hint(
        &self,
        envelope_bytes: &[u8],
        session_id: &SessionId,
    ) -> Result<Decrypted> {
        let mut op = Operation::start("decrypt", session_id);
        let result = self.open(&mut op, envelope_bytes);
        op.finish(result)
    }

    fn open(&self, op: &mut Operation<'_>, envelope_bytes: &[u8]) -> Result<Decrypted> {
        let envelope = envelope::decode(envelope_bytes)?;
        let algorithm = envelope.header.algorithm;
        op.algorithm = Some(algorithm);

        let session = self.store.get(op.session)?;
        op.advance(Stage::KeyResolved);

        // Another algorithm's key can never open this envelope.
        if session.algorithm() != algorithm {
            return Err(Error::AuthenticationFailure);
        }

        let shared_secret = session
            .key_pair
            .decapsulate(&envelope.header.kem_ciphertext)?;
        let key = derive_envelope_key(algorithm, &shared_secret)?;
        let aad = envelope.header.to_bytes()?;
        let data = Cipher::new(&key).open(
            &envelope.header.nonce,
            &envelope.ciphertext,
            &envelope.tag,
            &aad,
        )?;
        op.advance(Stage::CryptoExecuted);

        Ok(Decrypted {
            data,
            filename_hint: envelope.header.filename_hint,
            algorithm,
        })
    }

    /// Encrypt a file. Defaults to `<input>.encrypted`; the input's file
    /// name travels in the header.
    pub fn encrypt_file(
        &self,
        input: &Path,
        output: Option<&Path>,
        session_id: &SessionId,
    ) -> Result<FileReport> {
        let start = Instant::now();
        let data = fs::read(input)?;

        let hint = input
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .filter(|name| {
                let fits = name.len() <= MAX_FILENAME_HINT;
                if !fits {
                    warn!(path = %input.display(), "file name too long for header, omitting hint");
                }
                fits
            });

        let (envelope_bytes, algorithm) = self.seal_traced(&data, hint.as_deref(), session_id)?;

        let output = match output {
            Some(path) => path.to_path_buf(),
            None => append_suffix(input, ENCRYPTED_SUFFIX),
        };
        fs::write(&output, &envelope_bytes)?;

        let report = FileReport {
            input: input.to_path_buf(),
            output,
            algorithm,
            input_bytes: data.len() as u64,
            output_bytes: envelope_bytes.len() as u64,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        info!(
            input = %report.input.display(),
            output = %report.output.display(),
            bytes = report.input_bytes,
            "file encrypted"
        );
        Ok(report)
    }

    /// Decrypt a file. Defaults to `decrypted_<hint>` next to the input.
    pub fn decrypt_file(
        &self,
        input: &Path,
        output: Option<&Path>,
        session_id: &SessionId,
    ) -> Result<FileReport> {
        let start = Instant::now();
        let envelope_bytes = fs::read(input)?;
        let decrypted = self.decrypt_with_hint(&envelope_bytes, session_id)?;

        let output = match output {
            Some(path) => path.to_path_buf(),
            None => default_decrypted_path(input, decrypted.filename_hint.as_deref()),
        };
        fs::write(&output, &decrypted.data)?;

        let report = FileReport {
            input: input.to_path_buf(),
            output,
            algorithm: decrypted.algorithm,
            input_bytes: envelope_bytes.len() as u64,
            output_bytes: decrypted.data.len() as u64,
            elapsed_ms: start.elapsed().as_secs_f64() * 1000.0,
        };
        info!(
            input = %report.input.display(),
            output = %report.output.display(),
            bytes = report.output_bytes,
            "file decrypted"
        );
        Ok(report)
    }

    /// Encrypt every file under `input_dir`, mirroring relative paths into
    /// `output_dir` (default `<input_dir>_encrypted`). A failing file is
    /// recorded and the walk continues.
    pub fn encrypt_directory(
        &self,
        input_dir: &Path,
        output_dir: Option<&Path>,
        session_id: &SessionId,
    ) -> Result<DirectoryReport> {
        // Fail fast on a bad session instead of once per file.
        self.store.get(session_id)?;

        if !input_dir.is_dir() {
            return Err(Error::Io(std::io::Error::new(
                std::io::ErrorKind::NotFound,
                format!("not a directory: {}", input_dir.display()),
            )));
        }

        let output_dir = match output_dir {
            Some(path) => path.to_path_buf(),
            None => default_encrypted_dir(input_dir)?,
        };
        fs::create_dir_all(&output_dir)?;

        // Collect first so files written into a nested output dir are not
        // picked up by the walk.
        let mut inputs = Vec::new();
        let mut files = Vec::new();
        for entry in WalkDir::new(input_dir).sort_by_file_name() {
            match entry {
                Ok(entry) if entry.file_type().is_file() => {
                    if !entry.path().starts_with(&output_dir) {
                        inputs.push(entry.into_path());
                    }
                }
                Ok(_) => {}
                Err(e) => {
                    let path = e.path().map(Path::to_path_buf).unwrap_or_default();
                    warn!(path = %path.display(), "skipping unreadable entry");
                    files.push(FileOutcome {
                        input: path,
                        result: Err(Error::Io(e.into())),
                    });
                }
            }
        }

        info!(
            dir = %input_dir.display(),
            files = inputs.len(),
            output = %output_dir.display(),
            "encrypting directory"
        );

        for input in inputs {
            let result = mirrored_output(input_dir, &input, &output_dir).and_then(|output| {
                self.encrypt_file(&input, Some(&output), session_id)
            });
            if let Err(e) = &result {
                warn!(path = %input.display(), error = %e, "file not encrypted");
            }
            files.push(FileOutcome { input, result });
        }

        let report = DirectoryReport {
            input_dir: input_dir.to_path_buf(),
            output_dir,
            files,
        };
        info!(
            succeeded = report.succeeded(),
            failed = report.failed(),
            "directory encrypted"
        );
        Ok(report)
    }
}

fn append_suffix(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(suffix);
    PathBuf::from(name)
}

/// `<name>_encrypted` beside `input_dir`. Built from the last path component
/// so a trailing separator does not put the output inside the input.
pub fn default_encrypted_dir(input_dir: &Path) -> Result<PathBuf> {
    // `.` and `..` have no final component until resolved.
    let resolved = match input_dir.file_name() {
        Some(_) => input_dir.to_path_buf(),
        None => fs::canonicalize(input_dir)?,
    };
    let name = resolved.file_name().ok_or_else(|| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!(
                "cannot derive an output name from {}, pass an output directory",
                input_dir.display()
            ),
        ))
    })?;
    let mut dir_name = name.to_os_string();
    dir_name.push("_encrypted");

    let parent = resolved.parent().unwrap_or_else(|| Path::new(""));
    Ok(parent.join(dir_name))
}

/// `decrypted_<name>` next to `input`. Only the final component of the hint
/// is used, so a hint cannot point outside the directory.
pub fn default_decrypted_path(input: &Path, filename_hint: Option<&str>) -> PathBuf {
    let name = filename_hint
        .and_then(|hint| Path::new(hint).file_name())
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| DEFAULT_DECRYPTED_NAME.to_string());

    let dir = input.parent().unwrap_or_else(|| Path::new(""));
    dir.join(format!("{}{}", DECRYPTED_PREFIX, name))
}

fn mirrored_output(input_dir: &Path, input: &Path, output_dir: &Path) -> Result<PathBuf> {
    let relative = input.strip_prefix(input_dir).map_err(|_| {
        Error::Io(std::io::Error::new(
            std::io::ErrorKind::InvalidInput,
            format!("{} is outside {}", input.display(), input_dir.display()),
        ))
    })?;
    let output = append_suffix(&output_dir.join(relative), ENCRYPTED_SUFFIX);
    if let Some(parent) = output.parent() {
        fs::create_dir_all(parent)?;
    }
    Ok(output)
}
