//! QBits - post-quantum file encryption.
//!
//! Encrypts files into authenticated envelopes using ML-KEM-768 (Kyber),
//! RSA-2048, or a hybrid of both for key encapsulation.

use anyhow::{bail, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use qbits::bench::{self, Metric};
use qbits::envelope;
use qbits::{crypto, Algorithm, FileCryptoService, KeyFile, ServiceConfig, SessionId};
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;
use zeroize::Zeroizing;

/// Exit code when the crypto backend fails its startup check.
const EXIT_SELF_TEST: i32 = 2;

#[derive(Parser)]
#[command(name = "qbits")]
#[command(author, version, about, long_about = None)]
#[command(
    about = "Post-quantum file encryption with ML-KEM-768 and AES-256-GCM",
    long_about = "Encrypts files into self-contained envelopes. Keys are generated per algorithm (kyber768, rsa2048, hybrid) and exported as JSON key files, optionally passphrase-protected."
)]
struct Cli {
    /// JSON configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair and write it to a key file
    Keygen {
        /// kyber768, rsa2048, or hybrid
        #[arg(long, default_value = "kyber768")]
        algorithm: Algorithm,

        /// Key file to write
        #[arg(long)]
        out: PathBuf,

        /// Seal the private key under a passphrase
        #[arg(long)]
        protect: bool,
    },

    /// Encrypt a file
    Encrypt {
        /// Key file
        #[arg(long)]
        key: PathBuf,

        /// File to encrypt
        input: PathBuf,

        /// Output file (default: <input>.encrypted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Decrypt an envelope
    Decrypt {
        /// Key file
        #[arg(long)]
        key: PathBuf,

        /// Envelope to decrypt
        input: PathBuf,

        /// Output file (default: decrypted_<original name>)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Encrypt every file in a directory tree
    EncryptDir {
        /// Key file
        #[arg(long)]
        key: PathBuf,

        /// Directory to encrypt
        dir: PathBuf,

        /// Output directory (default: <dir>_encrypted)
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Show an envelope's header without decrypting it
    Inspect {
        /// Envelope file
        envelope: PathBuf,
    },

    /// Compare key generation and encapsulation speed
    Bench {
        /// Rounds per algorithm
        #[arg(long, default_value = "10")]
        iterations: usize,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the crypto backend self-test
    SelfTest,
}

fn main() {
    let cli = Cli::parse();
    init_logging();

    if let Err(e) = crypto::self_test() {
        eprintln!("Error: crypto self-test failed: {}", e);
        std::process::exit(EXIT_SELF_TEST);
    }

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .try_init();
}

fn run(cli: Cli) -> Result<()> {
    let config = match &cli.config {
        Some(path) => ServiceConfig::load(path)
            .with_context(|| format!("loading config {}", path.display()))?,
        None => ServiceConfig::default(),
    };

    match cli.command {
        Commands::Keygen {
            algorithm,
            out,
            protect,
        } => cmd_keygen(&config, algorithm, &out, protect),

        Commands::Encrypt { key, input, output } => {
            cmd_encrypt(&config, &key, &input, output.as_deref())
        }

        Commands::Decrypt { key, input, output } => {
            cmd_decrypt(&config, &key, &input, output.as_deref())
        }

        Commands::EncryptDir { key, dir, output } => {
            cmd_encrypt_dir(&config, &key, &dir, output.as_deref())
        }

        Commands::Inspect { envelope } => cmd_inspect(&envelope),

        Commands::Bench { iterations, json } => cmd_bench(iterations, json),

        Commands::SelfTest => {
            // Already ran at startup.
            println!("Self-test passed");
            Ok(())
        }
    }
}

fn prompt_passphrase(prompt: &str) -> Result<Zeroizing<String>> {
    let passphrase =
        rpassword::prompt_password(prompt).context("reading passphrase from terminal")?;
    Ok(Zeroizing::new(passphrase))
}

/// Build a service and load `key_path` into a fresh session.
fn open_session(config: &ServiceConfig, key_path: &Path) -> Result<(FileCryptoService, SessionId)> {
    let service = FileCryptoService::from_config(config)?;
    let bytes = Zeroizing::new(
        std::fs::read(key_path).with_context(|| format!("reading {}", key_path.display()))?,
    );

    let file = KeyFile::parse(&bytes)?;
    let passphrase = if file.is_protected() {
        Some(prompt_passphrase("Key file passphrase: ")?)
    } else {
        None
    };

    let session = service
        .store()
        .import_key_file(&bytes, passphrase.as_ref().map(|p| p.as_str()))
        .with_context(|| format!("loading key file {}", key_path.display()))?;
    Ok((service, session))
}

fn cmd_keygen(config: &ServiceConfig, algorithm: Algorithm, out: &Path, protect: bool) -> Result<()> {
    let passphrase = if protect {
        let passphrase = prompt_passphrase("New passphrase: ")?;
        let confirm = prompt_passphrase("Confirm passphrase: ")?;
        if *passphrase != *confirm {
            bail!("passphrases do not match");
        }
        Some(passphrase)
    } else {
        None
    };

    let pair = qbits::keys::generate(algorithm)?;
    let file = KeyFile::from_key_pair(
        &pair,
        None,
        Utc::now(),
        passphrase.as_ref().map(|p| (p.as_str(), config.keyfile_kdf)),
    )?;
    file.write_to(out)
        .with_context(|| format!("writing {}", out.display()))?;

    println!("Key pair generated");
    println!("  Algorithm:    {}", algorithm);
    println!("  Quantum-safe: {}", if algorithm.is_quantum_safe() { "yes" } else { "no" });
    println!("  Public key:   {} bytes", pair.public_key_bytes()?.len());
    println!("  Protected:    {}", if protect { "yes" } else { "no" });
    println!("  Key file:     {}", out.display());

    Ok(())
}

fn cmd_encrypt(config: &ServiceConfig, key: &Path, input: &Path, output: Option<&Path>) -> Result<()> {
    let (service, session) = open_session(config, key)?;
    let report = service
        .encrypt_file(input, output, &session)
        .with_context(|| format!("encrypting {}", input.display()))?;

    println!("Encrypted {} with {}", report.input.display(), report.algorithm);
    println!("  Output:   {}", report.output.display());
    println!(
        "  Size:     {} -> {} bytes (overhead {:.1}%)",
        report.input_bytes,
        report.output_bytes,
        report.overhead_percent()
    );
    println!("  Time:     {:.2}ms", report.elapsed_ms);

    Ok(())
}

fn cmd_decrypt(config: &ServiceConfig, key: &Path, input: &Path, output: Option<&Path>) -> Result<()> {
    let (service, session) = open_session(config, key)?;
    let report = service
        .decrypt_file(input, output, &session)
        .with_context(|| format!("decrypting {}", input.display()))?;

    println!("Decrypted {} with {}", report.input.display(), report.algorithm);
    println!("  Output:   {}", report.output.display());
    println!("  Size:     {} bytes", report.output_bytes);
    println!("  Time:     {:.2}ms", report.elapsed_ms);

    Ok(())
}

fn cmd_encrypt_dir(config: &ServiceConfig, key: &Path, dir: &Path, output: Option<&Path>) -> Result<()> {
    let (service, session) = open_session(config, key)?;
    let report = service.encrypt_directory(dir, output, &session)?;

    for file in &report.files {
        match &file.result {
            Ok(done) => println!("  ok     {} -> {}", file.input.display(), done.output.display()),
            Err(e) => println!("  failed {}: {}", file.input.display(), e),
        }
    }
    println!();
    println!("Output directory: {}", report.output_dir.display());
    println!("Total files:      {}", report.files.len());
    println!("Successful:       {}", report.succeeded());
    println!("Failed:           {}", report.failed());

    if report.failed() > 0 {
        bail!("{} file(s) could not be encrypted", report.failed());
    }
    Ok(())
}

fn cmd_inspect(path: &Path) -> Result<()> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let envelope = envelope::decode(&bytes)?;
    let header = &envelope.header;

    println!("QBits Envelope");
    println!("==============");
    println!("Algorithm:        {}", header.algorithm);
    println!(
        "Quantum-safe:     {}",
        if header.algorithm.is_quantum_safe() { "yes" } else { "no" }
    );
    println!("KEM ciphertext:   {} bytes", header.kem_ciphertext.len());
    println!("Nonce:            {}", hex::encode(header.nonce));
    println!(
        "Filename hint:    {}",
        header.filename_hint.as_deref().unwrap_or("(none)")
    );
    println!("Ciphertext:       {} bytes", envelope.ciphertext.len());
    println!("Total size:       {} bytes", bytes.len());

    Ok(())
}

fn cmd_bench(iterations: usize, json: bool) -> Result<()> {
    let report = bench::run(&Algorithm::ALL, iterations)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    println!("Key encapsulation benchmark ({} iterations)", report.iterations);
    println!();
    println!(
        "{:<10} {:>12} {:>12} {:>12} {:>10} {:>10}",
        "Algorithm", "Keygen ms", "Encap ms", "Decap ms", "PK bytes", "CT bytes"
    );
    for r in &report.results {
        println!(
            "{:<10} {:>12.3} {:>12.3} {:>12.3} {:>10} {:>10}",
            r.algorithm.name(),
            r.keygen_ms,
            r.encapsulate_ms,
            r.decapsulate_ms,
            r.public_key_bytes,
            r.ciphertext_bytes
        );
    }

    println!();
    for metric in Metric::ALL {
        if let Some(ratio) = report.ratio(Algorithm::Kyber768, Algorithm::Rsa2048, metric) {
            let (winner, factor) = if ratio >= 1.0 {
                ("Kyber768", ratio)
            } else {
                ("RSA2048", 1.0 / ratio)
            };
            println!("{:<16} {} ({:.1}x)", metric.label(), winner, factor);
        }
    }

    Ok(())
}
