//! End-to-end tests for sessions, key files, and file encryption.

use qbits::config::{KdfParams, SessionPolicy};
use qbits::{Algorithm, Error, ErrorKind, FileCryptoService, SessionStore};
use std::fs;
use tempfile::TempDir;

fn service() -> FileCryptoService {
    let store = SessionStore::in_memory(SessionPolicy::default()).with_keyfile_kdf(KdfParams {
        memory_kib: 1024,
        iterations: 1,
        parallelism: 1,
    });
    FileCryptoService::new(store)
}

/// Deterministic, non-repeating test payload.
fn payload(len: usize) -> Vec<u8> {
    (0..len).map(|i| (i * 31 % 251) as u8).collect()
}

#[test]
fn test_roundtrip_every_algorithm() {
    let service = service();

    for algorithm in Algorithm::ALL {
        let session = service
            .generate_session(algorithm)
            .expect("Failed to create session");

        for data in [Vec::new(), b"x".to_vec(), payload(70_000)] {
            let envelope = service.encrypt(&data, &session).expect("Failed to encrypt");
            let decrypted = service
                .decrypt(&envelope, &session)
                .expect("Failed to decrypt");
            assert_eq!(decrypted, data, "{} round trip", algorithm);
        }
    }
}

#[test]
fn test_kyber_export_import_scenario() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let original = payload(10 * 1024);
    let input = temp_dir.path().join("report.bin");
    fs::write(&input, &original).expect("Failed to write input");

    // First process: generate, encrypt, export.
    let (envelope_path, key_json) = {
        let service = service();
        let session = service
            .generate_session(Algorithm::Kyber768)
            .expect("Failed to create session");
        let report = service
            .encrypt_file(&input, None, &session)
            .expect("Failed to encrypt file");
        let key_json = service
            .store()
            .export_key_file(&session, None)
            .expect("Failed to export key file");
        (report.output, key_json)
    };

    // Second process: import and decrypt.
    let service = service();
    let session = service
        .store()
        .import_key_file(&key_json, None)
        .expect("Failed to import key file");
    let report = service
        .decrypt_file(&envelope_path, None, &session)
        .expect("Failed to decrypt file");

    assert_eq!(report.output, temp_dir.path().join("decrypted_report.bin"));
    assert_eq!(fs::read(&report.output).expect("Failed to read output"), original);
}

#[test]
fn test_protected_key_file_scenario() {
    let data = payload(4096);

    let (envelope, key_json) = {
        let service = service();
        let session = service
            .generate_session(Algorithm::Kyber768)
            .expect("Failed to create session");
        let envelope = service.encrypt(&data, &session).expect("Failed to encrypt");
        let key_json = service
            .store()
            .export_key_file(&session, Some("tr0ub4dor"))
            .expect("Failed to export key file");
        (envelope, key_json)
    };

    let service = service();
    let err = service
        .store()
        .import_key_file(&key_json, Some("wrong"))
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidKeyFile);

    let session = service
        .store()
        .import_key_file(&key_json, Some("tr0ub4dor"))
        .expect("Failed to import key file");
    assert_eq!(
        service.decrypt(&envelope, &session).expect("Failed to decrypt"),
        data
    );
}

#[test]
fn test_fresh_session_cannot_decrypt() {
    let service = service();
    let a = service
        .generate_session(Algorithm::Kyber768)
        .expect("Failed to create session");
    let b = service
        .generate_session(Algorithm::Kyber768)
        .expect("Failed to create session");

    let envelope = service.encrypt(b"only for a", &a).expect("Failed to encrypt");
    let err = service.decrypt(&envelope, &b).unwrap_err();
    assert!(matches!(err, Error::AuthenticationFailure));
}

#[test]
fn test_rsa_wrong_key_fails_authentication() {
    let service = service();
    let a = service
        .generate_session(Algorithm::Rsa2048)
        .expect("Failed to create session");
    let b = service
        .generate_session(Algorithm::Rsa2048)
        .expect("Failed to create session");

    let envelope = service.encrypt(b"classical", &a).expect("Failed to encrypt");
    let err = service.decrypt(&envelope, &b).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::AuthenticationFailure);
}

#[test]
fn test_imported_session_is_isolated() {
    let service = service();
    let s1 = service
        .generate_session(Algorithm::Kyber768)
        .expect("Failed to create session");
    let other = service
        .generate_session(Algorithm::Kyber768)
        .expect("Failed to create session");

    let key_json = service
        .store()
        .export_key_file(&s1, None)
        .expect("Failed to export key file");
    let s2 = service
        .store()
        .import_key_file(&key_json, None)
        .expect("Failed to import key file");

    // S2 opens what S1 sealed, and S1 opens what S2 sealed.
    let from_s1 = service.encrypt(b"one", &s1).expect("Failed to encrypt");
    let from_s2 = service.encrypt(b"two", &s2).expect("Failed to encrypt");
    assert_eq!(service.decrypt(&from_s1, &s2).expect("Failed to decrypt"), b"one");
    assert_eq!(service.decrypt(&from_s2, &s1).expect("Failed to decrypt"), b"two");

    // Nothing else.
    let from_other = service.encrypt(b"three", &other).expect("Failed to encrypt");
    assert_eq!(
        service.decrypt(&from_other, &s2).unwrap_err().kind(),
        ErrorKind::AuthenticationFailure
    );

    // Evicting the original leaves the import usable.
    assert!(service.store().evict(&s1).expect("Failed to evict"));
    assert_eq!(service.decrypt(&from_s1, &s2).expect("Failed to decrypt"), b"one");
    assert_eq!(
        service.decrypt(&from_s1, &s1).unwrap_err().kind(),
        ErrorKind::SessionNotFound
    );
}

#[test]
fn test_hybrid_key_file_roundtrip() {
    let service = service();
    let session = service
        .generate_session(Algorithm::Hybrid)
        .expect("Failed to create session");
    let envelope = service.encrypt(b"belt and braces", &session).expect("Failed to encrypt");

    let key_json = service
        .store()
        .export_key_file(&session, None)
        .expect("Failed to export key file");
    let restored = service
        .store()
        .import_key_file(&key_json, None)
        .expect("Failed to import key file");

    assert_eq!(
        service.decrypt(&envelope, &restored).expect("Failed to decrypt"),
        b"belt and braces"
    );
}

#[test]
fn test_encrypt_directory_mirrors_tree() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("docs");
    fs::create_dir_all(input.join("nested/deeper")).expect("Failed to create dirs");
    fs::write(input.join("a.txt"), b"alpha").expect("Failed to write");
    fs::write(input.join("nested/b.txt"), b"bravo").expect("Failed to write");
    fs::write(input.join("nested/deeper/c.bin"), payload(3000)).expect("Failed to write");

    let service = service();
    let session = service
        .generate_session(Algorithm::Kyber768)
        .expect("Failed to create session");
    let report = service
        .encrypt_directory(&input, None, &session)
        .expect("Failed to encrypt directory");

    let output = temp_dir.path().join("docs_encrypted");
    assert_eq!(report.output_dir, output);
    assert_eq!(report.files.len(), 3);
    assert_eq!(report.succeeded(), 3);
    assert_eq!(report.failed(), 0);

    for (relative, expected) in [
        ("a.txt", b"alpha".to_vec()),
        ("nested/b.txt", b"bravo".to_vec()),
        ("nested/deeper/c.bin", payload(3000)),
    ] {
        let encrypted = output.join(format!("{}.encrypted", relative));
        let decrypted = service
            .decrypt_with_hint(&fs::read(&encrypted).expect("Failed to read"), &session)
            .expect("Failed to decrypt");
        assert_eq!(decrypted.data, expected);

        let name = std::path::Path::new(relative).file_name().unwrap();
        assert_eq!(
            decrypted.filename_hint.as_deref(),
            Some(name.to_str().unwrap())
        );
    }
}

#[test]
fn test_encrypt_directory_requires_session() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let service = service();
    let err = service
        .encrypt_directory(temp_dir.path(), None, &"missing".into())
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::SessionNotFound);
}

#[test]
fn test_encrypt_directory_trailing_slash() {
    let temp_dir = TempDir::new().expect("Failed to create temp dir");
    let input = temp_dir.path().join("docs");
    fs::create_dir_all(&input).expect("Failed to create dirs");
    fs::write(input.join("a.txt"), b"alpha").expect("Failed to write");

    let service = service();
    let session = service
        .generate_session(Algorithm::Kyber768)
        .expect("Failed to create session");

    let with_slash = std::path::PathBuf::from(format!("{}/", input.display()));
    let report = service
        .encrypt_directory(&with_slash, None, &session)
        .expect("Failed to encrypt directory");

    let output = temp_dir.path().join("docs_encrypted");
    assert_eq!(report.output_dir, output);
    assert!(!report.output_dir.starts_with(&input));
    assert_eq!(report.succeeded(), 1);
    assert!(output.join("a.txt.encrypted").is_file());
    assert!(!input.join("_encrypted").exists());
}
