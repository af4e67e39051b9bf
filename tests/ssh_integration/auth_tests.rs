//! Authentication failure tests

use std::path::PathBuf;

use shellpool::error::ErrorKind;
use shellpool::ssh::Credentials;

/// Test wrong password authentication fails
#[tokio::test]
async fn test_wrong_password() {
    let server = require_server!();
    let pool = server.pool();

    let creds = Credentials::from_parts(Some("definitely-wrong".to_string()), None, None).unwrap();
    let err = pool
        .open("auth", &server.host, server.port, &server.username, creds)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuthError);
    assert!(pool.is_empty());
}

/// Test missing key file fails before any session is registered
#[tokio::test]
async fn test_missing_key_file() {
    let server = require_server!();
    let pool = server.pool();

    let creds = Credentials::from_parts(
        None,
        Some(PathBuf::from("/nonexistent/id_ed25519")),
        None,
    )
    .unwrap();
    let err = pool
        .open("auth", &server.host, server.port, &server.username, creds)
        .await
        .unwrap_err();

    assert_eq!(err.kind(), ErrorKind::AuthError);
    assert!(pool.list().is_empty());
}

/// Test key authentication when a key is configured
#[tokio::test]
async fn test_key_authentication() {
    let server = require_server!();
    let Some(key) = server.private_key_path.clone() else {
        eprintln!("Skipping test: SHELLPOOL_TEST_SSH_KEY not set");
        return;
    };
    let pool = server.pool();

    let creds = Credentials::from_parts(None, Some(key), None).unwrap();
    pool.open("key", &server.host, server.port, &server.username, creds)
        .await
        .unwrap();
    assert_eq!(pool.run("key", "echo ok").await.unwrap().stdout, "ok");
    pool.close("key").await.unwrap();
}
