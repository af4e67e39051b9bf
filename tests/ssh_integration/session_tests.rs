//! Persistent shell behavior over a real SSH connection

use std::time::{Duration, Instant};

use shellpool::error::ErrorKind;

#[tokio::test]
async fn test_environment_persists() {
    let server = require_server!();
    let pool = server.pool();
    pool.open("env", &server.host, server.port, &server.username, server.password_credentials())
        .await
        .unwrap();

    pool.run("env", "export FOO=bar").await.unwrap();
    let echo = pool.run("env", "echo $FOO").await.unwrap();
    assert_eq!(echo.stdout, "bar");
    assert_eq!(echo.exit_code, 0);

    let failed = pool.run("env", "ls /definitely/not/here").await.unwrap();
    assert_ne!(failed.exit_code, 0);
    assert!(!failed.stderr.is_empty());

    pool.close("env").await.unwrap();
}

#[tokio::test]
async fn test_command_timeout() {
    let server = require_server!();
    let pool = server.pool();
    pool.open("slow", &server.host, server.port, &server.username, server.password_credentials())
        .await
        .unwrap();

    let started = Instant::now();
    let err = pool.run("slow", "sleep 30").await.unwrap_err();
    assert_eq!(err.kind(), ErrorKind::CommandTimeout);
    assert!(started.elapsed() < Duration::from_secs(7));

    pool.close("slow").await.unwrap();
}

#[tokio::test]
async fn test_parallel_sessions() {
    let server = require_server!();
    let pool = server.pool();
    for id in ["a", "b"] {
        pool.open(id, &server.host, server.port, &server.username, server.password_credentials())
            .await
            .unwrap();
    }

    pool.run("a", "export WHO=a").await.unwrap();
    pool.run("b", "export WHO=b").await.unwrap();
    let (a, b) = tokio::join!(pool.run("a", "echo $WHO"), pool.run("b", "echo $WHO"));
    assert_eq!(a.unwrap().stdout, "a");
    assert_eq!(b.unwrap().stdout, "b");

    assert_eq!(pool.close_all().await, 2);
}
