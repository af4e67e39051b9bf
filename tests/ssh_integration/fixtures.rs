//! Environment-configured SSH test server

use std::path::PathBuf;
use std::time::Duration;

use tokio::net::TcpStream;
use tokio::time::timeout;

use shellpool::config::{PoolSettings, ShellSettings};
use shellpool::ssh::{Credentials, HostAllowlist, SessionPool, SshClient};

/// Configuration for the test SSH server
#[derive(Debug, Clone)]
pub struct TestSshServer {
    pub host: String,
    pub port: u16,
    pub username: String,
    pub password: String,
    pub private_key_path: Option<PathBuf>,
}

impl TestSshServer {
    /// Read the server from `SHELLPOOL_TEST_SSH_*`; `None` if no host is set.
    pub fn from_env() -> Option<Self> {
        let host = std::env::var("SHELLPOOL_TEST_SSH_HOST").ok()?;
        let port = std::env::var("SHELLPOOL_TEST_SSH_PORT")
            .ok()
            .and_then(|p| p.parse().ok())
            .unwrap_or(22);
        Some(Self {
            host,
            port,
            username: std::env::var("SHELLPOOL_TEST_SSH_USER").unwrap_or_else(|_| "testuser".to_string()),
            password: std::env::var("SHELLPOOL_TEST_SSH_PASSWORD").unwrap_or_default(),
            private_key_path: std::env::var("SHELLPOOL_TEST_SSH_KEY").ok().map(PathBuf::from),
        })
    }

    pub fn password_credentials(&self) -> Credentials {
        Credentials::from_parts(Some(self.password.clone()), None, None)
            .expect("password credentials")
    }

    pub fn pool(&self) -> SessionPool<SshClient> {
        SessionPool::new(
            SshClient::default(),
            HostAllowlist::compile(&self.host).expect("allowlist"),
            PoolSettings {
                max_sessions: 4,
                dial_timeout_secs: 10,
            },
            ShellSettings {
                command_timeout_secs: 5,
                ..Default::default()
            },
        )
    }
}

/// The configured server, if it accepts TCP connections.
pub async fn available_server() -> Option<TestSshServer> {
    let server = TestSshServer::from_env()?;
    let addr = format!("{}:{}", server.host, server.port);
    match timeout(Duration::from_secs(2), TcpStream::connect(&addr)).await {
        Ok(Ok(_)) => Some(server),
        _ => {
            eprintln!("SSH test server {} not reachable", addr);
            None
        }
    }
}

/// Macro to skip tests when no SSH server is configured
#[macro_export]
macro_rules! require_server {
    () => {
        match super::fixtures::available_server().await {
            Some(server) => server,
            None => {
                eprintln!("Skipping test: no SSH test server");
                return;
            }
        }
    };
}
