use std::future::Future;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::task::JoinHandle;

use crate::error::SshError;

use super::auth::Credentials;

pub type BoxedWriter = Box<dyn AsyncWrite + Send + Unpin>;
pub type BoxedReader = Box<dyn AsyncRead + Send + Unpin>;

/// Where to dial and as whom
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DialTarget {
    pub host: String,
    pub port: u16,
    pub username: String,
}

impl DialTarget {
    pub fn new(host: impl Into<String>, port: u16, username: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port,
            username: username.into(),
        }
    }

    pub fn addr(&self) -> String {
        if self.host.contains(':') && !self.host.starts_with('[') {
            format!("[{}]:{}", self.host, self.port)
        } else {
            format!("{}:{}", self.host, self.port)
        }
    }
}

/// Duplex byte channel to a remote shell that has already been started.
///
/// Writing to `stdin` feeds the shell; `stdout` and `stderr` progress
/// independently. `driver` is the task that moves bytes between these pipes
/// and the transport, if there is one; it ends once `stdin` is shut down.
pub struct ShellChannel {
    pub stdin: BoxedWriter,
    pub stdout: BoxedReader,
    pub stderr: BoxedReader,
    pub driver: Option<JoinHandle<()>>,
}

impl ShellChannel {
    pub fn new(
        stdin: impl AsyncWrite + Send + Unpin + 'static,
        stdout: impl AsyncRead + Send + Unpin + 'static,
        stderr: impl AsyncRead + Send + Unpin + 'static,
    ) -> Self {
        Self {
            stdin: Box::new(stdin),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
            driver: None,
        }
    }

    pub fn with_driver(mut self, driver: JoinHandle<()>) -> Self {
        self.driver = Some(driver);
        self
    }
}

impl std::fmt::Debug for ShellChannel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellChannel")
            .field("stdin", &"<writer>")
            .field("stdout", &"<reader>")
            .field("stderr", &"<reader>")
            .field("driver", &self.driver.is_some())
            .finish()
    }
}

/// Source of authenticated shell channels.
///
/// Transport security and authentication are entirely the provider's
/// business; the pool only sees the resulting [`ShellChannel`].
pub trait ChannelProvider: Send + Sync + 'static {
    fn dial(
        &self,
        target: &DialTarget,
        credentials: &Credentials,
        timeout: Duration,
    ) -> impl Future<Output = Result<ShellChannel, SshError>> + Send;
}
