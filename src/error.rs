use std::path::PathBuf;
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;

use crate::validation::ValidationError;

/// Configuration-related errors
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("No allowed hosts specified")]
    EmptyAllowlist,

    #[error("No valid host patterns provided")]
    NoValidPatterns,

    #[error("Invalid host pattern '{pattern}': {reason}")]
    InvalidPattern { pattern: String, reason: String },
}

/// Errors surfaced by the session pool and the sessions it owns
#[derive(Error, Debug)]
pub enum SshError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("Host '{0}' is not in the allowed hosts list")]
    HostDenied(String),

    #[error("Session with ID '{0}' already exists")]
    DuplicateId(String),

    #[error("Session '{0}' not found")]
    NotFound(String),

    #[error("Session limit reached ({limit} sessions)")]
    CapacityExceeded { limit: usize },

    #[error("Connection failed to {host}:{port}: {reason}")]
    ConnectionFailed {
        host: String,
        port: u16,
        reason: String,
    },

    #[error("Timeout connecting to {0}")]
    Timeout(String),

    #[error("Authentication failed: {0}")]
    AuthenticationFailed(String),

    #[error("Key file error: {0}")]
    KeyFile(String),

    #[error("Key file '{}' is encrypted and needs a passphrase", .0.display())]
    KeyFilePassphraseRequired(PathBuf),

    #[error("Wrong passphrase for key file '{}'", .0.display())]
    KeyFilePassphraseInvalid(PathBuf),

    #[error("Channel error: {0}")]
    Channel(String),

    #[error("Invalid command: {0}")]
    InvalidCommand(String),

    #[error("Command timed out after {}s", .0.as_secs_f64())]
    CommandTimeout(Duration),

    #[error("Stream error: {0}")]
    Stream(String),

    #[error("Session is unusable and must be closed: {0}")]
    SessionUnusable(String),

    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("russh error: {0}")]
    Russh(String),
}

impl From<russh::Error> for SshError {
    fn from(err: russh::Error) -> Self {
        SshError::Russh(err.to_string())
    }
}

/// Failure categories reported to callers of the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    ConfigError,
    HostDenied,
    DuplicateId,
    NotFound,
    CapacityExceeded,
    DialError,
    AuthError,
    InvalidCommand,
    CommandTimeout,
    StreamError,
    SessionUnusable,
    InvalidRequest,
}

impl SshError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            SshError::Config(_) => ErrorKind::ConfigError,
            SshError::HostDenied(_) => ErrorKind::HostDenied,
            SshError::DuplicateId(_) => ErrorKind::DuplicateId,
            SshError::NotFound(_) => ErrorKind::NotFound,
            SshError::CapacityExceeded { .. } => ErrorKind::CapacityExceeded,
            SshError::ConnectionFailed { .. }
            | SshError::Timeout(_)
            | SshError::Channel(_)
            | SshError::Russh(_) => ErrorKind::DialError,
            SshError::AuthenticationFailed(_)
            | SshError::KeyFile(_)
            | SshError::KeyFilePassphraseRequired(_)
            | SshError::KeyFilePassphraseInvalid(_) => ErrorKind::AuthError,
            SshError::InvalidCommand(_) => ErrorKind::InvalidCommand,
            SshError::CommandTimeout(_) => ErrorKind::CommandTimeout,
            SshError::Stream(_) => ErrorKind::StreamError,
            SshError::SessionUnusable(_) => ErrorKind::SessionUnusable,
            SshError::Validation(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Only a full pool is worth retrying later; everything else needs the
    /// caller to change something first.
    pub fn is_retryable(&self) -> bool {
        matches!(self, SshError::CapacityExceeded { .. })
    }
}
