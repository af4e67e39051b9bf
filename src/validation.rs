//! Input validation for caller-provided request fields.
//!
//! Provides validation functions for session ids, hosts, ports, usernames
//! and credential selection so that malformed requests are rejected before
//! the pool or the network is touched.

use std::path::Path;

use regex::Regex;
use std::sync::LazyLock;

/// Maximum length of a caller-chosen session id.
pub const MAX_SESSION_ID_LEN: usize = 128;

/// Validation error with field context.
#[derive(Debug, Clone)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ValidationError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ValidationError {}

static SESSION_ID_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_-]+$").unwrap());

/// Validate a session id.
///
/// Ids are 1-128 characters of ASCII letters, digits, dash or underscore.
pub fn validate_session_id(id: &str) -> Result<(), ValidationError> {
    if id.is_empty() {
        return Err(ValidationError::new("id", "Session id cannot be empty"));
    }

    if id.len() > MAX_SESSION_ID_LEN {
        return Err(ValidationError::new(
            "id",
            format!("Session id too long (max {} characters)", MAX_SESSION_ID_LEN),
        ));
    }

    if !SESSION_ID_REGEX.is_match(id) {
        return Err(ValidationError::new(
            "id",
            "Session id contains invalid characters (only alphanumeric, dash, underscore allowed)",
        ));
    }

    Ok(())
}

/// Validate a host string. Policy checks happen in the allowlist; this only
/// rejects values that cannot name a host at all.
pub fn validate_host(host: &str) -> Result<(), ValidationError> {
    if host.trim().is_empty() {
        return Err(ValidationError::new("host", "Host cannot be empty"));
    }

    if host.chars().any(|c| c.is_whitespace() || c.is_control()) {
        return Err(ValidationError::new(
            "host",
            "Host cannot contain whitespace or control characters",
        ));
    }

    Ok(())
}

/// Validate a port number and narrow it.
///
/// # Errors
///
/// Returns `ValidationError` if the port is outside 1-65535.
pub fn validate_port(port: i64) -> Result<u16, ValidationError> {
    match u16::try_from(port) {
        Ok(port) if port >= 1 => Ok(port),
        _ => Err(ValidationError::new(
            "port",
            format!("Port must be between 1 and 65535, got {}", port),
        )),
    }
}

/// Validate a remote username.
pub fn validate_username(username: &str) -> Result<(), ValidationError> {
    if username.trim().is_empty() {
        return Err(ValidationError::new("username", "Username cannot be empty"));
    }

    if username.chars().any(|c| c.is_control()) {
        return Err(ValidationError::new(
            "username",
            "Username cannot contain control characters",
        ));
    }

    Ok(())
}

/// Validate that exactly one authentication method was supplied.
pub fn validate_auth_method(
    password: Option<&str>,
    key_path: Option<&Path>,
) -> Result<(), ValidationError> {
    let password = password.filter(|p| !p.is_empty());
    let key_path = key_path.filter(|p| !p.as_os_str().is_empty());

    match (password, key_path) {
        (Some(_), None) | (None, Some(_)) => Ok(()),
        (None, None) => Err(ValidationError::new(
            "auth",
            "Either 'password' or 'key_path' must be provided",
        )),
        (Some(_), Some(_)) => Err(ValidationError::new(
            "auth",
            "Provide only one of 'password' or 'key_path'",
        )),
    }
}
