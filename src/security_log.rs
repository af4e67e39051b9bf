//! Security event logging for audit trails.
//!
//! Structured events for host admission, authentication, host keys and
//! session lifecycle. Everything is logged with `target: "security"` so it
//! can be filtered on its own:
//!
//! ```bash
//! RUST_LOG=security=info shellpool
//! ```
//!
//! Passwords, passphrases and command output never appear here.

use tracing::{info, warn};

/// Log a host refused by the allowlist.
pub fn log_host_denied(session_id: &str, host: &str) {
    warn!(
        target: "security",
        event = "host_denied",
        session_id = %session_id,
        host = %host,
        "Host rejected by allowlist"
    );
}

/// Log an SSH authentication attempt.
///
/// Called before attempting to authenticate with a remote host.
pub fn log_auth_attempt(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_attempt",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication attempt"
    );
}

/// Log a successful SSH authentication.
pub fn log_auth_success(host: &str, port: u16, username: &str, method: &str) {
    info!(
        target: "security",
        event = "auth_success",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        "SSH authentication succeeded"
    );
}

/// Log a failed SSH authentication attempt.
pub fn log_auth_failure(host: &str, port: u16, username: &str, method: &str, reason: &str) {
    warn!(
        target: "security",
        event = "auth_failure",
        host = %host,
        port = port,
        username = %username,
        method = %method,
        reason = %reason,
        "SSH authentication failed"
    );
}

/// Log the server key presented during the handshake. Keys are not pinned.
pub fn log_host_key_seen(host: &str, port: u16, fingerprint: &str, key_type: &str) {
    info!(
        target: "security",
        event = "host_key_seen",
        host = %host,
        port = port,
        fingerprint = %fingerprint,
        key_type = %key_type,
        "Server host key accepted without verification"
    );
}

/// Log a session that finished dialing and entered the pool.
pub fn log_session_opened(session_id: &str, host: &str, port: u16, username: &str) {
    info!(
        target: "security",
        event = "session_opened",
        session_id = %session_id,
        host = %host,
        port = port,
        username = %username,
        "Shell session opened"
    );
}

/// Log a session leaving the pool.
pub fn log_session_closed(session_id: &str, host: &str, port: u16) {
    info!(
        target: "security",
        event = "session_closed",
        session_id = %session_id,
        host = %host,
        port = port,
        "Shell session closed"
    );
}

/// Log a command refused before it reached the shell.
pub fn log_command_rejected(session_id: &str, reason: &str) {
    warn!(
        target: "security",
        event = "command_rejected",
        session_id = %session_id,
        reason = %reason,
        "Command rejected"
    );
}
