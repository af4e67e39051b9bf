//! Persistent remote shells over SSH.
//!
//! A [`SessionPool`] owns named [`ShellSession`]s, each one a long-lived
//! shell reached through a [`ShellChannel`] from some [`ChannelProvider`].

pub mod allowlist;
pub mod auth;
pub mod channel;
pub mod client;
pub mod framing;
pub mod handler;
pub mod pool;
pub mod session;

pub use allowlist::HostAllowlist;
pub use auth::Credentials;
pub use channel::{ChannelProvider, DialTarget, ShellChannel};
pub use client::SshClient;
pub use pool::{SessionPool, SessionRecord};
pub use session::{CommandResult, SessionState, ShellSession};
