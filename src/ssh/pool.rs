use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;

use crate::config::{PoolSettings, ShellSettings};
use crate::error::SshError;
use crate::security_log;

use super::allowlist::HostAllowlist;
use super::auth::Credentials;
use super::channel::{ChannelProvider, DialTarget};
use super::session::{CommandResult, SessionState, ShellSession};

/// Identity of one live session. Never mutated after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionRecord {
    pub id: String,
    pub host: String,
    pub port: u16,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

struct Entry {
    record: SessionRecord,
    session: Arc<ShellSession>,
    /// Commit order, for `list`.
    seq: u64,
}

#[derive(Default)]
struct Registry {
    entries: HashMap<String, Entry>,
    /// Ids reserved by an `open` that is still dialing.
    pending: HashSet<String>,
    next_seq: u64,
}

impl Registry {
    fn occupied(&self) -> usize {
        self.entries.len() + self.pending.len()
    }
}

/// Releases a reserved id unless the open completed.
struct Reservation<'a> {
    registry: &'a RwLock<Registry>,
    id: String,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self, record: SessionRecord, session: Arc<ShellSession>) {
        let mut registry = self.registry.write();
        registry.pending.remove(&self.id);
        let seq = registry.next_seq;
        registry.next_seq += 1;
        registry
            .entries
            .insert(self.id.clone(), Entry { record, session, seq });
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.registry.write().pending.remove(&self.id);
        }
    }
}

/// Registry of named persistent shell sessions.
///
/// The registry lock is only ever held for map operations; dialing, shell
/// start, command execution and teardown all happen outside it. Each
/// session serializes its own commands.
pub struct SessionPool<P: ChannelProvider> {
    provider: P,
    allowlist: HostAllowlist,
    settings: PoolSettings,
    shell: ShellSettings,
    registry: RwLock<Registry>,
}

impl<P: ChannelProvider> SessionPool<P> {
    pub fn new(
        provider: P,
        allowlist: HostAllowlist,
        settings: PoolSettings,
        shell: ShellSettings,
    ) -> Self {
        Self {
            provider,
            allowlist,
            settings,
            shell,
            registry: RwLock::new(Registry::default()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.settings.max_sessions
    }

    /// Number of open sessions, not counting opens still in progress.
    pub fn len(&self) -> usize {
        self.registry.read().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dial `host`, start a shell and register it under `id`.
    ///
    /// Duplicate, capacity and host policy checks all run, in that order,
    /// before anything is dialed. The id stays reserved while dialing, so a
    /// concurrent open of the same id fails with `DuplicateId`, but the
    /// session is not visible to `run` or `list` until it is ready.
    pub async fn open(
        &self,
        id: &str,
        host: &str,
        port: u16,
        username: &str,
        credentials: Credentials,
    ) -> Result<SessionRecord, SshError> {
        let reservation = self.reserve(id)?;

        if let Err(e) = self.allowlist.check(host) {
            security_log::log_host_denied(id, host);
            return Err(e);
        }

        let target = DialTarget::new(host, port, username);
        tracing::info!(session = %id, addr = %target.addr(), username = %username, "Opening session");

        let channel = self
            .provider
            .dial(&target, &credentials, self.settings.dial_timeout())
            .await
            .inspect_err(|e| tracing::warn!(session = %id, "Dial failed: {}", e))?;

        let session = ShellSession::start(id, channel, self.shell.clone())
            .await
            .inspect_err(|e| tracing::warn!(session = %id, "Shell start failed: {}", e))?;

        let record = SessionRecord {
            id: id.to_string(),
            host: host.to_string(),
            port,
            username: username.to_string(),
            created_at: Utc::now(),
        };
        reservation.commit(record.clone(), Arc::new(session));

        security_log::log_session_opened(id, host, port, username);
        Ok(record)
    }

    fn reserve(&self, id: &str) -> Result<Reservation<'_>, SshError> {
        let mut registry = self.registry.write();

        if registry.entries.contains_key(id) || registry.pending.contains(id) {
            return Err(SshError::DuplicateId(id.to_string()));
        }

        if registry.occupied() >= self.settings.max_sessions {
            return Err(SshError::CapacityExceeded {
                limit: self.settings.max_sessions,
            });
        }

        registry.pending.insert(id.to_string());
        Ok(Reservation {
            registry: &self.registry,
            id: id.to_string(),
            committed: false,
        })
    }

    fn session(&self, id: &str) -> Result<Arc<ShellSession>, SshError> {
        self.registry
            .read()
            .entries
            .get(id)
            .map(|entry| entry.session.clone())
            .ok_or_else(|| SshError::NotFound(id.to_string()))
    }

    /// Run a command in session `id`.
    pub async fn run(&self, id: &str, command: &str) -> Result<CommandResult, SshError> {
        let session = self.session(id)?;
        session.run(command).await
    }

    /// Current state of session `id`.
    pub async fn state(&self, id: &str) -> Result<SessionState, SshError> {
        let session = self.session(id)?;
        Ok(session.state().await)
    }

    /// Remove session `id` and tear it down. Teardown problems are logged,
    /// never returned.
    pub async fn close(&self, id: &str) -> Result<(), SshError> {
        let entry = self
            .registry
            .write()
            .entries
            .remove(id)
            .ok_or_else(|| SshError::NotFound(id.to_string()))?;

        entry.session.close().await;
        security_log::log_session_closed(id, &entry.record.host, entry.record.port);
        Ok(())
    }

    /// Snapshot of all ready sessions, oldest first.
    pub fn list(&self) -> Vec<SessionRecord> {
        let registry = self.registry.read();
        let mut entries: Vec<&Entry> = registry.entries.values().collect();
        entries.sort_by_key(|entry| entry.seq);
        entries.into_iter().map(|entry| entry.record.clone()).collect()
    }

    /// Close every session concurrently. Returns how many were closed.
    pub async fn close_all(&self) -> usize {
        let entries: Vec<(String, Entry)> = self.registry.write().entries.drain().collect();
        let count = entries.len();

        futures::future::join_all(entries.into_iter().map(|(id, entry)| async move {
            entry.session.close().await;
            security_log::log_session_closed(&id, &entry.record.host, entry.record.port);
        }))
        .await;

        if count > 0 {
            tracing::info!(count, "Closed all sessions");
        }
        count
    }
}
