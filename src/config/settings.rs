use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Server-wide settings stored in config.toml
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct AppConfig {
    /// Comma-separated host patterns, e.g. `*.example.com,10.0.*`
    #[serde(default)]
    pub allowed_hosts: Option<String>,
    #[serde(default)]
    pub pool: PoolSettings,
    #[serde(default)]
    pub shell: ShellSettings,
    #[serde(default)]
    pub ssh: SshDefaults,
}

impl AppConfig {
    /// Load from an explicit path, or from the default location if a file
    /// exists there, or fall back to defaults.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::load_from(path),
            None => match super::paths::config_file() {
                Some(path) if path.exists() => Self::load_from(&path),
                _ => Ok(Self::default()),
            },
        }
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: PathBuf::from(path),
            source: e,
        })?;

        toml::from_str(&content).map_err(ConfigError::Parse)
    }

    /// Command-line value wins over the file.
    pub fn with_allowed_hosts(mut self, allowed_hosts: Option<String>) -> Self {
        if allowed_hosts.is_some() {
            self.allowed_hosts = allowed_hosts;
        }
        self
    }
}

fn default_max_sessions() -> usize {
    100
}

fn default_dial_timeout() -> u64 {
    10
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PoolSettings {
    #[serde(default = "default_max_sessions")]
    pub max_sessions: usize,
    #[serde(default = "default_dial_timeout")]
    pub dial_timeout_secs: u64,
}

impl PoolSettings {
    pub fn dial_timeout(&self) -> Duration {
        Duration::from_secs(self.dial_timeout_secs)
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            max_sessions: default_max_sessions(),
            dial_timeout_secs: default_dial_timeout(),
        }
    }
}

fn default_command_timeout() -> u64 {
    30
}

fn default_startup_settle() -> u64 {
    200
}

fn default_init_settle() -> u64 {
    100
}

fn default_stderr_quiet() -> u64 {
    100
}

fn default_stderr_window() -> u64 {
    1000
}

fn default_poll_interval() -> u64 {
    10
}

fn default_close_timeout() -> u64 {
    2000
}

fn default_max_command_bytes() -> usize {
    1024 * 1024
}

fn default_max_output_bytes() -> usize {
    10 * 1024 * 1024
}

/// Timing and size limits for one shell session.
///
/// The settle delays are a best-effort wait for shell startup noise; tune
/// them for slow hosts rather than treating them as protocol constants.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ShellSettings {
    #[serde(default = "default_command_timeout")]
    pub command_timeout_secs: u64,
    #[serde(default = "default_startup_settle")]
    pub startup_settle_ms: u64,
    #[serde(default = "default_init_settle")]
    pub init_settle_ms: u64,
    #[serde(default = "default_stderr_quiet")]
    pub stderr_quiet_ms: u64,
    /// Hard cap on stderr reading once stdout has completed, even if stderr
    /// never goes quiet.
    #[serde(default = "default_stderr_window")]
    pub stderr_window_ms: u64,
    #[serde(default = "default_poll_interval")]
    pub poll_interval_ms: u64,
    #[serde(default = "default_close_timeout")]
    pub close_timeout_ms: u64,
    #[serde(default = "default_max_command_bytes")]
    pub max_command_bytes: usize,
    #[serde(default = "default_max_output_bytes")]
    pub max_output_bytes: usize,
}

impl ShellSettings {
    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.command_timeout_secs)
    }

    pub fn startup_settle(&self) -> Duration {
        Duration::from_millis(self.startup_settle_ms)
    }

    pub fn init_settle(&self) -> Duration {
        Duration::from_millis(self.init_settle_ms)
    }

    pub fn stderr_quiet(&self) -> Duration {
        Duration::from_millis(self.stderr_quiet_ms)
    }

    pub fn stderr_window(&self) -> Duration {
        Duration::from_millis(self.stderr_window_ms)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(1))
    }

    pub fn close_timeout(&self) -> Duration {
        Duration::from_millis(self.close_timeout_ms)
    }
}

impl Default for ShellSettings {
    fn default() -> Self {
        Self {
            command_timeout_secs: default_command_timeout(),
            startup_settle_ms: default_startup_settle(),
            init_settle_ms: default_init_settle(),
            stderr_quiet_ms: default_stderr_quiet(),
            stderr_window_ms: default_stderr_window(),
            poll_interval_ms: default_poll_interval(),
            close_timeout_ms: default_close_timeout(),
            max_command_bytes: default_max_command_bytes(),
            max_output_bytes: default_max_output_bytes(),
        }
    }
}

fn default_keepalive() -> u64 {
    60
}

fn default_port() -> u16 {
    22
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SshDefaults {
    #[serde(default = "default_keepalive")]
    pub keepalive_interval_secs: u64,
    #[serde(default = "default_port")]
    pub default_port: u16,
}

impl Default for SshDefaults {
    fn default() -> Self {
        Self {
            keepalive_interval_secs: default_keepalive(),
            default_port: default_port(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn defaults_match_documented_limits() {
        let config = AppConfig::default();
        assert_eq!(config.allowed_hosts, None);
        assert_eq!(config.pool.max_sessions, 100);
        assert_eq!(config.pool.dial_timeout(), Duration::from_secs(10));
        assert_eq!(config.shell.command_timeout(), Duration::from_secs(30));
        assert_eq!(config.shell.max_command_bytes, 1024 * 1024);
        assert_eq!(config.shell.max_output_bytes, 10 * 1024 * 1024);
        assert_eq!(config.ssh.default_port, 22);
    }

    #[test]
    fn empty_toml_uses_defaults() {
        let config: AppConfig = toml::from_str("").unwrap();
        assert_eq!(config, AppConfig::default());
    }

    #[test]
    fn partial_toml_overrides_only_given_keys() {
        let config: AppConfig = toml::from_str(
            r#"
allowed_hosts = "*.example.com"

[pool]
max_sessions = 5

[shell]
command_timeout_secs = 3
"#,
        )
        .unwrap();

        assert_eq!(config.allowed_hosts.as_deref(), Some("*.example.com"));
        assert_eq!(config.pool.max_sessions, 5);
        assert_eq!(config.pool.dial_timeout_secs, 10);
        assert_eq!(config.shell.command_timeout_secs, 3);
        assert_eq!(config.shell.stderr_quiet_ms, 100);
        assert_eq!(config.shell.stderr_window_ms, 1000);
    }

    #[test]
    fn load_from_reads_file() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "allowed_hosts = \"10.0.*\"\n[ssh]\ndefault_port = 2222\n")
            .expect("write config");

        let config = AppConfig::load(Some(&path)).unwrap();
        assert_eq!(config.allowed_hosts.as_deref(), Some("10.0.*"));
        assert_eq!(config.ssh.default_port, 2222);
    }

    #[test]
    fn load_from_missing_file_fails() {
        let dir = tempdir().expect("temp dir");
        let err = AppConfig::load(Some(&dir.path().join("missing.toml"))).unwrap_err();
        assert!(matches!(err, ConfigError::ReadFile { .. }));
    }

    #[test]
    fn load_from_invalid_toml_fails() {
        let dir = tempdir().expect("temp dir");
        let path = dir.path().join("config.toml");
        fs::write(&path, "[pool\nmax_sessions = ").expect("write config");
        assert!(matches!(
            AppConfig::load_from(&path).unwrap_err(),
            ConfigError::Parse(_)
        ));
    }

    #[test]
    fn command_line_allowlist_wins() {
        let config = AppConfig {
            allowed_hosts: Some("file.example.com".to_string()),
            ..Default::default()
        };
        let merged = config
            .clone()
            .with_allowed_hosts(Some("cli.example.com".to_string()));
        assert_eq!(merged.allowed_hosts.as_deref(), Some("cli.example.com"));

        let kept = config.with_allowed_hosts(None);
        assert_eq!(kept.allowed_hosts.as_deref(), Some("file.example.com"));
    }

    #[test]
    fn poll_interval_never_zero() {
        let settings = ShellSettings {
            poll_interval_ms: 0,
            ..Default::default()
        };
        assert_eq!(settings.poll_interval(), Duration::from_millis(1));
    }
}
