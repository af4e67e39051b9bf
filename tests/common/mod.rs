//! Common test utilities
//!
//! Channel providers that stand in for SSH: a scripted in-process shell and,
//! on Unix, a real local `sh`.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, DuplexStream};

use shellpool::config::{PoolSettings, ShellSettings};
use shellpool::error::SshError;
use shellpool::ssh::{ChannelProvider, Credentials, DialTarget, HostAllowlist, SessionPool, ShellChannel};

pub const BANNER: &str = "Welcome to fake-sh\nLast login: never\n$ ";

/// Shell timings short enough for tests.
pub fn fast_shell_settings() -> ShellSettings {
    ShellSettings {
        command_timeout_secs: 2,
        startup_settle_ms: 20,
        init_settle_ms: 10,
        stderr_quiet_ms: 30,
        poll_interval_ms: 2,
        close_timeout_ms: 500,
        ..Default::default()
    }
}

pub fn password() -> Credentials {
    Credentials::from_parts(Some("secret".to_string()), None, None).expect("password credentials")
}

pub fn pool_with<P: ChannelProvider>(
    provider: P,
    max_sessions: usize,
    shell: ShellSettings,
) -> SessionPool<P> {
    SessionPool::new(
        provider,
        HostAllowlist::compile("*.example.com,localhost,10.0.*").expect("allowlist"),
        PoolSettings {
            max_sessions,
            dial_timeout_secs: 2,
        },
        shell,
    )
}

/// Scripted in-process shell.
///
/// Understands just enough to exercise sessions: `export`, `echo` (with
/// `$VAR`, `$?` and `>&2`), `cd`/`pwd`, `sleep`, `true`, `false`, `exit`
/// and `;` separated lists. Everything else is "command not found".
#[derive(Clone, Default)]
pub struct FakeShellProvider {
    dials: Arc<AtomicUsize>,
    received: Arc<Mutex<Vec<String>>>,
    dial_delay: Duration,
}

impl FakeShellProvider {
    pub fn new() -> Self {
        Self::default()
    }

    /// Dial takes `delay` before the channel is handed back.
    pub fn with_dial_delay(delay: Duration) -> Self {
        Self {
            dial_delay: delay,
            ..Self::default()
        }
    }

    pub fn dials(&self) -> usize {
        self.dials.load(Ordering::SeqCst)
    }

    /// Every line any fake shell received on stdin.
    pub fn received(&self) -> Vec<String> {
        self.received.lock().clone()
    }
}

impl ChannelProvider for FakeShellProvider {
    async fn dial(
        &self,
        _target: &DialTarget,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<ShellChannel, SshError> {
        self.dials.fetch_add(1, Ordering::SeqCst);
        if !self.dial_delay.is_zero() {
            tokio::time::sleep(self.dial_delay).await;
        }

        let (stdin_local, stdin_remote) = tokio::io::duplex(64 * 1024);
        let (stdout_local, stdout_remote) = tokio::io::duplex(64 * 1024);
        let (stderr_local, stderr_remote) = tokio::io::duplex(64 * 1024);

        let shell = FakeShell {
            env: HashMap::new(),
            status: 0,
            stdout: stdout_remote,
            stderr: stderr_remote,
            received: self.received.clone(),
        };
        let driver = tokio::spawn(shell.run(stdin_remote));

        Ok(ShellChannel::new(stdin_local, stdout_local, stderr_local).with_driver(driver))
    }
}

struct FakeShell {
    env: HashMap<String, String>,
    status: i32,
    stdout: DuplexStream,
    stderr: DuplexStream,
    received: Arc<Mutex<Vec<String>>>,
}

impl FakeShell {
    async fn run(mut self, stdin: DuplexStream) {
        let _ = self.stdout.write_all(BANNER.as_bytes()).await;
        let mut lines = BufReader::new(stdin).lines();

        while let Ok(Some(line)) = lines.next_line().await {
            self.received.lock().push(line.clone());
            for command in line.split(';') {
                if !self.execute(command.trim()).await {
                    return;
                }
            }
        }
    }

    /// Returns false once the shell should exit.
    async fn execute(&mut self, command: &str) -> bool {
        if command.is_empty() {
            return true;
        }
        let (program, args) = command.split_once(' ').unwrap_or((command, ""));

        self.status = match program {
            "stty" | "true" => 0,
            "false" => 1,
            "export" => {
                for assignment in args.split_whitespace() {
                    if let Some((key, value)) = assignment.split_once('=') {
                        self.env.insert(key.to_string(), unquote(value).to_string());
                    }
                }
                0
            }
            "echo" => {
                let (text, to_stderr) = match args.strip_suffix(">&2") {
                    Some(rest) => (rest.trim(), true),
                    None => (args, false),
                };
                let line = format!("{}\n", self.expand(unquote(text)));
                let stream = if to_stderr {
                    &mut self.stderr
                } else {
                    &mut self.stdout
                };
                let _ = stream.write_all(line.as_bytes()).await;
                0
            }
            "printf" => {
                let text = unquote(args).replace("\\n", "\n");
                let _ = self.stdout.write_all(text.as_bytes()).await;
                0
            }
            "cd" => {
                self.env.insert("PWD".to_string(), args.to_string());
                0
            }
            "pwd" => {
                let pwd = self.env.get("PWD").cloned().unwrap_or_else(|| "/".to_string());
                let _ = self.stdout.write_all(format!("{}\n", pwd).as_bytes()).await;
                0
            }
            "sleep" => {
                let secs: f64 = args.trim().parse().unwrap_or(0.0);
                tokio::time::sleep(Duration::from_secs_f64(secs)).await;
                0
            }
            "exit" => return false,
            other => {
                let message = format!("fake-sh: {}: command not found\n", other);
                let _ = self.stderr.write_all(message.as_bytes()).await;
                127
            }
        };
        true
    }

    fn expand(&self, text: &str) -> String {
        let mut out = String::new();
        let mut chars = text.chars().peekable();
        while let Some(c) = chars.next() {
            if c != '$' {
                out.push(c);
                continue;
            }
            if chars.peek() == Some(&'?') {
                chars.next();
                out.push_str(&self.status.to_string());
                continue;
            }
            let mut name = String::new();
            while let Some(&next) = chars.peek() {
                if next.is_ascii_alphanumeric() || next == '_' {
                    name.push(next);
                    chars.next();
                } else {
                    break;
                }
            }
            if name.is_empty() {
                out.push('$');
            } else if let Some(value) = self.env.get(&name) {
                out.push_str(value);
            }
        }
        out
    }
}

fn unquote(text: &str) -> &str {
    let text = text.trim();
    for quote in ['"', '\''] {
        if let Some(inner) = text.strip_prefix(quote).and_then(|t| t.strip_suffix(quote)) {
            return inner;
        }
    }
    text
}

/// Real `sh` child process with piped stdio.
#[cfg(unix)]
#[derive(Clone, Copy, Default)]
pub struct LocalShellProvider;

#[cfg(unix)]
impl ChannelProvider for LocalShellProvider {
    async fn dial(
        &self,
        _target: &DialTarget,
        _credentials: &Credentials,
        _timeout: Duration,
    ) -> Result<ShellChannel, SshError> {
        use std::process::Stdio;

        let mut child = tokio::process::Command::new("sh")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SshError::Channel(format!("failed to spawn sh: {}", e)))?;

        let missing = || SshError::Channel("sh stdio not piped".to_string());
        let stdin = child.stdin.take().ok_or_else(missing)?;
        let stdout = child.stdout.take().ok_or_else(missing)?;
        let stderr = child.stderr.take().ok_or_else(missing)?;

        let driver = tokio::spawn(async move {
            let _ = child.wait().await;
        });

        Ok(ShellChannel::new(stdin, stdout, stderr).with_driver(driver))
    }
}
