use std::time::{Duration, Instant};

use futures::FutureExt;
use serde::Serialize;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncRead, AsyncReadExt, AsyncWriteExt, BufReader};
use tokio::sync::{Mutex, watch};
use tokio::task::{AbortHandle, JoinHandle};
use tokio::time::{sleep, timeout};

use crate::config::ShellSettings;
use crate::error::SshError;
use crate::security_log;

use super::channel::{BoxedReader, BoxedWriter, ShellChannel};
use super::framing::{self, CappedBuffer, SENTINEL_PREFIX, Scan, Sentinel, SentinelScanner};

/// Sent once after the startup drain so echoed input and prompts do not end
/// up in command output.
pub const SHELL_INIT: &str = "stty -echo 2>/dev/null; export PS1='' PS2=''\n";

/// Upper bound on one primary-stream read.
const READ_CHUNK: u64 = 16 * 1024;

/// Result of executing a command, including output and exit code
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommandResult {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
    /// Set when either stream exceeded the output cap.
    pub truncated: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionState {
    Initializing,
    Ready,
    /// A timeout, read failure or shell exit left the stream out of sync.
    Unusable(String),
    Closed,
}

struct ShellIo {
    stdin: BoxedWriter,
    stdout: BufReader<BoxedReader>,
    stderr: BoxedReader,
    driver: Option<JoinHandle<()>>,
    state: SessionState,
}

struct PrimaryOutput {
    output: CappedBuffer,
    status: Option<i32>,
    completed: bool,
}

/// One persistent remote shell driven through a [`ShellChannel`].
///
/// Commands are strictly serialized: the I/O lock is held for the whole of
/// a `run`, covering the write, both stream reads and the timeout wait.
pub struct ShellSession {
    label: String,
    settings: ShellSettings,
    io: Mutex<ShellIo>,
    driver_abort: Option<AbortHandle>,
}

impl std::fmt::Debug for ShellSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ShellSession")
            .field("label", &self.label)
            .field("io", &"<channel>")
            .finish()
    }
}

impl ShellSession {
    /// Take over a freshly dialed channel and prepare the shell for framed
    /// commands: settle, drain the banner, disable echo and prompts, settle
    /// and drain again.
    pub async fn start(
        label: impl Into<String>,
        channel: ShellChannel,
        settings: ShellSettings,
    ) -> Result<Self, SshError> {
        let label = label.into();
        let driver_abort = channel.driver.as_ref().map(JoinHandle::abort_handle);
        let mut io = ShellIo::new(channel);

        sleep(settings.startup_settle()).await;
        let mut discarded = io.drain(settings.max_output_bytes);

        if let Err(e) = io.write_all(SHELL_INIT.as_bytes()).await {
            io.teardown(settings.close_timeout()).await;
            return Err(SshError::Channel(format!("Failed to initialize shell: {}", e)));
        }

        sleep(settings.init_settle()).await;
        discarded += io.drain(settings.max_output_bytes);
        io.state = SessionState::Ready;

        tracing::debug!(session = %label, discarded, "Shell ready");

        Ok(Self {
            label,
            settings,
            io: Mutex::new(io),
            driver_abort,
        })
    }

    pub fn label(&self) -> &str {
        &self.label
    }

    /// Current state. Waits for an in-flight command to finish.
    pub async fn state(&self) -> SessionState {
        self.io.lock().await.state.clone()
    }

    /// Run one command in the persistent shell.
    pub async fn run(&self, command: &str) -> Result<CommandResult, SshError> {
        if let Err(e) = framing::check_command(command, self.settings.max_command_bytes) {
            if command.contains(SENTINEL_PREFIX) {
                security_log::log_command_rejected(&self.label, "forged completion marker");
            }
            return Err(e);
        }

        let mut io = self.io.lock().await;
        match &io.state {
            SessionState::Ready => {}
            SessionState::Unusable(reason) => {
                return Err(SshError::SessionUnusable(reason.clone()));
            }
            SessionState::Closed => {
                return Err(SshError::SessionUnusable("session is closed".to_string()));
            }
            SessionState::Initializing => {
                return Err(SshError::SessionUnusable("session is starting".to_string()));
            }
        }

        let stale = io.drain(self.settings.max_output_bytes);
        if stale > 0 {
            tracing::debug!(session = %self.label, bytes = stale, "Discarded stale shell output");
        }

        tracing::debug!(session = %self.label, command = %command, "Executing command");

        let sentinel = Sentinel::generate();
        let limit = self.settings.command_timeout();
        let started = Instant::now();

        match timeout(limit, io.exchange(&sentinel, command, &self.settings)).await {
            Ok(Ok((result, completed))) => {
                if !completed {
                    tracing::warn!(session = %self.label, "Shell output ended before completion marker");
                    io.state = SessionState::Unusable("remote shell ended".to_string());
                }
                tracing::debug!(
                    session = %self.label,
                    exit_code = result.exit_code,
                    truncated = result.truncated,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Command finished"
                );
                Ok(result)
            }
            Ok(Err(e)) => {
                tracing::warn!(session = %self.label, "Command failed: {}", e);
                io.state = SessionState::Unusable(e.to_string());
                Err(e)
            }
            Err(_) => {
                tracing::warn!(session = %self.label, timeout_secs = limit.as_secs(), "Command timed out");
                io.state = SessionState::Unusable(format!(
                    "command timed out after {}s",
                    limit.as_secs_f64()
                ));
                Err(SshError::CommandTimeout(limit))
            }
        }
    }

    /// Close the input side, then the transport. Best-effort and
    /// idempotent; the first close wins.
    pub async fn close(&self) {
        let grace = self.settings.close_timeout();
        match timeout(grace, self.io.lock()).await {
            Ok(mut io) => io.teardown(grace).await,
            Err(_) => {
                tracing::warn!(session = %self.label, "Session busy during close; aborting transport");
                if let Some(abort) = &self.driver_abort {
                    abort.abort();
                }
            }
        }
    }
}

impl ShellIo {
    fn new(channel: ShellChannel) -> Self {
        Self {
            stdin: channel.stdin,
            stdout: BufReader::new(channel.stdout),
            stderr: channel.stderr,
            driver: channel.driver,
            state: SessionState::Initializing,
        }
    }

    async fn write_all(&mut self, bytes: &[u8]) -> std::io::Result<()> {
        self.stdin.write_all(bytes).await?;
        self.stdin.flush().await
    }

    /// Discard whatever is already buffered on both streams without waiting
    /// for more.
    fn drain(&mut self, limit: usize) -> usize {
        drain_ready(&mut self.stdout, limit) + drain_ready(&mut self.stderr, limit)
    }

    async fn exchange(
        &mut self,
        sentinel: &Sentinel,
        command: &str,
        settings: &ShellSettings,
    ) -> Result<(CommandResult, bool), SshError> {
        self.write_all(sentinel.wrap(command).as_bytes())
            .await
            .map_err(|e| SshError::Stream(format!("failed to write command: {}", e)))?;

        let (done_tx, done_rx) = watch::channel(false);
        let (primary, secondary) = tokio::try_join!(
            read_primary(&mut self.stdout, sentinel, settings.max_output_bytes, done_tx),
            read_secondary(&mut self.stderr, done_rx, settings),
        )?;

        let exit_code = match (primary.completed, primary.status) {
            (true, Some(code)) => code,
            (true, None) => {
                tracing::warn!("Could not parse exit status from completion marker; reporting 0");
                0
            }
            (false, _) => 0,
        };

        let (stdout, stdout_truncated) = primary.output.into_text();
        let (stderr, stderr_truncated) = secondary.into_text();

        Ok((
            CommandResult {
                stdout: stdout.trim().to_string(),
                stderr: stderr.trim().to_string(),
                exit_code,
                truncated: stdout_truncated || stderr_truncated,
            },
            primary.completed,
        ))
    }

    async fn teardown(&mut self, grace: Duration) {
        if self.state == SessionState::Closed {
            return;
        }
        self.state = SessionState::Closed;

        match timeout(grace, self.stdin.shutdown()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => tracing::debug!("Shell stdin close failed: {}", e),
            Err(_) => tracing::debug!("Shell stdin close timed out"),
        }

        if let Some(mut driver) = self.driver.take() {
            if timeout(grace, &mut driver).await.is_err() {
                driver.abort();
            }
        }
    }
}

impl Drop for ShellIo {
    fn drop(&mut self) {
        if let Some(driver) = self.driver.take() {
            driver.abort();
        }
    }
}

fn drain_ready<R: AsyncRead + Unpin>(reader: &mut R, limit: usize) -> usize {
    let mut buf = [0u8; 4096];
    let mut discarded = 0;
    while discarded < limit {
        match reader.read(&mut buf).now_or_never() {
            Some(Ok(n)) if n > 0 => discarded += n,
            _ => break,
        }
    }
    discarded
}

/// Read the primary stream until the sentinel line; the authoritative
/// completion signal.
async fn read_primary<R: AsyncBufRead + Unpin>(
    reader: &mut R,
    sentinel: &Sentinel,
    max_output: usize,
    done: watch::Sender<bool>,
) -> Result<PrimaryOutput, SshError> {
    let mut scanner = SentinelScanner::new(sentinel, max_output);
    let mut chunk = Vec::new();

    let output = loop {
        chunk.clear();
        let n = (&mut *reader)
            .take(READ_CHUNK)
            .read_until(b'\n', &mut chunk)
            .await
            .map_err(|e| SshError::Stream(format!("stdout read failed: {}", e)))?;

        if n == 0 {
            break PrimaryOutput {
                output: scanner.finish(),
                status: None,
                completed: false,
            };
        }

        if let Scan::Complete(status) = scanner.feed(&chunk) {
            break PrimaryOutput {
                output: scanner.into_output(),
                status,
                completed: true,
            };
        }
    };

    done.send_replace(true);
    Ok(output)
}

/// Read the secondary stream opportunistically. It has no marker of its own,
/// so once the primary stream has completed, reading stops after the quiet
/// period passes with nothing new, or after `stderr_window` at the latest.
/// Output arriving later is not captured.
async fn read_secondary<R: AsyncRead + Unpin>(
    reader: &mut R,
    primary_done: watch::Receiver<bool>,
    settings: &ShellSettings,
) -> Result<CappedBuffer, SshError> {
    let mut output = CappedBuffer::new(settings.max_output_bytes);
    let mut buf = vec![0u8; 8192];
    let mut quiet_since: Option<Instant> = None;
    let mut window_start: Option<Instant> = None;

    loop {
        match timeout(settings.poll_interval(), reader.read(&mut buf)).await {
            Ok(Ok(0)) => break,
            Ok(Ok(n)) => {
                output.push(&buf[..n]);
                if quiet_since.is_some() {
                    quiet_since = Some(Instant::now());
                }
            }
            Ok(Err(e)) => return Err(SshError::Stream(format!("stderr read failed: {}", e))),
            Err(_) => {}
        }

        if *primary_done.borrow() {
            let since = *quiet_since.get_or_insert_with(Instant::now);
            let opened = *window_start.get_or_insert_with(Instant::now);
            if since.elapsed() >= settings.stderr_quiet() {
                break;
            }
            if opened.elapsed() >= settings.stderr_window() {
                tracing::debug!("stderr still busy after window closed, leaving the rest");
                break;
            }
        }
    }

    Ok(output)
}
