//! Command framing over a raw shell byte stream.
//!
//! Each command is followed by `echo "<token>:$?"` where the token is fresh
//! per call. The stdout reader feeds lines into [`SentinelScanner`] until the
//! token shows up; everything before it is command output and the field after
//! the token is the exit status.

use uuid::Uuid;

use crate::error::SshError;

/// Fixed prefix of every sentinel token. Commands containing it are refused.
pub const SENTINEL_PREFIX: &str = "__SHELLPOOL_END_";

/// Bytes held back from output while a line is still open, so a token split
/// across two reads is still recognised.
const MAX_OPEN_LINE: usize = 64 * 1024;

/// Per-call completion marker
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Sentinel {
    token: String,
}

impl Sentinel {
    /// Generate a token that cannot have appeared in an earlier call.
    pub fn generate() -> Self {
        Self {
            token: format!("{}{}__", SENTINEL_PREFIX, Uuid::new_v4().simple()),
        }
    }

    pub fn token(&self) -> &str {
        &self.token
    }

    /// Build the payload written to the shell: the command, then the
    /// sentinel echo carrying `$?`.
    pub fn wrap(&self, command: &str) -> String {
        format!("{}\necho \"{}:$?\"\n", command, self.token)
    }
}

/// Reject commands that are empty, oversized, or could forge a sentinel.
pub fn check_command(command: &str, max_bytes: usize) -> Result<(), SshError> {
    if command.trim().is_empty() {
        return Err(SshError::InvalidCommand(
            "command cannot be empty".to_string(),
        ));
    }

    if command.len() > max_bytes {
        return Err(SshError::InvalidCommand(format!(
            "command too long ({} bytes, max {})",
            command.len(),
            max_bytes
        )));
    }

    if command.contains(SENTINEL_PREFIX) {
        return Err(SshError::InvalidCommand(format!(
            "command contains forbidden delimiter pattern '{}'",
            SENTINEL_PREFIX
        )));
    }

    Ok(())
}

/// Byte accumulator that keeps at most `limit` bytes.
#[derive(Debug)]
pub struct CappedBuffer {
    bytes: Vec<u8>,
    limit: usize,
    truncated: bool,
}

impl CappedBuffer {
    pub fn new(limit: usize) -> Self {
        Self {
            bytes: Vec::new(),
            limit,
            truncated: false,
        }
    }

    pub fn push(&mut self, data: &[u8]) {
        let room = self.limit.saturating_sub(self.bytes.len());
        if data.len() > room {
            self.truncated = true;
        }
        self.bytes.extend_from_slice(&data[..data.len().min(room)]);
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }

    pub fn is_truncated(&self) -> bool {
        self.truncated
    }

    /// Decode lossily; invalid UTF-8 becomes U+FFFD.
    pub fn into_text(self) -> (String, bool) {
        (
            String::from_utf8_lossy(&self.bytes).into_owned(),
            self.truncated,
        )
    }
}

/// Outcome of feeding one chunk into the scanner
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scan {
    /// Keep reading.
    Pending,
    /// Sentinel seen. `None` means the status field did not parse.
    Complete(Option<i32>),
}

/// Await-sentinel / accumulate state machine for the primary stream.
///
/// Input is fed as it arrives from `read_until(b'\n')`, so a chunk is either a
/// whole line or the unterminated tail of a line.
#[derive(Debug)]
pub struct SentinelScanner {
    token: Vec<u8>,
    open_line: Vec<u8>,
    output: CappedBuffer,
}

impl SentinelScanner {
    pub fn new(sentinel: &Sentinel, max_output: usize) -> Self {
        Self {
            token: sentinel.token().as_bytes().to_vec(),
            open_line: Vec::new(),
            output: CappedBuffer::new(max_output),
        }
    }

    pub fn feed(&mut self, chunk: &[u8]) -> Scan {
        self.open_line.extend_from_slice(chunk);
        let line_closed = self.open_line.ends_with(b"\n");

        if let Some(pos) = find(&self.open_line, &self.token) {
            if !line_closed {
                // Status digits may still be in flight.
                return Scan::Pending;
            }
            // Output without a trailing newline shares the sentinel line.
            self.output.push(&self.open_line[..pos]);
            let status = parse_status(&self.open_line[pos + self.token.len()..]);
            self.open_line.clear();
            return Scan::Complete(status);
        }

        if line_closed {
            self.output.push(&self.open_line);
            self.open_line.clear();
        } else if self.open_line.len() > MAX_OPEN_LINE + self.token.len() {
            let keep_from = self.open_line.len() - self.token.len();
            self.output.push(&self.open_line[..keep_from]);
            self.open_line.drain(..keep_from);
        }

        Scan::Pending
    }

    /// Stream ended before the sentinel: whatever was read is the output.
    pub fn finish(mut self) -> CappedBuffer {
        let rest = std::mem::take(&mut self.open_line);
        self.output.push(&rest);
        self.output
    }

    /// Output accumulated up to and excluding the sentinel line.
    pub fn into_output(self) -> CappedBuffer {
        self.output
    }
}

fn find(haystack: &[u8], needle: &[u8]) -> Option<usize> {
    if needle.is_empty() || haystack.len() < needle.len() {
        return None;
    }
    haystack
        .windows(needle.len())
        .position(|window| window == needle)
}

/// Parse the `:<status>` tail that follows the token.
fn parse_status(tail: &[u8]) -> Option<i32> {
    let text = std::str::from_utf8(tail).ok()?;
    text.trim().strip_prefix(':')?.trim().parse().ok()
}
