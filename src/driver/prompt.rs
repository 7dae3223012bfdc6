//! Prompt completion detection as an explicit state machine.
//!
//! Devices in scope terminate their CLI prompt with `>` (user view) or `#`
//! (system view). A command is considered finished when the trailing
//! non-whitespace of everything read so far is one of those characters.
//!
//! This is a heuristic, not a protocol. Its failure modes are inherent and
//! deliberately kept visible rather than papered over:
//!
//! - **False positive**: a literal `>` or `#` at the end of a read chunk
//!   (say, inside a routing table) terminates the scan early.
//! - **False negative**: a device whose prompt ends in anything else never
//!   matches; the per-read idle timeout is what unsticks the caller, and
//!   the scanner records that as [`ScanState::IdleTimeout`].

/// Characters treated as prompt terminators.
pub const PROMPT_TERMINATORS: &[u8] = b">#";

/// Where the scanner is in a single command's lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScanState {
    /// Still reading; no prompt seen at the buffer tail.
    AwaitingOutput,

    /// The buffer tail ends in a prompt terminator.
    PromptDetected,

    /// A read timed out or errored before any prompt was seen. The
    /// accumulated output is still usable; completion is just unconfirmed.
    IdleTimeout,
}

/// Accumulates raw device output and tracks prompt detection.
#[derive(Debug)]
pub struct PromptScanner {
    buffer: Vec<u8>,
    state: ScanState,
}

impl PromptScanner {
    pub fn new() -> Self {
        Self {
            buffer: Vec::with_capacity(4096),
            state: ScanState::AwaitingOutput,
        }
    }

    /// Feed a chunk of bytes and return the resulting state.
    pub fn feed(&mut self, data: &[u8]) -> ScanState {
        self.buffer.extend_from_slice(data);
        if self.state != ScanState::PromptDetected && ends_with_prompt(&self.buffer) {
            self.state = ScanState::PromptDetected;
        }
        self.state
    }

    /// Record that the read side went idle before a prompt was seen.
    pub fn mark_idle_timeout(&mut self) {
        if self.state == ScanState::AwaitingOutput {
            self.state = ScanState::IdleTimeout;
        }
    }

    pub fn state(&self) -> ScanState {
        self.state
    }

    /// Whether scanning for this command is over, for either reason.
    pub fn is_terminal(&self) -> bool {
        self.state != ScanState::AwaitingOutput
    }

    /// Everything read so far, lossily decoded.
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.buffer).into_owned()
    }

    /// Reset for the next command in a sequence.
    pub fn reset(&mut self) {
        self.buffer.clear();
        self.state = ScanState::AwaitingOutput;
    }
}

impl Default for PromptScanner {
    fn default() -> Self {
        Self::new()
    }
}

/// True when the trailing non-whitespace byte is a prompt terminator.
fn ends_with_prompt(buf: &[u8]) -> bool {
    buf.iter()
        .rev()
        .find(|b| !b.is_ascii_whitespace())
        .is_some_and(|b| PROMPT_TERMINATORS.contains(b))
}

/// Splits a byte stream into lines for incremental delivery.
///
/// Callers feed raw chunks as they arrive; complete lines are handed to the
/// sink immediately, the unterminated tail is held until the next chunk or
/// [`flush`](Self::flush).
#[derive(Debug, Default)]
pub struct LineBuffer {
    pending: Vec<u8>,
}

impl LineBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Feed a chunk, emitting each completed line (without its newline,
    /// carriage returns trimmed).
    pub fn push(&mut self, data: &[u8], mut emit: impl FnMut(&str)) {
        self.pending.extend_from_slice(data);
        while let Some(pos) = memchr::memchr(b'\n', &self.pending) {
            {
                let line = String::from_utf8_lossy(&self.pending[..pos]);
                emit(line.trim_end_matches('\r'));
            }
            self.pending.drain(..=pos);
        }
    }

    /// Emit the unterminated tail, if any. Typically the prompt itself.
    pub fn flush(&mut self, mut emit: impl FnMut(&str)) {
        if !self.pending.is_empty() {
            let tail = String::from_utf8_lossy(&self.pending).into_owned();
            emit(tail.trim_end_matches('\r'));
            self.pending.clear();
        }
    }
}
