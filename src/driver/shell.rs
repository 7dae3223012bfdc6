//! Interactive-shell mode: one PTY for a whole command sequence.
//!
//! Commands run strictly in order. Each command is written with a trailing
//! newline, then the channel is read with a short per-read timeout until
//! the prompt scanner fires or the read goes idle — an idle read is not an
//! error, it just ends that command's capture and the sequence moves on.
//! Completed lines are handed to the caller's sink as they arrive so the
//! output can be relayed incrementally.
//!
//! A small fixed delay between commands avoids racing the device's output
//! buffer. Known workaround, not a guarantee.

use std::time::Duration;

use log::{debug, trace};
use russh::ChannelMsg;

use super::prompt::{LineBuffer, PromptScanner, ScanState};
use crate::error::{ChannelError, Result};
use crate::transport::SshTransport;

/// Tuning for the interactive shell loop.
#[derive(Debug, Clone)]
pub struct ShellConfig {
    /// How long a single read may block before the command's capture is
    /// considered done without prompt confirmation.
    pub read_timeout: Duration,

    /// Pause between consecutive commands.
    pub inter_command_delay: Duration,
}

impl Default for ShellConfig {
    fn default() -> Self {
        Self {
            read_timeout: Duration::from_secs(5),
            inter_command_delay: Duration::from_millis(200),
        }
    }
}

/// Run an ordered command sequence over one PTY shell.
///
/// Every emitted line goes through `sink`: the echoed command itself
/// (prefixed `$ `), then the device's output lines for it. Returns the
/// full accumulated transcript.
///
/// Errors propagate typed; call sites that must never raise (the streaming
/// endpoints) wrap this and render the failure as a synthetic line.
pub async fn run_sequence(
    transport: &SshTransport,
    commands: &[String],
    config: &ShellConfig,
    sink: &mut (dyn FnMut(&str) + Send),
) -> Result<String> {
    let mut channel = transport.open_shell().await?;
    let mut transcript = String::new();
    let mut scanner = PromptScanner::new();

    for command in commands {
        sink(&format!("$ {command}"));
        transcript.push_str("$ ");
        transcript.push_str(command);
        transcript.push('\n');

        channel
            .data(format!("{command}\n").as_bytes())
            .await
            .map_err(ChannelError::Ssh)?;

        scanner.reset();
        let mut lines = LineBuffer::new();

        loop {
            match tokio::time::timeout(config.read_timeout, channel.wait()).await {
                // Idle read: stop capturing this command, move to the next.
                Err(_) => {
                    scanner.mark_idle_timeout();
                    break;
                }
                Ok(None) => {
                    scanner.mark_idle_timeout();
                    debug!("shell channel closed mid-sequence at {command:?}");
                    break;
                }
                Ok(Some(ChannelMsg::Data { ref data })) => {
                    lines.push(data, |line| sink(line));
                    if scanner.feed(data) == ScanState::PromptDetected {
                        break;
                    }
                }
                Ok(Some(ChannelMsg::ExtendedData { ref data, .. })) => {
                    lines.push(data, |line| sink(line));
                    if scanner.feed(data) == ScanState::PromptDetected {
                        break;
                    }
                }
                Ok(Some(msg)) => trace!("shell: ignoring {msg:?}"),
            }
        }

        // The prompt usually sits in the unterminated tail.
        lines.flush(|line| sink(line));
        transcript.push_str(&scanner.output());

        tokio::time::sleep(config.inter_command_delay).await;
    }

    let _ = channel.eof().await;
    let _ = channel.close().await;

    Ok(transcript)
}
