//! Single-exec mode: one channel, one command, one combined result.
//!
//! Suitable for devices that accept direct command execution. The whole
//! read is bounded by a caller-supplied timeout; on timeout the partial
//! output is discarded and a timeout error is raised — this mode never
//! returns partial results.

use std::time::{Duration, Instant};

use log::debug;
use russh::ChannelMsg;

use crate::error::{ChannelError, Error, Result};
use crate::transport::SshTransport;

/// Result of a single-exec command.
#[derive(Debug)]
pub struct ExecOutput {
    /// Combined stdout and stderr (stderr appended after stdout, as the
    /// devices interleave them unreliably anyway).
    pub output: String,

    /// Exit status, if the device reported one.
    pub exit_status: Option<u32>,

    /// Wall time for the exec round-trip.
    pub elapsed: Duration,
}

/// Run exactly one command over a fresh channel and read to end-of-output.
pub async fn run_command(
    transport: &SshTransport,
    command: &str,
    timeout: Duration,
) -> Result<ExecOutput> {
    let start = Instant::now();

    let mut channel = transport.open_session().await?;
    channel
        .exec(true, command)
        .await
        .map_err(ChannelError::Ssh)?;

    let collected = tokio::time::timeout(timeout, read_to_end(&mut channel)).await;

    match collected {
        Ok(result) => {
            let (stdout, stderr, exit_status) = result?;
            let _ = channel.close().await;

            let mut output = stdout;
            if !stderr.is_empty() {
                output.push('\n');
                output.push_str(&stderr);
            }

            debug!(
                "exec finished in {:?} (exit: {:?}, {} bytes)",
                start.elapsed(),
                exit_status,
                output.len()
            );

            Ok(ExecOutput {
                output,
                exit_status,
                elapsed: start.elapsed(),
            })
        }
        Err(_) => {
            let _ = channel.close().await;
            Err(Error::Timeout(timeout))
        }
    }
}

/// Drain a channel until EOF, separating stdout from stderr.
async fn read_to_end(
    channel: &mut russh::Channel<russh::client::Msg>,
) -> Result<(String, String, Option<u32>)> {
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let mut exit_status = None;

    loop {
        match channel.wait().await {
            Some(ChannelMsg::Data { ref data }) => stdout.extend_from_slice(data),
            Some(ChannelMsg::ExtendedData { ref data, ext }) => {
                // ext 1 is the stderr stream
                if ext == 1 {
                    stderr.extend_from_slice(data);
                } else {
                    stdout.extend_from_slice(data);
                }
            }
            Some(ChannelMsg::ExitStatus { exit_status: code }) => exit_status = Some(code),
            Some(ChannelMsg::Eof) | Some(ChannelMsg::Close) | None => break,
            Some(_) => {}
        }
    }

    Ok((
        String::from_utf8_lossy(&stdout).into_owned(),
        String::from_utf8_lossy(&stderr).into_owned(),
        exit_status,
    ))
}
