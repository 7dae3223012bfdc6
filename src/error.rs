//! Error types for peerglass.

use std::io;
use std::time::Duration;
use thiserror::Error;

/// Main error type for peerglass operations.
#[derive(Error, Debug)]
pub enum Error {
    /// SSH transport-level errors (connect, authenticate)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Channel operation errors (exec, PTY, shell)
    #[error("Channel error: {0}")]
    Channel(#[from] ChannelError),

    /// Whole-operation ceiling exceeded
    #[error("timed out after {0:?}")]
    Timeout(Duration),

    /// Unknown query id, device, peering or group
    #[error("{kind} not found: {name}")]
    NotFound { kind: &'static str, name: String },

    /// Malformed or incomplete request
    #[error("{0}")]
    Validation(String),
}

impl Error {
    /// Shorthand for a [`Error::NotFound`].
    pub fn not_found(kind: &'static str, name: impl Into<String>) -> Self {
        Error::NotFound {
            kind,
            name: name.into(),
        }
    }

    /// Shorthand for a [`Error::Validation`].
    pub fn validation(message: impl Into<String>) -> Self {
        Error::Validation(message.into())
    }

    /// Whether this error is a timeout, at any layer.
    ///
    /// Callers use this to render "device too slow" distinctly from
    /// "device rejected command".
    pub fn is_timeout(&self) -> bool {
        matches!(
            self,
            Error::Timeout(_) | Error::Transport(TransportError::Timeout(_))
        )
    }
}

/// Transport layer errors (SSH connection, authentication).
#[derive(Error, Debug)]
pub enum TransportError {
    /// Failed to reach the host at all
    #[error("Connection failed to {host}:{port}: {source}")]
    ConnectionFailed {
        host: String,
        port: u16,
        #[source]
        source: io::Error,
    },

    /// SSH handshake or protocol error
    #[error("SSH error: {0}")]
    Ssh(#[from] russh::Error),

    /// Authentication failed
    #[error("Authentication failed for user '{user}'")]
    AuthenticationFailed { user: String },

    /// Host key is not in known_hosts and the policy blocks unknown hosts
    #[error("Unknown host key for {host}:{port}")]
    HostKeyUnknown { host: String, port: u16 },

    /// Host key differs from the recorded one
    #[error("Host key for {host}:{port} changed (known_hosts line {line})")]
    HostKeyChanged { host: String, port: u16, line: usize },

    /// known_hosts lookup or update failed
    #[error("known_hosts error: {0}")]
    KnownHosts(String),

    /// SSH key error
    #[error("SSH key error: {0}")]
    Key(String),

    /// Operation timed out
    #[error("Operation timed out after {0:?}")]
    Timeout(Duration),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Channel layer errors (command channels, PTY operations).
#[derive(Error, Debug)]
pub enum ChannelError {
    /// Failed to open PTY channel
    #[error("Failed to open PTY channel")]
    PtyOpenFailed,

    /// Failed to request shell
    #[error("Failed to request shell")]
    ShellRequestFailed,

    /// Channel closed before the command finished
    #[error("Channel closed")]
    Closed,

    /// SSH protocol error on the channel
    #[error("Channel SSH error: {0}")]
    Ssh(russh::Error),
}

/// Result type alias using peerglass's Error.
pub type Result<T> = std::result::Result<T, Error>;
