//! Command execution against an open SSH transport.
//!
//! Two modes are supported, matching how heterogeneous network devices
//! behave in practice:
//!
//! - [`exec`]: one logical channel per command. Clean exit status and
//!   combined output, for devices that accept direct command execution.
//! - [`shell`]: one PTY for a whole command sequence, with prompt-sniffing
//!   completion detection, for devices that misbehave under one-shot exec
//!   (or limit the number of session channels).

pub mod exec;
pub mod prompt;
pub mod shell;

pub use exec::{ExecOutput, run_command};
pub use prompt::{LineBuffer, PromptScanner, ScanState};
pub use shell::{ShellConfig, run_sequence};
