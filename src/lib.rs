//! # Peerglass
//!
//! BGP peering control and looking-glass backend driving network devices
//! over SSH.
//!
//! Peerglass exposes an HTTP API for running diagnostics (ping, traceroute,
//! BGP route lookups) against a fleet of routers and for enabling or
//! disabling BGP peerings, with live output relayed over server-sent
//! events.
//!
//! ## Features
//!
//! - Async SSH sessions via russh (password, keyboard-interactive
//!   fallback, and key auth)
//! - Single-exec and interactive-shell command drivers
//! - Background query execution with a pollable in-memory registry
//! - SSE relay of query output with a `[DONE]` end marker
//! - Peering and peering-group BGP toggles, structured or streamed
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use peerglass::glass::{ExecutorConfig, MemoryRegistry, QueryExecutor, QueryStore};
//! use peerglass::inventory::Inventory;
//!
//! # async fn run() -> Result<(), peerglass::Error> {
//! let directory = Inventory::load(std::path::Path::new("inventory.json"))?.into_shared();
//! let store: Arc<dyn QueryStore> = Arc::new(MemoryRegistry::new());
//! let executor = Arc::new(QueryExecutor::new(
//!     directory,
//!     store.clone(),
//!     ExecutorConfig::default(),
//! ));
//!
//! let response = executor.submit(serde_json::from_str(
//!     r#"{"type": "bgp", "target": "192.0.2.0", "routerId": 1}"#,
//! ).map_err(|e| peerglass::Error::validation(e.to_string()))?)?;
//! println!("query accepted: {}", response.id);
//! # Ok(())
//! # }
//! ```

pub mod bgp;
pub mod driver;
pub mod error;
pub mod glass;
pub mod inventory;
pub mod secret;
pub mod server;
pub mod transport;

// Re-export main types for convenience
pub use bgp::{BgpController, ToggleAction, ToggleConfig};
pub use error::Error;
pub use glass::{QueryExecutor, QueryRequest, QueryResponse, QueryStatus};
pub use inventory::{DeviceDirectory, Inventory};
pub use server::{AppState, router};
pub use transport::{AuthMethod, SshConfig};
