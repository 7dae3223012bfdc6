//! Query model and request/response bodies.

use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The fixed set of diagnostics a device can run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum QueryKind {
    /// Reachability probe.
    Ping,
    /// Path trace.
    Traceroute,
    /// Route lookup.
    Bgp,
    /// Route lookup with AS-path detail.
    BgpSummary,
}

impl QueryKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            QueryKind::Ping => "ping",
            QueryKind::Traceroute => "traceroute",
            QueryKind::Bgp => "bgp",
            QueryKind::BgpSummary => "bgp-summary",
        }
    }
}

/// Lifecycle of a query.
///
/// `pending → running → {completed | error}`. Terminal states are final;
/// there is no retry or cancellation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum QueryStatus {
    Pending,
    Running,
    Completed,
    Error,
}

/// One diagnostic request's tracked execution state.
#[derive(Debug, Clone, Serialize)]
pub struct Query {
    /// Opaque token generated at request acceptance.
    pub id: String,
    #[serde(rename = "type")]
    pub kind: QueryKind,
    pub target: String,
    /// Display name of the device the query runs against.
    pub router: String,
    /// Unix timestamp (seconds) of creation.
    pub timestamp: u64,
    pub status: QueryStatus,
    /// Accumulated output; set once the driver returns.
    pub output: Option<String>,
    /// Set once, on transition to [`QueryStatus::Error`].
    pub error: Option<String>,
}

impl Query {
    /// Create a fresh pending query with a generated id.
    pub fn new(kind: QueryKind, target: impl Into<String>, router: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            kind,
            target: target.into(),
            router: router.into(),
            timestamp: SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs())
                .unwrap_or(0),
            status: QueryStatus::Pending,
            output: None,
            error: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self.status, QueryStatus::Completed | QueryStatus::Error)
    }
}

/// Free-form options accompanying a query request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QueryOptions {
    /// Identifier of the source-address identity to probe from; resolvable
    /// by numeric id or by literal address.
    #[serde(rename = "sourceIp")]
    pub source_ip: Option<String>,

    /// Maximum hops for a path trace.
    #[serde(rename = "maxHops")]
    pub max_hops: Option<u32>,
}

/// Inbound diagnostic request.
#[derive(Debug, Clone, Deserialize)]
pub struct QueryRequest {
    #[serde(rename = "type")]
    pub kind: QueryKind,
    pub target: String,
    #[serde(rename = "routerId")]
    pub router_id: i64,
    #[serde(default)]
    pub options: QueryOptions,
}

/// Acceptance response for a submitted query.
#[derive(Debug, Clone, Serialize)]
pub struct QueryResponse {
    pub id: String,
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl QueryResponse {
    pub fn accepted(id: String) -> Self {
        Self {
            id,
            status: "success",
            error: None,
        }
    }

    pub fn error(id: String, message: impl Into<String>) -> Self {
        Self {
            id,
            status: "error",
            error: Some(message.into()),
        }
    }
}
