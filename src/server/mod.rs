//! HTTP surface: looking-glass queries and peering administration.
//!
//! Handlers stay thin; everything they do is delegated to the executor,
//! relay, and controller, so the mapping from typed errors to status
//! codes lives in exactly one place ([`ApiError`]).

mod glass;
mod peering;

use std::sync::Arc;

use axum::Router;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Json, Response};
use axum::routing::{get, post};
use serde_json::json;

use crate::bgp::{BgpController, ToggleConfig};
use crate::error::Error;
use crate::glass::{ExecutorConfig, MemoryRegistry, QueryExecutor, QueryStore, RelayConfig};
use crate::inventory::DeviceDirectory;

/// Shared handler state.
#[derive(Clone)]
pub struct AppState {
    pub directory: Arc<dyn DeviceDirectory>,
    pub store: Arc<dyn QueryStore>,
    pub executor: Arc<QueryExecutor>,
    pub bgp: Arc<BgpController>,
    pub relay: RelayConfig,
}

impl AppState {
    /// Wire up the default component stack around a directory.
    pub fn new(directory: Arc<dyn DeviceDirectory>) -> Self {
        let store: Arc<dyn QueryStore> = Arc::new(MemoryRegistry::new());
        let executor = Arc::new(QueryExecutor::new(
            directory.clone(),
            store.clone(),
            ExecutorConfig::default(),
        ));
        let bgp = Arc::new(BgpController::new(
            directory.clone(),
            ToggleConfig::default(),
        ));
        Self {
            directory,
            store,
            executor,
            bgp,
            relay: RelayConfig::default(),
        }
    }
}

/// Build the application router.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/lg/routers", get(glass::list_routers))
        .route("/lg/query", post(glass::submit_query))
        .route("/lg/query/{id}", get(glass::query_snapshot))
        .route("/lg/stream/{id}", get(glass::stream_query))
        .route(
            "/lg/test-connection/{router_id}",
            post(glass::test_connection),
        )
        .route("/peerings/{id}/bgp-enable", post(peering::enable_peering))
        .route("/peerings/{id}/bgp-disable", post(peering::disable_peering))
        .route(
            "/peerings/{id}/bgp-enable-stream",
            get(peering::enable_peering_stream),
        )
        .route(
            "/peerings/{id}/bgp-disable-stream",
            get(peering::disable_peering_stream),
        )
        .route(
            "/peering-groups/{id}/bgp-enable",
            post(peering::enable_group),
        )
        .route(
            "/peering-groups/{id}/bgp-disable",
            post(peering::disable_group),
        )
        .route(
            "/peering-groups/{id}/bgp-enable-stream",
            get(peering::enable_group_stream),
        )
        .route(
            "/peering-groups/{id}/bgp-disable-stream",
            get(peering::disable_group_stream),
        )
        .with_state(state)
}

/// Typed error to HTTP response mapping.
pub struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        // "Device too slow" renders as 504 at whichever layer it surfaced;
        // everything else maps by variant.
        let status = if self.0.is_timeout() {
            StatusCode::GATEWAY_TIMEOUT
        } else {
            match &self.0 {
                Error::NotFound { .. } => StatusCode::NOT_FOUND,
                Error::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
                Error::Timeout(_) => StatusCode::GATEWAY_TIMEOUT,
                Error::Transport(_) | Error::Channel(_) => StatusCode::BAD_GATEWAY,
            }
        };
        (status, Json(json!({ "detail": self.0.to_string() }))).into_response()
    }
}
