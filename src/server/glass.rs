//! Looking-glass handlers.

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_core::Stream;
use futures_util::StreamExt;
use serde::Serialize;

use super::{ApiError, AppState};
use crate::glass::executor::ConnectionReport;
use crate::glass::query::{Query, QueryRequest, QueryResponse};
use crate::glass::relay;
use crate::inventory::SourceAddress;

/// Device view exposed to clients. Connection credentials never leave
/// the inventory.
#[derive(Debug, Serialize)]
pub struct RouterView {
    pub id: i64,
    pub name: String,
    pub asn: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
    pub source_addresses: Vec<SourceAddress>,
}

pub async fn list_routers(State(state): State<AppState>) -> Json<Vec<RouterView>> {
    let routers = state
        .directory
        .active_devices()
        .into_iter()
        .map(|d| RouterView {
            id: d.id,
            name: d.name,
            asn: d.asn,
            note: d.note,
            source_addresses: d.source_addresses,
        })
        .collect();
    Json(routers)
}

pub async fn submit_query(
    State(state): State<AppState>,
    Json(request): Json<QueryRequest>,
) -> Result<Json<QueryResponse>, ApiError> {
    Ok(Json(state.executor.submit(request)?))
}

pub async fn query_snapshot(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Query>, ApiError> {
    Ok(Json(state.store.get(&id)?))
}

pub async fn stream_query(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let lines = relay::subscribe(state.store.clone(), id, state.relay.clone());
    Sse::new(lines.map(|line| Ok(Event::default().data(line)))).keep_alive(KeepAlive::default())
}

pub async fn test_connection(
    State(state): State<AppState>,
    Path(router_id): Path<i64>,
) -> Result<Json<ConnectionReport>, ApiError> {
    Ok(Json(state.executor.test_connection(router_id).await?))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::glass::relay::END_MARKER;
    use crate::server::tests::test_state;
    use axum::response::IntoResponse;
    use http_body_util::BodyExt;

    #[tokio::test]
    async fn router_listing_never_leaks_credentials() {
        let response = list_routers(State(test_state())).await.into_response();
        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();

        assert!(text.contains("core-1"));
        assert!(text.contains("192.0.2.1"));
        assert!(!text.contains("ssh_password"), "got: {text}");
        assert!(!text.contains("aHVudGVyMg=="), "got: {text}");
    }

    #[tokio::test]
    async fn snapshot_of_unknown_query_is_404() {
        let result = query_snapshot(State(test_state()), Path("missing".into())).await;
        let response = result.err().unwrap().into_response();
        assert_eq!(response.status(), axum::http::StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn stream_of_unknown_query_still_ends_with_the_marker() {
        let mut state = test_state();
        state.relay.lookup_retries = 1;
        state.relay.lookup_retry_delay = std::time::Duration::from_millis(1);

        let lines: Vec<String> =
            relay::subscribe(state.store.clone(), "missing".into(), state.relay.clone())
                .collect()
                .await;
        assert_eq!(lines.last().map(String::as_str), Some(END_MARKER));
    }
}
