//! Peering administration handlers.
//!
//! Every toggle exists in two shapes: a structured POST that returns the
//! transcript (or per-member results for groups) once the device session
//! finishes, and an SSE GET that relays the shell line by line. Lookup
//! failures are status codes in both shapes; device failures are status
//! codes in the structured shape and synthetic stream lines in the
//! streamed one.

use std::convert::Infallible;

use axum::Json;
use axum::extract::{Path, State};
use axum::response::sse::{Event, KeepAlive, Sse};
use futures_core::Stream;
use futures_util::StreamExt;

use super::{ApiError, AppState};
use crate::bgp::{MemberOutcome, ToggleAction, ToggleOutcome};

pub async fn enable_peering(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ToggleOutcome>, ApiError> {
    Ok(Json(
        state.bgp.toggle_peering(id, ToggleAction::Enable).await?,
    ))
}

pub async fn disable_peering(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<ToggleOutcome>, ApiError> {
    Ok(Json(
        state.bgp.toggle_peering(id, ToggleAction::Disable).await?,
    ))
}

pub async fn enable_peering_stream(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let lines = state.bgp.toggle_peering_stream(id, ToggleAction::Enable)?;
    Ok(sse(lines))
}

pub async fn disable_peering_stream(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let lines = state.bgp.toggle_peering_stream(id, ToggleAction::Disable)?;
    Ok(sse(lines))
}

pub async fn enable_group(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<MemberOutcome>>, ApiError> {
    Ok(Json(
        state
            .bgp
            .toggle_group_members(id, ToggleAction::Enable)
            .await?,
    ))
}

pub async fn disable_group(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Json<Vec<MemberOutcome>>, ApiError> {
    Ok(Json(
        state
            .bgp
            .toggle_group_members(id, ToggleAction::Disable)
            .await?,
    ))
}

pub async fn enable_group_stream(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let lines = state.bgp.toggle_group_stream(id, ToggleAction::Enable)?;
    Ok(sse(lines))
}

pub async fn disable_group_stream(
    State(state): State<AppState>,
    Path(id): Path<i64>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let lines = state.bgp.toggle_group_stream(id, ToggleAction::Disable)?;
    Ok(sse(lines))
}

fn sse(
    lines: impl Stream<Item = String> + Send + 'static,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    Sse::new(lines.map(|line| Ok(Event::default().data(line)))).keep_alive(KeepAlive::default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::server::tests::test_state;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;

    #[tokio::test]
    async fn unknown_peering_toggle_is_404() {
        let result = enable_peering(State(test_state()), Path(999)).await;
        let response = result.err().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn unknown_group_stream_is_404_before_any_stream_opens() {
        let result = disable_group_stream(State(test_state()), Path(999)).await;
        assert!(result.is_err());
        let response = result.err().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn dead_device_toggle_maps_to_bad_gateway() {
        // Peering 10 exists but its device refuses connections.
        let result = disable_peering(State(test_state()), Path(10)).await;
        let response = result.err().unwrap().into_response();
        assert_eq!(response.status(), StatusCode::BAD_GATEWAY);
    }
}
