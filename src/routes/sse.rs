use std::convert::Infallible;

use axum::{
    Router,
    extract::{Path, State},
    response::sse::{Event, Sse},
    routing::get,
};
use futures::Stream;
use tracing::info;

use crate::{
    error::AppError,
    services::{
        scoreboard_service,
        session_service::publish_state,
        sse_events,
        sse_service::{self, StreamKind},
    },
    state::SharedState,
};

#[utoipa::path(
    get,
    path = "/sse/public",
    tag = "sse",
    responses((status = 200, description = "Scoreboard stream shared by every player page", content_type = "text/event-stream", body = String))
)]
/// Stream scoreboard updates and degraded-mode flips to player pages.
pub async fn public_stream(
    State(state): State<SharedState>,
) -> Sse<impl Stream<Item = Result<Event, Infallible>>> {
    let receiver = sse_service::subscribe_public(&state);
    info!("New public SSE connection");
    sse_service::broadcast_handshake(state.public_sse(), "public", state.is_degraded(), None);
    let snapshot = scoreboard_service::current(&state).await;
    sse_events::broadcast_scoreboard(&state, &snapshot);
    sse_service::to_sse_stream(receiver, StreamKind::Public)
}

#[utoipa::path(
    get,
    path = "/sse/admin",
    tag = "sse",
    responses(
        (status = 200, description = "Maintenance console stream; the handshake carries the admin token", content_type = "text/event-stream", body = String),
        (status = 401, description = "Another console is already connected")
    )
)]
/// Stream maintenance progress and identity changes, issuing the admin token.
pub async fn admin_stream(
    State(state): State<SharedState>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (receiver, token) = sse_service::subscribe_admin(&state).await?;
    info!("New admin SSE connection");
    sse_service::broadcast_handshake(
        state.admin_sse(),
        "admin",
        state.is_degraded(),
        Some(&token),
    );
    Ok(sse_service::to_sse_stream(
        receiver,
        StreamKind::Admin(state),
    ))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}/events",
    tag = "sse",
    params(("id" = String, Path, description = "Session identity")),
    responses(
        (status = 200, description = "Per-session stream of state, serve and marker events", content_type = "text/event-stream", body = String),
        (status = 404, description = "Unknown session")
    )
)]
/// Stream the state changes of one session.
pub async fn session_stream(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, AppError> {
    let (receiver, handle) = sse_service::subscribe_session(&state, &id)?;
    info!(session = %id, "New session SSE connection");
    sse_service::broadcast_handshake(handle.events(), "session", state.is_degraded(), None);
    {
        let runtime = handle.runtime().lock().await;
        publish_state(&state, &handle, &runtime).await;
    }
    Ok(sse_service::to_sse_stream(receiver, StreamKind::Session(id)))
}

/// Configure the SSE endpoints.
pub fn router() -> Router<SharedState> {
    Router::<SharedState>::new()
        .route("/sse/public", get(public_stream))
        .route("/sse/admin", get(admin_stream))
        .route("/sessions/{id}/events", get(session_stream))
}
