use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post, put},
};
use validator::Validate;

use crate::{
    dto::session::{
        AvatarRequest, DisplayNameRequest, FoodRequest, MoveRequest, PreparationStepRequest,
        ServeResponse, SessionSnapshot, StartSessionRequest,
    },
    error::AppError,
    services::{play_service, session_service},
    state::{SharedState, catalog::PreparationStep},
};

/// Game flow endpoints of a player session.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/sessions", post(start_session))
        .route("/sessions/{id}", get(get_session).delete(end_session))
        .route("/sessions/{id}/display-name", put(set_display_name))
        .route("/sessions/{id}/enter", post(enter))
        .route("/sessions/{id}/avatar", put(select_avatar))
        .route("/sessions/{id}/avatar/confirm", post(confirm_avatar))
        .route("/sessions/{id}/preparation/confirm", post(confirm_preparation))
        .route("/sessions/{id}/preparation/{step}", put(set_preparation_step))
        .route("/sessions/{id}/food", put(select_food))
        .route("/sessions/{id}/start", post(start_playing))
        .route("/sessions/{id}/move", post(move_player))
        .route("/sessions/{id}/serve", post(serve))
        .route("/sessions/{id}/cells/{x}/{y}", post(tap_cell))
        .route("/sessions/{id}/replay", post(play_again))
}

/// Start a session, or resume the live one owning the presented identity.
#[utoipa::path(
    post,
    path = "/sessions",
    tag = "session",
    request_body = StartSessionRequest,
    responses(
        (status = 201, description = "Session started or resumed", body = SessionSnapshot),
        (status = 503, description = "Identity provider unavailable")
    )
)]
pub async fn start_session(
    State(state): State<SharedState>,
    payload: Option<Json<StartSessionRequest>>,
) -> Result<(StatusCode, Json<SessionSnapshot>), AppError> {
    let request = payload.map(|Json(request)| request).unwrap_or_default();
    let snapshot = session_service::start_session(&state, request.identity).await?;
    Ok((StatusCode::CREATED, Json(snapshot)))
}

#[utoipa::path(
    get,
    path = "/sessions/{id}",
    tag = "session",
    params(("id" = String, Path, description = "Session identity")),
    responses(
        (status = 200, description = "Current session state", body = SessionSnapshot),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn get_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::snapshot(&state, &id).await?))
}

/// Drop the session and stop its timers. The stored user record is kept.
#[utoipa::path(
    delete,
    path = "/sessions/{id}",
    tag = "session",
    params(("id" = String, Path, description = "Session identity")),
    responses(
        (status = 204, description = "Session ended"),
        (status = 404, description = "Unknown session")
    )
)]
pub async fn end_session(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<StatusCode, AppError> {
    session_service::end_session(&state, &id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    put,
    path = "/sessions/{id}/display-name",
    tag = "session",
    params(("id" = String, Path, description = "Session identity")),
    request_body = DisplayNameRequest,
    responses(
        (status = 200, description = "Name saved, now at the entrance", body = SessionSnapshot),
        (status = 400, description = "Blank name"),
        (status = 409, description = "Session is not asking for a name")
    )
)]
pub async fn set_display_name(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<DisplayNameRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    payload.validate()?;
    Ok(Json(
        session_service::set_display_name(&state, &id, &payload.display_name).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/enter",
    tag = "session",
    params(("id" = String, Path, description = "Session identity")),
    responses(
        (status = 200, description = "Entered the gurdwara", body = SessionSnapshot),
        (status = 409, description = "Not at the entrance")
    )
)]
pub async fn enter(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::enter(&state, &id).await?))
}

#[utoipa::path(
    put,
    path = "/sessions/{id}/avatar",
    tag = "session",
    params(("id" = String, Path, description = "Session identity")),
    request_body = AvatarRequest,
    responses(
        (status = 200, description = "Avatar selected", body = SessionSnapshot),
        (status = 409, description = "Not selecting an avatar")
    )
)]
pub async fn select_avatar(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<AvatarRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(
        session_service::select_avatar(&state, &id, payload.avatar).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/avatar/confirm",
    tag = "session",
    params(("id" = String, Path, description = "Session identity")),
    responses(
        (status = 200, description = "Moved on to preparation", body = SessionSnapshot),
        (status = 409, description = "No avatar selected")
    )
)]
pub async fn confirm_avatar(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::confirm_avatar(&state, &id).await?))
}

#[utoipa::path(
    put,
    path = "/sessions/{id}/preparation/{step}",
    tag = "session",
    params(
        ("id" = String, Path, description = "Session identity"),
        ("step" = PreparationStep, Path, description = "Checklist step")
    ),
    request_body = PreparationStepRequest,
    responses(
        (status = 200, description = "Checklist updated", body = SessionSnapshot),
        (status = 409, description = "Not preparing")
    )
)]
pub async fn set_preparation_step(
    State(state): State<SharedState>,
    Path((id, step)): Path<(String, PreparationStep)>,
    Json(payload): Json<PreparationStepRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(
        session_service::set_preparation_step(&state, &id, step, payload.done).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/preparation/confirm",
    tag = "session",
    params(("id" = String, Path, description = "Session identity")),
    responses(
        (status = 200, description = "Moved on to food selection", body = SessionSnapshot),
        (status = 409, description = "Checklist incomplete")
    )
)]
pub async fn confirm_preparation(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::confirm_preparation(&state, &id).await?))
}

#[utoipa::path(
    put,
    path = "/sessions/{id}/food",
    tag = "session",
    params(("id" = String, Path, description = "Session identity")),
    request_body = FoodRequest,
    responses(
        (status = 200, description = "Food selected", body = SessionSnapshot),
        (status = 409, description = "Not selecting food")
    )
)]
pub async fn select_food(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<FoodRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(
        session_service::select_food(&state, &id, payload.food).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/start",
    tag = "session",
    params(("id" = String, Path, description = "Session identity")),
    responses(
        (status = 200, description = "Round started", body = SessionSnapshot),
        (status = 409, description = "No food selected")
    )
)]
pub async fn start_playing(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::start_playing(&state, &id).await?))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/move",
    tag = "play",
    params(("id" = String, Path, description = "Session identity")),
    request_body = MoveRequest,
    responses(
        (status = 200, description = "Player moved, clamped to the grid", body = SessionSnapshot),
        (status = 409, description = "Not playing")
    )
)]
pub async fn move_player(
    State(state): State<SharedState>,
    Path(id): Path<String>,
    Json(payload): Json<MoveRequest>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(
        play_service::move_player(&state, &id, payload.direction).await?,
    ))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/serve",
    tag = "play",
    params(("id" = String, Path, description = "Session identity")),
    responses(
        (status = 200, description = "Serve attempted at the player's cell", body = ServeResponse),
        (status = 409, description = "Not playing")
    )
)]
pub async fn serve(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<ServeResponse>, AppError> {
    Ok(Json(play_service::serve_food(&state, &id).await?))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/cells/{x}/{y}",
    tag = "play",
    params(
        ("id" = String, Path, description = "Session identity"),
        ("x" = usize, Path, description = "Column, from the left"),
        ("y" = usize, Path, description = "Row, from the top")
    ),
    responses(
        (status = 200, description = "Moved to the cell, then attempted a serve", body = ServeResponse),
        (status = 400, description = "Cell outside the grid"),
        (status = 409, description = "Not playing")
    )
)]
pub async fn tap_cell(
    State(state): State<SharedState>,
    Path((id, x, y)): Path<(String, usize, usize)>,
) -> Result<Json<ServeResponse>, AppError> {
    Ok(Json(play_service::tap_cell(&state, &id, x, y).await?))
}

#[utoipa::path(
    post,
    path = "/sessions/{id}/replay",
    tag = "session",
    params(("id" = String, Path, description = "Session identity")),
    responses(
        (status = 200, description = "Back at the entrance with the name kept", body = SessionSnapshot),
        (status = 409, description = "Round not over")
    )
)]
pub async fn play_again(
    State(state): State<SharedState>,
    Path(id): Path<String>,
) -> Result<Json<SessionSnapshot>, AppError> {
    Ok(Json(session_service::play_again(&state, &id).await?))
}
