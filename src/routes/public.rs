use axum::{Json, Router, extract::State, routing::get};

use crate::{
    dto::{catalog::CatalogResponse, scoreboard::ScoreboardSnapshot},
    services::scoreboard_service,
    state::SharedState,
};

/// Public read-only endpoints shared by every player page.
pub fn router() -> Router<SharedState> {
    Router::new()
        .route("/public/scoreboard", get(get_scoreboard))
        .route("/public/catalog", get(get_catalog))
}

#[utoipa::path(
    get,
    path = "/public/scoreboard",
    tag = "public",
    responses((status = 200, description = "Roster, total seva points and leaderboard", body = ScoreboardSnapshot))
)]
/// Return the scoreboard as currently mirrored from the user store.
pub async fn get_scoreboard(State(state): State<SharedState>) -> Json<ScoreboardSnapshot> {
    Json(scoreboard_service::current(&state).await)
}

#[utoipa::path(
    get,
    path = "/public/catalog",
    tag = "public",
    responses((status = 200, description = "Avatars, checklist, food items and grid settings", body = CatalogResponse))
)]
/// Return the options offered on the selection screens.
pub async fn get_catalog(State(state): State<SharedState>) -> Json<CatalogResponse> {
    Json(CatalogResponse::new(&state.config().game))
}
