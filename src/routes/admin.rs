use axum::{
    Json, Router,
    body::Body,
    extract::State,
    http::Request,
    middleware::{self, Next},
    response::Response,
    routing::{get, post},
};

use crate::{
    dto::maintenance::{MaintenanceReport, UserCountResponse},
    error::AppError,
    services::maintenance_service,
    state::SharedState,
};

const ADMIN_TOKEN_HEADER: &str = "x-admin-token";

/// Maintenance console endpoints, guarded by the token of the admin SSE stream.
pub fn router(state: SharedState) -> Router<SharedState> {
    Router::new()
        .route("/admin/users/count", get(user_count))
        .route("/admin/users/remove-all", post(remove_all_users))
        .route("/admin/users/remove-inactive", post(remove_inactive_users))
        .route_layer(middleware::from_fn_with_state(state, require_admin_token))
}

/// Count the stored user records.
#[utoipa::path(
    get,
    path = "/admin/users/count",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream")),
    responses(
        (status = 200, description = "Number of user records", body = UserCountResponse),
        (status = 503, description = "No user store (degraded mode)")
    )
)]
pub async fn user_count(
    State(state): State<SharedState>,
) -> Result<Json<UserCountResponse>, AppError> {
    let count = maintenance_service::user_count(&state).await?;
    Ok(Json(UserCountResponse { count }))
}

/// Delete every user record.
#[utoipa::path(
    post,
    path = "/admin/users/remove-all",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream")),
    responses(
        (status = 200, description = "Removal finished; failures are counted in the report", body = MaintenanceReport),
        (status = 503, description = "No user store (degraded mode)")
    )
)]
pub async fn remove_all_users(
    State(state): State<SharedState>,
) -> Result<Json<MaintenanceReport>, AppError> {
    Ok(Json(maintenance_service::remove_all_users(&state).await?))
}

/// Delete the user records inactive for longer than the console threshold.
#[utoipa::path(
    post,
    path = "/admin/users/remove-inactive",
    tag = "admin",
    params(("X-Admin-Token" = String, Header, description = "Admin token issued by the /sse/admin stream")),
    responses(
        (status = 200, description = "Cleanup finished", body = MaintenanceReport),
        (status = 503, description = "No user store (degraded mode)")
    )
)]
pub async fn remove_inactive_users(
    State(state): State<SharedState>,
) -> Result<Json<MaintenanceReport>, AppError> {
    Ok(Json(
        maintenance_service::remove_inactive_users(&state).await?,
    ))
}

async fn require_admin_token(
    State(state): State<SharedState>,
    req: Request<Body>,
    next: Next,
) -> Result<Response, AppError> {
    let provided = req
        .headers()
        .get(ADMIN_TOKEN_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(|value| value.to_owned())
        .ok_or_else(|| {
            AppError::Unauthorized("missing admin token header `X-Admin-Token`".into())
        })?;

    let expected = {
        let guard = state.admin_token().lock().await;
        guard.clone()
    };

    match expected {
        Some(token) if token == provided => Ok(next.run(req).await),
        Some(_) => Err(AppError::Unauthorized("invalid admin token".into())),
        None => Err(AppError::Unauthorized(
            "no maintenance console connected".into(),
        )),
    }
}
