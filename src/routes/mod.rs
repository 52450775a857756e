use axum::Router;

use crate::state::SharedState;

pub mod admin;
pub mod docs;
pub mod health;
pub mod public;
pub mod session;
pub mod sse;
pub mod websocket;

/// Every route tree of the backend, bound to the shared state.
pub fn router(state: SharedState) -> Router<()> {
    Router::new()
        .merge(health::router())
        .merge(docs::router())
        .merge(sse::router())
        .merge(session::router())
        .merge(websocket::router())
        .merge(public::router())
        .merge(admin::router(state.clone()))
        .with_state(state)
}
