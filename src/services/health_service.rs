use tracing::warn;

use crate::{dto::health::HealthResponse, state::SharedState};

/// Report liveness and the degraded flag, logging store connectivity issues on the way.
pub async fn health_status(state: &SharedState) -> HealthResponse {
    match state.require_user_store().await {
        Ok(store) => {
            if let Err(err) = store.health_check().await {
                warn!(error = %err, "user store health check failed");
            }
        }
        Err(_) => warn!("user store unavailable (degraded mode)"),
    }

    let live_sessions = state.sessions().len();
    if state.is_degraded() {
        HealthResponse::degraded(live_sessions)
    } else {
        HealthResponse::ok(live_sessions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{config::AppConfig, state::test_support::memory_state};

    #[tokio::test]
    async fn reports_degraded_without_a_store() {
        let (state, _store) = memory_state(AppConfig::default()).await;
        assert_eq!(health_status(&state).await.status, "ok");

        state.clear_user_store().await;
        let health = health_status(&state).await;
        assert_eq!(health.status, "degraded");
        assert_eq!(health.live_sessions, 0);
    }
}
