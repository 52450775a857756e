use std::sync::Arc;

use tokio::{
    sync::broadcast::error::RecvError,
    time::{MissedTickBehavior, interval},
};
use tracing::{debug, info, warn};

use crate::{
    dto::scoreboard::ScoreboardSnapshot,
    error::ServiceError,
    services::{session_service::publish_state, sse_events},
    state::{SharedState, session::SessionHandle, state_machine::FlowPhase},
};

/// Keep the in-memory scoreboard in line with the user store.
///
/// Applies every change written through this process, and reloads the whole
/// collection on start, on reconnection, after lagging behind and periodically.
pub async fn run(state: SharedState) {
    let mut changes = state.subscribe_user_changes();
    let mut degraded = state.degraded_watcher();
    let mut resync = interval(state.config().scoreboard_resync);
    resync.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            // the first tick completes immediately
            _ = resync.tick() => {
                if let Err(err) = resync_all(&state).await {
                    debug!(error = %err, "scoreboard resync skipped");
                }
            }
            changed = degraded.changed() => {
                if changed.is_err() {
                    break;
                }
                let is_degraded = *degraded.borrow_and_update();
                if !is_degraded {
                    info!("user store back; reloading scoreboard");
                    if let Err(err) = resync_all(&state).await {
                        warn!(error = %err, "scoreboard reload after reconnection failed");
                    }
                }
            }
            change = changes.recv() => match change {
                Ok(change) => {
                    let changed = state.scoreboard().write().await.apply(change);
                    if changed {
                        publish(&state).await;
                    }
                }
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "scoreboard lagged behind user changes; resyncing");
                    if let Err(err) = resync_all(&state).await {
                        warn!(error = %err, "scoreboard resync failed");
                    }
                }
                Err(RecvError::Closed) => break,
            }
        }
    }
}

/// Replace the mirror with the full user collection and publish it.
pub async fn resync_all(state: &SharedState) -> Result<(), ServiceError> {
    let store = state.require_user_store().await?;
    let users = store.list_users().await?;
    let count = users.len();
    state.scoreboard().write().await.replace_all(users);
    debug!(count, "scoreboard reloaded");
    publish(state).await;
    Ok(())
}

/// Scoreboard as currently mirrored.
pub async fn current(state: &SharedState) -> ScoreboardSnapshot {
    let board = state.scoreboard().read().await;
    ScoreboardSnapshot::from(&*board)
}

/// Push the scoreboard on the public stream and refresh the sessions that render it.
async fn publish(state: &SharedState) {
    let snapshot = current(state).await;
    sse_events::broadcast_scoreboard(state, &snapshot);

    let handles: Vec<Arc<SessionHandle>> = state
        .sessions()
        .iter()
        .map(|entry| entry.value().clone())
        .collect();
    for handle in handles {
        let runtime = handle.runtime().lock().await;
        if matches!(runtime.phase(), FlowPhase::Playing | FlowPhase::GameOver) {
            publish_state(state, &handle, &runtime).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::{
            models::{UserEntity, UserPatch},
            user_store::UserStore,
        },
        state::test_support::memory_state,
    };

    fn named(id: &str, name: &str, points: u32) -> UserEntity {
        let mut user = UserEntity::new_anonymous(id);
        user.display_name = name.into();
        user.seva_points = points;
        user
    }

    #[tokio::test]
    async fn resync_loads_existing_users() {
        let (state, store) = memory_state(AppConfig::default()).await;
        store.save_user(named("a", "Asha", 10)).await.unwrap();
        store.save_user(named("b", "Bir", 30)).await.unwrap();
        let mut public = state.public_sse().subscribe();

        resync_all(&state).await.unwrap();

        let snapshot = current(&state).await;
        assert_eq!(snapshot.total_seva_points, 40);
        assert_eq!(snapshot.leaderboard[0].display_name, "Bir");
        let event = public.recv().await.unwrap();
        assert_eq!(event.event.as_deref(), Some("scoreboard"));
    }

    #[tokio::test]
    async fn resync_needs_a_store() {
        let (state, _store) = memory_state(AppConfig::default()).await;
        state.clear_user_store().await;
        assert!(matches!(
            resync_all(&state).await,
            Err(ServiceError::Degraded)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn feed_applies_writes_through_the_store() {
        let (state, _store) = memory_state(AppConfig::default()).await;
        let feed = tokio::spawn(run(state.clone()));
        tokio::time::sleep(Duration::from_millis(10)).await;

        let store = state.require_user_store().await.unwrap();
        store
            .update_user(
                "p1".into(),
                UserPatch {
                    display_name: Some("Noor".into()),
                    seva_points: Some(7),
                    ..UserPatch::default()
                },
            )
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;

        let snapshot = current(&state).await;
        assert_eq!(snapshot.participants.len(), 1);
        assert_eq!(snapshot.total_seva_points, 7);

        store.delete_user("p1".into()).await.unwrap();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(current(&state).await.participants.is_empty());

        feed.abort();
    }
}
