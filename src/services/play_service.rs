use std::{
    sync::{Arc, Weak},
    time::Duration,
};

use rand::{SeedableRng, rngs::StdRng};
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, info, warn};

use crate::{
    dao::models::UserPatch,
    dto::session::{FieldSnapshot, ServeResponse, SessionSnapshot},
    error::ServiceError,
    services::{
        session_service::{lookup, publish_state, run_detached},
        sse_events,
    },
    state::{
        SharedState,
        play_field::{Direction, GridPos, ServeOutcome},
        session::{PlayTimers, SessionHandle, SessionRuntime},
        state_machine::{FlowEvent, FlowPhase},
    },
};

const COUNTDOWN_TICK: Duration = Duration::from_secs(1);

/// Move the player one cell; moves past the edge are clamped.
pub async fn move_player(
    state: &SharedState,
    id: &str,
    direction: Direction,
) -> Result<SessionSnapshot, ServiceError> {
    let handle = lookup(state, id)?;
    let mut runtime = handle.runtime().lock().await;
    apply_move(&mut runtime, direction)?;
    Ok(publish_state(state, &handle, &runtime).await)
}

/// Serve the person under the player with the selected food.
pub async fn serve_food(state: &SharedState, id: &str) -> Result<ServeResponse, ServiceError> {
    let handle = lookup(state, id)?;
    let mut runtime = handle.runtime().lock().await;
    let outcome = apply_serve(state, &handle, &mut runtime).await?;
    Ok(serve_response(&runtime, outcome))
}

/// Grid click: walk to the cell, then serve whoever sits there.
pub async fn tap_cell(
    state: &SharedState,
    id: &str,
    x: usize,
    y: usize,
) -> Result<ServeResponse, ServiceError> {
    let handle = lookup(state, id)?;
    let mut runtime = handle.runtime().lock().await;
    runtime.last_seen = Instant::now();
    runtime.require_phase(FlowPhase::Playing)?;
    runtime.game.field.place_player(GridPos::new(x, y))?;

    let outcome = apply_serve(state, &handle, &mut runtime).await?;
    Ok(serve_response(&runtime, outcome))
}

/// Move on an already locked session, as used by the REST route and the play socket.
pub(crate) fn apply_move(
    runtime: &mut SessionRuntime,
    direction: Direction,
) -> Result<GridPos, ServiceError> {
    runtime.last_seen = Instant::now();
    runtime.require_phase(FlowPhase::Playing)?;
    Ok(runtime.game.field.move_player(direction))
}

/// Serve on an already locked session.
///
/// A hit adds the food's points to the round score, is pushed as `session.served`,
/// schedules the marker removal and records the serve in the user store.
pub(crate) async fn apply_serve(
    state: &SharedState,
    handle: &Arc<SessionHandle>,
    runtime: &mut SessionRuntime,
) -> Result<Option<ServeOutcome>, ServiceError> {
    runtime.last_seen = Instant::now();
    runtime.require_phase(FlowPhase::Playing)?;

    let food = runtime.game.food;
    let Some(outcome) = runtime.game.field.serve(food) else {
        debug!(session = %handle.id(), "nobody to serve here");
        return Ok(None);
    };

    runtime.game.score += outcome.points;
    sse_events::broadcast_served(handle.events(), &outcome, runtime.game.score);
    spawn_marker_clear(state, handle, outcome);

    record_serve(
        state.clone(),
        handle.id().to_owned(),
        runtime.game.display_name.clone(),
        outcome,
    )
    .await;

    publish_state(state, handle, runtime).await;
    Ok(Some(outcome))
}

fn serve_response(runtime: &SessionRuntime, outcome: Option<ServeOutcome>) -> ServeResponse {
    ServeResponse {
        served: outcome.is_some(),
        points: outcome.map(|outcome| outcome.points),
        score: runtime.game.score,
        field: FieldSnapshot::from(&runtime.game.field),
    }
}

/// Add the serve to the stored record, creating it with the session's name when missing.
///
/// Read-modify-write without locking; store failures are logged and dropped.
async fn record_serve(state: SharedState, id: String, display_name: String, outcome: ServeOutcome) {
    run_detached(async move {
        let Some(store) = state.user_store().await else {
            debug!(session = %id, "degraded mode; serve not persisted");
            return;
        };

        let existing = match store.find_user(id.clone()).await {
            Ok(existing) => existing,
            Err(err) => {
                warn!(session = %id, error = %err, "failed to load user before recording serve");
                return;
            }
        };

        let food = outcome.food.name().to_owned();
        let patch = match existing {
            Some(user) => {
                let mut items = user.items_served;
                *items.entry(food).or_insert(0) += 1;
                UserPatch {
                    seva_points: Some(user.seva_points.saturating_add(outcome.points)),
                    items_served: Some(items),
                    ..UserPatch::default()
                }
            }
            None => {
                let mut items = crate::dao::models::zeroed_items();
                *items.entry(food).or_insert(0) += 1;
                UserPatch {
                    display_name: Some(display_name),
                    seva_points: Some(outcome.points),
                    items_served: Some(items),
                    ..UserPatch::default()
                }
            }
        };

        if let Err(err) = store.update_user(id.clone(), patch).await {
            warn!(session = %id, error = %err, "failed to record serve");
        }
    })
    .await;
}

fn spawn_marker_clear(state: &SharedState, handle: &Arc<SessionHandle>, outcome: ServeOutcome) {
    let delay = state.config().game.served_marker;
    let state = state.clone();
    let weak = Arc::downgrade(handle);
    tokio::spawn(async move {
        sleep(delay).await;
        let Some(handle) = weak.upgrade() else {
            return;
        };
        let mut runtime = handle.runtime().lock().await;
        if runtime.game.field.clear_marker(outcome.position) {
            sse_events::broadcast_marker_cleared(handle.events(), &outcome);
            publish_state(&state, &handle, &runtime).await;
        }
    });
}

/// Start the countdown and the spawn tick of a round that just entered `playing`.
pub(crate) fn spawn_timers(state: &SharedState, handle: &Arc<SessionHandle>) -> PlayTimers {
    PlayTimers {
        countdown: tokio::spawn(run_countdown(state.clone(), Arc::downgrade(handle))),
        spawner: tokio::spawn(run_spawner(state.clone(), Arc::downgrade(handle))),
    }
}

async fn run_countdown(state: SharedState, session: Weak<SessionHandle>) {
    let mut ticker = interval_at(Instant::now() + COUNTDOWN_TICK, COUNTDOWN_TICK);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(handle) = session.upgrade() else {
            break;
        };
        let mut runtime = handle.runtime().lock().await;
        if runtime.phase() != FlowPhase::Playing {
            break;
        }

        if runtime.game.time_left > 1 {
            runtime.game.time_left -= 1;
            publish_state(&state, &handle, &runtime).await;
            continue;
        }

        runtime.game.time_left = 0;
        if let Err(err) = runtime.transition(FlowEvent::TimeUp) {
            warn!(session = %handle.id(), error = %err, "time-up transition rejected");
        } else {
            info!(session = %handle.id(), score = runtime.game.score, "round over");
        }
        // dropping the timers aborts this task too; nothing awaits after that
        let timers = runtime.timers.take();
        publish_state(&state, &handle, &runtime).await;
        drop(runtime);
        drop(timers);
        break;
    }
}

async fn run_spawner(state: SharedState, session: Weak<SessionHandle>) {
    let tuning = state.config().game.clone();
    let mut rng = StdRng::from_os_rng();
    let mut ticker = interval_at(Instant::now() + tuning.spawn_interval, tuning.spawn_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        let Some(handle) = session.upgrade() else {
            break;
        };
        let mut runtime = handle.runtime().lock().await;
        if runtime.phase() != FlowPhase::Playing {
            break;
        }

        if let Some(pos) = runtime
            .game
            .field
            .try_spawn(&mut rng, tuning.spawn_probability)
        {
            debug!(session = %handle.id(), x = pos.x, y = pos.y, "person seated");
            publish_state(&state, &handle, &runtime).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use tokio::sync::broadcast::error::TryRecvError;

    use super::*;
    use crate::{
        config::AppConfig,
        dao::user_store::UserStore,
        services::session_service,
        state::{
            catalog::{Avatar, FoodItem, PreparationStep},
            test_support::memory_state,
        },
    };

    fn quiet_config() -> AppConfig {
        let mut config = AppConfig::default();
        config.game.spawn_probability = 0.0;
        config
    }

    async fn playing_session(state: &SharedState, food: FoodItem) -> String {
        let id = session_service::start_session(state, None).await.unwrap().id;
        session_service::set_display_name(state, &id, "Amrit").await.unwrap();
        session_service::enter(state, &id).await.unwrap();
        session_service::select_avatar(state, &id, Avatar::Meditating)
            .await
            .unwrap();
        session_service::confirm_avatar(state, &id).await.unwrap();
        for step in PreparationStep::ORDERED {
            session_service::set_preparation_step(state, &id, step, true)
                .await
                .unwrap();
        }
        session_service::confirm_preparation(state, &id).await.unwrap();
        session_service::select_food(state, &id, food).await.unwrap();
        session_service::start_playing(state, &id).await.unwrap();
        id
    }

    async fn seat_under_player(state: &SharedState, id: &str) -> GridPos {
        let handle = state.session(id).unwrap();
        let mut runtime = handle.runtime().lock().await;
        let pos = runtime.game.field.player();
        runtime.game.field.seat(pos);
        pos
    }

    #[tokio::test(start_paused = true)]
    async fn serving_scores_and_persists() {
        let (state, store) = memory_state(quiet_config()).await;
        let id = playing_session(&state, FoodItem::Roti).await;
        seat_under_player(&state, &id).await;

        let response = serve_food(&state, &id).await.unwrap();
        assert!(response.served);
        assert_eq!(response.points, Some(5));
        assert_eq!(response.score, 5);

        let user = store.find_user(id.clone()).await.unwrap().unwrap();
        assert_eq!(user.seva_points, 5);
        assert_eq!(user.items_served.get("Roti"), Some(&1));
        assert_eq!(user.items_served.get("Water"), Some(&0));

        let mut changes = state.subscribe_user_changes();
        let missed = serve_food(&state, &id).await.unwrap();
        assert!(!missed.served);
        assert_eq!(missed.score, 5);
        assert!(matches!(changes.try_recv(), Err(TryRecvError::Empty)));
        assert_eq!(store.find_user(id).await.unwrap().unwrap().seva_points, 5);
    }

    #[tokio::test(start_paused = true)]
    async fn repeated_serves_accumulate_in_the_record() {
        let (state, store) = memory_state(quiet_config()).await;
        let id = playing_session(&state, FoodItem::Chickpeas).await;

        for _ in 0..7 {
            seat_under_player(&state, &id).await;
            assert!(serve_food(&state, &id).await.unwrap().served);
        }

        let user = store.find_user(id.clone()).await.unwrap().unwrap();
        assert_eq!(user.seva_points, 7 * FoodItem::Chickpeas.points());
        assert_eq!(user.items_served.get("Chickpeas"), Some(&7));
        assert_eq!(user.items_served.get("Roti"), Some(&0));

        let snapshot = session_service::snapshot(&state, &id).await.unwrap();
        assert_eq!(snapshot.score, 28);
    }

    #[tokio::test(start_paused = true)]
    async fn serve_creates_missing_record_with_session_name() {
        let (state, store) = memory_state(quiet_config()).await;
        let id = playing_session(&state, FoodItem::Chai).await;
        store.delete_user(id.clone()).await.unwrap();
        seat_under_player(&state, &id).await;

        serve_food(&state, &id).await.unwrap();

        let user = store.find_user(id).await.unwrap().unwrap();
        assert_eq!(user.display_name, "Amrit");
        assert_eq!(user.seva_points, 3);
        assert_eq!(user.items_served.get("Chai"), Some(&1));
    }

    #[tokio::test(start_paused = true)]
    async fn marker_clears_after_delay() {
        let (state, _store) = memory_state(quiet_config()).await;
        let id = playing_session(&state, FoodItem::Water).await;
        let pos = seat_under_player(&state, &id).await;
        let mut events = state.session(&id).unwrap().events().subscribe();

        let response = serve_food(&state, &id).await.unwrap();
        assert_eq!(response.field.last_served, Some(pos));

        sleep(state.config().game.served_marker + Duration::from_millis(10)).await;

        let handle = state.session(&id).unwrap();
        assert_eq!(handle.runtime().lock().await.game.field.last_served(), None);
        let mut names = Vec::new();
        while let Ok(event) = events.try_recv() {
            names.extend(event.event);
        }
        assert!(names.iter().any(|name| name == "session.served"));
        assert!(names.iter().any(|name| name == "session.marker_cleared"));
    }

    #[tokio::test(start_paused = true)]
    async fn tap_cell_moves_then_serves() {
        let (state, _store) = memory_state(quiet_config()).await;
        let id = playing_session(&state, FoodItem::Chickpeas).await;
        {
            let handle = state.session(&id).unwrap();
            handle
                .runtime()
                .lock()
                .await
                .game
                .field
                .seat(GridPos::new(0, 0));
        }

        let response = tap_cell(&state, &id, 0, 0).await.unwrap();
        assert!(response.served);
        assert_eq!(response.field.player, GridPos::new(0, 0));
        assert_eq!(response.points, Some(4));

        assert!(matches!(
            tap_cell(&state, &id, 3, 0).await,
            Err(ServiceError::InvalidInput(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn moves_are_clamped_and_need_playing() {
        let (state, _store) = memory_state(quiet_config()).await;
        let id = session_service::start_session(&state, None).await.unwrap().id;
        assert!(matches!(
            move_player(&state, &id, Direction::Up).await,
            Err(ServiceError::InvalidState(_))
        ));

        let id = playing_session(&state, FoodItem::Napkins).await;
        let snapshot = move_player(&state, &id, Direction::Down).await.unwrap();
        assert_eq!(snapshot.field.unwrap().player, GridPos::new(1, 2));
        let snapshot = move_player(&state, &id, Direction::Left).await.unwrap();
        assert_eq!(snapshot.field.unwrap().player, GridPos::new(0, 2));
    }

    #[tokio::test(start_paused = true)]
    async fn countdown_ends_the_round() {
        let (state, _store) = memory_state(quiet_config()).await;
        let id = playing_session(&state, FoodItem::Roti).await;

        sleep(Duration::from_secs(30) + Duration::from_millis(500)).await;
        {
            let handle = state.session(&id).unwrap();
            let runtime = handle.runtime().lock().await;
            assert_eq!(runtime.phase(), FlowPhase::Playing);
            assert_eq!(runtime.game.time_left, 30);
        }

        sleep(Duration::from_secs(31)).await;
        let snapshot = session_service::snapshot(&state, &id).await.unwrap();
        assert_eq!(snapshot.phase, FlowPhase::GameOver);
        assert_eq!(snapshot.time_left, 0);
        assert!(snapshot.leaderboard.is_some());

        let handle = state.session(&id).unwrap();
        assert!(handle.runtime().lock().await.timers.is_none());
        assert!(matches!(
            serve_food(&state, &id).await,
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn spawner_respects_the_seat_limit() {
        let mut config = AppConfig::default();
        config.game.spawn_probability = 1.0;
        let (state, _store) = memory_state(config).await;
        let id = playing_session(&state, FoodItem::Roti).await;

        sleep(Duration::from_secs(20)).await;

        let handle = state.session(&id).unwrap();
        let runtime = handle.runtime().lock().await;
        assert!(runtime.game.field.seated_count() <= 3);
        assert!(runtime.game.field.seated_count() >= 1);
    }
}
