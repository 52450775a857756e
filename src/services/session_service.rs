use std::{future::Future, sync::Arc, time::SystemTime};

use dashmap::mapref::entry::Entry;
use tokio::{
    task::JoinHandle,
    time::{Instant, MissedTickBehavior, interval_at},
};
use tracing::{debug, info, warn};

use crate::{
    dao::models::{Timestamp, UserEntity, UserPatch},
    dto::session::SessionSnapshot,
    error::ServiceError,
    identity::SessionId,
    services::{play_service, sse_events},
    state::{
        SharedState,
        catalog::{Avatar, FoodItem, PreparationStep},
        session::{SessionHandle, SessionRuntime},
        state_machine::{FlowEvent, FlowPhase},
    },
};

/// Start a session for a new visitor, or resume the live one when its identity is presented again.
pub async fn start_session(
    state: &SharedState,
    presented: Option<String>,
) -> Result<SessionSnapshot, ServiceError> {
    let known = presented
        .as_deref()
        .map(str::trim)
        .filter(|token| !token.is_empty())
        .and_then(|token| state.identity().current_identity(token));

    if let Some(handle) = known.as_deref().and_then(|id| state.session(id)) {
        let mut runtime = handle.runtime().lock().await;
        runtime.last_seen = Instant::now();
        info!(session = %handle.id(), "resumed live session");
        return Ok(publish_state(state, &handle, &runtime).await);
    }

    let mut runtime = SessionRuntime::new(&state.config().game);
    let ((id, stored_name), _) = runtime
        .run_transition(FlowEvent::IdentityResolved, resolve_identity(state, known))
        .await
        .inspect_err(|err| warn!(error = %err, "identity resolution failed; session stays loading"))?;

    if let Some(name) = stored_name {
        runtime.game.display_name = name;
    }
    runtime.liveness = Some(spawn_liveness(state.clone(), id.clone()));

    let handle = match state.sessions().entry(id.clone()) {
        Entry::Occupied(existing) => {
            // a concurrent start for the same identity won the race
            runtime.stop_tasks();
            existing.get().clone()
        }
        Entry::Vacant(slot) => slot
            .insert(Arc::new(SessionHandle::new(id.clone(), runtime)))
            .value()
            .clone(),
    };

    info!(session = %id, "session started");
    let runtime = handle.runtime().lock().await;
    Ok(publish_state(state, &handle, &runtime).await)
}

/// Current projection of a live session.
pub async fn snapshot(state: &SharedState, id: &str) -> Result<SessionSnapshot, ServiceError> {
    mutate(state, id, |_| Ok(())).await
}

/// Confirm the display name, persist it and move on to the entrance.
pub async fn set_display_name(
    state: &SharedState,
    id: &str,
    name: &str,
) -> Result<SessionSnapshot, ServiceError> {
    let name = name.trim().to_owned();
    if name.is_empty() {
        return Err(ServiceError::InvalidInput(
            "display name must not be blank".into(),
        ));
    }

    let handle = lookup(state, id)?;
    let mut runtime = handle.runtime().lock().await;
    runtime.last_seen = Instant::now();
    runtime.require_phase(FlowPhase::SetDisplayName)?;
    runtime.game.display_name = name.clone();

    let persist = persist_display_name(state.clone(), handle.id().to_owned(), name);
    runtime
        .run_transition(FlowEvent::NameConfirmed, async move {
            persist.await;
            Ok(())
        })
        .await?;

    Ok(publish_state(state, &handle, &runtime).await)
}

pub async fn enter(state: &SharedState, id: &str) -> Result<SessionSnapshot, ServiceError> {
    mutate(state, id, |runtime| {
        runtime.transition(FlowEvent::EnterGurdwara).map(drop)
    })
    .await
}

pub async fn select_avatar(
    state: &SharedState,
    id: &str,
    avatar: Avatar,
) -> Result<SessionSnapshot, ServiceError> {
    mutate(state, id, |runtime| {
        runtime.require_phase(FlowPhase::SelectAvatar)?;
        runtime.game.avatar = Some(avatar);
        Ok(())
    })
    .await
}

pub async fn confirm_avatar(state: &SharedState, id: &str) -> Result<SessionSnapshot, ServiceError> {
    mutate(state, id, |runtime| {
        runtime.transition(FlowEvent::AvatarConfirmed).map(drop)
    })
    .await
}

/// Tick or untick one preparation step.
pub async fn set_preparation_step(
    state: &SharedState,
    id: &str,
    step: PreparationStep,
    done: bool,
) -> Result<SessionSnapshot, ServiceError> {
    mutate(state, id, |runtime| {
        runtime.require_phase(FlowPhase::Preparation)?;
        runtime.game.set_step(step, done);
        Ok(())
    })
    .await
}

pub async fn confirm_preparation(
    state: &SharedState,
    id: &str,
) -> Result<SessionSnapshot, ServiceError> {
    mutate(state, id, |runtime| {
        runtime.transition(FlowEvent::PreparationCompleted).map(drop)
    })
    .await
}

pub async fn select_food(
    state: &SharedState,
    id: &str,
    food: FoodItem,
) -> Result<SessionSnapshot, ServiceError> {
    mutate(state, id, |runtime| {
        runtime.require_phase(FlowPhase::SelectFood)?;
        runtime.game.food = Some(food);
        Ok(())
    })
    .await
}

/// Enter the playing phase with a fresh countdown and start the play timers.
pub async fn start_playing(state: &SharedState, id: &str) -> Result<SessionSnapshot, ServiceError> {
    let handle = lookup(state, id)?;
    let mut runtime = handle.runtime().lock().await;
    runtime.last_seen = Instant::now();

    runtime.transition(FlowEvent::FoodConfirmed)?;
    let tuning = &state.config().game;
    runtime.game.time_left = tuning.game_duration_secs;
    runtime.game.score = 0;
    runtime.game.field.reset();
    runtime.timers = Some(play_service::spawn_timers(state, &handle));

    info!(session = %handle.id(), food = ?runtime.game.food, "round started");
    Ok(publish_state(state, &handle, &runtime).await)
}

/// Leave the results screen for another round, keeping the display name.
pub async fn play_again(state: &SharedState, id: &str) -> Result<SessionSnapshot, ServiceError> {
    let tuning = state.config().game.clone();
    mutate(state, id, move |runtime| {
        runtime.transition(FlowEvent::PlayAgain)?;
        runtime.timers = None;
        runtime.game.reset_for_replay(&tuning);
        Ok(())
    })
    .await
}

/// Drop a live session and stop its tasks. The user record is kept.
pub async fn end_session(state: &SharedState, id: &str) -> Result<(), ServiceError> {
    let (_, handle) = state
        .sessions()
        .remove(id)
        .ok_or_else(|| session_not_found(id))?;
    handle.runtime().lock().await.stop_tasks();
    info!(session = %id, "session ended");
    Ok(())
}

/// Build the projection of a locked session and push it as `session.state`.
pub(crate) async fn publish_state(
    state: &SharedState,
    handle: &SessionHandle,
    runtime: &SessionRuntime,
) -> SessionSnapshot {
    let snapshot = {
        let scoreboard = state.scoreboard().read().await;
        SessionSnapshot::build(handle.id(), runtime, &scoreboard, state.is_degraded())
    };
    sse_events::broadcast_session_state(handle.events(), &snapshot);
    snapshot
}

pub(crate) fn lookup(state: &SharedState, id: &str) -> Result<Arc<SessionHandle>, ServiceError> {
    state.session(id).ok_or_else(|| session_not_found(id))
}

fn session_not_found(id: &str) -> ServiceError {
    ServiceError::NotFound(format!("session `{id}`"))
}

/// Lock a session, record the client activity, run `change` and publish the result.
async fn mutate<F>(state: &SharedState, id: &str, change: F) -> Result<SessionSnapshot, ServiceError>
where
    F: FnOnce(&mut SessionRuntime) -> Result<(), ServiceError>,
{
    let handle = lookup(state, id)?;
    let mut runtime = handle.runtime().lock().await;
    runtime.last_seen = Instant::now();
    change(&mut runtime)?;
    Ok(publish_state(state, &handle, &runtime).await)
}

/// Run a store write on its own task so it completes even when the caller goes away.
pub(crate) async fn run_detached<Fut>(work: Fut)
where
    Fut: Future<Output = ()> + Send + 'static,
{
    if let Err(err) = tokio::spawn(work).await {
        warn!(error = %err, "store write task failed");
    }
}

/// Resolve or mint the identity, then make sure a user record exists for it.
///
/// Returns the identity and the display name already stored for it, if any.
async fn resolve_identity(
    state: &SharedState,
    known: Option<SessionId>,
) -> Result<(SessionId, Option<String>), ServiceError> {
    let id = match known {
        Some(id) => id,
        None => state.identity().create_anonymous_identity().await?,
    };

    let stored_name = ensure_user_record(state, &id).await;
    Ok((id, stored_name))
}

async fn ensure_user_record(state: &SharedState, id: &str) -> Option<String> {
    let Some(store) = state.user_store().await else {
        debug!(session = %id, "degraded mode; skipping user record");
        return None;
    };

    match store.find_user(id.to_owned()).await {
        Ok(Some(user)) => {
            let name = user.has_display_name().then_some(user.display_name);
            if let Err(err) = store.update_user(id.to_owned(), UserPatch::touch()).await {
                warn!(session = %id, error = %err, "failed to refresh lastActive");
            }
            name
        }
        Ok(None) => {
            let mut user = UserEntity::new_anonymous(id);
            user.last_active = Some(SystemTime::now());
            if let Err(err) = store.save_user(user).await {
                warn!(session = %id, error = %err, "failed to create user record");
            }
            None
        }
        Err(err) => {
            warn!(session = %id, error = %err, "failed to load user record");
            None
        }
    }
}

fn persist_display_name(
    state: SharedState,
    id: SessionId,
    name: String,
) -> impl Future<Output = ()> + Send + 'static {
    run_detached(async move {
        let Some(store) = state.user_store().await else {
            debug!(session = %id, "degraded mode; display name kept in memory only");
            return;
        };
        let patch = UserPatch {
            display_name: Some(name),
            last_active: Some(Timestamp::Server),
            ..UserPatch::default()
        };
        if let Err(err) = store.update_user(id.clone(), patch).await {
            warn!(session = %id, error = %err, "failed to persist display name");
        }
    })
}

/// Periodically refresh `lastActive` for a resolved identity.
fn spawn_liveness(state: SharedState, id: SessionId) -> JoinHandle<()> {
    let period = state.config().game.liveness_interval;
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            let Some(store) = state.user_store().await else {
                debug!(session = %id, "degraded mode; skipping liveness update");
                continue;
            };
            let id = id.clone();
            run_detached(async move {
                if let Err(err) = store.update_user(id.clone(), UserPatch::touch()).await {
                    warn!(session = %id, error = %err, "liveness update failed");
                }
            })
            .await;
        }
    })
}
