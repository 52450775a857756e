use std::{collections::BTreeSet, future::Future, time::Duration};

use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{Instant, timeout},
};
use tracing::warn;

use crate::{
    config::GameTuning,
    error::ServiceError,
    identity::SessionId,
    state::{
        SseHub,
        catalog::{Avatar, FoodItem, PreparationStep},
        play_field::PlayField,
        state_machine::{FlowEvent, FlowPhase, FlowStateMachine, Plan},
    },
};

pub const DEFAULT_TRANSITION_TIMEOUT: Duration = Duration::from_secs(5);
const SESSION_EVENTS_CAPACITY: usize = 32;

/// Per-tab game data walked through by the flow state machine. Never persisted.
#[derive(Debug, Clone)]
pub struct GameSession {
    /// Name confirmed by the player; survives replays.
    pub display_name: String,
    pub avatar: Option<Avatar>,
    pub completed_steps: BTreeSet<PreparationStep>,
    pub food: Option<FoodItem>,
    pub field: PlayField,
    /// Points earned during the current round only.
    pub score: u32,
    /// Seconds remaining on the countdown.
    pub time_left: u32,
}

impl GameSession {
    pub fn new(tuning: &GameTuning) -> Self {
        Self {
            display_name: String::new(),
            avatar: None,
            completed_steps: BTreeSet::new(),
            food: None,
            field: PlayField::new(tuning.grid_size, tuning.max_seated_people),
            score: 0,
            time_left: tuning.game_duration_secs,
        }
    }

    /// True once every preparation step has been ticked.
    pub fn preparation_complete(&self) -> bool {
        PreparationStep::ORDERED
            .iter()
            .all(|step| self.completed_steps.contains(step))
    }

    pub fn set_step(&mut self, step: PreparationStep, done: bool) {
        if done {
            self.completed_steps.insert(step);
        } else {
            self.completed_steps.remove(&step);
        }
    }

    /// Wipe everything a new round needs fresh, keeping the display name.
    pub fn reset_for_replay(&mut self, tuning: &GameTuning) {
        self.avatar = None;
        self.completed_steps.clear();
        self.food = None;
        self.field.reset();
        self.score = 0;
        self.time_left = tuning.game_duration_secs;
    }
}

/// Background tasks owned by a session while it is in the `playing` phase.
///
/// Dropping the value aborts both tasks.
pub struct PlayTimers {
    pub countdown: JoinHandle<()>,
    pub spawner: JoinHandle<()>,
}

impl Drop for PlayTimers {
    fn drop(&mut self) {
        self.countdown.abort();
        self.spawner.abort();
    }
}

/// Mutable part of a live session, guarded by the handle's mutex.
pub struct SessionRuntime {
    pub machine: FlowStateMachine,
    pub game: GameSession,
    pub timers: Option<PlayTimers>,
    /// Periodic `lastActive` refresher, started once the identity is resolved.
    pub liveness: Option<JoinHandle<()>>,
    /// Last time a client request reached this session.
    pub last_seen: Instant,
}

impl SessionRuntime {
    pub fn new(tuning: &GameTuning) -> Self {
        Self {
            machine: FlowStateMachine::new(),
            game: GameSession::new(tuning),
            timers: None,
            liveness: None,
            last_seen: Instant::now(),
        }
    }

    pub fn phase(&self) -> FlowPhase {
        self.machine.phase()
    }

    /// Fail unless the session currently sits in `expected`.
    pub fn require_phase(&self, expected: FlowPhase) -> Result<(), ServiceError> {
        let actual = self.phase();
        if actual == expected {
            Ok(())
        } else {
            Err(ServiceError::InvalidState(format!(
                "operation requires phase {expected:?}, session is in {actual:?}"
            )))
        }
    }

    /// Plan and immediately apply a transition that has no side-effect work.
    pub fn transition(&mut self, event: FlowEvent) -> Result<FlowPhase, ServiceError> {
        let Plan { id, .. } = self.machine.plan(event, &self.game)?;
        Ok(self.machine.apply(id)?)
    }

    /// Plan `event`, run `work`, then apply on success or abort on failure/timeout.
    pub async fn run_transition<Fut, T>(
        &mut self,
        event: FlowEvent,
        work: Fut,
    ) -> Result<(T, FlowPhase), ServiceError>
    where
        Fut: Future<Output = Result<T, ServiceError>>,
    {
        let Plan { id: plan_id, .. } = self.machine.plan(event, &self.game)?;

        let outcome = match timeout(DEFAULT_TRANSITION_TIMEOUT, work).await {
            Ok(result) => result,
            Err(_) => Err(ServiceError::Timeout),
        };

        match outcome {
            Ok(value) => {
                let next = self.machine.apply(plan_id)?;
                Ok((value, next))
            }
            Err(err) => {
                if let Err(abort_err) = self.machine.abort(plan_id) {
                    warn!(
                        event = ?event,
                        plan_id = %plan_id,
                        error = ?abort_err,
                        "failed to abort transition after work error"
                    );
                }
                Err(err)
            }
        }
    }

    /// Stop every background task owned by the session.
    pub fn stop_tasks(&mut self) {
        self.timers = None;
        if let Some(liveness) = self.liveness.take() {
            liveness.abort();
        }
    }
}

/// A live session: its identity, its event stream and its guarded runtime.
pub struct SessionHandle {
    id: SessionId,
    events: SseHub,
    runtime: Mutex<SessionRuntime>,
}

impl SessionHandle {
    pub fn new(id: SessionId, runtime: SessionRuntime) -> Self {
        Self {
            id,
            events: SseHub::new(SESSION_EVENTS_CAPACITY),
            runtime: Mutex::new(runtime),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Broadcast hub feeding `/sessions/{id}/events`.
    pub fn events(&self) -> &SseHub {
        &self.events
    }

    pub fn runtime(&self) -> &Mutex<SessionRuntime> {
        &self.runtime
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::play_field::{Direction, GridPos};

    fn ready_runtime() -> SessionRuntime {
        let mut runtime = SessionRuntime::new(&GameTuning::default());
        runtime.transition(FlowEvent::IdentityResolved).unwrap();
        runtime
    }

    #[test]
    fn preparation_requires_all_steps() {
        let mut session = GameSession::new(&GameTuning::default());
        for step in &PreparationStep::ORDERED[..3] {
            session.set_step(*step, true);
        }
        assert!(!session.preparation_complete());

        session.set_step(PreparationStep::WashAgain, true);
        assert!(session.preparation_complete());

        session.set_step(PreparationStep::RemoveShoes, false);
        assert!(!session.preparation_complete());
    }

    #[test]
    fn replay_reset_keeps_name() {
        let tuning = GameTuning::default();
        let mut session = GameSession::new(&tuning);
        session.display_name = "Simran".into();
        session.avatar = Some(Avatar::Turban);
        session.food = Some(FoodItem::Roti);
        session.set_step(PreparationStep::CoverHead, true);
        session.field.move_player(Direction::Up);
        session.score = 42;
        session.time_left = 0;

        session.reset_for_replay(&tuning);

        assert_eq!(session.display_name, "Simran");
        assert_eq!(session.avatar, None);
        assert_eq!(session.food, None);
        assert!(session.completed_steps.is_empty());
        assert_eq!(session.field.player(), GridPos::new(1, 2));
        assert_eq!(session.score, 0);
        assert_eq!(session.time_left, tuning.game_duration_secs);
    }

    #[tokio::test]
    async fn failed_work_aborts_the_transition() {
        let mut runtime = ready_runtime();
        runtime.game.display_name = "Manjit".into();

        let result = runtime
            .run_transition(FlowEvent::NameConfirmed, async {
                Err::<(), _>(ServiceError::InvalidInput("nope".into()))
            })
            .await;
        assert!(matches!(result, Err(ServiceError::InvalidInput(_))));
        assert_eq!(runtime.phase(), FlowPhase::SetDisplayName);

        let ((), next) = runtime
            .run_transition(FlowEvent::NameConfirmed, async { Ok(()) })
            .await
            .unwrap();
        assert_eq!(next, FlowPhase::Entrance);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_work_times_out() {
        let mut runtime = SessionRuntime::new(&GameTuning::default());
        let result = runtime
            .run_transition(FlowEvent::IdentityResolved, async {
                tokio::time::sleep(DEFAULT_TRANSITION_TIMEOUT * 2).await;
                Ok(())
            })
            .await;
        assert!(matches!(result, Err(ServiceError::Timeout)));
        assert_eq!(runtime.phase(), FlowPhase::Loading);
    }

    #[test]
    fn require_phase_reports_mismatch() {
        let runtime = ready_runtime();
        assert!(runtime.require_phase(FlowPhase::SetDisplayName).is_ok());
        assert!(matches!(
            runtime.require_phase(FlowPhase::Playing),
            Err(ServiceError::InvalidState(_))
        ));
    }

    #[tokio::test]
    async fn clearing_timers_aborts_tasks() {
        let (countdown_tx, countdown_rx) = tokio::sync::oneshot::channel::<()>();
        let (spawner_tx, spawner_rx) = tokio::sync::oneshot::channel::<()>();
        let countdown = tokio::spawn(async move {
            let _held = countdown_tx;
            std::future::pending::<()>().await;
        });
        let spawner = tokio::spawn(async move {
            let _held = spawner_tx;
            std::future::pending::<()>().await;
        });

        let mut runtime = ready_runtime();
        runtime.timers = Some(PlayTimers { countdown, spawner });
        runtime.stop_tasks();

        assert!(runtime.timers.is_none());
        assert!(countdown_rx.await.is_err());
        assert!(spawner_rx.await.is_err());
    }
}
