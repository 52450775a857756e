use std::time::Instant;

use serde::Serialize;
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::state::session::GameSession;

/// Phases a player walks through, in order, with a replay loop at the end.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum FlowPhase {
    /// Waiting for the identity provider to hand out a session identifier.
    Loading,
    /// Identity resolved; the player must pick a display name.
    SetDisplayName,
    /// Welcome screen at the gurdwara door.
    Entrance,
    SelectAvatar,
    /// Ritual checklist before serving.
    Preparation,
    SelectFood,
    /// Timed serving round in the langar hall.
    Playing,
    /// Round finished; scores and leaderboard are shown.
    GameOver,
}

/// Events that can be applied to the flow state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlowEvent {
    /// Identity provider returned a new or existing identifier.
    IdentityResolved,
    /// Player submitted a non-empty display name.
    NameConfirmed,
    /// Player stepped through the entrance.
    EnterGurdwara,
    AvatarConfirmed,
    PreparationCompleted,
    /// Player entered the hall with a food item in hand.
    FoodConfirmed,
    /// Countdown reached zero.
    TimeUp,
    /// Player asked for another round.
    PlayAgain,
}

/// Requirement of the session that is not met yet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum MissingRequirement {
    #[error("a display name is required")]
    DisplayName,
    #[error("an avatar must be selected")]
    Avatar,
    #[error("every preparation step must be completed")]
    Preparation,
    #[error("a food item must be selected")]
    Food,
}

/// Error returned when attempting to apply an invalid transition.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("invalid transition: {event:?} cannot be applied while in {from:?}")]
pub struct InvalidTransition {
    /// The phase the state machine was in when the invalid event was received.
    pub from: FlowPhase,
    /// The event that cannot be applied from this phase.
    pub event: FlowEvent,
}

/// Errors that can occur when planning a state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlanError {
    /// A transition is already pending and must be applied or aborted.
    AlreadyPending,
    /// The requested transition is not valid from the current phase.
    InvalidTransition(InvalidTransition),
    /// The transition is valid but the session does not satisfy its guard.
    Unmet(MissingRequirement),
}

/// Errors that can occur when applying a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ApplyError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch { expected: PlanId, got: PlanId },
    /// State machine phase changed since the plan was created.
    PhaseMismatch {
        expected: FlowPhase,
        actual: FlowPhase,
    },
    /// State machine version changed since the plan was created.
    VersionMismatch { expected: usize, actual: usize },
}

/// Errors that can occur when aborting a planned state machine transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortError {
    /// No transition is currently pending.
    NoPending,
    /// Plan ID does not match the pending plan.
    IdMismatch { expected: PlanId, got: PlanId },
}

/// Unique identifier for a planned state transition.
pub type PlanId = Uuid;

/// A planned state machine transition that has been validated but not yet applied.
#[derive(Debug, Clone)]
pub struct Plan {
    pub id: PlanId,
    pub from: FlowPhase,
    pub to: FlowPhase,
    pub event: FlowEvent,
    /// Version number after applying this transition.
    pub version_next: usize,
    pub pending_since: Instant,
}

/// Snapshot of the current state machine state.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    pub phase: FlowPhase,
    /// Increments on each applied transition.
    pub version: usize,
    /// Target phase of a planned but not yet applied transition.
    pub pending: Option<FlowPhase>,
}

/// State machine driving one player's session through the game flow.
#[derive(Debug, Clone)]
pub struct FlowStateMachine {
    phase: FlowPhase,
    version: usize,
    pending: Option<Plan>,
}

impl Default for FlowStateMachine {
    fn default() -> Self {
        Self {
            phase: FlowPhase::Loading,
            version: 0,
            pending: None,
        }
    }
}

impl FlowStateMachine {
    /// Create a new state machine waiting for an identity.
    pub fn new() -> Self {
        Self::default()
    }

    pub fn phase(&self) -> FlowPhase {
        self.phase
    }

    pub fn snapshot(&self) -> Snapshot {
        Snapshot {
            phase: self.phase,
            version: self.version,
            pending: self.pending.as_ref().map(|plan| plan.to),
        }
    }

    /// Validate `event` against the current phase and the session guards.
    /// Returns a Plan that must later be applied or aborted.
    pub fn plan(&mut self, event: FlowEvent, session: &GameSession) -> Result<Plan, PlanError> {
        if self.pending.is_some() {
            return Err(PlanError::AlreadyPending);
        }

        let next = self
            .compute_transition(event)
            .map_err(PlanError::InvalidTransition)?;
        check_guard(event, session).map_err(PlanError::Unmet)?;

        let plan = Plan {
            id: Uuid::new_v4(),
            from: self.phase,
            to: next,
            event,
            version_next: self.version + 1,
            pending_since: Instant::now(),
        };

        self.pending = Some(plan.clone());

        Ok(plan)
    }

    /// Apply a planned transition, returning the new phase.
    pub fn apply(&mut self, plan_id: PlanId) -> Result<FlowPhase, ApplyError> {
        let plan = self.pending.take().ok_or(ApplyError::NoPending)?;

        if plan.id != plan_id {
            let expected = plan.id;
            self.pending = Some(plan);
            return Err(ApplyError::IdMismatch {
                expected,
                got: plan_id,
            });
        }

        if self.phase != plan.from {
            return Err(ApplyError::PhaseMismatch {
                expected: plan.from,
                actual: self.phase,
            });
        }

        if self.version + 1 != plan.version_next {
            return Err(ApplyError::VersionMismatch {
                expected: plan.version_next,
                actual: self.version + 1,
            });
        }

        self.phase = plan.to;
        self.version = plan.version_next;

        Ok(self.phase)
    }

    /// Abort a planned transition without applying it.
    pub fn abort(&mut self, plan_id: PlanId) -> Result<(), AbortError> {
        let plan = self.pending.as_ref().ok_or(AbortError::NoPending)?;

        if plan.id != plan_id {
            return Err(AbortError::IdMismatch {
                expected: plan.id,
                got: plan_id,
            });
        }

        self.pending = None;
        Ok(())
    }

    fn compute_transition(&self, event: FlowEvent) -> Result<FlowPhase, InvalidTransition> {
        let next = match (self.phase, event) {
            (FlowPhase::Loading, FlowEvent::IdentityResolved) => FlowPhase::SetDisplayName,
            (FlowPhase::SetDisplayName, FlowEvent::NameConfirmed) => FlowPhase::Entrance,
            (FlowPhase::Entrance, FlowEvent::EnterGurdwara) => FlowPhase::SelectAvatar,
            (FlowPhase::SelectAvatar, FlowEvent::AvatarConfirmed) => FlowPhase::Preparation,
            (FlowPhase::Preparation, FlowEvent::PreparationCompleted) => FlowPhase::SelectFood,
            (FlowPhase::SelectFood, FlowEvent::FoodConfirmed) => FlowPhase::Playing,
            (FlowPhase::Playing, FlowEvent::TimeUp) => FlowPhase::GameOver,
            (FlowPhase::GameOver, FlowEvent::PlayAgain) => FlowPhase::Entrance,
            (from, event) => return Err(InvalidTransition { from, event }),
        };

        Ok(next)
    }
}

fn check_guard(event: FlowEvent, session: &GameSession) -> Result<(), MissingRequirement> {
    match event {
        FlowEvent::NameConfirmed if session.display_name.trim().is_empty() => {
            Err(MissingRequirement::DisplayName)
        }
        FlowEvent::AvatarConfirmed if session.avatar.is_none() => Err(MissingRequirement::Avatar),
        FlowEvent::PreparationCompleted if !session.preparation_complete() => {
            Err(MissingRequirement::Preparation)
        }
        FlowEvent::FoodConfirmed if session.food.is_none() => Err(MissingRequirement::Food),
        _ => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        config::GameTuning,
        state::catalog::{Avatar, FoodItem, PreparationStep},
    };

    fn apply(sm: &mut FlowStateMachine, event: FlowEvent, session: &GameSession) -> FlowPhase {
        let plan = sm.plan(event, session).unwrap();
        sm.apply(plan.id).unwrap()
    }

    fn ready_session() -> GameSession {
        let mut session = GameSession::new(&GameTuning::default());
        session.display_name = "Harpreet".into();
        session.avatar = Some(Avatar::Woman);
        for step in PreparationStep::ORDERED {
            session.set_step(step, true);
        }
        session.food = Some(FoodItem::Roti);
        session
    }

    #[test]
    fn initial_state_is_loading() {
        let sm = FlowStateMachine::new();
        assert_eq!(sm.phase(), FlowPhase::Loading);
    }

    #[test]
    fn full_happy_path_with_replay() {
        let mut sm = FlowStateMachine::new();
        let session = ready_session();

        assert_eq!(
            apply(&mut sm, FlowEvent::IdentityResolved, &session),
            FlowPhase::SetDisplayName
        );
        assert_eq!(
            apply(&mut sm, FlowEvent::NameConfirmed, &session),
            FlowPhase::Entrance
        );
        assert_eq!(
            apply(&mut sm, FlowEvent::EnterGurdwara, &session),
            FlowPhase::SelectAvatar
        );
        assert_eq!(
            apply(&mut sm, FlowEvent::AvatarConfirmed, &session),
            FlowPhase::Preparation
        );
        assert_eq!(
            apply(&mut sm, FlowEvent::PreparationCompleted, &session),
            FlowPhase::SelectFood
        );
        assert_eq!(
            apply(&mut sm, FlowEvent::FoodConfirmed, &session),
            FlowPhase::Playing
        );
        assert_eq!(
            apply(&mut sm, FlowEvent::TimeUp, &session),
            FlowPhase::GameOver
        );
        assert_eq!(
            apply(&mut sm, FlowEvent::PlayAgain, &session),
            FlowPhase::Entrance
        );
        assert_eq!(sm.snapshot().version, 8);
    }

    #[test]
    fn guards_block_each_step_in_order() {
        let mut sm = FlowStateMachine::new();
        let mut session = GameSession::new(&GameTuning::default());
        apply(&mut sm, FlowEvent::IdentityResolved, &session);

        session.display_name = "   ".into();
        assert_eq!(
            sm.plan(FlowEvent::NameConfirmed, &session).unwrap_err(),
            PlanError::Unmet(MissingRequirement::DisplayName)
        );
        session.display_name = "Jas".into();
        apply(&mut sm, FlowEvent::NameConfirmed, &session);
        apply(&mut sm, FlowEvent::EnterGurdwara, &session);

        assert_eq!(
            sm.plan(FlowEvent::AvatarConfirmed, &session).unwrap_err(),
            PlanError::Unmet(MissingRequirement::Avatar)
        );
        session.avatar = Some(Avatar::Person);
        apply(&mut sm, FlowEvent::AvatarConfirmed, &session);

        session.set_step(PreparationStep::WashHands, true);
        assert_eq!(
            sm.plan(FlowEvent::PreparationCompleted, &session)
                .unwrap_err(),
            PlanError::Unmet(MissingRequirement::Preparation)
        );
        for step in PreparationStep::ORDERED {
            session.set_step(step, true);
        }
        apply(&mut sm, FlowEvent::PreparationCompleted, &session);

        assert_eq!(
            sm.plan(FlowEvent::FoodConfirmed, &session).unwrap_err(),
            PlanError::Unmet(MissingRequirement::Food)
        );
        session.food = Some(FoodItem::Napkins);
        assert_eq!(
            apply(&mut sm, FlowEvent::FoodConfirmed, &session),
            FlowPhase::Playing
        );
    }

    #[test]
    fn cannot_skip_ahead_to_playing() {
        let session = ready_session();
        let mut sm = FlowStateMachine::new();
        apply(&mut sm, FlowEvent::IdentityResolved, &session);

        let err = sm.plan(FlowEvent::FoodConfirmed, &session).unwrap_err();
        match err {
            PlanError::InvalidTransition(invalid) => {
                assert_eq!(invalid.from, FlowPhase::SetDisplayName);
                assert_eq!(invalid.event, FlowEvent::FoodConfirmed);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn second_plan_while_pending_is_rejected() {
        let session = ready_session();
        let mut sm = FlowStateMachine::new();
        let plan = sm.plan(FlowEvent::IdentityResolved, &session).unwrap();
        assert_eq!(sm.snapshot().pending, Some(FlowPhase::SetDisplayName));
        assert_eq!(
            sm.plan(FlowEvent::IdentityResolved, &session).unwrap_err(),
            PlanError::AlreadyPending
        );
        sm.apply(plan.id).unwrap();
    }

    #[test]
    fn apply_with_wrong_id_keeps_plan() {
        let session = ready_session();
        let mut sm = FlowStateMachine::new();
        let plan = sm.plan(FlowEvent::IdentityResolved, &session).unwrap();
        let err = sm.apply(Uuid::new_v4()).unwrap_err();
        assert!(matches!(err, ApplyError::IdMismatch { .. }));
        assert_eq!(sm.apply(plan.id).unwrap(), FlowPhase::SetDisplayName);
    }

    #[test]
    fn abort_clears_pending() {
        let session = ready_session();
        let mut sm = FlowStateMachine::new();
        let plan = sm.plan(FlowEvent::IdentityResolved, &session).unwrap();
        sm.abort(plan.id).unwrap();
        assert!(sm.pending.is_none());
        assert_eq!(sm.phase(), FlowPhase::Loading);
    }
}
