use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::{Validate, ValidationErrors};

use crate::{
    dto::{
        scoreboard::{ItemCount, LeaderboardEntry, leaderboard_entries},
        validation::validate_display_name,
    },
    state::{
        catalog::{Avatar, FoodItem, PreparationStep},
        play_field::{Direction, GridPos, PlayField},
        scoreboard::Scoreboard,
        session::SessionRuntime,
        state_machine::FlowPhase,
    },
};

/// Body of `POST /sessions`.
#[derive(Debug, Default, Deserialize, ToSchema)]
pub struct StartSessionRequest {
    /// Identity returned by an earlier call, to resume after a page reload.
    #[serde(default)]
    pub identity: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct DisplayNameRequest {
    pub display_name: String,
}

impl Validate for DisplayNameRequest {
    fn validate(&self) -> Result<(), ValidationErrors> {
        let mut errors = ValidationErrors::new();
        if let Err(e) = validate_display_name(&self.display_name) {
            errors.add("display_name", e);
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors)
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AvatarRequest {
    pub avatar: Avatar,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct PreparationStepRequest {
    pub done: bool,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct FoodRequest {
    pub food: FoodItem,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct MoveRequest {
    pub direction: Direction,
}

/// Grid state exposed while playing and on the results screen.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct FieldSnapshot {
    pub grid_size: usize,
    pub player: GridPos,
    /// Seated people, oldest first.
    pub seated: Vec<GridPos>,
    /// Cell currently showing the served marker.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_served: Option<GridPos>,
}

impl From<&PlayField> for FieldSnapshot {
    fn from(field: &PlayField) -> Self {
        Self {
            grid_size: field.grid_size(),
            player: field.player(),
            seated: field.seated().collect(),
            last_served: field.last_served(),
        }
    }
}

/// Read-only projection of a session, pushed as `session.state` and returned by every session route.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionSnapshot {
    /// Identity to present again to resume this session.
    pub id: String,
    pub phase: FlowPhase,
    /// Increments on each applied transition.
    pub version: usize,
    /// True when the backend runs without a user store.
    pub degraded: bool,
    pub display_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub avatar: Option<Avatar>,
    pub completed_steps: Vec<PreparationStep>,
    pub preparation_complete: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub food: Option<FoodItem>,
    /// Points earned during the current round.
    pub score: u32,
    pub time_left: u32,
    /// Present while playing and once the round is over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub field: Option<FieldSnapshot>,
    /// Present while playing.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_seva_points: Option<u64>,
    /// Present once the round is over.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub leaderboard: Option<Vec<LeaderboardEntry>>,
    /// Present once the round is over: the player's lifetime tally from the store.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub items_served: Option<Vec<ItemCount>>,
}

impl SessionSnapshot {
    pub fn build(
        id: &str,
        runtime: &SessionRuntime,
        scoreboard: &Scoreboard,
        degraded: bool,
    ) -> Self {
        let machine = runtime.machine.snapshot();
        let game = &runtime.game;
        let phase = machine.phase;

        let field = matches!(phase, FlowPhase::Playing | FlowPhase::GameOver)
            .then(|| FieldSnapshot::from(&game.field));
        let total_seva_points =
            (phase == FlowPhase::Playing).then(|| scoreboard.total_points());
        let (leaderboard, items_served) = if phase == FlowPhase::GameOver {
            let items = scoreboard
                .user(id)
                .map(|user| {
                    user.items_served
                        .iter()
                        .map(|(item, count)| ItemCount {
                            item: item.clone(),
                            count: *count,
                        })
                        .collect()
                })
                .unwrap_or_default();
            (
                Some(leaderboard_entries(scoreboard.leaderboard())),
                Some(items),
            )
        } else {
            (None, None)
        };

        Self {
            id: id.to_owned(),
            phase,
            version: machine.version,
            degraded,
            display_name: game.display_name.clone(),
            avatar: game.avatar,
            completed_steps: game.completed_steps.iter().copied().collect(),
            preparation_complete: game.preparation_complete(),
            food: game.food,
            score: game.score,
            time_left: game.time_left,
            field,
            total_seva_points,
            leaderboard,
            items_served,
        }
    }
}

/// Result of a serve attempt.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ServeResponse {
    /// False when nobody sat under the player.
    pub served: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub points: Option<u32>,
    pub score: u32,
    pub field: FieldSnapshot,
}
