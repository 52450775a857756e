use serde::Serialize;
use utoipa::ToSchema;

use crate::state::scoreboard::{LeaderboardRow, Scoreboard};

/// Aggregate view of every participant, pushed as the `scoreboard` SSE event.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ScoreboardSnapshot {
    /// Named participants, in store order.
    pub participants: Vec<ParticipantSummary>,
    /// Sum of points over every user with a positive score.
    pub total_seva_points: u64,
    pub leaderboard: Vec<LeaderboardEntry>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ParticipantSummary {
    pub id: String,
    pub display_name: String,
    pub seva_points: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct LeaderboardEntry {
    /// 1-based position.
    pub rank: usize,
    pub display_name: String,
    pub seva_points: u32,
}

/// Number of times one food item was served.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, ToSchema)]
pub struct ItemCount {
    pub item: String,
    pub count: u32,
}

pub fn leaderboard_entries(rows: Vec<LeaderboardRow>) -> Vec<LeaderboardEntry> {
    rows.into_iter()
        .enumerate()
        .map(|(index, row)| LeaderboardEntry {
            rank: index + 1,
            display_name: row.display_name,
            seva_points: row.seva_points,
        })
        .collect()
}

impl From<&Scoreboard> for ScoreboardSnapshot {
    fn from(board: &Scoreboard) -> Self {
        Self {
            participants: board
                .roster()
                .map(|user| ParticipantSummary {
                    id: user.id.clone(),
                    display_name: user.display_name.clone(),
                    seva_points: user.seva_points,
                })
                .collect(),
            total_seva_points: board.total_points(),
            leaderboard: leaderboard_entries(board.leaderboard()),
        }
    }
}
