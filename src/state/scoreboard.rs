//! Live projection of the user collection: named roster, point total and leaderboard.

use indexmap::IndexMap;

use crate::dao::{models::UserEntity, user_store::UserChange};

/// One line of the leaderboard.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LeaderboardRow {
    pub id: String,
    pub display_name: String,
    pub seva_points: u32,
}

/// Mirror of every user record, kept in store order.
#[derive(Debug, Default)]
pub struct Scoreboard {
    users: IndexMap<String, UserEntity>,
}

impl Scoreboard {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the mirror with a full listing of the store.
    pub fn replace_all(&mut self, users: Vec<UserEntity>) {
        self.users = users
            .into_iter()
            .map(|user| (user.id.clone(), user))
            .collect();
    }

    /// Apply one change notification; returns false when it changed nothing.
    pub fn apply(&mut self, change: UserChange) -> bool {
        match change {
            UserChange::Upserted(user) => {
                if self.users.get(&user.id) == Some(&user) {
                    return false;
                }
                // Existing entries keep their slot so ties stay stable.
                self.users.insert(user.id.clone(), user);
                true
            }
            UserChange::Removed(id) => self.users.shift_remove(&id).is_some(),
        }
    }

    pub fn user(&self, id: &str) -> Option<&UserEntity> {
        self.users.get(id)
    }

    /// Number of mirrored records, named or not.
    pub fn user_count(&self) -> usize {
        self.users.len()
    }

    /// Users with a non-blank display name, in store order.
    pub fn roster(&self) -> impl Iterator<Item = &UserEntity> + '_ {
        self.users.values().filter(|user| user.has_display_name())
    }

    /// Sum of points over every user with a positive score.
    pub fn total_points(&self) -> u64 {
        self.users
            .values()
            .filter(|user| user.seva_points > 0)
            .map(|user| u64::from(user.seva_points))
            .sum()
    }

    /// Roster sorted by descending points; equal scores keep roster order.
    pub fn leaderboard(&self) -> Vec<LeaderboardRow> {
        let mut rows: Vec<_> = self
            .roster()
            .map(|user| LeaderboardRow {
                id: user.id.clone(),
                display_name: user.display_name.clone(),
                seva_points: user.seva_points,
            })
            .collect();
        rows.sort_by(|a, b| b.seva_points.cmp(&a.seva_points));
        rows
    }
}
