use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;

use crate::state::catalog::FoodItem;

/// Persisted record of a player, keyed by its session identifier.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct UserEntity {
    /// Session identifier handed out by the identity provider.
    pub id: String,
    /// Name shown on the leaderboard; blank until the player picks one.
    #[serde(default)]
    pub display_name: String,
    /// Cumulative points across every round played.
    #[serde(default)]
    pub seva_points: u32,
    /// How many times each food item was served, keyed by food name.
    #[serde(default)]
    pub items_served: IndexMap<String, u32>,
    #[serde(default = "default_anonymous")]
    pub is_anonymous: bool,
    /// Last time the owning session refreshed the record.
    #[serde(default)]
    pub last_active: Option<SystemTime>,
}

fn default_anonymous() -> bool {
    true
}

impl UserEntity {
    /// Fresh anonymous record with a zero tally for every catalog item.
    pub fn new_anonymous(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            display_name: String::new(),
            seva_points: 0,
            items_served: zeroed_items(),
            is_anonymous: true,
            last_active: None,
        }
    }

    /// Shallow-merge `patch` into the record.
    ///
    /// `now` is used when the patch carries [`Timestamp::Server`].
    pub fn apply(&mut self, patch: UserPatch, now: SystemTime) {
        if let Some(display_name) = patch.display_name {
            self.display_name = display_name;
        }
        if let Some(points) = patch.seva_points {
            self.seva_points = points;
        }
        if let Some(items) = patch.items_served {
            self.items_served = items;
        }
        if let Some(is_anonymous) = patch.is_anonymous {
            self.is_anonymous = is_anonymous;
        }
        if let Some(timestamp) = patch.last_active {
            self.last_active = Some(timestamp.resolve(now));
        }
    }

    /// True once the player picked a non-blank name.
    pub fn has_display_name(&self) -> bool {
        !self.display_name.trim().is_empty()
    }
}

/// A `0` entry for every food item of the catalog, in catalog order.
pub fn zeroed_items() -> IndexMap<String, u32> {
    FoodItem::ALL
        .iter()
        .map(|item| (item.name().to_owned(), 0))
        .collect()
}

/// Value written into `lastActive`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Timestamp {
    /// Let the store assign its own clock at write time.
    Server,
    At(SystemTime),
}

impl Timestamp {
    pub fn resolve(self, now: SystemTime) -> SystemTime {
        match self {
            Timestamp::Server => now,
            Timestamp::At(at) => at,
        }
    }
}

/// Partial update merged into a [`UserEntity`]; absent fields are left untouched.
///
/// Merging into a missing record creates it from [`UserEntity::new_anonymous`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UserPatch {
    pub display_name: Option<String>,
    pub seva_points: Option<u32>,
    /// Replaces the whole tally.
    pub items_served: Option<IndexMap<String, u32>>,
    pub is_anonymous: Option<bool>,
    pub last_active: Option<Timestamp>,
}

impl UserPatch {
    /// Patch that only refreshes `lastActive` with the store clock.
    pub fn touch() -> Self {
        Self {
            last_active: Some(Timestamp::Server),
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn new_record_has_zeroed_catalog() {
        let user = UserEntity::new_anonymous("abc");
        assert!(user.is_anonymous);
        assert!(!user.has_display_name());
        assert_eq!(user.items_served.len(), FoodItem::ALL.len());
        assert!(user.items_served.values().all(|count| *count == 0));
        assert_eq!(user.items_served.keys().next().map(String::as_str), Some("Roti"));
    }

    #[test]
    fn patch_merges_only_present_fields() {
        let now = SystemTime::UNIX_EPOCH + Duration::from_secs(1_000);
        let mut user = UserEntity::new_anonymous("abc");
        user.display_name = "Gurpreet".into();
        user.seva_points = 7;

        user.apply(UserPatch::touch(), now);
        assert_eq!(user.display_name, "Gurpreet");
        assert_eq!(user.seva_points, 7);
        assert_eq!(user.last_active, Some(now));

        let earlier = SystemTime::UNIX_EPOCH;
        user.apply(
            UserPatch {
                seva_points: Some(12),
                last_active: Some(Timestamp::At(earlier)),
                ..UserPatch::default()
            },
            now,
        );
        assert_eq!(user.seva_points, 12);
        assert_eq!(user.last_active, Some(earlier));
    }

    #[test]
    fn persisted_names_are_camel_case() {
        let user = UserEntity::new_anonymous("abc");
        let value = serde_json::to_value(&user).unwrap();
        assert!(value.get("displayName").is_some());
        assert!(value.get("sevaPoints").is_some());
        assert!(value.get("itemsServed").is_some());
        assert!(value.get("isAnonymous").is_some());
        assert!(value.get("lastActive").is_some());
    }
}
