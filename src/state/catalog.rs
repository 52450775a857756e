//! Fixed catalog of avatars, preparation steps and food items offered by the game.

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

/// Avatars a player can pick before entering the langar hall.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum Avatar {
    Man,
    Woman,
    Turban,
    Meditating,
    Person,
}

impl Avatar {
    /// Every selectable avatar, in display order.
    pub const ALL: [Avatar; 5] = [
        Avatar::Man,
        Avatar::Woman,
        Avatar::Turban,
        Avatar::Meditating,
        Avatar::Person,
    ];

    pub fn emoji(self) -> &'static str {
        match self {
            Avatar::Man => "👨",
            Avatar::Woman => "👩",
            Avatar::Turban => "👳",
            Avatar::Meditating => "🧘‍♀️",
            Avatar::Person => "🧑",
        }
    }
}

/// Ritual preparation steps that must all be ticked before serving.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, ToSchema,
)]
#[serde(rename_all = "snake_case")]
pub enum PreparationStep {
    WashHands,
    RemoveShoes,
    CoverHead,
    WashAgain,
}

impl PreparationStep {
    /// The checklist in the order it is presented.
    pub const ORDERED: [PreparationStep; 4] = [
        PreparationStep::WashHands,
        PreparationStep::RemoveShoes,
        PreparationStep::CoverHead,
        PreparationStep::WashAgain,
    ];

    pub fn label(self) -> &'static str {
        match self {
            PreparationStep::WashHands => "Wash hands 🧼",
            PreparationStep::RemoveShoes => "Remove shoes 👞",
            PreparationStep::CoverHead => "Cover head 🧢",
            PreparationStep::WashAgain => "Wash hands again before serving food 🧼",
        }
    }

    /// Parse the snake_case identifier used in route paths.
    pub fn from_key(key: &str) -> Option<Self> {
        Self::ORDERED.into_iter().find(|step| step.key() == key)
    }

    pub fn key(self) -> &'static str {
        match self {
            PreparationStep::WashHands => "wash_hands",
            PreparationStep::RemoveShoes => "remove_shoes",
            PreparationStep::CoverHead => "cover_head",
            PreparationStep::WashAgain => "wash_again",
        }
    }
}

/// Items that can be served in the langar hall, each worth a fixed number of points.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum FoodItem {
    Roti,
    Chai,
    Chickpeas,
    Water,
    Napkins,
}

impl FoodItem {
    /// Full food catalog, in display order.
    pub const ALL: [FoodItem; 5] = [
        FoodItem::Roti,
        FoodItem::Chai,
        FoodItem::Chickpeas,
        FoodItem::Water,
        FoodItem::Napkins,
    ];

    /// Name used as the key of the persisted `itemsServed` tally.
    pub fn name(self) -> &'static str {
        match self {
            FoodItem::Roti => "Roti",
            FoodItem::Chai => "Chai",
            FoodItem::Chickpeas => "Chickpeas",
            FoodItem::Water => "Water",
            FoodItem::Napkins => "Napkins",
        }
    }

    pub fn emoji(self) -> &'static str {
        match self {
            FoodItem::Roti => "🫓",
            FoodItem::Chai => "🫖",
            FoodItem::Chickpeas => "🥘",
            FoodItem::Water => "💧",
            FoodItem::Napkins => "🧻",
        }
    }

    /// Seva points awarded for a single serve of this item.
    pub fn points(self) -> u32 {
        match self {
            FoodItem::Roti => 5,
            FoodItem::Chai => 3,
            FoodItem::Chickpeas => 4,
            FoodItem::Water => 2,
            FoodItem::Napkins => 1,
        }
    }
}
