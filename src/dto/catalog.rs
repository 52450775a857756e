use serde::Serialize;
use utoipa::ToSchema;

use crate::{
    config::GameTuning,
    state::catalog::{Avatar, FoodItem, PreparationStep},
};

/// Everything a client needs to render the selection screens.
#[derive(Debug, Serialize, ToSchema)]
pub struct CatalogResponse {
    pub avatars: Vec<AvatarOption>,
    pub preparation_steps: Vec<PreparationStepOption>,
    pub food_items: Vec<FoodOption>,
    pub grid_size: usize,
    pub game_duration_secs: u32,
}

impl CatalogResponse {
    pub fn new(tuning: &GameTuning) -> Self {
        Self {
            avatars: Avatar::ALL.into_iter().map(Into::into).collect(),
            preparation_steps: PreparationStep::ORDERED
                .into_iter()
                .map(Into::into)
                .collect(),
            food_items: FoodItem::ALL.into_iter().map(Into::into).collect(),
            grid_size: tuning.grid_size,
            game_duration_secs: tuning.game_duration_secs,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AvatarOption {
    pub avatar: Avatar,
    pub emoji: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PreparationStepOption {
    pub step: PreparationStep,
    pub label: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct FoodOption {
    pub item: FoodItem,
    pub name: String,
    pub emoji: String,
    pub points: u32,
}

impl From<Avatar> for AvatarOption {
    fn from(avatar: Avatar) -> Self {
        Self {
            avatar,
            emoji: avatar.emoji().into(),
        }
    }
}

impl From<PreparationStep> for PreparationStepOption {
    fn from(step: PreparationStep) -> Self {
        Self {
            step,
            label: step.label().into(),
        }
    }
}

impl From<FoodItem> for FoodOption {
    fn from(item: FoodItem) -> Self {
        Self {
            item,
            name: item.name().into(),
            emoji: item.emoji().into(),
            points: item.points(),
        }
    }
}
