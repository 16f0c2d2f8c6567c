use serde::{Deserialize, Serialize};

use crate::error::RecorderError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum GameType {
    Swings,
    Putting,
}

/// How target distances are laid out over the game.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ShotFormat {
    /// Evenly stepped from min to max
    Incremental,
    /// Uniform over [min, max], with replacement
    Random,
}

/// Settings for one mini-game.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MiniGameConfig {
    pub game_type: GameType,
    /// yards
    pub min_distance: u32,
    /// yards
    pub max_distance: u32,
    pub format: ShotFormat,
    pub total_shots: u32,
    /// Fixes the random target sequence
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

impl MiniGameConfig {
    pub fn new(
        game_type: GameType,
        min_distance: u32,
        max_distance: u32,
        format: ShotFormat,
        total_shots: u32,
    ) -> Self {
        Self {
            game_type,
            min_distance,
            max_distance,
            format,
            total_shots,
            seed: None,
        }
    }

    pub fn validate(&self) -> Result<(), RecorderError> {
        if self.total_shots == 0 {
            return Err(RecorderError::InvalidMiniGameConfig {
                reason: "total shots must be greater than zero".to_string(),
            });
        }
        if self.min_distance > self.max_distance {
            return Err(RecorderError::InvalidMiniGameConfig {
                reason: format!(
                    "min distance {} is greater than max distance {}",
                    self.min_distance, self.max_distance
                ),
            });
        }
        if self.max_distance == 0 {
            return Err(RecorderError::InvalidMiniGameConfig {
                reason: "max distance must be greater than zero".to_string(),
            });
        }
        Ok(())
    }
}
