//! Target-distance mini-game layered on the shot list.

pub mod config;
pub mod engine;
pub mod scoring;

pub use config::{GameType, MiniGameConfig, ShotFormat};
pub use engine::{MiniGameEngine, MiniGameState, ShotOutcome};

/// Published on the session's mini-game bus.
#[derive(Clone, Debug, PartialEq)]
pub enum MiniGameEvent {
    Started {
        config: MiniGameConfig,
        first_target: Option<u32>,
    },
    ShotScored(ShotOutcome),
    Ended {
        shots_taken: u32,
        total_score: i32,
        total_to_par: i32,
        early: bool,
    },
}
