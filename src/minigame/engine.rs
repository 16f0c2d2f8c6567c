use log::info;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;
use std::collections::VecDeque;

use super::config::{MiniGameConfig, ShotFormat};
use crate::error::RecorderError;
use crate::shots::BallData;

/// Result of scoring one shot.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ShotOutcome {
    /// 1-based
    pub shot_index: u32,
    pub target: u32,
    pub carry: f64,
    /// Carry minus target, yards
    pub distance_diff: f64,
    pub score: i32,
    pub to_par: i32,
    pub total_score: i32,
    pub total_to_par: i32,
    pub shots_remaining: u32,
    pub finished: bool,
}

#[derive(Clone, Debug, PartialEq)]
pub struct MiniGameState {
    pub shots_taken: u32,
    pub score_total: i32,
    pub to_par_total: i32,
    pub last_shot_score: i32,
    pub last_shot_to_par: i32,
    pub last_distance_diff: f64,
    pub remaining_targets: VecDeque<u32>,
    pub ended_early: bool,
}

/// Scores confirmed shots against a sequence of target distances.
#[derive(Debug)]
pub struct MiniGameEngine {
    config: MiniGameConfig,
    state: MiniGameState,
}

impl MiniGameEngine {
    /// Starts a game. Random targets use `config.seed` when set.
    pub fn new(config: MiniGameConfig) -> Result<Self, RecorderError> {
        let mut rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self::start(config, &mut rng)
    }

    pub fn with_seed(config: MiniGameConfig, seed: u64) -> Result<Self, RecorderError> {
        Self::start(config, &mut StdRng::seed_from_u64(seed))
    }

    fn start(config: MiniGameConfig, rng: &mut StdRng) -> Result<Self, RecorderError> {
        config.validate()?;
        let targets = generate_targets(&config, rng);
        info!(
            "Mini-game started: {:?} {:?}, {} shots, targets {:?}",
            config.game_type, config.format, config.total_shots, targets
        );

        Ok(Self {
            config,
            state: MiniGameState {
                shots_taken: 0,
                score_total: 0,
                to_par_total: 0,
                last_shot_score: 0,
                last_shot_to_par: 0,
                last_distance_diff: 0.0,
                remaining_targets: targets.into(),
                ended_early: false,
            },
        })
    }

    /// Scores a shot against the current target.
    ///
    /// Rejected without touching state once the game is finished or when the
    /// shot has no carry distance.
    pub fn add_shot(&mut self, ball: &BallData) -> Result<ShotOutcome, RecorderError> {
        if self.is_finished() {
            return Err(RecorderError::MiniGameFinished {
                total_shots: self.state.shots_taken,
            });
        }
        let Some(carry) = ball.carry_distance else {
            return Err(RecorderError::UnscorableShot {
                reason: "no carry distance".to_string(),
            });
        };
        let Some(target) = self.state.remaining_targets.pop_front() else {
            return Err(RecorderError::MiniGameFinished {
                total_shots: self.state.shots_taken,
            });
        };

        let game = self.config.game_type;
        let distance_diff = carry - target as f64;
        let score = game.score(distance_diff);
        let to_par = score - game.par();

        let state = &mut self.state;
        state.shots_taken += 1;
        state.score_total += score;
        state.to_par_total += to_par;
        state.last_shot_score = score;
        state.last_shot_to_par = to_par;
        state.last_distance_diff = distance_diff;

        let outcome = ShotOutcome {
            shot_index: state.shots_taken,
            target,
            carry,
            distance_diff,
            score,
            to_par,
            total_score: state.score_total,
            total_to_par: state.to_par_total,
            shots_remaining: self.shots_remaining(),
            finished: self.is_finished(),
        };
        info!(
            "Mini-game shot {}/{}: target {} yds, carry {:.1} yds, score {} ({:+})",
            outcome.shot_index, self.config.total_shots, target, carry, score, to_par
        );
        Ok(outcome)
    }

    /// Finishes the game now, leaving unplayed targets in place.
    pub fn end_early(&mut self) {
        if !self.is_finished() {
            info!(
                "Mini-game ended early after {} of {} shots",
                self.state.shots_taken, self.config.total_shots
            );
        }
        self.state.ended_early = true;
    }

    pub fn is_finished(&self) -> bool {
        self.state.ended_early || self.state.shots_taken >= self.config.total_shots
    }

    pub fn shots_remaining(&self) -> u32 {
        if self.is_finished() {
            0
        } else {
            self.config.total_shots - self.state.shots_taken
        }
    }

    /// Target for the next shot, `None` once finished.
    pub fn current_target(&self) -> Option<u32> {
        if self.is_finished() {
            return None;
        }
        self.state.remaining_targets.front().copied()
    }

    pub fn total_score(&self) -> i32 {
        self.state.score_total
    }

    pub fn total_to_par(&self) -> i32 {
        self.state.to_par_total
    }

    pub fn last_shot_score(&self) -> i32 {
        self.state.last_shot_score
    }

    pub fn last_shot_to_par(&self) -> i32 {
        self.state.last_shot_to_par
    }

    pub fn last_distance_diff(&self) -> f64 {
        self.state.last_distance_diff
    }

    pub fn config(&self) -> &MiniGameConfig {
        &self.config
    }

    pub fn state(&self) -> &MiniGameState {
        &self.state
    }
}

fn generate_targets(config: &MiniGameConfig, rng: &mut StdRng) -> Vec<u32> {
    let (min, max, n) = (config.min_distance, config.max_distance, config.total_shots);
    match config.format {
        ShotFormat::Incremental if n == 1 => vec![min],
        ShotFormat::Incremental => {
            let step = (max - min) as f64 / (n - 1) as f64;
            (0..n)
                .map(|i| min + (i as f64 * step).round() as u32)
                .collect()
        }
        ShotFormat::Random => (0..n).map(|_| rng.gen_range(min..=max)).collect(),
    }
}
