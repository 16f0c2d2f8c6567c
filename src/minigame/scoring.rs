//! Golf-style scoring: the closer to the target, the lower the score.

use super::config::GameType;

/// Upper bound of |carry - target| in yards and the score it earns.
const SWINGS_BUCKETS: [(f64, i32); 4] = [(3.0, 2), (7.0, 3), (12.0, 4), (20.0, 5)];
const SWINGS_MISS: i32 = 6;
const SWINGS_PAR: i32 = 3;

const PUTTING_BUCKETS: [(f64, i32); 3] = [(0.5, 1), (1.5, 2), (3.0, 3)];
const PUTTING_MISS: i32 = 4;
const PUTTING_PAR: i32 = 2;

impl GameType {
    pub fn par(&self) -> i32 {
        match self {
            GameType::Swings => SWINGS_PAR,
            GameType::Putting => PUTTING_PAR,
        }
    }

    /// Score for a shot that finished `distance_diff` yards from the target.
    pub fn score(&self, distance_diff: f64) -> i32 {
        let (buckets, miss): (&[(f64, i32)], i32) = match self {
            GameType::Swings => (&SWINGS_BUCKETS, SWINGS_MISS),
            GameType::Putting => (&PUTTING_BUCKETS, PUTTING_MISS),
        };
        let off = distance_diff.abs();
        buckets
            .iter()
            .find(|(limit, _)| off <= *limit)
            .map_or(miss, |(_, score)| *score)
    }
}
