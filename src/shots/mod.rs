//! Committed shots: structured records, the shot list and its export.

pub mod aggregator;
pub mod export;
pub mod record;
pub mod trajectory;

pub use aggregator::{Shot, ShotAggregator};
pub use export::{ShotRecord, ShotTable};
pub use record::{BallData, ClubData, Side};
pub use trajectory::{TrajectoryModel, TrajectoryPrediction};
