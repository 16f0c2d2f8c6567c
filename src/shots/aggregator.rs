//! The session's list of committed shots.

use chrono::{DateTime, Local};
use log::{debug, info};

use super::export::ShotTable;
use super::record::{BallData, ClubData};
use super::trajectory::TrajectoryPrediction;
use crate::pipeline::FrameHandle;
use crate::screen::FieldReading;

/// One swing: the ball reading that started it and the club reading that
/// followed, if any.
#[derive(Clone, Debug)]
pub struct Shot {
    /// 1-based, in detection order
    pub number: u32,
    pub ball_reading: FieldReading,
    pub ball: BallData,
    pub ball_image: Option<FrameHandle>,
    pub club_reading: Option<FieldReading>,
    pub club: Option<ClubData>,
    pub club_image: Option<FrameHandle>,
    pub recorded_at: DateTime<Local>,
}

/// Append-only shot list.
///
/// A shot starts on ball confirmation. Club confirmations update the most
/// recent shot, replacing whatever club data it had.
#[derive(Debug, Default)]
pub struct ShotAggregator {
    shots: Vec<Shot>,
}

impl ShotAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a shot for a confirmed ball reading.
    pub fn add_shot(&mut self, reading: FieldReading, image: Option<FrameHandle>) -> &Shot {
        let number = self.shots.len() as u32 + 1;
        let ball = BallData::from_reading(&reading);
        info!(
            "Shot {}: speed {:?} mph, carry {:?} yds",
            number, ball.speed, ball.carry_distance
        );

        self.shots.push(Shot {
            number,
            ball_reading: reading,
            ball,
            ball_image: image,
            club_reading: None,
            club: None,
            club_image: None,
            recorded_at: Local::now(),
        });
        &self.shots[self.shots.len() - 1]
    }

    /// Attaches club data to the latest shot. Without a shot this does nothing.
    pub fn update_shot_club_data(
        &mut self,
        reading: FieldReading,
        image: Option<FrameHandle>,
    ) -> Option<&Shot> {
        let Some(shot) = self.shots.last_mut() else {
            debug!("Club data before any shot, dropped");
            return None;
        };

        if shot.club_reading.is_some() {
            debug!("Replacing club data of shot {}", shot.number);
        }
        shot.club = Some(ClubData::from_reading(&reading));
        shot.club_reading = Some(reading);
        shot.club_image = image;
        Some(&*shot)
    }

    /// Adds regression outputs to the latest shot.
    pub fn augment_latest(&mut self, prediction: &TrajectoryPrediction) -> bool {
        match self.shots.last_mut() {
            Some(shot) => {
                shot.ball.apply_prediction(prediction);
                true
            }
            None => false,
        }
    }

    pub fn latest(&self) -> Option<&Shot> {
        self.shots.last()
    }

    pub fn shots(&self) -> &[Shot] {
        &self.shots
    }

    /// Point-in-time copy for readers outside the session.
    pub fn snapshot(&self) -> Vec<Shot> {
        self.shots.clone()
    }

    pub fn len(&self) -> usize {
        self.shots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.shots.is_empty()
    }

    /// One row per shot, columns from every reading seen.
    pub fn export_as_table(&self) -> ShotTable {
        ShotTable::from_shots(&self.shots)
    }
}
