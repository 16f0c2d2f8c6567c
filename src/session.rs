//! One recording session.
//!
//! Owns the shot list and the running mini-game and consumes confirmation
//! events from the pipeline, one at a time. Observers subscribe to the
//! typed buses in `EventHub`.

use log::{debug, info, warn};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::RecorderError;
use crate::minigame::{MiniGameConfig, MiniGameEngine, MiniGameEvent};
use crate::pipeline::{BallEvent, ClubEvent, CornersEvent, EventBus, PipelineEvent};
use crate::shots::{Shot, ShotAggregator, ShotTable, TrajectoryModel};
use crate::simulator::{ConnectionState, DeliveryQueue, OutboundShot};

/// Typed notification buses for one session.
#[derive(Default)]
pub struct EventHub {
    pub corners: EventBus<CornersEvent>,
    pub ball: EventBus<BallEvent>,
    pub club: EventBus<ClubEvent>,
    /// Shared with the simulator link, which publishes on it
    pub connection: Arc<EventBus<ConnectionState>>,
    pub minigame: EventBus<MiniGameEvent>,
}

impl EventHub {
    pub fn new() -> Self {
        Self::default()
    }
}

pub struct Session {
    hub: Arc<EventHub>,
    shots: ShotAggregator,
    minigame: Option<MiniGameEngine>,
    trajectory: Option<Box<dyn TrajectoryModel>>,
    delivery: Option<DeliveryQueue>,
}

impl Session {
    pub fn new(hub: Arc<EventHub>) -> Self {
        Self {
            hub,
            shots: ShotAggregator::new(),
            minigame: None,
            trajectory: None,
            delivery: None,
        }
    }

    pub fn with_trajectory_model(mut self, model: Box<dyn TrajectoryModel>) -> Self {
        self.trajectory = Some(model);
        self
    }

    /// Confirmed shots are queued here from now on.
    pub fn attach_delivery(&mut self, queue: DeliveryQueue) {
        self.delivery = Some(queue);
    }

    /// Stops queuing shots and releases the queue handle.
    pub fn detach_delivery(&mut self) -> Option<DeliveryQueue> {
        self.delivery.take()
    }

    pub fn hub(&self) -> &Arc<EventHub> {
        &self.hub
    }

    /// Republishes a pipeline confirmation and applies it to the session.
    pub fn handle_event(&mut self, event: PipelineEvent) {
        match event {
            PipelineEvent::Corners(corners) => {
                debug!("Screen corners confirmed: {:?}", corners.corners);
                self.hub.corners.publish(corners);
            }
            PipelineEvent::Ball(ball) => {
                self.hub.ball.publish(ball.clone());
                self.on_ball(ball);
            }
            PipelineEvent::Club(club) => {
                self.hub.club.publish(club.clone());
                match self.shots.update_shot_club_data(club.reading, Some(club.image)) {
                    Some(shot) => {
                        let outbound = OutboundShot::club_only(shot);
                        self.deliver(outbound);
                    }
                    None => debug!("Club data confirmed with no shot to attach it to"),
                }
            }
        }
    }

    fn on_ball(&mut self, event: BallEvent) {
        let prediction = {
            let shot = self.shots.add_shot(event.reading, Some(event.image));
            self.trajectory
                .as_ref()
                .and_then(|model| model.predict(&shot.ball))
        };
        if let Some(prediction) = prediction {
            self.shots.augment_latest(&prediction);
        }

        let Some(shot) = self.shots.latest() else {
            return;
        };
        let outbound = OutboundShot::ball_only(shot);

        if let Some(engine) = self.minigame.as_mut() {
            match engine.add_shot(&shot.ball) {
                Ok(outcome) => {
                    let finished = outcome.finished;
                    self.hub.minigame.publish(MiniGameEvent::ShotScored(outcome));
                    if finished {
                        self.hub.minigame.publish(MiniGameEvent::Ended {
                            shots_taken: engine.state().shots_taken,
                            total_score: engine.total_score(),
                            total_to_par: engine.total_to_par(),
                            early: false,
                        });
                    }
                }
                Err(RecorderError::MiniGameFinished { .. }) => {
                    debug!("Shot {} after the mini-game finished", shot.number);
                }
                Err(e) => warn!("Shot {} not scored: {}", shot.number, e),
            }
        }

        self.deliver(outbound);
    }

    fn deliver(&mut self, outbound: OutboundShot) {
        if let Some(queue) = &self.delivery {
            if let Err(e) = queue.submit(outbound) {
                warn!("Shot delivery stopped: {}", e);
                self.delivery = None;
            }
        }
    }

    /// Starts a mini-game, ending any game still running.
    pub fn start_minigame(&mut self, config: MiniGameConfig) -> Result<(), RecorderError> {
        let engine = MiniGameEngine::new(config.clone())?;
        self.end_minigame_early();

        self.hub.minigame.publish(MiniGameEvent::Started {
            config,
            first_target: engine.current_target(),
        });
        self.minigame = Some(engine);
        Ok(())
    }

    /// Ends the running game. Returns false when no game was running.
    pub fn end_minigame_early(&mut self) -> bool {
        let Some(engine) = self.minigame.as_mut().filter(|e| !e.is_finished()) else {
            return false;
        };
        engine.end_early();
        self.hub.minigame.publish(MiniGameEvent::Ended {
            shots_taken: engine.state().shots_taken,
            total_score: engine.total_score(),
            total_to_par: engine.total_to_par(),
            early: true,
        });
        true
    }

    pub fn minigame(&self) -> Option<&MiniGameEngine> {
        self.minigame.as_ref()
    }

    pub fn shots(&self) -> &ShotAggregator {
        &self.shots
    }

    pub fn snapshot(&self) -> Vec<Shot> {
        self.shots.snapshot()
    }

    pub fn export_table(&self) -> ShotTable {
        self.shots.export_as_table()
    }

    /// Writes the shot table to a timestamped CSV in `dir`.
    pub fn export_csv(&self, dir: &Path) -> Result<PathBuf, RecorderError> {
        let path = self.export_table().write_csv(dir)?;
        info!("Exported {} shots to {}", self.shots.len(), path.display());
        Ok(path)
    }
}
