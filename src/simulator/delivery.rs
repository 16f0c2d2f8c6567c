//! Shot delivery off the frame-processing thread.
//!
//! The session queues shots; a dedicated thread writes them to the link.
//! Failures are logged and counted, never retried.

use log::{error, info, warn};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use super::link::SimulatorLink;
use super::protocol::OutboundShot;
use crate::error::RecorderError;

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub sent: u32,
    pub failed: u32,
}

/// Producer handle for the delivery queue.
#[derive(Clone)]
pub struct DeliveryQueue {
    sender: Sender<OutboundShot>,
}

impl DeliveryQueue {
    pub fn submit(&self, shot: OutboundShot) -> Result<(), RecorderError> {
        self.sender
            .send(shot)
            .map_err(|_| RecorderError::DeliveryQueueClosed)
    }
}

/// Creates a delivery queue and the receiver a worker drains.
pub fn create_delivery_queue() -> (DeliveryQueue, Receiver<OutboundShot>) {
    let (sender, receiver) = channel();
    (DeliveryQueue { sender }, receiver)
}

/// Sends queued shots until every `DeliveryQueue` is dropped.
pub fn run_delivery_worker(receiver: Receiver<OutboundShot>, link: &SimulatorLink) -> DeliveryStats {
    let mut stats = DeliveryStats::default();
    info!("Delivery worker started");

    for shot in receiver {
        match link.send_shot(&shot) {
            Ok(()) => {
                stats.sent += 1;
                info!("Shot {} delivered to simulator", shot.shot_number);
            }
            Err(e) if e.is_connection() => {
                stats.failed += 1;
                warn!("Shot {} not delivered, simulator link down: {}", shot.shot_number, e);
            }
            Err(e) => {
                stats.failed += 1;
                error!("Shot {} rejected: {}", shot.shot_number, e);
            }
        }
    }

    info!(
        "Delivery worker finished: {} sent, {} failed",
        stats.sent, stats.failed
    );
    stats
}

/// Delivery worker running on its own thread.
pub struct DeliveryWorker {
    queue: DeliveryQueue,
    handle: JoinHandle<DeliveryStats>,
}

impl DeliveryWorker {
    pub fn spawn(link: Arc<SimulatorLink>) -> Self {
        let (queue, receiver) = create_delivery_queue();
        let handle = thread::spawn(move || run_delivery_worker(receiver, &link));
        Self { queue, handle }
    }

    /// Another producer handle for the same worker.
    pub fn queue(&self) -> DeliveryQueue {
        self.queue.clone()
    }

    /// Drains the queue and stops the thread.
    ///
    /// Waits until every other `DeliveryQueue` handle has been dropped too.
    pub fn shutdown(self) -> DeliveryStats {
        drop(self.queue);
        match self.handle.join() {
            Ok(stats) => stats,
            Err(_) => {
                warn!("Delivery worker panicked");
                DeliveryStats::default()
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SimulatorConfig;
    use crate::pipeline::EventBus;
    use crate::shots::BallData;

    fn shot(number: u32) -> OutboundShot {
        OutboundShot {
            shot_number: number,
            ball: Some(BallData {
                speed: Some(120.0),
                ..BallData::default()
            }),
            ..OutboundShot::default()
        }
    }

    #[test]
    fn test_undelivered_shots_are_counted() {
        let link = Arc::new(SimulatorLink::new(
            SimulatorConfig::default(),
            Arc::new(EventBus::new()),
        ));
        let worker = DeliveryWorker::spawn(link);
        let queue = worker.queue();

        queue.submit(shot(1)).unwrap();
        queue.submit(shot(2)).unwrap();
        drop(queue);

        let stats = worker.shutdown();
        assert_eq!(stats, DeliveryStats { sent: 0, failed: 2 });
    }

    #[test]
    fn test_submit_after_worker_gone() {
        let (queue, receiver) = create_delivery_queue();
        drop(receiver);
        assert!(matches!(
            queue.submit(shot(1)),
            Err(RecorderError::DeliveryQueueClosed)
        ));
    }
}
