//! Typed notifications between the pipeline, the session and observers.
//!
//! Each event kind has its own `EventBus`. Subscribers register explicitly
//! and receive their own `Receiver`; publishing never blocks and prunes
//! subscribers whose receiver has been dropped.

use image::RgbaImage;
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::{Arc, Mutex, PoisonError};

use super::geometry::Corners;
use crate::screen::FieldReading;

/// Shared handle to the frame a reading was confirmed on.
pub type FrameHandle = Arc<RgbaImage>;

/// Screen corners were confirmed for the active display mode.
#[derive(Clone, Debug, PartialEq)]
pub struct CornersEvent {
    pub corners: Corners,
    /// Confirmed screen-selection reading, empty when that channel is disabled
    pub screen: FieldReading,
}

#[derive(Clone, Debug)]
pub struct BallEvent {
    pub reading: FieldReading,
    pub image: FrameHandle,
}

#[derive(Clone, Debug)]
pub struct ClubEvent {
    pub reading: FieldReading,
    pub image: FrameHandle,
}

/// Everything a pipeline cycle can confirm.
#[derive(Clone, Debug)]
pub enum PipelineEvent {
    Corners(CornersEvent),
    Ball(BallEvent),
    Club(ClubEvent),
}

impl PipelineEvent {
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineEvent::Corners(_) => "corners",
            PipelineEvent::Ball(_) => "ball",
            PipelineEvent::Club(_) => "club",
        }
    }
}

/// Fan-out of one event type to any number of subscribers.
pub struct EventBus<T> {
    subscribers: Mutex<Vec<Sender<T>>>,
}

impl<T: Clone> EventBus<T> {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Registers a subscriber. Dropping the receiver unsubscribes it.
    pub fn subscribe(&self) -> Receiver<T> {
        let (sender, receiver) = channel();
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(sender);
        receiver
    }

    /// Delivers `event` to every live subscriber and returns how many got it.
    pub fn publish(&self, event: T) -> usize {
        let mut subscribers = self
            .subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        subscribers.retain(|sender| sender.send(event.clone()).is_ok());
        subscribers.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl<T: Clone> Default for EventBus<T> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn test_publish_reaches_every_subscriber() {
        let bus = EventBus::new();
        let first = bus.subscribe();
        let second = bus.subscribe();

        assert_eq!(bus.publish(7u32), 2);
        assert_eq!(first.recv().unwrap(), 7);
        assert_eq!(second.recv().unwrap(), 7);
    }

    #[test]
    fn test_dropped_subscriber_is_pruned() {
        let bus = EventBus::new();
        let kept = bus.subscribe();
        drop(bus.subscribe());

        assert_eq!(bus.publish("shot"), 1);
        assert_eq!(bus.subscriber_count(), 1);
        assert_eq!(kept.try_recv().unwrap(), "shot");
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus: EventBus<u8> = EventBus::default();
        assert_eq!(bus.publish(1), 0);
    }

    #[test]
    fn test_slow_subscriber_does_not_block_publisher() {
        let bus = Arc::new(EventBus::new());
        let receiver = bus.subscribe();

        let publisher = {
            let bus = Arc::clone(&bus);
            thread::spawn(move || {
                for i in 0..100u32 {
                    bus.publish(i);
                }
            })
        };
        publisher.join().unwrap();

        let received: Vec<u32> = receiver.try_iter().collect();
        assert_eq!(received.len(), 100);
        assert_eq!(received[99], 99);
    }
}
