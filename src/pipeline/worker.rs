//! Frame queue and the two loops on either side of it.
//!
//! The capture loop pulls frames from a `FrameSource` at a fixed cadence and
//! offers them to a bounded queue. The pipeline loop drains the queue one
//! frame at a time, so no two cycles ever overlap.

use chrono::{DateTime, Local};
use image::RgbaImage;
use log::{debug, info, warn};
use std::collections::VecDeque;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{sync_channel, Receiver, SyncSender, TrySendError};
use std::thread;
use std::time::Duration;

use super::events::PipelineEvent;
use super::screen::ScreenPipeline;
use crate::error::RecorderError;

const IMAGE_EXTENSIONS: [&str; 4] = ["png", "jpg", "jpeg", "bmp"];

/// One captured frame on its way to the pipeline.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbaImage,
    /// Capture order (1-based)
    pub index: u64,
    pub captured_at: DateTime<Local>,
}

impl Frame {
    pub fn new(image: RgbaImage, index: u64) -> Self {
        Self {
            image,
            index,
            captured_at: Local::now(),
        }
    }
}

/// Camera or recording the frames come from.
pub trait FrameSource: Send {
    /// Next frame, `None` once the source is exhausted.
    fn next_frame(&mut self) -> Option<Result<RgbaImage, RecorderError>>;
}

/// Replays image files from a directory in file name order.
pub struct DirectoryFrameSource {
    pending: VecDeque<PathBuf>,
}

impl DirectoryFrameSource {
    pub fn open(dir: &Path) -> Result<Self, RecorderError> {
        let entries = fs::read_dir(dir).map_err(|e| RecorderError::FrameRead {
            path: dir.display().to_string(),
            source: e,
        })?;

        let mut paths: Vec<PathBuf> = entries
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| path.is_file() && is_image_file(path))
            .collect();
        paths.sort();

        info!("Found {} frames in {}", paths.len(), dir.display());
        Ok(Self {
            pending: paths.into(),
        })
    }

    pub fn remaining(&self) -> usize {
        self.pending.len()
    }
}

fn is_image_file(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| IMAGE_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()))
}

impl FrameSource for DirectoryFrameSource {
    fn next_frame(&mut self) -> Option<Result<RgbaImage, RecorderError>> {
        let path = self.pending.pop_front()?;
        debug!("Loading frame {}", path.display());
        Some(
            image::open(&path)
                .map(|img| img.to_rgba8())
                .map_err(|e| RecorderError::ImageDecode { source: e }),
        )
    }
}

/// What to do when the pipeline falls behind.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Overflow {
    /// Drop the new frame. Live capture only cares about the latest screen.
    DropNewest,
    /// Wait for room. Used for replays, where every frame matters.
    Block,
}

/// Producer side of the frame queue.
pub struct FrameSender {
    sender: SyncSender<Frame>,
    overflow: Overflow,
}

impl FrameSender {
    /// Queues a frame. Returns `Ok(false)` if it was dropped.
    pub fn offer(&self, frame: Frame) -> Result<bool, RecorderError> {
        match self.overflow {
            Overflow::Block => self
                .sender
                .send(frame)
                .map(|_| true)
                .map_err(|_| RecorderError::FrameQueueClosed),
            Overflow::DropNewest => match self.sender.try_send(frame) {
                Ok(()) => Ok(true),
                Err(TrySendError::Full(frame)) => {
                    debug!("Pipeline busy, dropping frame {}", frame.index);
                    Ok(false)
                }
                Err(TrySendError::Disconnected(_)) => Err(RecorderError::FrameQueueClosed),
            },
        }
    }
}

/// Creates a bounded frame queue holding at most `capacity` frames.
pub fn create_frame_queue(capacity: usize, overflow: Overflow) -> (FrameSender, Receiver<Frame>) {
    let (sender, receiver) = sync_channel(capacity.max(1));
    (FrameSender { sender, overflow }, receiver)
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CaptureStats {
    pub captured: u64,
    pub dropped: u64,
    pub failed: u64,
}

/// Pulls frames until the source runs dry, `stop` is set or the queue closes.
///
/// Blocks, so run it on a dedicated thread.
pub fn run_capture(
    mut source: impl FrameSource,
    sender: FrameSender,
    interval: Duration,
    stop: &AtomicBool,
) -> CaptureStats {
    let mut stats = CaptureStats::default();
    info!("Capture started ({} ms interval)", interval.as_millis());

    while !stop.load(Ordering::SeqCst) {
        let Some(next) = source.next_frame() else {
            info!("Frame source exhausted");
            break;
        };

        match next {
            Ok(image) => {
                stats.captured += 1;
                match sender.offer(Frame::new(image, stats.captured)) {
                    Ok(true) => {}
                    Ok(false) => stats.dropped += 1,
                    Err(_) => {
                        info!("Frame queue closed, stopping capture");
                        break;
                    }
                }
            }
            Err(e) => {
                stats.failed += 1;
                warn!("Skipping unreadable frame: {}", e);
            }
        }

        if !interval.is_zero() {
            thread::sleep(interval);
        }
    }

    info!(
        "Capture finished: {} captured, {} dropped, {} unreadable",
        stats.captured, stats.dropped, stats.failed
    );
    stats
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerStats {
    pub frames: u64,
    pub events: u64,
    pub errors: u64,
}

/// Runs the pipeline on every queued frame until the queue closes.
///
/// Events are handed to `on_event` in the order the cycle produced them.
/// A structural error abandons only the frame it happened on.
pub fn run_pipeline_worker(
    receiver: Receiver<Frame>,
    pipeline: &mut ScreenPipeline,
    mut on_event: impl FnMut(PipelineEvent),
) -> WorkerStats {
    let mut stats = WorkerStats::default();
    info!("Pipeline worker started");

    for frame in receiver {
        stats.frames += 1;
        match pipeline.process_frame(&frame.image) {
            Ok(events) => {
                for event in events {
                    debug!("Frame {}: {} confirmed", frame.index, event.kind());
                    stats.events += 1;
                    on_event(event);
                }
            }
            Err(e) => {
                stats.errors += 1;
                warn!("Frame {} abandoned: {}", frame.index, e);
            }
        }
    }

    info!(
        "Pipeline worker finished: {} frames, {} events, {} errors",
        stats.frames, stats.events, stats.errors
    );
    stats
}
