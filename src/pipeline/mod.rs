//! From frames to confirmed readings.
//!
//! - `gate`: the consistency debounce
//! - `geometry`: screen location seam
//! - `screen`: the per-frame pipeline
//! - `events`: typed notification buses
//! - `worker`: frame queue, capture loop and pipeline loop

pub mod events;
pub mod gate;
pub mod geometry;
pub mod screen;
pub mod worker;

pub use events::{BallEvent, ClubEvent, CornersEvent, EventBus, FrameHandle, PipelineEvent};
pub use gate::{ConsistencyGate, GateOutcome};
pub use geometry::{BoundingBoxGeometry, Corners, Point, ScreenGeometry};
pub use screen::{PipelineSettings, ScreenPipeline};
pub use worker::{
    create_frame_queue, run_capture, run_pipeline_worker, DirectoryFrameSource, Frame,
    FrameSender, FrameSource, Overflow,
};
