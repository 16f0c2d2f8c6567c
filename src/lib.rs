//! BLM Recorder
//!
//! Reads shot data off a launch monitor's display, debounces it into
//! confirmed shots, scores an optional target mini-game and forwards each
//! shot to a golf simulator over its open connect API.

pub mod config;
pub mod error;
pub mod logging;
pub mod minigame;
pub mod paths;
pub mod pipeline;
pub mod screen;
pub mod session;
pub mod shots;
pub mod simulator;

pub use config::RecorderConfig;
pub use error::RecorderError;
pub use session::{EventHub, Session};
