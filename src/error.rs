// Error types for the recorder

use snafu::Snafu;
use std::io;

#[derive(Debug, Snafu)]
pub enum RecorderError {
    // Layout and config loading. A failed layout disables its channel.
    #[snafu(display("Could not read layout file {path}"))]
    LayoutRead { path: String, source: io::Error },
    #[snafu(display("Could not parse {channel} layout"))]
    LayoutParse {
        channel: String,
        source: serde_json::Error,
    },
    #[snafu(display("Invalid {channel} layout: {reason}"))]
    LayoutInvalid { channel: String, reason: String },
    #[snafu(display("Could not read config file {path}"))]
    ConfigRead { path: String, source: io::Error },
    #[snafu(display("Could not parse config file {path}"))]
    ConfigParse {
        path: String,
        source: serde_json::Error,
    },
    #[snafu(display("Error writing config file {path}"))]
    ConfigWrite { path: String, source: io::Error },
    #[snafu(display("Error serializing config"))]
    ConfigSerialize { source: serde_json::Error },

    // Structural frame errors, surfaced once per cycle
    #[snafu(display("Could not decode frame"))]
    ImageDecode { source: image::ImageError },
    #[snafu(display("Could not rectify frame: {reason}"))]
    Rectify { reason: String },
    #[snafu(display("Could not read frames from {path}"))]
    FrameRead { path: String, source: io::Error },
    #[snafu(display("Frame queue is closed"))]
    FrameQueueClosed,

    // Simulator connection
    #[snafu(display("Simulator link is not connected"))]
    NotConnected,
    #[snafu(display("Could not connect to simulator at {address}: {description}"))]
    ConnectFailed { address: String, description: String },
    #[snafu(display("Simulator connection I/O error"))]
    ConnectionIo { source: io::Error },
    #[snafu(display("Shot {shot_number} has no usable fields to send"))]
    EmptyShot { shot_number: u32 },
    #[snafu(display("Could not encode simulator message"))]
    MessageEncode { source: serde_json::Error },
    #[snafu(display("Shot delivery queue is closed"))]
    DeliveryQueueClosed,

    // Mini-game
    #[snafu(display("Invalid mini-game settings: {reason}"))]
    InvalidMiniGameConfig { reason: String },
    #[snafu(display("Mini-game already finished after {total_shots} shots"))]
    MiniGameFinished { total_shots: u32 },
    #[snafu(display("Shot cannot be scored: {reason}"))]
    UnscorableShot { reason: String },

    // Shot export
    #[snafu(display("Error writing shot export"))]
    ExportWrite { source: io::Error },
    #[snafu(display("Error reading shot export"))]
    ExportRead { source: io::Error },
    #[snafu(display("Malformed shot export at line {line}: {reason}"))]
    ExportParse { line: usize, reason: String },
}

impl RecorderError {
    /// Configuration errors disable a channel instead of stopping capture.
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            RecorderError::LayoutRead { .. }
                | RecorderError::LayoutParse { .. }
                | RecorderError::LayoutInvalid { .. }
                | RecorderError::ConfigRead { .. }
                | RecorderError::ConfigParse { .. }
        )
    }

    pub fn is_connection(&self) -> bool {
        matches!(
            self,
            RecorderError::NotConnected
                | RecorderError::ConnectFailed { .. }
                | RecorderError::ConnectionIo { .. }
        )
    }
}
