//! Recorder configuration.
//!
//! Loaded from config.json at startup. Provides the simulator address,
//! layout locations, consistency streak lengths, OCR settings and capture
//! cadence. Every field has a default so partial files are accepted.

use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::error::RecorderError;
use crate::minigame::MiniGameConfig;
use crate::paths::{get_exe_dir, get_layouts_dir};
use crate::screen::Channel;

const CONFIG_FILE_NAME: &str = "config.json";

/// Port the simulator's open connect API listens on.
pub const DEFAULT_SIMULATOR_PORT: u16 = 921;

/// Where shots are delivered.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulatorConfig {
    pub ip: String,
    pub port: u16,
    /// Sent as `DeviceID` in every message
    pub device_id: String,
    /// Upper bound on the connect + handshake phase
    pub handshake_timeout_ms: u64,
    pub write_timeout_ms: u64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            ip: "127.0.0.1".to_string(),
            port: DEFAULT_SIMULATOR_PORT,
            device_id: "BLM Recorder".to_string(),
            handshake_timeout_ms: 5000,
            write_timeout_ms: 2000,
        }
    }
}

/// Layout file per channel.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LayoutPaths {
    pub ball: PathBuf,
    pub club: PathBuf,
    pub screen: PathBuf,
}

impl Default for LayoutPaths {
    fn default() -> Self {
        let dir = get_layouts_dir();
        Self {
            ball: dir.join("ball.json"),
            club: dir.join("club.json"),
            screen: dir.join("screen.json"),
        }
    }
}

impl LayoutPaths {
    pub fn path(&self, channel: Channel) -> &Path {
        match channel {
            Channel::Ball => &self.ball,
            Channel::Club => &self.club,
            Channel::Screen => &self.screen,
        }
    }
}

/// Identical consecutive reads required before a channel confirms.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConsistencyConfig {
    /// Ball data drives scoring and delivery, so it waits longest
    pub ball: u32,
    pub club: u32,
    pub screen: u32,
}

impl Default for ConsistencyConfig {
    fn default() -> Self {
        Self {
            ball: 3,
            club: 2,
            screen: 2,
        }
    }
}

impl ConsistencyConfig {
    pub fn required(&self, channel: Channel) -> u32 {
        match channel {
            Channel::Ball => self.ball,
            Channel::Club => self.club,
            Channel::Screen => self.screen,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OcrConfig {
    /// Bright-pixel threshold; `None` feeds plain grayscale crops
    pub threshold: Option<u8>,
    pub tesseract_path: Option<PathBuf>,
    pub tessdata_dir: Option<PathBuf>,
    pub page_segmentation_mode: u8,
    pub min_confidence: f32,
}

impl Default for OcrConfig {
    fn default() -> Self {
        Self {
            // Video frames are softer than screenshots
            threshold: Some(160),
            tesseract_path: None,
            tessdata_dir: None,
            page_segmentation_mode: 7,
            min_confidence: 40.0,
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DiagnosticsConfig {
    /// Keep the last crops in memory
    pub retain_crops: bool,
    /// Also write every crop as PNG
    pub save_crops: bool,
    pub dir: Option<PathBuf>,
}

/// Complete recorder configuration.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub simulator: SimulatorConfig,
    pub layouts: LayoutPaths,
    pub consistency: ConsistencyConfig,
    pub ocr: OcrConfig,
    /// Time between OCR passes on the frame stream (milliseconds)
    pub frame_interval_ms: u64,
    /// Cycles with every ball and club field blank before corners are re-detected
    pub redetect_after_blank_cycles: u32,
    pub diagnostics: DiagnosticsConfig,
    /// Mini-game started with each session, if any
    pub minigame: Option<MiniGameConfig>,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            simulator: SimulatorConfig::default(),
            layouts: LayoutPaths::default(),
            consistency: ConsistencyConfig::default(),
            ocr: OcrConfig::default(),
            frame_interval_ms: 100,
            redetect_after_blank_cycles: 50,
            diagnostics: DiagnosticsConfig::default(),
            minigame: None,
        }
    }
}

impl RecorderConfig {
    /// Loads configuration from an explicit path.
    pub fn load(path: &Path) -> Result<Self, RecorderError> {
        let contents = fs::read_to_string(path).map_err(|e| RecorderError::ConfigRead {
            path: path.display().to_string(),
            source: e,
        })?;
        serde_json::from_str(&contents).map_err(|e| RecorderError::ConfigParse {
            path: path.display().to_string(),
            source: e,
        })
    }

    /// Loads config.json next to the executable or returns defaults.
    pub fn load_or_default() -> Self {
        let config_path = get_exe_dir().join(CONFIG_FILE_NAME);
        info!("Looking for config at: {}", config_path.display());

        if !config_path.exists() {
            info!("config.json not found. Using default config.");
            return Self::default();
        }

        match Self::load(&config_path) {
            Ok(config) => {
                info!("Config loaded from config.json");
                config
            }
            Err(e) => {
                warn!("{}: {:?}. Using defaults.", e, e);
                Self::default()
            }
        }
    }

    /// Writes the configuration as pretty JSON.
    pub fn save(&self, path: &Path) -> Result<(), RecorderError> {
        let json = serde_json::to_string_pretty(self)
            .map_err(|e| RecorderError::ConfigSerialize { source: e })?;
        fs::write(path, json).map_err(|e| RecorderError::ConfigWrite {
            path: path.display().to_string(),
            source: e,
        })
    }
}
