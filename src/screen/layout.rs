//! Field layouts: named screen regions in relative coordinates.
//!
//! Layout files use the annotator format, either a bare array of regions or
//! an object keyed by channel type:
//!
//! ```json
//! { "ball": [ { "name": "Speed", "rect": [0.05, 0.20, 0.20, 0.10] } ] }
//! ```

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::fs;
use std::path::Path;

use crate::error::RecorderError;

/// One of the three independent extraction channels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Channel {
    Ball,
    Club,
    Screen,
}

impl Channel {
    pub const ALL: [Channel; 3] = [Channel::Ball, Channel::Club, Channel::Screen];

    /// Config type name used as the key in layout files.
    pub fn as_str(&self) -> &'static str {
        match self {
            Channel::Ball => "ball",
            Channel::Club => "club",
            Channel::Screen => "screen",
        }
    }
}

impl fmt::Display for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A rectangle in relative coordinates (0.0 to 1.0).
/// Serialized as `[x, y, width, height]`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f32; 4]", into = "[f32; 4]")]
pub struct RelativeRect {
    /// X position of top-left corner (0.0 = left edge, 1.0 = right edge)
    pub x: f32,
    /// Y position of top-left corner (0.0 = top edge, 1.0 = bottom edge)
    pub y: f32,
    /// Width as fraction of frame width
    pub width: f32,
    /// Height as fraction of frame height
    pub height: f32,
}

impl From<[f32; 4]> for RelativeRect {
    fn from([x, y, width, height]: [f32; 4]) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }
}

impl From<RelativeRect> for [f32; 4] {
    fn from(rect: RelativeRect) -> Self {
        [rect.x, rect.y, rect.width, rect.height]
    }
}

impl RelativeRect {
    fn is_normalized(&self) -> bool {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        in_unit(self.x)
            && in_unit(self.y)
            && self.width > 0.0
            && self.height > 0.0
            && self.x + self.width <= 1.0 + f32::EPSILON
            && self.y + self.height <= 1.0 + f32::EPSILON
    }
}

/// A named region to read from the screen.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldRegion {
    pub name: String,
    #[serde(rename = "rect")]
    pub normalized_rect: RelativeRect,
    /// Vocabulary hint; text outside it counts as a failed read.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub allowed_words: Option<Vec<String>>,
    /// Apply the suffix cleanup heuristic to recognized text.
    #[serde(default)]
    pub text_hack: bool,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum LayoutFile {
    Regions(Vec<FieldRegion>),
    ByChannel(BTreeMap<String, Vec<FieldRegion>>),
}

/// Ordered, immutable set of regions for one channel.
#[derive(Clone, Debug, PartialEq)]
pub struct FieldLayout {
    channel: Channel,
    regions: Vec<FieldRegion>,
}

impl FieldLayout {
    /// Builds a layout, rejecting duplicate names and out-of-range rects.
    pub fn new(channel: Channel, regions: Vec<FieldRegion>) -> Result<Self, RecorderError> {
        if regions.is_empty() {
            return Err(RecorderError::LayoutInvalid {
                channel: channel.to_string(),
                reason: "layout has no regions".to_string(),
            });
        }

        let mut seen = HashSet::new();
        for region in &regions {
            if region.name.trim().is_empty() {
                return Err(RecorderError::LayoutInvalid {
                    channel: channel.to_string(),
                    reason: "region with empty name".to_string(),
                });
            }
            if !seen.insert(region.name.as_str()) {
                return Err(RecorderError::LayoutInvalid {
                    channel: channel.to_string(),
                    reason: format!("duplicate region name '{}'", region.name),
                });
            }
            if !region.normalized_rect.is_normalized() {
                return Err(RecorderError::LayoutInvalid {
                    channel: channel.to_string(),
                    reason: format!(
                        "region '{}' has rect {:?} outside the unit square",
                        region.name,
                        <[f32; 4]>::from(region.normalized_rect)
                    ),
                });
            }
        }

        Ok(Self { channel, regions })
    }

    /// Parses a layout for `channel` from JSON text.
    ///
    /// Keyed files must contain an entry for the channel's type name.
    pub fn from_json_str(channel: Channel, json: &str) -> Result<Self, RecorderError> {
        let parsed: LayoutFile =
            serde_json::from_str(json).map_err(|e| RecorderError::LayoutParse {
                channel: channel.to_string(),
                source: e,
            })?;

        let regions = match parsed {
            LayoutFile::Regions(regions) => regions,
            LayoutFile::ByChannel(mut by_channel) => {
                by_channel.remove(channel.as_str()).ok_or_else(|| {
                    RecorderError::LayoutInvalid {
                        channel: channel.to_string(),
                        reason: format!("no '{}' entry in layout file", channel.as_str()),
                    }
                })?
            }
        };

        Self::new(channel, regions)
    }

    /// Loads a layout for `channel` from a JSON file.
    pub fn load(channel: Channel, path: &Path) -> Result<Self, RecorderError> {
        let contents = fs::read_to_string(path).map_err(|e| RecorderError::LayoutRead {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_json_str(channel, &contents)
    }

    pub fn channel(&self) -> Channel {
        self.channel
    }

    pub fn regions(&self) -> &[FieldRegion] {
        &self.regions
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.regions.iter().map(|r| r.name.as_str())
    }
}
