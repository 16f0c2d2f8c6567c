//! Per-frame orchestration of geometry, extraction and the three gates.

use image::RgbaImage;
use log::{debug, error, info, warn};
use std::path::Path;
use std::sync::Arc;

use super::events::{BallEvent, ClubEvent, CornersEvent, PipelineEvent};
use super::gate::{ConsistencyGate, GateOutcome};
use super::geometry::{Corners, ScreenGeometry};
use crate::config::{ConsistencyConfig, LayoutPaths, RecorderConfig};
use crate::error::RecorderError;
use crate::screen::{Channel, FieldExtractor, FieldLayout, FieldReading};

/// Tuning the pipeline takes from the recorder config.
#[derive(Clone, Debug, PartialEq)]
pub struct PipelineSettings {
    pub consistency: ConsistencyConfig,
    /// 0 keeps confirmed corners forever
    pub redetect_after_blank_cycles: u32,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self::from(&RecorderConfig::default())
    }
}

impl From<&RecorderConfig> for PipelineSettings {
    fn from(config: &RecorderConfig) -> Self {
        Self {
            consistency: config.consistency.clone(),
            redetect_after_blank_cycles: config.redetect_after_blank_cycles,
        }
    }
}

struct ChannelSlot {
    layout: Option<FieldLayout>,
    gate: ConsistencyGate,
    disabled_reason: Option<String>,
    /// Last reading published for this channel
    committed: Option<FieldReading>,
}

impl ChannelSlot {
    fn new(required: u32) -> Self {
        Self {
            layout: None,
            gate: ConsistencyGate::new(required),
            disabled_reason: Some("no layout loaded".to_string()),
            committed: None,
        }
    }

    /// Records a confirmed reading. False when it repeats the last one.
    ///
    /// A blank confirmation means the display cleared, so the next reading
    /// counts as new even if it matches the one before.
    fn commit(&mut self, reading: &FieldReading) -> bool {
        if reading.is_blank() {
            self.committed = None;
            return false;
        }
        if self.committed.as_ref() == Some(reading) {
            return false;
        }
        self.committed = Some(reading.clone());
        true
    }

    fn clear(&mut self) {
        self.gate.reset();
        self.committed = None;
    }

    /// Extracts and gates one reading. `None` when the channel is disabled.
    fn observe(
        &mut self,
        extractor: &mut FieldExtractor,
        image: &RgbaImage,
    ) -> Option<(bool, GateOutcome<FieldReading>)> {
        let layout = self.layout.as_ref()?;
        let reading = extractor.extract(image, layout);
        let blank = reading.is_blank();
        Some((blank, self.gate.observe(reading)))
    }
}

/// Turns a stream of frames into corner, ball and club confirmations.
///
/// Cycles must be run one at a time; the pipeline keeps the streak state
/// of every channel between calls.
pub struct ScreenPipeline {
    extractor: FieldExtractor,
    geometry: Box<dyn ScreenGeometry>,
    settings: PipelineSettings,
    ball: ChannelSlot,
    club: ChannelSlot,
    screen: ChannelSlot,
    corners: Option<Corners>,
    blank_cycles: u32,
}

impl ScreenPipeline {
    /// Creates a pipeline with every channel disabled until a layout is set.
    pub fn new(
        extractor: FieldExtractor,
        geometry: Box<dyn ScreenGeometry>,
        settings: PipelineSettings,
    ) -> Self {
        let consistency = &settings.consistency;
        Self {
            extractor,
            geometry,
            ball: ChannelSlot::new(consistency.required(Channel::Ball)),
            club: ChannelSlot::new(consistency.required(Channel::Club)),
            screen: ChannelSlot::new(consistency.required(Channel::Screen)),
            settings,
            corners: None,
            blank_cycles: 0,
        }
    }

    /// Loads every configured layout. Failures disable their channel.
    pub fn with_layouts(mut self, paths: &LayoutPaths) -> Self {
        for channel in Channel::ALL {
            if let Err(e) = self.reload_layout(channel, paths.path(channel)) {
                error!("{} channel disabled: {}", channel, e);
            }
        }
        self
    }

    /// Replaces the layout of the layout's channel and re-enables it.
    pub fn set_layout(&mut self, layout: FieldLayout) {
        let slot = self.slot_mut(layout.channel());
        slot.clear();
        slot.disabled_reason = None;
        slot.layout = Some(layout);
    }

    /// Reloads one channel's layout from disk.
    ///
    /// On failure the channel is disabled and the error returned.
    pub fn reload_layout(&mut self, channel: Channel, path: &Path) -> Result<(), RecorderError> {
        match FieldLayout::load(channel, path) {
            Ok(layout) => {
                info!(
                    "Loaded {} layout with {} regions from {}",
                    channel,
                    layout.regions().len(),
                    path.display()
                );
                self.set_layout(layout);
                Ok(())
            }
            Err(e) => {
                let slot = self.slot_mut(channel);
                slot.layout = None;
                slot.clear();
                slot.disabled_reason = Some(e.to_string());
                Err(e)
            }
        }
    }

    pub fn is_channel_enabled(&self, channel: Channel) -> bool {
        self.slot(channel).layout.is_some()
    }

    /// Why a channel is disabled, if it is.
    pub fn channel_error(&self, channel: Channel) -> Option<&str> {
        self.slot(channel).disabled_reason.as_deref()
    }

    /// Confirmed corners in use, if any.
    pub fn corners(&self) -> Option<&Corners> {
        self.corners.as_ref()
    }

    /// Decodes an encoded frame (PNG, JPEG, ...) and processes it.
    pub fn process_encoded(&mut self, bytes: &[u8]) -> Result<Vec<PipelineEvent>, RecorderError> {
        let frame = image::load_from_memory(bytes)
            .map_err(|e| RecorderError::ImageDecode { source: e })?
            .to_rgba8();
        self.process_frame(&frame)
    }

    /// Runs one cycle.
    ///
    /// Recognition failures never surface here; only a frame that cannot
    /// be rectified aborts the cycle.
    pub fn process_frame(&mut self, frame: &RgbaImage) -> Result<Vec<PipelineEvent>, RecorderError> {
        let mut events = Vec::new();

        let corners = match self.corners {
            Some(corners) => corners,
            None => match self.locate_screen(frame, &mut events)? {
                Some(corners) => corners,
                None => return Ok(events),
            },
        };

        let rectified = Arc::new(self.geometry.rectify(frame, &corners)?);

        let ball = self.ball.observe(&mut self.extractor, &rectified);
        let club = self.club.observe(&mut self.extractor, &rectified);

        let all_blank = [&ball, &club]
            .iter()
            .all(|observed| observed.as_ref().is_none_or(|(blank, _)| *blank));
        self.track_blank_cycles(all_blank);

        if let Some((_, GateOutcome::Confirmed(reading))) = ball {
            if reading.is_blank() {
                debug!("Blank ball reading confirmed, display cleared");
                self.ball.commit(&reading);
            } else if !self.ball.commit(&reading) {
                debug!("Ball data unchanged since the last shot");
            } else {
                info!("Ball data confirmed ({} fields)", reading.len());
                // a new shot takes club data even when it reads the same
                self.club.committed = None;
                events.push(PipelineEvent::Ball(BallEvent {
                    reading,
                    image: Arc::clone(&rectified),
                }));
            }
        }

        if let Some((_, GateOutcome::Confirmed(reading))) = club {
            if reading.is_blank() {
                debug!("Blank club reading confirmed, ignored");
                self.club.commit(&reading);
            } else if !self.club.commit(&reading) {
                debug!("Club data unchanged");
            } else {
                info!("Club data confirmed ({} fields)", reading.len());
                events.push(PipelineEvent::Club(ClubEvent {
                    reading,
                    image: Arc::clone(&rectified),
                }));
            }
        }

        Ok(events)
    }

    /// Detects the display and confirms which screen mode is showing.
    fn locate_screen(
        &mut self,
        frame: &RgbaImage,
        events: &mut Vec<PipelineEvent>,
    ) -> Result<Option<Corners>, RecorderError> {
        let Some(detected) = self.geometry.detect_screen_corners(frame) else {
            debug!("Screen not located in frame");
            return Ok(None);
        };

        let screen = if self.screen.layout.is_some() {
            let rectified = self.geometry.rectify(frame, &detected)?;
            match self.screen.observe(&mut self.extractor, &rectified) {
                Some((_, GateOutcome::Confirmed(reading))) if !reading.is_blank() => reading,
                _ => return Ok(None),
            }
        } else {
            FieldReading::new()
        };

        info!("Screen corners confirmed");
        self.corners = Some(detected);
        self.blank_cycles = 0;
        events.push(PipelineEvent::Corners(CornersEvent {
            corners: detected,
            screen,
        }));
        Ok(Some(detected))
    }

    fn track_blank_cycles(&mut self, all_blank: bool) {
        if !all_blank {
            self.blank_cycles = 0;
            return;
        }

        self.blank_cycles += 1;
        let limit = self.settings.redetect_after_blank_cycles;
        if limit > 0 && self.blank_cycles >= limit {
            warn!(
                "No ball or club text for {} cycles, re-detecting screen",
                self.blank_cycles
            );
            self.corners = None;
            self.blank_cycles = 0;
            self.ball.gate.reset();
            self.club.gate.reset();
            self.screen.gate.reset();
        }
    }

    fn slot(&self, channel: Channel) -> &ChannelSlot {
        match channel {
            Channel::Ball => &self.ball,
            Channel::Club => &self.club,
            Channel::Screen => &self.screen,
        }
    }

    fn slot_mut(&mut self, channel: Channel) -> &mut ChannelSlot {
        match channel {
            Channel::Ball => &mut self.ball,
            Channel::Club => &mut self.club,
            Channel::Screen => &mut self.screen,
        }
    }
}
