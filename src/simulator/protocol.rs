//! Open Connect v1 messages.
//!
//! Every message is one JSON object followed by a newline. Fields the
//! recorder has no value for are left out rather than sent as null.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::RecorderError;
use crate::shots::{BallData, ClubData, Shot};

pub const API_VERSION: &str = "1";
pub const UNITS: &str = "Yards";

/// Shot handed to the link for delivery.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct OutboundShot {
    pub shot_number: u32,
    pub ball: Option<BallData>,
    pub club: Option<ClubData>,
    /// Numeric ball fields outside the record schema, sent as-is
    pub ball_extra: BTreeMap<String, f64>,
    pub club_extra: BTreeMap<String, f64>,
}

impl OutboundShot {
    /// Ball data of a freshly confirmed shot.
    pub fn ball_only(shot: &Shot) -> Self {
        Self {
            shot_number: shot.number,
            ball: Some(shot.ball.clone()),
            club: None,
            ball_extra: BallData::unknown_fields(&shot.ball_reading),
            club_extra: BTreeMap::new(),
        }
    }

    /// Club data confirmed after the shot's ball data went out.
    ///
    /// Sent under the shot's own number without ball data, so the simulator
    /// updates the club metrics instead of launching another ball.
    pub fn club_only(shot: &Shot) -> Self {
        Self {
            shot_number: shot.number,
            ball: None,
            club: shot.club.clone(),
            ball_extra: BTreeMap::new(),
            club_extra: shot
                .club_reading
                .as_ref()
                .map(ClubData::unknown_fields)
                .unwrap_or_default(),
        }
    }

    fn has_ball(&self) -> bool {
        self.ball.as_ref().is_some_and(|b| !b.is_empty()) || !self.ball_extra.is_empty()
    }

    fn has_club(&self) -> bool {
        self.club.as_ref().is_some_and(|c| !c.is_empty()) || !self.club_extra.is_empty()
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireMessage<'a> {
    #[serde(rename = "DeviceID")]
    device_id: &'a str,
    units: &'static str,
    shot_number: u32,
    #[serde(rename = "APIversion")]
    api_version: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    ball_data: Option<WireBallData<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    club_data: Option<WireClubData<'a>>,
    shot_data_options: ShotDataOptions,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireBallData<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    spin_axis: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    total_spin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    back_spin: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    side_spin: Option<f64>,
    #[serde(rename = "HLA", skip_serializing_if = "Option::is_none")]
    hla: Option<f64>,
    #[serde(rename = "VLA", skip_serializing_if = "Option::is_none")]
    vla: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    carry_distance: Option<f64>,
    #[serde(flatten)]
    extra: &'a BTreeMap<String, f64>,
}

impl<'a> WireBallData<'a> {
    fn new(ball: Option<&BallData>, extra: &'a BTreeMap<String, f64>) -> Self {
        let ball = ball.cloned().unwrap_or_default();
        Self {
            speed: ball.speed,
            spin_axis: ball.spin_axis,
            total_spin: ball.total_spin,
            back_spin: ball.back_spin,
            side_spin: ball.side_spin,
            hla: ball.hla,
            vla: ball.vla,
            carry_distance: ball.carry_distance,
            extra,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct WireClubData<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    speed: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    angle_of_attack: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    face_to_target: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    loft: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    path: Option<f64>,
    #[serde(flatten)]
    extra: &'a BTreeMap<String, f64>,
}

impl<'a> WireClubData<'a> {
    fn new(club: Option<&ClubData>, extra: &'a BTreeMap<String, f64>) -> Self {
        let club = club.cloned().unwrap_or_default();
        Self {
            speed: club.speed,
            angle_of_attack: club.angle_of_attack,
            face_to_target: club.face_to_target,
            loft: club.loft,
            path: club.path,
            extra,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "PascalCase")]
struct ShotDataOptions {
    contains_ball_data: bool,
    contains_club_data: bool,
    launch_monitor_is_ready: bool,
    launch_monitor_ball_detected: bool,
    is_heart_beat: bool,
}

fn to_line(message: &WireMessage<'_>) -> Result<String, RecorderError> {
    let mut line =
        serde_json::to_string(message).map_err(|e| RecorderError::MessageEncode { source: e })?;
    line.push('\n');
    Ok(line)
}

/// Encodes a shot. A shot with neither ball nor club values is refused.
pub fn encode_shot(device_id: &str, shot: &OutboundShot) -> Result<String, RecorderError> {
    let (has_ball, has_club) = (shot.has_ball(), shot.has_club());
    if !has_ball && !has_club {
        return Err(RecorderError::EmptyShot {
            shot_number: shot.shot_number,
        });
    }

    to_line(&WireMessage {
        device_id,
        units: UNITS,
        shot_number: shot.shot_number,
        api_version: API_VERSION,
        ball_data: has_ball.then(|| WireBallData::new(shot.ball.as_ref(), &shot.ball_extra)),
        club_data: has_club.then(|| WireClubData::new(shot.club.as_ref(), &shot.club_extra)),
        shot_data_options: ShotDataOptions {
            contains_ball_data: has_ball,
            contains_club_data: has_club,
            launch_monitor_is_ready: true,
            launch_monitor_ball_detected: true,
            is_heart_beat: false,
        },
    })
}

/// Keep-alive announcing a ready launch monitor, sent after connecting.
pub fn encode_heartbeat(device_id: &str) -> Result<String, RecorderError> {
    to_line(&WireMessage {
        device_id,
        units: UNITS,
        shot_number: 0,
        api_version: API_VERSION,
        ball_data: None,
        club_data: None,
        shot_data_options: ShotDataOptions {
            contains_ball_data: false,
            contains_club_data: false,
            launch_monitor_is_ready: true,
            launch_monitor_ball_detected: false,
            is_heart_beat: true,
        },
    })
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct PlayerInfo {
    pub handed: String,
    pub club: String,
}

/// Reply the simulator sends after a message.
#[derive(Clone, Debug, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "PascalCase", default)]
pub struct SimulatorResponse {
    pub code: u16,
    pub message: String,
    pub player: Option<PlayerInfo>,
}

impl SimulatorResponse {
    pub fn is_error(&self) -> bool {
        self.code >= 400
    }
}
