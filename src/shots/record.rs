//! Structured ball and club records parsed from confirmed readings.
//!
//! Readings carry whatever the launch monitor shows: numbers with an inline
//! `L`/`R`, separate direction and unit fields, metric units. Records hold
//! signed values in mph, yards, degrees and rpm. Left, out-to-in and
//! downward are negative.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::trajectory::TrajectoryPrediction;
use crate::screen::FieldReading;

/// Field names the layouts use.
pub mod fields {
    pub const SPEED: &str = "Speed";
    pub const VLA: &str = "VLA";
    pub const HLA: &str = "HLA";
    pub const TOTAL_SPIN: &str = "TotalSpin";
    pub const SPIN_AXIS: &str = "SpinAxis";
    pub const BACK_SPIN: &str = "BackSpin";
    pub const SIDE_SPIN: &str = "SideSpin";
    pub const CARRY_DISTANCE: &str = "CarryDistance";

    pub const HLA_DIRECTION: &str = "hla-direction";
    pub const SPIN_AXIS_DIRECTION: &str = "spin-axis-direction";
    pub const BALL_SPEED_UNITS: &str = "ball-speed-units";
    pub const CARRY_UNITS: &str = "carry-units";

    pub const PATH: &str = "Path";
    pub const ANGLE_OF_ATTACK: &str = "AngleOfAttack";
    pub const FACE_TO_TARGET: &str = "FaceToTarget";
    pub const LOFT: &str = "Loft";
    pub const SMASH_FACTOR: &str = "SmashFactor";

    pub const PATH_DIRECTION: &str = "path-direction";
    pub const AOA_DIRECTION: &str = "aoa-direction";
    pub const FACE_DIRECTION: &str = "face-direction";
    pub const CLUB_SPEED_UNITS: &str = "club-speed-units";
}

const KMH_TO_MPH: f64 = 0.621_371;
const MPS_TO_MPH: f64 = 2.236_936;
const METERS_TO_YARDS: f64 = 1.093_613;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

impl Side {
    fn from_word(word: &str) -> Option<Self> {
        match word.trim().to_ascii_uppercase().as_str() {
            "L" | "LEFT" => Some(Side::Left),
            "R" | "RIGHT" => Some(Side::Right),
            _ => None,
        }
    }

    fn apply(self, value: f64) -> f64 {
        match self {
            Side::Left => -value.abs(),
            Side::Right => value.abs(),
        }
    }
}

/// Splits an inline `L`/`R` marker off either end of a value.
fn split_side(text: &str) -> (&str, Option<Side>) {
    let text = text.trim();
    if let Some(side) = text.get(..1).and_then(Side::from_word) {
        return (text[1..].trim(), Some(side));
    }
    if let Some(side) = text
        .len()
        .checked_sub(1)
        .and_then(|i| text.get(i..))
        .and_then(Side::from_word)
    {
        return (text[..text.len() - 1].trim(), Some(side));
    }
    (text, None)
}

fn number(reading: &FieldReading, name: &str) -> Option<f64> {
    reading.get(name)?.trim().parse().ok()
}

/// Value with its direction applied. A separate direction field wins over
/// an inline marker.
fn directional(reading: &FieldReading, name: &str, direction_field: &str) -> Option<f64> {
    let (digits, inline) = split_side(reading.get(name)?);
    let value: f64 = digits.parse().ok()?;
    let side = reading
        .get(direction_field)
        .and_then(Side::from_word)
        .or(inline);
    Some(side.map_or(value, |s| s.apply(value)))
}

/// Value signed by a two-word direction field, e.g. `UP`/`DOWN`.
fn signed_by(
    reading: &FieldReading,
    name: &str,
    direction_field: &str,
    positive: &str,
    negative: &str,
) -> Option<f64> {
    let value = number(reading, name)?;
    let direction = reading
        .get(direction_field)
        .map(|d| d.trim().to_ascii_uppercase());
    Some(match direction.as_deref() {
        Some(d) if d == positive => value.abs(),
        Some(d) if d == negative => -value.abs(),
        _ => value,
    })
}

fn speed_to_mph(value: f64, units: Option<&str>) -> f64 {
    let units = units.map(|u| u.trim().to_ascii_uppercase().replace(['/', ' '], ""));
    match units.as_deref() {
        Some("KMH" | "KPH") => value * KMH_TO_MPH,
        Some("MPS" | "MS") => value * MPS_TO_MPH,
        _ => value,
    }
}

fn distance_to_yards(value: f64, units: Option<&str>) -> f64 {
    let units = units.map(|u| u.trim().to_ascii_uppercase());
    match units.as_deref() {
        Some("M" | "METERS" | "METRES") => value * METERS_TO_YARDS,
        _ => value,
    }
}

/// Numeric fields of `reading` that no record knows about.
fn unknown_numbers(reading: &FieldReading, known: &[&str]) -> BTreeMap<String, f64> {
    reading
        .iter()
        .filter(|(name, _)| !known.contains(name))
        .filter_map(|(name, text)| Some((name.to_string(), text.trim().parse().ok()?)))
        .collect()
}

/// Ball flight launch data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct BallData {
    /// mph
    pub speed: Option<f64>,
    pub vla: Option<f64>,
    pub hla: Option<f64>,
    pub total_spin: Option<f64>,
    pub spin_axis: Option<f64>,
    pub back_spin: Option<f64>,
    pub side_spin: Option<f64>,
    /// yards
    pub carry_distance: Option<f64>,
    pub roll_distance: Option<f64>,
    pub lateral_spin: Option<f64>,
    pub height: Option<f64>,
}

impl BallData {
    const KNOWN_FIELDS: [&'static str; 12] = [
        fields::SPEED,
        fields::VLA,
        fields::HLA,
        fields::TOTAL_SPIN,
        fields::SPIN_AXIS,
        fields::BACK_SPIN,
        fields::SIDE_SPIN,
        fields::CARRY_DISTANCE,
        fields::HLA_DIRECTION,
        fields::SPIN_AXIS_DIRECTION,
        fields::BALL_SPEED_UNITS,
        fields::CARRY_UNITS,
    ];

    /// Parses a confirmed ball reading. Unreadable fields stay `None`.
    pub fn from_reading(reading: &FieldReading) -> Self {
        let speed_units = reading.get(fields::BALL_SPEED_UNITS);
        let carry_units = reading.get(fields::CARRY_UNITS);

        Self {
            speed: number(reading, fields::SPEED).map(|v| speed_to_mph(v, speed_units)),
            vla: number(reading, fields::VLA),
            hla: directional(reading, fields::HLA, fields::HLA_DIRECTION),
            total_spin: number(reading, fields::TOTAL_SPIN),
            spin_axis: directional(reading, fields::SPIN_AXIS, fields::SPIN_AXIS_DIRECTION),
            back_spin: number(reading, fields::BACK_SPIN),
            side_spin: directional(reading, fields::SIDE_SPIN, fields::SPIN_AXIS_DIRECTION),
            carry_distance: number(reading, fields::CARRY_DISTANCE)
                .map(|v| distance_to_yards(v, carry_units)),
            ..Self::default()
        }
        .with_spin_components()
    }

    /// Derives back and side spin from total spin and spin axis when the
    /// screen does not show them.
    pub fn with_spin_components(mut self) -> Self {
        if let (Some(total), Some(axis)) = (self.total_spin, self.spin_axis) {
            let radians = axis.to_radians();
            self.back_spin.get_or_insert((total * radians.cos()).round());
            self.side_spin.get_or_insert((total * radians.sin()).round());
        }
        self
    }

    /// Adds the regression outputs to the record.
    pub fn apply_prediction(&mut self, prediction: &TrajectoryPrediction) {
        self.roll_distance = Some(prediction.roll_distance);
        self.lateral_spin = Some(prediction.lateral_spin);
        self.height = Some(prediction.height);
    }

    /// True when no launch value could be read.
    pub fn is_empty(&self) -> bool {
        self.speed.is_none()
            && self.vla.is_none()
            && self.hla.is_none()
            && self.total_spin.is_none()
            && self.spin_axis.is_none()
            && self.carry_distance.is_none()
    }

    /// Numeric fields of a ball reading outside this record's schema.
    pub fn unknown_fields(reading: &FieldReading) -> BTreeMap<String, f64> {
        unknown_numbers(reading, &Self::KNOWN_FIELDS)
    }
}

/// Club delivery data.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ClubData {
    /// mph
    pub speed: Option<f64>,
    /// Positive is in-to-out
    pub path: Option<f64>,
    /// Positive is upward
    pub angle_of_attack: Option<f64>,
    pub face_to_target: Option<f64>,
    pub loft: Option<f64>,
    pub smash_factor: Option<f64>,
}

impl ClubData {
    const KNOWN_FIELDS: [&'static str; 10] = [
        fields::SPEED,
        fields::PATH,
        fields::ANGLE_OF_ATTACK,
        fields::FACE_TO_TARGET,
        fields::LOFT,
        fields::SMASH_FACTOR,
        fields::PATH_DIRECTION,
        fields::AOA_DIRECTION,
        fields::FACE_DIRECTION,
        fields::CLUB_SPEED_UNITS,
    ];

    pub fn from_reading(reading: &FieldReading) -> Self {
        let speed_units = reading.get(fields::CLUB_SPEED_UNITS);
        Self {
            speed: number(reading, fields::SPEED).map(|v| speed_to_mph(v, speed_units)),
            path: signed_by(reading, fields::PATH, fields::PATH_DIRECTION, "IN-OUT", "OUT-IN"),
            angle_of_attack: signed_by(
                reading,
                fields::ANGLE_OF_ATTACK,
                fields::AOA_DIRECTION,
                "UP",
                "DOWN",
            ),
            face_to_target: directional(reading, fields::FACE_TO_TARGET, fields::FACE_DIRECTION),
            loft: number(reading, fields::LOFT),
            smash_factor: number(reading, fields::SMASH_FACTOR),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.speed.is_none()
            && self.path.is_none()
            && self.angle_of_attack.is_none()
            && self.face_to_target.is_none()
            && self.loft.is_none()
    }

    pub fn unknown_fields(reading: &FieldReading) -> BTreeMap<String, f64> {
        unknown_numbers(reading, &Self::KNOWN_FIELDS)
    }
}
