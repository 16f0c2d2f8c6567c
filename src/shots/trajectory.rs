use serde::{Deserialize, Serialize};

use super::record::BallData;

/// Ball flight values the launch monitor screen does not show.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct TrajectoryPrediction {
    /// yards
    pub roll_distance: f64,
    /// rpm
    pub lateral_spin: f64,
    /// Apex, yards
    pub height: f64,
}

/// Regression from launch data to the rest of the flight.
///
/// Applied once per confirmed shot. Its output is added to the shot and
/// never fed back into confirmation.
pub trait TrajectoryModel: Send {
    /// Runs the regression on speed, VLA, carry, spin axis and total spin,
    /// in that order.
    fn evaluate(&self, inputs: [f64; 5]) -> TrajectoryPrediction;

    /// `None` when a shot lacks any of the model's inputs.
    fn predict(&self, ball: &BallData) -> Option<TrajectoryPrediction> {
        model_inputs(ball).map(|inputs| self.evaluate(inputs))
    }
}

fn model_inputs(ball: &BallData) -> Option<[f64; 5]> {
    Some([
        ball.speed?,
        ball.vla?,
        ball.carry_distance?,
        ball.spin_axis?,
        ball.total_spin?,
    ])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_model_inputs_require_all_fields() {
        let mut ball = BallData {
            speed: Some(150.0),
            vla: Some(11.0),
            carry_distance: Some(260.0),
            spin_axis: Some(-2.0),
            total_spin: Some(2600.0),
            ..BallData::default()
        };
        assert_eq!(model_inputs(&ball), Some([150.0, 11.0, 260.0, -2.0, 2600.0]));

        ball.vla = None;
        assert_eq!(model_inputs(&ball), None);
    }

    /// Roll a tenth of carry, apex from launch angle.
    struct Linear;

    impl TrajectoryModel for Linear {
        fn evaluate(&self, [_speed, vla, carry, axis, spin]: [f64; 5]) -> TrajectoryPrediction {
            TrajectoryPrediction {
                roll_distance: carry / 10.0,
                lateral_spin: spin * axis.to_radians().sin(),
                height: vla * 2.0,
            }
        }
    }

    #[test]
    fn test_predict_needs_every_input() {
        let mut ball = BallData {
            speed: Some(150.0),
            vla: Some(11.0),
            carry_distance: Some(260.0),
            spin_axis: Some(0.0),
            total_spin: Some(2600.0),
            ..BallData::default()
        };
        let prediction = Linear.predict(&ball).unwrap();
        assert_eq!(prediction.roll_distance, 26.0);
        assert_eq!(prediction.lateral_spin, 0.0);
        assert_eq!(prediction.height, 22.0);

        ball.total_spin = None;
        assert!(Linear.predict(&ball).is_none());
    }
}
