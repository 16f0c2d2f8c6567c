//! Debounce for noisy per-frame readings.
//!
//! A reading is confirmed once the same value has been observed
//! `required` times in a row. Confirming clears the gate, so the same
//! on-screen value needs a fresh streak before it is reported again.

use crate::screen::FieldReading;

#[derive(Clone, Debug, PartialEq)]
pub enum GateOutcome<T> {
    Confirmed(T),
    Pending,
}

impl<T> GateOutcome<T> {
    pub fn confirmed(self) -> Option<T> {
        match self {
            GateOutcome::Confirmed(value) => Some(value),
            GateOutcome::Pending => None,
        }
    }
}

/// Exact-match streak counter for one channel.
#[derive(Clone, Debug)]
pub struct ConsistencyGate<T = FieldReading> {
    last: Option<T>,
    streak: u32,
    required: u32,
}

impl<T: Clone + PartialEq> ConsistencyGate<T> {
    /// A `required` of 0 behaves like 1.
    pub fn new(required: u32) -> Self {
        Self {
            last: None,
            streak: 0,
            required: required.max(1),
        }
    }

    pub fn observe(&mut self, reading: T) -> GateOutcome<T> {
        if self.last.as_ref() == Some(&reading) {
            self.streak += 1;
        } else {
            self.last = Some(reading);
            self.streak = 1;
        }

        if self.streak >= self.required {
            self.streak = 0;
            if let Some(confirmed) = self.last.take() {
                return GateOutcome::Confirmed(confirmed);
            }
        }
        GateOutcome::Pending
    }

    /// Forgets the current streak.
    pub fn reset(&mut self) {
        self.last = None;
        self.streak = 0;
    }

    pub fn streak(&self) -> u32 {
        self.streak
    }

    pub fn required(&self) -> u32 {
        self.required
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn speed(value: &str) -> FieldReading {
        [("Speed", value)].into_iter().collect()
    }

    #[test]
    fn test_confirms_after_streak_change() {
        let mut gate = ConsistencyGate::new(3);
        let feed = ["120", "120", "121", "121", "121"];

        let outcomes: Vec<_> = feed.iter().map(|v| gate.observe(speed(v))).collect();

        assert!(outcomes[..4].iter().all(|o| *o == GateOutcome::Pending));
        assert_eq!(outcomes[4], GateOutcome::Confirmed(speed("121")));
    }

    #[test]
    fn test_confirmation_resets_streak() {
        let mut gate = ConsistencyGate::new(3);
        let confirmations = (0..6)
            .filter_map(|_| gate.observe(speed("150")).confirmed())
            .count();

        assert_eq!(confirmations, 2);
        assert_eq!(gate.streak(), 0);
    }

    #[test]
    fn test_interruption_restarts_count() {
        let mut gate = ConsistencyGate::new(2);
        assert_eq!(gate.observe(speed("1")), GateOutcome::Pending);
        assert_eq!(gate.observe(speed("2")), GateOutcome::Pending);
        assert_eq!(gate.streak(), 1);
        assert_eq!(gate.observe(speed("2")), GateOutcome::Confirmed(speed("2")));
    }

    #[test]
    fn test_blank_reading_can_confirm() {
        let mut gate = ConsistencyGate::new(2);
        gate.observe(speed(""));
        let confirmed = gate.observe(speed("")).confirmed().unwrap();
        assert!(confirmed.is_blank());
    }

    #[test]
    fn test_reset_clears_progress() {
        let mut gate = ConsistencyGate::new(2);
        gate.observe(speed("1"));
        gate.reset();
        assert_eq!(gate.observe(speed("1")), GateOutcome::Pending);
    }

    #[test]
    fn test_zero_requirement_acts_as_one() {
        let mut gate = ConsistencyGate::new(0);
        assert_eq!(gate.required(), 1);
        assert_eq!(gate.observe(speed("1")), GateOutcome::Confirmed(speed("1")));
    }

    proptest! {
        #[test]
        fn identical_runs_confirm_once_per_required(required in 1u32..8, len in 0usize..40) {
            let mut gate = ConsistencyGate::new(required);
            let mut confirmed_at = Vec::new();
            for i in 0..len {
                if gate.observe(speed("99")).confirmed().is_some() {
                    confirmed_at.push(i + 1);
                }
            }

            let expected: Vec<usize> = (1..=len)
                .filter(|n| n % required as usize == 0)
                .collect();
            prop_assert_eq!(confirmed_at, expected);
        }

        #[test]
        fn alternating_readings_never_confirm(required in 2u32..8, len in 0usize..40) {
            let mut gate = ConsistencyGate::new(required);
            for i in 0..len {
                let value = if i % 2 == 0 { "a" } else { "b" };
                prop_assert_eq!(gate.observe(speed(value)), GateOutcome::Pending);
            }
        }
    }
}
