use crate::pattern::Pattern;

/// A controller coefficient that drifts between a floor and a ceiling in
/// fixed steps. Every mutation clamps, so `min_value <= value <=
/// max_value` holds at all times.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AdaptiveCoefficient {
    value: f64,
    min_value: f64,
    max_value: f64,
    adjustment_rate: f64,
}

impl AdaptiveCoefficient {
    pub const fn new(value: f64, min_value: f64, max_value: f64, adjustment_rate: f64) -> Self {
        Self {
            value,
            min_value,
            max_value,
            adjustment_rate,
        }
    }

    pub fn get(&self) -> f64 {
        self.value
    }

    pub fn min_value(&self) -> f64 {
        self.min_value
    }

    pub fn max_value(&self) -> f64 {
        self.max_value
    }

    fn raise(&mut self) {
        self.value = (self.value + self.adjustment_rate).min(self.max_value);
    }

    fn lower(&mut self) {
        self.value = (self.value - self.adjustment_rate).max(self.min_value);
    }
}

/// The three PID gains with their adaptation bounds.
///
/// Two presets exist. The cold set is used at construction; the warm set
/// after an explicit reset, with wider ranges and faster steps since a
/// fresh sync session tolerates more aggressive correction.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GainSet {
    pub kp: AdaptiveCoefficient,
    pub ki: AdaptiveCoefficient,
    pub kd: AdaptiveCoefficient,
}

impl GainSet {
    pub const fn cold() -> Self {
        Self {
            kp: AdaptiveCoefficient::new(0.5, 0.2, 0.8, 0.005),
            ki: AdaptiveCoefficient::new(0.05, 0.01, 0.15, 0.0025),
            kd: AdaptiveCoefficient::new(0.15, 0.08, 0.25, 0.005),
        }
    }

    pub const fn warm() -> Self {
        Self {
            kp: AdaptiveCoefficient::new(0.6, 0.3, 0.9, 0.01),
            ki: AdaptiveCoefficient::new(0.08, 0.02, 0.2, 0.005),
            kd: AdaptiveCoefficient::new(0.12, 0.05, 0.2, 0.01),
        }
    }

    /// Nudge each gain one step in the direction the classified pattern
    /// calls for. Gain scheduling, not gradient descent: directions are
    /// fixed per pattern, magnitudes are the per-coefficient step, and the
    /// clamp prevents runaway gains.
    pub fn retune(&mut self, pattern: Pattern) {
        match pattern {
            Pattern::Stable => {
                self.kp.raise();
                self.ki.raise();
                self.kd.raise();
            }
            Pattern::Oscillating => {
                self.kp.lower();
                self.ki.lower();
                self.kd.raise();
            }
            Pattern::Lagging => {
                self.kp.raise();
                self.ki.raise();
                self.kd.lower();
            }
            Pattern::SystemStress => {
                self.kp.lower();
                self.ki.lower();
                self.kd.lower();
            }
        }
    }
}
