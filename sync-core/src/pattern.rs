/// Classified operating regime of the sync loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Pattern {
    #[default]
    Stable,
    Oscillating,
    Lagging,
    SystemStress,
}

/// Bounds on the correction applied while a pattern is active.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PatternLimits {
    /// Ceiling on the playback-rate multiplier; the floor is `2 - max_rate`.
    pub max_rate: f64,
    /// Drift magnitude (seconds) considered acceptable under this pattern.
    pub threshold: f64,
}

impl Pattern {
    pub fn limits(self) -> PatternLimits {
        match self {
            Pattern::Stable => PatternLimits {
                max_rate: 1.1,
                threshold: 0.033,
            },
            Pattern::Oscillating => PatternLimits {
                max_rate: 1.05,
                threshold: 0.05,
            },
            Pattern::Lagging => PatternLimits {
                max_rate: 1.2,
                threshold: 0.066,
            },
            Pattern::SystemStress => PatternLimits {
                max_rate: 1.05,
                threshold: 0.1,
            },
        }
    }
}

/// Label the current behavior of the loop from rolling statistics.
///
/// Rule order matters, first match wins:
/// 1. high variance with repeated overshoots means the corrections are
///    overcorrecting,
/// 2. a growing trend or slow response means correction is falling behind,
/// 3. heavy host lag means the environment itself cannot keep up,
/// 4. anything else is stable.
pub fn classify(
    variance: f64,
    trend: f64,
    overshoots: u32,
    avg_response_time: f64,
    system_lag: f64,
) -> Pattern {
    if variance > 0.1 && overshoots > 3 {
        Pattern::Oscillating
    } else if trend > 0.05 || avg_response_time > 0.15 {
        Pattern::Lagging
    } else if system_lag > 100.0 || avg_response_time > 0.2 {
        Pattern::SystemStress
    } else {
        Pattern::Stable
    }
}
