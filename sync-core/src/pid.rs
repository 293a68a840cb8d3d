use crate::clock::ClockSample;
use crate::gains::GainSet;
use crate::history::DriftSampleHistory;
use crate::pattern::{classify, Pattern};
use crate::player::PlaybackTarget;

/// Drift magnitude (seconds) treated as "in sync": the rate snaps to 1.0
/// and the integral is cleared to avoid micro-oscillation at the set
/// point.
pub const SYNCHRONIZATION_THRESHOLD: f64 = 0.005;

/// Above this drift magnitude (seconds) the PID formula is abandoned for
/// the direct fast-sync rate.
pub const FAST_SYNC_THRESHOLD: f64 = 1.0;

/// Ceiling on the fast-sync rate; the floor is its reciprocal.
pub const MAX_FAST_SYNC_RATE: f64 = 2.0;

/// Integral accumulator clamp.
const MAX_INTEGRAL_ERROR: f64 = 0.5;

/// Wall-clock gap (ms) between ticks that implies a stall or suspension;
/// corrected with a hard seek instead of a rate nudge.
const MAX_TIME_GAP_MS: f64 = 1000.0;

/// Controller lifecycle phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    #[default]
    Uninitialized,
    FirstSample,
    SteadyState,
    FastSync,
}

/// One tick's verdict. `Hold` observes without steering (first sample),
/// `Rate` nudges the playback rate, `Seek` demands a hard re-seek.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Correction {
    Hold { drift: f64 },
    Rate { rate: f64, drift: f64 },
    Seek { target: f64, drift: f64 },
}

impl Correction {
    pub fn drift(&self) -> f64 {
        match *self {
            Correction::Hold { drift }
            | Correction::Rate { drift, .. }
            | Correction::Seek { drift, .. } => drift,
        }
    }
}

/// Adaptive PID controller steering a playback clock toward a moving
/// target position.
///
/// Owns the drift history, the pattern classification and the gain
/// schedule; the rest of the system calls [`adjust_playback_rate`] once
/// per tick and applies the returned correction.
///
/// [`adjust_playback_rate`]: PidController::adjust_playback_rate
#[derive(Debug, Clone)]
pub struct PidController {
    gains: GainSet,
    history: DriftSampleHistory,
    pattern: Pattern,
    phase: Phase,

    integral: f64,
    last_drift: f64,
    last_update_mono_ms: f64,
    last_wall_ms: Option<f64>,

    overshoots: u32,
    avg_response_time_s: f64,
    system_lag_ms: f64,
}

impl Default for PidController {
    fn default() -> Self {
        Self::new()
    }
}

impl PidController {
    pub fn new() -> Self {
        Self {
            gains: GainSet::cold(),
            history: DriftSampleHistory::new(),
            pattern: Pattern::Stable,
            phase: Phase::Uninitialized,
            integral: 0.0,
            last_drift: 0.0,
            last_update_mono_ms: 0.0,
            last_wall_ms: None,
            overshoots: 0,
            avg_response_time_s: 0.0,
            system_lag_ms: 0.0,
        }
    }

    /// One control tick: given the predicted target position, decide how
    /// to steer `player`.
    ///
    /// Returns `None` when the tick is suppressed (player paused or mid
    /// seek); suppressed ticks do not advance any state.
    pub fn adjust_playback_rate(
        &mut self,
        target: f64,
        player: &impl PlaybackTarget,
        now: ClockSample,
    ) -> Option<Correction> {
        if player.is_paused() || player.is_seeking() {
            return None;
        }

        let last_wall = match self.last_wall_ms {
            Some(wall) if self.phase != Phase::Uninitialized => wall,
            _ => {
                // First sample: seed timestamps, observe, do not steer.
                self.last_wall_ms = Some(now.wall_ms);
                self.last_update_mono_ms = now.mono_ms;
                self.phase = Phase::FirstSample;
                let drift = target - player.position();
                self.observe(drift, now.wall_ms);
                return Some(Correction::Hold { drift });
            }
        };

        if now.wall_ms - last_wall > MAX_TIME_GAP_MS {
            // Stall, suspension or tab-switch: the rate formula cannot
            // recover this, re-seek instead.
            self.phase = Phase::FastSync;
            self.last_wall_ms = Some(now.wall_ms);
            self.last_update_mono_ms = now.mono_ms;
            let drift = target - player.position();
            // The hard seek lands on target, so the drift on record is zero.
            self.observe(0.0, now.wall_ms);
            return Some(Correction::Seek { target, drift });
        }

        let delta_time = (now.mono_ms - self.last_update_mono_ms) * 0.001;
        self.last_update_mono_ms = now.mono_ms;
        self.last_wall_ms = Some(now.wall_ms);

        let drift = target - player.position();
        self.observe(drift, now.wall_ms);

        let adjustment = self.pid_term(drift, delta_time);

        if drift.abs() > FAST_SYNC_THRESHOLD {
            self.phase = Phase::FastSync;
            let rate = fast_sync_rate(drift, delta_time);
            return Some(Correction::Rate { rate, drift });
        }

        self.phase = Phase::SteadyState;
        let max_rate = self.pattern.limits().max_rate;
        let mut rate = (1.0 + adjustment).clamp(2.0 - max_rate, max_rate);

        if drift.abs() <= SYNCHRONIZATION_THRESHOLD {
            rate = 1.0;
            self.integral = 0.0;
        }

        if rate.is_finite() {
            Some(Correction::Rate { rate, drift })
        } else {
            None
        }
    }

    /// Record a drift sample, reclassify the pattern, retune the gains.
    fn observe(&mut self, drift: f64, wall_ms: f64) {
        if !drift.is_finite() {
            return;
        }

        if drift.signum() != self.last_drift.signum()
            && drift.abs() > SYNCHRONIZATION_THRESHOLD
            && self.last_drift.abs() > SYNCHRONIZATION_THRESHOLD
        {
            self.overshoots = self.overshoots.saturating_add(1);
        }

        self.history.record(drift, wall_ms);

        if self.history.is_warm() {
            self.pattern = classify(
                self.history.rolling_variance(),
                self.history.rolling_trend(),
                self.overshoots,
                self.avg_response_time_s,
                self.system_lag_ms,
            );
            self.gains.retune(self.pattern);
        }
    }

    /// The PID term proper. Invalid input contributes nothing and leaves
    /// the accumulators untouched.
    fn pid_term(&mut self, drift: f64, delta_time: f64) -> f64 {
        if !drift.is_finite() || !delta_time.is_finite() || delta_time <= 0.0 {
            return 0.0;
        }

        self.integral =
            (self.integral + drift * delta_time).clamp(-MAX_INTEGRAL_ERROR, MAX_INTEGRAL_ERROR);

        let derivative = (drift - self.last_drift) / delta_time;
        self.last_drift = drift;

        self.gains.kp.get() * drift
            + self.gains.ki.get() * self.integral
            + self.gains.kd.get() * derivative
    }

    /// Return to a fresh state with the warm gain preset. Idempotent and
    /// always safe: emits no rate change of its own.
    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.last_drift = 0.0;
        self.last_update_mono_ms = 0.0;
        self.last_wall_ms = None;
        self.phase = Phase::Uninitialized;
        self.history.clear();
        self.pattern = Pattern::Stable;
        self.overshoots = 0;
        self.avg_response_time_s = 0.0;
        self.system_lag_ms = 0.0;
        self.gains = GainSet::warm();
    }

    /// Host-measured event-loop health, fed into classification. The
    /// response time is in seconds, the lag in milliseconds.
    pub fn set_host_metrics(&mut self, avg_response_time_s: f64, system_lag_ms: f64) {
        self.avg_response_time_s = avg_response_time_s;
        self.system_lag_ms = system_lag_ms;
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    pub fn pattern(&self) -> Pattern {
        self.pattern
    }

    pub fn gains(&self) -> &GainSet {
        &self.gains
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    /// Drift recorded by the most recent steady tick, in seconds.
    pub fn last_drift(&self) -> f64 {
        self.last_drift
    }

    pub fn overshoots(&self) -> u32 {
        self.overshoots
    }
}

/// Direct rate for large drifts: `1 ± |drift|/Δt`, clamped to
/// `[1/MAX_FAST_SYNC_RATE, MAX_FAST_SYNC_RATE]` before it is ever handed
/// to the playback target. Degenerate Δt collapses straight to the clamp
/// boundary.
fn fast_sync_rate(drift: f64, delta_time: f64) -> f64 {
    let magnitude = drift.abs();
    if !magnitude.is_finite() || !delta_time.is_finite() || delta_time <= 0.0 {
        return if drift > 0.0 {
            MAX_FAST_SYNC_RATE
        } else {
            1.0 / MAX_FAST_SYNC_RATE
        };
    }

    if drift > 0.0 {
        (1.0 + magnitude / delta_time).min(MAX_FAST_SYNC_RATE)
    } else {
        (1.0 - magnitude / delta_time).max(1.0 / MAX_FAST_SYNC_RATE)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::player::PlayheadClock;

    fn running_player() -> PlayheadClock {
        let mut player = PlayheadClock::new(600.0);
        player.play(0.0);
        player
    }

    fn tick(
        pid: &mut PidController,
        player: &PlayheadClock,
        target: f64,
        t_ms: f64,
    ) -> Option<Correction> {
        pid.adjust_playback_rate(target, player, ClockSample::at(t_ms, t_ms))
    }

    #[test]
    fn test_first_tick_holds() {
        let mut pid = PidController::new();
        let player = running_player();
        let correction = tick(&mut pid, &player, 2.0, 0.0);
        assert_eq!(correction, Some(Correction::Hold { drift: 2.0 }));
        assert_eq!(pid.phase(), Phase::FirstSample);
    }

    #[test]
    fn test_dead_band_snaps_rate_and_clears_integral() {
        let mut pid = PidController::new();
        let player = running_player();
        tick(&mut pid, &player, 0.2, 0.0);
        tick(&mut pid, &player, 0.2, 500.0);
        assert!(pid.integral() != 0.0);

        for &drift in &[0.005, -0.005, 0.003, 0.0] {
            let correction = tick(&mut pid, &player, drift, 1000.0).unwrap();
            match correction {
                Correction::Rate { rate, .. } => assert_eq!(rate, 1.0),
                other => panic!("expected rate, got {other:?}"),
            }
            assert_eq!(pid.integral(), 0.0);
        }
    }

    #[test]
    fn test_steady_rate_stays_in_pattern_bounds() {
        let mut pid = PidController::new();
        let player = running_player();
        tick(&mut pid, &player, 0.0, 0.0);
        let mut t = 0.0;
        for &drift in &[0.9, -0.9, 0.5, -0.5, 0.2, 0.8, -0.8, 0.1] {
            t += 500.0;
            let correction = tick(&mut pid, &player, drift, t).unwrap();
            if let Correction::Rate { rate, .. } = correction {
                let max_rate = pid.pattern().limits().max_rate;
                assert!(rate >= 2.0 - max_rate && rate <= max_rate, "rate {rate} escaped");
            } else {
                panic!("expected rate, got {correction:?}");
            }
        }
    }

    #[test]
    fn test_fast_sync_behind_caps_at_double_speed() {
        let mut pid = PidController::new();
        let player = running_player();
        tick(&mut pid, &player, 0.0, 0.0);
        // 2s behind, 100ms after the previous tick
        let correction = tick(&mut pid, &player, 2.0, 100.0).unwrap();
        assert_eq!(
            correction,
            Correction::Rate {
                rate: 2.0,
                drift: 2.0
            }
        );
        assert_eq!(pid.phase(), Phase::FastSync);
    }

    #[test]
    fn test_fast_sync_ahead_floors_at_half_speed() {
        let mut pid = PidController::new();
        let player = running_player();
        tick(&mut pid, &player, 0.0, 0.0);
        let correction = tick(&mut pid, &player, -2.0, 100.0).unwrap();
        match correction {
            Correction::Rate { rate, .. } => assert_eq!(rate, 0.5),
            other => panic!("expected rate, got {other:?}"),
        }
    }

    #[test]
    fn test_fast_sync_clamped_as_delta_time_vanishes() {
        let mut pid = PidController::new();
        let player = running_player();
        tick(&mut pid, &player, 0.0, 0.0);
        tick(&mut pid, &player, 0.0, 500.0);
        // Two ticks at the same monotonic instant: delta time is zero
        let correction = tick(&mut pid, &player, 1.5, 500.0).unwrap();
        match correction {
            Correction::Rate { rate, .. } => assert_eq!(rate, 2.0),
            other => panic!("expected rate, got {other:?}"),
        }
        assert_eq!(fast_sync_rate(2.0, 0.0), 2.0);
        assert_eq!(fast_sync_rate(-2.0, 0.0), 0.5);
        assert_eq!(fast_sync_rate(2.0, f64::MIN_POSITIVE), 2.0);
    }

    #[test]
    fn test_wall_gap_forces_reseek() {
        let mut pid = PidController::new();
        let player = running_player();
        tick(&mut pid, &player, 0.0, 0.0);
        let correction = tick(&mut pid, &player, 7.5, 1500.0).unwrap();
        assert_eq!(
            correction,
            Correction::Seek {
                target: 7.5,
                drift: 7.5
            }
        );
        assert_eq!(pid.phase(), Phase::FastSync);
    }

    #[test]
    fn test_suppressed_when_paused_or_seeking() {
        let mut pid = PidController::new();
        let mut player = running_player();
        player.pause(0.0);
        assert_eq!(tick(&mut pid, &player, 1.0, 0.0), None);
        assert_eq!(pid.phase(), Phase::Uninitialized);

        player.play(0.0);
        player.seek(5.0);
        assert_eq!(tick(&mut pid, &player, 1.0, 0.0), None);
    }

    #[test]
    fn test_ten_zero_samples_stay_stable_at_unit_rate() {
        let mut pid = PidController::new();
        let player = running_player();
        let mut last = None;
        for i in 0..10 {
            last = tick(&mut pid, &player, 0.0, i as f64 * 500.0);
        }
        assert_eq!(pid.pattern(), Pattern::Stable);
        match last.unwrap() {
            Correction::Rate { rate, .. } => assert_eq!(rate, 1.0),
            other => panic!("expected rate, got {other:?}"),
        }
    }

    #[test]
    fn test_alternating_drift_classifies_oscillating_and_damps_gains() {
        let mut pid = PidController::new();
        let player = running_player();
        let mut t = 0.0;
        for i in 0..12 {
            let drift = if i % 2 == 0 { 0.4 } else { -0.4 };
            tick(&mut pid, &player, drift, t);
            t += 500.0;
        }
        // variance 0.16 > 0.1, sign flips pushed overshoots past 3
        assert!(pid.overshoots() > 3);
        assert_eq!(pid.pattern(), Pattern::Oscillating);

        let before = *pid.gains();
        tick(&mut pid, &player, 0.4, t);
        let after = pid.gains();
        assert!(after.kp.get() < before.kp.get());
        assert!(after.ki.get() < before.ki.get());
        assert!(after.kd.get() >= before.kd.get());
    }

    #[test]
    fn test_reset_is_idempotent_and_restores_warm_gains() {
        let mut pid = PidController::new();
        let player = running_player();
        let mut t = 0.0;
        for i in 0..15 {
            tick(&mut pid, &player, 0.3 * (i as f64), t);
            t += 500.0;
        }

        pid.reset();
        let snapshot = pid.clone();
        pid.reset();

        assert_eq!(pid.integral(), snapshot.integral());
        assert_eq!(pid.phase(), Phase::Uninitialized);
        assert_eq!(pid.pattern(), Pattern::Stable);
        assert_eq!(pid.overshoots(), 0);
        assert_eq!(*pid.gains(), GainSet::warm());
        assert!(pid.history.is_empty());

        // Next tick behaves as the first sample again
        let correction = tick(&mut pid, &player, 1.0, t + 500.0);
        assert_eq!(correction, Some(Correction::Hold { drift: 1.0 }));
        assert_eq!(pid.phase(), Phase::FirstSample);
    }

    #[test]
    fn test_non_finite_target_contributes_nothing() {
        let mut pid = PidController::new();
        let player = running_player();
        tick(&mut pid, &player, 0.1, 0.0);
        let integral_before = pid.integral();
        let correction = tick(&mut pid, &player, f64::NAN, 500.0);
        // NaN drift: PID term is zero, nothing recorded, rate is the
        // clamped neutral adjustment
        assert_eq!(pid.integral(), integral_before);
        match correction {
            None => {}
            Some(Correction::Rate { rate, .. }) => assert!(rate.is_finite()),
            other => panic!("unexpected {other:?}"),
        }
    }
}
