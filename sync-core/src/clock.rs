use std::time::{Instant, SystemTime, UNIX_EPOCH};

use once_cell::sync::Lazy;

static MONO_ANCHOR: Lazy<Instant> = Lazy::new(Instant::now);

/// Milliseconds elapsed on the process-local monotonic clock.
pub fn mono_ms() -> f64 {
    MONO_ANCHOR.elapsed().as_secs_f64() * 1000.0
}

/// Wall-clock milliseconds since the Unix epoch.
pub fn wall_ms() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
        * 1000.0
}

/// Monotonic seconds, used as the control process's "system time" domain
/// for the session epoch handshake.
pub fn system_time_s() -> f64 {
    mono_ms() * 0.001
}

/// Paired monotonic and wall-clock readings taken at one instant.
///
/// The controller needs both: the monotonic reading for delta-time in the
/// PID terms, the wall reading for stall detection (a suspended process
/// freezes the monotonic delta but not the wall gap).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ClockSample {
    pub mono_ms: f64,
    pub wall_ms: f64,
}

impl ClockSample {
    pub fn now() -> Self {
        Self {
            mono_ms: mono_ms(),
            wall_ms: wall_ms(),
        }
    }

    /// Build a sample from explicit readings. Test hooks and message
    /// handlers that already captured their timestamps use this.
    pub fn at(mono_ms: f64, wall_ms: f64) -> Self {
        Self { mono_ms, wall_ms }
    }
}

/// Clock offset and round-trip estimate from one handshake exchange.
///
/// t0: stage send time, t1: control receive time, t2: control transmit
/// time, t3: stage receive time. All in milliseconds of the respective
/// wall clocks.
#[derive(Debug, Clone, Copy)]
pub struct ClockOffset {
    pub offset_ms: f64,
    pub rtt_ms: f64,
}

impl ClockOffset {
    pub fn calculate(t0: f64, t1: f64, t2: f64, t3: f64) -> Self {
        let rtt_ms = (t3 - t0) - (t2 - t1);
        let offset_ms = ((t1 - t0) + (t2 - t3)) * 0.5;

        Self { offset_ms, rtt_ms }
    }

    /// Mean offset over a burst of exchanges. Returns zero offset when the
    /// burst is empty so a failed handshake degrades to "clocks agree".
    pub fn average(samples: &[ClockOffset]) -> f64 {
        if samples.is_empty() {
            return 0.0;
        }
        samples.iter().map(|s| s.offset_ms).sum::<f64>() / samples.len() as f64
    }
}

/// Shared wall-clock origin for one presentation session.
///
/// Established when playback starts: the control process records its own
/// system time ("birth") together with the play-head position at that
/// moment. Any process that can translate into the control clock domain
/// can then project the expected play-head without further messages.
#[derive(Debug, Clone, Copy)]
pub struct SessionEpoch {
    birth_s: f64,
    start_position: f64,
}

impl SessionEpoch {
    pub fn begin(now_system_s: f64, start_position: f64) -> Self {
        Self {
            birth_s: now_system_s,
            start_position,
        }
    }

    pub fn birth(&self) -> f64 {
        self.birth_s
    }

    /// Expected play-head position at `now_system_s`, assuming playback
    /// ran at unit rate since the epoch began.
    pub fn projected_position(&self, now_system_s: f64) -> f64 {
        self.start_position + (now_system_s - self.birth_s)
    }
}

/// Converts a delayed remote status report into a predicted current
/// play-head position.
pub struct ClockReconciler;

impl ClockReconciler {
    /// Project `position` forward by the one-way travel time of the status
    /// message plus any local time spent between receipt and consumption.
    ///
    /// `sent_at_ms` and `received_at_ms` are wall-clock readings;
    /// `consumed_at_ms` is the wall clock at the moment the prediction is
    /// used (equal to `received_at_ms` when consumed immediately). Returns
    /// the unmodified remote position when any input is non-finite.
    pub fn predict(
        duration: f64,
        position: f64,
        sent_at_ms: f64,
        received_at_ms: f64,
        consumed_at_ms: f64,
    ) -> f64 {
        if !duration.is_finite()
            || !position.is_finite()
            || !sent_at_ms.is_finite()
            || !received_at_ms.is_finite()
            || !consumed_at_ms.is_finite()
        {
            return position;
        }

        let travel_ms = received_at_ms - sent_at_ms;
        let pending_ms = consumed_at_ms - received_at_ms;
        position + (travel_ms + pending_ms) * 0.001
    }
}
