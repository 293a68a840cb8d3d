/// The element the controller steers: the control surface's muted preview
/// clock, or the stage's own playhead when control is inverted.
///
/// Correction must never fight a user- or system-initiated discontinuity,
/// so implementors report `is_seeking` for the span between a seek request
/// and its settling.
pub trait PlaybackTarget {
    fn position(&self) -> f64;
    fn duration(&self) -> f64;
    fn is_paused(&self) -> bool;
    fn is_seeking(&self) -> bool;
    fn set_rate(&mut self, rate: f64);
    fn seek(&mut self, position: f64);
}

/// A rate-scaled playhead driven by monotonic time.
///
/// Stands in for the media element: `advance` folds elapsed monotonic time
/// into the position at the current playback rate. A seek marks the clock
/// as seeking until the next `advance`, mirroring how a real element is
/// briefly unsteerable after `currentTime` is assigned.
#[derive(Debug, Clone)]
pub struct PlayheadClock {
    position: f64,
    duration: f64,
    rate: f64,
    volume: f64,
    paused: bool,
    seeking: bool,
    ended: bool,
    last_advance_mono_ms: Option<f64>,
}

impl PlayheadClock {
    pub fn new(duration: f64) -> Self {
        Self {
            position: 0.0,
            duration,
            rate: 1.0,
            volume: 1.0,
            paused: true,
            seeking: false,
            ended: false,
            last_advance_mono_ms: None,
        }
    }

    /// Fold elapsed monotonic time into the playhead.
    pub fn advance(&mut self, mono_ms: f64) {
        let elapsed_s = match self.last_advance_mono_ms {
            Some(last) if mono_ms > last => (mono_ms - last) * 0.001,
            _ => 0.0,
        };
        self.last_advance_mono_ms = Some(mono_ms);
        self.seeking = false;

        if self.paused || self.ended {
            return;
        }

        self.position += self.rate * elapsed_s;
        if self.duration.is_finite() && self.position >= self.duration {
            self.position = self.duration;
            self.ended = true;
            self.paused = true;
        }
    }

    pub fn play(&mut self, mono_ms: f64) {
        self.paused = false;
        self.ended = false;
        self.last_advance_mono_ms = Some(mono_ms);
    }

    pub fn pause(&mut self, mono_ms: f64) {
        self.advance(mono_ms);
        self.paused = true;
        self.rate = 1.0;
    }

    pub fn set_duration(&mut self, duration: f64) {
        if duration.is_finite() && duration > 0.0 {
            self.duration = duration;
        }
    }

    pub fn set_volume(&mut self, volume: f64) {
        if volume.is_finite() {
            self.volume = volume.clamp(0.0, 1.0);
        }
    }

    pub fn volume(&self) -> f64 {
        self.volume
    }

    pub fn rate(&self) -> f64 {
        self.rate
    }

    pub fn ended(&self) -> bool {
        self.ended
    }
}

impl PlaybackTarget for PlayheadClock {
    fn position(&self) -> f64 {
        self.position
    }

    fn duration(&self) -> f64 {
        self.duration
    }

    fn is_paused(&self) -> bool {
        self.paused
    }

    fn is_seeking(&self) -> bool {
        self.seeking
    }

    fn set_rate(&mut self, rate: f64) {
        if rate.is_finite() && rate > 0.0 {
            self.rate = rate;
        }
    }

    fn seek(&mut self, position: f64) {
        if !position.is_finite() {
            return;
        }
        self.position = if self.duration.is_finite() {
            position.clamp(0.0, self.duration)
        } else {
            position.max(0.0)
        };
        self.ended = false;
        self.seeking = true;
    }
}
