/// Ring capacity for raw drift history. Power of two so the index wraps
/// with a mask.
const RAW_CAPACITY: usize = 32;
const RAW_MASK: usize = RAW_CAPACITY - 1;

/// Secondary ring backing the trend accumulator.
const TREND_CAPACITY: usize = 16;
const TREND_MASK: usize = TREND_CAPACITY - 1;

/// Statistics window: classification looks at the last 10 samples.
const WINDOW: u64 = 10;

/// Fixed-capacity history of drift observations with O(1) rolling
/// statistics.
///
/// Each recorded sample updates three accumulators incrementally: the sum
/// and sum-of-squares over the last [`WINDOW`] samples (the sample falling
/// out of the window is still resident in the raw ring, so its
/// contribution is subtracted exactly rather than recomputed), and a trend
/// sum over the window's first differences maintained through the
/// one-step-delayed secondary ring.
#[derive(Debug, Clone)]
pub struct DriftSampleHistory {
    timestamps: [f64; RAW_CAPACITY],
    drifts: [f64; RAW_CAPACITY],
    intervals: [f64; RAW_CAPACITY],
    index: usize,
    recorded: u64,

    trend_ring: [f64; TREND_CAPACITY],
    trend_pos: usize,

    rolling_sum: f64,
    rolling_square_sum: f64,
    trend_sum: f64,
}

impl Default for DriftSampleHistory {
    fn default() -> Self {
        Self::new()
    }
}

impl DriftSampleHistory {
    pub fn new() -> Self {
        Self {
            timestamps: [0.0; RAW_CAPACITY],
            drifts: [0.0; RAW_CAPACITY],
            intervals: [0.0; RAW_CAPACITY],
            index: 0,
            recorded: 0,
            trend_ring: [0.0; TREND_CAPACITY],
            trend_pos: 0,
            rolling_sum: 0.0,
            rolling_square_sum: 0.0,
            trend_sum: 0.0,
        }
    }

    /// Record one drift observation taken at `timestamp_ms` (wall clock).
    pub fn record(&mut self, drift: f64, timestamp_ms: f64) {
        let idx = self.index;
        let prev_ts = self.timestamps[(idx + RAW_CAPACITY - 1) & RAW_MASK];

        self.timestamps[idx] = timestamp_ms;
        self.drifts[idx] = drift;
        self.intervals[idx] = if self.recorded > 0 {
            timestamp_ms - prev_ts
        } else {
            0.0
        };

        // Window sums: the sample leaving the 10-window sits WINDOW slots
        // back in the raw ring.
        let outgoing = if self.recorded >= WINDOW {
            self.drifts[(idx + RAW_CAPACITY - WINDOW as usize) & RAW_MASK]
        } else {
            0.0
        };
        self.rolling_sum += drift - outgoing;
        self.rolling_square_sum += drift * drift - outgoing * outgoing;

        // Trend sum over the window's first differences. The new sample
        // pushes in (x_n - x_{n-1}); once the window is full each sample
        // also pushes out (x_{n-9} - x_{n-10}), both read from the delayed
        // ring before the overwrite.
        let pos = self.trend_pos;
        let pushed_in = if self.recorded > 0 {
            drift - self.trend_ring[(pos + TREND_CAPACITY - 1) & TREND_MASK]
        } else {
            0.0
        };
        let pushed_out = if self.recorded >= WINDOW {
            let leaving = self.trend_ring[(pos + TREND_CAPACITY + 1 - WINDOW as usize) & TREND_MASK];
            let before = self.trend_ring[(pos + TREND_CAPACITY - WINDOW as usize) & TREND_MASK];
            leaving - before
        } else {
            0.0
        };
        self.trend_sum += pushed_in - pushed_out;
        self.trend_ring[pos] = drift;
        self.trend_pos = (pos + 1) & TREND_MASK;

        self.index = (idx + 1) & RAW_MASK;
        self.recorded += 1;
    }

    /// True once enough samples exist for the rolling statistics to cover
    /// a full window.
    pub fn is_warm(&self) -> bool {
        self.recorded >= WINDOW
    }

    pub fn len(&self) -> usize {
        self.recorded.min(RAW_CAPACITY as u64) as usize
    }

    pub fn is_empty(&self) -> bool {
        self.recorded == 0
    }

    /// Mean drift over the window.
    pub fn rolling_mean(&self) -> f64 {
        self.rolling_sum / WINDOW as f64
    }

    /// Population variance of drift over the window.
    pub fn rolling_variance(&self) -> f64 {
        let mean = self.rolling_mean();
        self.rolling_square_sum / WINDOW as f64 - mean * mean
    }

    /// Mean first difference over the window: positive when drift is
    /// systematically growing.
    pub fn rolling_trend(&self) -> f64 {
        self.trend_sum / (WINDOW - 1) as f64
    }

    /// Milliseconds between the two most recent samples, 0 before the
    /// second sample.
    pub fn last_interval_ms(&self) -> f64 {
        if self.recorded == 0 {
            return 0.0;
        }
        self.intervals[(self.index + RAW_CAPACITY - 1) & RAW_MASK]
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn feed(history: &mut DriftSampleHistory, drifts: &[f64]) {
        for (i, &d) in drifts.iter().enumerate() {
            history.record(d, 1000.0 + i as f64 * 500.0);
        }
    }

    fn scan_stats(drifts: &[f64]) -> (f64, f64, f64) {
        let window: Vec<f64> = drifts.iter().rev().take(10).rev().copied().collect();
        let mean = window.iter().sum::<f64>() / 10.0;
        let variance = window.iter().map(|d| d * d).sum::<f64>() / 10.0 - mean * mean;
        let trend = window
            .windows(2)
            .map(|pair| pair[1] - pair[0])
            .sum::<f64>()
            / 9.0;
        (mean, variance, trend)
    }

    #[test]
    fn test_warmup_threshold() {
        let mut history = DriftSampleHistory::new();
        feed(&mut history, &[0.01; 9]);
        assert!(!history.is_warm());
        history.record(0.01, 9999.0);
        assert!(history.is_warm());
    }

    #[test]
    fn test_rolling_matches_rescan() {
        // Deterministic pseudo-noise, long enough to wrap both rings
        let drifts: Vec<f64> = (0..80)
            .map(|i| ((i * 37 + 11) % 23) as f64 * 0.01 - 0.11)
            .collect();
        let mut history = DriftSampleHistory::new();
        feed(&mut history, &drifts);

        let (mean, variance, trend) = scan_stats(&drifts);
        assert!((history.rolling_mean() - mean).abs() < 1e-9);
        assert!((history.rolling_variance() - variance).abs() < 1e-9);
        assert!((history.rolling_trend() - trend).abs() < 1e-9);
    }

    #[test]
    fn test_zero_drift_is_flat() {
        let mut history = DriftSampleHistory::new();
        feed(&mut history, &[0.0; 10]);
        assert_eq!(history.rolling_mean(), 0.0);
        assert_eq!(history.rolling_variance(), 0.0);
        assert_eq!(history.rolling_trend(), 0.0);
    }

    #[test]
    fn test_growing_drift_has_positive_trend() {
        let drifts: Vec<f64> = (0..12).map(|i| i as f64 * 0.1).collect();
        let mut history = DriftSampleHistory::new();
        feed(&mut history, &drifts);
        // First differences are all 0.1
        assert!((history.rolling_trend() - 0.1).abs() < 1e-9);
    }

    #[test]
    fn test_intervals_tracked() {
        let mut history = DriftSampleHistory::new();
        history.record(0.0, 1000.0);
        assert_eq!(history.last_interval_ms(), 0.0);
        history.record(0.0, 1480.0);
        assert_eq!(history.last_interval_ms(), 480.0);
    }

    #[test]
    fn test_clear_resets_accumulators() {
        let mut history = DriftSampleHistory::new();
        feed(&mut history, &[0.5; 20]);
        history.clear();
        assert!(history.is_empty());
        assert!(!history.is_warm());
        assert_eq!(history.rolling_mean(), 0.0);
        assert_eq!(history.rolling_trend(), 0.0);
    }
}
