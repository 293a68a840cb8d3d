use crate::clock::{ClockReconciler, ClockSample};
use crate::pid::{Correction, PidController};
use crate::player::{PlaybackTarget, PlayheadClock};

/// Minimum wall-clock spacing between controller ticks. Status messages
/// arrive at up to ~30 Hz; correcting on every one would chase noise.
const MIN_TICK_INTERVAL_MS: f64 = 500.0;

/// Feeds the controller from inbound status messages and owns the
/// per-session state.
///
/// One coordinator serves one presentation session at a time. All local
/// discontinuities (operator seek, pause, resume) reset the controller and
/// suppress correction until the stage reports in again, so the loop never
/// fights a deliberate jump.
#[derive(Debug, Default)]
pub struct SyncCoordinator {
    session: Option<Session>,
}

#[derive(Debug)]
struct Session {
    controller: PidController,
    preview: PlayheadClock,
    last_tick_wall_ms: f64,
    suppress_until_status: bool,
}

impl SyncCoordinator {
    pub fn new() -> Self {
        Self { session: None }
    }

    /// Start tracking a presentation session (the stage window opened).
    /// The preview starts paused at zero; duration arrives with the first
    /// status report.
    pub fn begin_session(&mut self) {
        self.session = Some(Session {
            controller: PidController::new(),
            preview: PlayheadClock::new(f64::INFINITY),
            last_tick_wall_ms: f64::NEG_INFINITY,
            suppress_until_status: false,
        });
    }

    /// Discard all session state (the stage window closed).
    pub fn end_session(&mut self) {
        self.session = None;
    }

    pub fn is_active(&self) -> bool {
        self.session.is_some()
    }

    /// Handle one inbound status report, timestamped at receipt.
    ///
    /// Returns the correction applied to the preview clock, or `None` for
    /// throttled and suppressed reports.
    pub fn on_status(
        &mut self,
        duration: f64,
        position: f64,
        sent_at_ms: f64,
        received: ClockSample,
    ) -> Option<Correction> {
        let session = self.session.as_mut()?;
        session.preview.set_duration(duration);
        session.preview.advance(received.mono_ms);

        // The first report after a local discontinuity re-arms the loop
        // without steering; its prediction may predate the jump.
        if std::mem::take(&mut session.suppress_until_status) {
            return None;
        }

        if received.wall_ms - session.last_tick_wall_ms <= MIN_TICK_INTERVAL_MS {
            return None;
        }

        let target = ClockReconciler::predict(
            duration,
            position,
            sent_at_ms,
            received.wall_ms,
            received.wall_ms,
        );

        let correction = session
            .controller
            .adjust_playback_rate(target, &session.preview, received)?;
        session.last_tick_wall_ms = received.wall_ms;

        match correction {
            Correction::Rate { rate, .. } => session.preview.set_rate(rate),
            Correction::Seek { target, .. } => session.preview.seek(target),
            Correction::Hold { .. } => {}
        }
        Some(correction)
    }

    /// Operator started playback.
    pub fn on_play(&mut self, now: ClockSample) {
        if let Some(session) = &mut self.session {
            session.preview.play(now.mono_ms);
            session.controller.reset();
            session.suppress_until_status = true;
        }
    }

    /// Operator paused playback.
    pub fn on_pause(&mut self, now: ClockSample) {
        if let Some(session) = &mut self.session {
            session.preview.pause(now.mono_ms);
            session.controller.reset();
            session.suppress_until_status = true;
        }
    }

    /// Operator seeked the presentation.
    pub fn on_seek(&mut self, position: f64) {
        if let Some(session) = &mut self.session {
            session.preview.seek(position);
            session.controller.reset();
            session.suppress_until_status = true;
        }
    }

    /// The stage reported a playback-state flip that did not originate
    /// here (media-session keys, autoplay); mirror it.
    pub fn mirror_playback_state(&mut self, position: f64, playing: bool, now: ClockSample) {
        if let Some(session) = &mut self.session {
            if playing && session.preview.is_paused() {
                session.preview.play(now.mono_ms);
            } else if !playing && !session.preview.is_paused() {
                session.preview.seek(position);
                session.preview.pause(now.mono_ms);
            }
        }
    }

    /// End of media: the session's controller state is discarded.
    pub fn on_ended(&mut self) {
        self.end_session();
    }

    /// Explicit re-synchronization request. Idempotent, and a no-op when
    /// no session is active.
    pub fn resync(&mut self) {
        if let Some(session) = &mut self.session {
            session.controller.reset();
            session.suppress_until_status = true;
        }
    }

    pub fn preview(&self) -> Option<&PlayheadClock> {
        self.session.as_ref().map(|s| &s.preview)
    }

    pub fn controller(&self) -> Option<&PidController> {
        self.session.as_ref().map(|s| &s.controller)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pid::Phase;

    fn at(t_ms: f64) -> ClockSample {
        ClockSample::at(t_ms, t_ms)
    }

    fn playing_coordinator() -> SyncCoordinator {
        let mut sync = SyncCoordinator::new();
        sync.begin_session();
        sync.on_play(at(0.0));
        // First status only lifts the post-play suppression
        assert_eq!(sync.on_status(300.0, 0.0, 0.0, at(10.0)), None);
        sync
    }

    #[test]
    fn test_status_without_session_is_ignored() {
        let mut sync = SyncCoordinator::new();
        assert_eq!(sync.on_status(300.0, 5.0, 0.0, at(10.0)), None);
    }

    #[test]
    fn test_throttles_to_two_ticks_per_second() {
        let mut sync = playing_coordinator();
        assert!(sync.on_status(300.0, 0.6, 600.0, at(611.0)).is_some());
        // 30 Hz arrivals inside the throttle window do not tick
        for i in 1..=14 {
            let t = 611.0 + i as f64 * 33.0;
            assert_eq!(sync.on_status(300.0, 0.6, t, at(t)), None);
        }
        assert!(sync.on_status(300.0, 1.1, 1100.0, at(1112.0)).is_some());
    }

    #[test]
    fn test_target_is_latency_compensated() {
        let mut sync = playing_coordinator();
        // Sent at 560, received at 600: prediction projects 40ms forward
        let correction = sync.on_status(300.0, 10.0, 560.0, at(600.0)).unwrap();
        let expected_target = 10.0 + 0.04;
        let preview_pos = sync.preview().unwrap().position();
        assert!((correction.drift() - (expected_target - preview_pos)).abs() < 1e-9);
    }

    #[test]
    fn test_local_seek_suppresses_until_next_status() {
        let mut sync = playing_coordinator();
        assert!(sync.on_status(300.0, 0.6, 600.0, at(600.0)).is_some());

        sync.on_seek(120.0);
        assert_eq!(sync.controller().unwrap().phase(), Phase::Uninitialized);
        // Next report is swallowed, the one after corrects again
        assert_eq!(sync.on_status(300.0, 120.1, 1200.0, at(1200.0)), None);
        assert!(sync.on_status(300.0, 120.7, 1800.0, at(1800.0)).is_some());
    }

    #[test]
    fn test_pause_suppresses_and_resets() {
        let mut sync = playing_coordinator();
        sync.on_pause(at(700.0));
        assert!(sync.preview().unwrap().is_paused());
        assert_eq!(sync.on_status(300.0, 0.7, 710.0, at(710.0)), None);

        sync.on_play(at(900.0));
        assert_eq!(sync.on_status(300.0, 0.9, 910.0, at(910.0)), None);
        assert!(sync.on_status(300.0, 1.5, 1500.0, at(1500.0)).is_some());
    }

    #[test]
    fn test_ended_tears_down_session() {
        let mut sync = playing_coordinator();
        sync.on_ended();
        assert!(!sync.is_active());
        assert_eq!(sync.on_status(300.0, 5.0, 0.0, at(10.0)), None);
        // Reset stays safe with no session
        sync.resync();
        sync.resync();
    }

    #[test]
    fn test_rate_corrections_reach_the_preview() {
        let mut sync = playing_coordinator();
        // First qualifying tick is the controller's first sample
        assert!(matches!(
            sync.on_status(300.0, 0.6, 600.0, at(600.0)),
            Some(Correction::Hold { .. })
        ));
        // Preview sits near 0.6s; a report 2.5s ahead forces fast sync
        let correction = sync.on_status(300.0, 3.2, 1200.0, at(1200.0)).unwrap();
        match correction {
            Correction::Rate { rate, .. } => {
                assert!(rate > 1.0);
                assert_eq!(sync.preview().unwrap().rate(), rate);
            }
            other => panic!("expected rate, got {other:?}"),
        }
    }
}
