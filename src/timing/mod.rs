//! Active-time clock for recording sessions
//!
//! Tracks when a session started, how long it has spent paused, and derives
//! the active recording time from those. Nothing is cached: elapsed time is
//! recomputed from the stored instants on every read.

use std::time::{Duration, Instant};

use crate::errors::{RecordResult, RecorderError};

/// Clock that excludes paused intervals from the elapsed time
///
/// Every operation has an `*_at` variant taking an explicit instant so the
/// arithmetic can be driven deterministically.
#[derive(Debug, Clone, Default)]
pub struct RecordingClock {
    started_at: Option<Instant>,
    paused_at: Option<Instant>,
    stopped_at: Option<Instant>,
    paused_total: Duration,
}

impl RecordingClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn start(&mut self) {
        self.start_at(Instant::now());
    }

    /// Reset the clock and start it at `now`
    pub fn start_at(&mut self, now: Instant) {
        self.started_at = Some(now);
        self.paused_at = None;
        self.stopped_at = None;
        self.paused_total = Duration::ZERO;
    }

    pub fn pause(&mut self) -> RecordResult<()> {
        self.pause_at(Instant::now())
    }

    pub fn pause_at(&mut self, now: Instant) -> RecordResult<()> {
        if !self.is_running() {
            return Err(RecorderError::ClockMisuse("pause on a clock that is not running"));
        }
        if self.paused_at.is_some() {
            return Err(RecorderError::ClockMisuse("pause while already paused"));
        }
        self.paused_at = Some(now);
        Ok(())
    }

    pub fn resume(&mut self) -> RecordResult<()> {
        self.resume_at(Instant::now())
    }

    pub fn resume_at(&mut self, now: Instant) -> RecordResult<()> {
        let paused_at = self
            .paused_at
            .take()
            .ok_or(RecorderError::ClockMisuse("resume while not paused"))?;
        self.paused_total += now.saturating_duration_since(paused_at);
        Ok(())
    }

    pub fn stop(&mut self) {
        self.stop_at(Instant::now());
    }

    /// Freeze the clock. An open pause is folded into the paused total, so the
    /// frozen value equals the active time at the moment the pause began.
    pub fn stop_at(&mut self, now: Instant) {
        if self.started_at.is_none() || self.stopped_at.is_some() {
            return;
        }
        if let Some(paused_at) = self.paused_at.take() {
            self.paused_total += now.saturating_duration_since(paused_at);
        }
        self.stopped_at = Some(now);
    }

    pub fn elapsed_active(&self) -> Duration {
        self.elapsed_active_at(Instant::now())
    }

    pub fn elapsed_active_at(&self, now: Instant) -> Duration {
        let Some(started_at) = self.started_at else {
            return Duration::ZERO;
        };
        let end = self.stopped_at.or(self.paused_at).unwrap_or(now);
        end.saturating_duration_since(started_at)
            .saturating_sub(self.paused_total)
    }

    /// Total paused time, including a pause that is still open
    pub fn paused_duration_at(&self, now: Instant) -> Duration {
        let open = self
            .paused_at
            .map(|paused_at| now.saturating_duration_since(paused_at))
            .unwrap_or_default();
        self.paused_total + open
    }

    pub fn is_paused(&self) -> bool {
        self.paused_at.is_some()
    }

    /// Started and not yet stopped
    pub fn is_running(&self) -> bool {
        self.started_at.is_some() && self.stopped_at.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_unstarted_clock_is_zero() {
        let clock = RecordingClock::new();
        assert_eq!(clock.elapsed_active(), Duration::ZERO);
        assert!(!clock.is_running());
    }

    #[test]
    fn test_elapsed_excludes_pause() {
        let t0 = Instant::now();
        let mut clock = RecordingClock::new();
        clock.start_at(t0);
        clock.pause_at(t0 + secs(1)).unwrap();
        clock.resume_at(t0 + secs(6)).unwrap();

        assert_eq!(clock.elapsed_active_at(t0 + secs(7)), secs(2));
        assert_eq!(clock.paused_duration_at(t0 + secs(7)), secs(5));
    }

    #[test]
    fn test_frozen_while_paused() {
        let t0 = Instant::now();
        let mut clock = RecordingClock::new();
        clock.start_at(t0);
        clock.pause_at(t0 + secs(3)).unwrap();

        assert_eq!(clock.elapsed_active_at(t0 + secs(4)), secs(3));
        assert_eq!(clock.elapsed_active_at(t0 + secs(40)), secs(3));

        clock.resume_at(t0 + secs(50)).unwrap();
        assert_eq!(clock.elapsed_active_at(t0 + secs(51)), secs(4));
    }

    #[test]
    fn test_double_pause_is_reported() {
        let t0 = Instant::now();
        let mut clock = RecordingClock::new();
        clock.start_at(t0);
        clock.pause_at(t0).unwrap();
        assert!(matches!(
            clock.pause_at(t0 + secs(1)),
            Err(RecorderError::ClockMisuse(_))
        ));
    }

    #[test]
    fn test_resume_without_pause_is_reported() {
        let mut clock = RecordingClock::new();
        clock.start();
        assert!(matches!(clock.resume(), Err(RecorderError::ClockMisuse(_))));
    }

    #[test]
    fn test_pause_before_start_is_reported() {
        let mut clock = RecordingClock::new();
        assert!(clock.pause().is_err());
    }

    #[test]
    fn test_stop_freezes_value() {
        let t0 = Instant::now();
        let mut clock = RecordingClock::new();
        clock.start_at(t0);
        clock.stop_at(t0 + secs(5));

        assert_eq!(clock.elapsed_active_at(t0 + secs(100)), secs(5));
        assert!(!clock.is_running());
    }

    #[test]
    fn test_stop_while_paused_freezes_at_pause() {
        let t0 = Instant::now();
        let mut clock = RecordingClock::new();
        clock.start_at(t0);
        clock.pause_at(t0 + secs(2)).unwrap();
        clock.stop_at(t0 + secs(9));

        assert_eq!(clock.elapsed_active_at(t0 + secs(20)), secs(2));
        assert!(!clock.is_paused());
    }

    #[test]
    fn test_restart_clears_pauses() {
        let t0 = Instant::now();
        let mut clock = RecordingClock::new();
        clock.start_at(t0);
        clock.pause_at(t0 + secs(1)).unwrap();
        clock.stop_at(t0 + secs(2));

        clock.start_at(t0 + secs(10));
        assert_eq!(clock.elapsed_active_at(t0 + secs(13)), secs(3));
    }

    #[test]
    fn test_monotonic_while_running() {
        let mut clock = RecordingClock::new();
        clock.start();
        let a = clock.elapsed_active();
        std::thread::sleep(Duration::from_millis(5));
        let b = clock.elapsed_active();
        assert!(b >= a);
    }
}
