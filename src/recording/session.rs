//! State shared between the controlling thread and a session's threads

use std::borrow::Cow;
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicU8, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use uuid::Uuid;

use super::queue::FrameProducer;
use crate::timing::RecordingClock;
use crate::types::Frame;

/// Lifecycle of a recording session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum SessionStatus {
    Idle = 0,
    Recording = 1,
    Paused = 2,
    Stopping = 3,
}

impl SessionStatus {
    fn from_u8(value: u8) -> Self {
        match value {
            1 => SessionStatus::Recording,
            2 => SessionStatus::Paused,
            3 => SessionStatus::Stopping,
            _ => SessionStatus::Idle,
        }
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Recording => "recording",
            SessionStatus::Paused => "paused",
            SessionStatus::Stopping => "stopping",
        };
        f.write_str(name)
    }
}

/// Who drives frame admission
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecordingMode {
    /// The session pulls frames from its frame source at the configured fps
    Default,
    /// The caller pushes frames with `add_frame`
    Custom,
}

pub(crate) struct SessionShared {
    pub(crate) id: Uuid,
    status: AtomicU8,
    cancel_requested: AtomicBool,
    failed: AtomicBool,
    admitted: AtomicU64,
    clock: Mutex<RecordingClock>,
    target: Option<Duration>,
    frame_len: usize,
}

impl SessionShared {
    /// Create the shared state with the clock already running
    pub(crate) fn start(target: Option<Duration>, frame_len: usize) -> Self {
        let mut clock = RecordingClock::new();
        clock.start();
        Self {
            id: Uuid::new_v4(),
            status: AtomicU8::new(SessionStatus::Recording as u8),
            cancel_requested: AtomicBool::new(false),
            failed: AtomicBool::new(false),
            admitted: AtomicU64::new(0),
            clock: Mutex::new(clock),
            target,
            frame_len,
        }
    }

    pub(crate) fn status(&self) -> SessionStatus {
        SessionStatus::from_u8(self.status.load(Ordering::Acquire))
    }

    pub(crate) fn set_status(&self, status: SessionStatus) {
        self.status.store(status as u8, Ordering::Release);
    }

    /// Move from `from` to `to`; false if the status was something else
    pub(crate) fn transition(&self, from: SessionStatus, to: SessionStatus) -> bool {
        self.status
            .compare_exchange(from as u8, to as u8, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
    }

    pub(crate) fn clock(&self) -> MutexGuard<'_, RecordingClock> {
        self.clock.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub(crate) fn elapsed_active(&self) -> Duration {
        self.clock().elapsed_active()
    }

    pub(crate) fn target(&self) -> Option<Duration> {
        self.target
    }

    /// Once the target duration is reached, move a live session to Stopping
    /// and freeze the clock. Returns true when the target has been reached.
    pub(crate) fn check_duration(&self) -> bool {
        let Some(target) = self.target else {
            return false;
        };
        let mut clock = self.clock();
        if clock.elapsed_active() < target {
            return false;
        }
        if self.transition(SessionStatus::Recording, SessionStatus::Stopping)
            || self.transition(SessionStatus::Paused, SessionStatus::Stopping)
        {
            clock.stop();
            log::info!(
                "[session {}] target duration {:.2}s reached, stopping",
                self.id,
                target.as_secs_f64()
            );
        }
        true
    }

    pub(crate) fn request_cancel(&self) {
        self.cancel_requested.store(true, Ordering::Release);
    }

    pub(crate) fn is_cancelled(&self) -> bool {
        self.cancel_requested.load(Ordering::Acquire)
    }

    /// Record an unrecoverable sink failure; admission stops immediately
    pub(crate) fn mark_failed(&self) {
        self.failed.store(true, Ordering::Release);
        self.set_status(SessionStatus::Stopping);
    }

    pub(crate) fn is_failed(&self) -> bool {
        self.failed.load(Ordering::Acquire)
    }

    pub(crate) fn admitted(&self) -> u64 {
        self.admitted.load(Ordering::Acquire)
    }
}

/// Admit one frame into the queue.
///
/// Returns the new admitted count, or `None` when the frame was rejected:
/// target duration reached, session not Recording, wrong payload length, or
/// consumer gone. Must only be called from the session's single producer.
pub(crate) fn admit(
    shared: &SessionShared,
    producer: &FrameProducer<Frame>,
    pixels: Cow<'_, [u8]>,
) -> Option<u64> {
    if shared.check_duration() {
        return None;
    }
    if shared.status() != SessionStatus::Recording {
        return None;
    }
    if pixels.len() != shared.frame_len {
        log::warn!(
            "[session {}] rejecting frame of {} bytes, expected {}",
            shared.id,
            pixels.len(),
            shared.frame_len
        );
        return None;
    }

    let sequence = shared.admitted();
    if !producer.produce(Frame::new(sequence, pixels.into_owned())) {
        return None;
    }
    Some(shared.admitted.fetch_add(1, Ordering::AcqRel) + 1)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::recording::queue::{frame_queue, BacklogPolicy};

    #[test]
    fn test_status_roundtrip() {
        for status in [
            SessionStatus::Idle,
            SessionStatus::Recording,
            SessionStatus::Paused,
            SessionStatus::Stopping,
        ] {
            assert_eq!(SessionStatus::from_u8(status as u8), status);
        }
    }

    #[test]
    fn test_transition_requires_expected_state() {
        let shared = SessionShared::start(None, 3);
        assert!(!shared.transition(SessionStatus::Paused, SessionStatus::Recording));
        assert!(shared.transition(SessionStatus::Recording, SessionStatus::Paused));
        assert_eq!(shared.status(), SessionStatus::Paused);
    }

    #[test]
    fn test_admit_counts_and_sequences() {
        let shared = SessionShared::start(None, 3);
        let (producer, consumer) = frame_queue(BacklogPolicy::Unbounded);

        assert_eq!(admit(&shared, &producer, Cow::Borrowed(&[1, 2, 3])), Some(1));
        assert_eq!(admit(&shared, &producer, Cow::Owned(vec![4, 5, 6])), Some(2));

        assert_eq!(consumer.consume().map(|f| f.sequence), Some(0));
        assert_eq!(consumer.consume().map(|f| f.data), Some(vec![4, 5, 6]));
    }

    #[test]
    fn test_admit_rejects_wrong_length() {
        let shared = SessionShared::start(None, 3);
        let (producer, _consumer) = frame_queue(BacklogPolicy::Unbounded);
        assert_eq!(admit(&shared, &producer, Cow::Borrowed(&[1, 2])), None);
        assert_eq!(shared.admitted(), 0);
    }

    #[test]
    fn test_admit_rejects_while_paused() {
        let shared = SessionShared::start(None, 1);
        let (producer, _consumer) = frame_queue(BacklogPolicy::Unbounded);
        shared.set_status(SessionStatus::Paused);
        assert_eq!(admit(&shared, &producer, Cow::Borrowed(&[0])), None);
    }

    #[test]
    fn test_zero_target_expires_immediately() {
        let shared = SessionShared::start(Some(Duration::ZERO), 1);
        assert!(shared.check_duration());
        assert_eq!(shared.status(), SessionStatus::Stopping);
    }

    #[test]
    fn test_mark_failed_stops_admission() {
        let shared = SessionShared::start(None, 1);
        let (producer, _consumer) = frame_queue(BacklogPolicy::Unbounded);
        shared.mark_failed();
        assert!(shared.is_failed());
        assert_eq!(admit(&shared, &producer, Cow::Borrowed(&[0])), None);
    }
}
