//! Session threads: the encode-feeding worker and the default-mode capture loop

use std::borrow::Cow;
use std::io;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use super::queue::{Consumed, FrameConsumer, FrameProducer};
use super::session::{admit, SessionShared, SessionStatus};
use crate::capture::FrameSource;
use crate::encoder::EncoderSink;
use crate::errors::RecorderError;
use crate::types::Frame;

/// Longest the worker waits on an empty queue before re-checking signals
pub(crate) const IDLE_WAIT: Duration = Duration::from_millis(5);

/// Consecutive failed frames after which the sink is abandoned
pub(crate) const MAX_CONSECUTIVE_WRITE_FAILURES: u32 = 2;

#[derive(Debug, Default)]
pub(crate) struct WorkerReport {
    pub forwarded: u64,
    pub discarded: u64,
    pub write_failures: u64,
    pub evicted: u64,
    pub cancelled: bool,
    pub error: Option<RecorderError>,
}

/// Drain `consumer` into `sink` until the producer is gone or cancel is
/// requested.
pub(crate) fn run_worker(
    shared: Arc<SessionShared>,
    consumer: FrameConsumer<Frame>,
    mut sink: Box<dyn EncoderSink>,
) -> WorkerReport {
    let mut report = WorkerReport::default();
    let mut consecutive_failures = 0u32;

    log::debug!("[session {}] worker started", shared.id);

    loop {
        if shared.is_cancelled() {
            report.discarded += consumer.discard_all() as u64;
            report.cancelled = true;
            if let Err(e) = sink.terminate() {
                log::warn!("[session {}] failed to terminate encoder: {}", shared.id, e);
            }
            break;
        }

        shared.check_duration();

        match consumer.consume_timeout(IDLE_WAIT) {
            Consumed::Frame(frame) => {
                if shared.is_cancelled() {
                    report.discarded += 1;
                    continue;
                }
                match write_with_retry(sink.as_mut(), &frame) {
                    Ok(()) => {
                        report.forwarded += 1;
                        consecutive_failures = 0;
                    }
                    Err(_) if shared.is_cancelled() => {
                        // The controlling thread aborted the sink mid-write.
                        report.discarded += 1;
                    }
                    Err(e) => {
                        report.write_failures += 1;
                        consecutive_failures += 1;
                        if consecutive_failures >= MAX_CONSECUTIVE_WRITE_FAILURES {
                            log::error!(
                                "[session {}] encoder write failed {} times in a row, aborting: {}",
                                shared.id,
                                consecutive_failures,
                                e
                            );
                            shared.mark_failed();
                            report.discarded += consumer.discard_all() as u64;
                            if let Err(te) = sink.terminate() {
                                log::warn!("[session {}] failed to terminate encoder: {}", shared.id, te);
                            }
                            report.error = Some(RecorderError::io(
                                format!("encoder write failed at frame {}", frame.sequence),
                                e,
                            ));
                            break;
                        }
                        log::warn!(
                            "[session {}] dropped frame {} after failed write: {}",
                            shared.id,
                            frame.sequence,
                            e
                        );
                    }
                }
            }
            Consumed::Empty => {}
            Consumed::Closed => {
                if shared.is_cancelled() {
                    report.cancelled = true;
                    if let Err(e) = sink.terminate() {
                        log::warn!("[session {}] failed to terminate encoder: {}", shared.id, e);
                    }
                } else if let Err(e) = sink.close() {
                    log::error!("[session {}] encoder did not finish cleanly: {}", shared.id, e);
                    report.error = Some(e);
                }
                break;
            }
        }
    }

    report.evicted = consumer.evicted();
    log::debug!(
        "[session {}] worker exiting: forwarded={} discarded={} failures={}",
        shared.id,
        report.forwarded,
        report.discarded,
        report.write_failures
    );
    report
}

/// One write plus a single immediate re-attempt
fn write_with_retry(sink: &mut dyn EncoderSink, frame: &Frame) -> io::Result<()> {
    match sink.write(&frame.data) {
        Ok(()) => Ok(()),
        Err(first) => {
            log::warn!("write of frame {} failed ({}), retrying", frame.sequence, first);
            sink.write(&frame.data)
        }
    }
}

/// Pull frames from `source` at `interval` until the session leaves the
/// Recording/Paused states. Hands the source back when done.
pub(crate) fn run_capture(
    shared: Arc<SessionShared>,
    producer: FrameProducer<Frame>,
    mut source: Box<dyn FrameSource>,
    interval: Duration,
) -> Box<dyn FrameSource> {
    let mut next_tick = Instant::now();

    loop {
        if shared.is_cancelled() {
            break;
        }
        match shared.status() {
            SessionStatus::Recording => {}
            SessionStatus::Paused => {
                thread::sleep(interval);
                next_tick = Instant::now();
                continue;
            }
            SessionStatus::Stopping | SessionStatus::Idle => break,
        }
        if shared.check_duration() {
            break;
        }

        match source.capture() {
            Ok(Some(data)) => {
                admit(&shared, &producer, Cow::Owned(data));
            }
            Ok(None) => {}
            Err(e) => {
                log::error!("[session {}] frame source failed: {}", shared.id, e);
                shared.transition(SessionStatus::Recording, SessionStatus::Stopping);
                break;
            }
        }

        next_tick += interval;
        let now = Instant::now();
        if next_tick > now {
            thread::sleep(next_tick - now);
        } else {
            // Behind schedule: skip the missed ticks instead of bursting.
            next_tick = now;
        }
    }

    source.stop();
    // Dropping the producer lets the worker see Closed once it has drained.
    drop(producer);
    source
}
