//! Recording session controller

use std::borrow::Cow;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Utc};

use super::config::{RecordingConfig, RecordingStats};
use super::queue::{frame_queue, FrameProducer};
use super::session::{admit, RecordingMode, SessionShared, SessionStatus};
use super::worker::{run_capture, run_worker, WorkerReport};
use crate::capture::FrameSource;
use crate::encoder::{FfmpegSinkOpener, SinkAbort, SinkOpener};
use crate::errors::{RecordResult, RecorderError};
use crate::thumbnail::{save_thumbnail, ThumbnailRequest};
use crate::types::{Frame, VideoDevice};

type CaptureBody = Box<dyn FnOnce() -> Option<Box<dyn FrameSource>> + Send>;
type CaptureHandle = JoinHandle<Option<Box<dyn FrameSource>>>;

struct ActiveSession {
    shared: Arc<SessionShared>,
    mode: RecordingMode,
    started_at: DateTime<Utc>,
    output: PathBuf,
    /// Present in custom mode; the caller's thread is the producer
    producer: Option<FrameProducer<Frame>>,
    worker: Option<JoinHandle<WorkerReport>>,
    capture: Option<CaptureHandle>,
    /// Unblocks a worker stuck writing to a stalled encoder on cancel
    abort: Option<Arc<dyn SinkAbort>>,
}

/// Streams frames to an encoder through a frame queue and a worker thread
///
/// A `Recorder` runs at most one session at a time. Every `record` or
/// `start_custom_record` is ended by `stop` or `cancel`; dropping an active
/// recorder stops it.
pub struct Recorder {
    config: RecordingConfig,
    opener: Box<dyn SinkOpener>,
    source: Option<Box<dyn FrameSource>>,
    session: Option<ActiveSession>,
    last_admitted: u64,
    last_duration: Duration,
    last_output: Option<PathBuf>,
}

impl Recorder {
    /// Create a recorder that encodes through ffmpeg
    pub fn new(config: RecordingConfig) -> RecordResult<Self> {
        config.validate()?;
        Ok(Self {
            config,
            opener: Box::new(FfmpegSinkOpener),
            source: None,
            session: None,
            last_admitted: 0,
            last_duration: Duration::ZERO,
            last_output: None,
        })
    }

    /// Replace the sink opener (e.g. an in-memory sink for tests)
    pub fn with_sink_opener(mut self, opener: impl SinkOpener + 'static) -> Self {
        self.opener = Box::new(opener);
        self
    }

    /// Install the source used by `record()`
    pub fn with_frame_source(mut self, source: impl FrameSource + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    pub fn set_frame_source(&mut self, source: Box<dyn FrameSource>) -> RecordResult<()> {
        self.ensure_idle("set_frame_source")?;
        self.source = Some(source);
        Ok(())
    }

    /// Replace the configuration; only while Idle
    pub fn setup(&mut self, config: RecordingConfig) -> RecordResult<()> {
        self.ensure_idle("setup")?;
        config.validate()?;
        self.config = config;
        Ok(())
    }

    /// Start a default-mode session that pulls frames from the frame source.
    ///
    /// A zero `duration` falls back to the configured capture duration; zero
    /// there too records until stopped.
    pub fn record(&mut self, duration: Duration) -> RecordResult<()> {
        self.ensure_idle("record")?;
        if !self.config.record_video {
            return Err(RecorderError::config("video capture is disabled"));
        }
        let mut source = self
            .source
            .take()
            .ok_or_else(|| RecorderError::config("no frame source installed"))?;

        if let Err(e) = source.start(self.config.default_device.as_ref(), &self.config) {
            self.source = Some(source);
            return Err(e);
        }

        let target = if duration > Duration::ZERO {
            Some(duration)
        } else {
            self.config.capture_duration()
        };

        let (producer, mut session) = match self.begin(RecordingMode::Default, target) {
            Ok(started) => started,
            Err(e) => {
                source.stop();
                self.source = Some(source);
                return Err(e);
            }
        };

        let spawned = spawn_capture(
            |body| {
                thread::Builder::new()
                    .name("crabrecord-capture".to_string())
                    .spawn(body)
            },
            session.shared.clone(),
            producer,
            source,
            self.config.frame_interval(),
        );

        match spawned {
            Ok(handle) => {
                session.capture = Some(handle);
                self.session = Some(session);
                Ok(())
            }
            Err((e, source)) => {
                if let Some(mut source) = source {
                    source.stop();
                    self.source = Some(source);
                }
                session.shared.request_cancel();
                if let Some(worker) = session.worker.take() {
                    if worker.join().is_err() {
                        log::error!("[session {}] worker panicked during abort", session.shared.id);
                    }
                }
                Err(RecorderError::io("failed to spawn capture thread", e))
            }
        }
    }

    /// Start a custom-mode session fed through [`Recorder::add_frame`]
    pub fn start_custom_record(&mut self) -> RecordResult<()> {
        self.ensure_idle("start_custom_record")?;
        let target = self.config.capture_duration();
        let (producer, mut session) = self.begin(RecordingMode::Custom, target)?;
        session.producer = Some(producer);
        self.session = Some(session);
        Ok(())
    }

    /// Open the sink, start the clock and spawn the worker
    fn begin(
        &mut self,
        mode: RecordingMode,
        target: Option<Duration>,
    ) -> RecordResult<(FrameProducer<Frame>, ActiveSession)> {
        let output = self.config.output_path.clone();
        if output.exists() && !self.config.overwrite {
            return Err(RecorderError::AlreadyExists { path: output });
        }

        let sink = self.opener.open(&self.config, &output)?;
        let abort = sink.abort_handle();
        let (producer, consumer) = frame_queue(self.config.backlog);
        let shared = Arc::new(SessionShared::start(target, self.config.input_frame_len()));

        let worker_shared = shared.clone();
        let worker = thread::Builder::new()
            .name("crabrecord-worker".to_string())
            .spawn(move || run_worker(worker_shared, consumer, sink))
            .map_err(|e| RecorderError::io("failed to spawn worker thread", e))?;

        log::info!(
            "[session {}] recording {:?} ({:?} mode, {}x{} @ {} fps, target {:?})",
            shared.id,
            output,
            mode,
            self.config.width,
            self.config.height,
            self.config.fps,
            target
        );

        Ok((
            producer,
            ActiveSession {
                shared,
                mode,
                started_at: Utc::now(),
                output,
                producer: None,
                worker: Some(worker),
                capture: None,
                abort,
            },
        ))
    }

    /// Admit one frame in custom mode and return the running admitted count.
    ///
    /// Outside an active custom session, while paused, after the target
    /// duration, or when `pixels` does not match the configured frame size,
    /// the frame is ignored and the unchanged count is returned.
    pub fn add_frame(&mut self, pixels: &[u8]) -> u64 {
        let Some(session) = &self.session else {
            return self.last_admitted;
        };
        match &session.producer {
            Some(producer) => admit(&session.shared, producer, Cow::Borrowed(pixels))
                .unwrap_or_else(|| session.shared.admitted()),
            None => {
                log::debug!("add_frame ignored: session is in default mode");
                session.shared.admitted()
            }
        }
    }

    /// Pause or resume admission and the clock.
    ///
    /// Returns false when the session is not in the state the request needs.
    pub fn set_paused(&mut self, paused: bool) -> bool {
        let Some(session) = &self.session else {
            return false;
        };
        let shared = &session.shared;

        if paused {
            if !shared.transition(SessionStatus::Recording, SessionStatus::Paused) {
                return false;
            }
            if let Err(e) = shared.clock().pause() {
                log::error!("[session {}] {}", shared.id, e);
            }
            log::info!("[session {}] paused", shared.id);
        } else {
            if shared.status() != SessionStatus::Paused {
                return false;
            }
            if let Err(e) = shared.clock().resume() {
                log::error!("[session {}] {}", shared.id, e);
            }
            if !shared.transition(SessionStatus::Paused, SessionStatus::Recording) {
                return false;
            }
            log::info!("[session {}] resumed", shared.id);
        }
        true
    }

    /// Drain every queued frame into the encoder, finish the output and
    /// return to Idle.
    pub fn stop(&mut self) -> RecordResult<RecordingStats> {
        let session = self
            .session
            .take()
            .ok_or_else(|| RecorderError::invalid_state("stop", SessionStatus::Idle))?;
        self.finish(session, false)
    }

    /// Abort the session: queued frames are discarded and the partial output
    /// is removed. Safe in any state; returns `None` when Idle.
    pub fn cancel(&mut self) -> Option<RecordingStats> {
        let session = self.session.take()?;
        match self.finish(session, true) {
            Ok(stats) => Some(stats),
            Err(e) => {
                log::warn!("Error while cancelling recording: {}", e);
                None
            }
        }
    }

    fn finish(&mut self, mut session: ActiveSession, cancel: bool) -> RecordResult<RecordingStats> {
        let shared = session.shared.clone();
        if cancel {
            shared.request_cancel();
            if let Some(abort) = session.abort.take() {
                abort.abort();
            }
        }
        shared.set_status(SessionStatus::Stopping);

        let mut panicked = false;

        // Producer side first, so nothing is admitted once the worker drains.
        if let Some(capture) = session.capture.take() {
            match capture.join() {
                Ok(Some(source)) => self.source = Some(source),
                Ok(None) => {}
                Err(_) => panicked = true,
            }
        }
        drop(session.producer.take());

        let report = match session.worker.take().map(JoinHandle::join) {
            Some(Ok(report)) => report,
            Some(Err(_)) => {
                panicked = true;
                WorkerReport::default()
            }
            None => WorkerReport::default(),
        };

        shared.clock().stop();
        shared.set_status(SessionStatus::Idle);

        let duration = shared.elapsed_active();
        self.last_duration = duration;
        self.last_admitted = shared.admitted();
        if !cancel && report.error.is_none() {
            self.last_output = Some(session.output.clone());
        }

        let stats = RecordingStats {
            session_id: shared.id,
            started_at: session.started_at,
            admitted_frames: shared.admitted(),
            forwarded_frames: report.forwarded,
            evicted_frames: report.evicted,
            discarded_frames: report.discarded,
            write_failures: report.write_failures,
            duration_secs: duration.as_secs_f64(),
            output_path: session.output,
            cancelled: report.cancelled || cancel,
        };

        log::info!(
            "[session {}] {} after {:.2}s: admitted={} forwarded={} evicted={} discarded={}",
            shared.id,
            if stats.cancelled { "cancelled" } else { "stopped" },
            stats.duration_secs,
            stats.admitted_frames,
            stats.forwarded_frames,
            stats.evicted_frames,
            stats.discarded_frames
        );

        if panicked {
            return Err(RecorderError::WorkerPanicked);
        }
        if let Some(error) = report.error {
            return Err(error);
        }
        Ok(stats)
    }

    /// Export one frame of a recording; defaults to the last finished output
    pub fn save_thumbnail(&self, request: &ThumbnailRequest) -> RecordResult<PathBuf> {
        let source = request
            .source
            .as_deref()
            .or(self.last_output.as_deref())
            .ok_or_else(|| RecorderError::config("no recording to take a thumbnail from"))?;
        save_thumbnail(&self.config.ffmpeg_path, request, source)
    }

    fn ensure_idle(&self, operation: &'static str) -> RecordResult<()> {
        match self.status() {
            SessionStatus::Idle => Ok(()),
            state => Err(RecorderError::invalid_state(operation, state)),
        }
    }

    pub fn status(&self) -> SessionStatus {
        self.session
            .as_ref()
            .map(|s| s.shared.status())
            .unwrap_or(SessionStatus::Idle)
    }

    pub fn mode(&self) -> Option<RecordingMode> {
        self.session.as_ref().map(|s| s.mode)
    }

    /// Recording or paused
    pub fn is_recording(&self) -> bool {
        matches!(self.status(), SessionStatus::Recording | SessionStatus::Paused)
    }

    pub fn is_recording_custom(&self) -> bool {
        self.is_recording() && self.mode() == Some(RecordingMode::Custom)
    }

    pub fn is_recording_default(&self) -> bool {
        self.is_recording() && self.mode() == Some(RecordingMode::Default)
    }

    pub fn is_paused(&self) -> bool {
        self.status() == SessionStatus::Paused
    }

    /// The worker gave up on the encoder; `stop` will report why
    pub fn has_failed(&self) -> bool {
        self.session.as_ref().is_some_and(|s| s.shared.is_failed())
    }

    /// Active recording time, excluding pauses; frozen once Idle
    pub fn recorded_duration(&self) -> Duration {
        self.session
            .as_ref()
            .map(|s| s.shared.elapsed_active())
            .unwrap_or(self.last_duration)
    }

    /// Target duration of the current session
    pub fn target_duration(&self) -> Option<Duration> {
        self.session.as_ref().and_then(|s| s.shared.target())
    }

    pub fn frames_added(&self) -> u64 {
        self.session
            .as_ref()
            .map(|s| s.shared.admitted())
            .unwrap_or(self.last_admitted)
    }

    pub fn config(&self) -> &RecordingConfig {
        &self.config
    }

    pub fn fps(&self) -> f64 {
        self.config.fps
    }

    pub fn bit_rate(&self) -> u32 {
        self.config.bitrate_kbps
    }

    pub fn width(&self) -> u32 {
        self.config.width
    }

    pub fn height(&self) -> u32 {
        self.config.height
    }

    pub fn video_codec(&self) -> &str {
        &self.config.video_codec
    }

    pub fn ffmpeg_path(&self) -> &Path {
        &self.config.ffmpeg_path
    }

    pub fn output_path(&self) -> &Path {
        &self.config.output_path
    }

    pub fn capture_duration(&self) -> Option<Duration> {
        self.config.capture_duration()
    }

    pub fn is_overwrite(&self) -> bool {
        self.config.overwrite
    }

    pub fn is_record_video(&self) -> bool {
        self.config.record_video
    }

    pub fn default_device(&self) -> Option<&VideoDevice> {
        self.config.default_device.as_ref()
    }

    pub fn additional_input_arguments(&self) -> &[String] {
        &self.config.additional_input_args
    }

    pub fn additional_output_arguments(&self) -> &[String] {
        &self.config.additional_output_args
    }

    /// Output of the last session that finished cleanly
    pub fn last_output(&self) -> Option<&Path> {
        self.last_output.as_deref()
    }
}

/// Start the default-mode capture loop through `spawn`.
///
/// The source waits in a slot the loop takes it from, so a failed spawn hands
/// it back to the caller instead of dropping it with the closure.
fn spawn_capture<S>(
    spawn: S,
    shared: Arc<SessionShared>,
    producer: FrameProducer<Frame>,
    source: Box<dyn FrameSource>,
    interval: Duration,
) -> Result<CaptureHandle, (io::Error, Option<Box<dyn FrameSource>>)>
where
    S: FnOnce(CaptureBody) -> io::Result<CaptureHandle>,
{
    let slot = Arc::new(Mutex::new(Some(source)));
    let pending = slot.clone();
    let body: CaptureBody = Box::new(move || {
        let source = pending.lock().unwrap_or_else(PoisonError::into_inner).take()?;
        Some(run_capture(shared, producer, source, interval))
    });

    spawn(body).map_err(|e| (e, slot.lock().unwrap_or_else(PoisonError::into_inner).take()))
}

impl Drop for Recorder {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.stop() {
                log::warn!("Error stopping recorder in drop: {}", e);
            }
        }
    }
}
