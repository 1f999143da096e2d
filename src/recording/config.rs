//! Recording configuration types

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::queue::BacklogPolicy;
use crate::errors::{RecordResult, RecorderError};
use crate::types::{PixelFormat, VideoDevice};

const MAX_FPS: f64 = 240.0;

/// Configuration for a recording session
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Capture video from the default source in `record()`
    pub record_video: bool,
    /// Frame width in pixels
    pub width: u32,
    /// Frame height in pixels
    pub height: u32,
    /// Frames per second
    pub fps: f64,
    /// Target bitrate in kbit/s
    pub bitrate_kbps: u32,
    /// Encoder executable
    pub ffmpeg_path: PathBuf,
    /// Default target duration in seconds; 0 records until stopped
    pub capture_duration_secs: f64,
    /// Encoder output file
    pub output_path: PathBuf,
    /// Encoder codec name, e.g. `libx264`
    pub video_codec: String,
    /// Layout of frames handed to the recorder
    pub input_pixel_format: PixelFormat,
    /// Layout requested from the encoder
    pub output_pixel_format: PixelFormat,
    /// Replace an existing output file
    pub overwrite: bool,
    /// Extra encoder arguments placed before the input
    pub additional_input_args: Vec<String>,
    /// Extra encoder arguments placed before the output path
    pub additional_output_args: Vec<String>,
    /// Device handed to the frame source in `record()`
    pub default_device: Option<VideoDevice>,
    /// Queue behaviour when the encoder falls behind
    pub backlog: BacklogPolicy,
}

impl RecordingConfig {
    /// Create a configuration with explicit dimensions
    pub fn new(width: u32, height: u32, fps: f64) -> Self {
        Self {
            width,
            height,
            fps,
            ..Self::default()
        }
    }

    pub fn with_bitrate(mut self, bitrate_kbps: u32) -> Self {
        self.bitrate_kbps = bitrate_kbps;
        self
    }

    pub fn with_output_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.output_path = path.into();
        self
    }

    pub fn with_ffmpeg_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.ffmpeg_path = path.into();
        self
    }

    pub fn with_video_codec(mut self, codec: impl Into<String>) -> Self {
        self.video_codec = codec.into();
        self
    }

    pub fn with_capture_duration(mut self, duration: Duration) -> Self {
        self.capture_duration_secs = duration.as_secs_f64();
        self
    }

    pub fn with_pixel_formats(mut self, input: PixelFormat, output: PixelFormat) -> Self {
        self.input_pixel_format = input;
        self.output_pixel_format = output;
        self
    }

    pub fn with_overwrite(mut self, overwrite: bool) -> Self {
        self.overwrite = overwrite;
        self
    }

    pub fn with_record_video(mut self, record_video: bool) -> Self {
        self.record_video = record_video;
        self
    }

    pub fn with_default_device(mut self, device: VideoDevice) -> Self {
        self.default_device = Some(device);
        self
    }

    pub fn with_backlog(mut self, backlog: BacklogPolicy) -> Self {
        self.backlog = backlog;
        self
    }

    pub fn set_additional_input_args(&mut self, args: Vec<String>) {
        self.additional_input_args = args;
    }

    pub fn add_additional_input_arg(&mut self, arg: impl Into<String>) {
        self.additional_input_args.push(arg.into());
    }

    pub fn clear_additional_input_args(&mut self) {
        self.additional_input_args.clear();
    }

    pub fn set_additional_output_args(&mut self, args: Vec<String>) {
        self.additional_output_args = args;
    }

    pub fn add_additional_output_arg(&mut self, arg: impl Into<String>) {
        self.additional_output_args.push(arg.into());
    }

    pub fn clear_additional_output_args(&mut self) {
        self.additional_output_args.clear();
    }

    pub fn clear_additional_args(&mut self) {
        self.clear_additional_input_args();
        self.clear_additional_output_args();
    }

    /// Configured target duration, `None` when unlimited
    pub fn capture_duration(&self) -> Option<Duration> {
        Duration::try_from_secs_f64(self.capture_duration_secs)
            .ok()
            .filter(|d| !d.is_zero())
    }

    /// Byte length of one input frame
    pub fn input_frame_len(&self) -> usize {
        self.input_pixel_format.frame_len(self.width, self.height)
    }

    /// Interval between frames at the configured rate
    pub fn frame_interval(&self) -> Duration {
        Duration::try_from_secs_f64(1.0 / self.fps).unwrap_or_default()
    }

    /// Validate configuration values
    pub fn validate(&self) -> RecordResult<()> {
        if self.width == 0 || self.height == 0 {
            return Err(RecorderError::config(format!(
                "invalid frame size {}x{}",
                self.width, self.height
            )));
        }
        if !self.fps.is_finite() || self.fps <= 0.0 || self.fps > MAX_FPS {
            return Err(RecorderError::config(format!(
                "invalid fps {} (must be in (0, {}])",
                self.fps, MAX_FPS
            )));
        }
        if self.bitrate_kbps == 0 {
            return Err(RecorderError::config("bitrate must be positive"));
        }
        if let Err(e) = Duration::try_from_secs_f64(self.capture_duration_secs) {
            return Err(RecorderError::config(format!(
                "invalid capture duration {}: {}",
                self.capture_duration_secs, e
            )));
        }
        if self.ffmpeg_path.as_os_str().is_empty() {
            return Err(RecorderError::config("ffmpeg path is empty"));
        }
        if self.video_codec.trim().is_empty() {
            return Err(RecorderError::config("video codec is empty"));
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(RecorderError::config("output path is empty"));
        }
        if let BacklogPolicy::DropOldest { max_backlog: 0 } = self.backlog {
            return Err(RecorderError::config("max_backlog must be at least 1"));
        }
        Ok(())
    }

    /// Load configuration from a TOML file, falling back to defaults when the
    /// file does not exist
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> RecordResult<Self> {
        let path = path.as_ref();

        if !path.exists() {
            log::info!("Config file not found at {:?}, using defaults", path);
            return Ok(Self::default());
        }

        let contents = fs::read_to_string(path)
            .map_err(|e| RecorderError::io(format!("failed to read {}", path.display()), e))?;

        let config: RecordingConfig = toml::from_str(&contents)
            .map_err(|e| RecorderError::config(format!("failed to parse {}: {}", path.display(), e)))?;

        config.validate()?;

        log::info!("Loaded configuration from {:?}", path);
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> RecordResult<()> {
        let path = path.as_ref();

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| {
                RecorderError::io(format!("failed to create {}", parent.display()), e)
            })?;
        }

        let toml_string = toml::to_string_pretty(self)
            .map_err(|e| RecorderError::config(format!("failed to serialize config: {}", e)))?;

        fs::write(path, toml_string)
            .map_err(|e| RecorderError::io(format!("failed to write {}", path.display()), e))?;

        log::info!("Saved configuration to {:?}", path);
        Ok(())
    }
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            record_video: true,
            width: 1280,
            height: 720,
            fps: 30.0,
            bitrate_kbps: 2000,
            ffmpeg_path: PathBuf::from("ffmpeg"),
            capture_duration_secs: 0.0,
            output_path: PathBuf::from("output.mp4"),
            video_codec: "libx264".to_string(),
            input_pixel_format: PixelFormat::Rgb24,
            output_pixel_format: PixelFormat::Rgb24,
            overwrite: false,
            additional_input_args: Vec::new(),
            additional_output_args: Vec::new(),
            default_device: None,
            backlog: BacklogPolicy::Unbounded,
        }
    }
}

/// Statistics returned after a session ends
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordingStats {
    /// Session id used in log lines
    pub session_id: Uuid,
    /// Wall-clock time the session started
    pub started_at: DateTime<Utc>,
    /// Frames accepted into the queue
    pub admitted_frames: u64,
    /// Frames written to the encoder
    pub forwarded_frames: u64,
    /// Frames evicted by backlog collapse
    pub evicted_frames: u64,
    /// Frames dropped by cancel
    pub discarded_frames: u64,
    /// Frames whose write failed after the re-attempt
    pub write_failures: u64,
    /// Active duration in seconds, excluding pauses
    pub duration_secs: f64,
    /// Output file path
    pub output_path: PathBuf,
    /// Session ended through cancel
    pub cancelled: bool,
}

impl RecordingStats {
    /// Average forwarded frames per active second
    pub fn actual_fps(&self) -> f64 {
        if self.duration_secs > 0.0 {
            self.forwarded_frames as f64 / self.duration_secs
        } else {
            0.0
        }
    }
}
