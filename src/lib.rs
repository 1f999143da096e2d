//! CrabRecord: frame recording sessions that stream raw video into ffmpeg
//!
//! Frames are admitted on the caller's thread, buffered in a
//! single-producer/single-consumer queue and written in order by a worker
//! thread, so a slow encoder never blocks capture.
//!
//! # Features
//! - Default mode: frames pulled from a [`capture::FrameSource`] at the configured fps
//! - Custom mode: frames pushed with [`recording::Recorder::add_frame`]
//! - Pause/resume with an active-time clock and automatic stop at a target duration
//! - Cancel that discards the backlog and removes the partial output
//! - Thumbnail export from a finished recording
//!
//! # Usage
//! ```rust,ignore
//! use crabrecord::{Recorder, RecordingConfig};
//!
//! crabrecord::init_logging();
//! let config = RecordingConfig::new(640, 480, 30.0).with_output_path("clip.mp4");
//! let mut recorder = Recorder::new(config)?;
//! recorder.start_custom_record()?;
//! recorder.add_frame(&pixels);
//! let stats = recorder.stop()?;
//! ```
pub mod capture;
pub mod encoder;
pub mod errors;
pub mod recording;
pub mod thumbnail;
pub mod timing;
pub mod types;

// Testing utilities - in-memory sink and synthetic frames for offline testing
pub mod testing;

// Re-exports for convenience
pub use capture::FrameSource;
pub use encoder::{EncoderSink, FfmpegSinkOpener, SinkOpener};
pub use errors::{RecordResult, RecorderError};
pub use recording::{
    BacklogPolicy, Recorder, RecordingConfig, RecordingMode, RecordingStats, SessionStatus,
};
pub use thumbnail::ThumbnailRequest;
pub use timing::RecordingClock;
pub use types::{Frame, PixelFormat, Rect, VideoDevice};

/// Initialize logging for the recorder
pub fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "crabrecord=info");
    }
    let _ = env_logger::try_init();
}

/// Version information
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
pub const NAME: &str = env!("CARGO_PKG_NAME");
pub const DESCRIPTION: &str = env!("CARGO_PKG_DESCRIPTION");

/// Get crate information
pub fn get_info() -> CrateInfo {
    CrateInfo {
        name: NAME.to_string(),
        version: VERSION.to_string(),
        description: DESCRIPTION.to_string(),
    }
}

/// Crate information structure
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct CrateInfo {
    pub name: String,
    pub version: String,
    pub description: String,
}

#[cfg(test)]
mod lib_tests {
    use super::*;

    #[test]
    fn test_crate_info() {
        let info = get_info();
        assert_eq!(info.name, "crabrecord");
        assert!(!info.version.is_empty());
        assert!(!info.description.is_empty());
    }

    #[test]
    fn test_init_logging_twice() {
        init_logging();
        init_logging();
    }
}
