//! Encoder sinks
//!
//! The recorder treats the encoder as an opaque sink that accepts ordered
//! frame payloads. [`FfmpegSink`] pipes raw frames into an `ffmpeg` child
//! process; tests use [`crate::testing::MemorySink`].

mod ffmpeg;

use std::io;
use std::path::Path;
use std::sync::Arc;

pub use ffmpeg::{
    build_record_command, build_thumbnail_command, format_timestamp, FfmpegAbort, FfmpegSink,
    FfmpegSinkOpener,
};

use crate::errors::RecordResult;
use crate::recording::RecordingConfig;

/// Destination for encoded-to-be frame bytes
pub trait EncoderSink: Send {
    /// Write one frame payload
    fn write(&mut self, bytes: &[u8]) -> io::Result<()>;

    /// Flush and finish the output; the result is a completed file
    fn close(self: Box<Self>) -> RecordResult<()>;

    /// Abort the output; nothing written so far is considered valid
    fn terminate(self: Box<Self>) -> RecordResult<()>;

    /// Handle that can unblock a pending `write` from another thread
    fn abort_handle(&self) -> Option<Arc<dyn SinkAbort>> {
        None
    }
}

/// Stops a sink from outside the thread that owns it.
///
/// After `abort`, a blocked or later `write` fails promptly. The owner still
/// calls `terminate` to clean up.
pub trait SinkAbort: Send + Sync {
    fn abort(&self);
}

/// Opens a sink for a session
pub trait SinkOpener: Send + Sync {
    fn open(&self, config: &RecordingConfig, output: &Path) -> RecordResult<Box<dyn EncoderSink>>;
}
