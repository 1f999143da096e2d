//! Frame sources for default-mode recording
//!
//! In default mode the recorder owns the cadence: its capture thread asks the
//! installed [`FrameSource`] for one frame per tick at the configured fps.

use crate::errors::RecordResult;
use crate::recording::RecordingConfig;
use crate::types::VideoDevice;

/// Something that can hand out raw frames on demand
pub trait FrameSource: Send {
    /// Prepare the source before the first tick
    fn start(&mut self, _device: Option<&VideoDevice>, _config: &RecordingConfig) -> RecordResult<()> {
        Ok(())
    }

    /// Produce the current frame in the configured input pixel format.
    ///
    /// `Ok(None)` means no new frame is available for this tick.
    fn capture(&mut self) -> RecordResult<Option<Vec<u8>>>;

    /// Release the source after the last tick
    fn stop(&mut self) {}
}
