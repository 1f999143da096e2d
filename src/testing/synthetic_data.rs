//! Synthetic frames and a frame source built on them
//!
//! Lets recording sessions run end to end without a capture device.

use crate::capture::FrameSource;
use crate::errors::{RecordResult, RecorderError};
use crate::recording::RecordingConfig;
use crate::types::{PixelFormat, VideoDevice};

/// Create a gradient frame that changes with `frame_number`
pub fn synthetic_video_frame(frame_number: u64, width: u32, height: u32, format: PixelFormat) -> Vec<u8> {
    let bpp = format.bytes_per_pixel();
    let mut data = vec![0u8; format.frame_len(width, height)];

    let base = (frame_number % 256) as u8;
    for y in 0..height {
        for x in 0..width {
            let idx = (y as usize * width as usize + x as usize) * bpp;
            let channels = [
                base.wrapping_add((x % 256) as u8),
                base.wrapping_add((y % 256) as u8),
                base.wrapping_add(((x + y) % 256) as u8),
                u8::MAX,
            ];
            data[idx..idx + bpp].copy_from_slice(&channels[..bpp]);
        }
    }

    data
}

/// Frame source that hands out synthetic frames at the configured size
#[derive(Debug, Default)]
pub struct SyntheticSource {
    width: u32,
    height: u32,
    format: PixelFormat,
    captured: u64,
    fail_after: Option<u64>,
    device: Option<VideoDevice>,
    stopped: bool,
}

impl SyntheticSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail with a capture error once `frames` frames have been produced
    pub fn failing_after(frames: u64) -> Self {
        Self {
            fail_after: Some(frames),
            ..Self::default()
        }
    }

    pub fn captured(&self) -> u64 {
        self.captured
    }

    pub fn device(&self) -> Option<&VideoDevice> {
        self.device.as_ref()
    }

    pub fn is_stopped(&self) -> bool {
        self.stopped
    }
}

impl FrameSource for SyntheticSource {
    fn start(&mut self, device: Option<&VideoDevice>, config: &RecordingConfig) -> RecordResult<()> {
        self.width = config.width;
        self.height = config.height;
        self.format = config.input_pixel_format;
        self.device = device.cloned();
        self.stopped = false;
        Ok(())
    }

    fn capture(&mut self) -> RecordResult<Option<Vec<u8>>> {
        if self.fail_after.is_some_and(|limit| self.captured >= limit) {
            return Err(RecorderError::Capture("synthetic source exhausted".to_string()));
        }
        let frame = synthetic_video_frame(self.captured, self.width, self.height, self.format);
        self.captured += 1;
        Ok(Some(frame))
    }

    fn stop(&mut self) {
        self.stopped = true;
    }
}
