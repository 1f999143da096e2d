//! Shared value types for frames, devices and geometry

use serde::{Deserialize, Serialize};

/// Pixel layout of raw frames, named after the ffmpeg `pix_fmt` it maps to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PixelFormat {
    /// Packed 8-bit RGB
    Rgb24,
    /// Packed 8-bit RGBA
    Rgba,
    /// Packed 8-bit BGRA
    Bgra,
    /// Single 8-bit luminance channel
    Gray,
}

impl PixelFormat {
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Rgb24 => 3,
            PixelFormat::Rgba | PixelFormat::Bgra => 4,
            PixelFormat::Gray => 1,
        }
    }

    /// Name understood by ffmpeg's `-pix_fmt`
    pub fn ffmpeg_name(&self) -> &'static str {
        match self {
            PixelFormat::Rgb24 => "rgb24",
            PixelFormat::Rgba => "rgba",
            PixelFormat::Bgra => "bgra",
            PixelFormat::Gray => "gray",
        }
    }

    /// Byte length of one frame of the given dimensions
    pub fn frame_len(&self, width: u32, height: u32) -> usize {
        width as usize * height as usize * self.bytes_per_pixel()
    }
}

impl Default for PixelFormat {
    fn default() -> Self {
        PixelFormat::Rgb24
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.ffmpeg_name())
    }
}

/// Capture device descriptor handed to a [`crate::capture::FrameSource`]
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct VideoDevice {
    pub id: String,
    pub name: String,
}

impl VideoDevice {
    pub fn new(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: name.into(),
        }
    }
}

/// Pixel rectangle used for thumbnail cropping
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Rect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl Rect {
    pub fn new(x: u32, y: u32, width: u32, height: u32) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }
}

/// One admitted frame: an owned payload plus its admission order
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub sequence: u64,
    pub data: Vec<u8>,
}

impl Frame {
    pub fn new(sequence: u64, data: Vec<u8>) -> Self {
        Self { sequence, data }
    }
}
