//! Single-frame export from a recorded file

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::encoder::build_thumbnail_command;
use crate::errors::{RecordResult, RecorderError};
use crate::types::Rect;

/// Where to seek and how to shape the exported still
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThumbnailRequest {
    pub hour: u32,
    pub minute: u32,
    pub second: f32,
    /// Image file to write; the extension selects the image format
    pub output: PathBuf,
    /// Scale to `(width, height)`
    pub size: Option<(u32, u32)>,
    /// Crop applied before scaling
    pub crop: Option<Rect>,
    /// Video to read; `None` means the last recording
    pub source: Option<PathBuf>,
}

impl ThumbnailRequest {
    pub fn new(hour: u32, minute: u32, second: f32, output: impl Into<PathBuf>) -> Self {
        Self {
            hour,
            minute,
            second,
            output: output.into(),
            size: None,
            crop: None,
            source: None,
        }
    }

    pub fn with_size(mut self, width: u32, height: u32) -> Self {
        self.size = Some((width, height));
        self
    }

    pub fn with_crop(mut self, crop: Rect) -> Self {
        self.crop = Some(crop);
        self
    }

    pub fn with_source(mut self, source: impl Into<PathBuf>) -> Self {
        self.source = Some(source.into());
        self
    }
}

/// Run ffmpeg to export one frame of `source` at the requested position
pub fn save_thumbnail(ffmpeg_path: &Path, request: &ThumbnailRequest, source: &Path) -> RecordResult<PathBuf> {
    if !source.exists() {
        return Err(RecorderError::io(
            format!("thumbnail source {} is missing", source.display()),
            std::io::Error::from(std::io::ErrorKind::NotFound),
        ));
    }

    let mut cmd = build_thumbnail_command(ffmpeg_path, request, source);
    log::debug!("Extracting thumbnail: {:?}", cmd);

    let output = cmd
        .output()
        .map_err(|e| RecorderError::io(format!("failed to run {}", ffmpeg_path.display()), e))?;

    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        return Err(RecorderError::EncoderExit {
            status: output.status.to_string(),
            detail: stderr.lines().last().unwrap_or_default().to_string(),
        });
    }

    log::info!(
        "Saved thumbnail of {:?} at {} to {:?}",
        source,
        crate::encoder::format_timestamp(request.hour, request.minute, request.second),
        request.output
    );
    Ok(request.output.clone())
}
