//! Testing utilities for crabrecord
//!
//! Provides an in-memory encoder sink and a synthetic frame source so
//! recording sessions can be exercised without ffmpeg or a camera.

pub mod memory_sink;
pub mod synthetic_data;

pub use memory_sink::{MemorySink, MemorySinkHandle, MemorySinkOpener};
pub use synthetic_data::{synthetic_video_frame, SyntheticSource};
