//! Frame recording sessions
//!
//! A [`Recorder`] accepts frames on one thread, buffers them in a
//! single-producer/single-consumer [`queue`], and a dedicated worker thread
//! writes them in order to an [`crate::encoder::EncoderSink`].
//!
//! # Example
//! ```rust,ignore
//! use crabrecord::recording::{Recorder, RecordingConfig};
//!
//! let config = RecordingConfig::new(640, 480, 30.0).with_output_path("out.mp4");
//! let mut recorder = Recorder::new(config)?;
//! recorder.start_custom_record()?;
//!
//! // In your frame loop:
//! recorder.add_frame(&rgb);
//!
//! // When done:
//! let stats = recorder.stop()?;
//! ```

mod config;
pub mod queue;
mod recorder;
mod session;
mod worker;

pub use config::{RecordingConfig, RecordingStats};
pub use queue::{frame_queue, BacklogPolicy, Consumed, FrameConsumer, FrameProducer};
pub use recorder::Recorder;
pub use session::{RecordingMode, SessionStatus};
