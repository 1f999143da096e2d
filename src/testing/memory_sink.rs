//! In-memory encoder sink with failure injection

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::encoder::{EncoderSink, SinkAbort, SinkOpener};
use crate::errors::{RecordResult, RecorderError};
use crate::recording::RecordingConfig;

#[derive(Debug, Default)]
struct SinkState {
    frames: Vec<Vec<u8>>,
    written: usize,
    count_only: bool,
    opened: u32,
    closed: bool,
    terminated: bool,
    failing_writes: u32,
    fail_all: bool,
    write_delay: Duration,
    stalled: bool,
    aborted: bool,
}

/// Inspection and control handle shared with every sink an opener creates
#[derive(Debug, Clone, Default)]
pub struct MemorySinkHandle {
    state: Arc<Mutex<SinkState>>,
    wake: Arc<Condvar>,
}

impl MemorySinkHandle {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, SinkState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Payloads written so far, in write order
    pub fn frames(&self) -> Vec<Vec<u8>> {
        self.lock().frames.clone()
    }

    /// Number of successful writes, including payloads not kept
    pub fn frame_count(&self) -> usize {
        self.lock().written
    }

    /// Count writes without keeping their payloads
    pub fn set_count_only(&self, count_only: bool) {
        self.lock().count_only = count_only;
    }

    pub fn opened(&self) -> u32 {
        self.lock().opened
    }

    pub fn is_closed(&self) -> bool {
        self.lock().closed
    }

    pub fn is_terminated(&self) -> bool {
        self.lock().terminated
    }

    /// Fail the next `count` write calls
    pub fn fail_next_writes(&self, count: u32) {
        self.lock().failing_writes = count;
    }

    pub fn fail_all_writes(&self, fail: bool) {
        self.lock().fail_all = fail;
    }

    /// Sleep inside every write to simulate a slow encoder
    pub fn set_write_delay(&self, delay: Duration) {
        self.lock().write_delay = delay;
    }

    /// Block every write until the stall is lifted or the sink is aborted,
    /// like an encoder that stopped reading its input
    pub fn set_stalled(&self, stalled: bool) {
        self.lock().stalled = stalled;
        self.wake.notify_all();
    }

    pub fn was_aborted(&self) -> bool {
        self.lock().aborted
    }

    fn abort(&self) {
        self.lock().aborted = true;
        self.wake.notify_all();
    }
}

struct MemoryAbort {
    handle: MemorySinkHandle,
}

impl SinkAbort for MemoryAbort {
    fn abort(&self) {
        self.handle.abort();
    }
}

/// Sink that records payloads in memory
pub struct MemorySink {
    handle: MemorySinkHandle,
    output: Option<PathBuf>,
}

impl EncoderSink for MemorySink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let delay = self.handle.lock().write_delay;
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }

        let mut state = self.handle.lock();
        while state.stalled && !state.aborted {
            state = self
                .handle
                .wake
                .wait(state)
                .unwrap_or_else(PoisonError::into_inner);
        }
        if state.aborted {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        if state.fail_all {
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        if state.failing_writes > 0 {
            state.failing_writes -= 1;
            return Err(io::Error::from(io::ErrorKind::BrokenPipe));
        }
        state.written += 1;
        if !state.count_only {
            state.frames.push(bytes.to_vec());
        }
        Ok(())
    }

    fn close(self: Box<Self>) -> RecordResult<()> {
        self.handle.lock().closed = true;
        Ok(())
    }

    fn terminate(self: Box<Self>) -> RecordResult<()> {
        self.handle.lock().terminated = true;
        if let Some(output) = &self.output {
            match fs::remove_file(output) {
                Ok(()) => {}
                Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                Err(e) => return Err(RecorderError::io("failed to remove output", e)),
            }
        }
        Ok(())
    }

    fn abort_handle(&self) -> Option<Arc<dyn SinkAbort>> {
        Some(Arc::new(MemoryAbort {
            handle: self.handle.clone(),
        }))
    }
}

/// Opens [`MemorySink`]s that report into one [`MemorySinkHandle`]
#[derive(Debug, Clone, Default)]
pub struct MemorySinkOpener {
    handle: MemorySinkHandle,
    create_files: bool,
}

impl MemorySinkOpener {
    pub fn new(handle: MemorySinkHandle) -> Self {
        Self {
            handle,
            create_files: false,
        }
    }

    /// Create an empty output file on open and remove it on terminate, like a
    /// real encoder would
    pub fn with_files(mut self) -> Self {
        self.create_files = true;
        self
    }
}

impl SinkOpener for MemorySinkOpener {
    fn open(&self, _config: &RecordingConfig, output: &Path) -> RecordResult<Box<dyn EncoderSink>> {
        let output = if self.create_files {
            fs::write(output, b"")
                .map_err(|e| RecorderError::io(format!("failed to create {}", output.display()), e))?;
            Some(output.to_path_buf())
        } else {
            None
        };

        {
            let mut state = self.handle.lock();
            state.opened += 1;
            state.aborted = false;
        }
        Ok(Box::new(MemorySink {
            handle: self.handle.clone(),
            output,
        }))
    }
}
