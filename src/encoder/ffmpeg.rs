use std::fs;
use std::io::{self, BufRead, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::{EncoderSink, SinkAbort, SinkOpener};
use crate::errors::{RecordResult, RecorderError};
use crate::recording::RecordingConfig;
use crate::thumbnail::ThumbnailRequest;

/// Build the ffmpeg command that reads raw frames from stdin
pub fn build_record_command(cfg: &RecordingConfig, output: &Path) -> Command {
    let mut cmd = Command::new(&cfg.ffmpeg_path);
    cmd.arg("-hide_banner");
    cmd.arg(if cfg.overwrite { "-y" } else { "-n" });

    cmd.args(&cfg.additional_input_args);

    // Raw frame input on stdin
    cmd.arg("-f").arg("rawvideo");
    cmd.arg("-pix_fmt").arg(cfg.input_pixel_format.ffmpeg_name());
    cmd.arg("-s").arg(format!("{}x{}", cfg.width, cfg.height));
    cmd.arg("-r").arg(cfg.fps.to_string());
    cmd.arg("-i").arg("pipe:0");

    cmd.arg("-c:v").arg(&cfg.video_codec);
    cmd.arg("-b:v").arg(format!("{}k", cfg.bitrate_kbps));
    cmd.arg("-pix_fmt").arg(cfg.output_pixel_format.ffmpeg_name());

    cmd.args(&cfg.additional_output_args);

    cmd.arg(output);
    cmd.stdin(Stdio::piped())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    cmd
}

/// `HH:MM:SS.mmm` seek position
pub fn format_timestamp(hour: u32, minute: u32, second: f32) -> String {
    format!("{:02}:{:02}:{:06.3}", hour, minute, second.max(0.0))
}

/// Build the ffmpeg command that exports a single still frame
pub fn build_thumbnail_command(ffmpeg_path: &Path, request: &ThumbnailRequest, source: &Path) -> Command {
    let mut cmd = Command::new(ffmpeg_path);
    cmd.arg("-hide_banner").arg("-y");
    cmd.arg("-ss")
        .arg(format_timestamp(request.hour, request.minute, request.second));
    cmd.arg("-i").arg(source);
    cmd.arg("-frames:v").arg("1");

    let mut filters = Vec::new();
    if let Some(crop) = request.crop.filter(|c| !c.is_empty()) {
        filters.push(format!(
            "crop={}:{}:{}:{}",
            crop.width, crop.height, crop.x, crop.y
        ));
    }
    if let Some((width, height)) = request.size.filter(|(w, h)| *w > 0 && *h > 0) {
        filters.push(format!("scale={}:{}", width, height));
    }
    if !filters.is_empty() {
        cmd.arg("-vf").arg(filters.join(","));
    }

    cmd.arg(&request.output);
    cmd.stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped());
    cmd
}

/// Poll interval while waiting for the encoder to exit
const EXIT_POLL: Duration = Duration::from_millis(10);

fn lock_child(child: &Mutex<Child>) -> MutexGuard<'_, Child> {
    child.lock().unwrap_or_else(PoisonError::into_inner)
}

/// ffmpeg child process fed through its stdin
pub struct FfmpegSink {
    child: Arc<Mutex<Child>>,
    stdin: Option<ChildStdin>,
    stderr_thread: Option<JoinHandle<String>>,
    output: PathBuf,
}

impl FfmpegSink {
    /// Spawn `cmd`, which must have stdin and stderr piped
    pub fn spawn(mut cmd: Command, output: impl Into<PathBuf>) -> RecordResult<Self> {
        let mut child = cmd
            .spawn()
            .map_err(|e| RecorderError::io(format!("failed to spawn {:?}", cmd.get_program()), e))?;

        let stdin = child.stdin.take();
        if stdin.is_none() {
            let _ = child.kill();
            let _ = child.wait();
            return Err(RecorderError::io(
                "encoder stdin was not piped",
                io::Error::from(io::ErrorKind::BrokenPipe),
            ));
        }

        let stderr_thread = child.stderr.take().map(|stderr| {
            thread::spawn(move || {
                let mut last_line = String::new();
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(line) if !line.trim().is_empty() => {
                            log::debug!("[ffmpeg] {}", line);
                            last_line = line;
                        }
                        Ok(_) => {}
                        Err(e) => {
                            log::warn!("[ffmpeg] failed to read stderr: {}", e);
                            break;
                        }
                    }
                }
                last_line
            })
        });

        Ok(Self {
            child: Arc::new(Mutex::new(child)),
            stdin,
            stderr_thread,
            output: output.into(),
        })
    }

    /// Wait for the child without holding its lock, so an abort can still
    /// reach it
    fn wait_for_exit(&self) -> io::Result<ExitStatus> {
        loop {
            if let Some(status) = lock_child(&self.child).try_wait()? {
                return Ok(status);
            }
            thread::sleep(EXIT_POLL);
        }
    }

    fn finish_stderr(&mut self) -> String {
        self.stderr_thread
            .take()
            .and_then(|h| h.join().ok())
            .unwrap_or_default()
    }
}

impl EncoderSink for FfmpegSink {
    fn write(&mut self, bytes: &[u8]) -> io::Result<()> {
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| io::Error::from(io::ErrorKind::BrokenPipe))?;
        stdin.write_all(bytes)
    }

    fn close(mut self: Box<Self>) -> RecordResult<()> {
        // Closing stdin is the end-of-stream signal for rawvideo input.
        drop(self.stdin.take());
        let status = self
            .wait_for_exit()
            .map_err(|e| RecorderError::io("failed to wait for encoder", e))?;
        let detail = self.finish_stderr();

        if status.success() {
            log::info!("Encoder finished writing {:?}", self.output);
            Ok(())
        } else {
            Err(RecorderError::EncoderExit {
                status: status.to_string(),
                detail,
            })
        }
    }

    fn terminate(mut self: Box<Self>) -> RecordResult<()> {
        drop(self.stdin.take());
        {
            let mut child = lock_child(&self.child);
            if let Err(e) = child.kill() {
                // Already exited on its own.
                log::debug!("Encoder kill failed: {}", e);
            }
            let _ = child.wait();
        }
        self.finish_stderr();

        match fs::remove_file(&self.output) {
            Ok(()) => {
                log::info!("Removed partial output {:?}", self.output);
                Ok(())
            }
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(RecorderError::io(
                format!("failed to remove partial output {}", self.output.display()),
                e,
            )),
        }
    }

    fn abort_handle(&self) -> Option<Arc<dyn SinkAbort>> {
        Some(Arc::new(FfmpegAbort {
            child: self.child.clone(),
        }))
    }
}

impl Drop for FfmpegSink {
    fn drop(&mut self) {
        let mut child = lock_child(&self.child);
        if let Ok(None) = child.try_wait() {
            log::warn!("Encoder for {:?} still running on drop, killing it", self.output);
            let _ = child.kill();
            let _ = child.wait();
        }
    }
}

/// Kills the ffmpeg child from any thread; a write blocked on its stdin then
/// fails with a broken pipe
#[derive(Clone)]
pub struct FfmpegAbort {
    child: Arc<Mutex<Child>>,
}

impl SinkAbort for FfmpegAbort {
    fn abort(&self) {
        let mut child = lock_child(&self.child);
        if let Ok(None) = child.try_wait() {
            log::info!("Killing encoder process {}", child.id());
            if let Err(e) = child.kill() {
                log::warn!("Failed to kill encoder: {}", e);
            }
        }
    }
}

/// Opens an [`FfmpegSink`] built from the recording configuration
#[derive(Debug, Clone, Copy, Default)]
pub struct FfmpegSinkOpener;

impl SinkOpener for FfmpegSinkOpener {
    fn open(&self, config: &RecordingConfig, output: &Path) -> RecordResult<Box<dyn EncoderSink>> {
        let cmd = build_record_command(config, output);
        log::debug!("Spawning encoder: {:?}", cmd);
        Ok(Box::new(FfmpegSink::spawn(cmd, output)?))
    }
}
