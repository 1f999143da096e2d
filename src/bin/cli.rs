use anyhow::{anyhow, bail, Context};
use crabrecord::testing::synthetic_video_frame;
use crabrecord::thumbnail::{save_thumbnail, ThumbnailRequest};
use crabrecord::{Recorder, RecordingConfig};
use std::env;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

fn main() -> anyhow::Result<()> {
    crabrecord::init_logging();

    let args: Vec<String> = env::args().collect();
    if args.len() < 2 {
        eprintln!("Usage: crabrecord-cli <command> [args]");
        eprintln!("Commands: record, thumbnail");
        std::process::exit(1);
    }

    let command = &args[1];
    match command.as_str() {
        "record" => cmd_record(&args),
        "thumbnail" => cmd_thumbnail(&args),
        _ => {
            eprintln!("Unknown command: {}", command);
            std::process::exit(1);
        }
    }
}

fn next_value<'a>(args: &'a [String], i: usize, flag: &str) -> anyhow::Result<&'a str> {
    args.get(i)
        .map(String::as_str)
        .ok_or_else(|| anyhow!("{} needs a value", flag))
}

fn cmd_record(args: &[String]) -> anyhow::Result<()> {
    // Parse args: record [output] [--frames <n>] [--duration <secs>] [--config <file>] [--json]
    let mut output = None;
    let mut frames: Option<u64> = None;
    let mut duration: Option<f64> = None;
    let mut config_path: Option<PathBuf> = None;
    let mut json = false;

    let mut i = 2;
    while i < args.len() {
        match args[i].as_str() {
            "--frames" => {
                i += 1;
                frames = Some(next_value(args, i, "--frames")?.parse()?);
            }
            "--duration" => {
                i += 1;
                duration = Some(next_value(args, i, "--duration")?.parse()?);
            }
            "--config" => {
                i += 1;
                config_path = Some(PathBuf::from(next_value(args, i, "--config")?));
            }
            "--json" => json = true,
            other => {
                if output.is_none() {
                    output = Some(PathBuf::from(other));
                }
            }
        }
        i += 1;
    }

    let mut config = match &config_path {
        Some(path) => RecordingConfig::load_from_file(path)?,
        None => RecordingConfig::new(640, 480, 30.0),
    };
    config.output_path = output.unwrap_or_else(|| {
        PathBuf::from(format!(
            "recording_{}.mp4",
            chrono::Local::now().format("%Y%m%d_%H%M%S")
        ))
    });
    if let Some(secs) = duration {
        let duration = Duration::try_from_secs_f64(secs)
            .with_context(|| format!("invalid --duration {}", secs))?;
        config = config.with_capture_duration(duration);
    }
    if frames.is_none() && config.capture_duration().is_none() {
        bail!("record needs --frames or --duration (or a capture duration in the config)");
    }

    let running = Arc::new(AtomicBool::new(true));
    let flag = running.clone();
    ctrlc::set_handler(move || flag.store(false, Ordering::SeqCst))
        .context("failed to install Ctrl-C handler")?;

    let (width, height, format) = (config.width, config.height, config.input_pixel_format);
    let interval = config.frame_interval();
    let mut recorder = Recorder::new(config)?;
    recorder.start_custom_record()?;

    let mut next_tick = Instant::now();
    let mut sent = 0u64;
    while running.load(Ordering::SeqCst) && recorder.is_recording() {
        if frames.is_some_and(|n| sent >= n) {
            break;
        }
        recorder.add_frame(&synthetic_video_frame(sent, width, height, format));
        sent += 1;

        next_tick += interval;
        if let Some(wait) = next_tick.checked_duration_since(Instant::now()) {
            thread::sleep(wait);
        }
    }

    let stats = recorder.stop()?;
    if json {
        println!("{}", serde_json::to_string(&stats)?);
    } else {
        println!("Recorded {}", stats.output_path.display());
        println!(
            "  frames: {} admitted, {} written, {} evicted",
            stats.admitted_frames, stats.forwarded_frames, stats.evicted_frames
        );
        println!(
            "  duration: {:.2}s ({:.1} fps)",
            stats.duration_secs,
            stats.actual_fps()
        );
    }
    Ok(())
}

fn cmd_thumbnail(args: &[String]) -> anyhow::Result<()> {
    if args.len() < 5 {
        eprintln!("Usage: crabrecord-cli thumbnail <input> <output> <hh:mm:ss[.fff]> [--size WxH]");
        std::process::exit(1);
    }
    let input = Path::new(&args[2]);
    let (hour, minute, second) = parse_timestamp(&args[4])?;
    let mut request = ThumbnailRequest::new(hour, minute, second, &args[3]);

    if let Some(pos) = args.iter().position(|a| a == "--size") {
        let (w, h) = parse_size(next_value(args, pos + 1, "--size")?)?;
        request = request.with_size(w, h);
    }

    let ffmpeg = RecordingConfig::default().ffmpeg_path;
    let written = save_thumbnail(&ffmpeg, &request, input)?;
    println!("Saved {}", written.display());
    Ok(())
}

fn parse_timestamp(s: &str) -> anyhow::Result<(u32, u32, f32)> {
    let parts: Vec<&str> = s.split(':').collect();
    let [h, m, sec] = parts.as_slice() else {
        bail!("invalid timestamp: {} (expected hh:mm:ss)", s);
    };
    Ok((h.parse()?, m.parse()?, sec.parse()?))
}

fn parse_size(s: &str) -> anyhow::Result<(u32, u32)> {
    let (w, h) = s
        .split_once('x')
        .ok_or_else(|| anyhow!("invalid size: {} (expected WxH)", s))?;
    Ok((w.parse()?, h.parse()?))
}
