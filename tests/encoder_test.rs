//! Encoder command and configuration tests for CrabRecord
//!
//! Covers how the ffmpeg command line is assembled from a recording
//! configuration, thumbnail extraction commands, and configuration files.
//! None of these tests need an ffmpeg binary.
//!
//! Run with: cargo test --test encoder_test

use std::path::Path;
use tempfile::tempdir;

use crabrecord::encoder::{build_record_command, build_thumbnail_command, format_timestamp};
use crabrecord::recording::{BacklogPolicy, Recorder, RecordingConfig};
use crabrecord::thumbnail::ThumbnailRequest;
use crabrecord::types::{PixelFormat, Rect, VideoDevice};
use crabrecord::RecorderError;

fn args_of(cmd: &std::process::Command) -> Vec<String> {
    cmd.get_args()
        .map(|s| s.to_string_lossy().into_owned())
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════
// RECORD COMMAND
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_record_command_reads_rawvideo_from_stdin() {
    let cfg = RecordingConfig::new(1920, 1080, 60.0).with_video_codec("libx265");
    let args = args_of(&build_record_command(&cfg, Path::new("out.mkv")));

    let after = |flag: &str| {
        let pos = args.iter().position(|a| a == flag).expect(flag);
        args[pos + 1].clone()
    };
    assert_eq!(after("-f"), "rawvideo");
    assert_eq!(after("-i"), "pipe:0");
    assert_eq!(after("-s"), "1920x1080");
    assert_eq!(after("-r"), "60");
    assert_eq!(after("-c:v"), "libx265");
    assert_eq!(after("-b:v"), "2000k");
    assert_eq!(args.last().map(String::as_str), Some("out.mkv"));
}

#[test]
fn test_record_command_pixel_formats() {
    let cfg = RecordingConfig::new(320, 240, 30.0)
        .with_pixel_formats(PixelFormat::Bgra, PixelFormat::Gray);
    let args = args_of(&build_record_command(&cfg, Path::new("out.mp4")));

    let formats: Vec<&String> = args
        .iter()
        .enumerate()
        .filter(|(i, _)| *i > 0 && args[i - 1] == "-pix_fmt")
        .map(|(_, a)| a)
        .collect();
    assert_eq!(formats, vec!["bgra", "gray"]);
}

#[test]
fn test_cleared_additional_args_are_not_emitted() {
    let mut cfg = RecordingConfig::new(320, 240, 30.0);
    cfg.set_additional_input_args(vec!["-re".to_string()]);
    cfg.set_additional_output_args(vec!["-an".to_string()]);
    cfg.clear_additional_args();

    let args = args_of(&build_record_command(&cfg, Path::new("out.mp4")));
    assert!(!args.contains(&"-re".to_string()));
    assert!(!args.contains(&"-an".to_string()));
}

#[test]
fn test_missing_encoder_binary_fails_to_start() {
    let dir = tempdir().unwrap();
    let config = RecordingConfig::new(320, 240, 30.0)
        .with_ffmpeg_path(dir.path().join("no-such-ffmpeg"))
        .with_output_path(dir.path().join("out.mp4"));
    let mut recorder = Recorder::new(config).unwrap();

    let err = recorder.start_custom_record().unwrap_err();
    assert!(err.is_io(), "unexpected error: {}", err);
    assert!(!recorder.is_recording());
}

// ═══════════════════════════════════════════════════════════════════════════
// THUMBNAILS
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_timestamp_formatting() {
    assert_eq!(format_timestamp(0, 0, 0.0), "00:00:00.000");
    assert_eq!(format_timestamp(1, 2, 3.5), "01:02:03.500");
    assert_eq!(format_timestamp(10, 59, 59.25), "10:59:59.250");
}

#[test]
fn test_thumbnail_command_seeks_before_input() {
    let request = ThumbnailRequest::new(0, 1, 30.0, "thumb.png");
    let args = args_of(&build_thumbnail_command(
        Path::new("ffmpeg"),
        &request,
        Path::new("clip.mp4"),
    ));

    let pos = |a: &str| args.iter().position(|x| x == a).unwrap();
    assert!(pos("-ss") < pos("-i"));
    assert_eq!(args[pos("-ss") + 1], "00:01:30.000");
    assert_eq!(args[pos("-frames:v") + 1], "1");
    assert_eq!(args.last().map(String::as_str), Some("thumb.png"));
}

#[test]
fn test_thumbnail_crop_and_scale() {
    let request = ThumbnailRequest::new(0, 0, 1.0, "thumb.png")
        .with_crop(Rect::new(10, 20, 100, 50))
        .with_size(200, 100);
    let args = args_of(&build_thumbnail_command(
        Path::new("ffmpeg"),
        &request,
        Path::new("clip.mp4"),
    ));

    let filter = &args[args.iter().position(|a| a == "-vf").unwrap() + 1];
    assert!(filter.contains("crop=100:50:10:20"));
    assert!(filter.contains("scale=200:100"));
    assert!(filter.find("crop").unwrap() < filter.find("scale").unwrap());
}

#[test]
fn test_thumbnail_from_missing_recording() {
    let dir = tempdir().unwrap();
    let config = RecordingConfig::default().with_output_path(dir.path().join("out.mp4"));
    let recorder = Recorder::new(config).unwrap();

    let request = ThumbnailRequest::new(0, 0, 0.0, dir.path().join("thumb.png"))
        .with_source(dir.path().join("missing.mp4"));
    let err = recorder.save_thumbnail(&request).unwrap_err();
    assert!(matches!(err, RecorderError::Io { .. }), "unexpected error: {}", err);
}

// ═══════════════════════════════════════════════════════════════════════════
// CONFIGURATION FILES
// ═══════════════════════════════════════════════════════════════════════════

#[test]
fn test_config_toml_roundtrip() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("nested").join("recording.toml");

    let mut config = RecordingConfig::new(800, 600, 24.0)
        .with_bitrate(3500)
        .with_output_path("/videos/take1.mp4")
        .with_default_device(VideoDevice::new("/dev/video0", "USB Camera"))
        .with_backlog(BacklogPolicy::DropOldest { max_backlog: 8 });
    config.add_additional_output_arg("-movflags");
    config.add_additional_output_arg("+faststart");

    config.save_to_file(&path).unwrap();
    let loaded = RecordingConfig::load_from_file(&path).unwrap();
    assert_eq!(loaded, config);
}

#[test]
fn test_missing_config_file_gives_defaults() {
    let dir = tempdir().unwrap();
    let loaded = RecordingConfig::load_from_file(dir.path().join("absent.toml")).unwrap();
    assert_eq!(loaded, RecordingConfig::default());
}

#[test]
fn test_partial_config_file_fills_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("partial.toml");
    std::fs::write(&path, "width = 320\nheight = 240\nfps = 15.0\n").unwrap();

    let loaded = RecordingConfig::load_from_file(&path).unwrap();
    assert_eq!((loaded.width, loaded.height, loaded.fps), (320, 240, 15.0));
    assert_eq!(loaded.video_codec, "libx264");
    assert_eq!(loaded.backlog, BacklogPolicy::Unbounded);
}

#[test]
fn test_malformed_config_file() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "width = \"wide\"").unwrap();

    assert!(matches!(
        RecordingConfig::load_from_file(&path),
        Err(RecorderError::Config(_))
    ));
}

#[test]
fn test_config_validation() {
    assert!(RecordingConfig::default().validate().is_ok());
    assert!(RecordingConfig::new(640, 0, 30.0).validate().is_err());
    assert!(RecordingConfig::new(640, 480, 0.0).validate().is_err());
    assert!(RecordingConfig::new(640, 480, 500.0).validate().is_err());
    assert!(RecordingConfig::new(640, 480, 30.0).with_bitrate(0).validate().is_err());
    assert!(RecordingConfig::new(640, 480, 30.0)
        .with_video_codec(" ")
        .validate()
        .is_err());
    assert!(RecordingConfig::new(640, 480, 30.0)
        .with_backlog(BacklogPolicy::DropOldest { max_backlog: 0 })
        .validate()
        .is_err());
}

#[test]
fn test_out_of_range_capture_duration_is_rejected() {
    for secs in [1e30, f64::INFINITY, f64::NAN, -1.0] {
        let mut config = RecordingConfig::new(640, 480, 30.0);
        config.capture_duration_secs = secs;

        assert!(matches!(config.validate(), Err(RecorderError::Config(_))), "{}", secs);
        assert_eq!(config.capture_duration(), None);
        assert!(matches!(Recorder::new(config), Err(RecorderError::Config(_))));
    }

    let dir = tempdir().unwrap();
    let path = dir.path().join("huge.toml");
    std::fs::write(&path, "capture_duration_secs = 1e30\n").unwrap();
    assert!(matches!(
        RecordingConfig::load_from_file(&path),
        Err(RecorderError::Config(_))
    ));
}
