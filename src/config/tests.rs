use super::validation::{sanitize_binary, validate_app_id};
use super::{AppConfig, CaptureSettings, DEFAULT_CLIP_SECONDS, DEFAULT_FPS};
use clap::Parser;
use std::time::Duration;
use tempfile::tempdir;

fn base_config(extra: &[&str]) -> AppConfig {
    let mut args = vec!["test-app", "--app-id", "demo.app-1", "--output-root", "."];
    args.extend_from_slice(extra);
    AppConfig::parse_from(args)
}

#[test]
fn defaults_match_replay_window() {
    let mut cfg = base_config(&[]);
    cfg.validate().unwrap();
    assert_eq!(cfg.fps, DEFAULT_FPS);
    assert_eq!(cfg.clip_seconds, DEFAULT_CLIP_SECONDS);
    let settings = cfg.capture_settings();
    assert_eq!(settings.capacity(), 300);
    assert!(!settings.record_audio);
    assert_eq!(settings, CaptureSettings::default());
}

#[test]
fn frame_interval_follows_fps() {
    let settings = CaptureSettings {
        fps: 15,
        ..CaptureSettings::default()
    };
    assert_eq!(settings.frame_interval(), Duration::from_nanos(66_666_666));
    let settings = CaptureSettings {
        fps: 60,
        clip_seconds: 2,
        record_audio: true,
        log_timings: false,
    };
    assert_eq!(settings.capacity(), 120);
}

#[test]
fn rejects_fps_out_of_bounds() {
    let mut cfg = base_config(&["--fps", "0"]);
    assert!(cfg.validate().is_err());
    let mut cfg = base_config(&["--fps", "61"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn accepts_fps_and_clip_bounds() {
    for args in [
        ["--fps", "1"],
        ["--fps", "60"],
        ["--clip-seconds", "1"],
        ["--clip-seconds", "120"],
    ] {
        let mut cfg = base_config(&args);
        assert!(cfg.validate().is_ok(), "{args:?}");
    }
}

#[test]
fn rejects_clip_seconds_out_of_bounds() {
    let mut cfg = base_config(&["--clip-seconds", "0"]);
    assert!(cfg.validate().is_err());
    let mut cfg = base_config(&["--clip-seconds", "121"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn app_id_must_be_filename_safe() {
    assert!(validate_app_id("B07XYZ1234").is_ok());
    assert!(validate_app_id("com.example_app-2").is_ok());
    assert!(validate_app_id("").is_err());
    assert!(validate_app_id("has space").is_err());
    assert!(validate_app_id("../escape").is_err());
    assert!(validate_app_id("..").is_err());
    assert!(validate_app_id(&"a".repeat(65)).is_err());
}

#[test]
fn recording_requires_app_id_but_listing_does_not() {
    let mut cfg = AppConfig::parse_from(["test-app", "--output-root", "."]);
    if cfg.app_id.is_none() {
        let err = cfg.validate().unwrap_err();
        assert!(err.to_string().contains("--app-id"));
    }

    let mut cfg = AppConfig::parse_from(["test-app", "--list-input-devices"]);
    cfg.app_id = None;
    assert!(cfg.validate().is_ok());
}

#[test]
fn log_commands_are_parsed_unless_disabled() {
    let mut cfg = base_config(&[]);
    cfg.validate().unwrap();
    let tool = cfg.log_tool.as_ref().unwrap();
    assert_eq!(tool.program(), "adb");
    assert_eq!(tool.args(), ["-s", "127.0.0.1:58526", "logcat"]);
    assert_eq!(cfg.connect_tool.as_ref().unwrap().args(), ["connect", "127.0.0.1:58526"]);

    assert_eq!(
        cfg.clear_tool.as_ref().unwrap().args(),
        ["-s", "127.0.0.1:58526", "logcat", "-c"]
    );

    let mut cfg = base_config(&["--log-connect-cmd", "", "--log-clear-cmd", " "]);
    cfg.validate().unwrap();
    assert!(cfg.connect_tool.is_none());
    assert!(cfg.clear_tool.is_none());
    assert!(cfg.log_tool.is_some());

    let mut cfg = base_config(&["--no-device-logs", "--log-cmd", "'broken"]);
    cfg.validate().unwrap();
    assert!(cfg.log_tool.is_none());
    assert!(cfg.clear_tool.is_none());
}

#[test]
fn rejects_unparseable_log_command() {
    let mut cfg = base_config(&["--log-cmd", "adb 'unterminated"]);
    assert!(cfg.validate().is_err());
    let mut cfg = base_config(&["--log-cmd", "adb;rm logcat"]);
    assert!(cfg.validate().is_err());
}

#[test]
fn accepts_windows_tool_paths() {
    let mut cfg = base_config(&[
        "--log-cmd",
        r"'C:\platform-tools\adb.exe' -s 127.0.0.1:58526 logcat",
        "--log-clear-cmd",
        r"'C:\platform-tools\adb.exe' logcat -c",
    ]);
    cfg.validate().unwrap();
    assert_eq!(
        cfg.log_tool.as_ref().unwrap().program(),
        r"C:\platform-tools\adb.exe"
    );
    assert_eq!(cfg.clear_tool.as_ref().unwrap().args(), ["logcat", "-c"]);
}

#[test]
fn rejects_control_characters_in_device_name() {
    let mut cfg = base_config(&["--input-device", "mic\u{7}"]);
    assert!(cfg.validate().is_err());
    let mut cfg = base_config(&["--input-device", "USB Audio (hw:1,0)"]);
    assert!(cfg.validate().is_ok());
}

#[test]
fn output_root_must_be_a_directory() {
    let dir = tempdir().unwrap();
    let file = dir.path().join("not-a-dir");
    std::fs::write(&file, b"x").unwrap();
    let file_arg = file.to_string_lossy().into_owned();
    let mut cfg = base_config(&["--output-root", &file_arg]);
    assert!(cfg.validate().is_err());

    let dir_arg = dir.path().to_string_lossy().into_owned();
    let mut cfg = base_config(&["--output-root", &dir_arg]);
    cfg.validate().unwrap();
    assert_eq!(cfg.resolved_output_root().unwrap(), dir.path());
}

#[test]
fn ffmpeg_cmd_accepts_allowlisted_name() {
    assert_eq!(
        sanitize_binary(" FFMPEG ", "--ffmpeg-cmd", &["ffmpeg"]).unwrap(),
        "ffmpeg"
    );
    assert!(sanitize_binary("", "--ffmpeg-cmd", &["ffmpeg"]).is_err());
    assert!(sanitize_binary("avconv", "--ffmpeg-cmd", &["ffmpeg"]).is_err());
}

#[cfg(unix)]
#[test]
fn ffmpeg_cmd_rejects_non_executable_path() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("ffmpeg");
    std::fs::write(&path, b"#!/bin/sh\n").unwrap();
    let arg = path.to_string_lossy().into_owned();
    assert!(sanitize_binary(&arg, "--ffmpeg-cmd", &["ffmpeg"]).is_err());

    use std::os::unix::fs::PermissionsExt;
    std::fs::set_permissions(&path, std::fs::Permissions::from_mode(0o755)).unwrap();
    assert!(sanitize_binary(&arg, "--ffmpeg-cmd", &["ffmpeg"]).is_ok());
}

#[test]
fn log_timings_reaches_capture_settings() {
    let cfg = base_config(&["--log-timings"]);
    assert!(cfg.capture_settings().log_timings);
    assert!(cfg.logging_enabled());
    assert!(!base_config(&[]).capture_settings().log_timings);
}

#[test]
fn logging_switches_combine() {
    let cfg = base_config(&["--logs"]);
    assert!(cfg.logging_enabled() || cfg.no_logs);
    let cfg = base_config(&["--log-timings", "--no-logs"]);
    assert!(!cfg.logging_enabled());
    let mut cfg = base_config(&[]);
    cfg.logs = false;
    cfg.log_timings = false;
    assert!(!cfg.logging_enabled());
}
