//! Command-line parsing and validation helpers.

mod defaults;
#[cfg(test)]
mod tests;
mod validation;

use crate::logcat::{
    default_clear_command, default_connect_command, default_log_command, ToolCommand,
};
use clap::Parser;
use std::path::PathBuf;
use std::time::Duration;

pub use defaults::{
    DEFAULT_CLIP_SECONDS, DEFAULT_FPS, MAX_CLIP_SECONDS, MAX_FPS, MIN_CLIP_SECONDS, MIN_FPS,
};

/// CLI options for a bugreel session. Validated values are safe to embed in
/// filenames and child-process argument lists.
#[derive(Debug, Parser, Clone)]
#[command(
    name = "bugreel",
    about = "Rolling screen and microphone capture with on-demand bug clips",
    author,
    version
)]
pub struct AppConfig {
    /// Label for this test session; prefixes the output folder and every artifact
    #[arg(long = "app-id", env = "BUGREEL_APP_ID", value_name = "ID")]
    pub app_id: Option<String>,

    /// Record microphone audio into the rolling buffer
    #[arg(long, default_value_t = false)]
    pub audio: bool,

    /// Preferred audio input device name
    #[arg(long, value_name = "NAME")]
    pub input_device: Option<String>,

    /// Print detected audio input devices and exit
    #[arg(long = "list-input-devices", default_value_t = false)]
    pub list_input_devices: bool,

    /// Print attached displays and exit
    #[arg(long = "list-displays", default_value_t = false)]
    pub list_displays: bool,

    /// Capture cadence in frames per second
    #[arg(long, default_value_t = DEFAULT_FPS)]
    pub fps: u32,

    /// Length of the rolling window saved by each clip
    #[arg(long = "clip-seconds", default_value_t = DEFAULT_CLIP_SECONDS)]
    pub clip_seconds: u32,

    /// Directory that receives the per-session folder (default: Downloads)
    #[arg(long = "output-root", value_name = "DIR")]
    pub output_root: Option<PathBuf>,

    /// ffmpeg binary to use instead of discovering one
    #[arg(long = "ffmpeg-cmd", value_name = "PATH")]
    pub ffmpeg_cmd: Option<String>,

    /// Device log stream command; stdout is appended to the session log file.
    /// Single-quote program paths that contain backslashes.
    #[arg(long = "log-cmd", default_value_t = default_log_command(), value_name = "CMD")]
    pub log_cmd: String,

    /// Command run once before the log stream starts (empty to skip)
    #[arg(
        long = "log-connect-cmd",
        default_value_t = default_connect_command(),
        value_name = "CMD"
    )]
    pub log_connect_cmd: String,

    /// Command that wipes the device's log backlog before streaming (empty to skip)
    #[arg(
        long = "log-clear-cmd",
        default_value_t = default_clear_command(),
        value_name = "CMD"
    )]
    pub log_clear_cmd: String,

    /// Do not capture device logs
    #[arg(long = "no-device-logs", default_value_t = false)]
    pub no_device_logs: bool,

    /// Enable file logging (debug)
    #[arg(long = "logs", env = "BUGREEL_LOGS", default_value_t = false)]
    pub logs: bool,

    /// Disable all file logging (overrides --logs and log env vars)
    #[arg(long = "no-logs", env = "BUGREEL_NO_LOGS", default_value_t = false)]
    pub no_logs: bool,

    /// Log per-tick capture timings and clip export durations (implies --logs)
    #[arg(long)]
    pub log_timings: bool,

    /// Parsed `--log-cmd`, populated by `validate`.
    #[arg(skip)]
    pub log_tool: Option<ToolCommand>,

    /// Parsed `--log-connect-cmd`, populated by `validate`.
    #[arg(skip)]
    pub connect_tool: Option<ToolCommand>,

    /// Parsed `--log-clear-cmd`, populated by `validate`.
    #[arg(skip)]
    pub clear_tool: Option<ToolCommand>,
}

impl AppConfig {
    pub fn logging_enabled(&self) -> bool {
        (self.logs || self.log_timings) && !self.no_logs
    }

    /// Whether this invocation only prints information and exits.
    pub fn is_listing(&self) -> bool {
        self.list_input_devices || self.list_displays
    }

    pub fn capture_settings(&self) -> CaptureSettings {
        CaptureSettings {
            fps: self.fps,
            clip_seconds: self.clip_seconds,
            record_audio: self.audio,
            log_timings: self.log_timings,
        }
    }
}

/// What the capture core consumes from the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CaptureSettings {
    pub fps: u32,
    pub clip_seconds: u32,
    pub record_audio: bool,
    /// Emit `timing|...` lines to the debug log.
    pub log_timings: bool,
}

impl Default for CaptureSettings {
    fn default() -> Self {
        Self {
            fps: DEFAULT_FPS,
            clip_seconds: DEFAULT_CLIP_SECONDS,
            record_audio: false,
            log_timings: false,
        }
    }
}

impl CaptureSettings {
    /// Ring capacity shared by the frame and audio-chunk buffers.
    pub fn capacity(&self) -> usize {
        self.fps.max(1) as usize * self.clip_seconds.max(1) as usize
    }

    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs(1) / self.fps.max(1)
    }
}
