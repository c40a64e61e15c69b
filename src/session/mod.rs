//! Recording session: identity, counters, lifecycle, and the capture loop.

mod clock;
mod controller;
#[cfg(test)]
mod tests;

use crate::export::{self, ClipPaths, ExportKind};
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub use clock::{Clock, FramePacer, SystemClock};
pub use controller::{CaptureParts, SessionController, SessionReport};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Idle,
    Initializing,
    Recording,
    /// Transient: a clip is being handed off; the loop re-enters `Recording`.
    Exporting,
    Stopping,
    Terminated,
}

impl SessionState {
    pub fn label(self) -> &'static str {
        match self {
            SessionState::Idle => "idle",
            SessionState::Initializing => "initializing",
            SessionState::Recording => "recording",
            SessionState::Exporting => "exporting",
            SessionState::Stopping => "stopping",
            SessionState::Terminated => "terminated",
        }
    }
}

/// Why the capture loop ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    ExitKey,
    /// Display or microphone stopped producing data.
    CaptureFailed(String),
    /// The whole-session recording could not be opened or written.
    LiveWriterFailed(String),
    /// Session plumbing (the export thread) could not be started.
    StartupFailed(String),
}

impl StopReason {
    pub fn label(&self) -> &'static str {
        match self {
            StopReason::ExitKey => "exit key",
            StopReason::CaptureFailed(_) => "capture failed",
            StopReason::LiveWriterFailed(_) => "live writer failed",
            StopReason::StartupFailed(_) => "startup failed",
        }
    }

    pub fn detail(&self) -> Option<&str> {
        match self {
            StopReason::ExitKey => None,
            StopReason::CaptureFailed(msg)
            | StopReason::LiveWriterFailed(msg)
            | StopReason::StartupFailed(msg) => Some(msg),
        }
    }

    /// Process exit code: 0 only for an operator-requested stop.
    pub fn exit_code(&self) -> i32 {
        match self {
            StopReason::ExitKey => 0,
            _ => 1,
        }
    }
}

/// Per-session identity and artifact counters.
///
/// `bug_counter` stays unset until the first clip is actually dispatched, so an
/// empty or rejected export never consumes a number.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Session {
    app_id: String,
    timestamp: String,
    output_folder: PathBuf,
    bug_counter: Option<u32>,
    screenshot_counter: u32,
    record_audio: bool,
}

impl Session {
    /// Create `{root}/{app}_{timestamp}` and a session rooted there.
    pub fn create(root: &Path, app_id: &str, record_audio: bool) -> Result<Self> {
        Self::create_with_timestamp(root, app_id, &export::timestamp(), record_audio)
    }

    pub fn create_with_timestamp(
        root: &Path,
        app_id: &str,
        timestamp: &str,
        record_audio: bool,
    ) -> Result<Self> {
        let output_folder = export::session_folder(root, app_id, timestamp);
        fs::create_dir_all(&output_folder).with_context(|| {
            format!("failed to create output folder {}", output_folder.display())
        })?;
        Ok(Self {
            app_id: app_id.to_string(),
            timestamp: timestamp.to_string(),
            output_folder,
            bug_counter: None,
            screenshot_counter: 1,
            record_audio,
        })
    }

    pub fn app_id(&self) -> &str {
        &self.app_id
    }

    pub fn output_folder(&self) -> &Path {
        &self.output_folder
    }

    pub fn record_audio(&self) -> bool {
        self.record_audio
    }

    pub fn bug_counter(&self) -> Option<u32> {
        self.bug_counter
    }

    pub fn screenshot_counter(&self) -> u32 {
        self.screenshot_counter
    }

    /// Number the next clip will carry; the first clip of a session is 1.
    pub fn next_clip_number(&self) -> u32 {
        self.bug_counter.unwrap_or(1)
    }

    pub fn clip_dispatched(&mut self) {
        self.bug_counter = Some(self.next_clip_number() + 1);
    }

    pub fn screenshot_dispatched(&mut self) {
        self.screenshot_counter += 1;
    }

    pub fn full_session_path(&self) -> PathBuf {
        export::full_session_path(&self.output_folder, &self.app_id, &self.timestamp)
    }

    pub fn device_log_path(&self) -> PathBuf {
        export::device_log_path(&self.output_folder, &self.app_id, &self.timestamp)
    }

    pub fn screenshot_path(&self) -> PathBuf {
        export::screenshot_path(&self.output_folder, self.screenshot_counter)
    }

    pub fn clip_paths(&self, number: u32, timestamp: &str) -> ClipPaths {
        ClipPaths::new(
            &self.output_folder,
            &self.app_id,
            ExportKind::Clip(number),
            timestamp,
        )
    }
}
