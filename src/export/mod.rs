//! Artifact naming, media backends, and the clip/screenshot exporter.
//!
//! The capture thread never encodes anything itself: it builds an
//! [`ExportJob`] (cheap `Arc<Frame>` clones plus the drained audio) and hands it
//! to the [`ExportWorker`], which runs [`ClipExporter`] on its own thread.

mod ffmpeg;
mod wav;
mod worker;

use crate::audio::{concat_chunks, AudioChunk, AudioFormat};
use crate::capture::{Frame, SharedFrame};
use crate::log_debug;
use anyhow::{bail, Context, Result};
use chrono::Local;
use image::ImageFormat;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

pub use ffmpeg::{find_ffmpeg, FfmpegBackend};
pub use wav::write_wav;
pub use worker::{ExportJob, ExportOutcome, ExportWorker, DEFAULT_QUEUE_DEPTH};

/// Local-time stamp embedded in every artifact name.
pub const TIMESTAMP_FORMAT: &str = "Time_%H-%M-%S_Date_%Y-%m-%d";

pub const VIDEO_EXTENSION: &str = "mp4";
pub const AUDIO_EXTENSION: &str = "wav";
pub const LOG_EXTENSION: &str = "log";

pub fn timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// Which call site produced a video artifact. Passed explicitly by the caller;
/// never inferred from counter state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportKind {
    /// The continuous whole-session recording.
    FullSession,
    /// The Nth on-demand replay clip, starting at 1.
    Clip(u32),
}

impl ExportKind {
    pub fn label(self) -> String {
        match self {
            ExportKind::FullSession => "Full Testing Video".to_string(),
            ExportKind::Clip(n) => format!("Bug{n}"),
        }
    }
}

/// `{app}_{label}_{timestamp}` with no extension.
pub fn artifact_stem(app_id: &str, kind: ExportKind, timestamp: &str) -> String {
    format!("{app_id}_{}_{timestamp}", kind.label())
}

/// `{root}/{app}_{timestamp}`; every artifact of one session lands here.
pub fn session_folder(root: &Path, app_id: &str, timestamp: &str) -> PathBuf {
    root.join(format!("{app_id}_{timestamp}"))
}

pub fn full_session_path(folder: &Path, app_id: &str, timestamp: &str) -> PathBuf {
    folder.join(format!(
        "{}.{VIDEO_EXTENSION}",
        artifact_stem(app_id, ExportKind::FullSession, timestamp)
    ))
}

pub fn screenshot_path(folder: &Path, number: u32) -> PathBuf {
    folder.join(format!("screenshot_{number}.png"))
}

pub fn device_log_path(folder: &Path, app_id: &str, timestamp: &str) -> PathBuf {
    folder.join(format!("{app_id}_logs_{timestamp}.{LOG_EXTENSION}"))
}

/// Final and intermediate paths for one clip export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipPaths {
    /// What the operator gets: the muxed clip, or the plain video when there is no audio.
    pub output: PathBuf,
    /// Pre-mux video, removed after a successful mux.
    pub video: PathBuf,
    /// PCM intermediate, removed after a successful mux.
    pub audio: PathBuf,
}

impl ClipPaths {
    pub fn new(folder: &Path, app_id: &str, kind: ExportKind, timestamp: &str) -> Self {
        let stem = artifact_stem(app_id, kind, timestamp);
        Self {
            output: folder.join(format!("{stem}.{VIDEO_EXTENSION}")),
            video: folder.join(format!("{stem}_video.{VIDEO_EXTENSION}")),
            audio: folder.join(format!("{stem}.{AUDIO_EXTENSION}")),
        }
    }
}

/// Incremental video encoder for one output file.
pub trait VideoSink: Send {
    fn write_frame(&mut self, frame: &Frame) -> Result<()>;

    /// Flush and close the container. The file is only valid after this returns `Ok`.
    fn finish(self: Box<Self>) -> Result<()>;
}

/// Video encoding and audio/video muxing.
pub trait MediaBackend: Send + Sync {
    fn open_video(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn VideoSink>>;

    /// Combine `video` and `audio` into `output`; the shorter stream bounds duration.
    fn mux(&self, video: &Path, audio: &Path, output: &Path, fps: u32) -> Result<()>;
}

/// Everything needed to write one replay clip, detached from the live buffers.
#[derive(Debug, Clone)]
pub struct ClipJob {
    pub kind: ExportKind,
    pub paths: ClipPaths,
    pub frames: Vec<SharedFrame>,
    pub audio: Vec<AudioChunk>,
    pub audio_format: AudioFormat,
}

/// Result of a finished clip.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClipReport {
    pub path: PathBuf,
    pub frames: usize,
    pub samples: usize,
    pub muxed: bool,
}

pub struct ClipExporter {
    backend: Arc<dyn MediaBackend>,
    fps: u32,
}

impl ClipExporter {
    pub fn new(backend: Arc<dyn MediaBackend>, fps: u32) -> Self {
        Self {
            backend,
            fps: fps.max(1),
        }
    }

    pub fn save_screenshot(&self, frame: &Frame, path: &Path) -> Result<()> {
        frame
            .image()
            .save_with_format(path, ImageFormat::Png)
            .with_context(|| format!("failed to write screenshot {}", path.display()))
    }

    /// Write the clip's frames, and when audio is present mux it in and remove
    /// both intermediates. An empty frame list is rejected before any file is touched.
    pub fn export_clip(&self, job: ClipJob) -> Result<ClipReport> {
        let ClipJob {
            kind,
            paths,
            frames,
            audio,
            audio_format,
        } = job;
        let Some(first) = frames.first() else {
            bail!("nothing to export for {}", kind.label());
        };
        let (width, height) = (first.width(), first.height());
        let started = Instant::now();

        if audio.is_empty() {
            self.write_video(&paths.output, &frames, width, height)?;
            return Ok(ClipReport {
                path: paths.output,
                frames: frames.len(),
                samples: 0,
                muxed: false,
            });
        }

        self.write_video(&paths.video, &frames, width, height)?;
        let samples = concat_chunks(audio);
        write_wav(&paths.audio, audio_format, &samples)?;
        self.backend
            .mux(&paths.video, &paths.audio, &paths.output, self.fps)
            .with_context(|| format!("failed to merge {}", paths.output.display()))?;
        for intermediate in [&paths.video, &paths.audio] {
            if let Err(err) = fs::remove_file(intermediate) {
                log_debug(&format!(
                    "failed to remove intermediate {}: {err}",
                    intermediate.display()
                ));
            }
        }
        log_debug(&format!(
            "clip {} muxed in {} ms",
            kind.label(),
            started.elapsed().as_millis()
        ));
        Ok(ClipReport {
            path: paths.output,
            frames: frames.len(),
            samples: samples.len(),
            muxed: true,
        })
    }

    fn write_video(
        &self,
        path: &Path,
        frames: &[SharedFrame],
        width: u32,
        height: u32,
    ) -> Result<()> {
        let mut sink = self
            .backend
            .open_video(path, width, height, self.fps)
            .with_context(|| format!("failed to open video writer for {}", path.display()))?;
        for frame in frames {
            sink.write_frame(frame)?;
        }
        sink.finish()
            .with_context(|| format!("failed to finalize {}", path.display()))
    }
}
