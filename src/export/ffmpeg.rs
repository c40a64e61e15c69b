//! ffmpeg child-process backend: raw `rgb24` frames in on stdin, `mpeg4` out.

use super::{MediaBackend, VideoSink};
use crate::capture::Frame;
use crate::log_debug;
use anyhow::{anyhow, bail, Context, Result};
use std::collections::VecDeque;
use std::ffi::OsString;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, ChildStdin, Command, Stdio};
use std::thread::{self, JoinHandle};

/// Codec for the live recording and pre-mux clips.
const VIDEO_CODEC: &str = "mpeg4";
/// libx264 with 4:2:0 chroma needs even dimensions.
const EVEN_SCALE: &str = "scale=trunc(iw/2)*2:trunc(ih/2)*2";
/// Bytes of encoder stderr kept for error reports.
const STDERR_TAIL_BYTES: usize = 8 * 1024;

/// Resolve a working ffmpeg binary: ffmpeg-sidecar's path first, then `PATH`.
pub fn find_ffmpeg() -> Option<PathBuf> {
    let sidecar_path = ffmpeg_sidecar::paths::ffmpeg_path();
    if binary_runs(&sidecar_path) {
        log_debug(&format!("ffmpeg: using sidecar path {}", sidecar_path.display()));
        return Some(sidecar_path);
    }
    let binary_name = if cfg!(windows) { "ffmpeg.exe" } else { "ffmpeg" };
    let path = find_in_system_path(binary_name)?;
    if binary_runs(&path) {
        log_debug(&format!("ffmpeg: using system PATH {}", path.display()));
        return Some(path);
    }
    None
}

fn binary_runs(path: &Path) -> bool {
    Command::new(path)
        .arg("-version")
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .status()
        .map(|status| status.success())
        .unwrap_or(false)
}

fn find_in_system_path(name: &str) -> Option<PathBuf> {
    let lookup = if cfg!(windows) { "where" } else { "which" };
    let output = Command::new(lookup).arg(name).output().ok()?;
    if !output.status.success() {
        return None;
    }
    let stdout = String::from_utf8_lossy(&output.stdout);
    let first = stdout.lines().next()?.trim();
    if first.is_empty() {
        return None;
    }
    Some(PathBuf::from(first))
}

#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    binary: PathBuf,
}

impl FfmpegBackend {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
        }
    }

    /// Use `override_cmd` when given, otherwise discover a binary.
    pub fn discover(override_cmd: Option<&Path>) -> Result<Self> {
        if let Some(path) = override_cmd {
            if !binary_runs(path) {
                bail!("ffmpeg at {} did not run", path.display());
            }
            return Ok(Self::new(path));
        }
        find_ffmpeg()
            .map(Self::new)
            .ok_or_else(|| anyhow!("ffmpeg not found; install it or pass --ffmpeg-cmd"))
    }

    pub fn binary(&self) -> &Path {
        &self.binary
    }

    fn base_command(&self) -> Command {
        let mut command = Command::new(&self.binary);
        command.args(["-y", "-hide_banner", "-loglevel", "error"]);
        command
    }
}

impl MediaBackend for FfmpegBackend {
    fn open_video(
        &self,
        path: &Path,
        width: u32,
        height: u32,
        fps: u32,
    ) -> Result<Box<dyn VideoSink>> {
        let mut command = self.base_command();
        command
            .args(["-f", "rawvideo", "-pix_fmt", "rgb24"])
            .arg("-s")
            .arg(format!("{width}x{height}"))
            .arg("-r")
            .arg(fps.to_string())
            .args(["-i", "-", "-an", "-c:v", VIDEO_CODEC, "-q:v", "5"])
            .arg(path)
            .stdin(Stdio::piped())
            .stdout(Stdio::null())
            .stderr(Stdio::piped());
        let mut child = command
            .spawn()
            .with_context(|| format!("failed to spawn {}", self.binary.display()))?;
        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| anyhow!("ffmpeg stdin was not captured"))?;
        let stderr = match child.stderr.take() {
            Some(stderr) => drain_stderr(stderr),
            None => {
                let _ = child.kill();
                let _ = child.wait();
                bail!("ffmpeg stderr was not captured");
            }
        };
        Ok(Box::new(FfmpegVideoWriter {
            child: Some(child),
            stdin: Some(stdin),
            stderr: Some(stderr),
            path: path.to_path_buf(),
            frame_len: width as usize * height as usize * 3,
            frames: 0,
        }))
    }

    fn mux(&self, video: &Path, audio: &Path, output: &Path, fps: u32) -> Result<()> {
        let args: Vec<OsString> = vec![
            "-i".into(),
            video.into(),
            "-i".into(),
            audio.into(),
            "-map".into(),
            "0:v:0".into(),
            "-map".into(),
            "1:a:0".into(),
            "-vf".into(),
            EVEN_SCALE.into(),
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-r".into(),
            fps.to_string().into(),
            "-c:a".into(),
            "aac".into(),
            "-shortest".into(),
            output.into(),
        ];
        let result = self
            .base_command()
            .args(&args)
            .stdin(Stdio::null())
            .output()
            .with_context(|| format!("failed to spawn {}", self.binary.display()))?;
        if !result.status.success() {
            bail!(
                "ffmpeg merge exited with {}: {}",
                result.status,
                String::from_utf8_lossy(&result.stderr).trim()
            );
        }
        Ok(())
    }
}

/// Reads a child's stderr to EOF on its own thread so the encoder never
/// blocks on a full pipe. Yields the last [`STDERR_TAIL_BYTES`] as text.
pub(super) fn drain_stderr<R: Read + Send + 'static>(mut reader: R) -> JoinHandle<String> {
    thread::spawn(move || {
        let mut tail = VecDeque::with_capacity(STDERR_TAIL_BYTES);
        let mut chunk = [0u8; 4096];
        loop {
            match reader.read(&mut chunk) {
                Ok(0) => break,
                Ok(read) => {
                    tail.extend(&chunk[..read]);
                    let excess = tail.len().saturating_sub(STDERR_TAIL_BYTES);
                    tail.drain(..excess);
                }
                Err(err) if err.kind() == std::io::ErrorKind::Interrupted => continue,
                Err(err) => {
                    log_debug(&format!("ffmpeg stderr read failed: {err}"));
                    break;
                }
            }
        }
        String::from_utf8_lossy(tail.make_contiguous()).trim().to_string()
    })
}

fn join_stderr(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

struct FfmpegVideoWriter {
    child: Option<Child>,
    stdin: Option<ChildStdin>,
    stderr: Option<JoinHandle<String>>,
    path: PathBuf,
    frame_len: usize,
    frames: u64,
}

impl VideoSink for FfmpegVideoWriter {
    fn write_frame(&mut self, frame: &Frame) -> Result<()> {
        let bytes = frame.as_bytes();
        if bytes.len() != self.frame_len {
            bail!(
                "frame {} is {}x{}, writer for {} expects {} bytes",
                frame.seq(),
                frame.width(),
                frame.height(),
                self.path.display(),
                self.frame_len
            );
        }
        let stdin = self
            .stdin
            .as_mut()
            .ok_or_else(|| anyhow!("writer for {} already closed", self.path.display()))?;
        stdin
            .write_all(bytes)
            .with_context(|| format!("ffmpeg stopped accepting frames for {}", self.path.display()))?;
        self.frames += 1;
        Ok(())
    }

    fn finish(mut self: Box<Self>) -> Result<()> {
        drop(self.stdin.take());
        let mut child = self
            .child
            .take()
            .ok_or_else(|| anyhow!("writer for {} already finished", self.path.display()))?;
        let status = child
            .wait()
            .with_context(|| format!("failed to wait for ffmpeg writing {}", self.path.display()))?;
        let stderr = join_stderr(self.stderr.take());
        if !status.success() {
            bail!(
                "ffmpeg exited with {} writing {}: {}",
                status,
                self.path.display(),
                stderr
            );
        }
        log_debug(&format!(
            "ffmpeg: wrote {} frames to {}",
            self.frames,
            self.path.display()
        ));
        Ok(())
    }
}

impl Drop for FfmpegVideoWriter {
    fn drop(&mut self) {
        drop(self.stdin.take());
        if let Some(mut child) = self.child.take() {
            let _ = child.kill();
            let _ = child.wait();
        }
        join_stderr(self.stderr.take());
    }
}
