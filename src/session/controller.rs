use super::{Clock, FramePacer, Session, SessionState, StopReason};
use crate::audio::{AudioCapture, AudioChunk, AudioFormat, PREFERRED_SAMPLE_RATE};
use crate::buffer::{RingBuffer, SharedRingBuffer};
use crate::capture::{FrameSource, SharedFrame};
use crate::config::CaptureSettings;
use crate::export::{
    self, ClipExporter, ClipJob, ExportJob, ExportKind, ExportOutcome, ExportWorker,
    MediaBackend, VideoSink, DEFAULT_QUEUE_DEPTH,
};
use crate::hotkeys::{Command, HotkeyRouter, KeyState};
use crate::log_debug;
use crate::logcat::{ClearOutcome, LogCaptureSession};
use crate::status::{key_bindings_help, StatusSink, Tone};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Collaborators a session drives. Platform code passes the real backends;
/// tests pass fakes.
pub struct CaptureParts {
    pub frames: Box<dyn FrameSource>,
    pub keys: Box<dyn KeyState>,
    pub clock: Box<dyn Clock>,
    pub backend: Arc<dyn MediaBackend>,
    /// Started only when the session records audio.
    pub audio: Option<Box<dyn AudioCapture>>,
    /// Ring the audio producer pushes into.
    pub audio_buffer: SharedRingBuffer<AudioChunk>,
    pub log_capture: Option<LogCaptureSession>,
    pub queue_depth: usize,
}

impl CaptureParts {
    pub fn new(
        frames: Box<dyn FrameSource>,
        keys: Box<dyn KeyState>,
        clock: Box<dyn Clock>,
        backend: Arc<dyn MediaBackend>,
        audio_buffer: SharedRingBuffer<AudioChunk>,
    ) -> Self {
        Self {
            frames,
            keys,
            clock,
            backend,
            audio: None,
            audio_buffer,
            log_capture: None,
            queue_depth: DEFAULT_QUEUE_DEPTH,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionReport {
    pub reason: StopReason,
    pub state: SessionState,
    pub frames_captured: u64,
    pub clips_saved: u32,
    pub screenshots_saved: u32,
    pub export_failures: u32,
    /// Whole-session recording, present when it was finalized.
    pub output: Option<PathBuf>,
}

/// Owns the buffers and sources and runs the single-threaded capture loop.
pub struct SessionController {
    session: Session,
    settings: CaptureSettings,
    parts: CaptureParts,
    state: SessionState,
    video_buffer: RingBuffer<SharedFrame>,
    router: HotkeyRouter,
    frames_captured: u64,
    clips_saved: u32,
    screenshots_saved: u32,
    export_failures: u32,
}

impl SessionController {
    pub fn new(session: Session, settings: CaptureSettings, parts: CaptureParts) -> Self {
        let capacity = settings.capacity();
        Self {
            session,
            settings,
            parts,
            state: SessionState::Idle,
            video_buffer: RingBuffer::new(capacity),
            router: HotkeyRouter::new(),
            frames_captured: 0,
            clips_saved: 0,
            screenshots_saved: 0,
            export_failures: 0,
        }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Run until the exit key or a fatal capture error, then shut everything down.
    pub fn run(mut self, status: &mut dyn StatusSink) -> SessionReport {
        self.transition(SessionState::Initializing);
        self.start_log_capture(status);

        let reason = match ExportWorker::spawn(
            ClipExporter::new(self.parts.backend.clone(), self.settings.fps),
            self.parts.queue_depth,
        ) {
            Ok(worker) => {
                let (reason, live) = match self.start_sources() {
                    Ok(mut live) => {
                        self.transition(SessionState::Recording);
                        status.report(Tone::Info, &key_bindings_help());
                        let reason = self.record(live.as_mut(), &worker, status);
                        (reason, Some(live))
                    }
                    Err(reason) => (reason, None),
                };
                self.transition(SessionState::Stopping);
                self.stop_sources();
                let reason = self.finish_live(live, reason, status);
                for outcome in worker.shutdown() {
                    self.report_outcome(outcome, status);
                }
                reason
            }
            Err(err) => {
                self.transition(SessionState::Stopping);
                self.stop_sources();
                StopReason::StartupFailed(format!("{err:#}"))
            }
        };
        self.transition(SessionState::Terminated);

        let full_session = self.session.full_session_path();
        let output = full_session.exists().then_some(full_session);
        match (&reason, &output) {
            (StopReason::ExitKey, Some(path)) => status.report(
                Tone::Success,
                &format!("Recording stopped. Output video saved as {}", path.display()),
            ),
            (_, Some(path)) => status.report(
                Tone::Error,
                &format!(
                    "Recording stopped ({}: {}). Output video saved as {}",
                    reason.label(),
                    reason.detail().unwrap_or_default(),
                    path.display()
                ),
            ),
            (_, None) => status.report(
                Tone::Error,
                &format!(
                    "Recording stopped ({}{}). Output video file could not be found.",
                    reason.label(),
                    reason
                        .detail()
                        .map(|detail| format!(": {detail}"))
                        .unwrap_or_default()
                ),
            ),
        }
        tracing::info!(
            reason = reason.label(),
            frames = self.frames_captured,
            clips = self.clips_saved,
            screenshots = self.screenshots_saved,
            failures = self.export_failures,
            "session finished"
        );

        SessionReport {
            reason,
            state: self.state,
            frames_captured: self.frames_captured,
            clips_saved: self.clips_saved,
            screenshots_saved: self.screenshots_saved,
            export_failures: self.export_failures,
            output,
        }
    }

    fn transition(&mut self, next: SessionState) {
        log_debug(&format!(
            "session state: {} -> {}",
            self.state.label(),
            next.label()
        ));
        tracing::debug!(from = self.state.label(), to = next.label(), "session state");
        self.state = next;
    }

    fn start_log_capture(&mut self, status: &mut dyn StatusSink) {
        let path = self.session.device_log_path();
        let Some(log_capture) = self.parts.log_capture.as_mut() else {
            return;
        };
        match log_capture.start(&path) {
            Ok(cleared) => {
                match cleared {
                    ClearOutcome::Cleared => status.report(Tone::Info, "Cleared previous logs."),
                    ClearOutcome::Failed(reason) => status.report(
                        Tone::Warning,
                        &format!("Could not clear previous device logs: {reason}"),
                    ),
                    ClearOutcome::Skipped => {}
                }
                status.report(
                    Tone::Info,
                    &format!("Started capturing device logs: {}", path.display()),
                );
            }
            Err(err) => status.report(
                Tone::Warning,
                &format!("Device logs unavailable, continuing without them: {err:#}"),
            ),
        }
    }

    fn start_sources(&mut self) -> Result<Box<dyn VideoSink>, StopReason> {
        if self.session.record_audio() {
            if let Some(audio) = self.parts.audio.as_mut() {
                audio
                    .start()
                    .map_err(|err| StopReason::CaptureFailed(format!("{err:#}")))?;
            }
        }
        let (width, height) = self.parts.frames.dimensions();
        let path = self.session.full_session_path();
        self.parts
            .backend
            .open_video(&path, width, height, self.settings.fps)
            .map_err(|err| {
                StopReason::LiveWriterFailed(format!("{}: {err:#}", path.display()))
            })
    }

    fn stop_sources(&mut self) {
        if let Some(audio) = self.parts.audio.as_mut() {
            audio.stop();
        }
        if let Some(log_capture) = self.parts.log_capture.as_mut() {
            log_capture.stop();
        }
    }

    fn finish_live(
        &mut self,
        live: Option<Box<dyn VideoSink>>,
        reason: StopReason,
        status: &mut dyn StatusSink,
    ) -> StopReason {
        let Some(live) = live else {
            return reason;
        };
        match live.finish() {
            Ok(()) => reason,
            Err(err) => {
                let message = format!("{err:#}");
                status.report(
                    Tone::Error,
                    &format!("Failed to finalize the session recording: {message}"),
                );
                match reason {
                    StopReason::ExitKey => StopReason::LiveWriterFailed(message),
                    other => other,
                }
            }
        }
    }

    fn record(
        &mut self,
        live: &mut dyn VideoSink,
        worker: &ExportWorker,
        status: &mut dyn StatusSink,
    ) -> StopReason {
        let pacer = FramePacer::new(self.settings.frame_interval());
        loop {
            let tick_start = self.parts.clock.now();
            for outcome in worker.drain_outcomes() {
                self.report_outcome(outcome, status);
            }
            if let Some(failure) = self.parts.audio.as_ref().and_then(|audio| audio.failure()) {
                return StopReason::CaptureFailed(format!("audio input failed: {failure}"));
            }

            let frame: SharedFrame = match self.parts.frames.capture_frame() {
                Ok(frame) => Arc::new(frame),
                Err(err) => return StopReason::CaptureFailed(format!("{err:#}")),
            };
            if let Err(err) = live.write_frame(&frame) {
                return StopReason::LiveWriterFailed(format!("{err:#}"));
            }
            self.frames_captured += 1;
            self.video_buffer.push(frame.clone());

            for command in self.router.poll(self.parts.keys.as_ref()) {
                match command {
                    Command::Exit => return StopReason::ExitKey,
                    Command::Screenshot => self.dispatch_screenshot(&frame, worker, status),
                    Command::SaveClip => self.dispatch_clip(worker, status),
                }
            }

            let work = self.parts.clock.now().saturating_duration_since(tick_start);
            let slept = pacer.pace(self.parts.clock.as_ref(), tick_start);
            if self.settings.log_timings {
                log_debug(&tick_timing_line(self.frames_captured, work, slept));
            }
        }
    }

    fn dispatch_screenshot(
        &mut self,
        frame: &SharedFrame,
        worker: &ExportWorker,
        status: &mut dyn StatusSink,
    ) {
        let number = self.session.screenshot_counter();
        let job = ExportJob::Screenshot {
            number,
            frame: frame.clone(),
            path: self.session.screenshot_path(),
        };
        match worker.submit(job) {
            Ok(()) => self.session.screenshot_dispatched(),
            Err(err) => {
                self.export_failures += 1;
                status.report(Tone::Error, &format!("Screenshot not saved: {err:#}"));
            }
        }
    }

    fn dispatch_clip(&mut self, worker: &ExportWorker, status: &mut dyn StatusSink) {
        if self.video_buffer.is_empty() {
            status.report(Tone::Warning, "No frames recorded yet.");
            return;
        }
        if worker.is_full() {
            self.export_failures += 1;
            status.report(
                Tone::Error,
                "Export queue is full; clip not saved. Try again once the pending clips finish.",
            );
            return;
        }

        self.transition(SessionState::Exporting);
        let number = self.session.next_clip_number();
        let timestamp = export::timestamp();
        let frames = self.video_buffer.drain();
        let audio = self.parts.audio_buffer.drain();
        let audio_format = self
            .parts
            .audio
            .as_ref()
            .map(|audio| audio.format())
            .unwrap_or(AudioFormat::stereo(PREFERRED_SAMPLE_RATE));
        let frame_count = frames.len();
        let chunk_count = audio.len();
        let job = ClipJob {
            kind: ExportKind::Clip(number),
            paths: self.session.clip_paths(number, &timestamp),
            frames,
            audio,
            audio_format,
        };
        match worker.submit(ExportJob::Clip(job)) {
            Ok(()) => {
                self.session.clip_dispatched();
                tracing::info!(
                    clip = number,
                    frames = frame_count,
                    audio_chunks = chunk_count,
                    "clip queued"
                );
                status.report(
                    Tone::Info,
                    &format!(
                        "Saving {} ({frame_count} frames)...",
                        ExportKind::Clip(number).label()
                    ),
                );
            }
            Err(err) => {
                self.export_failures += 1;
                status.report(Tone::Error, &format!("Clip not saved: {err:#}"));
            }
        }
        self.transition(SessionState::Recording);
    }

    fn report_outcome(&mut self, outcome: ExportOutcome, status: &mut dyn StatusSink) {
        match outcome {
            ExportOutcome::ClipSaved {
                kind,
                path,
                frames,
                samples,
                elapsed,
            } => {
                self.clips_saved += 1;
                if self.settings.log_timings {
                    log_debug(&clip_timing_line(kind, frames, samples, elapsed));
                }
                status.report(Tone::Success, &format!("Video saved as {}", path.display()));
            }
            ExportOutcome::ScreenshotSaved { path, .. } => {
                self.screenshots_saved += 1;
                status.report(Tone::Success, &format!("Saved screenshot: {}", path.display()));
            }
            ExportOutcome::Failed { job, error } => {
                self.export_failures += 1;
                status.report(Tone::Error, &format!("Export of {job} failed: {error}"));
            }
        }
    }
}

fn duration_ms(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

pub(super) fn tick_timing_line(tick: u64, work: Duration, slept: Duration) -> String {
    format!(
        "timing|phase=capture_tick|tick={tick}|work_ms={:.1}|sleep_ms={:.1}",
        duration_ms(work),
        duration_ms(slept)
    )
}

pub(super) fn clip_timing_line(
    kind: ExportKind,
    frames: usize,
    samples: usize,
    elapsed: Duration,
) -> String {
    format!(
        "timing|phase=clip_export|clip={}|frames={frames}|samples={samples}|total_ms={:.1}",
        kind.label(),
        duration_ms(elapsed)
    )
}
