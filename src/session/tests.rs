use super::controller::{clip_timing_line, tick_timing_line};
use super::*;
use crate::audio::{AudioCapture, AudioChunk, AudioFormat};
use crate::buffer::SharedRingBuffer;
use crate::capture::{Frame, FrameSource};
use crate::config::CaptureSettings;
use crate::export::{ExportKind, MediaBackend, VideoSink};
use crate::hotkeys::{Key, KeyState};
use crate::logcat::{LogCaptureSession, ToolCommand};
use crate::status::BufferedStatus;
use anyhow::{bail, Result};
use crossbeam_channel::{bounded, unbounded, Receiver, Sender};
use image::Rgb;
use std::cell::Cell;
use std::fs;
use std::ops::Range;
use std::rc::Rc;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tempfile::{tempdir, TempDir};

struct ClockState {
    base: Instant,
    offset: Cell<Duration>,
    sleeps: Cell<u32>,
}

#[derive(Clone)]
struct FakeClock(Rc<ClockState>);

impl FakeClock {
    fn new() -> Self {
        Self(Rc::new(ClockState {
            base: Instant::now(),
            offset: Cell::new(Duration::ZERO),
            sleeps: Cell::new(0),
        }))
    }

    fn advance(&self, by: Duration) {
        self.0.offset.set(self.0.offset.get() + by);
    }

    fn elapsed(&self) -> Duration {
        self.0.offset.get()
    }

    fn sleeps(&self) -> u32 {
        self.0.sleeps.get()
    }
}

impl Clock for FakeClock {
    fn now(&self) -> Instant {
        self.0.base + self.0.offset.get()
    }

    fn sleep(&self, duration: Duration) {
        self.0.sleeps.set(self.0.sleeps.get() + 1);
        self.advance(duration);
    }
}

type FrameHook = (u64, Box<dyn FnMut()>);

/// Solid frames; each grab costs `work` of fake time. A hook registered for
/// `seq` runs just before that frame is grabbed.
struct FakeFrames {
    clock: FakeClock,
    work: Duration,
    fail_at: Option<u64>,
    captured: Rc<Cell<u64>>,
    hooks: Vec<FrameHook>,
}

impl FrameSource for FakeFrames {
    fn dimensions(&self) -> (u32, u32) {
        (4, 2)
    }

    fn capture_frame(&mut self) -> Result<Frame> {
        let seq = self.captured.get();
        for (at, hook) in self.hooks.iter_mut() {
            if *at == seq {
                hook();
            }
        }
        if self.fail_at == Some(seq) {
            bail!("display went away");
        }
        self.clock.advance(self.work);
        self.captured.set(seq + 1);
        Ok(Frame::filled(seq, 4, 2, Rgb([0, 0, 0])))
    }
}

/// Keys held over ranges of 1-based ticks (tick N = after the Nth frame).
struct ScriptedKeys {
    captured: Rc<Cell<u64>>,
    clock: FakeClock,
    held: Vec<(Range<u64>, Key)>,
    exit_at_tick: Option<u64>,
    exit_after: Option<Duration>,
}

impl KeyState for ScriptedKeys {
    fn is_pressed(&self, key: Key) -> bool {
        let tick = self.captured.get();
        if key == Key::Exit {
            return self.exit_at_tick.is_some_and(|at| tick >= at)
                || self.exit_after.is_some_and(|after| self.clock.elapsed() >= after);
        }
        self.held
            .iter()
            .any(|(ticks, held)| *held == key && ticks.contains(&tick))
    }
}

/// Parks clip encodes until released so the export queue can be filled.
struct ClipGate {
    entered: Sender<()>,
    release: Receiver<()>,
    finished: Sender<()>,
}

/// Writes `frames=N` on finish so tests can see what each file received.
#[derive(Default)]
struct FakeBackend {
    fail_live_open: bool,
    clip_gate: Option<ClipGate>,
}

struct CountingSink {
    path: PathBuf,
    frames: usize,
    finished: Option<Sender<()>>,
}

impl VideoSink for CountingSink {
    fn write_frame(&mut self, _frame: &Frame) -> Result<()> {
        self.frames += 1;
        Ok(())
    }

    fn finish(self: Box<Self>) -> Result<()> {
        fs::write(&self.path, format!("frames={}", self.frames))?;
        if let Some(finished) = &self.finished {
            let _ = finished.send(());
        }
        Ok(())
    }
}

impl MediaBackend for FakeBackend {
    fn open_video(
        &self,
        path: &Path,
        _width: u32,
        _height: u32,
        _fps: u32,
    ) -> Result<Box<dyn VideoSink>> {
        let is_live = path.to_string_lossy().contains("Full Testing Video");
        if self.fail_live_open && is_live {
            bail!("encoder unavailable");
        }
        let gate = self.clip_gate.as_ref().filter(|_| !is_live);
        if let Some(gate) = gate {
            let _ = gate.entered.send(());
            let _ = gate.release.recv();
        }
        Ok(Box::new(CountingSink {
            path: path.to_path_buf(),
            frames: 0,
            finished: gate.map(|gate| gate.finished.clone()),
        }))
    }

    fn mux(&self, video: &Path, _audio: &Path, output: &Path, _fps: u32) -> Result<()> {
        let video = fs::read_to_string(video)?;
        fs::write(output, format!("{video} muxed"))?;
        Ok(())
    }
}

struct FakeAudio {
    buffer: SharedRingBuffer<AudioChunk>,
    captured: Rc<Cell<u64>>,
    fail_at_tick: Option<u64>,
    started: Rc<Cell<bool>>,
}

impl AudioCapture for FakeAudio {
    fn format(&self) -> AudioFormat {
        AudioFormat::stereo(44_100)
    }

    fn start(&mut self) -> Result<()> {
        self.started.set(true);
        for _ in 0..3 {
            self.buffer.push(AudioChunk::new(vec![100, -100, 200, -200]));
        }
        Ok(())
    }

    fn stop(&mut self) {
        self.started.set(false);
    }

    fn failure(&self) -> Option<String> {
        match self.fail_at_tick {
            Some(at) if self.captured.get() >= at => Some("device unplugged".to_string()),
            _ => None,
        }
    }
}

struct Harness {
    dir: TempDir,
    clock: FakeClock,
    captured: Rc<Cell<u64>>,
    work: Duration,
    fail_frame_at: Option<u64>,
    held: Vec<(Range<u64>, Key)>,
    exit_at_tick: Option<u64>,
    exit_after: Option<Duration>,
    backend: FakeBackend,
    record_audio: bool,
    audio_fail_at: Option<u64>,
    log_capture: Option<LogCaptureSession>,
    queue_depth: Option<usize>,
    frame_hooks: Vec<FrameHook>,
}

impl Harness {
    fn new() -> Self {
        Self {
            dir: tempdir().unwrap(),
            clock: FakeClock::new(),
            captured: Rc::new(Cell::new(0)),
            work: Duration::ZERO,
            fail_frame_at: None,
            held: Vec::new(),
            exit_at_tick: None,
            exit_after: None,
            backend: FakeBackend::default(),
            record_audio: false,
            audio_fail_at: None,
            log_capture: None,
            queue_depth: None,
            frame_hooks: Vec::new(),
        }
    }

    fn folder(&self) -> PathBuf {
        self.dir.path().join("demo_TS")
    }

    fn run(&mut self) -> (SessionReport, BufferedStatus) {
        let settings = CaptureSettings {
            fps: 15,
            clip_seconds: 20,
            record_audio: self.record_audio,
            log_timings: true,
        };
        let session =
            Session::create_with_timestamp(self.dir.path(), "demo", "TS", self.record_audio)
                .unwrap();
        let audio_buffer = SharedRingBuffer::new(settings.capacity());
        let frames = FakeFrames {
            clock: self.clock.clone(),
            work: self.work,
            fail_at: self.fail_frame_at,
            captured: self.captured.clone(),
            hooks: std::mem::take(&mut self.frame_hooks),
        };
        let keys = ScriptedKeys {
            captured: self.captured.clone(),
            clock: self.clock.clone(),
            held: self.held.clone(),
            exit_at_tick: self.exit_at_tick,
            exit_after: self.exit_after,
        };
        let backend = Arc::new(std::mem::take(&mut self.backend));
        let mut parts = CaptureParts::new(
            Box::new(frames),
            Box::new(keys),
            Box::new(self.clock.clone()),
            backend,
            audio_buffer.clone(),
        );
        if self.record_audio {
            parts.audio = Some(Box::new(FakeAudio {
                buffer: audio_buffer,
                captured: self.captured.clone(),
                fail_at_tick: self.audio_fail_at,
                started: Rc::new(Cell::new(false)),
            }));
        }
        parts.log_capture = self.log_capture.take();
        if let Some(depth) = self.queue_depth {
            parts.queue_depth = depth;
        }
        let controller = SessionController::new(session, settings, parts);
        assert_eq!(controller.state(), SessionState::Idle);
        let mut status = BufferedStatus::default();
        let report = controller.run(&mut status);
        (report, status)
    }

    fn files(&self) -> Vec<String> {
        let mut names: Vec<String> = fs::read_dir(self.folder())
            .unwrap()
            .map(|entry| entry.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    fn file_starting_with(&self, prefix: &str) -> String {
        let name = self
            .files()
            .into_iter()
            .find(|name| name.starts_with(prefix))
            .unwrap_or_else(|| panic!("no file starting with {prefix}: {:?}", self.files()));
        fs::read_to_string(self.folder().join(name)).unwrap()
    }
}

fn live_frames(harness: &Harness) -> usize {
    let content = harness.file_starting_with("demo_Full Testing Video_TS");
    content.trim_start_matches("frames=").parse().unwrap()
}

#[test]
fn pacing_holds_target_rate_over_ten_seconds() {
    let mut harness = Harness::new();
    harness.exit_after = Some(Duration::from_secs(10));
    let (report, _) = harness.run();
    assert_eq!(report.reason, StopReason::ExitKey);
    assert!(
        (140..=160).contains(&report.frames_captured),
        "captured {}",
        report.frames_captured
    );
    assert_eq!(live_frames(&harness) as u64, report.frames_captured);
}

#[test]
fn slow_capture_never_overproduces() {
    let mut harness = Harness::new();
    harness.work = Duration::from_millis(100);
    harness.exit_after = Some(Duration::from_secs(10));
    let (report, _) = harness.run();
    assert!(report.frames_captured <= 150, "captured {}", report.frames_captured);
    assert_eq!(report.frames_captured, 100);
    assert_eq!(harness.clock.sleeps(), 0, "overrunning ticks must not sleep");
    assert!(live_frames(&harness) <= 150);
}

#[test]
fn held_screenshot_key_saves_once() {
    let mut harness = Harness::new();
    harness.held = vec![(2..7, Key::Screenshot)];
    harness.exit_at_tick = Some(10);
    let (report, status) = harness.run();
    assert_eq!(report.screenshots_saved, 1);
    assert!(harness.files().contains(&"screenshot_1.png".to_string()));
    assert!(!harness.files().contains(&"screenshot_2.png".to_string()));
    assert!(status.contains("Saved screenshot"));
}

#[test]
fn clips_are_numbered_per_export_and_drain_the_window() {
    let mut harness = Harness::new();
    harness.held = vec![(3..5, Key::SaveClip), (8..10, Key::SaveClip)];
    harness.exit_at_tick = Some(12);
    let (report, status) = harness.run();
    assert_eq!(report.clips_saved, 2);
    assert_eq!(report.export_failures, 0);
    assert_eq!(harness.file_starting_with("demo_Bug1_"), "frames=3");
    assert_eq!(harness.file_starting_with("demo_Bug2_"), "frames=5");
    assert!(status.contains("Video saved as"));
    assert!(!harness.files().iter().any(|name| name.contains("Bug3")));
}

#[test]
fn full_export_queue_rejects_clip_and_keeps_the_window() {
    let mut harness = Harness::new();
    let (entered_tx, entered_rx) = unbounded();
    let (release_tx, release_rx) = bounded::<()>(0);
    let (finished_tx, finished_rx) = unbounded();
    harness.backend.clip_gate = Some(ClipGate {
        entered: entered_tx,
        release: release_rx,
        finished: finished_tx,
    });
    harness.queue_depth = Some(1);
    harness.held = vec![
        (2..3, Key::SaveClip),
        (4..5, Key::SaveClip),
        (6..7, Key::SaveClip),
        (10..11, Key::SaveClip),
    ];
    harness.exit_at_tick = Some(12);
    // Bug1 is parked in the encoder before the second press, so Bug2 fills the
    // one-slot queue and the third press is rejected.
    harness.frame_hooks.push((
        2,
        Box::new(move || {
            entered_rx.recv_timeout(Duration::from_secs(5)).unwrap();
        }),
    ));
    let mut release = Some(release_tx);
    harness.frame_hooks.push((
        6,
        Box::new(move || {
            drop(release.take());
            for _ in 0..2 {
                finished_rx.recv_timeout(Duration::from_secs(5)).unwrap();
            }
        }),
    ));

    let (report, status) = harness.run();
    assert_eq!(report.reason, StopReason::ExitKey);
    assert_eq!(report.export_failures, 1);
    assert_eq!(report.clips_saved, 3);
    assert!(status.contains("Export queue is full"));
    assert_eq!(harness.file_starting_with("demo_Bug1_"), "frames=2");
    assert_eq!(harness.file_starting_with("demo_Bug2_"), "frames=2");
    // The rejected press neither took a number nor dropped ticks 5-6.
    assert_eq!(harness.file_starting_with("demo_Bug3_"), "frames=6");
    assert!(!harness.files().iter().any(|name| name.contains("Bug4")));
}

#[test]
fn exit_preempts_clip_pressed_in_same_tick() {
    let mut harness = Harness::new();
    harness.held = vec![(4..6, Key::SaveClip)];
    harness.exit_at_tick = Some(4);
    let (report, _) = harness.run();
    assert_eq!(report.reason, StopReason::ExitKey);
    assert_eq!(report.clips_saved, 0);
    assert!(!harness.files().iter().any(|name| name.contains("Bug")));
}

#[test]
fn audio_clip_is_muxed_and_intermediates_removed() {
    let mut harness = Harness::new();
    harness.record_audio = true;
    harness.held = vec![(2..3, Key::SaveClip)];
    harness.exit_at_tick = Some(4);
    let (report, _) = harness.run();
    assert_eq!(report.clips_saved, 1);
    let files = harness.files();
    assert!(!files.iter().any(|name| name.ends_with(".wav")), "{files:?}");
    assert!(!files.iter().any(|name| name.contains("_video")), "{files:?}");
    assert_eq!(harness.file_starting_with("demo_Bug1_"), "frames=2 muxed");
}

#[test]
fn capture_failure_stops_with_nonzero_exit() {
    let mut harness = Harness::new();
    harness.fail_frame_at = Some(4);
    let (report, status) = harness.run();
    assert!(matches!(report.reason, StopReason::CaptureFailed(ref msg) if msg.contains("display went away")));
    assert_eq!(report.reason.exit_code(), 1);
    assert_eq!(report.frames_captured, 4);
    assert_eq!(report.state, SessionState::Terminated);
    assert!(report.output.is_some(), "live recording is still finalized");
    assert_eq!(live_frames(&harness), 4);
    assert!(status.contains("capture failed"));
}

#[test]
fn audio_failure_mid_session_stops_recording() {
    let mut harness = Harness::new();
    harness.record_audio = true;
    harness.audio_fail_at = Some(3);
    let (report, _) = harness.run();
    assert!(matches!(report.reason, StopReason::CaptureFailed(ref msg) if msg.contains("device unplugged")));
    assert_eq!(report.frames_captured, 3);
}

#[test]
fn live_writer_open_failure_is_fatal() {
    let mut harness = Harness::new();
    harness.backend.fail_live_open = true;
    harness.exit_at_tick = Some(1);
    let (report, status) = harness.run();
    assert!(matches!(report.reason, StopReason::LiveWriterFailed(_)));
    assert_eq!(report.frames_captured, 0);
    assert!(report.output.is_none());
    assert!(status.contains("could not be found"));
}

#[test]
fn missing_log_tool_is_reported_and_session_continues() {
    let mut harness = Harness::new();
    let command = ToolCommand::parse("bugreel-missing-log-tool logcat").unwrap();
    harness.log_capture = Some(LogCaptureSession::new(command, None));
    harness.exit_at_tick = Some(2);
    let (report, status) = harness.run();
    assert_eq!(report.reason, StopReason::ExitKey);
    assert_eq!(report.frames_captured, 2);
    assert!(status.contains("Device logs unavailable"));
    assert_eq!(report.reason.exit_code(), 0);
}

#[cfg(unix)]
#[test]
fn device_log_backlog_is_cleared_before_streaming() {
    let mut harness = Harness::new();
    let command = ToolCommand::parse("sh -c 'exec sleep 30'").unwrap();
    let clear = ToolCommand::parse("sh -c 'exit 0'").unwrap();
    harness.log_capture = Some(LogCaptureSession::new(command, None).with_clear(Some(clear)));
    harness.exit_at_tick = Some(2);
    let (report, status) = harness.run();
    assert_eq!(report.reason, StopReason::ExitKey);
    assert!(status.contains("Cleared previous logs."));
    assert!(status.contains("Started capturing device logs"));
}

#[test]
fn session_counters_advance_only_on_dispatch() {
    let dir = tempdir().unwrap();
    let mut session = Session::create_with_timestamp(dir.path(), "demo", "TS", false).unwrap();
    assert!(session.output_folder().is_dir());
    assert_eq!(session.bug_counter(), None);
    assert_eq!(session.next_clip_number(), 1);
    session.clip_dispatched();
    assert_eq!(session.next_clip_number(), 2);
    assert_eq!(session.screenshot_counter(), 1);
    session.screenshot_dispatched();
    assert_eq!(session.screenshot_path(), dir.path().join("demo_TS/screenshot_2.png"));
    assert_eq!(
        session.clip_paths(2, "T2").output,
        dir.path().join("demo_TS/demo_Bug2_T2.mp4")
    );
    assert_eq!(
        session.device_log_path(),
        dir.path().join("demo_TS/demo_logs_TS.log")
    );
}

#[test]
fn pacer_sleeps_only_for_the_remaining_interval() {
    let clock = FakeClock::new();
    let pacer = FramePacer::new(Duration::from_millis(50));
    let start = clock.now();
    clock.advance(Duration::from_millis(20));
    assert_eq!(pacer.pace(&clock, start), Duration::from_millis(30));
    assert_eq!(clock.elapsed(), Duration::from_millis(50));

    let start = clock.now();
    clock.advance(Duration::from_millis(80));
    assert_eq!(pacer.pace(&clock, start), Duration::ZERO);
    assert_eq!(clock.sleeps(), 1);
}

#[test]
fn stop_reason_labels_and_exit_codes() {
    assert_eq!(StopReason::ExitKey.exit_code(), 0);
    assert_eq!(StopReason::ExitKey.detail(), None);
    let failed = StopReason::LiveWriterFailed("disk full".to_string());
    assert_eq!(failed.exit_code(), 1);
    assert_eq!(failed.label(), "live writer failed");
    assert_eq!(failed.detail(), Some("disk full"));
}

#[test]
fn timing_lines_use_pipe_separated_fields() {
    assert_eq!(
        tick_timing_line(7, Duration::from_micros(12_340), Duration::from_millis(54)),
        "timing|phase=capture_tick|tick=7|work_ms=12.3|sleep_ms=54.0"
    );
    assert_eq!(
        clip_timing_line(ExportKind::Clip(2), 30, 4_410, Duration::from_millis(250)),
        "timing|phase=clip_export|clip=Bug2|frames=30|samples=4410|total_ms=250.0"
    );
}
