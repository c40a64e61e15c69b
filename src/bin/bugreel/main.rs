//! bugreel entrypoint: records the primary display (and optionally the
//! microphone) into a rolling window while a test session runs.
//!
//! - Capture loop (main thread): screen grab, cursor overlay, live recording, hotkeys
//! - Audio callback: pushes fixed-size chunks into the shared ring
//! - Export worker: encodes clips and screenshots off the capture thread
//! - Log process: device log stream appended to the session folder

mod cli_utils;

use anyhow::{Context, Result};
use bugreel::audio::{AudioChunk, AudioSource};
use bugreel::buffer::SharedRingBuffer;
use bugreel::capture::{DevicePointer, ScreenFrameSource};
use bugreel::config::AppConfig;
use bugreel::export::FfmpegBackend;
use bugreel::hotkeys::DeviceKeyState;
use bugreel::logcat::LogCaptureSession;
use bugreel::session::{CaptureParts, Session, SessionController, SystemClock};
use bugreel::status::{StatusSink, TerminalStatus, Tone};
use bugreel::{init_logging, init_tracing, install_panic_hook, log_debug, log_file_path};
use std::path::Path;
use std::process;
use std::sync::Arc;

use crate::cli_utils::{list_displays, list_input_devices};

fn main() -> Result<()> {
    let config = AppConfig::parse_args()?;

    if config.list_input_devices {
        list_input_devices()?;
        return Ok(());
    }
    if config.list_displays {
        list_displays()?;
        return Ok(());
    }

    init_logging(&config);
    init_tracing(&config);
    install_panic_hook();
    log_debug("=== bugreel started ===");
    if config.logging_enabled() {
        log_debug(&format!("Log file: {:?}", log_file_path()));
    }

    let settings = config.capture_settings();
    let app_id = config.app_id()?;
    let root = config.resolved_output_root()?;
    let mut status = TerminalStatus;

    let backend = FfmpegBackend::discover(config.ffmpeg_cmd.as_deref().map(Path::new))?;
    log_debug(&format!("ffmpeg: {}", backend.binary().display()));
    let pointer = DevicePointer::new().context("failed to open the primary display")?;
    let keys = DeviceKeyState::new().context("failed to watch the session hotkeys")?;
    let frames = ScreenFrameSource::primary(Box::new(pointer))
        .context("failed to open the primary display")?;

    let audio_buffer = SharedRingBuffer::<AudioChunk>::new(settings.capacity());
    let audio = if settings.record_audio {
        let source = AudioSource::new(
            config.input_device.as_deref(),
            settings.fps,
            audio_buffer.clone(),
        )
        .context("failed to open the microphone")?;
        status.report(
            Tone::Info,
            &format!("Recording audio from {}", source.device_name()),
        );
        Some(source)
    } else {
        None
    };

    let session = Session::create(&root, app_id, settings.record_audio)?;
    status.report(
        Tone::Info,
        &format!("Saving to {}", session.output_folder().display()),
    );

    let mut parts = CaptureParts::new(
        Box::new(frames),
        Box::new(keys),
        Box::new(SystemClock),
        Arc::new(backend),
        audio_buffer,
    );
    if let Some(source) = audio {
        parts.audio = Some(Box::new(source));
    }
    if let Some(tool) = config.log_tool.clone() {
        parts.log_capture = Some(
            LogCaptureSession::new(tool, config.connect_tool.clone())
                .with_clear(config.clear_tool.clone()),
        );
    }

    let report = SessionController::new(session, settings, parts).run(&mut status);
    log_debug(&format!(
        "=== bugreel stopped: {} frames={} clips={} screenshots={} failures={} ===",
        report.reason.label(),
        report.frames_captured,
        report.clips_saved,
        report.screenshots_saved,
        report.export_failures
    ));

    let code = report.reason.exit_code();
    if code != 0 {
        process::exit(code);
    }
    Ok(())
}
