//! Rolling screen/microphone capture with on-demand bug clips.
//!
//! A [`session::SessionController`] samples the display at a fixed cadence into a
//! bounded [`buffer::RingBuffer`], while an [`audio::AudioSource`] feeds a
//! [`buffer::SharedRingBuffer`] from the audio callback. Hotkeys trigger
//! screenshots and clip exports, which are handed to a background
//! [`export::ExportWorker`] so the capture loop keeps its cadence.

pub mod app;
pub mod audio;
pub mod buffer;
pub mod capture;
pub mod config;
pub mod export;
pub mod hotkeys;
mod lock;
pub mod logcat;
pub mod session;
pub mod status;
mod telemetry;

pub use app::{crash_log_path, init_logging, install_panic_hook, log_debug, log_file_path};
pub(crate) use lock::lock_or_recover;
pub use telemetry::init_tracing;
