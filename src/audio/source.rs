//! System microphone capture via CPAL.

use super::dispatch::{f32_to_i16, u16_to_i16, ChunkDispatcher};
use super::{chunk_frames, AudioCapture, AudioChunk, AudioFormat, CHANNELS, PREFERRED_SAMPLE_RATE};
use crate::buffer::SharedRingBuffer;
use crate::{lock_or_recover, log_debug};
use anyhow::{anyhow, Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleFormat, SampleRate, StreamConfig, SupportedStreamConfig};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

/// CPAL-backed microphone producer feeding the shared audio ring.
pub struct AudioSource {
    device: cpal::Device,
    supported: SupportedStreamConfig,
    fps: u32,
    sink: SharedRingBuffer<AudioChunk>,
    stream: Option<cpal::Stream>,
    dispatcher: Option<Arc<Mutex<ChunkDispatcher>>>,
    chunks: Arc<AtomicUsize>,
    dropped_callbacks: Arc<AtomicUsize>,
    failure: Arc<Mutex<Option<String>>>,
}

impl AudioSource {
    /// List microphone names so the CLI can expose a human-friendly selector.
    pub fn list_devices() -> Result<Vec<String>> {
        let host = cpal::default_host();
        let devices = host.input_devices().context("no input devices available")?;
        let mut names = Vec::new();
        for device in devices {
            if let Ok(name) = device.name() {
                names.push(name);
            }
        }
        Ok(names)
    }

    /// Open `preferred_device` (or the default input) and pick a stream format.
    /// The device is not started until [`AudioCapture::start`].
    pub fn new(
        preferred_device: Option<&str>,
        fps: u32,
        sink: SharedRingBuffer<AudioChunk>,
    ) -> Result<Self> {
        let host = cpal::default_host();
        let device = match preferred_device {
            Some(name) => {
                let mut devices = host.input_devices().context("no input devices available")?;
                devices
                    .find(|d| d.name().map(|n| n == name).unwrap_or(false))
                    .ok_or_else(|| anyhow!("input device '{name}' not found"))?
            }
            None => host
                .default_input_device()
                .context("no default input device available")?,
        };
        let supported = select_stream_config(&device)?;
        Ok(Self {
            device,
            supported,
            fps,
            sink,
            stream: None,
            dispatcher: None,
            chunks: Arc::new(AtomicUsize::new(0)),
            dropped_callbacks: Arc::new(AtomicUsize::new(0)),
            failure: Arc::new(Mutex::new(None)),
        })
    }

    pub fn device_name(&self) -> String {
        self.device
            .name()
            .unwrap_or_else(|_| "Unknown Device".to_string())
    }

    /// Chunks pushed so far and callbacks skipped because the dispatcher was busy.
    pub fn stats(&self) -> (usize, usize) {
        (
            self.chunks.load(Ordering::Relaxed),
            self.dropped_callbacks.load(Ordering::Relaxed),
        )
    }

    fn build_stream(
        &self,
        config: &StreamConfig,
        dispatcher: Arc<Mutex<ChunkDispatcher>>,
    ) -> Result<cpal::Stream> {
        let channels = usize::from(config.channels.max(1));
        let failure = self.failure.clone();
        let err_fn = move |err: cpal::StreamError| {
            log_debug(&format!("audio_stream_error: {err}"));
            let mut slot = lock_or_recover(failure.as_ref(), "audio failure slot");
            if slot.is_none() {
                *slot = Some(err.to_string());
            }
        };

        // try_lock keeps the callback from ever waiting on stop()'s flush.
        let stream = match self.supported.sample_format() {
            SampleFormat::I16 => {
                let dropped = self.dropped_callbacks.clone();
                self.device.build_input_stream(
                    config,
                    move |data: &[i16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, |sample| sample);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::F32 => {
                let dropped = self.dropped_callbacks.clone();
                self.device.build_input_stream(
                    config,
                    move |data: &[f32], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, f32_to_i16);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            SampleFormat::U16 => {
                let dropped = self.dropped_callbacks.clone();
                self.device.build_input_stream(
                    config,
                    move |data: &[u16], _| {
                        if let Ok(mut pump) = dispatcher.try_lock() {
                            pump.push(data, channels, u16_to_i16);
                        } else {
                            dropped.fetch_add(1, Ordering::Relaxed);
                        }
                    },
                    err_fn,
                    None,
                )?
            }
            other => return Err(anyhow!("unsupported sample format: {other:?}")),
        };
        Ok(stream)
    }
}

impl AudioCapture for AudioSource {
    fn format(&self) -> AudioFormat {
        AudioFormat::stereo(self.supported.sample_rate().0)
    }

    fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }
        let config: StreamConfig = self.supported.clone().into();
        let frames = chunk_frames(config.sample_rate.0, self.fps);
        log_debug(&format!(
            "audio source: device='{}' format={:?} rate={}Hz channels={} chunk_frames={frames}",
            self.device_name(),
            self.supported.sample_format(),
            config.sample_rate.0,
            config.channels
        ));
        let dispatcher = Arc::new(Mutex::new(ChunkDispatcher::new(
            frames,
            self.sink.clone(),
            self.chunks.clone(),
        )));
        let stream = self
            .build_stream(&config, dispatcher.clone())
            .with_context(|| format!("failed to open input stream on '{}'", self.device_name()))?;
        stream
            .play()
            .with_context(|| format!("failed to start input stream on '{}'", self.device_name()))?;
        self.stream = Some(stream);
        self.dispatcher = Some(dispatcher);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(err) = stream.pause() {
                log_debug(&format!("failed to pause audio stream: {err}"));
            }
            drop(stream);
        }
        if let Some(dispatcher) = self.dispatcher.take() {
            lock_or_recover(dispatcher.as_ref(), "audio dispatcher flush").flush();
        }
        let (chunks, dropped) = self.stats();
        log_debug(&format!(
            "audio source stopped: chunks={chunks} dropped_callbacks={dropped}"
        ));
    }

    fn failure(&self) -> Option<String> {
        lock_or_recover(self.failure.as_ref(), "audio failure slot").clone()
    }
}

impl Drop for AudioSource {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Prefer a stereo config that covers 44.1 kHz (i16 first), else the device default.
fn select_stream_config(device: &cpal::Device) -> Result<SupportedStreamConfig> {
    let preferred = SampleRate(PREFERRED_SAMPLE_RATE);
    if let Ok(ranges) = device.supported_input_configs() {
        let mut candidates: Vec<_> = ranges
            .filter(|range| {
                range.channels() == CHANNELS
                    && range.min_sample_rate().0 <= preferred.0
                    && range.max_sample_rate().0 >= preferred.0
                    && matches!(
                        range.sample_format(),
                        SampleFormat::I16 | SampleFormat::F32 | SampleFormat::U16
                    )
            })
            .collect();
        candidates.sort_by_key(|range| match range.sample_format() {
            SampleFormat::I16 => 0,
            SampleFormat::F32 => 1,
            _ => 2,
        });
        if let Some(range) = candidates.into_iter().next() {
            return Ok(range.with_sample_rate(preferred));
        }
    }
    let fallback = device
        .default_input_config()
        .context("input device has no usable configuration")?;
    log_debug(&format!(
        "audio source: no stereo {PREFERRED_SAMPLE_RATE}Hz config, using default {:?}",
        fallback
    ));
    Ok(fallback)
}
