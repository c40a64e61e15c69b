//! Microphone capture into fixed-size interleaved stereo chunks.
//!
//! Audio is captured via CPAL on the driver's callback thread, converted to
//! 16-bit stereo, cut into chunks of `sample_rate / fps` frames, and pushed into
//! a [`SharedRingBuffer`](crate::buffer::SharedRingBuffer) independently of the
//! video cadence.

use anyhow::Result;

/// Output channel count for every chunk.
pub const CHANNELS: u16 = 2;

/// Preferred capture rate; devices that cannot provide it keep their native rate.
pub const PREFERRED_SAMPLE_RATE: u32 = 44_100;

mod dispatch;
mod source;

pub use dispatch::ChunkDispatcher;
pub use source::AudioSource;

/// Interleaved signed 16-bit stereo samples for one chunk period.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    samples: Vec<i16>,
}

impl AudioChunk {
    pub fn new(samples: Vec<i16>) -> Self {
        Self { samples }
    }

    pub fn samples(&self) -> &[i16] {
        &self.samples
    }

    /// Number of sample frames (one sample per channel).
    pub fn frames(&self) -> usize {
        self.samples.len() / usize::from(CHANNELS)
    }

    pub fn into_samples(self) -> Vec<i16> {
        self.samples
    }
}

/// Concatenate chunks, oldest first, into one linear interleaved sequence.
pub fn concat_chunks(chunks: Vec<AudioChunk>) -> Vec<i16> {
    let total = chunks.iter().map(|chunk| chunk.samples.len()).sum();
    let mut out = Vec::with_capacity(total);
    for chunk in chunks {
        out.extend(chunk.into_samples());
    }
    out
}

/// Format of the chunks a capture produces.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AudioFormat {
    pub sample_rate: u32,
    pub channels: u16,
}

impl AudioFormat {
    pub fn stereo(sample_rate: u32) -> Self {
        Self {
            sample_rate,
            channels: CHANNELS,
        }
    }
}

/// Frames per chunk so that one chunk spans one video frame interval.
pub fn chunk_frames(sample_rate: u32, fps: u32) -> usize {
    (sample_rate / fps.max(1)).max(1) as usize
}

/// Asynchronous audio producer owned by the session controller.
pub trait AudioCapture {
    fn format(&self) -> AudioFormat;

    /// Open the device and begin delivering chunks from an independent context.
    fn start(&mut self) -> Result<()>;

    /// Stop delivery, flush any partial chunk, and close the device.
    fn stop(&mut self);

    /// Set once the driver reports a stream error; the session treats it as a
    /// capture failure.
    fn failure(&self) -> Option<String>;
}
