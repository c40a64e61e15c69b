use super::{AudioChunk, CHANNELS};
use crate::buffer::SharedRingBuffer;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc,
};

/// Remap interleaved input with `channels` channels onto stereo, converting
/// each sample with `convert`. Mono is duplicated; extra channels are dropped.
pub(super) fn append_stereo_samples<T, F>(
    buf: &mut Vec<i16>,
    data: &[T],
    channels: usize,
    mut convert: F,
) where
    T: Copy,
    F: FnMut(T) -> i16,
{
    let channels = channels.max(1);
    if channels == usize::from(CHANNELS) {
        buf.extend(data.iter().copied().map(&mut convert));
        return;
    }
    for frame in data.chunks(channels) {
        let left = convert(frame[0]);
        let right = if channels == 1 || frame.len() < 2 {
            left
        } else {
            convert(frame[1])
        };
        buf.push(left);
        buf.push(right);
    }
}

pub(super) fn f32_to_i16(sample: f32) -> i16 {
    (sample.clamp(-1.0, 1.0) * f32::from(i16::MAX)) as i16
}

pub(super) fn u16_to_i16(sample: u16) -> i16 {
    (i32::from(sample) - 32_768) as i16
}

/// Cuts callback-sized input into fixed-size chunks and pushes each finished
/// chunk into the shared audio ring.
pub struct ChunkDispatcher {
    chunk_samples: usize,
    pending: Vec<i16>,
    sink: SharedRingBuffer<AudioChunk>,
    chunks: Arc<AtomicUsize>,
}

impl ChunkDispatcher {
    /// `chunk_frames` is per channel; each chunk holds `chunk_frames * 2` samples.
    pub fn new(
        chunk_frames: usize,
        sink: SharedRingBuffer<AudioChunk>,
        chunks: Arc<AtomicUsize>,
    ) -> Self {
        let chunk_samples = chunk_frames.max(1) * usize::from(CHANNELS);
        Self {
            chunk_samples,
            pending: Vec::with_capacity(chunk_samples * 2),
            sink,
            chunks,
        }
    }

    pub fn push<T, F>(&mut self, data: &[T], channels: usize, convert: F)
    where
        T: Copy,
        F: FnMut(T) -> i16,
    {
        append_stereo_samples(&mut self.pending, data, channels, convert);
        while self.pending.len() >= self.chunk_samples {
            let chunk: Vec<i16> = self.pending.drain(..self.chunk_samples).collect();
            self.emit(chunk);
        }
    }

    /// Push whatever partial chunk remains.
    pub fn flush(&mut self) {
        if self.pending.is_empty() {
            return;
        }
        let chunk = std::mem::take(&mut self.pending);
        self.emit(chunk);
    }

    pub fn pending_samples(&self) -> usize {
        self.pending.len()
    }

    fn emit(&mut self, samples: Vec<i16>) {
        self.sink.push(AudioChunk::new(samples));
        self.chunks.fetch_add(1, Ordering::Relaxed);
    }
}
