//! Fixed-capacity rolling buffers for frames and audio chunks.
//!
//! [`RingBuffer`] is the single-owner container used by the capture loop.
//! [`SharedRingBuffer`] wraps one behind a mutex so the audio callback can push
//! while the capture thread drains it for an export.

use crate::lock_or_recover;
use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Insertion-ordered container that evicts the oldest element once full.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    capacity: usize,
    items: VecDeque<T>,
}

impl<T> RingBuffer<T> {
    /// A zero capacity is bumped to one so a push always retains the newest item.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            items: VecDeque::with_capacity(capacity),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Append `item`, returning the evicted oldest element when at capacity.
    pub fn push(&mut self, item: T) -> Option<T> {
        let evicted = if self.items.len() >= self.capacity {
            self.items.pop_front()
        } else {
            None
        };
        self.items.push_back(item);
        evicted
    }

    pub fn clear(&mut self) {
        self.items.clear();
    }

    /// Move every element out, oldest first, leaving the buffer empty.
    pub fn drain(&mut self) -> Vec<T> {
        self.items.drain(..).collect()
    }
}

impl<T: Clone> RingBuffer<T> {
    /// Ordered copy of the current contents.
    pub fn snapshot(&self) -> Vec<T> {
        self.items.iter().cloned().collect()
    }
}

/// Mutex-guarded ring buffer shared between a producer thread and the capture loop.
///
/// Every operation holds the lock only for the duration of a single deque
/// operation, so the audio callback never waits behind an export.
#[derive(Debug)]
pub struct SharedRingBuffer<T> {
    inner: Arc<Mutex<RingBuffer<T>>>,
}

impl<T> Clone for SharedRingBuffer<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> SharedRingBuffer<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Arc::new(Mutex::new(RingBuffer::new(capacity))),
        }
    }

    pub fn capacity(&self) -> usize {
        lock_or_recover(self.inner.as_ref(), "SharedRingBuffer::capacity").capacity()
    }

    pub fn len(&self) -> usize {
        lock_or_recover(self.inner.as_ref(), "SharedRingBuffer::len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns `true` when an older element was evicted to make room.
    pub fn push(&self, item: T) -> bool {
        lock_or_recover(self.inner.as_ref(), "SharedRingBuffer::push")
            .push(item)
            .is_some()
    }

    /// Snapshot and clear in one critical section; a concurrent push lands either
    /// entirely before (and is returned) or entirely after (and is retained).
    pub fn drain(&self) -> Vec<T> {
        let taken = {
            let mut guard = lock_or_recover(self.inner.as_ref(), "SharedRingBuffer::drain");
            let capacity = guard.capacity();
            std::mem::replace(&mut *guard, RingBuffer::new(capacity))
        };
        taken.items.into()
    }
}

impl<T: Clone> SharedRingBuffer<T> {
    pub fn snapshot(&self) -> Vec<T> {
        lock_or_recover(self.inner.as_ref(), "SharedRingBuffer::snapshot").snapshot()
    }
}
