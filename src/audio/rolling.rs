//! Fixed-capacity rolling window over the most recent samples.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// Bounded FIFO that drops the oldest samples once full
#[derive(Debug, Clone)]
pub struct RollingAudioBuffer {
    samples: VecDeque<f32>,
    capacity: usize,
    total_appended: u64,
}

impl RollingAudioBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            samples: VecDeque::with_capacity(capacity),
            capacity,
            total_appended: 0,
        }
    }

    /// Append a chunk, retaining only the most recent `capacity` samples
    pub fn push_slice(&mut self, chunk: &[f32]) {
        self.total_appended += chunk.len() as u64;

        // Only the tail of an oversized chunk can survive
        let chunk = &chunk[chunk.len().saturating_sub(self.capacity)..];
        let overflow = (self.samples.len() + chunk.len()).saturating_sub(self.capacity);
        self.samples.drain(..overflow);
        self.samples.extend(chunk.iter().copied());
    }

    /// The full window, or `None` until `capacity` samples have arrived
    pub fn snapshot(&self) -> Option<Vec<f32>> {
        if self.is_ready() {
            Some(self.samples.iter().copied().collect())
        } else {
            None
        }
    }

    /// The full window as a shared slice, copied straight out of the deque
    pub fn window(&self) -> Option<Arc<[f32]>> {
        self.is_ready()
            .then(|| self.samples.iter().copied().collect::<Arc<[f32]>>())
    }

    pub fn is_ready(&self) -> bool {
        self.capacity > 0 && self.samples.len() >= self.capacity
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Samples appended since creation, including dropped ones
    pub fn total_appended(&self) -> u64 {
        self.total_appended
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.total_appended = 0;
    }
}

/// Latest complete window, published by a single writer.
///
/// The writer swaps in a fresh immutable window; readers clone the `Arc`.
/// The lock only guards the pointer swap, so a reader never observes a
/// window that is still being written.
#[derive(Debug, Clone, Default)]
pub struct WindowSlot {
    latest: Arc<Mutex<Option<Arc<[f32]>>>>,
}

impl WindowSlot {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn publish(&self, window: Arc<[f32]>) {
        if let Ok(mut slot) = self.latest.lock() {
            *slot = Some(window);
        }
    }

    pub fn latest(&self) -> Option<Arc<[f32]>> {
        self.latest.lock().ok().and_then(|slot| slot.clone())
    }

    pub fn clear(&self) {
        if let Ok(mut slot) = self.latest.lock() {
            *slot = None;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_not_ready_until_full() {
        let mut buffer = RollingAudioBuffer::new(100);
        buffer.push_slice(&[0.5; 60]);
        assert!(buffer.snapshot().is_none());

        buffer.push_slice(&[0.5; 40]);
        let window = buffer.snapshot().unwrap();
        assert_eq!(window.len(), 100);
    }

    #[test]
    fn test_window_matches_snapshot() {
        let mut buffer = RollingAudioBuffer::new(5);
        buffer.push_slice(&[1.0, 2.0, 3.0]);
        assert!(buffer.window().is_none());

        buffer.push_slice(&[4.0, 5.0, 6.0, 7.0]);
        let window = buffer.window().unwrap();
        assert_eq!(&window[..], &[3.0, 4.0, 5.0, 6.0, 7.0]);
        assert_eq!(window.to_vec(), buffer.snapshot().unwrap());
    }

    #[test]
    fn test_drops_oldest() {
        let mut buffer = RollingAudioBuffer::new(4);
        buffer.push_slice(&[1.0, 2.0, 3.0]);
        buffer.push_slice(&[4.0, 5.0, 6.0]);
        assert_eq!(buffer.snapshot().unwrap(), vec![3.0, 4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_oversized_chunk_keeps_tail() {
        let mut buffer = RollingAudioBuffer::new(3);
        buffer.push_slice(&[1.0, 2.0, 3.0, 4.0, 5.0]);
        assert_eq!(buffer.snapshot().unwrap(), vec![3.0, 4.0, 5.0]);
        assert_eq!(buffer.total_appended(), 5);
    }

    #[test]
    fn test_clear() {
        let mut buffer = RollingAudioBuffer::new(2);
        buffer.push_slice(&[1.0, 2.0]);
        buffer.clear();
        assert!(buffer.is_empty());
        assert!(buffer.snapshot().is_none());
    }

    #[test]
    fn test_window_slot_swap() {
        let slot = WindowSlot::new();
        assert!(slot.latest().is_none());

        slot.publish(Arc::from(vec![1.0f32, 2.0]));
        let first = slot.latest().unwrap();

        slot.publish(Arc::from(vec![3.0f32, 4.0]));
        // Readers holding the old window are unaffected by the swap
        assert_eq!(&first[..], &[1.0, 2.0]);
        assert_eq!(&slot.latest().unwrap()[..], &[3.0, 4.0]);

        slot.clear();
        assert!(slot.latest().is_none());
    }

    proptest! {
        #[test]
        fn prop_never_exceeds_capacity(
            capacity in 1usize..2000,
            chunks in proptest::collection::vec(1usize..1500, 1..40)
        ) {
            let mut buffer = RollingAudioBuffer::new(capacity);
            let mut appended = 0usize;
            for len in chunks {
                buffer.push_slice(&vec![0.25; len]);
                appended += len;
                prop_assert!(buffer.len() <= capacity);

                match buffer.snapshot() {
                    Some(window) => {
                        prop_assert!(appended >= capacity);
                        prop_assert_eq!(window.len(), capacity);
                    }
                    None => prop_assert!(appended < capacity),
                }
            }
        }

        #[test]
        fn prop_keeps_most_recent_samples(
            values in proptest::collection::vec(-1.0f32..1.0, 1..500),
            capacity in 1usize..100
        ) {
            let mut buffer = RollingAudioBuffer::new(capacity);
            for chunk in values.chunks(7) {
                buffer.push_slice(chunk);
            }
            if let Some(window) = buffer.snapshot() {
                prop_assert_eq!(&window[..], &values[values.len() - capacity..]);
            }
        }
    }
}
