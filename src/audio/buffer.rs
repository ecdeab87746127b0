//! Sample and packet buffers
//!
//! [`SampleRing`] is the per-peer jitter buffer of spatialized stereo
//! samples. [`PacketQueue`] hands inbound packets from the transport to the
//! playback thread without ever blocking the producer.

use crossbeam::queue::ArrayQueue;
use std::sync::atomic::{AtomicU64, Ordering};

/// Fixed-capacity circular buffer of interleaved samples
///
/// Writes never block: when the ring is full the newest excess is dropped so
/// the unread portion keeps its order. Reads may return fewer samples than
/// requested.
pub struct SampleRing {
    data: Vec<f32>,
    read_pos: usize,
    len: usize,
    /// Samples discarded because the ring was full
    overflow_count: u64,
    /// Reads that could not be fully satisfied
    underrun_count: u64,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        Self {
            data: vec![0.0; capacity.max(1)],
            read_pos: 0,
            len: 0,
            overflow_count: 0,
            underrun_count: 0,
        }
    }

    /// Append samples, returning how many were stored
    pub fn write(&mut self, samples: &[f32]) -> usize {
        let capacity = self.data.len();
        let n = samples.len().min(capacity - self.len);
        let mut write_pos = (self.read_pos + self.len) % capacity;

        for &sample in &samples[..n] {
            self.data[write_pos] = sample;
            write_pos += 1;
            if write_pos == capacity {
                write_pos = 0;
            }
        }

        self.len += n;
        self.overflow_count += (samples.len() - n) as u64;
        n
    }

    /// Pop up to `out.len()` samples into the front of `out`
    pub fn read(&mut self, out: &mut [f32]) -> usize {
        let capacity = self.data.len();
        let n = out.len().min(self.len);

        for dst in &mut out[..n] {
            *dst = self.data[self.read_pos];
            self.read_pos += 1;
            if self.read_pos == capacity {
                self.read_pos = 0;
            }
        }

        self.len -= n;
        if n < out.len() {
            self.underrun_count += 1;
        }
        n
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.data.len()
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count
    }

    pub fn underrun_count(&self) -> u64 {
        self.underrun_count
    }
}

/// Bounded lock-free queue that drops its oldest entry when full
pub struct PacketQueue<T> {
    queue: ArrayQueue<T>,
    dropped: AtomicU64,
}

impl<T> PacketQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            queue: ArrayQueue::new(capacity.max(1)),
            dropped: AtomicU64::new(0),
        }
    }

    /// Enqueue without blocking, evicting the oldest item if needed
    ///
    /// Returns true when an older item was evicted.
    pub fn push(&self, item: T) -> bool {
        if self.queue.force_push(item).is_some() {
            self.dropped.fetch_add(1, Ordering::Relaxed);
            true
        } else {
            false
        }
    }

    pub fn pop(&self) -> Option<T> {
        self.queue.pop()
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.queue.capacity()
    }

    /// Items evicted to make room for newer ones
    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_ring_basic() {
        let mut ring = SampleRing::new(8);
        assert_eq!(ring.write(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(ring.len(), 3);

        let mut out = [0.0; 2];
        assert_eq!(ring.read(&mut out), 2);
        assert_eq!(out, [1.0, 2.0]);
        assert_eq!(ring.len(), 1);
    }

    #[test]
    fn test_ring_short_read() {
        let mut ring = SampleRing::new(8);
        ring.write(&[0.5, 0.25]);

        let mut out = [9.0; 4];
        assert_eq!(ring.read(&mut out), 2);
        assert_eq!(&out[..2], &[0.5, 0.25]);
        assert_eq!(&out[2..], &[9.0, 9.0]);
        assert_eq!(ring.underrun_count(), 1);
    }

    #[test]
    fn test_ring_overflow_drops_newest() {
        let mut ring = SampleRing::new(4);
        assert_eq!(ring.write(&[1.0, 2.0, 3.0]), 3);
        assert_eq!(ring.write(&[4.0, 5.0, 6.0]), 1);
        assert_eq!(ring.overflow_count(), 2);

        let mut out = [0.0; 4];
        ring.read(&mut out);
        assert_eq!(out, [1.0, 2.0, 3.0, 4.0]);
    }

    #[test]
    fn test_ring_wraps() {
        let mut ring = SampleRing::new(4);
        let mut out = [0.0; 3];
        ring.write(&[1.0, 2.0, 3.0]);
        ring.read(&mut out);
        ring.write(&[4.0, 5.0, 6.0]);
        assert_eq!(ring.read(&mut out), 3);
        assert_eq!(out, [4.0, 5.0, 6.0]);
    }

    #[test]
    fn test_queue_drops_oldest() {
        let queue = PacketQueue::new(2);
        assert!(!queue.push(1));
        assert!(!queue.push(2));
        assert!(queue.push(3));

        assert_eq!(queue.dropped_count(), 1);
        assert_eq!(queue.pop(), Some(2));
        assert_eq!(queue.pop(), Some(3));
        assert_eq!(queue.pop(), None);
    }

    proptest! {
        #[test]
        fn prop_ring_preserves_order(
            capacity in 1usize..256,
            chunks in proptest::collection::vec(proptest::collection::vec(-1.0f32..1.0, 0..64), 0..16),
        ) {
            let mut ring = SampleRing::new(capacity);
            let mut expected = Vec::new();
            for chunk in &chunks {
                let written = ring.write(chunk);
                expected.extend_from_slice(&chunk[..written]);
            }

            prop_assert!(ring.len() <= capacity);
            let mut out = vec![0.0; expected.len()];
            prop_assert_eq!(ring.read(&mut out), expected.len());
            prop_assert_eq!(out, expected);
        }

        #[test]
        fn prop_ring_interleaved_reads(
            ops in proptest::collection::vec((0usize..40, 0usize..40), 1..32),
        ) {
            let mut ring = SampleRing::new(64);
            let mut model = std::collections::VecDeque::new();
            let mut next = 0.0f32;

            for (w, r) in ops {
                let chunk: Vec<f32> = (0..w).map(|i| next + i as f32).collect();
                next += w as f32;
                let written = ring.write(&chunk);
                model.extend(chunk[..written].iter().copied());

                let mut out = vec![0.0; r];
                let got = ring.read(&mut out);
                prop_assert_eq!(got, r.min(model.len()));
                let want: Vec<f32> = model.drain(..got).collect();
                prop_assert_eq!(&out[..got], &want[..]);
            }
        }
    }
}
