//! Bounded frame queues between the real-time callbacks and the network loop
//!
//! Each queue has exactly one producer and one consumer. The lock is held
//! only for the push or pop itself, never across I/O, and a full queue drops
//! the incoming item (drop-newest) instead of blocking the producer.

use bytes::Bytes;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};

/// Drop-newest bounded FIFO
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    overflow_count: AtomicU64,
}

impl<T> BoundedQueue<T> {
    /// Create a queue holding at most `capacity` items
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity)),
            capacity,
            overflow_count: AtomicU64::new(0),
        }
    }

    /// Append `item`. Returns false and discards it if the queue is full.
    pub fn push(&self, item: T) -> bool {
        let mut items = self.items.lock();
        if items.len() >= self.capacity {
            drop(items);
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        items.push_back(item);
        true
    }

    /// Take everything queued, oldest first, in one lock acquisition
    pub fn drain_all(&self) -> Vec<T> {
        let mut items = self.items.lock();
        items.drain(..).collect()
    }

    /// Move everything queued into `out`, oldest first. Reuses `out`'s
    /// allocation across network loop iterations.
    pub fn drain_into(&self, out: &mut Vec<T>) {
        let mut items = self.items.lock();
        out.extend(items.drain(..));
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Items discarded because the queue was full
    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        self.items.lock().clear();
    }
}

struct PlaybackInner {
    frames: VecDeque<Vec<f32>>,
    /// Samples of the head frame already handed to playback
    head_offset: usize,
}

/// Inbound jitter buffer of decoded PCM frames.
///
/// Playback may consume a frame partially; the unconsumed remainder stays at
/// the head for the next callback.
pub struct PlaybackBuffer {
    inner: Mutex<PlaybackInner>,
    capacity: usize,
    overflow_count: AtomicU64,
    underrun_count: AtomicU64,
}

impl PlaybackBuffer {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(PlaybackInner {
                frames: VecDeque::with_capacity(capacity),
                head_offset: 0,
            }),
            capacity,
            overflow_count: AtomicU64::new(0),
            underrun_count: AtomicU64::new(0),
        }
    }

    /// Queue a decoded frame; dropped if the buffer is full
    pub fn push(&self, frame: Vec<f32>) -> bool {
        if frame.is_empty() {
            return false;
        }
        let mut inner = self.inner.lock();
        if inner.frames.len() >= self.capacity {
            drop(inner);
            self.overflow_count.fetch_add(1, Ordering::Relaxed);
            return false;
        }
        inner.frames.push_back(frame);
        true
    }

    /// Fill `out` completely: queued samples first, silence for the rest.
    /// Returns how many samples came from the queue. Never blocks beyond the
    /// short lock and never allocates.
    pub fn pop_into(&self, out: &mut [f32]) -> usize {
        let mut written = 0;
        {
            let mut inner = self.inner.lock();
            while written < out.len() {
                let offset = inner.head_offset;
                let Some(head) = inner.frames.front() else {
                    break;
                };

                let available = &head[offset..];
                let take = available.len().min(out.len() - written);
                out[written..written + take].copy_from_slice(&available[..take]);
                written += take;

                if take == available.len() {
                    inner.frames.pop_front();
                    inner.head_offset = 0;
                } else {
                    inner.head_offset += take;
                }
            }
        }

        if written < out.len() {
            out[written..].fill(0.0);
            self.underrun_count.fetch_add(1, Ordering::Relaxed);
        }
        written
    }

    /// Frames queued, counting a partially consumed head as one
    pub fn len(&self) -> usize {
        self.inner.lock().frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().frames.is_empty()
    }

    /// Unconsumed samples in the head frame
    pub fn head_len(&self) -> usize {
        let inner = self.inner.lock();
        inner
            .frames
            .front()
            .map(|head| head.len() - inner.head_offset)
            .unwrap_or(0)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn overflow_count(&self) -> u64 {
        self.overflow_count.load(Ordering::Relaxed)
    }

    /// Callbacks that had to pad with silence
    pub fn underrun_count(&self) -> u64 {
        self.underrun_count.load(Ordering::Relaxed)
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock();
        inner.frames.clear();
        inner.head_offset = 0;
    }
}

/// Outbound (capture to network) and inbound (network to playback) queues
pub struct FrameQueues {
    pub outbound: BoundedQueue<Bytes>,
    pub inbound: PlaybackBuffer,
}

impl FrameQueues {
    pub fn new(outbound_capacity: usize, inbound_capacity: usize) -> Self {
        Self {
            outbound: BoundedQueue::new(outbound_capacity),
            inbound: PlaybackBuffer::new(inbound_capacity),
        }
    }

    pub fn clear(&self) {
        self.outbound.clear();
        self.inbound.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_bounded_queue_basic() {
        let queue = BoundedQueue::new(4);
        assert!(queue.push(1));
        assert!(queue.push(2));
        assert_eq!(queue.len(), 2);
        assert_eq!(queue.drain_all(), vec![1, 2]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_burst_keeps_oldest() {
        let queue = BoundedQueue::new(3);
        for i in 0..10 {
            queue.push(i);
        }
        assert_eq!(queue.len(), 3);
        assert_eq!(queue.overflow_count(), 7);
        assert_eq!(queue.drain_all(), vec![0, 1, 2]);
    }

    #[test]
    fn test_drain_into_appends() {
        let queue = BoundedQueue::new(3);
        queue.push(7);
        queue.push(8);
        let mut out = vec![6];
        queue.drain_into(&mut out);
        assert_eq!(out, vec![6, 7, 8]);
        assert!(queue.is_empty());
    }

    #[test]
    fn test_pop_empty_is_silence() {
        let buffer = PlaybackBuffer::new(4);
        let mut out = [1.0f32; 16];
        assert_eq!(buffer.pop_into(&mut out), 0);
        assert!(out.iter().all(|s| *s == 0.0));
        assert_eq!(buffer.underrun_count(), 1);
    }

    #[test]
    fn test_partial_consumption() {
        let buffer = PlaybackBuffer::new(4);
        let frame: Vec<f32> = (1..=10).map(|i| i as f32).collect();
        buffer.push(frame.clone());

        let mut first = [0.0f32; 4];
        assert_eq!(buffer.pop_into(&mut first), 4);
        assert_eq!(buffer.head_len(), 6);
        assert_eq!(buffer.len(), 1);

        let mut second = [9.0f32; 8];
        assert_eq!(buffer.pop_into(&mut second), 6);
        assert!(buffer.is_empty());

        let mut joined = first.to_vec();
        joined.extend_from_slice(&second[..6]);
        assert_eq!(joined, frame);
        assert_eq!(&second[6..], &[0.0, 0.0]);
    }

    #[test]
    fn test_pop_spans_frames() {
        let buffer = PlaybackBuffer::new(4);
        buffer.push(vec![1.0; 3]);
        buffer.push(vec![2.0; 3]);

        let mut out = [0.0f32; 4];
        assert_eq!(buffer.pop_into(&mut out), 4);
        assert_eq!(out, [1.0, 1.0, 1.0, 2.0]);
        assert_eq!(buffer.head_len(), 2);
    }

    #[test]
    fn test_playback_overflow_drops_newest() {
        let buffer = PlaybackBuffer::new(2);
        assert!(buffer.push(vec![1.0]));
        assert!(buffer.push(vec![2.0]));
        assert!(!buffer.push(vec![3.0]));
        assert_eq!(buffer.overflow_count(), 1);

        let mut out = [0.0f32; 3];
        buffer.pop_into(&mut out);
        assert_eq!(out, [1.0, 2.0, 0.0]);
    }

    #[test]
    fn test_empty_frame_ignored() {
        let buffer = PlaybackBuffer::new(2);
        assert!(!buffer.push(Vec::new()));
        assert!(buffer.is_empty());
    }

    proptest! {
        #[test]
        fn prop_length_never_exceeds_capacity(
            capacity in 1usize..8,
            pushes in proptest::collection::vec(any::<u16>(), 0..64),
        ) {
            let queue = BoundedQueue::new(capacity);
            for (i, value) in pushes.iter().enumerate() {
                let before = queue.len();
                let accepted = queue.push(*value);
                prop_assert!(queue.len() <= capacity);
                if before == capacity {
                    prop_assert!(!accepted);
                    prop_assert_eq!(queue.len(), before);
                }
                prop_assert_eq!(queue.len(), (i + 1).min(capacity));
            }
            let kept = queue.drain_all();
            prop_assert_eq!(&kept[..], &pushes[..pushes.len().min(capacity)]);
        }
    }
}
