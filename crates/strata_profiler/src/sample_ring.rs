//! Bounded ring of recent sample durations

use crate::inline_seq::InlineSequence;

/// Durations kept inline before spilling; covers the common `max_samples`
/// range without heap allocation.
const INLINE_SAMPLES: usize = 32;

/// FIFO ring holding the most recent `capacity` sample durations, in ticks.
///
/// Eviction only forgets the raw duration; session-lifetime aggregates
/// (count/min/max/sum) live on the owning record and are never recomputed
/// from this ring.
pub struct SampleRing {
    samples: InlineSequence<u64, INLINE_SAMPLES>,
    capacity: usize,
    next: usize,
}

impl SampleRing {
    pub fn new(capacity: usize) -> Self {
        debug_assert!(capacity > 0);
        Self {
            samples: InlineSequence::new(),
            capacity,
            next: 0,
        }
    }

    pub fn push(&mut self, ticks: u64) {
        if self.samples.len() < self.capacity {
            self.samples.push(ticks);
        } else {
            let slot = self
                .samples
                .get_mut(self.next)
                .expect("ring cursor within filled range");
            *slot = ticks;
        }
        self.next = (self.next + 1) % self.capacity;
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.samples.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Retained samples, oldest first.
    pub fn snapshot(&self) -> Vec<u64> {
        let len = self.samples.len();
        let mut out = Vec::with_capacity(len);
        // Once full, `next` points at the oldest retained sample.
        let start = if len < self.capacity { 0 } else { self.next };
        for i in 0..len {
            let idx = (start + i) % len.max(1);
            if let Some(&v) = self.samples.get(idx) {
                out.push(v);
            }
        }
        out
    }

    pub fn clear(&mut self) {
        self.samples.clear();
        self.next = 0;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fills_then_evicts_oldest() {
        let mut ring = SampleRing::new(3);
        ring.push(1);
        ring.push(2);
        assert_eq!(ring.snapshot(), vec![1, 2]);

        ring.push(3);
        ring.push(4); // evicts 1
        assert_eq!(ring.len(), 3);
        assert_eq!(ring.snapshot(), vec![2, 3, 4]);

        ring.push(5);
        ring.push(6);
        ring.push(7); // full wrap
        assert_eq!(ring.snapshot(), vec![5, 6, 7]);
    }

    #[test]
    fn test_capacity_one() {
        let mut ring = SampleRing::new(1);
        ring.push(10);
        ring.push(20);
        assert_eq!(ring.snapshot(), vec![20]);
    }

    #[test]
    fn test_clear() {
        let mut ring = SampleRing::new(2);
        ring.push(1);
        ring.push(2);
        ring.push(3);
        ring.clear();
        assert!(ring.is_empty());
        ring.push(9);
        assert_eq!(ring.snapshot(), vec![9]);
    }

    #[test]
    fn test_spills_past_inline_block() {
        let mut ring = SampleRing::new(64);
        for v in 0..64 {
            ring.push(v);
        }
        let snap = ring.snapshot();
        assert_eq!(snap.len(), 64);
        assert_eq!(snap[0], 0);
        assert_eq!(snap[63], 63);

        ring.push(64); // evicts 0
        let snap = ring.snapshot();
        assert_eq!(snap[0], 1);
        assert_eq!(snap[63], 64);
    }
}
