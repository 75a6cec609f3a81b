//! Per-thread sample buffers and the fast-path scope cache

use crate::registry::ScopeId;
use std::cell::UnsafeCell;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;

/// Direct-mapped cache slots per thread. Power of two.
const CACHE_SLOTS: usize = 64;

/// Process-unique thread ids, assigned on first instrumentation.
static NEXT_THREAD_ID: AtomicU64 = AtomicU64::new(1);

pub(crate) fn alloc_thread_id() -> u64 {
    NEXT_THREAD_ID.fetch_add(1, Ordering::Relaxed)
}

/// One raw timing measurement, produced at scope exit and consumed by the
/// next merge. Never retained past a flush.
#[derive(Debug, Copy, Clone)]
pub struct RawSample {
    pub scope_id: ScopeId,
    pub duration_nanos: u64,
    /// Nanoseconds since the owning context was created.
    pub timestamp_nanos: u64,
    pub thread_id: u64,
}

/// Single-producer ring of raw samples.
///
/// The owning thread is the only appender; `append` is lock-free and
/// allocation-free. Draining is serialized by a per-buffer mutex so the
/// context can force-drain any live buffer at frame and session boundaries
/// without cooperation from the owner.
pub(crate) struct SampleBuffer {
    slots: Box<[UnsafeCell<MaybeUninit<RawSample>>]>,
    mask: usize,
    /// Total appended; owner-only writes, Release on publish.
    head: AtomicUsize,
    /// Total consumed; written only under `drain_lock`.
    tail: AtomicUsize,
    drain_lock: Mutex<()>,
}

// SAFETY: slots are written only by the owning thread before the matching
// Release store of `head`, and read only for indices below an Acquire load
// of `head` while `drain_lock` serializes consumers. No slot is read and
// written concurrently.
unsafe impl Send for SampleBuffer {}
unsafe impl Sync for SampleBuffer {}

impl SampleBuffer {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.next_power_of_two();
        let slots = (0..capacity)
            .map(|_| UnsafeCell::new(MaybeUninit::uninit()))
            .collect::<Vec<_>>()
            .into_boxed_slice();
        Self {
            slots,
            mask: capacity - 1,
            head: AtomicUsize::new(0),
            tail: AtomicUsize::new(0),
            drain_lock: Mutex::new(()),
        }
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    /// Pending (appended but not yet drained) samples.
    #[inline]
    pub fn len(&self) -> usize {
        self.head.load(Ordering::Relaxed) - self.tail.load(Ordering::Relaxed)
    }

    /// Append one sample. Returns false when the ring is full; the caller
    /// then drains (flushes) and retries, or drops the sample.
    ///
    /// Must only be called from the owning thread.
    #[inline]
    pub fn try_append(&self, sample: RawSample) -> bool {
        let head = self.head.load(Ordering::Relaxed);
        let tail = self.tail.load(Ordering::Acquire);
        if head - tail == self.slots.len() {
            return false;
        }
        // SAFETY: single producer; this slot is past `tail + capacity`
        // wrap distance from any unconsumed sample and is not visible to
        // consumers until the Release store below.
        unsafe {
            (*self.slots[head & self.mask].get()).write(sample);
        }
        self.head.store(head + 1, Ordering::Release);
        true
    }

    /// Consume every published sample, oldest first. Safe from any thread;
    /// concurrent drains serialize on the internal lock. Returns the number
    /// of samples consumed.
    pub fn drain(&self, mut consume: impl FnMut(RawSample)) -> usize {
        let _guard = match self.drain_lock.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let tail = self.tail.load(Ordering::Relaxed);
        let head = self.head.load(Ordering::Acquire);
        for idx in tail..head {
            // SAFETY: indices below the Acquire-loaded head are fully
            // written and not yet consumed (tail is only advanced here,
            // under the drain lock).
            let sample = unsafe { (*self.slots[idx & self.mask].get()).assume_init_read() };
            consume(sample);
        }
        self.tail.store(head, Ordering::Release);
        head - tail
    }
}

/// Direct-mapped hash → scope-id cache, one per thread.
///
/// Avoids the registry lock for hot scopes. A slot is trusted only when its
/// stored hash matches the query exactly; collisions overwrite the prior
/// occupant unconditionally. Slots are relaxed atomics purely so the struct
/// stays `Sync` inside the shared thread handle; only the owning thread
/// touches them.
pub(crate) struct FastPathCache {
    hashes: [AtomicU64; CACHE_SLOTS],
    ids: [AtomicU32; CACHE_SLOTS],
}

impl FastPathCache {
    pub fn new() -> Self {
        Self {
            hashes: std::array::from_fn(|_| AtomicU64::new(0)),
            ids: std::array::from_fn(|_| AtomicU32::new(ScopeId::UNRESOLVED.0)),
        }
    }

    #[inline]
    fn slot(hash: u64) -> usize {
        hash as usize & (CACHE_SLOTS - 1)
    }

    #[inline]
    pub fn lookup(&self, hash: u64) -> Option<ScopeId> {
        let slot = Self::slot(hash);
        if self.hashes[slot].load(Ordering::Relaxed) == hash {
            let id = ScopeId(self.ids[slot].load(Ordering::Relaxed));
            if id.is_resolved() {
                return Some(id);
            }
        }
        None
    }

    #[inline]
    pub fn insert(&self, hash: u64, id: ScopeId) {
        let slot = Self::slot(hash);
        self.hashes[slot].store(hash, Ordering::Relaxed);
        self.ids[slot].store(id.0, Ordering::Relaxed);
    }

    pub fn invalidate(&self) {
        for slot in 0..CACHE_SLOTS {
            self.hashes[slot].store(0, Ordering::Relaxed);
            self.ids[slot].store(ScopeId::UNRESOLVED.0, Ordering::Relaxed);
        }
    }
}

/// Per-thread profiling state: the sample buffer plus the fast-path cache.
/// Registered with the owning context on the thread's first sample so
/// session teardown can reach every live buffer.
pub(crate) struct ThreadProfiler {
    pub thread_id: u64,
    pub buffer: SampleBuffer,
    pub cache: FastPathCache,
}

impl ThreadProfiler {
    pub fn new(buffer_capacity: usize) -> Self {
        Self {
            thread_id: alloc_thread_id(),
            buffer: SampleBuffer::new(buffer_capacity),
            cache: FastPathCache::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn sample(scope: u32, nanos: u64) -> RawSample {
        RawSample {
            scope_id: ScopeId(scope),
            duration_nanos: nanos,
            timestamp_nanos: 0,
            thread_id: 0,
        }
    }

    #[test]
    fn test_append_then_drain_in_order() {
        let buffer = SampleBuffer::new(8);
        for i in 0..5 {
            assert!(buffer.try_append(sample(0, i)));
        }
        assert_eq!(buffer.len(), 5);

        let mut seen = Vec::new();
        let drained = buffer.drain(|s| seen.push(s.duration_nanos));
        assert_eq!(drained, 5);
        assert_eq!(seen, vec![0, 1, 2, 3, 4]);
        assert_eq!(buffer.len(), 0);
    }

    #[test]
    fn test_drain_preserves_sample_fields() {
        let buffer = SampleBuffer::new(4);
        buffer.try_append(RawSample {
            scope_id: ScopeId(3),
            duration_nanos: 1_500,
            timestamp_nanos: 9_000,
            thread_id: 7,
        });
        let mut drained = Vec::new();
        buffer.drain(|s| drained.push(s));
        assert_eq!(drained.len(), 1);
        assert_eq!(drained[0].scope_id, ScopeId(3));
        assert_eq!(drained[0].duration_nanos, 1_500);
        assert_eq!(drained[0].timestamp_nanos, 9_000);
        assert_eq!(drained[0].thread_id, 7);
    }

    #[test]
    fn test_append_fails_at_capacity() {
        let buffer = SampleBuffer::new(4);
        for i in 0..4 {
            assert!(buffer.try_append(sample(0, i)));
        }
        assert!(!buffer.try_append(sample(0, 99)));
        assert_eq!(buffer.len(), buffer.capacity());

        // Draining makes room again.
        buffer.drain(|_| {});
        assert!(buffer.try_append(sample(0, 99)));
    }

    #[test]
    fn test_occupancy_never_exceeds_capacity() {
        let buffer = SampleBuffer::new(16);
        for i in 0..200 {
            if !buffer.try_append(sample(0, i)) {
                buffer.drain(|_| {});
                assert!(buffer.try_append(sample(0, i)));
            }
            assert!(buffer.len() <= buffer.capacity());
        }
    }

    #[test]
    fn test_cross_thread_drain() {
        let buffer = Arc::new(SampleBuffer::new(64));
        let producer = Arc::clone(&buffer);
        let handle = std::thread::spawn(move || {
            for i in 0..40 {
                assert!(producer.try_append(sample(1, i)));
            }
        });
        handle.join().unwrap();

        let mut total = 0u64;
        buffer.drain(|s| total += s.duration_nanos);
        assert_eq!(total, (0..40).sum::<u64>());
    }

    #[test]
    fn test_cache_hit_requires_exact_hash() {
        let cache = FastPathCache::new();
        assert_eq!(cache.lookup(0xdead_beef), None);

        cache.insert(0xdead_beef, ScopeId(7));
        assert_eq!(cache.lookup(0xdead_beef), Some(ScopeId(7)));

        // Same slot, different hash: must miss, never alias.
        let colliding = 0xdead_beef ^ ((CACHE_SLOTS as u64) << 32);
        assert_eq!(colliding as usize & (CACHE_SLOTS - 1), 0xdead_beef as usize & (CACHE_SLOTS - 1));
        assert_eq!(cache.lookup(colliding), None);

        // Collision overwrite evicts the prior occupant.
        cache.insert(colliding, ScopeId(9));
        assert_eq!(cache.lookup(colliding), Some(ScopeId(9)));
        assert_eq!(cache.lookup(0xdead_beef), None);
    }

    #[test]
    fn test_cache_invalidate() {
        let cache = FastPathCache::new();
        cache.insert(42, ScopeId(1));
        cache.invalidate();
        assert_eq!(cache.lookup(42), None);
    }

    #[test]
    fn test_thread_ids_unique() {
        let a = ThreadProfiler::new(16);
        let b = ThreadProfiler::new(16);
        assert_ne!(a.thread_id, b.thread_id);
    }
}
