//! Per-scope aggregates and their preallocated pool

use crate::registry::ScopeName;
use crate::sample_ring::SampleRing;
use std::mem::MaybeUninit;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Records per pool page. Power of two so index math stays shift/mask.
const ROWS_PER_PAGE: usize = 64;

/// Aggregated timing data for one scope within a session.
///
/// Mutated only by the merge step (single writer under the merge lock).
/// The scalar aggregates are relaxed atomics so the emergency-flush path
/// and display queries can read them without taking that lock.
pub struct ProfileRecord {
    name: ScopeName,
    ring: SampleRing,
    count: AtomicU64,
    sum_nanos: AtomicU64,
    min_nanos: AtomicU64,
    max_nanos: AtomicU64,
}

impl ProfileRecord {
    fn new(name: ScopeName, ring_capacity: usize) -> Self {
        Self {
            name,
            ring: SampleRing::new(ring_capacity),
            count: AtomicU64::new(0),
            sum_nanos: AtomicU64::new(0),
            min_nanos: AtomicU64::new(u64::MAX),
            max_nanos: AtomicU64::new(0),
        }
    }

    /// Fold one sample in. Min/max/sum track the whole session; the ring
    /// only retains the newest durations.
    pub fn record(&mut self, duration_nanos: u64) {
        self.ring.push(duration_nanos);
        self.count.fetch_add(1, Ordering::Relaxed);
        self.sum_nanos.fetch_add(duration_nanos, Ordering::Relaxed);
        if duration_nanos < self.min_nanos.load(Ordering::Relaxed) {
            self.min_nanos.store(duration_nanos, Ordering::Relaxed);
        }
        if duration_nanos > self.max_nanos.load(Ordering::Relaxed) {
            self.max_nanos.store(duration_nanos, Ordering::Relaxed);
        }
    }

    #[inline]
    pub fn name(&self) -> &ScopeName {
        &self.name
    }

    #[inline]
    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn sum_nanos(&self) -> u64 {
        self.sum_nanos.load(Ordering::Relaxed)
    }

    /// Session minimum, or 0 before any sample.
    pub fn min_nanos(&self) -> u64 {
        let min = self.min_nanos.load(Ordering::Relaxed);
        if min == u64::MAX {
            0
        } else {
            min
        }
    }

    #[inline]
    pub fn max_nanos(&self) -> u64 {
        self.max_nanos.load(Ordering::Relaxed)
    }

    /// Retained recent durations, oldest first.
    pub fn samples(&self) -> Vec<u64> {
        self.ring.snapshot()
    }
}

/// Preallocated bump pool of [`ProfileRecord`]s.
///
/// All pages are allocated at construction so record addresses stay stable
/// for the whole session and allocation never touches the heap on the merge
/// path. A full pool refuses new records (drop-and-count at the caller).
/// The length is a published atomic so the signal handler can walk
/// `records[0..len]` without locks.
pub struct RecordPool {
    pages: Vec<Box<[MaybeUninit<ProfileRecord>]>>,
    len: AtomicUsize,
    capacity: usize,
}

impl RecordPool {
    pub fn new(capacity: usize) -> Self {
        let page_count = capacity.div_ceil(ROWS_PER_PAGE);
        let mut pages = Vec::with_capacity(page_count);
        for _ in 0..page_count {
            let mut page: Vec<MaybeUninit<ProfileRecord>> = Vec::with_capacity(ROWS_PER_PAGE);
            // SAFETY: MaybeUninit slots need no initialization.
            unsafe { page.set_len(ROWS_PER_PAGE) };
            pages.push(page.into_boxed_slice());
        }
        Self {
            pages,
            len: AtomicUsize::new(0),
            capacity,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.len.load(Ordering::Acquire)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bump-allocate a record slot. Returns its stable index, or `None`
    /// when the pool is exhausted.
    pub fn allocate(&mut self, name: ScopeName, ring_capacity: usize) -> Option<usize> {
        let idx = self.len.load(Ordering::Relaxed);
        if idx >= self.capacity {
            return None;
        }
        self.pages[idx / ROWS_PER_PAGE][idx % ROWS_PER_PAGE]
            .write(ProfileRecord::new(name, ring_capacity));
        // Publish after the slot is fully written; the signal path reads
        // len with Acquire.
        self.len.store(idx + 1, Ordering::Release);
        Some(idx)
    }

    pub fn get(&self, idx: usize) -> Option<&ProfileRecord> {
        if idx >= self.len() {
            return None;
        }
        // SAFETY: slots below the published length are initialized.
        Some(unsafe { self.pages[idx / ROWS_PER_PAGE][idx % ROWS_PER_PAGE].assume_init_ref() })
    }

    pub fn get_mut(&mut self, idx: usize) -> Option<&mut ProfileRecord> {
        if idx >= self.len() {
            return None;
        }
        // SAFETY: slots below the published length are initialized.
        Some(unsafe { self.pages[idx / ROWS_PER_PAGE][idx % ROWS_PER_PAGE].assume_init_mut() })
    }

    pub fn iter(&self) -> impl Iterator<Item = &ProfileRecord> {
        (0..self.len()).filter_map(move |idx| self.get(idx))
    }

}

impl Drop for RecordPool {
    fn drop(&mut self) {
        let len = self.len.load(Ordering::Acquire);
        for idx in 0..len {
            // SAFETY: slots below the published length are initialized and
            // dropped exactly once here.
            unsafe {
                self.pages[idx / ROWS_PER_PAGE][idx % ROWS_PER_PAGE].assume_init_drop();
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::{scope_hash, ScopeRegistry};

    fn name_for(registry: &ScopeRegistry, label: &str) -> ScopeName {
        let id = registry.resolve(label, scope_hash(label));
        registry.name(id).unwrap()
    }

    #[test]
    fn test_record_aggregates() {
        let registry = ScopeRegistry::new(4);
        let mut pool = RecordPool::new(4);
        let idx = pool.allocate(name_for(&registry, "Update"), 8).unwrap();

        let record = pool.get_mut(idx).unwrap();
        for nanos in [300, 100, 200] {
            record.record(nanos);
        }

        let record = pool.get(idx).unwrap();
        assert_eq!(record.count(), 3);
        assert_eq!(record.sum_nanos(), 600);
        assert_eq!(record.min_nanos(), 100);
        assert_eq!(record.max_nanos(), 300);
        assert_eq!(record.samples(), vec![300, 100, 200]);
    }

    #[test]
    fn test_min_max_survive_ring_eviction() {
        let registry = ScopeRegistry::new(4);
        let mut pool = RecordPool::new(1);
        let idx = pool.allocate(name_for(&registry, "Noise"), 2).unwrap();

        let record = pool.get_mut(idx).unwrap();
        record.record(1); // will be evicted from the ring
        record.record(500);
        record.record(400);

        let record = pool.get(idx).unwrap();
        assert_eq!(record.samples(), vec![500, 400]);
        // Session extremes keep the evicted sample's contribution.
        assert_eq!(record.min_nanos(), 1);
        assert_eq!(record.max_nanos(), 500);
        assert_eq!(record.sum_nanos(), 901);
        assert_eq!(record.count(), 3);
    }

    #[test]
    fn test_pool_exhaustion() {
        let registry = ScopeRegistry::new(8);
        let mut pool = RecordPool::new(2);
        assert!(pool.is_empty());
        assert_eq!(pool.capacity(), 2);
        assert!(pool.allocate(name_for(&registry, "a"), 4).is_some());
        assert!(pool.allocate(name_for(&registry, "b"), 4).is_some());
        assert!(pool.allocate(name_for(&registry, "c"), 4).is_none());
        assert_eq!(pool.len(), 2);
    }

    #[test]
    fn test_pool_spans_pages() {
        let registry = ScopeRegistry::new(256);
        let capacity = ROWS_PER_PAGE * 2 + 3;
        let mut pool = RecordPool::new(capacity);
        for i in 0..capacity {
            let label = format!("scope_{i}");
            let idx = pool.allocate(name_for(&registry, &label), 4).unwrap();
            assert_eq!(idx, i);
        }
        assert_eq!(pool.iter().count(), capacity);
        assert_eq!(
            pool.get(capacity - 1).unwrap().name().label(),
            format!("scope_{}", capacity - 1)
        );
    }

    #[test]
    fn test_zero_before_samples() {
        let registry = ScopeRegistry::new(4);
        let mut pool = RecordPool::new(1);
        let idx = pool.allocate(name_for(&registry, "Idle"), 4).unwrap();
        let record = pool.get(idx).unwrap();
        assert_eq!(record.min_nanos(), 0);
        assert_eq!(record.max_nanos(), 0);
        assert_eq!(record.count(), 0);
    }
}
