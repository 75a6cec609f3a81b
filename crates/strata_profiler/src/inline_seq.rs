//! Fixed-inline-capacity sequence with heap spill

use std::mem::MaybeUninit;

/// A growable sequence whose first `N` elements live inline; elements past
/// `N` spill to a heap vector. Bounded sample sets stay allocation-free as
/// long as they fit the inline block.
pub struct InlineSequence<T, const N: usize> {
    inline: [MaybeUninit<T>; N],
    inline_len: usize,
    spill: Vec<T>,
}

impl<T, const N: usize> InlineSequence<T, N> {
    pub fn new() -> Self {
        Self {
            // SAFETY: an array of MaybeUninit does not require initialization.
            inline: unsafe { MaybeUninit::uninit().assume_init() },
            inline_len: 0,
            spill: Vec::new(),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.inline_len + self.spill.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[inline]
    pub fn spilled(&self) -> bool {
        !self.spill.is_empty()
    }

    pub fn push(&mut self, value: T) {
        if self.inline_len < N {
            self.inline[self.inline_len].write(value);
            self.inline_len += 1;
        } else {
            self.spill.push(value);
        }
    }

    pub fn get(&self, index: usize) -> Option<&T> {
        if index < self.inline_len {
            // SAFETY: entries 0..inline_len are initialized.
            Some(unsafe { self.inline[index].assume_init_ref() })
        } else {
            self.spill.get(index.checked_sub(N)?)
        }
    }

    pub fn get_mut(&mut self, index: usize) -> Option<&mut T> {
        if index < self.inline_len {
            // SAFETY: entries 0..inline_len are initialized.
            Some(unsafe { self.inline[index].assume_init_mut() })
        } else {
            self.spill.get_mut(index.checked_sub(N)?)
        }
    }

    /// Initialized prefix stored inline.
    #[inline]
    fn inline_slice(&self) -> &[T] {
        // SAFETY: entries 0..inline_len are initialized and contiguous.
        unsafe { std::slice::from_raw_parts(self.inline.as_ptr() as *const T, self.inline_len) }
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.inline_slice().iter().chain(self.spill.iter())
    }

    pub fn clear(&mut self) {
        for slot in &mut self.inline[..self.inline_len] {
            // SAFETY: entries 0..inline_len are initialized; clearing drops
            // each exactly once before resetting the length.
            unsafe { slot.assume_init_drop() };
        }
        self.inline_len = 0;
        self.spill.clear();
    }
}

impl<T, const N: usize> Drop for InlineSequence<T, N> {
    fn drop(&mut self) {
        self.clear();
    }
}

impl<T, const N: usize> Default for InlineSequence<T, N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_push_within_inline() {
        let mut seq: InlineSequence<u64, 4> = InlineSequence::new();
        for v in 0..4 {
            seq.push(v);
        }
        assert_eq!(seq.len(), 4);
        assert!(!seq.spilled());
        assert_eq!(seq.iter().copied().collect::<Vec<_>>(), vec![0, 1, 2, 3]);

        let mut partial: InlineSequence<u64, 4> = InlineSequence::new();
        partial.push(7);
        assert_eq!(partial.get(0), Some(&7));
        assert_eq!(partial.get(2), None);
    }

    #[test]
    fn test_spill_preserves_order() {
        let mut seq: InlineSequence<u64, 2> = InlineSequence::new();
        for v in 0..6 {
            seq.push(v);
        }
        assert_eq!(seq.len(), 6);
        assert!(seq.spilled());
        assert_eq!(
            seq.iter().copied().collect::<Vec<_>>(),
            vec![0, 1, 2, 3, 4, 5]
        );
        assert_eq!(seq.get(0), Some(&0));
        assert_eq!(seq.get(5), Some(&5));
        assert_eq!(seq.get(6), None);
    }

    #[test]
    fn test_get_mut_across_boundary() {
        let mut seq: InlineSequence<u64, 2> = InlineSequence::new();
        for v in 0..4 {
            seq.push(v);
        }
        *seq.get_mut(1).unwrap() = 10;
        *seq.get_mut(3).unwrap() = 30;
        assert_eq!(seq.iter().copied().collect::<Vec<_>>(), vec![0, 10, 2, 30]);
    }

    #[test]
    fn test_clear_drops_inline_elements() {
        static DROPS: AtomicUsize = AtomicUsize::new(0);

        struct Tracked;
        impl Drop for Tracked {
            fn drop(&mut self) {
                DROPS.fetch_add(1, Ordering::SeqCst);
            }
        }

        let mut seq: InlineSequence<Tracked, 4> = InlineSequence::new();
        seq.push(Tracked);
        seq.push(Tracked);
        seq.clear();
        assert_eq!(DROPS.load(Ordering::SeqCst), 2);
        assert!(seq.is_empty());

        seq.push(Tracked);
        drop(seq);
        assert_eq!(DROPS.load(Ordering::SeqCst), 3);
    }
}
