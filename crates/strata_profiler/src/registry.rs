//! Scope name interning

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

/// FNV-1a over the label bytes. `const fn` so instrumentation macros can
/// hash string literals at compile time.
pub const fn scope_hash(label: &str) -> u64 {
    let bytes = label.as_bytes();
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    let mut i = 0;
    while i < bytes.len() {
        hash ^= bytes[i] as u64;
        hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        i += 1;
    }
    hash
}

/// Identifier of an interned scope name.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub struct ScopeId(pub(crate) u32);

impl ScopeId {
    /// Sentinel returned when the registry is full. Samples carrying it are
    /// dropped and counted rather than allocated for.
    pub const UNRESOLVED: ScopeId = ScopeId(u32::MAX);

    #[inline]
    pub fn is_resolved(self) -> bool {
        self != Self::UNRESOLVED
    }
}

/// An interned scope label with its precomputed hash. Lives for the
/// lifetime of the registry; never removed during a session.
#[derive(Debug, Clone)]
pub struct ScopeName {
    label: Arc<str>,
    hash: u64,
}

impl ScopeName {
    #[inline]
    pub fn label(&self) -> &str {
        &self.label
    }

    #[inline]
    pub fn hash(&self) -> u64 {
        self.hash
    }

    pub(crate) fn label_arc(&self) -> Arc<str> {
        Arc::clone(&self.label)
    }

    /// Raw pointer/length view of the label bytes for the signal path.
    /// The backing allocation is stable for the registry's lifetime.
    pub(crate) fn label_raw(&self) -> (*const u8, usize) {
        (self.label.as_ptr(), self.label.len())
    }
}

struct RegistryInner {
    // 64-bit label hashes are treated as unique; the first label seen for
    // a hash owns its id.
    by_hash: HashMap<u64, ScopeId>,
    names: Vec<ScopeName>,
}

/// Capacity-bounded intern table mapping scope labels to stable ids.
///
/// Insertion is serialized under an internal lock; the per-thread fast-path
/// cache keeps resolved scopes off this lock entirely.
pub struct ScopeRegistry {
    inner: Mutex<RegistryInner>,
    capacity: usize,
}

impl ScopeRegistry {
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(RegistryInner {
                by_hash: HashMap::with_capacity(capacity),
                names: Vec::with_capacity(capacity),
            }),
            capacity,
        }
    }

    /// Return the id for `label`, interning it on first sight. Returns
    /// [`ScopeId::UNRESOLVED`] once the registry is full.
    pub fn resolve(&self, label: &str, hash: u64) -> ScopeId {
        let mut inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if let Some(&id) = inner.by_hash.get(&hash) {
            return id;
        }
        if inner.names.len() >= self.capacity {
            return ScopeId::UNRESOLVED;
        }
        let id = ScopeId(inner.names.len() as u32);
        inner.names.push(ScopeName {
            label: Arc::from(label),
            hash,
        });
        inner.by_hash.insert(hash, id);
        id
    }

    /// Interned name for a resolved id.
    pub fn name(&self, id: ScopeId) -> Option<ScopeName> {
        if !id.is_resolved() {
            return None;
        }
        let inner = match self.inner.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        inner.names.get(id.0 as usize).cloned()
    }

    pub fn len(&self) -> usize {
        match self.inner.lock() {
            Ok(guard) => guard.names.len(),
            Err(poisoned) => poisoned.into_inner().names.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
