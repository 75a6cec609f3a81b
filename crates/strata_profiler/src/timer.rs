//! Scoped RAII timing handle

use crate::context::ProfilerContext;
use crate::registry::scope_hash;
use std::time::Instant;

/// Measures the lifetime of a scope and submits exactly one sample when
/// dropped, on every exit path (normal return, early return, unwind).
///
/// Construction is uniform whether or not the profiler is active; a
/// disabled or idle profiler turns submission into a cheap no-op check.
pub struct ScopedTimer<'a> {
    ctx: Option<&'a ProfilerContext>,
    label: &'a str,
    hash: u64,
    start: Instant,
}

impl<'a> ScopedTimer<'a> {
    /// Time a scope against an explicit context.
    pub fn new(ctx: &'a ProfilerContext, label: &'a str) -> Self {
        Self::with_hash(ctx, label, scope_hash(label))
    }

    /// Like [`ScopedTimer::new`] with a precomputed label hash.
    pub fn with_hash(ctx: &'a ProfilerContext, label: &'a str, hash: u64) -> Self {
        Self {
            ctx: Some(ctx),
            label,
            hash,
            start: Instant::now(),
        }
    }

    /// Time a scope against the global context; a no-op handle when the
    /// global profiler is not initialized. Used by `profile_scope!`, which
    /// hashes the label at compile time.
    pub fn global(label: &'static str, hash: u64) -> ScopedTimer<'static> {
        ScopedTimer {
            ctx: crate::global(),
            label,
            hash,
            start: Instant::now(),
        }
    }

    /// Global-context handle for labels only known at runtime.
    pub fn global_dynamic(label: &'static str) -> ScopedTimer<'static> {
        Self::global(label, scope_hash(label))
    }
}

impl Drop for ScopedTimer<'_> {
    fn drop(&mut self) {
        if let Some(ctx) = self.ctx {
            let elapsed = self.start.elapsed();
            ctx.record_scope_hashed(self.label, self.hash, elapsed);
        }
    }
}
