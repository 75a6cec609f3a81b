//! Strata Profiler - In-process scope timing for soft-realtime workloads
//!
//! Threads record scope durations through [`ScopedTimer`] handles (usually
//! via the [`profile_scope!`] / [`profile_function!`] macros) into
//! lock-free thread-local buffers. Batches are merged into preallocated
//! per-scope aggregates under a single lock, exported as JSON traces, and
//! dumped in a signal handler if the process dies mid-session.
//!
//! # Feature Flags
//!
//! - `profiling` - Enable the instrumentation macros (default: enabled).
//!   Without it the macros expand to nothing; the library API stays
//!   available either way.
//!
//! # Usage
//!
//! ```ignore
//! strata_profiler::init(ProfilerConfig::default())?;
//! let ctx = strata_profiler::global().unwrap();
//! ctx.begin_session("level-load")?;
//!
//! {
//!     profile_scope!("Terrain::GenerateChunk");
//!     generate_chunk();
//! }
//! ctx.end_frame();
//!
//! ctx.end_session()?;
//! ```

pub mod config;
pub mod context;
pub mod error;
pub mod registry;
pub mod timer;

mod export;
mod inline_seq;
mod record;
mod sample_ring;
mod signal;
mod thread_buffer;

pub use config::{OutputFormat, Precision, ProfilerConfig};
pub use context::{ProfileSnapshot, ProfilerContext, ScopeStats, SessionState};
pub use error::ProfilerError;
pub use registry::{scope_hash, ScopeId};
pub use timer::ScopedTimer;

use once_cell::sync::OnceCell;

static GLOBAL: OnceCell<ProfilerContext> = OnceCell::new();

/// Install the process-wide profiler. Call once at startup, before any
/// instrumented code runs; later calls fail with `AlreadyInitialized`.
pub fn init(config: ProfilerConfig) -> Result<(), ProfilerError> {
    let ctx = ProfilerContext::new(config)?;
    GLOBAL
        .set(ctx)
        .map_err(|_| ProfilerError::AlreadyInitialized)
}

/// The process-wide profiler, if [`init`] has run.
pub fn global() -> Option<&'static ProfilerContext> {
    GLOBAL.get()
}

/// End any active global session and export its data. Instrumentation
/// after shutdown is discarded at the session-state check.
pub fn shutdown() -> Result<(), ProfilerError> {
    let Some(ctx) = GLOBAL.get() else {
        return Ok(());
    };
    match ctx.end_session() {
        Err(ProfilerError::NoSession) => Ok(()),
        other => other,
    }
}

// ============================================================================
// Instrumentation macros
// ============================================================================

/// Time the enclosing block under a static label. The label hash is
/// computed at compile time; the sample is submitted when the guard drops.
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_scope {
    ($label:expr) => {
        let _profile_guard = {
            const __LABEL: &str = $label;
            const __HASH: u64 = $crate::scope_hash(__LABEL);
            $crate::ScopedTimer::global(__LABEL, __HASH)
        };
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_scope {
    ($label:expr) => {};
}

/// Time the enclosing function, labelled with its module path.
#[cfg(feature = "profiling")]
#[macro_export]
macro_rules! profile_function {
    () => {
        let _profile_guard = {
            fn __here() {}
            fn __name_of<T>(_: T) -> &'static str {
                ::std::any::type_name::<T>()
            }
            let __label = __name_of(__here);
            let __label = __label.strip_suffix("::__here").unwrap_or(__label);
            $crate::ScopedTimer::global_dynamic(__label)
        };
    };
}

#[cfg(not(feature = "profiling"))]
#[macro_export]
macro_rules! profile_function {
    () => {};
}
