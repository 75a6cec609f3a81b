//! Profiler context: session state machine, merge, frame capture, autosave

use crate::config::{OutputFormat, Precision, ProfilerConfig};
use crate::error::ProfilerError;
use crate::export::{scope_traces, Exporter};
use crate::record::RecordPool;
use crate::registry::{scope_hash, ScopeId, ScopeRegistry};
use crate::signal;
use crate::thread_buffer::{RawSample, ThreadProfiler};
use dashmap::DashMap;
use std::cell::RefCell;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, AtomicU8, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, Weak};
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};
use strata_trace::{FrameTrace, SessionMeta, TraceFile};

/// Lifecycle of a recording session.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
#[repr(u8)]
pub enum SessionState {
    Idle = 0,
    Recording = 1,
    Paused = 2,
    Flushing = 3,
}

impl SessionState {
    fn from_u8(raw: u8) -> Self {
        match raw {
            1 => SessionState::Recording,
            2 => SessionState::Paused,
            3 => SessionState::Flushing,
            _ => SessionState::Idle,
        }
    }
}

/// Per-scope statistics in a display snapshot.
#[derive(Debug, Clone)]
pub struct ScopeStats {
    pub name: Arc<str>,
    pub count: u64,
    pub total_nanos: u64,
    pub min_nanos: u64,
    pub max_nanos: u64,
    pub avg_nanos: u64,
}

/// Read-only view of the latest flushed aggregates, refreshed at frame and
/// flush boundaries. Handed out as an `Arc` clone so overlay readers never
/// contend with the merge lock.
#[derive(Debug, Default)]
pub struct ProfileSnapshot {
    /// Nanoseconds since context creation when the snapshot was taken.
    pub taken_at_nanos: u64,
    pub scopes: Vec<ScopeStats>,
    pub dropped_samples: u64,
}

/// Active-session bookkeeping, mutated only under the merge lock.
struct SessionInfo {
    name: String,
    started_at_unix_ms: u64,
    /// Session start, nanoseconds since context creation.
    start_nanos: u64,
    precision: Precision,
    exporter: Exporter,
    autosave_interval: Duration,
}

/// Everything the merge step touches, guarded by one context-wide lock.
struct Aggregates {
    pool: RecordPool,
    by_scope: HashMap<ScopeId, usize>,
    ring_capacity: usize,
    frames: Vec<FrameTrace>,
    session: Option<SessionInfo>,
    last_export: Instant,
    has_unsaved: bool,
}

impl Aggregates {
    fn empty() -> Self {
        Self {
            pool: RecordPool::new(0),
            by_scope: HashMap::new(),
            ring_capacity: 1,
            frames: Vec::new(),
            session: None,
            last_export: Instant::now(),
            has_unsaved: false,
        }
    }
}

pub(crate) struct ContextInner {
    enabled: AtomicBool,
    state: AtomicU8,
    created_at: Instant,
    config: Mutex<ProfilerConfig>,
    /// Active batch size, mirrored out of the config for the hot path.
    batch_size: AtomicUsize,
    buffer_capacity: usize,
    registry: ScopeRegistry,
    threads: DashMap<u64, Arc<ThreadProfiler>>,
    shared: Mutex<Aggregates>,
    snapshot: Mutex<Arc<ProfileSnapshot>>,
    frames_target: AtomicU32,
    frames_captured: AtomicU32,
    dropped_registry: AtomicU64,
    dropped_pool: AtomicU64,
    dropped_buffer: AtomicU64,
}

thread_local! {
    static THREAD_SLOT: RefCell<Option<ThreadSlot>> = const { RefCell::new(None) };
}

/// A thread's registration with one context. Dropped at thread exit, which
/// flushes any pending samples and removes the buffer from the registry.
struct ThreadSlot {
    ctx: Weak<ContextInner>,
    profiler: Arc<ThreadProfiler>,
}

impl Drop for ThreadSlot {
    fn drop(&mut self) {
        if let Some(inner) = self.ctx.upgrade() {
            inner.flush_profiler(&self.profiler);
            inner.threads.remove(&self.profiler.thread_id);
        }
    }
}

impl ContextInner {
    fn shared(&self) -> MutexGuard<'_, Aggregates> {
        match self.shared.lock() {
            Ok(guard) => guard,
            // A panic inside a merge leaves consistent-enough aggregates;
            // profiling must outlive panicking instrumented threads.
            Err(poisoned) => poisoned.into_inner(),
        }
    }

    fn state(&self) -> SessionState {
        SessionState::from_u8(self.state.load(Ordering::Acquire))
    }

    fn dropped_total(&self) -> u64 {
        self.dropped_registry.load(Ordering::Relaxed)
            + self.dropped_pool.load(Ordering::Relaxed)
            + self.dropped_buffer.load(Ordering::Relaxed)
    }

    fn now_nanos(&self) -> u64 {
        self.created_at.elapsed().as_nanos() as u64
    }

    /// Hot path: resolve the scope and append one sample to the calling
    /// thread's buffer. Lock-free except on a cache miss (registry lock)
    /// or when a batch/full buffer triggers a merge.
    fn submit(self: &Arc<Self>, label: &str, hash: u64, duration_nanos: u64) {
        if !self.enabled.load(Ordering::Relaxed) {
            return;
        }
        if self.state.load(Ordering::Relaxed) != SessionState::Recording as u8 {
            return;
        }
        // try_with: submissions during thread teardown (after the TLS slot
        // was destroyed) are silently discarded.
        let _ = THREAD_SLOT.try_with(|slot| {
            let mut slot = slot.borrow_mut();
            let stale = match slot.as_ref() {
                Some(existing) => existing.ctx.as_ptr() != Arc::as_ptr(self),
                None => true,
            };
            if stale {
                let profiler = Arc::new(ThreadProfiler::new(self.buffer_capacity));
                self.threads
                    .insert(profiler.thread_id, Arc::clone(&profiler));
                // Replacing the slot drops (and flushes) any registration
                // with a previous context.
                *slot = Some(ThreadSlot {
                    ctx: Arc::downgrade(self),
                    profiler,
                });
            }
            let Some(slot) = slot.as_ref() else {
                return;
            };
            let profiler = &slot.profiler;

            let scope_id = match profiler.cache.lookup(hash) {
                Some(id) => id,
                None => {
                    let id = self.registry.resolve(label, hash);
                    if !id.is_resolved() {
                        self.dropped_registry.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                    profiler.cache.insert(hash, id);
                    id
                }
            };

            let sample = RawSample {
                scope_id,
                duration_nanos,
                timestamp_nanos: self.now_nanos(),
                thread_id: profiler.thread_id,
            };
            if !profiler.buffer.try_append(sample) {
                // Full buffer: merge, then retry once. The drop branch is
                // unreachable today (drain always empties) but keeps the
                // soft-overflow contract explicit.
                self.flush_profiler(profiler);
                if !profiler.buffer.try_append(sample) {
                    self.dropped_buffer.fetch_add(1, Ordering::Relaxed);
                    return;
                }
            }
            if profiler.buffer.len() >= self.batch_size.load(Ordering::Relaxed) {
                self.flush_profiler(profiler);
            }
        });
    }

    /// Merge one thread's pending samples into the global aggregates.
    fn flush_profiler(&self, profiler: &ThreadProfiler) {
        let mut agg = self.shared();
        if agg.session.is_none() {
            // No session to account against; discard.
            profiler.buffer.drain(|_| {});
            return;
        }
        let mut merged = 0usize;
        // Split borrows so the drain closure can reach the aggregates
        // while `self` counters stay accessible.
        let agg = &mut *agg;
        profiler.buffer.drain(|sample| {
            self.merge_one(agg, sample);
            merged += 1;
        });
        if merged > 0 {
            agg.has_unsaved = true;
        }
        self.autosave_tick(agg);
    }

    fn merge_one(&self, agg: &mut Aggregates, sample: RawSample) {
        let record_idx = match agg.by_scope.get(&sample.scope_id) {
            Some(&idx) => idx,
            None => {
                let Some(name) = self.registry.name(sample.scope_id) else {
                    self.dropped_registry.fetch_add(1, Ordering::Relaxed);
                    return;
                };
                let ring_capacity = agg.ring_capacity;
                match agg.pool.allocate(name, ring_capacity) {
                    Some(idx) => {
                        agg.by_scope.insert(sample.scope_id, idx);
                        idx
                    }
                    None => {
                        self.dropped_pool.fetch_add(1, Ordering::Relaxed);
                        return;
                    }
                }
            }
        };
        if let Some(record) = agg.pool.get_mut(record_idx) {
            record.record(sample.duration_nanos);
        }
    }

    /// Force-merge every registered thread's buffer.
    fn flush_all(&self) {
        let profilers: Vec<Arc<ThreadProfiler>> = self
            .threads
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect();
        for profiler in profilers {
            self.flush_profiler(&profiler);
        }
    }

    fn autosave_tick(&self, agg: &mut Aggregates) {
        let Some(session) = agg.session.as_ref() else {
            return;
        };
        let interval = session.autosave_interval;
        if interval.is_zero() || !agg.has_unsaved {
            return;
        }
        if agg.last_export.elapsed() < interval {
            return;
        }
        if let Err(err) = self.export_locked(agg) {
            tracing::warn!(error = %err, "autosave export failed; will retry");
        }
    }

    fn build_trace(&self, agg: &Aggregates, session: &SessionInfo) -> TraceFile {
        let mut trace = TraceFile::new(SessionMeta {
            name: session.name.clone(),
            started_at_unix_ms: session.started_at_unix_ms,
            precision: session.precision,
            frame_count: agg.frames.len() as u32,
            truncated: false,
            dropped_samples: self.dropped_total(),
        });
        trace.scopes = scope_traces(&agg.pool, session.precision);
        trace.frames = agg.frames.clone();
        trace
    }

    /// Export current aggregates. On failure the unsaved flag stays set so
    /// the next autosave tick retries.
    fn export_locked(&self, agg: &mut Aggregates) -> Result<(), ProfilerError> {
        let Some(session) = agg.session.as_ref() else {
            return Err(ProfilerError::NoSession);
        };
        let trace = self.build_trace(agg, session);
        match session.exporter.export(&trace) {
            Ok(()) => {
                tracing::debug!(
                    path = %session.exporter.path().display(),
                    scopes = trace.scopes.len(),
                    "trace exported"
                );
                agg.has_unsaved = false;
                agg.last_export = Instant::now();
                Ok(())
            }
            Err(err) => {
                agg.has_unsaved = true;
                Err(err.into())
            }
        }
    }

    fn refresh_snapshot(&self, agg: &Aggregates) {
        let scopes = agg
            .pool
            .iter()
            .map(|record| {
                let count = record.count();
                ScopeStats {
                    name: record.name().label_arc(),
                    count,
                    total_nanos: record.sum_nanos(),
                    min_nanos: record.min_nanos(),
                    max_nanos: record.max_nanos(),
                    avg_nanos: record.sum_nanos() / count.max(1),
                }
            })
            .collect();
        let fresh = Arc::new(ProfileSnapshot {
            taken_at_nanos: self.now_nanos(),
            scopes,
            dropped_samples: self.dropped_total(),
        });
        let mut slot = match self.snapshot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        *slot = fresh;
    }
}

impl Drop for ContextInner {
    fn drop(&mut self) {
        // A context dropped mid-session must not leave the signal path
        // pointing at a freed pool.
        let agg = match self.shared.get_mut() {
            Ok(agg) => agg,
            Err(poisoned) => poisoned.into_inner(),
        };
        signal::disarm_pool(&agg.pool as *const RecordPool);
    }
}

/// Handle to the profiler. Cheap to clone; all clones share one context.
///
/// One session may be active at a time; instrumentation outside a
/// recording session is discarded at a single atomic check.
#[derive(Clone)]
pub struct ProfilerContext {
    inner: Arc<ContextInner>,
}

impl ProfilerContext {
    pub fn new(config: ProfilerConfig) -> Result<Self, ProfilerError> {
        config.validate()?;
        let inner = ContextInner {
            enabled: AtomicBool::new(true),
            state: AtomicU8::new(SessionState::Idle as u8),
            created_at: Instant::now(),
            batch_size: AtomicUsize::new(config.batch_size),
            buffer_capacity: config.thread_buffer_capacity,
            registry: ScopeRegistry::new(config.max_scopes),
            threads: DashMap::new(),
            shared: Mutex::new(Aggregates::empty()),
            snapshot: Mutex::new(Arc::new(ProfileSnapshot::default())),
            frames_target: AtomicU32::new(0),
            frames_captured: AtomicU32::new(0),
            dropped_registry: AtomicU64::new(0),
            dropped_pool: AtomicU64::new(0),
            dropped_buffer: AtomicU64::new(0),
            config: Mutex::new(config),
        };
        Ok(Self {
            inner: Arc::new(inner),
        })
    }

    // ------------------------------------------------------------------
    // Instrumentation surface
    // ------------------------------------------------------------------

    /// Submit a manual measurement for `label` (the scoped-timer path wraps
    /// this). Never blocks, never fails; overflow drops and counts.
    pub fn record_scope(&self, label: &str, duration: Duration) {
        self.record_scope_hashed(label, scope_hash(label), duration);
    }

    pub fn record_scope_hashed(&self, label: &str, hash: u64, duration: Duration) {
        self.inner
            .submit(label, hash, duration.as_nanos() as u64);
    }

    /// Mark a frame boundary: force-merges all thread buffers, appends a
    /// frame window while frame capture is active, refreshes the display
    /// snapshot, and runs the autosave check. No-op unless Recording.
    pub fn end_frame(&self) {
        if self.inner.state() != SessionState::Recording {
            return;
        }
        self.inner.flush_all();
        let mut agg = self.inner.shared();
        let agg = &mut *agg;

        let target = self.inner.frames_target.load(Ordering::Relaxed);
        if target > 0 {
            if let Some(session) = agg.session.as_ref() {
                let frame_index = self.inner.frames_captured.load(Ordering::Relaxed);
                let elapsed = self.inner.now_nanos().saturating_sub(session.start_nanos);
                agg.frames.push(FrameTrace {
                    frame_index,
                    start_ticks: session.precision.ticks_from_nanos(elapsed),
                    scopes: scope_traces(&agg.pool, session.precision),
                });
                let captured = frame_index + 1;
                self.inner
                    .frames_captured
                    .store(captured, Ordering::Relaxed);
                if captured >= target {
                    // Capture complete: export the windows and stop
                    // capturing without ending the session.
                    self.inner.frames_target.store(0, Ordering::Relaxed);
                    if let Err(err) = self.inner.export_locked(agg) {
                        tracing::warn!(error = %err, "frame-capture export failed");
                    } else {
                        tracing::info!(frames = captured, "frame capture complete");
                    }
                    agg.frames.clear();
                }
            }
        }
        self.inner.autosave_tick(agg);
        self.inner.refresh_snapshot(agg);
    }

    // ------------------------------------------------------------------
    // Session control
    // ------------------------------------------------------------------

    /// Start a session writing to the configured output path.
    pub fn begin_session(&self, name: &str) -> Result<(), ProfilerError> {
        self.begin_session_inner(name, None)
    }

    /// Start a session writing to an explicit output path.
    pub fn begin_session_to(&self, name: &str, path: &Path) -> Result<(), ProfilerError> {
        self.begin_session_inner(name, Some(path.to_path_buf()))
    }

    fn begin_session_inner(
        &self,
        name: &str,
        path_override: Option<PathBuf>,
    ) -> Result<(), ProfilerError> {
        let inner = &self.inner;
        // Claim the state machine first so two racing begin calls cannot
        // both set up a session.
        inner
            .state
            .compare_exchange(
                SessionState::Idle as u8,
                SessionState::Flushing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ProfilerError::SessionActive)?;
        match self.begin_session_setup(name, path_override) {
            Ok(()) => {
                inner
                    .state
                    .store(SessionState::Recording as u8, Ordering::Release);
                Ok(())
            }
            Err(err) => {
                inner
                    .state
                    .store(SessionState::Idle as u8, Ordering::Release);
                Err(err)
            }
        }
    }

    fn begin_session_setup(
        &self,
        name: &str,
        path_override: Option<PathBuf>,
    ) -> Result<(), ProfilerError> {
        let inner = &self.inner;
        let config = {
            let guard = match inner.config.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            guard.clone()
        };
        config.validate()?;
        let output_path = path_override.unwrap_or_else(|| config.output_path.clone());

        // Open the output target now so path problems fail the begin call
        // synchronously instead of the first export.
        std::fs::File::create(&output_path).map_err(|source| ProfilerError::OutputPath {
            path: output_path.clone(),
            source,
        })?;

        let started_at_unix_ms = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default()
            .as_millis() as u64;

        {
            let mut agg = inner.shared();
            *agg = Aggregates {
                pool: RecordPool::new(config.max_scopes),
                by_scope: HashMap::new(),
                ring_capacity: config.max_samples,
                frames: Vec::new(),
                session: Some(SessionInfo {
                    name: name.to_string(),
                    started_at_unix_ms,
                    start_nanos: inner.now_nanos(),
                    precision: config.precision,
                    exporter: Exporter::new(output_path.clone(), config.output_format),
                    autosave_interval: Duration::from_millis(config.autosave_interval_ms),
                }),
                last_export: Instant::now(),
                has_unsaved: false,
            };
            if config.crash_dump {
                signal::install_handlers();
                signal::arm(&agg.pool as *const RecordPool, &output_path);
            }
        }

        // Stale samples and cache entries from a previous session must not
        // leak into this one.
        for entry in inner.threads.iter() {
            entry.value().buffer.drain(|_| {});
            entry.value().cache.invalidate();
        }

        inner.batch_size.store(config.batch_size, Ordering::Relaxed);
        inner
            .frames_target
            .store(config.frames_to_capture, Ordering::Relaxed);
        inner.frames_captured.store(0, Ordering::Relaxed);
        inner.dropped_registry.store(0, Ordering::Relaxed);
        inner.dropped_pool.store(0, Ordering::Relaxed);
        inner.dropped_buffer.store(0, Ordering::Relaxed);

        tracing::info!(session = name, path = %output_path.display(), "profiling session started");
        Ok(())
    }

    /// Pause recording; submissions are discarded until resumed.
    pub fn pause(&self) -> Result<(), ProfilerError> {
        self.inner
            .state
            .compare_exchange(
                SessionState::Recording as u8,
                SessionState::Paused as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ProfilerError::NoSession)?;
        tracing::debug!("profiling session paused");
        Ok(())
    }

    pub fn resume(&self) -> Result<(), ProfilerError> {
        self.inner
            .state
            .compare_exchange(
                SessionState::Paused as u8,
                SessionState::Recording as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ProfilerError::NoSession)?;
        tracing::debug!("profiling session resumed");
        Ok(())
    }

    /// End the session: force-flush every registered thread's buffer,
    /// export, and return to Idle. The transition to Idle happens even if
    /// the final export fails; the error is returned to the caller.
    pub fn end_session(&self) -> Result<(), ProfilerError> {
        let inner = &self.inner;
        let to_flushing = |from: SessionState| {
            inner.state.compare_exchange(
                from as u8,
                SessionState::Flushing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
        };
        if to_flushing(SessionState::Recording).is_err()
            && to_flushing(SessionState::Paused).is_err()
        {
            return Err(ProfilerError::NoSession);
        }

        inner.flush_all();
        let result = {
            let mut agg = inner.shared();
            let agg = &mut *agg;
            let result = inner.export_locked(agg);
            inner.refresh_snapshot(agg);
            signal::disarm_pool(&agg.pool as *const RecordPool);
            agg.session = None;
            result
        };
        inner
            .state
            .store(SessionState::Idle as u8, Ordering::Release);
        match &result {
            Ok(()) => tracing::info!("profiling session ended"),
            Err(err) => tracing::warn!(error = %err, "profiling session ended; export failed"),
        }
        result
    }

    /// Arm frame-windowed capture for the next `frames` frame boundaries.
    /// Requires an active session; capture ends automatically after the
    /// windows are exported.
    pub fn capture_frames(&self, frames: u32) -> Result<(), ProfilerError> {
        if frames == 0 {
            return Err(ProfilerError::InvalidConfig {
                reason: "frame capture needs at least one frame".to_string(),
            });
        }
        match self.inner.state() {
            SessionState::Recording | SessionState::Paused => {}
            _ => return Err(ProfilerError::NoSession),
        }
        let mut agg = self.inner.shared();
        agg.frames.clear();
        self.inner.frames_captured.store(0, Ordering::Relaxed);
        self.inner.frames_target.store(frames, Ordering::Relaxed);
        tracing::debug!(frames, "frame capture armed");
        Ok(())
    }

    /// Discard all aggregates and counters. Valid only while Idle.
    pub fn clear(&self) -> Result<(), ProfilerError> {
        // Hold the state machine in Flushing so a racing begin_session
        // cannot interleave with the reset.
        self.inner
            .state
            .compare_exchange(
                SessionState::Idle as u8,
                SessionState::Flushing as u8,
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .map_err(|_| ProfilerError::SessionActive)?;
        {
            let mut agg = self.inner.shared();
            *agg = Aggregates::empty();
            self.inner.dropped_registry.store(0, Ordering::Relaxed);
            self.inner.dropped_pool.store(0, Ordering::Relaxed);
            self.inner.dropped_buffer.store(0, Ordering::Relaxed);
            self.inner.refresh_snapshot(&agg);
        }
        self.inner
            .state
            .store(SessionState::Idle as u8, Ordering::Release);
        Ok(())
    }

    // ------------------------------------------------------------------
    // Configuration
    // ------------------------------------------------------------------

    /// Apply a configuration change. Allowed while Idle or Paused; a
    /// Recording session rejects changes deterministically. Changes made
    /// while Paused also apply to the active session.
    fn set_config(
        &self,
        mutate: impl FnOnce(&mut ProfilerConfig),
    ) -> Result<(), ProfilerError> {
        match self.inner.state() {
            SessionState::Idle | SessionState::Paused => {}
            _ => return Err(ProfilerError::SessionActive),
        }
        let mut guard = match self.inner.config.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        let mut candidate = guard.clone();
        mutate(&mut candidate);
        candidate.validate()?;
        *guard = candidate.clone();
        drop(guard);

        // Propagate live knobs into the running (paused) session.
        self.inner
            .batch_size
            .store(candidate.batch_size, Ordering::Relaxed);
        let mut agg = self.inner.shared();
        agg.ring_capacity = candidate.max_samples;
        if let Some(session) = agg.session.as_mut() {
            session.precision = candidate.precision;
            session.autosave_interval = Duration::from_millis(candidate.autosave_interval_ms);
            session.exporter = Exporter::new(candidate.output_path.clone(), candidate.output_format);
        }
        Ok(())
    }

    pub fn set_precision(&self, precision: Precision) -> Result<(), ProfilerError> {
        self.set_config(|c| c.precision = precision)
    }

    /// Shorthand the overlay toggle uses: high precision is nanoseconds,
    /// normal is microseconds.
    pub fn set_high_precision(&self, high: bool) -> Result<(), ProfilerError> {
        self.set_precision(if high {
            Precision::Nanoseconds
        } else {
            Precision::Microseconds
        })
    }

    pub fn set_batch_size(&self, batch_size: usize) -> Result<(), ProfilerError> {
        self.set_config(|c| c.batch_size = batch_size)
    }

    pub fn set_max_samples(&self, max_samples: usize) -> Result<(), ProfilerError> {
        self.set_config(|c| c.max_samples = max_samples)
    }

    pub fn set_output_path(&self, path: PathBuf) -> Result<(), ProfilerError> {
        self.set_config(|c| c.output_path = path)
    }

    pub fn set_output_format(&self, format: OutputFormat) -> Result<(), ProfilerError> {
        self.set_config(|c| c.output_format = format)
    }

    pub fn set_frames_to_capture(&self, frames: u32) -> Result<(), ProfilerError> {
        self.set_config(|c| c.frames_to_capture = frames)
    }

    pub fn set_autosave_interval(&self, interval: Duration) -> Result<(), ProfilerError> {
        self.set_config(|c| c.autosave_interval_ms = interval.as_millis() as u64)
    }

    // ------------------------------------------------------------------
    // Query surface (overlay-facing; never blocks a writer)
    // ------------------------------------------------------------------

    pub fn is_enabled(&self) -> bool {
        self.inner.enabled.load(Ordering::Relaxed)
    }

    /// Master switch. Disabled contexts discard submissions at the first
    /// check; sessions and aggregates are untouched.
    pub fn set_enabled(&self, enabled: bool) {
        self.inner.enabled.store(enabled, Ordering::Relaxed);
    }

    pub fn session_state(&self) -> SessionState {
        self.inner.state()
    }

    /// Latest flushed snapshot, refreshed at frame and session boundaries.
    pub fn latest_snapshot(&self) -> Arc<ProfileSnapshot> {
        let slot = match self.inner.snapshot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        Arc::clone(&slot)
    }

    pub fn is_capturing_frames(&self) -> bool {
        self.inner.frames_target.load(Ordering::Relaxed) > 0
    }

    pub fn frames_captured(&self) -> u32 {
        self.inner.frames_captured.load(Ordering::Relaxed)
    }

    /// Samples dropped by soft overflow (registry full, pool full, or a
    /// buffer that could not make room).
    pub fn dropped_samples(&self) -> u64 {
        self.inner.dropped_total()
    }

    pub fn has_unsaved_data(&self) -> bool {
        self.inner.shared().has_unsaved
    }
}
