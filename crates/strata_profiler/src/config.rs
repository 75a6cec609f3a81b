//! Profiler settings

use crate::error::ProfilerError;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

pub use strata_trace::Precision;

/// On-disk representation of an exported trace.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputFormat {
    Json,
    JsonPretty,
}

/// Profiler configuration.
///
/// Loaded from a settings file by the runtime or built in code. All
/// capacities are fixed for the lifetime of a context; the per-session
/// knobs (`precision`, `batch_size`, `max_samples`, `frames_to_capture`,
/// output settings) can be changed through the context while it is Idle
/// or Paused.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ProfilerConfig {
    /// Unit used for tick values in exported traces.
    pub precision: Precision,
    pub output_format: OutputFormat,
    pub output_path: PathBuf,
    /// Samples accumulated per thread before a merge is attempted. Larger
    /// batches reduce merge-lock contention at the cost of snapshot
    /// staleness.
    pub batch_size: usize,
    /// Retained recent samples per scope. Count/min/max/sum cover the whole
    /// session regardless of this limit.
    pub max_samples: usize,
    /// Frame windows to capture per capture cycle (0 = frame capture off).
    pub frames_to_capture: u32,
    /// Autosave interval in milliseconds (0 = autosave off).
    pub autosave_interval_ms: u64,
    /// Maximum distinct scopes (registry and record pool capacity).
    pub max_scopes: usize,
    /// Per-thread sample buffer capacity (rounded up to a power of two).
    pub thread_buffer_capacity: usize,
    /// Install fatal-signal handlers for the emergency dump path.
    pub crash_dump: bool,
}

impl Default for ProfilerConfig {
    fn default() -> Self {
        Self {
            precision: Precision::default(),
            output_format: OutputFormat::Json,
            output_path: PathBuf::from("profile.trace.json"),
            batch_size: 64,
            max_samples: 256,
            frames_to_capture: 0,
            autosave_interval_ms: 5_000,
            max_scopes: 1024,
            thread_buffer_capacity: 4096,
            crash_dump: true,
        }
    }
}

impl ProfilerConfig {
    pub fn validate(&self) -> Result<(), ProfilerError> {
        if self.batch_size == 0 {
            return Err(ProfilerError::InvalidConfig {
                reason: "batch_size must be at least 1".to_string(),
            });
        }
        if self.max_samples == 0 {
            return Err(ProfilerError::InvalidConfig {
                reason: "max_samples must be at least 1".to_string(),
            });
        }
        if self.max_scopes == 0 {
            return Err(ProfilerError::InvalidConfig {
                reason: "max_scopes must be at least 1".to_string(),
            });
        }
        if self.thread_buffer_capacity < self.batch_size {
            return Err(ProfilerError::InvalidConfig {
                reason: format!(
                    "thread_buffer_capacity ({}) must be >= batch_size ({})",
                    self.thread_buffer_capacity, self.batch_size
                ),
            });
        }
        if self.output_path.as_os_str().is_empty() {
            return Err(ProfilerError::InvalidConfig {
                reason: "output_path must not be empty".to_string(),
            });
        }
        Ok(())
    }
}
