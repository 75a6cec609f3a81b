//! Trace serialization

use crate::config::OutputFormat;
use crate::record::RecordPool;
use std::path::{Path, PathBuf};
use strata_trace::{Precision, ScopeTrace, TraceFile, TraceError};

/// Writes aggregated session data to the configured output target.
///
/// I/O failures never propagate into the hot path; the context keeps an
/// unsaved-data flag and retries at the next autosave tick.
pub(crate) struct Exporter {
    path: PathBuf,
    format: OutputFormat,
}

impl Exporter {
    pub fn new(path: PathBuf, format: OutputFormat) -> Self {
        Self { path, format }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn export(&self, trace: &TraceFile) -> Result<(), TraceError> {
        let pretty = self.format == OutputFormat::JsonPretty;
        trace.write_to_path(&self.path, pretty)
    }
}

/// Convert every live record into its trace representation, with durations
/// in the session's precision unit.
pub(crate) fn scope_traces(pool: &RecordPool, precision: Precision) -> Vec<ScopeTrace> {
    pool.iter()
        .map(|record| ScopeTrace {
            name: record.name().label().to_string(),
            count: record.count(),
            total_ticks: precision.ticks_from_nanos(record.sum_nanos()),
            min_ticks: precision.ticks_from_nanos(record.min_nanos()),
            max_ticks: precision.ticks_from_nanos(record.max_nanos()),
            samples: record
                .samples()
                .into_iter()
                .map(|nanos| precision.ticks_from_nanos(nanos))
                .collect(),
        })
        .collect()
}
