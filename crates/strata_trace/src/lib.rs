//! Strata trace format
//!
//! Versioned schema for profiler trace files plus read/write helpers.
//! Durations are stored as integer ticks in the session's precision unit so
//! a written trace reparses to exactly the values that were exported.

use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Read, Write};
use std::path::Path;
use thiserror::Error;

/// Current trace file format version.
pub const FORMAT_VERSION: u32 = 1;

/// Errors that can occur while reading or writing a trace file.
#[derive(Debug, Error)]
pub enum TraceError {
    #[error("trace i/o failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("trace (de)serialization failed: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unsupported trace format version {found} (supported: {supported})")]
    UnsupportedVersion { found: u32, supported: u32 },
}

/// Unit in which tick values of a trace are expressed.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Precision {
    Nanoseconds,
    Microseconds,
    Milliseconds,
}

impl Precision {
    /// Convert a raw nanosecond duration into ticks of this precision.
    pub fn ticks_from_nanos(self, nanos: u64) -> u64 {
        match self {
            Precision::Nanoseconds => nanos,
            Precision::Microseconds => nanos / 1_000,
            Precision::Milliseconds => nanos / 1_000_000,
        }
    }

    pub fn unit_label(self) -> &'static str {
        match self {
            Precision::Nanoseconds => "ns",
            Precision::Microseconds => "us",
            Precision::Milliseconds => "ms",
        }
    }
}

impl Default for Precision {
    fn default() -> Self {
        Precision::Microseconds
    }
}

/// Session-level metadata attached to every trace file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionMeta {
    pub name: String,
    /// Wall-clock session start, milliseconds since the unix epoch.
    pub started_at_unix_ms: u64,
    pub precision: Precision,
    /// Number of frame windows captured (0 when frame capture was off).
    pub frame_count: u32,
    /// True when the trace was produced by the emergency path or an
    /// incomplete flush and may be missing samples.
    pub truncated: bool,
    /// Samples dropped due to overflow (pool, registry, or buffer).
    pub dropped_samples: u64,
}

/// Aggregated timing data for one scope.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScopeTrace {
    pub name: String,
    pub count: u64,
    pub total_ticks: u64,
    pub min_ticks: u64,
    pub max_ticks: u64,
    /// Most recent retained sample durations (bounded by the session's
    /// max-samples setting; older samples are evicted but still reflected
    /// in count/total/min/max).
    pub samples: Vec<u64>,
}

/// Snapshot of scope aggregates taken at one frame boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameTrace {
    pub frame_index: u32,
    /// Frame start, ticks since session start.
    pub start_ticks: u64,
    pub scopes: Vec<ScopeTrace>,
}

/// A complete trace file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceFile {
    pub version: u32,
    pub session: SessionMeta,
    pub scopes: Vec<ScopeTrace>,
    pub frames: Vec<FrameTrace>,
}

impl TraceFile {
    pub fn new(session: SessionMeta) -> Self {
        Self {
            version: FORMAT_VERSION,
            session,
            scopes: Vec::new(),
            frames: Vec::new(),
        }
    }

    pub fn write_to<W: Write>(&self, writer: W) -> Result<(), TraceError> {
        serde_json::to_writer(writer, self)?;
        Ok(())
    }

    pub fn write_pretty_to<W: Write>(&self, writer: W) -> Result<(), TraceError> {
        serde_json::to_writer_pretty(writer, self)?;
        Ok(())
    }

    pub fn write_to_path<P: AsRef<Path>>(&self, path: P, pretty: bool) -> Result<(), TraceError> {
        let file = File::create(path)?;
        let mut writer = BufWriter::new(file);
        if pretty {
            self.write_pretty_to(&mut writer)?;
        } else {
            self.write_to(&mut writer)?;
        }
        writer.flush()?;
        Ok(())
    }

    pub fn from_reader<R: Read>(reader: R) -> Result<Self, TraceError> {
        let trace: TraceFile = serde_json::from_reader(reader)?;
        if trace.version != FORMAT_VERSION {
            return Err(TraceError::UnsupportedVersion {
                found: trace.version,
                supported: FORMAT_VERSION,
            });
        }
        Ok(trace)
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self, TraceError> {
        let file = File::open(path)?;
        Self::from_reader(BufReader::new(file))
    }
}
