use std::path::PathBuf;
use thiserror::Error;

/// Errors surfaced by the profiler's control API.
///
/// Hot-path operations never return these; overflow on the instrumented
/// path is handled by dropping and counting instead.
#[derive(Debug, Error)]
pub enum ProfilerError {
    #[error("a session is already active")]
    SessionActive,

    #[error("no session is active")]
    NoSession,

    #[error("the global profiler is already initialized")]
    AlreadyInitialized,

    #[error("invalid configuration: {reason}")]
    InvalidConfig { reason: String },

    #[error("cannot open output path {path:?}: {source}")]
    OutputPath {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Trace(#[from] strata_trace::TraceError),
}
