use thiserror::Error;

/// Failures from the extraction backend. Isolated per strategy (and per
/// family-member verification call); only fatal when every strategy fails.
#[derive(Debug, Error)]
pub enum BackendError {
    #[error("backend call timed out after {0} seconds")]
    Timeout(u64),

    #[error("backend transport error: {0}")]
    Transport(String),

    #[error("backend returned malformed output: {0}")]
    MalformedResponse(String),
}

/// Failures from the record store's read side. A failed search degrades that
/// matching tier; it never invents a match and never aborts the run.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record store call timed out after {0} seconds")]
    Timeout(u64),

    #[error("record store transport error: {0}")]
    Transport(String),

    #[error("record store returned malformed output: {0}")]
    MalformedResponse(String),
}

/// Whole-run failures. Everything else is caught and isolated at its own
/// boundary and surfaced through metrics instead.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("all {attempted} extraction strategies failed; last error: {last_error}")]
    AllStrategiesFailed { attempted: usize, last_error: String },

    #[error("no field definitions configured for document type '{0}'")]
    Configuration(String),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
