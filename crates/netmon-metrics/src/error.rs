//! Metrics error types.

use thiserror::Error;

/// Result type alias for metrics operations.
pub type MetricsResult<T> = Result<T, MetricsError>;

#[derive(Debug, Error)]
pub enum MetricsError {
    /// A record for this target is already exported. The state layer
    /// never lets this happen, so seeing it means the record lifecycle
    /// is broken.
    #[error("metrics for target {0} are already registered")]
    Duplicate(String),

    #[error("prometheus error: {0}")]
    Prometheus(#[from] prometheus::Error),

    #[error("exposition is not valid utf-8: {0}")]
    Encode(#[from] std::string::FromUtf8Error),
}
