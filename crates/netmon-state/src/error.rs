//! Error types for the shared monitor state.

use thiserror::Error;

use netmon_metrics::MetricsError;

/// Result type alias for state operations.
pub type StateResult<T> = Result<T, StateError>;

#[derive(Debug, Error)]
pub enum StateError {
    /// Building or exporting a record failed. A duplicate registration
    /// lands here and means the record lifecycle invariant was broken.
    #[error("metric registration failed: {0}")]
    Registration(#[from] MetricsError),
}

impl StateError {
    /// Whether this error is a duplicate metric identity.
    pub fn is_duplicate(&self) -> bool {
        matches!(self, StateError::Registration(MetricsError::Duplicate(_)))
    }
}
