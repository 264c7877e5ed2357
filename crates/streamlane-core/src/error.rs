//! Core error types for streamlane.
//!
//! The instrumentation path itself never fails: upstream failures are
//! reported as records and forwarded, sinks are isolated. Errors only exist
//! at the configuration and scheduler construction boundaries.

use thiserror::Error;

/// Top-level error type for streamlane core operations.
#[derive(Debug, Error)]
pub enum LaneError {
    /// A lane filter description could not be parsed.
    #[error("Invalid lane filter: '{0}'")]
    InvalidFilter(String),

    /// A scheduler could not be started.
    #[error("Scheduler unavailable: {0}")]
    SchedulerUnavailable(String),

    /// A scheduler no longer accepts tasks.
    #[error("Scheduler closed")]
    SchedulerClosed,
}

impl From<std::io::Error> for LaneError {
    fn from(e: std::io::Error) -> Self {
        LaneError::SchedulerUnavailable(e.to_string())
    }
}

/// Result type alias for streamlane core operations.
pub type Result<T> = std::result::Result<T, LaneError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = LaneError::InvalidFilter("bogus".to_string());
        assert_eq!(err.to_string(), "Invalid lane filter: 'bogus'");

        let err = LaneError::SchedulerClosed;
        assert_eq!(err.to_string(), "Scheduler closed");
    }

    #[test]
    fn test_io_error_conversion() {
        let io = std::io::Error::other("no threads left");
        let err: LaneError = io.into();
        assert!(matches!(err, LaneError::SchedulerUnavailable(ref msg) if msg == "no threads left"));
    }
}
