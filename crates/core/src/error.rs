// Central Error Type for the Application

use crate::port::ThrottleError;
use thiserror::Error;

/// Application-level error type
///
/// Tasks run through an admission queue return this type as well, so their
/// failures reach the caller unchanged.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Queue full: {queue}")]
    QueueFull { queue: String },

    #[error("Throttle error: {0}")]
    Throttle(ThrottleError),

    #[error("Deadline exceeded after {0}ms")]
    DeadlineExceeded(u64),

    #[error("Task failed: {0}")]
    Task(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Map a throttle failure for `queue`; a distributed queue-full becomes `QueueFull`
    pub fn from_throttle(queue: &str, err: ThrottleError) -> Self {
        match err {
            ThrottleError::QueueFull { .. } => AppError::QueueFull {
                queue: queue.to_string(),
            },
            other => AppError::Throttle(other),
        }
    }

    /// Whether the caller should surface this as "try again later"
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            AppError::QueueFull { .. } | AppError::Throttle(_) | AppError::DeadlineExceeded(_)
        )
    }
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_distributed_queue_full_maps_to_queue_full() {
        let err = AppError::from_throttle("answer", ThrottleError::QueueFull { max: 10 });
        assert!(matches!(err, AppError::QueueFull { ref queue } if queue == "answer"));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_store_failure_stays_a_throttle_error() {
        let err = AppError::from_throttle(
            "submit",
            ThrottleError::Unavailable("connection refused".to_string()),
        );
        assert!(matches!(err, AppError::Throttle(ThrottleError::Unavailable(_))));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_task_failure_is_not_retryable() {
        assert!(!AppError::Task("bad answer payload".to_string()).is_retryable());
        assert!(!AppError::Internal("panic".to_string()).is_retryable());
    }
}
