//! RPC Error Types
//!
//! Maps application errors to JSON-RPC error codes.

use jsonrpsee::types::ErrorObjectOwned;
use proctor_core::error::AppError;

/// RPC Error Codes
pub mod code {
    pub const VALIDATION_ERROR: i32 = 4000;
    pub const THROTTLED: i32 = 4003;
    pub const DEADLINE_EXCEEDED: i32 = 4008;
    pub const INTERNAL_ERROR: i32 = 5000;
    pub const STORE_ERROR: i32 = 5001;
    pub const TASK_FAILED: i32 = 5002;
}

/// Convert AppError to JSON-RPC ErrorObject
pub fn to_rpc_error(err: AppError) -> ErrorObjectOwned {
    let message = err.to_string();
    let code = match &err {
        AppError::Validation(_) => code::VALIDATION_ERROR,
        AppError::QueueFull { .. } => code::THROTTLED,
        AppError::DeadlineExceeded(_) => code::DEADLINE_EXCEEDED,
        AppError::Throttle(_) => code::STORE_ERROR,
        AppError::Task(_) => code::TASK_FAILED,
        AppError::Config(_) | AppError::Internal(_) => code::INTERNAL_ERROR,
    };
    ErrorObjectOwned::owned(code, message, None::<()>)
}

#[cfg(test)]
mod tests {
    use super::*;
    use proctor_core::port::ThrottleError;

    #[test]
    fn test_queue_full_is_throttled() {
        let err = to_rpc_error(AppError::QueueFull {
            queue: "answer".to_string(),
        });
        assert_eq!(err.code(), code::THROTTLED);
        assert!(err.message().contains("answer"));
    }

    #[test]
    fn test_store_failure_is_store_error() {
        let err = to_rpc_error(AppError::Throttle(ThrottleError::Unavailable(
            "connection refused".to_string(),
        )));
        assert_eq!(err.code(), code::STORE_ERROR);
    }

    #[test]
    fn test_task_failure_and_config_codes() {
        assert_eq!(
            to_rpc_error(AppError::Task("bad answer payload".to_string())).code(),
            code::TASK_FAILED
        );
        assert_eq!(
            to_rpc_error(AppError::Config("missing url".to_string())).code(),
            code::INTERNAL_ERROR
        );
        assert_eq!(
            to_rpc_error(AppError::DeadlineExceeded(20)).code(),
            code::DEADLINE_EXCEEDED
        );
    }

    #[test]
    fn test_validation_code() {
        let err = to_rpc_error(AppError::Validation("empty patch".to_string()));
        assert_eq!(err.code(), code::VALIDATION_ERROR);
    }
}
