// Panic isolation for queued tasks
use crate::error::{AppError, Result};
use futures::FutureExt;
use std::any::Any;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use tracing::error;

/// Await a task future, turning a panic into `AppError::Internal`
///
/// A panicking task must not skip slot release or take the drain down with it.
pub async fn run_guarded<F, T>(queue: &str, future: F) -> Result<T>
where
    F: Future<Output = Result<T>>,
{
    match AssertUnwindSafe(future).catch_unwind().await {
        Ok(result) => result,
        Err(panic_info) => {
            let panic_msg = panic_message(panic_info.as_ref());
            error!(queue = %queue, panic_msg = %panic_msg, "Queued task panicked");
            Err(AppError::Internal(format!("task panicked: {}", panic_msg)))
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        s.to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "Unknown panic".to_string()
    }
}
