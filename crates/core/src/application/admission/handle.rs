// Completion side of an admitted task

use crate::domain::QueueName;
use crate::error::{AppError, Result};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::oneshot;

/// One-shot result slot; the first writer wins (task result or deadline)
pub(super) struct Completion<T> {
    tx: Arc<Mutex<Option<oneshot::Sender<Result<T>>>>>,
}

impl<T> Clone for Completion<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T> Completion<T> {
    pub(super) fn channel(queue: QueueName) -> (Self, TaskHandle<T>) {
        let (tx, rx) = oneshot::channel();
        (
            Self {
                tx: Arc::new(Mutex::new(Some(tx))),
            },
            TaskHandle { queue, rx },
        )
    }

    pub(super) fn complete(&self, result: Result<T>) {
        let sender = self
            .tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(tx) = sender {
            // Caller may have dropped its handle
            let _ = tx.send(result);
        }
    }
}

/// Pending result of an admitted task
///
/// Dropping the handle does not cancel the task; it still runs and its slot
/// is still released.
pub struct TaskHandle<T> {
    queue: QueueName,
    rx: oneshot::Receiver<Result<T>>,
}

impl<T> TaskHandle<T> {
    pub fn queue(&self) -> &QueueName {
        &self.queue
    }

    /// Wait for the task to finish
    ///
    /// Task failures are returned unchanged.
    pub async fn join(self) -> Result<T> {
        match self.rx.await {
            Ok(result) => result,
            Err(_) => Err(AppError::Internal(format!(
                "task on queue {} was dropped before completing",
                self.queue
            ))),
        }
    }
}
