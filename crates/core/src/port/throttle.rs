// Distributed Throttle Port
// Global queue-depth / concurrency ceiling shared by every process
// reason: async-trait for dyn dispatch over network-backed implementations

use crate::domain::{QueueName, ThrottleCounters};
use async_trait::async_trait;
use std::sync::Arc;
use thiserror::Error;

/// Throttle errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ThrottleError {
    #[error("global queue depth of {max} reached")]
    QueueFull { max: usize },

    #[error("shared store unavailable: {0}")]
    Unavailable(String),

    #[error("script failed: {0}")]
    Script(String),
}

/// Distributed throttle for one queue
///
/// Every operation must be atomic with respect to all other callers, in this
/// and every other process pointing at the same store. Implementations never
/// let a counter go negative.
///
/// Implementations:
/// - RedisThrottle: Lua scripts over a shared Redis (proctor-infra-redis)
/// - InMemoryThrottle: process-local, for tests
#[async_trait]
pub trait ThrottlePort: Send + Sync {
    /// Reserve one queued slot unless `queued >= max_queue_depth`
    ///
    /// # Errors
    /// - ThrottleError::QueueFull if the global depth is reached (no mutation)
    /// - ThrottleError::Unavailable / Script if the store call fails
    async fn try_enqueue(&self, max_queue_depth: usize) -> Result<(), ThrottleError>;

    /// Convert one queued reservation into an active slot
    ///
    /// Grants only when `queued > 0` and `active < max_concurrency`.
    /// Returns false (no mutation) otherwise.
    async fn try_acquire(&self, max_concurrency: usize) -> Result<bool, ThrottleError>;

    /// Give back one active slot; no-op when `active` is already 0
    async fn release(&self) -> Result<(), ThrottleError>;

    /// Undo a grant that could not be used: `active -= 1` (never below 0)
    /// and `queued += 1` in one step, ignoring the depth ceiling
    async fn requeue(&self) -> Result<(), ThrottleError>;

    /// Read the shared counters (observability only)
    async fn counters(&self) -> Result<ThrottleCounters, ThrottleError>;
}

/// Hands out one throttle per queue name so counters never collide
pub trait ThrottleBackend: Send + Sync {
    fn throttle(&self, queue: &QueueName) -> Arc<dyn ThrottlePort>;
}

// ============================================================================
// Mock Implementations for Testing
// ============================================================================

pub mod mocks {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::Mutex;

    /// Call counts observed by an InMemoryThrottle
    #[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
    pub struct ThrottleCalls {
        pub try_enqueue: usize,
        pub try_acquire: usize,
        pub granted: usize,
        pub release: usize,
        pub requeue: usize,
    }

    #[derive(Default)]
    struct MemState {
        counters: ThrottleCounters,
        calls: ThrottleCalls,
    }

    /// Process-local throttle with the same check-and-mutate semantics as the
    /// shared store. Share one instance between several queues to model
    /// several processes.
    #[derive(Default)]
    pub struct InMemoryThrottle {
        state: Mutex<MemState>,
        enqueue_failure: Mutex<Option<ThrottleError>>,
        deny_acquire: AtomicBool,
    }

    impl InMemoryThrottle {
        pub fn new() -> Self {
            Self::default()
        }

        /// Fail every try_enqueue with `err` (counters untouched)
        pub fn failing_enqueue(err: ThrottleError) -> Self {
            let throttle = Self::default();
            *throttle.enqueue_failure.lock().unwrap() = Some(err);
            throttle
        }

        /// Deny every try_acquire until switched back
        pub fn set_deny_acquire(&self, deny: bool) {
            self.deny_acquire.store(deny, Ordering::SeqCst);
        }

        pub fn calls(&self) -> ThrottleCalls {
            self.state.lock().unwrap().calls
        }

        pub fn snapshot(&self) -> ThrottleCounters {
            self.state.lock().unwrap().counters
        }
    }

    #[async_trait]
    impl ThrottlePort for InMemoryThrottle {
        async fn try_enqueue(&self, max_queue_depth: usize) -> Result<(), ThrottleError> {
            let failure = self.enqueue_failure.lock().unwrap().clone();
            let mut state = self.state.lock().unwrap();
            state.calls.try_enqueue += 1;
            if let Some(err) = failure {
                return Err(err);
            }
            if state.counters.queued >= max_queue_depth as u64 {
                return Err(ThrottleError::QueueFull {
                    max: max_queue_depth,
                });
            }
            state.counters.queued += 1;
            Ok(())
        }

        async fn try_acquire(&self, max_concurrency: usize) -> Result<bool, ThrottleError> {
            let mut state = self.state.lock().unwrap();
            state.calls.try_acquire += 1;
            if self.deny_acquire.load(Ordering::SeqCst) {
                return Ok(false);
            }
            let counters = &mut state.counters;
            if counters.queued == 0 || counters.active >= max_concurrency as u64 {
                return Ok(false);
            }
            counters.queued -= 1;
            counters.active += 1;
            state.calls.granted += 1;
            Ok(true)
        }

        async fn release(&self) -> Result<(), ThrottleError> {
            let mut state = self.state.lock().unwrap();
            state.calls.release += 1;
            if state.counters.active > 0 {
                state.counters.active -= 1;
            }
            Ok(())
        }

        async fn requeue(&self) -> Result<(), ThrottleError> {
            let mut state = self.state.lock().unwrap();
            state.calls.requeue += 1;
            if state.counters.active > 0 {
                state.counters.active -= 1;
            }
            state.counters.queued += 1;
            Ok(())
        }

        async fn counters(&self) -> Result<ThrottleCounters, ThrottleError> {
            Ok(self.snapshot())
        }
    }

    /// One InMemoryThrottle per queue name
    #[derive(Default)]
    pub struct InMemoryThrottleBackend {
        throttles: Mutex<HashMap<QueueName, Arc<InMemoryThrottle>>>,
    }

    impl InMemoryThrottleBackend {
        pub fn new() -> Self {
            Self::default()
        }

        /// The concrete throttle handed out for `queue`, if any
        pub fn get(&self, queue: &QueueName) -> Option<Arc<InMemoryThrottle>> {
            self.throttles.lock().unwrap().get(queue).cloned()
        }
    }

    impl ThrottleBackend for InMemoryThrottleBackend {
        fn throttle(&self, queue: &QueueName) -> Arc<dyn ThrottlePort> {
            let throttle = self
                .throttles
                .lock()
                .unwrap()
                .entry(queue.clone())
                .or_insert_with(|| Arc::new(InMemoryThrottle::new()))
                .clone();
            throttle
        }
    }
}
