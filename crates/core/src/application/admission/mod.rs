//! Admission Queue - bounded-concurrency FIFO gate for write-heavy work
//!
//! Admission checks local queue depth (and, when attached, the distributed
//! throttle's global depth) before a task is accepted. A single drain pass per
//! queue starts tasks in admission order while local and distributed
//! concurrency allow. Slots are released exactly once however a task ends.
//!
//! Must be used from inside a tokio runtime: drain passes, tasks and retry
//! timers are spawned onto it.

mod backoff;
pub mod constants;
mod handle;
mod panic_guard;


pub use backoff::AcquireBackoff;
pub use handle::TaskHandle;
pub use panic_guard::run_guarded;

use crate::domain::settings::MIN_CONCURRENCY;
use crate::domain::{QueueName, QueueStats, ThrottleCounters};
use crate::error::{AppError, Result};
use crate::port::{ThrottleError, ThrottlePort};
use futures::future::BoxFuture;
use futures::FutureExt;
use handle::Completion;
use std::collections::VecDeque;
use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Limit supplied by the queue's owner, read on every use
pub type LimitFn = Arc<dyn Fn() -> usize + Send + Sync>;

/// Tunables that are fixed for the lifetime of a queue
#[derive(Debug, Clone, Default)]
pub struct QueueOptions {
    /// Delay policy after the distributed throttle denies an acquire
    pub backoff: AcquireBackoff,
    /// Release the slot and fail the caller once a task runs this long.
    /// The task itself keeps running in the background; its result is dropped.
    pub run_deadline: Option<Duration>,
}

/// Admitted task waiting in the FIFO
struct QueuedTask {
    run: BoxFuture<'static, ()>,
    abandon: Box<dyn FnOnce(AppError) + Send>,
}

struct QueueState {
    pending: VecDeque<QueuedTask>,
    /// Admissions between the local depth check and the FIFO append
    reserved: usize,
    active: usize,
    concurrency: usize,
    draining: bool,
    /// A slot was released since the current acquire was sent
    capacity_freed: bool,
    retry_pending: bool,
    denials: u32,
}

impl QueueState {
    fn can_start(&self) -> bool {
        self.active < self.concurrency && !self.pending.is_empty()
    }
}

/// Outcome of trying to start the FIFO head
enum Start {
    Started,
    /// Local concurrency is exhausted (the limit may have been lowered)
    NoCapacity,
    Empty,
}

struct Inner {
    name: QueueName,
    state: Mutex<QueueState>,
    throttle: Option<Arc<dyn ThrottlePort>>,
    max_queue_override: Option<LimitFn>,
    global_concurrency: Option<LimitFn>,
    options: QueueOptions,
}

/// FIFO admission queue with a local concurrency cap
///
/// Cheap to clone; clones share the same queue.
#[derive(Clone)]
pub struct AdmissionQueue {
    inner: Arc<Inner>,
}

/// Builder for [`AdmissionQueue`]
pub struct AdmissionQueueBuilder {
    name: QueueName,
    concurrency: usize,
    throttle: Option<Arc<dyn ThrottlePort>>,
    max_queue_override: Option<LimitFn>,
    global_concurrency: Option<LimitFn>,
    options: QueueOptions,
}

impl AdmissionQueueBuilder {
    /// Gate task starts on a distributed throttle as well
    pub fn throttle(mut self, throttle: Arc<dyn ThrottlePort>) -> Self {
        self.throttle = Some(throttle);
        self
    }

    /// Upper bound on queue depth; the smaller of this and the caller's hint wins
    pub fn max_queue_override(mut self, limit: LimitFn) -> Self {
        self.max_queue_override = Some(limit);
        self
    }

    /// Global concurrency ceiling handed to the throttle (defaults to the local limit)
    pub fn global_concurrency(mut self, limit: LimitFn) -> Self {
        self.global_concurrency = Some(limit);
        self
    }

    pub fn options(mut self, options: QueueOptions) -> Self {
        self.options = options;
        self
    }

    pub fn build(self) -> AdmissionQueue {
        AdmissionQueue {
            inner: Arc::new(Inner {
                name: self.name,
                state: Mutex::new(QueueState {
                    pending: VecDeque::new(),
                    reserved: 0,
                    active: 0,
                    concurrency: self.concurrency.max(MIN_CONCURRENCY),
                    draining: false,
                    capacity_freed: false,
                    retry_pending: false,
                    denials: 0,
                }),
                throttle: self.throttle,
                max_queue_override: self.max_queue_override,
                global_concurrency: self.global_concurrency,
                options: self.options,
            }),
        }
    }
}

impl AdmissionQueue {
    pub fn builder(name: QueueName, concurrency: usize) -> AdmissionQueueBuilder {
        AdmissionQueueBuilder {
            name,
            concurrency,
            throttle: None,
            max_queue_override: None,
            global_concurrency: None,
            options: QueueOptions::default(),
        }
    }

    /// Local-only queue
    pub fn new(name: QueueName, concurrency: usize) -> Self {
        Self::builder(name, concurrency).build()
    }

    pub fn name(&self) -> &QueueName {
        &self.inner.name
    }

    /// Admit `task` without waiting for it to run
    ///
    /// Fails with `AppError::QueueFull` when the effective depth
    /// (`min(max_queue_hint, override)`) is already reached, locally or
    /// globally, and with `AppError::Throttle` when the shared store call
    /// fails. In every failure case `task` is never invoked and no local
    /// reservation is left behind.
    pub async fn submit<T, F, Fut>(&self, task: F, max_queue_hint: usize) -> Result<TaskHandle<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let inner = &self.inner;
        let max_depth = inner.effective_max_queue(max_queue_hint);
        let reservation = inner.reserve(max_depth)?;

        if let Some(throttle) = &inner.throttle {
            // `reservation` rolls back on the early return
            throttle.try_enqueue(max_depth).await.map_err(|e| {
                match &e {
                    ThrottleError::QueueFull { max } => {
                        debug!(queue = %inner.name, max_depth = max, "Global queue depth reached")
                    }
                    other => {
                        warn!(queue = %inner.name, error = %other, "Distributed admission failed")
                    }
                }
                AppError::from_throttle(inner.name.as_str(), e)
            })?;
        }

        let (completion, handle) = Completion::channel(inner.name.clone());
        let queue_name = inner.name.to_string();
        let on_done = completion.clone();
        let run = async move {
            let result = run_guarded(&queue_name, async move { task().await }).await;
            on_done.complete(result);
        }
        .boxed();
        let abandon = Box::new(move |err: AppError| completion.complete(Err(err)));

        reservation.commit(QueuedTask { run, abandon });
        inner.drain();
        Ok(handle)
    }

    /// Admit `task` and wait for its result
    pub async fn enqueue<T, F, Fut>(&self, task: F, max_queue_hint: usize) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        self.submit(task, max_queue_hint).await?.join().await
    }

    /// Change the local concurrency limit (clamped to >= 1)
    ///
    /// Running tasks are never interrupted; lowering the limit only delays
    /// new starts until enough of them finish.
    pub fn set_concurrency(&self, concurrency: usize) {
        let concurrency = concurrency.max(MIN_CONCURRENCY);
        let previous = std::mem::replace(&mut self.inner.lock().concurrency, concurrency);
        if previous != concurrency {
            info!(
                queue = %self.inner.name,
                previous,
                concurrency,
                "Queue concurrency updated"
            );
        }
        self.inner.drain();
    }

    /// Admitted tasks that have not started yet
    pub fn size(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Tasks currently holding a local slot
    pub fn active(&self) -> usize {
        self.inner.lock().active
    }

    pub fn concurrency(&self) -> usize {
        self.inner.lock().concurrency
    }

    pub fn stats(&self) -> QueueStats {
        let state = self.inner.lock();
        QueueStats {
            name: self.inner.name.to_string(),
            pending: state.pending.len(),
            active: state.active,
            concurrency: state.concurrency,
            distributed: None,
        }
    }

    /// Shared counters, or None when no throttle is attached
    pub async fn distributed_counters(&self) -> Option<Result<ThrottleCounters>> {
        let throttle = self.inner.throttle.as_ref()?;
        Some(
            throttle
                .counters()
                .await
                .map_err(|e| AppError::from_throttle(self.inner.name.as_str(), e)),
        )
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, QueueState> {
        // No task code runs under this lock, so a poisoned guard still holds consistent counters
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn effective_max_queue(&self, hint: usize) -> usize {
        match &self.max_queue_override {
            Some(limit) => hint.min(limit()),
            None => hint,
        }
    }

    fn global_max_concurrency(&self) -> usize {
        let limit = match &self.global_concurrency {
            Some(limit) => limit(),
            None => self.lock().concurrency,
        };
        limit.max(MIN_CONCURRENCY)
    }

    fn reserve(&self, max_depth: usize) -> Result<Reservation<'_>> {
        let mut state = self.lock();
        let depth = state.pending.len() + state.reserved;
        if depth >= max_depth {
            debug!(queue = %self.name, depth, max_depth, "Queue full, rejecting task");
            return Err(AppError::QueueFull {
                queue: self.name.to_string(),
            });
        }
        state.reserved += 1;
        Ok(Reservation {
            inner: self,
            committed: false,
        })
    }

    /// Start a drain pass unless one is already running. While a denied
    /// acquire waits for its retry timer, only a released slot starts one early.
    fn drain(self: &Arc<Self>) {
        {
            let mut state = self.lock();
            if state.draining || (state.retry_pending && !state.capacity_freed) {
                return;
            }
            state.draining = true;
        }
        tokio::spawn(Arc::clone(self).drain_pass());
    }

    async fn drain_pass(self: Arc<Self>) {
        loop {
            {
                let mut state = self.lock();
                if !state.can_start() {
                    state.draining = false;
                    return;
                }
                state.capacity_freed = false;
            }

            let granted = match &self.throttle {
                None => false,
                Some(throttle) => match throttle.try_acquire(self.global_max_concurrency()).await {
                    Ok(true) => {
                        self.lock().denials = 0;
                        true
                    }
                    Ok(false) => {
                        debug!(queue = %self.name, "Global concurrency exhausted, backing off");
                        if self.park_after_denial() {
                            return;
                        }
                        continue;
                    }
                    Err(e) => {
                        warn!(queue = %self.name, error = %e, "Distributed acquire failed, backing off");
                        if self.park_after_denial() {
                            return;
                        }
                        continue;
                    }
                },
            };

            match self.start_next() {
                Start::Started => {}
                Start::NoCapacity if granted => {
                    debug!(queue = %self.name, "Local limit lowered during acquire, returning grant");
                    self.return_grant().await;
                }
                Start::Empty if granted => self.release_distributed().await,
                Start::NoCapacity | Start::Empty => {}
            }
        }
    }

    /// End the pass and arm the retry timer, unless a slot was released while
    /// the acquire was in flight (then the caller loops immediately).
    /// Returns true when the pass must end.
    fn park_after_denial(self: &Arc<Self>) -> bool {
        let delay = {
            let mut state = self.lock();
            if state.capacity_freed {
                state.capacity_freed = false;
                return false;
            }
            state.draining = false;
            state.denials = state.denials.saturating_add(1);
            if state.retry_pending {
                return true;
            }
            state.retry_pending = true;
            self.options.backoff.delay(state.denials)
        };

        let inner = Arc::clone(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            inner.lock().retry_pending = false;
            inner.drain();
        });
        true
    }

    /// Pop the FIFO head and run it, if the local limit still has room.
    /// The limit is re-read here because it may have been lowered while an
    /// acquire was in flight.
    fn start_next(self: &Arc<Self>) -> Start {
        let (task, active, pending) = {
            let mut state = self.lock();
            if state.active >= state.concurrency {
                return Start::NoCapacity;
            }
            let Some(task) = state.pending.pop_front() else {
                return Start::Empty;
            };
            state.active += 1;
            (task, state.active, state.pending.len())
        };

        debug!(queue = %self.name, active, pending, "Starting task");
        let slot = Slot {
            inner: Arc::clone(self),
        };
        tokio::spawn(Arc::clone(self).run(task, slot));
        Start::Started
    }

    async fn run(self: Arc<Self>, task: QueuedTask, slot: Slot) {
        let QueuedTask { run, abandon } = task;
        match self.options.run_deadline {
            None => run.await,
            Some(deadline) => {
                let mut running = tokio::spawn(run);
                if tokio::time::timeout(deadline, &mut running).await.is_err() {
                    let deadline_ms = u64::try_from(deadline.as_millis()).unwrap_or(u64::MAX);
                    warn!(
                        queue = %self.name,
                        deadline_ms,
                        "Task exceeded its run deadline, releasing slot"
                    );
                    abandon(AppError::DeadlineExceeded(deadline_ms));
                }
            }
        }
        drop(slot);
    }

    /// Hand an unused grant back; the task it was for stays queued
    async fn return_grant(&self) {
        if let Some(throttle) = &self.throttle {
            if let Err(e) = throttle.requeue().await {
                warn!(
                    queue = %self.name,
                    error = %e,
                    "Failed to return distributed grant, leaving it to counter expiry"
                );
            }
        }
    }

    async fn release_distributed(&self) {
        if let Some(throttle) = &self.throttle {
            if let Err(e) = throttle.release().await {
                warn!(
                    queue = %self.name,
                    error = %e,
                    "Failed to release distributed slot, leaving it to counter expiry"
                );
            }
        }
    }
}

/// Local depth reservation; rolled back on drop unless committed
struct Reservation<'a> {
    inner: &'a Inner,
    committed: bool,
}

impl Reservation<'_> {
    fn commit(mut self, task: QueuedTask) {
        let mut state = self.inner.lock();
        state.reserved -= 1;
        state.pending.push_back(task);
        self.committed = true;
    }
}

impl Drop for Reservation<'_> {
    fn drop(&mut self) {
        if !self.committed {
            let mut state = self.inner.lock();
            state.reserved = state.reserved.saturating_sub(1);
        }
    }
}

/// A running task's slot; dropping it frees local then distributed capacity
/// and wakes the drain
struct Slot {
    inner: Arc<Inner>,
}

impl Drop for Slot {
    fn drop(&mut self) {
        self.inner.lock().active -= 1;

        let inner = Arc::clone(&self.inner);
        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                runtime.spawn(async move {
                    inner.release_distributed().await;
                    inner.lock().capacity_freed = true;
                    inner.drain();
                });
            }
            Err(_) => {
                warn!(queue = %self.inner.name, "Runtime gone, distributed slot left to counter expiry");
            }
        }
    }
}
