//! Queue Registry - the answer and submit queues plus their shared settings
//!
//! Both queues read their limits from one injected [`SettingsCell`]; the admin
//! surface updates the cell through [`QueueRegistry::update_queue_settings`].

use crate::application::admission::{AdmissionQueue, QueueOptions};
use crate::domain::{QueueKind, QueueSettings, QueueSettingsPatch, QueueStats};
use crate::error::Result;
use crate::port::ThrottleBackend;
use std::future::Future;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{info, warn};

/// Observable, mutable queue settings
///
/// Cloning shares the same cell.
#[derive(Clone)]
pub struct SettingsCell {
    tx: Arc<watch::Sender<QueueSettings>>,
}

impl SettingsCell {
    pub fn new(initial: QueueSettings) -> Self {
        let (tx, _rx) = watch::channel(initial.clamped());
        Self { tx: Arc::new(tx) }
    }

    pub fn get(&self) -> QueueSettings {
        *self.tx.borrow()
    }

    /// Apply a clamped partial update and return the new settings
    pub fn update(&self, patch: &QueueSettingsPatch) -> QueueSettings {
        let mut next = self.get();
        self.tx.send_modify(|current| {
            *current = current.apply(patch);
            next = *current;
        });
        next
    }

    /// Receive every future settings change
    pub fn subscribe(&self) -> watch::Receiver<QueueSettings> {
        self.tx.subscribe()
    }
}

/// Global (cross-process) concurrency ceilings per queue
///
/// `None` falls back to the queue's current local concurrency.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GlobalLimits {
    pub answer_concurrency: Option<usize>,
    pub submit_concurrency: Option<usize>,
}

impl GlobalLimits {
    pub fn for_kind(&self, kind: QueueKind) -> Option<usize> {
        match kind {
            QueueKind::Answer => self.answer_concurrency,
            QueueKind::Submit => self.submit_concurrency,
        }
    }
}

/// The two process-wide admission queues
pub struct QueueRegistry {
    settings: SettingsCell,
    answer: AdmissionQueue,
    submit: AdmissionQueue,
}

impl QueueRegistry {
    /// Build both queues
    ///
    /// # Arguments
    /// * `settings` - Shared settings cell (local concurrency, max queue depth)
    /// * `throttle_backend` - Distributed throttle, `None` for in-process only
    /// * `limits` - Global concurrency ceilings handed to the throttle
    /// * `options` - Backoff / deadline tunables applied to both queues
    pub fn new(
        settings: SettingsCell,
        throttle_backend: Option<Arc<dyn ThrottleBackend>>,
        limits: GlobalLimits,
        options: QueueOptions,
    ) -> Self {
        let build = |kind: QueueKind| {
            Self::build_queue(
                kind,
                &settings,
                throttle_backend.as_deref(),
                limits,
                options.clone(),
            )
        };
        let answer = build(QueueKind::Answer);
        let submit = build(QueueKind::Submit);

        info!(
            distributed = throttle_backend.is_some(),
            answer_concurrency = answer.concurrency(),
            submit_concurrency = submit.concurrency(),
            max_queue = settings.get().max_queue,
            "Admission queues ready"
        );

        Self {
            settings,
            answer,
            submit,
        }
    }

    /// In-process queues with default settings
    pub fn local(settings: SettingsCell) -> Self {
        Self::new(
            settings,
            None,
            GlobalLimits::default(),
            QueueOptions::default(),
        )
    }

    fn build_queue(
        kind: QueueKind,
        settings: &SettingsCell,
        throttle_backend: Option<&dyn ThrottleBackend>,
        limits: GlobalLimits,
        options: QueueOptions,
    ) -> AdmissionQueue {
        let name = kind.queue_name();
        let cell = settings.clone();
        let mut builder = AdmissionQueue::builder(name.clone(), settings.get().concurrency_for(kind))
            .max_queue_override(Arc::new(move || cell.get().max_queue))
            .options(options);

        if let Some(global) = limits.for_kind(kind) {
            builder = builder.global_concurrency(Arc::new(move || global));
        }
        if let Some(backend) = throttle_backend {
            builder = builder.throttle(backend.throttle(&name));
        }
        builder.build()
    }

    pub fn answer(&self) -> &AdmissionQueue {
        &self.answer
    }

    pub fn submit(&self) -> &AdmissionQueue {
        &self.submit
    }

    pub fn queue(&self, kind: QueueKind) -> &AdmissionQueue {
        match kind {
            QueueKind::Answer => &self.answer,
            QueueKind::Submit => &self.submit,
        }
    }

    pub fn settings(&self) -> QueueSettings {
        self.settings.get()
    }

    /// Run `task` on the queue for `kind`, using the configured max queue as the depth hint
    pub async fn enqueue<T, F, Fut>(&self, kind: QueueKind, task: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let hint = self.settings.get().max_queue;
        self.queue(kind).enqueue(task, hint).await
    }

    /// Apply a partial settings update
    ///
    /// Concurrency changes reach the affected queue immediately; running
    /// tasks are left alone. A new max queue applies to the next admission.
    pub fn update_queue_settings(&self, patch: QueueSettingsPatch) -> QueueSettings {
        let next = self.settings.update(&patch);
        for kind in QueueKind::ALL {
            if patch.touches(kind) {
                self.queue(kind).set_concurrency(next.concurrency_for(kind));
            }
        }
        info!(
            answer_concurrency = next.answer_concurrency,
            submit_concurrency = next.submit_concurrency,
            max_queue = next.max_queue,
            "Queue settings updated"
        );
        next
    }

    /// Local stats for both queues, with shared counters when distributed
    pub async fn stats(&self) -> Vec<QueueStats> {
        let mut stats = Vec::with_capacity(QueueKind::ALL.len());
        for kind in QueueKind::ALL {
            let queue = self.queue(kind);
            let mut entry = queue.stats();
            entry.distributed = match queue.distributed_counters().await {
                Some(Ok(counters)) => Some(counters),
                Some(Err(e)) => {
                    warn!(queue = %kind, error = %e, "Could not read shared counters");
                    None
                }
                None => None,
            };
            stats.push(entry);
        }
        stats
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::settings::{DEFAULT_ANSWER_CONCURRENCY, DEFAULT_SUBMIT_CONCURRENCY};
    use crate::domain::ThrottleCounters;
    use crate::error::AppError;
    use crate::port::throttle::mocks::InMemoryThrottleBackend;

    #[tokio::test]
    async fn test_queues_start_from_settings() {
        let registry = QueueRegistry::local(SettingsCell::new(QueueSettings::default()));
        assert_eq!(registry.answer().concurrency(), DEFAULT_ANSWER_CONCURRENCY);
        assert_eq!(registry.submit().concurrency(), DEFAULT_SUBMIT_CONCURRENCY);
        assert_eq!(registry.answer().name().as_str(), "answer");
        assert_eq!(registry.submit().name().as_str(), "submit");
    }

    #[tokio::test]
    async fn test_update_applies_only_to_touched_queue() {
        let registry = QueueRegistry::local(SettingsCell::new(QueueSettings::default()));

        let next = registry.update_queue_settings(QueueSettingsPatch {
            submit_concurrency: Some(6),
            ..Default::default()
        });

        assert_eq!(next.submit_concurrency, 6);
        assert_eq!(registry.submit().concurrency(), 6);
        assert_eq!(registry.answer().concurrency(), DEFAULT_ANSWER_CONCURRENCY);
        assert_eq!(registry.settings(), next);
    }

    #[tokio::test]
    async fn test_update_clamps_values() {
        let registry = QueueRegistry::local(SettingsCell::new(QueueSettings::default()));
        let next = registry.update_queue_settings(QueueSettingsPatch {
            answer_concurrency: Some(0),
            submit_concurrency: None,
            max_queue: Some(0),
        });
        assert_eq!(next.answer_concurrency, 1);
        assert_eq!(next.max_queue, 10);
        assert_eq!(registry.answer().concurrency(), 1);
    }

    #[tokio::test]
    async fn test_max_queue_setting_caps_caller_hint() {
        let registry = QueueRegistry::local(SettingsCell::new(QueueSettings::new(1, 1, 10)));
        let gate = Arc::new(tokio::sync::Semaphore::new(0));

        let blocked = |gate: Arc<tokio::sync::Semaphore>| {
            move || async move {
                gate.acquire().await.unwrap().forget();
                Ok(())
            }
        };

        // One running, then ten waiting fills the configured cap
        let mut handles = vec![registry
            .answer()
            .submit(blocked(Arc::clone(&gate)), 1_000)
            .await
            .unwrap()];
        tokio::time::timeout(std::time::Duration::from_secs(5), async {
            while registry.answer().active() != 1 {
                tokio::time::sleep(std::time::Duration::from_millis(5)).await;
            }
        })
        .await
        .unwrap();

        for _ in 0..10 {
            handles.push(
                registry
                    .answer()
                    .submit(blocked(Arc::clone(&gate)), 1_000)
                    .await
                    .unwrap(),
            );
        }
        assert_eq!(registry.answer().size(), 10);

        let rejected = registry.answer().submit(|| async { Ok(()) }, 1_000).await;
        assert!(matches!(rejected, Err(AppError::QueueFull { .. })));

        gate.add_permits(11);
        for handle in handles {
            handle.join().await.unwrap();
        }
    }

    #[tokio::test]
    async fn test_distributed_queues_use_separate_counters() {
        let backend = Arc::new(InMemoryThrottleBackend::new());
        let registry = QueueRegistry::new(
            SettingsCell::new(QueueSettings::default()),
            Some(backend.clone()),
            GlobalLimits::default(),
            QueueOptions::default(),
        );

        let value = registry
            .enqueue(QueueKind::Answer, || async { Ok("answer saved") })
            .await
            .unwrap();
        assert_eq!(value, "answer saved");

        let answer = backend.get(&QueueKind::Answer.queue_name()).unwrap();
        let submit = backend.get(&QueueKind::Submit.queue_name()).unwrap();
        assert_eq!(answer.calls().try_enqueue, 1);
        assert_eq!(submit.calls().try_enqueue, 0);

        let stats = registry.stats().await;
        assert_eq!(stats.len(), 2);
        assert!(stats.iter().all(|s| s.distributed.is_some()));
        assert_eq!(stats[1].distributed, Some(ThrottleCounters::default()));
    }

    #[tokio::test]
    async fn test_subscribers_see_updates() {
        let cell = SettingsCell::new(QueueSettings::default());
        let mut rx = cell.subscribe();
        cell.update(&QueueSettingsPatch {
            max_queue: Some(500),
            ..Default::default()
        });
        rx.changed().await.unwrap();
        assert_eq!(rx.borrow().max_queue, 500);
    }
}
