//! Distributed throttle against a live Redis
//!
//! Ignored by default. Run with:
//! `REDIS_URL=redis://127.0.0.1/ cargo test -p proctor-integration-tests --test redis_throttle -- --ignored`

use proctor_core::application::{AcquireBackoff, GlobalLimits, QueueOptions, QueueRegistry, SettingsCell};
use proctor_core::domain::{QueueKind, QueueSettings, ThrottleCounters};
use proctor_core::error::AppError;
use proctor_core::port::{ThrottleBackend, ThrottlePort};
use proctor_infra_redis::{connect, RedisThrottleBackend};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

async fn backend() -> Arc<RedisThrottleBackend> {
    let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".to_string());
    let conn = connect(&url).await.unwrap();
    // Fresh namespace per run so leftovers never interfere
    let prefix = format!(
        "proctor:it:{}:{}",
        std::process::id(),
        chrono::Utc::now().timestamp_millis()
    );
    Arc::new(RedisThrottleBackend::new(conn, prefix))
}

fn process(backend: &Arc<RedisThrottleBackend>, limits: GlobalLimits) -> Arc<QueueRegistry> {
    let backend: Arc<dyn ThrottleBackend> = backend.clone();
    Arc::new(QueueRegistry::new(
        SettingsCell::new(QueueSettings::new(4, 4, 20)),
        Some(backend),
        limits,
        QueueOptions {
            backoff: AcquireBackoff::fixed(Duration::from_millis(20)),
            run_deadline: None,
        },
    ))
}

#[tokio::test]
#[ignore]
async fn test_two_processes_share_one_ceiling() {
    let backend = backend().await;
    let limits = GlobalLimits {
        answer_concurrency: Some(2),
        submit_concurrency: Some(1),
    };
    let registries = [process(&backend, limits), process(&backend, limits)];

    let current = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));
    let mut callers = Vec::new();
    for i in 0..10 {
        let registry = Arc::clone(&registries[i % 2]);
        let current = Arc::clone(&current);
        let peak = Arc::clone(&peak);
        callers.push(tokio::spawn(async move {
            registry
                .enqueue(QueueKind::Answer, move || async move {
                    let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(25)).await;
                    current.fetch_sub(1, Ordering::SeqCst);
                    Ok(())
                })
                .await
        }));
    }
    for caller in callers {
        caller.await.unwrap().unwrap();
    }
    assert!(peak.load(Ordering::SeqCst) <= 2);

    let throttle = backend.redis_throttle(&QueueKind::Answer.queue_name());
    tokio::time::timeout(Duration::from_secs(5), async {
        while throttle.counters().await.unwrap() != ThrottleCounters::default() {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .unwrap();
}

#[tokio::test]
#[ignore]
async fn test_global_depth_rejects_across_processes() {
    let backend = backend().await;
    let throttle = backend.redis_throttle(&QueueKind::Submit.queue_name());

    // Fill the global depth from "elsewhere"
    for _ in 0..20 {
        throttle.try_enqueue(20).await.unwrap();
    }

    let registry = process(&backend, GlobalLimits::default());
    let result = registry
        .enqueue(QueueKind::Submit, || async { Ok(()) })
        .await;
    assert!(matches!(result, Err(AppError::QueueFull { .. })));
    assert_eq!(registry.submit().size(), 0);
    assert_eq!(throttle.counters().await.unwrap().queued, 20);
}
