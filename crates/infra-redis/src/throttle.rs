// Redis ThrottlePort Implementation

use crate::scripts::{Scripts, COUNTER_TTL_SECS};
use async_trait::async_trait;
use proctor_core::domain::{QueueName, ThrottleCounters};
use proctor_core::port::{ThrottleBackend, ThrottleError, ThrottlePort};
use redis::aio::ConnectionManager;
use redis::{ErrorKind, RedisError, Script};
use std::sync::Arc;
use tracing::{debug, warn};

/// Convert a redis error into the throttle's error space
///
/// Connectivity problems become `Unavailable`; anything the server rejected
/// (script errors, wrong types) becomes `Script`.
pub(crate) fn map_redis_error(err: RedisError) -> ThrottleError {
    if err.is_io_error()
        || err.is_connection_dropped()
        || err.is_connection_refusal()
        || err.is_timeout()
        || err.kind() == ErrorKind::InvalidClientConfig
    {
        ThrottleError::Unavailable(err.to_string())
    } else {
        ThrottleError::Script(err.to_string())
    }
}

/// Distributed throttle for one queue
///
/// Keys are `{<prefix>:<queue>}:queued` and `{<prefix>:<queue>}:active`; the
/// hash tag keeps both counters on one cluster slot so a script can touch them
/// together.
pub struct RedisThrottle {
    conn: ConnectionManager,
    scripts: Arc<Scripts>,
    queue: QueueName,
    queued_key: String,
    active_key: String,
}

impl RedisThrottle {
    pub fn new(conn: ConnectionManager, prefix: &str, queue: QueueName) -> Self {
        Self::with_scripts(conn, Arc::new(Scripts::new()), prefix, queue)
    }

    fn with_scripts(
        conn: ConnectionManager,
        scripts: Arc<Scripts>,
        prefix: &str,
        queue: QueueName,
    ) -> Self {
        let (queued_key, active_key) = counter_keys(prefix, &queue);
        Self {
            conn,
            scripts,
            queue,
            queued_key,
            active_key,
        }
    }

    pub fn queued_key(&self) -> &str {
        &self.queued_key
    }

    pub fn active_key(&self) -> &str {
        &self.active_key
    }

    async fn invoke(&self, script: &Script, args: &[u64]) -> Result<i64, ThrottleError> {
        // ConnectionManager clones share one multiplexed connection
        let mut conn = self.conn.clone();
        let mut invocation = script.prepare_invoke();
        invocation.key(&self.queued_key).key(&self.active_key);
        for arg in args {
            invocation.arg(*arg);
        }
        invocation
            .invoke_async(&mut conn)
            .await
            .map_err(map_redis_error)
    }
}

fn counter_keys(prefix: &str, queue: &QueueName) -> (String, String) {
    let tag = format!("{{{}:{}}}", prefix, queue);
    (format!("{}:queued", tag), format!("{}:active", tag))
}

#[async_trait]
impl ThrottlePort for RedisThrottle {
    async fn try_enqueue(&self, max_queue_depth: usize) -> Result<(), ThrottleError> {
        let admitted = self
            .invoke(
                &self.scripts.try_enqueue,
                &[max_queue_depth as u64, COUNTER_TTL_SECS],
            )
            .await?;

        if admitted == 1 {
            Ok(())
        } else {
            debug!(queue = %self.queue, max_queue_depth, "Global queue depth reached");
            Err(ThrottleError::QueueFull {
                max: max_queue_depth,
            })
        }
    }

    async fn try_acquire(&self, max_concurrency: usize) -> Result<bool, ThrottleError> {
        let granted = self
            .invoke(
                &self.scripts.try_acquire,
                &[max_concurrency as u64, COUNTER_TTL_SECS],
            )
            .await?;
        Ok(granted == 1)
    }

    async fn release(&self) -> Result<(), ThrottleError> {
        let released = self
            .invoke(&self.scripts.release, &[COUNTER_TTL_SECS])
            .await?;
        if released == 0 {
            warn!(queue = %self.queue, "Release on an empty active counter");
        }
        Ok(())
    }

    async fn requeue(&self) -> Result<(), ThrottleError> {
        self.invoke(&self.scripts.requeue, &[COUNTER_TTL_SECS])
            .await?;
        Ok(())
    }

    async fn counters(&self) -> Result<ThrottleCounters, ThrottleError> {
        let mut conn = self.conn.clone();
        let values: Vec<Option<u64>> = redis::cmd("MGET")
            .arg(&self.queued_key)
            .arg(&self.active_key)
            .query_async(&mut conn)
            .await
            .map_err(map_redis_error)?;

        let read = |i: usize| values.get(i).copied().flatten().unwrap_or(0);
        Ok(ThrottleCounters {
            queued: read(0),
            active: read(1),
        })
    }
}

/// Hands out one RedisThrottle per queue over a shared connection
pub struct RedisThrottleBackend {
    conn: ConnectionManager,
    prefix: String,
    scripts: Arc<Scripts>,
}

impl RedisThrottleBackend {
    pub fn new(conn: ConnectionManager, prefix: impl Into<String>) -> Self {
        Self {
            conn,
            prefix: prefix.into(),
            scripts: Arc::new(Scripts::new()),
        }
    }

    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Concrete throttle for `queue`
    pub fn redis_throttle(&self, queue: &QueueName) -> RedisThrottle {
        RedisThrottle::with_scripts(
            self.conn.clone(),
            Arc::clone(&self.scripts),
            &self.prefix,
            queue.clone(),
        )
    }
}

impl ThrottleBackend for RedisThrottleBackend {
    fn throttle(&self, queue: &QueueName) -> Arc<dyn ThrottlePort> {
        Arc::new(self.redis_throttle(queue))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::connect;

    #[test]
    fn test_counter_keys_share_a_hash_tag() {
        let queue = QueueName::new("answer").unwrap();
        let (queued, active) = counter_keys("proctor:throttle", &queue);
        assert_eq!(queued, "{proctor:throttle:answer}:queued");
        assert_eq!(active, "{proctor:throttle:answer}:active");
    }

    #[test]
    fn test_queues_never_share_keys() {
        let answer = counter_keys("p", &QueueName::new("answer").unwrap());
        let submit = counter_keys("p", &QueueName::new("submit").unwrap());
        assert_ne!(answer.0, submit.0);
        assert_ne!(answer.1, submit.1);
    }

    #[test]
    fn test_io_errors_map_to_unavailable() {
        let err = RedisError::from(std::io::Error::new(
            std::io::ErrorKind::ConnectionRefused,
            "refused",
        ));
        assert!(matches!(
            map_redis_error(err),
            ThrottleError::Unavailable(_)
        ));

        let err = RedisError::from((ErrorKind::ResponseError, "ERR bad script"));
        assert!(matches!(map_redis_error(err), ThrottleError::Script(_)));
    }

    // Requires a running Redis: REDIS_URL=redis://127.0.0.1/ cargo test -- --ignored
    async fn live_throttle(queue: &str) -> RedisThrottle {
        let url = std::env::var("REDIS_URL").unwrap_or_else(|_| "redis://127.0.0.1/".into());
        let mut conn = connect(&url).await.unwrap();
        let prefix = format!("proctor:test:{}", std::process::id());
        let throttle = RedisThrottle::new(conn.clone(), &prefix, QueueName::new(queue).unwrap());
        let _: () = redis::cmd("DEL")
            .arg(throttle.queued_key())
            .arg(throttle.active_key())
            .query_async(&mut conn)
            .await
            .unwrap();
        throttle
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_enqueue_acquire_release() {
        let throttle = live_throttle("lifecycle").await;

        throttle.try_enqueue(2).await.unwrap();
        throttle.try_enqueue(2).await.unwrap();
        assert_eq!(
            throttle.try_enqueue(2).await.unwrap_err(),
            ThrottleError::QueueFull { max: 2 }
        );

        assert!(throttle.try_acquire(1).await.unwrap());
        assert!(!throttle.try_acquire(1).await.unwrap());
        assert_eq!(
            throttle.counters().await.unwrap(),
            ThrottleCounters {
                queued: 1,
                active: 1
            }
        );

        throttle.release().await.unwrap();
        throttle.release().await.unwrap();
        assert!(throttle.try_acquire(1).await.unwrap());
        throttle.release().await.unwrap();
        assert_eq!(throttle.counters().await.unwrap(), ThrottleCounters::default());
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_requeue_returns_a_grant() {
        let throttle = live_throttle("requeue").await;

        throttle.try_enqueue(1).await.unwrap();
        assert!(throttle.try_acquire(1).await.unwrap());
        throttle.requeue().await.unwrap();
        assert_eq!(
            throttle.counters().await.unwrap(),
            ThrottleCounters {
                queued: 1,
                active: 0
            }
        );

        assert!(throttle.try_acquire(1).await.unwrap());
        throttle.release().await.unwrap();
        assert_eq!(throttle.counters().await.unwrap(), ThrottleCounters::default());
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_counters_carry_ttl() {
        let throttle = live_throttle("ttl").await;
        throttle.try_enqueue(5).await.unwrap();

        let mut conn = throttle.conn.clone();
        let ttl: i64 = redis::cmd("TTL")
            .arg(throttle.queued_key())
            .query_async(&mut conn)
            .await
            .unwrap();
        assert!(ttl > 0 && ttl <= COUNTER_TTL_SECS as i64);
    }

    #[tokio::test]
    #[ignore]
    async fn test_live_concurrent_acquires_respect_ceiling() {
        let throttle = Arc::new(live_throttle("race").await);
        for _ in 0..20 {
            throttle.try_enqueue(100).await.unwrap();
        }

        let mut tasks = Vec::new();
        for _ in 0..20 {
            let throttle = Arc::clone(&throttle);
            tasks.push(tokio::spawn(async move { throttle.try_acquire(3).await.unwrap() }));
        }
        let mut granted = 0;
        for task in tasks {
            if task.await.unwrap() {
                granted += 1;
            }
        }
        assert_eq!(granted, 3);
        assert_eq!(throttle.counters().await.unwrap().queued, 17);
    }
}
