//! RPC Method Handlers
//!
//! Implements the business logic for each JSON-RPC method.

use crate::error::to_rpc_error;
use crate::types::{SettingsResponse, StatsResponse, UpdateSettingsRequest};
use jsonrpsee::types::ErrorObjectOwned;
use proctor_core::application::{QueueRegistry, TtlCache};
use proctor_core::domain::{QueueSettingsPatch, QueueStats};
use proctor_core::error::AppError;
use proctor_core::port::TimeProvider;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// How long a stats snapshot is served before the shared store is read again
pub const STATS_CACHE_TTL: Duration = Duration::from_secs(1);

/// RPC Handler with injected dependencies
pub struct AdminHandler {
    registry: Arc<QueueRegistry>,
    time_provider: Arc<dyn TimeProvider>,
    stats_cache: TtlCache<(), Vec<QueueStats>>,
    start_millis: i64,
}

impl AdminHandler {
    pub fn new(registry: Arc<QueueRegistry>, time_provider: Arc<dyn TimeProvider>) -> Self {
        Self {
            registry,
            stats_cache: TtlCache::new(STATS_CACHE_TTL, Arc::clone(&time_provider)),
            start_millis: time_provider.now_millis(),
            time_provider,
        }
    }

    /// admin.queue_settings.get.v1
    pub async fn get_settings(&self) -> Result<SettingsResponse, ErrorObjectOwned> {
        Ok(self.registry.settings().into())
    }

    /// admin.queue_settings.update.v1
    pub async fn update_settings(
        &self,
        params: UpdateSettingsRequest,
    ) -> Result<SettingsResponse, ErrorObjectOwned> {
        let patch = QueueSettingsPatch::from(params);
        if patch.is_empty() {
            return Err(to_rpc_error(AppError::Validation(
                "at least one of answer_concurrency, submit_concurrency, max_queue is required"
                    .to_string(),
            )));
        }

        info!(?patch, "Admin settings update");
        let next = self.registry.update_queue_settings(patch);
        self.stats_cache.invalidate(&());
        Ok(next.into())
    }

    /// admin.queue_stats.v1
    pub async fn stats(&self) -> Result<StatsResponse, ErrorObjectOwned> {
        let registry = Arc::clone(&self.registry);
        let queues = self
            .stats_cache
            .get_or_try_insert_with((), || async move {
                Ok::<_, ErrorObjectOwned>(registry.stats().await)
            })
            .await?;

        let uptime_ms = self.time_provider.now_millis() - self.start_millis;
        Ok(StatsResponse {
            queues,
            uptime_seconds: uptime_ms.max(0) / 1000,
        })
    }
}
