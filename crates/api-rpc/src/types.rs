//! RPC Request/Response Types
//!
//! Method parameters and results for the admin API.

use proctor_core::domain::{QueueSettings, QueueSettingsPatch, QueueStats};
use serde::{Deserialize, Serialize};

/// admin.queue_settings.get.v1 / admin.queue_settings.update.v1 result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SettingsResponse {
    pub answer_concurrency: usize,
    pub submit_concurrency: usize,
    pub max_queue: usize,
}

impl From<QueueSettings> for SettingsResponse {
    fn from(settings: QueueSettings) -> Self {
        Self {
            answer_concurrency: settings.answer_concurrency,
            submit_concurrency: settings.submit_concurrency,
            max_queue: settings.max_queue,
        }
    }
}

/// admin.queue_settings.update.v1 - partial update, omitted fields stay as they are
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct UpdateSettingsRequest {
    #[serde(default)]
    pub answer_concurrency: Option<usize>,
    #[serde(default)]
    pub submit_concurrency: Option<usize>,
    #[serde(default)]
    pub max_queue: Option<usize>,
}

impl From<UpdateSettingsRequest> for QueueSettingsPatch {
    fn from(req: UpdateSettingsRequest) -> Self {
        Self {
            answer_concurrency: req.answer_concurrency,
            submit_concurrency: req.submit_concurrency,
            max_queue: req.max_queue,
        }
    }
}

/// admin.queue_stats.v1
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatsResponse {
    pub queues: Vec<QueueStats>,
    pub uptime_seconds: i64,
}
