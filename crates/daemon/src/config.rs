//! Daemon configuration, read once from the environment at start

use proctor_api_rpc::RpcServerConfig;
use proctor_core::application::{AcquireBackoff, GlobalLimits, QueueOptions};
use proctor_core::domain::settings::{
    DEFAULT_ANSWER_CONCURRENCY, DEFAULT_MAX_QUEUE, DEFAULT_SUBMIT_CONCURRENCY,
};
use proctor_core::domain::QueueSettings;
use proctor_core::error::{AppError, Result};
use std::time::Duration;

const DEFAULT_REDIS_PREFIX: &str = "proctor:throttle";
const DEFAULT_ACQUIRE_RETRY_MS: u64 = 250;
const MAX_ACQUIRE_RETRY_MS: u64 = 5_000;

/// Where the distributed throttle lives
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ThrottleDriver {
    /// In-process limits only
    Memory,
    Redis { url: String, prefix: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Pretty,
    Json,
}

#[derive(Debug, Clone)]
pub struct DaemonConfig {
    pub driver: ThrottleDriver,
    pub settings: QueueSettings,
    pub limits: GlobalLimits,
    pub options: QueueOptions,
    pub rpc: RpcServerConfig,
    pub log_format: LogFormat,
    /// Ignored values, logged once logging is up
    pub warnings: Vec<String>,
}

impl DaemonConfig {
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup; unset, unparsable or non-positive numbers
    /// fall back to their defaults
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut warnings = Vec::new();
        let choice = |key: &str| lookup(key).unwrap_or_default().trim().to_ascii_lowercase();
        let positive = |key: &str| {
            lookup(key)
                .and_then(|s| s.trim().parse::<usize>().ok())
                .filter(|n| *n > 0)
        };

        let driver = match choice("PROCTOR_THROTTLE_DRIVER").as_str() {
            "" | "memory" => ThrottleDriver::Memory,
            "redis" => {
                let url = lookup("PROCTOR_REDIS_URL")
                    .filter(|s| !s.trim().is_empty())
                    .ok_or_else(|| {
                        AppError::Config(
                            "PROCTOR_REDIS_URL is required when PROCTOR_THROTTLE_DRIVER=redis"
                                .to_string(),
                        )
                    })?;
                let prefix = lookup("PROCTOR_REDIS_PREFIX")
                    .filter(|s| !s.trim().is_empty())
                    .unwrap_or_else(|| DEFAULT_REDIS_PREFIX.to_string());
                ThrottleDriver::Redis { url, prefix }
            }
            other => {
                return Err(AppError::Config(format!(
                    "unknown PROCTOR_THROTTLE_DRIVER '{}' (expected memory or redis)",
                    other
                )))
            }
        };

        let settings = QueueSettings::new(
            positive("PROCTOR_ANSWER_CONCURRENCY").unwrap_or(DEFAULT_ANSWER_CONCURRENCY),
            positive("PROCTOR_SUBMIT_CONCURRENCY").unwrap_or(DEFAULT_SUBMIT_CONCURRENCY),
            positive("PROCTOR_QUEUE_MAX").unwrap_or(DEFAULT_MAX_QUEUE),
        );

        let limits = GlobalLimits {
            answer_concurrency: positive("PROCTOR_ANSWER_GLOBAL_CONCURRENCY"),
            submit_concurrency: positive("PROCTOR_SUBMIT_GLOBAL_CONCURRENCY"),
        };

        let retry_ms = positive("PROCTOR_ACQUIRE_RETRY_MS")
            .map(|n| n as u64)
            .unwrap_or(DEFAULT_ACQUIRE_RETRY_MS);
        let backoff = match choice("PROCTOR_ACQUIRE_BACKOFF").as_str() {
            "exponential" => AcquireBackoff::exponential(
                Duration::from_millis(retry_ms),
                Duration::from_millis(MAX_ACQUIRE_RETRY_MS.max(retry_ms)),
            ),
            "" | "fixed" => AcquireBackoff::fixed(Duration::from_millis(retry_ms)),
            other => {
                warnings.push(format!(
                    "unknown PROCTOR_ACQUIRE_BACKOFF '{}' (expected fixed or exponential), using fixed",
                    other
                ));
                AcquireBackoff::fixed(Duration::from_millis(retry_ms))
            }
        };
        let options = QueueOptions {
            backoff,
            run_deadline: positive("PROCTOR_TASK_DEADLINE_MS")
                .map(|ms| Duration::from_millis(ms as u64)),
        };

        let mut rpc = RpcServerConfig::default();
        if let Some(host) = lookup("PROCTOR_RPC_HOST").filter(|s| !s.trim().is_empty()) {
            rpc.host = host;
        }
        if let Some(port) = lookup("PROCTOR_RPC_PORT").and_then(|s| s.trim().parse().ok()) {
            rpc.port = port;
        }

        let log_format = match choice("PROCTOR_LOG_FORMAT").as_str() {
            "json" => LogFormat::Json,
            "" | "pretty" => LogFormat::Pretty,
            other => {
                warnings.push(format!(
                    "unknown PROCTOR_LOG_FORMAT '{}' (expected pretty or json), using pretty",
                    other
                ));
                LogFormat::Pretty
            }
        };

        Ok(Self {
            driver,
            settings,
            limits,
            options,
            rpc,
            log_format,
            warnings,
        })
    }
}
