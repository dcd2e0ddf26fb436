//! Proctor - admission queue host
//!
//! Builds the answer/submit queues (optionally behind the Redis throttle)
//! and serves the admin JSON-RPC API until Ctrl+C.

mod config;
mod logging;

use anyhow::Result;
use config::{DaemonConfig, ThrottleDriver};
use std::sync::Arc;
use tracing::{info, warn};

use proctor_api_rpc::RpcServer;
use proctor_core::application::{QueueRegistry, SettingsCell};
use proctor_core::port::time_provider::SystemTimeProvider;
use proctor_core::port::ThrottleBackend;
use proctor_infra_redis::{connect, RedisThrottleBackend};

const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // 1. Configuration (read once)
    let config = DaemonConfig::from_env()?;

    // 2. Logging
    logging::init(config.log_format)?;
    info!("Proctor v{} starting...", VERSION);
    for warning in &config.warnings {
        warn!("{}", warning);
    }

    // 3. Distributed throttle (absent in memory mode)
    let backend: Option<Arc<dyn ThrottleBackend>> = match &config.driver {
        ThrottleDriver::Memory => {
            info!("Throttle driver: memory (local limits only)");
            None
        }
        ThrottleDriver::Redis { url, prefix } => {
            let conn = connect(url)
                .await
                .map_err(|e| anyhow::anyhow!("Redis connection failed: {}", e))?;
            info!(prefix = %prefix, "Throttle driver: redis");
            Some(Arc::new(RedisThrottleBackend::new(conn, prefix.clone())))
        }
    };

    // 4. Queues
    let settings = SettingsCell::new(config.settings);
    let registry = Arc::new(QueueRegistry::new(
        settings,
        backend,
        config.limits,
        config.options.clone(),
    ));

    // 5. Admin RPC
    let time_provider = Arc::new(SystemTimeProvider);
    let rpc_server = RpcServer::new(config.rpc.clone(), Arc::clone(&registry), time_provider);
    let (rpc_handle, rpc_addr) = rpc_server
        .start()
        .await
        .map_err(|e| anyhow::anyhow!("RPC server start failed: {}", e))?;

    info!(rpc = %rpc_addr, "System ready");
    info!("Press Ctrl+C to shutdown");

    // 6. Wait for shutdown signal
    tokio::signal::ctrl_c().await?;
    info!("Shutdown signal received. Exiting gracefully...");

    for stats in registry.stats().await {
        if stats.active > 0 || stats.pending > 0 {
            warn!(
                queue = %stats.name,
                active = stats.active,
                pending = stats.pending,
                "Shutting down with unfinished tasks"
            );
        }
    }

    rpc_handle
        .stop()
        .map_err(|e| anyhow::anyhow!("RPC server stop failed: {}", e))?;
    rpc_handle.stopped().await;

    info!("Shutdown complete.");
    Ok(())
}
