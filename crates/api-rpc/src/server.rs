//! JSON-RPC Server
//!
//! JSON-RPC 2.0 over HTTP, bound to localhost.

use crate::handler::AdminHandler;
use crate::types::UpdateSettingsRequest;
use jsonrpsee::server::{Server, ServerHandle};
use jsonrpsee::RpcModule;
use proctor_core::application::QueueRegistry;
use proctor_core::port::TimeProvider;
use std::net::SocketAddr;
use std::sync::Arc;
use thiserror::Error;
use tracing::info;

const DEFAULT_RPC_HOST: &str = "127.0.0.1";
pub const DEFAULT_RPC_PORT: u16 = 9531;

pub mod method {
    pub const SETTINGS_GET: &str = "admin.queue_settings.get.v1";
    pub const SETTINGS_UPDATE: &str = "admin.queue_settings.update.v1";
    pub const QUEUE_STATS: &str = "admin.queue_stats.v1";
}

#[derive(Error, Debug)]
pub enum ServerError {
    #[error("failed to bind {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to register {0}")]
    Register(String),
}

/// RPC Server Configuration
#[derive(Debug, Clone)]
pub struct RpcServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for RpcServerConfig {
    fn default() -> Self {
        Self {
            host: DEFAULT_RPC_HOST.to_string(),
            port: DEFAULT_RPC_PORT,
        }
    }
}

/// RPC Server
pub struct RpcServer {
    config: RpcServerConfig,
    handler: Arc<AdminHandler>,
}

impl RpcServer {
    pub fn new(
        config: RpcServerConfig,
        registry: Arc<QueueRegistry>,
        time_provider: Arc<dyn TimeProvider>,
    ) -> Self {
        Self {
            config,
            handler: Arc::new(AdminHandler::new(registry, time_provider)),
        }
    }

    /// Start the JSON-RPC server; returns its handle and the bound address
    pub async fn start(self) -> Result<(ServerHandle, SocketAddr), ServerError> {
        let addr = format!("{}:{}", self.config.host, self.config.port);

        let server = Server::builder()
            .build(&addr)
            .await
            .map_err(|source| ServerError::Bind {
                addr: addr.clone(),
                source,
            })?;
        let local_addr = server.local_addr().map_err(|source| ServerError::Bind {
            addr: addr.clone(),
            source,
        })?;

        let mut module = RpcModule::new(());

        let handler = self.handler.clone();
        module
            .register_async_method(method::SETTINGS_GET, move |_, _, _| {
                let handler = handler.clone();
                async move { handler.get_settings().await }
            })
            .map_err(|e| ServerError::Register(e.to_string()))?;

        let handler = self.handler.clone();
        module
            .register_async_method(method::SETTINGS_UPDATE, move |params, _, _| {
                let handler = handler.clone();
                async move {
                    let req: UpdateSettingsRequest = params.parse()?;
                    handler.update_settings(req).await
                }
            })
            .map_err(|e| ServerError::Register(e.to_string()))?;

        let handler = self.handler.clone();
        module
            .register_async_method(method::QUEUE_STATS, move |_, _, _| {
                let handler = handler.clone();
                async move { handler.stats().await }
            })
            .map_err(|e| ServerError::Register(e.to_string()))?;

        info!(addr = %local_addr, "Admin JSON-RPC server listening (localhost only)");

        let handle = server.start(module);
        Ok((handle, local_addr))
    }
}
