//! JSON-RPC Admin API
//!
//! Operator surface over the admission queues: read and update queue
//! settings, read queue stats. Binds to localhost only.

pub mod error;
pub mod handler;
pub mod server;
pub mod types;

pub use server::{RpcServer, RpcServerConfig, ServerError};
