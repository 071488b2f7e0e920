//! HTTP API that connects a user's Google or Outlook calendar and returns
//! their events in one unified shape.
//!
//! This crate provides:
//! - [`Orchestrator`] driving each connection attempt from consent URL to events
//! - [`PendingTable`] holding issued `state` values until their callback
//! - [`router`] exposing the attempt over axum
//! - [`ServerConfig`] read from the environment at startup
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//!
//! use calfuse_providers::ProviderRegistry;
//! use calfuse_server::{Orchestrator, ServerConfig, ShutdownHandle, serve};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = ServerConfig::from_env()?;
//!     let registry = Arc::new(ProviderRegistry::from_env()?);
//!     let orchestrator = Orchestrator::new(registry, &config)?;
//!     serve(&config, orchestrator, ShutdownHandle::new()).await?;
//!     Ok(())
//! }
//! ```

mod config;
mod error;
mod orchestrator;
mod pending;
mod routes;
mod signals;

pub use config::{DEFAULT_BIND_ADDR, ServerConfig};
pub use error::{ServerError, ServerResult};
pub use orchestrator::{ConnectionState, Orchestrator, OrchestratorError};
pub use pending::{PendingRequest, PendingTable, TakeError};
pub use routes::{ApiError, router};
pub use signals::ShutdownHandle;

use tokio::net::TcpListener;
use tracing::info;

/// Binds `config.bind_addr` and serves the API until `shutdown` fires.
pub async fn serve(
    config: &ServerConfig,
    orchestrator: Orchestrator,
    shutdown: ShutdownHandle,
) -> ServerResult<()> {
    let listener = TcpListener::bind(config.bind_addr).await?;
    info!(addr = %listener.local_addr()?, providers = ?orchestrator.providers(), "listening");

    axum::serve(listener, router(orchestrator))
        .with_graceful_shutdown(shutdown.wait())
        .await?;

    info!("server stopped");
    Ok(())
}
