//! stowaway server entry point.
//!
//! This is the main binary that boots the MCP server on stdio transport.
//! Logging goes to stderr to avoid interfering with the JSON-RPC protocol on stdout.

use std::sync::Arc;

use anyhow::Result;
use rmcp::service::serve_server;
use rmcp::transport::io::stdio;
use stowaway_client::{FetchClient, FetchConfig, FetchRendererFactory};
use stowaway_core::prefetch::RendererFactory;
use stowaway_core::{AppConfig, OfflineCache};
use tracing_subscriber::EnvFilter;

mod handler;
mod tools;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .json()
        .init();

    let config = AppConfig::load()?;
    tracing::info!(store_dir = %config.store_dir.display(), "Starting stowaway server on stdio transport");

    let cache = OfflineCache::open(&config, renderer_factory(&config).await?)?;
    let handler = handler::StowawayServer::new(Arc::new(cache));
    let transport = stdio();
    let server = serve_server(handler, transport).await?;

    server.waiting().await?;

    Ok(())
}

async fn renderer_factory(config: &AppConfig) -> Result<Arc<dyn RendererFactory>> {
    #[cfg(feature = "headless")]
    if config.render_enabled {
        let launcher = stowaway_client::HeadlessLauncher::new().await?;
        tracing::info!("headless rendering enabled");
        return Ok(Arc::new(launcher));
    }

    #[cfg(not(feature = "headless"))]
    if config.render_enabled {
        tracing::warn!("render_enabled is set but the headless feature is not compiled in; using plain fetches");
    }

    let client = FetchClient::new(FetchConfig::from(config))?;
    Ok(Arc::new(FetchRendererFactory::new(client)))
}
