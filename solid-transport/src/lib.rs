//! stdio MCP server exposing Solid Pod tools

use anyhow::{Context, Result};
use solid_auth::{PodService, SolidConfig};
use std::sync::Arc;
use tracing::info;

pub mod logging;
pub mod server;
mod stdio_handler;
pub mod tools;

pub use server::{McpServer, SERVER_NAME};
pub use stdio_handler::StdioHandler;
pub use tools::{render_error, tool_definitions, ToolRegistry};

/// Serve the Solid tools over stdin/stdout until the client disconnects
pub async fn run_stdio_server(config: SolidConfig) -> Result<()> {
    info!("Starting {} v{}", SERVER_NAME, env!("CARGO_PKG_VERSION"));
    info!("Session lifetime: {:?}", config.session_ttl);
    if let Some(issuer) = &config.default_issuer {
        info!("Default issuer: {}", issuer);
    }

    let service = PodService::new(config).context("Failed to initialize Pod service")?;
    let server = Arc::new(McpServer::new(Arc::new(service)));

    StdioHandler::new(server).run().await?;

    info!("Client disconnected, shutting down");
    Ok(())
}
