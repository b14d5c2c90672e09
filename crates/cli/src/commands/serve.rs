//! `shellpilot serve`: the tool protocol server on stdin/stdout.

use shellpilot_config::AppConfig;
use shellpilot_mcp::ToolServer;
use std::sync::Arc;
use tokio::io::BufReader;
use tracing::info;

pub async fn run(config: AppConfig) -> Result<(), Box<dyn std::error::Error>> {
    let registry = shellpilot_tools::default_registry(&config.shell);
    info!(tools = ?registry.names(), shell = %config.shell.shell, "Serving tools on stdio");

    ToolServer::new(Arc::new(registry))
        .serve(BufReader::new(tokio::io::stdin()), tokio::io::stdout())
        .await?;

    info!("Input closed, server stopped");
    Ok(())
}
