//! `toolgate bridge` — serve the tool registry to external clients.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use toolgate_bridge::BridgeHandler;
use toolgate_config::AppConfig;
use toolgate_tools::{DryRunHandler, ToolExecutor, ToolRegistry};
use tracing::info;

pub async fn run(stdio: bool, port: Option<u16>) -> Result<(), Box<dyn std::error::Error>> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;

    let registry = Arc::new(ToolRegistry::builtin()?);
    let executor = ToolExecutor::new(registry, Arc::new(DryRunHandler), &config.rate_limit);
    let handler = BridgeHandler::new(executor)
        .with_timeout(Duration::from_secs(config.bridge.request_timeout_secs));

    let shutdown = CancellationToken::new();
    tokio::spawn({
        let shutdown = shutdown.clone();
        async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                info!("Shutting down bridge");
                shutdown.cancel();
            }
        }
    });

    if stdio {
        toolgate_bridge::stdio::serve_stdio(&handler, shutdown).await?;
    } else {
        let addr = format!("{}:{}", config.bridge.host, port.unwrap_or(config.bridge.port));
        toolgate_bridge::server::serve(Arc::new(handler), &addr, shutdown).await?;
    }

    Ok(())
}
