mod aggregation;
mod api;
mod metrics;
mod models;

use anyhow::Result;
use common::config::DashboardConfig;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(DashboardConfig::default_config_path);
    let config = DashboardConfig::load(&config_path)?;

    let _otel_guard =
        common::observability::init("affiliate-dashboard", &config.observability.log_level)?;
    info!(path = %config_path, upstream = %config.smartico.base_url, "config loaded");
    if config.smartico.api_key.is_none() {
        tracing::warn!(
            "no Smartico API key configured (set {}), upstream calls will be rejected",
            common::config::API_KEY_ENV
        );
    }

    let prometheus = metrics::init_global()?;
    let state = Arc::new(api::AppState::from_config(&config, Some(prometheus))?);
    let app = api::router(state);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!(addr = %addr, "affiliate dashboard listening");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}
