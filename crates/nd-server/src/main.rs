use anyhow::Result;
use nd_core::NewsdeskConfig;
use nd_server::{app_with_state, state::AppState};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

const DEFAULT_FILTER: &str =
    "newsdesk=info,nd_server=info,nd_dedup=info,nd_storage=info,tower_http=info";

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let config = NewsdeskConfig::from_env()?;
    if config.server.admin_key.is_none() {
        warn!("ADMIN_KEY not set; admin endpoints are open");
    }
    let addr = format!("{}:{}", config.server.host, config.server.port);

    let state = AppState::from_config(config);
    info!(store = state.store.backend(), "newsdesk starting on {addr}");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app_with_state(state)).await?;
    Ok(())
}
