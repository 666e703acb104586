mod routes;

use anyhow::Result;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::info;

use common::key_pool::KeyPool;
use profiler::pipeline::Pipeline;
use profiler::sources::LiveProviders;
use profiler::wallet_store::WalletStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config = common::config::Config::load()?;

    let (dispatch, _otel_guard) =
        common::observability::build_dispatch("persona-api", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    profiler::metrics::install_prometheus(config.observability.prometheus_port)?;
    profiler::metrics::describe();

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = common::db::AsyncDb::open(&config.database.path).await?;

    let keys = Arc::new(KeyPool::from_config(&config.providers));
    keys.log_key_counts();
    let providers = LiveProviders::from_config(&config.providers, keys)?;
    let state = Arc::new(routes::AppState {
        pipeline: Pipeline::from_config(&config, providers, WalletStore::new(db)),
        started_at: chrono::Utc::now(),
    });

    let app = routes::router(state).layer(TraceLayer::new_for_http());

    let bind_addr = format!("{}:{}", config.server.host, config.server.port);
    info!(addr = %bind_addr, "starting persona API server");
    let listener = tokio::net::TcpListener::bind(&bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("persona API server stopped");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %e, "failed to listen for shutdown signal");
    }
}
