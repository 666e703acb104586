use anyhow::Result;
use std::sync::Arc;

use common::key_pool::KeyPool;
use profiler::cli;
use profiler::pipeline::Pipeline;
use profiler::sources::LiveProviders;
use profiler::wallet_store::WalletStore;

#[tokio::main]
async fn main() -> Result<()> {
    let config = common::config::Config::load()?;

    let (dispatch, _otel_guard) =
        common::observability::build_dispatch("profiler", &config.general.log_level);
    tracing::dispatcher::set_global_default(dispatch).map_err(anyhow::Error::msg)?;

    let cmd = cli::parse_args(std::env::args()).map_err(anyhow::Error::msg)?;

    if let Some(parent) = std::path::Path::new(&config.database.path).parent() {
        std::fs::create_dir_all(parent)?;
    }
    let db = common::db::AsyncDb::open(&config.database.path).await?;

    profiler::metrics::describe();

    let keys = Arc::new(KeyPool::from_config(&config.providers));
    keys.log_key_counts();
    let providers = LiveProviders::from_config(&config.providers, keys)?;
    let pipeline = Pipeline::from_config(&config, providers, WalletStore::new(db));

    cli::run_command(&pipeline, cmd, chrono::Utc::now().timestamp()).await
}
