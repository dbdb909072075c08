//! Metric Service API Server
//!
//! Run with: cargo run --bin metricsvc-api
//!
//! # Configuration
//!
//! Reads `config.toml` from the standard locations (see `Config::load_default`)
//! or the path in `METRICSVC_CONFIG`; `METRICSVC_*` variables override it and
//! `RUST_LOG` overrides the log level.

use metricsvc::api::{serve, ApiConfig, AppState};
use metricsvc::config::Config;
use metricsvc::service::MetricService;
use std::path::PathBuf;
use std::sync::Arc;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = match std::env::var("METRICSVC_CONFIG") {
        Ok(path) => Config::load_with_env(&PathBuf::from(path))?,
        Err(_) => Config::load_default(),
    };
    config.logging.init_tracing();

    tracing::info!("Starting metric service API v{}", env!("CARGO_PKG_VERSION"));
    tracing::info!("OpenTSDB: {}", config.opentsdb.url);
    tracing::info!(
        workers = config.executor.thread_pool_size,
        batch_timeout_secs = config.executor.batch_timeout_secs,
        bucket_size_secs = config.query.bucket_size_secs,
        "Query settings"
    );

    let service = Arc::new(MetricService::from_config(&config)?);
    let api_config = ApiConfig::from_config(&config);
    let state = AppState::new(service, api_config.clone());

    serve(state, &api_config).await?;

    tracing::info!("Metric service API stopped");
    Ok(())
}
