use std::sync::Arc;

use tokio::net::TcpListener;
use tracing_subscriber::EnvFilter;

use instrument_classifier::{
    AppConfig, InferenceService, RegistryCell, build_router, model::tch_backend::TchBackend,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = Arc::new(AppConfig::from_env()?);
    tracing::info!(?config.listen_addr, "loading model artifacts");

    let backend = TchBackend::new(config.device);
    let registry_cell = RegistryCell::new();
    let registry = registry_cell.get_or_load(config.as_ref(), &backend);

    let service = InferenceService::new(registry, config.as_ref());
    let router = build_router(config.clone(), service);

    let listener = TcpListener::bind(config.listen_addr).await?;
    let addr = listener.local_addr()?;
    tracing::info!(%addr, "REST server ready");

    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    Ok(())
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for shutdown signal");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutting down");
}

const DEFAULT_LOG_FILTER: &str = "instrument_classifier=info,tower_http=info,hyper=warn";

fn init_tracing() {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}
