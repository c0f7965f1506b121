use std::sync::Arc;
use tokio::time::Instant;
use tracing_subscriber::EnvFilter;

use monitor_api::AppState;
use monitor_api::config::{ConfigError, MonitorConfig};
use monitor_api::pipeline::Pipeline;
use monitor_api::store::RedisStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            EnvFilter::new("monitor_api=debug,tower_http=debug")
        }))
        .init();

    let config_path =
        std::env::var("MONITOR_CONFIG").unwrap_or_else(|_| "monitor.toml".to_string());
    let mut config = MonitorConfig::load(&config_path)?;
    config.apply_env()?;
    config.validate()?;

    let redis = Arc::new(RedisStore::open(&config.store)?);
    tracing::info!(
        "redis pool for {} (max {} connections)",
        config.store.url,
        config.store.max_connections
    );

    let pipeline = Arc::new(Pipeline::new(redis.clone(), &config));
    tracing::info!("decoding results as {}", config.decode.schema.as_str());

    // An unreachable store is not fatal: requests retry on their own. Keys
    // that contradict the configured layout are.
    match pipeline
        .probe(Instant::now() + config.server.request_timeout())
        .await
    {
        Ok(count) => tracing::info!("store reachable, {count} monitor keys"),
        Err(e) if e.downcast_ref::<ConfigError>().is_some() => return Err(e),
        Err(e) => tracing::warn!("store probe failed: {e}"),
    }

    if config.server.access_token.is_none() {
        tracing::warn!("no access token configured, endpoints are open");
    }

    let state = AppState::new(pipeline, &config.server);
    let app = monitor_api::router(state, config.server.static_dir.as_deref());

    let listener = tokio::net::TcpListener::bind(&config.server.listen).await?;
    tracing::info!("monitor-api listening on {}", config.server.listen);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    redis.close().await;
    tracing::info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        let _ = tokio::signal::ctrl_c().await;
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                tracing::warn!("cannot listen for SIGTERM: {e}");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
    tracing::info!("shutdown signal received");
}
