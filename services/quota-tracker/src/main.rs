use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use axum::serve;
use tokio::net::TcpListener;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

use access_quota_tracker::storage::{MemoryRecordStore, RecordStore, SheetDbStore};
use access_quota_tracker::tracker::SystemClock;
use access_quota_tracker::{create_router, ApiState, QuotaTrackerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let config = QuotaTrackerConfig::from_env().context("failed to load configuration")?;
    init_tracing(&config.log_level)?;

    info!(
        host = %config.server_host,
        port = config.server_port,
        default_limit = config.default_limit,
        window_secs = config.window_length.num_seconds(),
        rollover_anchor = %config.rollover_anchor,
        owner_configured = config.owner_id.is_some(),
        "starting access-quota-tracker service"
    );

    let (quota_store, registry_store) = build_stores(&config)?;
    let addr: SocketAddr = format!("{}:{}", config.server_host, config.server_port)
        .parse()
        .context("invalid server bind address")?;

    let state = Arc::new(ApiState::assemble(
        config,
        quota_store,
        registry_store,
        Arc::new(SystemClock),
    ));
    let router = create_router(Arc::clone(&state));

    let listener = TcpListener::bind(addr)
        .await
        .context("failed to bind TCP listener")?;
    let local_addr = listener
        .local_addr()
        .context("failed to read bound address")?;
    info!(%local_addr, "access-quota-tracker listening");

    serve(listener, router.into_make_service())
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server encountered an unrecoverable error")?;

    info!("access-quota-tracker service shutting down");
    Ok(())
}

fn build_stores(
    config: &QuotaTrackerConfig,
) -> Result<(Arc<dyn RecordStore>, Arc<dyn RecordStore>)> {
    let Some(url) = &config.store_url else {
        warn!("STORE_URL not set; quota and registry records are kept in memory only");
        return Ok((
            Arc::new(MemoryRecordStore::new()),
            Arc::new(MemoryRecordStore::new()),
        ));
    };

    let timeout = Duration::from_secs(config.store_timeout_secs);
    let quota = SheetDbStore::new(
        url.clone(),
        config.store_token.clone(),
        Some(config.quota_sheet.clone()),
        timeout,
    )?;
    let registry = SheetDbStore::new(
        url.clone(),
        config.store_token.clone(),
        Some(config.registry_sheet.clone()),
        timeout,
    )?;
    info!(
        quota_sheet = %config.quota_sheet,
        registry_sheet = %config.registry_sheet,
        "using remote record store"
    );

    Ok((Arc::new(quota), Arc::new(registry)))
}

fn init_tracing(log_level: &str) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));
    fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .try_init()
        .map_err(|err| anyhow::anyhow!(err))?;
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install CTRL+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigterm =
            signal(SignalKind::terminate()).expect("failed to install SIGTERM handler");
        sigterm.recv().await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    info!("shutdown signal received");
}
