//! Shortlink server - alias resolution with cached QR codes
//!
//! Resolves aliases to target URLs through an in-memory LRU cache, serves QR
//! codes from a bounded on-disk cache, and writes usage counts back to the
//! store from a background worker.

mod config;
mod error;
mod qr;
mod server;
mod types;

use crate::config::Config;
use crate::error::{Result, ServerError};
use crate::qr::QrCodeGenerator;
use crate::server::{start_server, ServerState, SharedState};
use clap::Parser;
use shortlink_core::{
    ArtifactCache, CacheMetrics, DurableStore, MemoryStore, ResolutionCache, Resolver,
    UsageWriteBack,
};
use shortlink_db::PgStore;
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{prelude::*, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::parse();

    // Initialize logging
    let level = config.log_level();
    let env_filter = EnvFilter::from_default_env()
        .add_directive(format!("shortlink_server={}", level).parse()?)
        .add_directive(format!("shortlink_core={}", level).parse()?)
        .add_directive(format!("shortlink_db={}", level).parse()?);

    // Use JSON format for GCP Cloud Logging when LOG_FORMAT=json
    if std::env::var("LOG_FORMAT")
        .map(|v| v == "json")
        .unwrap_or(false)
    {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(tracing_stackdriver::layer())
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(env_filter).init();
    };

    info!("Starting shortlink server...");
    info!("Cache size: {}", config.cache_size);
    info!("QR code cache: {:?}", config.qr_code_cache_path);
    info!(
        "QR code cache size: {} ({} eviction)",
        config.qr_code_cache_size, config.artifact_eviction
    );

    let store: Arc<dyn DurableStore> = match &config.database_url {
        Some(url) => {
            let store = PgStore::connect(url, config.database_max_connections).await?;
            store.migrate().await?;
            Arc::new(store)
        }
        None => {
            warn!("No database URL configured, aliases are kept in memory only");
            Arc::new(MemoryStore::new())
        }
    };

    let metrics = Arc::new(CacheMetrics::new());

    let generator = match &config.qr_code_center_image_path {
        Some(path) => QrCodeGenerator::with_logo(path)?,
        None => QrCodeGenerator::new(),
    };

    let cache = ResolutionCache::new(config.cache_size, metrics.clone())?;
    let artifacts = ArtifactCache::new(
        config.qr_code_cache_path.clone(),
        config.qr_code_base_url.clone(),
        config.qr_code_cache_size,
        Arc::new(generator),
        metrics.clone(),
    )?
    .with_policy(config.artifact_eviction)
    .with_snapshot_path(config.cache_state_file.clone());
    artifacts.init().await?;

    let writeback = UsageWriteBack::start(store.clone(), metrics.clone());
    let resolver = Resolver::new(store, cache, artifacts, writeback, metrics.clone())
        .with_random_aliases(!config.disable_random_alias);
    resolver.restore().await;

    let state: SharedState = Arc::new(ServerState::new(resolver, metrics));

    let served = start_server(
        state.clone(),
        &config.host,
        config.port,
        wait_for_shutdown_signal(),
    )
    .await;

    info!("Shutting down...");
    state.resolver.shutdown().await;

    served.map_err(|e| {
        error!("HTTP server error: {}", e);
        ServerError::from(e)
    })
}

async fn wait_for_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = sigterm.recv() => {}
                    _ = tokio::signal::ctrl_c() => {}
                }
            }
            Err(e) => {
                warn!(error = %e, "Cannot listen for SIGTERM, waiting for Ctrl-C only");
                let _ = tokio::signal::ctrl_c().await;
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
