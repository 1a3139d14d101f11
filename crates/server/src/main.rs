//! `shelfd`: the Shelf server binary.

use anyhow::Context;
use clap::Parser;
use figment::providers::{Env, Format, Toml};
use figment::Figment;
use shelf_core::config::AppConfig;
use shelf_server::guard::HeaderGuard;
use shelf_server::{create_router, gc, AppState};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(name = "shelfd", about = "Shelf content platform server", version)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(
        short,
        long,
        env = "SHELF_CONFIG",
        default_value = "config/server.toml"
    )]
    config: PathBuf,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new("info,tower_http=info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config: AppConfig = load_config(&args.config)
        .with_context(|| format!("failed to load config from {}", args.config.display()))?;
    config.validate().context("invalid configuration")?;

    let storage = shelf_storage::from_config(&config.storage)
        .await
        .context("failed to initialize storage backend")?;
    storage
        .health_check()
        .await
        .context("storage backend health check failed")?;
    tracing::info!(backend = storage.backend_name(), "storage backend ready");

    let metadata = shelf_metadata::from_config(&config.metadata)
        .await
        .context("failed to open metadata store")?;
    tracing::info!(db_path = %config.metadata.db_path.display(), "metadata store ready");

    let bind = config.server.bind.clone();
    let sweep_interval = config.gc.sweep_interval_secs;
    let state = AppState::new(config, storage, metadata, Arc::new(HeaderGuard));

    if sweep_interval > 0 {
        spawn_sweep_scheduler(state.clone(), Duration::from_secs(sweep_interval));
    } else {
        tracing::info!("gc sweep scheduler disabled");
    }

    let app = create_router(state);
    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("failed to bind {bind}"))?;
    tracing::info!(addr = %listener.local_addr()?, "listening");
    axum::serve(listener, app).await.context("server error")?;

    Ok(())
}

fn load_config(path: &std::path::Path) -> anyhow::Result<AppConfig> {
    let mut figment = Figment::new();
    if path.exists() {
        figment = figment.merge(Toml::file(path));
    } else {
        tracing::warn!(path = %path.display(), "config file not found, using defaults and environment");
    }
    let config = figment
        .merge(Env::prefixed("SHELF_").split("__"))
        .extract()?;
    Ok(config)
}

/// Background sweep loop. The first tick fires after one full interval so a
/// crash-looping process does not hammer the stores at startup. Sweep errors
/// are logged and the loop keeps going.
fn spawn_sweep_scheduler(state: AppState, interval: Duration) {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval_at(tokio::time::Instant::now() + interval, interval);
        loop {
            ticker.tick().await;
            match gc::sweep_expired(
                state.metadata.as_ref(),
                state.storage.as_ref(),
                &state.config.gc,
            )
            .await
            {
                Ok(stats) => {
                    if stats.books_purged > 0 || stats.comics_purged > 0 {
                        state.quota.invalidate().await;
                        tracing::info!(
                            books = stats.books_purged,
                            comics = stats.comics_purged,
                            blobs = stats.blobs_deleted,
                            "scheduled sweep purged entities"
                        );
                    } else {
                        tracing::debug!("scheduled sweep found nothing to purge");
                    }
                }
                Err(e) => {
                    tracing::error!(error = %e, "scheduled sweep failed");
                }
            }
        }
    });
    tracing::info!(interval_secs = interval.as_secs(), "gc sweep scheduler started");
}
