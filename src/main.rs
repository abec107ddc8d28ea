use std::sync::Arc;

use anyhow::Context;
use futures::StreamExt;

use english_partner::cache::{CacheStore, MemoryCache};
use english_partner::channels::{Channel, TelegramChannel};
use english_partner::config::BotConfig;
use english_partner::media::{BlobStore, LocalBlobStore};
use english_partner::session::{SessionController, SessionRouter};
use english_partner::store::{Database, LibSqlBackend};
use english_partner::web::{StatusRouteState, status_routes};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_target(false)
        .init();

    let config = BotConfig::from_env().context("Invalid configuration")?;

    eprintln!("🇬🇧 English Partner v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   Database: {}", config.db_path.display());
    eprintln!("   Storage: {}", config.storage_dir.display());
    eprintln!(
        "   Matching: {} per search, {} views per {}h",
        config.matching.match_limit,
        config.matching.view_limit,
        config.matching.view_window.as_secs() / 3600,
    );

    // ── Database ─────────────────────────────────────────────────────────
    if let Some(parent) = config.db_path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }
    let db: Arc<dyn Database> = Arc::new(
        LibSqlBackend::new_local(&config.db_path)
            .await
            .with_context(|| format!("Failed to open database at {}", config.db_path.display()))?,
    );

    // ── Storage & cache ──────────────────────────────────────────────────
    let blobs: Arc<dyn BlobStore> = Arc::new(
        LocalBlobStore::new(config.storage_dir.clone(), Arc::clone(&db))
            .await
            .context("Failed to prepare photo storage")?,
    );
    let cache: Arc<dyn CacheStore> = Arc::new(MemoryCache::new());

    // ── Channel ──────────────────────────────────────────────────────────
    let channel: Arc<dyn Channel> = Arc::new(TelegramChannel::new(
        config.bot_token.clone(),
        Arc::clone(&blobs),
    ));
    channel
        .health_check()
        .await
        .context("Telegram health check failed")?;

    // ── Sessions ─────────────────────────────────────────────────────────
    let controller = Arc::new(SessionController::new(
        Arc::clone(&db),
        Arc::clone(&channel),
        blobs,
        cache,
        &config.matching,
    ));
    let router = Arc::new(SessionRouter::new(controller, config.session_idle));

    // ── Status API ───────────────────────────────────────────────────────
    if let Some(port) = config.http_port {
        let app = status_routes(StatusRouteState {
            db: Arc::clone(&db),
            sessions: Some(Arc::clone(&router)),
        });
        let listener = tokio::net::TcpListener::bind(format!("0.0.0.0:{port}"))
            .await
            .with_context(|| format!("Failed to bind status port {port}"))?;
        eprintln!("   Status API: http://0.0.0.0:{port}/health");
        tokio::spawn(async move {
            if let Err(e) = axum::serve(listener, app).await {
                tracing::error!("Status server stopped: {e}");
            }
        });
    }

    // ── Event loop ───────────────────────────────────────────────────────
    let mut events = channel.start().await?;
    eprintln!("   Listening on {}\n", channel.name());

    loop {
        tokio::select! {
            event = events.next() => match event {
                Some(event) => router.dispatch(event),
                None => {
                    tracing::warn!("Event stream ended");
                    break;
                }
            },
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("Shutting down");
                break;
            }
        }
    }

    Ok(())
}
