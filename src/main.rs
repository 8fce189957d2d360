//! Catalog Bot - Telegram catalog browser with guided admin flows
//!
//! Users browse and search a product catalog through inline menus. Admins
//! add and edit items and categories through short multi-step conversations.

mod api;
mod config;
mod db;
mod dispatcher;
mod messenger;
mod render;
mod runtime;
mod state_machine;
mod telegram;

use api::{create_router, AppState};
use config::{BotConfig, Ingress};
use db::Database;
use dispatcher::Dispatcher;
use runtime::{
    spawn_reaper, AllowList, ConversationRuntime, DatabaseCatalog, LaneManager, SessionRegistry,
};
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use telegram::{run_polling, TelegramMessenger};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const UPDATE_QUEUE: usize = 256;
const LANE_IDLE: Duration = Duration::from_secs(60);
const REAPER_SWEEP: Duration = Duration::from_secs(60);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();

    // Initialize logging
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "catalog_bot=info,tower_http=debug".into()),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false),
        )
        .init();

    let config = BotConfig::from_env()?;

    // Ensure database directory exists
    if let Some(parent) = config.db_path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %config.db_path.display(), "Opening database");
    let db = Database::open(&config.db_path)?;
    let catalog = Arc::new(DatabaseCatalog::new(db, config.store_timeout));
    let messenger = Arc::new(TelegramMessenger::new(&config.api_url, &config.token)?);

    let registry = Arc::new(SessionRegistry::new());
    let runtime = ConversationRuntime::new(catalog, messenger.clone());
    let cancel = CancellationToken::new();

    let reaper = config.session_idle.map(|max_idle| {
        spawn_reaper(
            registry.clone(),
            runtime.clone(),
            max_idle,
            REAPER_SWEEP,
            cancel.clone(),
        )
    });

    let policy = AllowList::new(config.admin_ids.iter().copied());
    if policy.is_empty() {
        tracing::warn!("ADMIN_IDS is empty; admin features are unavailable");
    }
    tracing::info!(admins = policy.len(), "Access policy loaded");

    let dispatcher = Arc::new(Dispatcher::new(registry.clone(), runtime, policy));
    let lanes = LaneManager::new(dispatcher, LANE_IDLE);

    // Both ingress modes feed one queue; the pump hands updates to per-user lanes
    let (updates_tx, mut updates_rx) = mpsc::channel(UPDATE_QUEUE);
    let pump = tokio::spawn(async move {
        while let Some(update) = updates_rx.recv().await {
            lanes.submit(update).await;
        }
        let lanes_left = lanes.active_lanes().await;
        tracing::info!(lanes = lanes_left, "Update pump stopped");
    });

    tokio::spawn({
        let cancel = cancel.clone();
        async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!(error = %e, "Failed to listen for shutdown signal");
                return;
            }
            tracing::info!("Shutdown requested");
            cancel.cancel();
        }
    });

    match config.ingress {
        Ingress::Polling => {
            run_polling(&messenger, updates_tx, cancel.clone()).await;
        }
        Ingress::Webhook { port, secret } => {
            let app = create_router(AppState::new(updates_tx, registry.clone(), secret));
            let addr = SocketAddr::from(([0, 0, 0, 0], port));
            tracing::info!(%addr, "Webhook server listening");

            let listener = tokio::net::TcpListener::bind(addr).await?;
            axum::serve(listener, app)
                .with_graceful_shutdown(cancel.clone().cancelled_owned())
                .await?;
        }
    }

    cancel.cancel();
    if let Err(e) = pump.await {
        tracing::warn!(error = %e, "Update pump ended abnormally");
    }
    if let Some(reaper) = reaper {
        if let Err(e) = reaper.await {
            tracing::warn!(error = %e, "Reaper ended abnormally");
        }
    }

    tracing::info!(
        active_sessions = registry.active_count().await,
        "Catalog bot stopped"
    );
    Ok(())
}
