//! # TillSync Sync Agent
//!
//! Headless host for the offline sale queue.
//!
//! ## Lifecycle
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  load config ──► open database ──► build engine ──► scheduler.init    │
//! │                                                          │              │
//! │                            count events ──► log          │              │
//! │                                                          ▼              │
//! │  Ctrl+C / SIGTERM ──► scheduler.dispose ──► database.close             │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//! ```text
//! sync-agent [path/to/sync.toml]
//! ```

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{info, warn, Level};
use tracing_subscriber::EnvFilter;

use tillsync_db::{Database, DbConfig};
use tillsync_sync::{
    BroadcastEmitter, HttpSalesApi, OfflineSalesSync, Session, SessionScopeProvider,
    SessionSlot, SyncConfig, SyncScheduler, TerminalContext,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config_path = std::env::args().nth(1).map(PathBuf::from);
    let config = SyncConfig::load_or_default(config_path);
    info!(
        api = %config.api.base_url,
        interval_secs = config.sync.interval_secs,
        "Starting TillSync sync agent"
    );

    // Open the local store
    let db_path = config.database_path();
    if let Some(parent) = db_path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create data directory {}", parent.display()))?;
    }
    let db = Database::new(DbConfig::new(&db_path))
        .await
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    if !db.health_check().await {
        anyhow::bail!("Database at {} is not answering queries", db_path.display());
    }
    info!(path = %db_path.display(), "Database ready");

    // Scope comes from the configured device identity
    let session = Arc::new(SessionSlot::new(session_from(&config)));
    let terminal = Arc::new(TerminalContext {
        tenant_id: config.device.tenant_id.clone(),
        branch_id: config.device.branch_id.clone(),
        terminal_id: config.device.terminal_id.clone(),
    });
    let scope_provider = SessionScopeProvider::new(session.clone()).with_device(terminal);

    let emitter = Arc::new(BroadcastEmitter::new());
    spawn_count_logger(&emitter);

    let api = HttpSalesApi::from_config(&config, session.clone())?;
    let engine = OfflineSalesSync::builder(db.clone())
        .with_api(Arc::new(api))
        .with_scope_provider(Arc::new(scope_provider))
        .with_emitter(emitter)
        .with_legacy_queue(config.legacy_queue_path())
        .build()?;

    if engine.resolve_scope().is_none() {
        warn!("No tenant/actor configured; sync stays idle until a session is available");
    }

    let scheduler = SyncScheduler::new(engine.clone(), config.sync_interval());
    scheduler.initialize().await;

    shutdown_signal().await;

    scheduler.dispose();
    db.close().await;
    info!("Sync agent stopped");
    Ok(())
}

/// Initializes the tracing subscriber.
///
/// ## Log Levels
/// - `RUST_LOG=debug` - Show debug messages
/// - `RUST_LOG=tillsync_sync=trace` - Trace the sync engine only
/// - Default: INFO, DEBUG for tillsync crates
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,tillsync=debug,sqlx=warn"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_max_level(Level::TRACE)
        .init();
}

fn session_from(config: &SyncConfig) -> Option<Session> {
    let actor = config.device.actor_id.clone()?;
    let token = config.api.token.clone().unwrap_or_default();

    let mut session = Session::new(actor, token);
    if let Some(tenant) = &config.device.tenant_id {
        session = session.with_tenant(tenant.clone());
    }
    if let Some(branch) = &config.device.branch_id {
        session = session.with_branch(branch.clone());
    }
    Some(session)
}

fn spawn_count_logger(emitter: &BroadcastEmitter) {
    let mut events = emitter.subscribe();
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => info!(
                    pending = event.pending,
                    conflicts = event.conflicts,
                    scope_id = event.scope_id.as_deref().unwrap_or("-"),
                    "Offline sales"
                ),
                Err(tokio::sync::broadcast::error::RecvError::Lagged(_)) => continue,
                Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
            }
        }
    });
}

/// Waits for Ctrl+C or SIGTERM.
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!(error = %e, "Failed to listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                warn!(error = %e, "Failed to install SIGTERM handler");
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

    info!("Shutdown signal received, stopping sync agent...");
}
