use mvconfig::Config;
use mvsync::{AssetSync, SyncContext, SyncEvent};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ========== PHASE 1 : Configuration ==========

    // Répertoire de configuration : premier argument, sinon MODELVAULT_CONFIG ou .modelvault
    let directory = std::env::args().nth(1).unwrap_or_default();
    let config = Config::load_config(&directory)?;

    // RUST_LOG l'emporte sur le niveau configuré
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.get_log_level().unwrap_or_else(|_| "info".into())));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("📂 Using config directory {}", config.directory());
    for slot in ["model", "thumbnail", "package", "archive"] {
        info!("  - {} files up to {} MB", slot, config.get_slot_limit_mb(slot));
    }

    // ========== PHASE 2 : Moteur de synchronisation ==========

    let ctx = SyncContext::from_config(&config)?;
    match ctx.catalog.base_url() {
        Some(url) if ctx.catalog.is_reachable().await => info!("🌐 Catalog reachable at {}", url),
        Some(url) => warn!("⚠️ Catalog at {} is not reachable, working from local cache", url),
        None => info!("📴 No catalog configured, running disconnected"),
    }

    let engine = AssetSync::start(ctx).await?;
    info!("✅ {} asset(s) available", engine.len());

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            match event {
                SyncEvent::Synced { count } => info!("🔄 Synchronized, {} asset(s)", count),
                SyncEvent::SyncFailed { reason } => warn!("⚠️ Sync failed: {}", reason),
                SyncEvent::RemotePushFailed { id, op, reason } => {
                    warn!("⚠️ Could not push {} of {}: {}", op, id, reason)
                }
                SyncEvent::AssetChanged { .. } | SyncEvent::AssetRemoved { .. } => {}
            }
        }
    });

    // SIGUSR1 : l'hôte signale le retour du focus
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};

        let mut focus = signal(SignalKind::user_defined1())?;
        let focused = engine.clone();
        tokio::spawn(async move {
            while focus.recv().await.is_some() {
                focused.notify_focus();
            }
        });
    }

    // ========== PHASE 3 : Attente de l'arrêt ==========

    info!("Press Ctrl+C to stop...");
    tokio::signal::ctrl_c().await?;

    info!("🛑 Shutting down...");
    engine.shutdown().await;

    Ok(())
}
