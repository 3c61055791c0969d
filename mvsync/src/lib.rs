//! # mvsync - Moteur de synchronisation de ModelVault
//!
//! Orchestre le catalogue distant ([`mvcatalog`]), le cache local
//! ([`mvstore`]) et les handles de binaires ([`mvhandles`]) derrière une
//! seule façade, [`AssetSync`].
//!
//! ## Principes
//!
//! - Toute modification est écrite localement d'abord, puis poussée au
//!   catalogue au mieux. Un échec distant est rapporté, jamais fatal.
//! - Les modifications non poussées sont marquées en attente dans le cache
//!   local et rejouées à la synchronisation suivante.
//! - Une synchronisation silencieuse tourne toutes les 30 secondes et au
//!   retour du focus ; elle ne lève jamais l'indicateur d'activité.
//! - Sans adresse de catalogue, le moteur fonctionne entièrement en local.
//!
//! ## Cycle de vie
//!
//! ```text
//! SyncContext ──► AssetSync::start ──► load (cache local puis catalogue)
//!                        │
//!                        ├── tâche "periodic-sync" (intervalle)
//!                        ├── tâche "focus-sync"    (notify_focus)
//!                        │
//!                        └── shutdown ──► arrêt des tâches, révocation des handles
//! ```
//!
//! ## Exemple
//!
//! ```rust,no_run
//! use mvasset::{Asset, Payload, PayloadSet};
//! use mvsync::{AssetSync, SyncContext};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = AssetSync::start(SyncContext::offline()?).await?;
//!
//!     let files = PayloadSet::with_model(Payload::new("chair.glb", vec![0u8; 64]));
//!     let report = engine.create_asset(Asset::new("", "Chair"), files).await?;
//!     if let Some(notice) = report.remote.notice() {
//!         println!("{notice}");
//!     }
//!
//!     engine.shutdown().await;
//!     Ok(())
//! }
//! ```

mod busy;
pub mod context;
mod engine;
pub mod error;
pub mod events;
mod inflight;
mod mutations;
mod push;
pub mod report;
pub mod scheduler;

#[cfg(feature = "mvconfig")]
pub mod config_ext;

pub use context::{SyncContext, SyncSettings, DEFAULT_SYNC_INTERVAL};
pub use engine::AssetSync;
pub use error::{Result, SyncError};
pub use events::{RemoteOp, SyncEvent};
pub use report::{BulkDeleteReport, FullAsset, MutationReport, RemoteStatus, SyncSummary};
pub use scheduler::Scheduler;

#[cfg(feature = "mvconfig")]
pub use config_ext::SyncConfigExt;
