//! Contexte explicite du moteur de synchronisation
//!
//! Construit une seule fois au démarrage de l'application, puis remis au
//! moteur qui le partage avec ses composants. Aucun état global.

use mvcatalog::{CatalogClient, RemoteCatalog};
use mvhandles::HandleCache;
use mvstore::AssetStore;
use std::sync::Arc;
use std::time::Duration;

/// Intervalle par défaut de la synchronisation périodique
pub const DEFAULT_SYNC_INTERVAL: Duration = Duration::from_secs(30);

/// Réglages du moteur
#[derive(Debug, Clone)]
pub struct SyncSettings {
    /// Période de la synchronisation silencieuse
    pub interval: Duration,
    /// Télécharger les binaires pendant la synchronisation plutôt qu'à la demande
    pub download_payloads: bool,
}

impl Default for SyncSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_SYNC_INTERVAL,
            download_payloads: false,
        }
    }
}

/// Les trois composants subordonnés et les réglages du moteur
#[derive(Clone)]
pub struct SyncContext {
    pub catalog: Arc<dyn RemoteCatalog>,
    pub store: AssetStore,
    pub handles: Arc<HandleCache>,
    pub settings: SyncSettings,
}

impl SyncContext {
    pub fn new(catalog: Arc<dyn RemoteCatalog>, store: AssetStore, handles: Arc<HandleCache>) -> Self {
        Self {
            catalog,
            store,
            handles,
            settings: SyncSettings::default(),
        }
    }

    /// Contexte entièrement local : catalogue déconnecté, cache en mémoire
    pub fn offline() -> mvstore::Result<Self> {
        Ok(Self::new(
            Arc::new(CatalogClient::disconnected()),
            AssetStore::open_in_memory()?,
            Arc::new(HandleCache::default()),
        ))
    }

    pub fn with_settings(mut self, settings: SyncSettings) -> Self {
        self.settings = settings;
        self
    }
}

impl std::fmt::Debug for SyncContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SyncContext")
            .field("catalog", &self.catalog.base_url())
            .field("store", &self.store)
            .field("handles", &self.handles.capacity())
            .field("settings", &self.settings)
            .finish()
    }
}
