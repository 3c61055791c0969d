//! Extension pour construire le moteur depuis mvconfig

use crate::{SyncContext, SyncSettings, DEFAULT_SYNC_INTERVAL};
use anyhow::Result;
use mvcatalog::CatalogConfigExt;
use mvconfig::Config;
use mvhandles::HandlesConfigExt;
use mvstore::StoreConfigExt;
use std::sync::Arc;
use std::time::Duration;

pub trait SyncConfigExt {
    /// Période de la synchronisation silencieuse (au moins une seconde)
    fn get_sync_interval(&self) -> Duration;

    fn set_sync_interval_secs(&self, secs: usize) -> Result<()>;

    /// Télécharger les binaires pendant la synchronisation
    fn get_download_payloads(&self) -> bool;

    fn get_sync_settings(&self) -> SyncSettings;
}

impl SyncConfigExt for Config {
    fn get_sync_interval(&self) -> Duration {
        let default = DEFAULT_SYNC_INTERVAL.as_secs() as usize;
        let secs = self.get_usize(&["sync", "interval_secs"], default);
        Duration::from_secs(secs.max(1) as u64)
    }

    fn set_sync_interval_secs(&self, secs: usize) -> Result<()> {
        self.set_usize(&["sync", "interval_secs"], secs)
    }

    fn get_download_payloads(&self) -> bool {
        self.get_bool(&["sync", "download_payloads"], false)
    }

    fn get_sync_settings(&self) -> SyncSettings {
        SyncSettings {
            interval: self.get_sync_interval(),
            download_payloads: self.get_download_payloads(),
        }
    }
}

impl SyncContext {
    /// Construit le contexte complet (catalogue, cache local, handles) depuis la configuration
    ///
    /// # Errors
    ///
    /// Adresse de catalogue invalide, ou cache local impossible à ouvrir
    pub fn from_config(config: &Config) -> Result<Self> {
        let catalog = config.create_catalog_client()?;
        let store = config.open_asset_store()?;
        let handles = config.create_handle_cache();

        Ok(SyncContext::new(Arc::new(catalog), store, Arc::new(handles))
            .with_settings(config.get_sync_settings()))
    }
}
