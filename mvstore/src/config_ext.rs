//! Extension pour intégrer la configuration du cache local dans mvconfig

use crate::AssetStore;
use anyhow::Result;
use mvconfig::Config;
use std::path::PathBuf;

const DEFAULT_STORE_FILE: &str = "assets.db";

/// Trait d'extension pour la configuration du cache local
///
/// # Exemple
///
/// ```rust,ignore
/// use mvconfig::Config;
/// use mvstore::StoreConfigExt;
///
/// let config = Config::load_config("")?;
/// let store = config.open_asset_store()?;
/// ```
pub trait StoreConfigExt {
    /// Chemin absolu du fichier SQLite (relatif au répertoire de configuration par défaut)
    fn get_store_path(&self) -> Result<PathBuf>;

    /// Volume maximal des binaires en octets, `None` si illimité
    fn get_store_quota_bytes(&self) -> Option<u64>;

    fn set_store_quota_mb(&self, quota_mb: usize) -> Result<()>;

    /// Ouvre le cache décrit par la configuration
    fn open_asset_store(&self) -> Result<AssetStore>;
}

impl StoreConfigExt for Config {
    fn get_store_path(&self) -> Result<PathBuf> {
        self.get_managed_file(&["store", "path"], DEFAULT_STORE_FILE)
    }

    fn get_store_quota_bytes(&self) -> Option<u64> {
        match self.get_usize(&["store", "quota_mb"], 0) {
            0 => None,
            mb => Some(mb as u64 * 1024 * 1024),
        }
    }

    fn set_store_quota_mb(&self, quota_mb: usize) -> Result<()> {
        self.set_usize(&["store", "quota_mb"], quota_mb)
    }

    fn open_asset_store(&self) -> Result<AssetStore> {
        let path = self.get_store_path()?;
        Ok(AssetStore::open(&path)?.with_quota(self.get_store_quota_bytes()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_store_path_is_relative_to_config_dir() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        let path = config.get_store_path().unwrap();
        assert!(path.starts_with(dir.path()));
        assert!(path.ends_with("assets.db"));
    }

    #[test]
    fn test_quota() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        assert_eq!(config.get_store_quota_bytes(), None);
        config.set_store_quota_mb(2).unwrap();
        assert_eq!(config.get_store_quota_bytes(), Some(2 * 1024 * 1024));
    }

    #[test]
    fn test_open_asset_store() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        let store = config.open_asset_store().unwrap();
        assert!(store.path().unwrap().exists());
    }
}
