//! Extension pour intégrer la configuration du catalogue dans mvconfig
//!
//! Ce module fournit le trait `CatalogConfigExt` qui ajoute à
//! `mvconfig::Config` la lecture de l'adresse du catalogue et des délais réseau.

use crate::{CatalogClient, ClientOptions};
use anyhow::Result;
use mvconfig::Config;
use serde_yaml::Value;
use std::time::Duration;

const DEFAULT_TIMEOUT_SECS: usize = 30;
const DEFAULT_PROBE_TIMEOUT_MS: usize = 2000;
const DEFAULT_RETRIES: usize = 1;

/// Trait d'extension pour la configuration du catalogue distant
///
/// # Exemple
///
/// ```rust,ignore
/// use mvconfig::Config;
/// use mvcatalog::CatalogConfigExt;
///
/// let config = Config::load_config("")?;
/// let client = config.create_catalog_client()?;
/// ```
pub trait CatalogConfigExt {
    /// Adresse de base du catalogue
    ///
    /// `None` si la clé est absente ou vide (mode déconnecté).
    fn get_catalog_base_url(&self) -> Option<String>;

    /// Définit l'adresse de base ; une chaîne vide repasse en mode déconnecté
    fn set_catalog_base_url(&self, url: &str) -> Result<()>;

    /// Délais et nombre de tentatives du client HTTP
    fn get_client_options(&self) -> ClientOptions;

    /// Construit un client à partir de la configuration
    ///
    /// # Errors
    ///
    /// Retourne une erreur si l'adresse configurée n'est pas une URL valide
    fn create_catalog_client(&self) -> Result<CatalogClient>;
}

impl CatalogConfigExt for Config {
    fn get_catalog_base_url(&self) -> Option<String> {
        let url = self.get_string(&["catalog", "base_url"], "");
        let url = url.trim();
        (!url.is_empty()).then(|| url.to_string())
    }

    fn set_catalog_base_url(&self, url: &str) -> Result<()> {
        self.set_value(&["catalog", "base_url"], Value::String(url.trim().to_string()))
    }

    fn get_client_options(&self) -> ClientOptions {
        let timeout = self.get_usize(&["catalog", "timeout_secs"], DEFAULT_TIMEOUT_SECS);
        let probe = self.get_usize(&["catalog", "probe_timeout_ms"], DEFAULT_PROBE_TIMEOUT_MS);
        let retries = self.get_usize(&["catalog", "retries"], DEFAULT_RETRIES);

        ClientOptions {
            timeout: Duration::from_secs(timeout.max(1) as u64),
            probe_timeout: Duration::from_millis(probe.max(100) as u64),
            retries: retries as u32,
            ..ClientOptions::default()
        }
    }

    fn create_catalog_client(&self) -> Result<CatalogClient> {
        let base_url = self.get_catalog_base_url();
        Ok(CatalogClient::new(base_url.as_deref(), self.get_client_options())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::RemoteCatalog;
    use tempfile::TempDir;

    #[test]
    fn test_defaults_are_disconnected() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        assert!(config.get_catalog_base_url().is_none());
        let options = config.get_client_options();
        assert_eq!(options.timeout, Duration::from_secs(30));
        assert_eq!(options.probe_timeout, Duration::from_millis(2000));
        assert_eq!(options.retries, 1);

        let client = config.create_catalog_client().unwrap();
        assert!(!client.is_configured());
    }

    #[test]
    fn test_base_url_round_trip() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_config(dir.path().to_str().unwrap()).unwrap();

        config.set_catalog_base_url(" http://catalog:3001 ").unwrap();
        assert_eq!(config.get_catalog_base_url().as_deref(), Some("http://catalog:3001"));

        let client = config.create_catalog_client().unwrap();
        assert_eq!(client.base_url(), Some("http://catalog:3001"));
    }
}
