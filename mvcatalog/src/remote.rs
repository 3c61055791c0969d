//! Abstraction du catalogue distant utilisée par le moteur de synchronisation

use crate::error::CatalogResult;
use async_trait::async_trait;
use bytes::Bytes;
use mvasset::{Asset, AssetPatch, PayloadSet};

/// Opérations CRUD sur le catalogue distant
///
/// Toutes les URLs de ressources renvoyées sont absolues. Les appels sont
/// rejouables sans risque, sauf [`RemoteCatalog::create`] qui n'est jamais
/// rejoué automatiquement.
#[async_trait]
pub trait RemoteCatalog: Send + Sync {
    /// Faux en mode déconnecté (aucune adresse configurée)
    fn is_configured(&self) -> bool;

    /// Adresse de base, si configurée
    fn base_url(&self) -> Option<&str>;

    async fn list(&self) -> CatalogResult<Vec<Asset>>;

    /// `Ok(None)` si l'asset n'existe pas côté distant
    async fn get(&self, id: &str) -> CatalogResult<Option<Asset>>;

    async fn create(&self, asset: &Asset, payloads: &PayloadSet) -> CatalogResult<Asset>;

    async fn update_metadata(&self, id: &str, patch: &AssetPatch) -> CatalogResult<Asset>;

    async fn update_files(
        &self,
        id: &str,
        patch: Option<&AssetPatch>,
        payloads: &PayloadSet,
    ) -> CatalogResult<Asset>;

    /// `Ok(false)` si l'asset était déjà absent du catalogue
    async fn delete(&self, id: &str) -> CatalogResult<bool>;

    /// Sonde légère à délai court ; ne renvoie jamais d'erreur
    async fn is_reachable(&self) -> bool;

    /// Télécharge le contenu d'une ressource par son URL absolue
    async fn fetch_payload(&self, url: &str) -> CatalogResult<Bytes>;
}
