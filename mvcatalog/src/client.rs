//! Client haut-niveau du catalogue distant
//!
//! Sans adresse configurée, le client fonctionne en mode déconnecté : aucun
//! appel réseau n'est tenté et chaque opération renvoie une valeur neutre.

use crate::api::{creation_data, files_data, CatalogApi, ClientOptions};
use crate::error::{CatalogError, CatalogResult};
use crate::remote::RemoteCatalog;
use async_trait::async_trait;
use bytes::Bytes;
use mvasset::{Asset, AssetPatch, PayloadSet};
use reqwest::StatusCode;
use tracing::{debug, info, warn};

/// Client du catalogue distant
pub struct CatalogClient {
    /// API bas-niveau, absente en mode déconnecté
    api: Option<CatalogApi>,
}

impl CatalogClient {
    /// Crée un client pour `base_url`
    ///
    /// Une adresse absente ou vide produit un client déconnecté.
    ///
    /// # Exemple
    ///
    /// ```rust,no_run
    /// use mvcatalog::{CatalogClient, ClientOptions, RemoteCatalog};
    ///
    /// #[tokio::main]
    /// async fn main() -> anyhow::Result<()> {
    ///     let client = CatalogClient::new(Some("http://localhost:3001"), ClientOptions::default())?;
    ///     let assets = client.list().await?;
    ///     println!("{} assets in catalog", assets.len());
    ///     Ok(())
    /// }
    /// ```
    pub fn new(base_url: Option<&str>, options: ClientOptions) -> CatalogResult<Self> {
        let api = match base_url.map(str::trim).filter(|s| !s.is_empty()) {
            Some(url) => {
                info!("Creating catalog client for {}", url);
                Some(CatalogApi::new(url, options)?)
            }
            None => {
                info!("No catalog address configured, running disconnected");
                None
            }
        };
        Ok(Self { api })
    }

    /// Client en mode déconnecté
    pub fn disconnected() -> Self {
        Self { api: None }
    }

    fn api(&self) -> CatalogResult<&CatalogApi> {
        self.api.as_ref().ok_or(CatalogError::Disconnected)
    }

    fn log_failure(op: &str, id: Option<&str>, err: &CatalogError) {
        match err {
            CatalogError::Disconnected => debug!("{} skipped: disconnected", op),
            _ => warn!(asset = id.unwrap_or("-"), "Catalog {} failed: {}", op, err),
        }
    }

    async fn fetch_list(api: &CatalogApi) -> CatalogResult<Vec<Asset>> {
        let url = api.endpoint(&[]);
        let response = api.send("GET /api/assets", true, || Ok(api.http().get(&url))).await?;
        let assets: Vec<Asset> = CatalogApi::decode(response).await?;
        Ok(assets.into_iter().map(|a| api.normalize(a)).collect())
    }

    async fn fetch_one(api: &CatalogApi, id: &str) -> CatalogResult<Option<Asset>> {
        let url = api.endpoint(&[id]);
        match api.send("GET /api/assets/{id}", true, || Ok(api.http().get(&url))).await {
            Ok(response) => {
                let asset: Asset = CatalogApi::decode(response).await?;
                Ok(Some(api.normalize(asset)))
            }
            Err(CatalogError::Rejected { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => Ok(None),
            Err(err) => Err(err),
        }
    }

    async fn post_create(&self, asset: &Asset, payloads: &PayloadSet) -> CatalogResult<Asset> {
        let api = self.api()?;
        let url = api.endpoint(&[]);
        let data = creation_data(asset);

        // Jamais rejoué : un second envoi dupliquerait l'asset
        let response = api
            .send("POST /api/assets", false, || {
                Ok(api.http().post(&url).multipart(CatalogApi::multipart(Some(&data), payloads)?))
            })
            .await?;
        let created: Asset = CatalogApi::decode(response).await?;
        Ok(api.normalize(created))
    }

    async fn put_metadata(&self, id: &str, patch: &AssetPatch) -> CatalogResult<Asset> {
        let api = self.api()?;
        let url = api.endpoint(&[id]);
        let response = api
            .send("PUT /api/assets/{id}", true, || Ok(api.http().put(&url).json(patch)))
            .await?;
        let updated: Asset = CatalogApi::decode(response).await?;
        Ok(api.normalize(updated))
    }

    async fn put_files(
        &self,
        id: &str,
        patch: Option<&AssetPatch>,
        payloads: &PayloadSet,
    ) -> CatalogResult<Asset> {
        let api = self.api()?;
        let url = api.endpoint(&[id, "files"]);
        let data = files_data(patch);
        let response = api
            .send("PUT /api/assets/{id}/files", true, || {
                Ok(api.http().put(&url).multipart(CatalogApi::multipart(data, payloads)?))
            })
            .await?;
        let updated: Asset = CatalogApi::decode(response).await?;
        Ok(api.normalize(updated))
    }

    async fn send_delete(&self, id: &str) -> CatalogResult<bool> {
        let api = self.api()?;
        let url = api.endpoint(&[id]);
        match api.send("DELETE /api/assets/{id}", true, || Ok(api.http().delete(&url))).await {
            Ok(_) => Ok(true),
            Err(CatalogError::Rejected { status, .. }) if status == StatusCode::NOT_FOUND.as_u16() => {
                debug!(asset = id, "Asset already absent from catalog");
                Ok(false)
            }
            Err(err) => Err(err),
        }
    }

    async fn download(&self, url: &str) -> CatalogResult<Bytes> {
        let api = self.api()?;
        let url = api.absolutize(url);
        let response = api.send("GET payload", true, || Ok(api.http().get(&url))).await?;
        response.bytes().await.map_err(CatalogError::from_transport)
    }
}

#[async_trait]
impl RemoteCatalog for CatalogClient {
    fn is_configured(&self) -> bool {
        self.api.is_some()
    }

    fn base_url(&self) -> Option<&str> {
        self.api.as_ref().map(CatalogApi::base_url)
    }

    async fn list(&self) -> CatalogResult<Vec<Asset>> {
        let Some(api) = self.api.as_ref() else {
            return Ok(Vec::new());
        };

        let result = Self::fetch_list(api).await;
        match &result {
            Ok(assets) => debug!("Catalog listed {} assets", assets.len()),
            Err(err) => Self::log_failure("list", None, err),
        }
        result
    }

    async fn get(&self, id: &str) -> CatalogResult<Option<Asset>> {
        let Some(api) = self.api.as_ref() else {
            return Ok(None);
        };

        let result = Self::fetch_one(api, id).await;
        if let Err(err) = &result {
            Self::log_failure("get", Some(id), err);
        }
        result
    }

    async fn create(&self, asset: &Asset, payloads: &PayloadSet) -> CatalogResult<Asset> {
        let result = self.post_create(asset, payloads).await;
        match &result {
            Ok(created) => info!(asset = %created.id, "Asset created in catalog"),
            Err(err) => Self::log_failure("create", Some(&asset.id), err),
        }
        result
    }

    async fn update_metadata(&self, id: &str, patch: &AssetPatch) -> CatalogResult<Asset> {
        let result = self.put_metadata(id, patch).await;
        if let Err(err) = &result {
            Self::log_failure("update_metadata", Some(id), err);
        }
        result
    }

    async fn update_files(
        &self,
        id: &str,
        patch: Option<&AssetPatch>,
        payloads: &PayloadSet,
    ) -> CatalogResult<Asset> {
        let result = self.put_files(id, patch, payloads).await;
        if let Err(err) = &result {
            Self::log_failure("update_files", Some(id), err);
        }
        result
    }

    async fn delete(&self, id: &str) -> CatalogResult<bool> {
        let result = self.send_delete(id).await;
        if let Err(err) = &result {
            Self::log_failure("delete", Some(id), err);
        }
        result
    }

    async fn is_reachable(&self) -> bool {
        let Some(api) = self.api.as_ref() else {
            return false;
        };

        let url = api.endpoint(&[]);
        match api
            .http()
            .head(&url)
            .timeout(api.options().probe_timeout)
            .send()
            .await
        {
            Ok(response) => response.status().is_success(),
            Err(e) => {
                debug!("Catalog probe failed: {}", e);
                false
            }
        }
    }

    async fn fetch_payload(&self, url: &str) -> CatalogResult<Bytes> {
        let result = self.download(url).await;
        if let Err(err) = &result {
            Self::log_failure("fetch_payload", None, err);
        }
        result
    }
}
