//! Couche d'accès HTTP bas-niveau au catalogue distant
//!
//! Construit les requêtes, rejoue les appels idempotents et transforme les
//! réponses en [`CatalogResult`]. Aucune erreur réseau ne remonte sous forme
//! de panique : tout est converti en [`CatalogError`].

use crate::error::{CatalogError, CatalogResult};
use mvasset::{Asset, AssetPatch, PayloadSet};
use reqwest::multipart::{Form, Part};
use reqwest::{Body, Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use std::time::Duration;
use tracing::{debug, warn};
use url::Url;

/// Préfixe des routes du catalogue
const API_PREFIX: [&str; 2] = ["api", "assets"];

/// Paramètres du client HTTP
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Délai maximal d'une requête ordinaire
    pub timeout: Duration,
    /// Délai maximal de la sonde de disponibilité
    pub probe_timeout: Duration,
    /// Nombre de nouvelles tentatives pour les appels idempotents
    pub retries: u32,
    /// Attente entre deux tentatives
    pub retry_backoff: Duration,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            probe_timeout: Duration::from_secs(2),
            retries: 1,
            retry_backoff: Duration::from_millis(250),
        }
    }
}

/// Client API bas-niveau lié à une adresse de base
pub(crate) struct CatalogApi {
    client: Client,
    base: Url,
    base_str: String,
    options: ClientOptions,
}

impl CatalogApi {
    pub(crate) fn new(base_url: &str, options: ClientOptions) -> CatalogResult<Self> {
        let base_str = base_url.trim().trim_end_matches('/').to_string();
        let base = Url::parse(&base_str)
            .map_err(|e| CatalogError::InvalidBaseUrl(format!("{base_url}: {e}")))?;
        if base.cannot_be_a_base() {
            return Err(CatalogError::InvalidBaseUrl(base_url.to_string()));
        }

        let client = Client::builder()
            .timeout(options.timeout)
            .user_agent(concat!("modelvault/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| CatalogError::InvalidBaseUrl(e.to_string()))?;

        Ok(Self {
            client,
            base,
            base_str,
            options,
        })
    }

    pub(crate) fn base_url(&self) -> &str {
        &self.base_str
    }

    pub(crate) fn http(&self) -> &Client {
        &self.client
    }

    pub(crate) fn options(&self) -> &ClientOptions {
        &self.options
    }

    /// Construit l'URL `{base}/api/assets[/segments...]` avec encodage des segments
    pub(crate) fn endpoint(&self, segments: &[&str]) -> String {
        let mut url = self.base.clone();
        if let Ok(mut path) = url.path_segments_mut() {
            path.pop_if_empty().extend(API_PREFIX).extend(segments);
        }
        url.to_string()
    }

    /// Réécrit un chemin de ressource relatif en URL absolue
    pub(crate) fn absolutize(&self, path: &str) -> String {
        absolutize(&self.base_str, path)
    }

    /// Réécrit toutes les URLs de ressources d'un enregistrement reçu
    pub(crate) fn normalize(&self, mut asset: Asset) -> Asset {
        asset.resources.map_urls(|url| self.absolutize(url));
        asset
    }

    /// Envoie une requête, en la rejouant si `idempotent` et que l'échec est transitoire
    pub(crate) async fn send<F>(&self, label: &str, idempotent: bool, build: F) -> CatalogResult<Response>
    where
        F: Fn() -> CatalogResult<RequestBuilder>,
    {
        let attempts = if idempotent { self.options.retries + 1 } else { 1 };
        let mut last_error = CatalogError::Unreachable("no attempt made".to_string());

        for attempt in 1..=attempts {
            debug!("{} (attempt {}/{})", label, attempt, attempts);

            let outcome = match build()?.send().await {
                Ok(response) => check_status(response).await,
                Err(e) => Err(CatalogError::from_transport(e)),
            };

            match outcome {
                Ok(response) => return Ok(response),
                Err(err) if err.is_retryable() && attempt < attempts => {
                    warn!("{} failed ({}), retrying", label, err);
                    tokio::time::sleep(self.options.retry_backoff).await;
                    last_error = err;
                }
                Err(err) => return Err(err),
            }
        }

        Err(last_error)
    }

    /// Décode le corps JSON d'une réponse réussie
    pub(crate) async fn decode<T: DeserializeOwned>(response: Response) -> CatalogResult<T> {
        let text = response.text().await.map_err(CatalogError::from_transport)?;
        serde_json::from_str(&text).map_err(|e| {
            warn!("Failed to parse catalog response: {}", e);
            CatalogError::Malformed(e.to_string())
        })
    }

    /// Formulaire multipart : partie `data` (JSON) + une partie par emplacement fourni
    pub(crate) fn multipart<T: serde::Serialize>(
        data: Option<&T>,
        payloads: &PayloadSet,
    ) -> CatalogResult<Form> {
        let mut form = Form::new();

        if let Some(data) = data {
            let json = serde_json::to_string(data).map_err(|e| CatalogError::Malformed(e.to_string()))?;
            let part = Part::text(json)
                .mime_str("application/json")
                .map_err(CatalogError::from_transport)?;
            form = form.part("data", part);
        }

        for (slot, payload) in payloads.iter() {
            let mut part = Part::stream_with_length(Body::from(payload.data.clone()), payload.len() as u64)
                .file_name(payload.file_name.clone());
            if let Some(content_type) = &payload.content_type {
                part = part.mime_str(content_type).map_err(CatalogError::from_transport)?;
            }
            form = form.part(slot.as_str(), part);
        }

        Ok(form)
    }
}

/// Vérifie le statut HTTP, en convertissant les échecs en [`CatalogError::Rejected`]
async fn check_status(response: Response) -> CatalogResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let error_text = response.text().await.unwrap_or_default();
    warn!("Catalog error ({}): {}", status.as_u16(), error_text);
    Err(CatalogError::from_status_code(status.as_u16(), error_text))
}

/// Préfixe `path` par `base` s'il s'agit d'un chemin relatif
pub fn absolutize(base: &str, path: &str) -> String {
    let lower = path.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") || base.is_empty() {
        return path.to_string();
    }
    format!("{}/{}", base.trim_end_matches('/'), path.trim_start_matches('/'))
}

/// Corps JSON de création : l'enregistrement sans ses références de ressources
pub(crate) fn creation_data(asset: &Asset) -> Asset {
    let mut data = asset.clone();
    data.resources = Default::default();
    data
}

/// Corps JSON optionnel d'une mise à jour de fichiers
pub(crate) fn files_data(patch: Option<&AssetPatch>) -> Option<&AssetPatch> {
    patch.filter(|p| !p.is_empty())
}
