//! # mvcatalog - Client du catalogue distant d'assets 3D
//!
//! Cette crate fournit la couche d'accès au catalogue distant, la source de
//! vérité des assets. Elle est volontairement sans état : chaque appel renvoie
//! un [`CatalogResult`] que l'appelant inspecte, jamais une panique.
//!
//! ## Architecture
//!
//! - [`RemoteCatalog`] : trait asynchrone utilisé par le moteur de synchronisation
//! - [`CatalogClient`] : implémentation HTTP (JSON + multipart) via `reqwest`
//! - `api` : construction des requêtes, nouvelles tentatives, décodage
//! - [`CatalogError`] : taxonomie des échecs (injoignable, rejeté, illisible)
//!
//! ## Mode déconnecté
//!
//! Sans adresse de base, le client n'émet aucune requête : `list` renvoie une
//! liste vide, `get` renvoie `None`, les mutations renvoient
//! [`CatalogError::Disconnected`] et la sonde répond `false`.
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use mvcatalog::{CatalogClient, ClientOptions, RemoteCatalog};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = CatalogClient::new(Some("http://localhost:3001"), ClientOptions::default())?;
//!
//!     if client.is_reachable().await {
//!         for asset in client.list().await? {
//!             println!("{} -> {:?}", asset.name, asset.resources.model_url);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

mod api;
mod client;
pub mod error;
mod remote;

#[cfg(feature = "mvconfig")]
pub mod config_ext;

pub use api::{absolutize, ClientOptions};
pub use client::CatalogClient;
pub use error::{CatalogError, CatalogResult};
pub use remote::RemoteCatalog;

#[cfg(feature = "mvconfig")]
pub use config_ext::CatalogConfigExt;
