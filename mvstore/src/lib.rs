//! # mvstore - Cache local durable des assets
//!
//! Cette crate fournit le cache hors ligne du moteur de synchronisation : une
//! base SQLite embarquée contenant les métadonnées des assets et leurs binaires
//! (modèle, vignette, paquet, archive).
//!
//! ## Garanties
//!
//! - Chaque écriture d'asset est transactionnelle sur les deux tables : un
//!   lecteur ne voit jamais des métadonnées sans leurs binaires, ni l'inverse
//! - Une mise à jour partielle des binaires conserve les emplacements non fournis
//! - Les enregistrements d'anciennes versions sont migrés à l'ouverture
//!
//! Le cache ne filtre ni ne trie : ce travail revient à l'appelant
//! (voir [`mvasset::filter_assets`]).
//!
//! ## Utilisation
//!
//! ```rust,no_run
//! use bytes::Bytes;
//! use mvasset::{Asset, Payload, PayloadSet};
//! use mvstore::AssetStore;
//! use std::path::Path;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = AssetStore::open(Path::new("assets.db"))?;
//!
//!     let payloads = PayloadSet::with_model(Payload::new("chair.glb", Bytes::from_static(b"glTF")));
//!     store.put_asset(&Asset::new("a1", "Chair"), &payloads).await?;
//!
//!     for asset in store.list_metadata().await? {
//!         println!("{}", asset.name);
//!     }
//!     Ok(())
//! }
//! ```

pub mod error;
pub mod record;
mod schema;
mod store;

#[cfg(feature = "mvconfig")]
pub mod config_ext;

pub use error::{Result, StoreError};
pub use record::{SyncState, RECORD_VERSION};
pub use store::{AssetStore, MetadataUpdate, PendingAsset, StoreStats};

#[cfg(feature = "mvconfig")]
pub use config_ext::StoreConfigExt;
