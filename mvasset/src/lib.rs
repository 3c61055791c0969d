//! # mvasset - Modèle de données partagé de ModelVault
//!
//! Cette crate définit les types manipulés par toutes les couches du moteur
//! de synchronisation :
//!
//! - [`Asset`] : un modèle 3D géré (métadonnées + références de ressources)
//! - [`Slot`] : les quatre emplacements binaires d'un asset
//! - [`Payload`] / [`PayloadSet`] : les octets associés à ces emplacements
//! - [`AssetPatch`] : une mise à jour partielle des métadonnées
//!
//! ## Structure des modules
//!
//! ```text
//! mvasset/
//! ├── models.rs   # Asset, AssetMetadata, ResourceRefs, AssetPatch
//! ├── payload.rs  # Slot, Payload, PayloadSet
//! └── filter.rs   # Filtrage / tri côté appelant
//! ```

pub mod filter;
pub mod models;
pub mod payload;

pub use filter::{filter_assets, AssetQuery};
pub use models::{human_size, new_asset_id, Asset, AssetMetadata, AssetPatch, ResourceRefs};
pub use payload::{Payload, PayloadSet, Slot, UnknownSlot};
