//! # mvhandles - Handles de ressources pour les binaires d'assets
//!
//! Les consommateurs (visionneuse 3D, vignettes, liens de téléchargement)
//! adressent un binaire comme une ressource réseau au moyen d'un handle
//! `blob:modelvault/<uuid>`. Ce module en gère le cycle de vie :
//!
//! ```text
//! absent ──get_or_create──▶ vivant ──révocation / éviction──▶ révoqué
//!                            │  ▲
//!                            └──┘ get_or_create (réutilisation)
//! ```
//!
//! - [`HandleCache`] : cache borné (50 entrées par défaut), éviction par ordre
//!   de création, seul habilité à révoquer
//! - [`HandleRegistry`] : résolution d'un handle vers les octets qu'il désigne
//!
//! Un handle révoqué pendant son utilisation n'est pas protégé : le
//! consommateur doit en redemander un avec `force_regenerate`.

mod cache;
mod handle;

#[cfg(feature = "mvconfig")]
pub mod config_ext;

pub use cache::{HandleCache, HandleStats, DEFAULT_CAPACITY};
pub use handle::{Handle, HandleRegistry, HANDLE_PREFIX};

#[cfg(feature = "mvconfig")]
pub use config_ext::HandlesConfigExt;
