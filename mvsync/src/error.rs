//! Types d'erreurs pour mvsync

use mvcatalog::CatalogError;
use mvstore::StoreError;

/// Erreurs remontées par le moteur de synchronisation
///
/// Un échec de poussée vers le catalogue n'est pas une erreur : il est
/// rapporté dans le [`crate::MutationReport`] de l'opération. Seuls les échecs
/// locaux, les entrées invalides et les rafraîchissements demandés par
/// l'utilisateur produisent une `SyncError`.
#[derive(Debug, thiserror::Error)]
pub enum SyncError {
    #[error("Local store error: {0}")]
    Store(#[from] StoreError),

    #[error("Asset not found: {0}")]
    NotFound(String),

    #[error("Asset already exists: {0}")]
    AlreadyExists(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Remote catalog error: {0}")]
    Catalog(#[from] CatalogError),
}

/// Type Result spécialisé pour mvsync
pub type Result<T> = std::result::Result<T, SyncError>;
