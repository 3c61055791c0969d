//! Types d'erreurs pour mvstore

use rusqlite::ErrorCode;

/// Erreurs du cache local
///
/// Contrairement au catalogue distant, ces erreurs sont dures : elles
/// signalent un état local irrécupérable que l'appelant doit traiter.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(rusqlite::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Blocking task failed: {0}")]
    Join(String),

    #[error("Storage quota exceeded: {0}")]
    QuotaExceeded(String),

    #[error("Invalid record for asset {id}: {reason}")]
    InvalidRecord { id: String, reason: String },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<rusqlite::Error> for StoreError {
    fn from(err: rusqlite::Error) -> Self {
        match &err {
            rusqlite::Error::SqliteFailure(e, _) if e.code == ErrorCode::DiskFull => {
                StoreError::QuotaExceeded(err.to_string())
            }
            _ => StoreError::Database(err),
        }
    }
}

impl From<tokio::task::JoinError> for StoreError {
    fn from(err: tokio::task::JoinError) -> Self {
        StoreError::Join(err.to_string())
    }
}

/// Type Result spécialisé pour mvstore
pub type Result<T> = std::result::Result<T, StoreError>;
