//! Gestion des erreurs pour le client du catalogue distant

use thiserror::Error;

/// Type Result personnalisé pour mvcatalog
pub type CatalogResult<T> = std::result::Result<T, CatalogError>;

/// Issue d'un appel au catalogue distant
///
/// Aucun de ces cas n'est fatal pour l'appelant : le moteur de synchronisation
/// décide, selon l'opération, s'il faut les signaler ou simplement les journaliser.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CatalogError {
    /// Aucune adresse distante configurée (mode déconnecté)
    #[error("Remote catalog is not configured (disconnected mode)")]
    Disconnected,

    /// Erreur réseau ou délai dépassé
    #[error("Remote catalog unreachable: {0}")]
    Unreachable(String),

    /// Le catalogue a répondu avec un statut d'échec
    #[error("Remote catalog rejected the request (status {status}): {message}")]
    Rejected { status: u16, message: String },

    /// Corps de réponse illisible (ni enregistrement ni collection valide)
    #[error("Malformed response from remote catalog: {0}")]
    Malformed(String),

    /// Adresse de base invalide à la construction du client
    #[error("Invalid catalog base URL: {0}")]
    InvalidBaseUrl(String),
}

impl CatalogError {
    /// Crée une erreur depuis un code de statut HTTP et le corps de la réponse
    pub fn from_status_code(status: u16, message: impl Into<String>) -> Self {
        let mut message = message.into();
        if message.len() > 512 {
            let mut cut = 512;
            while !message.is_char_boundary(cut) {
                cut -= 1;
            }
            message.truncate(cut);
        }
        Self::Rejected { status, message }
    }

    /// Classe une erreur de transport reqwest
    pub fn from_transport(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Malformed(err.to_string())
        } else if let Some(status) = err.status() {
            Self::from_status_code(status.as_u16(), err.to_string())
        } else {
            Self::Unreachable(err.to_string())
        }
    }

    /// Vrai pour les échecs traités comme « injoignable » (déconnecté, réseau, réponse illisible)
    pub fn is_unreachable(&self) -> bool {
        matches!(
            self,
            CatalogError::Disconnected | CatalogError::Unreachable(_) | CatalogError::Malformed(_)
        )
    }

    pub fn is_rejected(&self) -> bool {
        matches!(self, CatalogError::Rejected { .. })
    }

    pub fn is_disconnected(&self) -> bool {
        matches!(self, CatalogError::Disconnected)
    }

    /// Vrai si l'appel peut être rejoué sans risque
    pub(crate) fn is_retryable(&self) -> bool {
        matches!(self, CatalogError::Unreachable(_))
            || matches!(self, CatalogError::Rejected { status, .. } if *status >= 500)
    }
}
