//! Résultats des opérations du moteur

use mvasset::{Asset, Slot};
use mvcatalog::CatalogError;
use mvhandles::Handle;
use std::collections::BTreeMap;
use std::fmt;

/// Issue de la poussée d'une modification vers le catalogue distant
///
/// L'écriture locale a toujours réussi quand un statut est rapporté.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RemoteStatus {
    /// Le catalogue a accepté la modification
    Pushed,
    /// Mode déconnecté : la modification reste locale et sera poussée plus tard
    LocalOnly,
    /// Rien à pousser (asset inconnu, ou jamais accepté par le catalogue)
    Skipped,
    /// Gardée localement derrière une création pas encore acceptée ou une
    /// poussée en cours ; elle partira avec la poussée suivante
    Queued,
    /// Catalogue injoignable ou réponse illisible ; nouvelle tentative à la prochaine synchronisation
    Unreachable(String),
    /// Le catalogue a refusé la modification
    Rejected { status: u16, message: String },
}

impl RemoteStatus {
    pub(crate) fn from_error(err: &CatalogError) -> Self {
        match err {
            CatalogError::Disconnected => RemoteStatus::LocalOnly,
            CatalogError::Rejected { status, message } => RemoteStatus::Rejected {
                status: *status,
                message: message.clone(),
            },
            other => RemoteStatus::Unreachable(other.to_string()),
        }
    }

    pub fn is_pushed(&self) -> bool {
        matches!(self, RemoteStatus::Pushed)
    }

    /// Vrai si la poussée a été tentée et a échoué
    pub fn is_failure(&self) -> bool {
        matches!(self, RemoteStatus::Unreachable(_) | RemoteStatus::Rejected { .. })
    }

    /// Avertissement secondaire à afficher à l'utilisateur, le cas échéant
    pub fn notice(&self) -> Option<String> {
        match self {
            RemoteStatus::Pushed | RemoteStatus::Skipped => None,
            RemoteStatus::LocalOnly => Some("Saved locally (offline mode)".to_string()),
            RemoteStatus::Queued => Some("Saved locally; will be sent after the pending upload".to_string()),
            RemoteStatus::Unreachable(_) => {
                Some("Saved locally; could not reach the server, will retry".to_string())
            }
            RemoteStatus::Rejected { message, .. } => {
                Some(format!("Saved locally; the server refused the change: {message}"))
            }
        }
    }
}

impl fmt::Display for RemoteStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RemoteStatus::Pushed => f.write_str("pushed"),
            RemoteStatus::LocalOnly => f.write_str("local only"),
            RemoteStatus::Skipped => f.write_str("skipped"),
            RemoteStatus::Queued => f.write_str("queued"),
            RemoteStatus::Unreachable(reason) => write!(f, "unreachable ({reason})"),
            RemoteStatus::Rejected { status, message } => {
                write!(f, "rejected ({status}: {message})")
            }
        }
    }
}

/// Résultat d'une opération de modification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutationReport {
    /// Identifiant final de l'asset (le catalogue peut en attribuer un nouveau à la création)
    pub id: String,
    pub remote: RemoteStatus,
}

/// Résultat d'une suppression groupée
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BulkDeleteReport {
    /// Identifiants effectivement retirés du cache local
    pub removed_locally: Vec<String>,
    /// Suppressions acceptées par le catalogue
    pub remote_succeeded: Vec<String>,
    /// Suppressions distantes en échec, avec leur statut
    pub remote_failed: Vec<(String, RemoteStatus)>,
    /// Suppressions sans appel distant (mode déconnecté, asset inconnu ou jamais poussé)
    pub remote_skipped: Vec<String>,
}

impl BulkDeleteReport {
    pub(crate) fn record(&mut self, report: MutationReport, removed: bool) {
        if removed {
            self.removed_locally.push(report.id.clone());
        }
        match report.remote {
            RemoteStatus::Pushed => self.remote_succeeded.push(report.id),
            RemoteStatus::LocalOnly | RemoteStatus::Skipped | RemoteStatus::Queued => {
                self.remote_skipped.push(report.id)
            }
            failure => self.remote_failed.push((report.id, failure)),
        }
    }
}

/// Bilan d'une synchronisation
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncSummary {
    /// Taille de la liste en mémoire après réconciliation
    pub assets: usize,
    /// Modifications en attente poussées avec succès
    pub pushed: usize,
    /// Assets retirés car absents du catalogue
    pub removed: usize,
}

/// Asset complet : métadonnées et handles vivants pour chaque binaire disponible
#[derive(Debug, Clone, PartialEq)]
pub struct FullAsset {
    pub asset: Asset,
    pub handles: BTreeMap<Slot, Handle>,
}

impl FullAsset {
    /// Localisateur à remettre au consommateur pour `slot`
    ///
    /// Le handle local s'il existe, sinon l'URL distante.
    pub fn locator(&self, slot: Slot) -> Option<&str> {
        self.handles
            .get(&slot)
            .map(Handle::as_str)
            .or_else(|| self.asset.resources.get(slot))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_from_error() {
        assert_eq!(
            RemoteStatus::from_error(&CatalogError::Disconnected),
            RemoteStatus::LocalOnly
        );
        assert!(RemoteStatus::from_error(&CatalogError::Unreachable("timeout".into())).is_failure());
        assert_eq!(
            RemoteStatus::from_error(&CatalogError::from_status_code(422, "bad payload")),
            RemoteStatus::Rejected {
                status: 422,
                message: "bad payload".into()
            }
        );
        assert!(RemoteStatus::Pushed.notice().is_none());
        assert!(RemoteStatus::LocalOnly.notice().is_some());
        assert!(!RemoteStatus::Queued.is_failure());
    }

    #[test]
    fn test_bulk_report_buckets() {
        let mut report = BulkDeleteReport::default();
        report.record(MutationReport { id: "a".into(), remote: RemoteStatus::Pushed }, true);
        report.record(
            MutationReport {
                id: "b".into(),
                remote: RemoteStatus::Rejected { status: 403, message: String::new() },
            },
            true,
        );
        report.record(MutationReport { id: "c".into(), remote: RemoteStatus::Skipped }, false);

        assert_eq!(report.removed_locally, vec!["a", "b"]);
        assert_eq!(report.remote_succeeded, vec!["a"]);
        assert_eq!(report.remote_failed.len(), 1);
        assert_eq!(report.remote_skipped, vec!["c"]);
    }
}
