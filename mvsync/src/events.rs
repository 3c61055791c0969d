//! Évènements diffusés par le moteur de synchronisation

use std::fmt;

/// Appel distant concerné par un échec de poussée
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RemoteOp {
    Create,
    UpdateMetadata,
    UpdateFiles,
    Delete,
}

impl fmt::Display for RemoteOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            RemoteOp::Create => "create",
            RemoteOp::UpdateMetadata => "update_metadata",
            RemoteOp::UpdateFiles => "update_files",
            RemoteOp::Delete => "delete",
        })
    }
}

/// Variantes d'évènements du moteur
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncEvent {
    /// La liste en mémoire vient d'être réconciliée avec le catalogue
    Synced { count: usize },
    /// Une synchronisation n'a pas pu joindre le catalogue
    SyncFailed { reason: String },
    /// Un asset a été créé ou modifié localement
    AssetChanged { id: String },
    /// Un asset a quitté la liste (suppression locale ou absence du catalogue)
    AssetRemoved { id: String },
    /// Une modification locale n'a pas pu être poussée
    RemotePushFailed {
        id: String,
        op: RemoteOp,
        reason: String,
    },
}
