//! Forme versionnée des enregistrements de métadonnées
//!
//! Les premiers enregistrements portaient directement leurs URLs de ressources
//! sous d'anciens noms (`fileUrl`, `thumbnail`, `zipUrl`...), parfois des
//! handles `blob:` propres au processus, et des compteurs structurels à plat.
//! [`upgrade`] les normalise une fois pour toutes à l'ouverture du cache ; les
//! lectures ne voient ensuite que la forme courante.

use crate::error::{Result, StoreError};
use mvasset::Asset;
use serde_json::{Map, Value};

/// Version courante du format des enregistrements
pub const RECORD_VERSION: i64 = 1;

/// Anciens noms de champs de ressources et leur nom courant
const LEGACY_RESOURCE_FIELDS: [(&str, &str); 5] = [
    ("fileUrl", "modelUrl"),
    ("url", "modelUrl"),
    ("thumbnail", "thumbnailUrl"),
    ("zipUrl", "packageUrl"),
    ("zip", "packageUrl"),
];

const RESOURCE_FIELDS: [&str; 4] = ["modelUrl", "thumbnailUrl", "packageUrl", "archiveUrl"];

/// Compteurs structurels autrefois stockés au premier niveau
const LEGACY_METADATA_FIELDS: [&str; 4] = ["vertices", "polygons", "materials", "createdAt"];

/// État de synchronisation d'un asset vis-à-vis du catalogue distant
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SyncState {
    /// Identique au catalogue (à la dernière synchronisation)
    Synced,
    /// Créé localement, jamais accepté par le catalogue
    PendingCreate,
    /// Métadonnées modifiées localement, pas encore poussées
    PendingUpdate,
    /// Binaires (et éventuellement métadonnées) à repousser
    PendingFiles,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Synced => "synced",
            SyncState::PendingCreate => "pending_create",
            SyncState::PendingUpdate => "pending_update",
            SyncState::PendingFiles => "pending_files",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "synced" => Some(SyncState::Synced),
            "pending_create" => Some(SyncState::PendingCreate),
            "pending_update" => Some(SyncState::PendingUpdate),
            "pending_files" => Some(SyncState::PendingFiles),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        *self != SyncState::Synced
    }

    /// Combine l'état stocké avec celui d'une nouvelle écriture
    ///
    /// Une écriture ne fait jamais redescendre un état en attente : seule une
    /// confirmation explicite du catalogue ramène à [`SyncState::Synced`].
    pub fn merge(self, next: SyncState) -> SyncState {
        use SyncState::*;
        match (self, next) {
            (PendingCreate, _) | (_, PendingCreate) => PendingCreate,
            (PendingFiles, _) | (_, PendingFiles) => PendingFiles,
            (PendingUpdate, _) | (_, PendingUpdate) => PendingUpdate,
            (Synced, Synced) => Synced,
        }
    }
}

/// Sérialise un asset dans la forme courante
pub(crate) fn encode(asset: &Asset) -> Result<String> {
    Ok(serde_json::to_string(asset)?)
}

/// Désérialise un enregistrement déjà à la version courante
pub(crate) fn decode(id: &str, record: &str) -> Result<Asset> {
    serde_json::from_str(record).map_err(|e| StoreError::InvalidRecord {
        id: id.to_string(),
        reason: e.to_string(),
    })
}

/// Normalise un enregistrement d'une version antérieure
pub(crate) fn upgrade(id: &str, record: &str, version: i64) -> Result<Asset> {
    if version >= RECORD_VERSION {
        return decode(id, record);
    }

    let value: Value = serde_json::from_str(record)?;
    let Value::Object(mut map) = value else {
        return Err(StoreError::InvalidRecord {
            id: id.to_string(),
            reason: "record is not a JSON object".to_string(),
        });
    };

    for (legacy, current) in LEGACY_RESOURCE_FIELDS {
        if let Some(value) = map.remove(legacy) {
            if value.is_string() && !map.contains_key(current) {
                map.insert(current.to_string(), value);
            }
        }
    }

    // Un handle blob: ne survit pas au processus qui l'a créé
    for field in RESOURCE_FIELDS {
        let stale = matches!(map.get(field), Some(Value::String(s)) if s.starts_with("blob:"));
        if stale {
            map.remove(field);
        }
    }

    if let Some(size) = map.remove("size") {
        if !map.contains_key("fileSize") {
            let size = match size {
                Value::Number(n) => n.as_u64().map(mvasset::human_size).map(Value::String),
                Value::String(s) => Some(Value::String(s)),
                _ => None,
            };
            if let Some(size) = size {
                map.insert("fileSize".to_string(), size);
            }
        }
    }

    let mut metadata = match map.remove("metadata") {
        Some(Value::Object(m)) => m,
        _ => Map::new(),
    };
    for field in LEGACY_METADATA_FIELDS {
        if let Some(value) = map.remove(field) {
            metadata.entry(field.to_string()).or_insert(value);
        }
    }
    map.insert("metadata".to_string(), Value::Object(metadata));

    if !map.contains_key("id") {
        map.insert("id".to_string(), Value::String(id.to_string()));
    }

    serde_json::from_value(Value::Object(map)).map_err(|e| StoreError::InvalidRecord {
        id: id.to_string(),
        reason: e.to_string(),
    })
}
