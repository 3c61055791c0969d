//! Cache local des assets sur SQLite
//!
//! Deux tables logiques indexées par identifiant d'asset : les métadonnées
//! (`asset_metadata`) et les binaires (`asset_payloads`, un enregistrement par
//! emplacement). Chaque écriture d'asset est transactionnelle sur les deux
//! tables. Les requêtes SQL s'exécutent sur le pool bloquant de tokio.

use crate::error::{Result, StoreError};
use crate::record::{self, SyncState, RECORD_VERSION};
use crate::schema;
use chrono::Utc;
use mvasset::{Asset, Payload, PayloadSet, Slot};
use rusqlite::{params, Connection, OptionalExtension, Transaction};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Asset dont une modification n'a pas encore atteint le catalogue distant
#[derive(Debug, Clone, PartialEq)]
pub struct PendingAsset {
    pub asset: Asset,
    pub state: SyncState,
}

/// Bilan de l'enregistrement de métadonnées distantes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MetadataUpdate {
    /// Enregistrements écrits
    pub written: usize,
    /// Binaires retirés parce que leur URL distante a changé
    pub stale: Vec<(String, Slot)>,
}

/// Statistiques du cache local
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Nombre d'enregistrements de métadonnées
    pub assets: usize,
    /// Nombre de binaires stockés (tous emplacements confondus)
    pub payloads: usize,
    /// Volume total des binaires, en octets
    pub payload_bytes: u64,
    /// Assets en attente de poussée vers le catalogue
    pub pending: usize,
    /// Suppressions locales pas encore confirmées par le catalogue
    pub tombstones: usize,
}

/// Cache local durable des assets et de leurs binaires
///
/// Le type est peu coûteux à cloner : les clones partagent la même connexion.
#[derive(Clone)]
pub struct AssetStore {
    conn: Arc<Mutex<Connection>>,
    path: Option<PathBuf>,
    quota_bytes: Option<u64>,
}

impl std::fmt::Debug for AssetStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssetStore")
            .field("path", &self.path)
            .field("quota_bytes", &self.quota_bytes)
            .finish()
    }
}

impl AssetStore {
    /// Ouvre (ou crée) le cache dans le fichier `path`
    ///
    /// Le schéma est créé si nécessaire et les enregistrements anciens sont
    /// migrés vers la forme courante avant de rendre la main.
    ///
    /// # Exemple
    ///
    /// ```rust,no_run
    /// use mvstore::AssetStore;
    /// use std::path::Path;
    ///
    /// let store = AssetStore::open(Path::new("assets.db")).unwrap();
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(path)?;
        info!(path = %path.display(), "Opening asset store");
        Self::from_connection(conn, Some(path.to_path_buf()))
    }

    /// Cache volatile, utile pour les tests et le mode démonstration
    pub fn open_in_memory() -> Result<Self> {
        Self::from_connection(Connection::open_in_memory()?, None)
    }

    fn from_connection(conn: Connection, path: Option<PathBuf>) -> Result<Self> {
        schema::init(&conn)?;
        let migrated = migrate_records(&conn)?;
        if migrated > 0 {
            info!("Migrated {} legacy asset records", migrated);
        }

        Ok(Self {
            conn: Arc::new(Mutex::new(conn)),
            path,
            quota_bytes: None,
        })
    }

    /// Limite le volume total des binaires ; `None` pour ne pas limiter
    pub fn with_quota(mut self, quota_bytes: Option<u64>) -> Self {
        self.quota_bytes = quota_bytes.filter(|q| *q > 0);
        self
    }

    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Exécute `f` sur la connexion depuis le pool bloquant
    async fn run<T, F>(&self, f: F) -> Result<T>
    where
        F: FnOnce(&mut Connection) -> Result<T> + Send + 'static,
        T: Send + 'static,
    {
        let conn = Arc::clone(&self.conn);
        tokio::task::spawn_blocking(move || {
            let mut guard = conn.lock().unwrap_or_else(|p| p.into_inner());
            f(&mut guard)
        })
        .await?
    }

    /// Écrit un asset et ses binaires en une seule transaction
    ///
    /// Les emplacements absents de `payloads` gardent leur valeur précédente.
    /// L'état de synchronisation stocké est conservé (nouvel asset : synchronisé).
    pub async fn put_asset(&self, asset: &Asset, payloads: &PayloadSet) -> Result<()> {
        self.put_with_state(asset, payloads, SyncState::Synced).await
    }

    /// Comme [`AssetStore::put_asset`], en marquant l'asset en attente de poussée
    pub async fn put_pending(
        &self,
        asset: &Asset,
        payloads: &PayloadSet,
        state: SyncState,
    ) -> Result<()> {
        self.put_with_state(asset, payloads, state).await
    }

    async fn put_with_state(
        &self,
        asset: &Asset,
        payloads: &PayloadSet,
        state: SyncState,
    ) -> Result<()> {
        let asset = asset.clone();
        let payloads = payloads.clone();
        let quota = self.quota_bytes;

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let stored = write_record(&tx, &asset, state)?;
            for (slot, payload) in payloads.iter() {
                write_payload(&tx, &asset.id, slot, payload)?;
            }
            check_quota(&tx, quota)?;
            tx.commit()?;

            debug!(
                asset = %asset.id,
                slots = payloads.len(),
                state = stored.as_str(),
                "Asset written to local store"
            );
            Ok(())
        })
        .await
    }

    /// Enregistre des métadonnées venant du catalogue sans toucher aux binaires
    ///
    /// Les assets en attente de poussée et ceux supprimés localement sont
    /// ignorés. Un binaire dont l'URL distante a changé est retiré pour être
    /// retéléchargé ; l'appelant doit révoquer les handles qui le servaient.
    pub async fn put_metadata_only(&self, assets: &[Asset]) -> Result<MetadataUpdate> {
        let assets = assets.to_vec();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let mut update = MetadataUpdate::default();

            for asset in &assets {
                if is_tombstoned(&tx, &asset.id)? {
                    continue;
                }

                let previous = read_record(&tx, &asset.id)?;
                if let Some((_, state)) = &previous {
                    if state.is_pending() {
                        continue;
                    }
                }

                if let Some((old, _)) = previous {
                    for slot in Slot::ALL {
                        let changed = old.resources.get(slot).is_some()
                            && old.resources.get(slot) != asset.resources.get(slot);
                        if changed {
                            let dropped = tx.execute(
                                "DELETE FROM asset_payloads WHERE asset_id = ?1 AND slot = ?2",
                                params![asset.id, slot.as_str()],
                            )?;
                            if dropped > 0 {
                                debug!(asset = %asset.id, %slot, "Dropped stale payload");
                                update.stale.push((asset.id.clone(), slot));
                            }
                        }
                    }
                }

                write_record(&tx, asset, SyncState::Synced)?;
                update.written += 1;
            }

            tx.commit()?;
            Ok(update)
        })
        .await
    }

    /// Enregistre la réponse du catalogue à la poussée de `local_id`
    ///
    /// `sent` est la version poussée. Si l'enregistrement local n'a pas changé
    /// depuis et qu'aucune modification ultérieure n'est signalée
    /// (`follow_up`), `confirmed` le remplace et l'asset repasse à l'état
    /// synchronisé. Sinon les métadonnées locales sont conservées avec les URLs
    /// confirmées, et l'asset reste en attente d'une mise à jour (de ses
    /// fichiers si `follow_up` le demande). Un identifiant attribué par le
    /// catalogue est repris avec les binaires dans la même transaction.
    ///
    /// Retourne l'enregistrement et l'état finalement stockés, `None` si
    /// l'asset n'existe plus localement.
    pub async fn settle(
        &self,
        local_id: &str,
        sent: &Asset,
        confirmed: &Asset,
        follow_up: Option<SyncState>,
    ) -> Result<Option<(Asset, SyncState)>> {
        let local_id = local_id.to_string();
        let sent = record::encode(sent)?;
        let confirmed = confirmed.clone();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let current: Option<String> = tx
                .query_row(
                    "SELECT record FROM asset_metadata WHERE id = ?1",
                    params![local_id],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(current) = current else {
                return Ok(None);
            };

            let (asset, state) = if current == sent && follow_up.is_none() {
                (confirmed, SyncState::Synced)
            } else {
                let mut kept = record::decode(&local_id, &current)?;
                kept.id = confirmed.id.clone();
                kept.resources = confirmed.resources;
                let state = match follow_up {
                    Some(SyncState::PendingFiles) => SyncState::PendingFiles,
                    _ => SyncState::PendingUpdate,
                };
                (kept, state)
            };

            if asset.id != local_id {
                tx.execute("DELETE FROM asset_payloads WHERE asset_id = ?1", params![asset.id])?;
                tx.execute(
                    "UPDATE asset_payloads SET asset_id = ?2 WHERE asset_id = ?1",
                    params![local_id, asset.id],
                )?;
                tx.execute("DELETE FROM asset_metadata WHERE id = ?1", params![local_id])?;
            }
            upsert_record(&tx, &asset, state)?;
            tx.commit()?;

            debug!(asset = %asset.id, state = state.as_str(), "Catalog answer recorded");
            Ok(Some((asset, state)))
        })
        .await
    }

    /// Mémorise la suppression d'un asset déjà absent du cache local
    pub async fn remember_deletion(&self, id: &str) -> Result<()> {
        let id = id.to_string();
        self.run(move |conn| {
            conn.execute(
                "INSERT OR REPLACE INTO asset_tombstones (id, deleted_at) VALUES (?1, ?2)",
                params![id, Utc::now().to_rfc3339()],
            )?;
            Ok(())
        })
        .await
    }

    pub async fn get_metadata(&self, id: &str) -> Result<Option<Asset>> {
        let id = id.to_string();
        self.run(move |conn| Ok(read_record(conn, &id)?.map(|(asset, _)| asset)))
            .await
    }

    pub async fn sync_state(&self, id: &str) -> Result<Option<SyncState>> {
        let id = id.to_string();
        self.run(move |conn| Ok(read_record(conn, &id)?.map(|(_, state)| state)))
            .await
    }

    /// Tous les binaires stockés pour `id` (ensemble vide si aucun)
    pub async fn get_payloads(&self, id: &str) -> Result<PayloadSet> {
        let id = id.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare(
                "SELECT slot, file_name, content_type, data
                 FROM asset_payloads WHERE asset_id = ?1",
            )?;
            let rows = stmt.query_map(params![id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<String>>(2)?,
                    row.get::<_, Vec<u8>>(3)?,
                ))
            })?;

            let mut set = PayloadSet::new();
            for row in rows {
                let (slot, file_name, content_type, data) = row?;
                match slot.parse::<Slot>() {
                    Ok(slot) => {
                        set.insert(slot, build_payload(file_name, content_type, data));
                    }
                    Err(e) => warn!(asset = %id, "Ignoring payload row: {}", e),
                }
            }
            Ok(set)
        })
        .await
    }

    pub async fn get_payload(&self, id: &str, slot: Slot) -> Result<Option<Payload>> {
        let id = id.to_string();

        self.run(move |conn| {
            let row = conn
                .query_row(
                    "SELECT file_name, content_type, data
                     FROM asset_payloads WHERE asset_id = ?1 AND slot = ?2",
                    params![id, slot.as_str()],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, Option<String>>(1)?,
                            row.get::<_, Vec<u8>>(2)?,
                        ))
                    },
                )
                .optional()?;
            Ok(row.map(|(file_name, content_type, data)| build_payload(file_name, content_type, data)))
        })
        .await
    }

    /// Emplacements pour lesquels un binaire est disponible hors ligne
    pub async fn payload_slots(&self, id: &str) -> Result<Vec<Slot>> {
        let id = id.to_string();

        self.run(move |conn| {
            let mut stmt = conn.prepare("SELECT slot FROM asset_payloads WHERE asset_id = ?1")?;
            let names = stmt
                .query_map(params![id], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut slots: Vec<Slot> = names.iter().filter_map(|n| n.parse().ok()).collect();
            slots.sort();
            Ok(slots)
        })
        .await
    }

    /// Supprime l'asset des deux tables ; `false` s'il n'existait pas
    pub async fn delete_asset(&self, id: &str) -> Result<bool> {
        Ok(self.delete(id, false).await?.is_some())
    }

    /// Supprime l'asset et mémorise la suppression jusqu'à sa confirmation distante
    ///
    /// Tant que la marque existe, les synchronisations n'y réintroduisent pas
    /// l'asset. Un asset jamais accepté par le catalogue n'est pas marqué.
    /// Retourne l'état de synchronisation de l'enregistrement supprimé, `None`
    /// s'il n'existait pas.
    pub async fn delete_remembering(&self, id: &str) -> Result<Option<SyncState>> {
        self.delete(id, true).await
    }

    async fn delete(&self, id: &str, remember: bool) -> Result<Option<SyncState>> {
        let id = id.to_string();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let state = read_state(&tx, &id)?;
            let payloads = tx.execute("DELETE FROM asset_payloads WHERE asset_id = ?1", params![id])?;
            let records = tx.execute("DELETE FROM asset_metadata WHERE id = ?1", params![id])?;

            if remember && records > 0 && state != Some(SyncState::PendingCreate) {
                tx.execute(
                    "INSERT OR REPLACE INTO asset_tombstones (id, deleted_at) VALUES (?1, ?2)",
                    params![id, Utc::now().to_rfc3339()],
                )?;
            }
            tx.commit()?;

            if records == 0 && payloads == 0 {
                return Ok(None);
            }
            debug!(asset = %id, payloads, "Asset removed from local store");
            // Binaires orphelins sans métadonnées : considérés comme synchronisés
            Ok(Some(state.unwrap_or(SyncState::Synced)))
        })
        .await
    }

    /// Toutes les métadonnées, dans l'ordre d'insertion
    pub async fn list_metadata(&self) -> Result<Vec<Asset>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT id, record FROM asset_metadata ORDER BY rowid")?;
            let rows = stmt
                .query_map([], |row| Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?)))?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut assets = Vec::with_capacity(rows.len());
            for (id, json) in rows {
                match record::decode(&id, &json) {
                    Ok(asset) => assets.push(asset),
                    Err(e) => warn!("Skipping unreadable record: {}", e),
                }
            }
            Ok(assets)
        })
        .await
    }

    /// Assets dont une modification reste à pousser vers le catalogue
    pub async fn pending(&self) -> Result<Vec<PendingAsset>> {
        self.run(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, record, sync_state FROM asset_metadata
                 WHERE sync_state != 'synced' ORDER BY rowid",
            )?;
            let rows = stmt
                .query_map([], |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                    ))
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;

            let mut pending = Vec::with_capacity(rows.len());
            for (id, json, state) in rows {
                let Some(state) = SyncState::parse(&state) else {
                    warn!(asset = %id, "Unknown sync state {}", state);
                    continue;
                };
                match record::decode(&id, &json) {
                    Ok(asset) => pending.push(PendingAsset { asset, state }),
                    Err(e) => warn!("Skipping unreadable record: {}", e),
                }
            }
            Ok(pending)
        })
        .await
    }

    /// Identifiants supprimés localement dont la suppression distante n'est pas confirmée
    pub async fn tombstones(&self) -> Result<Vec<String>> {
        self.run(|conn| {
            let mut stmt = conn.prepare("SELECT id FROM asset_tombstones ORDER BY deleted_at")?;
            let ids = stmt
                .query_map([], |row| row.get::<_, String>(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(ids)
        })
        .await
    }

    /// Oublie une suppression (confirmée ou abandonnée)
    pub async fn clear_tombstone(&self, id: &str) -> Result<bool> {
        let id = id.to_string();
        self.run(move |conn| {
            Ok(conn.execute("DELETE FROM asset_tombstones WHERE id = ?1", params![id])? > 0)
        })
        .await
    }

    /// Retire les assets synchronisés que le catalogue ne liste plus
    ///
    /// Les assets en attente de poussée sont conservés. Retourne les
    /// identifiants supprimés.
    pub async fn retain_only(&self, ids: &[String]) -> Result<Vec<String>> {
        let keep: HashSet<String> = ids.iter().cloned().collect();

        self.run(move |conn| {
            let tx = conn.transaction()?;
            let synced = {
                let mut stmt =
                    tx.prepare("SELECT id FROM asset_metadata WHERE sync_state = 'synced'")?;
                let ids = stmt
                    .query_map([], |row| row.get::<_, String>(0))?
                    .collect::<std::result::Result<Vec<_>, _>>()?;
                ids
            };

            let mut removed = Vec::new();
            for id in synced.into_iter().filter(|id| !keep.contains(id)) {
                tx.execute("DELETE FROM asset_payloads WHERE asset_id = ?1", params![id])?;
                tx.execute("DELETE FROM asset_metadata WHERE id = ?1", params![id])?;
                removed.push(id);
            }
            tx.commit()?;

            if !removed.is_empty() {
                info!("Removed {} assets no longer in catalog", removed.len());
            }
            Ok(removed)
        })
        .await
    }

    pub async fn stats(&self) -> Result<StoreStats> {
        self.run(|conn| {
            let count = |sql: &str| -> Result<i64> { Ok(conn.query_row(sql, [], |row| row.get(0))?) };

            Ok(StoreStats {
                assets: count("SELECT COUNT(*) FROM asset_metadata")? as usize,
                payloads: count("SELECT COUNT(*) FROM asset_payloads")? as usize,
                payload_bytes: count("SELECT COALESCE(SUM(LENGTH(data)), 0) FROM asset_payloads")?
                    as u64,
                pending: count("SELECT COUNT(*) FROM asset_metadata WHERE sync_state != 'synced'")?
                    as usize,
                tombstones: count("SELECT COUNT(*) FROM asset_tombstones")? as usize,
            })
        })
        .await
    }

    /// Normalise les enregistrements anciens ; retourne le nombre réécrit
    ///
    /// Déjà exécuté à l'ouverture, cet appel ne trouve normalement plus rien.
    pub async fn migrate(&self) -> Result<usize> {
        self.run(|conn| migrate_records(conn)).await
    }
}

fn build_payload(file_name: String, content_type: Option<String>, data: Vec<u8>) -> Payload {
    let payload = Payload::new(file_name, data);
    match content_type {
        Some(ct) => payload.with_content_type(ct),
        None => payload,
    }
}

fn read_state(conn: &Connection, id: &str) -> Result<Option<SyncState>> {
    let state: Option<String> = conn
        .query_row(
            "SELECT sync_state FROM asset_metadata WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(state.as_deref().and_then(SyncState::parse))
}

fn read_record(conn: &Connection, id: &str) -> Result<Option<(Asset, SyncState)>> {
    let row: Option<(String, String)> = conn
        .query_row(
            "SELECT record, sync_state FROM asset_metadata WHERE id = ?1",
            params![id],
            |row| Ok((row.get(0)?, row.get(1)?)),
        )
        .optional()?;

    match row {
        None => Ok(None),
        Some((json, state)) => {
            let asset = record::decode(id, &json)?;
            let state = SyncState::parse(&state).unwrap_or(SyncState::Synced);
            Ok(Some((asset, state)))
        }
    }
}

fn is_tombstoned(conn: &Connection, id: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM asset_tombstones WHERE id = ?1",
            params![id],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Upsert de l'enregistrement ; retourne l'état finalement stocké
fn write_record(tx: &Transaction<'_>, asset: &Asset, state: SyncState) -> Result<SyncState> {
    let state = match read_state(tx, &asset.id)? {
        Some(previous) => previous.merge(state),
        None => state,
    };
    upsert_record(tx, asset, state)?;
    Ok(state)
}

/// Upsert avec un état imposé, sans fusion
fn upsert_record(tx: &Transaction<'_>, asset: &Asset, state: SyncState) -> Result<()> {
    tx.execute(
        "INSERT INTO asset_metadata (id, record, version, sync_state, updated_at)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(id) DO UPDATE SET
             record = excluded.record,
             version = excluded.version,
             sync_state = excluded.sync_state,
             updated_at = excluded.updated_at",
        params![
            asset.id,
            record::encode(asset)?,
            RECORD_VERSION,
            state.as_str(),
            Utc::now().to_rfc3339()
        ],
    )?;
    Ok(())
}

fn write_payload(tx: &Transaction<'_>, id: &str, slot: Slot, payload: &Payload) -> Result<()> {
    tx.execute(
        "INSERT OR REPLACE INTO asset_payloads (asset_id, slot, file_name, content_type, data)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            id,
            slot.as_str(),
            payload.file_name,
            payload.content_type,
            &payload.data[..]
        ],
    )?;
    Ok(())
}

fn check_quota(tx: &Transaction<'_>, quota: Option<u64>) -> Result<()> {
    let Some(limit) = quota else {
        return Ok(());
    };

    let total: i64 = tx.query_row(
        "SELECT COALESCE(SUM(LENGTH(data)), 0) FROM asset_payloads",
        [],
        |row| row.get(0),
    )?;
    if total as u64 > limit {
        return Err(StoreError::QuotaExceeded(format!(
            "{} stored, limit is {}",
            mvasset::human_size(total as u64),
            mvasset::human_size(limit)
        )));
    }
    Ok(())
}

/// Réécrit les enregistrements de version antérieure dans la forme courante
fn migrate_records(conn: &Connection) -> Result<usize> {
    let mut stmt =
        conn.prepare("SELECT id, record, version FROM asset_metadata WHERE version < ?1")?;
    let rows = stmt
        .query_map(params![RECORD_VERSION], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, i64>(2)?,
            ))
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;

    let mut migrated = 0;
    for (id, json, version) in rows {
        match record::upgrade(&id, &json, version) {
            Ok(asset) => {
                conn.execute(
                    "UPDATE asset_metadata SET record = ?2, version = ?3 WHERE id = ?1",
                    params![id, record::encode(&asset)?, RECORD_VERSION],
                )?;
                migrated += 1;
            }
            Err(e) => warn!("Cannot migrate legacy record: {}", e),
        }
    }
    Ok(migrated)
}
