//! Modifications initiées par l'utilisateur
//!
//! Chaque opération écrit d'abord dans le cache local, met à jour la liste en
//! mémoire, puis tente la poussée vers le catalogue. Un échec distant n'annule
//! jamais l'écriture locale ; il est rapporté dans le [`MutationReport`].
//!
//! Tant que la création d'un asset n'a pas été acceptée, ou qu'une poussée le
//! concernant est en cours, ses modifications restent locales : elles partent
//! avec la poussée suivante, jamais en parallèle.
//!
//! Création, renommage, suppression et remplacement de fichier lèvent
//! l'indicateur d'activité ; les retouches de tags, de catégorie et
//! d'état de rendu sont silencieuses.

use crate::engine::AssetSync;
use crate::error::{Result, SyncError};
use crate::events::SyncEvent;
use crate::report::{BulkDeleteReport, MutationReport, RemoteStatus};
use chrono::Utc;
use mvasset::{human_size, new_asset_id, Asset, AssetPatch, Payload, PayloadSet, ResourceRefs, Slot};
use mvstore::{PendingAsset, SyncState};
use std::collections::HashSet;
use tracing::{debug, info};

impl AssetSync {
    /// Crée un asset à partir de ses métadonnées et de ses fichiers
    ///
    /// Le fichier du modèle est obligatoire. Un identifiant vide est remplacé
    /// par un identifiant généré ; la taille affichée et la date de création
    /// sont renseignées si absentes.
    pub async fn create_asset(&self, asset: Asset, payloads: PayloadSet) -> Result<MutationReport> {
        let _busy = self.inner.busy.enter();
        let ctx = &self.inner.ctx;

        let model_len = match payloads.get(Slot::Model) {
            Some(model) if !model.is_empty() => model.len(),
            _ => return Err(SyncError::InvalidInput("a model file is required".into())),
        };

        let mut asset = asset;
        asset.name = asset.name.trim().to_string();
        if asset.name.is_empty() {
            return Err(SyncError::InvalidInput("asset name must not be empty".into()));
        }
        if asset.id.trim().is_empty() {
            asset.id = new_asset_id();
        }
        if ctx.store.get_metadata(&asset.id).await?.is_some() {
            return Err(SyncError::AlreadyExists(asset.id));
        }

        if asset.file_size.is_empty() {
            asset.file_size = human_size(model_len as u64);
        }
        if asset.metadata.created_at.is_none() {
            asset.metadata.created_at = Some(Utc::now());
        }
        asset.tags = normalize_tags(asset.tags);
        // Les URLs n'existent qu'une fois le catalogue informé
        asset.resources = ResourceRefs::default();
        self.inner.deletes.forget(&asset.id);

        ctx.store
            .put_pending(&asset, &payloads, SyncState::PendingCreate)
            .await?;
        self.upsert_in_list(asset.clone());
        self.emit(SyncEvent::AssetChanged {
            id: asset.id.clone(),
        });
        info!(asset = %asset.id, files = payloads.len(), "Asset created locally");

        let entry = PendingAsset {
            asset,
            state: SyncState::PendingCreate,
        };
        self.push_after_write(&entry, None, None).await
    }

    pub async fn rename_asset(&self, id: &str, name: &str) -> Result<MutationReport> {
        let _busy = self.inner.busy.enter();
        let name = name.trim();
        if name.is_empty() {
            return Err(SyncError::InvalidInput("asset name must not be empty".into()));
        }
        self.apply_patch(id, AssetPatch::name(name)).await
    }

    /// Remplace les tags (espaces retirés, doublons éliminés)
    pub async fn update_tags(&self, id: &str, tags: Vec<String>) -> Result<MutationReport> {
        self.apply_patch(id, AssetPatch::tags(normalize_tags(tags))).await
    }

    pub async fn update_category(&self, id: &str, category: &str) -> Result<MutationReport> {
        self.apply_patch(id, AssetPatch::category(category.trim())).await
    }

    pub async fn update_rendering_flag(&self, id: &str, rendered: bool) -> Result<MutationReport> {
        self.apply_patch(id, AssetPatch::rendered(rendered)).await
    }

    /// Mise à jour partielle quelconque des métadonnées
    pub async fn update_asset(&self, id: &str, patch: AssetPatch) -> Result<MutationReport> {
        if patch.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(SyncError::InvalidInput("asset name must not be empty".into()));
        }
        self.apply_patch(id, patch).await
    }

    async fn apply_patch(&self, id: &str, patch: AssetPatch) -> Result<MutationReport> {
        let ctx = &self.inner.ctx;

        let mut asset = ctx
            .store
            .get_metadata(id)
            .await?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        let previous = ctx.store.sync_state(id).await?.unwrap_or(SyncState::Synced);
        let joined = self.inner.pushes.follow_up(id, SyncState::PendingUpdate);

        patch.apply_to(&mut asset);
        ctx.store
            .put_pending(&asset, &PayloadSet::new(), SyncState::PendingUpdate)
            .await?;
        self.upsert_in_list(asset.clone());
        self.emit(SyncEvent::AssetChanged { id: id.to_string() });
        debug!(asset = id, "Metadata updated locally");

        if joined || previous == SyncState::PendingCreate {
            return Ok(self.queued(id));
        }

        // Patch partiel seulement si rien d'autre n'attendait
        let partial = (previous == SyncState::Synced).then_some(&patch);
        let entry = PendingAsset {
            asset,
            state: previous.merge(SyncState::PendingUpdate),
        };
        self.push_after_write(&entry, partial, None).await
    }

    /// Remplace un seul fichier de l'asset
    ///
    /// Les autres emplacements sont conservés. Le handle de l'emplacement est
    /// révoqué : le prochain appel à [`AssetSync::get_asset_full`] en crée un
    /// nouveau sur les nouveaux octets.
    pub async fn replace_file(&self, id: &str, slot: Slot, payload: Payload) -> Result<MutationReport> {
        let _busy = self.inner.busy.enter();
        let ctx = &self.inner.ctx;

        if payload.is_empty() {
            return Err(SyncError::InvalidInput(format!("{slot} file is empty")));
        }

        let mut asset = ctx
            .store
            .get_metadata(id)
            .await?
            .ok_or_else(|| SyncError::NotFound(id.to_string()))?;
        let previous = ctx.store.sync_state(id).await?.unwrap_or(SyncState::Synced);
        let joined = self.inner.pushes.follow_up(id, SyncState::PendingFiles);

        if slot.is_primary() {
            asset.file_size = human_size(payload.len() as u64);
        }

        let files = PayloadSet::new().with(slot, payload);
        ctx.store
            .put_pending(&asset, &files, SyncState::PendingFiles)
            .await?;
        ctx.handles.revoke(id, slot);
        self.upsert_in_list(asset.clone());
        self.emit(SyncEvent::AssetChanged { id: id.to_string() });
        info!(asset = id, %slot, "File replaced locally");

        if joined || previous == SyncState::PendingCreate {
            return Ok(self.queued(id));
        }

        let entry = PendingAsset {
            asset,
            state: previous.merge(SyncState::PendingFiles),
        };
        if previous == SyncState::Synced {
            self.push_after_write(&entry, None, Some(&files)).await
        } else {
            self.push_after_write(&entry, None, None).await
        }
    }

    /// Supprime un asset ; supprimer un asset inconnu n'est pas une erreur
    pub async fn delete_asset(&self, id: &str) -> Result<MutationReport> {
        let _busy = self.inner.busy.enter();
        Ok(self.delete_one(id).await?.0)
    }

    /// Supprime plusieurs assets, un échec distant n'interrompant pas les suivants
    pub async fn delete_assets<S: AsRef<str>>(&self, ids: &[S]) -> Result<BulkDeleteReport> {
        let _busy = self.inner.busy.enter();
        let mut report = BulkDeleteReport::default();
        let mut seen = HashSet::new();

        for id in ids.iter().map(AsRef::as_ref) {
            if !seen.insert(id) {
                continue;
            }
            let (outcome, removed) = self.delete_one(id).await?;
            report.record(outcome, removed);
        }

        info!(
            removed = report.removed_locally.len(),
            failed = report.remote_failed.len(),
            "Bulk delete done"
        );
        Ok(report)
    }

    /// Retourne le rapport et vrai si l'asset existait localement
    async fn delete_one(&self, id: &str) -> Result<(MutationReport, bool)> {
        // Une synchronisation concurrente ne doit pas réintroduire l'asset
        self.inner.deletes.begin(id);
        let outcome = self.delete_recorded(id).await;
        self.inner.deletes.finish(id);
        outcome
    }

    async fn delete_recorded(&self, id: &str) -> Result<(MutationReport, bool)> {
        let ctx = &self.inner.ctx;

        let state = ctx.store.delete_remembering(id).await?;
        let revoked = ctx.handles.revoke_all(id);
        let listed = self.remove_from_list(id);
        if state.is_some() || listed {
            self.emit(SyncEvent::AssetRemoved { id: id.to_string() });
        }

        let remote = match state {
            None => {
                debug!(asset = id, "Delete of unknown asset ignored");
                RemoteStatus::Skipped
            }
            // Jamais parvenu au catalogue : rien à supprimer là-bas. Une création
            // en cours retire elle-même sa copie distante à son retour.
            Some(SyncState::PendingCreate) => RemoteStatus::Skipped,
            Some(_) if !ctx.catalog.is_configured() => RemoteStatus::LocalOnly,
            Some(_) => self.push_delete(id).await?,
        };

        if state.is_some() {
            info!(asset = id, revoked, "Asset deleted locally");
        }

        Ok((
            MutationReport {
                id: id.to_string(),
                remote,
            },
            state.is_some() || listed,
        ))
    }
}

/// Tags sans espaces superflus, sans vides et sans doublons (casse ignorée)
fn normalize_tags(tags: Vec<String>) -> Vec<String> {
    let mut seen = HashSet::new();
    tags.into_iter()
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty() && seen.insert(t.to_lowercase()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_normalize_tags() {
        let tags = vec![
            " chair ".to_string(),
            "".to_string(),
            "Chair".to_string(),
            "wood".to_string(),
        ];
        assert_eq!(normalize_tags(tags), vec!["chair", "wood"]);
    }
}
