//! Poussée des modifications locales vers le catalogue distant
//!
//! Une modification est toujours écrite localement et marquée en attente
//! avant d'être poussée. Un échec transitoire laisse la marque en place ; la
//! synchronisation suivante rejoue l'appel.
//!
//! Un asset n'a jamais plus d'une poussée en cours. Les modifications faites
//! pendant ce temps sont rattachées à la poussée et restent en attente une
//! fois sa réponse enregistrée.

use crate::engine::AssetSync;
use crate::error::Result;
use crate::events::{RemoteOp, SyncEvent};
use crate::inflight::Flight;
use crate::report::{MutationReport, RemoteStatus};
use mvasset::{Asset, AssetPatch, PayloadSet};
use mvstore::{PendingAsset, SyncState};
use tracing::{debug, info, warn};

impl AssetSync {
    /// Rejoue les suppressions et modifications restées en attente
    ///
    /// S'arrête au premier échec transitoire : inutile d'insister sur un
    /// catalogue injoignable. Retourne le nombre de poussées réussies.
    pub async fn push_pending(&self) -> Result<usize> {
        let _guard = self.inner.sync_lock.lock().await;
        self.push_pending_locked().await
    }

    pub(crate) async fn push_pending_locked(&self) -> Result<usize> {
        let ctx = &self.inner.ctx;
        if !ctx.catalog.is_configured() {
            return Ok(0);
        }

        let mut pushed = 0;

        for id in ctx.store.tombstones().await? {
            if self.inner.deletes.in_progress(&id) {
                continue;
            }
            match self.push_delete(&id).await? {
                RemoteStatus::Pushed => pushed += 1,
                RemoteStatus::Unreachable(_) => return Ok(pushed),
                _ => {}
            }
        }

        for entry in ctx.store.pending().await? {
            let Some(flight) = self.inner.pushes.begin(&entry.asset.id, None) else {
                debug!(asset = %entry.asset.id, "Push already in flight, leaving it alone");
                continue;
            };
            debug!(asset = %entry.asset.id, state = entry.state.as_str(), "Replaying pending change");
            match self.push_entry(&entry, None, None, &flight).await?.remote {
                RemoteStatus::Pushed => pushed += 1,
                RemoteStatus::Unreachable(_) => break,
                _ => {}
            }
        }

        if pushed > 0 {
            info!("Pushed {} pending changes to catalog", pushed);
        }
        Ok(pushed)
    }

    /// Poussée qui suit immédiatement une écriture locale
    pub(crate) async fn push_after_write(
        &self,
        entry: &PendingAsset,
        patch: Option<&AssetPatch>,
        files: Option<&PayloadSet>,
    ) -> Result<MutationReport> {
        if !self.inner.ctx.catalog.is_configured() {
            return Ok(self.queued(&entry.asset.id));
        }

        // Une synchronisation pousse déjà cet asset : la modification la suivra
        let follow_up = (entry.state != SyncState::PendingCreate).then_some(entry.state);
        let Some(flight) = self.inner.pushes.begin(&entry.asset.id, follow_up) else {
            return Ok(self.queued(&entry.asset.id));
        };
        self.push_entry(entry, patch, files, &flight).await
    }

    /// Rapport d'une modification gardée localement pour une poussée ultérieure
    pub(crate) fn queued(&self, id: &str) -> MutationReport {
        let remote = if self.inner.ctx.catalog.is_configured() {
            RemoteStatus::Queued
        } else {
            RemoteStatus::LocalOnly
        };
        MutationReport {
            id: id.to_string(),
            remote,
        }
    }

    /// Pousse une entrée en attente selon son état
    ///
    /// `patch` et `files` restreignent l'envoi à ce qui vient de changer ;
    /// sans eux, l'enregistrement complet et tous les binaires stockés sont
    /// renvoyés pour rattraper les modifications cumulées.
    async fn push_entry(
        &self,
        entry: &PendingAsset,
        patch: Option<&AssetPatch>,
        files: Option<&PayloadSet>,
        flight: &Flight<'_>,
    ) -> Result<MutationReport> {
        let ctx = &self.inner.ctx;
        let asset = &entry.asset;

        let (op, result) = match entry.state {
            SyncState::Synced => {
                return Ok(MutationReport {
                    id: asset.id.clone(),
                    remote: RemoteStatus::Skipped,
                })
            }
            SyncState::PendingCreate => {
                let payloads = ctx.store.get_payloads(&asset.id).await?;
                (RemoteOp::Create, ctx.catalog.create(asset, &payloads).await)
            }
            SyncState::PendingUpdate => {
                let result = match patch {
                    Some(patch) => ctx.catalog.update_metadata(&asset.id, patch).await,
                    None => {
                        let full = AssetPatch::from_asset(asset);
                        ctx.catalog.update_metadata(&asset.id, &full).await
                    }
                };
                (RemoteOp::UpdateMetadata, result)
            }
            SyncState::PendingFiles => {
                let result = match files {
                    Some(files) => ctx.catalog.update_files(&asset.id, patch, files).await,
                    None => {
                        let stored = ctx.store.get_payloads(&asset.id).await?;
                        let full = AssetPatch::from_asset(asset);
                        ctx.catalog.update_files(&asset.id, Some(&full), &stored).await
                    }
                };
                (RemoteOp::UpdateFiles, result)
            }
        };

        match result {
            Ok(remote) => {
                let id = self
                    .adopt_remote(asset, remote, op, flight.take_follow_up())
                    .await?;
                Ok(MutationReport {
                    id,
                    remote: RemoteStatus::Pushed,
                })
            }
            Err(err) => {
                let status = RemoteStatus::from_error(&err);

                // Une création refusée reste en attente : l'asset n'existe que localement
                if matches!(status, RemoteStatus::Rejected { .. }) && op != RemoteOp::Create {
                    warn!(asset = %asset.id, %op, "Catalog refused change, dropping it from retry queue");
                    ctx.store
                        .settle(&asset.id, asset, asset, flight.take_follow_up())
                        .await?;
                }

                if status.is_failure() {
                    self.emit(SyncEvent::RemotePushFailed {
                        id: asset.id.clone(),
                        op,
                        reason: err.to_string(),
                    });
                }

                Ok(MutationReport {
                    id: asset.id.clone(),
                    remote: status,
                })
            }
        }
    }

    /// Suppression distante d'un asset déjà retiré localement
    ///
    /// La pierre tombale est levée si le catalogue confirme ou refuse
    /// définitivement ; elle reste en place sur un échec transitoire.
    pub(crate) async fn push_delete(&self, id: &str) -> Result<RemoteStatus> {
        let ctx = &self.inner.ctx;

        match ctx.catalog.delete(id).await {
            Ok(existed) => {
                ctx.store.clear_tombstone(id).await?;
                if !existed {
                    debug!(asset = id, "Asset was already absent from catalog");
                }
                Ok(RemoteStatus::Pushed)
            }
            Err(err) => {
                let status = RemoteStatus::from_error(&err);
                if let RemoteStatus::Rejected { .. } = status {
                    warn!(asset = id, "Catalog refused deletion, giving up");
                    ctx.store.clear_tombstone(id).await?;
                }
                if status.is_failure() {
                    self.emit(SyncEvent::RemotePushFailed {
                        id: id.to_string(),
                        op: RemoteOp::Delete,
                        reason: err.to_string(),
                    });
                }
                Ok(status)
            }
        }
    }

    /// Enregistre la version confirmée par le catalogue
    ///
    /// Les modifications locales faites pendant la poussée sont conservées et
    /// restent en attente. Retourne l'identifiant final de l'asset.
    async fn adopt_remote(
        &self,
        sent: &Asset,
        remote: Asset,
        op: RemoteOp,
        follow_up: Option<SyncState>,
    ) -> Result<String> {
        let ctx = &self.inner.ctx;
        let local_id = sent.id.as_str();

        let mut remote = remote;
        if remote.id.is_empty() {
            remote.id = local_id.to_string();
        }

        let Some((stored, state)) = ctx.store.settle(local_id, sent, &remote, follow_up).await? else {
            // Supprimé localement pendant la création : la copie distante doit partir aussi
            if op == RemoteOp::Create {
                self.discard_remote_copy(&remote.id).await?;
            }
            return Ok(remote.id);
        };
        if state.is_pending() {
            debug!(asset = %stored.id, state = state.as_str(), "Local changes made during push stay pending");
        }

        let id = stored.id.clone();
        if id == local_id {
            self.upsert_in_list(stored);
            return Ok(id);
        }

        // Le catalogue a attribué son propre identifiant : l'entrée locale a migré
        ctx.handles.revoke_all(local_id);
        info!(from = local_id, to = %id, "Catalog assigned a new asset id");
        self.replace_in_list(local_id, stored);
        self.emit(SyncEvent::AssetRemoved {
            id: local_id.to_string(),
        });
        self.emit(SyncEvent::AssetChanged { id: id.clone() });
        Ok(id)
    }

    async fn discard_remote_copy(&self, id: &str) -> Result<()> {
        info!(asset = id, "Asset deleted while its creation was in flight, removing remote copy");
        let ctx = &self.inner.ctx;

        self.inner.deletes.begin(id);
        let result: Result<RemoteStatus> = async {
            ctx.store.remember_deletion(id).await?;
            self.push_delete(id).await
        }
        .await;
        self.inner.deletes.finish(id);
        result.map(|_| ())
    }
}
