//! Orchestrateur : liste en mémoire, démarrage et synchronisation
//!
//! La liste en mémoire est la vue que le reste de l'application consulte.
//! Elle n'est modifiée que par les méthodes de [`AssetSync`] : remplacement
//! complet à chaque réconciliation, retouches ponctuelles après une écriture.

use crate::busy::BusyState;
use crate::context::SyncContext;
use crate::error::{Result, SyncError};
use crate::events::SyncEvent;
use crate::inflight::{InFlight, RecentDeletes};
use crate::report::{FullAsset, SyncSummary};
use crate::scheduler::Scheduler;
use indexmap::IndexMap;
use mvasset::{Asset, Payload, PayloadSet, Slot};
use mvhandles::Handle;
use std::collections::{BTreeMap, HashSet};
use std::sync::{Arc, RwLock, Weak};
use tokio::sync::{broadcast, watch, Mutex as AsyncMutex, Notify};
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 256;

pub(crate) struct SyncInner {
    pub(crate) ctx: SyncContext,
    assets: RwLock<Vec<Asset>>,
    /// Sérialise les synchronisations : jamais deux tirages simultanés
    pub(crate) sync_lock: AsyncMutex<()>,
    pub(crate) busy: BusyState,
    pub(crate) pushes: InFlight,
    pub(crate) deletes: RecentDeletes,
    events: broadcast::Sender<SyncEvent>,
    focus: Arc<Notify>,
    scheduler: Scheduler,
}

/// Moteur de synchronisation des assets
///
/// Point d'entrée unique du reste de l'application. Le type est peu coûteux
/// à cloner : les clones partagent le même état.
///
/// # Exemple
///
/// ```rust,no_run
/// use mvsync::{AssetSync, SyncContext};
///
/// #[tokio::main]
/// async fn main() -> anyhow::Result<()> {
///     let engine = AssetSync::start(SyncContext::offline()?).await?;
///     for asset in engine.list_assets() {
///         println!("{}", asset.name);
///     }
///     engine.shutdown().await;
///     Ok(())
/// }
/// ```
#[derive(Clone)]
pub struct AssetSync {
    pub(crate) inner: Arc<SyncInner>,
}

impl AssetSync {
    /// Crée le moteur sans rien charger ni lancer
    pub fn new(ctx: SyncContext) -> Self {
        Self {
            inner: Arc::new(SyncInner {
                ctx,
                assets: RwLock::new(Vec::new()),
                sync_lock: AsyncMutex::new(()),
                busy: BusyState::new(),
                pushes: InFlight::default(),
                deletes: RecentDeletes::default(),
                events: broadcast::channel(EVENT_CAPACITY).0,
                focus: Arc::new(Notify::new()),
                scheduler: Scheduler::new(),
            }),
        }
    }

    /// Séquence de démarrage complète puis lancement des tâches de fond
    pub async fn start(ctx: SyncContext) -> Result<Self> {
        let engine = Self::new(ctx);
        engine.load().await?;
        engine.spawn_background();
        Ok(engine)
    }

    /// Charge le cache local puis tente un premier tirage du catalogue
    ///
    /// Si le catalogue ne répond pas, la liste reste celle du cache local :
    /// un démarrage à froid hors ligne donne une liste vide, pas une erreur.
    pub async fn load(&self) -> Result<SyncSummary> {
        let local = self.inner.ctx.store.list_metadata().await?;
        info!("Loaded {} assets from local store", local.len());
        self.replace_list(local);

        match self.run_sync(true).await {
            Ok(summary) => Ok(summary.unwrap_or_default()),
            Err(SyncError::Catalog(e)) => {
                warn!("Initial sync failed, using local cache: {}", e);
                Ok(SyncSummary {
                    assets: self.len(),
                    ..Default::default()
                })
            }
            Err(e) => Err(e),
        }
    }

    /// Lance la synchronisation périodique et celle déclenchée par le focus
    pub fn spawn_background(&self) {
        let scheduler = &self.inner.scheduler;
        let period = self.inner.ctx.settings.interval;

        let weak = Arc::downgrade(&self.inner);
        scheduler.every("periodic-sync", period, move || {
            background_pass(weak.clone(), "timer")
        });

        let weak = Arc::downgrade(&self.inner);
        scheduler.on_signal("focus-sync", self.inner.focus.clone(), move || {
            background_pass(weak.clone(), "focus")
        });

        info!(?period, "Background synchronization started");
    }

    /// Arrête les tâches de fond et révoque tous les handles
    pub async fn shutdown(&self) {
        self.inner.scheduler.shutdown().await;
        self.inner.ctx.handles.clear();
        info!("Asset synchronization stopped");
    }

    /// L'application a retrouvé le focus : un tirage silencieux immédiat
    pub fn notify_focus(&self) {
        self.inner.focus.notify_one();
    }

    /// Instantané de la liste en mémoire
    pub fn list_assets(&self) -> Vec<Asset> {
        self.read_list().clone()
    }

    pub fn asset(&self, id: &str) -> Option<Asset> {
        self.read_list().iter().find(|a| a.id == id).cloned()
    }

    pub fn len(&self) -> usize {
        self.read_list().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Vrai pendant une opération initiée par l'utilisateur
    pub fn busy(&self) -> bool {
        self.inner.busy.is_busy()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.inner.busy.subscribe()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.inner.events.subscribe()
    }

    pub fn context(&self) -> &SyncContext {
        &self.inner.ctx
    }

    /// Octets désignés par un handle vivant
    pub fn resolve_handle(&self, handle: &str) -> Option<Payload> {
        self.inner.ctx.handles.resolve(handle)
    }

    /// Rafraîchissement demandé par l'utilisateur
    ///
    /// Lève l'indicateur d'activité, attend une synchronisation en cours le cas
    /// échéant et remonte l'échec du catalogue.
    pub async fn refresh(&self) -> Result<SyncSummary> {
        let _busy = self.inner.busy.enter();
        Ok(self.run_sync(true).await?.unwrap_or_default())
    }

    /// Synchronisation silencieuse
    ///
    /// Retourne `Ok(None)` sans rien faire si une synchronisation est déjà en cours.
    pub async fn sync(&self) -> Result<Option<SyncSummary>> {
        self.run_sync(false).await
    }

    /// Métadonnées et handles vivants pour chaque binaire disponible
    ///
    /// Un asset absent du cache local est demandé au catalogue ; un binaire
    /// absent localement est téléchargé par son URL puis mis en cache.
    /// `force_regenerate` remplace les handles existants (consommateur qui ne
    /// parvient plus à résoudre le sien).
    pub async fn get_asset_full(&self, id: &str, force_regenerate: bool) -> Result<Option<FullAsset>> {
        let ctx = &self.inner.ctx;

        let asset = match ctx.store.get_metadata(id).await? {
            Some(asset) => asset,
            None => match self.pull_one(id).await? {
                Some(asset) => asset,
                None => return Ok(None),
            },
        };

        let mut handles = BTreeMap::new();
        let mut fetched = PayloadSet::new();
        for slot in Slot::ALL {
            let payload = match ctx.store.get_payload(id, slot).await? {
                Some(payload) => Some(payload),
                None => {
                    let payload = self.fetch_remote_payload(&asset, slot).await;
                    if let Some(p) = &payload {
                        fetched.insert(slot, p.clone());
                    }
                    payload
                }
            };

            if let Some(payload) = payload {
                let handle = ctx.handles.get_or_create(id, slot, &payload, force_regenerate);
                handles.insert(slot, handle);
            }
        }

        if !fetched.is_empty() {
            // Le binaire reste servi même si sa mise en cache échoue
            if let Err(e) = ctx.store.put_asset(&asset, &fetched).await {
                warn!(asset = id, "Failed to cache downloaded payloads: {}", e);
            }
        }

        Ok(Some(FullAsset { asset, handles }))
    }

    pub(crate) async fn run_sync(&self, wait: bool) -> Result<Option<SyncSummary>> {
        let _guard = if wait {
            self.inner.sync_lock.lock().await
        } else {
            match self.inner.sync_lock.try_lock() {
                Ok(guard) => guard,
                Err(_) => {
                    debug!("Sync already running, skipping");
                    return Ok(None);
                }
            }
        };

        self.sync_locked().await.map(Some)
    }

    /// Pousse les modifications en attente, tire le catalogue et réconcilie
    async fn sync_locked(&self) -> Result<SyncSummary> {
        let ctx = &self.inner.ctx;
        self.inner.deletes.new_generation();

        if !ctx.catalog.is_configured() {
            let local = ctx.store.list_metadata().await?;
            let count = local.len();
            self.replace_list(local);
            return Ok(SyncSummary {
                assets: count,
                ..Default::default()
            });
        }

        let pushed = self.push_pending_locked().await?;

        let remote = match ctx.catalog.list().await {
            Ok(remote) => remote,
            Err(e) => {
                self.emit(SyncEvent::SyncFailed {
                    reason: e.to_string(),
                });
                return Err(e.into());
            }
        };

        let tombstones: HashSet<String> = ctx.store.tombstones().await?.into_iter().collect();
        let mut remote: Vec<Asset> = remote
            .into_iter()
            .filter(|a| !tombstones.contains(&a.id) && !self.inner.deletes.contains(&a.id))
            .collect();

        let update = ctx.store.put_metadata_only(&remote).await?;
        for (id, slot) in &update.stale {
            ctx.handles.revoke(id, *slot);
        }

        // Supprimé pendant l'écriture : la suppression l'emporte sur la liste tirée avant elle
        let mut undone = Vec::new();
        for asset in &remote {
            if self.inner.deletes.contains(&asset.id) {
                ctx.store.delete_asset(&asset.id).await?;
                undone.push(asset.id.clone());
            }
        }
        if !undone.is_empty() {
            debug!(?undone, "Kept assets deleted during sync out of the store");
            remote.retain(|a| !undone.contains(&a.id));
        }

        if ctx.settings.download_payloads {
            for asset in &remote {
                self.download_missing(asset).await?;
            }
        }

        let ids: Vec<String> = remote.iter().map(|a| a.id.clone()).collect();
        let removed = ctx.store.retain_only(&ids).await?;
        for id in &removed {
            ctx.handles.revoke_all(id);
            self.emit(SyncEvent::AssetRemoved { id: id.clone() });
        }

        // Le catalogue fait foi, sauf pour les modifications locales pas encore poussées
        let mut merged: IndexMap<String, Asset> =
            remote.into_iter().map(|a| (a.id.clone(), a)).collect();
        for entry in ctx.store.pending().await? {
            merged.insert(entry.asset.id.clone(), entry.asset);
        }

        let count = self.replace_list_after_sync(merged.into_values().collect());
        self.emit(SyncEvent::Synced { count });
        debug!(count, pushed, removed = removed.len(), "Synchronization done");

        Ok(SyncSummary {
            assets: count,
            pushed,
            removed: removed.len(),
        })
    }

    async fn silent_sync(&self, trigger: &'static str) {
        match self.run_sync(false).await {
            Ok(Some(summary)) => debug!(trigger, assets = summary.assets, "Background sync done"),
            Ok(None) => {}
            Err(e) => warn!(trigger, "Background sync failed: {}", e),
        }
    }

    /// Demande un asset inconnu localement au catalogue
    async fn pull_one(&self, id: &str) -> Result<Option<Asset>> {
        let ctx = &self.inner.ctx;
        if !ctx.catalog.is_configured() {
            return Ok(None);
        }

        match ctx.catalog.get(id).await {
            Ok(Some(remote)) => {
                // Zéro écriture : asset supprimé localement, suppression pas encore confirmée
                let update = ctx.store.put_metadata_only(std::slice::from_ref(&remote)).await?;
                if update.written == 0 {
                    return Ok(None);
                }
                for (id, slot) in &update.stale {
                    ctx.handles.revoke(id, *slot);
                }
                self.upsert_in_list(remote.clone());
                Ok(Some(remote))
            }
            Ok(None) => Ok(None),
            Err(e) => {
                debug!(asset = id, "Cannot pull asset from catalog: {}", e);
                Ok(None)
            }
        }
    }

    async fn fetch_remote_payload(&self, asset: &Asset, slot: Slot) -> Option<Payload> {
        let ctx = &self.inner.ctx;
        let url = asset.resources.get(slot)?;
        if Handle::is_handle(url) || !ctx.catalog.is_configured() {
            return None;
        }

        match ctx.catalog.fetch_payload(url).await {
            Ok(data) => Some(Payload::new(file_name_from_url(url, slot), data)),
            Err(e) => {
                debug!(asset = %asset.id, %slot, "Payload download failed: {}", e);
                None
            }
        }
    }

    /// Télécharge les binaires référencés mais absents du cache local
    async fn download_missing(&self, asset: &Asset) -> Result<()> {
        let ctx = &self.inner.ctx;
        let present = ctx.store.payload_slots(&asset.id).await?;

        let mut fetched = PayloadSet::new();
        for slot in Slot::ALL {
            if present.contains(&slot) {
                continue;
            }
            if let Some(payload) = self.fetch_remote_payload(asset, slot).await {
                fetched.insert(slot, payload);
            }
        }

        if !fetched.is_empty() {
            debug!(asset = %asset.id, slots = fetched.len(), "Downloaded missing payloads");
            ctx.store.put_asset(asset, &fetched).await?;
        }
        Ok(())
    }

    pub(crate) fn emit(&self, event: SyncEvent) {
        // Aucun abonné : l'évènement est simplement perdu
        let _ = self.inner.events.send(event);
    }

    fn read_list(&self) -> std::sync::RwLockReadGuard<'_, Vec<Asset>> {
        self.inner.assets.read().unwrap_or_else(|p| p.into_inner())
    }

    fn write_list(&self) -> std::sync::RwLockWriteGuard<'_, Vec<Asset>> {
        self.inner.assets.write().unwrap_or_else(|p| p.into_inner())
    }

    /// Remplace la liste, en éliminant les doublons d'identifiant
    pub(crate) fn replace_list(&self, assets: Vec<Asset>) {
        let unique: IndexMap<String, Asset> =
            assets.into_iter().map(|a| (a.id.clone(), a)).collect();
        *self.write_list() = unique.into_values().collect();
    }

    /// Comme [`AssetSync::replace_list`], sans les assets supprimés pendant la synchronisation
    ///
    /// Le filtre est appliqué sous le verrou de la liste : une suppression
    /// concurrente passe soit avant (et est filtrée), soit après.
    fn replace_list_after_sync(&self, assets: Vec<Asset>) -> usize {
        let mut list = self.write_list();
        let unique: IndexMap<String, Asset> = assets
            .into_iter()
            .filter(|a| !self.inner.deletes.contains(&a.id))
            .map(|a| (a.id.clone(), a))
            .collect();
        *list = unique.into_values().collect();
        list.len()
    }

    /// Remplace l'entrée de même identifiant, ou l'ajoute en fin de liste
    pub(crate) fn upsert_in_list(&self, asset: Asset) {
        let mut list = self.write_list();
        match list.iter_mut().find(|a| a.id == asset.id) {
            Some(existing) => *existing = asset,
            None => list.push(asset),
        }
    }

    /// Remplace l'entrée `old_id` par `asset` (identifiant attribué par le catalogue)
    pub(crate) fn replace_in_list(&self, old_id: &str, asset: Asset) {
        let mut list = self.write_list();
        list.retain(|a| a.id != asset.id);
        match list.iter_mut().find(|a| a.id == old_id) {
            Some(existing) => *existing = asset,
            None => list.push(asset),
        }
    }

    pub(crate) fn remove_from_list(&self, id: &str) -> bool {
        let mut list = self.write_list();
        let before = list.len();
        list.retain(|a| a.id != id);
        list.len() != before
    }
}

/// Un passage de synchronisation de fond ; `false` si le moteur a disparu
async fn background_pass(weak: Weak<SyncInner>, trigger: &'static str) -> bool {
    let Some(inner) = weak.upgrade() else {
        return false;
    };
    AssetSync { inner }.silent_sync(trigger).await;
    true
}

/// Nom de fichier à partir de l'URL d'une ressource
fn file_name_from_url(url: &str, slot: Slot) -> String {
    let path = url.split(|c| c == '?' || c == '#').next().unwrap_or(url);
    match path.rsplit('/').next() {
        Some(name) if !name.is_empty() => name.to_string(),
        _ => format!("{slot}.bin"),
    }
}
