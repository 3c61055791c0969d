#![allow(dead_code)]

use async_trait::async_trait;
use bytes::Bytes;
use mvasset::{Asset, AssetPatch, Payload, PayloadSet, Slot};
use mvcatalog::{CatalogError, CatalogResult, RemoteCatalog};
use mvhandles::HandleCache;
use mvstore::AssetStore;
use mvsync::{AssetSync, SyncContext};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex};
use tokio::sync::{Notify, Semaphore};

pub const BASE: &str = "http://catalog.test";

#[derive(Default)]
struct FakeState {
    assets: Vec<Asset>,
    files: HashMap<String, Bytes>,
    failure: Option<CatalogError>,
    refuse_delete: HashSet<String>,
    assign_ids: bool,
    next_id: usize,
    calls: Vec<String>,
    gates: HashMap<&'static str, Arc<Gate>>,
}

/// Retient le prochain appel d'une opération jusqu'à son ouverture
pub struct Gate {
    arrived: Notify,
    open: Semaphore,
}

impl Gate {
    fn new() -> Self {
        Self {
            arrived: Notify::new(),
            open: Semaphore::new(0),
        }
    }

    /// Attend que l'appel retenu soit arrivé
    pub async fn reached(&self) {
        self.arrived.notified().await;
    }

    pub fn release(&self) {
        self.open.add_permits(1);
    }

    async fn pass(&self) {
        self.arrived.notify_one();
        if let Ok(permit) = self.open.acquire().await {
            permit.forget();
        }
    }
}

/// Catalogue en mémoire, avec pannes et refus programmables
#[derive(Default)]
pub struct FakeCatalog {
    state: Mutex<FakeState>,
}

impl FakeCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Le catalogue attribue ses propres identifiants à la création
    pub fn assigning_ids() -> Arc<Self> {
        let fake = Self::default();
        fake.lock().assign_ids = true;
        Arc::new(fake)
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeState> {
        self.state.lock().unwrap()
    }

    pub fn go_offline(&self) {
        self.lock().failure = Some(CatalogError::Unreachable("connection refused".into()));
    }

    pub fn go_online(&self) {
        self.lock().failure = None;
    }

    pub fn refuse_delete_of(&self, id: &str) {
        self.lock().refuse_delete.insert(id.to_string());
    }

    /// Ajoute un asset côté distant, avec son modèle téléchargeable
    pub fn seed(&self, id: &str, name: &str, model: &'static [u8]) {
        let mut state = self.lock();
        let url = format!("{BASE}/uploads/{id}.glb");
        let mut asset = Asset::new(id, name);
        asset.resources.model_url = Some(url.clone());
        state.files.insert(url, Bytes::from_static(model));
        state.assets.push(asset);
    }

    /// Remplace le modèle distant ; il est publié sous une nouvelle URL
    pub fn replace_model(&self, id: &str, model: &'static [u8]) {
        let mut state = self.lock();
        let url = format!("{BASE}/uploads/{id}-r{}.glb", state.files.len());
        state.files.insert(url.clone(), Bytes::from_static(model));
        if let Some(asset) = state.assets.iter_mut().find(|a| a.id == id) {
            asset.resources.model_url = Some(url);
        }
    }

    /// Retient le prochain appel de `op` (`"list"` ou `"create"`)
    pub fn hold(&self, op: &'static str) -> Arc<Gate> {
        let gate = Arc::new(Gate::new());
        self.lock().gates.insert(op, gate.clone());
        gate
    }

    async fn gate(&self, op: &str) {
        let gate = self.lock().gates.remove(op);
        if let Some(gate) = gate {
            gate.pass().await;
        }
    }

    pub fn remove(&self, id: &str) {
        self.lock().assets.retain(|a| a.id != id);
    }

    pub fn assets(&self) -> Vec<Asset> {
        self.lock().assets.clone()
    }

    pub fn remote(&self, id: &str) -> Option<Asset> {
        self.lock().assets.iter().find(|a| a.id == id).cloned()
    }

    pub fn calls(&self) -> Vec<String> {
        self.lock().calls.clone()
    }

    pub fn count_calls(&self, prefix: &str) -> usize {
        self.lock().calls.iter().filter(|c| c.starts_with(prefix)).count()
    }

    fn begin(&self, call: String) -> CatalogResult<std::sync::MutexGuard<'_, FakeState>> {
        let mut state = self.lock();
        state.calls.push(call);
        if let Some(err) = state.failure.clone() {
            return Err(err);
        }
        Ok(state)
    }
}

fn store_files(state: &mut FakeState, asset: &mut Asset, payloads: &PayloadSet) {
    for (slot, payload) in payloads.iter() {
        let url = format!("{BASE}/uploads/{}-{}", asset.id, payload.file_name);
        state.files.insert(url.clone(), payload.data.clone());
        asset.resources.set(slot, Some(url));
    }
}

fn not_found(id: &str) -> CatalogError {
    CatalogError::from_status_code(404, format!("no asset {id}"))
}

#[async_trait]
impl RemoteCatalog for FakeCatalog {
    fn is_configured(&self) -> bool {
        true
    }

    fn base_url(&self) -> Option<&str> {
        Some(BASE)
    }

    async fn list(&self) -> CatalogResult<Vec<Asset>> {
        // La liste est tirée avant l'attente, comme une réponse encore en route
        let assets = self.begin("list".into())?.assets.clone();
        self.gate("list").await;
        Ok(assets)
    }

    async fn get(&self, id: &str) -> CatalogResult<Option<Asset>> {
        let state = self.begin(format!("get {id}"))?;
        Ok(state.assets.iter().find(|a| a.id == id).cloned())
    }

    async fn create(&self, asset: &Asset, payloads: &PayloadSet) -> CatalogResult<Asset> {
        self.gate("create").await;
        let mut state = self.begin(format!("create {}", asset.id))?;
        let mut created = asset.clone();
        if state.assign_ids {
            state.next_id += 1;
            created.id = format!("srv-{}", state.next_id);
        }
        if state.assets.iter().any(|a| a.id == created.id) {
            return Err(CatalogError::from_status_code(409, "duplicate id"));
        }
        store_files(&mut state, &mut created, payloads);
        state.assets.push(created.clone());
        Ok(created)
    }

    async fn update_metadata(&self, id: &str, patch: &AssetPatch) -> CatalogResult<Asset> {
        let mut state = self.begin(format!("update_metadata {id}"))?;
        let asset = state
            .assets
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or_else(|| not_found(id))?;
        patch.apply_to(asset);
        Ok(asset.clone())
    }

    async fn update_files(
        &self,
        id: &str,
        patch: Option<&AssetPatch>,
        payloads: &PayloadSet,
    ) -> CatalogResult<Asset> {
        let mut state = self.begin(format!("update_files {id}"))?;
        let index = state
            .assets
            .iter()
            .position(|a| a.id == id)
            .ok_or_else(|| not_found(id))?;

        let mut asset = state.assets[index].clone();
        if let Some(patch) = patch {
            patch.apply_to(&mut asset);
        }
        store_files(&mut state, &mut asset, payloads);
        state.assets[index] = asset.clone();
        Ok(asset)
    }

    async fn delete(&self, id: &str) -> CatalogResult<bool> {
        let mut state = self.begin(format!("delete {id}"))?;
        if state.refuse_delete.contains(id) {
            return Err(CatalogError::from_status_code(403, "read-only asset"));
        }
        let before = state.assets.len();
        state.assets.retain(|a| a.id != id);
        Ok(state.assets.len() != before)
    }

    async fn is_reachable(&self) -> bool {
        self.lock().failure.is_none()
    }

    async fn fetch_payload(&self, url: &str) -> CatalogResult<Bytes> {
        let state = self.begin(format!("fetch {url}"))?;
        state
            .files
            .get(url)
            .cloned()
            .ok_or_else(|| CatalogError::from_status_code(404, "no such file"))
    }
}

pub fn context(fake: &Arc<FakeCatalog>) -> SyncContext {
    SyncContext::new(
        fake.clone(),
        AssetStore::open_in_memory().unwrap(),
        Arc::new(HandleCache::default()),
    )
}

/// Moteur chargé mais sans tâches de fond
pub async fn engine(fake: &Arc<FakeCatalog>) -> AssetSync {
    let engine = AssetSync::new(context(fake));
    engine.load().await.unwrap();
    engine
}

pub fn model(name: &str, bytes: &'static [u8]) -> PayloadSet {
    PayloadSet::with_model(Payload::new(name, Bytes::from_static(bytes)))
}

pub fn thumbnail(bytes: &'static [u8]) -> Payload {
    Payload::new("thumb.png", Bytes::from_static(bytes)).with_content_type("image/png")
}

pub fn ids(assets: &[Asset]) -> Vec<String> {
    assets.iter().map(|a| a.id.clone()).collect()
}

pub fn slot_bytes(set: &PayloadSet, slot: Slot) -> Option<Bytes> {
    set.get(slot).map(|p| p.data.clone())
}
