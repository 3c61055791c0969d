//! Cache borné des handles de ressources
//!
//! Un handle par clé (asset, emplacement). Au-delà de la capacité, l'entrée
//! la plus anciennement créée est évincée et son handle révoqué. L'ordre est
//! celui des créations, pas celui des accès : une réutilisation ne rajeunit
//! pas l'entrée.
//!
//! L'ordre de création est tenu dans une file de positions numérotées. Une
//! révocation ne retire que l'entrée de la table ; sa position devient périmée
//! et sera sautée à l'éviction, ou purgée quand la file dépasse deux fois la
//! capacité.

use crate::handle::{Handle, HandleRegistry};
use mvasset::{Payload, Slot};
use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use tracing::{debug, trace};

/// Capacité par défaut du cache
pub const DEFAULT_CAPACITY: usize = 50;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
struct HandleKey {
    id: String,
    slot: Slot,
}

impl HandleKey {
    fn new(id: &str, slot: Slot) -> Self {
        Self {
            id: id.to_string(),
            slot,
        }
    }
}

/// Compteurs d'activité du cache
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HandleStats {
    /// Handles vivants
    pub live: usize,
    pub created: u64,
    pub reused: u64,
    /// Révocations dues à la capacité
    pub evicted: u64,
    /// Révocations explicites (régénération, suppression d'asset, vidage)
    pub revoked: u64,
}

#[derive(Debug)]
struct Entry {
    handle: Handle,
    seq: u64,
}

#[derive(Debug, Default)]
struct CacheInner {
    entries: HashMap<HandleKey, Entry>,
    /// Positions de création, les plus anciennes en tête
    order: VecDeque<(HandleKey, u64)>,
    next_seq: u64,
    stats: HandleStats,
}

impl CacheInner {
    fn insert(&mut self, key: HandleKey, handle: Handle) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.order.push_back((key.clone(), seq));
        self.entries.insert(key, Entry { handle, seq });
    }

    fn remove(&mut self, key: &HandleKey) -> Option<Handle> {
        self.entries.remove(key).map(|entry| entry.handle)
    }

    /// Retire l'entrée vivante la plus anciennement créée
    fn pop_oldest(&mut self) -> Option<(HandleKey, Handle)> {
        while let Some((key, seq)) = self.order.pop_front() {
            if self.entries.get(&key).is_some_and(|e| e.seq == seq) {
                let handle = self.remove(&key)?;
                return Some((key, handle));
            }
        }
        None
    }

    fn compact(&mut self, capacity: usize) {
        if self.order.len() > 2 * capacity {
            let entries = &self.entries;
            self.order
                .retain(|(key, seq)| entries.get(key).is_some_and(|e| e.seq == *seq));
        }
    }
}

/// Cache borné des handles, seul propriétaire des liaisons handle → binaire
#[derive(Debug)]
pub struct HandleCache {
    inner: Mutex<CacheInner>,
    registry: Arc<HandleRegistry>,
    capacity: usize,
}

impl Default for HandleCache {
    fn default() -> Self {
        Self::new(DEFAULT_CAPACITY)
    }
}

impl HandleCache {
    /// Crée un cache de `capacity` entrées (au moins une)
    pub fn new(capacity: usize) -> Self {
        Self {
            inner: Mutex::new(CacheInner::default()),
            registry: Arc::new(HandleRegistry::new()),
            capacity: capacity.max(1),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, CacheInner> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Retourne le handle de (`id`, `slot`), en le créant depuis `payload` si besoin
    ///
    /// Avec `force_regenerate`, le handle existant est révoqué et un nouveau est
    /// alloué à partir des mêmes octets ; il prend alors la place la plus récente
    /// dans l'ordre d'éviction.
    pub fn get_or_create(
        &self,
        id: &str,
        slot: Slot,
        payload: &Payload,
        force_regenerate: bool,
    ) -> Handle {
        let key = HandleKey::new(id, slot);
        let mut inner = self.lock();

        if let Some(existing) = inner.entries.get(&key).map(|e| e.handle.clone()) {
            if !force_regenerate && self.registry.contains(existing.as_str()) {
                inner.stats.reused += 1;
                trace!(asset = id, %slot, "Reusing handle");
                return existing;
            }

            inner.remove(&key);
            self.registry.revoke(&existing);
            inner.stats.revoked += 1;
            debug!(asset = id, %slot, "Regenerating handle");
        }

        let handle = Handle::generate();
        self.registry.register(&handle, payload.clone());
        inner.insert(key, handle.clone());
        inner.stats.created += 1;

        while inner.entries.len() > self.capacity {
            let Some((evicted, old)) = inner.pop_oldest() else {
                break;
            };
            self.registry.revoke(&old);
            inner.stats.evicted += 1;
            debug!(asset = %evicted.id, slot = %evicted.slot, "Evicted oldest handle");
        }
        inner.compact(self.capacity);

        handle
    }

    /// Handle vivant de (`id`, `slot`), sans en créer
    pub fn get(&self, id: &str, slot: Slot) -> Option<Handle> {
        self.lock()
            .entries
            .get(&HandleKey::new(id, slot))
            .map(|e| e.handle.clone())
    }

    /// Révoque le handle de (`id`, `slot`), par exemple après remplacement du binaire
    pub fn revoke(&self, id: &str, slot: Slot) -> bool {
        let mut inner = self.lock();
        match inner.remove(&HandleKey::new(id, slot)) {
            Some(handle) => {
                self.registry.revoke(&handle);
                inner.stats.revoked += 1;
                inner.compact(self.capacity);
                true
            }
            None => false,
        }
    }

    /// Révoque tous les handles d'un asset ; retourne le nombre révoqué
    pub fn revoke_all(&self, id: &str) -> usize {
        let mut inner = self.lock();
        let mut revoked = 0;

        for slot in Slot::ALL {
            if let Some(handle) = inner.remove(&HandleKey::new(id, slot)) {
                self.registry.revoke(&handle);
                revoked += 1;
            }
        }

        inner.stats.revoked += revoked as u64;
        inner.compact(self.capacity);
        if revoked > 0 {
            debug!(asset = id, revoked, "Revoked asset handles");
        }
        revoked
    }

    /// Révoque tout (arrêt de l'application)
    pub fn clear(&self) {
        let mut inner = self.lock();
        let count = inner.entries.len();
        inner.entries.clear();
        inner.order.clear();
        self.registry.revoke_everything();
        inner.stats.revoked += count as u64;
    }

    /// Binaire désigné par un handle vivant
    pub fn resolve(&self, handle: &str) -> Option<Payload> {
        self.registry.resolve(handle)
    }

    /// Table de résolution partagée avec les consommateurs
    pub fn registry(&self) -> Arc<HandleRegistry> {
        Arc::clone(&self.registry)
    }

    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn stats(&self) -> HandleStats {
        let inner = self.lock();
        HandleStats {
            live: inner.entries.len(),
            ..inner.stats
        }
    }
}
