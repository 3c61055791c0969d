//! Poussées en cours et suppressions récentes
//!
//! Les écritures utilisateur poussent sans attendre le verrou de
//! synchronisation. Ces deux registres évitent qu'une synchronisation
//! concurrente rejoue une poussée déjà partie, ou réintroduise un asset que
//! l'utilisateur vient de supprimer.

use mvstore::SyncState;
use std::collections::HashMap;
use std::sync::Mutex;

/// Identifiants dont une poussée est en cours
///
/// La valeur associée cumule les modifications locales survenues pendant la
/// poussée ; elles devront être repoussées une fois la réponse reçue.
#[derive(Debug, Default)]
pub(crate) struct InFlight {
    pushes: Mutex<HashMap<String, Option<SyncState>>>,
}

impl InFlight {
    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, Option<SyncState>>> {
        self.pushes.lock().unwrap_or_else(|p| p.into_inner())
    }

    /// Réserve `id` ; `None` si une poussée est déjà en cours
    ///
    /// Dans ce cas `follow_up`, s'il est fourni, est rattaché à la poussée en
    /// cours.
    pub(crate) fn begin(&self, id: &str, follow_up: Option<SyncState>) -> Option<Flight<'_>> {
        let mut pushes = self.lock();
        if let Some(pending) = pushes.get_mut(id) {
            if let Some(state) = follow_up {
                *pending = Some(pending.map_or(state, |p| p.merge(state)));
            }
            return None;
        }
        pushes.insert(id.to_string(), None);
        Some(Flight {
            registry: self,
            id: id.to_string(),
        })
    }

    /// Rattache une modification locale à la poussée en cours de `id`
    ///
    /// Retourne faux si aucune poussée n'est en cours.
    pub(crate) fn follow_up(&self, id: &str, state: SyncState) -> bool {
        match self.lock().get_mut(id) {
            Some(pending) => {
                *pending = Some(pending.map_or(state, |p| p.merge(state)));
                true
            }
            None => false,
        }
    }
}

/// Réservation d'une poussée, libérée à la destruction
pub(crate) struct Flight<'a> {
    registry: &'a InFlight,
    id: String,
}

impl Flight<'_> {
    /// Modifications survenues depuis le début de la poussée
    pub(crate) fn take_follow_up(&self) -> Option<SyncState> {
        self.registry
            .lock()
            .get_mut(&self.id)
            .and_then(Option::take)
    }
}

impl Drop for Flight<'_> {
    fn drop(&mut self) {
        self.registry.lock().remove(&self.id);
    }
}

/// Suppressions locales qu'une synchronisation ne doit pas défaire
///
/// Une entrée vit tant que sa suppression distante n'est pas terminée, puis
/// jusqu'au début de la synchronisation suivante : une liste distante tirée
/// avant la suppression peut encore contenir l'asset.
#[derive(Debug, Default)]
pub(crate) struct RecentDeletes {
    inner: Mutex<DeleteLog>,
}

#[derive(Debug, Default)]
struct DeleteLog {
    /// Numéro de la dernière synchronisation commencée
    generation: u64,
    /// Identifiant → synchronisation en cours à la fin de la suppression
    ids: HashMap<String, Option<u64>>,
}

impl RecentDeletes {
    fn lock(&self) -> std::sync::MutexGuard<'_, DeleteLog> {
        self.inner.lock().unwrap_or_else(|p| p.into_inner())
    }

    pub(crate) fn begin(&self, id: &str) {
        self.lock().ids.insert(id.to_string(), None);
    }

    pub(crate) fn finish(&self, id: &str) {
        let mut log = self.lock();
        let generation = log.generation;
        if let Some(done) = log.ids.get_mut(id) {
            *done = Some(generation);
        }
    }

    /// Début d'une synchronisation : oublie les suppressions terminées avant elle
    pub(crate) fn new_generation(&self) {
        let mut log = self.lock();
        let previous = log.generation;
        log.generation += 1;
        log.ids.retain(|_, done| done.map_or(true, |g| g > previous));
    }

    pub(crate) fn contains(&self, id: &str) -> bool {
        self.lock().ids.contains_key(id)
    }

    /// Un asset recréé sous le même identifiant ne doit plus être écarté
    pub(crate) fn forget(&self, id: &str) {
        self.lock().ids.remove(id);
    }

    /// Vrai tant que la suppression de `id` n'est pas terminée
    pub(crate) fn in_progress(&self, id: &str) -> bool {
        matches!(self.lock().ids.get(id), Some(None))
    }
}
