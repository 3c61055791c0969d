//! Indicateur d'activité visible par l'utilisateur
//!
//! Levé uniquement autour des opérations initiées par l'utilisateur. Les
//! opérations qui se chevauchent sont comptées : l'indicateur ne retombe
//! qu'à la fin de la dernière.

use std::sync::Mutex;
use tokio::sync::watch;

#[derive(Debug)]
pub(crate) struct BusyState {
    active: Mutex<usize>,
    tx: watch::Sender<bool>,
}

impl BusyState {
    pub(crate) fn new() -> Self {
        Self {
            active: Mutex::new(0),
            tx: watch::channel(false).0,
        }
    }

    pub(crate) fn enter(&self) -> BusyGuard<'_> {
        let mut active = self.active.lock().unwrap_or_else(|p| p.into_inner());
        *active += 1;
        if *active == 1 {
            self.tx.send_replace(true);
        }
        BusyGuard { state: self }
    }

    pub(crate) fn is_busy(&self) -> bool {
        *self.tx.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<bool> {
        self.tx.subscribe()
    }
}

/// Garde RAII : l'opération est considérée terminée à sa destruction
pub(crate) struct BusyGuard<'a> {
    state: &'a BusyState,
}

impl Drop for BusyGuard<'_> {
    fn drop(&mut self) {
        let mut active = self.state.active.lock().unwrap_or_else(|p| p.into_inner());
        *active = active.saturating_sub(1);
        if *active == 0 {
            self.state.tx.send_replace(false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlapping_operations() {
        let busy = BusyState::new();
        let rx = busy.subscribe();
        assert!(!busy.is_busy());

        let first = busy.enter();
        let second = busy.enter();
        assert!(*rx.borrow());

        drop(first);
        assert!(busy.is_busy());
        drop(second);
        assert!(!busy.is_busy());
        assert!(!*rx.borrow());
    }
}
