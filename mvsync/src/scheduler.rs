//! Planificateur de tâches de fond annulables
//!
//! Chaque tâche tourne jusqu'à l'annulation du jeton commun ou jusqu'à ce
//! qu'elle renvoie `false`. [`Scheduler::shutdown`] annule et attend la fin
//! de toutes les tâches ; la destruction du planificateur annule sans attendre.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::debug;

#[derive(Debug, Default)]
pub struct Scheduler {
    token: CancellationToken,
    tracker: TaskTracker,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Exécute `task` toutes les `period`, le premier passage après une période
    ///
    /// Un passage trop long décale les suivants au lieu de les accumuler.
    pub fn every<F, Fut>(&self, name: &'static str, period: Duration, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            debug!(task = name, ?period, "Periodic task started");

            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = ticker.tick() => {
                        if !task().await {
                            break;
                        }
                    }
                }
            }
            debug!(task = name, "Periodic task stopped");
        });
    }

    /// Exécute `task` à chaque notification de `signal`
    ///
    /// Les notifications reçues pendant un passage sont regroupées en un seul
    /// passage suivant.
    pub fn on_signal<F, Fut>(&self, name: &'static str, signal: Arc<Notify>, mut task: F)
    where
        F: FnMut() -> Fut + Send + 'static,
        Fut: Future<Output = bool> + Send + 'static,
    {
        let token = self.token.clone();
        self.tracker.spawn(async move {
            debug!(task = name, "Signal task started");
            loop {
                tokio::select! {
                    _ = token.cancelled() => break,
                    _ = signal.notified() => {
                        if !task().await {
                            break;
                        }
                    }
                }
            }
            debug!(task = name, "Signal task stopped");
        });
    }

    pub fn is_cancelled(&self) -> bool {
        self.token.is_cancelled()
    }

    /// Nombre de tâches encore actives
    pub fn active_tasks(&self) -> usize {
        self.tracker.len()
    }

    /// Annule toutes les tâches et attend leur terminaison
    pub async fn shutdown(&self) {
        self.token.cancel();
        self.tracker.close();
        self.tracker.wait().await;
    }
}

impl Drop for Scheduler {
    fn drop(&mut self) {
        self.token.cancel();
    }
}
