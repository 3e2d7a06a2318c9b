use std::time::Duration;

use chrono::Local;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{broadcast, watch};

use super::{RemoteState, RemoteStore, SyncStatus};
use crate::store::StateSnapshot;

/// Quiescence window between the last local edit and the remote write.
pub const SAVE_DEBOUNCE: Duration = Duration::from_secs(2);

/// Background writer: drains store snapshots and pushes the newest one to
/// the remote store once edits go quiet. A newer snapshot supersedes a
/// pending write; a request already in flight is never cancelled. Failures
/// surface only through the status channel; local state is untouched.
pub struct AutoSave<S: RemoteStore> {
    store: S,
    snapshots: broadcast::Receiver<StateSnapshot>,
    window: Duration,
    status: watch::Sender<SyncStatus>,
}

impl<S: RemoteStore> AutoSave<S> {
    pub fn new(
        store: S,
        snapshots: broadcast::Receiver<StateSnapshot>,
    ) -> (Self, watch::Receiver<SyncStatus>) {
        Self::with_window(store, snapshots, SAVE_DEBOUNCE)
    }

    pub fn with_window(
        store: S,
        snapshots: broadcast::Receiver<StateSnapshot>,
        window: Duration,
    ) -> (Self, watch::Receiver<SyncStatus>) {
        let (status, status_rx) = watch::channel(SyncStatus::Idle);
        (
            Self {
                store,
                snapshots,
                window,
                status,
            },
            status_rx,
        )
    }

    /// Run until the snapshot channel closes.
    pub async fn run(mut self) {
        loop {
            let mut pending = match self.snapshots.recv().await {
                Ok(snapshot) => snapshot,
                Err(RecvError::Lagged(skipped)) => {
                    log::debug!("Auto-save lagged, {} snapshots skipped", skipped);
                    continue;
                }
                Err(RecvError::Closed) => return,
            };

            // Absorb newer snapshots until the window elapses quietly.
            loop {
                tokio::select! {
                    next = self.snapshots.recv() => match next {
                        Ok(snapshot) => pending = snapshot,
                        Err(RecvError::Lagged(_)) => continue,
                        Err(RecvError::Closed) => break,
                    },
                    _ = tokio::time::sleep(self.window) => break,
                }
            }

            self.flush(pending).await;
        }
    }

    async fn flush(&mut self, snapshot: StateSnapshot) {
        if !self.store.is_configured() {
            log::debug!("Auto-save skipped: remote store not configured");
            return;
        }
        let _ = self.status.send(SyncStatus::Syncing);
        let payload = RemoteState {
            tasks: snapshot.tasks,
            completion_map: snapshot.completions,
            exported_at: Local::now().naive_local(),
        };
        match self.store.save(&payload).await {
            Ok(()) => {
                log::info!("Auto-saved {} tasks to remote", payload.tasks.len());
                let _ = self
                    .status
                    .send(SyncStatus::Synced(Local::now().format("%H:%M").to_string()));
            }
            Err(e) => {
                log::error!("Auto-save failed: {}", e);
                let _ = self.status.send(SyncStatus::Error(e.to_string()));
            }
        }
    }
}
