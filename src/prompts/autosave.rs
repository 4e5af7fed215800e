//! Debounced persistence of live template edits.
//!
//! Each [`AutoSaver::schedule`] call restarts the quiet-period timer; only the
//! latest snapshot is written once the timer expires. Pending work is flushed
//! on [`AutoSaver::shutdown`].
//!
//! Full saves made by [`super::PromptStore`] go through the same [`SaveGate`]
//! and advance its revision. A snapshot taken before such a save is dropped
//! instead of written: the save already contains the edit, and writing the
//! older snapshot would undo a create, delete or import.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, TexSauceError};
use crate::storage::{KeyValueStore, keys};

/// Serializes writes of the template collection and counts full saves.
#[derive(Debug, Clone, Default)]
pub struct SaveGate {
    revision: Arc<Mutex<u64>>,
}

impl SaveGate {
    /// Number of full saves so far.
    pub fn revision(&self) -> u64 {
        self.revision.lock().map(|r| *r).unwrap_or(0)
    }

    /// Run a full save; the revision advances only if it succeeds.
    pub(crate) fn save(&self, write: impl FnOnce() -> Result<()>) -> Result<()> {
        let mut revision = self
            .revision
            .lock()
            .map_err(|e| TexSauceError::Storage(format!("save gate poisoned: {e}")))?;
        write()?;
        *revision += 1;
        Ok(())
    }

    /// Run `write` only if no full save happened since `revision`.
    /// Returns `Ok(false)` when the write was skipped.
    fn save_if_current(&self, revision: u64, write: impl FnOnce() -> Result<()>) -> Result<bool> {
        let current = self
            .revision
            .lock()
            .map_err(|e| TexSauceError::Storage(format!("save gate poisoned: {e}")))?;
        if *current != revision {
            return Ok(false);
        }
        write()?;
        Ok(true)
    }
}

/// A serialized template collection and the gate revision it was taken at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Snapshot {
    revision: u64,
    json: String,
}

impl Snapshot {
    pub(crate) fn new(revision: u64, json: String) -> Self {
        Self { revision, json }
    }

    /// The serialized collection.
    pub fn json(&self) -> &str {
        &self.json
    }
}

/// Background writer for the template collection.
pub struct AutoSaver {
    tx: mpsc::UnboundedSender<Snapshot>,
    cancel: CancellationToken,
    handle: JoinHandle<()>,
}

impl std::fmt::Debug for AutoSaver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AutoSaver")
            .field("cancelled", &self.cancel.is_cancelled())
            .finish()
    }
}

impl AutoSaver {
    /// Spawn the writer task on the current tokio runtime.
    pub fn spawn(store: Arc<dyn KeyValueStore>, gate: SaveGate, debounce: Duration) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(run(store, gate, debounce, rx, cancel.clone()));
        Self { tx, cancel, handle }
    }

    /// Queue a snapshot for writing.
    pub fn schedule(&self, snapshot: Snapshot) {
        if self.tx.send(snapshot).is_err() {
            warn!("auto-save task is gone, edit not persisted");
        }
    }

    /// Flush any pending snapshot and stop the task.
    pub async fn shutdown(self) {
        self.cancel.cancel();
        if let Err(e) = self.handle.await {
            warn!("auto-save task failed: {e}");
        }
    }
}

async fn run(
    store: Arc<dyn KeyValueStore>,
    gate: SaveGate,
    debounce: Duration,
    mut rx: mpsc::UnboundedReceiver<Snapshot>,
    cancel: CancellationToken,
) {
    let mut pending: Option<Snapshot> = None;
    loop {
        tokio::select! {
            () = cancel.cancelled() => {
                // Drain anything sent right before shutdown.
                while let Ok(snapshot) = rx.try_recv() {
                    pending = Some(snapshot);
                }
                flush(store.as_ref(), &gate, pending.take());
                break;
            }
            msg = rx.recv() => {
                match msg {
                    Some(snapshot) => pending = Some(snapshot),
                    None => {
                        flush(store.as_ref(), &gate, pending.take());
                        break;
                    }
                }
            }
            () = tokio::time::sleep(debounce), if pending.is_some() => {
                flush(store.as_ref(), &gate, pending.take());
            }
        }
    }
    debug!("auto-save task stopped");
}

fn flush(store: &dyn KeyValueStore, gate: &SaveGate, snapshot: Option<Snapshot>) {
    let Some(snapshot) = snapshot else { return };
    let written = gate.save_if_current(snapshot.revision, || {
        store.set(keys::PROMPTS, &snapshot.json)
    });
    match written {
        Ok(true) => debug!(bytes = snapshot.json.len(), "auto-saved prompts"),
        Ok(false) => debug!(
            revision = snapshot.revision,
            "auto-save skipped, collection saved since snapshot"
        ),
        Err(e) => warn!("auto-save failed: {e}"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStore;

    fn snapshot(json: &str) -> Snapshot {
        Snapshot::new(0, json.to_owned())
    }

    #[tokio::test(start_paused = true)]
    async fn burst_of_edits_is_written_once_after_quiet_period() {
        let mem = Arc::new(MemoryStore::new());
        let saver = AutoSaver::spawn(mem.clone(), SaveGate::default(), Duration::from_millis(500));

        saver.schedule(snapshot("a"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        saver.schedule(snapshot("b"));
        tokio::time::sleep(Duration::from_millis(200)).await;
        saver.schedule(snapshot("c"));

        tokio::time::sleep(Duration::from_millis(400)).await;
        assert_eq!(mem.write_count(), 0);

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(mem.write_count(), 1);
        assert_eq!(mem.get(keys::PROMPTS).ok().flatten().as_deref(), Some("c"));

        saver.shutdown().await;
        assert_eq!(mem.write_count(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_flushes_pending_edit() {
        let mem = Arc::new(MemoryStore::new());
        let saver = AutoSaver::spawn(mem.clone(), SaveGate::default(), Duration::from_millis(500));

        saver.schedule(snapshot("unsaved"));
        saver.shutdown().await;

        assert_eq!(
            mem.get(keys::PROMPTS).ok().flatten().as_deref(),
            Some("unsaved")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn snapshot_older_than_a_full_save_is_dropped() {
        let mem = Arc::new(MemoryStore::new());
        let gate = SaveGate::default();
        let saver = AutoSaver::spawn(mem.clone(), gate.clone(), Duration::from_millis(500));

        saver.schedule(snapshot("before save"));
        let saved = gate.save(|| mem.set(keys::PROMPTS, "full save"));
        assert!(saved.is_ok());
        assert_eq!(gate.revision(), 1);

        tokio::time::sleep(Duration::from_millis(600)).await;
        saver.shutdown().await;
        assert_eq!(
            mem.get(keys::PROMPTS).ok().flatten().as_deref(),
            Some("full save")
        );
    }

    #[test]
    fn failed_save_keeps_revision() {
        let gate = SaveGate::default();
        let result = gate.save(|| Err(TexSauceError::Storage("disk full".into())));
        assert!(result.is_err());
        assert_eq!(gate.revision(), 0);
    }
}
