//! Auto-save debouncer
//!
//! Edits replace the pending document and restart a quiet-period timer.
//! When the timer runs out the pending document is saved. Only one save
//! runs at a time; edits made while a save is in flight start a new quiet
//! period once it finishes.

use crate::config::AUTO_SAVE_DEBOUNCE_MS;
use crate::database::GalleryDocument;
use crate::error::Result;
use crate::services::galleries::{GalleryService, SaveOutcome};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{Mutex, Notify};
use tokio::task::JoinHandle;

struct Shared {
    galleries: GalleryService,
    delay: Duration,
    pending: Mutex<Option<GalleryDocument>>,
    /// Held for the duration of every save
    save_lock: Mutex<()>,
    edited: Notify,
    saves: AtomicU64,
    last_error: Mutex<Option<String>>,
}

impl Shared {
    async fn save_pending(&self) -> Result<Option<SaveOutcome>> {
        let _guard = self.save_lock.lock().await;

        let Some(doc) = self.pending.lock().await.take() else {
            return Ok(None);
        };

        match self.galleries.save(&doc).await {
            Ok(outcome) => {
                self.saves.fetch_add(1, Ordering::SeqCst);
                *self.last_error.lock().await = None;
                tracing::debug!("Auto-saved gallery: {}", outcome.document.id);
                Ok(Some(outcome))
            }
            Err(e) => {
                *self.last_error.lock().await = Some(e.to_string());
                Err(e)
            }
        }
    }
}

/// Debounced saver for the gallery being edited
pub struct AutoSaver {
    shared: Arc<Shared>,
    task: JoinHandle<()>,
}

impl AutoSaver {
    /// Start the background task with the default quiet period
    pub fn start(galleries: GalleryService) -> Self {
        Self::with_delay(galleries, Duration::from_millis(AUTO_SAVE_DEBOUNCE_MS))
    }

    pub fn with_delay(galleries: GalleryService, delay: Duration) -> Self {
        let shared = Arc::new(Shared {
            galleries,
            delay,
            pending: Mutex::new(None),
            save_lock: Mutex::new(()),
            edited: Notify::new(),
            saves: AtomicU64::new(0),
            last_error: Mutex::new(None),
        });

        let task = tokio::spawn(run(shared.clone()));
        Self { shared, task }
    }

    /// Record an edit; the latest document wins
    pub async fn edit(&self, doc: GalleryDocument) {
        *self.shared.pending.lock().await = Some(doc);
        self.shared.edited.notify_one();
    }

    /// True while an edit is waiting to be saved
    pub async fn is_dirty(&self) -> bool {
        self.shared.pending.lock().await.is_some()
    }

    /// Save any pending edit now, without waiting for the quiet period
    pub async fn flush(&self) -> Result<Option<SaveOutcome>> {
        self.shared.save_pending().await
    }

    /// Number of saves that completed
    pub fn saves_completed(&self) -> u64 {
        self.shared.saves.load(Ordering::SeqCst)
    }

    /// Error from the most recent save, cleared by the next success
    pub async fn last_error(&self) -> Option<String> {
        self.shared.last_error.lock().await.clone()
    }

    /// Stop the background task and save whatever is pending
    pub async fn shutdown(&self) -> Result<Option<SaveOutcome>> {
        self.task.abort();
        self.flush().await
    }
}

impl Drop for AutoSaver {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn run(shared: Arc<Shared>) {
    loop {
        shared.edited.notified().await;

        // Every further edit restarts the quiet period
        loop {
            tokio::select! {
                _ = shared.edited.notified() => continue,
                _ = tokio::time::sleep(shared.delay) => break,
            }
        }

        if let Err(e) = shared.save_pending().await {
            tracing::error!("Auto-save failed: {}", e);
        }
    }
}
