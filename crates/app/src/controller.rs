//! Upload orchestration.
//!
//! [`UploadOrchestrationController`] is what a file picker talks to. It
//! rejects non-video files before any network call, allows one upload at
//! a time, mirrors upload progress into an [`UploadUiState`] watch
//! channel and refreshes the upload list once an upload completes. The
//! same list also follows the live channel, and a monitor task logs every
//! status change between consecutive list snapshots.

use std::sync::{Arc, Mutex};

use gamma_assets::{AssetStatusStore, Snapshot};
use gamma_client::{UploadClient, UploadFile, UploadPhase, UploadReceipt, UploadSession};
use gamma_core::admission::ensure_video;
use gamma_core::status_diff::{diff_statuses, StatusChange};
use gamma_core::UploadRecord;
use gamma_live::{LiveStatusChannel, Subscription};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What an upload form shows.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UploadUiState {
    pub uploading: bool,
    pub progress_percent: u8,
    /// Description of the last failed upload, cleared when a new one starts.
    pub last_error: Option<String>,
    pub last_completed: Option<UploadReceipt>,
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum UploadRejected {
    #[error("{name} is not a video file ({media_type})")]
    NotVideo { name: String, media_type: String },

    #[error("an upload is already in progress")]
    Busy,
}

pub type UploadListStore = AssetStatusStore<Vec<UploadRecord>>;

pub struct UploadOrchestrationController {
    uploads: UploadClient,
    store: Arc<UploadListStore>,
    state_tx: Arc<watch::Sender<UploadUiState>>,
    observer: Mutex<Option<JoinHandle<()>>>,
    monitor: JoinHandle<()>,
    _following: Subscription,
}

impl UploadOrchestrationController {
    /// Wire the list store to the live channel and start the status monitor.
    pub fn new(uploads: UploadClient, store: Arc<UploadListStore>, live: &LiveStatusChannel) -> Self {
        let following = store.follow(live);
        let monitor = tokio::spawn(monitor_statuses(store.data()));
        let (state_tx, _) = watch::channel(UploadUiState::default());

        Self {
            uploads,
            store,
            state_tx: Arc::new(state_tx),
            observer: Mutex::new(None),
            monitor,
            _following: following,
        }
    }

    /// Observe the upload form state.
    pub fn state(&self) -> watch::Receiver<UploadUiState> {
        self.state_tx.subscribe()
    }

    pub fn store(&self) -> &Arc<UploadListStore> {
        &self.store
    }

    /// Admit `file` and start uploading it.
    ///
    /// Returns once the upload has started; progress and the outcome are
    /// published through [`state`](Self::state).
    pub fn handle_file(&self, file: UploadFile) -> Result<(), UploadRejected> {
        if let Err(e) = ensure_video(&file.media_type) {
            tracing::info!(name = %file.name, error = %e, "Rejected file");
            return Err(UploadRejected::NotVideo {
                name: file.name,
                media_type: file.media_type,
            });
        }

        let mut busy = false;
        self.state_tx.send_if_modified(|state| {
            if state.uploading {
                busy = true;
                return false;
            }
            state.uploading = true;
            state.progress_percent = 0;
            state.last_error = None;
            true
        });
        if busy {
            return Err(UploadRejected::Busy);
        }

        tracing::info!(name = %file.name, size = file.size(), "Starting upload");
        let session = self.uploads.begin_upload(file);
        let task = tokio::spawn(observe_upload(
            session,
            Arc::clone(&self.state_tx),
            Arc::clone(&self.store),
        ));

        let mut observer = self.observer.lock().unwrap_or_else(|e| e.into_inner());
        *observer = Some(task);
        Ok(())
    }
}

impl Drop for UploadOrchestrationController {
    /// Stops observing. A running transfer is left to finish on its own.
    fn drop(&mut self) {
        let observer = self.observer.lock().unwrap_or_else(|e| e.into_inner()).take();
        if let Some(observer) = observer {
            observer.abort();
        }
        self.monitor.abort();
    }
}

/// Mirror one upload session into the UI state.
async fn observe_upload(
    mut session: UploadSession,
    state_tx: Arc<watch::Sender<UploadUiState>>,
    store: Arc<UploadListStore>,
) {
    while let Some(update) = session.next().await {
        let progress = update.progress_percent;
        match update.phase {
            UploadPhase::Requesting | UploadPhase::Transferring => {
                state_tx.send_if_modified(|s| {
                    let changed = s.progress_percent != progress;
                    s.progress_percent = progress;
                    changed
                });
            }
            UploadPhase::Completed(receipt) => {
                tracing::info!(upload_id = %receipt.id, "Upload completed");
                state_tx.send_modify(|s| {
                    s.uploading = false;
                    s.progress_percent = progress;
                    s.last_completed = Some(receipt);
                });
                store.refresh();
                return;
            }
            UploadPhase::Failed(failure) => {
                tracing::warn!(reason = %failure.reason, error = %failure.message, "Upload failed");
                state_tx.send_modify(|s| {
                    s.uploading = false;
                    s.progress_percent = progress;
                    s.last_error = Some(format!("{}: {}", failure.reason, failure.message));
                });
                return;
            }
        }
    }

    // The protocol task ended without a terminal update.
    state_tx.send_modify(|s| {
        s.uploading = false;
        s.last_error = Some("upload ended unexpectedly".into());
    });
}

/// Log status changes between consecutive upload-list snapshots.
async fn monitor_statuses(mut rx: watch::Receiver<Snapshot<Vec<UploadRecord>>>) {
    let mut previous: Option<Arc<Vec<UploadRecord>>> = None;

    loop {
        let current = rx.borrow_and_update().data.clone();
        if let Some(current) = current {
            let is_new = previous.as_ref().map_or(true, |p| !Arc::ptr_eq(p, &current));
            if is_new {
                let before = previous.as_deref().map(Vec::as_slice).unwrap_or(&[]);
                for change in diff_statuses(before, &current) {
                    log_change(&change, previous.is_none());
                }
                previous = Some(current);
            }
        }

        if rx.changed().await.is_err() {
            return;
        }
    }
}

fn log_change(change: &StatusChange, initial_load: bool) {
    let from = change.from.map(|s| s.as_str()).unwrap_or("new");
    if change.is_regression() {
        tracing::warn!(
            upload_id = %change.id,
            title = %change.title,
            from,
            to = %change.to,
            "Upload status moved backwards"
        );
    } else if initial_load {
        tracing::debug!(upload_id = %change.id, status = %change.to, "Upload listed");
    } else {
        tracing::info!(
            upload_id = %change.id,
            title = %change.title,
            from,
            to = %change.to,
            "Upload status changed"
        );
    }
}
