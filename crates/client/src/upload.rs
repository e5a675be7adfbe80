//! Two-phase upload protocol.
//!
//! 1. **Requesting**: ask the API for an upload session (`POST /uploads`).
//! 2. **Transferring**: stream the bytes to the presigned target.
//!
//! [`UploadClient::begin_upload`] spawns the protocol on its own task and
//! returns an [`UploadSession`] that yields [`UploadUpdate`]s until exactly
//! one terminal phase (`Completed` or `Failed`). Dropping the session only
//! stops observing; the transfer itself runs to completion or failure.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use gamma_core::admission::media_type_for_path;
use gamma_core::types::RecordId;
use gamma_core::UploadTicket;
use tokio::sync::mpsc;

use crate::api::{ApiError, GammaApi};
use crate::progress::{ProgressFn, ProgressTracker};

// ---------------------------------------------------------------------------
// Transport seam
// ---------------------------------------------------------------------------

/// The two HTTP operations the protocol needs.
#[async_trait]
pub trait UploadTransport: Send + Sync + 'static {
    /// Open a session for `filename` and obtain the transfer target.
    async fn create_session(&self, filename: &str) -> Result<UploadTicket, ApiError>;

    /// Send the full payload to `upload_target`, reporting cumulative
    /// bytes through `on_progress`.
    async fn transfer(
        &self,
        upload_target: &str,
        body: Bytes,
        content_type: &str,
        on_progress: ProgressFn,
    ) -> Result<(), ApiError>;
}

#[async_trait]
impl UploadTransport for GammaApi {
    async fn create_session(&self, filename: &str) -> Result<UploadTicket, ApiError> {
        self.create_upload(filename).await
    }

    async fn transfer(
        &self,
        upload_target: &str,
        body: Bytes,
        content_type: &str,
        on_progress: ProgressFn,
    ) -> Result<(), ApiError> {
        GammaApi::transfer(self, upload_target, body, content_type, on_progress).await
    }
}

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A file ready to be uploaded.
#[derive(Debug, Clone)]
pub struct UploadFile {
    /// File name sent to the API; becomes the upload title.
    pub name: String,
    /// Declared media type, sent as `Content-Type` on transfer.
    pub media_type: String,
    pub data: Bytes,
}

impl UploadFile {
    pub fn new(name: impl Into<String>, media_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            media_type: media_type.into(),
            data: data.into(),
        }
    }

    /// Read a file from disk, deriving the media type from its extension.
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let data = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("upload.bin")
            .to_string();
        Ok(Self {
            name,
            media_type: media_type_for_path(path).to_string(),
            data: Bytes::from(data),
        })
    }

    pub fn size(&self) -> u64 {
        self.data.len() as u64
    }
}

/// Why an upload ended in `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureReason {
    /// Phase 1 failed; no bytes were sent.
    SessionCreationFailed,
    /// Phase 2 failed, including a connection dropped mid-transfer.
    TransferFailed,
}

impl FailureReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureReason::SessionCreationFailed => "session-creation-failed",
            FailureReason::TransferFailed => "transfer-failed",
        }
    }
}

impl fmt::Display for FailureReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal failure of an upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadFailure {
    pub reason: FailureReason,
    /// Human-readable description of the underlying error.
    pub message: String,
}

/// Result of a completed upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadReceipt {
    pub id: RecordId,
    pub storage_key: String,
    pub title: String,
}

/// Client-side state machine of one upload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadPhase {
    Requesting,
    Transferring,
    Completed(UploadReceipt),
    Failed(UploadFailure),
}

impl UploadPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UploadPhase::Completed(_) | UploadPhase::Failed(_))
    }
}

/// One notification from an upload session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadUpdate {
    pub phase: UploadPhase,
    /// 0..=100, non-decreasing within a session.
    pub progress_percent: u8,
}

// ---------------------------------------------------------------------------
// UploadSession
// ---------------------------------------------------------------------------

/// Observation handle for one running upload.
pub struct UploadSession {
    updates: mpsc::UnboundedReceiver<UploadUpdate>,
    task: tokio::task::JoinHandle<()>,
}

impl UploadSession {
    /// Next update, or `None` once the terminal update has been consumed.
    pub async fn next(&mut self) -> Option<UploadUpdate> {
        self.updates.recv().await
    }

    /// Drain the session and return its terminal phase.
    pub async fn finish(mut self) -> UploadPhase {
        let mut last = UploadPhase::Requesting;
        while let Some(update) = self.updates.recv().await {
            last = update.phase;
        }
        last
    }

    /// Whether the protocol task has finished (observed or not).
    pub fn is_finished(&self) -> bool {
        self.task.is_finished()
    }
}

// ---------------------------------------------------------------------------
// UploadClient
// ---------------------------------------------------------------------------

/// Runs the two-phase upload protocol against an [`UploadTransport`].
///
/// Cheap to clone; clones share the transport.
#[derive(Clone)]
pub struct UploadClient {
    transport: Arc<dyn UploadTransport>,
}

impl UploadClient {
    pub fn new(transport: Arc<dyn UploadTransport>) -> Self {
        Self { transport }
    }

    /// Start uploading `file`. Must be called from within a Tokio runtime.
    ///
    /// There is no automatic retry; call again with the same file to retry.
    pub fn begin_upload(&self, file: UploadFile) -> UploadSession {
        let (tx, rx) = mpsc::unbounded_channel();
        let transport = Arc::clone(&self.transport);
        let task = tokio::spawn(async move {
            run_upload(transport.as_ref(), file, tx).await;
        });
        UploadSession { updates: rx, task }
    }
}

/// Drive one upload from `Requesting` to a terminal phase.
async fn run_upload(
    transport: &dyn UploadTransport,
    file: UploadFile,
    tx: mpsc::UnboundedSender<UploadUpdate>,
) {
    // A closed receiver means nobody is watching any more; keep going.
    let emit = |phase: UploadPhase, progress_percent: u8| {
        let _ = tx.send(UploadUpdate {
            phase,
            progress_percent,
        });
    };

    tracing::info!(file = %file.name, size = file.size(), "Requesting upload session");
    emit(UploadPhase::Requesting, 0);

    let ticket = match transport.create_session(&file.name).await {
        Ok(ticket) => ticket,
        Err(e) => {
            tracing::warn!(file = %file.name, error = %e, "Upload session creation failed");
            emit(
                UploadPhase::Failed(UploadFailure {
                    reason: FailureReason::SessionCreationFailed,
                    message: e.to_string(),
                }),
                0,
            );
            return;
        }
    };

    tracing::info!(
        upload_id = %ticket.id,
        storage_key = %ticket.storage_key,
        "Upload session created, transferring"
    );
    emit(UploadPhase::Transferring, 0);

    let tracker = Arc::new(Mutex::new(ProgressTracker::new(file.size())));
    let progress_tx = tx.clone();
    let progress_tracker = Arc::clone(&tracker);
    let on_progress: ProgressFn = Arc::new(move |sent| {
        let mut tracker = progress_tracker
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        // Send under the lock so percentages can never be reordered.
        if let Some(percent) = tracker.advance(sent) {
            let _ = progress_tx.send(UploadUpdate {
                phase: UploadPhase::Transferring,
                progress_percent: percent,
            });
        }
    });

    let result = transport
        .transfer(&ticket.upload_target, file.data.clone(), &file.media_type, on_progress)
        .await;

    match result {
        Ok(()) => {
            tracing::info!(upload_id = %ticket.id, "Upload transfer completed");
            emit(
                UploadPhase::Completed(UploadReceipt {
                    id: ticket.id,
                    storage_key: ticket.storage_key,
                    title: file.name,
                }),
                100,
            );
        }
        Err(e) => {
            let last = tracker
                .lock()
                .map(|t| t.last())
                .unwrap_or_else(|poisoned| poisoned.into_inner().last());
            tracing::warn!(upload_id = %ticket.id, error = %e, "Upload transfer failed");
            emit(
                UploadPhase::Failed(UploadFailure {
                    reason: FailureReason::TransferFailed,
                    message: e.to_string(),
                }),
                last,
            );
        }
    }
}
