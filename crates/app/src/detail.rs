//! Asset detail view: plays an asset once the server reports it ready.

use std::sync::{Arc, Mutex};

use gamma_assets::{
    AssetStatusStore, AttachOutcome, PlaybackHandle, PlaybackSessionManager, StrategyKind, Surface,
};
use gamma_core::{AssetRecord, MediaStatus};
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// What the player area of the detail view shows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlayerView {
    /// No asset data yet.
    Loading,
    /// The asset exists but cannot be played in this status.
    Unavailable(MediaStatus),
    Playing(StrategyKind),
    Error(String),
}

pub struct AssetDetailController {
    view_rx: watch::Receiver<PlayerView>,
    manager: Arc<PlaybackSessionManager>,
    handle: Arc<Mutex<Option<PlaybackHandle>>>,
    task: JoinHandle<()>,
}

impl AssetDetailController {
    /// Follow `store` and attach playback to `surface` the first time the
    /// asset is `ready`. Attachment is attempted at most once.
    pub fn open(
        store: Arc<AssetStatusStore<AssetRecord>>,
        manager: Arc<PlaybackSessionManager>,
        surface: Arc<dyn Surface>,
    ) -> Self {
        let (view_tx, view_rx) = watch::channel(PlayerView::Loading);
        let handle = Arc::new(Mutex::new(None));

        let task = tokio::spawn(drive_view(
            store,
            Arc::clone(&manager),
            surface,
            view_tx,
            Arc::clone(&handle),
        ));

        Self {
            view_rx,
            manager,
            handle,
            task,
        }
    }

    pub fn view(&self) -> watch::Receiver<PlayerView> {
        self.view_rx.clone()
    }

    /// Stop following the store and release playback. Idempotent.
    ///
    /// Returns whether a playback session was released.
    pub fn close(&self) -> bool {
        self.task.abort();
        let handle = self.handle.lock().unwrap_or_else(|e| e.into_inner()).take();
        match handle {
            Some(handle) => self.manager.detach(&handle),
            None => false,
        }
    }
}

impl Drop for AssetDetailController {
    fn drop(&mut self) {
        self.close();
    }
}

async fn drive_view(
    store: Arc<AssetStatusStore<AssetRecord>>,
    manager: Arc<PlaybackSessionManager>,
    surface: Arc<dyn Surface>,
    view_tx: watch::Sender<PlayerView>,
    handle: Arc<Mutex<Option<PlaybackHandle>>>,
) {
    let mut data = store.data();
    let mut attempted = false;

    loop {
        let (asset, error) = {
            let snapshot = data.borrow_and_update();
            (snapshot.data.clone(), snapshot.error.clone())
        };

        match asset {
            Some(asset) if asset.status.is_ready() => {
                if !attempted {
                    attempted = true;
                    let view = match manager.attach(&asset, Arc::clone(&surface)).await {
                        Ok(AttachOutcome::Bound(bound)) => {
                            let strategy = bound.strategy;
                            *handle.lock().unwrap_or_else(|e| e.into_inner()) = Some(bound);
                            PlayerView::Playing(strategy)
                        }
                        Ok(AttachOutcome::Unavailable { status }) => PlayerView::Unavailable(status),
                        Err(e) => {
                            tracing::warn!(asset_id = %asset.id, error = %e, "Playback attach failed");
                            PlayerView::Error(e.to_string())
                        }
                    };
                    view_tx.send_replace(view);
                }
            }
            Some(asset) => {
                if !attempted {
                    view_tx.send_replace(PlayerView::Unavailable(asset.status));
                }
            }
            None => {
                if let Some(error) = error {
                    view_tx.send_replace(PlayerView::Error(error));
                }
            }
        }

        if data.changed().await.is_err() {
            return;
        }
    }
}
