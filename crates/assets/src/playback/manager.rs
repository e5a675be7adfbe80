//! Playback session manager.
//!
//! Owns at most one active session. A session exists only for an asset
//! whose status is `ready`, uses exactly one strategy (software engine or
//! native surface playback) and is released synchronously by
//! [`PlaybackSessionManager::detach`], by a newer attach, or by dropping
//! the manager.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use gamma_client::{ApiError, GammaApi};
use gamma_core::admission::MEDIA_TYPE_HLS;
use gamma_core::{AssetRecord, MediaStatus, PlaybackUrl};

use super::engine::{EngineError, EngineFactory, StreamingEngine};
use super::surface::{Surface, SurfaceError};

/// Source of playback manifest URLs.
#[async_trait]
pub trait PlaylistSource: Send + Sync {
    async fn playlist_url(&self, asset_id: &str) -> Result<PlaybackUrl, ApiError>;
}

#[async_trait]
impl PlaylistSource for GammaApi {
    async fn playlist_url(&self, asset_id: &str) -> Result<PlaybackUrl, ApiError> {
        self.get_asset_playlist(asset_id).await
    }
}

#[derive(Debug, thiserror::Error)]
pub enum PlaybackError {
    #[error("playlist unavailable: {0}")]
    PlaylistUnavailable(#[source] ApiError),

    #[error("no playback strategy supports HLS on this surface")]
    Unsupported,

    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error(transparent)]
    Surface(#[from] SurfaceError),
}

/// Which strategy a session was bound with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StrategyKind {
    /// A [`StreamingEngine`] drives the surface.
    Software,
    /// The surface plays the manifest URL itself.
    Native,
}

impl StrategyKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            StrategyKind::Software => "software",
            StrategyKind::Native => "native",
        }
    }
}

impl std::fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identifies one bound session. Pass it back to `detach`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlaybackHandle {
    session_id: u64,
    pub asset_id: String,
    pub strategy: StrategyKind,
    pub manifest_url: String,
}

#[derive(Debug)]
pub enum AttachOutcome {
    /// The asset is not `ready`; nothing was requested or bound.
    Unavailable { status: MediaStatus },
    Bound(PlaybackHandle),
}

enum Binding {
    Software(Box<dyn StreamingEngine>),
    Native(Arc<dyn Surface>),
}

struct ActiveSession {
    id: u64,
    asset_id: String,
    binding: Binding,
}

impl ActiveSession {
    fn release(self) {
        match self.binding {
            Binding::Software(mut engine) => engine.destroy(),
            Binding::Native(surface) => surface.clear_source(),
        }
        tracing::info!(session_id = self.id, asset_id = %self.asset_id, "Playback session released");
    }
}

pub struct PlaybackSessionManager {
    playlists: Arc<dyn PlaylistSource>,
    engines: Arc<dyn EngineFactory>,
    active: Mutex<Option<ActiveSession>>,
    next_id: AtomicU64,
}

impl PlaybackSessionManager {
    pub fn new(playlists: Arc<dyn PlaylistSource>, engines: Arc<dyn EngineFactory>) -> Self {
        Self {
            playlists,
            engines,
            active: Mutex::new(None),
            next_id: AtomicU64::new(1),
        }
    }

    /// Bind playback of `asset` to `surface` if the asset is ready.
    ///
    /// Any previously active session is released before the new one is
    /// bound. On error the surface is left unbound and nothing is retried.
    pub async fn attach(
        &self,
        asset: &AssetRecord,
        surface: Arc<dyn Surface>,
    ) -> Result<AttachOutcome, PlaybackError> {
        if !asset.status.is_ready() {
            tracing::debug!(asset_id = %asset.id, status = %asset.status, "Asset not ready for playback");
            return Ok(AttachOutcome::Unavailable {
                status: asset.status,
            });
        }

        self.release_active();

        let playlist = self.playlists.playlist_url(&asset.id).await.map_err(|e| {
            tracing::warn!(asset_id = %asset.id, error = %e, "Playlist request failed");
            PlaybackError::PlaylistUnavailable(e)
        })?;

        let (strategy, binding) = if self.engines.is_supported() {
            let mut engine = self.engines.create();
            engine.load_source(&playlist.url);
            engine.attach_media(surface)?;
            (StrategyKind::Software, Binding::Software(engine))
        } else if surface.can_play_type(MEDIA_TYPE_HLS) {
            surface.set_source(&playlist.url)?;
            (StrategyKind::Native, Binding::Native(surface))
        } else {
            tracing::warn!(asset_id = %asset.id, "No playback strategy available");
            return Err(PlaybackError::Unsupported);
        };

        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let session = ActiveSession {
            id,
            asset_id: asset.id.clone(),
            binding,
        };
        // A concurrent attach may have bound in the meantime; last one wins.
        let previous = self.lock().replace(session);
        if let Some(previous) = previous {
            previous.release();
        }

        tracing::info!(
            session_id = id,
            asset_id = %asset.id,
            strategy = %strategy,
            url = %playlist.url,
            "Playback session bound"
        );

        Ok(AttachOutcome::Bound(PlaybackHandle {
            session_id: id,
            asset_id: asset.id.clone(),
            strategy,
            manifest_url: playlist.url,
        }))
    }

    /// Release the session identified by `handle`.
    ///
    /// Returns `true` if something was released; `false` when the session
    /// was already released or replaced.
    pub fn detach(&self, handle: &PlaybackHandle) -> bool {
        let session = {
            let mut active = self.lock();
            let is_current = active
                .as_ref()
                .is_some_and(|s| s.id == handle.session_id);
            if is_current {
                active.take()
            } else {
                None
            }
        };
        match session {
            Some(session) => {
                session.release();
                true
            }
            None => false,
        }
    }

    /// Asset id of the active session, if any.
    pub fn active_asset(&self) -> Option<String> {
        self.lock().as_ref().map(|s| s.asset_id.clone())
    }

    fn release_active(&self) {
        let previous = self.lock().take();
        if let Some(previous) = previous {
            previous.release();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<ActiveSession>> {
        self.active.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Drop for PlaybackSessionManager {
    fn drop(&mut self) {
        self.release_active();
    }
}
