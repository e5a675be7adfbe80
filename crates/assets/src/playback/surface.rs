//! Presentation surfaces.

use std::sync::Mutex;
use std::time::Duration;

use gamma_core::admission::{is_video, MEDIA_TYPE_HLS};
use tokio::process::{Child, Command};

/// Player used when none is configured.
pub const DEFAULT_PLAYER: &str = "ffplay";

/// How often [`PlayerProcessSurface::wait`] checks the player.
const WAIT_POLL_INTERVAL: Duration = Duration::from_millis(100);

#[derive(Debug, thiserror::Error)]
pub enum SurfaceError {
    #[error("player binary {program} could not be started: {source}")]
    Spawn {
        program: String,
        #[source]
        source: std::io::Error,
    },

    #[error("surface rejected source: {0}")]
    Rejected(String),
}

/// Somewhere a video can be shown.
///
/// Implementations bind at most one source at a time; `set_source`
/// replaces whatever was bound before.
pub trait Surface: Send + Sync {
    /// Whether the surface can play `media_type` natively.
    fn can_play_type(&self, media_type: &str) -> bool;

    fn set_source(&self, url: &str) -> Result<(), SurfaceError>;

    /// Unbind the current source. Idempotent.
    fn clear_source(&self);
}

/// Plays a URL by launching an external player process.
///
/// The process is killed when the source is cleared or replaced, and when
/// the surface is dropped.
pub struct PlayerProcessSurface {
    program: String,
    args: Vec<String>,
    child: Mutex<Option<Child>>,
}

impl PlayerProcessSurface {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            child: Mutex::new(None),
        }
    }

    /// Extra arguments placed before the URL.
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args = args.into_iter().map(Into::into).collect();
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Whether a player process is currently bound.
    pub fn is_playing(&self) -> bool {
        self.lock().is_some()
    }

    /// Wait until no player is bound: the player exited on its own (e.g.
    /// the user closed the window) or the source was cleared. Returns
    /// immediately when nothing is bound.
    ///
    /// The child stays in its slot while waiting, so `clear_source` can
    /// still stop it.
    pub async fn wait(&self) -> std::io::Result<()> {
        loop {
            {
                let mut slot = self.lock();
                let Some(child) = slot.as_mut() else {
                    return Ok(());
                };
                if let Some(status) = child.try_wait()? {
                    tracing::info!(program = %self.program, ?status, "Player exited");
                    slot.take();
                    return Ok(());
                }
            }
            tokio::time::sleep(WAIT_POLL_INTERVAL).await;
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Child>> {
        self.child.lock().unwrap_or_else(|e| e.into_inner())
    }
}

impl Default for PlayerProcessSurface {
    fn default() -> Self {
        Self::new(DEFAULT_PLAYER)
    }
}

impl Surface for PlayerProcessSurface {
    fn can_play_type(&self, media_type: &str) -> bool {
        media_type == MEDIA_TYPE_HLS || is_video(media_type)
    }

    fn set_source(&self, url: &str) -> Result<(), SurfaceError> {
        let mut slot = self.lock();
        if let Some(mut previous) = slot.take() {
            let _ = previous.start_kill();
        }

        let child = Command::new(&self.program)
            .args(&self.args)
            .arg(url)
            .stdin(std::process::Stdio::null())
            .stdout(std::process::Stdio::null())
            .stderr(std::process::Stdio::null())
            .kill_on_drop(true)
            .spawn()
            .map_err(|source| SurfaceError::Spawn {
                program: self.program.clone(),
                source,
            })?;

        tracing::info!(program = %self.program, pid = ?child.id(), url, "Player started");
        *slot = Some(child);
        Ok(())
    }

    fn clear_source(&self) {
        if let Some(mut child) = self.lock().take() {
            if let Err(e) = child.start_kill() {
                tracing::debug!(program = %self.program, error = %e, "Player already gone");
            } else {
                tracing::info!(program = %self.program, "Player stopped");
            }
        }
    }
}
