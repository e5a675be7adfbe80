//! Software adaptive-streaming engine.
//!
//! [`HlsEngine`] downloads the master playlist itself, chooses a rendition
//! and binds that rendition to the surface. The work runs on a background
//! task that [`StreamingEngine::destroy`] cancels.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::manifest::{parse_master_playlist, select_variant, ManifestError};
use super::surface::Surface;

/// Timeout for fetching the master playlist.
const MANIFEST_TIMEOUT: Duration = Duration::from_secs(15);

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("no source loaded")]
    NoSource,

    #[error("engine already destroyed")]
    Destroyed,

    #[error("manifest request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("manifest request returned {status}")]
    Status { status: u16 },

    #[error(transparent)]
    Manifest(#[from] ManifestError),

    #[error("invalid rendition URI {uri}: {reason}")]
    InvalidUri { uri: String, reason: String },
}

/// A software streaming strategy bound to one surface.
pub trait StreamingEngine: Send {
    /// Remember the manifest URL to play.
    fn load_source(&mut self, url: &str);

    /// Start feeding the loaded source into `surface`.
    fn attach_media(&mut self, surface: Arc<dyn Surface>) -> Result<(), EngineError>;

    /// Stop all work and unbind the surface. Idempotent.
    fn destroy(&mut self);
}

/// Creates engines, and says whether the software path is available.
pub trait EngineFactory: Send + Sync {
    fn is_supported(&self) -> bool;

    fn create(&self) -> Box<dyn StreamingEngine>;
}

/// Factory for [`HlsEngine`].
#[derive(Clone)]
pub struct HlsEngineFactory {
    http: reqwest::Client,
    enabled: bool,
    max_bandwidth: Option<u64>,
}

impl HlsEngineFactory {
    pub fn new(enabled: bool, max_bandwidth: Option<u64>) -> Self {
        Self::with_client(reqwest::Client::new(), enabled, max_bandwidth)
    }

    pub fn with_client(http: reqwest::Client, enabled: bool, max_bandwidth: Option<u64>) -> Self {
        Self {
            http,
            enabled,
            max_bandwidth,
        }
    }
}

impl EngineFactory for HlsEngineFactory {
    fn is_supported(&self) -> bool {
        self.enabled
    }

    fn create(&self) -> Box<dyn StreamingEngine> {
        Box::new(HlsEngine::new(self.http.clone(), self.max_bandwidth))
    }
}

pub struct HlsEngine {
    http: reqwest::Client,
    max_bandwidth: Option<u64>,
    source: Option<String>,
    surface: Option<Arc<dyn Surface>>,
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    /// Set by `destroy`. The bind task checks it and binds under the same
    /// lock, so nothing is bound once `destroy` has returned.
    released: Arc<Mutex<bool>>,
    destroyed: bool,
}

impl HlsEngine {
    pub fn new(http: reqwest::Client, max_bandwidth: Option<u64>) -> Self {
        Self {
            http,
            max_bandwidth,
            source: None,
            surface: None,
            cancel: CancellationToken::new(),
            task: None,
            released: Arc::new(Mutex::new(false)),
            destroyed: false,
        }
    }
}

impl StreamingEngine for HlsEngine {
    fn load_source(&mut self, url: &str) {
        self.source = Some(url.to_string());
    }

    fn attach_media(&mut self, surface: Arc<dyn Surface>) -> Result<(), EngineError> {
        if self.destroyed {
            return Err(EngineError::Destroyed);
        }
        let source = self.source.clone().ok_or(EngineError::NoSource)?;

        let http = self.http.clone();
        let max_bandwidth = self.max_bandwidth;
        let cancel = self.cancel.clone();
        let released = Arc::clone(&self.released);
        let bound = Arc::clone(&surface);

        self.surface = Some(surface);
        self.task = Some(tokio::spawn(async move {
            let rendition = tokio::select! {
                _ = cancel.cancelled() => return,
                r = resolve_rendition(&http, &source, max_bandwidth) => r,
            };

            let url = match rendition {
                Ok(url) => url,
                Err(e) => {
                    // The surface may still cope with the master playlist.
                    tracing::warn!(source = %source, error = %e, "Rendition selection failed, using master playlist");
                    source
                }
            };

            let guard = released.lock().unwrap_or_else(|e| e.into_inner());
            if *guard {
                return;
            }
            match bound.set_source(&url) {
                Ok(()) => tracing::info!(url = %url, "Rendition bound to surface"),
                Err(e) => tracing::warn!(url = %url, error = %e, "Surface rejected rendition"),
            }
        }));

        Ok(())
    }

    fn destroy(&mut self) {
        if self.destroyed {
            return;
        }
        self.destroyed = true;
        // Waits for a bind in progress; later binds see the flag.
        *self.released.lock().unwrap_or_else(|e| e.into_inner()) = true;
        self.cancel.cancel();
        if let Some(task) = self.task.take() {
            task.abort();
        }
        if let Some(surface) = self.surface.take() {
            surface.clear_source();
        }
    }
}

impl Drop for HlsEngine {
    fn drop(&mut self) {
        self.destroy();
    }
}

/// Fetch the master playlist at `url` and return the absolute URL of the
/// chosen rendition. A media playlist resolves to itself.
async fn resolve_rendition(
    http: &reqwest::Client,
    url: &str,
    max_bandwidth: Option<u64>,
) -> Result<String, EngineError> {
    let response = http.get(url).timeout(MANIFEST_TIMEOUT).send().await?;
    if !response.status().is_success() {
        return Err(EngineError::Status {
            status: response.status().as_u16(),
        });
    }
    let text = response.text().await?;
    let variants = parse_master_playlist(&text)?;

    let Some(variant) = select_variant(&variants, max_bandwidth) else {
        return Ok(url.to_string());
    };
    tracing::debug!(
        bandwidth = variant.bandwidth,
        resolution = ?variant.resolution,
        "Selected rendition"
    );
    resolve_uri(url, &variant.uri)
}

/// Resolve a playlist URI against the URL of the playlist listing it.
pub fn resolve_uri(base: &str, uri: &str) -> Result<String, EngineError> {
    let base_url = reqwest::Url::parse(base).map_err(|e| invalid_uri(base, e))?;
    base_url
        .join(uri)
        .map(String::from)
        .map_err(|e| invalid_uri(uri, e))
}

fn invalid_uri(uri: &str, reason: impl std::fmt::Display) -> EngineError {
    EngineError::InvalidUri {
        uri: uri.to_string(),
        reason: reason.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use axum::routing::get;
    use axum::Router;

    use super::*;
    use crate::playback::surface::SurfaceError;

    #[derive(Default)]
    struct RecordingSurface {
        sources: Mutex<Vec<String>>,
        cleared: Mutex<u32>,
    }

    impl Surface for RecordingSurface {
        fn can_play_type(&self, _media_type: &str) -> bool {
            false
        }

        fn set_source(&self, url: &str) -> Result<(), SurfaceError> {
            self.sources.lock().unwrap().push(url.to_string());
            Ok(())
        }

        fn clear_source(&self) {
            *self.cleared.lock().unwrap() += 1;
        }
    }

    async fn serve_master(body: &'static str) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let base = format!("http://{}", listener.local_addr().unwrap());
        let app = Router::new().route("/hls/a1/master.m3u8", get(move || async move { body }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("{base}/hls/a1/master.m3u8")
    }

    async fn wait_for_source(surface: &RecordingSurface) -> String {
        for _ in 0..200 {
            if let Some(s) = surface.sources.lock().unwrap().first() {
                return s.clone();
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        panic!("surface never received a source");
    }

    #[test]
    fn resolve_relative_and_absolute_uris() {
        let base = "https://cdn.example/hls/a1/master.m3u8";
        assert_eq!(
            resolve_uri(base, "720p/index.m3u8").unwrap(),
            "https://cdn.example/hls/a1/720p/index.m3u8"
        );
        assert_eq!(
            resolve_uri(base, "https://other/x.m3u8").unwrap(),
            "https://other/x.m3u8"
        );
        assert!(resolve_uri("not a url", "x.m3u8").is_err());
    }

    #[test]
    fn attach_without_source_fails() {
        let mut engine = HlsEngine::new(reqwest::Client::new(), None);
        let err = engine
            .attach_media(Arc::new(RecordingSurface::default()))
            .unwrap_err();
        assert!(matches!(err, EngineError::NoSource));
    }

    #[tokio::test]
    async fn binds_highest_rendition_within_cap() {
        let url = serve_master(
            "#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow.m3u8\n#EXT-X-STREAM-INF:BANDWIDTH=4000000\nhigh.m3u8\n",
        )
        .await;
        let surface = Arc::new(RecordingSurface::default());
        let mut engine = HlsEngineFactory::new(true, Some(1_000_000)).create();

        engine.load_source(&url);
        engine.attach_media(surface.clone()).unwrap();

        let bound = wait_for_source(&surface).await;
        assert!(bound.ends_with("/hls/a1/low.m3u8"), "{bound}");
    }

    #[tokio::test]
    async fn unreadable_manifest_falls_back_to_master_url() {
        let url = serve_master("<html>oops</html>").await;
        let surface = Arc::new(RecordingSurface::default());
        let mut engine = HlsEngine::new(reqwest::Client::new(), None);

        engine.load_source(&url);
        engine.attach_media(surface.clone()).unwrap();

        assert_eq!(wait_for_source(&surface).await, url);
    }

    /// Surface whose `set_source` blocks until the test opens the gate,
    /// logging every call in order.
    struct GatedSurface {
        entered: Mutex<Option<std::sync::mpsc::Sender<()>>>,
        gate: Mutex<std::sync::mpsc::Receiver<()>>,
        log: Mutex<Vec<&'static str>>,
    }

    impl Surface for GatedSurface {
        fn can_play_type(&self, _media_type: &str) -> bool {
            false
        }

        fn set_source(&self, _url: &str) -> Result<(), SurfaceError> {
            if let Some(entered) = self.entered.lock().unwrap().take() {
                let _ = entered.send(());
            }
            let _ = self.gate.lock().unwrap().recv();
            self.log.lock().unwrap().push("set");
            Ok(())
        }

        fn clear_source(&self) {
            self.log.lock().unwrap().push("clear");
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn destroy_during_bind_clears_after_the_bind() {
        let url = serve_master("<html>not a playlist</html>").await;
        let (entered_tx, entered_rx) = std::sync::mpsc::channel();
        let (gate_tx, gate_rx) = std::sync::mpsc::channel();
        let surface = Arc::new(GatedSurface {
            entered: Mutex::new(Some(entered_tx)),
            gate: Mutex::new(gate_rx),
            log: Mutex::new(Vec::new()),
        });

        let mut engine = HlsEngine::new(reqwest::Client::new(), None);
        engine.load_source(&url);
        engine.attach_media(surface.clone()).unwrap();

        // The bind task is now inside `set_source`.
        tokio::task::spawn_blocking(move || entered_rx.recv_timeout(Duration::from_secs(5)))
            .await
            .unwrap()
            .unwrap();

        let destroyer = tokio::task::spawn_blocking(move || engine.destroy());
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!destroyer.is_finished());

        gate_tx.send(()).unwrap();
        destroyer.await.unwrap();

        assert_eq!(*surface.log.lock().unwrap(), vec!["set", "clear"]);
    }

    #[tokio::test]
    async fn nothing_binds_after_destroy() {
        let url = serve_master("#EXTM3U\n#EXT-X-STREAM-INF:BANDWIDTH=800000\nlow.m3u8\n").await;
        let surface = Arc::new(RecordingSurface::default());
        let mut engine = HlsEngine::new(reqwest::Client::new(), None);
        engine.load_source(&url);
        engine.attach_media(surface.clone()).unwrap();
        engine.destroy();

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert!(surface.sources.lock().unwrap().is_empty());
        assert_eq!(*surface.cleared.lock().unwrap(), 1);
    }

    #[tokio::test]
    async fn destroy_clears_surface_once() {
        let surface = Arc::new(RecordingSurface::default());
        let mut engine = HlsEngine::new(reqwest::Client::new(), None);
        engine.load_source("http://127.0.0.1:9/master.m3u8");
        engine.attach_media(surface.clone()).unwrap();

        engine.destroy();
        engine.destroy();
        drop(engine);

        assert_eq!(*surface.cleared.lock().unwrap(), 1);
    }
}
