//! Client-side state for uploaded media.
//!
//! - [`store`]: a switch-to-latest cache of the upload list or of one
//!   asset, refreshed by explicit calls and by live events.
//! - [`playback`]: binds an adaptive-streaming strategy to a
//!   presentation surface once an asset is `ready`.

pub mod playback;
pub mod store;

pub use playback::{
    AttachOutcome, EngineFactory, HlsEngineFactory, PlaybackError, PlaybackHandle,
    PlaybackSessionManager, PlayerProcessSurface, PlaylistSource, StrategyKind, StreamingEngine,
    Surface, SurfaceError,
};
pub use store::{AssetDetailFetch, AssetStatusStore, Fetch, Snapshot, StoreError, UploadListFetch};
