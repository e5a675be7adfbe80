//! Playback session management.
//!
//! A [`Surface`] is where video ends up (a player window, a process).
//! A [`StreamingEngine`] is the software adaptive-streaming strategy; the
//! native strategy hands the manifest URL straight to the surface.
//! [`PlaybackSessionManager`] picks exactly one strategy per session and
//! owns its release.

pub mod engine;
pub mod manager;
pub mod manifest;
pub mod surface;

pub use engine::{EngineError, EngineFactory, HlsEngine, HlsEngineFactory, StreamingEngine};
pub use manager::{
    AttachOutcome, PlaybackError, PlaybackHandle, PlaybackSessionManager, PlaylistSource,
    StrategyKind,
};
pub use manifest::{parse_master_playlist, select_variant, ManifestError, Variant};
pub use surface::{PlayerProcessSurface, Surface, SurfaceError};
