//! Shared domain types for the Gamma upload and playback client.
//!
//! Everything in this crate is pure: records and wire DTOs, the media
//! status lifecycle, the media-type admission check and snapshot diffing.
//! Network I/O lives in `gamma-client`, `gamma-live` and `gamma-assets`.

pub mod admission;
pub mod error;
pub mod models;
pub mod status;
pub mod status_diff;
pub mod types;

pub use error::CoreError;
pub use models::{AssetRecord, Credentials, PlaybackUrl, UploadRecord, UploadTicket};
pub use status::MediaStatus;
