//! Composition root of the Gamma client.
//!
//! Wires the upload client, the live channel, the status stores and the
//! playback manager together, and loads their configuration.

pub mod config;
pub mod controller;
pub mod detail;

pub use config::{ClientConfig, ConfigError};
pub use controller::{UploadOrchestrationController, UploadRejected, UploadUiState};
pub use detail::{AssetDetailController, PlayerView};
