//! HTTP side of the Gamma client.
//!
//! - [`GammaApi`] wraps every request/response endpoint of the API.
//! - [`UploadClient`] runs the two-phase presigned upload protocol and
//!   reports phase and byte progress.
//! - [`AuthSession`] tracks the local logged-in flag around login/logout.

pub mod api;
pub mod auth;
pub mod progress;
pub mod upload;

pub use api::{ApiError, GammaApi};
pub use auth::{AuthSession, LogoutOutcome};
pub use upload::{
    FailureReason, UploadClient, UploadFailure, UploadFile, UploadPhase, UploadReceipt,
    UploadSession, UploadTransport, UploadUpdate,
};
