//! Processing status shared by uploads and assets.
//!
//! The server owns these values; the client only reads them. Transitions
//! move forward along `pending -> uploaded -> processing -> ready`, and
//! `failed` can be entered from any state that is not already `failed`.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::CoreError;

/// Status string for a freshly created upload session.
pub const STATUS_PENDING: &str = "pending";
/// Status string once the bytes landed in storage.
pub const STATUS_UPLOADED: &str = "uploaded";
/// Status string while transcoding runs.
pub const STATUS_PROCESSING: &str = "processing";
/// Status string once renditions are playable.
pub const STATUS_READY: &str = "ready";
/// Status string for a terminal failure.
pub const STATUS_FAILED: &str = "failed";

/// Lifecycle state of an upload or asset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MediaStatus {
    Pending,
    Uploaded,
    Processing,
    Ready,
    Failed,
}

impl MediaStatus {
    /// Canonical lowercase wire form.
    pub fn as_str(&self) -> &'static str {
        match self {
            MediaStatus::Pending => STATUS_PENDING,
            MediaStatus::Uploaded => STATUS_UPLOADED,
            MediaStatus::Processing => STATUS_PROCESSING,
            MediaStatus::Ready => STATUS_READY,
            MediaStatus::Failed => STATUS_FAILED,
        }
    }

    /// Position on the forward chain. `Failed` sits outside the chain.
    fn rank(&self) -> Option<u8> {
        match self {
            MediaStatus::Pending => Some(0),
            MediaStatus::Uploaded => Some(1),
            MediaStatus::Processing => Some(2),
            MediaStatus::Ready => Some(3),
            MediaStatus::Failed => None,
        }
    }

    /// Whether playback may be attempted.
    pub fn is_ready(&self) -> bool {
        matches!(self, MediaStatus::Ready)
    }

    /// `Ready` and `Failed` never change again.
    pub fn is_terminal(&self) -> bool {
        matches!(self, MediaStatus::Ready | MediaStatus::Failed)
    }

    /// Whether moving from `self` to `next` respects the lifecycle.
    ///
    /// Staying in the same state is allowed (refetches are idempotent).
    pub fn can_transition_to(&self, next: MediaStatus) -> bool {
        if *self == next {
            return true;
        }
        match (self.rank(), next.rank()) {
            // Anything not yet failed may fail.
            (Some(_), None) => true,
            (Some(from), Some(to)) => to > from,
            (None, _) => false,
        }
    }
}

impl fmt::Display for MediaStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for MediaStatus {
    type Err = CoreError;

    /// Case-insensitive; the API has been seen emitting both `ready` and `Ready`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            STATUS_PENDING => Ok(MediaStatus::Pending),
            STATUS_UPLOADED => Ok(MediaStatus::Uploaded),
            STATUS_PROCESSING => Ok(MediaStatus::Processing),
            STATUS_READY => Ok(MediaStatus::Ready),
            STATUS_FAILED => Ok(MediaStatus::Failed),
            _ => Err(CoreError::UnknownStatus(s.to_string())),
        }
    }
}

impl Serialize for MediaStatus {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for MediaStatus {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        raw.parse().map_err(serde::de::Error::custom)
    }
}
