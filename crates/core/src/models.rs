//! Records and request/response bodies exchanged with the Gamma API.
//!
//! The API serialises its database rows with Go field names (`ID`,
//! `S3Key`, `HlsRoot`, ...), so the record types rename every field
//! explicitly. Session-creation and playlist bodies use snake_case.

use serde::{Deserialize, Serialize};

use crate::status::MediaStatus;
use crate::types::{RecordId, Timestamp};

/// A submitted file as tracked by the server.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadRecord {
    #[serde(rename = "ID")]
    pub id: RecordId,
    /// Display name, derived from the original filename.
    #[serde(rename = "Title", default)]
    pub title: String,
    /// Storage location token handed out at session creation.
    #[serde(rename = "S3Key", default)]
    pub storage_key: String,
    #[serde(rename = "Status")]
    pub status: MediaStatus,
    #[serde(rename = "CreatedAt", default)]
    pub created_at: Option<Timestamp>,
    #[serde(rename = "UpdatedAt", default)]
    pub updated_at: Option<Timestamp>,
}

impl UploadRecord {
    /// First dash-separated segment of the id, as shown in list views.
    pub fn short_id(&self) -> &str {
        self.id.split('-').next().unwrap_or(&self.id)
    }
}

/// The playable artifact produced by transcoding an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AssetRecord {
    #[serde(rename = "ID")]
    pub id: RecordId,
    /// Non-owning back reference to the source upload.
    #[serde(rename = "UploadID", default)]
    pub upload_id: RecordId,
    /// Manifest root path inside the storage bucket.
    #[serde(rename = "HlsRoot", default)]
    pub playback_root: String,
    #[serde(rename = "Status")]
    pub status: MediaStatus,
    #[serde(rename = "CreatedAt", default)]
    pub created_at: Option<Timestamp>,
    #[serde(rename = "UpdatedAt", default)]
    pub updated_at: Option<Timestamp>,
}

/// Body of `POST /uploads`.
#[derive(Debug, Clone, Serialize)]
pub struct CreateUploadRequest<'a> {
    pub filename: &'a str,
}

/// Response of `POST /uploads`: where to send the bytes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadTicket {
    pub id: RecordId,
    /// Short-lived presigned target for the raw `PUT`.
    #[serde(rename = "upload_url")]
    pub upload_target: String,
    #[serde(rename = "key")]
    pub storage_key: String,
}

/// Response of `GET /assets/{id}/playlist`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackUrl {
    pub url: String,
}

/// Body of `POST /auth/login`.
#[derive(Clone, Serialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}
