//! Media-type detection and the video admission check.
//!
//! Files picked from disk carry no declared media type, so one is derived
//! from the extension. The admission check runs before any network call;
//! the upload protocol itself accepts any media type.

use std::path::Path;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Media type constants
// ---------------------------------------------------------------------------

/// Fallback when the extension is unknown.
pub const MEDIA_TYPE_OCTET_STREAM: &str = "application/octet-stream";

/// HLS manifests, as checked with `can_play_type` on playback surfaces.
pub const MEDIA_TYPE_HLS: &str = "application/vnd.apple.mpegurl";

/// Prefix every admissible upload must carry.
pub const VIDEO_PREFIX: &str = "video/";

/// Known extensions and their media types (lowercase, without the dot).
const EXTENSION_MEDIA_TYPES: &[(&str, &str)] = &[
    ("mp4", "video/mp4"),
    ("m4v", "video/x-m4v"),
    ("mov", "video/quicktime"),
    ("webm", "video/webm"),
    ("mkv", "video/x-matroska"),
    ("avi", "video/x-msvideo"),
    ("mpeg", "video/mpeg"),
    ("mpg", "video/mpeg"),
    ("ts", "video/mp2t"),
    ("ogv", "video/ogg"),
    ("3gp", "video/3gpp"),
    ("wmv", "video/x-ms-wmv"),
    ("flv", "video/x-flv"),
    ("m3u8", MEDIA_TYPE_HLS),
    ("jpg", "image/jpeg"),
    ("jpeg", "image/jpeg"),
    ("png", "image/png"),
    ("gif", "image/gif"),
    ("mp3", "audio/mpeg"),
    ("wav", "audio/wav"),
    ("txt", "text/plain"),
    ("json", "application/json"),
    ("pdf", "application/pdf"),
];

// ---------------------------------------------------------------------------
// Detection
// ---------------------------------------------------------------------------

/// Guess the media type of a file from its extension.
///
/// Returns [`MEDIA_TYPE_OCTET_STREAM`] for unknown or missing extensions.
pub fn media_type_for_path(path: &Path) -> &'static str {
    let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
        return MEDIA_TYPE_OCTET_STREAM;
    };
    let ext = ext.to_ascii_lowercase();
    EXTENSION_MEDIA_TYPES
        .iter()
        .find(|(known, _)| *known == ext)
        .map(|(_, media_type)| *media_type)
        .unwrap_or(MEDIA_TYPE_OCTET_STREAM)
}

// ---------------------------------------------------------------------------
// Admission
// ---------------------------------------------------------------------------

/// Whether a media type is a video type.
pub fn is_video(media_type: &str) -> bool {
    media_type
        .trim()
        .to_ascii_lowercase()
        .starts_with(VIDEO_PREFIX)
}

/// Reject anything that is not `video/*`.
pub fn ensure_video(media_type: &str) -> Result<(), CoreError> {
    if is_video(media_type) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Only video files are allowed, got '{media_type}'"
        )))
    }
}
