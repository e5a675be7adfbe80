//! Live-channel frame types and parser.
//!
//! The server pushes JSON frames shaped `{"type": "<kind>", "data": ...}`.
//! Known kinds decode into a dedicated variant; any other kind is kept as
//! [`LiveEvent::Unknown`] with its raw payload so subscribers can still
//! see it.

use serde::Deserialize;

/// Frame type emitted once transcoding of an upload has finished.
pub const MSG_TYPE_ASSET_PROCESSED: &str = "asset_processed";

/// Raw `{type, data}` envelope.
#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(rename = "type")]
    kind: String,
    #[serde(default)]
    data: serde_json::Value,
}

/// Payload of an `asset_processed` frame.
///
/// Every field is optional; servers have sent both the full
/// `{asset_id, upload_id, status}` form and a bare `{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(from = "RawAssetProcessed")]
pub struct AssetProcessedData {
    pub upload_id: Option<String>,
    pub asset_id: Option<String>,
    pub status: Option<String>,
}

/// Wire form of [`AssetProcessedData`]. `upload_id` wins over `id`.
#[derive(Deserialize)]
struct RawAssetProcessed {
    #[serde(default)]
    upload_id: Option<String>,
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    asset_id: Option<String>,
    #[serde(default)]
    status: Option<String>,
}

impl From<RawAssetProcessed> for AssetProcessedData {
    fn from(raw: RawAssetProcessed) -> Self {
        Self {
            upload_id: raw.upload_id.or(raw.id),
            asset_id: raw.asset_id,
            status: raw.status,
        }
    }
}

/// A decoded server notification.
#[derive(Debug, Clone, PartialEq)]
pub enum LiveEvent {
    /// Transcoding finished; upload and asset views are stale.
    AssetProcessed(AssetProcessedData),

    /// A frame type this client does not know.
    Unknown {
        kind: String,
        data: serde_json::Value,
    },
}

impl LiveEvent {
    /// The wire `type` this event was decoded from.
    pub fn kind(&self) -> &str {
        match self {
            LiveEvent::AssetProcessed(_) => MSG_TYPE_ASSET_PROCESSED,
            LiveEvent::Unknown { kind, .. } => kind,
        }
    }

    /// Whether this event signals finished server-side processing.
    pub fn is_processing_complete(&self) -> bool {
        matches!(self, LiveEvent::AssetProcessed(_))
    }
}

/// Parse a text frame into a typed event.
///
/// Returns `Err` for malformed JSON, a missing `type`, or a known `type`
/// whose `data` has the wrong shape. Callers drop such frames.
pub fn parse_frame(text: &str) -> Result<LiveEvent, serde_json::Error> {
    let envelope: Envelope = serde_json::from_str(text)?;
    match envelope.kind.as_str() {
        MSG_TYPE_ASSET_PROCESSED => {
            // A missing payload means "something finished", not a bad frame.
            let data = if envelope.data.is_null() {
                AssetProcessedData::default()
            } else {
                serde_json::from_value(envelope.data)?
            };
            Ok(LiveEvent::AssetProcessed(data))
        }
        _ => Ok(LiveEvent::Unknown {
            kind: envelope.kind,
            data: envelope.data,
        }),
    }
}
