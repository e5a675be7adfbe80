/// Server-assigned identifiers are opaque strings (UUIDs on the wire).
pub type RecordId = String;

/// All timestamps are UTC.
pub type Timestamp = chrono::DateTime<chrono::Utc>;
