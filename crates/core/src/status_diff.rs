//! Status changes between two upload-list snapshots.
//!
//! The list view refetches the whole collection; diffing consecutive
//! snapshots recovers which uploads moved and whether any of them moved
//! backwards (which the server should never do).

use std::collections::HashMap;

use crate::models::UploadRecord;
use crate::status::MediaStatus;
use crate::types::RecordId;

/// One upload whose status differs between two snapshots.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusChange {
    pub id: RecordId,
    pub title: String,
    /// `None` when the upload is new in the later snapshot.
    pub from: Option<MediaStatus>,
    pub to: MediaStatus,
}

impl StatusChange {
    /// Whether the move violates the status lifecycle.
    pub fn is_regression(&self) -> bool {
        match self.from {
            Some(from) => !from.can_transition_to(self.to),
            None => false,
        }
    }
}

/// Compute the status changes from `previous` to `current`.
///
/// Uploads absent from `current` are ignored (the client never deletes).
/// The result follows the order of `current`.
pub fn diff_statuses(previous: &[UploadRecord], current: &[UploadRecord]) -> Vec<StatusChange> {
    let before: HashMap<&str, MediaStatus> = previous
        .iter()
        .map(|record| (record.id.as_str(), record.status))
        .collect();

    current
        .iter()
        .filter_map(|record| {
            let from = before.get(record.id.as_str()).copied();
            if from == Some(record.status) {
                return None;
            }
            Some(StatusChange {
                id: record.id.clone(),
                title: record.title.clone(),
                from,
                to: record.status,
            })
        })
        .collect()
}
