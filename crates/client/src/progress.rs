//! Byte-progress accounting for streamed transfers.

use std::sync::Arc;

use bytes::Bytes;
use futures::stream;
use futures::StreamExt;

/// Callback receiving the cumulative number of bytes handed to the transport.
pub type ProgressFn = Arc<dyn Fn(u64) + Send + Sync>;

/// Size of each body chunk, and therefore the progress granularity.
pub const TRANSFER_CHUNK_SIZE: usize = 64 * 1024;

/// `round(100 * sent / total)`, clamped to 100. An empty payload is 100%.
pub fn percent(sent: u64, total: u64) -> u8 {
    if total == 0 {
        return 100;
    }
    let sent = sent.min(total) as u128;
    let total = total as u128;
    // Half-up rounding in integer arithmetic.
    ((200 * sent + total) / (2 * total)) as u8
}

/// Turns raw byte counts into a non-decreasing percentage sequence.
#[derive(Debug)]
pub struct ProgressTracker {
    total: u64,
    last: u8,
}

impl ProgressTracker {
    /// Start at 0% for a payload of `total` bytes.
    pub fn new(total: u64) -> Self {
        Self { total, last: 0 }
    }

    /// Feed the cumulative byte count; returns the new percentage only
    /// when it is strictly greater than the last one returned.
    pub fn advance(&mut self, sent: u64) -> Option<u8> {
        let next = percent(sent, self.total);
        if next > self.last {
            self.last = next;
            Some(next)
        } else {
            None
        }
    }

    /// Highest percentage reported so far.
    pub fn last(&self) -> u8 {
        self.last
    }
}

/// Split a payload into zero-copy chunks of at most `chunk_size` bytes.
pub fn chunked(data: Bytes, chunk_size: usize) -> Vec<Bytes> {
    let chunk_size = chunk_size.max(1);
    let mut chunks = Vec::with_capacity(data.len().div_ceil(chunk_size));
    let mut offset = 0;
    while offset < data.len() {
        let end = (offset + chunk_size).min(data.len());
        chunks.push(data.slice(offset..end));
        offset = end;
    }
    chunks
}

/// Wrap a payload into a streaming request body that reports progress as
/// each chunk is pulled by the connection.
pub fn progress_body(data: Bytes, on_progress: ProgressFn) -> reqwest::Body {
    let mut sent: u64 = 0;
    let chunks = stream::iter(chunked(data, TRANSFER_CHUNK_SIZE)).map(move |chunk| {
        sent += chunk.len() as u64;
        on_progress(sent);
        Ok::<Bytes, std::io::Error>(chunk)
    });
    reqwest::Body::wrap_stream(chunks)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn percent_rounds_half_up() {
        assert_eq!(percent(0, 200), 0);
        assert_eq!(percent(1, 200), 1); // 0.5 -> 1
        assert_eq!(percent(199, 200), 100); // 99.5 -> 100
        assert_eq!(percent(1, 3), 33);
        assert_eq!(percent(2, 3), 67);
    }

    #[test]
    fn percent_of_empty_payload_is_complete() {
        assert_eq!(percent(0, 0), 100);
    }

    #[test]
    fn percent_clamps_overshoot() {
        assert_eq!(percent(500, 100), 100);
    }

    #[test]
    fn tracker_only_reports_increases() {
        let mut tracker = ProgressTracker::new(1000);
        assert_eq!(tracker.advance(0), None);
        assert_eq!(tracker.advance(4), None); // rounds to 0
        assert_eq!(tracker.advance(500), Some(50));
        assert_eq!(tracker.advance(500), None);
        assert_eq!(tracker.advance(400), None); // never goes backwards
        assert_eq!(tracker.advance(1000), Some(100));
        assert_eq!(tracker.last(), 100);
    }

    #[test]
    fn chunked_covers_payload_exactly() {
        let data = Bytes::from(vec![7u8; 10]);
        let chunks = chunked(data, 4);
        let sizes: Vec<usize> = chunks.iter().map(|c| c.len()).collect();
        assert_eq!(sizes, vec![4, 4, 2]);
    }

    #[test]
    fn chunked_empty_payload_has_no_chunks() {
        assert!(chunked(Bytes::new(), 4).is_empty());
    }
}
