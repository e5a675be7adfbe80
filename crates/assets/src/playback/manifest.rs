//! HLS master playlist parsing.
//!
//! Only what rendition selection needs: the `#EXT-X-STREAM-INF` variants
//! with their bandwidth, optional resolution and URI.

/// Required first line of every playlist.
pub const PLAYLIST_HEADER: &str = "#EXTM3U";

const STREAM_INF: &str = "#EXT-X-STREAM-INF:";

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum ManifestError {
    #[error("Not an HLS playlist (missing {PLAYLIST_HEADER})")]
    MissingHeader,

    #[error("Variant on line {line} has no BANDWIDTH")]
    MissingBandwidth { line: usize },

    #[error("Variant on line {line} has no URI")]
    MissingUri { line: usize },
}

/// One rendition listed in a master playlist.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Variant {
    /// Peak bits per second.
    pub bandwidth: u64,
    /// `WIDTHxHEIGHT`, when given.
    pub resolution: Option<String>,
    /// Media playlist URI, possibly relative to the master playlist.
    pub uri: String,
}

/// Parse the variants of a master playlist.
///
/// A media playlist (segments, no variants) parses to an empty list.
pub fn parse_master_playlist(text: &str) -> Result<Vec<Variant>, ManifestError> {
    let mut lines = text
        .lines()
        .enumerate()
        .map(|(i, l)| (i + 1, l.trim()))
        .filter(|(_, l)| !l.is_empty());

    match lines.next() {
        Some((_, first)) if first == PLAYLIST_HEADER => {}
        _ => return Err(ManifestError::MissingHeader),
    }

    let mut variants = Vec::new();
    while let Some((line, content)) = lines.next() {
        let Some(attrs) = content.strip_prefix(STREAM_INF) else {
            continue;
        };
        let attrs = parse_attributes(attrs);

        let bandwidth = attrs
            .iter()
            .find(|(k, _)| k == "BANDWIDTH")
            .and_then(|(_, v)| v.parse::<u64>().ok())
            .ok_or(ManifestError::MissingBandwidth { line })?;
        let resolution = attrs
            .iter()
            .find(|(k, _)| k == "RESOLUTION")
            .map(|(_, v)| v.clone());

        // The URI is the next line that is not a tag or comment.
        let uri = lines
            .by_ref()
            .map(|(_, l)| l)
            .find(|l| !l.starts_with('#'))
            .ok_or(ManifestError::MissingUri { line })?;

        variants.push(Variant {
            bandwidth,
            resolution,
            uri: uri.to_string(),
        });
    }

    Ok(variants)
}

/// Highest-bandwidth variant within `max_bandwidth`, or the lowest one
/// when none fits the cap.
pub fn select_variant(variants: &[Variant], max_bandwidth: Option<u64>) -> Option<&Variant> {
    let cap = max_bandwidth.unwrap_or(u64::MAX);
    variants
        .iter()
        .filter(|v| v.bandwidth <= cap)
        .max_by_key(|v| v.bandwidth)
        .or_else(|| variants.iter().min_by_key(|v| v.bandwidth))
}

/// Split an attribute list (`KEY=value,KEY="quoted, value"`) into pairs.
fn parse_attributes(input: &str) -> Vec<(String, String)> {
    let mut pairs = Vec::new();
    let mut rest = input;

    while !rest.is_empty() {
        let Some(eq) = rest.find('=') else { break };
        let key = rest[..eq].trim().to_string();
        rest = &rest[eq + 1..];

        let value;
        if let Some(quoted) = rest.strip_prefix('"') {
            let end = quoted.find('"').unwrap_or(quoted.len());
            value = quoted[..end].to_string();
            rest = quoted.get(end + 1..).unwrap_or("");
            rest = rest.strip_prefix(',').unwrap_or(rest);
        } else {
            let end = rest.find(',').unwrap_or(rest.len());
            value = rest[..end].trim().to_string();
            rest = rest.get(end + 1..).unwrap_or("");
        }
        pairs.push((key, value));
    }

    pairs
}
