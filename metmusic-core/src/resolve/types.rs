//! Types for track resolution responses

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Shown when the resolution service sends no title
pub const UNKNOWN_TITLE: &str = "Unknown title";

/// Shown when the resolution service sends no artist
pub const UNKNOWN_ARTIST: &str = "Unknown artist";

/// Shown when the resolution service sends no album
pub const UNKNOWN_ALBUM: &str = "Unknown album";

/// Response of the song URL endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct UrlResponse {
    #[serde(default)]
    pub data: Vec<UrlEntry>,
}

/// One result of the song URL endpoint
#[derive(Debug, Clone, Deserialize)]
pub struct UrlEntry {
    #[serde(default)]
    pub url: Option<String>,
    #[serde(default)]
    pub track_info: Option<TrackInfoPayload>,
}

/// Optional metadata nested in a result
#[derive(Debug, Clone, Deserialize)]
pub struct TrackInfoPayload {
    #[serde(default, alias = "title")]
    pub name: Option<String>,
    #[serde(default, alias = "artists")]
    pub ar: Vec<NamedPayload>,
    #[serde(default, alias = "album")]
    pub al: Option<NamedPayload>,
}

/// Artist or album reference
#[derive(Debug, Clone, Deserialize)]
pub struct NamedPayload {
    #[serde(default)]
    pub name: Option<String>,
}

/// Descriptive metadata for a track
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackMetadata {
    pub title: String,
    pub artists: Vec<String>,
    pub album: String,
}

impl TrackMetadata {
    /// Metadata used when the service sends none
    pub fn placeholder() -> Self {
        Self {
            title: UNKNOWN_TITLE.to_string(),
            artists: Vec::new(),
            album: UNKNOWN_ALBUM.to_string(),
        }
    }

    /// Artists joined for display
    pub fn artist_line(&self) -> String {
        if self.artists.is_empty() {
            UNKNOWN_ARTIST.to_string()
        } else {
            self.artists.join(" / ")
        }
    }
}

impl From<&TrackInfoPayload> for TrackMetadata {
    fn from(info: &TrackInfoPayload) -> Self {
        let non_empty = |s: &Option<String>| s.clone().filter(|s| !s.trim().is_empty());

        Self {
            title: non_empty(&info.name).unwrap_or_else(|| UNKNOWN_TITLE.to_string()),
            artists: info.ar.iter().filter_map(|a| non_empty(&a.name)).collect(),
            album: info
                .al
                .as_ref()
                .and_then(|a| non_empty(&a.name))
                .unwrap_or_else(|| UNKNOWN_ALBUM.to_string()),
        }
    }
}

/// A track identifier resolved to something the output device can play
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedTrack {
    pub track_id: String,
    pub stream_url: String,
    /// `None` when the service sent no `track_info`
    pub metadata: Option<TrackMetadata>,
    /// The full response body, kept for status queries
    pub response: Value,
}

impl ResolvedTrack {
    /// Metadata, or the placeholder when the service sent none
    pub fn metadata_or_placeholder(&self) -> TrackMetadata {
        self.metadata.clone().unwrap_or_else(TrackMetadata::placeholder)
    }
}
