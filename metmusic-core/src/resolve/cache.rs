//! Per-session memo of resolved tracks
//!
//! Entries are never evicted: a session only plays a handful of distinct
//! tracks and stream URLs stay valid for its lifetime. Failures are never
//! stored, so a later lookup retries the service.

use std::collections::HashMap;

use super::types::ResolvedTrack;

#[derive(Debug, Default)]
pub(crate) struct TrackCache {
    entries: HashMap<String, ResolvedTrack>,
}

impl TrackCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, track_id: &str) -> Option<&ResolvedTrack> {
        self.entries.get(track_id)
    }

    /// Store a successful resolution, replacing any previous entry
    pub fn insert(&mut self, track: ResolvedTrack) {
        self.entries.insert(track.track_id.clone(), track);
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}
