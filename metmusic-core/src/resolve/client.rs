//! Track resolution HTTP client

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument, warn};

use super::types::{ResolvedTrack, TrackMetadata, UrlResponse};
use crate::config::ResolverConfig;

/// Errors that can occur while resolving a track
#[derive(Debug, Error)]
pub enum ResolveError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Unexpected response (HTTP {0})")]
    Status(u16),

    #[error("Malformed response: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("No playable URL for track {0}")]
    NoResults(String),
}

/// Client for the song URL lookup service
#[derive(Debug, Clone)]
pub struct ResolverClient {
    http: Client,
    base_url: String,
    quality: String,
}

impl ResolverClient {
    pub fn new(config: &ResolverConfig) -> Result<Self, ResolveError> {
        let http = Client::builder()
            .connect_timeout(Duration::from_millis(config.connect_timeout_ms))
            .timeout(Duration::from_millis(config.request_timeout_ms))
            .build()?;

        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            quality: config.quality.clone(),
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/api/song/url/v1/", self.base_url)
    }

    /// Look a track up on the service. Does not consult any cache.
    #[instrument(skip(self), fields(base_url = %self.base_url))]
    pub async fn resolve(&self, track_id: &str) -> Result<ResolvedTrack, ResolveError> {
        debug!("Resolving track");

        let resp = self
            .http
            .get(self.endpoint())
            .query(&[("id", track_id), ("level", self.quality.as_str())])
            .send()
            .await
            .map_err(|e| {
                warn!("Resolution request failed: {:?}", e);
                e
            })?;

        if !resp.status().is_success() {
            return Err(ResolveError::Status(resp.status().as_u16()));
        }

        let body = resp.text().await?;
        parse_resolution(track_id, &body)
    }
}

/// Turn a response body into a resolved track. The first result's `url` is
/// the stream; an empty list or an empty URL counts as a failure.
pub fn parse_resolution(track_id: &str, body: &str) -> Result<ResolvedTrack, ResolveError> {
    let response: Value = serde_json::from_str(body)?;
    let parsed: UrlResponse = serde_json::from_value(response.clone())?;

    let first = parsed
        .data
        .first()
        .ok_or_else(|| ResolveError::NoResults(track_id.to_string()))?;

    let stream_url = first
        .url
        .clone()
        .filter(|url| !url.is_empty())
        .ok_or_else(|| ResolveError::NoResults(track_id.to_string()))?;

    Ok(ResolvedTrack {
        track_id: track_id.to_string(),
        stream_url,
        metadata: first.track_info.as_ref().map(TrackMetadata::from),
        response,
    })
}
