//! Push channel wire messages

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Inbound message type carrying playback state
const FEEDBACK_TYPE: &str = "feedback";

/// Subscribe message sent once the channel is open
#[derive(Debug, Clone, Serialize)]
pub struct ListenRequest {
    #[serde(rename = "type")]
    pub kind: &'static str,
    #[serde(rename = "SessionId")]
    pub session_ids: Vec<String>,
}

impl ListenRequest {
    pub fn new(session_id: &str) -> Self {
        Self {
            kind: "listen",
            session_ids: vec![session_id.to_string()],
        }
    }
}

/// Envelope of every inbound message. Fields are loose on purpose: unrelated
/// traffic on the channel must not count as malformed.
#[derive(Debug, Deserialize)]
struct InboundMessage {
    #[serde(rename = "type", default)]
    kind: Option<String>,
    #[serde(rename = "SessionId", default)]
    session_id: Option<Value>,
    #[serde(default)]
    data: Option<Value>,
}

/// Payload of a `feedback` message
#[derive(Debug, Deserialize)]
struct FeedbackData {
    status: bool,
    #[serde(rename = "songMid", default)]
    song_mid: Option<String>,
    #[serde(rename = "systemTime", default)]
    system_time: f64,
    #[serde(rename = "currentTime", default)]
    current_time: f64,
}

/// A message that could not be decoded
#[derive(Debug, Error)]
#[error("Malformed message: {0}")]
pub struct MalformedMessage(#[from] serde_json::Error);

/// Authoritative playback snapshot pushed by the server
#[derive(Debug, Clone, PartialEq)]
pub struct PlaybackFeedback {
    pub is_playing: bool,
    pub track_id: String,
    /// Server wall clock when the snapshot was taken (ms since epoch)
    pub server_wall_clock_ms: f64,
    /// Track position on the server at that instant (seconds)
    pub server_elapsed_secs: f64,
}

impl PlaybackFeedback {
    /// Feedback meaning "nothing is playing"
    pub fn stopped() -> Self {
        Self {
            is_playing: false,
            track_id: String::new(),
            server_wall_clock_ms: 0.0,
            server_elapsed_secs: 0.0,
        }
    }

    /// Wall-clock instant (ms since epoch) at which the track started, such that
    /// `now - start` is where playback should be. Meaningless when not playing.
    pub fn authoritative_start_ms(&self) -> f64 {
        self.server_wall_clock_ms - self.server_elapsed_secs * 1000.0
    }
}

/// Decode an inbound text frame.
///
/// Returns `Ok(None)` for well-formed messages that are not feedback for
/// `session_id`, and an error only when the text is not the expected JSON.
pub fn parse_feedback(
    text: &str,
    session_id: &str,
) -> Result<Option<PlaybackFeedback>, MalformedMessage> {
    let message: InboundMessage = serde_json::from_str(text)?;

    if message.kind.as_deref() != Some(FEEDBACK_TYPE) {
        return Ok(None);
    }
    if message.session_id.as_ref().and_then(Value::as_str) != Some(session_id) {
        return Ok(None);
    }

    let data: FeedbackData = serde_json::from_value(message.data.unwrap_or(Value::Null))?;

    Ok(Some(PlaybackFeedback {
        is_playing: data.status,
        track_id: data.song_mid.unwrap_or_default(),
        server_wall_clock_ms: data.system_time,
        server_elapsed_secs: data.current_time,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_listen_request_shape() {
        let json = serde_json::to_value(ListenRequest::new("abc")).unwrap();
        assert_eq!(json, serde_json::json!({ "type": "listen", "SessionId": ["abc"] }));
    }

    #[test]
    fn test_feedback_for_our_session() {
        let text = r#"{"type":"feedback","SessionId":"s1","data":{"status":true,"songMid":"A","systemTime":1700000010000,"currentTime":10}}"#;
        let feedback = parse_feedback(text, "s1").unwrap().unwrap();

        assert!(feedback.is_playing);
        assert_eq!(feedback.track_id, "A");
        assert_eq!(feedback.authoritative_start_ms(), 1_700_000_000_000.0);
    }

    #[test]
    fn test_fractional_elapsed() {
        let text = r#"{"type":"feedback","SessionId":"s1","data":{"status":true,"songMid":"A","systemTime":1000000,"currentTime":1.25}}"#;
        let feedback = parse_feedback(text, "s1").unwrap().unwrap();
        assert_eq!(feedback.authoritative_start_ms(), 998_750.0);
    }

    #[test]
    fn test_other_session_is_ignored() {
        let text = r#"{"type":"feedback","SessionId":"s2","data":{"status":true,"songMid":"A","systemTime":1,"currentTime":0}}"#;
        assert!(parse_feedback(text, "s1").unwrap().is_none());
    }

    #[test]
    fn test_other_type_is_ignored() {
        let text = r#"{"type":"welcome","SessionId":["s1"]}"#;
        assert!(parse_feedback(text, "s1").unwrap().is_none());

        assert!(parse_feedback("{}", "s1").unwrap().is_none());
    }

    #[test]
    fn test_stopped_feedback_without_track() {
        let text = r#"{"type":"feedback","SessionId":"s1","data":{"status":false,"songMid":null}}"#;
        let feedback = parse_feedback(text, "s1").unwrap().unwrap();
        assert!(!feedback.is_playing);
        assert!(feedback.track_id.is_empty());
    }

    #[test]
    fn test_malformed_json() {
        assert!(parse_feedback("not json", "s1").is_err());
        // Right envelope, broken payload
        let text = r#"{"type":"feedback","SessionId":"s1","data":{"status":"yes"}}"#;
        assert!(parse_feedback(text, "s1").is_err());
    }
}
