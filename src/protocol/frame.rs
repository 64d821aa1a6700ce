//! Inbound frames.
//!
//! Every text message from the service is a JSON object with a `type` tag:
//!
//! ```json
//! { "type": "playbackStateUpdate", "data": { "name": "Song", ... } }
//! ```
//!
//! The tag is the only thing that ties a response to a request. There is no
//! correlation identifier.

use std::fmt;

use serde_json::Value;

use crate::error::{Error, Result};

/// A decoded inbound frame: its tag plus the normalized payload.
#[derive(Clone, Debug, PartialEq)]
pub struct Frame {
    /// The `type` discriminator.
    pub tag: String,

    /// Payload with any `data` envelope unwrapped.
    pub payload: Value,
}

impl Frame {
    /// Pushed on every player state change, and sent in response to
    /// [`Command::GetCurrentItem`](super::Command::GetCurrentItem).
    pub const PLAYBACK_STATE_UPDATE: &'static str = "playbackStateUpdate";

    /// Response to [`Command::GetQueue`](super::Command::GetQueue).
    pub const QUEUE: &'static str = "queue";

    /// Response to [`Command::GetLyrics`](super::Command::GetLyrics).
    pub const LYRICS: &'static str = "lyrics";

    /// Response to [`Command::Search`](super::Command::Search).
    pub const SEARCH_RESULTS: &'static str = "searchResults";

    /// Parses a text frame.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload`](crate::error::ErrorKind::MalformedPayload)
    /// if `text` is not JSON, not an object, or has no string `type` tag.
    pub fn parse(text: &str) -> Result<Self> {
        let value: Value = serde_json::from_str(text)?;
        Self::from_value(&value)
    }

    /// Extracts tag and payload from an already parsed frame.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload`](crate::error::ErrorKind::MalformedPayload)
    /// if `value` has no string `type` tag.
    pub fn from_value(value: &Value) -> Result<Self> {
        let tag = value
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| Error::malformed("frame without type tag"))?;

        Ok(Self {
            tag: tag.to_owned(),
            payload: super::payload(value).into_owned(),
        })
    }

    /// Returns whether this frame carries player state.
    #[must_use]
    pub fn is_playback_state(&self) -> bool {
        self.tag == Self::PLAYBACK_STATE_UPDATE
    }
}

impl fmt::Display for Frame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.tag)
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn parses_tag_and_payload() {
        let frame = Frame::parse(r#"{"type":"queue","data":{"items":[]}}"#).unwrap();
        assert_eq!(frame.tag, Frame::QUEUE);
        assert_eq!(frame.payload, json!({ "items": [] }));
        assert!(!frame.is_playback_state());
    }

    #[test]
    fn rejects_invalid_json() {
        let err = Frame::parse("{not json").unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedPayload);
    }

    #[test]
    fn rejects_missing_tag() {
        let err = Frame::parse(r#"{"data":{}}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedPayload);

        let err = Frame::parse(r#"{"type":42}"#).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedPayload);
    }

    #[test]
    fn unknown_tags_are_kept() {
        let frame = Frame::parse(r#"{"type":"somethingNew","x":1}"#).unwrap();
        assert_eq!(frame.tag, "somethingNew");
        assert_eq!(frame.payload, json!({ "x": 1 }));
    }
}
