//! Time-synced lyrics.
//!
//! The service sends lyrics as a list of lines, bare or wrapped in an object:
//!
//! ```json
//! [{ "startTime": 12.3, "endTime": 15.0, "line": "Hello", "translation": "Hallo" }]
//! { "lines": [ ... ] }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::Result, protocol};

/// Prefix of lines that carry metadata instead of lyrics.
pub const METADATA_MARKER: &str = "lrc:";

/// One line of lyrics with its time span in seconds.
#[derive(Clone, Debug, Deserialize, PartialEq, Serialize)]
pub struct LyricLine {
    #[serde(rename = "startTime")]
    pub start: f64,
    #[serde(rename = "endTime")]
    pub end: f64,
    #[serde(rename = "line")]
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub translation: Option<String>,
}

impl LyricLine {
    /// Returns whether the line is blank or carries metadata.
    #[must_use]
    pub fn is_filler(&self) -> bool {
        let text = self.text.trim();
        text.is_empty() || text.starts_with(METADATA_MARKER)
    }
}

impl fmt::Display for LyricLine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{:.2}] {}", self.start, self.text)
    }
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WireLyrics {
    Lines(Vec<LyricLine>),
    Wrapped { lines: Vec<LyricLine> },
}

/// Decodes lyric lines from a payload, in order.
///
/// # Errors
///
/// Returns [`MalformedPayload`](crate::error::ErrorKind::MalformedPayload)
/// if the payload is not a list of lines or a line lacks its text or times.
pub fn decode(value: &Value) -> Result<Vec<LyricLine>> {
    let payload = protocol::payload(value);
    let wire: WireLyrics = protocol::decode(&payload, "lyrics")?;

    Ok(match wire {
        WireLyrics::Lines(lines) | WireLyrics::Wrapped { lines } => lines,
    })
}

/// Flattens lyric lines to text, one line each, dropping blank and metadata
/// lines.
#[must_use]
pub fn to_plain_text(lines: &[LyricLine]) -> String {
    lines
        .iter()
        .filter(|line| !line.is_filler())
        .fold(String::new(), |mut text, line| {
            text.push_str(&line.text);
            text.push('\n');
            text
        })
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    fn lines(texts: &[&str]) -> Value {
        texts
            .iter()
            .enumerate()
            .map(|(i, text)| {
                #[expect(clippy::cast_precision_loss)]
                let start = i as f64;
                json!({ "startTime": start, "endTime": start + 1.0, "line": text })
            })
            .collect()
    }

    #[test]
    fn plain_text_skips_filler() {
        let decoded = decode(&lines(&["lrc: credits", "", "Hello", "World"])).unwrap();
        assert_eq!(decoded.len(), 4);
        assert_eq!(to_plain_text(&decoded), "Hello\nWorld\n");
    }

    #[test]
    fn wrapped_and_enveloped_lines() {
        let wrapped = json!({ "lines": lines(&["a", "b"]) });
        assert_eq!(decode(&wrapped).unwrap().len(), 2);

        let enveloped = json!({ "type": "lyrics", "data": lines(&["a"]) });
        assert_eq!(decode(&enveloped).unwrap()[0].text, "a");
    }

    #[test]
    fn translation_is_optional() {
        let decoded = decode(&json!([
            { "startTime": 1.5, "endTime": 2.0, "line": "Hallo", "translation": "Hello" },
        ]))
        .unwrap();
        assert_eq!(decoded[0].translation.as_deref(), Some("Hello"));
        assert!((decoded[0].start - 1.5).abs() < f64::EPSILON);
    }

    #[test]
    fn lines_need_text() {
        let err = decode(&json!([{ "startTime": 0, "endTime": 1 }])).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedPayload);
    }

    #[test]
    fn empty_lyrics() {
        assert_eq!(to_plain_text(&decode(&json!([])).unwrap()), "");
    }
}
