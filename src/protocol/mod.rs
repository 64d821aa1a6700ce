//! Wire types for the player control websocket.
//!
//! # Submodules
//!
//! * [`frame`] - Inbound frames: `{ "type": ..., ...payload }`
//! * [`command`] - Outbound commands: `{ "action": ..., ...args }`
//!
//! # Payload Envelopes
//!
//! The service is inconsistent about where it puts payload fields. The same
//! message may arrive as:
//!
//! ```json
//! { "type": "playbackStateUpdate", "name": "Song", "isPlaying": true }
//! { "type": "playbackStateUpdate", "data": { "name": "Song", "isPlaying": true } }
//! ```
//!
//! [`payload`] normalizes both into the same value, and every decoder runs its
//! input through it, so decoders accept either form.

pub mod command;
pub mod frame;

pub use command::{Command, Envelope, MediaKind};
pub use frame::Frame;

use std::{borrow::Cow, fmt::Debug};

use serde::Deserialize;
use serde_json::Value;

use crate::error::{Error, Result};

/// Key of the optional one-level payload envelope.
const DATA: &str = "data";

/// Key of the inbound tag.
const TYPE: &str = "type";

/// Unwraps an optional `data` envelope.
///
/// * Objects with a `data` object: the `data` fields, plus any sibling fields
///   that `data` does not already have. The `type` tag is never merged.
/// * Objects with a non-object `data` (such as a lyrics array): that value.
/// * Anything else is returned as is, minus a top-level `type` tag.
#[must_use]
pub fn payload(value: &Value) -> Cow<'_, Value> {
    let Some(object) = value.as_object() else {
        return Cow::Borrowed(value);
    };

    match object.get(DATA) {
        Some(Value::Object(data)) => {
            let mut merged = data.clone();
            for (key, field) in object {
                if key != DATA && key != TYPE && !merged.contains_key(key) {
                    merged.insert(key.clone(), field.clone());
                }
            }
            Cow::Owned(Value::Object(merged))
        }
        Some(data) if !data.is_null() => Cow::Owned(data.clone()),
        _ if object.contains_key(TYPE) => {
            let mut stripped = object.clone();
            stripped.remove(TYPE);
            Cow::Owned(Value::Object(stripped))
        }
        _ => Cow::Borrowed(value),
    }
}

/// Deserializes a payload into a wire structure, reporting failures as
/// malformed payloads.
///
/// `origin` names the entity being decoded and ends up in the log and in the
/// error message.
///
/// # Errors
///
/// Returns [`MalformedPayload`](crate::error::ErrorKind::MalformedPayload) if
/// required fields are absent or of the wrong type.
pub fn decode<'de, T>(value: &'de Value, origin: &str) -> Result<T>
where
    T: Deserialize<'de> + Debug,
{
    match T::deserialize(value) {
        Ok(result) => {
            trace!("{origin}: {result:#?}");
            Ok(result)
        }
        Err(e) => {
            trace!("{origin}: {value:#}");
            Err(Error::malformed(format!("{origin}: {e}")))
        }
    }
}
