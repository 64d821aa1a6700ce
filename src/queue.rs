//! Queue contents, fetched on demand.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{error::Result, protocol, track::Track};

/// The play queue at the time it was requested.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct QueueSnapshot {
    tracks: Vec<Track>,
    autoplay_station: bool,
    restricted: bool,
    position: Option<usize>,
    next_playable: Option<usize>,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireQueue {
    items: Vec<Value>,
    #[serde(default)]
    is_autoplay_station: bool,
    #[serde(default)]
    is_restricted: bool,
    #[serde(default)]
    position: Option<i64>,
    #[serde(default)]
    next_playable_index: Option<i64>,
}

impl QueueSnapshot {
    /// Decodes a queue from a payload.
    ///
    /// Items that do not decode into a track are skipped with a warning.
    /// Negative indices, which the service uses for "none", become `None`.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload`](crate::error::ErrorKind::MalformedPayload)
    /// if `items` is missing or not a list.
    pub fn decode(value: &Value, artwork_size: u32) -> Result<Self> {
        let payload = protocol::payload(value);
        let wire: WireQueue = protocol::decode(&payload, "queue")?;

        let tracks = wire
            .items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| match Track::decode(item, artwork_size) {
                Ok(track) => Some(track),
                Err(e) => {
                    warn!("skipping queue item {index}: {e}");
                    None
                }
            })
            .collect();

        Ok(Self {
            tracks,
            autoplay_station: wire.is_autoplay_station,
            restricted: wire.is_restricted,
            position: wire.position.and_then(|i| usize::try_from(i).ok()),
            next_playable: wire.next_playable_index.and_then(|i| usize::try_from(i).ok()),
        })
    }

    #[must_use]
    pub fn tracks(&self) -> &[Track] {
        &self.tracks
    }

    #[must_use]
    pub fn is_autoplay_station(&self) -> bool {
        self.autoplay_station
    }

    #[must_use]
    pub fn is_restricted(&self) -> bool {
        self.restricted
    }

    /// Index of the current item.
    #[must_use]
    pub fn position(&self) -> Option<usize> {
        self.position
    }

    /// Index of the next item that can be played.
    #[must_use]
    pub fn next_playable(&self) -> Option<usize> {
        self.next_playable
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.tracks.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tracks.is_empty()
    }
}
