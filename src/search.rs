//! Catalog search results.
//!
//! Results are grouped by kind under their plural name. Depending on the
//! service build the group sits at one of these places:
//!
//! ```json
//! { "results": { "songs": [ ... ] } }
//! { "songs": [ ... ] }
//! { "songs": { "data": [ ... ] } }
//! ```

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    error::{Error, Result},
    protocol,
    track::Track,
};

/// What to search the catalog for.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
pub enum SearchKind {
    #[default]
    #[serde(rename = "songs")]
    Song,
    #[serde(rename = "albums")]
    Album,
    #[serde(rename = "artists")]
    Artist,
    #[serde(rename = "playlists")]
    Playlist,
}

impl SearchKind {
    /// Key under which the service groups results of this kind.
    #[must_use]
    pub fn plural(self) -> &'static str {
        match self {
            Self::Song => "songs",
            Self::Album => "albums",
            Self::Artist => "artists",
            Self::Playlist => "playlists",
        }
    }
}

impl fmt::Display for SearchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Song => write!(f, "song"),
            Self::Album => write!(f, "album"),
            Self::Artist => write!(f, "artist"),
            Self::Playlist => write!(f, "playlist"),
        }
    }
}

/// Decodes the results of a search for `kind`, in service order.
///
/// Results that do not decode are skipped with a warning. An empty result
/// group, or none at all, is an empty list.
///
/// # Errors
///
/// Returns [`MalformedPayload`](crate::error::ErrorKind::MalformedPayload)
/// if the result group is present but not a list.
pub fn decode(value: &Value, kind: SearchKind, artwork_size: u32) -> Result<Vec<Track>> {
    let payload = protocol::payload(value);
    let root = payload.get("results").unwrap_or(&*payload);

    let group = match root.get(kind.plural()) {
        None | Some(Value::Null) => {
            debug!("no {kind} results");
            return Ok(Vec::new());
        }
        Some(Value::Object(group)) => group.get("data"),
        Some(group) => Some(group),
    };

    let items = group
        .and_then(Value::as_array)
        .ok_or_else(|| Error::malformed(format!("{kind} results are not a list")))?;

    let tracks = items
        .iter()
        .enumerate()
        .filter_map(|(index, item)| match Track::decode(item, artwork_size) {
            Ok(track) => Some(track),
            Err(e) => {
                warn!("skipping {kind} result {index}: {e}");
                None
            }
        })
        .collect();

    Ok(tracks)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    fn song(id: &str, name: &str) -> Value {
        json!({
            "id": id,
            "type": "songs",
            "attributes": { "name": name, "artistName": "Artist", "durationInMillis": 1000 },
        })
    }

    #[test]
    fn returns_songs_in_order() {
        let payload = json!({
            "results": { "songs": [song("1", "One"), song("2", "Two"), song("3", "Three")] },
        });
        let tracks = decode(&payload, SearchKind::Song, 100).unwrap();

        let titles: Vec<_> = tracks.iter().map(Track::title).collect();
        assert_eq!(titles, ["One", "Two", "Three"]);
        let ids: Vec<_> = tracks.iter().map(Track::id).collect();
        assert_eq!(ids, ["1", "2", "3"]);
    }

    #[test]
    fn accepts_every_grouping() {
        let flat = json!({ "songs": [song("1", "One")] });
        let nested = json!({ "songs": { "data": [song("1", "One")] } });
        let enveloped = json!({ "type": "searchResults", "data": { "results": flat.clone() } });

        for payload in [flat, nested, enveloped] {
            let tracks = decode(&payload, SearchKind::Song, 100).unwrap();
            assert_eq!(tracks.len(), 1);
        }
    }

    #[test]
    fn other_kinds_are_ignored() {
        let payload = json!({ "results": { "albums": [song("1", "One")] } });
        assert!(decode(&payload, SearchKind::Song, 100).unwrap().is_empty());
        assert_eq!(decode(&payload, SearchKind::Album, 100).unwrap().len(), 1);
    }

    #[test]
    fn undecodable_items_are_skipped() {
        let payload = json!({ "songs": [song("1", "One"), { "id": "2" }, song("3", "Three")] });
        let tracks = decode(&payload, SearchKind::Song, 100).unwrap();
        assert_eq!(tracks.len(), 2);
        assert_eq!(tracks[1].title(), "Three");
    }

    #[test]
    fn non_list_group_is_malformed() {
        let payload = json!({ "songs": "nope" });
        let err = decode(&payload, SearchKind::Song, 100).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedPayload);
    }

    #[test]
    fn kind_serializes_as_plural() {
        assert_eq!(serde_json::to_value(SearchKind::Playlist).unwrap(), json!("playlists"));
        assert_eq!(SearchKind::Artist.to_string(), "artist");
    }
}
