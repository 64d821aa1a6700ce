//! Track metadata.
//!
//! A [`Track`] is decoded fresh from every payload that carries it: player
//! state pushes, queue items and search results. Tracks are immutable; the
//! session replaces its cached track when the identifier changes.
//!
//! # Wire Format
//!
//! ```json
//! {
//!     "songId": "1440818839",
//!     "playParams": { "id": "1440818839", "kind": "song" },
//!     "name": "Title",
//!     "artistName": "Artist",
//!     "albumName": "Album",
//!     "artwork": { "url": "https://example.com/{w}x{h}bb.jpg" },
//!     "trackNumber": 3,
//!     "durationInMillis": 215000,
//!     "url": "https://music.apple.com/us/album/title/1440818000?i=1440818839",
//!     "genreNames": ["Pop", "Music"]
//! }
//! ```
//!
//! Catalog items wrap the same fields in `attributes` next to an `id`, which
//! the decoder flattens.

use std::{borrow::Cow, fmt, sync::LazyLock, time::Duration};

use regex_lite::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::{serde_as, DefaultOnNull};

use crate::{error::Result, protocol};

/// Extracts the song identifier that catalog URLs carry in their `i`
/// query parameter.
static URL_SONG_ID: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]i=(\d+)").expect("song id pattern is valid"));

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Track {
    id: String,
    title: String,
    artist: String,
    album: String,
    artwork: Option<String>,
    track_number: Option<u32>,
    duration: Duration,
    url: Option<String>,
    genres: Vec<String>,
}

/// Identifiers arrive as strings or as numbers.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum WireId {
    Text(String),
    Number(u64),
}

impl WireId {
    fn into_string(self) -> Option<String> {
        match self {
            Self::Text(text) if !text.trim().is_empty() => Some(text),
            Self::Text(_) => None,
            Self::Number(number) => Some(number.to_string()),
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
struct WirePlayParams {
    id: Option<WireId>,
}

#[derive(Clone, Debug, Deserialize)]
struct WireArtwork {
    url: Option<String>,
}

/// The canonical URL is either a string or a list of links per storefront.
#[derive(Clone, Debug, Deserialize)]
#[serde(untagged)]
enum WireUrl {
    Plain(String),
    Links {
        #[serde(rename = "appleMusic", default)]
        apple_music: Vec<String>,
    },
}

impl WireUrl {
    fn into_string(self) -> Option<String> {
        match self {
            Self::Plain(url) => Some(url),
            Self::Links { apple_music } => apple_music.into_iter().next(),
        }
    }
}

#[serde_as]
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTrack {
    song_id: Option<WireId>,
    play_params: Option<WirePlayParams>,
    id: Option<WireId>,

    name: String,
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull")]
    artist_name: String,
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull")]
    album_name: String,
    artwork: Option<WireArtwork>,
    track_number: Option<u32>,
    duration_in_millis: Option<f64>,
    url: Option<WireUrl>,
    #[serde(default)]
    #[serde_as(as = "DefaultOnNull")]
    genre_names: Vec<String>,
}

impl Track {
    /// Decodes a track from a payload.
    ///
    /// Artwork templates have their `{w}` and `{h}` placeholders replaced by
    /// `artwork_size`.
    ///
    /// The identifier is taken from `songId`, `playParams.id` or `id`, in that
    /// order, skipping blank ones. Only when none is present it is extracted from the `i=` query
    /// parameter of the canonical URL. If that fails too, the identifier is
    /// empty.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload`](crate::error::ErrorKind::MalformedPayload)
    /// if the title is missing or fields have the wrong type.
    pub fn decode(value: &Value, artwork_size: u32) -> Result<Self> {
        let payload = protocol::payload(value);
        let item = flatten_attributes(&payload);
        let wire: WireTrack = protocol::decode(&item, "track")?;

        let url = wire.url.and_then(WireUrl::into_string);
        let id = wire
            .song_id
            .and_then(WireId::into_string)
            .or_else(|| {
                wire.play_params
                    .and_then(|params| params.id)
                    .and_then(WireId::into_string)
            })
            .or_else(|| wire.id.and_then(WireId::into_string))
            .unwrap_or_else(|| url.as_deref().map(id_from_url).unwrap_or_default());

        let artwork = wire
            .artwork
            .and_then(|artwork| artwork.url)
            .map(|template| artwork_url(&template, artwork_size));

        let duration = wire
            .duration_in_millis
            .filter(|millis| millis.is_finite() && *millis > 0.0)
            .and_then(|millis| Duration::try_from_secs_f64(millis / 1000.0).ok())
            .unwrap_or_default();

        Ok(Self {
            id,
            title: wire.name,
            artist: wire.artist_name,
            album: wire.album_name,
            artwork,
            track_number: wire.track_number,
            duration,
            url,
            genres: wire.genre_names,
        })
    }

    /// Service-assigned song identifier. Empty if it could not be
    /// determined.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    #[must_use]
    pub fn title(&self) -> &str {
        &self.title
    }

    #[must_use]
    pub fn artist(&self) -> &str {
        &self.artist
    }

    #[must_use]
    pub fn album(&self) -> &str {
        &self.album
    }

    /// Artwork URL sized as requested at decode time.
    #[must_use]
    pub fn artwork(&self) -> Option<&str> {
        self.artwork.as_deref()
    }

    #[must_use]
    pub fn track_number(&self) -> Option<u32> {
        self.track_number
    }

    /// Zero when the service did not report a duration. Such tracks are
    /// placeholders sent while the player is loading.
    #[must_use]
    pub fn duration(&self) -> Duration {
        self.duration
    }

    #[must_use]
    pub fn url(&self) -> Option<&str> {
        self.url.as_deref()
    }

    #[must_use]
    pub fn genres(&self) -> &[String] {
        &self.genres
    }
}

impl fmt::Display for Track {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.artist.is_empty() {
            write!(f, "{}", self.title)
        } else {
            write!(f, "{} - {}", self.artist, self.title)
        }
    }
}

/// Hoists catalog `attributes` to the top level, keeping the item `id`.
fn flatten_attributes(value: &Value) -> Cow<'_, Value> {
    let Some(Value::Object(attributes)) = value.get("attributes") else {
        return Cow::Borrowed(value);
    };

    let mut flat = attributes.clone();
    if let Some(id) = value.get("id") {
        flat.entry("id").or_insert_with(|| id.clone());
    }
    Cow::Owned(Value::Object(flat))
}

/// Extracts the song identifier from a catalog URL, or returns an empty
/// string if there is none.
#[must_use]
pub fn id_from_url(url: &str) -> String {
    URL_SONG_ID
        .captures(url)
        .and_then(|captures| captures.get(1))
        .map(|id| id.as_str().to_owned())
        .unwrap_or_default()
}

/// Substitutes the size placeholders of an artwork URL template.
#[must_use]
pub fn artwork_url(template: &str, size: u32) -> String {
    let size = size.to_string();
    template.replace("{w}", &size).replace("{h}", &size)
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    fn sample() -> Value {
        json!({
            "songId": "1440818839",
            "name": "Title",
            "artistName": "Artist",
            "albumName": "Album",
            "artwork": { "url": "https://example.com/{w}x{h}bb.jpg" },
            "trackNumber": 3,
            "durationInMillis": 215_000,
            "url": "https://music.apple.com/us/album/title/1440818000?i=1440818839",
            "genreNames": ["Pop", "Music"],
        })
    }

    #[test]
    fn decodes_all_fields() {
        let track = Track::decode(&sample(), 600).unwrap();
        assert_eq!(track.id(), "1440818839");
        assert_eq!(track.title(), "Title");
        assert_eq!(track.artist(), "Artist");
        assert_eq!(track.album(), "Album");
        assert_eq!(track.artwork(), Some("https://example.com/600x600bb.jpg"));
        assert_eq!(track.track_number(), Some(3));
        assert_eq!(track.duration(), Duration::from_secs(215));
        assert_eq!(track.genres(), ["Pop", "Music"]);
        assert_eq!(track.to_string(), "Artist - Title");
    }

    #[test]
    fn decodes_from_data_envelope() {
        let wrapped = json!({ "type": "playbackStateUpdate", "data": sample() });
        assert_eq!(
            Track::decode(&wrapped, 600).unwrap(),
            Track::decode(&sample(), 600).unwrap()
        );
    }

    #[test]
    fn id_falls_back_to_play_params_then_url() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("songId");
        value["playParams"] = json!({ "id": 42, "kind": "song" });
        assert_eq!(Track::decode(&value, 100).unwrap().id(), "42");

        value.as_object_mut().unwrap().remove("playParams");
        assert_eq!(Track::decode(&value, 100).unwrap().id(), "1440818839");
    }

    #[test]
    fn blank_ids_fall_through() {
        let value = json!({
            "songId": "",
            "playParams": { "id": "42" },
            "name": "X",
            "durationInMillis": 1000,
        });
        assert_eq!(Track::decode(&value, 100).unwrap().id(), "42");

        let value = json!({
            "songId": " ",
            "playParams": { "id": "" },
            "id": 7,
            "name": "X",
        });
        assert_eq!(Track::decode(&value, 100).unwrap().id(), "7");
    }

    #[test]
    fn id_is_empty_when_undecidable() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("songId");
        value["url"] = json!("https://music.apple.com/us/album/x/1");
        assert_eq!(Track::decode(&value, 100).unwrap().id(), "");

        value.as_object_mut().unwrap().remove("url");
        assert_eq!(Track::decode(&value, 100).unwrap().id(), "");
    }

    #[test]
    fn url_links_object() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("songId");
        value["url"] = json!({ "appleMusic": ["https://music.apple.com/x?l=en&i=77"] });
        let track = Track::decode(&value, 100).unwrap();
        assert_eq!(track.id(), "77");
        assert_eq!(track.url(), Some("https://music.apple.com/x?l=en&i=77"));
    }

    #[test]
    fn catalog_attributes_are_flattened() {
        let item = json!({
            "id": "900",
            "type": "songs",
            "attributes": { "name": "Nested", "durationInMillis": 1000 },
        });
        let track = Track::decode(&item, 100).unwrap();
        assert_eq!(track.id(), "900");
        assert_eq!(track.title(), "Nested");
        assert_eq!(track.duration(), Duration::from_secs(1));
    }

    #[test]
    fn missing_or_bad_duration_is_zero() {
        let mut value = sample();
        value.as_object_mut().unwrap().remove("durationInMillis");
        assert!(Track::decode(&value, 100).unwrap().duration().is_zero());

        value["durationInMillis"] = json!(-5);
        assert!(Track::decode(&value, 100).unwrap().duration().is_zero());
    }

    #[test]
    fn nulls_are_tolerated() {
        let value = json!({ "name": "Only", "artistName": null, "genreNames": null });
        let track = Track::decode(&value, 100).unwrap();
        assert_eq!(track.artist(), "");
        assert!(track.genres().is_empty());
        assert_eq!(track.to_string(), "Only");
    }

    #[test]
    fn missing_title_is_malformed() {
        let err = Track::decode(&json!({ "songId": "1" }), 100).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedPayload);
    }
}
