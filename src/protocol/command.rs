//! Outbound commands.
//!
//! Commands serialize to an `action`-tagged object:
//!
//! ```json
//! { "action": "seek", "time": 125.0 }
//! { "action": "queue-move", "from": 3, "to": 0 }
//! ```
//!
//! Older service builds expect seek and volume in a `type`/`data` envelope
//! instead:
//!
//! ```json
//! { "type": "seek", "data": 125.0 }
//! ```
//!
//! Select that form with [`Envelope::Legacy`]. All other commands only exist
//! in the `action` form and are sent that way regardless.
//!
//! Constructors that take arguments validate them and return
//! [`InvalidArgument`](crate::error::ErrorKind::InvalidArgument) before
//! anything touches the network.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::{
    error::{Error, Result},
    search::SearchKind,
};

/// Outbound envelope shape.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Envelope {
    /// `{ "action": ..., ...args }`
    #[default]
    Action,

    /// `{ "type": ..., "data": value }` for seek and volume.
    Legacy,
}

/// Kind of media item to play or enqueue by identifier.
#[derive(Copy, Clone, Debug, Default, Deserialize, Eq, Hash, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum MediaKind {
    #[default]
    Song,
    Album,
    Playlist,
    Station,
    MusicVideo,
}

impl fmt::Display for MediaKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Song => write!(f, "song"),
            Self::Album => write!(f, "album"),
            Self::Playlist => write!(f, "playlist"),
            Self::Station => write!(f, "station"),
            Self::MusicVideo => write!(f, "musicVideo"),
        }
    }
}

/// A command for the player.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "action", rename_all = "kebab-case")]
pub enum Command {
    Play,
    Pause,
    Next,
    Previous,

    /// Seek to a position in seconds.
    Seek { time: f64 },

    /// Set volume as a ratio.
    Volume { volume: f64 },

    /// Cycle repeat mode: off, track, queue, off.
    Repeat,

    /// Toggle shuffle.
    Shuffle,

    Autoplay { autoplay: bool },

    QueueMove { from: usize, to: usize },

    /// Replace the queue with an item and start playing it.
    #[serde(rename = "play-mediaitem")]
    PlayItem { id: String, kind: MediaKind },

    /// Insert an item right after the current one.
    PlayNext { id: String, kind: MediaKind },

    /// Append an item to the end of the queue.
    PlayLater { id: String, kind: MediaKind },

    Quit,

    #[serde(rename = "get-currentmediaitem")]
    GetCurrentItem,

    GetQueue,

    GetLyrics,

    Search {
        term: String,
        #[serde(rename = "type")]
        kind: SearchKind,
        limit: u8,
    },

    /// Introduces the client on services that want a handshake.
    Identify { name: String },
}

/// Seek and volume in their `type`/`data` form.
#[derive(Serialize)]
#[serde(tag = "type", content = "data", rename_all = "lowercase")]
enum Legacy {
    Seek(f64),
    Volume(f64),
}

impl Command {
    /// Largest number of search results the service returns.
    pub const SEARCH_LIMIT_MAX: u8 = 50;

    /// Seeks to `value`, given in milliseconds when `milliseconds` is set and
    /// in seconds otherwise.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `value` is negative or not finite.
    pub fn seek(value: f64, milliseconds: bool) -> Result<Self> {
        if !value.is_finite() || value < 0.0 {
            return Err(Error::invalid_argument(format!(
                "seek position {value} must be a non-negative number"
            )));
        }

        let time = if milliseconds { value / 1000.0 } else { value };
        Ok(Self::Seek { time })
    }

    /// Sets volume to `ratio`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `ratio` is outside `0.0..=1.0`.
    pub fn volume(ratio: f64) -> Result<Self> {
        if !(0.0..=1.0).contains(&ratio) {
            return Err(Error::invalid_argument(format!(
                "volume {ratio} must be within 0.0..=1.0"
            )));
        }

        Ok(Self::Volume { volume: ratio })
    }

    /// Plays the item with identifier `id`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `id` is empty.
    pub fn play_item(id: &str, kind: MediaKind) -> Result<Self> {
        let id = Self::media_id(id)?;
        Ok(Self::PlayItem { id, kind })
    }

    /// Plays the item with identifier `id` after the current one.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `id` is empty.
    pub fn play_next(id: &str, kind: MediaKind) -> Result<Self> {
        let id = Self::media_id(id)?;
        Ok(Self::PlayNext { id, kind })
    }

    /// Appends the item with identifier `id` to the queue.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `id` is empty.
    pub fn play_later(id: &str, kind: MediaKind) -> Result<Self> {
        let id = Self::media_id(id)?;
        Ok(Self::PlayLater { id, kind })
    }

    /// Searches the catalog.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if `term` is blank or `limit` is outside
    /// `1..=50`.
    pub fn search(term: &str, kind: SearchKind, limit: u8) -> Result<Self> {
        let term = term.trim();
        if term.is_empty() {
            return Err(Error::invalid_argument("search term must not be empty"));
        }
        if !(1..=Self::SEARCH_LIMIT_MAX).contains(&limit) {
            return Err(Error::invalid_argument(format!(
                "search limit {limit} must be within 1..={}",
                Self::SEARCH_LIMIT_MAX
            )));
        }

        Ok(Self::Search {
            term: term.to_owned(),
            kind,
            limit,
        })
    }

    fn media_id(id: &str) -> Result<String> {
        let id = id.trim();
        if id.is_empty() {
            return Err(Error::invalid_argument("media id must not be empty"));
        }
        Ok(id.to_owned())
    }

    /// Serializes the command into a text frame.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails, which should not happen for
    /// validated commands.
    pub fn to_json(&self, envelope: Envelope) -> Result<String> {
        let text = match (envelope, self) {
            (Envelope::Legacy, Self::Seek { time }) => serde_json::to_string(&Legacy::Seek(*time)),
            (Envelope::Legacy, Self::Volume { volume }) => {
                serde_json::to_string(&Legacy::Volume(*volume))
            }
            _ => serde_json::to_string(self),
        }
        .map_err(Error::internal)?;

        Ok(text)
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Play => write!(f, "Play"),
            Self::Pause => write!(f, "Pause"),
            Self::Next => write!(f, "Next"),
            Self::Previous => write!(f, "Previous"),
            Self::Seek { time } => write!(f, "Seek {time:.3}s"),
            Self::Volume { volume } => write!(f, "Volume {:.0}%", volume * 100.0),
            Self::Repeat => write!(f, "Repeat"),
            Self::Shuffle => write!(f, "Shuffle"),
            Self::Autoplay { autoplay } => write!(f, "Autoplay {autoplay}"),
            Self::QueueMove { from, to } => write!(f, "QueueMove {from} -> {to}"),
            Self::PlayItem { id, kind } => write!(f, "PlayItem {kind} {id}"),
            Self::PlayNext { id, kind } => write!(f, "PlayNext {kind} {id}"),
            Self::PlayLater { id, kind } => write!(f, "PlayLater {kind} {id}"),
            Self::Quit => write!(f, "Quit"),
            Self::GetCurrentItem => write!(f, "GetCurrentItem"),
            Self::GetQueue => write!(f, "GetQueue"),
            Self::GetLyrics => write!(f, "GetLyrics"),
            Self::Search { term, kind, limit } => write!(f, "Search {kind} \"{term}\" ({limit})"),
            Self::Identify { name } => write!(f, "Identify {name}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json::{json, Value};

    use super::*;
    use crate::error::ErrorKind;

    fn wire(command: &Command, envelope: Envelope) -> Value {
        serde_json::from_str(&command.to_json(envelope).unwrap()).unwrap()
    }

    #[test]
    fn unit_commands_carry_only_action() {
        assert_eq!(wire(&Command::Play, Envelope::Action), json!({ "action": "play" }));
        assert_eq!(
            wire(&Command::GetCurrentItem, Envelope::Action),
            json!({ "action": "get-currentmediaitem" })
        );
        assert_eq!(
            wire(&Command::GetLyrics, Envelope::Action),
            json!({ "action": "get-lyrics" })
        );
    }

    #[test]
    fn seek_in_seconds_and_milliseconds_agree() {
        let seconds = wire(&Command::seek(125.0, false).unwrap(), Envelope::Action);
        let millis = wire(&Command::seek(125_000.0, true).unwrap(), Envelope::Action);

        assert_eq!(seconds["action"], "seek");
        assert_eq!(seconds["time"].as_f64(), Some(125.0));
        assert_eq!(millis["time"].as_f64(), Some(125.0));
    }

    #[test]
    fn legacy_envelope_for_seek_and_volume() {
        let seek = wire(&Command::seek(125.0, false).unwrap(), Envelope::Legacy);
        assert_eq!(seek["type"], "seek");
        assert_eq!(seek["data"].as_f64(), Some(125.0));

        let volume = wire(&Command::volume(0.25).unwrap(), Envelope::Legacy);
        assert_eq!(volume["type"], "volume");
        assert_eq!(volume["data"].as_f64(), Some(0.25));

        // Everything else keeps the action form.
        assert_eq!(wire(&Command::Next, Envelope::Legacy), json!({ "action": "next" }));
    }

    #[test]
    fn arguments_are_validated() {
        assert_eq!(Command::seek(-1.0, false).unwrap_err().kind, ErrorKind::InvalidArgument);
        assert_eq!(Command::seek(f64::NAN, true).unwrap_err().kind, ErrorKind::InvalidArgument);
        assert_eq!(Command::volume(1.01).unwrap_err().kind, ErrorKind::InvalidArgument);
        assert_eq!(Command::volume(-0.1).unwrap_err().kind, ErrorKind::InvalidArgument);
        assert!(Command::volume(0.0).is_ok());
        assert!(Command::volume(1.0).is_ok());
        assert_eq!(
            Command::play_item("  ", MediaKind::Song).unwrap_err().kind,
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn search_limit_bounds() {
        assert!(Command::search("x", SearchKind::Song, 0).is_err());
        assert!(Command::search("x", SearchKind::Song, 51).is_err());
        assert!(Command::search("   ", SearchKind::Song, 10).is_err());

        let search = wire(
            &Command::search(" test ", SearchKind::Song, 50).unwrap(),
            Envelope::Action,
        );
        assert_eq!(
            search,
            json!({ "action": "search", "term": "test", "type": "songs", "limit": 50 })
        );
    }

    #[test]
    fn media_commands() {
        assert_eq!(
            wire(&Command::play_next("1440", MediaKind::Album).unwrap(), Envelope::Action),
            json!({ "action": "play-next", "id": "1440", "kind": "album" })
        );
        assert_eq!(
            wire(&Command::play_later("pl.1", MediaKind::Playlist).unwrap(), Envelope::Action),
            json!({ "action": "play-later", "id": "pl.1", "kind": "playlist" })
        );
        assert_eq!(
            wire(&Command::QueueMove { from: 3, to: 0 }, Envelope::Action),
            json!({ "action": "queue-move", "from": 3, "to": 0 })
        );
    }
}
