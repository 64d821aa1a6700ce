//! Events published by a [`Session`](crate::session::Session).
//!
//! Subscribe with [`Session::subscribe`](crate::session::Session::subscribe).
//! Events fall into three groups:
//!
//! * Connection: [`Connected`](Event::Connected),
//!   [`Disconnected`](Event::Disconnected)
//! * Semantic, derived from player state pushes:
//!   [`TrackChanged`](Event::TrackChanged),
//!   [`StateChanged`](Event::StateChanged),
//!   [`TimingChanged`](Event::TimingChanged)
//! * Raw passthrough of every decoded frame: [`Frame`](Event::Frame)
//!
//! # Example
//!
//! ```rust
//! use trackside::events::Event;
//!
//! fn handle_event(event: Event) {
//!     match event {
//!         Event::TrackChanged(track) => println!("now playing {track}"),
//!         Event::Disconnected => println!("player went away"),
//!         _ => {}
//!     }
//! }
//! ```

use std::fmt;

use serde_json::Value;

use crate::{
    player::{PlaybackTiming, PlayerState},
    track::Track,
};

#[derive(Clone, Debug, PartialEq)]
pub enum Event {
    /// The session is open and accepts commands.
    Connected,

    /// The connection closed. Pending queries have been rejected.
    Disconnected,

    /// A different track with a known duration started.
    ///
    /// Placeholder tracks without a duration, sent while the player loads,
    /// never produce this event.
    TrackChanged(Track),

    /// Playing, shuffle, repeat, volume or autoplay changed.
    StateChanged(PlayerState),

    /// Published on every player state push.
    TimingChanged(PlaybackTiming),

    /// Any frame, with its tag and normalized payload.
    Frame { tag: String, payload: Value },
}

impl fmt::Display for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Connected => write!(f, "connected"),
            Self::Disconnected => write!(f, "disconnected"),
            Self::TrackChanged(track) => write!(f, "track changed: {track}"),
            Self::StateChanged(state) => write!(f, "state changed: {state}"),
            Self::TimingChanged(timing) => write!(f, "timing: {timing}"),
            Self::Frame { tag, .. } => write!(f, "frame: {tag}"),
        }
    }
}
