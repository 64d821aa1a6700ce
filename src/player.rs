//! Player state and playback timing.
//!
//! Both are decoded from the same `playbackStateUpdate` payload as the
//! current [`Track`](crate::track::Track):
//!
//! ```json
//! {
//!     "isPlaying": true,
//!     "shuffleMode": 0,
//!     "repeatMode": 2,
//!     "volume": 0.8,
//!     "autoplayEnabled": true,
//!     "startTime": 1712345678.123,
//!     "endTime": 1712345893.123,
//!     "remainingTime": 120500.4,
//!     "durationInMillis": 215000
//! }
//! ```
//!
//! [`PlayerState`] only changes when the user changes something, so the
//! session deduplicates it. [`PlaybackTiming`] changes on every push.

use std::fmt;

use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::{
    error::{Error, Result},
    protocol,
};

/// Repeat mode.
///
/// The service can only cycle forward through the modes:
/// `Off` → `Track` → `Queue` → `Off`.
#[derive(
    Copy,
    Clone,
    Debug,
    Default,
    Hash,
    Serialize_repr,
    Deserialize_repr,
    PartialOrd,
    Ord,
    PartialEq,
    Eq,
)]
#[repr(u8)]
pub enum RepeatMode {
    #[default]
    Off = 0,
    Track = 1,
    Queue = 2,
}

impl RepeatMode {
    /// Number of modes in the cycle.
    const CYCLE: u8 = 3;

    /// The mode that one cycle command switches to.
    #[must_use]
    pub fn next(self) -> Self {
        match self {
            Self::Off => Self::Track,
            Self::Track => Self::Queue,
            Self::Queue => Self::Off,
        }
    }

    /// Number of cycle commands to get from `self` to `target`.
    ///
    /// ```rust
    /// use trackside::player::RepeatMode;
    ///
    /// assert_eq!(RepeatMode::Queue.steps_to(RepeatMode::Off), 1);
    /// assert_eq!(RepeatMode::Off.steps_to(RepeatMode::Queue), 2);
    /// ```
    #[must_use]
    pub fn steps_to(self, target: Self) -> u8 {
        (target as u8 + Self::CYCLE - self as u8) % Self::CYCLE
    }
}

impl TryFrom<u8> for RepeatMode {
    type Error = Error;

    fn try_from(mode: u8) -> Result<Self> {
        match mode {
            0 => Ok(Self::Off),
            1 => Ok(Self::Track),
            2 => Ok(Self::Queue),
            _ => Err(Error::invalid_argument(format!(
                "repeat mode {mode} must be 0 (off), 1 (track) or 2 (queue)"
            ))),
        }
    }
}

impl fmt::Display for RepeatMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Off => write!(f, "Off"),
            Self::Track => write!(f, "Track"),
            Self::Queue => write!(f, "Queue"),
        }
    }
}

/// Playing, shuffle, repeat, volume and autoplay as reported by the player.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlayerState {
    is_playing: bool,
    is_shuffling: bool,
    repeat_mode: RepeatMode,
    volume: f64,
    autoplay: bool,
}

/// Flags arrive as booleans or as 0/1.
#[derive(Copy, Clone, Debug, Deserialize)]
#[serde(untagged)]
enum WireFlag {
    Bool(bool),
    Number(u8),
}

impl From<WireFlag> for bool {
    fn from(flag: WireFlag) -> Self {
        match flag {
            WireFlag::Bool(value) => value,
            WireFlag::Number(value) => value != 0,
        }
    }
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireState {
    is_playing: bool,
    shuffle_mode: WireFlag,
    repeat_mode: RepeatMode,
    volume: f64,
    #[serde(default)]
    autoplay_enabled: Option<bool>,
}

impl PlayerState {
    /// Decodes player state from a payload.
    ///
    /// Volume is clamped to `0.0..=1.0`.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload`](crate::error::ErrorKind::MalformedPayload)
    /// if playing, shuffle, repeat or volume are missing or invalid.
    pub fn decode(value: &Value) -> Result<Self> {
        let payload = protocol::payload(value);
        let wire: WireState = protocol::decode(&payload, "player state")?;

        let volume = wire.volume.clamp(0.0, 1.0);
        if !(0.0..=1.0).contains(&wire.volume) {
            debug!("clamped volume {} to {volume}", wire.volume);
        }

        Ok(Self {
            is_playing: wire.is_playing,
            is_shuffling: wire.shuffle_mode.into(),
            repeat_mode: wire.repeat_mode,
            volume,
            autoplay: wire.autoplay_enabled.unwrap_or_default(),
        })
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    #[must_use]
    pub fn is_shuffling(&self) -> bool {
        self.is_shuffling
    }

    #[must_use]
    pub fn repeat_mode(&self) -> RepeatMode {
        self.repeat_mode
    }

    /// Volume as a ratio from 0.0 to 1.0.
    #[must_use]
    pub fn volume(&self) -> f64 {
        self.volume
    }

    #[must_use]
    pub fn is_autoplay(&self) -> bool {
        self.autoplay
    }
}

impl fmt::Display for PlayerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}; shuffle {}; repeat {}; volume {:.0}%; autoplay {}",
            if self.is_playing { "playing" } else { "paused" },
            if self.is_shuffling { "on" } else { "off" },
            self.repeat_mode,
            self.volume * 100.0,
            if self.autoplay { "on" } else { "off" },
        )
    }
}

/// Position within the current track.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PlaybackTiming {
    is_playing: bool,
    start_time: f64,
    end_time: f64,
    remaining_ms: u64,
    elapsed_ms: u64,
    progress: f64,
}

#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTiming {
    is_playing: bool,
    duration_in_millis: f64,
    remaining_time: f64,
    #[serde(default)]
    start_time: Option<f64>,
    #[serde(default)]
    end_time: Option<f64>,
}

impl PlaybackTiming {
    /// Decodes playback timing from a payload.
    ///
    /// Elapsed time is derived as duration minus remaining time. Both are
    /// rounded to whole milliseconds, and remaining time is clamped to the
    /// duration.
    ///
    /// # Errors
    ///
    /// Returns [`MalformedPayload`](crate::error::ErrorKind::MalformedPayload)
    /// if playing, duration or remaining time are missing.
    pub fn decode(value: &Value) -> Result<Self> {
        let payload = protocol::payload(value);
        let wire: WireTiming = protocol::decode(&payload, "playback timing")?;

        let duration = round_millis(wire.duration_in_millis);
        let remaining = round_millis(wire.remaining_time).min(duration);
        let elapsed = duration - remaining;

        #[expect(clippy::cast_precision_loss)]
        let progress = if duration > 0 {
            (elapsed as f64 / duration as f64).clamp(0.0, 1.0)
        } else {
            0.0
        };

        Ok(Self {
            is_playing: wire.is_playing,
            start_time: wire.start_time.unwrap_or_default(),
            end_time: wire.end_time.unwrap_or_default(),
            remaining_ms: remaining,
            elapsed_ms: elapsed,
            progress,
        })
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.is_playing
    }

    /// Timestamp at which the current segment started.
    #[must_use]
    pub fn start_time(&self) -> f64 {
        self.start_time
    }

    /// Timestamp at which the current segment ends.
    #[must_use]
    pub fn end_time(&self) -> f64 {
        self.end_time
    }

    #[must_use]
    pub fn remaining_ms(&self) -> u64 {
        self.remaining_ms
    }

    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        self.elapsed_ms
    }

    /// Fraction of the track played, from 0.0 to 1.0.
    #[must_use]
    pub fn progress(&self) -> f64 {
        self.progress
    }
}

impl fmt::Display for PlaybackTiming {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{:02} / -{}:{:02} ({:.1}%)",
            self.elapsed_ms / 60_000,
            self.elapsed_ms / 1000 % 60,
            self.remaining_ms / 60_000,
            self.remaining_ms / 1000 % 60,
            self.progress * 100.0
        )
    }
}

/// Rounds to whole milliseconds, mapping negative and non-finite values to
/// zero.
#[expect(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn round_millis(millis: f64) -> u64 {
    if millis.is_finite() && millis > 0.0 {
        millis.round() as u64
    } else {
        0
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn repeat_steps_wrap_around() {
        use RepeatMode::{Off, Queue, Track};

        assert_eq!(Queue.steps_to(Off), 1);
        assert_eq!(Off.steps_to(Queue), 2);
        assert_eq!(Track.steps_to(Queue), 1);
        assert_eq!(Queue.steps_to(Track), 2);
        for mode in [Off, Track, Queue] {
            assert_eq!(mode.steps_to(mode), 0);

            let mut walked = mode;
            for target in [Off, Track, Queue] {
                for _ in 0..mode.steps_to(target) {
                    walked = walked.next();
                }
                assert_eq!(walked, target);
                walked = mode;
            }
        }
    }

    #[test]
    fn repeat_mode_from_integer() {
        assert_eq!(RepeatMode::try_from(2).unwrap(), RepeatMode::Queue);
        assert_eq!(
            RepeatMode::try_from(3).unwrap_err().kind,
            ErrorKind::InvalidArgument
        );
    }

    #[test]
    fn decodes_player_state() {
        let state = PlayerState::decode(&json!({
            "isPlaying": true,
            "shuffleMode": 1,
            "repeatMode": 2,
            "volume": 0.8,
            "autoplayEnabled": true,
        }))
        .unwrap();

        assert!(state.is_playing());
        assert!(state.is_shuffling());
        assert_eq!(state.repeat_mode(), RepeatMode::Queue);
        assert!((state.volume() - 0.8).abs() < f64::EPSILON);
        assert!(state.is_autoplay());
    }

    #[test]
    fn structural_equality_ignores_field_order() {
        let a = PlayerState::decode(&json!({
            "isPlaying": false, "shuffleMode": false, "repeatMode": 0, "volume": 1,
        }))
        .unwrap();
        let b = PlayerState::decode(&json!({
            "data": { "volume": 1.0, "repeatMode": 0, "shuffleMode": 0, "isPlaying": false },
        }))
        .unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn player_state_requires_fields() {
        let err = PlayerState::decode(&json!({ "isPlaying": true })).unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedPayload);

        let err = PlayerState::decode(&json!({
            "isPlaying": true, "shuffleMode": 0, "repeatMode": 7, "volume": 0.5,
        }))
        .unwrap_err();
        assert_eq!(err.kind, ErrorKind::MalformedPayload);
    }

    #[test]
    fn timing_is_derived_from_remaining() {
        let timing = PlaybackTiming::decode(&json!({
            "isPlaying": true,
            "durationInMillis": 200_000,
            "remainingTime": 149_999.6,
            "startTime": 10.0,
            "endTime": 210.0,
        }))
        .unwrap();

        assert_eq!(timing.remaining_ms(), 150_000);
        assert_eq!(timing.elapsed_ms(), 50_000);
        assert!((timing.progress() - 0.25).abs() < 1e-9);
        assert!((timing.start_time() - 10.0).abs() < f64::EPSILON);
        assert_eq!(timing.to_string(), "0:50 / -2:30 (25.0%)");
    }

    #[test]
    fn timing_with_zero_duration() {
        let timing = PlaybackTiming::decode(&json!({
            "isPlaying": false, "durationInMillis": 0, "remainingTime": 500,
        }))
        .unwrap();
        assert_eq!(timing.remaining_ms(), 0);
        assert_eq!(timing.elapsed_ms(), 0);
        assert!(timing.progress().abs() < f64::EPSILON);
    }
}
