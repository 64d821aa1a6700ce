//! Websocket remote control client for desktop music players.
//!
//! A [`Session`] keeps one connection to the player's control service and
//! turns its push messages into deduplicated [`events`], while commands and
//! queries go the other way:
//!
//! * [`session`] - Connection lifecycle, dispatch and the command surface
//! * [`track`], [`player`], [`queue`], [`lyrics`], [`search`] - Entities
//!   decoded from frame payloads
//! * [`protocol`] - Inbound frames and outbound commands
//! * [`transport`] - The connection underneath, over a websocket by default
//! * [`config`], [`error`], [`signal`] - Settings, errors and process signals
#![deny(clippy::all)]
#![warn(clippy::pedantic)]

#[macro_use]
extern crate log;

mod bridge;

pub mod config;
pub mod error;
pub mod events;
pub mod lyrics;
pub mod player;
pub mod protocol;
pub mod queue;
pub mod search;
pub mod session;
pub mod signal;
pub mod track;
pub mod transport;

pub use session::{ConnectionState, Session};
