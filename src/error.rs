//! Error handling for trackside.
//!
//! Errors carry an [`ErrorKind`] that says what went wrong from the caller's
//! point of view, plus the underlying error for details.
//!
//! # Error Categories
//!
//! * Session state: [`ConnectionState`](ErrorKind::ConnectionState),
//!   [`ConnectionClosed`](ErrorKind::ConnectionClosed)
//! * Caller mistakes: [`InvalidArgument`](ErrorKind::InvalidArgument),
//!   [`Busy`](ErrorKind::Busy)
//! * Service mistakes: [`MalformedPayload`](ErrorKind::MalformedPayload)
//! * Environment: [`Unavailable`](ErrorKind::Unavailable),
//!   [`Timeout`](ErrorKind::Timeout), [`Internal`](ErrorKind::Internal)
//!
//! # Example
//!
//! ```rust
//! use trackside::error::{Error, ErrorKind, Result};
//!
//! fn check_volume(volume: f64) -> Result<()> {
//!     if !(0.0..=1.0).contains(&volume) {
//!         return Err(Error::invalid_argument(format!("volume {volume} out of range")));
//!     }
//!     Ok(())
//! }
//! ```

use std::fmt;
use thiserror::Error;

use crate::session::ConnectionState;

/// Main error type combining error kind and details.
#[derive(Debug)]
pub struct Error {
    /// Classification of the error
    pub kind: ErrorKind,

    /// Details of the underlying error
    pub error: Source,
}

/// Underlying error of an [`Error`].
pub type Source = Box<dyn std::error::Error + Send + Sync>;

/// Standard result type for trackside operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Error categories.
#[expect(clippy::module_name_repetitions)]
#[derive(Clone, Copy, Debug, Eq, Error, Hash, Ord, PartialEq, PartialOrd)]
pub enum ErrorKind {
    /// A command or query was attempted while the session is not open.
    #[error("session not open")]
    ConnectionState,

    /// A parameter was missing, of the wrong type or out of range.
    #[error("invalid argument specified")]
    InvalidArgument,

    /// An inbound frame did not decode into the entity its tag implies.
    #[error("malformed payload")]
    MalformedPayload,

    /// The connection closed while a query was pending.
    #[error("connection closed")]
    ConnectionClosed,

    /// Another waiter is already registered for the same frame tag.
    #[error("request already pending")]
    Busy,

    /// A request did not get its response in time.
    #[error("operation timed out")]
    Timeout,

    /// The transport could not be opened or failed underway.
    #[error("service unavailable")]
    Unavailable,

    /// An internal invariant was broken.
    #[error("internal error")]
    Internal,
}

/// Carries the state a session was in when it refused an operation.
#[derive(Clone, Copy, Debug, Eq, Error, PartialEq)]
#[error("session is {0}")]
pub struct StateError(pub ConnectionState);

impl Error {
    /// Creates a new error with specified kind and details.
    pub fn new<E>(kind: ErrorKind, error: E) -> Self
    where
        E: Into<Source>,
    {
        Self {
            kind,
            error: error.into(),
        }
    }

    /// Creates an error for operations refused because the session is not
    /// open. The state can be read back with [`Error::connection_state`].
    #[must_use]
    pub fn not_connected(state: ConnectionState) -> Self {
        Self::new(ErrorKind::ConnectionState, StateError(state))
    }

    /// Creates an error for invalid or out of range arguments.
    ///
    /// # Examples
    ///
    /// ```rust
    /// use trackside::error::{Error, ErrorKind};
    ///
    /// let err = Error::invalid_argument("search limit must be within 1..=50");
    /// assert_eq!(err.kind, ErrorKind::InvalidArgument);
    /// ```
    pub fn invalid_argument<E>(error: E) -> Self
    where
        E: Into<Source>,
    {
        Self::new(ErrorKind::InvalidArgument, error)
    }

    /// Creates an error for payloads that lack required fields or have the
    /// wrong shape.
    pub fn malformed<E>(error: E) -> Self
    where
        E: Into<Source>,
    {
        Self::new(ErrorKind::MalformedPayload, error)
    }

    /// Creates an error for queries that were pending when the connection
    /// closed.
    pub fn connection_closed<E>(error: E) -> Self
    where
        E: Into<Source>,
    {
        Self::new(ErrorKind::ConnectionClosed, error)
    }

    /// Creates an error for a waiter registration on an occupied tag.
    pub fn busy<E>(error: E) -> Self
    where
        E: Into<Source>,
    {
        Self::new(ErrorKind::Busy, error)
    }

    /// Creates an error for requests that exceeded their deadline.
    pub fn timeout<E>(error: E) -> Self
    where
        E: Into<Source>,
    {
        Self::new(ErrorKind::Timeout, error)
    }

    /// Creates an error for transport failures.
    pub fn unavailable<E>(error: E) -> Self
    where
        E: Into<Source>,
    {
        Self::new(ErrorKind::Unavailable, error)
    }

    /// Creates an error for broken internal invariants.
    pub fn internal<E>(error: E) -> Self
    where
        E: Into<Source>,
    {
        Self::new(ErrorKind::Internal, error)
    }

    /// Attempts to downcast the underlying error to a concrete type.
    #[must_use]
    pub fn downcast<E>(&self) -> Option<&E>
    where
        E: std::error::Error + 'static,
    {
        self.error.downcast_ref::<E>()
    }

    /// Returns the session state that caused a
    /// [`ConnectionState`](ErrorKind::ConnectionState) error.
    #[must_use]
    pub fn connection_state(&self) -> Option<ConnectionState> {
        self.downcast::<StateError>().map(|e| e.0)
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        Some(self.error.as_ref())
    }
}

impl fmt::Display for Error {
    fn fmt(&self, fmt: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(fmt, "{}: {}", self.kind, self.error)
    }
}

/// Converts I/O errors into appropriate error kinds.
///
/// Maps I/O errors:
/// * `NotFound`, `InvalidData`, `InvalidInput` -> `InvalidArgument`
/// * `TimedOut` -> `Timeout`
/// * Others -> `Unavailable`
impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        use std::io::ErrorKind::{InvalidData, InvalidInput, NotFound, TimedOut};
        match err.kind() {
            NotFound | InvalidData | InvalidInput => Self::invalid_argument(err),
            TimedOut => Self::timeout(err),
            _ => Self::unavailable(err),
        }
    }
}

/// Converts websocket errors into appropriate error kinds.
///
/// Maps websocket errors:
/// * `ConnectionClosed`, `AlreadyClosed` -> `ConnectionClosed`
/// * `Url` -> `InvalidArgument`
/// * `Capacity`, `Protocol` -> `MalformedPayload`
/// * Others -> `Unavailable`
impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        use tokio_tungstenite::tungstenite::Error::{
            AlreadyClosed, Capacity, ConnectionClosed, Protocol, Url,
        };
        match err {
            ConnectionClosed | AlreadyClosed => Self::connection_closed(err),
            Url(_) => Self::invalid_argument(err),
            Capacity(_) | Protocol(_) => Self::malformed(err),
            _ => Self::unavailable(err),
        }
    }
}

/// Converts JSON errors to `MalformedPayload`.
impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::malformed(err)
    }
}

/// Converts URL errors to `InvalidArgument`.
impl From<url::ParseError> for Error {
    fn from(err: url::ParseError) -> Self {
        Self::invalid_argument(err)
    }
}

/// Converts configuration file errors to `InvalidArgument`.
impl From<toml::de::Error> for Error {
    fn from(err: toml::de::Error) -> Self {
        Self::invalid_argument(err)
    }
}

/// Converts timeout errors to `Timeout`.
impl From<tokio::time::error::Elapsed> for Error {
    fn from(err: tokio::time::error::Elapsed) -> Self {
        Self::timeout(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_connected_carries_state() {
        let err = Error::not_connected(ConnectionState::Closed);
        assert_eq!(err.kind, ErrorKind::ConnectionState);
        assert_eq!(err.connection_state(), Some(ConnectionState::Closed));
        assert_eq!(err.to_string(), "session not open: session is closed");
    }

    #[test]
    fn other_kinds_have_no_state() {
        let err = Error::invalid_argument("nope");
        assert_eq!(err.connection_state(), None);
    }

    #[test]
    fn json_errors_are_malformed() {
        let err: Error = serde_json::from_str::<serde_json::Value>("{")
            .unwrap_err()
            .into();
        assert_eq!(err.kind, ErrorKind::MalformedPayload);
    }
}
