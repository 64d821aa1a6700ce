//! Session configuration.
//!
//! Every field has a default, so a configuration file only needs to list
//! what differs:
//!
//! ```toml
//! host = "192.168.1.20"
//! request_timeout = 5
//!
//! [handshake]
//! name = "living-room"
//! ```

use std::{path::Path, time::Duration};

use serde::Deserialize;
use serde_with::{serde_as, DurationSeconds};
use url::Url;

use crate::{
    error::{Error, Result},
    protocol::Envelope,
};

#[serde_as]
#[derive(Clone, Debug, Deserialize, PartialEq)]
#[serde(default, deny_unknown_fields)]
pub struct Config {
    pub host: String,
    pub port: u16,

    /// Connect with `wss` instead of `ws`.
    pub secure: bool,

    pub path: String,

    /// Edge length in pixels substituted into artwork URL templates.
    pub artwork_size: u32,

    pub envelope: Envelope,

    /// How long queries wait for their response. Waits indefinitely when
    /// unset.
    #[serde_as(as = "Option<DurationSeconds<u64>>")]
    pub request_timeout: Option<Duration>,

    /// Services that want the client to introduce itself before accepting
    /// commands.
    pub handshake: Option<Handshake>,

    /// Number of events buffered per subscriber before the slowest one lags.
    pub event_capacity: usize,
}

#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Handshake {
    /// Name to identify as.
    pub name: String,

    /// Tag of the frame that confirms the handshake.
    pub ready_tag: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: Self::DEFAULT_HOST.to_owned(),
            port: Self::DEFAULT_PORT,
            secure: false,
            path: "/".to_owned(),
            artwork_size: Self::DEFAULT_ARTWORK_SIZE,
            envelope: Envelope::default(),
            request_timeout: None,
            handshake: None,
            event_capacity: Self::DEFAULT_EVENT_CAPACITY,
        }
    }
}

impl Default for Handshake {
    fn default() -> Self {
        Self {
            name: env!("CARGO_PKG_NAME").to_owned(),
            ready_tag: "authenticated".to_owned(),
        }
    }
}

impl Config {
    pub const DEFAULT_HOST: &'static str = "127.0.0.1";
    pub const DEFAULT_PORT: u16 = 26369;
    pub const DEFAULT_ARTWORK_SIZE: u32 = 600;
    pub const DEFAULT_EVENT_CAPACITY: usize = 64;

    /// Loads a configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read, is not valid TOML, has
    /// unknown keys, or fails [`validate`](Self::validate).
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&contents)?;
        config.validate()?;

        debug!("loaded configuration from {}", path.display());
        Ok(config)
    }

    /// Checks the values that defaults cannot guarantee.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the host, artwork size or event capacity
    /// are empty or zero, or the endpoint URL does not parse.
    pub fn validate(&self) -> Result<()> {
        if self.host.trim().is_empty() {
            return Err(Error::invalid_argument("host must not be empty"));
        }
        if self.artwork_size == 0 {
            return Err(Error::invalid_argument("artwork size must be positive"));
        }
        if self.event_capacity == 0 {
            return Err(Error::invalid_argument("event capacity must be positive"));
        }
        if let Some(handshake) = &self.handshake {
            if handshake.ready_tag.is_empty() {
                return Err(Error::invalid_argument("handshake ready tag must not be empty"));
            }
        }

        self.url().map(drop)
    }

    /// Builds the websocket endpoint.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if host or path do not form a valid URL.
    pub fn url(&self) -> Result<Url> {
        let scheme = if self.secure { "wss" } else { "ws" };
        let mut url = Url::parse(&format!("{scheme}://{}:{}", self.host, self.port))?;
        url.set_path(&self.path);
        Ok(url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorKind;

    #[test]
    fn default_endpoint() {
        let config = Config::default();
        assert_eq!(config.url().unwrap().as_str(), "ws://127.0.0.1:26369/");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_toml() {
        let config: Config = toml::from_str(
            r#"
            host = "10.0.0.5"
            secure = true
            path = "/ws"
            envelope = "legacy"
            request_timeout = 5

            [handshake]
            name = "den"
            "#,
        )
        .unwrap();

        assert_eq!(config.url().unwrap().as_str(), "wss://10.0.0.5:26369/ws");
        assert_eq!(config.envelope, Envelope::Legacy);
        assert_eq!(config.request_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.artwork_size, Config::DEFAULT_ARTWORK_SIZE);

        let handshake = config.handshake.unwrap();
        assert_eq!(handshake.name, "den");
        assert_eq!(handshake.ready_tag, "authenticated");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        assert!(toml::from_str::<Config>("hots = \"x\"").is_err());
    }

    #[test]
    fn invalid_values() {
        let config = Config {
            artwork_size: 0,
            ..Config::default()
        };
        assert_eq!(config.validate().unwrap_err().kind, ErrorKind::InvalidArgument);

        let config = Config {
            host: "not a host".to_owned(),
            ..Config::default()
        };
        assert_eq!(config.validate().unwrap_err().kind, ErrorKind::InvalidArgument);
    }

    #[test]
    fn missing_file() {
        let err = Config::from_file("/nonexistent/trackside.toml").unwrap_err();
        assert_eq!(err.kind, ErrorKind::InvalidArgument);
    }
}
