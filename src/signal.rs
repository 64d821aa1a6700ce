//! Process signals for the `watch` command.
//!
//! Ctrl-C and SIGTERM stop watching. SIGHUP drops the connection and opens a
//! new one, which is handy after the player restarted. Only Ctrl-C exists
//! outside Unix.

use std::fmt;

use crate::error::Result;

#[cfg(unix)]
use crate::error::Error;
#[cfg(unix)]
use tokio::signal::unix::{self, Signal, SignalKind};

/// What a received signal asks for.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub enum Trigger {
    Interrupt,
    Terminate,
    Reconnect,
}

impl Trigger {
    #[must_use]
    pub fn is_shutdown(self) -> bool {
        matches!(self, Self::Interrupt | Self::Terminate)
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Interrupt => "Ctrl+C",
            Self::Terminate => "SIGTERM",
            Self::Reconnect => "SIGHUP",
        };
        f.write_str(name)
    }
}

/// Listens for [`Trigger`]s.
pub struct Handler {
    #[cfg(unix)]
    terminate: Signal,
    #[cfg(unix)]
    hangup: Signal,
}

#[cfg(unix)]
fn listen(kind: SignalKind, trigger: Trigger) -> Result<Signal> {
    unix::signal(kind)
        .map_err(|e| Error::unavailable(format!("cannot listen for {trigger}: {e}")))
}

impl Handler {
    /// # Errors
    ///
    /// Returns `Unavailable` if a listener cannot be installed.
    pub fn new() -> Result<Self> {
        Ok(Self {
            #[cfg(unix)]
            terminate: listen(SignalKind::terminate(), Trigger::Terminate)?,
            #[cfg(unix)]
            hangup: listen(SignalKind::hangup(), Trigger::Reconnect)?,
        })
    }

    /// Waits for the next signal. Shutdown signals win when several are
    /// pending.
    pub async fn recv(&mut self) -> Trigger {
        #[cfg(unix)]
        {
            tokio::select! {
                biased;

                _ = tokio::signal::ctrl_c() => Trigger::Interrupt,
                _ = self.terminate.recv() => Trigger::Terminate,
                _ = self.hangup.recv() => Trigger::Reconnect,
            }
        }

        #[cfg(not(unix))]
        {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!("cannot listen for Ctrl+C: {e}");
            }
            Trigger::Interrupt
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_hangup_keeps_running() {
        assert!(Trigger::Interrupt.is_shutdown());
        assert!(Trigger::Terminate.is_shutdown());
        assert!(!Trigger::Reconnect.is_shutdown());
        assert_eq!(Trigger::Reconnect.to_string(), "SIGHUP");
    }
}
