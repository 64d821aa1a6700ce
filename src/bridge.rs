//! Turns "send a command, then wait for the next frame with some tag" into an
//! awaitable call.
//!
//! Frames carry no correlation identifier, only their tag. So at most one
//! waiter can be registered per tag, and callers that want the same tag queue
//! up on that tag's lane first. Lanes are fair, so callers are served in the
//! order they arrived.

use std::{
    collections::HashMap,
    sync::{Arc, Mutex, PoisonError},
};

use serde_json::Value;
use tokio::sync::oneshot;

use crate::error::{Error, Result};

type Resolver = oneshot::Sender<Result<Value>>;

/// Held while waiting for a tag.
pub(crate) type Lane = tokio::sync::Mutex<()>;

#[derive(Debug, Default)]
pub(crate) struct Bridge {
    waiters: Mutex<HashMap<String, Resolver>>,
    lanes: Mutex<HashMap<String, Arc<Lane>>>,
}

/// A registered wait for one frame.
#[derive(Debug)]
pub(crate) struct Waiter {
    tag: String,
    receiver: oneshot::Receiver<Result<Value>>,
}

impl Bridge {
    /// Returns the lane that serializes callers waiting on `tag`.
    ///
    /// Lanes nobody holds are dropped on the way, so the map only tracks
    /// tags with callers in flight.
    pub fn lane(&self, tag: &str) -> Arc<Lane> {
        let mut lanes = self.lanes.lock().unwrap_or_else(PoisonError::into_inner);
        lanes.retain(|_, lane| Arc::strong_count(lane) > 1);
        Arc::clone(lanes.entry(tag.to_owned()).or_default())
    }

    /// Registers a waiter for the next frame tagged `tag`.
    ///
    /// # Errors
    ///
    /// Returns `Busy` if a live waiter is already registered for `tag`.
    pub fn register(&self, tag: &str) -> Result<Waiter> {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        if waiters.get(tag).is_some_and(|resolver| !resolver.is_closed()) {
            return Err(Error::busy(format!("already waiting for {tag}")));
        }

        let (resolver, receiver) = oneshot::channel();
        waiters.insert(tag.to_owned(), resolver);
        trace!("waiting for {tag}");

        Ok(Waiter {
            tag: tag.to_owned(),
            receiver,
        })
    }

    /// Hands `payload` to the waiter for `tag`. Returns whether there was one.
    pub fn resolve(&self, tag: &str, payload: Value) -> bool {
        let resolver = self
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(tag);

        match resolver {
            Some(resolver) => resolver.send(Ok(payload)).is_ok(),
            None => false,
        }
    }

    /// Unregisters the waiter for `tag` once its receiving end is gone.
    pub fn prune(&self, tag: &str) {
        let mut waiters = self.waiters.lock().unwrap_or_else(PoisonError::into_inner);
        if waiters.get(tag).is_some_and(oneshot::Sender::is_closed) {
            waiters.remove(tag);
        }
    }

    /// Fails every waiter with `ConnectionClosed`.
    pub fn reject_all(&self) {
        let waiters: Vec<_> = self
            .waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .collect();

        for (tag, resolver) in waiters {
            debug!("rejecting pending {tag}");
            let _ = resolver.send(Err(Error::connection_closed(format!(
                "connection closed while waiting for {tag}"
            ))));
        }
    }

    /// Number of tags with a lane.
    #[cfg(test)]
    pub fn lanes(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Number of registered waiters.
    #[cfg(test)]
    pub fn pending(&self) -> usize {
        self.waiters
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }
}

impl Waiter {
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// Suspends until the frame arrives or the connection closes.
    pub async fn wait(self) -> Result<Value> {
        self.receiver.await.unwrap_or_else(|_| {
            Err(Error::connection_closed(format!(
                "stopped waiting for {}",
                self.tag
            )))
        })
    }
}
