//! Session with a media player's control service.
//!
//! A [`Session`] owns one websocket connection at a time and turns the
//! service's message stream into typed state:
//!
//! * Connection lifecycle: `Idle` → `Connecting` → `Open` → `Closing` →
//!   `Closed`, with [`connect`](Session::connect) re-opening from `Closed`
//! * Player state pushes become [`Track`], [`PlayerState`] and
//!   [`PlaybackTiming`] events, deduplicated against the last known values
//! * Queries like [`queue`](Session::queue) send a command and wait for the
//!   next frame with the matching tag
//! * Commands are validated before they are sent, and refused unless the
//!   session is open
//!
//! There is no reconnection policy. When the connection drops, the session
//! publishes [`Event::Disconnected`] and stays closed until the caller
//! connects again.
//!
//! # Example
//!
//! ```no_run
//! use trackside::{config::Config, events::Event, Session};
//!
//! # async fn example() -> trackside::error::Result<()> {
//! let session = Session::new(Config::default())?;
//! let mut events = session.subscribe();
//! session.connect().await?;
//!
//! session.set_volume(0.5)?;
//! println!("{}", session.lyrics().await?);
//!
//! while let Ok(event) = events.recv().await {
//!     if let Event::TrackChanged(track) = event {
//!         println!("now playing {track}");
//!     }
//! }
//! # Ok(())
//! # }
//! ```

use std::{
    fmt,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex, MutexGuard, PoisonError, Weak,
    },
};

use serde_json::Value;
use tokio::sync::{
    broadcast,
    mpsc::{UnboundedReceiver, UnboundedSender},
    watch,
};
use url::Url;

use crate::{
    bridge::{Bridge, Waiter},
    config::Config,
    error::{Error, Result},
    events::Event,
    lyrics::{self, LyricLine},
    player::{PlaybackTiming, PlayerState, RepeatMode},
    protocol::{Command, Frame, MediaKind},
    queue::QueueSnapshot,
    search::{self, SearchKind},
    track::Track,
    transport::{Incoming, Outgoing, Transport, WebSocket},
};

/// Lifecycle of a session's connection.
#[derive(Copy, Clone, Debug, Default, Eq, Hash, PartialEq)]
pub enum ConnectionState {
    #[default]
    Idle,
    Connecting,
    Open,
    Closing,
    Closed,
}

impl fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Connecting => write!(f, "connecting"),
            Self::Open => write!(f, "open"),
            Self::Closing => write!(f, "closing"),
            Self::Closed => write!(f, "closed"),
        }
    }
}

/// Client session. Clones share the same connection and state.
pub struct Session<T: Transport = WebSocket> {
    inner: Arc<Inner<T>>,
}

struct Inner<T> {
    config: Config,
    url: Url,
    transport: T,

    state: watch::Sender<ConnectionState>,
    link: Mutex<Option<Connection>>,
    generation: AtomicU64,

    snapshot: Mutex<Snapshot>,
    bridge: Bridge,
    events: broadcast::Sender<Event>,
}

/// Sending half of the current connection.
struct Connection {
    generation: u64,
    outgoing: UnboundedSender<Outgoing>,
}

/// Last published values, for deduplication.
#[derive(Default)]
struct Snapshot {
    track: Option<Track>,
    state: Option<PlayerState>,
}

/// Locks a mutex, recovering the data if a holder panicked.
fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

impl Session<WebSocket> {
    /// Creates a session that connects over a websocket.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configuration does not validate.
    pub fn new(config: Config) -> Result<Self> {
        Self::with_transport(config, WebSocket)
    }
}

impl<T: Transport> Session<T> {
    /// Creates a session that connects through `transport`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the configuration does not validate.
    pub fn with_transport(config: Config, transport: T) -> Result<Self> {
        config.validate()?;
        let url = config.url()?;

        let (state, _) = watch::channel(ConnectionState::Idle);
        let (events, _) = broadcast::channel(config.event_capacity);

        Ok(Self {
            inner: Arc::new(Inner {
                config,
                url,
                transport,
                state,
                link: Mutex::new(None),
                generation: AtomicU64::new(0),
                snapshot: Mutex::new(Snapshot::default()),
                bridge: Bridge::default(),
                events,
            }),
        })
    }

    /// Opens the connection.
    ///
    /// Does nothing if the session is already connecting or open. With a
    /// handshake configured, returns once the service confirmed it.
    ///
    /// # Errors
    ///
    /// * `ConnectionState` if the session is still closing
    /// * `Unavailable` if the transport could not connect
    /// * `ConnectionClosed` if the session was closed while connecting
    /// * `Timeout` if the handshake was not confirmed in time
    pub async fn connect(&self) -> Result<()> {
        let mut refused = None;
        let claimed = self.inner.state.send_if_modified(|state| match state {
            ConnectionState::Idle | ConnectionState::Closed => {
                *state = ConnectionState::Connecting;
                true
            }
            ConnectionState::Closing => {
                refused = Some(*state);
                false
            }
            ConnectionState::Connecting | ConnectionState::Open => false,
        });

        if let Some(state) = refused {
            return Err(Error::not_connected(state));
        }
        if !claimed {
            debug!("session already {}", self.state());
            return Ok(());
        }

        info!("connecting to {}", self.inner.url);
        let link = match self.inner.transport.open(&self.inner.url).await {
            Ok(link) => link,
            Err(e) => {
                error!("could not connect to {}: {e}", self.inner.url);
                self.inner.state.send_replace(ConnectionState::Closed);
                return Err(e);
            }
        };

        let generation = self.inner.generation.fetch_add(1, Ordering::SeqCst) + 1;
        *lock(&self.inner.link) = Some(Connection {
            generation,
            outgoing: link.outgoing,
        });
        tokio::spawn(Inner::dispatch(
            Arc::downgrade(&self.inner),
            generation,
            link.incoming,
        ));

        if self.state() == ConnectionState::Closing {
            self.inner.send_close();
            return Err(Error::connection_closed("session closed while connecting"));
        }

        match &self.inner.config.handshake {
            None => {
                let opened = self.inner.state.send_if_modified(|state| {
                    if *state == ConnectionState::Connecting {
                        *state = ConnectionState::Open;
                        true
                    } else {
                        false
                    }
                });
                if !opened {
                    return Err(Error::connection_closed("session closed while connecting"));
                }

                info!("connected to {}", self.inner.url);
                self.inner.emit(Event::Connected);
                Ok(())
            }
            Some(handshake) => {
                let waiter = self.inner.bridge.register(&handshake.ready_tag)?;
                let identify = Command::Identify {
                    name: handshake.name.clone(),
                };
                if let Err(e) = self.inner.transmit(&identify) {
                    drop(waiter);
                    self.inner.bridge.prune(&handshake.ready_tag);
                    return Err(e);
                }

                debug!("waiting for {} to confirm handshake", handshake.ready_tag);
                if let Err(e) = self.inner.wait(waiter).await {
                    error!("handshake failed: {e}");
                    self.close();
                    return Err(e);
                }
                Ok(())
            }
        }
    }

    /// Starts closing the connection. Pending queries are rejected once it
    /// has closed; see [`closed`](Self::closed).
    pub fn close(&self) {
        let closing = self.inner.state.send_if_modified(|state| {
            if matches!(state, ConnectionState::Connecting | ConnectionState::Open) {
                *state = ConnectionState::Closing;
                true
            } else {
                false
            }
        });

        if closing {
            info!("closing connection to {}", self.inner.url);
            self.inner.send_close();
        }
    }

    /// Waits until the connection is closed, or was never opened.
    pub async fn closed(&self) {
        let mut changes = self.inner.state.subscribe();
        let _ = changes
            .wait_for(|state| matches!(state, ConnectionState::Idle | ConnectionState::Closed))
            .await;
    }

    #[must_use]
    pub fn state(&self) -> ConnectionState {
        self.inner.state()
    }

    /// Receives every state transition from now on.
    #[must_use]
    pub fn state_changes(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    /// Receives every event published from now on.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<Event> {
        self.inner.events.subscribe()
    }

    /// Last published track, if connected.
    #[must_use]
    pub fn track(&self) -> Option<Track> {
        lock(&self.inner.snapshot).track.clone()
    }

    /// Last published player state, if connected.
    #[must_use]
    pub fn player(&self) -> Option<PlayerState> {
        lock(&self.inner.snapshot).state.clone()
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.inner.config
    }

    /// Fails unless the session is open.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionState` with the current state.
    pub fn connection_check(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Open => Ok(()),
            state => Err(Error::not_connected(state)),
        }
    }

    /// Sends a command without waiting for any response.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionState` unless the session is open.
    pub fn send(&self, command: &Command) -> Result<()> {
        self.connection_check()?;
        self.inner.transmit(command)
    }

    /// Sends `command` and waits for the next frame tagged `tag`, returning
    /// its payload.
    ///
    /// Concurrent requests for the same tag are sent one after another, each
    /// after the previous one got its response.
    ///
    /// # Errors
    ///
    /// * `ConnectionState` unless the session is open
    /// * `ConnectionClosed` if the connection closed while waiting
    /// * `Timeout` if a request timeout is configured and elapsed
    pub async fn request(&self, command: &Command, tag: &str) -> Result<Value> {
        let lane = self.inner.bridge.lane(tag);
        let _turn = lane.lock().await;

        self.connection_check()?;
        let waiter = self.inner.bridge.register(tag)?;
        if let Err(e) = self.inner.transmit(command) {
            drop(waiter);
            self.inner.bridge.prune(tag);
            return Err(e);
        }

        self.inner.wait(waiter).await
    }

    /// Waits for the next frame tagged `tag` without sending anything.
    ///
    /// # Errors
    ///
    /// * `ConnectionState` unless the session is connecting or open
    /// * `ConnectionClosed` if the connection closed while waiting
    /// * `Timeout` if a request timeout is configured and elapsed
    pub async fn await_once(&self, tag: &str) -> Result<Value> {
        let lane = self.inner.bridge.lane(tag);
        let _turn = lane.lock().await;

        self.inner.waitable()?;
        let waiter = self.inner.bridge.register(tag)?;

        // A close between the check and the registration would never reject
        // this waiter.
        if let Err(e) = self.inner.waitable() {
            drop(waiter);
            self.inner.bridge.prune(tag);
            return Err(e);
        }

        self.inner.wait(waiter).await
    }

    /// Fetches the current track.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request), plus `MalformedPayload` if the response
    /// does not decode.
    pub async fn current_track(&self) -> Result<Track> {
        let payload = self
            .request(&Command::GetCurrentItem, Frame::PLAYBACK_STATE_UPDATE)
            .await?;
        Track::decode(&payload, self.inner.config.artwork_size)
    }

    /// Fetches the current player state.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request), plus `MalformedPayload` if the response
    /// does not decode.
    pub async fn player_state(&self) -> Result<PlayerState> {
        let payload = self
            .request(&Command::GetCurrentItem, Frame::PLAYBACK_STATE_UPDATE)
            .await?;
        PlayerState::decode(&payload)
    }

    /// Fetches the play queue.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request), plus `MalformedPayload` if the response
    /// does not decode.
    pub async fn queue(&self) -> Result<QueueSnapshot> {
        let payload = self.request(&Command::GetQueue, Frame::QUEUE).await?;
        QueueSnapshot::decode(&payload, self.inner.config.artwork_size)
    }

    /// Fetches the lyrics of the current track as plain text, one line each.
    ///
    /// # Errors
    ///
    /// As [`lyrics_advanced`](Self::lyrics_advanced).
    pub async fn lyrics(&self) -> Result<String> {
        let lines = self.lyrics_advanced().await?;
        Ok(lyrics::to_plain_text(&lines))
    }

    /// Fetches the time-synced lyrics of the current track.
    ///
    /// # Errors
    ///
    /// As [`request`](Self::request), plus `MalformedPayload` if the response
    /// does not decode.
    pub async fn lyrics_advanced(&self) -> Result<Vec<LyricLine>> {
        let payload = self.request(&Command::GetLyrics, Frame::LYRICS).await?;
        lyrics::decode(&payload)
    }

    /// Searches the catalog.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `query` is blank or `limit` is outside `1..=50`,
    /// otherwise as [`request`](Self::request).
    pub async fn search(&self, query: &str, kind: SearchKind, limit: u8) -> Result<Vec<Track>> {
        let command = Command::search(query, kind, limit)?;
        let payload = self.request(&command, Frame::SEARCH_RESULTS).await?;
        search::decode(&payload, kind, self.inner.config.artwork_size)
    }

    /// # Errors
    ///
    /// Returns `ConnectionState` unless the session is open.
    pub fn play(&self) -> Result<()> {
        self.send(&Command::Play)
    }

    /// # Errors
    ///
    /// Returns `ConnectionState` unless the session is open.
    pub fn pause(&self) -> Result<()> {
        self.send(&Command::Pause)
    }

    /// # Errors
    ///
    /// Returns `ConnectionState` unless the session is open.
    pub fn next(&self) -> Result<()> {
        self.send(&Command::Next)
    }

    /// # Errors
    ///
    /// Returns `ConnectionState` unless the session is open.
    pub fn previous(&self) -> Result<()> {
        self.send(&Command::Previous)
    }

    /// Seeks to `value`, in milliseconds if `milliseconds` is set and in
    /// seconds otherwise.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `value` is negative, otherwise as
    /// [`send`](Self::send).
    pub fn seek(&self, value: f64, milliseconds: bool) -> Result<()> {
        self.send(&Command::seek(value, milliseconds)?)
    }

    /// Sets the volume from 0.0 to 1.0.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `ratio` is out of range, otherwise as
    /// [`send`](Self::send).
    pub fn set_volume(&self, ratio: f64) -> Result<()> {
        self.send(&Command::volume(ratio)?)
    }

    /// Advances the repeat mode by one: off, track, queue, off.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionState` unless the session is open.
    pub fn cycle_repeat(&self) -> Result<()> {
        self.send(&Command::Repeat)
    }

    /// Sets the repeat mode: 0 for off, 1 for track, 2 for queue.
    ///
    /// The service can only cycle forward, so this sends as many cycle
    /// commands as it takes to get from the current mode to `mode`. The
    /// current mode is the last published one, or fetched if there is none.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `mode` is not 0, 1 or 2, otherwise as
    /// [`player_state`](Self::player_state).
    pub async fn set_repeat(&self, mode: u8) -> Result<()> {
        let target = RepeatMode::try_from(mode)?;
        let current = self.known_state().await?.repeat_mode();

        let steps = current.steps_to(target);
        debug!("repeat {current} -> {target}: cycling {steps} time(s)");
        for _ in 0..steps {
            self.cycle_repeat()?;
        }

        Ok(())
    }

    /// # Errors
    ///
    /// Returns `ConnectionState` unless the session is open.
    pub fn toggle_shuffle(&self) -> Result<()> {
        self.send(&Command::Shuffle)
    }

    /// Turns shuffle on or off, toggling only if it differs from the current
    /// state.
    ///
    /// # Errors
    ///
    /// As [`player_state`](Self::player_state).
    pub async fn set_shuffle(&self, enabled: bool) -> Result<()> {
        if self.known_state().await?.is_shuffling() == enabled {
            debug!("shuffle already {}", if enabled { "on" } else { "off" });
            return Ok(());
        }

        self.toggle_shuffle()
    }

    /// # Errors
    ///
    /// Returns `ConnectionState` unless the session is open.
    pub fn set_autoplay(&self, enabled: bool) -> Result<()> {
        self.send(&Command::Autoplay { autoplay: enabled })
    }

    /// Moves the queue item at index `from` to index `to`.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionState` unless the session is open.
    pub fn move_queue(&self, from: usize, to: usize) -> Result<()> {
        self.send(&Command::QueueMove { from, to })
    }

    /// Replaces the queue with the item `id` and plays it.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `id` is empty, otherwise as [`send`](Self::send).
    pub fn play_by_id(&self, id: &str, kind: MediaKind) -> Result<()> {
        self.send(&Command::play_item(id, kind)?)
    }

    /// Plays the item `id` after the current one.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `id` is empty, otherwise as [`send`](Self::send).
    pub fn play_next_by_id(&self, id: &str, kind: MediaKind) -> Result<()> {
        self.send(&Command::play_next(id, kind)?)
    }

    /// Appends the item `id` to the queue.
    ///
    /// # Errors
    ///
    /// `InvalidArgument` if `id` is empty, otherwise as [`send`](Self::send).
    pub fn enqueue_by_id(&self, id: &str, kind: MediaKind) -> Result<()> {
        self.send(&Command::play_later(id, kind)?)
    }

    /// Asks the player application to quit.
    ///
    /// # Errors
    ///
    /// Returns `ConnectionState` unless the session is open.
    pub fn quit(&self) -> Result<()> {
        self.send(&Command::Quit)
    }

    /// Last published player state, or a fresh one.
    async fn known_state(&self) -> Result<PlayerState> {
        self.connection_check()?;
        match self.player() {
            Some(state) => Ok(state),
            None => self.player_state().await,
        }
    }
}

impl<T> Inner<T> {
    fn state(&self) -> ConnectionState {
        *self.state.borrow()
    }

    /// Fails unless waiters can still be resolved.
    fn waitable(&self) -> Result<()> {
        match self.state() {
            ConnectionState::Connecting | ConnectionState::Open => Ok(()),
            state => Err(Error::not_connected(state)),
        }
    }

    fn emit(&self, event: Event) {
        // No subscribers is fine.
        let _ = self.events.send(event);
    }

    /// Queues a command on the current connection, whatever the state.
    fn transmit(&self, command: &Command) -> Result<()> {
        let text = command.to_json(self.config.envelope)?;

        let link = lock(&self.link);
        let connection = link
            .as_ref()
            .ok_or_else(|| Error::not_connected(self.state()))?;

        debug!("sending {command}");
        connection
            .outgoing
            .send(Outgoing::Text(text))
            .map_err(|_| Error::not_connected(ConnectionState::Closed))
    }

    fn send_close(&self) {
        if let Some(connection) = lock(&self.link).as_ref() {
            if connection.outgoing.send(Outgoing::Close).is_err() {
                debug!("connection {} already gone", connection.generation);
            }
        }
    }

    async fn wait(&self, waiter: Waiter) -> Result<Value> {
        let Some(timeout) = self.config.request_timeout else {
            return waiter.wait().await;
        };

        let tag = waiter.tag().to_owned();
        if let Ok(result) = tokio::time::timeout(timeout, waiter.wait()).await {
            result
        } else {
            self.bridge.prune(&tag);
            Err(Error::timeout(format!(
                "no {tag} within {:.1}s",
                timeout.as_secs_f32()
            )))
        }
    }

    /// Handles one connection's inbound messages in arrival order. Stops
    /// when the connection closes or the session is dropped.
    async fn dispatch(inner: Weak<Self>, generation: u64, mut incoming: UnboundedReceiver<Incoming>) {
        while let Some(message) = incoming.recv().await {
            let Some(inner) = inner.upgrade() else {
                return;
            };

            match message {
                Incoming::Frame(text) => inner.on_frame(&text),
                Incoming::Closed(reason) => {
                    inner.on_close(generation, reason);
                    return;
                }
            }
        }

        if let Some(inner) = inner.upgrade() {
            inner.on_close(generation, None);
        }
    }

    fn on_frame(&self, text: &str) {
        trace!("<- {text}");
        let frame = match Frame::parse(text) {
            Ok(frame) => frame,
            Err(e) => {
                warn!("dropping frame: {e}");
                return;
            }
        };

        self.emit(Event::Frame {
            tag: frame.tag.clone(),
            payload: frame.payload.clone(),
        });

        if frame.is_playback_state() {
            self.on_playback_state(&frame.payload);
        }

        if let Some(handshake) = &self.config.handshake {
            if frame.tag == handshake.ready_tag {
                let opened = self.state.send_if_modified(|state| {
                    if *state == ConnectionState::Connecting {
                        *state = ConnectionState::Open;
                        true
                    } else {
                        false
                    }
                });
                if opened {
                    info!("connected to {} as {}", self.url, handshake.name);
                    self.emit(Event::Connected);
                }
            }
        }

        if self.bridge.resolve(&frame.tag, frame.payload) {
            trace!("resolved pending {}", frame.tag);
        }
    }

    /// Derives track, player state and timing. Each one that fails to decode
    /// is skipped on its own.
    fn on_playback_state(&self, payload: &Value) {
        let mut changes = Vec::with_capacity(3);

        {
            let mut snapshot = lock(&self.snapshot);

            match Track::decode(payload, self.config.artwork_size) {
                Ok(track) if track.duration().is_zero() => {
                    trace!("ignoring placeholder track {track}");
                }
                Ok(track) => {
                    let is_new = snapshot
                        .track
                        .as_ref()
                        .is_none_or(|current| current.id() != track.id());
                    if is_new {
                        debug!("track changed: {track}");
                        snapshot.track = Some(track.clone());
                        changes.push(Event::TrackChanged(track));
                    }
                }
                Err(e) => warn!("{e}"),
            }

            match PlayerState::decode(payload) {
                Ok(state) => {
                    if snapshot.state.as_ref() != Some(&state) {
                        debug!("player state changed: {state}");
                        snapshot.state = Some(state.clone());
                        changes.push(Event::StateChanged(state));
                    }
                }
                Err(e) => warn!("{e}"),
            }
        }

        match PlaybackTiming::decode(payload) {
            Ok(timing) => changes.push(Event::TimingChanged(timing)),
            Err(e) => warn!("{e}"),
        }

        for change in changes {
            self.emit(change);
        }
    }

    fn on_close(&self, generation: u64, reason: Option<String>) {
        {
            let mut link = lock(&self.link);
            match link.as_ref() {
                Some(connection) if connection.generation == generation => *link = None,
                _ => {
                    debug!("ignoring close of superseded connection {generation}");
                    return;
                }
            }
        }

        match reason {
            Some(reason) => info!("disconnected from {}: {reason}", self.url),
            None => info!("disconnected from {}", self.url),
        }
        *lock(&self.snapshot) = Snapshot::default();

        // Must be queued before `closed()` can return.
        self.emit(Event::Disconnected);
        self.state.send_replace(ConnectionState::Closed);

        // Waiters registered after this point fail `await_once`'s re-check.
        self.bridge.reject_all();
    }
}

impl<T: Transport> Clone for Session<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T: Transport> fmt::Debug for Session<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("url", &self.inner.url.as_str())
            .field("state", &self.state())
            .finish_non_exhaustive()
    }
}
