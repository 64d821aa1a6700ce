//! Message transport underneath a session.
//!
//! A [`Transport`] opens a [`Link`]: a pair of channels to and from the
//! service. Whatever pumps those channels owns the actual connection, so the
//! session never blocks on network I/O.
//!
//! * The `open` future resolving means the connection is established.
//! * Each [`Incoming::Frame`] is one text message.
//! * Exactly one [`Incoming::Closed`], or the channel ending, means the
//!   connection is gone. There is no retry.

use std::{future::Future, sync::Arc};

use futures_util::{SinkExt, StreamExt};
use tokio::{
    net::TcpStream,
    sync::mpsc::{self, UnboundedReceiver, UnboundedSender},
};
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Result;

/// Frames larger than this are dropped instead of parsed.
pub const MAX_FRAME_SIZE: usize = 4 * 1024 * 1024;

/// Message from the session to the service.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Outgoing {
    Text(String),

    /// Close the connection gracefully.
    Close,
}

/// Message from the service to the session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Incoming {
    Frame(String),

    /// The connection closed, with the reason the service gave if any.
    Closed(Option<String>),
}

/// Channels of an open connection.
#[derive(Debug)]
pub struct Link {
    pub outgoing: UnboundedSender<Outgoing>,
    pub incoming: UnboundedReceiver<Incoming>,
}

/// Opens connections to the service.
pub trait Transport: Send + Sync + 'static {
    /// Connects to `url`.
    ///
    /// # Errors
    ///
    /// Returns [`Unavailable`](crate::error::ErrorKind::Unavailable) if the
    /// service cannot be reached, or
    /// [`InvalidArgument`](crate::error::ErrorKind::InvalidArgument) if `url`
    /// is unusable.
    fn open(&self, url: &Url) -> impl Future<Output = Result<Link>> + Send;
}

impl<T: Transport> Transport for Arc<T> {
    fn open(&self, url: &Url) -> impl Future<Output = Result<Link>> + Send {
        self.as_ref().open(url)
    }
}

/// Transport over a websocket, plain or TLS.
#[derive(Copy, Clone, Debug, Default)]
pub struct WebSocket;

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

impl Transport for WebSocket {
    async fn open(&self, url: &Url) -> Result<Link> {
        let (stream, response) = tokio_tungstenite::connect_async(url.as_str()).await?;
        debug!("websocket handshake: {}", response.status());

        let (outgoing, outgoing_rx) = mpsc::unbounded_channel();
        let (incoming_tx, incoming) = mpsc::unbounded_channel();
        tokio::spawn(Self::pump(stream, outgoing_rx, incoming_tx));

        Ok(Link { outgoing, incoming })
    }
}

impl WebSocket {
    /// Moves messages between the websocket and the link until either side
    /// closes. Always ends with [`Incoming::Closed`].
    async fn pump(
        stream: WsStream,
        mut outgoing: UnboundedReceiver<Outgoing>,
        incoming: UnboundedSender<Incoming>,
    ) {
        let (mut sink, mut stream) = stream.split();

        let reason = loop {
            tokio::select! {
                message = outgoing.recv() => match message {
                    Some(Outgoing::Text(text)) => {
                        trace!("-> {text}");
                        if let Err(e) = sink.send(Message::Text(text.into())).await {
                            error!("error sending message: {e}");
                            break Some(e.to_string());
                        }
                    }
                    Some(Outgoing::Close) | None => {
                        debug!("closing websocket");
                        if let Err(e) = sink.close().await {
                            debug!("error closing websocket: {e}");
                        }
                        break None;
                    }
                },

                message = stream.next() => match message {
                    Some(Ok(Message::Text(text))) => {
                        let size = text.len();
                        if size > MAX_FRAME_SIZE {
                            error!("ignoring oversized frame with {size} bytes");
                        } else if incoming.send(Incoming::Frame(text.as_str().to_owned())).is_err() {
                            break None;
                        }
                    }
                    Some(Ok(Message::Binary(data))) => {
                        debug!("ignoring binary message with {} bytes", data.len());
                    }
                    // Pongs are queued by tungstenite and flushed on the next
                    // read or write.
                    Some(Ok(Message::Ping(_))) => trace!("ping -> pong"),
                    Some(Ok(Message::Close(frame))) => {
                        break frame
                            .map(|frame| frame.reason.as_str().to_owned())
                            .filter(|reason| !reason.is_empty());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(e)) => {
                        error!("error receiving message: {e}");
                        break Some(e.to_string());
                    }
                    None => break None,
                },
            }
        };

        // The session may already be gone.
        let _ = incoming.send(Incoming::Closed(reason));
    }
}
