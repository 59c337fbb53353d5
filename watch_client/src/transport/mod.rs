//! Live feed transports.
//!
//! A transport runs in its own task for one connection attempt. It reports
//! everything it observes through an [`EventSink`] tagged with the attempt id,
//! and receives outbound subscribe frames through its [`TransportHandle`].
//! Closing or dropping the handle aborts the task.
pub mod polling;
pub mod websocket;

use log::{debug, warn};
use reqwest::Client;
use tokio::sync::mpsc::{UnboundedSender, unbounded_channel};
use tokio::task::JoinHandle;
use watch_common::net::polling_url;
use watch_common::{FeedEnvelope, QuoteEvent, Result, SubscribeRequest, TransportMode, WatchError};

use crate::config::ClientConfig;
use crate::session::SessionEvent;

/// What a transport reports to the session.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// Handshake confirmed.
    Connected,
    /// The handshake failed.
    ConnectFailed(String),
    /// An established transport went away.
    Disconnected(String),
    /// A `price_update` payload.
    Quote(QuoteEvent),
}

/// Attempt-tagged channel into the session.
#[derive(Debug, Clone)]
pub struct EventSink {
    attempt: u32,
    tx: UnboundedSender<SessionEvent>,
}

impl EventSink {
    /// Sink for events of `attempt`.
    pub fn new(attempt: u32, tx: UnboundedSender<SessionEvent>) -> Self {
        Self { attempt, tx }
    }

    /// Attempt id carried by every event.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Sends `event`; returns `false` once the session is gone.
    pub fn emit(&self, event: TransportEvent) -> bool {
        self.tx
            .send(SessionEvent::Transport {
                attempt: self.attempt,
                event,
            })
            .is_ok()
    }
}

/// Owner side of a running transport.
#[derive(Debug)]
pub struct TransportHandle {
    attempt: u32,
    outbound: UnboundedSender<String>,
    task: Option<JoinHandle<()>>,
}

impl TransportHandle {
    /// Wraps the outbound frame channel and the task driving the transport.
    pub fn new(attempt: u32, outbound: UnboundedSender<String>, task: Option<JoinHandle<()>>) -> Self {
        Self {
            attempt,
            outbound,
            task,
        }
    }

    /// Attempt this transport belongs to.
    pub fn attempt(&self) -> u32 {
        self.attempt
    }

    /// Queues a subscribe frame.
    pub fn send(&self, request: &SubscribeRequest) -> Result<()> {
        let frame = request.to_envelope()?.to_json()?;
        self.outbound
            .send(frame)
            .map_err(|_| WatchError::ChannelSend(format!("transport of attempt {} is gone", self.attempt)))
    }

    /// Tears the transport down.
    pub fn close(mut self) {
        self.abort();
    }

    fn abort(&mut self) {
        if let Some(task) = self.task.take() {
            debug!("Releasing transport of attempt {}", self.attempt);
            task.abort();
        }
    }
}

impl Drop for TransportHandle {
    fn drop(&mut self) {
        self.abort();
    }
}

/// Opens transports for connection attempts.
pub trait Connector: Send + 'static {
    /// Starts a transport in `mode`; the handshake outcome arrives through `sink`.
    fn open(&mut self, mode: TransportMode, sink: EventSink) -> TransportHandle;
}

/// Connector for the real pricing feed.
#[derive(Debug, Clone)]
pub struct FeedConnector {
    feed_url: String,
    http: Client,
}

impl FeedConnector {
    /// Connector for `config.feed_url`.
    pub fn new(config: &ClientConfig) -> Result<Self> {
        let http = Client::builder()
            .timeout(config.http_timeout)
            .build()
            .map_err(|e| WatchError::Http(e.to_string()))?;
        Ok(Self {
            feed_url: config.feed_url.clone(),
            http,
        })
    }
}

impl Connector for FeedConnector {
    fn open(&mut self, mode: TransportMode, sink: EventSink) -> TransportHandle {
        match mode {
            TransportMode::Streaming => websocket::spawn(self.feed_url.clone(), sink),
            TransportMode::Polling => match polling_url(&self.feed_url) {
                Ok(url) => polling::spawn(self.http.clone(), url, sink),
                Err(e) => failed(sink, e.to_string()),
            },
        }
    }
}

/// Handle of a transport that could not even start.
fn failed(sink: EventSink, reason: String) -> TransportHandle {
    let (outbound, _) = unbounded_channel();
    let attempt = sink.attempt();
    sink.emit(TransportEvent::ConnectFailed(reason));
    TransportHandle::new(attempt, outbound, None)
}

/// Decodes one text frame and forwards its quote, if any.
pub(crate) fn deliver_text(sink: &EventSink, text: &str) {
    match FeedEnvelope::from_json(text) {
        Ok(envelope) => deliver_envelope(sink, &envelope),
        Err(e) => warn!("Skipping malformed feed frame: {} ({})", e, text),
    }
}

/// Forwards the quote carried by `envelope`, if any.
pub(crate) fn deliver_envelope(sink: &EventSink, envelope: &FeedEnvelope) {
    match envelope.quote() {
        Some(Ok(quote)) => {
            sink.emit(TransportEvent::Quote(quote));
        }
        Some(Err(e)) => warn!("Skipping malformed quote: {}", e),
        None => debug!("Ignoring feed event {:?}", envelope.event),
    }
}
