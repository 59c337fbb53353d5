//! Client session: the single owner of the live market watch state.
//!
//! `FeedSession` holds the connection manager, the subscription dispatcher, the
//! quote book, the catalog, the live transport handle and every pending timer.
//! One task processes `SessionEvent`s in arrival order, so none of that state
//! needs a lock. Transports and timers only ever send events into the session
//! channel.
//!
//! Readers get a [`WatchView`] through a `tokio::sync::watch` channel. The view
//! is republished only when something observable changed. Quote ticks are
//! coalesced: the book's snapshot reaches readers once per publish interval,
//! while every other event publishes right away.
use std::sync::Arc;
use std::time::Duration;

use log::{debug, error, info, warn};
use tokio::sync::mpsc::{UnboundedReceiver, UnboundedSender, unbounded_channel};
use tokio::sync::{oneshot, watch};
use tokio::task::{AbortHandle, JoinHandle};
use watch_common::{Catalog, ConnectionState, Result, SubscribeRequest, TransportMode, WatchError};

use crate::config::ClientConfig;
use crate::connection::{ConnectionEffect, ConnectionInput, ConnectionManager};
use crate::dispatcher::SubscriptionDispatcher;
use crate::reconciler::{QuoteBook, QuoteMap};
use crate::transport::{Connector, EventSink, TransportEvent, TransportHandle};

/// Requests a [`SessionHandle`] can make.
#[derive(Debug)]
pub enum SessionCommand {
    /// Start a connection cycle.
    Connect,
    /// Tear the feed down.
    Disconnect,
    /// Disconnect, drop every quote row and connect again.
    Reconnect,
    /// Subscribe the whole catalog, connecting first if needed.
    SubscribeAll {
        /// Receives the outcome once the plan started or the wait expired.
        reply: Option<oneshot::Sender<Result<()>>>,
    },
    /// Swap the catalog; quote rows are reset.
    ReplaceCatalog(Catalog),
    /// Release everything and end the session task.
    Stop,
}

/// Everything the session task reacts to.
#[derive(Debug)]
pub enum SessionEvent {
    /// Report from the transport of `attempt`.
    Transport {
        /// Attempt id.
        attempt: u32,
        /// What happened.
        event: TransportEvent,
    },
    /// The bounded wait of `attempt` elapsed.
    AttemptTimedOut {
        /// Attempt id.
        attempt: u32,
    },
    /// The next batch of plan `generation` is due.
    BatchDue {
        /// Plan generation.
        generation: u64,
    },
    /// A deferred subscribe-all gave up waiting.
    SubscribeWaitExpired {
        /// Waiter id.
        waiter: u64,
    },
    /// Coalesced quote ticks are due for readers.
    PublishDue,
    /// Request from a handle.
    Command(SessionCommand),
}

/// Read-only view of the session for rendering.
#[derive(Debug, Clone)]
pub struct WatchView {
    /// Connection state.
    pub state: ConnectionState,
    /// `true` when the view should not block on the connection.
    pub connected: bool,
    /// User-visible error banner.
    pub error: Option<String>,
    /// Fallback notice.
    pub notice: Option<String>,
    /// Transport mode of the current attempt.
    pub mode: Option<TransportMode>,
    /// Quote rows.
    pub quotes: Arc<QuoteMap>,
    /// Membership version of `quotes`, for filter memoization.
    pub membership_version: u64,
    /// Number of catalog instruments.
    pub catalog_size: usize,
}

impl WatchView {
    fn same_as(&self, other: &WatchView) -> bool {
        self.state == other.state
            && self.connected == other.connected
            && self.error == other.error
            && self.notice == other.notice
            && self.mode == other.mode
            && Arc::ptr_eq(&self.quotes, &other.quotes)
            && self.membership_version == other.membership_version
            && self.catalog_size == other.catalog_size
    }
}

struct SubscribeWaiter {
    id: u64,
    reply: Option<oneshot::Sender<Result<()>>>,
    timer: AbortHandle,
}

/// Owner of one live market watch.
pub struct FeedSession<C: Connector> {
    config: ClientConfig,
    connector: C,
    manager: ConnectionManager,
    dispatcher: SubscriptionDispatcher,
    book: QuoteBook,
    catalog: Catalog,
    transport: Option<TransportHandle>,
    attempt_timer: Option<AbortHandle>,
    batch_timer: Option<AbortHandle>,
    publish_timer: Option<AbortHandle>,
    shown: Arc<QuoteMap>,
    shown_version: u64,
    waiters: Vec<SubscribeWaiter>,
    next_waiter: u64,
    events_tx: UnboundedSender<SessionEvent>,
    events_rx: UnboundedReceiver<SessionEvent>,
    view_tx: watch::Sender<WatchView>,
}

impl<C: Connector> FeedSession<C> {
    /// Closed session over `catalog`.
    pub fn new(config: ClientConfig, connector: C, catalog: Catalog) -> Self {
        let (events_tx, events_rx) = unbounded_channel();
        let manager = ConnectionManager::new(config.max_attempts);
        let dispatcher = SubscriptionDispatcher::new(config.batch_size);
        let book = QuoteBook::new();
        let (view_tx, _) = watch::channel(WatchView {
            state: manager.state(),
            connected: manager.connected(),
            error: None,
            notice: None,
            mode: None,
            quotes: book.snapshot(),
            membership_version: book.membership_version(),
            catalog_size: catalog.len(),
        });
        let shown = book.snapshot();
        let shown_version = book.membership_version();
        Self {
            config,
            connector,
            manager,
            dispatcher,
            book,
            catalog,
            transport: None,
            attempt_timer: None,
            batch_timer: None,
            publish_timer: None,
            shown,
            shown_version,
            waiters: Vec::new(),
            next_waiter: 0,
            events_tx,
            events_rx,
            view_tx,
        }
    }

    /// Handle for commands and view updates.
    pub fn handle(&self) -> SessionHandle {
        SessionHandle {
            commands: self.events_tx.clone(),
            view: self.view_tx.subscribe(),
        }
    }

    /// Spawns the session task.
    pub fn start(self) -> RunningSession {
        let handle = self.handle();
        let task = tokio::spawn(self.run());
        RunningSession { handle, task }
    }

    /// Processes events until a `Stop` command arrives.
    pub async fn run(mut self) {
        info!("Feed session started with {} instruments", self.catalog.len());
        while let Some(event) = self.events_rx.recv().await {
            let keep_running = self.process(event);
            self.publish();
            if !keep_running {
                break;
            }
        }
        info!("Feed session stopped");
    }

    /// Handles one event. Returns `false` when the session should end.
    pub fn process(&mut self, event: SessionEvent) -> bool {
        let tick = matches!(
            event,
            SessionEvent::Transport {
                event: TransportEvent::Quote(_),
                ..
            }
        );
        let keep_running = self.dispatch_event(event);
        if !tick {
            self.flush_quotes();
        }
        keep_running
    }

    fn dispatch_event(&mut self, event: SessionEvent) -> bool {
        match event {
            SessionEvent::Transport { attempt, event } => self.on_transport(attempt, event),
            SessionEvent::AttemptTimedOut { attempt } => {
                self.attempt_timer = None;
                self.drive(ConnectionInput::AttemptTimedOut { attempt });
            }
            SessionEvent::BatchDue { generation } => {
                self.batch_timer = None;
                self.run_batch(generation);
            }
            SessionEvent::SubscribeWaitExpired { waiter } => self.expire_waiter(waiter),
            SessionEvent::PublishDue => self.publish_timer = None,
            SessionEvent::Command(command) => return self.on_command(command),
        }
        true
    }

    fn on_transport(&mut self, attempt: u32, event: TransportEvent) {
        match event {
            TransportEvent::Connected => self.drive(ConnectionInput::TransportUp { attempt }),
            TransportEvent::ConnectFailed(reason) => {
                self.drive(ConnectionInput::AttemptFailed { attempt, reason })
            }
            TransportEvent::Disconnected(reason) => {
                self.drive(ConnectionInput::TransportDown { attempt, reason })
            }
            TransportEvent::Quote(quote) => {
                if !self.manager.is_current(attempt) || self.manager.state() != ConnectionState::Open {
                    debug!("Dropping quote from attempt {} while {}", attempt, self.manager.state());
                    return;
                }
                if self.book.on_quote_event(&quote).changed() && self.publish_timer.is_none() {
                    let timer = self.schedule(self.config.publish_interval, SessionEvent::PublishDue);
                    self.publish_timer = Some(timer);
                }
            }
        }
    }

    fn on_command(&mut self, command: SessionCommand) -> bool {
        match command {
            SessionCommand::Connect => self.drive(ConnectionInput::Connect),
            SessionCommand::Disconnect => self.disconnect(),
            SessionCommand::Reconnect => {
                info!("Reconnecting from scratch");
                self.disconnect();
                self.book.reset();
                self.drive(ConnectionInput::Connect);
            }
            SessionCommand::SubscribeAll { reply } => self.request_subscribe_all(reply),
            SessionCommand::ReplaceCatalog(catalog) => {
                info!("Catalog replaced: {} instruments", catalog.len());
                self.catalog = catalog;
                self.cancel_batches();
                self.book.reset();
                if self.manager.state() == ConnectionState::Open {
                    self.start_subscribe_all();
                }
            }
            SessionCommand::Stop => {
                self.shutdown();
                return false;
            }
        }
        true
    }

    fn disconnect(&mut self) {
        self.drive(ConnectionInput::Disconnect);
        self.drive(ConnectionInput::Released);
    }

    fn shutdown(&mut self) {
        self.disconnect();
        for mut waiter in self.waiters.drain(..) {
            waiter.timer.abort();
            if let Some(reply) = waiter.reply.take() {
                let _ = reply.send(Err(WatchError::NotConnected(String::from("session stopped"))));
            }
        }
    }

    /// Feeds the state machine and carries out its effects.
    fn drive(&mut self, input: ConnectionInput) {
        for effect in self.manager.dispatch(input) {
            self.apply(effect);
        }
    }

    fn apply(&mut self, effect: ConnectionEffect) {
        match effect {
            ConnectionEffect::TearDown => {
                if let Some(transport) = self.transport.take() {
                    transport.close();
                }
            }
            ConnectionEffect::Open { attempt, mode } => {
                let sink = EventSink::new(attempt, self.events_tx.clone());
                self.transport = Some(self.connector.open(mode, sink));
            }
            ConnectionEffect::ArmTimeout { attempt } => {
                let timer = self.schedule(
                    self.config.attempt_timeout,
                    SessionEvent::AttemptTimedOut { attempt },
                );
                self.attempt_timer = Some(timer);
            }
            ConnectionEffect::CancelTimeout => {
                if let Some(timer) = self.attempt_timer.take() {
                    timer.abort();
                }
            }
            ConnectionEffect::SubscribeAll => {
                self.start_subscribe_all();
                self.release_waiters();
            }
            ConnectionEffect::CancelBatches => self.cancel_batches(),
            ConnectionEffect::MarkInactive => {
                let stale = self.book.mark_inactive();
                if stale > 0 {
                    debug!("{} quotes marked inactive", stale);
                }
            }
        }
    }

    fn schedule(&self, delay: Duration, event: SessionEvent) -> AbortHandle {
        let tx = self.events_tx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(event);
        })
        .abort_handle()
    }

    fn request_subscribe_all(&mut self, reply: Option<oneshot::Sender<Result<()>>>) {
        let respond = |reply: Option<oneshot::Sender<Result<()>>>, outcome: Result<()>| {
            if let Some(reply) = reply {
                let _ = reply.send(outcome);
            }
        };
        if self.catalog.is_empty() {
            debug!("Subscribe-all over an empty catalog");
            respond(reply, Ok(()));
            return;
        }
        if self.manager.state() == ConnectionState::Open {
            self.start_subscribe_all();
            respond(reply, Ok(()));
            return;
        }
        if self.manager.state() != ConnectionState::Connecting {
            self.drive(ConnectionInput::Connect);
        }
        self.next_waiter += 1;
        let id = self.next_waiter;
        let timer = self.schedule(
            self.config.subscribe_wait,
            SessionEvent::SubscribeWaitExpired { waiter: id },
        );
        debug!("Subscribe-all deferred until the feed opens (waiter {})", id);
        self.waiters.push(SubscribeWaiter { id, reply, timer });
    }

    fn release_waiters(&mut self) {
        for mut waiter in self.waiters.drain(..) {
            waiter.timer.abort();
            if let Some(reply) = waiter.reply.take() {
                let _ = reply.send(Ok(()));
            }
        }
    }

    fn expire_waiter(&mut self, id: u64) {
        let Some(position) = self.waiters.iter().position(|w| w.id == id) else {
            return;
        };
        let mut waiter = self.waiters.remove(position);
        let message = format!(
            "feed still {} after {:?}, subscriptions not sent",
            self.manager.state(),
            self.config.subscribe_wait
        );
        error!("Subscribe-all failed: {}", message);
        self.manager.report_error(format!("Subscribe failed: {}", message));
        if let Some(reply) = waiter.reply.take() {
            let _ = reply.send(Err(WatchError::NotConnected(message)));
        }
    }

    fn start_subscribe_all(&mut self) {
        self.cancel_batches();
        if self.catalog.is_empty() {
            debug!("Nothing to subscribe");
            return;
        }
        let generation = self.dispatcher.plan(self.catalog.instruments());
        self.run_batch(generation);
    }

    fn run_batch(&mut self, generation: u64) {
        let Some(batch) = self.dispatcher.next_batch(generation) else {
            return;
        };
        let Some(transport) = self.transport.as_ref() else {
            warn!("No live transport for subscription batch, dropping the plan");
            self.dispatcher.cancel();
            return;
        };
        for instrument in &batch {
            if let Err(e) = transport.send(&SubscribeRequest::for_instrument(instrument)) {
                warn!("Subscribe for {} not sent: {}", instrument.name, e);
                self.dispatcher.cancel();
                return;
            }
            self.book.seed_pending(instrument);
        }
        debug!("Subscription batch of {} sent", batch.len());
        if self.dispatcher.has_more(generation) {
            let timer = self.schedule(self.config.batch_delay, SessionEvent::BatchDue { generation });
            self.batch_timer = Some(timer);
        }
    }

    /// Hands the book's current snapshot to readers.
    fn flush_quotes(&mut self) {
        if let Some(timer) = self.publish_timer.take() {
            timer.abort();
        }
        self.shown = self.book.snapshot();
        self.shown_version = self.book.membership_version();
    }

    fn cancel_batches(&mut self) {
        self.dispatcher.cancel();
        if let Some(timer) = self.batch_timer.take() {
            timer.abort();
        }
    }

    /// Current view.
    pub fn view(&self) -> WatchView {
        WatchView {
            state: self.manager.state(),
            connected: self.manager.connected(),
            error: self.manager.error().map(String::from),
            notice: self.manager.notice().map(String::from),
            mode: self.manager.mode(),
            quotes: Arc::clone(&self.shown),
            membership_version: self.shown_version,
            catalog_size: self.catalog.len(),
        }
    }

    fn publish(&self) {
        let next = self.view();
        self.view_tx.send_if_modified(|current| {
            if current.same_as(&next) {
                return false;
            }
            *current = next;
            true
        });
    }
}

/// Cloneable front door of a running session.
#[derive(Debug, Clone)]
pub struct SessionHandle {
    commands: UnboundedSender<SessionEvent>,
    view: watch::Receiver<WatchView>,
}

impl SessionHandle {
    fn send(&self, command: SessionCommand) -> Result<()> {
        self.commands
            .send(SessionEvent::Command(command))
            .map_err(|_| WatchError::ChannelSend(String::from("feed session has stopped")))
    }

    /// Starts a connection cycle.
    pub fn connect(&self) -> Result<()> {
        self.send(SessionCommand::Connect)
    }

    /// Tears the feed down.
    pub fn disconnect(&self) -> Result<()> {
        self.send(SessionCommand::Disconnect)
    }

    /// Drops every quote row and connects from scratch.
    pub fn reconnect(&self) -> Result<()> {
        self.send(SessionCommand::Reconnect)
    }

    /// Replaces the catalog.
    pub fn replace_catalog(&self, catalog: Catalog) -> Result<()> {
        self.send(SessionCommand::ReplaceCatalog(catalog))
    }

    /// Subscribes the whole catalog.
    ///
    /// Connects first when needed and fails with `WatchError::NotConnected` if
    /// the feed is not open within the subscribe wait.
    pub async fn subscribe_all(&self) -> Result<()> {
        let (reply, outcome) = oneshot::channel();
        self.send(SessionCommand::SubscribeAll { reply: Some(reply) })?;
        outcome
            .await
            .map_err(|_| WatchError::ChannelRecv(String::from("feed session dropped the request")))?
    }

    /// Latest view.
    pub fn view(&self) -> WatchView {
        self.view.borrow().clone()
    }

    /// A receiver notified on every view change.
    pub fn watch(&self) -> watch::Receiver<WatchView> {
        self.view.clone()
    }

    /// Waits until `predicate` holds for the view.
    pub async fn wait_for(&self, predicate: impl FnMut(&WatchView) -> bool) -> Result<WatchView> {
        let mut view = self.view.clone();
        let matched = view
            .wait_for(predicate)
            .await
            .map_err(|_| WatchError::ChannelRecv(String::from("feed session has stopped")))?;
        Ok(matched.clone())
    }
}

/// A spawned session.
#[derive(Debug)]
pub struct RunningSession {
    handle: SessionHandle,
    task: JoinHandle<()>,
}

impl RunningSession {
    /// Handle of the running session.
    pub fn handle(&self) -> &SessionHandle {
        &self.handle
    }

    /// Releases the transport, cancels every timer and waits for the task.
    pub async fn stop(self) -> Result<()> {
        self.handle.send(SessionCommand::Stop)?;
        self.task
            .await
            .map_err(|e| WatchError::ChannelRecv(format!("feed session task failed: {}", e)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use watch_common::{Instrument, QuoteStatus};

    #[derive(Default)]
    struct Silent {
        frames: Vec<UnboundedReceiver<String>>,
    }

    impl Connector for Silent {
        fn open(&mut self, _mode: TransportMode, sink: EventSink) -> TransportHandle {
            let (tx, rx) = unbounded_channel();
            self.frames.push(rx);
            TransportHandle::new(sink.attempt(), tx, None)
        }
    }

    fn session(n: u64) -> FeedSession<Silent> {
        let catalog = Catalog::new(
            (1..=n)
                .map(|token| Instrument::new(&format!("I{}", token), token, &token.to_string()))
                .collect(),
        );
        FeedSession::new(ClientConfig::default(), Silent::default(), catalog)
    }

    fn tick(ltp: f64) -> SessionEvent {
        SessionEvent::Transport {
            attempt: 1,
            event: TransportEvent::Quote(serde_json::from_value(json!({"symbol": "I1", "ltp": ltp})).unwrap()),
        }
    }

    #[tokio::test]
    async fn ticks_between_publishes_reuse_one_copy() {
        let mut session = session(5);
        session.process(SessionEvent::Command(SessionCommand::Connect));
        session.process(SessionEvent::Transport {
            attempt: 1,
            event: TransportEvent::Connected,
        });
        let held = session.view();
        assert_eq!(held.quotes.len(), 5);

        session.process(tick(1.0));
        let copied = Arc::as_ptr(&session.book.snapshot());
        assert_ne!(copied, Arc::as_ptr(&held.quotes));
        for ltp in 2..200 {
            session.process(tick(ltp as f64));
            assert_eq!(Arc::as_ptr(&session.book.snapshot()), copied);
        }
        assert_eq!(session.view().quotes["I1"].status, QuoteStatus::Pending);
        assert!(Arc::ptr_eq(&session.view().quotes, &held.quotes));

        session.process(SessionEvent::PublishDue);
        let shown = session.view();
        assert_eq!(shown.quotes["I1"].last_traded_price, 199.0);
        assert_eq!(held.quotes["I1"].status, QuoteStatus::Pending);
    }

    #[tokio::test]
    async fn quotes_before_confirmation_are_dropped() {
        let mut session = session(2);
        session.process(SessionEvent::Command(SessionCommand::Connect));
        assert_eq!(session.view().state, ConnectionState::Connecting);

        session.process(tick(10.0));
        session.process(SessionEvent::PublishDue);
        assert!(session.view().quotes.is_empty());
        assert!(session.book.is_empty());
    }
}
