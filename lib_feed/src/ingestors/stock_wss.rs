//! # Stock WSS Ingestor
//!
//! Resilient multiplexed WebSocket client for the stock streaming endpoint.
//! Location: lib_feed/src/ingestors/stock_wss.rs
//!
//! One [`StockFeedClient`] owns one socket and any number of stock-code
//! subscriptions on it. All state lives with a single worker task; the client
//! handle forwards commands to it over a channel and reads a lock-protected
//! view of the state for its accessors. Transport events and timers reach the
//! worker as [`Signal`]s, so every frame is processed in arrival order on one
//! path.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio::time::Instant;
use url::Url;

use crate::configs::FeedConfig;
use crate::core::availability::AvailabilityTracker;
use crate::core::dispatcher::Dispatcher;
use crate::core::errors::{describe_close_code, FeedError};
use crate::core::heartbeat::HeartbeatMonitor;
use crate::core::registry::{Delta, SubscriptionRegistry};
use crate::core::signal::{CloseInfo, Signal, TransportEvent};
use crate::core::timers::{TimerKind, Timers};
use crate::core::topic_cache::{CachedQuote, TopicCache};
use crate::core::upstream_manager::{ConnectionState, UpstreamManager};
use crate::ingestors::transport::{Connector, EventSink};
use crate::markets::stockfeed::{InboundFrame, OutboundFrame, StockQuote};

const NORMAL_CLOSURE: u16 = 1000;

/// Commands sent to the feed worker.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeedCommand {
    Connect,
    Disconnect,
    Reconnect,
    Subscribe(Vec<String>),
    Unsubscribe(Vec<String>),
    SetTopics(Vec<String>),
    Ping,
}

// Struct to wrap the command and a one-time channel for the completion signal
struct FeedRequest {
    command: FeedCommand,
    responder: oneshot::Sender<()>,
}

/// Everything the accessors can see. Written only by the worker.
#[derive(Debug)]
struct FeedState {
    connection: ConnectionState,
    registry: SubscriptionRegistry,
    cache: TopicCache,
    availability: AvailabilityTracker,
    last_error: Option<FeedError>,
    pings_sent: u64,
    last_ping_at: Option<Instant>,
}

/// A point-in-time summary of the client.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedStatus {
    pub connection: ConnectionState,
    pub producing: bool,
    pub desired: usize,
    pub acknowledged: usize,
    pub cached: usize,
    pub pings_sent: u64,
    pub last_ping_at: Option<Instant>,
    pub last_error: Option<FeedError>,
}

/// Handle to a feed client. Cheap to clone; the worker stops once the last
/// clone is dropped.
#[derive(Clone)]
pub struct StockFeedClient {
    requests: mpsc::UnboundedSender<FeedRequest>,
    state: Arc<RwLock<FeedState>>,
    dispatcher: Arc<Dispatcher>,
}

impl StockFeedClient {
    /// Creates a client over the given connector and starts its worker task.
    /// Nothing is connected until [`connect`](Self::connect) is called.
    ///
    /// # Errors
    /// `FeedError::Config` if the configuration does not validate, e.g. a zero
    /// interval or a base URL that cannot be turned into a socket URL.
    ///
    /// # Panics
    /// Panics if called outside a Tokio runtime.
    pub fn new(config: FeedConfig, connector: Arc<dyn Connector>) -> Result<Self, FeedError> {
        config.validate().map_err(|e| FeedError::Config(e.to_string()))?;
        let socket_url = config.socket_url()?;
        let state = Arc::new(RwLock::new(FeedState {
            connection: ConnectionState::Disconnected,
            registry: SubscriptionRegistry::new(),
            cache: TopicCache::new(),
            availability: AvailabilityTracker::new(config.stale_window()),
            last_error: None,
            pings_sent: 0,
            last_ping_at: None,
        }));
        let dispatcher = Arc::new(Dispatcher::new(config.update_buffer));
        let (requests_tx, requests_rx) = mpsc::unbounded_channel();
        let (signals_tx, signals_rx) = mpsc::unbounded_channel();

        let worker = FeedWorker {
            upstream: UpstreamManager::new(config.auto_reconnect),
            heartbeat: HeartbeatMonitor::new(config.heartbeat_interval()),
            timers: Timers::new(signals_tx.clone()),
            config,
            socket_url,
            connector,
            state: Arc::clone(&state),
            dispatcher: Arc::clone(&dispatcher),
            signals_tx,
        };
        tokio::spawn(worker.run(requests_rx, signals_rx));

        Ok(Self {
            requests: requests_tx,
            state,
            dispatcher,
        })
    }

    /// Creates a client over the real WebSocket transport, with the health
    /// pre-flight when the `retrieve` feature is on and a health path is set.
    #[cfg(feature = "wss")]
    pub fn with_websocket(config: FeedConfig) -> Result<Self, FeedError> {
        let connector = crate::ingestors::transport::WsConnector::new();
        #[cfg(feature = "retrieve")]
        let connector = {
            let probe = config
                .health_url()?
                .map(|url| crate::retrieve::HealthProbe::new(url, config.health_timeout()));
            connector.with_health_probe(probe)
        };
        Self::new(config, Arc::new(connector))
    }

    pub async fn connect(&self) {
        self.request(FeedCommand::Connect).await;
    }

    pub async fn disconnect(&self) {
        self.request(FeedCommand::Disconnect).await;
    }

    /// Disconnects now and connects again after the restart delay.
    pub async fn reconnect(&self) {
        self.request(FeedCommand::Reconnect).await;
    }

    pub async fn subscribe<I, S>(&self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics = topics.into_iter().map(Into::into).collect();
        self.request(FeedCommand::Subscribe(topics)).await;
    }

    pub async fn unsubscribe<I, S>(&self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics = topics.into_iter().map(Into::into).collect();
        self.request(FeedCommand::Unsubscribe(topics)).await;
    }

    /// Replaces the desired topic set; only the difference goes on the wire.
    pub async fn set_desired_topics<I, S>(&self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let topics = topics.into_iter().map(Into::into).collect();
        self.request(FeedCommand::SetTopics(topics)).await;
    }

    pub async fn ping(&self) {
        self.request(FeedCommand::Ping).await;
    }

    /// Registers a callback for changed quotes. Callbacks run on the worker
    /// task and must not block; a callback that panics is logged and skipped.
    pub fn on_update<F>(&self, observer: F)
    where
        F: Fn(&StockQuote) + Send + Sync + 'static,
    {
        self.dispatcher.add_observer(Arc::new(observer));
    }

    /// A stream of changed quotes.
    pub fn updates(&self) -> broadcast::Receiver<Arc<StockQuote>> {
        self.dispatcher.subscribe()
    }

    pub fn get_topic_data(&self, topic: &str) -> Option<CachedQuote> {
        self.read().cache.get(topic).cloned()
    }

    pub fn get_all_topic_data(&self) -> HashMap<String, CachedQuote> {
        self.read().cache.snapshot()
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.read().connection
    }

    pub fn is_connected(&self) -> bool {
        self.connection_state() == ConnectionState::Connected
    }

    pub fn is_connecting(&self) -> bool {
        self.connection_state() == ConnectionState::Connecting
    }

    /// Whether the upstream has produced data within the staleness window.
    pub fn is_producing(&self) -> bool {
        self.read().availability.is_producing()
    }

    pub fn last_data_at(&self) -> Option<Instant> {
        self.read().availability.last_data_at()
    }

    pub fn last_error(&self) -> Option<FeedError> {
        self.read().last_error.clone()
    }

    pub fn desired_topics(&self) -> BTreeSet<String> {
        self.read().registry.desired().clone()
    }

    pub fn acknowledged_topics(&self) -> BTreeSet<String> {
        self.read().registry.acknowledged().clone()
    }

    pub fn status(&self) -> FeedStatus {
        let state = self.read();
        FeedStatus {
            connection: state.connection,
            producing: state.availability.is_producing(),
            desired: state.registry.desired().len(),
            acknowledged: state.registry.acknowledged().len(),
            cached: state.cache.len(),
            pings_sent: state.pings_sent,
            last_ping_at: state.last_ping_at,
            last_error: state.last_error.clone(),
        }
    }

    async fn request(&self, command: FeedCommand) {
        let (tx, rx) = oneshot::channel();
        let request = FeedRequest { command, responder: tx };
        if let Err(e) = self.requests.send(request) {
            log::warn!("Feed worker is gone; dropping {:?}", e.0.command);
            return;
        }
        // Wait until the worker has applied the command.
        let _ = rx.await;
    }

    fn read(&self) -> RwLockReadGuard<'_, FeedState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }
}

impl std::fmt::Debug for StockFeedClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StockFeedClient").field("status", &self.status()).finish()
    }
}

struct FeedWorker {
    config: FeedConfig,
    socket_url: Url,
    connector: Arc<dyn Connector>,
    state: Arc<RwLock<FeedState>>,
    dispatcher: Arc<Dispatcher>,
    upstream: UpstreamManager,
    heartbeat: HeartbeatMonitor,
    timers: Timers,
    signals_tx: mpsc::UnboundedSender<Signal>,
}

impl FeedWorker {
    async fn run(
        mut self,
        mut requests: mpsc::UnboundedReceiver<FeedRequest>,
        mut signals: mpsc::UnboundedReceiver<Signal>,
    ) {
        log::debug!("Feed worker started for {}", self.socket_url);
        loop {
            tokio::select! {
                biased;
                Some(signal) = signals.recv() => self.handle_signal(signal),
                request = requests.recv() => match request {
                    Some(FeedRequest { command, responder }) => {
                        self.handle_command(command);
                        let _ = responder.send(());
                    }
                    None => break,
                },
            }
        }
        self.shutdown();
        log::debug!("Feed worker stopped for {}", self.socket_url);
    }

    fn handle_command(&mut self, command: FeedCommand) {
        log::trace!("Feed command: {:?}", command);
        match command {
            FeedCommand::Connect => self.connect(),
            FeedCommand::Disconnect => self.disconnect(),
            FeedCommand::Reconnect => {
                self.disconnect();
                self.timers.arm(TimerKind::Restart, self.config.restart_delay());
                log::info!("Reconnecting in {}ms", self.config.restart_delay_ms);
            }
            FeedCommand::Subscribe(topics) => {
                let live = self.upstream.is_session_live();
                let to_add = self.write().registry.request_subscribe(topics, live);
                self.send_delta(Delta { to_add, to_remove: Vec::new() });
            }
            FeedCommand::Unsubscribe(topics) => {
                let live = self.upstream.is_session_live();
                let to_remove = self.write().registry.request_unsubscribe(topics, live);
                self.send_delta(Delta { to_add: Vec::new(), to_remove });
            }
            FeedCommand::SetTopics(topics) => {
                let live = self.upstream.is_session_live();
                let delta = self.write().registry.set_desired(topics, live);
                self.send_delta(delta);
            }
            FeedCommand::Ping => {
                if self.read().connection == ConnectionState::Connected {
                    let frame = self.heartbeat.ping(Instant::now());
                    self.send_ping(&frame);
                } else {
                    log::debug!("Ping skipped: not connected");
                }
            }
        }
    }

    fn handle_signal(&mut self, signal: Signal) {
        match signal {
            Signal::Transport { generation, event } => {
                if !self.upstream.is_current(generation) {
                    log::trace!("Ignoring {:?} from superseded connection {}", event, generation);
                    return;
                }
                match event {
                    TransportEvent::Opened => self.on_open(),
                    TransportEvent::Text(text) => self.route_frame(&text),
                    TransportEvent::Error(message) => {
                        log::warn!("Transport error: {}", message);
                        // The close that follows decides about reconnecting.
                        self.write().last_error = Some(FeedError::Transport(message));
                    }
                    TransportEvent::Closed(info) => self.on_close(info),
                }
            }
            Signal::Timer { kind, token } => {
                if self.timers.claim(kind, token) {
                    self.on_timer(kind);
                }
            }
        }
    }

    fn connect(&mut self) {
        let current = self.read().connection;
        if !current.can_connect() {
            log::debug!("Connect ignored: already {:?}", current);
            return;
        }
        self.timers.cancel(TimerKind::Reconnect);
        self.timers.cancel(TimerKind::Restart);

        let generation = self.upstream.begin_attempt();
        let sink = EventSink::new(generation, self.signals_tx.clone());
        let link = self.connector.open(&self.socket_url, sink);
        self.upstream.attach(link);
        self.write().connection = ConnectionState::Connecting;
        self.timers.arm(TimerKind::ConnectTimeout, self.config.connect_timeout());
        log::info!("Connecting to {} (attempt {})", self.socket_url, self.upstream.attempts());
    }

    fn disconnect(&mut self) {
        self.upstream.mark_manual_disconnect();
        self.timers.cancel_all();
        self.heartbeat.stop();
        let had_link = match self.upstream.detach() {
            Some(link) => {
                link.close(NORMAL_CLOSURE, "client disconnect");
                true
            }
            None => false,
        };

        let mut state = self.write();
        state.connection = ConnectionState::Disconnected;
        state.registry.reset_session();
        state.cache.clear();
        state.availability.reset();
        if had_link {
            state.last_error = Some(FeedError::CleanClosure);
        }
        drop(state);
        log::info!("Disconnected from {}", self.socket_url);
    }

    fn on_open(&mut self) {
        self.timers.cancel(TimerKind::ConnectTimeout);
        {
            let mut state = self.write();
            state.connection = ConnectionState::Connected;
            state.last_error = None;
        }
        self.heartbeat.start();
        self.timers.arm(TimerKind::Heartbeat, self.heartbeat.interval());
        // The server's handshake normally lands inside this delay and pushes
        // the replay back behind it; without one the replay still goes out.
        self.timers.arm(TimerKind::Resubscribe, self.config.resubscribe_delay());
        log::info!("Connected to {}", self.socket_url);
    }

    fn on_close(&mut self, info: CloseInfo) {
        let retry = self.upstream.should_retry(&info);
        let manual = self.upstream.is_manual_disconnect();
        self.upstream.detach();
        self.stop_session_timers();

        let error = if info.was_clean && manual {
            FeedError::CleanClosure
        } else if info.was_clean {
            FeedError::RemoteClosure { code: info.code, reason: close_reason(&info) }
        } else {
            FeedError::AbnormalClosure { code: info.code, reason: close_reason(&info) }
        };
        log::warn!("Connection closed: {}", error);
        let retryable = error.is_retryable();

        {
            let mut state = self.write();
            state.connection = ConnectionState::Disconnected;
            state.registry.reset_session();
            state.last_error = Some(error);
        }

        if retry {
            self.schedule_reconnect();
        } else if retryable {
            log::info!("Auto-reconnect is off; staying disconnected");
        }
    }

    fn on_timer(&mut self, kind: TimerKind) {
        match kind {
            TimerKind::ConnectTimeout => {
                if self.read().connection != ConnectionState::Connecting {
                    return;
                }
                let timeout = self.config.connect_timeout();
                log::warn!("Connect to {} timed out after {}ms", self.socket_url, timeout.as_millis());
                if let Some(link) = self.upstream.detach() {
                    link.close(NORMAL_CLOSURE, "connect timeout");
                }
                self.stop_session_timers();
                {
                    let mut state = self.write();
                    state.connection = ConnectionState::Disconnected;
                    state.registry.reset_session();
                    state.last_error = Some(FeedError::ConnectTimeout(timeout));
                }
                if self.upstream.may_auto_connect() {
                    self.schedule_reconnect();
                } else {
                    log::info!("Auto-reconnect is off; staying disconnected");
                }
            }
            TimerKind::Reconnect => {
                if self.upstream.may_auto_connect() {
                    self.connect();
                }
            }
            TimerKind::Restart => self.connect(),
            TimerKind::Heartbeat => {
                if let Some(frame) = self.heartbeat.tick(Instant::now()) {
                    self.send_ping(&frame);
                    self.timers.arm(TimerKind::Heartbeat, self.heartbeat.interval());
                }
            }
            TimerKind::Staleness => {
                let now = Instant::now();
                let (flipped, remaining) = {
                    let mut state = self.write();
                    let flipped = state.availability.expire(now);
                    let remaining = state.availability.is_producing().then(|| state.availability.remaining(now));
                    (flipped, remaining)
                };
                if flipped {
                    log::warn!(
                        "No data for {}ms; upstream marked as not producing",
                        self.config.stale_window_ms
                    );
                } else if let Some(remaining) = remaining {
                    self.timers.arm(TimerKind::Staleness, remaining);
                }
            }
            TimerKind::Resubscribe => {
                if self.read().connection != ConnectionState::Connected {
                    return;
                }
                let replay = self.write().registry.replay();
                self.upstream.set_session_live(true);
                match replay {
                    Some(codes) => {
                        log::info!("Resubscribing to {} topic(s)", codes.len());
                        self.send_frame(&OutboundFrame::Subscribe { stock_codes: codes });
                    }
                    None => log::debug!("Session live with no topics to resubscribe"),
                }
            }
        }
    }

    /// Decodes one inbound frame and applies it.
    fn route_frame(&mut self, text: &str) {
        let frame = match InboundFrame::decode(text) {
            Ok(frame) => frame,
            Err(e) => {
                log::warn!("Dropping frame: {} ({})", e, excerpt(text));
                self.write().last_error = Some(e);
                return;
            }
        };
        log::trace!("Inbound {}", frame.kind());

        match frame {
            InboundFrame::ConnectionEstablished { message, .. } => {
                log::info!("Session established: {}", message.as_deref().unwrap_or("-"));
                if self.read().connection != ConnectionState::Connected {
                    return;
                }
                if self.upstream.is_session_live() {
                    // Replay already sent on this connection.
                    log::debug!("Late session handshake; subscriptions already replayed");
                } else {
                    self.timers.arm(TimerKind::Resubscribe, self.config.resubscribe_delay());
                }
            }
            InboundFrame::Subscribed(codes) => {
                log::debug!("Server confirmed subscription to {:?}", codes);
                self.write().registry.on_subscribed(codes);
                self.reconcile_if_live();
            }
            InboundFrame::Unsubscribed(codes) => {
                log::debug!("Server confirmed unsubscription from {:?}", codes);
                self.write().registry.on_unsubscribed(codes);
                self.reconcile_if_live();
            }
            InboundFrame::StockUpdate(quote) => {
                let now = Instant::now();
                let (update, resumed) = {
                    let mut state = self.write();
                    let resumed = state.availability.record_activity(now);
                    (state.cache.apply(quote.clone(), now), resumed)
                };
                self.after_activity(resumed);
                if update.is_change() {
                    self.dispatcher.notify(quote);
                } else {
                    log::trace!("Unchanged quote for {} suppressed", quote.stock_code);
                }
            }
            InboundFrame::Pong => {
                let resumed = self.write().availability.record_activity(Instant::now());
                self.after_activity(resumed);
            }
            InboundFrame::Error(message) => {
                log::warn!("Server error: {}", message);
                self.write().last_error = Some(FeedError::Server(message));
            }
            InboundFrame::Unknown(kind) => {
                log::debug!("Ignoring frame of unknown type {}", kind);
            }
        }
    }

    fn after_activity(&mut self, resumed: bool) {
        if resumed {
            log::info!("Upstream is producing data");
        }
        self.timers.arm(TimerKind::Staleness, self.config.stale_window());
    }

    fn reconcile_if_live(&mut self) {
        if self.upstream.is_session_live() {
            let delta = self.write().registry.reconcile();
            self.send_delta(delta);
        }
    }

    fn send_delta(&mut self, delta: Delta) {
        if !delta.to_remove.is_empty() {
            self.send_frame(&OutboundFrame::Unsubscribe { stock_codes: delta.to_remove });
        }
        if !delta.to_add.is_empty() {
            self.send_frame(&OutboundFrame::Subscribe { stock_codes: delta.to_add });
        }
    }

    fn send_frame(&mut self, frame: &OutboundFrame) {
        let text = match frame.encode() {
            Ok(text) => text,
            Err(e) => {
                log::error!("{}", e);
                self.write().last_error = Some(e);
                return;
            }
        };
        let sent = self.upstream.link().is_some_and(|link| link.send_text(text));
        if sent {
            log::debug!("Sent {}", frame.kind());
        } else {
            log::warn!("Cannot send {}: no open transport", frame.kind());
        }
    }

    fn send_ping(&mut self, frame: &OutboundFrame) {
        self.send_frame(frame);
        let mut state = self.write();
        state.pings_sent = self.heartbeat.pings_sent();
        state.last_ping_at = self.heartbeat.last_ping_at();
    }

    fn schedule_reconnect(&mut self) {
        let delay = self.config.reconnect_delay();
        self.timers.arm(TimerKind::Reconnect, delay);
        log::info!("Reconnecting in {}ms", delay.as_millis());
    }

    fn stop_session_timers(&mut self) {
        self.heartbeat.stop();
        for kind in [TimerKind::ConnectTimeout, TimerKind::Heartbeat, TimerKind::Resubscribe] {
            self.timers.cancel(kind);
        }
    }

    fn shutdown(&mut self) {
        self.timers.cancel_all();
        if let Some(link) = self.upstream.detach() {
            link.close(NORMAL_CLOSURE, "client dropped");
        }
    }

    fn read(&self) -> RwLockReadGuard<'_, FeedState> {
        self.state.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, FeedState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }
}

fn close_reason(info: &CloseInfo) -> String {
    let described = describe_close_code(info.code);
    if info.reason.is_empty() {
        described.to_string()
    } else {
        format!("{}: {}", described, info.reason)
    }
}

fn excerpt(text: &str) -> String {
    const MAX: usize = 120;
    match text.char_indices().nth(MAX) {
        Some((cut, _)) => format!("{}...", &text[..cut]),
        None => text.to_string(),
    }
}
