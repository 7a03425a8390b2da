//! # Scripted Feed Harness
//!
//! A `Connector` that opens nothing. Every `open` call is recorded as a
//! [`ScriptedLink`] the test can take and drive by hand: report the socket as
//! open, push server frames, close it cleanly or abnormally, and read back the
//! frames the client sent. Combined with Tokio's paused clock this makes the
//! client's timers (connect timeout, reconnect delay, heartbeat, staleness)
//! fully deterministic.

use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use serde_json::{json, Value};
use tokio::sync::mpsc;
use url::Url;

use lib_feed::core::signal::{CloseInfo, TransportEvent};
use lib_feed::ingestors::{Connector, EventSink, TransportCommand, TransportHandle};
use lib_feed::FeedConfig;

/// One transport opened by the client under test.
#[derive(Debug)]
pub struct ScriptedLink {
    url: Url,
    sink: EventSink,
    commands: mpsc::UnboundedReceiver<TransportCommand>,
}

impl ScriptedLink {
    pub fn url(&self) -> &Url {
        &self.url
    }

    pub fn generation(&self) -> u64 {
        self.sink.generation()
    }

    /// Reports the socket as open.
    pub fn open(&self) {
        self.sink.emit(TransportEvent::Opened);
    }

    /// Sends the server's session handshake.
    pub fn handshake(&self) {
        self.frame(json!({
            "type": "CONNECTION_ESTABLISHED",
            "message": "connected",
            "timestamp": 1_700_000_000_000u64
        }));
    }

    pub fn text(&self, text: impl Into<String>) {
        self.sink.emit(TransportEvent::Text(text.into()));
    }

    pub fn frame(&self, frame: Value) {
        self.text(frame.to_string());
    }

    pub fn subscribed(&self, codes: &[&str]) {
        self.frame(json!({ "type": "SUBSCRIBED", "data": { "stockCodes": codes } }));
    }

    pub fn unsubscribed(&self, codes: &[&str]) {
        self.frame(json!({ "type": "UNSUBSCRIBED", "data": { "stockCodes": codes } }));
    }

    pub fn quote(&self, code: &str, price: f64, change: f64, rate: f64) {
        self.frame(json!({
            "type": "STOCK_UPDATE",
            "data": { "stockData": {
                "stockCode": code,
                "stockName": format!("Stock {code}"),
                "currentPrice": price,
                "changePrice": change,
                "changeRate": rate,
                "volume": 1000
            } }
        }));
    }

    pub fn pong(&self) {
        self.frame(json!({ "type": "PONG" }));
    }

    pub fn error(&self, message: impl Into<String>) {
        self.sink.emit(TransportEvent::Error(message.into()));
    }

    pub fn close_clean(&self, code: u16, reason: &str) {
        self.sink.emit(TransportEvent::Closed(CloseInfo::clean(code, reason)));
    }

    pub fn close_abnormal(&self, reason: &str) {
        self.sink.emit(TransportEvent::Closed(CloseInfo::abnormal(reason)));
    }

    /// Everything the client has sent so far, oldest first.
    pub fn drain(&mut self) -> Vec<TransportCommand> {
        let mut commands = Vec::new();
        while let Ok(command) = self.commands.try_recv() {
            commands.push(command);
        }
        commands
    }

    /// The text frames the client has sent so far, parsed.
    pub fn sent_frames(&mut self) -> Vec<Value> {
        self.drain()
            .into_iter()
            .filter_map(|command| match command {
                TransportCommand::Send(text) => serde_json::from_str(&text).ok(),
                TransportCommand::Close { .. } => None,
            })
            .collect()
    }
}

/// Records every `open` call instead of touching the network.
#[derive(Debug, Clone, Default)]
pub struct ScriptedConnector {
    links: Arc<Mutex<VecDeque<ScriptedLink>>>,
    opened: Arc<AtomicUsize>,
}

impl ScriptedConnector {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn open_count(&self) -> usize {
        self.opened.load(Ordering::SeqCst)
    }

    /// The oldest link not yet taken.
    pub fn take_link(&self) -> Option<ScriptedLink> {
        self.links.lock().unwrap_or_else(PoisonError::into_inner).pop_front()
    }
}

impl Connector for ScriptedConnector {
    fn open(&self, url: &Url, sink: EventSink) -> TransportHandle {
        let (handle, commands) = TransportHandle::channel();
        self.opened.fetch_add(1, Ordering::SeqCst);
        self.links
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push_back(ScriptedLink { url: url.clone(), sink, commands });
        handle
    }
}

/// Defaults with the health probe off.
pub fn test_config() -> FeedConfig {
    FeedConfig {
        health_path: None,
        ..FeedConfig::default()
    }
}

/// Lets the worker drain its queues. Under a paused clock the sleep only
/// completes once every other task is idle.
pub async fn settle() {
    tokio::time::sleep(Duration::from_millis(1)).await;
}

/// Frames of one `type`, in the order they were sent.
pub fn frames_of<'a>(frames: &'a [Value], kind: &str) -> Vec<&'a Value> {
    frames.iter().filter(|frame| frame["type"] == kind).collect()
}

/// The `stockCodes` of a SUBSCRIBE/UNSUBSCRIBE frame.
pub fn codes_of(frame: &Value) -> Vec<String> {
    frame["stockCodes"]
        .as_array()
        .map(|codes| codes.iter().filter_map(|c| c.as_str().map(str::to_string)).collect())
        .unwrap_or_default()
}
