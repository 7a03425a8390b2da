//! # Heartbeat Monitor
//!
//! Keeps intermediaries from idling the socket out by sending a `PING` frame
//! on a fixed interval while connected. It never disconnects on a missing
//! `PONG`; liveness is the availability tracker's call.

use std::time::Duration;

use tokio::time::Instant;

use crate::markets::stockfeed::OutboundFrame;

#[derive(Debug, Clone)]
pub struct HeartbeatMonitor {
    interval: Duration,
    running: bool,
    pings_sent: u64,
    last_ping_at: Option<Instant>,
}

impl HeartbeatMonitor {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            running: false,
            pings_sent: 0,
            last_ping_at: None,
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn pings_sent(&self) -> u64 {
        self.pings_sent
    }

    pub fn last_ping_at(&self) -> Option<Instant> {
        self.last_ping_at
    }

    pub fn start(&mut self) {
        self.running = true;
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    /// A heartbeat tick. Returns the frame to send, or `None` once stopped.
    pub fn tick(&mut self, now: Instant) -> Option<OutboundFrame> {
        if !self.running {
            return None;
        }
        Some(self.ping(now))
    }

    /// An explicit ping, counted like a scheduled one.
    pub fn ping(&mut self, now: Instant) -> OutboundFrame {
        self.pings_sent += 1;
        self.last_ping_at = Some(now);
        OutboundFrame::Ping
    }
}
