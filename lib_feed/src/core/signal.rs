//! # Worker Signals
//!
//! Everything that reaches the feed worker from below: transport events
//! tagged with the generation of the connection that produced them, and
//! fired timers tagged with the token they were armed with.

use crate::core::timers::TimerKind;

/// Close details reported by a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseInfo {
    pub code: u16,
    pub reason: String,
    /// Both sides completed the closing handshake.
    pub was_clean: bool,
}

impl CloseInfo {
    pub fn clean(code: u16, reason: impl Into<String>) -> Self {
        Self { code, reason: reason.into(), was_clean: true }
    }

    pub fn abnormal(reason: impl Into<String>) -> Self {
        Self { code: 1006, reason: reason.into(), was_clean: false }
    }
}

/// The callback surface of a transport, as events.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Opened,
    Text(String),
    Error(String),
    Closed(CloseInfo),
}

#[derive(Debug)]
pub enum Signal {
    Transport { generation: u64, event: TransportEvent },
    Timer { kind: TimerKind, token: u64 },
}
