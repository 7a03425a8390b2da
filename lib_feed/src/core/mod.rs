//! # Core Engine Module
//!
//! The state pieces the feed worker is assembled from. Each one is a plain,
//! synchronous struct owned by the worker task; none of them does I/O or
//! locking of its own, which keeps every transition unit-testable.
//!
//! ## Core Components:
//!
//! - **`upstream_manager`**: The connection state machine, transport handle,
//!   generation counter and retry decision.
//!
//! - **`registry`**: Desired vs. server-acknowledged subscriptions and the
//!   minimal subscribe/unsubscribe deltas between them.
//!
//! - **`availability`**: Infers whether the upstream is still producing from
//!   the time since the last data frame.
//!
//! - **`heartbeat`**: Periodic `PING` frames while connected.
//!
//! - **`topic_cache`**: Latest quote per stock code with receipt timestamps.
//!
//! - **`dispatcher`**: Fan-out of changed quotes to observers and a broadcast
//!   stream.
//!
//! - **`timers`**: Cancel-then-schedule timer slots, one per timer kind.
//!
//! - **`signal`** and **`errors`**: The worker's inbound signal types and the
//!   error taxonomy recorded on `last_error`.

/// Fan-out of changed quotes to observers and the broadcast stream.
pub mod dispatcher;
/// Error taxonomy and close-code descriptions.
pub mod errors;
/// Staleness-window inference of upstream liveness.
pub mod availability;
/// Periodic liveness probes.
pub mod heartbeat;
/// Desired vs. acknowledged subscription tracking.
pub mod registry;
/// Transport events and timer signals consumed by the worker.
pub mod signal;
/// Cancel-then-schedule timer slots.
pub mod timers;
/// Latest quote per topic.
pub mod topic_cache;
/// Connection state machine and generation bookkeeping.
pub mod upstream_manager;

// --- Public API Re-exports ---
pub use availability::AvailabilityTracker;
pub use dispatcher::{Dispatcher, UpdateObserver};
pub use errors::{describe_close_code, FeedError};
pub use heartbeat::HeartbeatMonitor;
pub use registry::{Delta, SubscriptionRegistry};
pub use signal::{CloseInfo, Signal, TransportEvent};
pub use timers::{TimerKind, Timers};
pub use topic_cache::{CacheUpdate, CachedQuote, TopicCache};
pub use upstream_manager::{ConnectionState, UpstreamManager};
