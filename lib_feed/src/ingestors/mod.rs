//! # Data Ingestors Module
//!
//! The connection side of the crate. Everything that touches a socket or runs
//! the feed's event loop lives here; the pure state pieces it drives are in
//! `core`.
//!
//! ## Contained Modules:
//! - **`stock_wss`**: `StockFeedClient`, the resilient multiplexed client for
//!   the stock streaming endpoint, and the worker task behind it.
//! - **`transport`**: The `Connector` seam and the `tokio-tungstenite`
//!   implementation used in production.

/// The multiplexed stock feed client.
pub mod stock_wss;
/// Transport seam between the worker and the socket.
pub mod transport;

// --- Public API Re-exports ---
pub use stock_wss::{FeedCommand, FeedStatus, StockFeedClient};
pub use transport::{Connector, EventSink, TransportCommand, TransportHandle};

#[cfg(feature = "wss")]
pub use transport::WsConnector;
