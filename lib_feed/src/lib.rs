//! # lib_feed
//!
//! A client library for a push-based stock quote server. One WebSocket
//! carries any number of stock-code subscriptions; the client keeps them
//! alive across reconnects, caches the latest quote per code, tells
//! observers only about quotes that actually changed, and infers from the
//! data flow whether the upstream is still producing.
//!
//! ```no_run
//! use lib_feed::{FeedConfig, StockFeedClient};
//!
//! # async fn demo() -> Result<(), lib_feed::FeedError> {
//! let client = StockFeedClient::with_websocket(FeedConfig::default())?;
//! client.on_update(|quote| println!("{} {}", quote.stock_code, quote.current_price));
//! client.subscribe(["005930", "000660"]).await;
//! client.connect().await;
//! # Ok(())
//! # }
//! ```

#![forbid(unsafe_code)]

pub mod configs;
pub mod core;
pub mod ingestors;
pub mod markets;
#[cfg(feature = "retrieve")]
pub mod retrieve;

pub use crate::configs::{ConfigError, FeedConfig};
pub use crate::core::{CachedQuote, ConnectionState, FeedError};
pub use crate::ingestors::{FeedStatus, StockFeedClient};
pub use crate::markets::stockfeed::{InboundFrame, OutboundFrame, StockQuote};
