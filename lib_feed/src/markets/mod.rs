//! # Financial Market Feeds Module
//!
//! This module groups the protocol definitions of the market data providers the
//! client talks to. It keeps provider-specific wire formats away from the
//! connection machinery in `core` and `ingestors`.
//!
//! ## Contained Modules:
//!
//! - **`stockfeed`**: The JSON frame protocol of the stock streaming endpoint
//!   (subscribe/unsubscribe requests, acknowledgments, quote updates, ping/pong).

/// Frame definitions for the stock streaming endpoint.
pub mod stockfeed;
