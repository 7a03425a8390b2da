//! # Stock Feed Protocol
//!
//! Wire-level definitions for the stock streaming endpoint. The connection and
//! subscription logic lives in `core` and `ingestors`; this module only knows
//! how a frame looks on the wire.
//!
//! ## Contained Modules:
//!
//! - **`frames`**: Typed inbound/outbound frames, the `StockQuote` payload and
//!   the JSON codec that converts between them and text frames.

/// JSON frame codec for the stock streaming protocol.
pub mod frames;

pub use frames::{InboundFrame, OutboundFrame, StockQuote};
