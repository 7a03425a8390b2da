//! # Configuration Modules
//!
//! This module holds the settings of the feed client and the helpers that turn
//! them into endpoints and durations.

// // Statements: Exporting sub-modules to make them accessible via lib_feed::configs
/// Feed client settings, JSON loading and endpoint derivation.
pub mod config_feed;

pub use config_feed::{ConfigError, FeedConfig};
