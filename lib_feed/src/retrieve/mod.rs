//! # Data Retrieval Module
//!
//! Plain HTTP helpers used around the socket. The feed itself is push-based;
//! the only request/response traffic is the optional health pre-flight.
//!
//! ## Contained Modules:
//!
//! - **`ky_http`**: `HealthProbe`, a `reqwest` + `reqwest-middleware` client
//!   with a short retry policy that checks the feed server's health endpoint
//!   before each connection attempt without ever blocking it.

/// Best-effort HTTP health probe with retry middleware.
pub mod ky_http;

pub use ky_http::HealthProbe;
