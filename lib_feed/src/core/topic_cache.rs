//! # Topic Cache
//!
//! Latest quote per stock code. Entries survive reconnects and availability
//! flips so the last known value stays on display; only an explicit
//! disconnect clears the cache.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use tokio::time::Instant;

use crate::markets::stockfeed::StockQuote;

/// A cached quote and when it was stored.
#[derive(Debug, Clone, PartialEq)]
pub struct CachedQuote {
    pub quote: StockQuote,
    /// Monotonic receipt time; drives staleness comparisons.
    pub received_at: Instant,
    /// Wall-clock receipt time for display.
    pub received_utc: DateTime<Utc>,
}

/// Outcome of offering a quote to the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CacheUpdate {
    Inserted,
    Changed,
    /// Same price point as the cached value; nothing was written.
    Unchanged,
}

impl CacheUpdate {
    pub fn is_change(self) -> bool {
        !matches!(self, CacheUpdate::Unchanged)
    }
}

#[derive(Debug, Clone, Default)]
pub struct TopicCache {
    entries: HashMap<String, CachedQuote>,
}

impl TopicCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply(&mut self, quote: StockQuote, now: Instant) -> CacheUpdate {
        let outcome = match self.entries.get(&quote.stock_code) {
            Some(cached) if cached.quote.same_price_point(&quote) => return CacheUpdate::Unchanged,
            Some(_) => CacheUpdate::Changed,
            None => CacheUpdate::Inserted,
        };
        self.entries.insert(
            quote.stock_code.clone(),
            CachedQuote {
                quote,
                received_at: now,
                received_utc: Utc::now(),
            },
        );
        outcome
    }

    pub fn get(&self, topic: &str) -> Option<&CachedQuote> {
        self.entries.get(topic)
    }

    pub fn snapshot(&self) -> HashMap<String, CachedQuote> {
        self.entries.clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
