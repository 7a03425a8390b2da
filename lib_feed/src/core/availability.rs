//! # Availability Tracker
//!
//! Answers "is the upstream still producing?" from the cadence of inbound
//! data, independently of whether the socket is open. A connected socket over
//! a closed market stays `Connected` but goes non-producing once the staleness
//! window passes without data.
//!
//! The tracker itself is clock-agnostic: callers pass `now`. The worker feeds
//! it `tokio::time::Instant`, so paused-time tests drive it deterministically.

use std::time::Duration;

use tokio::time::Instant;

#[derive(Debug, Clone)]
pub struct AvailabilityTracker {
    stale_window: Duration,
    producing: bool,
    last_data_at: Option<Instant>,
}

impl AvailabilityTracker {
    pub fn new(stale_window: Duration) -> Self {
        Self {
            stale_window,
            producing: false,
            last_data_at: None,
        }
    }

    pub fn stale_window(&self) -> Duration {
        self.stale_window
    }

    pub fn is_producing(&self) -> bool {
        self.producing
    }

    pub fn last_data_at(&self) -> Option<Instant> {
        self.last_data_at
    }

    /// Records a data or pong frame. Returns `true` when this flipped the feed
    /// back to producing.
    pub fn record_activity(&mut self, now: Instant) -> bool {
        let flipped = !self.producing;
        self.producing = true;
        self.last_data_at = Some(now);
        flipped
    }

    /// Called when the staleness timer fires. Only goes quiet if a full window
    /// really elapsed since the last frame. Returns `true` on a flip to false.
    pub fn expire(&mut self, now: Instant) -> bool {
        if !self.producing {
            return false;
        }
        let elapsed = self
            .last_data_at
            .map_or(self.stale_window, |last| now.saturating_duration_since(last));
        if elapsed < self.stale_window {
            return false;
        }
        self.producing = false;
        true
    }

    /// Time left until the window lapses, for re-arming after an early fire.
    pub fn remaining(&self, now: Instant) -> Duration {
        match self.last_data_at {
            Some(last) => self.stale_window.saturating_sub(now.saturating_duration_since(last)),
            None => Duration::ZERO,
        }
    }

    pub fn reset(&mut self) {
        self.producing = false;
        self.last_data_at = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn starts_not_producing() {
        let tracker = AvailabilityTracker::new(Duration::from_secs(30));
        assert!(!tracker.is_producing());
        assert!(tracker.last_data_at().is_none());
    }

    #[test]
    fn flips_only_after_full_window() {
        let start = Instant::now();
        let mut tracker = AvailabilityTracker::new(Duration::from_secs(30));
        assert!(tracker.record_activity(start));
        assert!(!tracker.record_activity(start + Duration::from_secs(5)));

        assert!(!tracker.expire(start + Duration::from_secs(30)));
        assert_eq!(tracker.remaining(start + Duration::from_secs(30)), Duration::from_secs(5));
        assert!(tracker.is_producing());

        assert!(tracker.expire(start + Duration::from_secs(36)));
        assert!(!tracker.is_producing());
        assert!(!tracker.expire(start + Duration::from_secs(90)));
    }

    #[test]
    fn any_frame_restores_producing() {
        let start = Instant::now();
        let mut tracker = AvailabilityTracker::new(Duration::from_secs(30));
        tracker.record_activity(start);
        tracker.expire(start + Duration::from_secs(31));
        assert!(tracker.record_activity(start + Duration::from_secs(120)));
        assert!(tracker.is_producing());
    }
}
