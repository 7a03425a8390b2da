//! # Upstream Manager
//!
//! Connection bookkeeping for the feed worker: the state machine
//! (Disconnected → Connecting → Connected → Disconnected), the handle of the
//! one live transport, the generation counter that tells current transport
//! events from stale ones, and the manual-disconnect flag that decides
//! whether a close is retried.

use crate::core::signal::CloseInfo;
use crate::ingestors::transport::TransportHandle;

/// Transport-level connection state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConnectionState {
    #[default]
    Disconnected,
    Connecting,
    Connected,
}

impl ConnectionState {
    /// `connect` is a no-op unless we are fully disconnected.
    pub fn can_connect(self) -> bool {
        self == ConnectionState::Disconnected
    }
}

#[derive(Debug)]
pub struct UpstreamManager {
    generation: u64,
    link: Option<TransportHandle>,
    manual_disconnect: bool,
    auto_reconnect: bool,
    // Connected and the post-handshake replay has gone out.
    session_live: bool,
    attempts: u64,
}

impl UpstreamManager {
    pub fn new(auto_reconnect: bool) -> Self {
        Self {
            generation: 0,
            link: None,
            manual_disconnect: false,
            auto_reconnect,
            session_live: false,
            attempts: 0,
        }
    }

    pub fn attempts(&self) -> u64 {
        self.attempts
    }

    pub fn is_current(&self, generation: u64) -> bool {
        self.link.is_some() && generation == self.generation
    }

    pub fn is_manual_disconnect(&self) -> bool {
        self.manual_disconnect
    }

    pub fn is_session_live(&self) -> bool {
        self.session_live
    }

    pub fn set_session_live(&mut self, live: bool) {
        self.session_live = live;
    }

    /// Starts a new attempt and returns its generation. Clears the manual flag.
    pub fn begin_attempt(&mut self) -> u64 {
        self.manual_disconnect = false;
        self.session_live = false;
        self.attempts += 1;
        self.generation += 1;
        self.generation
    }

    pub fn attach(&mut self, link: TransportHandle) {
        self.link = Some(link);
    }

    pub fn link(&self) -> Option<&TransportHandle> {
        self.link.as_ref()
    }

    /// Drops the current transport and bumps the generation so anything it
    /// still emits is ignored.
    pub fn detach(&mut self) -> Option<TransportHandle> {
        self.generation += 1;
        self.session_live = false;
        self.link.take()
    }

    pub fn mark_manual_disconnect(&mut self) {
        self.manual_disconnect = true;
    }

    /// Whether a close should be followed by a scheduled reconnect.
    pub fn should_retry(&self, close: &CloseInfo) -> bool {
        if !self.auto_reconnect {
            return false;
        }
        !(close.was_clean && self.manual_disconnect)
    }

    /// Whether a fired reconnect timer may still act.
    pub fn may_auto_connect(&self) -> bool {
        self.auto_reconnect && !self.manual_disconnect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_disconnected_can_connect() {
        assert!(ConnectionState::Disconnected.can_connect());
        assert!(!ConnectionState::Connecting.can_connect());
        assert!(!ConnectionState::Connected.can_connect());
    }

    #[test]
    fn detach_invalidates_generation() {
        let mut manager = UpstreamManager::new(true);
        let generation = manager.begin_attempt();
        let (handle, _commands) = TransportHandle::channel();
        manager.attach(handle);
        assert!(manager.is_current(generation));

        assert!(manager.detach().is_some());
        assert!(!manager.is_current(generation));
        assert!(manager.detach().is_none());
    }

    #[test]
    fn clean_manual_close_is_not_retried() {
        let mut manager = UpstreamManager::new(true);
        manager.begin_attempt();
        assert!(manager.should_retry(&CloseInfo::abnormal("reset")));
        assert!(manager.should_retry(&CloseInfo::clean(1001, "going away")));

        manager.mark_manual_disconnect();
        assert!(!manager.should_retry(&CloseInfo::clean(1000, "bye")));
        assert!(manager.should_retry(&CloseInfo::abnormal("reset")));
        assert!(!manager.may_auto_connect());

        manager.begin_attempt();
        assert!(manager.may_auto_connect());
    }

    #[test]
    fn auto_reconnect_off_never_retries() {
        let manager = UpstreamManager::new(false);
        assert!(!manager.should_retry(&CloseInfo::abnormal("reset")));
        assert!(!manager.may_auto_connect());
    }
}
