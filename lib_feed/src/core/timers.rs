//! # Timer Slots
//!
//! One slot per timer kind. Arming a slot cancels whatever was armed there
//! before, so there is never more than one reconnect, heartbeat or staleness
//! timer outstanding. A fired timer posts `Signal::Timer` back to the worker
//! with the token it was armed with; the worker accepts it only if that token
//! is still the current one for the slot.

use std::collections::HashMap;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;

use crate::core::signal::Signal;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TimerKind {
    ConnectTimeout,
    Reconnect,
    /// The delayed `connect` behind a consumer-requested `reconnect`.
    Restart,
    Heartbeat,
    Staleness,
    Resubscribe,
}

struct Armed {
    token: u64,
    cancel: CancellationToken,
}

pub struct Timers {
    signals: mpsc::UnboundedSender<Signal>,
    armed: HashMap<TimerKind, Armed>,
    next_token: u64,
}

impl Timers {
    pub fn new(signals: mpsc::UnboundedSender<Signal>) -> Self {
        Self {
            signals,
            armed: HashMap::new(),
            next_token: 0,
        }
    }

    /// Cancels any timer of this kind, then schedules a new one.
    pub fn arm(&mut self, kind: TimerKind, delay: Duration) -> u64 {
        self.cancel(kind);
        self.next_token += 1;
        let token = self.next_token;
        let cancel = CancellationToken::new();
        let child = cancel.clone();
        let signals = self.signals.clone();

        tokio::spawn(async move {
            tokio::select! {
                _ = child.cancelled() => {
                    log::trace!("Timer {:?}#{} cancelled", kind, token);
                }
                _ = sleep(delay) => {
                    // The worker may already be gone; nothing to do then.
                    let _ = signals.send(Signal::Timer { kind, token });
                }
            }
        });

        self.armed.insert(kind, Armed { token, cancel });
        token
    }

    pub fn cancel(&mut self, kind: TimerKind) -> bool {
        match self.armed.remove(&kind) {
            Some(armed) => {
                armed.cancel.cancel();
                true
            }
            None => false,
        }
    }

    pub fn cancel_all(&mut self) {
        for (_, armed) in self.armed.drain() {
            armed.cancel.cancel();
        }
    }

    #[cfg(test)]
    fn is_armed(&self, kind: TimerKind) -> bool {
        self.armed.contains_key(&kind)
    }

    /// Consumes a fired timer. `false` means it was superseded or cancelled
    /// after it fired and must be ignored.
    pub fn claim(&mut self, kind: TimerKind, token: u64) -> bool {
        match self.armed.get(&kind) {
            Some(armed) if armed.token == token => {
                self.armed.remove(&kind);
                true
            }
            _ => false,
        }
    }
}

impl Drop for Timers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn rearming_supersedes_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);

        let first = timers.arm(TimerKind::Reconnect, Duration::from_secs(3));
        let second = timers.arm(TimerKind::Reconnect, Duration::from_secs(3));
        assert_ne!(first, second);

        sleep(Duration::from_secs(4)).await;
        let Some(Signal::Timer { kind, token }) = rx.recv().await else {
            panic!("expected a timer signal");
        };
        assert_eq!(kind, TimerKind::Reconnect);
        assert_eq!(token, second);
        assert!(rx.try_recv().is_err());
        assert!(!timers.claim(TimerKind::Reconnect, first));
        assert!(timers.claim(TimerKind::Reconnect, second));
        assert!(!timers.is_armed(TimerKind::Reconnect));
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_timer_never_fires() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);
        timers.arm(TimerKind::Staleness, Duration::from_secs(30));
        timers.arm(TimerKind::Heartbeat, Duration::from_secs(10));
        timers.cancel_all();

        sleep(Duration::from_secs(60)).await;
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test(start_paused = true)]
    async fn late_claim_after_cancel_is_rejected() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = Timers::new(tx);
        let token = timers.arm(TimerKind::ConnectTimeout, Duration::from_secs(1));
        sleep(Duration::from_secs(2)).await;
        assert!(matches!(rx.recv().await, Some(Signal::Timer { .. })));

        // Cancelled between firing and being processed.
        timers.cancel(TimerKind::ConnectTimeout);
        assert!(!timers.claim(TimerKind::ConnectTimeout, token));
    }
}
