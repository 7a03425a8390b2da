//! # Update Dispatcher
//!
//! Fan-out of changed quotes to the consumer. Two delivery paths exist side by
//! side:
//!
//! 1.  **Observers**: callbacks registered with `on_update`, invoked inline on
//!     the worker task in frame order. They must not block. The list is
//!     copied out of its lock before the calls, so an observer may register
//!     further observers; a panicking observer is logged and skipped.
//! 2.  **Broadcast stream**: every changed quote is also published, wrapped in
//!     an `Arc`, on a `tokio::sync::broadcast` channel. Receivers that fall
//!     behind lose the oldest quotes, never the worker's progress.
//!
//! Only quotes the router judged as changed reach the dispatcher.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::broadcast;

use crate::markets::stockfeed::StockQuote;

/// Observer callback for changed quotes.
pub type UpdateObserver = Arc<dyn Fn(&StockQuote) + Send + Sync + 'static>;

pub struct Dispatcher {
    observers: RwLock<Vec<UpdateObserver>>,
    updates: broadcast::Sender<Arc<StockQuote>>,
}

impl Dispatcher {
    pub fn new(capacity: usize) -> Self {
        let (updates, _) = broadcast::channel(capacity.max(1));
        Self {
            observers: RwLock::new(Vec::new()),
            updates,
        }
    }

    pub fn add_observer(&self, observer: UpdateObserver) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(observer);
    }

    pub fn observer_count(&self) -> usize {
        self.observers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<StockQuote>> {
        self.updates.subscribe()
    }

    pub fn notify(&self, quote: StockQuote) {
        let observers: Vec<UpdateObserver> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for observer in &observers {
            if catch_unwind(AssertUnwindSafe(|| observer(&quote))).is_err() {
                log::error!("Update observer panicked on {}", quote.stock_code);
            }
        }
        // No receivers is the normal case when only callbacks are used.
        let _ = self.updates.send(Arc::new(quote));
    }
}

impl std::fmt::Debug for Dispatcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Dispatcher")
            .field("observers", &self.observer_count())
            .field("receivers", &self.updates.receiver_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn quote(code: &str) -> StockQuote {
        StockQuote {
            stock_code: code.to_string(),
            stock_name: None,
            current_price: 1.0,
            change_price: 0.0,
            change_rate: 0.0,
            volume: None,
            extra: Map::new(),
        }
    }

    #[tokio::test]
    async fn delivers_to_observers_and_stream() {
        let dispatcher = Dispatcher::new(16);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        dispatcher.add_observer(Arc::new(move |q: &StockQuote| {
            assert_eq!(q.stock_code, "005930");
            seen.fetch_add(1, Ordering::SeqCst);
        }));
        let mut stream = dispatcher.subscribe();

        dispatcher.notify(quote("005930"));

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(stream.recv().await.unwrap().stock_code, "005930");
    }

    #[test]
    fn observers_may_register_observers() {
        let dispatcher = Arc::new(Dispatcher::new(4));
        let inner = Arc::clone(&dispatcher);
        dispatcher.add_observer(Arc::new(move |_: &StockQuote| {
            inner.add_observer(Arc::new(|_: &StockQuote| {}));
        }));

        dispatcher.notify(quote("A"));
        assert_eq!(dispatcher.observer_count(), 2);
    }

    #[test]
    fn panicking_observer_does_not_stop_the_rest() {
        let dispatcher = Dispatcher::new(4);
        let calls = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&calls);
        dispatcher.add_observer(Arc::new(|q: &StockQuote| panic!("bad observer for {}", q.stock_code)));
        dispatcher.add_observer(Arc::new(move |_: &StockQuote| {
            seen.fetch_add(1, Ordering::SeqCst);
        }));

        dispatcher.notify(quote("A"));
        dispatcher.notify(quote("B"));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn notify_without_receivers_is_fine() {
        let dispatcher = Dispatcher::new(1);
        dispatcher.notify(quote("A"));
        assert_eq!(dispatcher.observer_count(), 0);
    }
}
