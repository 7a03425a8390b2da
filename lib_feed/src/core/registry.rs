//! # Subscription Registry
//!
//! Tracks what the consumer wants streamed (`desired`) against what the server
//! has confirmed for the current connection (`acknowledged`). The registry only
//! computes which topics must go on the wire; sending is the caller's job.
//!
//! Acknowledged topics are never marked optimistically. A topic enters the
//! acknowledged set only through [`SubscriptionRegistry::on_subscribed`], which
//! is fed by the server's `SUBSCRIBED` frame.

use std::collections::BTreeSet;

/// Topics to send in the next SUBSCRIBE / UNSUBSCRIBE frames.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Delta {
    pub to_add: Vec<String>,
    pub to_remove: Vec<String>,
}

impl Delta {
    pub fn is_empty(&self) -> bool {
        self.to_add.is_empty() && self.to_remove.is_empty()
    }
}

#[derive(Debug, Clone, Default)]
pub struct SubscriptionRegistry {
    desired: BTreeSet<String>,
    acknowledged: BTreeSet<String>,
    // Sent but not yet acknowledged; keeps a repeated request from going out twice.
    pending_subscribe: BTreeSet<String>,
    pending_unsubscribe: BTreeSet<String>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Trims topic identifiers, drops empty ones and duplicates, keeping first-seen order.
    pub fn normalize<I, S>(topics: I) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut seen = BTreeSet::new();
        topics
            .into_iter()
            .map(|t| t.as_ref().trim().to_string())
            .filter(|t| !t.is_empty() && seen.insert(t.clone()))
            .collect()
    }

    pub fn desired(&self) -> &BTreeSet<String> {
        &self.desired
    }

    pub fn acknowledged(&self) -> &BTreeSet<String> {
        &self.acknowledged
    }

    pub fn is_acknowledged(&self, topic: &str) -> bool {
        self.acknowledged.contains(topic)
    }

    /// Adds topics to the desired set. When the session is live, returns the
    /// topics that still need a SUBSCRIBE frame.
    pub fn request_subscribe<I, S>(&mut self, topics: I, live: bool) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let topics = Self::normalize(topics);
        self.desired.extend(topics.iter().cloned());
        if !live {
            return Vec::new();
        }

        let to_add: Vec<String> = topics
            .into_iter()
            .filter(|t| !self.acknowledged.contains(t) && !self.pending_subscribe.contains(t))
            .collect();
        self.pending_subscribe.extend(to_add.iter().cloned());
        to_add
    }

    /// Removes topics from the desired set. When the session is live, returns
    /// the acknowledged topics that need an UNSUBSCRIBE frame.
    pub fn request_unsubscribe<I, S>(&mut self, topics: I, live: bool) -> Vec<String>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let topics = Self::normalize(topics);
        for topic in &topics {
            self.desired.remove(topic);
        }
        if !live {
            return Vec::new();
        }

        let to_remove: Vec<String> = topics
            .into_iter()
            .filter(|t| self.acknowledged.contains(t) && !self.pending_unsubscribe.contains(t))
            .collect();
        self.pending_unsubscribe.extend(to_remove.iter().cloned());
        to_remove
    }

    /// Replaces the desired set wholesale and returns the minimal delta.
    pub fn set_desired<I, S>(&mut self, topics: I, live: bool) -> Delta
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.desired = Self::normalize(topics).into_iter().collect();
        if live {
            self.reconcile()
        } else {
            Delta::default()
        }
    }

    /// `desired − acknowledged` and `acknowledged − desired`, minus what is
    /// already in flight. Marks the returned topics as pending.
    pub fn reconcile(&mut self) -> Delta {
        let to_add: Vec<String> = self
            .desired
            .iter()
            .filter(|t| !self.acknowledged.contains(*t) && !self.pending_subscribe.contains(*t))
            .cloned()
            .collect();
        let to_remove: Vec<String> = self
            .acknowledged
            .iter()
            .filter(|t| !self.desired.contains(*t) && !self.pending_unsubscribe.contains(*t))
            .cloned()
            .collect();

        self.pending_subscribe.extend(to_add.iter().cloned());
        self.pending_unsubscribe.extend(to_remove.iter().cloned());
        Delta { to_add, to_remove }
    }

    /// The full desired set for the post-connect replay, or `None` when there
    /// is nothing to ask for.
    pub fn replay(&mut self) -> Option<Vec<String>> {
        if self.desired.is_empty() {
            return None;
        }
        self.pending_subscribe = self.desired.clone();
        Some(self.desired.iter().cloned().collect())
    }

    pub fn on_subscribed<I, S>(&mut self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for topic in Self::normalize(topics) {
            self.pending_subscribe.remove(&topic);
            self.acknowledged.insert(topic);
        }
    }

    pub fn on_unsubscribed<I, S>(&mut self, topics: I)
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        for topic in Self::normalize(topics) {
            self.pending_unsubscribe.remove(&topic);
            self.acknowledged.remove(&topic);
        }
    }

    /// Forgets everything tied to the connection that just ended.
    pub fn reset_session(&mut self) {
        self.acknowledged.clear();
        self.pending_subscribe.clear();
        self.pending_unsubscribe.clear();
    }
}
