//! Process-wide publish/subscribe event broker.
//!
//! The broker maps signal identity to the set of subscribed active
//! objects. It is constructed explicitly and threaded through active
//! object construction as an `Arc`; there is no implicit global instance.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;

use reflex_hsm::{Event, Signal};

use crate::active::{Mailbox, ObjectId};

/// Signal-keyed subscription registry with FIFO fan-out delivery.
pub struct Broker {
    subscribers: Mutex<HashMap<Signal, Vec<Mailbox>>>,
    next_id: AtomicU32,
}

impl Broker {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(HashMap::new()),
            next_id: AtomicU32::new(1),
        }
    }

    /// Hands out a broker-unique active object identity.
    pub(crate) fn allocate_id(&self) -> ObjectId {
        ObjectId(self.next_id.fetch_add(1, Ordering::Relaxed))
    }

    /// Records `mailbox`'s interest in `signal`. Subscribing the same
    /// object twice is idempotent.
    pub fn subscribe(&self, signal: Signal, mailbox: &Mailbox) {
        let mut table = self.subscribers.lock();
        let entry = table.entry(signal).or_default();
        if !entry.iter().any(|m| m.id() == mailbox.id()) {
            entry.push(mailbox.clone());
        }
    }

    /// Removes one object's interest in `signal`.
    pub fn unsubscribe(&self, signal: Signal, id: ObjectId) {
        let mut table = self.subscribers.lock();
        if let Some(entry) = table.get_mut(&signal) {
            entry.retain(|m| m.id() != id);
            if entry.is_empty() {
                table.remove(&signal);
            }
        }
    }

    /// Removes one object's interest in every signal. Called by the pump
    /// when an object stops.
    pub fn unsubscribe_all(&self, id: ObjectId) {
        let mut table = self.subscribers.lock();
        table.retain(|_, entry| {
            entry.retain(|m| m.id() != id);
            !entry.is_empty()
        });
    }

    /// Fans the event out FIFO to every current subscriber of its signal
    /// and returns how many queues accepted it.
    ///
    /// The subscriber set is snapshotted under the lock and delivery
    /// happens outside it, so subscribe/unsubscribe calls issued from
    /// consumer threads during an in-flight publish only affect subsequent
    /// publishes. Delivery to each subscriber is independent: terminated
    /// subscribers are skipped, never blocking the rest.
    pub fn publish(&self, event: &Event) -> usize {
        let snapshot: Vec<Mailbox> = {
            let table = self.subscribers.lock();
            table.get(&event.signal()).cloned().unwrap_or_default()
        };

        let mut delivered = 0;
        for mailbox in &snapshot {
            match mailbox.post(event.clone()) {
                Ok(()) => delivered += 1,
                Err(err) => {
                    log::debug!(
                        "dropping {} for {}: {err}",
                        event.signal(),
                        mailbox.name()
                    );
                }
            }
        }
        delivered
    }

    /// Number of current subscribers for `signal`. Advisory only.
    pub fn subscriber_count(&self, signal: Signal) -> usize {
        self.subscribers
            .lock()
            .get(&signal)
            .map_or(0, |entry| entry.len())
    }
}

impl Default for Broker {
    fn default() -> Self {
        Self::new()
    }
}
