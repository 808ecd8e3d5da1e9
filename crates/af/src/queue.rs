//! Blocking event queue for active objects.
//!
//! Each active object owns exactly one queue. Any context may produce into
//! it (peers, the broker, timers); only the owning pump thread consumes.
//! FIFO posts append at the tail, urgent (LIFO) posts insert at the head
//! so self-posted follow-ups overtake earlier arrivals.

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex};
use thiserror::Error;

use reflex_hsm::Event;

/// Why a post was refused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PostError {
    /// The owning active object has terminated; the event was dropped.
    /// Posting to a dead object never blocks.
    #[error("active object has terminated")]
    Terminated,
}

struct Inner {
    events: VecDeque<Event>,
    closed: bool,
}

/// Thread-safe event queue with a blocking single-consumer side.
pub struct EventQueue {
    inner: Mutex<Inner>,
    ready: Condvar,
}

impl EventQueue {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Inner {
                events: VecDeque::new(),
                closed: false,
            }),
            ready: Condvar::new(),
        }
    }

    /// Appends an event at the tail (FIFO order).
    pub fn post(&self, event: Event) -> Result<(), PostError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(PostError::Terminated);
        }
        inner.events.push_back(event);
        self.ready.notify_one();
        Ok(())
    }

    /// Inserts an event at the head (LIFO / urgent order).
    pub fn post_urgent(&self, event: Event) -> Result<(), PostError> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return Err(PostError::Terminated);
        }
        inner.events.push_front(event);
        self.ready.notify_one();
        Ok(())
    }

    /// Blocks the calling thread until an event is available, then removes
    /// and returns the head element. Returns `None` once the queue is
    /// closed; events still pending at close are discarded.
    pub fn wait(&self) -> Option<Event> {
        let mut inner = self.inner.lock();
        loop {
            if inner.closed {
                return None;
            }
            if let Some(event) = inner.events.pop_front() {
                return Some(event);
            }
            self.ready.wait(&mut inner);
        }
    }

    /// Removes and returns the head element if one is present.
    pub fn try_next(&self) -> Option<Event> {
        let mut inner = self.inner.lock();
        if inner.closed {
            return None;
        }
        inner.events.pop_front()
    }

    /// Current depth. Advisory only: may be stale under concurrent
    /// producers.
    pub fn len(&self) -> usize {
        self.inner.lock().events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.inner.lock().events.is_empty()
    }

    /// Marks the queue terminated, wakes the consumer, and rejects all
    /// subsequent posts.
    pub fn close(&self) {
        let mut inner = self.inner.lock();
        inner.closed = true;
        inner.events.clear();
        self.ready.notify_one();
    }

    pub fn is_closed(&self) -> bool {
        self.inner.lock().closed
    }
}

impl Default for EventQueue {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use reflex_hsm::Signal;
    use std::sync::Arc;
    use std::thread;
    use std::time::Duration;

    fn sig(n: u16) -> Event {
        Event::new(Signal::user(n))
    }

    #[test]
    fn fifo_preserves_arrival_order() {
        let queue = EventQueue::new();
        queue.post(sig(1)).unwrap();
        queue.post(sig(2)).unwrap();
        queue.post(sig(3)).unwrap();

        assert_eq!(queue.len(), 3);
        assert_eq!(queue.wait().unwrap().signal(), Signal::user(1));
        assert_eq!(queue.wait().unwrap().signal(), Signal::user(2));
        assert_eq!(queue.wait().unwrap().signal(), Signal::user(3));
        assert!(queue.is_empty());
    }

    #[test]
    fn urgent_inserts_overtake_earlier_fifo() {
        // FIFO(A), LIFO(B), FIFO(C), LIFO(D) must dequeue as D, B, A, C.
        let queue = EventQueue::new();
        queue.post(sig(0xA)).unwrap();
        queue.post_urgent(sig(0xB)).unwrap();
        queue.post(sig(0xC)).unwrap();
        queue.post_urgent(sig(0xD)).unwrap();

        let order: Vec<Signal> = std::iter::from_fn(|| queue.try_next())
            .map(|e| e.signal())
            .collect();
        assert_eq!(
            order,
            [
                Signal::user(0xD),
                Signal::user(0xB),
                Signal::user(0xA),
                Signal::user(0xC)
            ]
        );
    }

    #[test]
    fn wait_blocks_until_producer_posts() {
        let queue = Arc::new(EventQueue::new());
        let producer = Arc::clone(&queue);

        let consumer = thread::spawn(move || queue.wait());
        thread::sleep(Duration::from_millis(20));
        producer.post(sig(7)).unwrap();

        let got = consumer.join().expect("consumer panicked");
        assert_eq!(got.unwrap().signal(), Signal::user(7));
    }

    #[test]
    fn depth_reflects_enqueues_minus_dequeues() {
        let queue = Arc::new(EventQueue::new());
        let workers: Vec<_> = (0..4u16)
            .map(|t| {
                let q = Arc::clone(&queue);
                thread::spawn(move || {
                    for n in 0..100u16 {
                        q.post(sig(t * 100 + n)).unwrap();
                    }
                })
            })
            .collect();
        for w in workers {
            w.join().expect("producer panicked");
        }

        assert_eq!(queue.len(), 400);
        let mut seen = std::collections::HashSet::new();
        while let Some(event) = queue.try_next() {
            // No duplicates and no phantoms.
            assert!(seen.insert(event.signal().raw()));
        }
        assert_eq!(seen.len(), 400);
        assert_eq!(queue.len(), 0);
    }

    #[test]
    fn closed_queue_rejects_producers_and_wakes_consumer() {
        let queue = Arc::new(EventQueue::new());
        let closer = Arc::clone(&queue);

        let consumer = {
            let q = Arc::clone(&queue);
            thread::spawn(move || q.wait())
        };
        thread::sleep(Duration::from_millis(20));
        closer.close();

        assert!(consumer.join().expect("consumer panicked").is_none());
        assert_eq!(queue.post(sig(1)), Err(PostError::Terminated));
        assert_eq!(queue.post_urgent(sig(2)), Err(PostError::Terminated));
    }
}
