//! Timed event delivery.
//!
//! A [`Timer`] belongs to exactly one active object and delivers a
//! caller-supplied event into that object's own queue after a relative
//! delay. The worker only enqueues; the owner's pump performs the actual
//! dispatch, preserving the single-consumer invariant. Periodic behavior
//! is built by the receiving reaction re-arming the timer.

use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::{Condvar, Mutex};

use reflex_hsm::Event;

use crate::active::Mailbox;

struct Pending {
    deadline: Instant,
    event: Event,
}

struct TimerState {
    pending: Option<Pending>,
    shutdown: bool,
}

struct Shared {
    state: Mutex<TimerState>,
    changed: Condvar,
}

/// One-shot timer owned by a single active object.
///
/// At most one delivery is pending per timer instance: re-arming before
/// expiry replaces the earlier arming rather than stacking a second
/// delivery. Arming and canceling are intended to be called only from the
/// owning object's own execution context.
pub struct Timer {
    shared: Arc<Shared>,
    worker: Option<JoinHandle<()>>,
}

impl Timer {
    /// Creates a timer delivering into `owner`'s queue.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn the worker thread.
    pub fn new(owner: &Mailbox) -> Self {
        let shared = Arc::new(Shared {
            state: Mutex::new(TimerState {
                pending: None,
                shutdown: false,
            }),
            changed: Condvar::new(),
        });
        let worker_shared = Arc::clone(&shared);
        let owner = owner.clone();
        let worker = thread::Builder::new()
            .name(format!("{}-timer", owner.name()))
            .spawn(move || worker_loop(worker_shared, owner))
            .expect("failed to spawn timer thread");
        Self {
            shared,
            worker: Some(worker),
        }
    }

    /// Arms a one-shot delivery of `event` after `delay`, replacing any
    /// pending delivery.
    pub fn fire_in(&self, delay: Duration, event: Event) {
        let mut state = self.shared.state.lock();
        state.pending = Some(Pending {
            deadline: Instant::now() + delay,
            event,
        });
        self.shared.changed.notify_one();
    }

    /// Cancels a pending delivery, if any. Disarming an idle timer is not
    /// an error.
    pub fn disarm(&self) {
        let mut state = self.shared.state.lock();
        state.pending = None;
        self.shared.changed.notify_one();
    }

    pub fn is_armed(&self) -> bool {
        self.shared.state.lock().pending.is_some()
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        {
            let mut state = self.shared.state.lock();
            state.shutdown = true;
            self.shared.changed.notify_one();
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// Parks until armed, sleeps until the deadline, posts, repeats.
///
/// Every wakeup revalidates the pending arming under the lock, so a
/// re-arm that moved the deadline simply results in a fresh wait.
fn worker_loop(shared: Arc<Shared>, owner: Mailbox) {
    loop {
        let mut state = shared.state.lock();
        if state.shutdown {
            return;
        }

        let fired = match state.pending.as_ref().map(|p| p.deadline) {
            None => {
                shared.changed.wait(&mut state);
                None
            }
            Some(deadline) if Instant::now() < deadline => {
                let _ = shared.changed.wait_until(&mut state, deadline);
                None
            }
            Some(_) => state.pending.take().map(|p| p.event),
        };
        drop(state);

        if let Some(event) = fired {
            if let Err(err) = owner.post(event) {
                log::debug!("timer delivery to {} dropped: {err}", owner.name());
            }
        }
    }
}
