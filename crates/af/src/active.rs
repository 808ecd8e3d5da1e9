//! Active objects: one event queue, one state machine, one thread.
//!
//! An active object is the unit of concurrency. Its behavior (typically an
//! [`Hsm`](reflex_hsm::Hsm) plus its context) is owned by a dedicated pump
//! thread that blocks on the queue and dispatches events strictly one at a
//! time, so behavior data is never touched from any other context.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use thiserror::Error;

use reflex_hsm::{DispatchError, Disposition, Event, Signal};

use crate::broker::Broker;
use crate::queue::{EventQueue, PostError};

/// Identity of an active object, unique per broker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ObjectId(pub u32);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AO#{}", self.0)
    }
}

/// Cheap-clone producer handle for one active object's queue.
///
/// Mailboxes are what the broker, timers, and peer objects hold; they can
/// post but never consume.
#[derive(Clone)]
pub struct Mailbox {
    id: ObjectId,
    name: Arc<str>,
    queue: Arc<EventQueue>,
}

impl Mailbox {
    pub fn id(&self) -> ObjectId {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Enqueues at the tail (FIFO).
    pub fn post(&self, event: Event) -> Result<(), PostError> {
        self.queue.post(event)
    }

    /// Enqueues at the head (LIFO); urgent self-addressed follow-ups are
    /// served before anything posted earlier.
    pub fn post_urgent(&self, event: Event) -> Result<(), PostError> {
        self.queue.post_urgent(event)
    }

    /// Queue depth. Advisory only.
    pub fn pending(&self) -> usize {
        self.queue.len()
    }

    pub(crate) fn queue(&self) -> &Arc<EventQueue> {
        &self.queue
    }
}

impl fmt::Debug for Mailbox {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Mailbox")
            .field("id", &self.id)
            .field("name", &self.name)
            .field("pending", &self.queue.len())
            .finish()
    }
}

/// What went wrong while processing one event.
#[derive(Debug, Error)]
pub enum FaultKind {
    #[error("dispatch failed: {0}")]
    Dispatch(#[from] DispatchError),
    #[error("state handler panicked: {0}")]
    Panic(String),
}

/// Fault report handed to [`Behavior::on_fault`].
#[derive(Debug)]
pub struct Fault {
    /// Signal of the event being processed when the fault occurred.
    pub signal: Signal,
    pub kind: FaultKind,
}

/// Decision returned by the fault hook.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultAction {
    /// Stop the pump; the object becomes unreachable and `join` reports
    /// [`PumpExit::Faulted`]. This is the default.
    Halt,
    /// Keep pumping on a best-effort basis. The state graph may be
    /// inconsistent after a partial transition; resuming is opt-in.
    Resume,
}

/// Application-side of an active object.
///
/// All three hooks run exclusively on the object's own pump thread.
pub trait Behavior: Send + 'static {
    /// Runs once before the first event is consumed. Subscribe to signals
    /// of interest and take the state machine's initial transition here.
    fn on_start(&mut self) -> Result<(), DispatchError> {
        Ok(())
    }

    /// Processes one event taken from the queue.
    fn on_event(&mut self, event: &Event) -> Result<Disposition, DispatchError>;

    /// Consulted after `on_event` fails or panics. Defaults to halting.
    ///
    /// The pump logs the object name and the triggering signal before the
    /// call. The current state is not visible at that layer, so behaviors
    /// that own an [`Hsm`](reflex_hsm::Hsm) should log `hsm.state()` here
    /// to record where the fault originated.
    fn on_fault(&mut self, _fault: &Fault) -> FaultAction {
        FaultAction::Halt
    }
}

/// How an active object's pump ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PumpExit {
    /// A `TERMINATE`-signaled event was observed; clean cooperative stop.
    Terminated,
    /// A fault halted the object.
    Faulted,
}

/// A constructed-but-not-yet-running active object.
///
/// Construction allocates the queue and identity so peers can be handed
/// the [`Mailbox`] before the pump starts; `spawn` consumes the object and
/// starts its dedicated thread.
pub struct ActiveObject {
    mailbox: Mailbox,
    broker: Arc<Broker>,
}

impl ActiveObject {
    /// Creates an active object registered against `broker`.
    pub fn new(name: &str, broker: Arc<Broker>) -> Self {
        let mailbox = Mailbox {
            id: broker.allocate_id(),
            name: Arc::from(name),
            queue: Arc::new(EventQueue::new()),
        };
        Self { mailbox, broker }
    }

    pub fn mailbox(&self) -> Mailbox {
        self.mailbox.clone()
    }

    /// Starts the event pump on a dedicated named thread.
    ///
    /// # Panics
    ///
    /// Panics if the operating system refuses to spawn the thread.
    pub fn spawn<B: Behavior>(self, behavior: B) -> ObjectHandle {
        let Self { mailbox, broker } = self;
        let pump_mailbox = mailbox.clone();
        let thread = thread::Builder::new()
            .name(mailbox.name().to_string())
            .spawn(move || pump(pump_mailbox, broker, behavior))
            .expect("failed to spawn active object thread");
        ObjectHandle { mailbox, thread }
    }
}

/// Owner-side handle to a running active object.
pub struct ObjectHandle {
    mailbox: Mailbox,
    thread: JoinHandle<PumpExit>,
}

impl ObjectHandle {
    pub fn mailbox(&self) -> Mailbox {
        self.mailbox.clone()
    }

    pub fn id(&self) -> ObjectId {
        self.mailbox.id()
    }

    pub fn post(&self, event: Event) -> Result<(), PostError> {
        self.mailbox.post(event)
    }

    pub fn post_urgent(&self, event: Event) -> Result<(), PostError> {
        self.mailbox.post_urgent(event)
    }

    /// Requests cooperative termination by posting a `TERMINATE` event at
    /// the tail of the queue; events already enqueued are still processed
    /// first.
    pub fn stop(&self) -> Result<(), PostError> {
        self.mailbox.post(Event::terminate())
    }

    /// Liveness probe: false once the pump thread has exited.
    pub fn is_alive(&self) -> bool {
        !self.thread.is_finished()
    }

    /// Waits for the pump thread to exit.
    ///
    /// A pump that died to an uncontained panic (outside event dispatch,
    /// which is contained) is reported as `Faulted`.
    pub fn join(self) -> PumpExit {
        self.thread.join().unwrap_or(PumpExit::Faulted)
    }
}

/// The sequential event pump. Runs on the object's own thread until a
/// `TERMINATE` event is observed or a fault halts it.
///
/// The terminal event is consumed here, at the top of the loop, and never
/// dispatched to user state logic; current-state exit actions do not run.
/// On exit the object is unsubscribed from every signal and its queue is
/// closed, so late producers get [`PostError::Terminated`] instead of
/// blocking.
fn pump<B: Behavior>(mailbox: Mailbox, broker: Arc<Broker>, mut behavior: B) -> PumpExit {
    let exit = run_pump(&mailbox, &mut behavior);
    broker.unsubscribe_all(mailbox.id());
    mailbox.queue().close();
    log::debug!("{}: pump stopped ({exit:?})", mailbox.name());
    exit
}

fn run_pump<B: Behavior>(mailbox: &Mailbox, behavior: &mut B) -> PumpExit {
    if let Err(err) = behavior.on_start() {
        let fault = Fault {
            signal: Signal::INIT,
            kind: FaultKind::Dispatch(err),
        };
        log::error!("{}: fault during startup: {}", mailbox.name(), fault.kind);
        if behavior.on_fault(&fault) == FaultAction::Halt {
            return PumpExit::Faulted;
        }
    }

    loop {
        let Some(event) = mailbox.queue().wait() else {
            return PumpExit::Terminated;
        };
        if event.signal() == Signal::TERMINATE {
            return PumpExit::Terminated;
        }

        let signal = event.signal();
        let outcome = panic::catch_unwind(AssertUnwindSafe(|| behavior.on_event(&event)));
        let kind = match outcome {
            Ok(Ok(_)) => continue,
            Ok(Err(err)) => FaultKind::Dispatch(err),
            Err(payload) => FaultKind::Panic(panic_message(payload.as_ref())),
        };

        let fault = Fault { signal, kind };
        log::error!(
            "{}: fault while processing {}: {}",
            mailbox.name(),
            signal,
            fault.kind
        );
        if behavior.on_fault(&fault) == FaultAction::Halt {
            return PumpExit::Faulted;
        }
    }
}

fn panic_message(payload: &(dyn std::any::Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "opaque panic payload".to_string()
    }
}
