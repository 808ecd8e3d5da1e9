//! Event and signal primitives.
//!
//! Events are lightweight messages identified by an integral signal plus an
//! optional shared payload. Signals are created once at module initialization
//! and compared by identity (the numeric value), never by name.

use core::fmt;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::sync::Arc;

/// Identifier for an event kind.
///
/// Signals are process-unique numeric identifiers. A 16-bit range keeps the
/// type cheap to copy and compare while leaving plenty of room for
/// application signals above [`Signal::USER`].
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Signal(pub u16);

impl Signal {
    /// Reserved signal delivered to trigger initial transitions.
    pub const INIT: Signal = Signal(0);
    /// Reserved signal delivered to a state being entered.
    pub const ENTRY: Signal = Signal(1);
    /// Reserved signal delivered to a state being exited.
    pub const EXIT: Signal = Signal(2);
    /// Reserved signal used by the engine to probe a state's superstate.
    pub const EMPTY: Signal = Signal(3);
    /// Reserved signal that stops an active object's event pump.
    pub const TERMINATE: Signal = Signal(4);

    /// First signal value available to applications.
    pub const USER: Signal = Signal(5);

    /// Creates a new signal from a raw value.
    pub const fn new(signal: u16) -> Self {
        Signal(signal)
    }

    /// Creates the `n`-th application signal, offset from [`Signal::USER`].
    pub const fn user(n: u16) -> Self {
        Signal(Signal::USER.0 + n)
    }

    /// Returns the raw signal value.
    pub const fn raw(self) -> u16 {
        self.0
    }

    /// Returns true for signals below [`Signal::USER`].
    pub const fn is_reserved(self) -> bool {
        self.0 < Signal::USER.0
    }
}

impl From<u16> for Signal {
    #[inline]
    fn from(value: u16) -> Self {
        Self(value)
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Signal::INIT => write!(f, "SIG(INIT)"),
            Signal::ENTRY => write!(f, "SIG(ENTRY)"),
            Signal::EXIT => write!(f, "SIG(EXIT)"),
            Signal::EMPTY => write!(f, "SIG(EMPTY)"),
            Signal::TERMINATE => write!(f, "SIG(TERMINATE)"),
            Signal(n) => write!(f, "SIG({n:#06x})"),
        }
    }
}

/// Type-erased event payload shared between subscribers after a fan-out.
pub type Payload = Arc<dyn Any + Send + Sync>;

/// An immutable message: a signal plus an optional payload.
///
/// Cloning an event is cheap; clones share the payload allocation. Each
/// queue slot owns its own `Event` value, so no two consumers ever contend
/// for the same queued instance even though the payload is shared.
#[derive(Clone)]
pub struct Event {
    signal: Signal,
    payload: Option<Payload>,
}

impl Event {
    /// Creates an event carrying no payload.
    pub fn new(signal: Signal) -> Self {
        Self {
            signal,
            payload: None,
        }
    }

    /// Creates an event carrying `payload`.
    pub fn with_payload<T: Any + Send + Sync>(signal: Signal, payload: T) -> Self {
        Self {
            signal,
            payload: Some(Arc::new(payload)),
        }
    }

    /// Creates an event from an already shared payload.
    pub fn from_arc(signal: Signal, payload: Payload) -> Self {
        Self {
            signal,
            payload: Some(payload),
        }
    }

    /// The event that stops an active object's pump.
    pub fn terminate() -> Self {
        Self::new(Signal::TERMINATE)
    }

    /// Returns the signal identity of this event.
    pub fn signal(&self) -> Signal {
        self.signal
    }

    /// Borrows the payload downcast to `T`, if present and of that type.
    pub fn payload<T: Any + Send + Sync>(&self) -> Option<&T> {
        self.payload.as_ref()?.downcast_ref()
    }

    /// Returns true if the event carries a payload.
    pub fn has_payload(&self) -> bool {
        self.payload.is_some()
    }
}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("signal", &self.signal)
            .field("payload", &self.payload.as_ref().map(|_| ".."))
            .finish()
    }
}
