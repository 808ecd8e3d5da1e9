//! # reflex-af
//!
//! Active object framework for the Reflex runtime. An active object owns
//! one blocking event queue and one state machine, and processes events on
//! its own dedicated thread, one at a time. Objects communicate only by
//! posting events: directly to a peer's [`Mailbox`], broadcast through the
//! [`Broker`], or delayed through a [`Timer`].
//!
//! ## Module Overview
//! - [`queue`]  – Blocking FIFO/LIFO event queue.
//! - [`active`] – Active objects, behaviors, the event pump, fault policy.
//! - [`broker`] – Signal-keyed publish/subscribe fan-out.
//! - [`timer`]  – Delayed self-delivery.
//!
//! The state machine engine itself lives in `reflex-hsm`, re-exported here
//! under [`hsm`] so applications depend on one crate.

#![forbid(unsafe_code)]

pub mod active;
pub mod broker;
pub mod queue;
pub mod timer;

pub use active::{
    ActiveObject, Behavior, Fault, FaultAction, FaultKind, Mailbox, ObjectHandle, ObjectId,
    PumpExit,
};
pub use broker::Broker;
pub use queue::{EventQueue, PostError};
pub use timer::Timer;

pub use reflex_hsm as hsm;
pub use reflex_hsm::{DispatchError, Disposition, Event, Hsm, Response, Signal, State};
