//! # reflex-hsm
//!
//! Hierarchical state machine engine implementing UML statechart semantics:
//! entry/exit actions, guarded transitions, nested initial transitions, and
//! event delegation up the state hierarchy.
//!
//! States are plain functions over a user context (see [`State`]); the
//! engine walks the hierarchy by probing handlers for their superstate and
//! memoizes each transition's exit/entry plan (see
//! [`transition::TransitionChain`]). Dispatch is synchronous and
//! non-blocking; the concurrency story lives in the companion framework
//! crate, which feeds one event at a time into [`Hsm::dispatch`].

#![forbid(unsafe_code)]

pub mod event;
pub mod machine;
pub mod state;
pub mod transition;

pub use event::{Event, Payload, Signal};
pub use machine::{DispatchError, Disposition, Hsm};
pub use state::{top, Response, State};


/// Maximum nesting depth for hierarchical states.
pub const MAX_DEPTH: usize = 16;
