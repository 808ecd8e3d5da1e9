//! State handler surface consumed by concrete state machines.
//!
//! States are plain functions over a user-supplied context `M` holding the
//! machine's instance data. The set of states is closed at compile time and
//! a state's identity is its function address, so the engine needs no
//! runtime polymorphism to walk the hierarchy.

use crate::event::Event;

/// A state handler: reacts to one event against the machine context.
///
/// Every handler must route signals it does not recognize (including the
/// engine's internal probe signals) to its default arm, which returns
/// [`Response::Super`] naming the superstate, or [`Response::Super`]`(top)`
/// for top-level states.
pub type State<M> = fn(&mut M, &Event) -> Response<M>;

/// What a state handler decided about one event.
pub enum Response<M> {
    /// The event is fully handled; no further action.
    Handled,
    /// Transition to the target state.
    Transition(State<M>),
    /// Not responsible; delegate to the named superstate.
    Super(State<M>),
    /// Not responsible (e.g. a guard rejected the signal); the engine
    /// resolves the superstate itself and continues the walk there.
    Unhandled,
    /// Returned only by [`top`]: the hierarchy root ignores everything.
    Top,
}

impl<M> core::fmt::Debug for Response<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let name = match self {
            Response::Handled => "Handled",
            Response::Transition(_) => "Transition",
            Response::Super(_) => "Super",
            Response::Unhandled => "Unhandled",
            Response::Top => "Top",
        };
        f.write_str(name)
    }
}

/// The implicit root of every state hierarchy.
///
/// `top` has no entry or exit actions and silently discards every event
/// that reaches it. Top-level states name it as their superstate.
pub fn top<M>(_ctx: &mut M, _event: &Event) -> Response<M> {
    Response::Top
}

/// Compares two states by identity (function address).
#[inline]
pub(crate) fn same<M>(a: State<M>, b: State<M>) -> bool {
    a as usize == b as usize
}
