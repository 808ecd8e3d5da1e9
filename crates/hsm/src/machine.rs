//! Hierarchical state machine execution.

use std::collections::HashMap;

use thiserror::Error;

use crate::event::{Event, Signal};
use crate::state::{same, Response, State};
use crate::transition::{ancestor_path, superstate, ChainKey, TransitionChain};
use crate::MAX_DEPTH;

/// Structural failures raised by the dispatch engine.
///
/// An event that no state claims is *not* an error (see
/// [`Disposition::Ignored`]); these variants mark malformed machines or a
/// misused engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum DispatchError {
    /// `dispatch` was called before `init`.
    #[error("state machine was never initialized")]
    NotInitialized,
    /// `init` was called twice.
    #[error("state machine is already initialized")]
    AlreadyInitialized,
    /// The initial pseudostate returned something other than a transition.
    #[error("initial pseudostate did not request a transition")]
    NoInitialTransition,
    /// An `INIT` reaction targeted a state outside the composite it
    /// belongs to.
    #[error("initial transition target is not a descendant of its composite state")]
    InvalidInitialTarget,
    /// A superstate walk ran past [`MAX_DEPTH`](crate::MAX_DEPTH) levels.
    #[error("state hierarchy exceeds the maximum nesting depth")]
    DepthExceeded,
    /// A handler answered the superstate probe with something other than
    /// its superstate.
    #[error("state failed to report its superstate")]
    MissingSuperstate,
    /// Source and target paths never met, which implies the two states
    /// belong to different hierarchies.
    #[error("source and target states share no common ancestor")]
    NoCommonAncestor,
}

/// How the engine resolved one dispatched event.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// A state handled the event in place.
    Handled,
    /// A state requested a transition, which completed.
    Transitioned,
    /// No state claimed the event; it was discarded at the root.
    Ignored,
}

/// A hierarchical state machine: a current-state pointer plus the
/// transition-chain memo table for the static state graph.
///
/// The machine's instance data lives in a separate context value `M`
/// passed to every call, so state handlers can read and mutate it (guards,
/// counters, handles for posting follow-up events) without borrowing the
/// engine itself.
pub struct Hsm<M> {
    current: State<M>,
    initialized: bool,
    chains: HashMap<ChainKey, TransitionChain<M>>,
}

impl<M> Hsm<M> {
    /// Creates a machine whose initial pseudostate is `initial`.
    ///
    /// The pseudostate runs once, from [`Hsm::init`], and must request a
    /// transition to the default top-level state.
    pub fn new(initial: State<M>) -> Self {
        Self {
            current: initial,
            initialized: false,
            chains: HashMap::new(),
        }
    }

    /// Returns the current state handler.
    pub fn state(&self) -> State<M> {
        self.current
    }

    /// Number of memoized transition chains. Advisory.
    pub fn cached_chains(&self) -> usize {
        self.chains.len()
    }

    /// Takes the initial transition: runs the initial pseudostate, enters
    /// the declared target from the root downward, then drills nested
    /// `INIT` reactions until a leaf state is current.
    ///
    /// There is no exit phase; the machine starts from a null source.
    pub fn init(&mut self, ctx: &mut M) -> Result<(), DispatchError> {
        if self.initialized {
            return Err(DispatchError::AlreadyInitialized);
        }

        let init_evt = Event::new(Signal::INIT);
        let target = match (self.current)(ctx, &init_evt) {
            Response::Transition(target) => target,
            _ => return Err(DispatchError::NoInitialTransition),
        };

        // Enter every ancestor of the target below `top`, outermost first.
        let path = ancestor_path(ctx, target)?;
        let entry = Event::new(Signal::ENTRY);
        for &state in path[..path.len() - 1].iter().rev() {
            let _ = state(ctx, &entry);
        }

        self.current = target;
        self.initialized = true;
        self.drill(ctx)
    }

    /// Processes one event against the current state.
    ///
    /// The event is offered to the current state first; states that are
    /// not responsible delegate to their superstate until a handler claims
    /// it or the root discards it. Guard-rejected signals behave exactly
    /// like unclaimed ones.
    pub fn dispatch(&mut self, ctx: &mut M, event: &Event) -> Result<Disposition, DispatchError> {
        if !self.initialized {
            return Err(DispatchError::NotInitialized);
        }

        let mut state = self.current;
        let mut depth = 0;
        loop {
            match state(ctx, event) {
                Response::Handled => return Ok(Disposition::Handled),
                Response::Transition(target) => {
                    self.transition(ctx, state, target, event.signal())?;
                    return Ok(Disposition::Transitioned);
                }
                Response::Super(parent) => state = parent,
                Response::Unhandled => state = superstate(ctx, state)?,
                Response::Top => {
                    log::trace!("discarding unhandled event {}", event.signal());
                    return Ok(Disposition::Ignored);
                }
            }
            depth += 1;
            if depth > MAX_DEPTH {
                return Err(DispatchError::DepthExceeded);
            }
        }
    }

    /// Executes a transition requested by `source` (the handling state,
    /// possibly an ancestor of the current leaf) toward `target`.
    fn transition(
        &mut self,
        ctx: &mut M,
        source: State<M>,
        target: State<M>,
        trigger: Signal,
    ) -> Result<(), DispatchError> {
        // Exit from the current leaf up to, but excluding, the handling
        // state. This prefix depends on the dynamic current state and is
        // deliberately not part of the cached chain.
        let exit = Event::new(Signal::EXIT);
        let mut state = self.current;
        let mut depth = 0;
        while !same(state, source) {
            let _ = state(ctx, &exit);
            state = superstate(ctx, state)?;
            depth += 1;
            if depth > MAX_DEPTH {
                return Err(DispatchError::DepthExceeded);
            }
        }

        // A memo entry is only valid for the target the handler just
        // returned: a guard may select a different target for the same
        // trigger, and replaying the old chain would run the wrong
        // entry/exit actions.
        let key: ChainKey = (source as usize, trigger);
        let stale = self
            .chains
            .get(&key)
            .map_or(true, |chain| !same(chain.target(), target));
        if stale {
            let chain = TransitionChain::compute(ctx, source, target)?;
            self.chains.insert(key, chain);
        }
        // Present by construction.
        self.chains[&key].execute(ctx);

        self.current = target;
        log::trace!("transition on {trigger} complete");
        self.drill(ctx)
    }

    /// Recursively takes `INIT` reactions of the newly entered state until
    /// a leaf (a state with no `INIT` reaction) is current.
    fn drill(&mut self, ctx: &mut M) -> Result<(), DispatchError> {
        let init_evt = Event::new(Signal::INIT);
        let entry = Event::new(Signal::ENTRY);
        let mut depth = 0;
        loop {
            let target = match (self.current)(ctx, &init_evt) {
                Response::Transition(target) => target,
                _ => return Ok(()),
            };

            // The default target must sit strictly below the composite
            // state that declared the reaction.
            let path = ancestor_path(ctx, target)?;
            let composite = self.current;
            let pos = path
                .iter()
                .position(|&state| same(state, composite))
                .filter(|&pos| pos > 0)
                .ok_or(DispatchError::InvalidInitialTarget)?;
            for &state in path[..pos].iter().rev() {
                let _ = state(ctx, &entry);
            }

            self.current = target;
            depth += 1;
            if depth > MAX_DEPTH {
                return Err(DispatchError::DepthExceeded);
            }
        }
    }
}

impl<M> core::fmt::Debug for Hsm<M> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Hsm")
            .field("state", &(self.current as usize as *const ()))
            .field("initialized", &self.initialized)
            .field("cached_chains", &self.chains.len())
            .finish()
    }
}
