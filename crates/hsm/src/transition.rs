//! Transition path computation and memoization.
//!
//! A transition from a source state to a target state executes an exit
//! sequence (source up to, but excluding, the least common ancestor,
//! innermost first) followed by an entry sequence (below the LCA down to
//! the target, outermost first). The state graph is static for the life of
//! the program, so the computed sequence for a given (source, signal) pair
//! is cached in the owning [`Hsm`](crate::Hsm) and reused verbatim.

use crate::event::{Event, Signal};
use crate::machine::DispatchError;
use crate::state::{same, Response, State};
use crate::MAX_DEPTH;

/// Cache key: source handler address plus triggering signal.
pub(crate) type ChainKey = (usize, Signal);

/// A precomputed exit/entry plan for one (source, signal) transition.
///
/// Caching is purely a performance measure: executing a freshly computed
/// chain and a memoized one is indistinguishable. A guard may select a
/// different target for the same trigger on a later dispatch, so each
/// chain records the target it was computed for and is replaced when the
/// handler names another one.
pub struct TransitionChain<M> {
    /// Target the chain was computed for.
    target: State<M>,
    /// States to exit, innermost first.
    exits: Vec<State<M>>,
    /// States to enter, outermost first.
    entries: Vec<State<M>>,
}

impl<M> TransitionChain<M> {
    /// Computes the chain from `source` to `target`.
    ///
    /// A self-transition exits and re-enters the one state; it is never a
    /// no-op.
    pub(crate) fn compute(
        ctx: &mut M,
        source: State<M>,
        target: State<M>,
    ) -> Result<Self, DispatchError> {
        if same(source, target) {
            return Ok(Self {
                target,
                exits: vec![source],
                entries: vec![target],
            });
        }

        let source_path = ancestor_path(ctx, source)?;
        let target_path = ancestor_path(ctx, target)?;

        // The first source ancestor also present in the target path is the
        // deepest common ancestor, since both paths run bottom-up.
        for (i, &up) in source_path.iter().enumerate() {
            if let Some(j) = target_path.iter().position(|&down| same(up, down)) {
                return Ok(Self {
                    target,
                    exits: source_path[..i].to_vec(),
                    entries: target_path[..j].iter().rev().copied().collect(),
                });
            }
        }

        Err(DispatchError::NoCommonAncestor)
    }

    /// The target this chain was computed for.
    pub(crate) fn target(&self) -> State<M> {
        self.target
    }

    /// Runs the exit sequence, then the entry sequence.
    pub(crate) fn execute(&self, ctx: &mut M) {
        let exit = Event::new(Signal::EXIT);
        for &state in &self.exits {
            let _ = state(ctx, &exit);
        }
        let entry = Event::new(Signal::ENTRY);
        for &state in &self.entries {
            let _ = state(ctx, &entry);
        }
    }
}

impl<M> Clone for TransitionChain<M> {
    fn clone(&self) -> Self {
        Self {
            target: self.target,
            exits: self.exits.clone(),
            entries: self.entries.clone(),
        }
    }
}

/// Walks from `state` to the hierarchy root, inclusive of `top`.
///
/// Uses the reserved `EMPTY` probe, which every well-formed handler routes
/// to its default arm.
pub(crate) fn ancestor_path<M>(
    ctx: &mut M,
    state: State<M>,
) -> Result<Vec<State<M>>, DispatchError> {
    let probe = Event::new(Signal::EMPTY);
    let mut path = vec![state];
    let mut current = state;
    loop {
        match current(ctx, &probe) {
            Response::Super(parent) => {
                if path.len() >= MAX_DEPTH {
                    return Err(DispatchError::DepthExceeded);
                }
                path.push(parent);
                current = parent;
            }
            Response::Top => break,
            _ => return Err(DispatchError::MissingSuperstate),
        }
    }
    Ok(path)
}

/// Resolves the direct superstate of `state` via the `EMPTY` probe.
pub(crate) fn superstate<M>(ctx: &mut M, state: State<M>) -> Result<State<M>, DispatchError> {
    let probe = Event::new(Signal::EMPTY);
    match state(ctx, &probe) {
        Response::Super(parent) => Ok(parent),
        _ => Err(DispatchError::MissingSuperstate),
    }
}
