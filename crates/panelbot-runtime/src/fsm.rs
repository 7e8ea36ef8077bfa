//! Generic sub-machine runner.
//!
//! A [`SubMachine`] is a transition table over its own state enum.  The
//! runner executes the current state, passes the outcome through the state's
//! [`RetryCounter`], looks up the transition and repeats until an exit is
//! reached.
//!
//! - The counter is reset whenever a *different* state is entered, so a
//!   state that loops onto itself (`moveStuck → same state`) uses up its
//!   budget while a state re-entered along a back-edge starts afresh.
//! - The cancel token is checked before every state; a cancelled machine
//!   leaves through [`SubMachine::FAILURE`].
//! - A `(state, outcome)` pair missing from the table is logged and also
//!   leaves through [`SubMachine::FAILURE`].

use std::fmt::Debug;

use tracing::{error, info, warn};

use crate::cancel::CancelToken;
use crate::outcome::Outcome;
use crate::retry::RetryCounter;

/// Where a transition leads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition<S, E> {
    Next(S),
    Exit(E),
}

/// A sub-machine's transition table.
pub trait SubMachine {
    type State: Copy + Eq + Debug;
    type Exit: Copy + Eq + Debug;

    const NAME: &'static str;
    const INITIAL: Self::State;
    /// Exit used on cancellation and on unexpected outcomes.
    const FAILURE: Self::Exit;

    /// Look up `(state, outcome)`.  `None` for pairs the table does not
    /// list.
    fn transition(state: Self::State, outcome: Outcome) -> Option<Transition<Self::State, Self::Exit>>;
}

/// Run `M` to completion, executing states with `exec`.
pub fn run_machine<M, C>(
    ctx: &mut C,
    cancel: &CancelToken,
    max_retries: u32,
    mut exec: impl FnMut(&mut C, M::State) -> Outcome,
) -> M::Exit
where
    M: SubMachine,
{
    let mut state = M::INITIAL;
    let mut counter = RetryCounter::new(max_retries);
    info!(machine = M::NAME, "entering sub-machine");

    loop {
        if cancel.is_cancelled() {
            warn!(machine = M::NAME, ?state, "cancelled before state");
            return M::FAILURE;
        }

        let raw = exec(ctx, state);
        let outcome = counter.attempt(raw);
        if outcome != raw {
            warn!(machine = M::NAME, ?state, retries = counter.count(), "retries exhausted");
        }
        info!(machine = M::NAME, ?state, %outcome, "state finished");

        match M::transition(state, outcome) {
            Some(Transition::Next(next)) => {
                if next != state {
                    counter.reset();
                }
                state = next;
            }
            Some(Transition::Exit(exit)) => {
                info!(machine = M::NAME, ?exit, "leaving sub-machine");
                return exit;
            }
            None => {
                error!(machine = M::NAME, ?state, %outcome, "outcome has no transition");
                return M::FAILURE;
            }
        }
    }
}
