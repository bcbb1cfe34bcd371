//! Table-driven workflows.
//!
//! A [`Machine`] maps its current state to the next state, the effect to yield
//! and an optional update that receives that effect's result. [`FsmWorkflow`]
//! drives it:
//!
//! - `Next(v)`: apply the pending update to `v`, then transition
//! - `Throw(e)`: halt and rethrow `e`
//! - `Cancel` / `End`: halt quietly
//!
//! Reaching [`Transition::Halt`] returns `Unit`.

use std::fmt;

use crate::domain::{Effect, Value};
use crate::workflow::{Resume, Step, Workflow};

pub trait Machine: Sized {
    type State: Copy + fmt::Debug;

    fn start(&self) -> Self::State;

    fn transition(&mut self, state: Self::State) -> Transition<Self>;
}

pub enum Transition<M: Machine> {
    Step {
        next: M::State,
        effect: Effect,
        update: Option<fn(&mut M, Value)>,
    },
    Halt,
}

impl<M: Machine> Transition<M> {
    pub fn to(next: M::State, effect: Effect) -> Self {
        Transition::Step {
            next,
            effect,
            update: None,
        }
    }

    pub fn then_update(next: M::State, effect: Effect, update: fn(&mut M, Value)) -> Self {
        Transition::Step {
            next,
            effect,
            update: Some(update),
        }
    }
}

pub struct FsmWorkflow<M: Machine> {
    name: String,
    machine: M,
    /// `None` once halted.
    state: Option<M::State>,
    update: Option<fn(&mut M, Value)>,
}

impl<M: Machine> FsmWorkflow<M> {
    pub fn new(name: impl Into<String>, machine: M) -> Self {
        let state = machine.start();
        Self {
            name: name.into(),
            machine,
            state: Some(state),
            update: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_halted(&self) -> bool {
        self.state.is_none()
    }

    fn halt(&mut self) {
        self.state = None;
        self.update = None;
    }
}

impl<M: Machine> Workflow for FsmWorkflow<M> {
    fn resume(&mut self, input: Resume) -> Step {
        let Some(state) = self.state else {
            return Step::Return(Value::Unit);
        };

        match input {
            Resume::Throw(error) => {
                self.halt();
                return Step::Throw(error);
            }
            Resume::Cancel | Resume::End => {
                self.halt();
                return Step::Return(Value::Unit);
            }
            Resume::Next(value) => {
                if let Some(update) = self.update.take() {
                    update(&mut self.machine, value);
                }
            }
        }

        match self.machine.transition(state) {
            Transition::Step {
                next,
                effect,
                update,
            } => {
                tracing::trace!(fsm = %self.name, from = ?state, to = ?next, "transition");
                self.state = Some(next);
                self.update = update;
                Step::Yield(effect)
            }
            Transition::Halt => {
                self.halt();
                Step::Return(Value::Unit)
            }
        }
    }
}
