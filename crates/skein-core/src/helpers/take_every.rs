use crate::domain::{Message, Pattern, Routine, Value};
use crate::effects;

use super::fsm::{FsmWorkflow, Machine, Transition};
use super::worker_args;

/// take → fork → take …, never cancelling earlier workers.
pub struct TakeEvery {
    pattern: Pattern,
    worker: Routine,
    args: Vec<Value>,
    message: Option<Message>,
}

#[derive(Debug, Clone, Copy)]
pub enum EveryState {
    Take,
    Fork,
}

impl TakeEvery {
    pub fn new(pattern: Pattern, worker: &Routine, args: Vec<Value>) -> FsmWorkflow<Self> {
        let name = format!("takeEvery({}, {})", pattern.describe(), worker.name());
        FsmWorkflow::new(
            name,
            Self {
                pattern,
                worker: worker.clone(),
                args,
                message: None,
            },
        )
    }
}

impl Machine for TakeEvery {
    type State = EveryState;

    fn start(&self) -> EveryState {
        EveryState::Take
    }

    fn transition(&mut self, state: EveryState) -> Transition<Self> {
        match state {
            EveryState::Take => Transition::then_update(
                EveryState::Fork,
                effects::take(self.pattern.clone()),
                |m, v| m.message = v.as_message().cloned(),
            ),
            EveryState::Fork => match self.message.take() {
                Some(message) => Transition::to(
                    EveryState::Take,
                    effects::fork(&self.worker, worker_args(&self.args, message)),
                ),
                None => Transition::Halt,
            },
        }
    }
}
