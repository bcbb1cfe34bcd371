use crate::domain::{Message, Pattern, Routine, Value};
use crate::effects;
use crate::proc::Task;

use super::fsm::{FsmWorkflow, Machine, Transition};
use super::worker_args;

/// take → (cancel previous) → fork → take …
///
/// The previous worker is cancelled before the next one is forked, so two
/// workers of one helper never overlap.
pub struct TakeLatest {
    pattern: Pattern,
    worker: Routine,
    args: Vec<Value>,
    message: Option<Message>,
    task: Option<Task>,
}

#[derive(Debug, Clone, Copy)]
pub enum LatestState {
    Take,
    Decide,
    Fork,
}

impl TakeLatest {
    pub fn new(pattern: Pattern, worker: &Routine, args: Vec<Value>) -> FsmWorkflow<Self> {
        let name = format!("takeLatest({}, {})", pattern.describe(), worker.name());
        FsmWorkflow::new(
            name,
            Self {
                pattern,
                worker: worker.clone(),
                args,
                message: None,
                task: None,
            },
        )
    }

    fn fork(&mut self) -> Transition<Self> {
        match self.message.take() {
            Some(message) => Transition::then_update(
                LatestState::Take,
                effects::fork(&self.worker, worker_args(&self.args, message)),
                |m, v| m.task = v.as_task().cloned(),
            ),
            None => Transition::Halt,
        }
    }
}

impl Machine for TakeLatest {
    type State = LatestState;

    fn start(&self) -> LatestState {
        LatestState::Take
    }

    fn transition(&mut self, state: LatestState) -> Transition<Self> {
        match state {
            LatestState::Take => Transition::then_update(
                LatestState::Decide,
                effects::take(self.pattern.clone()),
                |m, v| m.message = v.as_message().cloned(),
            ),
            LatestState::Decide => match self.task.take() {
                Some(task) if task.is_running() => {
                    Transition::to(LatestState::Fork, effects::cancel(&task))
                }
                _ => self.fork(),
            },
            LatestState::Fork => self.fork(),
        }
    }
}
