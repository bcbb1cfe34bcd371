use std::time::Duration;

use crate::channel::{BufferSpec, Channel};
use crate::domain::{Message, Pattern, Routine, Source, Value};
use crate::effects;

use super::fsm::{FsmWorkflow, Machine, Transition};
use super::worker_args;

/// action channel → take → fork → delay → take …
///
/// Matches arriving during the delay land in a `sliding(1)` buffer, so only
/// the latest of them is handled once the window is over.
pub struct Throttle {
    window: Duration,
    pattern: Pattern,
    worker: Routine,
    args: Vec<Value>,
    channel: Option<Channel>,
    message: Option<Message>,
}

#[derive(Debug, Clone, Copy)]
pub enum ThrottleState {
    Open,
    Take,
    Fork,
    Wait,
}

impl Throttle {
    pub fn new(
        window: Duration,
        pattern: Pattern,
        worker: &Routine,
        args: Vec<Value>,
    ) -> FsmWorkflow<Self> {
        let name = format!("throttle({}, {})", pattern.describe(), worker.name());
        FsmWorkflow::new(
            name,
            Self {
                window,
                pattern,
                worker: worker.clone(),
                args,
                channel: None,
                message: None,
            },
        )
    }
}

impl Machine for Throttle {
    type State = ThrottleState;

    fn start(&self) -> ThrottleState {
        ThrottleState::Open
    }

    fn transition(&mut self, state: ThrottleState) -> Transition<Self> {
        match state {
            ThrottleState::Open => Transition::then_update(
                ThrottleState::Take,
                effects::action_channel(self.pattern.clone(), Some(BufferSpec::Sliding(1))),
                |m, v| m.channel = v.as_channel().cloned(),
            ),
            ThrottleState::Take => match &self.channel {
                Some(channel) => Transition::then_update(
                    ThrottleState::Fork,
                    effects::take_from(Source::Channel(channel.clone())),
                    |m, v| m.message = v.as_message().cloned(),
                ),
                None => Transition::Halt,
            },
            ThrottleState::Fork => match self.message.take() {
                Some(message) => Transition::to(
                    ThrottleState::Wait,
                    effects::fork(&self.worker, worker_args(&self.args, message)),
                ),
                None => Transition::Halt,
            },
            ThrottleState::Wait => Transition::to(ThrottleState::Take, effects::delay(self.window)),
        }
    }
}
