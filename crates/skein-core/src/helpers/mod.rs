//! Recurring-effect helpers built from small state machines.
//!
//! Each helper is a [`Machine`](fsm::Machine) driven by [`FsmWorkflow`]; the
//! effect constructors in [`crate::effects`] fork them as tasks named after
//! the pattern and worker, e.g. `takeLatest(FETCH, fetch_user)`.

pub mod fsm;
mod take_every;
mod take_latest;
mod throttle;

pub use self::fsm::{FsmWorkflow, Machine, Transition};
pub use self::take_every::TakeEvery;
pub use self::take_latest::TakeLatest;
pub use self::throttle::Throttle;

use crate::domain::{Message, Value};

/// Worker arguments: the helper's own arguments followed by the message.
fn worker_args(args: &[Value], message: Message) -> Vec<Value> {
    let mut all = Vec::with_capacity(args.len() + 1);
    all.extend_from_slice(args);
    all.push(Value::Message(message));
    all
}
