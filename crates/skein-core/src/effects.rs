//! Effect constructors.
//!
//! Each function builds one [`Effect`]; nothing runs until a workflow yields it.

use std::rc::Rc;
use std::time::Duration;

use crate::channel::{BufferSpec, Channel};
use crate::domain::{
    CancelTarget, CpsRoutine, Effect, Keyed, Message, Pattern, Routine, Source, Value,
};
use crate::error::SagaError;
use crate::helpers::{TakeEvery, TakeLatest, Throttle};
use crate::proc::Task;

/// Wait for the next message matching `pattern`. END terminates the workflow.
pub fn take(pattern: impl Into<Pattern>) -> Effect {
    Effect::Take {
        source: Source::Pattern(pattern.into()),
        trap_end: false,
    }
}

/// Like [`take`], but END is delivered as an ordinary message.
pub fn take_maybe(pattern: impl Into<Pattern>) -> Effect {
    Effect::Take {
        source: Source::Pattern(pattern.into()),
        trap_end: true,
    }
}

/// Take from an explicit source (a pattern on the std channel, or a channel).
pub fn take_from(source: impl Into<Source>) -> Effect {
    Effect::Take {
        source: source.into(),
        trap_end: false,
    }
}

/// Dispatch through the environment.
pub fn put(message: Message) -> Effect {
    Effect::Put {
        channel: None,
        message,
        resolve: false,
    }
}

pub fn put_to(channel: &Channel, message: Message) -> Effect {
    Effect::Put {
        channel: Some(channel.clone()),
        message,
        resolve: false,
    }
}

/// Dispatch and wait for the environment's acknowledgement, failing with its error.
pub fn put_resolve(message: Message) -> Effect {
    Effect::Put {
        channel: None,
        message,
        resolve: true,
    }
}

pub fn call(routine: &Routine, args: Vec<Value>) -> Effect {
    Effect::Call {
        routine: routine.clone(),
        args,
    }
}

pub fn cps(routine: &CpsRoutine, args: Vec<Value>) -> Effect {
    Effect::Cps {
        routine: routine.clone(),
        args,
    }
}

/// Start an attached child task.
pub fn fork(routine: &Routine, args: Vec<Value>) -> Effect {
    Effect::Fork {
        routine: routine.clone(),
        args,
        detached: false,
    }
}

/// Start a detached task: its errors and cancellation stay its own.
pub fn spawn(routine: &Routine, args: Vec<Value>) -> Effect {
    Effect::Fork {
        routine: routine.clone(),
        args,
        detached: true,
    }
}

pub fn join(task: &Task) -> Effect {
    Effect::Join(task.clone())
}

pub fn cancel(task: &Task) -> Effect {
    Effect::Cancel(CancelTarget::Task(task.clone()))
}

pub fn cancel_self() -> Effect {
    Effect::Cancel(CancelTarget::Current)
}

pub fn all(effects: Keyed) -> Effect {
    Effect::All(effects)
}

pub fn race(effects: Keyed) -> Effect {
    Effect::Race(effects)
}

pub fn select(
    selector: impl Fn(&serde_json::Value) -> Result<Value, SagaError> + 'static,
) -> Effect {
    Effect::Select(Rc::new(selector))
}

/// Queue matching messages into a channel of their own.
pub fn action_channel(pattern: impl Into<Pattern>, buffer: Option<BufferSpec>) -> Effect {
    Effect::ActionChannel {
        pattern: pattern.into(),
        buffer,
    }
}

pub fn flush(channel: &Channel) -> Effect {
    Effect::Flush(channel.clone())
}

/// Whether the running task is being cancelled.
pub fn cancelled() -> Effect {
    Effect::Cancelled
}

pub fn get_context(key: impl Into<String>) -> Effect {
    Effect::GetContext(key.into())
}

pub fn set_context<K: Into<String>>(props: impl IntoIterator<Item = (K, Value)>) -> Effect {
    Effect::SetContext(props.into_iter().map(|(k, v)| (k.into(), v)).collect())
}

/// Resolve after `duration`. Needs a tokio `LocalSet`.
pub fn delay(duration: Duration) -> Effect {
    Effect::Await(Box::pin(async move {
        tokio::time::sleep(duration).await;
        Ok(Value::Unit)
    }))
}

/// Fork `worker` for every message matching `pattern`.
pub fn take_every(pattern: impl Into<Pattern>, worker: &Routine, args: Vec<Value>) -> Effect {
    let pattern = pattern.into();
    let name = format!("takeEvery({}, {})", pattern.describe(), worker.name());
    let worker = worker.clone();
    let helper = Routine::workflow(name, move |_| {
        TakeEvery::new(pattern.clone(), &worker, args.clone())
    });
    fork(&helper, Vec::new())
}

/// Fork `worker` per match, cancelling the previous run if still going.
pub fn take_latest(pattern: impl Into<Pattern>, worker: &Routine, args: Vec<Value>) -> Effect {
    let pattern = pattern.into();
    let name = format!("takeLatest({}, {})", pattern.describe(), worker.name());
    let worker = worker.clone();
    let helper = Routine::workflow(name, move |_| {
        TakeLatest::new(pattern.clone(), &worker, args.clone())
    });
    fork(&helper, Vec::new())
}

/// Fork `worker` for a match, then ignore matches for `window`, keeping the latest one.
pub fn throttle(
    window: Duration,
    pattern: impl Into<Pattern>,
    worker: &Routine,
    args: Vec<Value>,
) -> Effect {
    let pattern = pattern.into();
    let name = format!("throttle({}, {})", pattern.describe(), worker.name());
    let worker = worker.clone();
    let helper = Routine::workflow(name, move |_| {
        Throttle::new(window, pattern.clone(), &worker, args.clone())
    });
    fork(&helper, Vec::new())
}
