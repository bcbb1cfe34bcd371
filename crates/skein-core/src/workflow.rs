//! Resumable workflows.
//!
//! A [`Workflow`] is driven one step at a time: the driver resumes it with
//! the outcome of the previous effect and receives the next effect, a final
//! value or an error.
//!
//! Two ways to write one:
//! - implement [`Workflow`] by hand (an explicit state machine, see
//!   [`crate::helpers::fsm`]);
//! - write an `async` block against [`Cx`] and wrap it in a [`Coroutine`]
//!   (usually through [`Routine::saga`](crate::domain::Routine::saga)).
//!
//! # Coroutine の制約
//! Coroutine は no-op waker で poll されます。`await` してよいのは [`Cx`] が返す
//! future だけです。外部の future (timer, I/O) は [`Cx::await_future`] か
//! [`Cx::delay`] を通して effect として yield してください。

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context as PollContext, Poll, Waker};
use std::time::Duration;

use thiserror::Error;

use crate::channel::{BufferSpec, Channel};
use crate::domain::{
    CpsRoutine, Effect, Keyed, LocalFuture, Message, Outcome, Pattern, Routine, Source, Value,
};
use crate::effects;
use crate::error::SagaError;
use crate::proc::Task;

/// What the driver resumes a workflow with.
#[derive(Debug)]
pub enum Resume {
    /// The previous effect resolved (the very first resume carries `Unit`).
    Next(Value),
    /// The previous effect failed.
    Throw(SagaError),
    /// The task is being cancelled; run cleanup, then return.
    Cancel,
    /// A take observed END; return.
    End,
}

/// What a workflow hands back to the driver.
#[derive(Debug)]
pub enum Step {
    Yield(Effect),
    Return(Value),
    Throw(SagaError),
}

pub trait Workflow {
    fn resume(&mut self, input: Resume) -> Step;
}

impl<F> Workflow for F
where
    F: FnMut(Resume) -> Step,
{
    fn resume(&mut self, input: Resume) -> Step {
        self(input)
    }
}

/// Why an effect did not produce a value inside a [`Coroutine`].
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Interrupt {
    #[error(transparent)]
    Failed(#[from] SagaError),

    /// The task is being cancelled. Effects run after this still work.
    #[error("task cancelled")]
    Cancelled,

    /// A take observed END.
    #[error("source terminated")]
    Terminated,
}

#[derive(Default)]
struct Exchange {
    effect: RefCell<Option<Effect>>,
    input: RefCell<Option<Resume>>,
}

/// Adapts an `async` block into a [`Workflow`].
pub struct Coroutine {
    future: Option<LocalFuture<Result<Value, Interrupt>>>,
    exchange: Rc<Exchange>,
    started: bool,
}

impl Coroutine {
    pub fn new<F>(body: impl FnOnce(Cx) -> F) -> Self
    where
        F: Future<Output = Result<Value, Interrupt>> + 'static,
    {
        let exchange = Rc::new(Exchange::default());
        let cx = Cx {
            exchange: Rc::clone(&exchange),
        };
        Self {
            future: Some(Box::pin(body(cx))),
            exchange,
            started: false,
        }
    }
}

impl Workflow for Coroutine {
    fn resume(&mut self, input: Resume) -> Step {
        let Some(future) = self.future.as_mut() else {
            return Step::Throw(SagaError::validation("coroutine resumed after it finished"));
        };
        if self.started {
            *self.exchange.input.borrow_mut() = Some(input);
        }
        self.started = true;

        let mut cx = PollContext::from_waker(Waker::noop());
        match future.as_mut().poll(&mut cx) {
            Poll::Pending => {
                self.exchange.input.borrow_mut().take();
                match self.exchange.effect.borrow_mut().take() {
                    Some(effect) => Step::Yield(effect),
                    None => {
                        self.future = None;
                        Step::Throw(SagaError::validation(
                            "coroutine suspended outside an effect",
                        ))
                    }
                }
            }
            Poll::Ready(result) => {
                self.future = None;
                match result {
                    Ok(value) => Step::Return(value),
                    Err(Interrupt::Failed(e)) => Step::Throw(e),
                    Err(Interrupt::Cancelled | Interrupt::Terminated) => Step::Return(Value::Unit),
                }
            }
        }
    }
}

/// Yields one effect, then resolves with its outcome.
pub struct Suspend {
    exchange: Rc<Exchange>,
    effect: Option<Effect>,
}

impl Future for Suspend {
    type Output = Result<Value, Interrupt>;

    fn poll(mut self: Pin<&mut Self>, _cx: &mut PollContext<'_>) -> Poll<Self::Output> {
        if let Some(effect) = self.effect.take() {
            *self.exchange.effect.borrow_mut() = Some(effect);
            return Poll::Pending;
        }
        let input = self.exchange.input.borrow_mut().take();
        match input {
            Some(Resume::Next(value)) => Poll::Ready(Ok(value)),
            Some(Resume::Throw(e)) => Poll::Ready(Err(Interrupt::Failed(e))),
            Some(Resume::Cancel) => Poll::Ready(Err(Interrupt::Cancelled)),
            Some(Resume::End) => Poll::Ready(Err(Interrupt::Terminated)),
            None => Poll::Pending,
        }
    }
}

/// Handle a coroutine body uses to yield effects.
#[derive(Clone)]
pub struct Cx {
    exchange: Rc<Exchange>,
}

fn unexpected(what: &str, got: &Value) -> Interrupt {
    Interrupt::Failed(SagaError::internal(format!("expected {what}, got {got:?}")))
}

impl Cx {
    /// Yield `effect` and wait for its outcome.
    pub fn run(&self, effect: Effect) -> Suspend {
        Suspend {
            exchange: Rc::clone(&self.exchange),
            effect: Some(effect),
        }
    }

    /// Next message matching `pattern` on the task's std channel.
    pub async fn take(&self, pattern: impl Into<Pattern>) -> Result<Message, Interrupt> {
        let value = self.run(effects::take(pattern)).await?;
        match value {
            Value::Message(m) => Ok(m),
            other => Err(unexpected("a message", &other)),
        }
    }

    /// Like [`Cx::take`] but END comes back as a message instead of ending the task.
    pub async fn take_maybe(&self, pattern: impl Into<Pattern>) -> Result<Message, Interrupt> {
        let value = self.run(effects::take_maybe(pattern)).await?;
        match value {
            Value::Message(m) => Ok(m),
            other => Err(unexpected("a message", &other)),
        }
    }

    pub async fn take_from(&self, channel: &Channel) -> Result<Message, Interrupt> {
        let value = self
            .run(effects::take_from(Source::Channel(channel.clone())))
            .await?;
        match value {
            Value::Message(m) => Ok(m),
            other => Err(unexpected("a message", &other)),
        }
    }

    pub async fn put(&self, message: Message) -> Result<Value, Interrupt> {
        self.run(effects::put(message)).await
    }

    pub async fn put_to(&self, channel: &Channel, message: Message) -> Result<Value, Interrupt> {
        self.run(effects::put_to(channel, message)).await
    }

    pub async fn put_resolve(&self, message: Message) -> Result<Value, Interrupt> {
        self.run(effects::put_resolve(message)).await
    }

    pub async fn call(&self, routine: &Routine, args: Vec<Value>) -> Result<Value, Interrupt> {
        self.run(effects::call(routine, args)).await
    }

    pub async fn cps(&self, routine: &CpsRoutine, args: Vec<Value>) -> Result<Value, Interrupt> {
        self.run(effects::cps(routine, args)).await
    }

    pub async fn fork(&self, routine: &Routine, args: Vec<Value>) -> Result<Task, Interrupt> {
        let value = self.run(effects::fork(routine, args)).await?;
        match value {
            Value::Task(task) => Ok(task),
            other => Err(unexpected("a task", &other)),
        }
    }

    pub async fn spawn(&self, routine: &Routine, args: Vec<Value>) -> Result<Task, Interrupt> {
        let value = self.run(effects::spawn(routine, args)).await?;
        match value {
            Value::Task(task) => Ok(task),
            other => Err(unexpected("a task", &other)),
        }
    }

    pub async fn join(&self, task: &Task) -> Result<Value, Interrupt> {
        self.run(effects::join(task)).await
    }

    pub async fn cancel(&self, task: &Task) -> Result<(), Interrupt> {
        self.run(effects::cancel(task)).await.map(drop)
    }

    pub async fn cancel_self(&self) -> Result<(), Interrupt> {
        self.run(effects::cancel_self()).await.map(drop)
    }

    pub async fn all(&self, effects: Keyed) -> Result<Value, Interrupt> {
        self.run(effects::all(effects)).await
    }

    pub async fn race(&self, effects: Keyed) -> Result<Value, Interrupt> {
        self.run(effects::race(effects)).await
    }

    pub async fn select(
        &self,
        selector: impl Fn(&serde_json::Value) -> Result<Value, SagaError> + 'static,
    ) -> Result<Value, Interrupt> {
        self.run(effects::select(selector)).await
    }

    pub async fn action_channel(
        &self,
        pattern: impl Into<Pattern>,
        buffer: Option<BufferSpec>,
    ) -> Result<Channel, Interrupt> {
        let value = self.run(effects::action_channel(pattern, buffer)).await?;
        match value {
            Value::Channel(chan) => Ok(chan),
            other => Err(unexpected("a channel", &other)),
        }
    }

    pub async fn flush(&self, channel: &Channel) -> Result<Value, Interrupt> {
        self.run(effects::flush(channel)).await
    }

    pub async fn cancelled(&self) -> Result<bool, Interrupt> {
        let value = self.run(effects::cancelled()).await?;
        Ok(value.as_bool().unwrap_or(false))
    }

    pub async fn get_context(&self, key: &str) -> Result<Value, Interrupt> {
        self.run(effects::get_context(key)).await
    }

    pub async fn set_context<K: Into<String>>(
        &self,
        props: impl IntoIterator<Item = (K, Value)>,
    ) -> Result<(), Interrupt> {
        self.run(effects::set_context(props)).await.map(drop)
    }

    pub async fn delay(&self, duration: Duration) -> Result<(), Interrupt> {
        self.run(effects::delay(duration)).await.map(drop)
    }

    /// Await a real future through the driver.
    pub async fn await_future<F>(&self, future: F) -> Result<Value, Interrupt>
    where
        F: Future<Output = Outcome> + 'static,
    {
        self.run(Effect::Await(Box::pin(future))).await
    }
}

/// One-step workflow wrapping a routine that did not return a workflow.
pub(crate) enum Oneshot {
    Ready(Value),
    Failed(SagaError),
    Awaiting(LocalFuture<Outcome>),
    Waiting,
    Done,
}

impl Workflow for Oneshot {
    fn resume(&mut self, input: Resume) -> Step {
        match std::mem::replace(self, Oneshot::Done) {
            Oneshot::Ready(value) => Step::Return(value),
            Oneshot::Failed(error) => Step::Throw(error),
            Oneshot::Awaiting(future) => {
                *self = Oneshot::Waiting;
                Step::Yield(Effect::Await(future))
            }
            Oneshot::Waiting => match input {
                Resume::Next(value) => Step::Return(value),
                Resume::Throw(error) => Step::Throw(error),
                Resume::Cancel | Resume::End => Step::Return(Value::Unit),
            },
            Oneshot::Done => Step::Return(Value::Unit),
        }
    }
}
