//! Task driver.
//!
//! A [`Driver`] resumes one workflow with the outcome of its previous effect,
//! runs the next yielded effect and repeats until the workflow finishes. The
//! workflow's main flow and its attached forks form a [`ForkQueue`]; the task
//! ends when that queue completes, aborts or is cancelled.
//!
//! # 再入について
//! `next` の実行中に同期的に解決した effect の結果は `pending` に積まれ、
//! 同じ `next` のループで workflow を再開します。スタックは effect の数に
//! 比例して伸びません。`next` が戻った後に届いた結果だけが新しくループを
//! 始めます。RefCell の borrow を callback の呼び出しをまたいで保持しないこと。

mod combinators;
pub(crate) mod completion;
pub(crate) mod fork_queue;
pub mod task;

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};

use crate::app::config::RuntimeConfig;
use crate::channel::{BufferSpec, Channel, Listener, NoBuffer};
use crate::domain::{
    CancelTarget, Context, Effect, EffectId, Message, Outcome, Returned, Source, Value,
};
use crate::error::SagaError;
use crate::ports::{Dispatched, EffectInfo, Environment, IdGenerator, Level, Logger, Monitor};
use crate::scheduler::Scheduler;
use crate::workflow::{Oneshot, Resume, Step, Workflow};

use self::completion::Completion;
use self::fork_queue::{Cont, ForkQueue, Member};

pub use self::task::Task;

/// Hook receiving errors that escape a root or detached task.
pub type ErrorHook = Rc<dyn Fn(&SagaError)>;

/// Bindings shared by every task of one runtime.
pub(crate) struct Shared {
    pub(crate) env: Rc<dyn Environment>,
    pub(crate) scheduler: Scheduler,
    pub(crate) monitor: Rc<dyn Monitor>,
    pub(crate) logger: Rc<dyn Logger>,
    pub(crate) on_error: Option<ErrorHook>,
    pub(crate) config: RuntimeConfig,
    pub(crate) ids: Rc<dyn IdGenerator>,
}

/// How a new task relates to the task that started it.
pub(crate) struct Parent<'a> {
    pub(crate) context: &'a Context,
    pub(crate) effect_id: Option<EffectId>,
    /// Continuation of a caller waiting on the task, if any.
    pub(crate) cont: Option<Cont>,
    /// Errors of a task without a parent are reported as uncaught.
    pub(crate) attached: bool,
}

/// State of the workflow's own flow, one member of the fork queue.
struct MainFlow {
    name: String,
    running: Cell<bool>,
    cancelled: Cell<bool>,
    cont: RefCell<Option<Cont>>,
    driver: Weak<Driver>,
}

impl MainFlow {
    fn finish(&self, outcome: Outcome) {
        self.running.set(false);
        let cont = self.cont.borrow_mut().take();
        if let Some(cont) = cont {
            cont(outcome);
        }
    }
}

impl Member for MainFlow {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn set_cont(&self, cont: Option<Cont>) {
        *self.cont.borrow_mut() = cont;
    }

    fn cancel(&self) {
        if self.running.get() && !self.cancelled.get() {
            self.cancelled.set(true);
            if let Some(driver) = self.driver.upgrade() {
                driver.next(Ok(Value::Cancelled));
            }
        }
    }
}

pub(crate) struct Driver {
    shared: Rc<Shared>,
    task: Task,
    workflow: RefCell<Box<dyn Workflow>>,
    std_channel: Channel,
    main: Rc<MainFlow>,
    queue: ForkQueue,
    parent_effect: Option<EffectId>,
    /// Completion of the effect the main flow is waiting on.
    current: RefCell<Option<Completion>>,
    /// Set while `next` is on the stack.
    stepping: Cell<bool>,
    /// Outcome that arrived while stepping; picked up by the running loop.
    pending: RefCell<Option<Outcome>>,
    /// Scheduler locks carried over from forks until the next resumption.
    held: Cell<usize>,
}

impl Driver {
    /// Create a task for `workflow` and run it to its first suspension.
    pub(crate) fn start(
        shared: &Rc<Shared>,
        workflow: Box<dyn Workflow>,
        name: &str,
        parent: Parent<'_>,
    ) -> Task {
        let task = Task::new(
            shared.ids.task_id(),
            name.to_string(),
            parent.context.child(),
            parent.cont,
            parent.attached,
        );

        let driver = Rc::new_cyclic(|weak: &Weak<Driver>| {
            let on_done = weak.clone();
            Driver {
                shared: Rc::clone(shared),
                task: task.clone(),
                workflow: RefCell::new(workflow),
                std_channel: std_channel(shared),
                main: Rc::new(MainFlow {
                    name: name.to_string(),
                    running: Cell::new(true),
                    cancelled: Cell::new(false),
                    cont: RefCell::new(None),
                    driver: weak.clone(),
                }),
                queue: ForkQueue::new(move |outcome| {
                    if let Some(driver) = on_done.upgrade() {
                        driver.end(outcome);
                    }
                }),
                parent_effect: parent.effect_id,
                current: RefCell::new(None),
                stepping: Cell::new(false),
                pending: RefCell::new(None),
                held: Cell::new(0),
            }
        });
        driver.queue.add_main(driver.main.clone());
        *task.0.driver.borrow_mut() = Some(Rc::clone(&driver));

        tracing::debug!(task = %task.id(), name = %name, "task started");
        driver.next(Ok(Value::Unit));
        task
    }

    fn log(&self, level: Level, message: &str, error: Option<&SagaError>) {
        self.shared.logger.log(level, message, error);
    }

    fn log_uncaught(&self, error: &SagaError) {
        self.log(
            Level::Error,
            &format!("uncaught at {}", self.task.name()),
            Some(error),
        );
    }

    /// Resume the workflow with the outcome of its previous effect.
    fn next(self: &Rc<Self>, outcome: Outcome) {
        if !self.main.running.get() {
            self.log(
                Level::Warn,
                &format!("{}: resumed after its main flow finished", self.task.name()),
                None,
            );
            return;
        }
        if self.stepping.replace(true) {
            self.defer(outcome);
            return;
        }

        let mut outcome = outcome;
        loop {
            let held = self.held.replace(0);
            self.step(outcome);
            self.release(held);
            let pending = self.pending.borrow_mut().take();
            match pending {
                Some(next) if self.main.running.get() => outcome = next,
                _ => break,
            }
        }
        self.stepping.set(false);
        let held = self.held.replace(0);
        self.release(held);
    }

    fn release(&self, locks: usize) {
        for _ in 0..locks {
            self.shared.scheduler.flush();
        }
    }

    /// Keep an outcome for the loop already running in `next`.
    ///
    /// Cancellation takes effect at once: the awaited effect is cancelled so
    /// its late settle is ignored, and it replaces any outcome not yet seen.
    fn defer(&self, outcome: Outcome) {
        let mut pending = self.pending.borrow_mut();
        if matches!(*pending, Some(Ok(Value::Cancelled))) {
            return;
        }
        let cancelling = matches!(outcome, Ok(Value::Cancelled));
        *pending = Some(outcome);
        drop(pending);
        if cancelling {
            self.main.cancelled.set(true);
            let current = self.current.borrow_mut().take();
            if let Some(current) = current {
                current.cancel();
            }
        }
    }

    /// One resumption: feed `outcome` to the workflow and run what it yields.
    fn step(self: &Rc<Self>, outcome: Outcome) {
        let input = match outcome {
            Err(error) if error.is_internal() => {
                self.main.finish(Err(error));
                return;
            }
            Err(error) => Resume::Throw(error),
            Ok(Value::Cancelled) => {
                self.main.cancelled.set(true);
                let current = self.current.borrow_mut().take();
                if let Some(current) = current {
                    current.cancel();
                }
                Resume::Cancel
            }
            Ok(Value::End) => Resume::End,
            Ok(value) => Resume::Next(value),
        };

        let step = match self.workflow.try_borrow_mut() {
            Ok(mut workflow) => workflow.resume(input),
            Err(_) => Step::Throw(SagaError::internal(format!(
                "{}: workflow resumed while already running",
                self.task.name()
            ))),
        };

        match step {
            Step::Yield(effect) => {
                let driver = Rc::clone(self);
                let done = Completion::new(move |outcome| driver.next(outcome));
                *self.current.borrow_mut() = Some(done.clone());
                self.run_effect(effect, done, self.parent_effect, "");
            }
            Step::Return(value) => {
                let value = if self.main.cancelled.get() {
                    Value::Cancelled
                } else {
                    value
                };
                self.main.finish(Ok(value));
            }
            Step::Throw(error) => {
                if self.main.cancelled.get() && self.shared.config.log_cancellation_errors {
                    self.log_uncaught(&error);
                }
                self.main.finish(Err(error));
            }
        }
    }

    /// Cancel the whole task: forks, main flow, then finish as cancelled.
    pub(crate) fn cancel(self: &Rc<Self>) {
        if self.task.is_running() && !self.task.is_cancelled() {
            tracing::debug!(task = %self.task.id(), members = ?self.queue.names(), "cancelling task");
            self.task.0.cancelled.set(true);
            self.queue.cancel_all();
            self.end(Ok(Value::Cancelled));
        }
    }

    fn end(self: &Rc<Self>, outcome: Outcome) {
        if !self.task.is_running() {
            return;
        }
        self.task.0.running.set(false);
        if let Err(error) = self.std_channel.close() {
            self.log(Level::Error, "failed to close the std channel", Some(&error));
        }
        if let Err(error) = &outcome {
            if !self.task.0.has_parent {
                match &self.shared.on_error {
                    Some(hook) => hook(error),
                    None => self.log_uncaught(error),
                }
            }
        }
        tracing::debug!(
            task = %self.task.id(),
            name = %self.task.name(),
            ok = outcome.is_ok(),
            "task finished"
        );
        self.task.finish(outcome);
    }

    /// Run one effect and settle `done` with its outcome.
    ///
    /// `done` is settled at most once; cancelling it cancels the effect.
    fn run_effect(
        self: &Rc<Self>,
        effect: Effect,
        done: Completion,
        parent_id: Option<EffectId>,
        label: &str,
    ) {
        let effect_id = self.shared.ids.effect_id();
        self.shared.monitor.effect_triggered(&EffectInfo {
            effect_id,
            parent_id,
            label: label.to_string(),
            kind: effect.kind(),
            description: effect.describe(),
        });

        let cb = {
            let monitor = Rc::clone(&self.shared.monitor);
            let done = done.clone();
            Completion::new(move |outcome| {
                monitor.effect_settled(effect_id, &outcome);
                done.settle(outcome);
            })
        };
        {
            let cb = cb.clone();
            let monitor = Rc::clone(&self.shared.monitor);
            done.on_cancel(move || {
                cb.cancel();
                monitor.effect_cancelled(effect_id);
            });
        }

        match effect {
            Effect::Take { source, trap_end } => self.run_take(source, trap_end, cb),
            Effect::Put {
                channel,
                message,
                resolve,
            } => self.run_put(channel, message, resolve, cb),
            Effect::Call { routine, args } => match routine.invoke(args) {
                Err(error) => cb.settle(Err(error)),
                Ok(Returned::Ready(value)) => cb.settle(Ok(value)),
                Ok(Returned::Later(future)) => resolve_future(future, cb),
                Ok(Returned::Workflow(workflow)) => {
                    let settle = cb.clone();
                    let task = Driver::start(
                        &self.shared,
                        workflow,
                        routine.name(),
                        Parent {
                            context: self.task.context(),
                            effect_id: Some(effect_id),
                            cont: Some(Box::new(move |outcome| settle.settle(outcome))),
                            attached: true,
                        },
                    );
                    if task.is_running() {
                        cb.on_cancel(move || task.cancel());
                    }
                }
            },
            Effect::Cps { routine, args } => {
                let settle = cb.clone();
                match routine.invoke(args, Box::new(move |outcome| settle.settle(outcome))) {
                    Err(error) => cb.settle(Err(error)),
                    Ok(Some(hook)) => cb.on_cancel(hook),
                    Ok(None) => {}
                }
            }
            Effect::Fork {
                routine,
                args,
                detached,
            } => {
                let workflow: Box<dyn Workflow> = match routine.invoke(args) {
                    Ok(Returned::Workflow(workflow)) => workflow,
                    Ok(Returned::Ready(value)) => Box::new(Oneshot::Ready(value)),
                    Ok(Returned::Later(future)) => Box::new(Oneshot::Awaiting(future)),
                    Err(error) => Box::new(Oneshot::Failed(error)),
                };
                self.run_fork(workflow, routine.name(), detached, effect_id, cb);
            }
            Effect::Join(task) => {
                if task.is_running() {
                    if let Some(key) = task.add_joiner(cb.clone()) {
                        cb.on_cancel(move || task.remove_joiner(key));
                    }
                } else if let Some(error) = task.error() {
                    cb.settle(Err(error));
                } else {
                    cb.settle(Ok(task.result().unwrap_or_default()));
                }
            }
            Effect::Cancel(target) => {
                let task = match target {
                    CancelTarget::Task(task) => task,
                    CancelTarget::Current => self.task.clone(),
                };
                if task.is_running() {
                    task.cancel();
                }
                cb.settle(Ok(Value::Unit));
            }
            Effect::All(keyed) => combinators::run_all(self, keyed, effect_id, cb),
            Effect::Race(keyed) => combinators::run_race(self, keyed, effect_id, cb),
            Effect::ActionChannel { pattern, buffer } => {
                let buffer =
                    buffer.unwrap_or(BufferSpec::Fixed(self.shared.config.default_buffer_limit));
                let env = Rc::clone(&self.shared.env);
                let channel = Channel::from_source(
                    move |listener| env.subscribe(listener),
                    buffer,
                    Some(pattern.matcher()),
                );
                cb.settle(channel.map(Value::Channel));
            }
            Effect::Select(selector) => cb.settle(selector(&self.shared.env.state())),
            Effect::GetContext(key) => {
                cb.settle(Ok(self.task.context().get(&key).unwrap_or_default()));
            }
            Effect::SetContext(props) => {
                self.task.context().merge(props);
                cb.settle(Ok(Value::Unit));
            }
            Effect::Flush(channel) => cb.settle(match channel.flush() {
                Ok(Some(messages)) => Ok(Value::List(
                    messages.into_iter().map(Value::Message).collect(),
                )),
                Ok(None) => Ok(Value::Message(Message::end())),
                Err(error) => Err(error),
            }),
            Effect::Cancelled => cb.settle(Ok(Value::data(self.main.cancelled.get()))),
            Effect::Await(future) => resolve_future(future, cb),
        }
    }

    fn run_take(&self, source: Source, trap_end: bool, cb: Completion) {
        let (channel, matcher) = match source {
            Source::Pattern(pattern) => (self.std_channel.clone(), Some(pattern.matcher())),
            Source::Channel(channel) => (channel, None),
        };
        let settle = cb.clone();
        let taken = channel.take(
            move |message: Message| {
                if message.is_end() && !trap_end {
                    settle.settle(Ok(Value::End));
                } else {
                    settle.settle(Ok(Value::Message(message)));
                }
            },
            matcher,
        );
        match taken {
            Err(error) => cb.settle(Err(error)),
            Ok(Some(id)) => cb.on_cancel(move || channel.abandon(id)),
            Ok(None) => {}
        }
    }

    /// Puts run as scheduler jobs, so a put issued while another job runs is
    /// delivered after it.
    fn run_put(
        self: &Rc<Self>,
        channel: Option<Channel>,
        message: Message,
        resolve: bool,
        cb: Completion,
    ) {
        let driver = Rc::clone(self);
        self.shared.scheduler.asap(move || {
            let delivered = match &channel {
                Some(channel) => channel.put(message).map(|()| Dispatched::Done(Value::Unit)),
                None => driver.shared.env.dispatch(message.mark_from_workflow()),
            };
            match delivered {
                Err(error) if channel.is_some() || resolve => cb.settle(Err(error)),
                Err(error) => {
                    driver.log(Level::Error, "dispatch failed", Some(&error));
                    cb.settle(Ok(Value::Unit));
                }
                Ok(Dispatched::Pending(future)) if resolve => resolve_future(future, cb),
                Ok(Dispatched::Pending(_)) => cb.settle(Ok(Value::Unit)),
                Ok(Dispatched::Done(value)) => cb.settle(Ok(value)),
            }
        });
    }

    /// The child runs to its first suspension while the scheduler is held,
    /// so puts it issues are delivered only after the parent has resumed
    /// with the fork's result.
    fn run_fork(
        self: &Rc<Self>,
        workflow: Box<dyn Workflow>,
        name: &str,
        detached: bool,
        effect_id: EffectId,
        cb: Completion,
    ) {
        let _hold = self.shared.scheduler.hold();
        let child = Driver::start(
            &self.shared,
            workflow,
            name,
            Parent {
                context: self.task.context(),
                effect_id: Some(effect_id),
                cont: None,
                attached: !detached,
            },
        );

        if self.stepping.get() {
            // 親が fork の結果で再開するまで配送を止めておく
            self.shared.scheduler.suspend();
            self.held.set(self.held.get() + 1);
        }

        if detached {
            cb.settle(Ok(Value::Task(child)));
        } else if child.is_running() {
            self.queue.add(Rc::new(child.clone()));
            cb.settle(Ok(Value::Task(child)));
        } else if let Some(error) = child.error() {
            self.queue.abort(error);
        } else {
            cb.settle(Ok(Value::Task(child)));
        }
    }
}

/// Settle `cb` when `future` completes; cancelling `cb` aborts the future.
fn resolve_future(future: crate::domain::LocalFuture<Outcome>, cb: Completion) {
    let settle = cb.clone();
    let handle = tokio::task::spawn_local(async move {
        let outcome = future.await;
        settle.settle(outcome);
    });
    cb.on_cancel(move || handle.abort());
}

/// Per-task view of the environment's messages.
///
/// Messages put by workflows are delivered synchronously; anything else
/// goes through the scheduler so it never interleaves with a running job.
fn std_channel(shared: &Rc<Shared>) -> Channel {
    let env = Rc::clone(&shared.env);
    let weak: Weak<Shared> = Rc::downgrade(shared);
    Channel::subscribed(
        move |inner: Listener| {
            env.subscribe(Rc::new(move |message: Message| {
                if message.is_from_workflow() {
                    return inner(message);
                }
                let Some(shared) = weak.upgrade() else {
                    return Ok(());
                };
                let inner = Rc::clone(&inner);
                let logger = Rc::clone(&shared.logger);
                shared.scheduler.asap(move || {
                    if let Err(error) = inner(message) {
                        logger.log(Level::Error, "failed to deliver a message", Some(&error));
                    }
                });
                Ok(())
            }))
        },
        Box::new(NoBuffer),
        None,
    )
}

#[cfg(test)]
mod tests;
