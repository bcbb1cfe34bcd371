//! Task handle: the public face of one driven workflow.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::Rc;

use tokio::sync::watch;

use crate::domain::{Context, Outcome, TaskId, Value};
use crate::error::SagaError;

use super::completion::Completion;
use super::fork_queue::{Cont, Member};
use super::Driver;

pub(crate) struct TaskInner {
    pub(crate) id: TaskId,
    pub(crate) name: String,
    pub(crate) context: Context,
    pub(crate) running: Cell<bool>,
    pub(crate) cancelled: Cell<bool>,
    pub(crate) aborted: Cell<bool>,
    pub(crate) result: RefCell<Option<Value>>,
    pub(crate) error: RefCell<Option<SagaError>>,
    /// Continuation of whoever waits on this task (fork queue or caller).
    pub(crate) cont: RefCell<Option<Cont>>,
    /// Root and detached tasks have none; their uncaught errors are reported.
    pub(crate) has_parent: bool,
    joiners: RefCell<Option<Vec<(u64, Completion)>>>,
    next_joiner: Cell<u64>,
    done: watch::Sender<Option<Outcome>>,
    pub(crate) driver: RefCell<Option<Rc<Driver>>>,
}

/// Cheap, cloneable handle to a task.
#[derive(Clone)]
pub struct Task(pub(crate) Rc<TaskInner>);

impl Task {
    pub(crate) fn new(
        id: TaskId,
        name: String,
        context: Context,
        cont: Option<Cont>,
        has_parent: bool,
    ) -> Self {
        let (done, _) = watch::channel(None);
        Task(Rc::new(TaskInner {
            id,
            name,
            context,
            running: Cell::new(true),
            cancelled: Cell::new(false),
            aborted: Cell::new(false),
            result: RefCell::new(None),
            error: RefCell::new(None),
            cont: RefCell::new(cont),
            has_parent,
            joiners: RefCell::new(Some(Vec::new())),
            next_joiner: Cell::new(0),
            done,
            driver: RefCell::new(None),
        }))
    }

    pub fn id(&self) -> TaskId {
        self.0.id
    }

    pub fn name(&self) -> &str {
        &self.0.name
    }

    pub fn is_running(&self) -> bool {
        self.0.running.get()
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.cancelled.get()
    }

    pub fn is_aborted(&self) -> bool {
        self.0.aborted.get()
    }

    /// Final value; `None` while running or when the task failed.
    pub fn result(&self) -> Option<Value> {
        self.0.result.borrow().clone()
    }

    pub fn error(&self) -> Option<SagaError> {
        self.0.error.borrow().clone()
    }

    /// Cancel the task and everything attached to it. No-op once terminal.
    pub fn cancel(&self) {
        let driver = self.0.driver.borrow().clone();
        if let Some(driver) = driver {
            driver.cancel();
        }
    }

    /// Merge `props` into the task's own context scope.
    pub fn set_context<K: Into<String>>(&self, props: impl IntoIterator<Item = (K, Value)>) {
        self.0
            .context
            .merge(props.into_iter().map(|(k, v)| (k.into(), v)));
    }

    pub fn context(&self) -> &Context {
        &self.0.context
    }

    /// Resolves once with the task's outcome (a cancelled task yields
    /// `Ok(Value::Cancelled)`).
    pub async fn done(&self) -> Outcome {
        let mut rx = self.0.done.subscribe();
        let settled = rx.wait_for(Option::is_some).await.map(|v| v.clone());
        match settled {
            Ok(Some(outcome)) => outcome,
            _ => Err(SagaError::internal("task finished without an outcome")),
        }
    }

    pub(crate) fn add_joiner(&self, joiner: Completion) -> Option<u64> {
        let key = self.0.next_joiner.get();
        let mut joiners = self.0.joiners.borrow_mut();
        let list = joiners.as_mut()?;
        self.0.next_joiner.set(key + 1);
        list.push((key, joiner));
        Some(key)
    }

    pub(crate) fn remove_joiner(&self, key: u64) {
        if let Some(list) = self.0.joiners.borrow_mut().as_mut() {
            list.retain(|(k, _)| *k != key);
        }
    }

    /// Record the terminal outcome and notify everyone waiting, exactly once.
    pub(crate) fn finish(&self, outcome: Outcome) {
        match &outcome {
            Ok(value) => *self.0.result.borrow_mut() = Some(value.clone()),
            Err(error) => {
                *self.0.error.borrow_mut() = Some(error.clone());
                self.0.aborted.set(true);
            }
        }
        self.0.done.send_replace(Some(outcome.clone()));

        let cont = self.0.cont.borrow_mut().take();
        if let Some(cont) = cont {
            cont(outcome.clone());
        }
        let joiners = self.0.joiners.borrow_mut().take().unwrap_or_default();
        for (_, joiner) in joiners {
            joiner.settle(outcome.clone());
        }
        self.0.driver.borrow_mut().take();
    }
}

impl Member for Task {
    fn name(&self) -> String {
        self.0.name.clone()
    }

    fn set_cont(&self, cont: Option<Cont>) {
        *self.0.cont.borrow_mut() = cont;
    }

    fn cancel(&self) {
        Task::cancel(self);
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Task")
            .field("id", &self.0.id.to_string())
            .field("name", &self.0.name)
            .field("running", &self.is_running())
            .field("cancelled", &self.is_cancelled())
            .field("aborted", &self.is_aborted())
            .finish()
    }
}
