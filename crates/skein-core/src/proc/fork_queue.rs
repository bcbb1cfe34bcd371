//! A task's main flow and its attached forks, completing or aborting as one.
//!
//! - completes once every member has completed; the result is the main flow's
//! - the first member error aborts: every other member is cancelled and the
//!   error is reported once
//! - `cancel_all` cancels every live member without reporting anything

use std::cell::{Cell, RefCell};
use std::rc::Rc;

use crate::domain::{Outcome, Value};
use crate::error::SagaError;

pub(crate) type Cont = Box<dyn FnOnce(Outcome)>;

/// Something the queue waits on.
pub(crate) trait Member {
    fn name(&self) -> String;

    /// Install (or clear) the continuation called when the member finishes.
    fn set_cont(&self, cont: Option<Cont>);

    fn cancel(&self);
}

struct Inner {
    members: RefCell<Vec<(u64, Rc<dyn Member>)>>,
    next_key: Cell<u64>,
    main_key: Cell<Option<u64>>,
    result: RefCell<Value>,
    completed: Cell<bool>,
    on_done: RefCell<Option<Cont>>,
}

#[derive(Clone)]
pub(crate) struct ForkQueue(Rc<Inner>);

impl ForkQueue {
    pub(crate) fn new(on_done: impl FnOnce(Outcome) + 'static) -> Self {
        ForkQueue(Rc::new(Inner {
            members: RefCell::new(Vec::new()),
            next_key: Cell::new(0),
            main_key: Cell::new(None),
            result: RefCell::new(Value::Unit),
            completed: Cell::new(false),
            on_done: RefCell::new(Some(Box::new(on_done))),
        }))
    }

    /// Add the main flow; its value becomes the queue's result.
    pub(crate) fn add_main(&self, member: Rc<dyn Member>) {
        let key = self.add(member);
        self.0.main_key.set(Some(key));
    }

    pub(crate) fn add(&self, member: Rc<dyn Member>) -> u64 {
        let key = self.0.next_key.get();
        self.0.next_key.set(key + 1);
        self.0.members.borrow_mut().push((key, Rc::clone(&member)));

        let queue = self.clone();
        member.set_cont(Some(Box::new(move |outcome| queue.member_done(key, outcome))));
        key
    }

    fn member_done(&self, key: u64, outcome: Outcome) {
        if self.0.completed.get() {
            return;
        }
        let removed = {
            let mut members = self.0.members.borrow_mut();
            let index = members.iter().position(|(k, _)| *k == key);
            index.map(|i| members.remove(i))
        };
        if let Some((_, member)) = removed {
            member.set_cont(None);
        }

        match outcome {
            Err(error) => self.abort(error),
            Ok(value) => {
                if self.0.main_key.get() == Some(key) {
                    *self.0.result.borrow_mut() = value;
                }
                if self.0.members.borrow().is_empty() {
                    self.0.completed.set(true);
                    let result = std::mem::take(&mut *self.0.result.borrow_mut());
                    self.report(Ok(result));
                }
            }
        }
    }

    /// Cancel every live member and report `error`. Reports at most once.
    pub(crate) fn abort(&self, error: SagaError) {
        self.cancel_all();
        self.report(Err(error));
    }

    pub(crate) fn cancel_all(&self) {
        if self.0.completed.replace(true) {
            return;
        }
        let members = std::mem::take(&mut *self.0.members.borrow_mut());
        for (_, member) in members {
            member.set_cont(None);
            member.cancel();
        }
    }

    fn report(&self, outcome: Outcome) {
        let on_done = self.0.on_done.borrow_mut().take();
        if let Some(on_done) = on_done {
            on_done(outcome);
        }
    }

    pub(crate) fn names(&self) -> Vec<String> {
        self.0.members.borrow().iter().map(|(_, m)| m.name()).collect()
    }
}
