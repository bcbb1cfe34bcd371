//! Synchronous subscribe/emit fan-out, usable as a message source.

use std::cell::{Cell, RefCell};
use std::fmt;
use std::rc::{Rc, Weak};

use crate::domain::Message;
use crate::error::SagaError;

/// Receives every message a source emits.
pub type Listener = Rc<dyn Fn(Message) -> Result<(), SagaError>>;

/// Removes a listener from its source. Calling it twice is harmless.
pub type Unsubscribe = Box<dyn FnOnce()>;

type Listeners = RefCell<Vec<(u64, Listener)>>;

#[derive(Clone, Default)]
pub struct Emitter {
    listeners: Rc<Listeners>,
    next_id: Rc<Cell<u64>>,
}

impl Emitter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, listener: Listener) -> Unsubscribe {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        self.listeners.borrow_mut().push((id, listener));

        let listeners: Weak<Listeners> = Rc::downgrade(&self.listeners);
        Box::new(move || {
            if let Some(listeners) = listeners.upgrade() {
                listeners.borrow_mut().retain(|(other, _)| *other != id);
            }
        })
    }

    /// Deliver to a snapshot of the current listeners, in subscription order.
    ///
    /// Listeners added or removed during the emit do not affect this round.
    /// Every listener runs; the first error is returned.
    pub fn emit(&self, message: Message) -> Result<(), SagaError> {
        let snapshot: Vec<Listener> = self
            .listeners
            .borrow()
            .iter()
            .map(|(_, l)| Rc::clone(l))
            .collect();

        let mut first_err = None;
        for listener in snapshot {
            if let Err(e) = listener(message.clone()) {
                first_err.get_or_insert(e);
            }
        }
        first_err.map_or(Ok(()), Err)
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.borrow().len()
    }
}

impl fmt::Debug for Emitter {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Emitter")
            .field("listeners", &self.listener_count())
            .finish()
    }
}
