//! Single-use completion of one effect.
//!
//! A completion is settled at most once. A settled completion ignores later
//! settles and cancels; a cancelled one ignores settles. Resolvers install
//! their cancel hook before they can possibly settle.

use std::cell::RefCell;
use std::rc::Rc;

use crate::domain::Outcome;

type OnSettle = Box<dyn FnOnce(Outcome)>;
type OnCancel = Box<dyn FnOnce()>;

enum State {
    Pending {
        on_settle: OnSettle,
        on_cancel: Option<OnCancel>,
    },
    Settled,
    Cancelled,
}

#[derive(Clone)]
pub(crate) struct Completion(Rc<RefCell<State>>);

impl Completion {
    pub(crate) fn new(on_settle: impl FnOnce(Outcome) + 'static) -> Self {
        Completion(Rc::new(RefCell::new(State::Pending {
            on_settle: Box::new(on_settle),
            on_cancel: None,
        })))
    }

    pub(crate) fn settle(&self, outcome: Outcome) {
        let previous = std::mem::replace(&mut *self.0.borrow_mut(), State::Settled);
        match previous {
            State::Pending { on_settle, .. } => on_settle(outcome),
            other => *self.0.borrow_mut() = other,
        }
    }

    /// Replace the cancel hook. On an already cancelled completion the hook
    /// runs immediately; on a settled one it is dropped.
    pub(crate) fn on_cancel(&self, hook: impl FnOnce() + 'static) {
        let cancelled = {
            let mut state = self.0.borrow_mut();
            match &mut *state {
                State::Pending { on_cancel, .. } => {
                    *on_cancel = Some(Box::new(hook));
                    return;
                }
                State::Cancelled => true,
                State::Settled => false,
            }
        };
        if cancelled {
            hook();
        }
    }

    pub(crate) fn cancel(&self) {
        let previous = std::mem::replace(&mut *self.0.borrow_mut(), State::Cancelled);
        match previous {
            State::Pending { on_cancel, .. } => {
                if let Some(hook) = on_cancel {
                    hook();
                }
            }
            other => *self.0.borrow_mut() = other,
        }
    }

    pub(crate) fn is_pending(&self) -> bool {
        matches!(*self.0.borrow(), State::Pending { .. })
    }
}
