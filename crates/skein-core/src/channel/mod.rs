//! Channels: a buffered inbox plus a queue of pending takers.
//!
//! # 不変条件
//! - closed なら pending taker は存在しない
//! - pending taker がいるなら buffer は空
//!
//! どちらかが破れていたら変更系の操作はすべて [`SagaError::Internal`] を返します。
//! Callbacks are always invoked after the internal borrow is released, so a
//! taker may put to or take from the same channel.

pub mod buffer;
pub mod emitter;

use std::cell::RefCell;
use std::fmt;
use std::rc::{Rc, Weak};

use crate::domain::{Matcher, Message};
use crate::error::SagaError;

pub use self::buffer::{Buffer, BufferSpec, NoBuffer, Overflow, RingBuffer, DEFAULT_LIMIT};
pub use self::emitter::{Emitter, Listener, Unsubscribe};

/// Handle of a pending taker, used to abandon it.
pub type TakerId = u64;

struct Taker {
    id: TakerId,
    callback: Box<dyn FnOnce(Message)>,
    matcher: Option<Matcher>,
}

impl Taker {
    fn accepts(&self, message: &Message) -> bool {
        self.matcher.as_ref().is_none_or(|m| m(message))
    }
}

struct State {
    buffer: Box<dyn Buffer<Message>>,
    takers: Vec<Taker>,
    closed: bool,
    next_taker: TakerId,
}

impl State {
    fn check_forbidden_states(&self) -> Result<(), SagaError> {
        if self.closed && !self.takers.is_empty() {
            return Err(SagaError::internal(
                "cannot have a closed channel with pending takers",
            ));
        }
        if !self.takers.is_empty() && !self.buffer.is_empty() {
            return Err(SagaError::internal(
                "cannot have pending takers with non empty buffer",
            ));
        }
        Ok(())
    }
}

struct Inner {
    state: RefCell<State>,
    unsubscribe: RefCell<Option<Unsubscribe>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.unsubscribe.get_mut().take() {
            unsubscribe();
        }
    }
}

/// Shared handle to one channel.
#[derive(Clone)]
pub struct Channel(Rc<Inner>);

impl Channel {
    pub fn new(buffer: BufferSpec) -> Result<Self, SagaError> {
        Ok(Self::with_buffer(buffer.build()?))
    }

    pub fn with_buffer(buffer: Box<dyn Buffer<Message>>) -> Self {
        Channel(Rc::new(Inner {
            state: RefCell::new(State {
                buffer,
                takers: Vec::new(),
                closed: false,
                next_taker: 0,
            }),
            unsubscribe: RefCell::new(None),
        }))
    }

    /// A channel fed by a message source.
    ///
    /// END from the source closes the channel and unsubscribes; messages the
    /// matcher rejects are ignored. The subscription holds the channel weakly,
    /// so dropping the last handle unsubscribes too.
    pub fn from_source(
        subscribe: impl FnOnce(Listener) -> Unsubscribe,
        buffer: BufferSpec,
        matcher: Option<Matcher>,
    ) -> Result<Self, SagaError> {
        Ok(Self::subscribed(subscribe, buffer.build()?, matcher))
    }

    pub(crate) fn subscribed(
        subscribe: impl FnOnce(Listener) -> Unsubscribe,
        buffer: Box<dyn Buffer<Message>>,
        matcher: Option<Matcher>,
    ) -> Self {
        let chan = Self::with_buffer(buffer);
        let weak: Weak<Inner> = Rc::downgrade(&chan.0);

        let unsubscribe = subscribe(Rc::new(move |message: Message| {
            let Some(inner) = weak.upgrade() else {
                return Ok(());
            };
            let chan = Channel(inner);
            if message.is_end() {
                return chan.close();
            }
            if matcher.as_ref().is_some_and(|m| !m(&message)) {
                return Ok(());
            }
            chan.put(message)
        }));

        if chan.is_closed() {
            unsubscribe();
        } else {
            *chan.0.unsubscribe.borrow_mut() = Some(unsubscribe);
        }
        chan
    }

    /// Hand `message` to the first pending taker that accepts it, or buffer it.
    ///
    /// A no-op once closed. With pending takers but none accepting, the
    /// message is dropped.
    pub fn put(&self, message: Message) -> Result<(), SagaError> {
        let taker = {
            let mut state = self.0.state.borrow_mut();
            state.check_forbidden_states()?;
            if message.kind().is_empty() {
                return Err(SagaError::validation("message type must not be empty"));
            }
            if state.closed {
                return Ok(());
            }
            if state.takers.is_empty() {
                return state.buffer.put(message);
            }
            match state.takers.iter().position(|t| t.accepts(&message)) {
                Some(i) => state.takers.remove(i),
                None => return Ok(()),
            }
        };
        (taker.callback)(message);
        Ok(())
    }

    /// Deliver one message to `callback`.
    ///
    /// Closed and empty: END right away. Buffered message: the oldest right
    /// away (the matcher only applies to pending takers). Otherwise the taker
    /// is queued and its id returned.
    pub fn take(
        &self,
        callback: impl FnOnce(Message) + 'static,
        matcher: Option<Matcher>,
    ) -> Result<Option<TakerId>, SagaError> {
        let ready = {
            let mut state = self.0.state.borrow_mut();
            state.check_forbidden_states()?;
            if state.closed && state.buffer.is_empty() {
                Some(Message::end())
            } else if let Some(message) = state.buffer.take() {
                Some(message)
            } else {
                let id = state.next_taker;
                state.next_taker += 1;
                state.takers.push(Taker {
                    id,
                    callback: Box::new(callback),
                    matcher,
                });
                return Ok(Some(id));
            }
        };
        if let Some(message) = ready {
            callback(message);
        }
        Ok(None)
    }

    /// Remove a pending taker without calling it.
    pub fn abandon(&self, id: TakerId) {
        self.0.state.borrow_mut().takers.retain(|t| t.id != id);
    }

    /// Everything buffered, or `None` (END) once closed and empty.
    pub fn flush(&self) -> Result<Option<Vec<Message>>, SagaError> {
        let mut state = self.0.state.borrow_mut();
        state.check_forbidden_states()?;
        if state.closed && state.buffer.is_empty() {
            return Ok(None);
        }
        Ok(Some(state.buffer.flush()))
    }

    /// Close the channel and hand END to every pending taker.
    pub fn close(&self) -> Result<(), SagaError> {
        let takers = {
            let mut state = self.0.state.borrow_mut();
            state.check_forbidden_states()?;
            if state.closed {
                return Ok(());
            }
            state.closed = true;
            std::mem::take(&mut state.takers)
        };
        let unsubscribe = self.0.unsubscribe.borrow_mut().take();
        if let Some(unsubscribe) = unsubscribe {
            unsubscribe();
        }
        for taker in takers {
            (taker.callback)(Message::end());
        }
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.0.state.borrow().closed
    }

    pub fn pending_takers(&self) -> usize {
        self.0.state.borrow().takers.len()
    }

    pub fn ptr_eq(&self, other: &Channel) -> bool {
        Rc::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for Channel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.0.state.try_borrow();
        let mut d = f.debug_struct("Channel");
        if let Ok(state) = state {
            d.field("closed", &state.closed)
                .field("takers", &state.takers.len())
                .field("buffered", &!state.buffer.is_empty());
        }
        d.finish()
    }
}
