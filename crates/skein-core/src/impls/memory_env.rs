//! MemoryEnv - 開発用の Environment
//!
//! # 実装詳細
//! - Emitter で listener に同期配送
//! - dispatch された message を履歴として保持
//! - `on_dispatch` で put_resolve が待つ ack を差し込める

use std::cell::RefCell;
use std::rc::Rc;

use crate::channel::{Emitter, Listener, Unsubscribe};
use crate::domain::{LocalFuture, Message, Outcome, Value};
use crate::error::SagaError;
use crate::ports::{Dispatched, Environment};

/// Produces the acknowledgement for a dispatched message, if it has one.
pub type Acknowledge = Rc<dyn Fn(&Message) -> Option<LocalFuture<Outcome>>>;

/// MemoryEnv は in-memory の Environment
///
/// # 使用例
/// ```ignore
/// let env = Rc::new(MemoryEnv::new());
/// let runtime = RuntimeBuilder::new(env.clone()).build()?;
/// runtime.run(&saga, vec![])?;
/// env.emit(Message::new("PING"))?;
/// assert_eq!(env.dispatched_kinds(), vec!["PING", "PONG"]);
/// ```
#[derive(Default)]
pub struct MemoryEnv {
    emitter: Emitter,
    state: RefCell<serde_json::Value>,
    log: RefCell<Vec<Message>>,
    ack: RefCell<Option<Acknowledge>>,
}

impl MemoryEnv {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: serde_json::Value) -> Self {
        let env = Self::new();
        env.set_state(state);
        env
    }

    pub fn set_state(&self, state: serde_json::Value) {
        *self.state.borrow_mut() = state;
    }

    /// Install the acknowledgement hook used by later dispatches.
    pub fn on_dispatch(
        &self,
        ack: impl Fn(&Message) -> Option<LocalFuture<Outcome>> + 'static,
    ) {
        *self.ack.borrow_mut() = Some(Rc::new(ack));
    }

    /// Dispatch from outside any workflow (a UI event, a socket message).
    pub fn emit(&self, message: Message) -> Result<(), SagaError> {
        self.deliver(message)
    }

    /// Every message dispatched so far, in order.
    pub fn dispatched(&self) -> Vec<Message> {
        self.log.borrow().clone()
    }

    pub fn dispatched_kinds(&self) -> Vec<String> {
        self.log
            .borrow()
            .iter()
            .map(|m| m.kind().to_string())
            .collect()
    }

    pub fn listener_count(&self) -> usize {
        self.emitter.listener_count()
    }

    fn deliver(&self, message: Message) -> Result<(), SagaError> {
        self.log.borrow_mut().push(message.clone());
        tracing::trace!(kind = %message.kind(), "dispatch");
        self.emitter.emit(message)
    }
}

impl Environment for MemoryEnv {
    fn subscribe(&self, listener: Listener) -> Unsubscribe {
        self.emitter.subscribe(listener)
    }

    fn dispatch(&self, message: Message) -> Result<Dispatched, SagaError> {
        let ack = self.ack.borrow().clone();
        let pending = ack.and_then(|ack| ack(&message));
        self.deliver(message)?;
        Ok(match pending {
            Some(future) => Dispatched::Pending(future),
            None => Dispatched::Done(Value::Unit),
        })
    }

    fn state(&self) -> serde_json::Value {
        self.state.borrow().clone()
    }
}
