//! Environment port - the store the runtime is attached to.

use crate::channel::{Listener, Unsubscribe};
use crate::domain::{LocalFuture, Message, Outcome, Value};
use crate::error::SagaError;

/// What a dispatch hands back.
pub enum Dispatched {
    Done(Value),
    /// An acknowledgement a `put_resolve` waits for.
    Pending(LocalFuture<Outcome>),
}

/// Everything the runtime needs from the host application.
///
/// A message emitted by `dispatch` must reach every listener registered
/// through `subscribe`, synchronously and in subscription order.
pub trait Environment {
    fn subscribe(&self, listener: Listener) -> Unsubscribe;

    fn dispatch(&self, message: Message) -> Result<Dispatched, SagaError>;

    /// Snapshot of the current application state.
    fn state(&self) -> serde_json::Value;
}
