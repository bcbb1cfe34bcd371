//! The dynamic value flowing through effect completions.

use std::collections::BTreeMap;

use crate::channel::Channel;
use crate::proc::Task;

use super::Message;

/// Result of an effect, argument of a routine, or final value of a task.
#[derive(Debug, Clone, Default)]
pub enum Value {
    #[default]
    Unit,
    Data(serde_json::Value),
    Message(Message),
    Task(Task),
    Channel(Channel),
    List(Vec<Value>),
    Record(BTreeMap<String, Value>),

    /// The awaited source is closed for good.
    End,

    /// Outcome of a cancelled task.
    Cancelled,
}

impl Value {
    pub fn data(value: impl Into<serde_json::Value>) -> Self {
        Value::Data(value.into())
    }

    pub fn is_unit(&self) -> bool {
        matches!(self, Value::Unit)
    }

    pub fn is_end(&self) -> bool {
        matches!(self, Value::End)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Value::Cancelled)
    }

    /// `End` and `Cancelled` never count as a successful result in a combinator.
    pub(crate) fn is_terminal_signal(&self) -> bool {
        matches!(self, Value::End | Value::Cancelled)
    }

    pub fn as_data(&self) -> Option<&serde_json::Value> {
        match self {
            Value::Data(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        self.as_data().and_then(serde_json::Value::as_bool)
    }

    pub fn as_i64(&self) -> Option<i64> {
        self.as_data().and_then(serde_json::Value::as_i64)
    }

    pub fn as_str(&self) -> Option<&str> {
        self.as_data().and_then(serde_json::Value::as_str)
    }

    pub fn as_message(&self) -> Option<&Message> {
        match self {
            Value::Message(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_task(&self) -> Option<&Task> {
        match self {
            Value::Task(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_channel(&self) -> Option<&Channel> {
        match self {
            Value::Channel(c) => Some(c),
            _ => None,
        }
    }

    pub fn as_list(&self) -> Option<&[Value]> {
        match self {
            Value::List(items) => Some(items),
            _ => None,
        }
    }

    /// Field of a record, or element of a list addressed by its decimal index.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Record(map) => map.get(key),
            Value::List(items) => key.parse::<usize>().ok().and_then(|i| items.get(i)),
            _ => None,
        }
    }
}

impl From<Message> for Value {
    fn from(m: Message) -> Self {
        Value::Message(m)
    }
}

impl From<Task> for Value {
    fn from(t: Task) -> Self {
        Value::Task(t)
    }
}

impl From<Channel> for Value {
    fn from(c: Channel) -> Self {
        Value::Channel(c)
    }
}

impl From<serde_json::Value> for Value {
    fn from(v: serde_json::Value) -> Self {
        Value::Data(v)
    }
}

impl From<()> for Value {
    fn from(_: ()) -> Self {
        Value::Unit
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn accessors_only_match_their_variant() {
        let v = Value::data(json!(3));
        assert_eq!(v.as_i64(), Some(3));
        assert_eq!(v.as_bool(), None);
        assert!(v.as_message().is_none());

        let m = Value::from(Message::new("PING"));
        assert_eq!(m.as_message().map(Message::kind), Some("PING"));
    }

    #[test]
    fn sentinels_are_terminal_signals() {
        assert!(Value::End.is_terminal_signal());
        assert!(Value::Cancelled.is_terminal_signal());
        assert!(!Value::Unit.is_terminal_signal());
    }

    #[test]
    fn record_lookup() {
        let mut map = BTreeMap::new();
        map.insert("a".to_string(), Value::data(json!("x")));
        let v = Value::Record(map);
        assert_eq!(v.get("a").and_then(Value::as_str), Some("x"));
        assert!(v.get("b").is_none());
    }
}
