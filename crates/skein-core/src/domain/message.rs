//! Messages and the patterns workflows wait on.

use std::fmt;
use std::rc::Rc;

use serde::{Deserialize, Serialize};

/// Type tag of the END message. A source that emits it is finished for good.
pub const END_TYPE: &str = "@@skein/CHANNEL_END";

/// A message flowing between the environment, channels and workflows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    #[serde(rename = "type")]
    kind: String,

    #[serde(default, skip_serializing_if = "serde_json::Value::is_null")]
    payload: serde_json::Value,

    /// Set on messages dispatched by a workflow's put; the std channel
    /// delivers those synchronously instead of through the scheduler.
    #[serde(skip)]
    from_workflow: bool,
}

impl Message {
    pub fn new(kind: impl Into<String>) -> Self {
        Self {
            kind: kind.into(),
            payload: serde_json::Value::Null,
            from_workflow: false,
        }
    }

    pub fn with_payload(kind: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            payload,
            ..Self::new(kind)
        }
    }

    /// The END message.
    pub fn end() -> Self {
        Self::new(END_TYPE)
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn payload(&self) -> &serde_json::Value {
        &self.payload
    }

    pub fn is_end(&self) -> bool {
        self.kind == END_TYPE
    }

    pub fn is_from_workflow(&self) -> bool {
        self.from_workflow
    }

    pub(crate) fn mark_from_workflow(mut self) -> Self {
        self.from_workflow = true;
        self
    }
}

// 配送経路のフラグは同一性に含めない
impl PartialEq for Message {
    fn eq(&self, other: &Self) -> bool {
        self.kind == other.kind && self.payload == other.payload
    }
}

pub type Predicate = Rc<dyn Fn(&Message) -> bool>;

/// What a take waits for.
#[derive(Clone)]
pub enum Pattern {
    /// `*`: every message.
    Any,
    /// Equality on the type field.
    Type(String),
    /// Logical OR of the sub-patterns.
    OneOf(Vec<Pattern>),
    Predicate(Predicate),
}

impl Pattern {
    pub fn predicate(f: impl Fn(&Message) -> bool + 'static) -> Self {
        Pattern::Predicate(Rc::new(f))
    }

    pub fn matches(&self, message: &Message) -> bool {
        match self {
            Pattern::Any => true,
            Pattern::Type(kind) => message.kind() == kind,
            Pattern::OneOf(patterns) => patterns.iter().any(|p| p.matches(message)),
            Pattern::Predicate(f) => f(message),
        }
    }

    /// Compiled form handed to channels.
    pub fn matcher(&self) -> Matcher {
        let pattern = self.clone();
        Rc::new(move |message: &Message| pattern.matches(message))
    }

    /// Human-readable name used for helper task names.
    pub fn describe(&self) -> String {
        match self {
            Pattern::Any => "*".to_string(),
            Pattern::Type(kind) => kind.clone(),
            Pattern::OneOf(patterns) => patterns
                .iter()
                .map(Pattern::describe)
                .collect::<Vec<_>>()
                .join(","),
            Pattern::Predicate(_) => "<predicate>".to_string(),
        }
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        if s == "*" {
            Pattern::Any
        } else {
            Pattern::Type(s.to_string())
        }
    }
}

impl From<String> for Pattern {
    fn from(s: String) -> Self {
        Pattern::from(s.as_str())
    }
}

impl<P: Into<Pattern>> From<Vec<P>> for Pattern {
    fn from(patterns: Vec<P>) -> Self {
        Pattern::OneOf(patterns.into_iter().map(Into::into).collect())
    }
}

impl fmt::Debug for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Pattern({})", self.describe())
    }
}

/// Predicate attached to a pending channel reader.
pub type Matcher = Rc<dyn Fn(&Message) -> bool>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::wildcard(Pattern::from("*"), true)]
    #[case::same_type(Pattern::from("SAVE"), true)]
    #[case::other_type(Pattern::from("LOAD"), false)]
    #[case::one_of(Pattern::from(vec!["LOAD", "SAVE"]), true)]
    #[case::none_of(Pattern::from(vec!["LOAD", "QUIT"]), false)]
    #[case::predicate(Pattern::predicate(|m| m.payload()["id"] == 7), true)]
    fn patterns_match_on_type_field(#[case] pattern: Pattern, #[case] expected: bool) {
        let message = Message::with_payload("SAVE", serde_json::json!({ "id": 7 }));
        assert_eq!(pattern.matches(&message), expected);
        assert_eq!(pattern.matcher()(&message), expected);
    }

    #[test]
    fn message_serializes_with_type_field() {
        let m = Message::with_payload("SAVE", serde_json::json!({ "id": 1 }));
        let v = serde_json::to_value(&m).unwrap();
        assert_eq!(v["type"], "SAVE");
        assert_eq!(v["payload"]["id"], 1);

        let bare: Message = serde_json::from_str(r#"{ "type": "PING" }"#).unwrap();
        assert_eq!(bare.kind(), "PING");
        assert!(!bare.is_from_workflow());
    }

    #[test]
    fn equality_ignores_delivery_origin() {
        let put = Message::with_payload("SAVE", serde_json::json!(1)).mark_from_workflow();
        assert_eq!(put, Message::with_payload("SAVE", serde_json::json!(1)));
        assert_ne!(put, Message::with_payload("SAVE", serde_json::json!(2)));
        assert_ne!(put, Message::new("LOAD"));
    }

    #[test]
    fn end_is_recognised() {
        assert!(Message::end().is_end());
        assert!(!Message::new("END").is_end());
    }
}
