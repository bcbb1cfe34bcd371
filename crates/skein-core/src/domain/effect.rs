//! Effect descriptors: immutable descriptions of one requested operation.
//!
//! A workflow yields an [`Effect`]; the driver performs it and resumes the
//! workflow with the outcome. Constructors live in [`crate::effects`].

use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

use crate::channel::{BufferSpec, Channel};
use crate::error::SagaError;
use crate::proc::Task;
use crate::workflow::{Coroutine, Cx, Interrupt, Workflow};

use super::{Message, Pattern, Value};

/// Boxed `!Send` future; everything here runs on one thread.
pub type LocalFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// What every effect settles with.
pub type Outcome = Result<Value, SagaError>;

/// What a routine hands back when invoked.
pub enum Returned {
    /// A plain value; the effect resolves synchronously.
    Ready(Value),
    /// An awaitable; the effect resolves when it does.
    Later(LocalFuture<Outcome>),
    /// A workflow; driven as a nested task.
    Workflow(Box<dyn Workflow>),
}

impl From<Value> for Returned {
    fn from(v: Value) -> Self {
        Returned::Ready(v)
    }
}

type RoutineFn = dyn Fn(Vec<Value>) -> Result<Returned, SagaError>;

/// A named callable target of CALL and FORK effects.
#[derive(Clone)]
pub struct Routine {
    name: Rc<str>,
    func: Rc<RoutineFn>,
}

impl Routine {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(Vec<Value>) -> Result<Returned, SagaError> + 'static,
    ) -> Self {
        Self {
            name: Rc::from(name.into()),
            func: Rc::new(func),
        }
    }

    /// A routine that synchronously computes a value.
    pub fn sync(
        name: impl Into<String>,
        func: impl Fn(Vec<Value>) -> Result<Value, SagaError> + 'static,
    ) -> Self {
        Self::new(name, move |args| func(args).map(Returned::Ready))
    }

    /// A routine returning an awaitable.
    pub fn future<F>(name: impl Into<String>, func: impl Fn(Vec<Value>) -> F + 'static) -> Self
    where
        F: Future<Output = Outcome> + 'static,
    {
        Self::new(name, move |args| Ok(Returned::Later(Box::pin(func(args)))))
    }

    /// A routine returning a hand-written workflow.
    pub fn workflow<W>(name: impl Into<String>, func: impl Fn(Vec<Value>) -> W + 'static) -> Self
    where
        W: Workflow + 'static,
    {
        Self::new(name, move |args| Ok(Returned::Workflow(Box::new(func(args)))))
    }

    /// A routine whose body is an `async` block driven through [`Cx`].
    pub fn saga<F>(name: impl Into<String>, func: impl Fn(Cx, Vec<Value>) -> F + 'static) -> Self
    where
        F: Future<Output = Result<Value, Interrupt>> + 'static,
    {
        let func = Rc::new(func);
        Self::new(name, move |args| {
            let func = Rc::clone(&func);
            Ok(Returned::Workflow(Box::new(Coroutine::new(move |cx| {
                func(cx, args)
            }))))
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn invoke(&self, args: Vec<Value>) -> Result<Returned, SagaError> {
        (self.func)(args)
    }
}

impl fmt::Debug for Routine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Routine({})", self.name)
    }
}

/// One-shot callback handed to a callback-style routine.
pub type CpsCallback = Box<dyn FnOnce(Outcome)>;

/// Hook a callback-style routine may return to abort its pending work.
pub type CancelHook = Box<dyn FnOnce()>;

type CpsFn = dyn Fn(Vec<Value>, CpsCallback) -> Result<Option<CancelHook>, SagaError>;

/// A routine that reports through a callback instead of returning.
#[derive(Clone)]
pub struct CpsRoutine {
    name: Rc<str>,
    func: Rc<CpsFn>,
}

impl CpsRoutine {
    pub fn new(
        name: impl Into<String>,
        func: impl Fn(Vec<Value>, CpsCallback) -> Result<Option<CancelHook>, SagaError> + 'static,
    ) -> Self {
        Self {
            name: Rc::from(name.into()),
            func: Rc::new(func),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn invoke(
        &self,
        args: Vec<Value>,
        callback: CpsCallback,
    ) -> Result<Option<CancelHook>, SagaError> {
        (self.func)(args, callback)
    }
}

pub type Selector = Rc<dyn Fn(&serde_json::Value) -> Result<Value, SagaError>>;

/// Where a take reads from.
#[derive(Clone, Debug)]
pub enum Source {
    Pattern(Pattern),
    Channel(Channel),
}

impl Source {
    pub fn describe(&self) -> String {
        match self {
            Source::Pattern(p) => p.describe(),
            Source::Channel(_) => "channel".to_string(),
        }
    }
}

impl From<Pattern> for Source {
    fn from(p: Pattern) -> Self {
        Source::Pattern(p)
    }
}

impl From<&str> for Source {
    fn from(s: &str) -> Self {
        Source::Pattern(Pattern::from(s))
    }
}

impl From<Channel> for Source {
    fn from(c: Channel) -> Self {
        Source::Channel(c)
    }
}

/// Target of a CANCEL effect.
#[derive(Clone, Debug)]
pub enum CancelTarget {
    Task(Task),
    /// The task running the effect.
    Current,
}

/// Whether a combinator result comes back as a list or a keyed record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shape {
    List,
    Record,
}

/// Effects run concurrently by ALL and RACE.
pub struct Keyed {
    pub(crate) entries: Vec<(String, Effect)>,
    pub(crate) shape: Shape,
}

impl Keyed {
    pub fn list(effects: impl IntoIterator<Item = Effect>) -> Self {
        Self {
            entries: effects
                .into_iter()
                .enumerate()
                .map(|(i, e)| (i.to_string(), e))
                .collect(),
            shape: Shape::List,
        }
    }

    pub fn record<K: Into<String>>(entries: impl IntoIterator<Item = (K, Effect)>) -> Self {
        Self {
            entries: entries.into_iter().map(|(k, e)| (k.into(), e)).collect(),
            shape: Shape::Record,
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One requested operation.
pub enum Effect {
    Take {
        source: Source,
        /// Deliver END as an ordinary value instead of terminating.
        trap_end: bool,
    },
    Put {
        channel: Option<Channel>,
        message: Message,
        resolve: bool,
    },
    Call {
        routine: Routine,
        args: Vec<Value>,
    },
    Cps {
        routine: CpsRoutine,
        args: Vec<Value>,
    },
    Fork {
        routine: Routine,
        args: Vec<Value>,
        detached: bool,
    },
    Join(Task),
    Cancel(CancelTarget),
    All(Keyed),
    Race(Keyed),
    ActionChannel {
        pattern: Pattern,
        buffer: Option<BufferSpec>,
    },
    Select(Selector),
    GetContext(String),
    SetContext(Vec<(String, Value)>),
    Flush(Channel),
    Cancelled,
    Await(LocalFuture<Outcome>),
}

impl Effect {
    pub fn kind(&self) -> &'static str {
        match self {
            Effect::Take { .. } => "take",
            Effect::Put { .. } => "put",
            Effect::Call { .. } => "call",
            Effect::Cps { .. } => "cps",
            Effect::Fork { detached: false, .. } => "fork",
            Effect::Fork { detached: true, .. } => "spawn",
            Effect::Join(_) => "join",
            Effect::Cancel(_) => "cancel",
            Effect::All(_) => "all",
            Effect::Race(_) => "race",
            Effect::ActionChannel { .. } => "action_channel",
            Effect::Select(_) => "select",
            Effect::GetContext(_) => "get_context",
            Effect::SetContext(_) => "set_context",
            Effect::Flush(_) => "flush",
            Effect::Cancelled => "cancelled",
            Effect::Await(_) => "await",
        }
    }

    /// Short description for monitors and logs.
    pub fn describe(&self) -> String {
        match self {
            Effect::Take { source, .. } => format!("take({})", source.describe()),
            Effect::Put { message, .. } => format!("put({})", message.kind()),
            Effect::Call { routine, .. } => format!("call({})", routine.name()),
            Effect::Cps { routine, .. } => format!("cps({})", routine.name()),
            Effect::Fork { routine, .. } => format!("{}({})", self.kind(), routine.name()),
            Effect::Join(task) => format!("join({})", task.name()),
            Effect::Cancel(CancelTarget::Task(task)) => format!("cancel({})", task.name()),
            Effect::Cancel(CancelTarget::Current) => "cancel(self)".to_string(),
            Effect::All(keyed) | Effect::Race(keyed) => {
                let keys: Vec<&str> = keyed.entries.iter().map(|(k, _)| k.as_str()).collect();
                format!("{}([{}])", self.kind(), keys.join(","))
            }
            Effect::ActionChannel { pattern, .. } => {
                format!("action_channel({})", pattern.describe())
            }
            Effect::GetContext(key) => format!("get_context({key})"),
            _ => self.kind().to_string(),
        }
    }
}

impl fmt::Debug for Effect {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Effect({})", self.describe())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::effects;

    #[test]
    fn keyed_list_uses_positional_keys() {
        let k = Keyed::list([effects::cancelled(), effects::take("A")]);
        let keys: Vec<&str> = k.entries.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["0", "1"]);
        assert_eq!(k.shape, Shape::List);
    }

    #[test]
    fn describe_names_the_target() {
        assert_eq!(effects::take(vec!["A", "B"]).describe(), "take(A,B)");
        assert_eq!(effects::put(Message::new("SAVE")).describe(), "put(SAVE)");
        let r = Routine::sync("fetch", |_| Ok(Value::Unit));
        assert_eq!(effects::spawn(&r, vec![]).describe(), "spawn(fetch)");
        assert_eq!(effects::cancel_self().describe(), "cancel(self)");
    }

    #[test]
    fn sync_routine_returns_ready() {
        let r = Routine::sync("double", |args| {
            let n = args.first().and_then(Value::as_i64).unwrap_or(0);
            Ok(Value::data(n * 2))
        });
        match r.invoke(vec![Value::data(21)]).unwrap() {
            Returned::Ready(v) => assert_eq!(v.as_i64(), Some(42)),
            _ => panic!("expected a ready value"),
        }
    }
}
