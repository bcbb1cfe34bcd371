//! Runtime - root task を起動する入口

use std::rc::Rc;

use crate::channel::Unsubscribe;
use crate::domain::{Context, Message, Returned, Routine, Value};
use crate::error::SagaError;
use crate::ports::EffectInfo;
use crate::proc::{Driver, Parent, Shared, Task};
use crate::workflow::Workflow;

use super::config::RuntimeConfig;

/// Starts root tasks against one environment.
///
/// Every task started here shares one scheduler. Tasks that await futures
/// (`call` of an async routine, `delay`, `put_resolve`) need a tokio
/// `LocalSet`.
pub struct Runtime {
    shared: Rc<Shared>,
    context: Context,
    dispatch_monitor: Option<Unsubscribe>,
}

impl Runtime {
    pub(crate) fn new(shared: Rc<Shared>, context: Context, monitor_dispatches: bool) -> Self {
        let dispatch_monitor = monitor_dispatches.then(|| {
            let monitor = Rc::clone(&shared.monitor);
            shared.env.subscribe(Rc::new(move |message: Message| {
                monitor.message_dispatched(&message);
                Ok(())
            }))
        });
        Self {
            shared,
            context,
            dispatch_monitor,
        }
    }

    /// Start `routine` as a root task.
    ///
    /// The routine must produce a workflow; anything else is a validation fault.
    pub fn run(&self, routine: &Routine, args: Vec<Value>) -> Result<Task, SagaError> {
        match routine.invoke(args)? {
            Returned::Workflow(workflow) => Ok(self.start(routine.name(), workflow)),
            _ => Err(SagaError::validation(format!(
                "{}: a root routine must produce a workflow",
                routine.name()
            ))),
        }
    }

    /// Start a hand-built workflow as a root task.
    pub fn run_workflow(&self, name: &str, workflow: impl Workflow + 'static) -> Task {
        self.start(name, Box::new(workflow))
    }

    /// Merge into the root context. Running tasks see the new values.
    pub fn set_context<K: Into<String>>(&self, props: impl IntoIterator<Item = (K, Value)>) {
        self.context
            .merge(props.into_iter().map(|(k, v)| (k.into(), v)));
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn config(&self) -> &RuntimeConfig {
        &self.shared.config
    }

    fn start(&self, name: &str, workflow: Box<dyn Workflow>) -> Task {
        let name = if name.is_empty() {
            self.shared.config.root_name.as_str()
        } else {
            name
        };
        let effect_id = self.shared.ids.effect_id();
        self.shared.monitor.effect_triggered(&EffectInfo {
            effect_id,
            parent_id: None,
            label: String::new(),
            kind: "root",
            description: format!("root({name})"),
        });

        let task = Driver::start(
            &self.shared,
            workflow,
            name,
            Parent {
                context: &self.context,
                effect_id: Some(effect_id),
                cont: None,
                attached: false,
            },
        );
        self.shared
            .monitor
            .effect_resolved(effect_id, &Value::Task(task.clone()));
        task
    }
}

impl Drop for Runtime {
    fn drop(&mut self) {
        if let Some(unsubscribe) = self.dispatch_monitor.take() {
            unsubscribe();
        }
    }
}
