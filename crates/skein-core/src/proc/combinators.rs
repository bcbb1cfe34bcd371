//! ALL and RACE: run keyed effects concurrently under one completion.

use std::cell::{Cell, RefCell};
use std::collections::BTreeMap;
use std::rc::Rc;

use crate::domain::{EffectId, Keyed, Outcome, Shape, Value};

use super::completion::Completion;
use super::Driver;

struct Group {
    keys: Vec<String>,
    shape: Shape,
    completed: Cell<bool>,
    children: RefCell<Vec<Completion>>,
}

impl Group {
    fn new(keyed: &Keyed) -> Rc<Self> {
        Rc::new(Group {
            keys: keyed.entries.iter().map(|(k, _)| k.clone()).collect(),
            shape: keyed.shape,
            completed: Cell::new(false),
            children: RefCell::new(Vec::new()),
        })
    }

    /// Cancel every child still in flight.
    fn cancel_children(&self) {
        let children = std::mem::take(&mut *self.children.borrow_mut());
        for child in children {
            child.cancel();
        }
    }

    fn assemble(&self, values: Vec<Value>) -> Value {
        match self.shape {
            Shape::List => Value::List(values),
            Shape::Record => Value::Record(self.keys.iter().cloned().zip(values).collect()),
        }
    }
}

/// Start every child, stopping early if the group already completed.
fn launch(
    driver: &Rc<Driver>,
    group: &Rc<Group>,
    keyed: Keyed,
    effect_id: EffectId,
    cb: &Completion,
    on_child: impl Fn(usize, Outcome) + 'static,
) {
    let on_child = Rc::new(on_child);
    let children: Vec<Completion> = (0..group.keys.len())
        .map(|i| {
            let on_child = Rc::clone(&on_child);
            Completion::new(move |outcome| on_child(i, outcome))
        })
        .collect();
    *group.children.borrow_mut() = children.clone();

    {
        let group = Rc::clone(group);
        cb.on_cancel(move || {
            if !group.completed.replace(true) {
                group.cancel_children();
            }
        });
    }

    for ((key, effect), child) in keyed.entries.into_iter().zip(children) {
        if group.completed.get() {
            break;
        }
        driver.run_effect(effect, child, Some(effect_id), &key);
    }
}

/// Resolve with every result once all children resolve.
///
/// The first failure, END or cancellation cancels the rest and is propagated
/// as the group's outcome.
pub(super) fn run_all(driver: &Rc<Driver>, keyed: Keyed, effect_id: EffectId, cb: Completion) {
    let group = Group::new(&keyed);
    if keyed.is_empty() {
        cb.settle(Ok(group.assemble(Vec::new())));
        return;
    }

    let results: Rc<RefCell<Vec<Option<Value>>>> =
        Rc::new(RefCell::new(vec![None; keyed.len()]));
    let remaining = Rc::new(Cell::new(keyed.len()));

    let on_child = {
        let group = Rc::clone(&group);
        let cb = cb.clone();
        move |index: usize, outcome: Outcome| {
            if group.completed.get() {
                return;
            }
            match outcome {
                Ok(value) if !value.is_terminal_signal() => {
                    results.borrow_mut()[index] = Some(value);
                    remaining.set(remaining.get() - 1);
                    if remaining.get() == 0 {
                        group.completed.set(true);
                        group.children.borrow_mut().clear();
                        let values = results
                            .borrow_mut()
                            .drain(..)
                            .map(Option::unwrap_or_default)
                            .collect();
                        cb.settle(Ok(group.assemble(values)));
                    }
                }
                other => {
                    group.completed.set(true);
                    group.cancel_children();
                    cb.settle(other);
                }
            }
        }
    };

    launch(driver, &group, keyed, effect_id, &cb, on_child);
}

/// Resolve with the first successful child; the others are cancelled.
///
/// A failure before any success cancels the rest and propagates. END and
/// cancellation never win.
pub(super) fn run_race(driver: &Rc<Driver>, keyed: Keyed, effect_id: EffectId, cb: Completion) {
    let group = Group::new(&keyed);

    let on_child = {
        let group = Rc::clone(&group);
        let cb = cb.clone();
        move |index: usize, outcome: Outcome| {
            if group.completed.get() {
                return;
            }
            match outcome {
                Ok(value) if value.is_terminal_signal() => {}
                Ok(value) => {
                    group.completed.set(true);
                    group.cancel_children();
                    let result = match group.shape {
                        Shape::List => {
                            let mut values = vec![Value::Unit; group.keys.len()];
                            values[index] = value;
                            Value::List(values)
                        }
                        Shape::Record => Value::Record(BTreeMap::from([(
                            group.keys[index].clone(),
                            value,
                        )])),
                    };
                    cb.settle(Ok(result));
                }
                Err(error) => {
                    group.completed.set(true);
                    group.cancel_children();
                    cb.settle(Err(error));
                }
            }
        }
    };

    launch(driver, &group, keyed, effect_id, &cb, on_child);
}
