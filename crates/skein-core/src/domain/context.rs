//! Task context: a scope chained to the parent task's scope.

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use super::Value;

/// Lookups walk the parent chain; writes only touch the owning scope.
#[derive(Clone, Default)]
pub struct Context(Rc<Scope>);

#[derive(Default)]
struct Scope {
    parent: Option<Context>,
    values: RefCell<HashMap<String, Value>>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_values(values: impl IntoIterator<Item = (String, Value)>) -> Self {
        let ctx = Self::new();
        ctx.merge(values);
        ctx
    }

    /// A fresh scope whose lookups fall back to `self`.
    pub fn child(&self) -> Self {
        Context(Rc::new(Scope {
            parent: Some(self.clone()),
            values: RefCell::new(HashMap::new()),
        }))
    }

    pub fn get(&self, key: &str) -> Option<Value> {
        let mut scope = Some(self);
        while let Some(ctx) = scope {
            if let Some(v) = ctx.0.values.borrow().get(key) {
                return Some(v.clone());
            }
            scope = ctx.0.parent.as_ref();
        }
        None
    }

    /// Merge into this scope; parents are never written.
    pub fn merge(&self, values: impl IntoIterator<Item = (String, Value)>) {
        self.0.values.borrow_mut().extend(values);
    }

    /// Keys owned by this scope (not inherited ones).
    pub fn own_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.0.values.borrow().keys().cloned().collect();
        keys.sort();
        keys
    }
}

impl fmt::Debug for Context {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Context")
            .field("keys", &self.own_keys())
            .field("has_parent", &self.0.parent.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn child_sees_parent_values() {
        let root = Context::with_values([("api".to_string(), Value::data(json!("v1")))]);
        let child = root.child();
        assert_eq!(child.get("api").and_then(|v| v.as_str().map(str::to_owned)), Some("v1".into()));
    }

    #[test]
    fn child_writes_shadow_without_touching_parent() {
        let root = Context::with_values([("n".to_string(), Value::data(json!(1)))]);
        let child = root.child();
        child.merge([("n".to_string(), Value::data(json!(2)))]);

        assert_eq!(child.get("n").and_then(|v| v.as_i64()), Some(2));
        assert_eq!(root.get("n").and_then(|v| v.as_i64()), Some(1));
        assert!(root.child().get("missing").is_none());
    }

    #[test]
    fn later_parent_writes_are_visible_to_children() {
        let root = Context::new();
        let child = root.child();
        root.merge([("late".to_string(), Value::data(json!(true)))]);
        assert_eq!(child.get("late").and_then(|v| v.as_bool()), Some(true));
        assert!(child.own_keys().is_empty());
    }
}
