//! Monitor port - effect のライフサイクルを観測する hook
//!
//! 全メソッドにデフォルト実装 (何もしない) があるので、
//! 必要な hook だけを実装できます。

use crate::domain::{EffectId, Message, Outcome, Value};
use crate::error::SagaError;

/// Describes a triggered effect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EffectInfo {
    pub effect_id: EffectId,
    /// Effect this one runs under (a call, fork or combinator), if any.
    pub parent_id: Option<EffectId>,
    /// Key inside a combinator, empty otherwise.
    pub label: String,
    pub kind: &'static str,
    pub description: String,
}

/// Root tasks are reported as an effect of kind `"root"` without a parent,
/// resolved with the task handle as soon as the task has started.
pub trait Monitor {
    fn effect_triggered(&self, _info: &EffectInfo) {}

    fn effect_resolved(&self, _effect_id: EffectId, _value: &Value) {}

    fn effect_rejected(&self, _effect_id: EffectId, _error: &SagaError) {}

    fn effect_cancelled(&self, _effect_id: EffectId) {}

    /// Every message the environment emits, as seen by the runtime.
    fn message_dispatched(&self, _message: &Message) {}
}

impl dyn Monitor {
    pub(crate) fn effect_settled(&self, effect_id: EffectId, outcome: &Outcome) {
        match outcome {
            Ok(value) => self.effect_resolved(effect_id, value),
            Err(error) => self.effect_rejected(effect_id, error),
        }
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct NoopMonitor;

impl Monitor for NoopMonitor {}
