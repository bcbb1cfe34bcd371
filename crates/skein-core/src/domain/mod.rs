//! Domain model: messages, values, effects, ids and task context.
//!
//! - **message**: `Message` と take が待つ `Pattern`
//! - **value**: effect の結果として流れる動的な値
//! - **effect**: workflow が yield する effect 記述子
//! - **context**: 親 task に連鎖する scope
//! - **ids**: ULID ベースの TaskId / EffectId

pub mod context;
pub mod effect;
pub mod ids;
pub mod message;
pub mod value;

pub use self::context::Context;
pub use self::effect::{
    CancelHook, CancelTarget, CpsCallback, CpsRoutine, Effect, Keyed, LocalFuture, Outcome,
    Returned, Routine, Selector, Shape, Source,
};
pub use self::ids::{EffectId, TaskId};
pub use self::message::{Matcher, Message, Pattern, Predicate, END_TYPE};
pub use self::value::Value;
