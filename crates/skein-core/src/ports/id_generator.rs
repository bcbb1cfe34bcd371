//! IdGenerator port - ID 生成の抽象化
//!
//! # 実装
//! - **UlidGenerator**: Clock の時刻 + 乱数で ULID を作る

use ulid::Ulid;

use crate::domain::ids::{EffectId, TaskId};
use crate::ports::Clock;

/// IdGenerator は task と effect の ID を生成
///
/// runtime は単一スレッドなので `Send + Sync` は要求しません。
pub trait IdGenerator {
    fn task_id(&self) -> TaskId;

    fn effect_id(&self) -> EffectId;
}

/// Clock を使って現在時刻ベースの ULID を生成します。
/// テストでは FixedClock を渡すと timestamp 部分が固定されます。
pub struct UlidGenerator<C> {
    clock: C,
}

impl<C: Clock> UlidGenerator<C> {
    pub fn new(clock: C) -> Self {
        Self { clock }
    }

    fn next_ulid(&self) -> Ulid {
        let timestamp_ms = self.clock.now().timestamp_millis() as u64;
        Ulid::from_parts(timestamp_ms, rand::random())
    }
}

impl<C: Clock> IdGenerator for UlidGenerator<C> {
    fn task_id(&self) -> TaskId {
        TaskId::from(self.next_ulid())
    }

    fn effect_id(&self) -> EffectId {
        EffectId::from(self.next_ulid())
    }
}
