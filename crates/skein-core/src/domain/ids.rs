//! Domain identifiers (strongly-typed IDs).
//!
//! # ULID ベースの ID + Phantom type
//! Task と Effect の ID は ULID (時刻でソート可能な 128-bit ID) を使います。
//! `Id<T>` で共通実装を提供し、`T` は実行時には使わないマーカー型として
//! コンパイル時の型安全性だけを与えます (TaskId と EffectId は混同できない)。

use serde::{Deserialize, Serialize};
use std::fmt;
use std::marker::PhantomData;
use ulid::Ulid;

/// IdMarker は各 ID 型のマーカー trait
///
/// Display で使うプレフィックス（"task-", "effect-"）を提供します。
pub trait IdMarker: Send + Sync + 'static {
    fn prefix() -> &'static str;
}

/// ジェネリック ID 型
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Id<T: IdMarker> {
    ulid: Ulid,
    #[serde(skip)]
    _marker: PhantomData<T>,
}

impl<T: IdMarker> Id<T> {
    pub fn from_ulid(ulid: Ulid) -> Self {
        Self {
            ulid,
            _marker: PhantomData,
        }
    }

    pub fn as_ulid(&self) -> Ulid {
        self.ulid
    }
}

impl<T: IdMarker> From<Ulid> for Id<T> {
    fn from(ulid: Ulid) -> Self {
        Self::from_ulid(ulid)
    }
}

impl<T: IdMarker> fmt::Display for Id<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", T::prefix(), self.ulid)
    }
}

// ========================================
// マーカー型の定義
// ========================================

/// Task のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum TaskMarker {}

impl IdMarker for TaskMarker {
    fn prefix() -> &'static str {
        "task-"
    }
}

/// Effect のマーカー型
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum EffectMarker {}

impl IdMarker for EffectMarker {
    fn prefix() -> &'static str {
        "effect-"
    }
}

/// Identifier of a running task (one driven workflow).
pub type TaskId = Id<TaskMarker>;

/// Identifier of one yielded effect. Monitors use it to rebuild the effect tree.
pub type EffectId = Id<EffectMarker>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_carry_their_prefix() {
        let task = TaskId::from_ulid(Ulid::new());
        let effect = EffectId::from_ulid(Ulid::new());

        assert!(task.to_string().starts_with("task-"));
        assert!(effect.to_string().starts_with("effect-"));
        // let _: TaskId = effect; // <- does not compile
    }

    #[test]
    fn ids_roundtrip_through_json() {
        let id = EffectId::from_ulid(Ulid::new());
        let s = serde_json::to_string(&id).unwrap();
        let back: EffectId = serde_json::from_str(&s).unwrap();
        assert_eq!(id, back);
    }

    #[test]
    fn phantom_marker_is_free() {
        assert_eq!(std::mem::size_of::<TaskId>(), std::mem::size_of::<Ulid>());
    }
}
