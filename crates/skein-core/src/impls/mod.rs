//! Impls - ports の実装（開発用・テスト用）
//!
//! # 含まれる実装
//! - **MemoryEnv**: in-memory の Environment (dispatch 履歴と state を持つ)
//! - **RecordingMonitor**: effect のライフサイクルを記録する Monitor

pub mod memory_env;
pub mod recording_monitor;

pub use self::memory_env::{Acknowledge, MemoryEnv};
pub use self::recording_monitor::{EffectRecord, EffectStatus, RecordingMonitor};
