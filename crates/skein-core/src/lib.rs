//! skein-core
//!
//! Cooperative, effect-driven task runtime: workflows yield effect
//! descriptions and a driver interprets them against a message source.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, message, pattern, value, effect, context）
//! - **channel**: buffer, channel, emitter
//! - **scheduler**: put の配送順序を守る micro-task queue
//! - **workflow**: Workflow trait と async block を包む Coroutine
//! - **effects**: effect コンストラクタと helper (take_every など)
//! - **proc**: task driver, fork queue, all/race
//! - **helpers**: FSM ベースの helper 実装
//! - **ports**: 抽象化レイヤー（Environment, Monitor, Logger, Clock, IdGenerator）
//! - **app**: RuntimeBuilder と Runtime
//! - **impls**: 実装（MemoryEnv, RecordingMonitor など開発用）
//!
//! # 実行モデル
//! runtime は単一スレッド (`Rc` / `RefCell`) です。future を待つ effect
//! (`delay`, async routine の `call`, `put_resolve`) を使う場合は
//! `tokio::task::LocalSet` の中で動かしてください。

pub mod app;
pub mod channel;
pub mod domain;
pub mod effects;
pub mod error;
pub mod helpers;
pub mod impls;
pub mod ports;
pub mod proc;
pub mod scheduler;
pub mod workflow;

pub use app::{BuildError, Runtime, RuntimeBuilder, RuntimeConfig};
pub use channel::{BufferSpec, Channel};
pub use domain::{Context, Effect, Keyed, Message, Pattern, Routine, Value};
pub use error::SagaError;
pub use proc::Task;
pub use workflow::{Coroutine, Cx, Interrupt, Resume, Step, Workflow};
