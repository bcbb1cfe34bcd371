//! Ports - 抽象化レイヤー
//!
//! runtime が外部に求めるものを trait として定義します。
//! 実装の詳細 (store, log の出力先, 時刻, ID) は差し替え可能です。
//!
//! - **Environment**: message の購読・dispatch・state の読み出し
//! - **Monitor**: effect のライフサイクルを観測する hook
//! - **Logger**: 診断メッセージの出力先
//! - **Clock / IdGenerator**: 時刻と ID の生成

pub mod clock;
pub mod environment;
pub mod id_generator;
pub mod logger;
pub mod monitor;

pub use self::clock::{Clock, FixedClock, SystemClock};
pub use self::environment::{Dispatched, Environment};
pub use self::id_generator::{IdGenerator, UlidGenerator};
pub use self::logger::{Level, Logger, TracingLogger};
pub use self::monitor::{EffectInfo, Monitor, NoopMonitor};
