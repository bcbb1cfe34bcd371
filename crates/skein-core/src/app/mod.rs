//! App - アプリケーション層
//!
//! ports を組み合わせて runtime を組み立てます。
//!
//! # 主要コンポーネント
//! - **RuntimeConfig**: serde で読める設定 (デフォルト値あり)
//! - **RuntimeBuilder**: ワイヤリングと起動時検証
//! - **Runtime**: root task の起動

pub mod builder;
pub mod config;
pub mod runtime;

pub use self::builder::{BuildError, RuntimeBuilder};
pub use self::config::RuntimeConfig;
pub use self::runtime::Runtime;
