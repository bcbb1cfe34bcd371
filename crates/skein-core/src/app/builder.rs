//! RuntimeBuilder - runtime の構築とワイヤリング
//!
//! # Fail-fast 設計
//! - build() 時に設定を検証し、不正なら BuildError を返す
//! - 省略した port にはデフォルト実装 (TracingLogger, NoopMonitor, UlidGenerator) を使う

use std::rc::Rc;

use crate::domain::{Context, Value};
use crate::error::SagaError;
use crate::ports::{
    Environment, IdGenerator, Logger, Monitor, NoopMonitor, SystemClock, TracingLogger,
    UlidGenerator,
};
use crate::proc::{ErrorHook, Shared};
use crate::scheduler::Scheduler;

use super::config::RuntimeConfig;
use super::runtime::Runtime;

/// RuntimeBuilder は Runtime を構築
///
/// # 使用例
/// ```ignore
/// let runtime = RuntimeBuilder::new(Rc::new(MemoryEnv::new()))
///     .on_error(|e| eprintln!("{e}"))
///     .context("api", Value::data("https://example.test"))
///     .build()?;
/// ```
pub struct RuntimeBuilder {
    env: Rc<dyn Environment>,
    config: RuntimeConfig,
    monitor: Option<Rc<dyn Monitor>>,
    logger: Rc<dyn Logger>,
    on_error: Option<ErrorHook>,
    context: Vec<(String, Value)>,
    ids: Rc<dyn IdGenerator>,
}

/// BuildError は runtime 構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("default_buffer_limit must be positive")]
    ZeroBufferLimit,

    #[error("root_name must not be empty")]
    EmptyRootName,
}

impl RuntimeBuilder {
    pub fn new(env: Rc<dyn Environment>) -> Self {
        Self {
            env,
            config: RuntimeConfig::default(),
            monitor: None,
            logger: Rc::new(TracingLogger),
            on_error: None,
            context: Vec::new(),
            ids: Rc::new(UlidGenerator::new(SystemClock)),
        }
    }

    pub fn config(mut self, config: RuntimeConfig) -> Self {
        self.config = config;
        self
    }

    pub fn monitor(mut self, monitor: Rc<dyn Monitor>) -> Self {
        self.monitor = Some(monitor);
        self
    }

    pub fn logger(mut self, logger: Rc<dyn Logger>) -> Self {
        self.logger = logger;
        self
    }

    /// Errors escaping a root or detached task go here instead of the logger.
    pub fn on_error(mut self, hook: impl Fn(&SagaError) + 'static) -> Self {
        self.on_error = Some(Rc::new(hook));
        self
    }

    /// Initial value in the root context, visible to every task.
    pub fn context(mut self, key: impl Into<String>, value: Value) -> Self {
        self.context.push((key.into(), value));
        self
    }

    pub fn id_generator(mut self, ids: Rc<dyn IdGenerator>) -> Self {
        self.ids = ids;
        self
    }

    /// # 検証
    /// - default_buffer_limit > 0
    /// - root_name が空でない
    pub fn build(self) -> Result<Runtime, BuildError> {
        if self.config.default_buffer_limit == 0 {
            return Err(BuildError::ZeroBufferLimit);
        }
        if self.config.root_name.is_empty() {
            return Err(BuildError::EmptyRootName);
        }

        let monitor_dispatches = self.monitor.is_some();
        let monitor: Rc<dyn Monitor> = match self.monitor {
            Some(monitor) => monitor,
            None => Rc::new(NoopMonitor),
        };
        let shared = Rc::new(Shared {
            env: self.env,
            scheduler: Scheduler::new(),
            monitor,
            logger: self.logger,
            on_error: self.on_error,
            config: self.config,
            ids: self.ids,
        });
        Ok(Runtime::new(
            shared,
            Context::with_values(self.context),
            monitor_dispatches,
        ))
    }
}
