//! Logger port - 診断メッセージの出力先
//!
//! デフォルトは `tracing` に流す [`TracingLogger`]。

use crate::error::SagaError;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

pub trait Logger {
    fn log(&self, level: Level, message: &str, error: Option<&SagaError>);
}

/// Forwards to the `tracing` macros of the matching level.
#[derive(Debug, Clone, Copy, Default)]
pub struct TracingLogger;

impl Logger for TracingLogger {
    fn log(&self, level: Level, message: &str, error: Option<&SagaError>) {
        match (level, error) {
            (Level::Debug, None) => tracing::debug!("{message}"),
            (Level::Debug, Some(e)) => tracing::debug!(error = %e, "{message}"),
            (Level::Info, None) => tracing::info!("{message}"),
            (Level::Info, Some(e)) => tracing::info!(error = %e, "{message}"),
            (Level::Warn, None) => tracing::warn!("{message}"),
            (Level::Warn, Some(e)) => tracing::warn!(error = %e, "{message}"),
            (Level::Error, None) => tracing::error!("{message}"),
            (Level::Error, Some(e)) => tracing::error!(error = %e, "{message}"),
        }
    }
}
