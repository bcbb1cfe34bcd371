//! Runtime configuration.
//!
//! 全フィールドにデフォルト値があるので、JSON の一部だけを書けば十分です。

use serde::{Deserialize, Serialize};

use crate::channel::DEFAULT_LIMIT;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Capacity of the fixed buffer used by `action_channel` without an explicit buffer.
    pub default_buffer_limit: usize,

    /// Name given to root tasks started without one.
    pub root_name: String,

    /// Log errors a workflow raises while running its cancellation cleanup.
    pub log_cancellation_errors: bool,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            default_buffer_limit: DEFAULT_LIMIT,
            root_name: "root".to_string(),
            log_cancellation_errors: true,
        }
    }
}
