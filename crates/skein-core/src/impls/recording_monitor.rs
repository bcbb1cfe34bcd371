//! RecordingMonitor - effect ツリーを記録する Monitor
//!
//! 記録は serde で JSON に書き出せます (CLI のトレース出力、テストの検証用)。

use std::cell::RefCell;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::domain::{EffectId, Message, Value};
use crate::error::SagaError;
use crate::ports::{Clock, EffectInfo, Monitor, SystemClock};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectStatus {
    Pending,
    Resolved,
    Rejected,
    Cancelled,
}

/// One triggered effect and how it ended.
#[derive(Debug, Clone, Serialize)]
pub struct EffectRecord {
    pub effect_id: EffectId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<EffectId>,
    #[serde(skip_serializing_if = "String::is_empty")]
    pub label: String,
    pub kind: String,
    pub description: String,
    pub status: EffectStatus,
    /// Debug rendering of the resolved value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub triggered_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub settled_at: Option<DateTime<Utc>>,
}

pub struct RecordingMonitor<C: Clock = SystemClock> {
    clock: C,
    records: RefCell<Vec<EffectRecord>>,
    messages: RefCell<Vec<Message>>,
}

impl RecordingMonitor<SystemClock> {
    pub fn new() -> Self {
        Self::with_clock(SystemClock)
    }
}

impl Default for RecordingMonitor<SystemClock> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C: Clock> RecordingMonitor<C> {
    pub fn with_clock(clock: C) -> Self {
        Self {
            clock,
            records: RefCell::new(Vec::new()),
            messages: RefCell::new(Vec::new()),
        }
    }

    /// Records in trigger order.
    pub fn records(&self) -> Vec<EffectRecord> {
        self.records.borrow().clone()
    }

    pub fn record(&self, effect_id: EffectId) -> Option<EffectRecord> {
        self.records
            .borrow()
            .iter()
            .find(|r| r.effect_id == effect_id)
            .cloned()
    }

    /// Direct children of `parent`, in trigger order.
    pub fn children(&self, parent: EffectId) -> Vec<EffectRecord> {
        self.records
            .borrow()
            .iter()
            .filter(|r| r.parent_id == Some(parent))
            .cloned()
            .collect()
    }

    pub fn messages(&self) -> Vec<Message> {
        self.messages.borrow().clone()
    }

    pub fn to_json(&self) -> Result<String, SagaError> {
        serde_json::to_string_pretty(&*self.records.borrow())
            .map_err(|e| SagaError::internal(format!("failed to encode effect records: {e}")))
    }

    fn settle(&self, effect_id: EffectId, status: EffectStatus, result: Option<String>, error: Option<String>) {
        let now = self.clock.now();
        let mut records = self.records.borrow_mut();
        if let Some(record) = records.iter_mut().find(|r| r.effect_id == effect_id) {
            if record.status == EffectStatus::Pending {
                record.status = status;
                record.result = result;
                record.error = error;
                record.settled_at = Some(now);
            }
        }
    }
}

impl<C: Clock> Monitor for RecordingMonitor<C> {
    fn effect_triggered(&self, info: &EffectInfo) {
        let record = EffectRecord {
            effect_id: info.effect_id,
            parent_id: info.parent_id,
            label: info.label.clone(),
            kind: info.kind.to_string(),
            description: info.description.clone(),
            status: EffectStatus::Pending,
            result: None,
            error: None,
            triggered_at: self.clock.now(),
            settled_at: None,
        };
        self.records.borrow_mut().push(record);
    }

    fn effect_resolved(&self, effect_id: EffectId, value: &Value) {
        self.settle(effect_id, EffectStatus::Resolved, Some(format!("{value:?}")), None);
    }

    fn effect_rejected(&self, effect_id: EffectId, error: &SagaError) {
        self.settle(effect_id, EffectStatus::Rejected, None, Some(error.to_string()));
    }

    fn effect_cancelled(&self, effect_id: EffectId) {
        self.settle(effect_id, EffectStatus::Cancelled, None, None);
    }

    fn message_dispatched(&self, message: &Message) {
        self.messages.borrow_mut().push(message.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ports::{FixedClock, IdGenerator, UlidGenerator};
    use chrono::TimeZone;

    fn info(ids: &impl IdGenerator, parent: Option<EffectId>, kind: &'static str) -> EffectInfo {
        EffectInfo {
            effect_id: ids.effect_id(),
            parent_id: parent,
            label: String::new(),
            kind,
            description: kind.to_string(),
        }
    }

    #[test]
    fn records_lifecycle_and_tree() {
        let at = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let clock = FixedClock::new(at);
        let ids = UlidGenerator::new(clock);
        let monitor = RecordingMonitor::with_clock(clock);

        let root = info(&ids, None, "root");
        let take = info(&ids, Some(root.effect_id), "take");
        monitor.effect_triggered(&root);
        monitor.effect_triggered(&take);
        monitor.effect_resolved(root.effect_id, &Value::Unit);
        monitor.effect_cancelled(take.effect_id);
        // 一度 settle した記録は上書きしない
        monitor.effect_rejected(take.effect_id, &SagaError::workflow("late"));

        let records = monitor.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].status, EffectStatus::Resolved);
        assert_eq!(records[1].status, EffectStatus::Cancelled);
        assert_eq!(records[1].settled_at, Some(at));
        assert_eq!(monitor.children(root.effect_id).len(), 1);
    }

    #[test]
    fn serializes_to_json() {
        let monitor = RecordingMonitor::new();
        let ids = UlidGenerator::new(SystemClock);
        let root = info(&ids, None, "root");
        monitor.effect_triggered(&root);
        monitor.effect_rejected(root.effect_id, &SagaError::workflow("boom"));

        let json = monitor.to_json().unwrap();
        assert!(json.contains("\"status\": \"rejected\""));
        assert!(json.contains("boom"));
        assert!(!json.contains("parent_id"));
    }
}
