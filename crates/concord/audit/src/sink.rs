//! The audit sink trait and its in-process implementations.

use crate::error::AuditResult;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

/// One outbound notification.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct AuditEvent {
    pub event_type: String,
    pub payload: Value,
    pub sent_at: DateTime<Utc>,
}

impl AuditEvent {
    pub fn new(event_type: &str, payload: Value) -> Self {
        Self {
            event_type: event_type.to_string(),
            payload,
            sent_at: Utc::now(),
        }
    }
}

/// Receives a notification for every committed registry change.
#[async_trait]
pub trait AuditSink: Send + Sync {
    /// Deliver one event.
    async fn notify(&self, event_type: &str, payload: Value) -> AuditResult<()>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Sink that only records events in the trace log.
#[derive(Debug, Default, Clone, Copy)]
pub struct LoggingAuditSink;

#[async_trait]
impl AuditSink for LoggingAuditSink {
    async fn notify(&self, event_type: &str, payload: Value) -> AuditResult<()> {
        debug!(event_type, %payload, "audit event");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}

/// In-memory sink for tests and embedding.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    events: RwLock<Vec<AuditEvent>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.read().clone()
    }

    pub fn event_types(&self) -> Vec<String> {
        self.events
            .read()
            .iter()
            .map(|e| e.event_type.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.events.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.read().is_empty()
    }

    pub fn clear(&self) {
        self.events.write().clear();
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn notify(&self, event_type: &str, payload: Value) -> AuditResult<()> {
        self.events.write().push(AuditEvent::new(event_type, payload));
        Ok(())
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn memory_sink_captures_in_order() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());

        sink.notify("create_proposal", json!({"id": "p1"})).await.unwrap();
        sink.notify("cast_vote", json!({"member_id": "m1"})).await.unwrap();

        assert_eq!(sink.len(), 2);
        assert_eq!(sink.event_types(), vec!["create_proposal", "cast_vote"]);
        assert_eq!(sink.events()[0].payload["id"], "p1");

        sink.clear();
        assert!(sink.is_empty());
    }

    #[tokio::test]
    async fn logging_sink_never_fails() {
        LoggingAuditSink
            .notify("update_status", json!({"key": "k"}))
            .await
            .unwrap();
    }

    #[test]
    fn event_wire_shape() {
        let event = AuditEvent::new("cast_vote", json!({"v": 1}));
        let wire = serde_json::to_value(&event).unwrap();
        assert_eq!(wire["event_type"], "cast_vote");
        assert_eq!(wire["payload"]["v"], 1);
        assert!(wire["sent_at"].is_string());
    }
}
