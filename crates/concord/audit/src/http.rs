//! HTTP audit sink.

use crate::error::{AuditError, AuditResult};
use crate::sink::{AuditEvent, AuditSink};
use async_trait::async_trait;
use reqwest::Client;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

/// Posts each event as JSON to `<base_url>/events`.
pub struct HttpAuditSink {
    client: Client,
    base_url: String,
}

impl HttpAuditSink {
    pub fn new(base_url: &str, timeout: Duration) -> AuditResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .build()
            .map_err(|e| AuditError::Client(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn events_url(&self) -> String {
        format!("{}/events", self.base_url)
    }
}

#[async_trait]
impl AuditSink for HttpAuditSink {
    async fn notify(&self, event_type: &str, payload: Value) -> AuditResult<()> {
        let event = AuditEvent::new(event_type, payload);
        let response = self
            .client
            .post(self.events_url())
            .json(&event)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(AuditError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        debug!(event_type, status = status.as_u16(), "audit event delivered");
        Ok(())
    }

    fn name(&self) -> &'static str {
        "http"
    }
}
