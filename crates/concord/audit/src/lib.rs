//! Concord Audit - outbound notification of committed registry changes.
//!
//! The sink is picked once from [`AuditConfig`]: an endpoint gives an
//! [`HttpAuditSink`], anything else a [`LoggingAuditSink`]. Delivery failures
//! surface as [`AuditError`] and are never fatal to the caller.

#![deny(unsafe_code)]

pub mod config;
pub mod error;
pub mod http;
pub mod sink;

pub use config::AuditConfig;
pub use error::{AuditError, AuditResult};
pub use http::HttpAuditSink;
pub use sink::{AuditEvent, AuditSink, LoggingAuditSink, MemoryAuditSink};

use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Build the sink described by `config`.
pub fn build_audit_sink(config: &AuditConfig) -> Arc<dyn AuditSink> {
    let endpoint = config
        .endpoint
        .as_deref()
        .map(str::trim)
        .filter(|e| !e.is_empty());

    match endpoint {
        Some(endpoint) => {
            match HttpAuditSink::new(endpoint, Duration::from_millis(config.timeout_ms)) {
                Ok(sink) => {
                    info!(endpoint, "audit events go to HTTP sink");
                    Arc::new(sink)
                }
                Err(err) => {
                    warn!(endpoint, error = %err, "HTTP audit sink unavailable; logging only");
                    Arc::new(LoggingAuditSink)
                }
            }
        }
        None => Arc::new(LoggingAuditSink),
    }
}
