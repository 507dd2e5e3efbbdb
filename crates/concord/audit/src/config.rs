use serde::{Deserialize, Serialize};

/// Audit sink configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditConfig {
    /// Base URL of the HTTP audit service. Without one, events are only logged.
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Upper bound on one notification.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

impl Default for AuditConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl AuditConfig {
    pub fn http(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            ..Default::default()
        }
    }
}

fn default_timeout_ms() -> u64 {
    3_000
}
