use thiserror::Error;

/// Errors from an audit sink.
///
/// Callers treat every variant as soft: the event is logged and dropped.
#[derive(Debug, Error)]
pub enum AuditError {
    /// The sink could not be reached, or did not answer in time.
    #[error("audit sink unavailable: {0}")]
    Unavailable(String),

    /// The sink answered with a non-success status.
    #[error("audit sink rejected event ({status}): {body}")]
    Rejected { status: u16, body: String },

    #[error("audit client error: {0}")]
    Client(String),
}

pub type AuditResult<T> = Result<T, AuditError>;

impl From<reqwest::Error> for AuditError {
    fn from(err: reqwest::Error) -> Self {
        if let Some(status) = err.status() {
            Self::Rejected {
                status: status.as_u16(),
                body: err.to_string(),
            }
        } else {
            Self::Unavailable(err.to_string())
        }
    }
}
