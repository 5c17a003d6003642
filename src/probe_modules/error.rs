use thiserror::Error;

/// Every way a single check can fail to produce a status from data.
///
/// The orchestrator reports all of them as UNKNOWN using the `Display` text,
/// but the variants stay distinct so callers can branch on the kind.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProbeError {
    #[error("{0}")]
    Transport(String),
    #[error("API Error: {reason} ({detail})")]
    Auth {
        status: u16,
        reason: String,
        detail: String,
    },
    #[error("API Error: {reason} ({detail})")]
    NotFound {
        status: u16,
        reason: String,
        detail: String,
    },
    #[error("API Error: {reason} ({detail})")]
    Api {
        status: u16,
        reason: String,
        detail: String,
    },
    #[error("{0}")]
    Decode(String),
    #[error("{0}")]
    Parse(String),
    #[error("{0}")]
    Config(String),
}

impl ProbeError {
    /// Classifies a structured non-200 error body by its HTTP status.
    pub fn from_status(status: u16, reason: String, detail: String) -> Self {
        match status {
            401 | 403 => ProbeError::Auth {
                status,
                reason,
                detail,
            },
            404 => ProbeError::NotFound {
                status,
                reason,
                detail,
            },
            _ => ProbeError::Api {
                status,
                reason,
                detail,
            },
        }
    }
}

impl From<reqwest::Error> for ProbeError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            ProbeError::Transport(format!(
                "Failed to make HTTP request. Error: request timed out ({err})"
            ))
        } else {
            ProbeError::Transport(format!("Failed to make HTTP request. Error: {err}"))
        }
    }
}
