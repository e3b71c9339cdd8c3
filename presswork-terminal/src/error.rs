//! Error types for presswork-terminal

use std::time::Duration;

use thiserror::Error;

/// Terminal-side failures talking to the server
#[derive(Debug, Error)]
pub enum TerminalError {
    /// Connection refused, reset, DNS failure
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    /// Server answered with an error body
    #[error("{code}: {message}")]
    Server {
        status: u16,
        code: String,
        message: String,
    },

    /// Server base URL cannot carry request paths
    #[error("Invalid server URL: {0}")]
    InvalidUrl(String),

    /// Response body did not match the expected shape
    #[error("Decode error: {0}")]
    Decode(String),
}

impl TerminalError {
    /// Failures the poller and push client simply retry later
    pub fn is_transient(&self) -> bool {
        match self {
            TerminalError::Network(_) | TerminalError::Timeout(_) => true,
            TerminalError::Server { status, .. } => *status >= 500,
            TerminalError::InvalidUrl(_) | TerminalError::Decode(_) => false,
        }
    }

    /// One-line message for the operator at the terminal
    ///
    /// Lost races read differently from bad input so nobody resubmits a
    /// request someone else already handled.
    pub fn user_message(&self) -> String {
        match self {
            TerminalError::Server { code, message, .. } if code == "CONFLICT" => {
                format!("Already handled by someone else: {}", message)
            }
            TerminalError::Server { code, message, .. } if code == "VALIDATION_ERROR" => {
                format!("Please check your input: {}", message)
            }
            TerminalError::Server { code, message, .. } if code == "INVALID_TRANSITION" => {
                format!("Not allowed right now: {}", message)
            }
            TerminalError::Server { code, message, .. } if code == "NOT_FOUND" => {
                format!("Not found: {}", message)
            }
            other if other.is_transient() => {
                "Server unavailable, the view will catch up automatically".to_string()
            }
            other => other.to_string(),
        }
    }
}

impl From<reqwest::Error> for TerminalError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            TerminalError::Decode(err.to_string())
        } else {
            TerminalError::Network(err.to_string())
        }
    }
}

/// Result type for terminal operations
pub type TerminalResult<T> = Result<T, TerminalError>;

#[cfg(test)]
mod tests {
    use super::*;

    fn server(code: &str) -> TerminalError {
        TerminalError::Server {
            status: 409,
            code: code.to_string(),
            message: "Reprint request was already processed by someone else".to_string(),
        }
    }

    #[test]
    fn test_conflict_reads_differently_from_validation() {
        assert!(server("CONFLICT").user_message().starts_with("Already handled"));
        assert!(server("VALIDATION_ERROR").user_message().starts_with("Please check"));
    }

    #[test]
    fn test_transient_classification() {
        assert!(TerminalError::Timeout(Duration::from_secs(10)).is_transient());
        assert!(TerminalError::Network("refused".into()).is_transient());
        assert!(!server("CONFLICT").is_transient());
        assert!(TerminalError::Server {
            status: 503,
            code: "TRANSIENT_IO".into(),
            message: String::new(),
        }
        .is_transient());
    }
}
