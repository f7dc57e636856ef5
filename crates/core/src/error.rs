//! Unified error types for stowaway.
//!
//! Every variant's message starts with a stable code so callers (and the MCP
//! surface) can match on it without parsing prose.

use std::fmt;

use rmcp::model::{ErrorCode, ErrorData as McpError};

/// Unified error types for the offline cache.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Fingerprint input was empty or not a URL.
    #[error("INVALID_KEY_INPUT: {0}")]
    InvalidKeyInput(String),

    /// Invalid URL.
    #[error("INVALID_URL: {0}")]
    InvalidUrl(String),

    /// Invalid input parameters.
    #[error("INVALID_INPUT: {0}")]
    InvalidInput(String),

    /// Disk read, write or delete failed.
    #[error("IO_FAILURE: {0}")]
    Io(#[from] std::io::Error),

    /// The store has no room for the entry at all.
    #[error("CAPACITY_EXCEEDED: entry of {size} bytes does not fit a budget of {max} bytes")]
    CapacityExceeded { size: u64, max: u64 },

    /// A stored entry could not be decoded.
    #[error("CORRUPT_ENTRY: {0}")]
    CorruptEntry(String),

    /// One or more responses of a page unit failed to commit.
    #[error("COMMIT_FAILED: {0}")]
    AggregatedCommitFailure(AggregatedCommitFailure),

    /// No offline entry exists for the given URL.
    #[error("CACHE_MISS: {0}")]
    CacheMiss(String),

    /// Render mode is disabled.
    #[error("RENDER_DISABLED")]
    RenderDisabled,

    /// Render failed.
    #[error("RENDER_FAILED: {0}")]
    RenderFailed(String),

    /// A page load was cancelled before it committed anything.
    #[error("CANCELLED: {0}")]
    Cancelled(String),

    /// The URL already belongs to an in-flight page load.
    #[error("ALREADY_IN_FLIGHT: {0}")]
    AlreadyInFlight(String),
}

/// A single response that could not be written during a page commit.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct CommitFailure {
    pub url: String,
    pub reason: String,
}

/// Every failed commit of one page unit, plus how many succeeded.
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize)]
pub struct AggregatedCommitFailure {
    pub failures: Vec<CommitFailure>,
    pub committed: usize,
}

impl AggregatedCommitFailure {
    /// URLs that failed to commit, in commit order.
    pub fn failed_urls(&self) -> Vec<&str> {
        self.failures.iter().map(|f| f.url.as_str()).collect()
    }
}

impl fmt::Display for AggregatedCommitFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} of {} responses failed to commit",
            self.failures.len(),
            self.failures.len() + self.committed
        )?;
        for failure in &self.failures {
            write!(f, "; {} ({})", failure.url, failure.reason)?;
        }
        Ok(())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::CorruptEntry(err.to_string())
    }
}

impl From<Error> for McpError {
    fn from(err: Error) -> Self {
        let (code, message) = match &err {
            Error::InvalidInput(msg) => (-32602, msg.clone()),
            Error::InvalidKeyInput(msg) => (-32602, msg.clone()),
            Error::InvalidUrl(msg) => (-32003, msg.clone()),
            Error::CacheMiss(msg) => (-32001, msg.clone()),
            Error::Io(e) => (-32002, e.to_string()),
            Error::CorruptEntry(msg) => (-32002, msg.clone()),
            Error::CapacityExceeded { .. } => (-32013, err.to_string()),
            Error::AggregatedCommitFailure(failure) => (-32014, failure.to_string()),
            Error::RenderDisabled => (-32011, "Render mode is disabled".to_string()),
            Error::RenderFailed(msg) => (-32012, msg.clone()),
            Error::Cancelled(msg) => (-32015, msg.clone()),
            Error::AlreadyInFlight(msg) => (-32016, msg.clone()),
        };

        McpError { code: ErrorCode(code), message: message.into(), data: None }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::CacheMiss("https://example.com/".to_string());
        assert!(err.to_string().contains("CACHE_MISS"));
        assert!(err.to_string().contains("example.com"));
    }

    #[test]
    fn test_capacity_display() {
        let err = Error::CapacityExceeded { size: 10, max: 0 };
        assert_eq!(err.to_string(), "CAPACITY_EXCEEDED: entry of 10 bytes does not fit a budget of 0 bytes");
    }

    #[test]
    fn test_aggregated_failure_names_urls() {
        let failure = AggregatedCommitFailure {
            failures: vec![CommitFailure { url: "https://example.com/a.css".into(), reason: "disk full".into() }],
            committed: 2,
        };
        let message = Error::AggregatedCommitFailure(failure.clone()).to_string();
        assert!(message.starts_with("COMMIT_FAILED: 1 of 3 responses failed to commit"));
        assert!(message.contains("https://example.com/a.css (disk full)"));
        assert_eq!(failure.failed_urls(), vec!["https://example.com/a.css"]);
    }

    #[test]
    fn test_error_to_mcp_error() {
        let err = Error::CacheMiss("abc123".to_string());
        let mcp_err: McpError = err.into();
        assert_eq!(mcp_err.code.0, -32001);
    }
}
