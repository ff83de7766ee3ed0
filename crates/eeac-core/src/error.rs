//! Error taxonomy shared by every EEAC crate.
//!
//! [`EeacError`] separates the failures that abort a run before any numeric
//! work (configuration and tree validation) from the ones that are confined
//! to a single branch of the execution tree (candidate exhaustion, numeric
//! non-convergence, degenerate OMIB models).
//!
//! # Example
//!
//! ```
//! use eeac_core::{EeacError, EeacResult};
//!
//! fn check_threshold(threshold: f64) -> EeacResult<f64> {
//!     if threshold <= 0.0 || threshold >= 1.0 {
//!         return Err(EeacError::Config(format!("threshold {threshold} not in (0, 1)")));
//!     }
//!     Ok(threshold)
//! }
//!
//! assert!(check_threshold(0.5).is_ok());
//! assert!(check_threshold(1.5).is_err());
//! ```

use thiserror::Error;

/// Unified error type for EEAC operations.
#[derive(Error, Debug)]
pub enum EeacError {
    /// I/O errors (snapshot files, output directories)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Parsing/deserialization errors
    #[error("Parse error: {0}")]
    Parse(String),

    /// Invalid parameter or parameter combination
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed execution tree; carries every issue found
    #[error("Invalid execution tree: {}", .0.join("; "))]
    Validation(Vec<String>),

    /// No viable critical cluster candidate
    #[error("Candidate exhaustion: {0}")]
    CandidateExhaustion(String),

    /// Balance or crossing not reached within the configured bounds
    #[error("Numeric non-convergence: {0}")]
    NonConvergence(String),

    /// OMIB reduction on an empty or zero-inertia cluster, or a singular network
    #[error("Degenerate model: {0}")]
    DegenerateModel(String),

    /// Generic errors (for wrapping external errors)
    #[error("{0}")]
    Other(String),
}

impl EeacError {
    /// True for errors that must abort the run before execution starts.
    pub fn is_fatal(&self) -> bool {
        matches!(self, EeacError::Config(_) | EeacError::Validation(_))
    }
}

/// Convenience type alias for Results using EeacError.
pub type EeacResult<T> = Result<T, EeacError>;

impl From<anyhow::Error> for EeacError {
    fn from(err: anyhow::Error) -> Self {
        EeacError::Other(err.to_string())
    }
}

impl From<String> for EeacError {
    fn from(s: String) -> Self {
        EeacError::Other(s)
    }
}

impl From<&str> for EeacError {
    fn from(s: &str) -> Self {
        EeacError::Other(s.to_string())
    }
}

impl From<serde_json::Error> for EeacError {
    fn from(err: serde_json::Error) -> Self {
        EeacError::Parse(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validation_lists_every_issue() {
        let err = EeacError::Validation(vec!["duplicate id 3".into(), "node 7 cannot be a leaf".into()]);
        let msg = err.to_string();
        assert!(msg.contains("duplicate id 3"));
        assert!(msg.contains("node 7 cannot be a leaf"));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_branch_errors_are_not_fatal() {
        assert!(!EeacError::NonConvergence("no crossing".into()).is_fatal());
        assert!(!EeacError::DegenerateModel("empty cluster".into()).is_fatal());
        assert!(!EeacError::CandidateExhaustion("none".into()).is_fatal());
    }

    #[test]
    fn test_io_error_conversion() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err: EeacError = io_err.into();
        assert!(matches!(err, EeacError::Io(_)));
    }

    #[test]
    fn test_json_error_conversion() {
        let parse: Result<serde_json::Value, _> = serde_json::from_str("{not json");
        let err: EeacError = parse.unwrap_err().into();
        assert!(matches!(err, EeacError::Parse(_)));
    }
}
