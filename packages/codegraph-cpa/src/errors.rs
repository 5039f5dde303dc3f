//! Error types for codegraph-cpa
//!
//! Only structural problems are errors. Unresolved calls, context overflow and
//! non-convergence are reported as [`Diagnostic`](crate::features::cpa::domain::Diagnostic)s.

use crate::config::ConfigError;
use thiserror::Error;

/// Main error type for codegraph-cpa operations
#[derive(Debug, Error)]
pub enum CpaError {
    /// A code body references something the IR does not define
    #[error("Malformed IR in '{code}': {reason}")]
    MalformedIr { code: String, reason: String },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Entry point name not defined at module level
    #[error("Unknown entry point '{0}'")]
    UnknownEntryPoint(String),

    /// Result export error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl CpaError {
    pub fn malformed(code: impl Into<String>, reason: impl Into<String>) -> Self {
        CpaError::MalformedIr {
            code: code.into(),
            reason: reason.into(),
        }
    }
}

/// Result type alias for codegraph-cpa operations
pub type Result<T> = std::result::Result<T, CpaError>;
