//! Error types for the WARDEN engine.
//!
//! Component boundaries return structured result objects; these variants are
//! for the cases that genuinely abort an operation. We use `thiserror` for
//! ergonomic definitions with automatic Display/Error implementations.

use thiserror::Error;
use uuid::Uuid;

use crate::redactor::Finding;

/// Result type alias for WARDEN operations
pub type Result<T> = std::result::Result<T, WardenError>;

/// Main error type for WARDEN operations
#[derive(Error, Debug)]
pub enum WardenError {
    // Validation: surface to caller, non-retryable.
    #[error("invalid change spec: {0}")]
    InvalidChangeSpec(String),

    #[error("invalid selector: {0}")]
    InvalidSelector(String),

    #[error("unsupported operation: {0}")]
    UnsupportedOperation(String),

    #[error("invalid mission state: {0}")]
    InvalidMission(String),

    // Not found.
    #[error("mission not found: {0}")]
    MissionNotFound(Uuid),

    #[error("checkpoint not found: {0}")]
    CheckpointNotFound(String),

    #[error("batch not found: {0}")]
    BatchNotFound(Uuid),

    #[error("budget not found: {0}")]
    BudgetNotFound(String),

    #[error("model not found in pricing table: {0}")]
    ModelNotFound(String),

    // Security.
    #[error("policy violation: {policy} ({n} finding(s))", n = .findings.len())]
    PolicyViolation { policy: String, findings: Vec<Finding> },

    #[error("security block: {n} critical finding(s) during apply", n = .findings.len())]
    SecurityBlock { findings: Vec<Finding> },

    // Execution.
    #[error("parse error in {path}: {message}")]
    Parse { path: String, message: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("external tool unavailable: {0}")]
    ExternalToolUnavailable(String),

    #[error("operation timed out: {0}")]
    Timeout(String),

    // Resource.
    #[error("budget exceeded: {budget_id} at {current_cost:.4} of {max_cost:.4}")]
    BudgetExceeded {
        budget_id: String,
        current_cost: f64,
        max_cost: f64,
    },

    #[error("no viable model for budget {0}")]
    NoViableModel(String),

    // Internal.
    #[error("unknown invariant type: {0}")]
    UnknownInvariantType(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("archive error: {0}")]
    Archive(String),
}

impl From<warden_exec::ExecError> for WardenError {
    fn from(e: warden_exec::ExecError) -> Self {
        match e {
            warden_exec::ExecError::Timeout(d) => {
                Self::Timeout(format!("external command exceeded {d:?}"))
            }
            warden_exec::ExecError::Io(io) => Self::Io(io),
            other => Self::Io(std::io::Error::new(std::io::ErrorKind::Other, other.to_string())),
        }
    }
}

impl From<zip::result::ZipError> for WardenError {
    fn from(e: zip::result::ZipError) -> Self {
        Self::Archive(e.to_string())
    }
}

impl WardenError {
    /// Stable machine-readable tag for result channels and HTTP bodies.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidChangeSpec(_) => "InvalidChangeSpec",
            Self::InvalidSelector(_) => "InvalidSelector",
            Self::UnsupportedOperation(_) => "UnsupportedOperation",
            Self::InvalidMission(_) => "InvalidMission",
            Self::MissionNotFound(_) => "MissionNotFound",
            Self::CheckpointNotFound(_) => "CheckpointNotFound",
            Self::BatchNotFound(_) => "BatchNotFound",
            Self::BudgetNotFound(_) => "BudgetNotFound",
            Self::ModelNotFound(_) => "ModelNotFound",
            Self::PolicyViolation { .. } => "PolicyViolation",
            Self::SecurityBlock { .. } => "SecurityBlock",
            Self::Parse { .. } => "ParseError",
            Self::Io(_) => "IOError",
            Self::ExternalToolUnavailable(_) => "ExternalToolUnavailable",
            Self::Timeout(_) => "Timeout",
            Self::BudgetExceeded { .. } => "BudgetExceeded",
            Self::NoViableModel(_) => "NoViableModel",
            Self::UnknownInvariantType(_) => "UnknownInvariantType",
            Self::Serialization(_) => "SerializationError",
            Self::Archive(_) => "ArchiveError",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn codes_are_stable() {
        let err = WardenError::InvalidSelector("Foo[bar]".to_string());
        assert_eq!(err.code(), "InvalidSelector");

        let err = WardenError::BudgetExceeded {
            budget_id: "b-1".to_string(),
            current_cost: 10.5,
            max_cost: 10.0,
        };
        assert_eq!(err.code(), "BudgetExceeded");
        assert!(err.to_string().contains("b-1"));
    }
}
