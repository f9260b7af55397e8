//! Error types for the deployment orchestrator

use std::time::Duration;
use thiserror::Error;

/// Result type for orchestrator operations
pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

/// Errors surfaced by a chain client for a single request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChainError {
    /// Transport-level failure (connection refused, HTTP 5xx, malformed reply)
    #[error("transport error: {0}")]
    Transport(String),

    /// Confirmation did not arrive in time
    #[error("no confirmation after {0:?}")]
    Timeout(Duration),

    /// The target contract rejected the call
    #[error("execution reverted: {reason}")]
    Reverted { reason: String },

    /// The node refused the request for a non-revert reason (funds, gas, params)
    #[error("rpc error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl ChainError {
    /// Whether retrying the same request may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, ChainError::Transport(_) | ChainError::Timeout(_))
    }
}

impl From<reqwest::Error> for ChainError {
    fn from(err: reqwest::Error) -> Self {
        ChainError::Transport(err.to_string())
    }
}

/// Errors that can abort a deployment or verification phase
#[derive(Error, Debug)]
pub enum OrchestratorError {
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    #[error("Cyclic constructor dependency: {}", cycle.join(" -> "))]
    CyclicDependency { cycle: Vec<String> },

    #[error("Network error for {subject} after {attempts} attempt(s): {detail}")]
    Network {
        subject: String,
        detail: String,
        attempts: u32,
    },

    #[error("Timed out waiting for {subject} after {attempts} attempt(s) ({elapsed:?} each)")]
    Timeout {
        subject: String,
        elapsed: Duration,
        attempts: u32,
    },

    #[error("{subject} reverted: {reason}")]
    Revert { subject: String, reason: String },

    #[error("{subject} rejected by node: {detail}")]
    Rejected { subject: String, detail: String },

    #[error("Unresolved reference: {0}")]
    UnresolvedReference(String),

    #[error("Already registered: {0}")]
    DuplicateRegistration(String),

    #[error("Artifact error: {0}")]
    Artifact(String),

    #[error("ABI error: {0}")]
    Abi(String),
}

impl OrchestratorError {
    /// Stable name of the error kind, printed before terminating
    pub fn kind(&self) -> &'static str {
        match self {
            OrchestratorError::Configuration(_)
            | OrchestratorError::CyclicDependency { .. }
            | OrchestratorError::Abi(_) => "ConfigurationError",
            OrchestratorError::Network { .. } => "NetworkError",
            OrchestratorError::Timeout { .. } => "TimeoutError",
            OrchestratorError::Revert { .. } => "RevertError",
            OrchestratorError::Rejected { .. } => "RejectedError",
            OrchestratorError::UnresolvedReference(_) => "UnresolvedReferenceError",
            OrchestratorError::DuplicateRegistration(_) => "DuplicateRegistrationError",
            OrchestratorError::Artifact(_) => "ArtifactError",
        }
    }

    /// Unit, binding or step the error refers to, when there is one
    pub fn subject(&self) -> Option<&str> {
        match self {
            OrchestratorError::Network { subject, .. }
            | OrchestratorError::Timeout { subject, .. }
            | OrchestratorError::Revert { subject, .. }
            | OrchestratorError::Rejected { subject, .. } => Some(subject),
            OrchestratorError::UnresolvedReference(name)
            | OrchestratorError::DuplicateRegistration(name) => Some(name),
            OrchestratorError::CyclicDependency { cycle } => cycle.first().map(String::as_str),
            _ => None,
        }
    }

    /// Map a chain failure for `subject` into a phase-level error
    pub fn from_chain(subject: &str, err: ChainError, attempts: u32) -> Self {
        match err {
            ChainError::Transport(detail) => OrchestratorError::Network {
                subject: subject.to_string(),
                detail,
                attempts,
            },
            ChainError::Timeout(elapsed) => OrchestratorError::Timeout {
                subject: subject.to_string(),
                elapsed,
                attempts,
            },
            ChainError::Reverted { reason } => OrchestratorError::Revert {
                subject: subject.to_string(),
                reason,
            },
            ChainError::Rpc { code, message } => OrchestratorError::Rejected {
                subject: subject.to_string(),
                detail: format!("{code}: {message}"),
            },
        }
    }
}

impl From<std::io::Error> for OrchestratorError {
    fn from(err: std::io::Error) -> Self {
        OrchestratorError::Artifact(err.to_string())
    }
}

impl From<serde_json::Error> for OrchestratorError {
    fn from(err: serde_json::Error) -> Self {
        OrchestratorError::Artifact(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_names() {
        let cases = vec![
            (
                OrchestratorError::CyclicDependency {
                    cycle: vec!["A".into(), "B".into(), "A".into()],
                },
                "ConfigurationError",
            ),
            (
                OrchestratorError::Network {
                    subject: "A".into(),
                    detail: "refused".into(),
                    attempts: 3,
                },
                "NetworkError",
            ),
            (
                OrchestratorError::Revert {
                    subject: "B".into(),
                    reason: "nope".into(),
                },
                "RevertError",
            ),
            (
                OrchestratorError::UnresolvedReference("X".into()),
                "UnresolvedReferenceError",
            ),
            (
                OrchestratorError::DuplicateRegistration("X".into()),
                "DuplicateRegistrationError",
            ),
        ];

        for (error, kind) in cases {
            assert_eq!(error.kind(), kind, "kind mismatch for {:?}", error);
        }
    }

    #[test]
    fn test_cycle_display() {
        let err = OrchestratorError::CyclicDependency {
            cycle: vec!["A".into(), "B".into(), "A".into()],
        };
        assert_eq!(err.to_string(), "Cyclic constructor dependency: A -> B -> A");
        assert_eq!(err.subject(), Some("A"));
    }

    #[test]
    fn test_from_chain_mapping() {
        let err = OrchestratorError::from_chain(
            "SupplyChainManager",
            ChainError::Reverted {
                reason: "Invalid stake".into(),
            },
            1,
        );
        assert_eq!(err.kind(), "RevertError");
        assert_eq!(err.subject(), Some("SupplyChainManager"));
        assert_eq!(err.to_string(), "SupplyChainManager reverted: Invalid stake");

        let err = OrchestratorError::from_chain("A", ChainError::Timeout(Duration::from_secs(5)), 4);
        assert_eq!(err.kind(), "TimeoutError");

        let err = OrchestratorError::from_chain(
            "A",
            ChainError::Rpc {
                code: -32000,
                message: "insufficient funds".into(),
            },
            1,
        );
        assert_eq!(err.kind(), "RejectedError");
    }

    #[test]
    fn test_transient_classification() {
        assert!(ChainError::Transport("reset".into()).is_transient());
        assert!(ChainError::Timeout(Duration::from_secs(1)).is_transient());
        assert!(!ChainError::Reverted { reason: String::new() }.is_transient());
        assert!(!ChainError::Rpc {
            code: -32000,
            message: "x".into()
        }
        .is_transient());
    }
}
