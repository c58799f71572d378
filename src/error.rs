//! Error taxonomy for the agent core.
//!
//! Advisory pipeline steps degrade `Upstream` errors to an `unknown`
//! status instead of failing; everything else propagates to the caller.

/// Errors surfaced by the orchestration engine.
#[derive(Debug, thiserror::Error)]
pub enum AgentError {
    /// A collaborator timed out or returned a non-success response.
    #[error("upstream service unavailable: {0}")]
    Upstream(String),

    /// Malformed input (bad address, non-positive amount). No retry.
    #[error("{0}")]
    Validation(String),

    /// A dynamic skill raised or returned an explicit failure.
    #[error("skill '{name}' failed: {message}")]
    Capability { name: String, message: String },

    /// Repair or synthesis produced no usable source.
    #[error("generation failed: {0}")]
    Generation(String),

    /// Confirmed-malicious recipient; the pipeline produced no artifact.
    #[error("transfer blocked: {0}")]
    Blocked(String),
}

impl AgentError {
    /// Classify whether this error may be retried via self-healing.
    pub fn is_repairable(&self) -> bool {
        matches!(self, Self::Capability { .. })
    }
}

pub type Result<T, E = AgentError> = std::result::Result<T, E>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_repairable_classification() {
        let cap = AgentError::Capability {
            name: "batch-transfer".into(),
            message: "boom".into(),
        };
        assert!(cap.is_repairable());
        assert!(!AgentError::Validation("bad address".into()).is_repairable());
        assert!(!AgentError::Blocked("malicious".into()).is_repairable());
    }

    #[test]
    fn test_validation_message_passthrough() {
        let err = AgentError::Validation("Amount must be greater than 0".into());
        assert_eq!(err.to_string(), "Amount must be greater than 0");
    }
}
