use thiserror::Error;

/// Errors produced while driving workflows.
///
/// Cancellation is not represented here: a cancelled task settles with
/// [`Value::Cancelled`](crate::domain::Value::Cancelled).
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SagaError {
    /// Malformed effect arguments or an invalid call into the runtime.
    #[error("invalid argument: {0}")]
    Validation(String),

    /// A channel invariant was violated. Never delivered into a workflow.
    #[error("internal consistency fault: {0}")]
    Internal(String),

    /// A `fixed` buffer received a put while full.
    #[error("channel's buffer overflow")]
    Overflow,

    /// Raised inside (or propagated into) a workflow.
    #[error("{0}")]
    Workflow(String),
}

impl SagaError {
    pub fn workflow(message: impl Into<String>) -> Self {
        Self::Workflow(message.into())
    }

    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Internal faults skip the workflow's error path.
    pub fn is_internal(&self) -> bool {
        matches!(self, SagaError::Internal(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_keeps_workflow_message_verbatim() {
        assert_eq!(SagaError::workflow("boom").to_string(), "boom");
        assert_eq!(
            SagaError::Overflow.to_string(),
            "channel's buffer overflow"
        );
    }

    #[test]
    fn only_internal_faults_are_internal() {
        assert!(SagaError::internal("x").is_internal());
        assert!(!SagaError::validation("x").is_internal());
        assert!(!SagaError::Overflow.is_internal());
    }
}
