use thiserror::Error;

/// Error type for the Flowline engine and its collaborators
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EngineError {
    /// Workflow definition not found
    #[error("Workflow not found: {0}")]
    WorkflowNotFound(String),

    /// Execution not found
    #[error("Execution not found: {0}")]
    ExecutionNotFound(String),

    /// Built-in template not found
    #[error("Template not found: {0}")]
    TemplateNotFound(String),

    /// Workflow exists but is switched off
    #[error("Workflow is disabled: {0}")]
    WorkflowDisabled(String),

    /// Admission rejected because every slot is taken
    #[error("Concurrency limit of {limit} reached for workflow {workflow_id}")]
    ConcurrencyLimitReached {
        /// Workflow that is at capacity
        workflow_id: String,
        /// Configured limit
        limit: usize,
    },

    /// Waited too long for a free slot
    #[error("Timed out waiting for an execution slot: {0}")]
    QueueTimeout(String),

    /// Definition failed validation
    #[error("Invalid workflow definition: {}", .0.join("; "))]
    InvalidDefinition(Vec<String>),

    /// Step execution error
    #[error("Step execution error: {0}")]
    StepExecution(String),

    /// A collaborator call failed
    #[error("Collaborator error: {0}")]
    Collaborator(String),

    /// Action cannot be run with the configured collaborators
    #[error("Unsupported action: {0}")]
    UnsupportedAction(String),

    /// Operation timed out
    #[error("Timeout: {0}")]
    Timeout(String),

    /// Aggregate is not in a state that allows the operation
    #[error("Invalid state transition: {0}")]
    InvalidTransition(String),

    /// Repository error
    #[error("Repository error: {0}")]
    Repository(String),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// Input/output error
    #[error("Input/output error: {0}")]
    Io(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl From<serde_json::Error> for EngineError {
    fn from(err: serde_json::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for EngineError {
    fn from(err: serde_yaml::Error) -> Self {
        EngineError::Serialization(err.to_string())
    }
}

impl From<std::io::Error> for EngineError {
    fn from(err: std::io::Error) -> Self {
        EngineError::Io(err.to_string())
    }
}

impl From<String> for EngineError {
    fn from(err: String) -> Self {
        EngineError::Other(err)
    }
}

impl From<&str> for EngineError {
    fn from(err: &str) -> Self {
        EngineError::Other(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Error as IoError, ErrorKind};

    #[test]
    fn test_error_display() {
        let errors = vec![
            (EngineError::WorkflowNotFound("wf1".to_string()), "Workflow not found: wf1"),
            (EngineError::ExecutionNotFound("ex1".to_string()), "Execution not found: ex1"),
            (EngineError::WorkflowDisabled("wf1".to_string()), "Workflow is disabled: wf1"),
            (
                EngineError::ConcurrencyLimitReached {
                    workflow_id: "wf1".to_string(),
                    limit: 2,
                },
                "Concurrency limit of 2 reached for workflow wf1",
            ),
            (
                EngineError::InvalidDefinition(vec!["a".to_string(), "b".to_string()]),
                "Invalid workflow definition: a; b",
            ),
            (EngineError::StepExecution("boom".to_string()), "Step execution error: boom"),
            (EngineError::Collaborator("smtp down".to_string()), "Collaborator error: smtp down"),
            (EngineError::Timeout("step".to_string()), "Timeout: step"),
            (EngineError::Other("other_err".to_string()), "other_err"),
        ];

        for (error, expected_msg) in errors {
            assert_eq!(error.to_string(), expected_msg);
        }
    }

    #[test]
    fn test_from_serde_json_error() {
        let json_error = serde_json::from_str::<serde_json::Value>("invalid json").unwrap_err();
        let error: EngineError = json_error.into();

        match error {
            EngineError::Serialization(msg) => assert!(msg.contains("expected value")),
            _ => panic!("Expected Serialization variant"),
        }
    }

    #[test]
    fn test_from_io_error() {
        let io_error = IoError::new(ErrorKind::NotFound, "file not found");
        let error: EngineError = io_error.into();

        match error {
            EngineError::Io(msg) => assert!(msg.contains("file not found")),
            _ => panic!("Expected Io variant"),
        }
    }

    #[test]
    fn test_from_str() {
        let error: EngineError = "test error message".into();
        assert_eq!(error, EngineError::Other("test error message".to_string()));
    }
}
