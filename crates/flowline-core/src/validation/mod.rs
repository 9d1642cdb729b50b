//! Static analysis of workflow definitions.

use serde::Serialize;
use std::fmt;

mod workflow_validator;

pub use workflow_validator::WorkflowValidator;

/// A single finding of the validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationIssue {
    /// Error code (one of [`error_codes`])
    pub code: &'static str,

    /// Human-readable message
    pub message: String,

    /// Location in the definition, e.g. `steps[2].next_steps[0]`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ValidationIssue {
    pub(crate) fn new(code: &'static str, message: impl Into<String>, path: Option<String>) -> Self {
        Self {
            code,
            message: message.into(),
            path,
        }
    }
}

impl fmt::Display for ValidationIssue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(path) = &self.path {
            write!(f, "{}: {} (at {})", self.code, self.message, path)
        } else {
            write!(f, "{}: {}", self.code, self.message)
        }
    }
}

/// Outcome of validating a definition
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ValidationResult {
    /// False when at least one error was found
    pub valid: bool,

    /// Structural errors; any of these blocks execution
    pub errors: Vec<ValidationIssue>,

    /// Findings that do not block execution
    pub warnings: Vec<ValidationIssue>,
}

impl ValidationResult {
    /// Error messages without codes
    pub fn error_messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.message.clone()).collect()
    }

    /// Warning messages without codes
    pub fn warning_messages(&self) -> Vec<String> {
        self.warnings.iter().map(|w| w.message.clone()).collect()
    }

    /// Whether an issue with this code was reported, error or warning
    pub fn has_code(&self, code: &str) -> bool {
        self.errors.iter().chain(&self.warnings).any(|i| i.code == code)
    }
}

/// Validation error codes
pub mod error_codes {
    /// Trigger absent or untyped
    pub const MISSING_TRIGGER: &str = "ERR_WORKFLOW_MISSING_TRIGGER";

    /// Workflow has no steps
    pub const NO_STEPS: &str = "ERR_WORKFLOW_NO_STEPS";

    /// Step lacks a name or type
    pub const MISSING_REQUIRED_FIELD: &str = "ERR_WORKFLOW_MISSING_REQUIRED_FIELD";

    /// Two steps share an ID
    pub const DUPLICATE_ID: &str = "ERR_WORKFLOW_DUPLICATE_ID";

    /// Edge to a step that does not exist
    pub const INVALID_REFERENCE: &str = "ERR_WORKFLOW_INVALID_REFERENCE";

    /// Every step is the target of some edge
    pub const NO_ENTRY_STEP: &str = "ERR_WORKFLOW_NO_ENTRY_STEP";

    /// Circular reference between steps
    pub const CIRCULAR_DEPENDENCY: &str = "ERR_WORKFLOW_CIRCULAR_DEPENDENCY";

    /// Step unreachable from the entry step
    pub const DISCONNECTED_STEP: &str = "WARN_WORKFLOW_DISCONNECTED_STEP";

    /// Nobody has been granted access
    pub const NO_PERMISSIONS: &str = "WARN_WORKFLOW_NO_PERMISSIONS";

    /// Setting value that can never work
    pub const INVALID_SETTING: &str = "ERR_WORKFLOW_INVALID_SETTING";

    /// Step with nothing to evaluate or run
    pub const EMPTY_STEP: &str = "WARN_WORKFLOW_EMPTY_STEP";
}
