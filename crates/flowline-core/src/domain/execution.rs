use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use uuid::Uuid;

use super::events::ExecutionEvent;
use super::workflow::{StepId, WorkflowId};
use crate::EngineError;

/// Value object: Execution ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ExecutionId(pub String);

impl ExecutionId {
    /// Generate a fresh random execution ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for ExecutionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExecutionStatus {
    /// Steps are being executed
    Running,
    /// Traversal ended on a successful step
    Completed,
    /// Traversal ended on a failed step
    Failed,
    /// Stopped by a cancel request or the workflow deadline
    Cancelled,
    /// Held by an operator
    Paused,
}

impl ExecutionStatus {
    /// Whether the execution can no longer change
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            ExecutionStatus::Completed | ExecutionStatus::Failed | ExecutionStatus::Cancelled
        )
    }
}

/// Error recorded against a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepError {
    pub step_id: StepId,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

/// Aggregate: one run of a workflow
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Execution {
    /// Unique identifier
    pub execution_id: ExecutionId,

    /// Workflow that was run
    pub workflow_id: WorkflowId,

    /// Definition version the run used
    pub workflow_version: u32,

    /// Start timestamp
    pub started_at: DateTime<Utc>,

    /// End timestamp, set once the execution settles
    pub completed_at: Option<DateTime<Utc>>,

    /// Current status
    pub status: ExecutionStatus,

    /// Data that started the run
    pub trigger_data: Value,

    /// Step being executed, or the last one executed
    pub current_step: Option<StepId>,

    /// Steps executed, in order
    pub steps_completed: Vec<StepId>,

    /// Errors recorded during the run
    pub errors: Vec<StepError>,

    /// Accumulated context
    pub output_data: Value,

    /// Wall clock duration, set once the execution settles
    pub execution_time_ms: Option<u64>,

    /// Pending events
    #[serde(skip)]
    events: Vec<ExecutionEvent>,
}

impl Execution {
    /// Start a new execution in the running state
    pub fn start(execution_id: ExecutionId, workflow_id: WorkflowId, workflow_version: u32, trigger_data: Value) -> Self {
        let started_at = Utc::now();
        let mut execution = Self {
            execution_id: execution_id.clone(),
            workflow_id: workflow_id.clone(),
            workflow_version,
            started_at,
            completed_at: None,
            status: ExecutionStatus::Running,
            trigger_data,
            current_step: None,
            steps_completed: Vec::new(),
            errors: Vec::new(),
            output_data: Value::Null,
            execution_time_ms: None,
            events: Vec::with_capacity(8),
        };
        execution.events.push(ExecutionEvent::Started {
            execution_id,
            workflow_id,
            timestamp: started_at,
        });
        execution
    }

    fn ensure_running(&self, operation: &str) -> Result<(), EngineError> {
        if self.status != ExecutionStatus::Running {
            return Err(EngineError::InvalidTransition(format!(
                "Cannot {} execution in state: {:?}",
                operation, self.status
            )));
        }
        Ok(())
    }

    /// Mark a step as the one being executed
    pub fn enter_step(&mut self, step_id: &StepId) -> Result<(), EngineError> {
        self.ensure_running("enter step of")?;
        self.current_step = Some(step_id.clone());
        Ok(())
    }

    /// Record that a step ran
    pub fn record_step(&mut self, step_id: &StepId, succeeded: bool, attempts: u32) -> Result<(), EngineError> {
        self.ensure_running("record step for")?;
        self.steps_completed.push(step_id.clone());
        self.events.push(ExecutionEvent::StepFinished {
            execution_id: self.execution_id.clone(),
            step_id: step_id.clone(),
            succeeded,
            attempts,
            timestamp: Utc::now(),
        });
        Ok(())
    }

    /// Record an error against a step
    pub fn record_error(&mut self, step_id: &StepId, message: impl Into<String>) -> Result<(), EngineError> {
        self.ensure_running("record error for")?;
        let error = StepError {
            step_id: step_id.clone(),
            message: message.into(),
            timestamp: Utc::now(),
        };
        self.events.push(ExecutionEvent::StepErrored {
            execution_id: self.execution_id.clone(),
            step_id: error.step_id.clone(),
            error: error.message.clone(),
            timestamp: error.timestamp,
        });
        self.errors.push(error);
        Ok(())
    }

    /// Settle as completed
    pub fn complete(&mut self, output_data: Value) -> Result<(), EngineError> {
        self.settle(ExecutionStatus::Completed, output_data, "complete")
    }

    /// Settle as failed
    pub fn fail(&mut self, output_data: Value) -> Result<(), EngineError> {
        self.settle(ExecutionStatus::Failed, output_data, "fail")
    }

    /// Settle as cancelled
    pub fn cancel(&mut self, output_data: Value) -> Result<(), EngineError> {
        self.settle(ExecutionStatus::Cancelled, output_data, "cancel")
    }

    fn settle(&mut self, status: ExecutionStatus, output_data: Value, operation: &str) -> Result<(), EngineError> {
        self.ensure_running(operation)?;
        let completed_at = Utc::now();
        let duration_ms = (completed_at - self.started_at).num_milliseconds().max(0) as u64;

        self.status = status;
        self.output_data = output_data;
        self.completed_at = Some(completed_at);
        self.execution_time_ms = Some(duration_ms);
        self.events.push(ExecutionEvent::Settled {
            execution_id: self.execution_id.clone(),
            workflow_id: self.workflow_id.clone(),
            status,
            duration_ms,
            timestamp: completed_at,
        });
        Ok(())
    }

    /// Whether the execution is still running
    pub fn is_running(&self) -> bool {
        self.status == ExecutionStatus::Running
    }

    /// Errors recorded against one step
    pub fn errors_for<'a>(&'a self, step_id: &'a StepId) -> impl Iterator<Item = &'a StepError> + 'a {
        self.errors.iter().filter(move |e| &e.step_id == step_id)
    }

    /// Take the pending events
    pub fn take_events(&mut self) -> Vec<ExecutionEvent> {
        std::mem::take(&mut self.events)
    }
}
