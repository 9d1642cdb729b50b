use chrono::{DateTime, Utc};
use serde::Serialize;

use super::execution::{ExecutionId, ExecutionStatus};
use super::workflow::{StepId, WorkflowId};

/// Something that happened to an execution
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ExecutionEvent {
    /// Execution admitted and started
    Started {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        timestamp: DateTime<Utc>,
    },

    /// A step finished, whatever its outcome
    StepFinished {
        execution_id: ExecutionId,
        step_id: StepId,
        succeeded: bool,
        attempts: u32,
        timestamp: DateTime<Utc>,
    },

    /// An error was recorded against a step
    StepErrored {
        execution_id: ExecutionId,
        step_id: StepId,
        error: String,
        timestamp: DateTime<Utc>,
    },

    /// Execution left the running state
    Settled {
        execution_id: ExecutionId,
        workflow_id: WorkflowId,
        status: ExecutionStatus,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
}

impl ExecutionEvent {
    /// Stable event name
    pub fn event_type(&self) -> &'static str {
        match self {
            ExecutionEvent::Started { .. } => "execution.started",
            ExecutionEvent::StepFinished { .. } => "execution.step_finished",
            ExecutionEvent::StepErrored { .. } => "execution.step_errored",
            ExecutionEvent::Settled { .. } => "execution.settled",
        }
    }

    /// Execution the event belongs to
    pub fn execution_id(&self) -> &ExecutionId {
        match self {
            ExecutionEvent::Started { execution_id, .. }
            | ExecutionEvent::StepFinished { execution_id, .. }
            | ExecutionEvent::StepErrored { execution_id, .. }
            | ExecutionEvent::Settled { execution_id, .. } => execution_id,
        }
    }

    /// When it happened
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            ExecutionEvent::Started { timestamp, .. }
            | ExecutionEvent::StepFinished { timestamp, .. }
            | ExecutionEvent::StepErrored { timestamp, .. }
            | ExecutionEvent::Settled { timestamp, .. } => *timestamp,
        }
    }
}

/// Receives execution events as the engine produces them
pub trait ExecutionEventHandler: Send + Sync {
    /// Handle one event
    fn handle(&self, event: &ExecutionEvent);
}

/// Handler that logs every event through `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventHandler;

impl ExecutionEventHandler for TracingEventHandler {
    fn handle(&self, event: &ExecutionEvent) {
        tracing::debug!(
            event_type = event.event_type(),
            execution_id = %event.execution_id(),
            "execution event"
        );
    }
}
