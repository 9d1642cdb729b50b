//!
//! Flowline Core - workflow definitions, validation and the execution engine
//!
//! A workflow is a graph of typed steps. The engine walks it one step at a
//! time, branching on each step's outcome, while collaborators injected at
//! construction perform every side effect.

#![forbid(unsafe_code)]

/// Domain layer - workflows, executions, statistics
pub mod domain;

/// Application services - evaluation, dispatch, execution
pub mod application;

/// Structural validation of workflow definitions
pub mod validation;

/// Execution context
pub mod context;

/// Collaborator interfaces
pub mod collaborators;

/// Engine configuration
pub mod config;

/// Error types
pub mod error;

pub use error::EngineError;

pub use application::action_dispatcher::{ActionDispatcher, StepOutput};
pub use application::condition_evaluator::{ConditionEvaluator, FieldConditionEvaluator};
pub use application::execution_engine::{ExecutionEngine, RunControl};
pub use application::step_executor::{StepExecutor, StepReport, StepState};
pub use application::workflow_service::{ExecutionHandle, ExportMetadata, WorkflowExport, WorkflowService};
pub use collaborators::{
    Clock, Collaborators, HttpClient, HttpRequest, HttpResponse, Notification, NotificationChannel, Notifier,
    RecordStore, ScriptRunner,
};
pub use config::{AdmissionPolicy, EngineConfig};
pub use context::ExecutionContext;
pub use domain::events::{ExecutionEvent, ExecutionEventHandler, TracingEventHandler};
pub use domain::execution::{Execution, ExecutionId, ExecutionStatus, StepError};
pub use domain::repository::{ExecutionStore, WorkflowRepository};
pub use domain::statistics::{WorkflowReport, WorkflowStatistics};
pub use domain::templates::WorkflowTemplate;
pub use domain::workflow::{
    Action, ActionType, Condition, ConditionOperator, EdgeCondition, LogicOperator, OrganizationId, RetryConfig,
    StepDefinition, StepId, StepType, Trigger, TriggerType, WorkflowCategory, WorkflowDefinition, WorkflowId,
    WorkflowSettings,
};
pub use validation::{ValidationIssue, ValidationResult, WorkflowValidator};
