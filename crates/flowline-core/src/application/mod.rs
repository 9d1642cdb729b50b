/// Condition evaluation over the execution context
pub mod condition_evaluator;

/// Typed actions and single-call steps
pub mod action_dispatcher;

/// Per-step state machine with retries and timeouts
pub mod step_executor;

/// Per-workflow concurrency slots
mod slots;

/// Workflow run orchestration
pub mod execution_engine;

/// Management and execution boundary
pub mod workflow_service;
