/// Workflow definitions and their building blocks
pub mod workflow;

/// Index based step graph
pub mod graph;

/// Execution aggregate
pub mod execution;

/// Execution events
pub mod events;

/// Statistics and reports
pub mod statistics;

/// Repository interfaces
pub mod repository;

/// Built-in templates
pub mod templates;
