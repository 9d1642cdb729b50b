//! Repository traits for workflow definitions and execution history
//!
//! Persistence is injected; the engine only talks to these traits. The
//! `memory` feature provides concurrent in-process implementations.

use async_trait::async_trait;

use super::execution::{Execution, ExecutionId};
use super::statistics::WorkflowStatistics;
use super::workflow::{OrganizationId, WorkflowDefinition, WorkflowId};
use crate::EngineError;

/// Repository for workflow definitions
#[async_trait]
pub trait WorkflowRepository: Send + Sync {
    /// Find a workflow by ID
    async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<WorkflowDefinition>, EngineError>;

    /// Insert or replace a workflow
    async fn save(&self, definition: &WorkflowDefinition) -> Result<(), EngineError>;

    /// Delete a workflow, returning whether it existed
    async fn delete(&self, id: &WorkflowId) -> Result<bool, EngineError>;

    /// All workflows of an organization, newest first
    async fn list_for_organization(&self, organization_id: &OrganizationId) -> Result<Vec<WorkflowDefinition>, EngineError>;
}

/// Append-only execution log with per-workflow statistics
#[async_trait]
pub trait ExecutionStore: Send + Sync {
    /// Append a settled execution and fold it into its workflow's statistics
    /// as one atomic update. Returns the statistics after the update.
    async fn record(&self, execution: &Execution) -> Result<WorkflowStatistics, EngineError>;

    /// Find an execution by ID
    async fn find_execution(&self, id: &ExecutionId) -> Result<Option<Execution>, EngineError>;

    /// One page of a workflow's executions, newest first. Pages start at 1.
    async fn history(&self, workflow_id: &WorkflowId, page: usize, limit: usize) -> Result<Vec<Execution>, EngineError>;

    /// Current statistics; zeroed for a workflow that never ran
    async fn statistics(&self, workflow_id: &WorkflowId) -> Result<WorkflowStatistics, EngineError>;

    /// Drop history and statistics of a deleted workflow
    async fn remove_workflow(&self, workflow_id: &WorkflowId) -> Result<(), EngineError>;
}

/// Memory implementations
#[cfg(feature = "memory")]
pub mod memory {
    use super::*;
    use dashmap::DashMap;
    use std::collections::VecDeque;

    /// In-memory workflow repository
    #[derive(Debug, Default)]
    pub struct MemoryWorkflowRepository {
        workflows: DashMap<WorkflowId, WorkflowDefinition>,
    }

    impl MemoryWorkflowRepository {
        /// Create an empty repository
        pub fn new() -> Self {
            Self::default()
        }
    }

    #[async_trait]
    impl WorkflowRepository for MemoryWorkflowRepository {
        async fn find_by_id(&self, id: &WorkflowId) -> Result<Option<WorkflowDefinition>, EngineError> {
            Ok(self.workflows.get(id).map(|w| w.clone()))
        }

        async fn save(&self, definition: &WorkflowDefinition) -> Result<(), EngineError> {
            self.workflows.insert(definition.id.clone(), definition.clone());
            Ok(())
        }

        async fn delete(&self, id: &WorkflowId) -> Result<bool, EngineError> {
            Ok(self.workflows.remove(id).is_some())
        }

        async fn list_for_organization(&self, organization_id: &OrganizationId) -> Result<Vec<WorkflowDefinition>, EngineError> {
            let mut workflows: Vec<WorkflowDefinition> = self
                .workflows
                .iter()
                .filter(|w| &w.organization_id == organization_id)
                .map(|w| w.clone())
                .collect();
            workflows.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(workflows)
        }
    }

    #[derive(Debug, Default)]
    struct Ledger {
        // oldest first
        executions: VecDeque<Execution>,
        statistics: WorkflowStatistics,
    }

    /// In-memory execution store. Each workflow's ledger sits behind one
    /// map entry, so appending and updating statistics happen under the same
    /// write lock.
    #[derive(Debug, Default)]
    pub struct MemoryExecutionStore {
        ledgers: DashMap<WorkflowId, Ledger>,
        owners: DashMap<ExecutionId, WorkflowId>,
        retention: Option<usize>,
    }

    impl MemoryExecutionStore {
        /// Create a store that keeps every execution
        pub fn new() -> Self {
            Self::default()
        }

        /// Keep at most `limit` executions per workflow; statistics still
        /// count evicted runs
        pub fn with_retention(limit: usize) -> Self {
            Self {
                retention: Some(limit.max(1)),
                ..Self::default()
            }
        }
    }

    #[async_trait]
    impl ExecutionStore for MemoryExecutionStore {
        async fn record(&self, execution: &Execution) -> Result<WorkflowStatistics, EngineError> {
            if !execution.status.is_terminal() {
                return Err(EngineError::Repository(format!(
                    "Execution {} has not settled: {:?}",
                    execution.execution_id, execution.status
                )));
            }

            let mut ledger = self.ledgers.entry(execution.workflow_id.clone()).or_default();
            ledger.statistics.record(execution);
            ledger.executions.push_back(execution.clone());
            if let Some(limit) = self.retention {
                while ledger.executions.len() > limit {
                    if let Some(evicted) = ledger.executions.pop_front() {
                        self.owners.remove(&evicted.execution_id);
                    }
                }
            }
            self.owners
                .insert(execution.execution_id.clone(), execution.workflow_id.clone());
            Ok(ledger.statistics.clone())
        }

        async fn find_execution(&self, id: &ExecutionId) -> Result<Option<Execution>, EngineError> {
            let Some(workflow_id) = self.owners.get(id).map(|w| w.clone()) else {
                return Ok(None);
            };
            Ok(self.ledgers.get(&workflow_id).and_then(|ledger| {
                ledger
                    .executions
                    .iter()
                    .find(|e| &e.execution_id == id)
                    .cloned()
            }))
        }

        async fn history(&self, workflow_id: &WorkflowId, page: usize, limit: usize) -> Result<Vec<Execution>, EngineError> {
            let skip = page.max(1).saturating_sub(1).saturating_mul(limit);
            Ok(self
                .ledgers
                .get(workflow_id)
                .map(|ledger| {
                    ledger
                        .executions
                        .iter()
                        .rev()
                        .skip(skip)
                        .take(limit)
                        .cloned()
                        .collect()
                })
                .unwrap_or_default())
        }

        async fn statistics(&self, workflow_id: &WorkflowId) -> Result<WorkflowStatistics, EngineError> {
            Ok(self
                .ledgers
                .get(workflow_id)
                .map(|ledger| ledger.statistics.clone())
                .unwrap_or_default())
        }

        async fn remove_workflow(&self, workflow_id: &WorkflowId) -> Result<(), EngineError> {
            if let Some((_, ledger)) = self.ledgers.remove(workflow_id) {
                for execution in ledger.executions {
                    self.owners.remove(&execution.execution_id);
                }
            }
            Ok(())
        }
    }

}
