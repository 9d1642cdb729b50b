//! Execution metrics collected from engine events.

use dashmap::DashMap;
use flowline_core::{ExecutionEvent, ExecutionEventHandler, ExecutionId, ExecutionStatus, WorkflowId};
use serde::Serialize;
use std::collections::BTreeMap;
use tracing::info;

/// Counters for one workflow
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorkflowCounters {
    pub started: u64,
    pub completed: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub steps_finished: u64,
    pub step_errors: u64,
    pub retried_steps: u64,
    pub total_duration_ms: u64,
}

impl WorkflowCounters {
    /// Mean duration of settled runs
    pub fn average_duration_ms(&self) -> f64 {
        let settled = self.completed + self.failed + self.cancelled;
        if settled == 0 {
            0.0
        } else {
            self.total_duration_ms as f64 / settled as f64
        }
    }
}

/// Point-in-time copy of all counters, keyed by workflow ID
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct MetricsSnapshot {
    pub workflows: BTreeMap<String, WorkflowCounters>,
}

impl MetricsSnapshot {
    /// Counters of one workflow, zeroed if it never ran
    pub fn workflow(&self, workflow_id: &WorkflowId) -> WorkflowCounters {
        self.workflows.get(&workflow_id.0).cloned().unwrap_or_default()
    }
}

/// Event handler that counts runs, steps and errors per workflow and logs
/// each settled run.
///
/// Step events carry no workflow ID, so the handler remembers which workflow
/// each running execution belongs to between its `Started` and `Settled`
/// events.
#[derive(Debug, Default)]
pub struct ExecutionMetrics {
    counters: DashMap<WorkflowId, WorkflowCounters>,
    owners: DashMap<ExecutionId, WorkflowId>,
}

impl ExecutionMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy the current counters
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            workflows: self
                .counters
                .iter()
                .map(|entry| (entry.key().to_string(), entry.value().clone()))
                .collect(),
        }
    }

    fn update_owner(&self, execution_id: &ExecutionId, apply: impl FnOnce(&mut WorkflowCounters)) {
        let Some(workflow_id) = self.owners.get(execution_id).map(|w| w.clone()) else {
            return;
        };
        apply(&mut self.counters.entry(workflow_id).or_default());
    }
}

impl ExecutionEventHandler for ExecutionMetrics {
    fn handle(&self, event: &ExecutionEvent) {
        match event {
            ExecutionEvent::Started {
                execution_id,
                workflow_id,
                ..
            } => {
                self.owners.insert(execution_id.clone(), workflow_id.clone());
                self.counters.entry(workflow_id.clone()).or_default().started += 1;
            }
            ExecutionEvent::StepFinished {
                execution_id, attempts, ..
            } => {
                let retried = *attempts > 1;
                self.update_owner(execution_id, |c| {
                    c.steps_finished += 1;
                    if retried {
                        c.retried_steps += 1;
                    }
                });
            }
            ExecutionEvent::StepErrored { execution_id, .. } => {
                self.update_owner(execution_id, |c| c.step_errors += 1);
            }
            ExecutionEvent::Settled {
                execution_id,
                workflow_id,
                status,
                duration_ms,
                ..
            } => {
                self.owners.remove(execution_id);
                let mut counters = self.counters.entry(workflow_id.clone()).or_default();
                match status {
                    ExecutionStatus::Completed => counters.completed += 1,
                    ExecutionStatus::Failed => counters.failed += 1,
                    ExecutionStatus::Cancelled => counters.cancelled += 1,
                    ExecutionStatus::Running | ExecutionStatus::Paused => {}
                }
                counters.total_duration_ms += duration_ms;
                drop(counters);

                info!(
                    workflow_id = %workflow_id,
                    execution_id = %execution_id,
                    status = ?status,
                    duration_ms,
                    "Workflow execution recorded"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use flowline_core::StepId;
    use pretty_assertions::assert_eq;

    fn settled(execution_id: &ExecutionId, workflow_id: &WorkflowId, status: ExecutionStatus, duration_ms: u64) -> ExecutionEvent {
        ExecutionEvent::Settled {
            execution_id: execution_id.clone(),
            workflow_id: workflow_id.clone(),
            status,
            duration_ms,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_counts_per_workflow() {
        let metrics = ExecutionMetrics::new();
        let workflow_id = WorkflowId::from("leads");
        let execution_id = ExecutionId::generate();

        metrics.handle(&ExecutionEvent::Started {
            execution_id: execution_id.clone(),
            workflow_id: workflow_id.clone(),
            timestamp: Utc::now(),
        });
        metrics.handle(&ExecutionEvent::StepFinished {
            execution_id: execution_id.clone(),
            step_id: StepId::from("score"),
            succeeded: false,
            attempts: 3,
            timestamp: Utc::now(),
        });
        metrics.handle(&ExecutionEvent::StepErrored {
            execution_id: execution_id.clone(),
            step_id: StepId::from("score"),
            error: "boom".to_string(),
            timestamp: Utc::now(),
        });
        metrics.handle(&settled(&execution_id, &workflow_id, ExecutionStatus::Failed, 40));

        let counters = metrics.snapshot().workflow(&workflow_id);
        assert_eq!(
            counters,
            WorkflowCounters {
                started: 1,
                failed: 1,
                steps_finished: 1,
                step_errors: 1,
                retried_steps: 1,
                total_duration_ms: 40,
                ..WorkflowCounters::default()
            }
        );
        assert_eq!(counters.average_duration_ms(), 40.0);
    }

    #[test]
    fn test_step_events_of_unknown_runs_are_ignored() {
        let metrics = ExecutionMetrics::new();
        metrics.handle(&ExecutionEvent::StepErrored {
            execution_id: ExecutionId::generate(),
            step_id: StepId::from("orphan"),
            error: "late".to_string(),
            timestamp: Utc::now(),
        });
        assert_eq!(metrics.snapshot(), MetricsSnapshot::default());
    }
}
