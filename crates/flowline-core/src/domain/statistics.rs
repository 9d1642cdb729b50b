use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use super::execution::{Execution, ExecutionId, ExecutionStatus, StepError};
use super::workflow::{StepId, WorkflowDefinition, WorkflowId};

/// Running aggregates for one workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WorkflowStatistics {
    pub total_executions: u64,
    pub successful_executions: u64,
    pub failed_executions: u64,
    pub average_execution_time_ms: f64,
    pub last_execution: Option<DateTime<Utc>>,
}

impl WorkflowStatistics {
    /// Fold a settled execution into the aggregates. Anything that did not
    /// complete counts as failed.
    pub fn record(&mut self, execution: &Execution) {
        self.total_executions += 1;
        if execution.status == ExecutionStatus::Completed {
            self.successful_executions += 1;
        } else {
            self.failed_executions += 1;
        }

        let n = self.total_executions as f64;
        let latest = execution.execution_time_ms.unwrap_or(0) as f64;
        self.average_execution_time_ms = (self.average_execution_time_ms * (n - 1.0) + latest) / n;
        self.last_execution = Some(execution.completed_at.unwrap_or(execution.started_at));
    }

    /// Successful share of all executions, in percent
    pub fn success_rate(&self) -> f64 {
        if self.total_executions == 0 {
            return 0.0;
        }
        round2(self.successful_executions as f64 / self.total_executions as f64 * 100.0)
    }
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Condensed view of one execution
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExecutionSummary {
    pub execution_id: ExecutionId,
    pub status: ExecutionStatus,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub steps_completed: usize,
    pub total_steps: usize,
    pub error_count: usize,
}

/// How one step behaved across executions
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepPerformance {
    pub step_id: StepId,
    pub step_name: String,
    pub executions: usize,
    pub errors: usize,
    pub success_rate: f64,
}

/// Error totals
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ErrorSummary {
    pub total_errors: usize,
    pub errors_by_step: BTreeMap<String, usize>,
    pub most_recent: Vec<StepError>,
}

/// Detailed statistics for one workflow
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WorkflowReport {
    pub workflow_id: WorkflowId,
    pub statistics: WorkflowStatistics,
    pub recent_executions: Vec<ExecutionSummary>,
    pub performance_by_step: Vec<StepPerformance>,
    pub error_summary: ErrorSummary,
}

const RECENT_EXECUTIONS: usize = 10;
const RECENT_ERRORS: usize = 5;

impl WorkflowReport {
    /// Build a report from the statistics and the retained history, newest first
    pub fn build(definition: &WorkflowDefinition, statistics: WorkflowStatistics, history: &[Execution]) -> Self {
        let total_steps = definition.steps.len();

        let recent_executions = history
            .iter()
            .take(RECENT_EXECUTIONS)
            .map(|e| ExecutionSummary {
                execution_id: e.execution_id.clone(),
                status: e.status,
                started_at: e.started_at,
                completed_at: e.completed_at,
                steps_completed: e.steps_completed.len(),
                total_steps,
                error_count: e.errors.len(),
            })
            .collect();

        let performance_by_step = definition
            .steps
            .iter()
            .map(|step| {
                let executions = history
                    .iter()
                    .filter(|e| e.steps_completed.contains(&step.step_id))
                    .count();
                let errors = history
                    .iter()
                    .flat_map(|e| e.errors.iter())
                    .filter(|err| err.step_id == step.step_id)
                    .count();
                let success_rate = if executions > 0 {
                    round2(executions.saturating_sub(errors) as f64 / executions as f64 * 100.0)
                } else {
                    0.0
                };
                StepPerformance {
                    step_id: step.step_id.clone(),
                    step_name: step.step_name.clone(),
                    executions,
                    errors,
                    success_rate,
                }
            })
            .collect();

        let mut error_summary = ErrorSummary::default();
        let mut all_errors: Vec<&StepError> = history.iter().flat_map(|e| e.errors.iter()).collect();
        for error in &all_errors {
            error_summary.total_errors += 1;
            *error_summary
                .errors_by_step
                .entry(error.step_id.0.clone())
                .or_insert(0) += 1;
        }
        all_errors.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        error_summary.most_recent = all_errors.into_iter().take(RECENT_ERRORS).cloned().collect();

        Self {
            workflow_id: definition.id.clone(),
            statistics,
            recent_executions,
            performance_by_step,
            error_summary,
        }
    }
}
