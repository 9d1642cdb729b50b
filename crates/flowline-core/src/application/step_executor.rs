use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use super::action_dispatcher::{ActionDispatcher, StepOutput};
use super::condition_evaluator::ConditionEvaluator;
use crate::collaborators::Clock;
use crate::context::ExecutionContext;
use crate::domain::workflow::{StepDefinition, StepId, StepType};
use crate::EngineError;

/// Lifecycle of one step run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepState {
    Pending,
    Running,
    Succeeded,
    Failed,
}

/// What running a step produced
#[derive(Debug, Clone, PartialEq)]
pub struct StepReport {
    pub step_id: StepId,
    pub state: StepState,
    /// Output to merge into the context
    pub output: StepOutput,
    /// Error of the last attempt; `None` for a condition that evaluated false
    pub error: Option<String>,
    pub attempts: u32,
    pub timed_out: bool,
    /// A delay was cut short by cancellation or the workflow deadline
    pub interrupted: bool,
}

impl StepReport {
    fn pending(step_id: StepId) -> Self {
        Self {
            step_id,
            state: StepState::Pending,
            output: Map::new(),
            error: None,
            attempts: 0,
            timed_out: false,
            interrupted: false,
        }
    }

    /// Whether the step ended in `Succeeded`
    pub fn succeeded(&self) -> bool {
        self.state == StepState::Succeeded
    }

    /// Custom outcome label carried in the output, matched against custom edges
    pub fn outcome_label(&self) -> Option<&str> {
        self.output.get("outcome").and_then(Value::as_str)
    }
}

enum Attempt {
    Passed(StepOutput),
    NotSatisfied,
    Errored(EngineError),
}

/// Runs one graph node: conditions, actions, a delay or a single collaborator
/// call, with retries and the step timeout applied.
pub struct StepExecutor {
    dispatcher: Arc<ActionDispatcher>,
    evaluator: Arc<dyn ConditionEvaluator>,
    clock: Arc<dyn Clock>,
}

impl StepExecutor {
    /// Create an executor
    pub fn new(dispatcher: Arc<ActionDispatcher>, evaluator: Arc<dyn ConditionEvaluator>, clock: Arc<dyn Clock>) -> Self {
        Self {
            dispatcher,
            evaluator,
            clock,
        }
    }

    /// Run a step against a read-only view of the context. `interrupt` cuts
    /// delays and retry pauses short; a dispatched call is never interrupted.
    pub async fn run(&self, step: &StepDefinition, context: &ExecutionContext, interrupt: &CancellationToken) -> StepReport {
        let mut report = StepReport::pending(step.step_id.clone());
        let Some(step_type) = step.step_type else {
            report.state = StepState::Failed;
            report.error = Some(format!("Step {} has no type", step.step_id));
            return report;
        };

        report.state = StepState::Running;
        debug!(step_id = %step.step_id, step_type = ?step_type, "Running step");

        if step_type == StepType::Delay {
            self.run_delay(step, interrupt, &mut report).await;
            return report;
        }

        let mut attempts = 0;
        let outcome = tokio::time::timeout(
            step.timeout(),
            self.attempt_with_retries(step, step_type, context, interrupt, &mut attempts),
        )
        .await;
        report.attempts = attempts;

        match outcome {
            Ok(Attempt::Passed(output)) => {
                report.state = StepState::Succeeded;
                report.output = output;
            }
            Ok(Attempt::NotSatisfied) => {
                report.state = StepState::Failed;
            }
            Ok(Attempt::Errored(err)) => {
                report.state = StepState::Failed;
                report.error = Some(err.to_string());
            }
            Err(_) => {
                warn!(step_id = %step.step_id, timeout_minutes = step.timeout_minutes, "Step timed out");
                report.state = StepState::Failed;
                report.timed_out = true;
                report.error = Some(format!(
                    "Step {} timed out after {} minutes",
                    step.step_id, step.timeout_minutes
                ));
            }
        }

        debug!(
            step_id = %step.step_id,
            state = ?report.state,
            attempts = report.attempts,
            "Step finished"
        );
        report
    }

    async fn run_delay(&self, step: &StepDefinition, interrupt: &CancellationToken, report: &mut StepReport) {
        report.attempts = 1;
        let delay = step.delay();
        debug!(step_id = %step.step_id, delay_ms = delay.as_millis() as u64, "Waiting");

        tokio::select! {
            _ = self.clock.sleep(delay) => {
                report.state = StepState::Succeeded;
            }
            _ = interrupt.cancelled() => {
                debug!(step_id = %step.step_id, "Delay interrupted");
                report.state = StepState::Failed;
                report.interrupted = true;
            }
        }
    }

    async fn attempt_with_retries(
        &self,
        step: &StepDefinition,
        step_type: StepType,
        context: &ExecutionContext,
        interrupt: &CancellationToken,
        attempts: &mut u32,
    ) -> Attempt {
        let budget = step.retry_config.attempts();
        loop {
            *attempts += 1;
            let attempt = self.attempt(step, step_type, context).await;
            let Attempt::Errored(err) = &attempt else {
                return attempt;
            };
            if *attempts >= budget || interrupt.is_cancelled() {
                return attempt;
            }

            warn!(
                step_id = %step.step_id,
                attempt = *attempts,
                max_attempts = budget,
                error = %err,
                "Step attempt failed, retrying"
            );
            tokio::select! {
                _ = self.clock.sleep(step.retry_config.retry_delay()) => {}
                _ = interrupt.cancelled() => return attempt,
            }
        }
    }

    async fn attempt(&self, step: &StepDefinition, step_type: StepType, context: &ExecutionContext) -> Attempt {
        if step_type == StepType::Condition {
            return if self.evaluator.evaluate(&step.conditions, context) {
                Attempt::Passed(Map::new())
            } else {
                Attempt::NotSatisfied
            };
        }

        if step_type.runs_actions() {
            // later actions see the output of earlier ones
            let mut scratch = context.clone();
            let mut output = Map::new();
            for action in &step.actions {
                match self.dispatcher.execute(action, &scratch).await {
                    Ok(produced) => {
                        scratch.merge(produced.clone());
                        output.extend(produced);
                    }
                    Err(err) => return Attempt::Errored(err),
                }
            }
            return Attempt::Passed(output);
        }

        match self.dispatcher.invoke(step_type, &step.config, context).await {
            Ok(output) => Attempt::Passed(output),
            Err(err) => Attempt::Errored(err),
        }
    }
}
