use dashmap::DashMap;
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::action_dispatcher::ActionDispatcher;
use super::condition_evaluator::{ConditionEvaluator, FieldConditionEvaluator};
use super::slots::{SlotPermit, WorkflowSlots, MAX_SLOTS};
use super::step_executor::{StepExecutor, StepReport};
use crate::collaborators::{Collaborators, Notification, NotificationChannel, Notifier};
use crate::config::{AdmissionPolicy, EngineConfig};
use crate::context::ExecutionContext;
use crate::domain::events::{ExecutionEventHandler, TracingEventHandler};
use crate::domain::execution::{Execution, ExecutionId, ExecutionStatus};
use crate::domain::graph::StepGraph;
use crate::domain::repository::ExecutionStore;
use crate::domain::workflow::{EdgeCondition, StepId, WorkflowDefinition, WorkflowId};
use crate::validation::WorkflowValidator;
use crate::EngineError;

/// Identity and cancellation token of a run, chosen by the caller
#[derive(Debug, Clone)]
pub struct RunControl {
    pub execution_id: ExecutionId,
    pub cancel: CancellationToken,
}

impl RunControl {
    /// Fresh execution ID and an untriggered token
    pub fn new() -> Self {
        Self {
            execution_id: ExecutionId::generate(),
            cancel: CancellationToken::new(),
        }
    }
}

impl Default for RunControl {
    fn default() -> Self {
        Self::new()
    }
}

/// Removes a run from the cancellation registry on every exit path
struct Registration<'a> {
    running: &'a DashMap<ExecutionId, CancellationToken>,
    execution_id: ExecutionId,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.running.remove(&self.execution_id);
    }
}

struct AbortOnDrop(JoinHandle<()>);

impl Drop for AbortOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Orchestrates workflow runs: admission, traversal, history
pub struct ExecutionEngine {
    executor: StepExecutor,
    notifier: Arc<dyn Notifier>,
    store: Arc<dyn ExecutionStore>,
    validator: WorkflowValidator,
    config: EngineConfig,
    slots: DashMap<WorkflowId, Arc<WorkflowSlots>>,
    running: DashMap<ExecutionId, CancellationToken>,
    handlers: Vec<Arc<dyn ExecutionEventHandler>>,
}

impl ExecutionEngine {
    /// Create an engine with the field condition evaluator
    pub fn new(collaborators: Collaborators, store: Arc<dyn ExecutionStore>, config: EngineConfig) -> Self {
        Self::with_evaluator(collaborators, Arc::new(FieldConditionEvaluator::new()), store, config)
    }

    /// Create an engine with a custom condition evaluator
    pub fn with_evaluator(
        collaborators: Collaborators,
        evaluator: Arc<dyn ConditionEvaluator>,
        store: Arc<dyn ExecutionStore>,
        config: EngineConfig,
    ) -> Self {
        let clock = collaborators.clock.clone();
        let notifier = collaborators.notifier.clone();
        let dispatcher = Arc::new(ActionDispatcher::new(collaborators));
        Self {
            executor: StepExecutor::new(dispatcher, evaluator, clock),
            notifier,
            store,
            validator: WorkflowValidator::new(),
            config,
            slots: DashMap::new(),
            running: DashMap::new(),
            handlers: vec![Arc::new(TracingEventHandler)],
        }
    }

    /// Register an additional event handler
    pub fn with_event_handler(mut self, handler: Arc<dyn ExecutionEventHandler>) -> Self {
        self.handlers.push(handler);
        self
    }

    /// Engine configuration
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Runs of a workflow currently holding a slot
    pub fn in_flight(&self, workflow_id: &WorkflowId) -> usize {
        self.slots
            .get(workflow_id)
            .map(|slots| slots.in_use())
            .unwrap_or(0)
    }

    /// Number of workflows with a slot pool
    pub fn tracked_workflows(&self) -> usize {
        self.slots.len()
    }

    /// Drop the slot pool of a removed workflow. Runs already holding a slot
    /// finish normally.
    pub fn forget_workflow(&self, workflow_id: &WorkflowId) {
        if self.slots.remove(workflow_id).is_some() {
            debug!(workflow_id = %workflow_id, "Released concurrency slots");
        }
    }

    /// Whether an execution is currently running on this engine
    pub fn is_running(&self, execution_id: &ExecutionId) -> bool {
        self.running.contains_key(execution_id)
    }

    /// Request cancellation of a running execution. It settles as cancelled
    /// at its next step boundary. Returns false when the ID is not running.
    pub fn cancel(&self, execution_id: &ExecutionId) -> bool {
        match self.running.get(execution_id) {
            Some(token) => {
                info!(execution_id = %execution_id, "Cancellation requested");
                token.cancel();
                true
            }
            None => false,
        }
    }

    /// Run a workflow to completion
    pub async fn run(&self, definition: &WorkflowDefinition, trigger_data: Value) -> Result<Execution, EngineError> {
        self.run_with(definition, trigger_data, RunControl::new()).await
    }

    /// Run a workflow under a caller supplied execution ID and token
    pub async fn run_with(
        &self,
        definition: &WorkflowDefinition,
        trigger_data: Value,
        control: RunControl,
    ) -> Result<Execution, EngineError> {
        let workflow_id = &definition.id;
        if !definition.settings.enabled {
            return Err(EngineError::WorkflowDisabled(workflow_id.to_string()));
        }

        let validation = self.validator.validate(definition);
        if !validation.valid {
            return Err(EngineError::InvalidDefinition(validation.error_messages()));
        }

        let graph = StepGraph::build(&definition.steps);
        let entry = graph.entry().ok_or_else(|| {
            EngineError::InvalidDefinition(vec!["Workflow has no start step".to_string()])
        })?;

        let RunControl { execution_id, cancel } = control;
        self.running.insert(execution_id.clone(), cancel.clone());
        let _registration = Registration {
            running: &self.running,
            execution_id: execution_id.clone(),
        };

        // a run cancelled while queued settles without taking a slot
        let _permit = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                info!(execution_id = %execution_id, "Cancelled while waiting for a slot");
                None
            }
            admitted = self.admit(definition) => Some(admitted?),
        };

        info!(
            workflow_id = %workflow_id,
            execution_id = %execution_id,
            version = definition.version,
            "Starting execution"
        );

        let mut context = ExecutionContext::seed(&trigger_data, definition.variable_defaults());
        let mut execution = Execution::start(execution_id, workflow_id.clone(), definition.version, trigger_data);
        self.dispatch_events(&mut execution);

        self.drive(definition, &graph, entry, &mut execution, &mut context, &cancel)
            .await?;

        match self.store.record(&execution).await {
            Ok(statistics) => debug!(
                workflow_id = %workflow_id,
                total_executions = statistics.total_executions,
                average_execution_time_ms = statistics.average_execution_time_ms,
                "Statistics updated"
            ),
            Err(err) => error!(
                workflow_id = %workflow_id,
                execution_id = %execution.execution_id,
                error = %err,
                "Failed to record execution"
            ),
        }

        if execution.status != ExecutionStatus::Completed {
            self.notify_failure(definition, &execution).await;
        }
        self.dispatch_events(&mut execution);
        Ok(execution)
    }

    async fn admit(&self, definition: &WorkflowDefinition) -> Result<SlotPermit, EngineError> {
        let limit = definition.settings.max_concurrent_executions;
        let slots = self.slots_for(&definition.id, limit);

        match self.config.admission_policy {
            AdmissionPolicy::Reject => slots.try_acquire().map_err(|_| {
                warn!(workflow_id = %definition.id, limit, "Concurrency limit reached");
                EngineError::ConcurrencyLimitReached {
                    workflow_id: definition.id.to_string(),
                    limit,
                }
            }),
            AdmissionPolicy::Block => {
                let acquired = match self.config.queue_timeout() {
                    Some(wait) => tokio::time::timeout(wait, slots.acquire())
                        .await
                        .map_err(|_| {
                            EngineError::QueueTimeout(format!(
                                "workflow {} waited {} ms",
                                definition.id,
                                wait.as_millis()
                            ))
                        })?,
                    None => slots.acquire().await,
                };
                acquired.map_err(|_| EngineError::Other("Execution slots closed".to_string()))
            }
        }
    }

    fn slots_for(&self, workflow_id: &WorkflowId, limit: usize) -> Arc<WorkflowSlots> {
        let slots = self
            .slots
            .entry(workflow_id.clone())
            .or_insert_with(|| WorkflowSlots::new(limit))
            .clone();
        let current = slots.limit();
        if current != limit.min(MAX_SLOTS) {
            debug!(workflow_id = %workflow_id, from = current, to = limit, "Concurrency limit changed");
            slots.resize(limit);
        }
        slots
    }

    async fn drive(
        &self,
        definition: &WorkflowDefinition,
        graph: &StepGraph<'_>,
        entry: usize,
        execution: &mut Execution,
        context: &mut ExecutionContext,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let interrupt = cancel.child_token();
        let _watchdog = {
            let deadline = definition.settings.execution_timeout();
            let interrupt = interrupt.clone();
            AbortOnDrop(tokio::spawn(async move {
                tokio::time::sleep(deadline).await;
                interrupt.cancel();
            }))
        };

        let mut current = entry;
        let mut transitions = 0;
        loop {
            let step = graph.step(current);
            if interrupt.is_cancelled() {
                return self.settle_interrupted(definition, execution, context, &step.step_id, cancel);
            }

            transitions += 1;
            if transitions > graph.len() {
                execution.record_error(
                    &step.step_id,
                    format!("Execution exceeded {} step transitions", graph.len()),
                )?;
                error!(execution_id = %execution.execution_id, "Step graph revisited a step");
                return execution.fail(context.to_value());
            }

            execution.enter_step(&step.step_id)?;
            let mut report = self.executor.run(step, context, &interrupt).await;
            execution.record_step(&step.step_id, report.succeeded(), report.attempts)?;
            let next = select_next(graph, current, &report);
            context.merge(std::mem::take(&mut report.output));

            if definition.settings.debug_mode {
                debug!(
                    execution_id = %execution.execution_id,
                    step_id = %step.step_id,
                    context = %context.to_value(),
                    "Context after step"
                );
            }

            if let Some(message) = &report.error {
                warn!(
                    execution_id = %execution.execution_id,
                    step_id = %step.step_id,
                    error = %message,
                    "Step failed"
                );
                execution.record_error(&step.step_id, message.clone())?;
            }
            self.dispatch_events(execution);

            if report.interrupted || interrupt.is_cancelled() {
                return self.settle_interrupted(definition, execution, context, &step.step_id, cancel);
            }

            match next {
                Some(slot) => current = slot,
                None if report.succeeded() => {
                    info!(
                        workflow_id = %definition.id,
                        execution_id = %execution.execution_id,
                        steps = execution.steps_completed.len(),
                        "Execution completed"
                    );
                    return execution.complete(context.to_value());
                }
                None => {
                    if report.error.is_none() {
                        execution.record_error(
                            &step.step_id,
                            format!("Step {} finished with outcome 'failure' and no failure edge", step.step_id),
                        )?;
                    }
                    error!(
                        workflow_id = %definition.id,
                        execution_id = %execution.execution_id,
                        step_id = %step.step_id,
                        "Execution failed"
                    );
                    return execution.fail(context.to_value());
                }
            }
        }
    }

    fn settle_interrupted(
        &self,
        definition: &WorkflowDefinition,
        execution: &mut Execution,
        context: &ExecutionContext,
        step_id: &StepId,
        cancel: &CancellationToken,
    ) -> Result<(), EngineError> {
        let message = if cancel.is_cancelled() {
            "Execution cancelled".to_string()
        } else {
            format!(
                "Execution timed out after {} minutes",
                definition.settings.execution_timeout_minutes
            )
        };
        warn!(
            workflow_id = %definition.id,
            execution_id = %execution.execution_id,
            step_id = %step_id,
            "{}", message
        );
        execution.record_error(step_id, message)?;
        execution.cancel(context.to_value())
    }

    async fn notify_failure(&self, definition: &WorkflowDefinition, execution: &Execution) {
        let Some(recipient) = definition
            .settings
            .error_notification_email
            .as_ref()
            .filter(|email| !email.is_empty())
        else {
            return;
        };

        let errors = execution
            .errors
            .iter()
            .map(|e| format!("{}: {}", e.step_id, e.message))
            .collect::<Vec<_>>()
            .join("\n");
        let notification = Notification {
            channel: NotificationChannel::Email,
            recipient: recipient.clone(),
            subject: Some(format!(
                "Workflow \"{}\" execution {:?}",
                definition.name, execution.status
            )),
            body: format!("Execution {} did not complete.\n{}", execution.execution_id, errors),
        };
        if let Err(err) = self.notifier.send(notification).await {
            warn!(
                execution_id = %execution.execution_id,
                error = %err,
                "Failed to send error notification"
            );
        }
    }

    fn dispatch_events(&self, execution: &mut Execution) {
        for event in execution.take_events() {
            for handler in &self.handlers {
                handler.handle(&event);
            }
        }
    }
}

/// Pick the next step: a custom label from the output first, then the exact
/// success or failure edge, then an `always` edge
fn select_next(graph: &StepGraph<'_>, slot: usize, report: &StepReport) -> Option<usize> {
    let edges = graph.edges(slot);
    if let Some(label) = report.outcome_label() {
        let custom = edges
            .iter()
            .find(|edge| matches!(edge.condition, EdgeCondition::Custom(c) if c == label));
        if let Some(edge) = custom {
            return Some(edge.target);
        }
    }

    let exact = if report.succeeded() {
        EdgeCondition::Success
    } else {
        EdgeCondition::Failure
    };
    edges
        .iter()
        .find(|edge| *edge.condition == exact)
        .or_else(|| edges.iter().find(|edge| *edge.condition == EdgeCondition::Always))
        .map(|edge| edge.target)
}
