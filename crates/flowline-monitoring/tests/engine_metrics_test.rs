use flowline_core::collaborators::memory::{InstantClock, MemoryRecordStore, RecordingNotifier};
use flowline_core::domain::repository::memory::MemoryExecutionStore;
use flowline_core::{
    Action, ActionType, Collaborators, Condition, ConditionOperator, EdgeCondition, EngineConfig, EngineError,
    ExecutionEngine, HttpClient, HttpRequest, HttpResponse, OrganizationId, StepDefinition, StepType, TriggerType,
    WorkflowDefinition,
};
use flowline_monitoring::ExecutionMetrics;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

struct NoHttp;

#[async_trait::async_trait]
impl HttpClient for NoHttp {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, EngineError> {
        Err(EngineError::Collaborator("offline".to_string()))
    }
}

#[tokio::test]
async fn test_metrics_follow_engine_runs() {
    let metrics = Arc::new(ExecutionMetrics::new());
    let collaborators = Collaborators::new(
        Arc::new(MemoryRecordStore::new()),
        Arc::new(RecordingNotifier::new()),
        Arc::new(NoHttp),
        Arc::new(InstantClock::new()),
    );
    let engine = ExecutionEngine::new(collaborators, Arc::new(MemoryExecutionStore::new()), EngineConfig::default())
        .with_event_handler(metrics.clone());

    let mut definition = WorkflowDefinition::new(OrganizationId("acme".to_string()), "triage").with_trigger(TriggerType::Manual);
    definition.steps = vec![
        StepDefinition::new("check", "Check", StepType::Condition)
            .with_condition(Condition::new("vip", ConditionOperator::Equals, json!(true)))
            .then("ticket", EdgeCondition::Success),
        StepDefinition::new("ticket", "Open ticket", StepType::Action)
            .with_action(Action::new(ActionType::CreateTicket, "priority", json!({}))),
    ];

    tokio_test::assert_ok!(engine.run(&definition, json!({ "vip": true })).await);
    tokio_test::assert_ok!(engine.run(&definition, json!({ "vip": false })).await);

    let counters = metrics.snapshot().workflow(&definition.id);
    assert_eq!(counters.started, 2);
    assert_eq!(counters.completed, 1);
    assert_eq!(counters.failed, 1);
    assert_eq!(counters.steps_finished, 3);
    assert_eq!(counters.step_errors, 1);
}
