mod common;

use common::{org, workflow, Harness, ProbeHttp, TokioSleepClock};
use flowline_core::{
    Action, ActionType, Condition, ConditionOperator, EdgeCondition, EngineConfig, EngineError, ExecutionId, ExecutionStore,
    ExecutionStatus, OrganizationId, StepDefinition, StepType, WorkflowId,
};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn scoring_steps() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new("score", "Score", StepType::Condition)
            .with_condition(Condition::new("score", ConditionOperator::GreaterThan, json!(50)))
            .then("hot", EdgeCondition::Success),
        StepDefinition::new("hot", "Hot lead", StepType::Action)
            .with_action(Action::new(ActionType::AssignTask, "sales", json!({ "lead": "{{name}}" }))),
    ]
}

#[tokio::test]
async fn test_workflow_lifecycle() {
    let harness = Harness::new();
    let service = harness.service();

    let created = service.create_workflow(workflow("leads", scoring_steps())).await.unwrap();
    assert_eq!(created.version, 1);
    assert_eq!(service.get_workflow(&created.id).await.unwrap(), created);

    let duplicate = service.create_workflow(created.clone()).await;
    assert!(matches!(duplicate, Err(EngineError::Repository(_))));

    let mut edited = created.clone();
    edited.name = "Qualified leads".to_string();
    edited.organization_id = OrganizationId("someone-else".to_string());
    let updated = service.update_workflow(edited).await.unwrap();
    assert_eq!(updated.version, 2);
    assert_eq!(updated.name, "Qualified leads");
    assert_eq!(updated.organization_id, org());
    assert_eq!(updated.created_at, created.created_at);

    let listed = service.list_workflows(&org()).await.unwrap();
    assert_eq!(listed.len(), 1);

    service.execute(&created.id, json!({ "score": 80 })).await.unwrap();
    assert_eq!(service.engine().tracked_workflows(), 1);
    service.delete_workflow(&created.id).await.unwrap();
    assert_eq!(service.engine().tracked_workflows(), 0);
    assert_eq!(
        service.get_workflow(&created.id).await.unwrap_err(),
        EngineError::WorkflowNotFound(created.id.to_string())
    );
    assert!(harness.store.history(&created.id, 1, 10).await.unwrap().is_empty());
    assert!(matches!(
        service.delete_workflow(&created.id).await,
        Err(EngineError::WorkflowNotFound(_))
    ));
}

#[tokio::test]
async fn test_execute_unknown_workflow() {
    let service = Harness::new().service();
    let missing = WorkflowId::from("missing");
    assert_eq!(
        service.execute(&missing, json!({})).await.unwrap_err(),
        EngineError::WorkflowNotFound("missing".to_string())
    );
    assert!(service.get_statistics(&missing).await.is_err());
}

#[tokio::test]
async fn test_history_is_paged_newest_first() {
    let harness = Harness::new();
    let service = harness.service();
    let definition = service.create_workflow(workflow("leads", scoring_steps())).await.unwrap();

    let mut ids = Vec::new();
    for score in [10, 60, 90] {
        let execution = service.execute(&definition.id, json!({ "score": score, "name": "Ada" })).await.unwrap();
        ids.push(execution.execution_id);
    }

    let first_page = service.get_execution_history(&definition.id, 1, Some(2)).await.unwrap();
    assert_eq!(
        first_page.iter().map(|e| e.execution_id.clone()).collect::<Vec<_>>(),
        vec![ids[2].clone(), ids[1].clone()]
    );
    let second_page = service.get_execution_history(&definition.id, 2, Some(2)).await.unwrap();
    assert_eq!(second_page.len(), 1);
    assert_eq!(second_page[0].execution_id, ids[0]);

    // page 0 is read as page 1 and oversized limits are capped
    let everything = service.get_execution_history(&definition.id, 0, Some(10_000)).await.unwrap();
    assert_eq!(everything.len(), 3);
    let defaulted = service.get_execution_history(&definition.id, 1, None).await.unwrap();
    assert_eq!(defaulted.len(), 3);

    let execution = service.get_execution(&ids[0]).await.unwrap();
    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert!(matches!(
        service.get_execution(&ExecutionId::generate()).await,
        Err(EngineError::ExecutionNotFound(_))
    ));

    let stats = service.get_statistics(&definition.id).await.unwrap();
    assert_eq!(stats.total_executions, 3);
    assert_eq!(stats.successful_executions, 2);
    assert_eq!(stats.success_rate(), 66.67);
}

#[tokio::test]
async fn test_report_summarizes_history() {
    let harness = Harness::new();
    let service = harness.service();
    let definition = service.create_workflow(workflow("leads", scoring_steps())).await.unwrap();

    for i in 0..12 {
        service
            .execute(&definition.id, json!({ "score": if i % 2 == 0 { 99 } else { 1 } }))
            .await
            .unwrap();
    }

    let report = service.get_report(&definition.id).await.unwrap();
    assert_eq!(report.statistics.total_executions, 12);
    assert_eq!(report.recent_executions.len(), 10);
    assert_eq!(report.recent_executions[0].total_steps, 2);
    assert_eq!(report.error_summary.total_errors, 6);
    assert_eq!(report.error_summary.errors_by_step.get("score"), Some(&6));
    assert_eq!(report.error_summary.most_recent.len(), 5);
}

#[tokio::test]
async fn test_toggle_requires_valid_definition() {
    let service = Harness::new().service();

    let mut broken = workflow("broken", scoring_steps());
    broken.trigger = None;
    broken.settings.enabled = false;
    let broken = service.create_workflow(broken).await.unwrap();
    assert!(matches!(
        service.toggle(&broken.id).await,
        Err(EngineError::InvalidDefinition(_))
    ));
    let validation = service.validate(&broken.id).await.unwrap();
    assert!(!validation.valid);
    assert_eq!(validation.error_messages(), vec!["Workflow must have a trigger defined".to_string()]);

    let fine = service.create_workflow(workflow("fine", scoring_steps())).await.unwrap();
    assert!(!service.toggle(&fine.id).await.unwrap());
    assert!(matches!(
        service.execute(&fine.id, json!({})).await,
        Err(EngineError::WorkflowDisabled(_))
    ));
    assert!(service.toggle(&fine.id).await.unwrap());
    assert!(service.execute(&fine.id, json!({ "score": 70 })).await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_execute_async_can_be_cancelled() {
    let harness = Harness::build(Arc::new(ProbeHttp::ok()), None, Some(Arc::new(TokioSleepClock)), EngineConfig::default());
    let service = harness.service();
    let definition = service
        .create_workflow(workflow(
            "drip",
            vec![StepDefinition::new("wait", "Wait a day", StepType::Delay).with_config(json!({ "delay_minutes": 1440 }))],
        ))
        .await
        .unwrap();

    let handle = service.execute_async(&definition.id, json!({})).await.unwrap();
    let execution_id = handle.execution_id.clone();
    tokio::time::sleep(Duration::from_secs(5)).await;
    assert!(service.engine().is_running(&execution_id));

    service.cancel(&execution_id).unwrap();
    let execution = handle.wait().await.unwrap();
    assert_eq!(execution.execution_id, execution_id);
    assert_eq!(execution.status, ExecutionStatus::Cancelled);

    assert!(matches!(
        service.cancel(&execution_id),
        Err(EngineError::ExecutionNotFound(_))
    ));
    assert_eq!(service.get_execution(&execution_id).await.unwrap().status, ExecutionStatus::Cancelled);
}

#[tokio::test]
async fn test_execute_async_completes() {
    let harness = Harness::new();
    let service = harness.service();
    let definition = service.create_workflow(workflow("leads", scoring_steps())).await.unwrap();

    let handle = service
        .execute_async(&definition.id, json!({ "score": 75, "name": "Grace" }))
        .await
        .unwrap();
    let execution = tokio_test::assert_ok!(handle.wait().await);
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(harness.records.count("tasks"), 1);
}

#[tokio::test]
async fn test_export_and_import() {
    let service = Harness::new().service();
    let definition = service.create_workflow(workflow("leads", scoring_steps())).await.unwrap();
    service.execute(&definition.id, json!({ "score": 90 })).await.unwrap();

    let export = service.export_workflow(&definition.id).await.unwrap();
    assert_eq!(export.metadata.version, 1);
    assert_eq!(export.metadata.statistics.total_executions, 1);

    let document = serde_yaml::to_string(&export).unwrap();
    let imported = service
        .import_workflow(&document, OrganizationId("globex".to_string()))
        .await
        .unwrap();
    assert_ne!(imported.id, definition.id);
    assert_eq!(imported.organization_id, OrganizationId("globex".to_string()));
    assert_eq!(imported.version, 1);
    assert_eq!(imported.steps, definition.steps);

    // a bare JSON definition imports too
    let bare = definition.to_json_string().unwrap();
    let again = service.import_workflow(&bare, org()).await.unwrap();
    assert_eq!(again.name, "leads");
    assert_eq!(service.list_workflows(&org()).await.unwrap().len(), 2);
}

#[tokio::test]
async fn test_templates_instantiate_disabled() {
    let harness = Harness::new();
    let service = harness.service();

    let templates = service.list_templates();
    assert_eq!(
        templates.iter().map(|t| t.id).collect::<Vec<_>>(),
        vec!["lead_qualification", "customer_onboarding", "support_ticket_routing"]
    );

    let definition = service
        .create_from_template("lead_qualification", org(), Some("Inbound leads"))
        .await
        .unwrap();
    assert!(!definition.settings.enabled);
    assert!(matches!(
        service.execute(&definition.id, json!({})).await,
        Err(EngineError::WorkflowDisabled(_))
    ));

    assert!(service.toggle(&definition.id).await.unwrap());
    let execution = service
        .execute(
            &definition.id,
            json!({ "email": "ada@example.com", "name": "Ada", "lead_score": 85 }),
        )
        .await
        .unwrap();
    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(
        execution.steps_completed.iter().map(|s| s.as_str()).collect::<Vec<_>>(),
        vec!["score_lead", "check_score", "assign_sales"]
    );
    assert_eq!(harness.records.count("leads"), 1);
    assert_eq!(harness.records.count("tasks"), 1);

    assert!(matches!(
        service.create_from_template("nope", org(), None).await,
        Err(EngineError::TemplateNotFound(_))
    ));
}

#[tokio::test]
async fn test_onboarding_template_runs_end_to_end() {
    let harness = Harness::new();
    let service = harness.service();
    let definition = service
        .create_from_template("customer_onboarding", org(), None)
        .await
        .unwrap();
    service.toggle(&definition.id).await.unwrap();

    let execution = service
        .execute(&definition.id, json!({ "email": "grace@example.com", "name": "Grace" }))
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.steps_completed.len(), 4);
    assert_eq!(harness.clock.slept(), Duration::from_secs(24 * 60 * 60));
    let sent = harness.notifier.sent();
    assert_eq!(sent.len(), 2);
    assert_eq!(sent[0].subject.as_deref(), Some("Welcome, Grace!"));
}
