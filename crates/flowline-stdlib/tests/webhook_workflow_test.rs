use flowline_core::domain::repository::memory::MemoryExecutionStore;
use flowline_core::{
    EdgeCondition, EngineConfig, ExecutionEngine, ExecutionStatus, OrganizationId, RetryConfig, StepDefinition,
    StepType, TriggerType, WorkflowDefinition,
};
use flowline_stdlib::standard_collaborators;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;
use wiremock::matchers::{body_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine() -> ExecutionEngine {
    ExecutionEngine::new(
        standard_collaborators().unwrap(),
        Arc::new(MemoryExecutionStore::new()),
        EngineConfig::default(),
    )
}

fn definition(steps: Vec<StepDefinition>) -> WorkflowDefinition {
    let mut definition =
        WorkflowDefinition::new(OrganizationId("acme".to_string()), "webhooks").with_trigger(TriggerType::Webhook);
    definition.steps = steps;
    definition
}

#[tokio::test]
async fn test_webhook_then_sms_against_live_server() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/crm/leads"))
        .and(body_json(json!({ "name": "Ada", "source": "form" })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "crm_id": "L-42" })))
        .expect(1)
        .mount(&server)
        .await;

    let steps = vec![
        StepDefinition::new("push", "Push to CRM", StepType::Webhook)
            .with_config(json!({
                "url": format!("{}/crm/leads", server.uri()),
                "body": { "name": "{{name}}", "source": "form" }
            }))
            .then("text", EdgeCondition::Success),
        StepDefinition::new("text", "Text the rep", StepType::Sms).with_config(json!({
            "to": "{{phone}}",
            "message": "New lead {{webhook_response.body.crm_id}}"
        })),
    ];

    let execution = engine()
        .run(&definition(steps), json!({ "name": "Ada", "phone": "+15550100" }))
        .await
        .unwrap();

    assert_eq!(execution.status, ExecutionStatus::Completed);
    assert_eq!(execution.output_data["webhook_response"]["body"]["crm_id"], json!("L-42"));
    assert!(execution.output_data["notification_id"].is_string());
}

#[tokio::test]
async fn test_server_errors_are_retried_then_fail() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/inventory"))
        .respond_with(ResponseTemplate::new(500))
        .expect(2)
        .mount(&server)
        .await;

    let steps = vec![StepDefinition::new("lookup", "Check inventory", StepType::ApiCall)
        .with_config(json!({ "url": format!("{}/inventory", server.uri()) }))
        .with_retry(RetryConfig {
            max_attempts: 2,
            retry_delay_minutes: 0.0,
        })];

    let execution = engine().run(&definition(steps), json!({})).await.unwrap();

    assert_eq!(execution.status, ExecutionStatus::Failed);
    assert_eq!(execution.errors.len(), 1);
    assert!(execution.errors[0].message.contains("returned HTTP 500"));
}
