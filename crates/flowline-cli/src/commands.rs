use anyhow::{bail, Context, Result};
use clap::ValueEnum;
use flowline_core::domain::repository::memory::{MemoryExecutionStore, MemoryWorkflowRepository};
use flowline_core::domain::templates::{find_template, templates};
use flowline_core::{
    EngineConfig, ExecutionEngine, ExecutionStatus, ExecutionStore, OrganizationId, ValidationResult,
    WorkflowDefinition, WorkflowService, WorkflowValidator,
};
use flowline_monitoring::{ExecutionMetrics, LogExt};
use flowline_stdlib::standard_collaborators;
use serde_json::Value;
use std::fs;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Serialization format for printed definitions
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Json,
    Yaml,
}

fn read_definition(path: &Path) -> Result<WorkflowDefinition> {
    let input = fs::read_to_string(path).with_context(|| format!("Failed to read {}", path.display()))?;
    WorkflowDefinition::parse(&input).with_context(|| format!("Failed to parse {}", path.display()))
}

fn parse_trigger(input: &str) -> Result<Value> {
    let trigger: Value = serde_json::from_str(input).context("Trigger data is not valid JSON")?;
    if !trigger.is_object() {
        bail!("Trigger data must be a JSON object");
    }
    Ok(trigger)
}

fn render_validation(result: &ValidationResult) -> String {
    let mut lines = Vec::new();
    for error in &result.errors {
        lines.push(format!("error   {}", error));
    }
    for warning in &result.warnings {
        lines.push(format!("warning {}", warning));
    }
    lines.push(if result.valid {
        "Workflow is valid".to_string()
    } else {
        format!("Workflow is invalid ({} errors)", result.errors.len())
    });
    lines.join("\n")
}

/// `flowline validate`
pub fn validate(path: &Path) -> Result<()> {
    let definition = read_definition(path)?;
    let result = WorkflowValidator::new().validate(&definition);
    println!("{}", render_validation(&result));
    if !result.valid {
        bail!("{} failed validation", path.display());
    }
    Ok(())
}

/// `flowline run`
pub async fn run(path: &Path, trigger: &str, force: bool, config: EngineConfig) -> Result<()> {
    let mut definition = read_definition(path)?;
    let trigger = parse_trigger(trigger)?;
    if force {
        definition.settings.enabled = true;
    }

    let store: Arc<dyn ExecutionStore> = match config.history_retention {
        Some(limit) => Arc::new(MemoryExecutionStore::with_retention(limit)),
        None => Arc::new(MemoryExecutionStore::new()),
    };
    let metrics = Arc::new(ExecutionMetrics::new());
    let collaborators = standard_collaborators().context("Failed to build HTTP client")?;
    let engine = ExecutionEngine::new(collaborators, store.clone(), config).with_event_handler(metrics.clone());
    let service = WorkflowService::new(Arc::new(MemoryWorkflowRepository::new()), store, Arc::new(engine));

    let definition = service.create_workflow(definition).await?;
    let execution = service
        .execute(&definition.id, trigger)
        .await
        .log_err("Workflow run rejected")?;

    println!("{}", serde_json::to_string_pretty(&execution)?);
    let counters = metrics.snapshot().workflow(&definition.id);
    info!(
        steps = counters.steps_finished,
        errors = counters.step_errors,
        retried = counters.retried_steps,
        "Run finished"
    );

    if execution.status != ExecutionStatus::Completed {
        bail!("Execution {} finished as {:?}", execution.execution_id, execution.status);
    }
    Ok(())
}

/// `flowline templates`
pub fn list_templates() -> Result<()> {
    for template in templates() {
        println!(
            "{:<24} {:<12} {:<13} {}",
            template.id,
            format!("{:?}", template.category).to_lowercase(),
            template.complexity,
            template.description
        );
    }
    Ok(())
}

/// `flowline export-template`
pub fn export_template(id: &str, organization: &str, name: Option<&str>, format: OutputFormat) -> Result<()> {
    println!("{}", render_template(id, organization, name, format)?);
    Ok(())
}

fn render_template(id: &str, organization: &str, name: Option<&str>, format: OutputFormat) -> Result<String> {
    let definition = find_template(id)?.instantiate(OrganizationId(organization.to_string()), name);
    let rendered = match format {
        OutputFormat::Json => definition.to_json_string()?,
        OutputFormat::Yaml => definition.to_yaml_string()?,
    };
    Ok(rendered)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowline_core::{RetryConfig, StepDefinition, StepType, TriggerType};
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    fn write_temp(name: &str, contents: &str) -> PathBuf {
        let path = std::env::temp_dir().join(format!("flowline-cli-{}-{}", std::process::id(), name));
        fs::write(&path, contents).unwrap();
        path
    }

    #[test]
    fn test_parse_trigger() {
        assert_eq!(parse_trigger("{\"a\":1}").unwrap()["a"], 1);
        assert!(parse_trigger("[1,2]").is_err());
        assert!(parse_trigger("not json").is_err());
    }

    #[test]
    fn test_template_output_parses_back() {
        let yaml = render_template("lead_qualification", "acme", Some("Leads"), OutputFormat::Yaml).unwrap();
        let definition = WorkflowDefinition::parse(&yaml).unwrap();
        assert_eq!(definition.name, "Leads");
        assert_eq!(definition.steps.len(), 4);

        let json = render_template("support_ticket_routing", "acme", None, OutputFormat::Json).unwrap();
        assert!(json.trim_start().starts_with('{'));
        assert!(render_template("missing", "acme", None, OutputFormat::Json).is_err());
    }

    #[test]
    fn test_validate_reports_invalid_file() {
        let definition = WorkflowDefinition::new(OrganizationId("acme".to_string()), "empty")
            .with_trigger(TriggerType::Manual);
        let path = write_temp("empty.json", &definition.to_json_string().unwrap());
        assert!(validate(&path).is_err());

        let result = WorkflowValidator::new().validate(&definition);
        assert!(render_validation(&result).contains("Workflow is invalid"));
        fs::remove_file(path).unwrap();
    }

    #[tokio::test]
    async fn test_run_single_step_workflow() {
        let definition = WorkflowDefinition::new(OrganizationId("acme".to_string()), "log only")
            .with_trigger(TriggerType::Manual)
            .with_step(
                StepDefinition::new("push", "Push note", StepType::Notification)
                    .with_config(serde_json::json!({ "channel": "push", "recipient": "{{user}}", "message": "hello" }))
                    .with_retry(RetryConfig::none()),
            );
        let path = write_temp("push.json", &definition.to_json_string().unwrap());

        run(&path, "{\"user\":\"ada\"}", false, EngineConfig::default()).await.unwrap();
        assert!(run(&path, "{}", false, EngineConfig::default()).await.is_err());
        fs::remove_file(path).unwrap();
    }
}
