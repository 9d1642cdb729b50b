use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::execution_engine::{ExecutionEngine, RunControl};
use crate::domain::execution::{Execution, ExecutionId};
use crate::domain::repository::{ExecutionStore, WorkflowRepository};
use crate::domain::statistics::{WorkflowReport, WorkflowStatistics};
use crate::domain::templates::{self, WorkflowTemplate};
use crate::domain::workflow::{OrganizationId, WorkflowDefinition, WorkflowId};
use crate::validation::{ValidationResult, WorkflowValidator};
use crate::EngineError;

/// A run started in the background
#[derive(Debug)]
pub struct ExecutionHandle {
    /// Known before the run is admitted
    pub execution_id: ExecutionId,
    cancel: CancellationToken,
    join: JoinHandle<Result<Execution, EngineError>>,
}

impl ExecutionHandle {
    /// Request cancellation at the next step boundary
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait for the run to settle
    pub async fn wait(self) -> Result<Execution, EngineError> {
        self.join
            .await
            .map_err(|e| EngineError::Other(format!("Execution task failed: {}", e)))?
    }
}

/// Exported definition with its provenance
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowExport {
    pub workflow: WorkflowDefinition,
    pub metadata: ExportMetadata,
}

/// Export metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportMetadata {
    pub exported_at: DateTime<Utc>,
    pub version: u32,
    pub statistics: WorkflowStatistics,
}

/// Entry point for managing and running workflows
pub struct WorkflowService {
    /// Repository for workflow definitions
    workflows: Arc<dyn WorkflowRepository>,

    /// Execution history and statistics
    store: Arc<dyn ExecutionStore>,

    /// Engine that runs the workflows
    engine: Arc<ExecutionEngine>,

    validator: WorkflowValidator,
}

impl WorkflowService {
    /// Create a new workflow service
    pub fn new(
        workflows: Arc<dyn WorkflowRepository>,
        store: Arc<dyn ExecutionStore>,
        engine: Arc<ExecutionEngine>,
    ) -> Self {
        Self {
            workflows,
            store,
            engine,
            validator: WorkflowValidator::new(),
        }
    }

    /// The engine runs go through
    pub fn engine(&self) -> &Arc<ExecutionEngine> {
        &self.engine
    }

    /// Store a new workflow
    pub async fn create_workflow(&self, mut definition: WorkflowDefinition) -> Result<WorkflowDefinition, EngineError> {
        if self.workflows.find_by_id(&definition.id).await?.is_some() {
            return Err(EngineError::Repository(format!(
                "Workflow already exists: {}",
                definition.id
            )));
        }

        let now = Utc::now();
        definition.created_at = now;
        definition.updated_at = now;
        self.workflows.save(&definition).await?;

        info!(
            workflow_id = %definition.id,
            organization_id = %definition.organization_id,
            steps = definition.steps.len(),
            "Workflow created"
        );
        Ok(definition)
    }

    /// Replace a workflow's content. The ID, organization and creation time
    /// are kept and the version is bumped.
    pub async fn update_workflow(&self, mut definition: WorkflowDefinition) -> Result<WorkflowDefinition, EngineError> {
        let existing = self.get_workflow(&definition.id).await?;
        definition.organization_id = existing.organization_id;
        definition.created_at = existing.created_at;
        definition.version = existing.version + 1;
        definition.updated_at = Utc::now();
        self.workflows.save(&definition).await?;

        info!(workflow_id = %definition.id, version = definition.version, "Workflow updated");
        Ok(definition)
    }

    /// Delete a workflow together with its history
    pub async fn delete_workflow(&self, workflow_id: &WorkflowId) -> Result<(), EngineError> {
        if !self.workflows.delete(workflow_id).await? {
            return Err(EngineError::WorkflowNotFound(workflow_id.to_string()));
        }
        self.store.remove_workflow(workflow_id).await?;
        self.engine.forget_workflow(workflow_id);

        info!(workflow_id = %workflow_id, "Workflow deleted");
        Ok(())
    }

    /// Load a workflow
    pub async fn get_workflow(&self, workflow_id: &WorkflowId) -> Result<WorkflowDefinition, EngineError> {
        self.workflows
            .find_by_id(workflow_id)
            .await?
            .ok_or_else(|| EngineError::WorkflowNotFound(workflow_id.to_string()))
    }

    /// Workflows of an organization, newest first
    pub async fn list_workflows(&self, organization_id: &OrganizationId) -> Result<Vec<WorkflowDefinition>, EngineError> {
        self.workflows.list_for_organization(organization_id).await
    }

    /// Run a workflow and wait for it to settle
    pub async fn execute(&self, workflow_id: &WorkflowId, trigger_data: Value) -> Result<Execution, EngineError> {
        let definition = self.get_workflow(workflow_id).await?;
        self.engine.run(&definition, trigger_data).await
    }

    /// Start a run in the background. The definition is snapshotted now, so
    /// later edits do not affect the run.
    pub async fn execute_async(&self, workflow_id: &WorkflowId, trigger_data: Value) -> Result<ExecutionHandle, EngineError> {
        let definition = self.get_workflow(workflow_id).await?;
        let control = RunControl::new();
        let execution_id = control.execution_id.clone();
        let cancel = control.cancel.clone();

        let engine = self.engine.clone();
        let join = tokio::spawn(async move { engine.run_with(&definition, trigger_data, control).await });

        Ok(ExecutionHandle {
            execution_id,
            cancel,
            join,
        })
    }

    /// Cancel a running execution
    pub fn cancel(&self, execution_id: &ExecutionId) -> Result<(), EngineError> {
        if self.engine.cancel(execution_id) {
            Ok(())
        } else {
            Err(EngineError::ExecutionNotFound(execution_id.to_string()))
        }
    }

    /// Validate a stored workflow
    pub async fn validate(&self, workflow_id: &WorkflowId) -> Result<ValidationResult, EngineError> {
        let definition = self.get_workflow(workflow_id).await?;
        Ok(self.validator.validate(&definition))
    }

    /// One page of a workflow's executions, newest first. Pages start at 1;
    /// the limit defaults to the configured page size and is capped.
    pub async fn get_execution_history(
        &self,
        workflow_id: &WorkflowId,
        page: usize,
        limit: Option<usize>,
    ) -> Result<Vec<Execution>, EngineError> {
        self.get_workflow(workflow_id).await?;
        let config = self.engine.config();
        let limit = limit
            .unwrap_or(config.history_page_size)
            .clamp(1, config.max_history_page_size.max(1));
        self.store.history(workflow_id, page.max(1), limit).await
    }

    /// Load one execution
    pub async fn get_execution(&self, execution_id: &ExecutionId) -> Result<Execution, EngineError> {
        self.store
            .find_execution(execution_id)
            .await?
            .ok_or_else(|| EngineError::ExecutionNotFound(execution_id.to_string()))
    }

    /// Aggregated statistics of a workflow
    pub async fn get_statistics(&self, workflow_id: &WorkflowId) -> Result<WorkflowStatistics, EngineError> {
        self.get_workflow(workflow_id).await?;
        self.store.statistics(workflow_id).await
    }

    /// Detailed statistics over the retained history
    pub async fn get_report(&self, workflow_id: &WorkflowId) -> Result<WorkflowReport, EngineError> {
        let definition = self.get_workflow(workflow_id).await?;
        let statistics = self.store.statistics(workflow_id).await?;
        let history = self.store.history(workflow_id, 1, usize::MAX).await?;
        Ok(WorkflowReport::build(&definition, statistics, &history))
    }

    /// Flip the enabled flag. Enabling requires a valid definition.
    pub async fn toggle(&self, workflow_id: &WorkflowId) -> Result<bool, EngineError> {
        let mut definition = self.get_workflow(workflow_id).await?;
        if !definition.settings.enabled {
            let validation = self.validator.validate(&definition);
            if !validation.valid {
                warn!(workflow_id = %workflow_id, "Refusing to enable an invalid workflow");
                return Err(EngineError::InvalidDefinition(validation.error_messages()));
            }
        }

        definition.settings.enabled = !definition.settings.enabled;
        definition.updated_at = Utc::now();
        self.workflows.save(&definition).await?;

        info!(workflow_id = %workflow_id, enabled = definition.settings.enabled, "Workflow toggled");
        Ok(definition.settings.enabled)
    }

    /// Export a workflow with its statistics
    pub async fn export_workflow(&self, workflow_id: &WorkflowId) -> Result<WorkflowExport, EngineError> {
        let workflow = self.get_workflow(workflow_id).await?;
        let statistics = self.store.statistics(workflow_id).await?;
        Ok(WorkflowExport {
            metadata: ExportMetadata {
                exported_at: Utc::now(),
                version: workflow.version,
                statistics,
            },
            workflow,
        })
    }

    /// Import an exported workflow, or a bare definition, in YAML or JSON.
    /// The import is stored as a new workflow of the given organization.
    pub async fn import_workflow(&self, document: &str, organization_id: OrganizationId) -> Result<WorkflowDefinition, EngineError> {
        let mut definition = match serde_yaml::from_str::<WorkflowExport>(document) {
            Ok(export) => export.workflow,
            Err(_) => WorkflowDefinition::parse(document)?,
        };
        definition.id = WorkflowId::generate();
        definition.organization_id = organization_id;
        definition.version = 1;
        self.create_workflow(definition).await
    }

    /// Built-in templates
    pub fn list_templates(&self) -> Vec<WorkflowTemplate> {
        templates::templates()
    }

    /// Create a disabled workflow from a template
    pub async fn create_from_template(
        &self,
        template_id: &str,
        organization_id: OrganizationId,
        name: Option<&str>,
    ) -> Result<WorkflowDefinition, EngineError> {
        let template = templates::find_template(template_id)?;
        self.create_workflow(template.instantiate(organization_id, name)).await
    }
}
