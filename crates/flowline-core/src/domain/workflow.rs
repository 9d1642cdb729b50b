use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::EngineError;

/// Value object: Workflow ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct WorkflowId(pub String);

impl WorkflowId {
    /// Generate a fresh random workflow ID
    pub fn generate() -> Self {
        Self(Uuid::new_v4().to_string())
    }
}

impl fmt::Display for WorkflowId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for WorkflowId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Value object: Step ID, unique within one workflow
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct StepId(pub String);

impl StepId {
    /// Borrow the raw identifier
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for StepId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for StepId {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

/// Value object: owning organization
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OrganizationId(pub String);

impl fmt::Display for OrganizationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Value object: operator identity
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct UserId(pub String);

/// Business area a workflow belongs to
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkflowCategory {
    Sales,
    Marketing,
    Support,
    Operations,
    Hr,
    Finance,
    #[default]
    Custom,
}

/// Event type that starts an execution
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TriggerType {
    Manual,
    Schedule,
    Webhook,
    Email,
    FormSubmission,
    DataChange,
    ApiCall,
}

/// Trigger definition; `config` is opaque to the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trigger {
    /// Trigger type, required for a valid definition
    #[serde(rename = "type", default)]
    pub trigger_type: Option<TriggerType>,

    /// Trigger specific settings (cron expression, webhook path, ...)
    #[serde(default)]
    pub config: Value,
}

impl Trigger {
    /// Create a typed trigger with no configuration
    pub fn new(trigger_type: TriggerType) -> Self {
        Self {
            trigger_type: Some(trigger_type),
            config: Value::Null,
        }
    }
}

/// Kind of graph node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StepType {
    Condition,
    Action,
    Delay,
    Approval,
    Notification,
    DataTransformation,
    ApiCall,
    Email,
    Sms,
    Webhook,
    DatabaseOperation,
    FileOperation,
    Integration,
}

impl StepType {
    /// Step types that perform exactly one collaborator call configured by `config`
    pub fn is_single_call(self) -> bool {
        matches!(
            self,
            StepType::Notification
                | StepType::Email
                | StepType::Sms
                | StepType::Webhook
                | StepType::ApiCall
                | StepType::DatabaseOperation
        )
    }

    /// Step types that run their action list
    pub fn runs_actions(self) -> bool {
        matches!(
            self,
            StepType::Action
                | StepType::Approval
                | StepType::DataTransformation
                | StepType::FileOperation
                | StepType::Integration
        )
    }
}

/// Comparison applied by a condition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConditionOperator {
    Equals,
    NotEquals,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    IsEmpty,
    IsNotEmpty,
}

/// How a condition joins with the next one in the list
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicOperator {
    #[default]
    #[serde(rename = "AND", alias = "and")]
    And,
    #[serde(rename = "OR", alias = "or")]
    Or,
}

/// A predicate over one context field
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Condition {
    /// Dot separated path into the execution context
    pub field: String,

    /// Comparison operator
    pub operator: ConditionOperator,

    /// Value to compare against; ignored by the emptiness operators
    #[serde(default)]
    pub value: Value,

    /// Join between this condition's accumulated result and the next condition
    #[serde(default)]
    pub logic_operator: LogicOperator,
}

impl Condition {
    /// Create a condition joined to the next one with AND
    pub fn new(field: impl Into<String>, operator: ConditionOperator, value: Value) -> Self {
        Self {
            field: field.into(),
            operator,
            value,
            logic_operator: LogicOperator::And,
        }
    }

    /// Set the join operator
    pub fn joined_by(mut self, logic_operator: LogicOperator) -> Self {
        self.logic_operator = logic_operator;
        self
    }
}

/// Side effect an action step performs
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionType {
    CreateRecord,
    UpdateRecord,
    DeleteRecord,
    SendEmail,
    SendSms,
    CallWebhook,
    RunScript,
    AssignTask,
    CreateTicket,
    UpdateStatus,
    CalculateField,
}

/// A typed action; `parameters` may reference the context with `{{path}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Action {
    /// Action type
    pub action_type: ActionType,

    /// Entity, recipient, URL or field the action applies to
    #[serde(default)]
    pub target: String,

    /// Opaque parameters
    #[serde(default)]
    pub parameters: Value,
}

impl Action {
    /// Create an action
    pub fn new(action_type: ActionType, target: impl Into<String>, parameters: Value) -> Self {
        Self {
            action_type,
            target: target.into(),
            parameters,
        }
    }
}

/// Outcome predicate on a next-step edge
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum EdgeCondition {
    /// Taken when the step succeeded
    #[default]
    Success,
    /// Taken when the step failed
    Failure,
    /// Taken for any outcome when nothing more specific matches
    Always,
    /// Taken when the step's output carries this `outcome` label
    Custom(String),
}

impl EdgeCondition {
    /// Wire representation
    pub fn as_str(&self) -> &str {
        match self {
            EdgeCondition::Success => "success",
            EdgeCondition::Failure => "failure",
            EdgeCondition::Always => "always",
            EdgeCondition::Custom(label) => label,
        }
    }
}

impl From<String> for EdgeCondition {
    fn from(value: String) -> Self {
        match value.as_str() {
            "success" => EdgeCondition::Success,
            "failure" => EdgeCondition::Failure,
            "always" | "default" => EdgeCondition::Always,
            _ => EdgeCondition::Custom(value),
        }
    }
}

impl From<EdgeCondition> for String {
    fn from(value: EdgeCondition) -> Self {
        value.as_str().to_string()
    }
}

/// Directed edge to another step
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NextStep {
    /// Target step
    pub step_id: StepId,

    /// Outcome that activates the edge
    #[serde(default)]
    pub condition: EdgeCondition,
}

/// Retry policy for a step
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    /// Total attempts, the first one included
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,

    /// Pause between attempts
    #[serde(default = "default_retry_delay_minutes")]
    pub retry_delay_minutes: f64,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_delay_minutes() -> f64 {
    5.0
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            retry_delay_minutes: default_retry_delay_minutes(),
        }
    }
}

impl RetryConfig {
    /// A policy that never retries
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            retry_delay_minutes: 0.0,
        }
    }

    /// Attempt budget; zero is treated as a single attempt
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }

    /// Pause between attempts
    pub fn retry_delay(&self) -> Duration {
        minutes(self.retry_delay_minutes)
    }
}

/// Convert fractional minutes to a duration, saturating on out-of-range input
pub fn minutes(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value * 60.0).unwrap_or(Duration::MAX)
}

fn default_timeout_minutes() -> f64 {
    60.0
}

/// One node of the workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StepDefinition {
    /// Unique step ID
    pub step_id: StepId,

    /// Display name
    #[serde(default)]
    pub step_name: String,

    /// Step type, required for a valid definition
    #[serde(default)]
    pub step_type: Option<StepType>,

    /// Type specific configuration (delay length, URL, recipient, ...)
    #[serde(default)]
    pub config: Value,

    /// Conditions evaluated by condition steps
    #[serde(default)]
    pub conditions: Vec<Condition>,

    /// Actions run by action steps
    #[serde(default)]
    pub actions: Vec<Action>,

    /// Outgoing edges
    #[serde(default)]
    pub next_steps: Vec<NextStep>,

    /// Per step timeout
    #[serde(default = "default_timeout_minutes")]
    pub timeout_minutes: f64,

    /// Retry policy
    #[serde(default)]
    pub retry_config: RetryConfig,
}

impl StepDefinition {
    /// Create a step with default timeout and retry policy
    pub fn new(step_id: impl Into<String>, step_name: impl Into<String>, step_type: StepType) -> Self {
        Self {
            step_id: StepId(step_id.into()),
            step_name: step_name.into(),
            step_type: Some(step_type),
            config: Value::Null,
            conditions: Vec::new(),
            actions: Vec::new(),
            next_steps: Vec::new(),
            timeout_minutes: default_timeout_minutes(),
            retry_config: RetryConfig::default(),
        }
    }

    /// Add a condition
    pub fn with_condition(mut self, condition: Condition) -> Self {
        self.conditions.push(condition);
        self
    }

    /// Add an action
    pub fn with_action(mut self, action: Action) -> Self {
        self.actions.push(action);
        self
    }

    /// Replace the configuration
    pub fn with_config(mut self, config: Value) -> Self {
        self.config = config;
        self
    }

    /// Add an outgoing edge
    pub fn then(mut self, step_id: impl Into<String>, condition: EdgeCondition) -> Self {
        self.next_steps.push(NextStep {
            step_id: StepId(step_id.into()),
            condition,
        });
        self
    }

    /// Replace the retry policy
    pub fn with_retry(mut self, retry_config: RetryConfig) -> Self {
        self.retry_config = retry_config;
        self
    }

    /// Replace the timeout
    pub fn with_timeout_minutes(mut self, timeout_minutes: f64) -> Self {
        self.timeout_minutes = timeout_minutes;
        self
    }

    /// Per step timeout
    pub fn timeout(&self) -> Duration {
        minutes(self.timeout_minutes)
    }

    /// Wait length of a delay step, one minute unless configured
    pub fn delay(&self) -> Duration {
        let delay_minutes = self
            .config
            .get("delay_minutes")
            .and_then(Value::as_f64)
            .unwrap_or(1.0);
        minutes(delay_minutes)
    }
}

/// Type of a workflow variable
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VariableType {
    #[default]
    String,
    Number,
    Boolean,
    Date,
    Object,
}

/// Named variable exposed to steps under `variables.<name>`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Variable {
    pub name: String,
    #[serde(rename = "type", default)]
    pub variable_type: VariableType,
    #[serde(default)]
    pub default_value: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Identities granted access to a workflow
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Permissions {
    #[serde(default)]
    pub viewers: Vec<UserId>,
    #[serde(default)]
    pub editors: Vec<UserId>,
    #[serde(default)]
    pub approvers: Vec<UserId>,
}

impl Permissions {
    /// True when nobody has been granted anything
    pub fn is_empty(&self) -> bool {
        self.viewers.is_empty() && self.editors.is_empty() && self.approvers.is_empty()
    }
}

/// Execution limits and switches
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowSettings {
    /// Whether the workflow accepts executions
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    /// Upper bound on simultaneously running executions of this workflow
    #[serde(default = "default_max_concurrent_executions")]
    pub max_concurrent_executions: usize,

    /// Workflow level deadline
    #[serde(default = "default_execution_timeout_minutes")]
    pub execution_timeout_minutes: f64,

    /// Log the context after every step
    #[serde(default)]
    pub debug_mode: bool,

    /// Recipient notified when an execution does not complete
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_notification_email: Option<String>,
}

fn default_enabled() -> bool {
    true
}

fn default_max_concurrent_executions() -> usize {
    10
}

fn default_execution_timeout_minutes() -> f64 {
    120.0
}

impl Default for WorkflowSettings {
    fn default() -> Self {
        Self {
            enabled: default_enabled(),
            max_concurrent_executions: default_max_concurrent_executions(),
            execution_timeout_minutes: default_execution_timeout_minutes(),
            debug_mode: false,
            error_notification_email: None,
        }
    }
}

impl WorkflowSettings {
    /// Workflow level deadline
    pub fn execution_timeout(&self) -> Duration {
        minutes(self.execution_timeout_minutes)
    }
}

fn default_version() -> u32 {
    1
}

/// A stored, user-authored workflow graph
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkflowDefinition {
    /// Unique identifier
    #[serde(default = "WorkflowId::generate")]
    pub id: WorkflowId,

    /// Owning organization
    #[serde(default)]
    pub organization_id: OrganizationId,

    /// Display name
    pub name: String,

    /// Free text description
    #[serde(default)]
    pub description: String,

    /// Business category
    #[serde(default)]
    pub category: WorkflowCategory,

    /// What starts the workflow
    #[serde(default)]
    pub trigger: Option<Trigger>,

    /// Graph nodes in definition order
    #[serde(default)]
    pub steps: Vec<StepDefinition>,

    /// Variables seeded into every execution context
    #[serde(default)]
    pub variables: Vec<Variable>,

    /// Access grants
    #[serde(default)]
    pub permissions: Permissions,

    /// Execution settings
    #[serde(default)]
    pub settings: WorkflowSettings,

    /// Incremented on every update
    #[serde(default = "default_version")]
    pub version: u32,

    /// Author
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_by: Option<UserId>,

    /// Creation timestamp
    #[serde(default = "Utc::now")]
    pub created_at: DateTime<Utc>,

    /// Last updated timestamp
    #[serde(default = "Utc::now")]
    pub updated_at: DateTime<Utc>,
}

impl WorkflowDefinition {
    /// Create an empty enabled workflow
    pub fn new(organization_id: OrganizationId, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: WorkflowId::generate(),
            organization_id,
            name: name.into(),
            description: String::new(),
            category: WorkflowCategory::default(),
            trigger: None,
            steps: Vec::new(),
            variables: Vec::new(),
            permissions: Permissions::default(),
            settings: WorkflowSettings::default(),
            version: default_version(),
            created_by: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the trigger
    pub fn with_trigger(mut self, trigger_type: TriggerType) -> Self {
        self.trigger = Some(Trigger::new(trigger_type));
        self
    }

    /// Append a step
    pub fn with_step(mut self, step: StepDefinition) -> Self {
        self.steps.push(step);
        self
    }

    /// Append a variable
    pub fn with_variable(mut self, name: impl Into<String>, variable_type: VariableType, default_value: Value) -> Self {
        self.variables.push(Variable {
            name: name.into(),
            variable_type,
            default_value,
            description: None,
        });
        self
    }

    /// Replace the settings
    pub fn with_settings(mut self, settings: WorkflowSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Find a step by ID
    pub fn step(&self, step_id: &str) -> Option<&StepDefinition> {
        self.steps.iter().find(|s| s.step_id.0 == step_id)
    }

    /// Variable defaults keyed by name
    pub fn variable_defaults(&self) -> Map<String, Value> {
        self.variables
            .iter()
            .map(|v| (v.name.clone(), v.default_value.clone()))
            .collect()
    }

    /// Parse a definition from JSON
    pub fn from_json_str(input: &str) -> Result<Self, EngineError> {
        Ok(serde_json::from_str(input)?)
    }

    /// Parse a definition from YAML
    pub fn from_yaml_str(input: &str) -> Result<Self, EngineError> {
        Ok(serde_yaml::from_str(input)?)
    }

    /// Parse JSON or YAML, picking JSON when the document starts with a brace
    pub fn parse(input: &str) -> Result<Self, EngineError> {
        if input.trim_start().starts_with('{') {
            Self::from_json_str(input)
        } else {
            Self::from_yaml_str(input)
        }
    }

    /// Serialize to pretty JSON
    pub fn to_json_string(&self) -> Result<String, EngineError> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Serialize to YAML
    pub fn to_yaml_string(&self) -> Result<String, EngineError> {
        Ok(serde_yaml::to_string(self)?)
    }
}
