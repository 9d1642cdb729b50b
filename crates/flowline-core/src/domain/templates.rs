//! Built-in workflow templates

use serde::Serialize;
use serde_json::json;

use super::workflow::{
    Action, ActionType, Condition, ConditionOperator, EdgeCondition, OrganizationId, StepDefinition,
    StepType, TriggerType, WorkflowCategory, WorkflowDefinition, WorkflowSettings,
};
use crate::EngineError;

/// A template users can instantiate
#[derive(Debug, Clone, Serialize)]
pub struct WorkflowTemplate {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub category: WorkflowCategory,
    pub trigger: TriggerType,
    pub estimated_setup_minutes: u32,
    pub complexity: &'static str,
    #[serde(skip)]
    steps: fn() -> Vec<StepDefinition>,
}

impl WorkflowTemplate {
    /// Step IDs in definition order
    pub fn step_ids(&self) -> Vec<String> {
        (self.steps)().into_iter().map(|s| s.step_id.0).collect()
    }

    /// Instantiate the template. The new workflow starts disabled with debug
    /// logging on so it can be reviewed before going live.
    pub fn instantiate(&self, organization_id: OrganizationId, name: Option<&str>) -> WorkflowDefinition {
        let name = name
            .map(str::to_string)
            .unwrap_or_else(|| format!("Workflow from {}", self.id));
        let mut definition = WorkflowDefinition::new(organization_id, name).with_trigger(self.trigger);
        definition.description = format!("Created from {} template", self.id);
        definition.category = self.category;
        definition.steps = (self.steps)();
        definition.settings = WorkflowSettings {
            enabled: false,
            debug_mode: true,
            ..WorkflowSettings::default()
        };
        definition
    }
}

/// All built-in templates
pub fn templates() -> Vec<WorkflowTemplate> {
    vec![
        WorkflowTemplate {
            id: "lead_qualification",
            name: "Lead Qualification",
            description: "Automatically qualify leads based on score and activity",
            category: WorkflowCategory::Sales,
            trigger: TriggerType::FormSubmission,
            estimated_setup_minutes: 15,
            complexity: "beginner",
            steps: lead_qualification,
        },
        WorkflowTemplate {
            id: "customer_onboarding",
            name: "Customer Onboarding",
            description: "Welcome new customers with automated email sequence",
            category: WorkflowCategory::Marketing,
            trigger: TriggerType::DataChange,
            estimated_setup_minutes: 20,
            complexity: "intermediate",
            steps: customer_onboarding,
        },
        WorkflowTemplate {
            id: "support_ticket_routing",
            name: "Support Ticket Routing",
            description: "Route tickets to appropriate agents based on priority",
            category: WorkflowCategory::Support,
            trigger: TriggerType::Webhook,
            estimated_setup_minutes: 25,
            complexity: "intermediate",
            steps: support_ticket_routing,
        },
    ]
}

/// Find a template by ID
pub fn find_template(template_id: &str) -> Result<WorkflowTemplate, EngineError> {
    templates()
        .into_iter()
        .find(|t| t.id == template_id)
        .ok_or_else(|| EngineError::TemplateNotFound(template_id.to_string()))
}

fn lead_qualification() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new("score_lead", "Score Lead", StepType::Action)
            .with_action(Action::new(
                ActionType::CreateRecord,
                "leads",
                json!({ "email": "{{email}}", "name": "{{name}}", "lead_score": "{{lead_score}}" }),
            ))
            .then("check_score", EdgeCondition::Success),
        StepDefinition::new("check_score", "Check Score Threshold", StepType::Condition)
            .with_condition(Condition::new("lead_score", ConditionOperator::GreaterThan, json!(70)))
            .then("assign_sales", EdgeCondition::Success)
            .then("send_nurture", EdgeCondition::Failure),
        StepDefinition::new("assign_sales", "Assign to Sales", StepType::Action).with_action(Action::new(
            ActionType::AssignTask,
            "sales_team",
            json!({ "title": "Follow up with {{name}}", "lead_email": "{{email}}" }),
        )),
        StepDefinition::new("send_nurture", "Send to Nurture Campaign", StepType::Action).with_action(
            Action::new(
                ActionType::CreateRecord,
                "nurture_campaign_members",
                json!({ "email": "{{email}}", "campaign": "default" }),
            ),
        ),
    ]
}

fn customer_onboarding() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new("welcome_email", "Send Welcome Email", StepType::Email)
            .with_config(json!({
                "to": "{{email}}",
                "subject": "Welcome, {{name}}!",
                "body": "Thanks for joining us."
            }))
            .then("wait_24h", EdgeCondition::Success),
        StepDefinition::new("wait_24h", "Wait 24 Hours", StepType::Delay)
            .with_config(json!({ "delay_minutes": 1440 }))
            .then("setup_guide", EdgeCondition::Success),
        StepDefinition::new("setup_guide", "Send Setup Guide", StepType::Email)
            .with_config(json!({
                "to": "{{email}}",
                "subject": "Getting started",
                "body": "Here is how to set up your account."
            }))
            .then("create_task", EdgeCondition::Success),
        StepDefinition::new("create_task", "Create Follow-up Task", StepType::Action).with_action(Action::new(
            ActionType::AssignTask,
            "customer_success",
            json!({ "title": "Check in with {{name}}" }),
        )),
    ]
}

fn support_ticket_routing() -> Vec<StepDefinition> {
    vec![
        StepDefinition::new("analyze_ticket", "Analyze Ticket", StepType::Action)
            .with_action(Action::new(
                ActionType::CreateTicket,
                "support",
                json!({ "subject": "{{subject}}", "priority": "{{priority}}", "customer_email": "{{customer_email}}" }),
            ))
            .then("check_priority", EdgeCondition::Success),
        StepDefinition::new("check_priority", "Check Priority Level", StepType::Condition)
            .with_condition(Condition::new("priority", ConditionOperator::Equals, json!("high")))
            .then("assign_agent", EdgeCondition::Success)
            .then("notify_customer", EdgeCondition::Failure),
        StepDefinition::new("assign_agent", "Assign to Agent", StepType::Action)
            .with_action(Action::new(
                ActionType::AssignTask,
                "senior_support",
                json!({ "ticket_id": "{{ticket.id}}" }),
            ))
            .then("notify_customer", EdgeCondition::Always),
        StepDefinition::new("notify_customer", "Notify Customer", StepType::Email).with_config(json!({
            "to": "{{customer_email}}",
            "subject": "We received your request",
            "body": "Ticket {{ticket.id}} is being handled."
        })),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validation::WorkflowValidator;

    #[test]
    fn test_every_template_validates() {
        let validator = WorkflowValidator::new();
        for template in templates() {
            let definition = template.instantiate(OrganizationId("org".into()), None);
            let result = validator.validate(&definition);
            assert!(result.valid, "{}: {:?}", template.id, result.errors);
            assert_eq!(definition.steps.len(), 4);
        }
    }

    #[test]
    fn test_instantiated_workflow_starts_disabled() {
        let definition = find_template("customer_onboarding")
            .unwrap()
            .instantiate(OrganizationId("org".into()), Some("Onboarding"));
        assert_eq!(definition.name, "Onboarding");
        assert!(!definition.settings.enabled);
        assert!(definition.settings.debug_mode);
        assert_eq!(definition.category, WorkflowCategory::Marketing);
        assert_eq!(definition.description, "Created from customer_onboarding template");
    }

    #[test]
    fn test_unknown_template() {
        assert_eq!(
            find_template("nope").unwrap_err(),
            EngineError::TemplateNotFound("nope".to_string())
        );
    }
}
