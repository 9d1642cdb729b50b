use std::collections::VecDeque;
use tokio::sync::Semaphore;

use super::{error_codes, ValidationIssue, ValidationResult};
use crate::domain::graph::StepGraph;
use crate::domain::workflow::{StepType, WorkflowDefinition};

/// Checks a workflow definition for structural defects.
///
/// Every check runs on every call; results are accumulated, never
/// short-circuited. Validation only reads the definition.
#[derive(Debug, Default, Clone, Copy)]
pub struct WorkflowValidator;

#[derive(Default)]
struct Findings {
    errors: Vec<ValidationIssue>,
    warnings: Vec<ValidationIssue>,
}

impl Findings {
    fn error(&mut self, code: &'static str, message: impl Into<String>, path: Option<String>) {
        self.errors.push(ValidationIssue::new(code, message, path));
    }

    fn warning(&mut self, code: &'static str, message: impl Into<String>, path: Option<String>) {
        self.warnings.push(ValidationIssue::new(code, message, path));
    }
}

impl WorkflowValidator {
    /// Create a new validator
    pub fn new() -> Self {
        Self
    }

    /// Validate a definition
    pub fn validate(&self, definition: &WorkflowDefinition) -> ValidationResult {
        let mut findings = Findings::default();
        let graph = StepGraph::build(&definition.steps);

        self.check_trigger(definition, &mut findings);
        self.check_settings(definition, &mut findings);
        self.check_steps(definition, &mut findings);
        self.check_references(&graph, &mut findings);
        self.check_entry_and_connectivity(&graph, &mut findings);
        self.check_cycles(&graph, &mut findings);
        self.check_permissions(definition, &mut findings);

        ValidationResult {
            valid: findings.errors.is_empty(),
            errors: findings.errors,
            warnings: findings.warnings,
        }
    }

    fn check_trigger(&self, definition: &WorkflowDefinition, findings: &mut Findings) {
        match &definition.trigger {
            None => findings.error(
                error_codes::MISSING_TRIGGER,
                "Workflow must have a trigger defined",
                Some("trigger".to_string()),
            ),
            Some(trigger) if trigger.trigger_type.is_none() => findings.error(
                error_codes::MISSING_TRIGGER,
                "Workflow trigger must have a type",
                Some("trigger.type".to_string()),
            ),
            Some(_) => {}
        }
    }

    fn check_settings(&self, definition: &WorkflowDefinition, findings: &mut Findings) {
        let settings = &definition.settings;
        if settings.max_concurrent_executions == 0 {
            findings.error(
                error_codes::INVALID_SETTING,
                "max_concurrent_executions must be at least 1",
                Some("settings.max_concurrent_executions".to_string()),
            );
        } else if settings.max_concurrent_executions > Semaphore::MAX_PERMITS {
            findings.error(
                error_codes::INVALID_SETTING,
                format!("max_concurrent_executions must be at most {}", Semaphore::MAX_PERMITS),
                Some("settings.max_concurrent_executions".to_string()),
            );
        }
        if !(settings.execution_timeout_minutes > 0.0) {
            findings.error(
                error_codes::INVALID_SETTING,
                "execution_timeout_minutes must be greater than zero",
                Some("settings.execution_timeout_minutes".to_string()),
            );
        }
    }

    fn check_steps(&self, definition: &WorkflowDefinition, findings: &mut Findings) {
        if definition.steps.is_empty() {
            findings.error(
                error_codes::NO_STEPS,
                "Workflow must have at least one step",
                Some("steps".to_string()),
            );
            return;
        }

        for (i, step) in definition.steps.iter().enumerate() {
            let path = || Some(format!("steps[{}]", i));

            if step.step_name.trim().is_empty() {
                findings.error(
                    error_codes::MISSING_REQUIRED_FIELD,
                    format!("Step {} is missing a name", step.step_id),
                    path(),
                );
            }

            if !(step.timeout_minutes > 0.0) {
                findings.error(
                    error_codes::INVALID_SETTING,
                    format!("Step {} must have a timeout greater than zero", step.step_id),
                    path(),
                );
            }

            if step.retry_config.max_attempts == 0 {
                findings.warning(
                    error_codes::INVALID_SETTING,
                    format!("Step {} has max_attempts 0; it will run once", step.step_id),
                    path(),
                );
            }

            match step.step_type {
                None => findings.error(
                    error_codes::MISSING_REQUIRED_FIELD,
                    format!("Step {} is missing a type", step.step_id),
                    path(),
                ),
                Some(StepType::Condition) if step.conditions.is_empty() => findings.warning(
                    error_codes::EMPTY_STEP,
                    format!("Condition step {} has no conditions and always succeeds", step.step_id),
                    path(),
                ),
                Some(step_type) if step_type.runs_actions() && step.actions.is_empty() => findings.warning(
                    error_codes::EMPTY_STEP,
                    format!("Step {} has no actions to run", step.step_id),
                    path(),
                ),
                Some(_) => {}
            }
        }
    }

    fn check_references(&self, graph: &StepGraph<'_>, findings: &mut Findings) {
        for &slot in graph.duplicate_slots() {
            findings.error(
                error_codes::DUPLICATE_ID,
                format!("Duplicate step ID: {}", graph.step(slot).step_id),
                Some(format!("steps[{}]", slot)),
            );
        }

        for &(slot, missing) in graph.dangling_references() {
            findings.error(
                error_codes::INVALID_REFERENCE,
                format!(
                    "Step {} references unknown step {}",
                    graph.step(slot).step_id,
                    missing
                ),
                Some(format!("steps[{}].next_steps", slot)),
            );
        }
    }

    fn check_entry_and_connectivity(&self, graph: &StepGraph<'_>, findings: &mut Findings) {
        if graph.is_empty() {
            return;
        }

        let Some(entry) = graph.entry() else {
            findings.error(
                error_codes::NO_ENTRY_STEP,
                "Workflow has no start step: every step is the target of another step",
                Some("steps".to_string()),
            );
            return;
        };

        let mut reachable = vec![false; graph.len()];
        let mut queue = VecDeque::from([entry]);
        reachable[entry] = true;
        while let Some(slot) = queue.pop_front() {
            for edge in graph.edges(slot) {
                if !reachable[edge.target] {
                    reachable[edge.target] = true;
                    queue.push_back(edge.target);
                }
            }
        }

        let duplicates = graph.duplicate_slots();
        for slot in (0..graph.len()).filter(|s| !reachable[*s] && !duplicates.contains(s)) {
            let step = graph.step(slot);
            let name = if step.step_name.is_empty() {
                step.step_id.as_str()
            } else {
                step.step_name.as_str()
            };
            findings.warning(
                error_codes::DISCONNECTED_STEP,
                format!("Step \"{}\" appears to be disconnected", name),
                Some(format!("steps[{}]", slot)),
            );
        }
    }

    fn check_cycles(&self, graph: &StepGraph<'_>, findings: &mut Findings) {
        for cycle in graph.find_cycles() {
            findings.error(
                error_codes::CIRCULAR_DEPENDENCY,
                format!(
                    "Circular reference detected in workflow path: {}",
                    graph.describe_path(&cycle)
                ),
                Some(format!("steps[{}]", cycle[0])),
            );
        }
    }

    fn check_permissions(&self, definition: &WorkflowDefinition, findings: &mut Findings) {
        if definition.permissions.is_empty() {
            findings.warning(
                error_codes::NO_PERMISSIONS,
                "No users have been granted permissions to this workflow",
                Some("permissions".to_string()),
            );
        }
    }
}
