use serde_json::{json, Map, Number, Value};
use tracing::debug;

use crate::collaborators::{Collaborators, HttpRequest, Notification, NotificationChannel};
use crate::context::{stringify, ExecutionContext};
use crate::domain::workflow::{Action, ActionType, StepType};
use crate::EngineError;

/// Output a step or action merges into the context
pub type StepOutput = Map<String, Value>;

/// Executes typed actions and single-call steps through the injected
/// collaborators. Parameters and step configuration are rendered against the
/// context first, so `{{path}}` placeholders resolve to context values.
#[derive(Clone)]
pub struct ActionDispatcher {
    collaborators: Collaborators,
}

impl ActionDispatcher {
    /// Create a dispatcher over a set of collaborators
    pub fn new(collaborators: Collaborators) -> Self {
        Self { collaborators }
    }

    /// Execute one action
    pub async fn execute(&self, action: &Action, context: &ExecutionContext) -> Result<StepOutput, EngineError> {
        let target = context.render_text(&action.target);
        let params = context.render(&action.parameters);
        debug!(action_type = ?action.action_type, target = %target, "Dispatching action");

        match action.action_type {
            ActionType::CreateRecord => {
                let entity = require_target(&target, "create_record")?;
                let data = params.get("data").cloned().unwrap_or(params);
                let record = self.collaborators.records.create(entity, data).await?;
                Ok(output("created_record", record))
            }
            ActionType::UpdateRecord => {
                let entity = require_target(&target, "update_record")?;
                let id = require_id(&params, "update_record")?;
                let patch = match params.get("data") {
                    Some(data) => data.clone(),
                    None => without_keys(&params, &["id"]),
                };
                let record = self.collaborators.records.update(entity, &id, patch).await?;
                Ok(output("updated_record", record))
            }
            ActionType::DeleteRecord => {
                let entity = require_target(&target, "delete_record")?;
                let id = require_id(&params, "delete_record")?;
                self.collaborators.records.delete(entity, &id).await?;
                Ok(output("deleted_record", json!({ "entity": entity, "id": id })))
            }
            ActionType::SendEmail => {
                let recipient = first_non_empty(&target, &params, "to");
                self.notify(NotificationChannel::Email, recipient, &params).await
            }
            ActionType::SendSms => {
                let recipient = first_non_empty(&target, &params, "to");
                self.notify(NotificationChannel::Sms, recipient, &params).await
            }
            ActionType::CallWebhook => {
                let url = first_non_empty(&target, &params, "url");
                let response = self.call(url, "POST", &params).await?;
                Ok(output("webhook_response", response))
            }
            ActionType::RunScript => {
                let scripts = self.collaborators.scripts.as_ref().ok_or_else(|| {
                    EngineError::UnsupportedAction("run_script requires a script runner".to_string())
                })?;
                let script = first_non_empty(&target, &params, "script");
                if script.is_empty() {
                    return Err(EngineError::StepExecution("run_script requires a script".to_string()));
                }
                let result = scripts.run(&script, &context.to_value()).await?;
                Ok(output("script_result", result))
            }
            ActionType::AssignTask => {
                let mut task = json!({ "assignee": target, "status": "open" });
                merge_object(&mut task, params);
                let record = self.collaborators.records.create("tasks", task).await?;
                Ok(output("task", record))
            }
            ActionType::CreateTicket => {
                let mut ticket = json!({ "queue": target, "status": "open" });
                merge_object(&mut ticket, params);
                let record = self.collaborators.records.create("tickets", ticket).await?;
                Ok(output("ticket", record))
            }
            ActionType::UpdateStatus => {
                let entity = require_target(&target, "update_status")?;
                let id = require_id(&params, "update_status")?;
                let status = params
                    .get("status")
                    .filter(|s| !s.is_null())
                    .cloned()
                    .ok_or_else(|| EngineError::StepExecution("update_status requires a 'status' parameter".to_string()))?;
                let record = self
                    .collaborators
                    .records
                    .update(entity, &id, json!({ "status": status }))
                    .await?;
                Ok(output("updated_record", record))
            }
            ActionType::CalculateField => {
                let field = require_target(&target, "calculate_field")?;
                let value = calculate(&params)?;
                Ok(output(field, value))
            }
        }
    }

    /// Perform the single collaborator call of a notification, email, sms,
    /// webhook, api_call or database_operation step
    pub async fn invoke(&self, step_type: StepType, config: &Value, context: &ExecutionContext) -> Result<StepOutput, EngineError> {
        let config = context.render(config);
        debug!(step_type = ?step_type, "Invoking step collaborator");

        match step_type {
            StepType::Email => {
                let recipient = string_param(&config, "to");
                self.notify(NotificationChannel::Email, recipient, &config).await
            }
            StepType::Sms => {
                let recipient = string_param(&config, "to");
                self.notify(NotificationChannel::Sms, recipient, &config).await
            }
            StepType::Notification => {
                let channel = match config.get("channel").and_then(Value::as_str) {
                    Some("email") => NotificationChannel::Email,
                    Some("sms") => NotificationChannel::Sms,
                    _ => NotificationChannel::Push,
                };
                let recipient = string_param(&config, "recipient");
                self.notify(channel, recipient, &config).await
            }
            StepType::Webhook => {
                let response = self.call(string_param(&config, "url"), "POST", &config).await?;
                Ok(output("webhook_response", response))
            }
            StepType::ApiCall => {
                let response = self.call(string_param(&config, "url"), "GET", &config).await?;
                Ok(output("api_response", response))
            }
            StepType::DatabaseOperation => {
                let result = self.database_operation(&config).await?;
                Ok(output("db_result", result))
            }
            other => Err(EngineError::UnsupportedAction(format!(
                "step type {:?} is not a single collaborator call",
                other
            ))),
        }
    }

    async fn notify(&self, channel: NotificationChannel, recipient: String, params: &Value) -> Result<StepOutput, EngineError> {
        if recipient.is_empty() {
            return Err(EngineError::StepExecution(format!(
                "{:?} notification requires a recipient",
                channel
            )));
        }
        let body = ["body", "message"]
            .iter()
            .find_map(|key| params.get(*key).filter(|v| !v.is_null()))
            .map(stringify)
            .unwrap_or_default();
        let notification = Notification {
            channel,
            recipient,
            subject: params.get("subject").filter(|v| !v.is_null()).map(stringify),
            body,
        };
        let id = self.collaborators.notifier.send(notification).await?;
        Ok(output("notification_id", Value::String(id)))
    }

    async fn call(&self, url: String, default_method: &str, params: &Value) -> Result<Value, EngineError> {
        if url.is_empty() {
            return Err(EngineError::StepExecution("HTTP call requires a url".to_string()));
        }
        let method = params
            .get("method")
            .and_then(Value::as_str)
            .unwrap_or(default_method)
            .to_uppercase();
        let headers = params
            .get("headers")
            .and_then(Value::as_object)
            .map(|h| h.iter().map(|(k, v)| (k.clone(), stringify(v))).collect())
            .unwrap_or_default();
        let body = params.get("body").filter(|b| !b.is_null()).cloned();

        let request = HttpRequest {
            method: method.clone(),
            url: url.clone(),
            headers,
            body,
        };
        let response = self.collaborators.http.send(request).await?;
        if !response.is_success() {
            return Err(EngineError::Collaborator(format!(
                "{} {} returned HTTP {}",
                method, url, response.status
            )));
        }
        Ok(json!({ "status": response.status, "body": response.body }))
    }

    async fn database_operation(&self, config: &Value) -> Result<Value, EngineError> {
        let entity = string_param(config, "entity");
        let entity = require_target(&entity, "database_operation")?;
        let data = config.get("data").cloned().unwrap_or_else(|| json!({}));
        let records = &self.collaborators.records;

        match config.get("operation").and_then(Value::as_str).unwrap_or("create") {
            "create" => records.create(entity, data).await,
            "update" => {
                let id = require_id(config, "database_operation")?;
                records.update(entity, &id, data).await
            }
            "delete" => {
                let id = require_id(config, "database_operation")?;
                records.delete(entity, &id).await?;
                Ok(json!({ "deleted": true, "id": id }))
            }
            "find" => {
                let id = require_id(config, "database_operation")?;
                Ok(records.find(entity, &id).await?.unwrap_or(Value::Null))
            }
            other => Err(EngineError::StepExecution(format!(
                "Unknown database operation: {}",
                other
            ))),
        }
    }
}

fn output(key: &str, value: Value) -> StepOutput {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    map
}

fn string_param(params: &Value, key: &str) -> String {
    params.get(key).map(stringify).unwrap_or_default()
}

fn first_non_empty(target: &str, params: &Value, key: &str) -> String {
    if target.is_empty() {
        string_param(params, key)
    } else {
        target.to_string()
    }
}

fn require_target<'a>(target: &'a str, action: &str) -> Result<&'a str, EngineError> {
    if target.is_empty() {
        return Err(EngineError::StepExecution(format!("{} requires a target", action)));
    }
    Ok(target)
}

fn require_id(params: &Value, action: &str) -> Result<String, EngineError> {
    match params.get("id") {
        Some(Value::String(id)) if !id.is_empty() => Ok(id.clone()),
        Some(Value::Number(id)) => Ok(id.to_string()),
        _ => Err(EngineError::StepExecution(format!("{} requires an 'id' parameter", action))),
    }
}

fn without_keys(params: &Value, keys: &[&str]) -> Value {
    match params {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(k, _)| !keys.contains(&k.as_str()))
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ),
        other => other.clone(),
    }
}

fn merge_object(base: &mut Value, extra: Value) {
    if let (Value::Object(base), Value::Object(extra)) = (base, extra) {
        base.extend(extra);
    }
}

fn number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
}

fn number_value(value: f64) -> Result<Value, EngineError> {
    if value.fract() == 0.0 && value.abs() < 9.0e15 {
        return Ok(Value::Number(Number::from(value as i64)));
    }
    Number::from_f64(value)
        .map(Value::Number)
        .ok_or_else(|| EngineError::StepExecution(format!("calculate_field produced a non-finite number: {}", value)))
}

/// Evaluate `{"operation": ..., "operands": [...]}`
fn calculate(params: &Value) -> Result<Value, EngineError> {
    let operation = params.get("operation").and_then(Value::as_str).unwrap_or("sum");
    let operands: Vec<Value> = match params.get("operands") {
        Some(Value::Array(items)) => items.clone(),
        Some(single) => vec![single.clone()],
        None => Vec::new(),
    };

    match operation {
        "concat" => Ok(Value::String(operands.iter().map(stringify).collect())),
        "copy" => Ok(operands.into_iter().next().unwrap_or(Value::Null)),
        _ => {
            let numbers = operands
                .iter()
                .map(|v| {
                    number(v).ok_or_else(|| {
                        EngineError::StepExecution(format!("calculate_field operand is not a number: {}", v))
                    })
                })
                .collect::<Result<Vec<f64>, _>>()?;
            let Some((&first, rest)) = numbers.split_first() else {
                return Err(EngineError::StepExecution("calculate_field requires operands".to_string()));
            };
            let result = match operation {
                "sum" | "add" => numbers.iter().sum(),
                "subtract" => rest.iter().fold(first, |acc, n| acc - n),
                "multiply" => numbers.iter().product(),
                "divide" => {
                    if rest.iter().any(|n| *n == 0.0) {
                        return Err(EngineError::StepExecution("calculate_field division by zero".to_string()));
                    }
                    rest.iter().fold(first, |acc, n| acc / n)
                }
                "min" => rest.iter().fold(first, |acc, n| acc.min(*n)),
                "max" => rest.iter().fold(first, |acc, n| acc.max(*n)),
                other => {
                    return Err(EngineError::StepExecution(format!(
                        "Unknown calculate_field operation: {}",
                        other
                    )))
                }
            };
            number_value(result)
        }
    }
}
