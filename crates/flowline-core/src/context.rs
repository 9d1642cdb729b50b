use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key-value state threaded through one execution
///
/// Seeded from the trigger data and the workflow's variable defaults, then
/// enriched by every step's output. Owned by exactly one execution.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ExecutionContext {
    values: Map<String, Value>,
}

impl ExecutionContext {
    /// Create an empty context
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context. Object trigger data is spread at the top level, any
    /// other non-null payload lands under `trigger`. Variable defaults go
    /// under `variables`, overridden by a `variables` object in the trigger.
    pub fn seed(trigger_data: &Value, variable_defaults: Map<String, Value>) -> Self {
        let mut values = Map::new();
        match trigger_data {
            Value::Object(map) => values.extend(map.clone()),
            Value::Null => {}
            other => {
                values.insert("trigger".to_string(), other.clone());
            }
        }

        let mut variables = variable_defaults;
        if let Some(Value::Object(overrides)) = values.get("variables") {
            variables.extend(overrides.clone());
        }
        values.insert("variables".to_string(), Value::Object(variables));

        Self { values }
    }

    /// Look up a dot separated path through nested objects; numeric segments
    /// index into arrays.
    pub fn lookup(&self, path: &str) -> Option<&Value> {
        let mut segments = path.split('.');
        let mut current = self.values.get(segments.next()?)?;
        for segment in segments {
            current = match current {
                Value::Object(map) => map.get(segment)?,
                Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Top level value
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.values.get(key)
    }

    /// Set a top level value
    pub fn insert(&mut self, key: impl Into<String>, value: Value) {
        self.values.insert(key.into(), value);
    }

    /// Shallow merge a step's output, later keys win
    pub fn merge(&mut self, output: Map<String, Value>) {
        self.values.extend(output);
    }

    /// Borrow the underlying map
    pub fn as_map(&self) -> &Map<String, Value> {
        &self.values
    }

    /// Snapshot as a JSON object
    pub fn to_value(&self) -> Value {
        Value::Object(self.values.clone())
    }

    /// Resolve `{{path}}` placeholders in a parameter tree. A string that is
    /// exactly one placeholder becomes the referenced value (null if
    /// missing); placeholders embedded in text are interpolated.
    pub fn render(&self, template: &Value) -> Value {
        match template {
            Value::String(text) => self.render_string(text),
            Value::Array(items) => Value::Array(items.iter().map(|v| self.render(v)).collect()),
            Value::Object(map) => Value::Object(
                map.iter()
                    .map(|(k, v)| (k.clone(), self.render(v)))
                    .collect(),
            ),
            other => other.clone(),
        }
    }

    /// Interpolate placeholders in a string, always producing text
    pub fn render_text(&self, text: &str) -> String {
        let mut rendered = String::with_capacity(text.len());
        let mut rest = text;
        while let Some(open) = rest.find("{{") {
            let Some(close) = rest[open + 2..].find("}}") else {
                break;
            };
            rendered.push_str(&rest[..open]);
            let path = rest[open + 2..open + 2 + close].trim();
            if let Some(value) = self.lookup(path) {
                rendered.push_str(&stringify(value));
            }
            rest = &rest[open + 2 + close + 2..];
        }
        rendered.push_str(rest);
        rendered
    }

    fn render_string(&self, text: &str) -> Value {
        let trimmed = text.trim();
        if let Some(inner) = trimmed.strip_prefix("{{").and_then(|t| t.strip_suffix("}}")) {
            if !inner.contains("{{") && !inner.contains("}}") {
                return self.lookup(inner.trim()).cloned().unwrap_or(Value::Null);
            }
        }
        if text.contains("{{") {
            Value::String(self.render_text(text))
        } else {
            Value::String(text.to_string())
        }
    }
}

/// Text form of a JSON value as used by string comparisons and interpolation.
/// Strings are unquoted, null is empty, arrays join their items with commas.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => match n.as_f64() {
            Some(f) if f.fract() == 0.0 && f.abs() < 1e15 => format!("{}", f as i64),
            _ => n.to_string(),
        },
        Value::Array(items) => items.iter().map(stringify).collect::<Vec<_>>().join(","),
        Value::Object(_) => value.to_string(),
    }
}
