use serde_json::Value;

use crate::context::{stringify, ExecutionContext};
use crate::domain::workflow::{Condition, ConditionOperator, LogicOperator};

/// Evaluates a step's conditions against the execution context
pub trait ConditionEvaluator: Send + Sync {
    /// Fold the conditions into one boolean. Never fails: a comparison that
    /// cannot be made is false.
    fn evaluate(&self, conditions: &[Condition], context: &ExecutionContext) -> bool;
}

/// Evaluator over context fields addressed by dot paths
#[derive(Debug, Default, Clone, Copy)]
pub struct FieldConditionEvaluator;

impl FieldConditionEvaluator {
    /// Create a new evaluator
    pub fn new() -> Self {
        Self
    }

    /// Evaluate a single condition
    pub fn evaluate_one(&self, condition: &Condition, context: &ExecutionContext) -> bool {
        let missing = Value::String(String::new());
        let field = context.lookup(&condition.field).unwrap_or(&missing);
        let expected = &condition.value;

        match condition.operator {
            ConditionOperator::Equals => loose_equals(field, expected),
            ConditionOperator::NotEquals => !loose_equals(field, expected),
            ConditionOperator::Contains => stringify(field).contains(&stringify(expected)),
            ConditionOperator::NotContains => !stringify(field).contains(&stringify(expected)),
            ConditionOperator::GreaterThan => match (as_number(field), as_number(expected)) {
                (Some(a), Some(b)) => a > b,
                _ => false,
            },
            ConditionOperator::LessThan => match (as_number(field), as_number(expected)) {
                (Some(a), Some(b)) => a < b,
                _ => false,
            },
            ConditionOperator::IsEmpty => is_falsy(field),
            ConditionOperator::IsNotEmpty => !is_falsy(field),
        }
    }
}

impl ConditionEvaluator for FieldConditionEvaluator {
    fn evaluate(&self, conditions: &[Condition], context: &ExecutionContext) -> bool {
        let mut result = true;
        let mut join = LogicOperator::And;
        for condition in conditions {
            let current = self.evaluate_one(condition, context);
            result = match join {
                LogicOperator::And => result && current,
                LogicOperator::Or => result || current,
            };
            join = condition.logic_operator;
        }
        result
    }
}

/// Numeric view of a value. Blank or non-numeric strings, null, arrays and
/// objects have none.
fn as_number(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => {
            let trimmed = s.trim();
            if trimmed.is_empty() {
                None
            } else {
                trimmed.parse::<f64>().ok().filter(|f| !f.is_nan())
            }
        }
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

/// Equality with string/number/bool coercion
fn loose_equals(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        (Value::Number(x), Value::Number(y)) => x.as_f64() == y.as_f64(),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(n), Value::String(s)) | (Value::String(s), Value::Number(n)) => {
            let parsed = if s.trim().is_empty() { Some(0.0) } else { s.trim().parse::<f64>().ok() };
            matches!((n.as_f64(), parsed), (Some(x), Some(y)) if x == y)
        }
        (Value::Bool(_), _) | (_, Value::Bool(_)) => match (as_number(a), as_number(b)) {
            (Some(x), Some(y)) => x == y,
            _ => false,
        },
        (Value::Array(_) | Value::Object(_), Value::String(s)) => stringify(a) == *s,
        (Value::String(s), Value::Array(_) | Value::Object(_)) => stringify(b) == *s,
        _ => a == b,
    }
}

/// Empty string, null, false, zero and NaN count as empty
fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64().map(|f| f == 0.0 || f.is_nan()).unwrap_or(false),
        Value::String(s) => s.is_empty(),
        Value::Array(_) | Value::Object(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::{json, Map};

    fn ctx(value: Value) -> ExecutionContext {
        ExecutionContext::seed(&value, Map::new())
    }

    fn cond(field: &str, operator: ConditionOperator, value: Value) -> Condition {
        Condition::new(field, operator, value)
    }

    #[test]
    fn test_empty_conditions_pass() {
        assert!(FieldConditionEvaluator::new().evaluate(&[], &ctx(json!({}))));
    }

    #[test]
    fn test_numeric_comparisons_coerce() {
        let evaluator = FieldConditionEvaluator::new();
        let context = ctx(json!({ "amount": 150, "text_amount": "150", "name": "Ada" }));

        assert!(evaluator.evaluate_one(&cond("amount", ConditionOperator::GreaterThan, json!(100)), &context));
        assert!(evaluator.evaluate_one(&cond("text_amount", ConditionOperator::GreaterThan, json!("99.5")), &context));
        assert!(!evaluator.evaluate_one(&cond("amount", ConditionOperator::LessThan, json!(100)), &context));
        assert!(!evaluator.evaluate_one(&cond("name", ConditionOperator::GreaterThan, json!(1)), &context));
        assert!(!evaluator.evaluate_one(&cond("name", ConditionOperator::LessThan, json!(1)), &context));
        assert!(!evaluator.evaluate_one(&cond("missing", ConditionOperator::GreaterThan, json!(-1)), &context));
    }

    #[test]
    fn test_equality_is_loose() {
        let evaluator = FieldConditionEvaluator::new();
        let context = ctx(json!({ "count": 3, "flag": true, "status": "open", "tags": ["a", "b"] }));

        assert!(evaluator.evaluate_one(&cond("count", ConditionOperator::Equals, json!("3")), &context));
        assert!(evaluator.evaluate_one(&cond("count", ConditionOperator::Equals, json!(3.0)), &context));
        assert!(evaluator.evaluate_one(&cond("flag", ConditionOperator::Equals, json!(1)), &context));
        assert!(evaluator.evaluate_one(&cond("status", ConditionOperator::NotEquals, json!("closed")), &context));
        assert!(evaluator.evaluate_one(&cond("tags", ConditionOperator::Equals, json!("a,b")), &context));
        assert!(evaluator.evaluate_one(&cond("missing", ConditionOperator::Equals, json!("")), &context));
    }

    #[test]
    fn test_contains_stringifies() {
        let evaluator = FieldConditionEvaluator::new();
        let context = ctx(json!({ "email": "ada@example.com", "code": 12345 }));

        assert!(evaluator.evaluate_one(&cond("email", ConditionOperator::Contains, json!("@example")), &context));
        assert!(evaluator.evaluate_one(&cond("code", ConditionOperator::Contains, json!(234)), &context));
        assert!(evaluator.evaluate_one(&cond("email", ConditionOperator::NotContains, json!("gmail")), &context));
    }

    #[test]
    fn test_emptiness() {
        let evaluator = FieldConditionEvaluator::new();
        let context = ctx(json!({ "blank": "", "zero": 0, "nothing": null, "name": "x", "list": [] }));

        for field in ["blank", "zero", "nothing", "missing"] {
            assert!(evaluator.evaluate_one(&cond(field, ConditionOperator::IsEmpty, Value::Null), &context), "{field}");
        }
        assert!(evaluator.evaluate_one(&cond("name", ConditionOperator::IsNotEmpty, Value::Null), &context));
        assert!(evaluator.evaluate_one(&cond("list", ConditionOperator::IsNotEmpty, Value::Null), &context));
    }

    #[test]
    fn test_logic_operator_governs_next_join() {
        let evaluator = FieldConditionEvaluator::new();
        let context = ctx(json!({ "a": 1, "b": 2 }));

        // false OR true -> true
        let conditions = vec![
            cond("a", ConditionOperator::Equals, json!(9)).joined_by(LogicOperator::Or),
            cond("b", ConditionOperator::Equals, json!(2)),
        ];
        assert!(evaluator.evaluate(&conditions, &context));

        // (true OR false) AND false -> false
        let conditions = vec![
            cond("a", ConditionOperator::Equals, json!(1)).joined_by(LogicOperator::Or),
            cond("b", ConditionOperator::Equals, json!(9)),
            cond("b", ConditionOperator::Equals, json!(8)),
        ];
        assert!(!evaluator.evaluate(&conditions, &context));

        // the last condition's operator joins nothing
        let conditions = vec![cond("a", ConditionOperator::Equals, json!(9)).joined_by(LogicOperator::Or)];
        assert!(!evaluator.evaluate(&conditions, &context));
    }
}
