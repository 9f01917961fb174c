// Rule Interpreter: evaluates a condition tree against an input data
// document, producing a boolean plus optional trace steps.
//
// ## Rust Learning Notes:
//
// ### Trace as an explicit, optional side channel
// Rather than checking a global "tracing enabled" flag, `evaluate` takes a
// `trace: bool` and threads an (always-allocated-lazily) `Vec<TraceStep>`
// through the recursion, pushing into it only when tracing is requested.
// This mirrors the design note about treating trace as an explicit sink
// rather than an ambient flag — `None` for the returned trace means "no
// tracing" and callers pay no allocation cost for it.

use std::collections::HashMap;
use std::time::Instant;

use serde::Serialize;
use serde_json::Value;

use crate::models::{ConditionTree, FieldDef, FieldType, FunctionDef, FunctionType, Logic, Operator, RuleDef};

/// One step of a rule evaluation trace. `duration` is measured in whole
/// microseconds so the type stays `Serialize`-friendly without pulling in a
/// duration-as-string format.
#[derive(Debug, Clone, Serialize)]
pub struct TraceStep {
    #[serde(rename = "type")]
    pub step_type: &'static str,
    pub id: Option<String>,
    pub input: Option<Value>,
    pub output: Value,
    pub duration_micros: u128,
    pub error: Option<String>,
}

pub struct RuleEvaluation {
    pub result: bool,
    pub trace: Option<Vec<TraceStep>>,
}

pub struct RuleInterpreter<'a> {
    fields: &'a HashMap<crate::models::FieldId, FieldDef>,
    functions: &'a HashMap<crate::models::FunctionId, FunctionDef>,
}

impl<'a> RuleInterpreter<'a> {
    pub fn new(
        fields: &'a HashMap<crate::models::FieldId, FieldDef>,
        functions: &'a HashMap<crate::models::FunctionId, FunctionDef>,
    ) -> Self {
        RuleInterpreter { fields, functions }
    }

    pub fn evaluate(&self, rule: &RuleDef, data: &HashMap<String, Value>, trace: bool) -> RuleEvaluation {
        let top = ConditionTree::Group { logic: rule.logic, conditions: rule.conditions.clone() };
        let mut steps = if trace { Some(Vec::new()) } else { None };
        let result = self.eval_tree(&top, data, &mut steps);
        RuleEvaluation { result, trace: steps }
    }

    fn eval_tree(&self, tree: &ConditionTree, data: &HashMap<String, Value>, trace: &mut Option<Vec<TraceStep>>) -> bool {
        match tree {
            ConditionTree::Field { field_id, operator, value } => {
                let started = Instant::now();
                let field_type = self.fields.get(field_id).map(|f| f.field_type);
                let raw = data.get(field_id.as_str());

                let (result, error) = match (field_type, raw) {
                    (Some(ft), Some(raw)) => match coerce(raw, ft) {
                        Some(coerced) => (apply_operator(*operator, &coerced, value), None),
                        None => (false, Some(format!("field '{}' could not be coerced to {:?}", field_id, ft))),
                    },
                    (None, _) => (false, Some(format!("field '{}' is not declared in this namespace", field_id))),
                    (_, None) => (false, Some(format!("field '{}' is missing from the input document", field_id))),
                };

                push_trace(trace, "condition", Some(field_id.to_string()), raw.cloned(), Value::Bool(result), started, error);
                result
            }
            ConditionTree::Function { function_id, operator, value } => {
                let started = Instant::now();
                let function = self.functions.get(function_id);

                let (result, error, output) = match function {
                    Some(f) if f.function_type == FunctionType::In => {
                        // `in` takes no field arguments (see
                        // `validators::validate_function`): the leaf's own
                        // `value` is the membership subject, and `values`
                        // is the literal set to test it against. Membership
                        // is exact-string only — coercing a numeric subject
                        // to a string before comparison is deliberately not
                        // implemented (spec open question).
                        match membership(value, &f.values) {
                            Some(is_member) => (apply_equality(*operator, is_member), None, Value::Bool(is_member)),
                            None => (false, Some(format!("'in' comparison against function '{}' requires a string value", function_id)), Value::Null),
                        }
                    }
                    Some(f) => match evaluate_function(f, data) {
                        Ok(computed) => (apply_operator(*operator, &computed, value), None, computed),
                        Err(reason) => (false, Some(reason), Value::Null),
                    },
                    None => (false, Some(format!("function '{}' is not active in this namespace", function_id)), Value::Null),
                };

                push_trace(trace, "function", Some(function_id.to_string()), None, output, started, error);
                result
            }
            ConditionTree::Group { logic, conditions } => {
                let started = Instant::now();
                let result = match logic {
                    Logic::And => conditions.iter().all(|c| self.eval_tree(c, data, trace)),
                    Logic::Or => conditions.iter().any(|c| self.eval_tree(c, data, trace)),
                };
                push_trace(trace, "condition", None, None, Value::Bool(result), started, None);
                result
            }
        }
    }
}

fn push_trace(
    trace: &mut Option<Vec<TraceStep>>,
    step_type: &'static str,
    id: Option<String>,
    input: Option<Value>,
    output: Value,
    started: Instant,
    error: Option<String>,
) {
    if let Some(steps) = trace {
        steps.push(TraceStep {
            step_type,
            id,
            input,
            output,
            duration_micros: started.elapsed().as_micros(),
            error,
        });
    }
}

/// Coerces a raw JSON value from the input document into the shape the
/// declared field type expects, returning `None` on a type mismatch rather
/// than failing the whole rule — per the partial-input-safety policy.
fn coerce(raw: &Value, field_type: FieldType) -> Option<Value> {
    match field_type {
        FieldType::String => raw.as_str().map(|s| Value::String(s.to_string())),
        FieldType::Number => raw.as_f64().map(Value::from),
        FieldType::Boolean => raw.as_bool().map(Value::Bool),
        FieldType::Date => raw
            .as_str()
            .and_then(|s| chrono::DateTime::parse_from_rfc3339(s).ok())
            .map(|dt| Value::from(dt.timestamp_millis())),
    }
}

fn apply_operator(operator: Operator, left: &Value, right: &Value) -> bool {
    if let (Some(a), Some(b)) = (left.as_f64(), right.as_f64()) {
        if a.is_nan() || b.is_nan() {
            return false;
        }
        return match operator {
            Operator::Eq => a == b,
            Operator::Ne => a != b,
            Operator::Lt => a < b,
            Operator::Le => a <= b,
            Operator::Gt => a > b,
            Operator::Ge => a >= b,
            Operator::Contains | Operator::StartsWith | Operator::EndsWith => false,
        };
    }
    if let (Some(a), Some(b)) = (left.as_bool(), right.as_bool()) {
        return match operator {
            Operator::Eq => a == b,
            Operator::Ne => a != b,
            _ => false,
        };
    }
    if let (Some(a), Some(b)) = (left.as_str(), right.as_str()) {
        return match operator {
            Operator::Eq => a == b,
            Operator::Ne => a != b,
            Operator::Contains => a.contains(b),
            Operator::StartsWith => a.starts_with(b),
            Operator::EndsWith => a.ends_with(b),
            _ => false,
        };
    }
    false
}

/// Applies an aggregate function's (`max`/`sum`/`avg`) semantics to its
/// bound field arguments. `in` is handled separately by `membership` — it
/// has no field arguments to aggregate over.
fn evaluate_function(function: &FunctionDef, data: &HashMap<String, Value>) -> Result<Value, String> {
    let mut numbers = Vec::with_capacity(function.args.len());
    for arg in &function.args {
        let raw = data
            .get(arg.as_str())
            .ok_or_else(|| format!("function '{}' argument '{}' is missing from the input document", function.id, arg))?;
        let n = raw.as_f64().ok_or_else(|| format!("function '{}' argument '{}' is not numeric", function.id, arg))?;
        numbers.push(n);
    }
    let computed = match function.function_type {
        FunctionType::Max => numbers.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
        FunctionType::Sum => numbers.iter().sum(),
        FunctionType::Avg => numbers.iter().sum::<f64>() / numbers.len() as f64,
        FunctionType::In => unreachable!("'in' is dispatched through `membership`, not `evaluate_function`"),
    };
    Ok(Value::from(computed))
}

/// Exact-string membership test of `subject` within an `in` function's
/// literal `values`. Returns `None` (not a hard error) when the subject
/// isn't a string, so the caller can report it as a trace error rather
/// than panicking.
fn membership(subject: &Value, values: &[Value]) -> Option<bool> {
    let subject = subject.as_str()?;
    Some(values.iter().any(|v| v.as_str() == Some(subject)))
}

/// `in` functions return bool; only `==`/`!=` are legal against them (see
/// `DependencyResolver`), so this is a narrower sibling of `apply_operator`.
fn apply_equality(operator: Operator, is_member: bool) -> bool {
    match operator {
        Operator::Eq => is_member,
        Operator::Ne => !is_member,
        _ => false,
    }
}
