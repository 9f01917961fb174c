// Pure, deterministic structural validation. No I/O, no Store access — see
// the Dependency Resolver (`engine::dependency`) for cross-entity reference
// checks, which do need the Store.
//
// ## Rust Learning Notes:
//
// ### A sealed error taxonomy instead of string matching
// Every validator returns a typed `ValidationError` variant rather than a
// bare `String` or a booled-down `bool`. This is the "ad-hoc string-matching
// error classification" anti-pattern called out in the design notes — the
// fix is for each failure mode to be its own enum variant, so a caller can
// `match` on `ValidationError::CyclicDependency` instead of grepping a
// message for "cycle".

use std::collections::HashMap;

use thiserror::Error;

use crate::models::{
    ConditionTree, FieldType, FunctionDef, FunctionType, Operator, RuleDef, WorkflowDef, WorkflowStepDef,
};
use crate::models::{is_valid_identifier, StepName};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("invalid namespace id: '{0}'")]
    InvalidNamespaceId(String),
    #[error("invalid field type: '{0}'")]
    InvalidFieldType(String),
    #[error("invalid function id: '{0}'")]
    InvalidFunctionId(String),
    #[error("invalid function type: '{0}'")]
    InvalidFunctionType(String),
    #[error("invalid function args: {0}")]
    InvalidFunctionArgs(String),
    #[error("invalid rule id: '{0}'")]
    InvalidRuleId(String),
    #[error("invalid rule logic: {0}")]
    InvalidRuleLogic(String),
    #[error("invalid rule conditions: {0}")]
    InvalidRuleConditions(String),
    #[error("invalid workflow id: '{0}'")]
    InvalidWorkflowId(String),
    #[error("invalid workflow startAt: '{0}' is not a step in this workflow")]
    InvalidWorkflowStartAt(String),
    #[error("cyclic dependency detected in workflow steps")]
    CyclicDependency,
    #[error("The '{branch}' path for step '{step}' does not lead to a terminal.")]
    UnreachableTerminal { step: String, branch: String },
    #[error("The '{branch}' path for step '{step}' does not lead to a terminal.")]
    MissingBranch { step: String, branch: String },
    #[error("unknown step type for step '{step}'")]
    UnknownStepType { step: String },
}

/// `ValidateNamespaceId(s) → ok | InvalidNamespaceId`
pub fn validate_namespace_id(id: &str) -> Result<(), ValidationError> {
    if is_valid_identifier(id) {
        Ok(())
    } else {
        Err(ValidationError::InvalidNamespaceId(id.to_string()))
    }
}

/// `ValidateFieldType(s) → ok | InvalidFieldType`
pub fn validate_field_type(s: &str) -> Result<FieldType, ValidationError> {
    FieldType::parse(s).ok_or_else(|| ValidationError::InvalidFieldType(s.to_string()))
}

/// `ValidateFunction(f) → ok | {InvalidFunctionId, InvalidFunctionType, InvalidFunctionArgs}`
///
/// Arg-shape rules per the data model: `max`/`sum`/`avg` require a non-empty
/// `args` list and an empty `values` list with `returnType=number`; `in`
/// requires the reverse, with `returnType=bool`.
pub fn validate_function(f: &FunctionDef) -> Result<(), ValidationError> {
    if !is_valid_identifier(f.id.as_str()) {
        return Err(ValidationError::InvalidFunctionId(f.id.to_string()));
    }
    match f.function_type {
        FunctionType::Max | FunctionType::Sum | FunctionType::Avg => {
            if f.args.is_empty() {
                return Err(ValidationError::InvalidFunctionArgs(
                    "aggregate functions require at least one field argument".to_string(),
                ));
            }
            if !f.values.is_empty() {
                return Err(ValidationError::InvalidFunctionArgs(
                    "aggregate functions must not declare literal values".to_string(),
                ));
            }
            if f.return_type != crate::models::ReturnType::Number {
                return Err(ValidationError::InvalidFunctionType(
                    "aggregate functions must return number".to_string(),
                ));
            }
        }
        FunctionType::In => {
            if f.values.is_empty() {
                return Err(ValidationError::InvalidFunctionArgs(
                    "'in' requires at least one literal value".to_string(),
                ));
            }
            if !f.args.is_empty() {
                return Err(ValidationError::InvalidFunctionArgs(
                    "'in' must not declare field arguments".to_string(),
                ));
            }
            if f.return_type != crate::models::ReturnType::Bool {
                return Err(ValidationError::InvalidFunctionType(
                    "'in' must return bool".to_string(),
                ));
            }
        }
    }
    Ok(())
}

/// `ValidateRule(r) → ok | {InvalidRuleId, InvalidRuleLogic, InvalidRuleConditions}`
///
/// Structurally checks the condition tree: every leaf is well-formed and
/// every operator is one the leaf kind supports. Does not check that
/// referenced fields/functions exist — that is the Dependency Resolver's
/// job.
pub fn validate_rule(r: &RuleDef, max_depth: usize) -> Result<(), ValidationError> {
    if !is_valid_identifier(r.id.as_str()) {
        return Err(ValidationError::InvalidRuleId(r.id.to_string()));
    }
    if r.conditions.is_empty() {
        return Err(ValidationError::InvalidRuleConditions(
            "a rule must declare at least one condition".to_string(),
        ));
    }
    if r.depth() > max_depth {
        return Err(ValidationError::InvalidRuleConditions(format!(
            "condition tree depth {} exceeds the maximum of {}",
            r.depth(),
            max_depth
        )));
    }
    for c in &r.conditions {
        validate_condition_tree(c)?;
    }
    Ok(())
}

fn validate_condition_tree(tree: &ConditionTree) -> Result<(), ValidationError> {
    match tree {
        ConditionTree::Field { field_id, operator, .. } => {
            if field_id.as_str().is_empty() {
                return Err(ValidationError::InvalidRuleConditions(
                    "field condition is missing a fieldId".to_string(),
                ));
            }
            validate_operator_shape(*operator)
        }
        ConditionTree::Function { function_id, operator, .. } => {
            if function_id.as_str().is_empty() {
                return Err(ValidationError::InvalidRuleConditions(
                    "function condition is missing a functionId".to_string(),
                ));
            }
            validate_operator_shape(*operator)
        }
        ConditionTree::Group { conditions, .. } => {
            if conditions.is_empty() {
                return Err(ValidationError::InvalidRuleConditions(
                    "a group condition must contain at least one child".to_string(),
                ));
            }
            for c in conditions {
                validate_condition_tree(c)?;
            }
            Ok(())
        }
    }
}

fn validate_operator_shape(_operator: Operator) -> Result<(), ValidationError> {
    // Every operator in the `Operator` enum is well-formed by construction
    // (serde rejects anything else at the deserialization boundary); the
    // type-compatibility checks (numeric operators vs string fields, etc.)
    // belong to the Dependency Resolver, which knows the referenced field's
    // declared type.
    Ok(())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Color {
    White,
    Gray,
    Black,
}

/// `ValidateWorkflowShape(w) → ok | {InvalidWorkflowId, InvalidWorkflowStartAt,
/// CyclicDependency, UnreachableTerminal, MissingBranch, UnknownStepType}`
pub fn validate_workflow_shape(w: &WorkflowDef) -> Result<(), ValidationError> {
    if !is_valid_identifier(w.id.as_str()) {
        return Err(ValidationError::InvalidWorkflowId(w.id.to_string()));
    }
    if !w.steps.contains_key(&w.start_at) {
        return Err(ValidationError::InvalidWorkflowStartAt(w.start_at.to_string()));
    }

    let mut colors: HashMap<StepName, Color> = HashMap::new();
    visit_step(w, &w.start_at, &mut colors)
}

/// Depth-first walk with white/gray/black colouring. A branch that loops
/// back to a node still on the current DFS stack (Gray) is a cycle; a
/// branch that is simply absent (`None`) or points at a step name that
/// doesn't exist is a structural defect attributed to the step that owns
/// it — this is what gives workflow validation its "nearest branching
/// ancestor" attribution: errors are constructed exactly where the
/// offending branch lives and propagated unchanged by `?`, never rewrapped
/// as they bubble toward `startAt`.
fn visit_step(w: &WorkflowDef, name: &StepName, colors: &mut HashMap<StepName, Color>) -> Result<(), ValidationError> {
    colors.insert(name.clone(), Color::Gray);

    match w.step(name) {
        None => {
            // Unreachable in practice: callers only ever pass a name that
            // was just checked to exist in `steps` (startAt, or a branch
            // target validated below before recursing).
            return Err(ValidationError::UnreachableTerminal {
                step: name.to_string(),
                branch: String::new(),
            });
        }
        Some(WorkflowStepDef::Unknown) => {
            return Err(ValidationError::UnknownStepType { step: name.to_string() });
        }
        Some(WorkflowStepDef::Terminal { .. }) => {
            colors.insert(name.clone(), Color::Black);
            return Ok(());
        }
        Some(WorkflowStepDef::Rule { on_true, on_false, .. }) => {
            for (branch_label, target) in [("onTrue", on_true), ("onFalse", on_false)] {
                let target = target.clone().ok_or_else(|| ValidationError::MissingBranch {
                    step: name.to_string(),
                    branch: branch_label.to_string(),
                })?;

                if !w.steps.contains_key(&target) {
                    return Err(ValidationError::UnreachableTerminal {
                        step: name.to_string(),
                        branch: branch_label.to_string(),
                    });
                }

                match colors.get(&target) {
                    Some(Color::Black) => continue,
                    Some(Color::Gray) => return Err(ValidationError::CyclicDependency),
                    _ => visit_step(w, &target, colors)?,
                }
            }
        }
    }

    colors.insert(name.clone(), Color::Black);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{FieldId, FunctionId, NamespaceId, RuleId, TerminalId, WorkflowId};
    use std::collections::HashMap as Map;

    fn workflow(steps: Vec<(&str, WorkflowStepDef)>, start_at: &str) -> WorkflowDef {
        let mut map = Map::new();
        for (name, step) in steps {
            map.insert(StepName::from(name), step);
        }
        WorkflowDef::new_draft(NamespaceId::from("ns1"), WorkflowId::from("w"), StepName::from(start_at), map, 1, "alice")
    }

    #[test]
    fn s1_missing_branch_message() {
        let wf = workflow(
            vec![
                (
                    "step1",
                    WorkflowStepDef::Rule {
                        rule_id: RuleId::from("r1"),
                        on_true: Some(StepName::from("step2")),
                        on_false: None,
                    },
                ),
                ("step2", WorkflowStepDef::Terminal { terminal_id: TerminalId::from("t") }),
            ],
            "step1",
        );
        let err = validate_workflow_shape(&wf).unwrap_err();
        assert_eq!(
            err.to_string(),
            "The 'onFalse' path for step 'step1' does not lead to a terminal."
        );
    }

    #[test]
    fn s2_cycle_message() {
        let wf = workflow(
            vec![(
                "step1",
                WorkflowStepDef::Rule {
                    rule_id: RuleId::from("r1"),
                    on_true: Some(StepName::from("step1")),
                    on_false: Some(StepName::from("step1")),
                },
            )],
            "step1",
        );
        let err = validate_workflow_shape(&wf).unwrap_err();
        assert_eq!(err.to_string(), "cyclic dependency detected in workflow steps");
    }

    #[test]
    fn start_at_must_exist() {
        let wf = workflow(vec![("a", WorkflowStepDef::Terminal { terminal_id: TerminalId::from("t") })], "missing");
        assert!(matches!(validate_workflow_shape(&wf), Err(ValidationError::InvalidWorkflowStartAt(_))));
    }

    #[test]
    fn dangling_branch_target_is_unreachable_terminal() {
        let wf = workflow(
            vec![(
                "step1",
                WorkflowStepDef::Rule {
                    rule_id: RuleId::from("r1"),
                    on_true: Some(StepName::from("ghost")),
                    on_false: Some(StepName::from("ghost")),
                },
            )],
            "step1",
        );
        let err = validate_workflow_shape(&wf).unwrap_err();
        assert!(matches!(err, ValidationError::UnreachableTerminal { .. }));
    }

    #[test]
    fn diamond_shaped_graph_is_valid() {
        let wf = workflow(
            vec![
                (
                    "start",
                    WorkflowStepDef::Rule {
                        rule_id: RuleId::from("r1"),
                        on_true: Some(StepName::from("left")),
                        on_false: Some(StepName::from("right")),
                    },
                ),
                (
                    "left",
                    WorkflowStepDef::Rule {
                        rule_id: RuleId::from("r2"),
                        on_true: Some(StepName::from("end")),
                        on_false: Some(StepName::from("end")),
                    },
                ),
                (
                    "right",
                    WorkflowStepDef::Rule {
                        rule_id: RuleId::from("r3"),
                        on_true: Some(StepName::from("end")),
                        on_false: Some(StepName::from("end")),
                    },
                ),
                ("end", WorkflowStepDef::Terminal { terminal_id: TerminalId::from("t") }),
            ],
            "start",
        );
        assert!(validate_workflow_shape(&wf).is_ok());
    }

    #[test]
    fn valid_function_shapes() {
        let agg = FunctionDef::new_draft(
            NamespaceId::from("ns1"),
            FunctionId::from("max_income"),
            FunctionType::Max,
            vec![FieldId::from("income")],
            vec![],
            1,
            "alice",
        );
        assert!(validate_function(&agg).is_ok());

        let membership = FunctionDef::new_draft(
            NamespaceId::from("ns1"),
            FunctionId::from("allowed"),
            FunctionType::In,
            vec![],
            vec![serde_json::Value::String("CA".into())],
            1,
            "alice",
        );
        assert!(validate_function(&membership).is_ok());
    }

    #[test]
    fn aggregate_function_rejects_empty_args() {
        let bad = FunctionDef::new_draft(NamespaceId::from("ns1"), FunctionId::from("max_income"), FunctionType::Max, vec![], vec![], 1, "alice");
        assert!(validate_function(&bad).is_err());
    }
}
