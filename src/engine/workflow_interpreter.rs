// Workflow Interpreter: walks a workflow's step graph from `startAt`,
// delegating rule steps to the Rule Interpreter, with a cycle guard and a
// step budget as a defensive backstop — `validators::validate_workflow_shape`
// should already have rejected any workflow that could trigger either at
// publish time, but the interpreter never trusts that a graph reaching it
// at runtime is the one that was validated (a bug elsewhere in the pipeline
// should surface as a typed `ExecutionError`, not an infinite loop).
//
// ## Rust Learning Notes:
//
// ### Reusing the Rule Interpreter's trace shape
// A workflow's trace is the concatenation of each visited rule step's own
// condition trace plus one summary `TraceStep` per decision node — rather
// than inventing a second trace format, `WorkflowInterpreter` extends the
// same `Vec<TraceStep>` the Rule Interpreter already produces, tagging its
// own entries with `step_type: "rule"`. A reader walking the trace end to
// end sees exactly how each decision was reached.

use std::collections::{HashMap, HashSet};
use std::time::Instant;

use serde_json::Value;
use thiserror::Error;

use crate::engine::rule_interpreter::{RuleInterpreter, TraceStep};
use crate::models::{
    FieldDef, FieldId, FunctionDef, FunctionId, RuleDef, RuleId, StepName, TerminalId, WorkflowDef, WorkflowStepDef,
};

/// Runtime execution failures the Workflow Interpreter can raise. All are
/// defensive: a workflow that passed `validate_workflow_shape` and whose
/// dependencies resolved at publish time should never actually hit these,
/// but the interpreter surfaces them as typed errors rather than panicking
/// or silently returning a null terminal (per the spec's "the workflow
/// never silently returns a null terminal" requirement).
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ExecutionError {
    #[error("cyclic dependency detected at runtime at step '{0}'")]
    CycleDetected(StepName),
    #[error("workflow step budget of {0} exhausted before reaching a terminal")]
    StepBudgetExceeded(u64),
    #[error("workflow step '{0}' does not exist")]
    MissingStep(StepName),
    #[error("step '{step}' references rule '{rule_id}', which is not active in this namespace")]
    MissingRule { step: StepName, rule_id: RuleId },
    #[error("step '{step}' has an unrecognised step type")]
    UnknownStepType { step: StepName },
}

pub struct WorkflowEvaluation {
    pub terminal: TerminalId,
    pub trace: Option<Vec<TraceStep>>,
}

pub struct WorkflowInterpreter<'a> {
    fields: &'a HashMap<FieldId, FieldDef>,
    functions: &'a HashMap<FunctionId, FunctionDef>,
    rules: &'a HashMap<RuleId, RuleDef>,
    step_budget: u64,
}

impl<'a> WorkflowInterpreter<'a> {
    pub fn new(
        fields: &'a HashMap<FieldId, FieldDef>,
        functions: &'a HashMap<FunctionId, FunctionDef>,
        rules: &'a HashMap<RuleId, RuleDef>,
        step_budget: u64,
    ) -> Self {
        WorkflowInterpreter { fields, functions, rules, step_budget }
    }

    /// Walks the graph from `workflow.start_at`. `visited` enforces the
    /// cycle guard; `budget` caps the number of decision nodes visited
    /// regardless of cycles, so a pathological graph (or a bug in the
    /// validator) can never hang a caller.
    pub fn evaluate(
        &self,
        workflow: &WorkflowDef,
        data: &HashMap<String, Value>,
        trace: bool,
    ) -> Result<WorkflowEvaluation, ExecutionError> {
        let rule_interpreter = RuleInterpreter::new(self.fields, self.functions);
        let mut current = workflow.start_at.clone();
        let mut visited: HashSet<StepName> = HashSet::new();
        let mut budget = self.step_budget;
        let mut steps = if trace { Some(Vec::new()) } else { None };

        loop {
            if !visited.insert(current.clone()) {
                return Err(ExecutionError::CycleDetected(current));
            }
            if budget == 0 {
                return Err(ExecutionError::StepBudgetExceeded(self.step_budget));
            }
            budget -= 1;

            let step = workflow.step(&current).ok_or_else(|| ExecutionError::MissingStep(current.clone()))?;

            match step {
                WorkflowStepDef::Terminal { terminal_id } => {
                    if let Some(sink) = steps.as_mut() {
                        sink.push(TraceStep {
                            step_type: "rule",
                            id: None,
                            input: None,
                            output: Value::String(terminal_id.to_string()),
                            duration_micros: 0,
                            error: None,
                        });
                    }
                    return Ok(WorkflowEvaluation { terminal: terminal_id.clone(), trace: steps });
                }
                WorkflowStepDef::Rule { rule_id, on_true, on_false } => {
                    let rule = self
                        .rules
                        .get(rule_id)
                        .ok_or_else(|| ExecutionError::MissingRule { step: current.clone(), rule_id: rule_id.clone() })?;

                    let started = Instant::now();
                    let evaluation = rule_interpreter.evaluate(rule, data, trace);

                    if let Some(sink) = steps.as_mut() {
                        if let Some(nested) = evaluation.trace {
                            sink.extend(nested);
                        }
                        sink.push(TraceStep {
                            step_type: "rule",
                            id: Some(rule_id.to_string()),
                            input: None,
                            output: Value::Bool(evaluation.result),
                            duration_micros: started.elapsed().as_micros(),
                            error: None,
                        });
                    }

                    let next = if evaluation.result { on_true } else { on_false };
                    current = next.clone().ok_or_else(|| ExecutionError::MissingStep(current.clone()))?;
                }
                WorkflowStepDef::Unknown => {
                    return Err(ExecutionError::UnknownStepType { step: current.clone() });
                }
            }
        }
    }
}
