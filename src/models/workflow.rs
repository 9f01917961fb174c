// Workflow: a versioned directed graph of steps. Decision nodes reference
// rules; sinks are terminals. Acyclic, and every reachable path must end at
// a terminal — both are checked by the Validator, not enforced by this
// type.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use super::ids::{NamespaceId, RuleId, StepName, TerminalId, WorkflowId};
use super::version::VersionMeta;

/// One node in a workflow's step graph.
///
/// `on_true`/`on_false` are `Option<String>` rather than `String` so that a
/// step descriptor omitting a branch (scenario S1: a rule step with no
/// `onFalse`) still deserializes — the missing-branch check is the
/// Validator's job, not serde's.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WorkflowStepDef {
    Rule {
        #[serde(rename = "ruleId")]
        rule_id: RuleId,
        #[serde(rename = "onTrue", default)]
        on_true: Option<StepName>,
        #[serde(rename = "onFalse", default)]
        on_false: Option<StepName>,
    },
    Terminal {
        #[serde(rename = "terminalId")]
        terminal_id: TerminalId,
    },
    /// Anything with an unrecognised `type` discriminant. Kept as an
    /// explicit variant (rather than a `serde_json::Error`) so the
    /// Validator can report a typed `UnknownStepType` rather than the
    /// deserializer itself rejecting the document.
    #[serde(other)]
    Unknown,
}

/// A draft or versioned workflow definition, keyed by `(namespace, id,
/// version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkflowDef {
    pub namespace: NamespaceId,
    pub id: WorkflowId,
    #[serde(rename = "startAt")]
    pub start_at: StepName,
    pub steps: HashMap<StepName, WorkflowStepDef>,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

impl WorkflowDef {
    pub fn new_draft(
        namespace: NamespaceId,
        id: WorkflowId,
        start_at: StepName,
        steps: HashMap<StepName, WorkflowStepDef>,
        version: u64,
        created_by: impl Into<String>,
    ) -> Self {
        WorkflowDef {
            namespace,
            id,
            start_at,
            steps,
            meta: VersionMeta::new_draft(version, created_by),
        }
    }

    pub fn step(&self, name: &StepName) -> Option<&WorkflowStepDef> {
        self.steps.get(name)
    }
}
