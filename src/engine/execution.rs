// Execution Service: the façade that takes a namespace + target selector +
// data document, ensures the snapshot is fresh, dispatches to the
// appropriate interpreter, and shapes the final response.
//
// ## Rust Learning Notes:
//
// ### An enum instead of two optional fields
// `spec.md` describes the request selector as "exactly one of {ruleId} or
// {workflowId}" and an `InvalidExecutionRequest` error for anything else.
// Rather than modelling that as `Option<RuleId>` + `Option<WorkflowId>` and
// checking the "exactly one is `Some`" invariant by hand at every call
// site, `Selector` makes the illegal states (both set, neither set)
// unrepresentable — the enum itself is the validation.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::engine::refresh::RefreshCoordinator;
use crate::engine::rule_interpreter::{RuleInterpreter, TraceStep};
use crate::engine::snapshot::Snapshot;
use crate::engine::store::Store;
use crate::engine::workflow_interpreter::WorkflowInterpreter;
use crate::models::{NamespaceId, RuleId, WorkflowId};
use crate::{Deadline, Error, Result};

/// Which kind of entity to execute. Exactly one variant is ever
/// constructed per request — see the module doc for why this replaces a
/// pair of optional fields.
#[derive(Debug, Clone)]
pub enum Selector {
    Rule(RuleId),
    Workflow(WorkflowId),
}

/// Metadata describing what was executed, alongside the bare result (per
/// spec.md §6: "Execution responses are returned bare... with the shape
/// defined in §4.9").
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecutionMetadata {
    pub namespace: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rule_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub workflow_id: Option<String>,
    pub version: u64,
}

#[derive(Debug, Clone, Serialize)]
pub struct ExecutionResponse {
    /// `bool` for a rule, the reached terminal's id (as a string) for a
    /// workflow.
    pub result: Value,
    pub trace: Option<Vec<TraceStep>>,
    pub metadata: ExecutionMetadata,
    pub timestamp: DateTime<Utc>,
}

pub struct ExecutionService<S: Store + ?Sized> {
    refresh: Arc<RefreshCoordinator<S>>,
    step_budget: u64,
}

impl<S: Store + ?Sized + 'static> ExecutionService<S> {
    pub fn new(refresh: Arc<RefreshCoordinator<S>>, step_budget: u64) -> Self {
        ExecutionService { refresh, step_budget }
    }

    /// `Execute(namespace, selector, data, trace?, deadline?) →
    /// ExecutionResponse | Error`. Ensures snapshot freshness (background
    /// ticker for the coarse bound, inline probe for the fine one — see
    /// `RefreshCoordinator::ensure_fresh`) before dispatching, so a
    /// Publish→Execute sequence from the same caller observes the new
    /// active set.
    ///
    /// `deadline`, when given, is checked before the freshness probe and
    /// again before interpretation begins, so a caller whose deadline has
    /// already elapsed never pays for a refresh it can't use the result of.
    /// It is not threaded into individual `Store` calls — see `DESIGN.md`'s
    /// scoping note for why.
    pub async fn execute(
        &self,
        ns: &NamespaceId,
        selector: Selector,
        data: HashMap<String, Value>,
        trace: bool,
        deadline: Option<Deadline>,
    ) -> Result<ExecutionResponse> {
        if let Some(d) = &deadline {
            d.check()?;
        }
        let snapshot = self.refresh.ensure_fresh(ns, deadline.as_ref()).await?;
        if let Some(d) = &deadline {
            d.check()?;
        }
        debug!(namespace = %ns, "dispatching execution");

        match selector {
            Selector::Rule(rule_id) => self.execute_rule(&snapshot, ns, &rule_id, &data, trace),
            Selector::Workflow(workflow_id) => self.execute_workflow(&snapshot, ns, &workflow_id, &data, trace),
        }
    }

    fn execute_rule(
        &self,
        snapshot: &Snapshot,
        ns: &NamespaceId,
        rule_id: &RuleId,
        data: &HashMap<String, Value>,
        trace: bool,
    ) -> Result<ExecutionResponse> {
        let rule = snapshot.active_rules.get(rule_id).ok_or_else(|| Error::NotFound {
            kind: "rule".to_string(),
            namespace: ns.to_string(),
            id: rule_id.to_string(),
        })?;

        let interpreter = RuleInterpreter::new(&snapshot.fields, &snapshot.active_functions);
        let evaluation = interpreter.evaluate(rule, data, trace);

        Ok(ExecutionResponse {
            result: Value::Bool(evaluation.result),
            trace: evaluation.trace,
            metadata: ExecutionMetadata {
                namespace: ns.to_string(),
                rule_id: Some(rule_id.to_string()),
                workflow_id: None,
                version: rule.meta.version,
            },
            timestamp: Utc::now(),
        })
    }

    fn execute_workflow(
        &self,
        snapshot: &Snapshot,
        ns: &NamespaceId,
        workflow_id: &WorkflowId,
        data: &HashMap<String, Value>,
        trace: bool,
    ) -> Result<ExecutionResponse> {
        let workflow = snapshot.active_workflows.get(workflow_id).ok_or_else(|| Error::NotFound {
            kind: "workflow".to_string(),
            namespace: ns.to_string(),
            id: workflow_id.to_string(),
        })?;

        let interpreter = WorkflowInterpreter::new(&snapshot.fields, &snapshot.active_functions, &snapshot.active_rules, self.step_budget);
        let evaluation = interpreter.evaluate(workflow, data, trace)?;

        Ok(ExecutionResponse {
            result: Value::String(evaluation.terminal.to_string()),
            trace: evaluation.trace,
            metadata: ExecutionMetadata {
                namespace: ns.to_string(),
                rule_id: None,
                workflow_id: Some(workflow_id.to_string()),
                version: workflow.meta.version,
            },
            timestamp: Utc::now(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::snapshot::SnapshotCache;
    use crate::engine::store::InMemoryStore;
    use crate::engine::version_manager::VersionManager;
    use crate::models::{ConditionTree, FieldDef, FieldId, FieldType, FunctionDef, FunctionId, FunctionType, Logic, NamespaceDef, Operator, RuleDef, StepName, TerminalDef, TerminalId, WorkflowDef, WorkflowId, WorkflowStepDef};
    use std::time::Duration;

    async fn published_approve_reject(ns: &NamespaceId) -> Arc<InMemoryStore> {
        let store = Arc::new(InMemoryStore::new());
        store.create_namespace(NamespaceDef::new(ns.clone(), "t", "alice")).await.unwrap();
        store.create_field(FieldDef::new(ns.clone(), FieldId::from("income"), FieldType::Number, "")).await.unwrap();
        store.create_terminal(TerminalDef::new(ns.clone(), TerminalId::from("approve"))).await.unwrap();
        store.create_terminal(TerminalDef::new(ns.clone(), TerminalId::from("reject"))).await.unwrap();

        let vm = VersionManager::new(store.clone(), 32);
        let f = FunctionDef::new_draft(ns.clone(), FunctionId::from("max_income"), FunctionType::Max, vec![FieldId::from("income")], vec![], 0, "alice");
        vm.create_function(ns, f).await.unwrap();
        vm.publish_function(ns, &FunctionId::from("max_income"), "alice").await.unwrap();

        let rule = RuleDef::new_draft(
            ns.clone(),
            crate::models::RuleId::from("r"),
            Logic::And,
            vec![ConditionTree::function_condition(FunctionId::from("max_income"), Operator::Ge, serde_json::json!(50000))],
            0,
            "alice",
        );
        vm.create_rule(ns, rule).await.unwrap();
        vm.publish_rule(ns, &crate::models::RuleId::from("r"), "alice").await.unwrap();

        let mut steps = HashMap::new();
        steps.insert(
            StepName::from("s"),
            WorkflowStepDef::Rule { rule_id: crate::models::RuleId::from("r"), on_true: Some(StepName::from("a")), on_false: Some(StepName::from("b")) },
        );
        steps.insert(StepName::from("a"), WorkflowStepDef::Terminal { terminal_id: TerminalId::from("approve") });
        steps.insert(StepName::from("b"), WorkflowStepDef::Terminal { terminal_id: TerminalId::from("reject") });
        let workflow = WorkflowDef::new_draft(ns.clone(), WorkflowId::from("w"), StepName::from("s"), steps, 0, "alice");
        vm.create_workflow(ns, workflow).await.unwrap();
        vm.publish_workflow(ns, &WorkflowId::from("w"), "alice").await.unwrap();

        store
    }

    fn service(store: Arc<InMemoryStore>) -> ExecutionService<InMemoryStore> {
        let cache = Arc::new(SnapshotCache::new(Duration::from_secs(300)));
        let coordinator = Arc::new(RefreshCoordinator::new(store, cache, Duration::from_secs(1), Duration::from_secs(30)));
        ExecutionService::new(coordinator, 10_000)
    }

    #[tokio::test]
    async fn s3_execute_workflow_returns_approve_or_reject() {
        let ns = NamespaceId::from("ns1");
        let store = published_approve_reject(&ns).await;
        let svc = service(store);

        let mut doc = HashMap::new();
        doc.insert("income".to_string(), Value::from(60000));
        let approved = svc.execute(&ns, Selector::Workflow(WorkflowId::from("w")), doc, false, None).await.unwrap();
        assert_eq!(approved.result, Value::String("approve".to_string()));

        let mut doc = HashMap::new();
        doc.insert("income".to_string(), Value::from(40000));
        let rejected = svc.execute(&ns, Selector::Workflow(WorkflowId::from("w")), doc, false, None).await.unwrap();
        assert_eq!(rejected.result, Value::String("reject".to_string()));
    }

    #[tokio::test]
    async fn execute_against_an_unknown_namespace_is_namespace_not_found() {
        let store = Arc::new(InMemoryStore::new());
        let svc = service(store);
        let result = svc.execute(&NamespaceId::from("ghost"), Selector::Workflow(WorkflowId::from("w")), HashMap::new(), false, None).await;
        assert!(matches!(result, Err(Error::NamespaceNotFound { .. })));
    }

    #[tokio::test]
    async fn execute_against_a_missing_rule_is_not_found() {
        let ns = NamespaceId::from("ns1");
        let store = Arc::new(InMemoryStore::new());
        store.create_namespace(NamespaceDef::new(ns.clone(), "t", "alice")).await.unwrap();
        let svc = service(store);
        let result = svc.execute(&ns, Selector::Rule(crate::models::RuleId::from("ghost")), HashMap::new(), false, None).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
    }

    #[tokio::test]
    async fn execute_with_an_already_elapsed_deadline_fails_fast() {
        let ns = NamespaceId::from("ns1");
        let store = published_approve_reject(&ns).await;
        let svc = service(store);

        let deadline = Deadline::after(Duration::from_secs(0));
        tokio::time::sleep(Duration::from_millis(1)).await;

        let result = svc
            .execute(&ns, Selector::Workflow(WorkflowId::from("w")), HashMap::new(), false, Some(deadline))
            .await;
        assert!(matches!(result, Err(Error::DeadlineExceeded)));
    }
}
