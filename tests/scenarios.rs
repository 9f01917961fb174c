// End-to-end scenarios exercised through the public crate API: create,
// publish, execute, refresh. One test per scenario, named after what it
// checks rather than a scenario label.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use rules_workflow_engine::{
    ConditionTree, Error, ExecutionService, FieldDef, FieldType, FunctionDef, FunctionType, InMemoryStore, Logic,
    NamespaceDef, NamespaceId, Operator, RefreshCoordinator, RuleDef, RuleId, Selector, SnapshotCache, StepName,
    Store, TerminalDef, TerminalId, ValidationError, VersionManager, WorkflowDef, WorkflowId, WorkflowStepDef,
};
use serde_json::Value;

fn workflow_with_missing_false_branch() -> WorkflowDef {
    let ns = NamespaceId::from("ns1");
    let mut steps = HashMap::new();
    steps.insert(
        StepName::from("step1"),
        WorkflowStepDef::Rule { rule_id: RuleId::from("r1"), on_true: Some(StepName::from("step2")), on_false: None },
    );
    steps.insert(StepName::from("step2"), WorkflowStepDef::Terminal { terminal_id: TerminalId::from("t") });
    WorkflowDef::new_draft(ns, WorkflowId::from("w1"), StepName::from("step1"), steps, 1, "alice")
}

#[test]
fn validation_rejects_a_workflow_missing_its_false_branch() {
    let workflow = workflow_with_missing_false_branch();
    let err = rules_workflow_engine::validators::validate_workflow_shape(&workflow).unwrap_err();
    assert_eq!(err.to_string(), "The 'onFalse' path for step 'step1' does not lead to a terminal.");
    assert!(matches!(err, ValidationError::MissingBranch { .. }));
}

#[test]
fn validation_rejects_a_self_referencing_workflow_step() {
    let ns = NamespaceId::from("ns1");
    let mut steps = HashMap::new();
    steps.insert(
        StepName::from("step1"),
        WorkflowStepDef::Rule { rule_id: RuleId::from("r1"), on_true: Some(StepName::from("step1")), on_false: Some(StepName::from("step1")) },
    );
    let workflow = WorkflowDef::new_draft(ns, WorkflowId::from("w1"), StepName::from("step1"), steps, 1, "alice");

    let err = rules_workflow_engine::validators::validate_workflow_shape(&workflow).unwrap_err();
    assert_eq!(err.to_string(), "cyclic dependency detected in workflow steps");
    assert!(matches!(err, ValidationError::CyclicDependency));
}

/// Shared setup for S3/S4/S5/S6: a namespace with an `income` field, two
/// terminals, and a `max_income` aggregate function already published.
async fn namespace_with_published_function(store: &Arc<InMemoryStore>, ns: &NamespaceId) -> VersionManager<InMemoryStore> {
    store.create_namespace(NamespaceDef::new(ns.clone(), "loan approval", "alice")).await.unwrap();
    store.create_field(FieldDef::new(ns.clone(), rules_workflow_engine::FieldId::from("income"), FieldType::Number, "annual income")).await.unwrap();
    store.create_terminal(TerminalDef::new(ns.clone(), TerminalId::from("approve"))).await.unwrap();
    store.create_terminal(TerminalDef::new(ns.clone(), TerminalId::from("reject"))).await.unwrap();

    let vm = VersionManager::new(store.clone(), 32);
    let function = FunctionDef::new_draft(
        ns.clone(),
        rules_workflow_engine::FunctionId::from("max_income"),
        FunctionType::Max,
        vec![rules_workflow_engine::FieldId::from("income")],
        vec![],
        0,
        "alice",
    );
    vm.create_function(ns, function).await.unwrap();
    vm.publish_function(ns, &rules_workflow_engine::FunctionId::from("max_income"), "alice").await.unwrap();
    vm
}

fn income_rule(ns: &NamespaceId, threshold: i64) -> RuleDef {
    RuleDef::new_draft(
        ns.clone(),
        RuleId::from("r"),
        Logic::And,
        vec![ConditionTree::function_condition(
            rules_workflow_engine::FunctionId::from("max_income"),
            Operator::Ge,
            Value::from(threshold),
        )],
        0,
        "alice",
    )
}

fn approve_reject_workflow(ns: &NamespaceId) -> WorkflowDef {
    let mut steps = HashMap::new();
    steps.insert(
        StepName::from("s"),
        WorkflowStepDef::Rule { rule_id: RuleId::from("r"), on_true: Some(StepName::from("a")), on_false: Some(StepName::from("b")) },
    );
    steps.insert(StepName::from("a"), WorkflowStepDef::Terminal { terminal_id: TerminalId::from("approve") });
    steps.insert(StepName::from("b"), WorkflowStepDef::Terminal { terminal_id: TerminalId::from("reject") });
    WorkflowDef::new_draft(ns.clone(), WorkflowId::from("w"), StepName::from("s"), steps, 0, "alice")
}

fn services(store: Arc<InMemoryStore>) -> (Arc<RefreshCoordinator<InMemoryStore>>, ExecutionService<InMemoryStore>) {
    let cache = Arc::new(SnapshotCache::new(Duration::from_secs(300)));
    let refresh = Arc::new(RefreshCoordinator::new(store, cache, Duration::from_millis(0), Duration::from_secs(30)));
    let execution = ExecutionService::new(refresh.clone(), 10_000);
    (refresh, execution)
}

#[tokio::test]
async fn publish_happy_path_reaches_approve_or_reject() {
    let ns = NamespaceId::from("ns1");
    let store = Arc::new(InMemoryStore::new());
    let vm = namespace_with_published_function(&store, &ns).await;

    vm.create_rule(&ns, income_rule(&ns, 50_000)).await.unwrap();
    vm.publish_rule(&ns, &RuleId::from("r"), "alice").await.unwrap();

    vm.create_workflow(&ns, approve_reject_workflow(&ns)).await.unwrap();
    vm.publish_workflow(&ns, &WorkflowId::from("w"), "alice").await.unwrap();

    let (_refresh, execution) = services(store);

    let mut approved = HashMap::new();
    approved.insert("income".to_string(), Value::from(60_000));
    let response = execution.execute(&ns, Selector::Workflow(WorkflowId::from("w")), approved, false, None).await.unwrap();
    assert_eq!(response.result, Value::String("approve".to_string()));

    let mut rejected = HashMap::new();
    rejected.insert("income".to_string(), Value::from(40_000));
    let response = execution.execute(&ns, Selector::Workflow(WorkflowId::from("w")), rejected, false, None).await.unwrap();
    assert_eq!(response.result, Value::String("reject".to_string()));
}

#[tokio::test]
async fn publishing_a_rule_against_an_unpublished_function_fails_dependency_resolution() {
    let ns = NamespaceId::from("ns1");
    let store = Arc::new(InMemoryStore::new());
    store.create_namespace(NamespaceDef::new(ns.clone(), "loan approval", "alice")).await.unwrap();
    store.create_field(FieldDef::new(ns.clone(), rules_workflow_engine::FieldId::from("income"), FieldType::Number, "")).await.unwrap();

    let vm = VersionManager::new(store.clone(), 32);
    let function = FunctionDef::new_draft(
        ns.clone(),
        rules_workflow_engine::FunctionId::from("max_income"),
        FunctionType::Max,
        vec![rules_workflow_engine::FieldId::from("income")],
        vec![],
        0,
        "alice",
    );
    vm.create_function(&ns, function).await.unwrap();
    // Deliberately not publishing max_income.

    vm.create_rule(&ns, income_rule(&ns, 50_000)).await.unwrap();
    let err = vm.publish_rule(&ns, &RuleId::from("r"), "alice").await.unwrap_err();

    assert!(matches!(err, Error::DependencyInvalid(_)));
    assert!(err.to_string().contains("max_income"));
}

#[tokio::test]
async fn republishing_a_rule_is_observed_without_an_intermediate_hybrid_result() {
    let ns = NamespaceId::from("ns1");
    let store = Arc::new(InMemoryStore::new());
    let vm = namespace_with_published_function(&store, &ns).await;

    vm.create_rule(&ns, income_rule(&ns, 50_000)).await.unwrap();
    vm.publish_rule(&ns, &RuleId::from("r"), "alice").await.unwrap();
    vm.create_workflow(&ns, approve_reject_workflow(&ns)).await.unwrap();
    vm.publish_workflow(&ns, &WorkflowId::from("w"), "alice").await.unwrap();

    let (_refresh, execution) = services(store.clone());

    let mut doc = HashMap::new();
    doc.insert("income".to_string(), Value::from(60_000));
    let first = execution.execute(&ns, Selector::Workflow(WorkflowId::from("w")), doc.clone(), false, None).await.unwrap();
    assert_eq!(first.result, Value::String("approve".to_string()));

    // Raise the bar so the same income no longer qualifies, then republish.
    vm.create_rule(&ns, income_rule(&ns, 100_000)).await.unwrap();
    vm.publish_rule(&ns, &RuleId::from("r"), "alice").await.unwrap();

    // The inline threshold is zero in `services`, so the very next execute
    // must observe the republished rule paired with the same workflow --
    // never a stale rule against the new checksum or vice versa.
    let second = execution.execute(&ns, Selector::Workflow(WorkflowId::from("w")), doc, false, None).await.unwrap();
    assert_eq!(second.result, Value::String("reject".to_string()));
}

#[tokio::test]
async fn trace_reports_an_ordered_log_ending_in_the_final_result() {
    let ns = NamespaceId::from("ns1");
    let store = Arc::new(InMemoryStore::new());
    let vm = namespace_with_published_function(&store, &ns).await;

    vm.create_rule(&ns, income_rule(&ns, 50_000)).await.unwrap();
    vm.publish_rule(&ns, &RuleId::from("r"), "alice").await.unwrap();
    vm.create_workflow(&ns, approve_reject_workflow(&ns)).await.unwrap();
    vm.publish_workflow(&ns, &WorkflowId::from("w"), "alice").await.unwrap();

    let (_refresh, execution) = services(store);

    let mut doc = HashMap::new();
    doc.insert("income".to_string(), Value::from(60_000));
    let response = execution.execute(&ns, Selector::Workflow(WorkflowId::from("w")), doc, true, None).await.unwrap();

    let trace = response.trace.expect("trace requested");
    assert!(!trace.is_empty());
    for step in &trace {
        assert!(["rule", "condition", "function"].contains(&step.step_type));
    }
    assert_eq!(trace.last().unwrap().output, response.result);
}

#[tokio::test]
async fn executing_against_a_namespace_that_was_never_created_is_namespace_not_found() {
    let store = Arc::new(InMemoryStore::new());
    let (_refresh, execution) = services(store);

    let err = execution
        .execute(&NamespaceId::from("ghost"), Selector::Workflow(WorkflowId::from("w")), HashMap::new(), false, None)
        .await
        .unwrap_err();
    assert!(matches!(err, Error::NamespaceNotFound { .. }));
}
