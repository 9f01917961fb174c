//! Rules & Workflow Engine Admin CLI
//!
//! A small operational surface over the library, the way the teacher's own
//! `admin` binary drives its storage layer directly rather than going
//! through a server. This binary is a convenience/demo surface, not part
//! of the core's testable contract (spec.md's Non-goals exclude HTTP
//! handlers, not an admin CLI driving the library in-process).
//!
//! Because `InMemoryStore` is not persistent across invocations, this
//! binary seeds one demo namespace (mirroring spec.md §8's S3 scenario —
//! an income-based loan approval workflow) on every run, then executes the
//! requested subcommand against it.

use std::collections::HashMap;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use colored::Colorize;
use rules_workflow_engine::engine::execution::{ExecutionService, Selector};
use rules_workflow_engine::engine::refresh::RefreshCoordinator;
use rules_workflow_engine::engine::snapshot::{SnapshotCache, SnapshotStatus};
use rules_workflow_engine::engine::store::{InMemoryStore, Store};
use rules_workflow_engine::engine::version_manager::VersionManager;
use rules_workflow_engine::models::{
    ConditionTree, FieldDef, FieldId, FieldType, FunctionDef, FunctionId, FunctionType, Logic, NamespaceDef,
    NamespaceId, Operator, RuleDef, RuleId, StepName, TerminalDef, TerminalId, WorkflowDef, WorkflowId, WorkflowStepDef,
};
use tracing::{error, info};

const DEMO_NAMESPACE: &str = "demo";

#[derive(Parser)]
#[command(name = "rules-workflow-admin")]
#[command(about = "Admin CLI for the rules & workflow evaluation engine")]
#[command(version = env!("CARGO_PKG_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show cache status for the seeded demo namespace (mirrors the
    /// cache-stats endpoint shape from spec.md §6).
    Stats,

    /// Publish a draft entity in the seeded demo namespace.
    Publish {
        namespace: String,
        /// One of `function`, `rule`, `workflow`.
        kind: String,
        id: String,
    },

    /// Execute a rule or workflow against a JSON data document.
    Execute {
        namespace: String,
        /// `rule:<id>` or `workflow:<id>`.
        selector: String,
        /// Path to a JSON file holding the input document (an object).
        json_file: String,
        #[arg(long)]
        trace: bool,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    if let Err(e) = dotenv::dotenv() {
        eprintln!("Warning: Could not load .env file: {}", e);
        eprintln!("Environment variables must be set manually or via system configuration");
    }

    let cli = Cli::parse();
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let store = Arc::new(InMemoryStore::new());
    seed_demo_namespace(&store).await?;

    let config = rules_workflow_engine::Config::load(None)?;
    let cache = Arc::new(SnapshotCache::new(config.refresh.stale_threshold()));
    let refresh = Arc::new(RefreshCoordinator::new(
        store.clone(),
        cache.clone(),
        config.refresh.inline_threshold(),
        config.refresh.background_interval(),
    ));
    let execution = ExecutionService::new(refresh.clone(), config.execution.step_budget);

    match cli.command {
        Commands::Stats => show_stats(store.as_ref(), &cache).await,
        Commands::Publish { namespace, kind, id } => publish(&store, &namespace, &kind, &id).await,
        Commands::Execute { namespace, selector, json_file, trace } => {
            run_execute(&execution, &namespace, &selector, &json_file, trace).await
        }
    }

    Ok(())
}

/// Seeds the S3 scenario from spec.md §8: an `income` field, a
/// `max_income` aggregate function, a rule gating on it, and a two-branch
/// approve/reject workflow. The function and rule are left as published
/// drafts only partway (function published, rule/workflow left as drafts)
/// so `admin publish` has something meaningful to demonstrate.
async fn seed_demo_namespace(store: &Arc<InMemoryStore>) -> anyhow::Result<()> {
    let ns = NamespaceId::from(DEMO_NAMESPACE);
    store.create_namespace(NamespaceDef::new(ns.clone(), "seeded loan-approval demo", "admin-cli")).await?;
    store.create_field(FieldDef::new(ns.clone(), FieldId::from("income"), FieldType::Number, "applicant annual income")).await?;
    store.create_terminal(TerminalDef::new(ns.clone(), TerminalId::from("approve"))).await?;
    store.create_terminal(TerminalDef::new(ns.clone(), TerminalId::from("reject"))).await?;

    let vm = VersionManager::new(store.clone(), 32);

    let function = FunctionDef::new_draft(ns.clone(), FunctionId::from("max_income"), FunctionType::Max, vec![FieldId::from("income")], vec![], 0, "admin-cli");
    vm.create_function(&ns, function).await?;
    vm.publish_function(&ns, &FunctionId::from("max_income"), "admin-cli").await?;

    let rule = RuleDef::new_draft(
        ns.clone(),
        RuleId::from("income_check"),
        Logic::And,
        vec![ConditionTree::function_condition(FunctionId::from("max_income"), Operator::Ge, serde_json::json!(50000))],
        0,
        "admin-cli",
    );
    vm.create_rule(&ns, rule).await?;

    let mut steps = HashMap::new();
    steps.insert(
        StepName::from("check_income"),
        WorkflowStepDef::Rule { rule_id: RuleId::from("income_check"), on_true: Some(StepName::from("approved")), on_false: Some(StepName::from("rejected")) },
    );
    steps.insert(StepName::from("approved"), WorkflowStepDef::Terminal { terminal_id: TerminalId::from("approve") });
    steps.insert(StepName::from("rejected"), WorkflowStepDef::Terminal { terminal_id: TerminalId::from("reject") });
    let workflow = WorkflowDef::new_draft(ns.clone(), WorkflowId::from("loan_approval"), StepName::from("check_income"), steps, 0, "admin-cli");
    vm.create_workflow(&ns, workflow).await?;

    info!(namespace = DEMO_NAMESPACE, "seeded demo namespace (rule and workflow are draft; run `publish` to activate them)");
    Ok(())
}

async fn show_stats(store: &InMemoryStore, cache: &SnapshotCache) {
    let ns = NamespaceId::from(DEMO_NAMESPACE);
    let checksum = store.get_active_checksum(&ns).await.unwrap_or(None);
    let status = cache.status(&ns);

    println!("\n{}", "Cache status".bold());
    println!("=============");
    println!("namespace:  {}", DEMO_NAMESPACE);
    println!("checksum:   {}", checksum.as_deref().unwrap_or("<none>"));
    match status {
        SnapshotStatus::Fresh => println!("status:     {}", "fresh".green()),
        SnapshotStatus::Stale => println!("status:     {}", "stale".yellow()),
        SnapshotStatus::NotInitialized => println!("status:     {}", "not_initialized".red()),
    }
}

async fn publish(store: &Arc<InMemoryStore>, namespace: &str, kind: &str, id: &str) {
    let vm = VersionManager::new(store.clone(), 32);
    let ns = NamespaceId::from(namespace);

    let outcome = match kind {
        "function" => vm.publish_function(&ns, &FunctionId::from(id), "admin-cli").await.map(|_| ()),
        "rule" => vm.publish_rule(&ns, &RuleId::from(id), "admin-cli").await.map(|_| ()),
        "workflow" => vm.publish_workflow(&ns, &WorkflowId::from(id), "admin-cli").await.map(|_| ()),
        other => {
            error!("unknown entity kind '{}': expected function, rule, or workflow", other);
            return;
        }
    };

    match outcome {
        Ok(()) => println!("{} published {} '{}' in namespace '{}'", "\u{2713}".green(), kind, id, namespace),
        Err(e) => error!("publish failed: {}", e),
    }
}

async fn run_execute<S: Store + ?Sized + 'static>(execution: &ExecutionService<S>, namespace: &str, selector: &str, json_file: &str, trace: bool) {
    let selector = match parse_selector(selector) {
        Ok(s) => s,
        Err(e) => {
            error!("{}", e);
            return;
        }
    };

    let body = match std::fs::read_to_string(json_file) {
        Ok(body) => body,
        Err(e) => {
            error!("could not read '{}': {}", json_file, e);
            return;
        }
    };
    let data: HashMap<String, serde_json::Value> = match serde_json::from_str(&body) {
        Ok(data) => data,
        Err(e) => {
            error!("'{}' is not a JSON object: {}", json_file, e);
            return;
        }
    };

    match execution.execute(&NamespaceId::from(namespace), selector, data, trace, None).await {
        Ok(response) => {
            println!("\n{}", "Execution result".bold());
            println!("=================");
            println!("result: {}", response.result);
            if let Some(trace_steps) = &response.trace {
                println!("\ntrace ({} steps):", trace_steps.len());
                for step in trace_steps {
                    println!("  [{}] {:?} -> {}", step.step_type, step.id, step.output);
                }
            }
        }
        Err(e) => error!("execution failed: {}", e),
    }
}

fn parse_selector(raw: &str) -> anyhow::Result<Selector> {
    match raw.split_once(':') {
        Some(("rule", id)) => Ok(Selector::Rule(RuleId::from(id))),
        Some(("workflow", id)) => Ok(Selector::Workflow(WorkflowId::from(id))),
        _ => Err(anyhow::anyhow!("selector must be 'rule:<id>' or 'workflow:<id>', got '{}'", raw)),
    }
}
