// Core domain models for the rules/workflow evaluation service.
// These are the generic, storage-agnostic data structures shared by the
// configuration lifecycle engine and the execution engine.

//! # Domain Models Module
//!
//! ## Rust Learning Notes:
//!
//! ### Module Organization
//! This `mod.rs` file is the module root for the `models` directory. Each
//! `pub mod` declaration pulls in a sibling `.rs` file as a submodule; the
//! `pub use` block below re-exports the commonly used types so callers can
//! write `use rules_workflow_engine::models::RuleDef` instead of reaching
//! into `models::rule::RuleDef`.

pub mod field;
pub mod function;
pub mod ids;
pub mod namespace;
pub mod rule;
pub mod terminal;
pub mod version;
pub mod workflow;

pub use field::{FieldDef, FieldType};
pub use function::{FunctionDef, FunctionType, ReturnType};
pub use ids::{is_valid_identifier, FieldId, FunctionId, NamespaceId, RuleId, StepName, TerminalId, WorkflowId};
pub use namespace::{ActiveConfigMeta, NamespaceDef};
pub use rule::{ConditionTree, Logic, Operator, RuleDef};
pub use terminal::TerminalDef;
pub use version::{EntityStatus, VersionMeta};
pub use workflow::{WorkflowDef, WorkflowStepDef};
