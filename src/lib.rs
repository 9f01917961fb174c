// Rules & Workflow Evaluation Engine - Rust Edition
// A multi-tenant configuration lifecycle engine (draft/active/inactive
// versioning, dependency validation, workflow graph validation) paired with
// an execution engine (checksum-coherent snapshot cache, rule/workflow
// interpreters).

//! # Rules & Workflow Evaluation Engine
//!
//! This is the library root. It wires together two tightly-coupled
//! subsystems:
//!
//! ## Configuration lifecycle engine
//! - [`validators`]: pure structural checks (identifiers, enums, function
//!   argument shape, rule condition trees, workflow graph acyclicity and
//!   terminal-reachability). No I/O.
//! - [`engine::dependency`]: cross-entity reference resolution against the
//!   active set of a namespace (a rule referencing a function, a workflow
//!   referencing a rule and a terminal).
//! - [`engine::version_manager`]: the draft → active → inactive state
//!   machine per logical entity id, with per-namespace publish
//!   serialization.
//! - [`engine::checksum`]: a deterministic fingerprint of a namespace's
//!   active configuration.
//!
//! ## Execution engine
//! - [`engine::snapshot`]: an immutable, per-namespace bundle of active
//!   configuration, pre-compiled for allocation-free interpretation.
//! - [`engine::refresh`]: background + inline-probe refresh of snapshots,
//!   with per-namespace single-flight deduplication.
//! - [`engine::rule_interpreter`] / [`engine::workflow_interpreter`]:
//!   evaluate condition trees and walk workflow graphs, with optional
//!   tracing.
//! - [`engine::execution`]: the façade tying snapshot freshness to
//!   interpretation and shaping the final response.
//!
//! ## Rust Learning Notes:
//!
//! ### Error Handling in Rust
//! Rust doesn't have exceptions. Instead, it uses `Result<T, E>` types where
//! `Ok(value)` represents success and `Err(error)` represents failure. This
//! crate follows the same pattern throughout: fallible operations return
//! [`Result<T>`], a shorthand for `std::result::Result<T, Error>`.
//!
//! ### The `thiserror` Crate
//! [`Error`] is derived with `thiserror`, which implements
//! `std::error::Error` and lets each variant declare its own display message
//! via `#[error("...")]`. `#[from]` conversions let `?` promote a
//! lower-level error (a [`validators::ValidationError`], a
//! [`engine::dependency::DependencyError`]) into this crate's error type
//! automatically.

pub mod config;
pub mod deadline;
pub mod engine;
pub mod models;
pub mod validators;

pub use config::Config;
pub use deadline::Deadline;
pub use models::{
    ActiveConfigMeta, ConditionTree, EntityStatus, FieldDef, FieldId, FieldType, FunctionDef, FunctionId,
    FunctionType, Logic, NamespaceDef, NamespaceId, Operator, ReturnType, RuleDef, RuleId, StepName, TerminalDef,
    TerminalId, VersionMeta, WorkflowDef, WorkflowId, WorkflowStepDef,
};

pub use engine::checksum::ChecksumService;
pub use engine::dependency::{DependencyError, DependencyResolver};
pub use engine::execution::{ExecutionResponse, ExecutionService, Selector};
pub use engine::refresh::RefreshCoordinator;
pub use engine::rule_interpreter::{RuleInterpreter, TraceStep};
pub use engine::snapshot::{Snapshot, SnapshotCache, SnapshotStatus};
pub use engine::store::{InMemoryStore, Store};
pub use engine::version_manager::VersionManager;
pub use engine::workflow_interpreter::WorkflowInterpreter;
pub use validators::ValidationError;

use thiserror::Error as ThisError;

/// Crate-wide error taxonomy (see the error handling design section of the
/// project's specification for the full kind → HTTP status mapping table;
/// the mapping itself belongs to the HTTP boundary, which is outside this
/// crate's scope).
///
/// ## Rust Learning Notes:
///
/// Each variant carries a structured payload (offending id, referent, step
/// name, branch label, ...) rather than a bare string, so a caller — or an
/// embedding HTTP layer — can pattern-match on `kind` instead of sniffing
/// substrings out of a message.
#[derive(ThisError, Debug)]
pub enum Error {
    /// Bad identifier, unknown enum, malformed condition tree, workflow
    /// graph defect.
    #[error("validation failed: {0}")]
    Validation(#[from] ValidationError),

    /// Entity or namespace absent.
    #[error("{kind} '{id}' not found in namespace '{namespace}'")]
    NotFound {
        kind: String,
        namespace: String,
        id: String,
    },

    /// The namespace itself does not exist (distinguished from "namespace
    /// exists but the entity is missing" per the propagation policy).
    #[error("namespace '{namespace}' not found")]
    NamespaceNotFound { namespace: String },

    /// Duplicate id, second draft attempt.
    #[error("{kind} '{id}' already exists in namespace '{namespace}'")]
    AlreadyExists {
        kind: String,
        namespace: String,
        id: String,
    },

    /// Reference to a missing or inactive entity at publish time.
    #[error("dependency invalid: {0}")]
    DependencyInvalid(#[from] DependencyError),

    /// Update to a non-draft version, delete of a non-draft version.
    #[error("version conflict: {0}")]
    VersionConflict(String),

    /// Missing caller identity (checked upstream of this crate; kept here
    /// so the taxonomy is complete and embeddable).
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// Cycle encountered at runtime, step budget exhausted, unrecoverable
    /// type mismatch during interpretation.
    #[error("execution error: {0}")]
    ExecutionError(#[from] engine::workflow_interpreter::ExecutionError),

    /// Store failure, unexpected internal state.
    #[error("internal error: {0}")]
    Internal(String),

    /// A caller-supplied deadline elapsed before the request could
    /// complete. Raised at the boundaries between awaits on the
    /// execution/refresh hot path (see [`deadline::Deadline`]).
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// JSON (de)serialization failure, translated to `Internal` per the
    /// propagation policy unless a caller needs to distinguish it.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Error::Internal(err.to_string())
    }
}

/// Type alias for Results that use this crate's error type.
pub type Result<T> = std::result::Result<T, Error>;
