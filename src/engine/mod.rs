// Engine: the execution half of the service, plus the components that
// bridge the configuration lifecycle into it.
//
// ## Rust Learning Notes:
//
// ### Module Organization
// Each submodule owns one component from the specification's component
// design section: `store` (the Store contract + in-memory reference
// implementation), `dependency` (Dependency Resolver), `version_manager`
// (Version Manager), `checksum` (Checksum Service), `snapshot` (Snapshot
// Cache), `refresh` (Refresh Coordinator), `rule_interpreter` /
// `workflow_interpreter`, and `execution` (the Execution Service façade
// that ties freshness to interpretation). `validators` lives one level up
// (`crate::validators`) because it is pure and has no engine-level state to
// share.

/// Storage abstraction: the `Store` trait every backing implementation
/// satisfies, plus `InMemoryStore`, the reference implementation used for
/// development, testing, and the bundled `admin` CLI.
pub mod store;

/// Dependency Resolver: cross-entity reference validation against the
/// active set of a namespace.
pub mod dependency;

/// Version Manager: the draft -> active -> inactive lifecycle state
/// machine, with per-namespace publish serialization.
pub mod version_manager;

/// Checksum Service: a deterministic fingerprint of a namespace's active
/// configuration.
pub mod checksum;

/// Snapshot Cache: an immutable, per-namespace bundle of active
/// configuration, pre-compiled for allocation-free interpretation.
pub mod snapshot;

/// Refresh Coordinator: background + inline-probe refresh of snapshots,
/// with per-namespace single-flight deduplication.
pub mod refresh;

/// Rule Interpreter: evaluates condition trees against an input document.
pub mod rule_interpreter;

/// Workflow Interpreter: walks a workflow's step graph, delegating
/// decision nodes to the Rule Interpreter.
pub mod workflow_interpreter;

/// Execution Service: the façade tying snapshot freshness to
/// interpretation and shaping the final response.
pub mod execution;
