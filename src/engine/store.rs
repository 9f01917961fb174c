// Storage abstraction for the configuration lifecycle engine.
//
// ## Rust Learning Notes:
//
// This mirrors the teacher's repository-pattern storage trait: a single
// async trait describes every operation the rest of the engine needs, and
// `InMemoryStore` is the one concrete implementation this crate ships
// (development/testing; a production deployment would back `Store` with a
// relational database, as the specification's reference backing does, but
// that adapter lives outside this crate).

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::Mutex;

use crate::models::{
    FieldDef, FieldId, FunctionDef, FunctionId, NamespaceDef, NamespaceId, RuleDef, RuleId, TerminalDef, TerminalId,
    VersionMeta, WorkflowDef, WorkflowId,
};
use crate::{Error, Result};

/// A reference to one logical entity id within a namespace, used when an
/// error needs to name what it was looking for.
#[derive(Debug, Clone)]
pub struct EntityRef {
    pub namespace: NamespaceId,
    pub id: String,
}

/// Storage trait every backing implementation of the Store must satisfy.
/// CRUD per entity plus the two cross-cutting operations the Version
/// Manager and Checksum Service depend on: `get_max_version` (monotonic
/// version allocation) and the active-config checksum row.
#[async_trait]
pub trait Store: Send + Sync {
    async fn create_namespace(&self, ns: NamespaceDef) -> Result<NamespaceDef>;
    async fn get_namespace(&self, id: &NamespaceId) -> Result<Option<NamespaceDef>>;
    async fn delete_namespace(&self, id: &NamespaceId) -> Result<()>;

    async fn create_field(&self, field: FieldDef) -> Result<FieldDef>;
    async fn get_field(&self, ns: &NamespaceId, id: &FieldId) -> Result<Option<FieldDef>>;
    async fn list_fields(&self, ns: &NamespaceId) -> Result<Vec<FieldDef>>;

    async fn create_terminal(&self, terminal: TerminalDef) -> Result<TerminalDef>;
    async fn get_terminal(&self, ns: &NamespaceId, id: &TerminalId) -> Result<Option<TerminalDef>>;
    async fn list_terminals(&self, ns: &NamespaceId) -> Result<Vec<TerminalDef>>;
    async fn delete_terminal(&self, ns: &NamespaceId, id: &TerminalId) -> Result<()>;

    async fn create_function(&self, function: FunctionDef) -> Result<FunctionDef>;
    async fn update_function(&self, function: FunctionDef) -> Result<FunctionDef>;
    async fn get_function_draft(&self, ns: &NamespaceId, id: &FunctionId) -> Result<Option<FunctionDef>>;
    async fn get_function_active(&self, ns: &NamespaceId, id: &FunctionId) -> Result<Option<FunctionDef>>;
    async fn list_active_functions(&self, ns: &NamespaceId) -> Result<Vec<FunctionDef>>;
    async fn get_max_function_version(&self, ns: &NamespaceId, id: &FunctionId) -> Result<u64>;
    async fn delete_function_draft(&self, ns: &NamespaceId, id: &FunctionId) -> Result<()>;

    async fn create_rule(&self, rule: RuleDef) -> Result<RuleDef>;
    async fn update_rule(&self, rule: RuleDef) -> Result<RuleDef>;
    async fn get_rule_draft(&self, ns: &NamespaceId, id: &RuleId) -> Result<Option<RuleDef>>;
    async fn get_rule_active(&self, ns: &NamespaceId, id: &RuleId) -> Result<Option<RuleDef>>;
    async fn list_active_rules(&self, ns: &NamespaceId) -> Result<Vec<RuleDef>>;
    async fn get_max_rule_version(&self, ns: &NamespaceId, id: &RuleId) -> Result<u64>;
    async fn delete_rule_draft(&self, ns: &NamespaceId, id: &RuleId) -> Result<()>;

    async fn create_workflow(&self, workflow: WorkflowDef) -> Result<WorkflowDef>;
    async fn update_workflow(&self, workflow: WorkflowDef) -> Result<WorkflowDef>;
    async fn get_workflow_draft(&self, ns: &NamespaceId, id: &WorkflowId) -> Result<Option<WorkflowDef>>;
    async fn get_workflow_active(&self, ns: &NamespaceId, id: &WorkflowId) -> Result<Option<WorkflowDef>>;
    async fn list_active_workflows(&self, ns: &NamespaceId) -> Result<Vec<WorkflowDef>>;
    async fn get_max_workflow_version(&self, ns: &NamespaceId, id: &WorkflowId) -> Result<u64>;
    async fn delete_workflow_draft(&self, ns: &NamespaceId, id: &WorkflowId) -> Result<()>;

    async fn upsert_active_checksum(&self, ns: &NamespaceId, checksum: String) -> Result<()>;
    async fn get_active_checksum(&self, ns: &NamespaceId) -> Result<Option<String>>;

    /// All namespace ids this store currently knows about, for the
    /// Refresh Coordinator's background sweep.
    async fn list_namespace_ids(&self) -> Result<Vec<NamespaceId>>;

    /// Runs `work` against this store with serialisable or snapshot
    /// isolation within `ns`: if `work` returns `Err`, every write `work`
    /// made within that namespace is rolled back before the error
    /// propagates, as if `work` had never run. The Version Manager wraps
    /// its deactivate-then-activate-then-checksum publish sequence in this
    /// so a failure partway through never leaves a namespace with two
    /// active versions of the same entity, or an active entity and a stale
    /// checksum.
    ///
    /// This carries a `Self: Sized` bound (a closure that needs to call
    /// back into a second `&Self` can't be made part of a `dyn`-safe
    /// trait), which `async-trait` honours by leaving it as an ordinary,
    /// unboxed `async fn` rather than desugaring it to a boxed future like
    /// every other method here. The default implementation provides no
    /// actual isolation — it exists so any future backing store has the
    /// hook without being forced to implement rollback on day one.
    /// `InMemoryStore` overrides it with a real snapshot/restore.
    async fn within_transaction<'a, F, Fut>(&'a self, ns: &NamespaceId, work: F) -> Result<()>
    where
        F: FnOnce(&'a Self) -> Fut + Send + 'a,
        Fut: Future<Output = Result<()>> + Send + 'a,
        Self: Sized,
    {
        let _ = ns;
        work(self).await
    }
}

/// Every versioned entity type keeps a `Vec<T>` of all versions ever
/// created (draft, active, inactive) per `(namespace, id)`, mirroring how a
/// relational backing would keep the full history in one table keyed by
/// `(namespace, id, version)`. Draft/active lookups filter this list by
/// status; deletion is only permitted on a draft row (enforced one layer
/// up, by the Version Manager).
struct VersionedTable<T> {
    rows: RwLock<HashMap<(NamespaceId, String), Vec<T>>>,
}

impl<T> Default for VersionedTable<T> {
    fn default() -> Self {
        VersionedTable { rows: RwLock::new(HashMap::new()) }
    }
}

impl<T: Clone> VersionedTable<T> {
    fn new() -> Self {
        VersionedTable { rows: RwLock::new(HashMap::new()) }
    }

    fn insert(&self, ns: &NamespaceId, id: &str, row: T) {
        let mut rows = self.rows.write().unwrap();
        rows.entry((ns.clone(), id.to_string())).or_default().push(row);
    }

    fn replace_matching(&self, ns: &NamespaceId, id: &str, matches: impl Fn(&T) -> bool, new_row: T) {
        let mut rows = self.rows.write().unwrap();
        if let Some(versions) = rows.get_mut(&(ns.clone(), id.to_string())) {
            if let Some(slot) = versions.iter_mut().find(|v| matches(v)) {
                *slot = new_row;
            }
        }
    }

    fn retain(&self, ns: &NamespaceId, id: &str, keep: impl Fn(&T) -> bool) {
        let mut rows = self.rows.write().unwrap();
        if let Some(versions) = rows.get_mut(&(ns.clone(), id.to_string())) {
            versions.retain(keep);
        }
    }

    fn find(&self, ns: &NamespaceId, id: &str, matches: impl Fn(&T) -> bool) -> Option<T> {
        let rows = self.rows.read().unwrap();
        rows.get(&(ns.clone(), id.to_string()))?.iter().find(|v| matches(v)).cloned()
    }

    fn all_for_namespace(&self, ns: &NamespaceId, matches: impl Fn(&T) -> bool) -> Vec<T> {
        let rows = self.rows.read().unwrap();
        rows.iter()
            .filter(|((row_ns, _), _)| row_ns == ns)
            .flat_map(|(_, versions)| versions.iter().filter(|v| matches(v)).cloned())
            .collect()
    }

    fn max_version(&self, ns: &NamespaceId, id: &str, version_of: impl Fn(&T) -> u64) -> u64 {
        let rows = self.rows.read().unwrap();
        rows.get(&(ns.clone(), id.to_string()))
            .map(|versions| versions.iter().map(&version_of).max().unwrap_or(0))
            .unwrap_or(0)
    }

    /// Captures every row for `ns`, keyed by entity id, so a failed
    /// transaction can put them back exactly as they were.
    fn snapshot_namespace(&self, ns: &NamespaceId) -> Vec<(String, Vec<T>)> {
        let rows = self.rows.read().unwrap();
        rows.iter().filter(|((row_ns, _), _)| row_ns == ns).map(|((_, id), versions)| (id.clone(), versions.clone())).collect()
    }

    /// Restores `ns`'s rows to a prior `snapshot_namespace` capture,
    /// discarding anything written to `ns` since.
    fn restore_namespace(&self, ns: &NamespaceId, snapshot: Vec<(String, Vec<T>)>) {
        let mut rows = self.rows.write().unwrap();
        rows.retain(|(row_ns, _), _| row_ns != ns);
        for (id, versions) in snapshot {
            rows.insert((ns.clone(), id), versions);
        }
    }
}

/// In-memory `Store` implementation. Not persistent, not distributed — the
/// reference backing for development, testing and the bundled `admin` CLI.
#[derive(Default)]
pub struct InMemoryStore {
    namespaces: RwLock<HashMap<NamespaceId, NamespaceDef>>,
    fields: RwLock<HashMap<(NamespaceId, FieldId), FieldDef>>,
    terminals: RwLock<HashMap<(NamespaceId, TerminalId), TerminalDef>>,
    functions: VersionedTable<FunctionDef>,
    rules: VersionedTable<RuleDef>,
    workflows: VersionedTable<WorkflowDef>,
    checksums: RwLock<HashMap<NamespaceId, String>>,
    /// One lock per namespace, held for the duration of a
    /// `within_transaction` call so concurrent transactions against the
    /// same namespace serialise instead of interleaving their rollbacks.
    tx_locks: DashMap<NamespaceId, Arc<Mutex<()>>>,
}

impl InMemoryStore {
    pub fn new() -> Self {
        InMemoryStore {
            namespaces: RwLock::new(HashMap::new()),
            fields: RwLock::new(HashMap::new()),
            terminals: RwLock::new(HashMap::new()),
            functions: VersionedTable::new(),
            rules: VersionedTable::new(),
            workflows: VersionedTable::new(),
            checksums: RwLock::new(HashMap::new()),
            tx_locks: DashMap::new(),
        }
    }

    fn tx_lock_for(&self, ns: &NamespaceId) -> Arc<Mutex<()>> {
        self.tx_locks.entry(ns.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }
}

fn meta_of_function(f: &FunctionDef) -> &VersionMeta {
    &f.meta
}
fn meta_of_rule(r: &RuleDef) -> &VersionMeta {
    &r.meta
}
fn meta_of_workflow(w: &WorkflowDef) -> &VersionMeta {
    &w.meta
}

#[async_trait]
impl Store for InMemoryStore {
    async fn create_namespace(&self, ns: NamespaceDef) -> Result<NamespaceDef> {
        let mut namespaces = self.namespaces.write().unwrap();
        if namespaces.contains_key(&ns.id) {
            return Err(Error::AlreadyExists {
                kind: "namespace".to_string(),
                namespace: ns.id.to_string(),
                id: ns.id.to_string(),
            });
        }
        namespaces.insert(ns.id.clone(), ns.clone());
        Ok(ns)
    }

    async fn get_namespace(&self, id: &NamespaceId) -> Result<Option<NamespaceDef>> {
        Ok(self.namespaces.read().unwrap().get(id).cloned())
    }

    async fn delete_namespace(&self, id: &NamespaceId) -> Result<()> {
        let has_fields = self.fields.read().unwrap().keys().any(|(ns, _)| ns == id);
        let has_terminals = self.terminals.read().unwrap().keys().any(|(ns, _)| ns == id);
        let has_functions = !self.functions.all_for_namespace(id, |_| true).is_empty();
        let has_rules = !self.rules.all_for_namespace(id, |_| true).is_empty();
        let has_workflows = !self.workflows.all_for_namespace(id, |_| true).is_empty();
        if has_fields || has_terminals || has_functions || has_rules || has_workflows {
            return Err(Error::VersionConflict(format!(
                "namespace '{}' cannot be deleted while dependent entities exist",
                id
            )));
        }
        self.namespaces.write().unwrap().remove(id);
        self.checksums.write().unwrap().remove(id);
        Ok(())
    }

    async fn create_field(&self, field: FieldDef) -> Result<FieldDef> {
        let mut fields = self.fields.write().unwrap();
        let key = (field.namespace.clone(), field.id.clone());
        if fields.contains_key(&key) {
            return Err(Error::AlreadyExists {
                kind: "field".to_string(),
                namespace: field.namespace.to_string(),
                id: field.id.to_string(),
            });
        }
        fields.insert(key, field.clone());
        Ok(field)
    }

    async fn get_field(&self, ns: &NamespaceId, id: &FieldId) -> Result<Option<FieldDef>> {
        Ok(self.fields.read().unwrap().get(&(ns.clone(), id.clone())).cloned())
    }

    async fn list_fields(&self, ns: &NamespaceId) -> Result<Vec<FieldDef>> {
        Ok(self
            .fields
            .read()
            .unwrap()
            .iter()
            .filter(|((row_ns, _), _)| row_ns == ns)
            .map(|(_, f)| f.clone())
            .collect())
    }

    async fn create_terminal(&self, terminal: TerminalDef) -> Result<TerminalDef> {
        let mut terminals = self.terminals.write().unwrap();
        let key = (terminal.namespace.clone(), terminal.id.clone());
        if terminals.contains_key(&key) {
            return Err(Error::AlreadyExists {
                kind: "terminal".to_string(),
                namespace: terminal.namespace.to_string(),
                id: terminal.id.to_string(),
            });
        }
        terminals.insert(key, terminal.clone());
        Ok(terminal)
    }

    async fn get_terminal(&self, ns: &NamespaceId, id: &TerminalId) -> Result<Option<TerminalDef>> {
        Ok(self.terminals.read().unwrap().get(&(ns.clone(), id.clone())).cloned())
    }

    async fn list_terminals(&self, ns: &NamespaceId) -> Result<Vec<TerminalDef>> {
        Ok(self
            .terminals
            .read()
            .unwrap()
            .iter()
            .filter(|((row_ns, _), _)| row_ns == ns)
            .map(|(_, t)| t.clone())
            .collect())
    }

    async fn delete_terminal(&self, ns: &NamespaceId, id: &TerminalId) -> Result<()> {
        self.terminals.write().unwrap().remove(&(ns.clone(), id.clone()));
        Ok(())
    }

    async fn create_function(&self, function: FunctionDef) -> Result<FunctionDef> {
        self.functions.insert(&function.namespace, function.id.as_str(), function.clone());
        Ok(function)
    }

    async fn update_function(&self, function: FunctionDef) -> Result<FunctionDef> {
        self.functions.replace_matching(
            &function.namespace,
            function.id.as_str(),
            |f| f.meta.version == function.meta.version,
            function.clone(),
        );
        Ok(function)
    }

    async fn get_function_draft(&self, ns: &NamespaceId, id: &FunctionId) -> Result<Option<FunctionDef>> {
        Ok(self.functions.find(ns, id.as_str(), |f| f.meta.is_draft()))
    }

    async fn get_function_active(&self, ns: &NamespaceId, id: &FunctionId) -> Result<Option<FunctionDef>> {
        Ok(self.functions.find(ns, id.as_str(), |f| f.meta.is_active()))
    }

    async fn list_active_functions(&self, ns: &NamespaceId) -> Result<Vec<FunctionDef>> {
        Ok(self.functions.all_for_namespace(ns, |f| f.meta.is_active()))
    }

    async fn get_max_function_version(&self, ns: &NamespaceId, id: &FunctionId) -> Result<u64> {
        Ok(self.functions.max_version(ns, id.as_str(), |f| meta_of_function(f).version))
    }

    async fn delete_function_draft(&self, ns: &NamespaceId, id: &FunctionId) -> Result<()> {
        self.functions.retain(ns, id.as_str(), |f| !f.meta.is_draft());
        Ok(())
    }

    async fn create_rule(&self, rule: RuleDef) -> Result<RuleDef> {
        self.rules.insert(&rule.namespace, rule.id.as_str(), rule.clone());
        Ok(rule)
    }

    async fn update_rule(&self, rule: RuleDef) -> Result<RuleDef> {
        self.rules.replace_matching(&rule.namespace, rule.id.as_str(), |r| r.meta.version == rule.meta.version, rule.clone());
        Ok(rule)
    }

    async fn get_rule_draft(&self, ns: &NamespaceId, id: &RuleId) -> Result<Option<RuleDef>> {
        Ok(self.rules.find(ns, id.as_str(), |r| r.meta.is_draft()))
    }

    async fn get_rule_active(&self, ns: &NamespaceId, id: &RuleId) -> Result<Option<RuleDef>> {
        Ok(self.rules.find(ns, id.as_str(), |r| r.meta.is_active()))
    }

    async fn list_active_rules(&self, ns: &NamespaceId) -> Result<Vec<RuleDef>> {
        Ok(self.rules.all_for_namespace(ns, |r| r.meta.is_active()))
    }

    async fn get_max_rule_version(&self, ns: &NamespaceId, id: &RuleId) -> Result<u64> {
        Ok(self.rules.max_version(ns, id.as_str(), |r| meta_of_rule(r).version))
    }

    async fn delete_rule_draft(&self, ns: &NamespaceId, id: &RuleId) -> Result<()> {
        self.rules.retain(ns, id.as_str(), |r| !r.meta.is_draft());
        Ok(())
    }

    async fn create_workflow(&self, workflow: WorkflowDef) -> Result<WorkflowDef> {
        self.workflows.insert(&workflow.namespace, workflow.id.as_str(), workflow.clone());
        Ok(workflow)
    }

    async fn update_workflow(&self, workflow: WorkflowDef) -> Result<WorkflowDef> {
        self.workflows.replace_matching(
            &workflow.namespace,
            workflow.id.as_str(),
            |w| w.meta.version == workflow.meta.version,
            workflow.clone(),
        );
        Ok(workflow)
    }

    async fn get_workflow_draft(&self, ns: &NamespaceId, id: &WorkflowId) -> Result<Option<WorkflowDef>> {
        Ok(self.workflows.find(ns, id.as_str(), |w| w.meta.is_draft()))
    }

    async fn get_workflow_active(&self, ns: &NamespaceId, id: &WorkflowId) -> Result<Option<WorkflowDef>> {
        Ok(self.workflows.find(ns, id.as_str(), |w| w.meta.is_active()))
    }

    async fn list_active_workflows(&self, ns: &NamespaceId) -> Result<Vec<WorkflowDef>> {
        Ok(self.workflows.all_for_namespace(ns, |w| w.meta.is_active()))
    }

    async fn get_max_workflow_version(&self, ns: &NamespaceId, id: &WorkflowId) -> Result<u64> {
        Ok(self.workflows.max_version(ns, id.as_str(), |w| meta_of_workflow(w).version))
    }

    async fn delete_workflow_draft(&self, ns: &NamespaceId, id: &WorkflowId) -> Result<()> {
        self.workflows.retain(ns, id.as_str(), |w| !w.meta.is_draft());
        Ok(())
    }

    async fn upsert_active_checksum(&self, ns: &NamespaceId, checksum: String) -> Result<()> {
        self.checksums.write().unwrap().insert(ns.clone(), checksum);
        Ok(())
    }

    async fn get_active_checksum(&self, ns: &NamespaceId) -> Result<Option<String>> {
        Ok(self.checksums.read().unwrap().get(ns).cloned())
    }

    async fn list_namespace_ids(&self) -> Result<Vec<NamespaceId>> {
        Ok(self.namespaces.read().unwrap().keys().cloned().collect())
    }

    async fn within_transaction<'a, F, Fut>(&'a self, ns: &NamespaceId, work: F) -> Result<()>
    where
        F: FnOnce(&'a Self) -> Fut + Send + 'a,
        Fut: Future<Output = Result<()>> + Send + 'a,
        Self: Sized,
    {
        let lock = self.tx_lock_for(ns);
        let _guard = lock.lock().await;

        let functions_before = self.functions.snapshot_namespace(ns);
        let rules_before = self.rules.snapshot_namespace(ns);
        let workflows_before = self.workflows.snapshot_namespace(ns);
        let checksum_before = self.checksums.read().unwrap().get(ns).cloned();

        match work(self).await {
            Ok(()) => Ok(()),
            Err(e) => {
                self.functions.restore_namespace(ns, functions_before);
                self.rules.restore_namespace(ns, rules_before);
                self.workflows.restore_namespace(ns, workflows_before);
                let mut checksums = self.checksums.write().unwrap();
                match checksum_before {
                    Some(c) => {
                        checksums.insert(ns.clone(), c);
                    }
                    None => {
                        checksums.remove(ns);
                    }
                }
                Err(e)
            }
        }
    }
}
