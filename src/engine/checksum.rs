// Checksum Service: a deterministic fingerprint of a namespace's active
// configuration. Two namespaces with byte-identical active configurations
// yield identical checksums; any change to any active entity changes it.

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::debug;

use crate::engine::store::Store;
use crate::models::{FieldDef, FunctionDef, NamespaceId, RuleDef, TerminalDef, WorkflowDef};
use crate::Result;

/// Canonical, timestamp-free projection of an entity used only to feed the
/// checksum. Timestamps are excluded deliberately — they would churn the
/// checksum without any semantic change to the active configuration.
#[derive(Serialize)]
struct CanonicalFunction<'a> {
    id: &'a str,
    version: u64,
    function_type: &'a str,
    args: Vec<&'a str>,
    values: &'a [serde_json::Value],
}

#[derive(Serialize)]
struct CanonicalRule<'a> {
    id: &'a str,
    version: u64,
    logic: &'a crate::models::Logic,
    conditions: &'a [crate::models::ConditionTree],
}

#[derive(Serialize)]
struct CanonicalWorkflow<'a> {
    id: &'a str,
    version: u64,
    start_at: &'a str,
    steps: std::collections::BTreeMap<&'a str, &'a crate::models::WorkflowStepDef>,
}

#[derive(Serialize)]
struct CanonicalField<'a> {
    id: &'a str,
    field_type: &'a crate::models::FieldType,
}

pub struct ChecksumService<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> ChecksumService<'a, S> {
    pub fn new(store: &'a S) -> Self {
        ChecksumService { store }
    }

    /// Recompute the checksum for `ns` as a pure function of its active
    /// entity set and persist it via `Store::upsert_active_checksum`.
    pub async fn refresh(&self, ns: &NamespaceId) -> Result<String> {
        let checksum = self.compute(ns).await?;
        self.store.upsert_active_checksum(ns, checksum.clone()).await?;
        debug!(namespace = %ns, checksum = %checksum, "recomputed active-config checksum");
        Ok(checksum)
    }

    /// Pure computation, with no side effects on the Store — exposed
    /// separately so callers (tests, the Refresh Coordinator's probe) can
    /// compare without mutating state.
    pub async fn compute(&self, ns: &NamespaceId) -> Result<String> {
        let mut functions = self.store.list_active_functions(ns).await?;
        functions.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        let mut rules = self.store.list_active_rules(ns).await?;
        rules.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        let mut workflows = self.store.list_active_workflows(ns).await?;
        workflows.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        let mut fields = self.store.list_fields(ns).await?;
        fields.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        let mut terminals = self.store.list_terminals(ns).await?;
        terminals.sort_by(|a, b| a.id.as_str().cmp(b.id.as_str()));

        let mut hasher = Sha256::new();
        hash_section(&mut hasher, "functions", &functions, canonical_function)?;
        hash_section(&mut hasher, "rules", &rules, canonical_rule)?;
        hash_section(&mut hasher, "workflows", &workflows, canonical_workflow)?;
        hash_section(&mut hasher, "fields", &fields, canonical_field)?;
        hash_section(&mut hasher, "terminals", &terminals, |t: &TerminalDef| t.id.to_string())?;

        Ok(hex::encode(hasher.finalize()))
    }
}

fn hash_section<'b, T, F, R>(hasher: &mut Sha256, label: &str, items: &'b [T], to_canonical: F) -> Result<()>
where
    F: Fn(&'b T) -> R,
    R: Serialize,
{
    hasher.update(label.as_bytes());
    hasher.update([0u8]); // domain separator between sections
    for item in items {
        let canonical = to_canonical(item);
        let bytes = serde_json::to_vec(&canonical)?;
        hasher.update(&bytes);
        hasher.update([0u8]); // domain separator between entries
    }
    Ok(())
}

fn canonical_function(f: &FunctionDef) -> CanonicalFunction<'_> {
    CanonicalFunction {
        id: f.id.as_str(),
        version: f.meta.version,
        function_type: f.function_type.as_str(),
        args: f.args.iter().map(|a| a.as_str()).collect(),
        values: &f.values,
    }
}

fn canonical_rule(r: &RuleDef) -> CanonicalRule<'_> {
    CanonicalRule {
        id: r.id.as_str(),
        version: r.meta.version,
        logic: &r.logic,
        conditions: &r.conditions,
    }
}

fn canonical_workflow(w: &WorkflowDef) -> CanonicalWorkflow<'_> {
    CanonicalWorkflow {
        id: w.id.as_str(),
        version: w.meta.version,
        start_at: w.start_at.as_str(),
        steps: w.steps.iter().map(|(k, v)| (k.as_str(), v)).collect(),
    }
}

fn canonical_field(f: &FieldDef) -> CanonicalField<'_> {
    CanonicalField { id: f.id.as_str(), field_type: &f.field_type }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::InMemoryStore;
    use crate::models::{FieldId, FieldType, FunctionId, FunctionType, NamespaceId};

    #[tokio::test]
    async fn identical_active_sets_yield_identical_checksums() {
        let store_a = InMemoryStore::new();
        let store_b = InMemoryStore::new();
        let ns = NamespaceId::from("ns1");

        for store in [&store_a, &store_b] {
            store.create_field(FieldDef::new(ns.clone(), FieldId::from("income"), FieldType::Number, "")).await.unwrap();
            let mut f = FunctionDef::new_draft(ns.clone(), FunctionId::from("max_income"), FunctionType::Max, vec![FieldId::from("income")], vec![], 1, "alice");
            f.meta.publish("alice");
            store.create_function(f).await.unwrap();
        }

        let a = ChecksumService::new(&store_a).compute(&ns).await.unwrap();
        let b = ChecksumService::new(&store_b).compute(&ns).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn a_changed_active_entity_changes_the_checksum() {
        let store = InMemoryStore::new();
        let ns = NamespaceId::from("ns1");
        store.create_field(FieldDef::new(ns.clone(), FieldId::from("income"), FieldType::Number, "")).await.unwrap();

        let before = ChecksumService::new(&store).compute(&ns).await.unwrap();

        let mut f = FunctionDef::new_draft(ns.clone(), FunctionId::from("max_income"), FunctionType::Max, vec![FieldId::from("income")], vec![], 1, "alice");
        f.meta.publish("alice");
        store.create_function(f).await.unwrap();

        let after = ChecksumService::new(&store).compute(&ns).await.unwrap();
        assert_ne!(before, after);
    }
}
