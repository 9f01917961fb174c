// Version Manager: the draft -> active -> inactive state machine, shared
// (generically, via three thin per-entity methods) across functions, rules
// and workflows.
//
// ## Rust Learning Notes:
//
// ### Per-namespace write locking
// A single global mutex would serialise every tenant's publishes against
// each other, which the specification explicitly rejects. Instead we keep
// one `tokio::sync::Mutex` per namespace in a `DashMap`, mirroring how the
// Snapshot Cache keeps one entry per namespace — `entry(ns).or_default()`
// creates the per-namespace lock lazily and never removes it, which is
// fine: the number of namespaces is small relative to request volume.

use dashmap::DashMap;
use tokio::sync::Mutex;
use tracing::info;

use crate::engine::checksum::ChecksumService;
use crate::engine::dependency::DependencyResolver;
use crate::engine::store::Store;
use crate::models::{FunctionDef, NamespaceId, RuleDef, WorkflowDef};
use crate::validators::{validate_function, validate_rule, validate_workflow_shape};
use crate::{Error, Result};

pub struct VersionManager<S: Store> {
    store: std::sync::Arc<S>,
    namespace_locks: DashMap<NamespaceId, std::sync::Arc<Mutex<()>>>,
    max_condition_depth: usize,
}

impl<S: Store> VersionManager<S> {
    pub fn new(store: std::sync::Arc<S>, max_condition_depth: usize) -> Self {
        VersionManager { store, namespace_locks: DashMap::new(), max_condition_depth }
    }

    fn lock_for(&self, ns: &NamespaceId) -> std::sync::Arc<Mutex<()>> {
        self.namespace_locks.entry(ns.clone()).or_insert_with(|| std::sync::Arc::new(Mutex::new(()))).clone()
    }

    // ---- Function lifecycle -------------------------------------------------

    pub async fn create_function(&self, ns: &NamespaceId, mut function: FunctionDef) -> Result<FunctionDef> {
        let lock = self.lock_for(ns);
        let _guard = lock.lock().await;

        if self.store.get_namespace(ns).await?.is_none() {
            return Err(Error::NamespaceNotFound { namespace: ns.to_string() });
        }
        if self.store.get_function_draft(ns, &function.id).await?.is_some() {
            return Err(Error::AlreadyExists { kind: "function".to_string(), namespace: ns.to_string(), id: function.id.to_string() });
        }
        validate_function(&function)?;

        let next_version = self.store.get_max_function_version(ns, &function.id).await? + 1;
        function.meta.version = next_version;
        self.store.create_function(function).await
    }

    pub async fn publish_function(&self, ns: &NamespaceId, id: &crate::models::FunctionId, published_by: &str) -> Result<FunctionDef> {
        let lock = self.lock_for(ns);
        let _guard = lock.lock().await;

        let mut draft = self
            .store
            .get_function_draft(ns, id)
            .await?
            .ok_or_else(|| Error::NotFound { kind: "function draft".to_string(), namespace: ns.to_string(), id: id.to_string() })?;

        // Functions only reference fields, which are always resolvable
        // structurally (there is no further cross-entity dependency to
        // check here beyond what ValidateFunction already enforced), but we
        // still run through the same publish transaction shape as rules and
        // workflows for consistency.
        validate_function(&draft)?;
        draft.meta.publish(published_by);

        let published_id = id.clone();
        let published = self
            .store
            .within_transaction(ns, move |store| async move {
                if let Some(mut prior_active) = store.get_function_active(ns, &published_id).await? {
                    prior_active.meta.deactivate();
                    store.update_function(prior_active).await?;
                }
                store.update_function(draft).await?;
                ChecksumService::new(store).refresh(ns).await?;
                Ok(())
            })
            .await;
        published?;

        let published = self.store.get_function_active(ns, id).await?.ok_or_else(|| {
            Error::Internal(format!("function '{}' not active in namespace '{}' immediately after publish", id, ns))
        })?;
        info!(namespace = %ns, function = %id, version = published.meta.version, "published function");
        Ok(published)
    }

    pub async fn delete_function_draft(&self, ns: &NamespaceId, id: &crate::models::FunctionId) -> Result<()> {
        let lock = self.lock_for(ns);
        let _guard = lock.lock().await;
        match self.store.get_function_draft(ns, id).await? {
            Some(_) => self.store.delete_function_draft(ns, id).await,
            None => Err(Error::NotFound { kind: "function draft".to_string(), namespace: ns.to_string(), id: id.to_string() }),
        }
    }

    // ---- Rule lifecycle ------------------------------------------------------

    pub async fn create_rule(&self, ns: &NamespaceId, mut rule: RuleDef) -> Result<RuleDef> {
        let lock = self.lock_for(ns);
        let _guard = lock.lock().await;

        if self.store.get_namespace(ns).await?.is_none() {
            return Err(Error::NamespaceNotFound { namespace: ns.to_string() });
        }
        if self.store.get_rule_draft(ns, &rule.id).await?.is_some() {
            return Err(Error::AlreadyExists { kind: "rule".to_string(), namespace: ns.to_string(), id: rule.id.to_string() });
        }
        validate_rule(&rule, self.max_condition_depth)?;

        let next_version = self.store.get_max_rule_version(ns, &rule.id).await? + 1;
        rule.meta.version = next_version;
        self.store.create_rule(rule).await
    }

    /// Atomically: (i) re-validate against the current active set via the
    /// Dependency Resolver, (ii) activate the draft, (iii) deactivate the
    /// prior active version if any, (iv) refresh the namespace checksum. If
    /// dependency resolution fails the draft is left untouched.
    pub async fn publish_rule(&self, ns: &NamespaceId, id: &crate::models::RuleId, published_by: &str) -> Result<RuleDef> {
        let lock = self.lock_for(ns);
        let _guard = lock.lock().await;

        let mut draft = self
            .store
            .get_rule_draft(ns, id)
            .await?
            .ok_or_else(|| Error::NotFound { kind: "rule draft".to_string(), namespace: ns.to_string(), id: id.to_string() })?;

        validate_rule(&draft, self.max_condition_depth)?;
        DependencyResolver::new(self.store.as_ref()).resolve_rule(ns, &draft).await?;
        draft.meta.publish(published_by);

        let published_id = id.clone();
        let published = self
            .store
            .within_transaction(ns, move |store| async move {
                if let Some(mut prior_active) = store.get_rule_active(ns, &published_id).await? {
                    prior_active.meta.deactivate();
                    store.update_rule(prior_active).await?;
                }
                store.update_rule(draft).await?;
                ChecksumService::new(store).refresh(ns).await?;
                Ok(())
            })
            .await;
        published?;

        let published = self.store.get_rule_active(ns, id).await?.ok_or_else(|| {
            Error::Internal(format!("rule '{}' not active in namespace '{}' immediately after publish", id, ns))
        })?;
        info!(namespace = %ns, rule = %id, version = published.meta.version, "published rule");
        Ok(published)
    }

    pub async fn deactivate_rule(&self, ns: &NamespaceId, id: &crate::models::RuleId) -> Result<()> {
        let lock = self.lock_for(ns);
        let _guard = lock.lock().await;
        let mut active = self
            .store
            .get_rule_active(ns, id)
            .await?
            .ok_or_else(|| Error::NotFound { kind: "active rule".to_string(), namespace: ns.to_string(), id: id.to_string() })?;
        active.meta.deactivate();
        self.store.update_rule(active).await?;
        ChecksumService::new(self.store.as_ref()).refresh(ns).await?;
        Ok(())
    }

    pub async fn delete_rule_draft(&self, ns: &NamespaceId, id: &crate::models::RuleId) -> Result<()> {
        let lock = self.lock_for(ns);
        let _guard = lock.lock().await;
        match self.store.get_rule_draft(ns, id).await? {
            Some(_) => self.store.delete_rule_draft(ns, id).await,
            None => Err(Error::NotFound { kind: "rule draft".to_string(), namespace: ns.to_string(), id: id.to_string() }),
        }
    }

    // ---- Workflow lifecycle ---------------------------------------------------

    pub async fn create_workflow(&self, ns: &NamespaceId, mut workflow: WorkflowDef) -> Result<WorkflowDef> {
        let lock = self.lock_for(ns);
        let _guard = lock.lock().await;

        if self.store.get_namespace(ns).await?.is_none() {
            return Err(Error::NamespaceNotFound { namespace: ns.to_string() });
        }
        if self.store.get_workflow_draft(ns, &workflow.id).await?.is_some() {
            return Err(Error::AlreadyExists { kind: "workflow".to_string(), namespace: ns.to_string(), id: workflow.id.to_string() });
        }
        validate_workflow_shape(&workflow)?;

        let next_version = self.store.get_max_workflow_version(ns, &workflow.id).await? + 1;
        workflow.meta.version = next_version;
        self.store.create_workflow(workflow).await
    }

    pub async fn publish_workflow(&self, ns: &NamespaceId, id: &crate::models::WorkflowId, published_by: &str) -> Result<WorkflowDef> {
        let lock = self.lock_for(ns);
        let _guard = lock.lock().await;

        let mut draft = self
            .store
            .get_workflow_draft(ns, id)
            .await?
            .ok_or_else(|| Error::NotFound { kind: "workflow draft".to_string(), namespace: ns.to_string(), id: id.to_string() })?;

        validate_workflow_shape(&draft)?;
        DependencyResolver::new(self.store.as_ref()).resolve_workflow(ns, &draft).await?;
        draft.meta.publish(published_by);

        let published_id = id.clone();
        let published = self
            .store
            .within_transaction(ns, move |store| async move {
                if let Some(mut prior_active) = store.get_workflow_active(ns, &published_id).await? {
                    prior_active.meta.deactivate();
                    store.update_workflow(prior_active).await?;
                }
                store.update_workflow(draft).await?;
                ChecksumService::new(store).refresh(ns).await?;
                Ok(())
            })
            .await;
        published?;

        let published = self.store.get_workflow_active(ns, id).await?.ok_or_else(|| {
            Error::Internal(format!("workflow '{}' not active in namespace '{}' immediately after publish", id, ns))
        })?;
        info!(namespace = %ns, workflow = %id, version = published.meta.version, "published workflow");
        Ok(published)
    }

    pub async fn delete_workflow_draft(&self, ns: &NamespaceId, id: &crate::models::WorkflowId) -> Result<()> {
        let lock = self.lock_for(ns);
        let _guard = lock.lock().await;
        match self.store.get_workflow_draft(ns, id).await? {
            Some(_) => self.store.delete_workflow_draft(ns, id).await,
            None => Err(Error::NotFound { kind: "workflow draft".to_string(), namespace: ns.to_string(), id: id.to_string() }),
        }
    }

    // ---- Terminal lifecycle ----------------------------------------------------

    /// Deletes a terminal, refusing when any active workflow in the namespace
    /// still has a step referencing it (the same "cannot delete while
    /// dependent entities exist" shape `InMemoryStore::delete_namespace`
    /// enforces for namespaces with live entities).
    pub async fn delete_terminal(&self, ns: &NamespaceId, id: &crate::models::TerminalId) -> Result<()> {
        let lock = self.lock_for(ns);
        let _guard = lock.lock().await;

        let active_workflows = self.store.list_active_workflows(ns).await?;
        let referenced_by = active_workflows.iter().find(|w| {
            w.steps.values().any(|step| matches!(step, crate::models::WorkflowStepDef::Terminal { terminal_id } if terminal_id == id))
        });
        if let Some(workflow) = referenced_by {
            return Err(Error::VersionConflict(format!(
                "terminal '{}' is referenced by active workflow '{}' in namespace '{}' and cannot be deleted",
                id, workflow.id, ns
            )));
        }

        self.store.delete_terminal(ns, id).await
    }
}
