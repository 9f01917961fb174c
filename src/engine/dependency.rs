// Dependency Resolver: given a draft rule/workflow being promoted, confirms
// every external reference resolves to an active, same-namespace entity.
// Unlike `validators`, this component touches the Store — it needs to know
// what is currently active.

use thiserror::Error;

use crate::models::{ConditionTree, FieldType, NamespaceId, Operator, ReturnType, RuleDef, WorkflowDef, WorkflowStepDef};
use crate::Result;

use super::store::Store;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{kind}: {entity} references '{referent}', which is not active in this namespace")]
pub struct DependencyError {
    pub kind: String,
    pub entity: String,
    pub referent: String,
}

impl DependencyError {
    fn new(kind: impl Into<String>, entity: impl Into<String>, referent: impl Into<String>) -> Self {
        DependencyError { kind: kind.into(), entity: entity.into(), referent: referent.into() }
    }
}

pub struct DependencyResolver<'a, S: Store + ?Sized> {
    store: &'a S,
}

impl<'a, S: Store + ?Sized> DependencyResolver<'a, S> {
    pub fn new(store: &'a S) -> Self {
        DependencyResolver { store }
    }

    /// Every `field` leaf resolves to an active field of a type compatible
    /// with its operator; every `function` leaf resolves to an active
    /// function whose `returnType` is compatible with the operator and
    /// whose `args` all resolve to active numeric fields.
    pub async fn resolve_rule(&self, ns: &NamespaceId, rule: &RuleDef) -> Result<()> {
        for condition in &rule.conditions {
            self.resolve_condition(ns, rule.id.as_str(), condition).await?;
        }
        Ok(())
    }

    async fn resolve_condition(&self, ns: &NamespaceId, rule_id: &str, tree: &ConditionTree) -> Result<()> {
        match tree {
            ConditionTree::Field { field_id, operator, .. } => {
                let field = self
                    .store
                    .get_field(ns, field_id)
                    .await?
                    .ok_or_else(|| DependencyError::new("field", rule_id, field_id.as_str()))?;
                if !operator_compatible_with_field_type(*operator, field.field_type) {
                    return Err(DependencyError::new(
                        "field-operator",
                        rule_id,
                        format!("{} ({})", field_id, operator.as_str()),
                    )
                    .into());
                }
                Ok(())
            }
            ConditionTree::Function { function_id, operator, .. } => {
                let function = self
                    .store
                    .get_function_active(ns, function_id)
                    .await?
                    .ok_or_else(|| DependencyError::new("function", rule_id, function_id.as_str()))?;

                match function.return_type {
                    ReturnType::Bool if !operator.is_equality() => {
                        return Err(DependencyError::new(
                            "function-operator",
                            rule_id,
                            format!("{} ({})", function_id, operator.as_str()),
                        )
                        .into());
                    }
                    ReturnType::Number if operator.is_string_only() => {
                        return Err(DependencyError::new(
                            "function-operator",
                            rule_id,
                            format!("{} ({})", function_id, operator.as_str()),
                        )
                        .into());
                    }
                    _ => {}
                }

                for arg in &function.args {
                    let field = self
                        .store
                        .get_field(ns, arg)
                        .await?
                        .ok_or_else(|| DependencyError::new("function-arg", function_id.as_str(), arg.as_str()))?;
                    if field.field_type != FieldType::Number {
                        return Err(DependencyError::new("function-arg-type", function_id.as_str(), arg.as_str()).into());
                    }
                }
                Ok(())
            }
            ConditionTree::Group { conditions, .. } => {
                for c in conditions {
                    Box::pin(self.resolve_condition(ns, rule_id, c)).await?;
                }
                Ok(())
            }
        }
    }

    /// Every `rule` step resolves to an active rule; every `terminal` step
    /// resolves to an existing terminal in the namespace.
    pub async fn resolve_workflow(&self, ns: &NamespaceId, workflow: &WorkflowDef) -> Result<()> {
        for step in workflow.steps.values() {
            match step {
                WorkflowStepDef::Rule { rule_id, .. } => {
                    self.store
                        .get_rule_active(ns, rule_id)
                        .await?
                        .ok_or_else(|| DependencyError::new("rule", workflow.id.as_str(), rule_id.as_str()))?;
                }
                WorkflowStepDef::Terminal { terminal_id } => {
                    self.store
                        .get_terminal(ns, terminal_id)
                        .await?
                        .ok_or_else(|| DependencyError::new("terminal", workflow.id.as_str(), terminal_id.as_str()))?;
                }
                WorkflowStepDef::Unknown => {
                    return Err(DependencyError::new("step", workflow.id.as_str(), "<unknown step type>").into());
                }
            }
        }
        Ok(())
    }
}

fn operator_compatible_with_field_type(operator: Operator, field_type: FieldType) -> bool {
    match field_type {
        FieldType::String => operator.is_equality() || operator.is_string_only(),
        FieldType::Boolean => operator.is_equality(),
        FieldType::Number | FieldType::Date => operator.is_equality() || operator.is_ordering(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::store::InMemoryStore;
    use crate::models::{FieldDef, FieldId, FunctionDef, FunctionId, FunctionType, Logic, RuleId};

    #[tokio::test]
    async fn resolves_active_field_reference() {
        let store = InMemoryStore::new();
        let ns = NamespaceId::from("ns1");
        store
            .create_field(FieldDef::new(ns.clone(), FieldId::from("income"), FieldType::Number, ""))
            .await
            .unwrap();

        let rule = RuleDef::new_draft(
            ns.clone(),
            RuleId::from("r1"),
            Logic::And,
            vec![ConditionTree::field_condition(FieldId::from("income"), Operator::Ge, serde_json::json!(50000))],
            1,
            "alice",
        );

        let resolver = DependencyResolver::new(&store);
        assert!(resolver.resolve_rule(&ns, &rule).await.is_ok());
    }

    #[tokio::test]
    async fn missing_field_is_a_dependency_error() {
        let store = InMemoryStore::new();
        let ns = NamespaceId::from("ns1");
        let rule = RuleDef::new_draft(
            ns.clone(),
            RuleId::from("r1"),
            Logic::And,
            vec![ConditionTree::field_condition(FieldId::from("income"), Operator::Ge, serde_json::json!(50000))],
            1,
            "alice",
        );
        let resolver = DependencyResolver::new(&store);
        assert!(resolver.resolve_rule(&ns, &rule).await.is_err());
    }

    #[tokio::test]
    async fn function_args_must_be_numeric_fields() {
        let store = InMemoryStore::new();
        let ns = NamespaceId::from("ns1");
        store
            .create_field(FieldDef::new(ns.clone(), FieldId::from("name"), FieldType::String, ""))
            .await
            .unwrap();
        let mut func = FunctionDef::new_draft(ns.clone(), FunctionId::from("max_name"), FunctionType::Max, vec![FieldId::from("name")], vec![], 1, "alice");
        func.meta.publish("alice");
        store.create_function(func).await.unwrap();

        let rule = RuleDef::new_draft(
            ns.clone(),
            RuleId::from("r1"),
            Logic::And,
            vec![ConditionTree::function_condition(FunctionId::from("max_name"), Operator::Ge, serde_json::json!(1))],
            1,
            "alice",
        );
        let resolver = DependencyResolver::new(&store);
        assert!(resolver.resolve_rule(&ns, &rule).await.is_err());
    }
}
