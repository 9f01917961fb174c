// Rule: a versioned boolean condition tree over the typed field schema.
//
// ## Rust Learning Notes:
//
// ### Tagged enums for a recursive wire shape
// `ConditionTree` mirrors the three shapes the condition grammar allows —
// `field`, `function`, `group` — with `#[serde(tag = "type")]` so the JSON
// on the wire carries an explicit discriminant (`"type": "field"`, etc.)
// rather than relying on field presence to disambiguate. `Group` is
// recursive (`Vec<ConditionTree>`), which is why it owns its children
// directly rather than through a `Box` — a `Vec` is already heap-indirect,
// so there's no infinite-size problem the way there would be with a
// self-referential struct field.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{FieldId, FunctionId, NamespaceId, RuleId};
use super::version::VersionMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Logic {
    And,
    Or,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Operator {
    #[serde(rename = "==")]
    Eq,
    #[serde(rename = "!=")]
    Ne,
    #[serde(rename = "<")]
    Lt,
    #[serde(rename = "<=")]
    Le,
    #[serde(rename = ">")]
    Gt,
    #[serde(rename = ">=")]
    Ge,
    #[serde(rename = "contains")]
    Contains,
    #[serde(rename = "startsWith")]
    StartsWith,
    #[serde(rename = "endsWith")]
    EndsWith,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Contains => "contains",
            Operator::StartsWith => "startsWith",
            Operator::EndsWith => "endsWith",
        }
    }

    /// Operators legal against a numeric or date field/function result.
    pub fn is_ordering(&self) -> bool {
        matches!(self, Operator::Lt | Operator::Le | Operator::Gt | Operator::Ge)
    }

    /// Operators legal against a string field.
    pub fn is_string_only(&self) -> bool {
        matches!(self, Operator::Contains | Operator::StartsWith | Operator::EndsWith)
    }

    pub fn is_equality(&self) -> bool {
        matches!(self, Operator::Eq | Operator::Ne)
    }
}

/// The recursive condition tree consumed by the Rule Interpreter.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ConditionTree {
    Field {
        #[serde(rename = "fieldId")]
        field_id: FieldId,
        operator: Operator,
        value: Value,
    },
    Function {
        #[serde(rename = "functionId")]
        function_id: FunctionId,
        operator: Operator,
        value: Value,
    },
    Group {
        logic: Logic,
        conditions: Vec<ConditionTree>,
    },
}

impl ConditionTree {
    /// Maximum nesting depth of this tree, leaves counting as depth 1.
    pub fn depth(&self) -> usize {
        match self {
            ConditionTree::Field { .. } | ConditionTree::Function { .. } => 1,
            ConditionTree::Group { conditions, .. } => {
                1 + conditions.iter().map(ConditionTree::depth).max().unwrap_or(0)
            }
        }
    }

    pub fn field_condition(field_id: impl Into<FieldId>, operator: Operator, value: Value) -> Self {
        ConditionTree::Field {
            field_id: field_id.into(),
            operator,
            value,
        }
    }

    pub fn function_condition(function_id: impl Into<FunctionId>, operator: Operator, value: Value) -> Self {
        ConditionTree::Function {
            function_id: function_id.into(),
            operator,
            value,
        }
    }

    pub fn group(logic: Logic, conditions: Vec<ConditionTree>) -> Self {
        ConditionTree::Group { logic, conditions }
    }
}

/// A draft or versioned rule definition, keyed by `(namespace, id, version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RuleDef {
    pub namespace: NamespaceId,
    pub id: RuleId,
    pub logic: Logic,
    pub conditions: Vec<ConditionTree>,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

impl RuleDef {
    pub fn new_draft(
        namespace: NamespaceId,
        id: RuleId,
        logic: Logic,
        conditions: Vec<ConditionTree>,
        version: u64,
        created_by: impl Into<String>,
    ) -> Self {
        RuleDef {
            namespace,
            id,
            logic,
            conditions,
            meta: VersionMeta::new_draft(version, created_by),
        }
    }

    /// Overall nesting depth of the rule's top-level condition list, as a
    /// single implicit group.
    pub fn depth(&self) -> usize {
        1 + self.conditions.iter().map(ConditionTree::depth).max().unwrap_or(0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn depth_counts_nested_groups() {
        let leaf = ConditionTree::field_condition(FieldId::from("income"), Operator::Ge, Value::from(1));
        assert_eq!(leaf.depth(), 1);

        let nested = ConditionTree::group(Logic::And, vec![leaf.clone(), ConditionTree::group(Logic::Or, vec![leaf])]);
        assert_eq!(nested.depth(), 3);
    }

    #[test]
    fn operator_classification() {
        assert!(Operator::Lt.is_ordering());
        assert!(!Operator::Contains.is_ordering());
        assert!(Operator::Contains.is_string_only());
        assert!(Operator::Eq.is_equality());
    }
}
