// Function: one version of a closed, enumerated aggregation/membership
// function. There are no user-defined functions — the library is exactly
// the four variants below (see GLOSSARY: "Function types").
//
// ## Rust Learning Notes:
//
// ### Why `args` and `values` are both present on every variant
// A single struct holds the union of fields every function type might need
// (`args` for field references, `values` for literals) rather than an enum
// with per-variant payloads. The shape constraints ("for max/sum/avg, args
// non-empty and values empty"; "for in, the reverse") are enforced by the
// Validator, not the type system — this mirrors how the teacher's
// `FunctionDefinition` keeps optional fields on one struct rather than
// splitting into a family of types, because the wire format (JSON) is a
// single shape with optional members.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::ids::{FieldId, FunctionId, NamespaceId};
use super::version::VersionMeta;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FunctionType {
    Max,
    Sum,
    Avg,
    In,
}

impl FunctionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FunctionType::Max => "max",
            FunctionType::Sum => "sum",
            FunctionType::Avg => "avg",
            FunctionType::In => "in",
        }
    }

    pub fn parse(s: &str) -> Option<FunctionType> {
        match s {
            "max" => Some(FunctionType::Max),
            "sum" => Some(FunctionType::Sum),
            "avg" => Some(FunctionType::Avg),
            "in" => Some(FunctionType::In),
            _ => None,
        }
    }

    /// `max`/`sum`/`avg` take field arguments and return a number; `in`
    /// takes literal values and returns a boolean.
    pub fn is_numeric_aggregate(&self) -> bool {
        matches!(self, FunctionType::Max | FunctionType::Sum | FunctionType::Avg)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReturnType {
    Number,
    Bool,
}

/// A draft or versioned function definition, keyed by `(namespace, id,
/// version)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FunctionDef {
    pub namespace: NamespaceId,
    pub id: FunctionId,
    #[serde(rename = "type")]
    pub function_type: FunctionType,
    /// Field-id arguments. Non-empty for max/sum/avg, empty for `in`.
    pub args: Vec<FieldId>,
    /// Literal values. Non-empty for `in`, empty for max/sum/avg.
    pub values: Vec<Value>,
    pub return_type: ReturnType,
    #[serde(flatten)]
    pub meta: VersionMeta,
}

impl FunctionDef {
    pub fn new_draft(
        namespace: NamespaceId,
        id: FunctionId,
        function_type: FunctionType,
        args: Vec<FieldId>,
        values: Vec<Value>,
        version: u64,
        created_by: impl Into<String>,
    ) -> Self {
        let return_type = if function_type.is_numeric_aggregate() {
            ReturnType::Number
        } else {
            ReturnType::Bool
        };
        FunctionDef {
            namespace,
            id,
            function_type,
            args,
            values,
            return_type,
            meta: VersionMeta::new_draft(version, created_by),
        }
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.meta.created_at
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_aggregate_classification() {
        assert!(FunctionType::Max.is_numeric_aggregate());
        assert!(FunctionType::Sum.is_numeric_aggregate());
        assert!(FunctionType::Avg.is_numeric_aggregate());
        assert!(!FunctionType::In.is_numeric_aggregate());
    }

    #[test]
    fn new_draft_infers_return_type() {
        let f = FunctionDef::new_draft(
            NamespaceId::from("ns1"),
            FunctionId::from("max_income"),
            FunctionType::Max,
            vec![FieldId::from("income")],
            vec![],
            1,
            "alice",
        );
        assert_eq!(f.return_type, ReturnType::Number);

        let g = FunctionDef::new_draft(
            NamespaceId::from("ns1"),
            FunctionId::from("allowed_states"),
            FunctionType::In,
            vec![],
            vec![Value::String("CA".into()), Value::String("NY".into())],
            1,
            "alice",
        );
        assert_eq!(g.return_type, ReturnType::Bool);
    }
}
