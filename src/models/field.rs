// Field: one entry in a namespace's typed schema. Type is immutable after
// creation — changing it would silently invalidate every rule referencing
// the field.

use serde::{Deserialize, Serialize};

use super::ids::{FieldId, NamespaceId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    String,
    Number,
    Boolean,
    Date,
}

impl FieldType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
        }
    }

    pub fn parse(s: &str) -> Option<FieldType> {
        match s {
            "string" => Some(FieldType::String),
            "number" => Some(FieldType::Number),
            "boolean" => Some(FieldType::Boolean),
            "date" => Some(FieldType::Date),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FieldDef {
    pub namespace: NamespaceId,
    pub id: FieldId,
    #[serde(rename = "type")]
    pub field_type: FieldType,
    pub description: String,
}

impl FieldDef {
    pub fn new(namespace: NamespaceId, id: FieldId, field_type: FieldType, description: impl Into<String>) -> Self {
        FieldDef {
            namespace,
            id,
            field_type,
            description: description.into(),
        }
    }
}
