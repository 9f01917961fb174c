// Namespace: the tenant isolation boundary. Every other entity lives inside
// exactly one namespace and ids are only unique within it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::NamespaceId;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NamespaceDef {
    pub id: NamespaceId,
    pub description: String,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
}

impl NamespaceDef {
    pub fn new(id: NamespaceId, description: impl Into<String>, created_by: impl Into<String>) -> Self {
        NamespaceDef {
            id,
            description: description.into(),
            created_at: Utc::now(),
            created_by: created_by.into(),
        }
    }
}

/// The per-namespace checksum row the Checksum Service maintains and the
/// Refresh Coordinator probes against.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ActiveConfigMeta {
    pub namespace: NamespaceId,
    pub checksum: String,
    pub updated_at: DateTime<Utc>,
}

impl ActiveConfigMeta {
    pub fn new(namespace: NamespaceId, checksum: String) -> Self {
        ActiveConfigMeta {
            namespace,
            checksum,
            updated_at: Utc::now(),
        }
    }
}
