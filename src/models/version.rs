// The draft/active/inactive lifecycle shared by functions, rules and workflows.
//
// ## Rust Learning Notes:
//
// Every versioned entity (function, rule, workflow) goes through the same
// state machine, so the lifecycle lives here once rather than being
// re-derived per entity. `EntityStatus` is the state; `VersionMeta` is the
// bookkeeping every versioned row carries alongside its entity-specific
// payload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Where a single version of a logical entity sits in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityStatus {
    Draft,
    Active,
    Inactive,
}

/// Version/lifecycle bookkeeping attached to every function/rule/workflow row.
///
/// `version` is monotonic per logical id within a namespace: Create always
/// allocates `max_version(id) + 1`, even if earlier versions were deleted,
/// so gaps are permitted but version numbers never repeat or go backwards.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VersionMeta {
    pub version: u64,
    pub status: EntityStatus,
    pub created_at: DateTime<Utc>,
    pub created_by: String,
    pub published_at: Option<DateTime<Utc>>,
    pub published_by: Option<String>,
}

impl VersionMeta {
    pub fn new_draft(version: u64, created_by: impl Into<String>) -> Self {
        VersionMeta {
            version,
            status: EntityStatus::Draft,
            created_at: Utc::now(),
            created_by: created_by.into(),
            published_at: None,
            published_by: None,
        }
    }

    pub fn is_draft(&self) -> bool {
        self.status == EntityStatus::Draft
    }

    pub fn is_active(&self) -> bool {
        self.status == EntityStatus::Active
    }

    pub fn publish(&mut self, published_by: impl Into<String>) {
        self.status = EntityStatus::Active;
        self.published_at = Some(Utc::now());
        self.published_by = Some(published_by.into());
    }

    pub fn deactivate(&mut self) {
        self.status = EntityStatus::Inactive;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn draft_then_publish_then_deactivate() {
        let mut meta = VersionMeta::new_draft(1, "alice");
        assert!(meta.is_draft());
        meta.publish("bob");
        assert!(meta.is_active());
        assert_eq!(meta.published_by.as_deref(), Some("bob"));
        meta.deactivate();
        assert_eq!(meta.status, EntityStatus::Inactive);
    }
}
