//! Read-only records derived from a descriptor tree.
//!
//! Records are owned copies; invalidating the tree never affects them.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One snapshot of the machine, flattened out of the snapshot tree.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SnapshotRecord {
    /// Unique id without braces.
    pub uuid: String,
    pub name: String,
    /// Raw `timeStamp` attribute, if recorded.
    pub created: Option<String>,
    pub description: String,
}

impl SnapshotRecord {
    /// Creation time parsed as RFC 3339.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        let raw = self.created.as_deref()?;
        DateTime::parse_from_rfc3339(raw)
            .ok()
            .map(|dt| dt.with_timezone(&Utc))
    }
}

/// One medium registered in a media-list section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttachedMediaRecord {
    /// Unique id without braces.
    pub uuid: String,
    pub location: String,
}

/// Remove the braces the descriptor puts around unique ids.
pub(crate) fn strip_braces(id: &str) -> &str {
    id.trim().trim_start_matches('{').trim_end_matches('}')
}
