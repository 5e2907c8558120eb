//! State types for tracking provisioned resources.
//!
//! These types represent the recorded state of a stack between deployment
//! passes: the logical-to-physical mapping, last-applied configuration
//! hashes, and exported outputs. The state is owned exclusively by the
//! resolver; the apply executor is its only writer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, HashMap};

use crate::config::ResourceKind;

/// Current version of the state format.
pub const STATE_VERSION: &str = "1.0";

/// The complete recorded state of a stack.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecordedState {
    /// State format version.
    pub version: String,
    /// Project name.
    pub project: String,
    /// Environment name.
    pub environment: String,
    /// Hash of the last fully applied stack configuration.
    pub config_hash: String,
    /// Recorded resources, keyed by logical id.
    pub resources: HashMap<String, ResourceRecord>,
    /// When the state was last updated.
    pub last_updated: DateTime<Utc>,
    /// Deployment pass history (recent entries).
    #[serde(default)]
    pub history: Vec<PassHistoryEntry>,
}

/// Recorded facts about a single provisioned resource.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResourceRecord {
    /// Logical id (from the stack configuration).
    pub id: String,
    /// Resource kind at apply time.
    pub kind: ResourceKind,
    /// Physical identifier assigned by the provisioning backend.
    pub physical_id: String,
    /// Hash of the spec configuration when applied.
    pub config_hash: String,
    /// Raw (unresolved) attributes as declared when applied.
    ///
    /// Kept for attribute-level diffing; reference placeholders are stored
    /// verbatim so comparisons are against what was declared, not what a
    /// particular pass resolved them to.
    #[serde(default)]
    pub attributes: BTreeMap<String, Value>,
    /// Outputs exported by the backend on the last successful apply.
    #[serde(default)]
    pub outputs: HashMap<String, String>,
    /// Direct dependency ids at apply time, used to order deletions.
    #[serde(default)]
    pub references: Vec<String>,
    /// Current status.
    pub status: ResourceStatus,
    /// When the resource was first applied.
    pub created_at: DateTime<Utc>,
    /// When the record was last updated.
    pub updated_at: DateTime<Utc>,
}

/// Recorded resource status.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ResourceStatus {
    /// The backend confirmed the last apply.
    Applied,
    /// A deletion was attempted but has not been confirmed.
    Deleting,
    /// Status is unknown (state written by a newer version, for example).
    Unknown,
}

/// A single entry in the pass history.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PassHistoryEntry {
    /// When the pass occurred.
    pub timestamp: DateTime<Utc>,
    /// Type of pass.
    pub operation: PassOperation,
    /// Stack configuration hash at the time of the pass.
    pub config_hash: String,
    /// Logical ids affected.
    pub resources: Vec<String>,
    /// Whether the pass succeeded.
    pub success: bool,
    /// Optional error message.
    #[serde(default)]
    pub error: Option<String>,
}

/// Types of deployment passes.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum PassOperation {
    /// An apply pass (create/update/replace/delete to match the spec set).
    Apply,
    /// A destroy pass (tear down everything recorded).
    Destroy,
}

impl RecordedState {
    /// Creates a new empty recorded state.
    #[must_use]
    pub fn new(project: &str, environment: &str) -> Self {
        Self {
            version: STATE_VERSION.to_string(),
            project: project.to_string(),
            environment: environment.to_string(),
            config_hash: String::new(),
            resources: HashMap::new(),
            last_updated: Utc::now(),
            history: Vec::new(),
        }
    }

    /// Gets a resource record by logical id.
    #[must_use]
    pub fn resource(&self, id: &str) -> Option<&ResourceRecord> {
        self.resources.get(id)
    }

    /// Gets a mutable resource record by logical id.
    pub fn resource_mut(&mut self, id: &str) -> Option<&mut ResourceRecord> {
        self.resources.get_mut(id)
    }

    /// Adds or replaces a resource record.
    pub fn set_resource(&mut self, record: ResourceRecord) {
        self.resources.insert(record.id.clone(), record);
        self.last_updated = Utc::now();
    }

    /// Removes a resource record by logical id.
    pub fn remove_resource(&mut self, id: &str) -> Option<ResourceRecord> {
        let removed = self.resources.remove(id);
        if removed.is_some() {
            self.last_updated = Utc::now();
        }
        removed
    }

    /// Returns all recorded logical ids, sorted for deterministic output.
    #[must_use]
    pub fn resource_ids(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.resources.keys().map(String::as_str).collect();
        ids.sort_unstable();
        ids
    }

    /// Adds a history entry, keeping the most recent entries only.
    pub fn add_history(&mut self, entry: PassHistoryEntry) {
        const MAX_HISTORY: usize = 100;
        if self.history.len() >= MAX_HISTORY {
            self.history.remove(0);
        }
        self.history.push(entry);
    }

    /// Returns true if nothing is recorded.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }
}

impl ResourceRecord {
    /// Creates a new resource record.
    #[must_use]
    pub fn new(id: &str, kind: ResourceKind, physical_id: &str, config_hash: &str) -> Self {
        let now = Utc::now();
        Self {
            id: id.to_string(),
            kind,
            physical_id: physical_id.to_string(),
            config_hash: config_hash.to_string(),
            attributes: BTreeMap::new(),
            outputs: HashMap::new(),
            references: Vec::new(),
            status: ResourceStatus::Applied,
            created_at: now,
            updated_at: now,
        }
    }

    /// Updates the status.
    pub fn set_status(&mut self, status: ResourceStatus) {
        self.status = status;
        self.updated_at = Utc::now();
    }

    /// Looks up an exported output by name.
    #[must_use]
    pub fn output(&self, name: &str) -> Option<&str> {
        self.outputs.get(name).map(String::as_str)
    }
}

impl PassHistoryEntry {
    /// Creates a new successful history entry.
    #[must_use]
    pub fn new(operation: PassOperation, config_hash: &str, resources: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            resources,
            success: true,
            error: None,
        }
    }

    /// Creates a failed history entry.
    #[must_use]
    pub fn failed(
        operation: PassOperation,
        config_hash: &str,
        resources: Vec<String>,
        error: &str,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            operation,
            config_hash: config_hash.to_string(),
            resources,
            success: false,
            error: Some(error.to_string()),
        }
    }
}

impl std::fmt::Display for ResourceStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let status = match self {
            Self::Applied => "applied",
            Self::Deleting => "deleting",
            Self::Unknown => "unknown",
        };
        write!(f, "{status}")
    }
}

impl std::fmt::Display for PassOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let op = match self {
            Self::Apply => "apply",
            Self::Destroy => "destroy",
        };
        write!(f, "{op}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_set_and_remove_resource() {
        let mut state = RecordedState::new("website", "dev");
        state.set_resource(ResourceRecord::new(
            "zone",
            ResourceKind::HostedZone,
            "phys-1",
            "hash-1",
        ));

        assert!(state.resource("zone").is_some());
        assert_eq!(state.resource_ids(), vec!["zone"]);

        let removed = state.remove_resource("zone").expect("record should exist");
        assert_eq!(removed.physical_id, "phys-1");
        assert!(state.is_empty());
    }

    #[test]
    fn test_history_is_bounded() {
        let mut state = RecordedState::new("website", "dev");
        for i in 0..120 {
            state.add_history(PassHistoryEntry::new(
                PassOperation::Apply,
                &format!("hash-{i}"),
                vec![],
            ));
        }

        assert_eq!(state.history.len(), 100);
        assert_eq!(state.history.last().map(|e| e.config_hash.as_str()), Some("hash-119"));
    }

    #[test]
    fn test_record_output_lookup() {
        let mut record = ResourceRecord::new("zone", ResourceKind::HostedZone, "phys-1", "h");
        record
            .outputs
            .insert(String::from("zone_id"), String::from("Z42"));

        assert_eq!(record.output("zone_id"), Some("Z42"));
        assert_eq!(record.output("missing"), None);
    }
}
