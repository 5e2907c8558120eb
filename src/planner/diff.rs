//! Diff engine for comparing declared specs against recorded state.
//!
//! This module decides, per resource, whether a deployment pass must
//! create, update, replace, or delete it, or can leave it alone. The
//! comparison is hash-first: only when hashes differ are attributes
//! compared field by field.

use std::collections::HashSet;
use tracing::debug;

use crate::config::{self, ConfigHasher, ResourceSpec};
use crate::state::RecordedState;

/// Engine for computing diffs between declared and recorded state.
#[derive(Debug, Default)]
pub struct StateDiffer {
    /// Configuration hasher.
    hasher: ConfigHasher,
}

/// Type of difference detected for a resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize)]
#[serde(rename_all = "snake_case")]
pub enum DiffOp {
    /// Resource has no prior record and must be created.
    Create,
    /// Configuration hash differs; the resource updates in place.
    Update,
    /// An immutable attribute changed; the resource needs a new physical
    /// identity. Requires operator confirmation before applying.
    Replace,
    /// Configuration hash matches the record.
    NoOp,
    /// Recorded resource no longer declared; must be deleted.
    Delete,
}

/// Difference for a single resource.
#[derive(Debug, Clone)]
pub struct ResourceDiff {
    /// Logical id.
    pub id: String,
    /// Type of difference.
    pub op: DiffOp,
    /// Attribute-level details (empty for `Create`, `NoOp`, `Delete`).
    pub details: Vec<DiffDetail>,
    /// Immutable attributes that changed (non-empty only for `Replace`).
    pub replace_fields: Vec<String>,
    /// Previously recorded hash, if any.
    pub old_hash: Option<String>,
    /// Hash of the declared spec, if still declared.
    pub new_hash: Option<String>,
}

/// Detail about a specific attribute difference.
#[derive(Debug, Clone)]
pub struct DiffDetail {
    /// Attribute that differs.
    pub field: String,
    /// Previously recorded value.
    pub old_value: Option<String>,
    /// Newly declared value.
    pub new_value: Option<String>,
}

/// Complete diff result.
#[derive(Debug)]
pub struct DiffResult {
    /// All resource diffs: declared resources in declaration order, then
    /// deletions in sorted id order.
    pub diffs: Vec<ResourceDiff>,
    /// Number of resources to create.
    pub creates: usize,
    /// Number of resources to update in place.
    pub updates: usize,
    /// Number of resources to replace.
    pub replaces: usize,
    /// Number of resources to delete.
    pub deletes: usize,
    /// Number of unchanged resources.
    pub unchanged: usize,
}

impl StateDiffer {
    /// Creates a new state differ.
    #[must_use]
    pub const fn new() -> Self {
        Self {
            hasher: ConfigHasher::new(),
        }
    }

    /// Computes the diff between declared specs and recorded state.
    #[must_use]
    pub fn diff(&self, specs: &[ResourceSpec], recorded: Option<&RecordedState>) -> DiffResult {
        let mut diffs = Vec::new();

        for spec in specs {
            diffs.push(self.diff_spec(spec, recorded));
        }

        // Recorded resources no longer declared are deletions. Sorted for
        // deterministic plan output; execution order is decided later from
        // recorded references.
        let declared: HashSet<&str> = specs.iter().map(|s| s.id.as_str()).collect();
        if let Some(state) = recorded {
            for id in state.resource_ids() {
                if !declared.contains(id) {
                    debug!("Resource {id} is recorded but no longer declared");
                    let record = state.resource(id);
                    diffs.push(ResourceDiff {
                        id: id.to_string(),
                        op: DiffOp::Delete,
                        details: vec![],
                        replace_fields: vec![],
                        old_hash: record.map(|r| r.config_hash.clone()),
                        new_hash: None,
                    });
                }
            }
        }

        let creates = diffs.iter().filter(|d| d.op == DiffOp::Create).count();
        let updates = diffs.iter().filter(|d| d.op == DiffOp::Update).count();
        let replaces = diffs.iter().filter(|d| d.op == DiffOp::Replace).count();
        let deletes = diffs.iter().filter(|d| d.op == DiffOp::Delete).count();
        let unchanged = diffs.iter().filter(|d| d.op == DiffOp::NoOp).count();

        DiffResult {
            diffs,
            creates,
            updates,
            replaces,
            deletes,
            unchanged,
        }
    }

    /// Computes the diff for a single declared resource.
    fn diff_spec(&self, spec: &ResourceSpec, recorded: Option<&RecordedState>) -> ResourceDiff {
        let new_hash = self.hasher.hash_spec(spec);
        let record = recorded.and_then(|state| state.resource(&spec.id));

        let Some(record) = record else {
            debug!("Resource {} needs to be created", spec.id);
            return ResourceDiff {
                id: spec.id.clone(),
                op: DiffOp::Create,
                details: vec![],
                replace_fields: vec![],
                old_hash: None,
                new_hash: Some(new_hash),
            };
        };

        if ConfigHasher::hashes_match(&record.config_hash, &new_hash) {
            debug!("Resource {} is up to date", spec.id);
            return ResourceDiff {
                id: spec.id.clone(),
                op: DiffOp::NoOp,
                details: vec![],
                replace_fields: vec![],
                old_hash: Some(record.config_hash.clone()),
                new_hash: Some(new_hash),
            };
        }

        let details = Self::attribute_diff(spec, &record.attributes);
        let replace_fields: Vec<String> = details
            .iter()
            .filter(|d| config::is_immutable(spec.kind, &d.field))
            .map(|d| d.field.clone())
            .collect();

        let op = if replace_fields.is_empty() {
            DiffOp::Update
        } else {
            DiffOp::Replace
        };

        debug!("Resource {} needs {:?}", spec.id, op);
        ResourceDiff {
            id: spec.id.clone(),
            op,
            details,
            replace_fields,
            old_hash: Some(record.config_hash.clone()),
            new_hash: Some(new_hash),
        }
    }

    /// Computes attribute-level differences against recorded attributes.
    fn attribute_diff(
        spec: &ResourceSpec,
        recorded: &std::collections::BTreeMap<String, serde_json::Value>,
    ) -> Vec<DiffDetail> {
        let mut details = Vec::new();

        for (field, new_value) in &spec.attributes {
            match recorded.get(field) {
                Some(old_value) if old_value == new_value => {}
                Some(old_value) => details.push(DiffDetail {
                    field: field.clone(),
                    old_value: Some(display_value(old_value)),
                    new_value: Some(display_value(new_value)),
                }),
                None => details.push(DiffDetail {
                    field: field.clone(),
                    old_value: None,
                    new_value: Some(display_value(new_value)),
                }),
            }
        }

        for (field, old_value) in recorded {
            if !spec.attributes.contains_key(field) {
                details.push(DiffDetail {
                    field: field.clone(),
                    old_value: Some(display_value(old_value)),
                    new_value: None,
                });
            }
        }

        details
    }
}

/// Renders a JSON value for diff display without quoting plain strings.
fn display_value(value: &serde_json::Value) -> String {
    match value {
        serde_json::Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

impl DiffResult {
    /// Returns true if there are any changes.
    #[must_use]
    pub const fn has_changes(&self) -> bool {
        self.creates > 0 || self.updates > 0 || self.replaces > 0 || self.deletes > 0
    }

    /// Returns the total number of changes.
    #[must_use]
    pub const fn total_changes(&self) -> usize {
        self.creates + self.updates + self.replaces + self.deletes
    }

    /// Filters to only diffs that require action.
    #[must_use]
    pub fn actionable_diffs(&self) -> Vec<&ResourceDiff> {
        self.diffs.iter().filter(|d| d.op != DiffOp::NoOp).collect()
    }
}

impl std::fmt::Display for DiffOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Create => "create",
            Self::Update => "update",
            Self::Replace => "replace",
            Self::NoOp => "no change",
            Self::Delete => "delete",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for ResourceDiff {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.id, self.op)?;
        if !self.details.is_empty() {
            write!(f, " (")?;
            for (i, detail) in self.details.iter().enumerate() {
                if i > 0 {
                    write!(f, ", ")?;
                }
                write!(f, "{}", detail.field)?;
            }
            write!(f, ")")?;
        }
        Ok(())
    }
}
