//! Deployment plan types and construction.
//!
//! A plan combines the diff (what must change) with the schedule (in what
//! order): deletions first, dependents before their dependencies, then
//! creates, updates, and replacements in topological wave order.

use chrono::{DateTime, Utc};
use std::collections::{HashMap, HashSet};

use crate::config::{ResourceKind, StackConfig};
use crate::error::{PlanError, Result, StratusError};
use crate::graph::Schedule;
use crate::state::{PassOperation, RecordedState};

use super::diff::{DiffOp, DiffResult};

/// A complete deployment plan.
#[derive(Debug)]
pub struct DeploymentPlan {
    /// When the plan was created.
    pub created_at: DateTime<Utc>,
    /// Pass type this plan implements.
    pub pass: PassOperation,
    /// Stack configuration hash this plan is based on.
    pub config_hash: String,
    /// Deletions, ordered so dependents go before their dependencies.
    pub deletions: Vec<PlannedOp>,
    /// Forward operations in schedule order (including no-ops).
    pub operations: Vec<PlannedOp>,
    /// Scheduler waves over the declared resources.
    pub waves: Vec<Vec<String>>,
    /// Operations that replace the physical resource, with the immutable
    /// attributes that forced the replacement.
    pub replacements: Vec<ReplaceNotice>,
}

/// Notice that an operation replaces a resource's physical identity.
#[derive(Debug, Clone)]
pub struct ReplaceNotice {
    /// Logical id of the resource.
    pub id: String,
    /// Immutable attributes whose values changed.
    pub fields: Vec<String>,
}

/// A single planned operation.
#[derive(Debug, Clone)]
pub struct PlannedOp {
    /// Operation type.
    pub op: DiffOp,
    /// Logical id.
    pub id: String,
    /// Resource kind.
    pub kind: ResourceKind,
    /// Physical id (for deletes, updates, and replacements).
    pub physical_id: Option<String>,
    /// Reason for this operation.
    pub reason: String,
    /// New spec hash (absent for deletes).
    pub new_hash: Option<String>,
    /// Direct dependencies among the declared resources.
    pub depends_on: Vec<String>,
}

impl DeploymentPlan {
    /// Creates a plan from a diff result and a schedule.
    ///
    /// `graph_dependencies` maps each declared id to its direct
    /// dependencies; deletions are ordered from the references recorded at
    /// apply time.
    #[must_use]
    pub fn from_diff(
        diff: &DiffResult,
        config: &StackConfig,
        schedule: &Schedule,
        graph_dependencies: &HashMap<String, Vec<String>>,
        recorded: Option<&RecordedState>,
        config_hash: &str,
    ) -> Self {
        let mut deletions = Vec::new();
        let mut replacements = Vec::new();

        // Deletions first: recorded resources that are no longer declared.
        let delete_ids: Vec<&str> = diff
            .diffs
            .iter()
            .filter(|d| d.op == DiffOp::Delete)
            .map(|d| d.id.as_str())
            .collect();

        for id in Self::order_deletions(&delete_ids, recorded) {
            // Deletions only exist for recorded resources.
            let Some(record) = recorded.and_then(|state| state.resource(&id)) else {
                continue;
            };
            deletions.push(PlannedOp {
                op: DiffOp::Delete,
                id,
                kind: record.kind,
                physical_id: Some(record.physical_id.clone()),
                reason: String::from("Resource removed from configuration"),
                new_hash: None,
                depends_on: vec![],
            });
        }

        // Forward operations in schedule order.
        let diff_by_id: HashMap<&str, &super::diff::ResourceDiff> = diff
            .diffs
            .iter()
            .map(|d| (d.id.as_str(), d))
            .collect();

        let mut operations = Vec::new();
        for id in &schedule.order {
            let Some(resource_diff) = diff_by_id.get(id.as_str()) else {
                continue;
            };
            let Some(spec) = config.resource(id) else {
                continue;
            };

            let record = recorded.and_then(|state| state.resource(id));
            let reason = match resource_diff.op {
                DiffOp::Create => String::from("Resource declared in configuration"),
                DiffOp::Update => format!(
                    "Attributes changed: {}",
                    Self::field_list(&resource_diff.details)
                ),
                DiffOp::Replace => format!(
                    "Immutable attributes changed: {}",
                    resource_diff.replace_fields.join(", ")
                ),
                DiffOp::NoOp => String::from("Configuration unchanged"),
                DiffOp::Delete => String::new(),
            };

            if resource_diff.op == DiffOp::Replace {
                replacements.push(ReplaceNotice {
                    id: id.clone(),
                    fields: resource_diff.replace_fields.clone(),
                });
            }

            operations.push(PlannedOp {
                op: resource_diff.op,
                id: id.clone(),
                kind: spec.kind,
                physical_id: record.map(|r| r.physical_id.clone()),
                reason,
                new_hash: resource_diff.new_hash.clone(),
                depends_on: graph_dependencies.get(id).cloned().unwrap_or_default(),
            });
        }

        Self {
            created_at: Utc::now(),
            pass: PassOperation::Apply,
            config_hash: config_hash.to_string(),
            deletions,
            operations,
            waves: schedule.waves.clone(),
            replacements,
        }
    }

    /// Creates a destroy plan tearing down every recorded resource.
    #[must_use]
    pub fn destroy(recorded: &RecordedState) -> Self {
        let ids: Vec<&str> = recorded.resource_ids();
        let mut deletions = Vec::new();

        for id in Self::order_deletions(&ids, Some(recorded)) {
            let Some(record) = recorded.resource(&id) else {
                continue;
            };
            deletions.push(PlannedOp {
                op: DiffOp::Delete,
                id,
                kind: record.kind,
                physical_id: Some(record.physical_id.clone()),
                reason: String::from("Stack destroy requested"),
                new_hash: None,
                depends_on: vec![],
            });
        }

        Self {
            created_at: Utc::now(),
            pass: PassOperation::Destroy,
            config_hash: recorded.config_hash.clone(),
            deletions,
            operations: vec![],
            waves: vec![],
            replacements: vec![],
        }
    }

    /// Orders deletions so dependents are deleted before their
    /// dependencies, using the references recorded at apply time.
    fn order_deletions(ids: &[&str], recorded: Option<&RecordedState>) -> Vec<String> {
        let deleting: HashSet<&str> = ids.iter().copied().collect();

        // Dependency counts restricted to the deletion set: an entry's
        // recorded references are resources it depends on, which must
        // outlive it.
        let references_of = |id: &str| -> Vec<String> {
            recorded
                .and_then(|state| state.resource(id))
                .map(|record| {
                    record
                        .references
                        .iter()
                        .filter(|target| deleting.contains(target.as_str()))
                        .cloned()
                        .collect()
                })
                .unwrap_or_default()
        };

        let mut dependents_remaining: HashMap<&str, usize> =
            ids.iter().map(|id| (*id, 0)).collect();
        for id in ids {
            for target in references_of(id) {
                if let Some(count) = dependents_remaining.get_mut(target.as_str()) {
                    *count += 1;
                }
            }
        }

        // Kahn over reverse edges: peel resources nothing depends on.
        let mut ordered = Vec::with_capacity(ids.len());
        let mut ready: Vec<&str> = {
            let mut ready: Vec<&str> = dependents_remaining
                .iter()
                .filter(|(_, count)| **count == 0)
                .map(|(id, _)| *id)
                .collect();
            ready.sort_unstable();
            ready
        };

        while let Some(id) = ready.pop() {
            dependents_remaining.remove(id);
            ordered.push(id.to_string());

            for target in references_of(id) {
                if let Some(count) = dependents_remaining.get_mut(target.as_str()) {
                    *count -= 1;
                    if *count == 0 {
                        ready.push(
                            ids.iter()
                                .find(|candidate| **candidate == target.as_str())
                                .copied()
                                .unwrap_or_default(),
                        );
                        ready.sort_unstable();
                    }
                }
            }
        }

        // Records with cyclic references (corrupt state) fall back to
        // sorted order so the pass still makes progress.
        if ordered.len() < ids.len() {
            let mut rest: Vec<&str> = dependents_remaining.keys().copied().collect();
            rest.sort_unstable();
            ordered.extend(rest.iter().map(ToString::to_string));
        }

        ordered
    }

    /// Joins changed field names for a reason string.
    fn field_list(details: &[super::diff::DiffDetail]) -> String {
        details
            .iter()
            .map(|d| d.field.as_str())
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Returns true if the plan changes nothing.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.deletions.is_empty() && self.operations.iter().all(|op| op.op == DiffOp::NoOp)
    }

    /// Returns the number of actionable operations.
    #[must_use]
    pub fn action_count(&self) -> usize {
        self.deletions.len()
            + self
                .operations
                .iter()
                .filter(|op| op.op != DiffOp::NoOp)
                .count()
    }

    /// Returns the actionable forward operations.
    #[must_use]
    pub fn actionable_operations(&self) -> Vec<&PlannedOp> {
        self.operations
            .iter()
            .filter(|op| op.op != DiffOp::NoOp)
            .collect()
    }

    /// Ensures replacements were explicitly allowed.
    ///
    /// # Errors
    ///
    /// Returns `PlanError::ReplaceRequiresNewId` naming the first blocked
    /// resource when the plan contains replacements and the operator did
    /// not confirm them.
    pub fn ensure_replacements_allowed(&self, allow_replace: bool) -> Result<()> {
        if allow_replace || self.replacements.is_empty() {
            return Ok(());
        }

        let notice = &self.replacements[0];
        Err(StratusError::Plan(PlanError::ReplaceRequiresNewId {
            id: notice.id.clone(),
            fields: notice.fields.clone(),
        }))
    }
}

impl PlannedOp {
    /// Returns a human-readable description of the operation.
    #[must_use]
    pub fn description(&self) -> String {
        match self.op {
            DiffOp::Create => format!("Create {} '{}'", self.kind, self.id),
            DiffOp::Update => format!("Update {} '{}'", self.kind, self.id),
            DiffOp::Replace => format!("Replace {} '{}'", self.kind, self.id),
            DiffOp::Delete => format!("Delete {} '{}'", self.kind, self.id),
            DiffOp::NoOp => format!("No change for '{}'", self.id),
        }
    }
}

impl std::fmt::Display for PlannedOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {}", self.op, self.id)?;
        if !self.reason.is_empty() {
            write!(f, " ({})", self.reason)?;
        }
        Ok(())
    }
}

impl std::fmt::Display for DeploymentPlan {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        if self.is_empty() {
            return write!(f, "No changes required");
        }

        writeln!(f, "Deployment plan ({} operations):", self.action_count())?;
        for (i, op) in self
            .deletions
            .iter()
            .chain(self.actionable_operations())
            .enumerate()
        {
            writeln!(f, "  {i}. {op}")?;
        }

        if !self.replacements.is_empty() {
            writeln!(f, "\nReplacements requiring confirmation:")?;
            for notice in &self.replacements {
                writeln!(f, "  - {} ({})", notice.id, notice.fields.join(", "))?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{
        BackendConfig, ConfigHasher, ProjectConfig, ResourceSpec, StateBackend, StateConfig,
    };
    use crate::graph::{GraphBuilder, Scheduler};
    use crate::planner::StateDiffer;
    use crate::state::ResourceRecord;
    use serde_json::Value;
    use std::collections::BTreeMap;

    fn spec(id: &str, kind: ResourceKind, refs: &[(&str, &str)]) -> ResourceSpec {
        let mut attributes = BTreeMap::new();
        for (attr, reference) in refs {
            attributes.insert(
                (*attr).to_string(),
                Value::String((*reference).to_string()),
            );
        }
        ResourceSpec {
            id: id.to_string(),
            kind,
            depends_on: vec![],
            attributes,
        }
    }

    fn config_with(resources: Vec<ResourceSpec>) -> StackConfig {
        StackConfig {
            project: ProjectConfig {
                name: String::from("website"),
                environment: String::from("dev"),
                region: None,
            },
            state: StateConfig {
                backend: StateBackend::Local,
                bucket: None,
                prefix: None,
                region: None,
                path: None,
            },
            backend: BackendConfig {
                endpoint: String::from("http://localhost:8400/v1"),
                timeout_secs: 30,
            },
            resources,
        }
    }

    fn plan_for(config: &StackConfig, recorded: Option<&RecordedState>) -> DeploymentPlan {
        let graph = GraphBuilder::new()
            .build(&config.resources, recorded)
            .expect("graph should build");
        let schedule = Scheduler::new().schedule(&graph);
        let dependencies: HashMap<String, Vec<String>> = graph
            .ids()
            .iter()
            .map(|id| {
                (
                    id.clone(),
                    graph.dependencies_of(id).iter().cloned().collect(),
                )
            })
            .collect();

        let diff = StateDiffer::new().diff(&config.resources, recorded);
        let hasher = ConfigHasher::new();
        DeploymentPlan::from_diff(
            &diff,
            config,
            &schedule,
            &dependencies,
            recorded,
            &hasher.hash_stack(config),
        )
    }

    #[test]
    fn test_chain_plan_order() {
        let config = config_with(vec![
            spec("zone", ResourceKind::HostedZone, &[("domain_name", "example.com")]),
            spec(
                "cert",
                ResourceKind::Certificate,
                &[("domain_name", "example.com"), ("zone_id", "${zone.zone_id}")],
            ),
            spec(
                "cdn",
                ResourceKind::Distribution,
                &[
                    ("origin_domain", "assets.example.com"),
                    ("certificate_arn", "${cert.certificate_arn}"),
                ],
            ),
            spec(
                "dns",
                ResourceKind::DnsRecord,
                &[
                    ("zone_id", "${zone.zone_id}"),
                    ("record_name", "example.com"),
                    ("target", "${cdn.domain_name}"),
                ],
            ),
        ]);

        let plan = plan_for(&config, None);

        let order: Vec<&str> = plan.operations.iter().map(|op| op.id.as_str()).collect();
        assert_eq!(order, vec!["zone", "cert", "cdn", "dns"]);
        assert!(plan.deletions.is_empty());
        assert_eq!(plan.action_count(), 4);
    }

    #[test]
    fn test_deletions_order_dependents_first() {
        // Recorded chain zone <- cert <- cdn, nothing declared anymore.
        let mut state = RecordedState::new("website", "dev");

        let zone = ResourceRecord::new("zone", ResourceKind::HostedZone, "p-zone", "h1");
        let mut cert = ResourceRecord::new("cert", ResourceKind::Certificate, "p-cert", "h2");
        cert.references = vec![String::from("zone")];
        let mut cdn = ResourceRecord::new("cdn", ResourceKind::Distribution, "p-cdn", "h3");
        cdn.references = vec![String::from("cert")];

        state.set_resource(zone);
        state.set_resource(cert);
        state.set_resource(cdn);

        let config = config_with(vec![]);
        let plan = plan_for(&config, Some(&state));

        let order: Vec<&str> = plan.deletions.iter().map(|op| op.id.as_str()).collect();
        assert_eq!(order, vec!["cdn", "cert", "zone"]);
    }

    #[test]
    fn test_destroy_plan_covers_all_records() {
        let mut state = RecordedState::new("website", "dev");
        state.set_resource(ResourceRecord::new(
            "zone",
            ResourceKind::HostedZone,
            "p-zone",
            "h1",
        ));
        state.set_resource(ResourceRecord::new(
            "assets",
            ResourceKind::Bucket,
            "p-assets",
            "h2",
        ));

        let plan = DeploymentPlan::destroy(&state);
        assert_eq!(plan.pass, PassOperation::Destroy);
        assert_eq!(plan.deletions.len(), 2);
        assert!(plan.operations.is_empty());
    }

    #[test]
    fn test_replacements_require_confirmation() {
        let declared = spec(
            "api",
            ResourceKind::RestApi,
            &[("api_name", "internal"), ("endpoint_type", "private")],
        );

        // Recorded with the other endpoint type and a hash that differs.
        let mut recorded_spec = declared.clone();
        recorded_spec.attributes.insert(
            String::from("endpoint_type"),
            Value::String(String::from("regional")),
        );
        let hasher = ConfigHasher::new();
        let mut record = ResourceRecord::new(
            "api",
            ResourceKind::RestApi,
            "p-api",
            &hasher.hash_spec(&recorded_spec),
        );
        record.attributes = recorded_spec.attributes.clone();

        let mut state = RecordedState::new("website", "dev");
        state.set_resource(record);

        let config = config_with(vec![declared]);
        let plan = plan_for(&config, Some(&state));

        assert_eq!(plan.replacements.len(), 1);
        assert_eq!(plan.replacements[0].id, "api");
        assert_eq!(plan.replacements[0].fields, vec!["endpoint_type"]);
        assert!(plan.ensure_replacements_allowed(false).is_err());
        assert!(plan.ensure_replacements_allowed(true).is_ok());
    }

    #[test]
    fn test_noop_only_plan_is_empty() {
        let declared = spec("zone", ResourceKind::HostedZone, &[("domain_name", "example.com")]);
        let hasher = ConfigHasher::new();
        let mut record = ResourceRecord::new(
            "zone",
            ResourceKind::HostedZone,
            "p-zone",
            &hasher.hash_spec(&declared),
        );
        record.attributes = declared.attributes.clone();

        let mut state = RecordedState::new("website", "dev");
        state.set_resource(record);

        let config = config_with(vec![declared]);
        let plan = plan_for(&config, Some(&state));

        assert!(plan.is_empty());
        assert_eq!(plan.action_count(), 0);
    }
}
