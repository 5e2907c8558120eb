//! Apply executor for deployment plans.
//!
//! Walks the plan wave by wave: deletions first, then forward operations
//! with independent resources of a wave running concurrently. Recorded
//! state is written only by this executor, only after the backend confirms
//! an operation, and only between waves, so there is never more than one
//! writer per logical id.
//!
//! Failure semantics are fail-fast per subtree: a failed operation marks
//! every not-yet-started transitive dependent as skipped while independent
//! branches continue. Cancellation lets in-flight operations finish and
//! abandons the rest.

use serde::Serialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::backend::{Applied, ApplyRequest, Provisioner};
use crate::config::StackConfig;
use crate::error::{BackendError, Result, StratusError};
use crate::resolver::OutputTable;
use crate::state::{
    PassHistoryEntry, RecordedState, ResourceRecord, ResourceStatus,
};

use super::diff::DiffOp;
use super::plan::{DeploymentPlan, PlannedOp};

/// Executor for deployment plans.
pub struct ApplyExecutor {
    /// Provisioning backend.
    provisioner: Arc<dyn Provisioner>,
    /// Cooperative cancellation flag.
    cancelled: Arc<AtomicBool>,
}

/// Terminal state of a single operation, reported per logical id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OpTerminal {
    /// The backend confirmed the apply.
    Applied,
    /// Nothing to do; configuration unchanged.
    Unchanged,
    /// The backend reported a failure; dependents were skipped.
    Failed,
    /// Not started because a transitive dependency failed.
    Skipped,
    /// Not started because the pass was cancelled.
    Abandoned,
    /// The backend confirmed the deletion.
    Deleted,
    /// The deletion failed; the record is kept.
    DeleteFailed,
}

/// Outcome of a single operation.
#[derive(Debug, Clone, Serialize)]
pub struct OpOutcome {
    /// Logical id.
    pub id: String,
    /// Operation that was planned.
    pub op: DiffOp,
    /// Terminal state reached in this pass.
    pub terminal: OpTerminal,
    /// Error message (for failed operations).
    pub error: Option<String>,
}

/// Machine-readable result of executing an entire plan.
#[derive(Debug, Serialize)]
pub struct PassReport {
    /// Per-id outcomes, sorted by logical id.
    pub outcomes: BTreeMap<String, OpOutcome>,
    /// Number of confirmed applies.
    pub applied: usize,
    /// Number of unchanged resources.
    pub unchanged: usize,
    /// Number of failures (apply and delete).
    pub failed: usize,
    /// Number of skipped operations.
    pub skipped: usize,
    /// Number of confirmed deletions.
    pub deleted: usize,
    /// Number of abandoned operations after cancellation.
    pub abandoned: usize,
    /// Whether every operation confirmed.
    pub success: bool,
    /// Whether the pass was cut short by cancellation.
    pub incomplete: bool,
}

/// Output of one concurrent wave task.
struct WaveTaskOutput {
    id: String,
    /// Set when a replacement deleted the old physical resource.
    old_deleted: bool,
    result: Result<Applied>,
}

impl ApplyExecutor {
    /// Creates a new apply executor.
    #[must_use]
    pub fn new(provisioner: Arc<dyn Provisioner>) -> Self {
        Self {
            provisioner,
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Returns the cancellation flag.
    ///
    /// Setting it lets in-flight operations finish, abandons everything
    /// not yet started, and reports the pass incomplete.
    #[must_use]
    pub fn cancel_flag(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Executes a deployment plan against the recorded state.
    ///
    /// # Errors
    ///
    /// Returns an error only for invariant violations; per-resource
    /// backend failures are captured in the report, not propagated.
    pub async fn execute(
        &self,
        plan: &DeploymentPlan,
        config: &StackConfig,
        state: &mut RecordedState,
    ) -> Result<PassReport> {
        info!(
            "Executing {} plan: {} deletions, {} operations",
            plan.pass,
            plan.deletions.len(),
            plan.operations.len()
        );

        let mut outcomes: BTreeMap<String, OpOutcome> = BTreeMap::new();

        self.execute_deletions(plan, state, &mut outcomes).await;

        let mut outputs = OutputTable::new();
        Self::seed_outputs(plan, state, &mut outputs);

        self.execute_waves(plan, config, state, &mut outputs, &mut outcomes)
            .await;

        let report = Self::summarize(outcomes);

        // The stack hash advances only when the whole pass confirmed.
        if report.success && !report.incomplete {
            state.config_hash.clone_from(&plan.config_hash);
        }

        let affected: Vec<String> = report.outcomes.keys().cloned().collect();
        let entry = if report.success {
            PassHistoryEntry::new(plan.pass, &plan.config_hash, affected)
        } else {
            PassHistoryEntry::failed(
                plan.pass,
                &plan.config_hash,
                affected,
                &format!("{} operations failed", report.failed),
            )
        };
        state.add_history(entry);

        Ok(report)
    }

    /// Executes the deletion phase sequentially, dependents first.
    async fn execute_deletions(
        &self,
        plan: &DeploymentPlan,
        state: &mut RecordedState,
        outcomes: &mut BTreeMap<String, OpOutcome>,
    ) {
        for op in &plan.deletions {
            if self.is_cancelled() {
                outcomes.insert(op.id.clone(), outcome(op, OpTerminal::Abandoned, None));
                continue;
            }

            let Some(physical_id) = op.physical_id.clone() else {
                // No physical identity was ever recorded; forget the entry.
                debug!("No physical id for {}, dropping record", op.id);
                state.remove_resource(&op.id);
                outcomes.insert(op.id.clone(), outcome(op, OpTerminal::Deleted, None));
                continue;
            };

            if let Some(record) = state.resource_mut(&op.id) {
                record.set_status(ResourceStatus::Deleting);
            }

            match self.provisioner.delete(op.kind, &physical_id).await {
                Ok(()) => {
                    state.remove_resource(&op.id);
                    info!("Deleted {} ({})", op.id, physical_id);
                    outcomes.insert(op.id.clone(), outcome(op, OpTerminal::Deleted, None));
                }
                Err(StratusError::Backend(BackendError::NotFound { .. })) => {
                    state.remove_resource(&op.id);
                    info!("Resource {} was already deleted", op.id);
                    outcomes.insert(op.id.clone(), outcome(op, OpTerminal::Deleted, None));
                }
                Err(e) => {
                    // The record stays: it is removed only after the
                    // backend confirms the deletion.
                    error!("Failed to delete {}: {}", op.id, e);
                    outcomes.insert(
                        op.id.clone(),
                        outcome(op, OpTerminal::DeleteFailed, Some(e.to_string())),
                    );
                }
            }
        }
    }

    /// Seeds the output table from recorded state for unchanged resources
    /// and imports, so dependents can resolve their references.
    fn seed_outputs(plan: &DeploymentPlan, state: &RecordedState, outputs: &mut OutputTable) {
        for op in &plan.operations {
            if op.op == DiffOp::NoOp
                && let Some(record) = state.resource(&op.id)
            {
                outputs.record(op.id.clone(), record.outputs.clone());
            }
        }

        // Imports: recorded resources referenced but not declared.
        for (id, record) in &state.resources {
            if plan.operations.iter().all(|op| &op.id != id) {
                outputs.record(id.clone(), record.outputs.clone());
            }
        }
    }

    /// Executes forward operations wave by wave.
    async fn execute_waves(
        &self,
        plan: &DeploymentPlan,
        config: &StackConfig,
        state: &mut RecordedState,
        outputs: &mut OutputTable,
        outcomes: &mut BTreeMap<String, OpOutcome>,
    ) {
        let ops_by_id: HashMap<&str, &PlannedOp> = plan
            .operations
            .iter()
            .map(|op| (op.id.as_str(), op))
            .collect();

        for wave in &plan.waves {
            let mut tasks: JoinSet<WaveTaskOutput> = JoinSet::new();

            for id in wave {
                let Some(op) = ops_by_id.get(id.as_str()).copied() else {
                    continue;
                };

                if op.op == DiffOp::NoOp {
                    debug!("Resource {} is unchanged", op.id);
                    outcomes.insert(op.id.clone(), outcome(op, OpTerminal::Unchanged, None));
                    continue;
                }

                if self.is_cancelled() {
                    outcomes.insert(op.id.clone(), outcome(op, OpTerminal::Abandoned, None));
                    continue;
                }

                // Fail-fast: a failed or skipped dependency blocks the
                // whole subtree. Dependencies ran in earlier waves, so
                // their outcomes are already final.
                let blocked_by = op.depends_on.iter().find(|dep| {
                    outcomes
                        .get(dep.as_str())
                        .is_some_and(|o| o.terminal.is_blocking())
                });
                if let Some(dep) = blocked_by {
                    warn!("Skipping {} because dependency {} did not apply", op.id, dep);
                    outcomes.insert(
                        op.id.clone(),
                        outcome(
                            op,
                            OpTerminal::Skipped,
                            Some(format!("Dependency '{dep}' did not reach Applied")),
                        ),
                    );
                    continue;
                }

                // Resolving: substitute confirmed outputs into attributes.
                let Some(spec) = config.resource(&op.id) else {
                    outcomes.insert(
                        op.id.clone(),
                        outcome(
                            op,
                            OpTerminal::Failed,
                            Some(String::from("Spec missing for planned operation")),
                        ),
                    );
                    continue;
                };

                let resolved = match outputs.resolve_attributes(&spec.attributes) {
                    Ok(resolved) => resolved,
                    Err(e) => {
                        // OutputUnavailable here means a scheduler
                        // invariant was violated.
                        error!("Failed to resolve references for {}: {}", op.id, e);
                        outcomes.insert(
                            op.id.clone(),
                            outcome(op, OpTerminal::Failed, Some(e.to_string())),
                        );
                        continue;
                    }
                };

                let request = match op.op {
                    DiffOp::Update => ApplyRequest::update(
                        op.id.clone(),
                        op.kind,
                        op.physical_id.clone().unwrap_or_default(),
                        resolved,
                    ),
                    _ => ApplyRequest::create(op.id.clone(), op.kind, resolved),
                };

                // Applying: hand off to the backend. Replacements delete
                // the old physical resource first, inside the same task.
                let provisioner = Arc::clone(&self.provisioner);
                let replace_target = (op.op == DiffOp::Replace)
                    .then(|| op.physical_id.clone())
                    .flatten();
                let task_id = op.id.clone();
                let kind = op.kind;

                debug!("Applying {} ({})", op.id, op.op);
                tasks.spawn(async move {
                    let mut old_deleted = false;

                    if let Some(old_physical_id) = replace_target {
                        match provisioner.delete(kind, &old_physical_id).await {
                            Ok(()) => old_deleted = true,
                            Err(StratusError::Backend(BackendError::NotFound { .. })) => {
                                old_deleted = true;
                            }
                            Err(e) => {
                                return WaveTaskOutput {
                                    id: task_id,
                                    old_deleted: false,
                                    result: Err(e),
                                };
                            }
                        }
                    }

                    let result = provisioner.apply(&request).await;
                    WaveTaskOutput {
                        id: task_id,
                        old_deleted,
                        result,
                    }
                });
            }

            // Join the wave: state updates happen here, one writer, one
            // write per confirmed resource.
            while let Some(joined) = tasks.join_next().await {
                let Ok(task_output) = joined else {
                    error!("Wave task panicked");
                    continue;
                };

                let Some(op) = ops_by_id.get(task_output.id.as_str()).copied() else {
                    continue;
                };

                if task_output.old_deleted {
                    state.remove_resource(&op.id);
                }

                match task_output.result {
                    Ok(applied) => {
                        Self::record_applied(op, config, &applied, state);
                        outputs.record(op.id.clone(), applied.outputs);
                        info!("Applied {} -> {}", op.id, applied.physical_id);
                        outcomes.insert(op.id.clone(), outcome(op, OpTerminal::Applied, None));
                    }
                    Err(e) => {
                        error!("Failed to apply {}: {}", op.id, e);
                        outcomes.insert(
                            op.id.clone(),
                            outcome(op, OpTerminal::Failed, Some(e.to_string())),
                        );
                    }
                }
            }
        }
    }

    /// Records a confirmed apply into state.
    fn record_applied(
        op: &PlannedOp,
        config: &StackConfig,
        applied: &Applied,
        state: &mut RecordedState,
    ) {
        let mut record = ResourceRecord::new(
            &op.id,
            op.kind,
            &applied.physical_id,
            op.new_hash.as_deref().unwrap_or(""),
        );

        if let Some(spec) = config.resource(&op.id) {
            record.attributes = spec.attributes.clone();
        }
        record.outputs = applied.outputs.clone();
        record.references.clone_from(&op.depends_on);

        // Preserve the original creation timestamp across updates.
        if let Some(existing) = state.resource(&op.id) {
            record.created_at = existing.created_at;
        }

        state.set_resource(record);
    }

    /// Builds the summary report from per-id outcomes.
    fn summarize(outcomes: BTreeMap<String, OpOutcome>) -> PassReport {
        let count =
            |terminal: OpTerminal| outcomes.values().filter(|o| o.terminal == terminal).count();

        let applied = count(OpTerminal::Applied);
        let unchanged = count(OpTerminal::Unchanged);
        let failed = count(OpTerminal::Failed) + count(OpTerminal::DeleteFailed);
        let skipped = count(OpTerminal::Skipped);
        let deleted = count(OpTerminal::Deleted);
        let abandoned = count(OpTerminal::Abandoned);

        PassReport {
            applied,
            unchanged,
            failed,
            skipped,
            deleted,
            abandoned,
            success: failed == 0 && skipped == 0 && abandoned == 0,
            incomplete: abandoned > 0,
            outcomes,
        }
    }
}

/// Builds an outcome for an operation.
fn outcome(op: &PlannedOp, terminal: OpTerminal, error: Option<String>) -> OpOutcome {
    OpOutcome {
        id: op.id.clone(),
        op: op.op,
        terminal,
        error,
    }
}

impl OpTerminal {
    /// Returns true if dependents of a resource in this state must not
    /// start.
    #[must_use]
    pub const fn is_blocking(self) -> bool {
        matches!(
            self,
            Self::Failed | Self::Skipped | Self::Abandoned | Self::DeleteFailed
        )
    }
}

impl std::fmt::Display for OpTerminal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Applied => "applied",
            Self::Unchanged => "unchanged",
            Self::Failed => "failed",
            Self::Skipped => "skipped",
            Self::Abandoned => "abandoned",
            Self::Deleted => "deleted",
            Self::DeleteFailed => "delete failed",
        };
        write!(f, "{s}")
    }
}

impl std::fmt::Display for PassReport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} applied, {} unchanged, {} deleted, {} failed, {} skipped",
            self.applied, self.unchanged, self.deleted, self.failed, self.skipped
        )?;
        if self.abandoned > 0 {
            write!(f, ", {} abandoned", self.abandoned)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::Provisioner;
    use crate::config::{
        BackendConfig, ConfigHasher, ProjectConfig, ResourceKind, ResourceSpec, StackConfig,
        StateBackend, StateConfig,
    };
    use crate::graph::{GraphBuilder, Scheduler};
    use crate::planner::StateDiffer;
    use async_trait::async_trait;
    use serde_json::Value;
    use std::collections::BTreeMap;
    use std::collections::HashSet;
    use std::sync::Mutex;

    /// Scripted in-memory backend: succeeds by default, fails the ids it
    /// is told to fail, and records the order of confirmed applies.
    #[derive(Debug, Default)]
    struct FakeBackend {
        fail_applies: HashSet<String>,
        fail_deletes: HashSet<String>,
        applied_order: Mutex<Vec<String>>,
        deleted: Mutex<Vec<String>>,
        counter: Mutex<u32>,
    }

    impl FakeBackend {
        fn failing_apply(ids: &[&str]) -> Self {
            Self {
                fail_applies: ids.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }

        fn failing_delete(ids: &[&str]) -> Self {
            Self {
                fail_deletes: ids.iter().map(ToString::to_string).collect(),
                ..Self::default()
            }
        }

        fn applied(&self) -> Vec<String> {
            self.applied_order.lock().expect("lock poisoned").clone()
        }
    }

    #[async_trait]
    impl Provisioner for FakeBackend {
        async fn apply(&self, request: &ApplyRequest) -> Result<Applied> {
            if self.fail_applies.contains(&request.logical_id) {
                return Err(StratusError::Backend(BackendError::apply_failed(
                    request.kind.as_str(),
                    request.logical_id.clone(),
                    "scripted failure",
                )));
            }

            // Refuse unresolved placeholders: the executor must have
            // substituted every reference before calling the backend.
            for value in request.attributes.values() {
                if let Value::String(s) = value {
                    assert!(
                        !s.contains("${"),
                        "unresolved reference reached the backend: {s}"
                    );
                }
            }

            let mut counter = self.counter.lock().expect("lock poisoned");
            *counter += 1;
            let physical_id = format!("phys-{}-{}", request.logical_id, *counter);
            drop(counter);

            self.applied_order
                .lock()
                .expect("lock poisoned")
                .push(request.logical_id.clone());

            let outputs = crate::config::capabilities(request.kind)
                .outputs
                .iter()
                .map(|name| ((*name).to_string(), format!("{}-{name}", request.logical_id)))
                .collect();

            Ok(Applied {
                physical_id,
                outputs,
            })
        }

        async fn delete(&self, _kind: ResourceKind, physical_id: &str) -> Result<()> {
            if self
                .fail_deletes
                .iter()
                .any(|id| physical_id.contains(id.as_str()))
            {
                return Err(StratusError::Backend(BackendError::delete_failed(
                    physical_id,
                    "scripted failure",
                )));
            }
            self.deleted
                .lock()
                .expect("lock poisoned")
                .push(physical_id.to_string());
            Ok(())
        }
    }

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

    fn chain_config() -> StackConfig {
        config_with(vec![
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
        ])
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

    async fn run(
        backend: FakeBackend,
        config: &StackConfig,
        state: &mut RecordedState,
    ) -> (PassReport, Arc<FakeBackend>) {
        let backend = Arc::new(backend);
        let executor = ApplyExecutor::new(Arc::clone(&backend) as Arc<dyn Provisioner>);
        let plan = plan_for(config, Some(state));
        let report = executor
            .execute(&plan, config, state)
            .await
            .expect("execute should not error");
        (report, backend)
    }

    #[tokio::test]
    async fn test_chain_applies_in_order_with_resolved_refs() {
        let config = chain_config();
        let mut state = RecordedState::new("website", "dev");

        let (report, backend) = run(FakeBackend::default(), &config, &mut state).await;

        assert!(report.success);
        assert_eq!(report.applied, 4);
        assert_eq!(backend.applied(), vec!["zone", "cert", "cdn", "dns"]);

        // Outputs were recorded and references were threaded through.
        let dns = state.resource("dns").expect("dns should be recorded");
        assert_eq!(dns.references, vec!["cdn", "zone"]);
        assert_eq!(
            state.resource("zone").and_then(|r| r.output("zone_id")),
            Some("zone-zone_id")
        );
        assert_eq!(state.config_hash, plan_for(&config, Some(&state)).config_hash);
    }

    #[tokio::test]
    async fn test_failed_apply_skips_dependents_keeps_independent() {
        let config = chain_config();
        let mut state = RecordedState::new("website", "dev");

        let (report, backend) = run(FakeBackend::failing_apply(&["cert"]), &config, &mut state).await;

        assert!(!report.success);
        assert_eq!(report.outcomes["zone"].terminal, OpTerminal::Applied);
        assert_eq!(report.outcomes["cert"].terminal, OpTerminal::Failed);
        assert_eq!(report.outcomes["cdn"].terminal, OpTerminal::Skipped);
        assert_eq!(report.outcomes["dns"].terminal, OpTerminal::Skipped);

        // Zone confirmed and is recorded; cert and downstream are not.
        assert!(state.resource("zone").is_some());
        assert!(state.resource("cert").is_none());
        assert!(state.resource("cdn").is_none());
        assert_eq!(backend.applied(), vec!["zone"]);

        // A failed pass never advances the stack hash.
        assert!(state.config_hash.is_empty());
    }

    #[tokio::test]
    async fn test_independent_subtrees_unaffected_by_failure() {
        // Bucket alone; vpc -> endpoint -> private api chain.
        let config = config_with(vec![
            spec("assets", ResourceKind::Bucket, &[("bucket_name", "assets")]),
            spec("net", ResourceKind::Vpc, &[("cidr_block", "10.0.0.0/16")]),
            spec(
                "api-endpoint",
                ResourceKind::VpcEndpoint,
                &[("vpc_id", "${net.vpc_id}"), ("service", "execute-api")],
            ),
            spec(
                "private-api",
                ResourceKind::RestApi,
                &[
                    ("api_name", "internal"),
                    ("endpoint_type", "private"),
                    ("vpc_endpoint_id", "${api-endpoint.endpoint_id}"),
                ],
            ),
        ]);
        let mut state = RecordedState::new("website", "dev");

        let (report, _backend) =
            run(FakeBackend::failing_apply(&["net"]), &config, &mut state).await;

        // The bucket branch is independent of the failed vpc branch.
        assert_eq!(report.outcomes["assets"].terminal, OpTerminal::Applied);
        assert_eq!(report.outcomes["net"].terminal, OpTerminal::Failed);
        assert_eq!(report.outcomes["api-endpoint"].terminal, OpTerminal::Skipped);
        assert_eq!(report.outcomes["private-api"].terminal, OpTerminal::Skipped);
    }

    #[tokio::test]
    async fn test_second_pass_is_all_noop() {
        let config = chain_config();
        let mut state = RecordedState::new("website", "dev");

        let (first, _) = run(FakeBackend::default(), &config, &mut state).await;
        assert!(first.success);

        let (second, backend) = run(FakeBackend::default(), &config, &mut state).await;
        assert!(second.success);
        assert_eq!(second.unchanged, 4);
        assert_eq!(second.applied, 0);
        assert!(backend.applied().is_empty());
    }

    #[tokio::test]
    async fn test_delete_confirms_before_record_removal() {
        let config = chain_config();
        let mut state = RecordedState::new("website", "dev");
        let (first, _) = run(FakeBackend::default(), &config, &mut state).await;
        assert!(first.success);

        // Remove the dns record from the declaration; its delete fails.
        let mut reduced = config.clone();
        reduced.resources.retain(|r| r.id != "dns");

        let (report, _) = run(
            FakeBackend::failing_delete(&["dns"]),
            &reduced,
            &mut state,
        )
        .await;

        assert_eq!(report.outcomes["dns"].terminal, OpTerminal::DeleteFailed);
        // The record survives the failed delete.
        let dns = state.resource("dns").expect("record should remain");
        assert_eq!(dns.status, ResourceStatus::Deleting);

        // A pass where the backend confirms removes the record.
        let (report, _) = run(FakeBackend::default(), &reduced, &mut state).await;
        assert_eq!(report.outcomes["dns"].terminal, OpTerminal::Deleted);
        assert!(state.resource("dns").is_none());
    }

    #[tokio::test]
    async fn test_cancellation_abandons_not_started() {
        let config = chain_config();
        let mut state = RecordedState::new("website", "dev");

        let backend = Arc::new(FakeBackend::default());
        let executor = ApplyExecutor::new(Arc::clone(&backend) as Arc<dyn Provisioner>);

        // Cancel before starting: everything is abandoned, nothing runs.
        executor.cancel_flag().store(true, Ordering::SeqCst);

        let plan = plan_for(&config, Some(&state));
        let report = executor
            .execute(&plan, &config, &mut state)
            .await
            .expect("execute should not error");

        assert!(report.incomplete);
        assert_eq!(report.abandoned, 4);
        assert!(backend.applied().is_empty());
        assert!(state.config_hash.is_empty());
    }

    #[tokio::test]
    async fn test_update_passes_existing_physical_id() {
        let config = chain_config();
        let mut state = RecordedState::new("website", "dev");
        let (first, _) = run(FakeBackend::default(), &config, &mut state).await;
        assert!(first.success);

        let zone_physical = state
            .resource("zone")
            .expect("zone recorded")
            .physical_id
            .clone();

        // Mutate a mutable attribute of the distribution.
        let mut changed = config.clone();
        if let Some(cdn) = changed.resources.iter_mut().find(|r| r.id == "cdn") {
            cdn.attributes.insert(
                String::from("price_class"),
                Value::String(String::from("cost-optimized")),
            );
        }

        let (report, _) = run(FakeBackend::default(), &changed, &mut state).await;
        assert!(report.success);
        assert_eq!(report.outcomes["cdn"].op, DiffOp::Update);
        assert_eq!(report.outcomes["cdn"].terminal, OpTerminal::Applied);
        // Unchanged resources keep their physical identity.
        assert_eq!(
            state.resource("zone").expect("zone recorded").physical_id,
            zone_physical
        );
    }

    #[tokio::test]
    async fn test_replace_deletes_old_physical_resource() {
        let api = spec(
            "api",
            ResourceKind::RestApi,
            &[("api_name", "internal"), ("endpoint_type", "regional")],
        );
        let config = config_with(vec![api]);
        let mut state = RecordedState::new("website", "dev");
        let (first, _) = run(FakeBackend::default(), &config, &mut state).await;
        assert!(first.success);

        let old_physical = state
            .resource("api")
            .expect("api recorded")
            .physical_id
            .clone();

        let changed = config_with(vec![spec(
            "api",
            ResourceKind::RestApi,
            &[("api_name", "internal"), ("endpoint_type", "private")],
        )]);

        // Continue the physical-id sequence from the first pass: a real
        // backend never reissues an id, so the replacement resource must
        // get a fresh one rather than colliding with the deleted resource.
        let backend = FakeBackend {
            counter: Mutex::new(1),
            ..FakeBackend::default()
        };
        let (report, backend) = run(backend, &changed, &mut state).await;

        assert!(report.success);
        assert_eq!(report.outcomes["api"].op, DiffOp::Replace);
        let deleted = backend.deleted.lock().expect("lock poisoned").clone();
        assert!(deleted.contains(&old_physical), "old physical resource must be deleted");
        assert_ne!(
            state.resource("api").expect("api recorded").physical_id,
            old_physical
        );
    }
}
