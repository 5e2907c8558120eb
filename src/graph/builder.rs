//! Dependency graph construction and validation.
//!
//! The builder scans every resource spec for explicit `depends_on` entries
//! and `${id.output}` references, turns them into edges, and validates the
//! result is a DAG. Ids found only in recorded state are imports: their
//! outputs are already known, so they contribute no edges.

use std::collections::{BTreeSet, HashMap};
use tracing::debug;

use crate::config::ResourceSpec;
use crate::error::{GraphError, Result, StratusError};
use crate::resolver;
use crate::state::RecordedState;

/// A validated dependency graph over the declared resources.
#[derive(Debug)]
pub struct DependencyGraph {
    /// Logical ids in declaration order.
    ids: Vec<String>,
    /// Direct dependencies per id (targets within the current spec set).
    dependencies: HashMap<String, BTreeSet<String>>,
    /// Direct dependents per id (reverse edges).
    dependents: HashMap<String, BTreeSet<String>>,
    /// Ids satisfied from recorded state rather than the current set.
    imports: BTreeSet<String>,
}

/// Builder for [`DependencyGraph`].
#[derive(Debug, Default)]
pub struct GraphBuilder;

impl GraphBuilder {
    /// Creates a new graph builder.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Builds and validates the dependency graph for a spec set.
    ///
    /// # Errors
    ///
    /// Returns `GraphError::UnresolvedReference` when a spec references an
    /// id absent from both the current set and recorded state, and
    /// `GraphError::CycleDetected` when the edges do not form a DAG.
    /// Either error aborts planning before any mutation.
    pub fn build(
        &self,
        specs: &[ResourceSpec],
        recorded: Option<&RecordedState>,
    ) -> Result<DependencyGraph> {
        let ids: Vec<String> = specs.iter().map(|s| s.id.clone()).collect();
        let declared: BTreeSet<&str> = ids.iter().map(String::as_str).collect();

        let mut dependencies: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut dependents: HashMap<String, BTreeSet<String>> = HashMap::new();
        let mut imports = BTreeSet::new();

        for id in &ids {
            dependencies.entry(id.clone()).or_default();
            dependents.entry(id.clone()).or_default();
        }

        for spec in specs {
            let mut targets: BTreeSet<String> = spec.depends_on.iter().cloned().collect();
            for reference in resolver::scan_spec(spec)? {
                targets.insert(reference.target);
            }

            for target in targets {
                if declared.contains(target.as_str()) {
                    debug!("Edge: {} depends on {}", spec.id, target);
                    if let Some(deps) = dependencies.get_mut(&spec.id) {
                        deps.insert(target.clone());
                    }
                    dependents.entry(target).or_default().insert(spec.id.clone());
                } else if recorded.is_some_and(|state| state.resource(&target).is_some()) {
                    debug!("Import: {} resolves {} from recorded state", spec.id, target);
                    imports.insert(target);
                } else {
                    return Err(StratusError::Graph(GraphError::UnresolvedReference {
                        id: spec.id.clone(),
                        target,
                    }));
                }
            }
        }

        let graph = DependencyGraph {
            ids,
            dependencies,
            dependents,
            imports,
        };

        graph.check_acyclic()?;
        Ok(graph)
    }
}

/// DFS visit state for cycle detection.
#[derive(Clone, Copy, PartialEq, Eq)]
enum Visit {
    Unvisited,
    InProgress,
    Done,
}

impl DependencyGraph {
    /// Returns the logical ids in declaration order.
    #[must_use]
    pub fn ids(&self) -> &[String] {
        &self.ids
    }

    /// Returns the number of resources in the graph.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ids.len()
    }

    /// Returns true if the graph has no resources.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    /// Returns the direct dependencies of a resource.
    #[must_use]
    pub fn dependencies_of(&self, id: &str) -> &BTreeSet<String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        self.dependencies.get(id).unwrap_or(&EMPTY)
    }

    /// Returns the direct dependents of a resource.
    #[must_use]
    pub fn dependents_of(&self, id: &str) -> &BTreeSet<String> {
        static EMPTY: BTreeSet<String> = BTreeSet::new();
        self.dependents.get(id).unwrap_or(&EMPTY)
    }

    /// Returns the ids imported from recorded state.
    #[must_use]
    pub const fn imports(&self) -> &BTreeSet<String> {
        &self.imports
    }

    /// Validates that the graph contains no cycles.
    fn check_acyclic(&self) -> Result<()> {
        let mut state: HashMap<&str, Visit> = self
            .ids
            .iter()
            .map(|id| (id.as_str(), Visit::Unvisited))
            .collect();

        for id in &self.ids {
            if state[id.as_str()] == Visit::Unvisited {
                let mut stack = Vec::new();
                self.visit(id, &mut state, &mut stack)?;
            }
        }

        Ok(())
    }

    /// DFS visit tracking the in-progress path for cycle reporting.
    fn visit<'a>(
        &'a self,
        id: &'a str,
        state: &mut HashMap<&'a str, Visit>,
        stack: &mut Vec<&'a str>,
    ) -> Result<()> {
        state.insert(id, Visit::InProgress);
        stack.push(id);

        for dep in self.dependencies_of(id) {
            match state[dep.as_str()] {
                Visit::Done => {}
                Visit::InProgress => {
                    // Reconstruct the cycle from the first occurrence of
                    // the repeated member.
                    let start = stack
                        .iter()
                        .position(|member| *member == dep.as_str())
                        .unwrap_or(0);
                    let mut cycle: Vec<String> =
                        stack[start..].iter().map(ToString::to_string).collect();
                    cycle.push(dep.clone());
                    return Err(StratusError::Graph(GraphError::CycleDetected { cycle }));
                }
                Visit::Unvisited => {
                    self.visit(dep.as_str(), state, stack)?;
                }
            }
        }

        stack.pop();
        state.insert(id, Visit::Done);
        Ok(())
    }
}
