//! Topological scheduling of the dependency graph.
//!
//! Produces a deterministic total order (dependencies strictly before
//! dependents, ties broken by declaration order) plus waves of mutually
//! independent resources that may execute concurrently.

use std::collections::HashMap;
use tracing::debug;

use super::builder::DependencyGraph;

/// A deterministic execution schedule for a validated graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Schedule {
    /// Total order: every dependency precedes its dependents.
    pub order: Vec<String>,
    /// Waves of mutually independent resources; wave N+1 only depends on
    /// resources in waves 0..=N.
    pub waves: Vec<Vec<String>>,
}

/// Scheduler over validated dependency graphs.
#[derive(Debug, Default)]
pub struct Scheduler;

impl Scheduler {
    /// Creates a new scheduler.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Computes the execution schedule for a graph.
    ///
    /// Re-entrant: the same graph always yields the same schedule. The
    /// builder has already rejected cycles, so every resource is placed.
    #[must_use]
    pub fn schedule(&self, graph: &DependencyGraph) -> Schedule {
        let declaration_index: HashMap<&str, usize> = graph
            .ids()
            .iter()
            .enumerate()
            .map(|(index, id)| (id.as_str(), index))
            .collect();

        let mut remaining_deps: HashMap<&str, usize> = graph
            .ids()
            .iter()
            .map(|id| (id.as_str(), graph.dependencies_of(id).len()))
            .collect();

        let mut order = Vec::with_capacity(graph.len());
        let mut waves = Vec::new();

        while order.len() < graph.len() {
            // All resources whose dependencies are fully placed, in
            // declaration order for determinism.
            let mut wave: Vec<&str> = remaining_deps
                .iter()
                .filter(|(_, count)| **count == 0)
                .map(|(id, _)| *id)
                .collect();
            wave.sort_by_key(|id| declaration_index[id]);

            debug_assert!(!wave.is_empty(), "acyclic graph must always yield a wave");
            if wave.is_empty() {
                break;
            }

            for id in &wave {
                remaining_deps.remove(id);
                for dependent in graph.dependents_of(id) {
                    if let Some(count) = remaining_deps.get_mut(dependent.as_str()) {
                        *count -= 1;
                    }
                }
            }

            debug!("Scheduled wave {}: {:?}", waves.len(), wave);
            order.extend(wave.iter().map(ToString::to_string));
            waves.push(wave.into_iter().map(ToString::to_string).collect());
        }

        Schedule { order, waves }
    }
}

impl Schedule {
    /// Returns the position of a resource in the total order.
    #[must_use]
    pub fn position(&self, id: &str) -> Option<usize> {
        self.order.iter().position(|member| member == id)
    }

    /// Returns the number of scheduled resources.
    #[must_use]
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// Returns true if nothing is scheduled.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}
