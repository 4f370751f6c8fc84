//! Dependency graph over config objects.
//!
//! Builds a directed graph from each object's declared config dependencies
//! (edges point dependent -> dependency) and answers the two questions the
//! sync pipeline needs:
//!
//! - a deterministic topological order (dependencies before dependents)
//! - the set of objects that directly or transitively depend on a name
//!
//! Cycles are a hard error naming the involved objects; no partial
//! ordering is ever returned. Dependencies on names absent from the set
//! add no edge; their existence is checked during import validation.

use crate::error::{Result, SyncError};
use crate::object::{self, ConfigObject};
use petgraph::Direction;
use petgraph::algo::tarjan_scc;
use petgraph::graph::{DiGraph, NodeIndex};
use std::collections::{HashMap, HashSet, VecDeque};

/// Directed dependency graph with deterministic ordering.
#[derive(Debug)]
pub struct DependencyManager {
    graph: DiGraph<String, ()>,
    indices: HashMap<String, NodeIndex>,
    insertion: HashMap<NodeIndex, usize>,
}

impl DependencyManager {
    /// Build the graph from a set of config objects.
    ///
    /// Fails with `SyncError::GraphBuild` if any object declares a
    /// dependency whose name is syntactically invalid.
    pub fn build(objects: &[ConfigObject]) -> Result<Self> {
        let mut graph = DiGraph::new();
        let mut indices = HashMap::new();
        let mut insertion = HashMap::new();

        for (position, obj) in objects.iter().enumerate() {
            let idx = graph.add_node(obj.name().to_string());
            indices.insert(obj.name().to_string(), idx);
            insertion.insert(idx, position);
        }

        for obj in objects {
            let Some(&from) = indices.get(obj.name()) else {
                continue;
            };
            for dep in obj.dependencies().effective_config() {
                if !object::is_valid_name(&dep) {
                    return Err(SyncError::GraphBuild(format!(
                        "config object '{}' declares invalid dependency name '{}'",
                        obj.name(),
                        dep
                    )));
                }
                // Edges only for dependencies present in this set; missing
                // names are a validation concern, not a graph concern.
                if let Some(&to) = indices.get(dep.as_str()) {
                    graph.add_edge(from, to, ());
                }
            }
        }

        Ok(Self {
            graph,
            indices,
            insertion,
        })
    }

    /// Number of objects in the graph.
    pub fn len(&self) -> usize {
        self.graph.node_count()
    }

    /// Whether the graph is empty.
    pub fn is_empty(&self) -> bool {
        self.graph.node_count() == 0
    }

    /// Whether a name is part of the graph.
    pub fn contains(&self, name: &str) -> bool {
        self.indices.contains_key(name)
    }

    /// Names such that each appears after all of its dependencies.
    ///
    /// Deterministic: ordered by dependency depth ascending, then by the
    /// original insertion order, so repeated calls over the same input
    /// produce the same sequence.
    pub fn topological_order(&self) -> Result<Vec<String>> {
        self.check_acyclic()?;

        let mut depths: HashMap<NodeIndex, usize> = HashMap::new();
        let mut order: Vec<NodeIndex> = self.graph.node_indices().collect();
        for &idx in &order {
            self.depth_of(idx, &mut depths);
        }

        order.sort_by_key(|idx| (depths[idx], self.insertion[idx]));

        Ok(order
            .into_iter()
            .map(|idx| self.graph[idx].clone())
            .collect())
    }

    /// Names that directly or transitively depend on `name`, sorted.
    ///
    /// Used to decide deletion cascade candidates: deleting `name` is only
    /// safe when every returned name is going away too.
    pub fn dependents_of(&self, name: &str) -> Vec<String> {
        let Some(&start) = self.indices.get(name) else {
            return Vec::new();
        };

        let mut seen: HashSet<NodeIndex> = HashSet::new();
        let mut queue: VecDeque<NodeIndex> = VecDeque::new();
        queue.push_back(start);

        while let Some(idx) = queue.pop_front() {
            for dependent in self.graph.neighbors_directed(idx, Direction::Incoming) {
                if dependent != start && seen.insert(dependent) {
                    queue.push_back(dependent);
                }
            }
        }

        let mut names: Vec<String> = seen.into_iter().map(|idx| self.graph[idx].clone()).collect();
        names.sort();
        names
    }

    /// Fail with `CyclicDependency` if any strongly connected component has
    /// more than one node, or a node depends on itself.
    fn check_acyclic(&self) -> Result<()> {
        for component in tarjan_scc(&self.graph) {
            let cyclic = component.len() > 1
                || component
                    .first()
                    .is_some_and(|&idx| self.graph.find_edge(idx, idx).is_some());
            if cyclic {
                let mut names: Vec<String> = component
                    .into_iter()
                    .map(|idx| self.graph[idx].clone())
                    .collect();
                names.sort();
                return Err(SyncError::CyclicDependency(names));
            }
        }
        Ok(())
    }

    /// Dependency depth: 0 for objects with no in-set dependencies, else
    /// one more than the deepest dependency. Only called on acyclic graphs.
    fn depth_of(&self, idx: NodeIndex, depths: &mut HashMap<NodeIndex, usize>) -> usize {
        if let Some(&depth) = depths.get(&idx) {
            return depth;
        }

        let depth = self
            .graph
            .neighbors_directed(idx, Direction::Outgoing)
            .collect::<Vec<_>>()
            .into_iter()
            .map(|dep| self.depth_of(dep, depths) + 1)
            .max()
            .unwrap_or(0);

        depths.insert(idx, depth);
        depth
    }
}
