use std::collections::{HashMap, HashSet};

use crate::error::ExecutorError;

use super::job::{Unit, UnitId};

/// One schedulable entry: a job, or a group acting as completion marker.
#[derive(Debug, Clone)]
pub struct Node {
    pub unit: Unit,
    /// Units this node waits for. A group marker waits for all its members.
    pub dependencies: Vec<Unit>,
}

impl Node {
    pub fn is_job(&self) -> bool {
        matches!(self.unit, Unit::Job(_))
    }
}

/// Dependency graph of one submitted batch.
#[derive(Debug, Clone, Default)]
pub struct DependencyGraph {
    nodes: HashMap<UnitId, Node>,

    /// Original insertion order (for stable scheduling and reporting)
    insertion_order: Vec<UnitId>,
}

impl DependencyGraph {
    /// Flatten submitted units into graph nodes.
    pub fn from_units(units: &[Unit]) -> Result<Self, ExecutorError> {
        let mut nodes = HashMap::new();
        let mut insertion_order = Vec::new();

        for unit in units.iter().flat_map(Unit::expand) {
            if nodes.contains_key(&unit.id()) {
                return Err(ExecutorError::DuplicateUnit(unit.name().to_string()));
            }
            if unit.is_frozen() {
                return Err(ExecutorError::AlreadySubmitted(unit.name().to_string()));
            }

            let dependencies = match &unit {
                Unit::Job(job) => job.dependencies(),
                Unit::Group(group) => group.members().iter().map(Unit::from).collect(),
            };

            insertion_order.push(unit.id());
            nodes.insert(unit.id(), Node { unit, dependencies });
        }

        Ok(Self {
            nodes,
            insertion_order,
        })
    }

    /// Validate dependency relationships
    pub fn validate(&self) -> Result<(), ExecutorError> {
        // Check all dependencies exist
        for node in self.nodes_in_order() {
            let missing: Vec<String> = node
                .dependencies
                .iter()
                .filter(|dep| !self.nodes.contains_key(&dep.id()))
                .map(|dep| dep.name().to_string())
                .collect();
            if !missing.is_empty() {
                return Err(ExecutorError::DependencyNotFound {
                    unit: node.unit.name().to_string(),
                    missing,
                });
            }
        }

        // Detect circular dependencies
        if let Some(path) = self.detect_cycle() {
            return Err(ExecutorError::CircularDependency { path });
        }

        Ok(())
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn node(&self, id: UnitId) -> Option<&Node> {
        self.nodes.get(&id)
    }

    pub fn nodes_in_order(&self) -> impl Iterator<Item = &Node> {
        self.insertion_order
            .iter()
            .filter_map(|id| self.nodes.get(id))
    }

    pub fn ids_in_order(&self) -> &[UnitId] {
        &self.insertion_order
    }

    pub fn job_count(&self) -> usize {
        self.nodes.values().filter(|n| n.is_job()).count()
    }

    /// Lock every unit's dependency list for the lifetime of the batch.
    pub(crate) fn freeze(&self) {
        for node in self.nodes.values() {
            node.unit.freeze();
        }
    }

    /// Detect circular dependencies using DFS
    ///
    /// Returns the names along the DFS path, ending with the node that
    /// closed the cycle.
    ///
    /// # Time Complexity
    ///
    /// O(V + E) where V = number of units, E = number of dependencies
    fn detect_cycle(&self) -> Option<Vec<String>> {
        let mut visited = HashSet::new();
        let mut stack = Vec::new();

        for id in &self.insertion_order {
            if !visited.contains(id) && self.dfs_cycle(*id, &mut visited, &mut stack) {
                return Some(
                    stack
                        .iter()
                        .filter_map(|id| self.nodes.get(id))
                        .map(|n| n.unit.name().to_string())
                        .collect(),
                );
            }
        }

        None
    }

    fn dfs_cycle(
        &self,
        id: UnitId,
        visited: &mut HashSet<UnitId>,
        stack: &mut Vec<UnitId>,
    ) -> bool {
        visited.insert(id);
        stack.push(id);

        if let Some(node) = self.nodes.get(&id) {
            for dep in &node.dependencies {
                let dep_id = dep.id();
                // Check if dependency is in current path (cycle detected)
                if stack.contains(&dep_id) {
                    stack.push(dep_id);
                    return true;
                }

                // Recursively check unvisited dependencies
                if !visited.contains(&dep_id) && self.dfs_cycle(dep_id, visited, stack) {
                    return true;
                }
            }
        }

        stack.pop();
        false
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;
    use crate::executor::job::{Job, JobGroup};

    fn job(name: &str) -> Job {
        Job::builder(["true"]).name(name).build()
    }

    #[test]
    fn flattens_groups_after_their_members() {
        let solo = job("solo");
        let group = JobGroup::new("g", vec![job("a"), job("b")]).unwrap();
        let graph =
            DependencyGraph::from_units(&[Unit::from(&solo), Unit::from(&group)]).unwrap();

        let names: Vec<_> = graph.nodes_in_order().map(|n| n.unit.name()).collect();
        assert_eq!(names, vec!["solo", "a", "b", "g"]);
        assert_eq!(graph.job_count(), 3);

        let marker = graph.node(group.id()).unwrap();
        assert_eq!(marker.dependencies.len(), 2);
        graph.validate().unwrap();
    }

    #[test]
    fn dangling_dependency_lists_missing_names() {
        let a = job("a");
        let outside = job("outside");
        let other = job("other");
        a.add_dependency(&outside).unwrap();
        a.add_dependency(&other).unwrap();

        let graph = DependencyGraph::from_units(&[Unit::from(&a)]).unwrap();
        match graph.validate() {
            Err(ExecutorError::DependencyNotFound { unit, missing }) => {
                assert_eq!(unit, "a");
                assert_eq!(missing, vec!["outside", "other"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn reports_full_cycle_path() {
        let (a, b, c) = (job("a"), job("b"), job("c"));
        a.add_dependency(&b).unwrap();
        b.add_dependency(&c).unwrap();
        c.add_dependency(&a).unwrap();

        let graph =
            DependencyGraph::from_units(&[Unit::from(&a), Unit::from(&b), Unit::from(&c)])
                .unwrap();
        match graph.validate() {
            Err(ExecutorError::CircularDependency { path }) => {
                assert_eq!(path, vec!["a", "b", "c", "a"]);
            }
            other => panic!("unexpected: {other:?}"),
        }
    }

    #[test]
    fn cycle_through_a_group_is_found() {
        let (a, b) = (job("a"), job("b"));
        let outer = job("outer");
        let group = JobGroup::new("g", vec![a.clone(), b.clone()]).unwrap();
        outer.add_dependency(&group).unwrap();
        a.add_dependency(&outer).unwrap();

        let graph =
            DependencyGraph::from_units(&[Unit::from(&group), Unit::from(&outer)]).unwrap();
        assert!(matches!(
            graph.validate(),
            Err(ExecutorError::CircularDependency { .. })
        ));
    }

    #[test]
    fn duplicate_submission_is_rejected() {
        let a = job("a");
        let group = JobGroup::new("g", vec![a.clone()]).unwrap();
        let err = DependencyGraph::from_units(&[Unit::from(&a), Unit::from(&group)]).unwrap_err();
        assert!(matches!(err, ExecutorError::DuplicateUnit(name) if name == "a"));
    }

    #[test]
    fn frozen_units_cannot_be_resubmitted() {
        let a = job("a");
        let graph = DependencyGraph::from_units(&[Unit::from(&a)]).unwrap();
        graph.freeze();
        assert!(matches!(
            DependencyGraph::from_units(&[Unit::from(&a)]),
            Err(ExecutorError::AlreadySubmitted(_))
        ));
    }
}
