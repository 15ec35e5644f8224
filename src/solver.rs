//! Dependency solver: topological sort, cycle detection, and
//! parallel-level extraction over a `requires ∪ wants` graph.
//!
//! This module has no dependencies on the rest of the crate: it
//! operates purely on [`DependencyNode`] values, so it is reusable for
//! both single-stack container graphs and any other DAG the
//! orchestrator might need to schedule.

use crate::error::{Error, Result};
use std::collections::{HashMap, HashSet, VecDeque};

/// One node in the dependency graph.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DependencyNode {
    /// The node's unique name.
    pub name: String,
    /// Hard dependencies: must be up before this node starts.
    pub requires: Vec<String>,
    /// Soft dependencies: ordered before this node, but its absence
    /// does not prevent the node from starting.
    pub wants: Vec<String>,
}

impl DependencyNode {
    /// Construct a node with no dependencies.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            requires: Vec::new(),
            wants: Vec::new(),
        }
    }

    /// The union of `requires` and `wants`, deduplicated, preserving
    /// first-seen order (requires first, then wants).
    #[must_use]
    pub fn dependencies(&self) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        for d in self.requires.iter().chain(self.wants.iter()) {
            if seen.insert(d.clone()) {
                out.push(d.clone());
            }
        }
        out
    }
}

/// The result of solving a dependency graph: a flat topological order
/// and the same order partitioned into maximal-antichain levels.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StartOrder {
    /// Flat topological order (dependencies before dependents).
    pub order: Vec<String>,
    /// `order` partitioned into levels; every level's nodes may run
    /// concurrently with each other.
    pub levels: Vec<Vec<String>>,
}

/// Resolves the order nodes must be *started* in: dependencies before
/// dependents.
pub fn resolve_start_order(nodes: &[DependencyNode]) -> Result<StartOrder> {
    validate(nodes)?;
    let order = topological_sort(nodes)?;
    let levels = extract_levels(nodes, &order);
    Ok(StartOrder { order, levels })
}

/// Resolves the order nodes must be *stopped* in: the reverse of the
/// start order. The reversed levels remain valid stop-phase batches.
pub fn resolve_stop_order(nodes: &[DependencyNode]) -> Result<StartOrder> {
    let start = resolve_start_order(nodes)?;
    let mut order = start.order;
    order.reverse();
    let mut levels = start.levels;
    levels.reverse();
    Ok(StartOrder { order, levels })
}

fn validate(nodes: &[DependencyNode]) -> Result<()> {
    let names: HashSet<&str> = nodes.iter().map(|n| n.name.as_str()).collect();
    for node in nodes {
        for dep in node.dependencies() {
            if !names.contains(dep.as_str()) {
                return Err(Error::invalid_config(
                    format!("{}.dependencies", node.name),
                    format!("unknown dependency {dep:?}"),
                ));
            }
        }
    }
    Ok(())
}

/// Kahn's algorithm. Tie-breaking among simultaneously-ready nodes is
/// deliberately left to the queue's natural (insertion) order; the
/// spec does not require a canonical order among unrelated nodes.
fn topological_sort(nodes: &[DependencyNode]) -> Result<Vec<String>> {
    let mut in_degree: HashMap<&str, usize> = HashMap::new();
    let mut dependents: HashMap<&str, Vec<&str>> = HashMap::new();

    for node in nodes {
        in_degree.entry(node.name.as_str()).or_insert(0);
        dependents.entry(node.name.as_str()).or_default();
    }
    for node in nodes {
        let deps = node.dependencies();
        *in_degree.get_mut(node.name.as_str()).unwrap() += deps.len();
        for dep in &deps {
            dependents
                .entry(dep.as_str())
                .or_default()
                .push(node.name.as_str());
        }
    }

    let mut queue: VecDeque<&str> = nodes
        .iter()
        .map(|n| n.name.as_str())
        .filter(|n| in_degree[n] == 0)
        .collect();

    let mut output = Vec::with_capacity(nodes.len());
    while let Some(name) = queue.pop_front() {
        output.push(name.to_string());
        if let Some(deps) = dependents.get(name) {
            for &dependent in deps {
                let degree = in_degree.get_mut(dependent).unwrap();
                *degree -= 1;
                if *degree == 0 {
                    queue.push_back(dependent);
                }
            }
        }
    }

    if output.len() != nodes.len() {
        return Err(Error::invalid_config("dependencies", "cycle detected"));
    }
    Ok(output)
}

fn extract_levels(nodes: &[DependencyNode], order: &[String]) -> Vec<Vec<String>> {
    let by_name: HashMap<&str, &DependencyNode> =
        nodes.iter().map(|n| (n.name.as_str(), n)).collect();

    let mut placed: HashSet<String> = HashSet::new();
    let mut remaining: Vec<&String> = order.iter().collect();
    let mut levels = Vec::new();

    while !remaining.is_empty() {
        let (ready, not_ready): (Vec<&String>, Vec<&String>) = remaining.into_iter().partition(
            |name| match by_name.get(name.as_str()) {
                Some(node) => node.dependencies().iter().all(|d| placed.contains(d)),
                None => true,
            },
        );
        if ready.is_empty() {
            // Cannot happen given `order` is a valid topological sort,
            // but terminate defensively rather than loop forever.
            break;
        }
        for name in &ready {
            placed.insert((*name).clone());
        }
        levels.push(ready.into_iter().cloned().collect());
        remaining = not_ready;
    }
    levels
}

/// Direct consumers of `name`: nodes whose `requires`/`wants` name it.
#[must_use]
pub fn dependents<'a>(nodes: &'a [DependencyNode], name: &str) -> Vec<&'a str> {
    nodes
        .iter()
        .filter(|n| n.dependencies().iter().any(|d| d == name))
        .map(|n| n.name.as_str())
        .collect()
}

/// BFS closure of `name`'s transitive dependencies through
/// `requires ∪ wants`.
#[must_use]
pub fn all_dependencies(nodes: &[DependencyNode], name: &str) -> Vec<String> {
    let by_name: HashMap<&str, &DependencyNode> =
        nodes.iter().map(|n| (n.name.as_str(), n)).collect();

    let mut visited = HashSet::new();
    let mut queue = VecDeque::new();
    if let Some(start) = by_name.get(name) {
        queue.extend(start.dependencies());
    }
    let mut out = Vec::new();
    while let Some(dep) = queue.pop_front() {
        if visited.insert(dep.clone()) {
            out.push(dep.clone());
            if let Some(node) = by_name.get(dep.as_str()) {
                queue.extend(node.dependencies());
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str, requires: &[&str]) -> DependencyNode {
        DependencyNode {
            name: name.to_string(),
            requires: requires.iter().map(|s| s.to_string()).collect(),
            wants: Vec::new(),
        }
    }

    fn index_of(order: &[String], name: &str) -> usize {
        order.iter().position(|n| n == name).unwrap()
    }

    #[test]
    fn linear_chain_start_and_stop_order() {
        let nodes = vec![node("A", &["B", "C"]), node("B", &["C"]), node("C", &[])];
        let start = resolve_start_order(&nodes).unwrap();
        assert_eq!(start.order, vec!["C", "B", "A"]);
        assert_eq!(
            start.levels,
            vec![vec!["C".to_string()], vec!["B".to_string()], vec!["A".to_string()]]
        );

        let stop = resolve_stop_order(&nodes).unwrap();
        assert_eq!(stop.order, vec!["A", "B", "C"]);
        assert_eq!(
            stop.levels,
            vec![vec!["A".to_string()], vec!["B".to_string()], vec!["C".to_string()]]
        );
    }

    #[test]
    fn diamond_shares_a_level() {
        let nodes = vec![node("A", &["C"]), node("B", &["C"]), node("C", &[])];
        let start = resolve_start_order(&nodes).unwrap();
        assert_eq!(start.levels[0], vec!["C".to_string()]);
        let mut second = start.levels[1].clone();
        second.sort();
        assert_eq!(second, vec!["A".to_string(), "B".to_string()]);
    }

    #[test]
    fn cycle_is_rejected() {
        let nodes = vec![node("A", &["B"]), node("B", &["A"])];
        let err = resolve_start_order(&nodes).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    #[test]
    fn unknown_dependency_is_rejected() {
        let nodes = vec![node("A", &["ghost"])];
        let err = resolve_start_order(&nodes).unwrap_err();
        assert!(matches!(err, Error::InvalidConfig { .. }));
    }

    // Every node must appear after all of its dependencies.
    #[test]
    fn topological_soundness_holds_on_a_wider_graph() {
        let nodes = vec![
            node("web", &["app"]),
            node("app", &["db", "cache"]),
            node("db", &[]),
            node("cache", &[]),
        ];
        let start = resolve_start_order(&nodes).unwrap();
        for n in &nodes {
            for dep in n.dependencies() {
                assert!(index_of(&start.order, &dep) < index_of(&start.order, &n.name));
            }
        }
    }

    // Every node's dependencies must land in a strictly earlier level.
    #[test]
    fn level_soundness_holds() {
        let nodes = vec![
            node("web", &["app"]),
            node("app", &["db", "cache"]),
            node("db", &[]),
            node("cache", &[]),
        ];
        let start = resolve_start_order(&nodes).unwrap();
        let mut placed: HashSet<String> = HashSet::new();
        for level in &start.levels {
            for name in level {
                let node = nodes.iter().find(|n| &n.name == name).unwrap();
                for dep in node.dependencies() {
                    assert!(placed.contains(&dep));
                }
            }
            placed.extend(level.iter().cloned());
        }
        let flattened: Vec<String> = start.levels.iter().flatten().cloned().collect();
        assert_eq!(flattened, start.order);
    }

    #[test]
    fn dependents_and_closure_queries() {
        let nodes = vec![
            node("web", &["app"]),
            node("app", &["db"]),
            node("db", &[]),
        ];
        assert_eq!(dependents(&nodes, "app"), vec!["web"]);
        let mut closure = all_dependencies(&nodes, "web");
        closure.sort();
        assert_eq!(closure, vec!["app".to_string(), "db".to_string()]);
    }
}
