//! Directed transition graphs between charts or between frames.
//!
//! Nodes are ids, edges carry a transition value (a coordinate change or a change
//! of frame). Edges are either registered by the user or composed from a path and
//! cached; registering an edge drops every composed edge, since those may have been
//! built from the value being replaced.

use std::collections::{BTreeMap, BTreeSet, HashMap, VecDeque};
use std::fmt::Debug;

use tracing::trace;

/// Counters describing how transitions were resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct GraphStats {
    /// Breadth-first searches performed.
    pub path_searches: usize,
    /// Requests answered by an existing direct edge.
    pub cache_hits: usize,
    /// Composed edges inserted into a graph.
    pub compositions: usize,
}

#[derive(Debug, Clone)]
struct GraphEdge<E> {
    value: E,
    composed: bool,
}

#[derive(Debug, Clone)]
pub struct TransitionGraph<K, E> {
    edges: BTreeMap<K, BTreeMap<K, GraphEdge<E>>>,
}

impl<K, E> Default for TransitionGraph<K, E> {
    fn default() -> Self {
        Self {
            edges: BTreeMap::new(),
        }
    }
}

impl<K, E> TransitionGraph<K, E>
where
    K: Ord + Copy + Debug + std::hash::Hash,
    E: Clone,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an edge, replacing any previous edge between the same nodes.
    pub fn register(&mut self, from: K, to: K, value: E) {
        let dropped = self.clear_composed();
        if dropped > 0 {
            trace!(dropped, "dropped composed transitions");
        }
        self.edges.entry(from).or_default().insert(
            to,
            GraphEdge {
                value,
                composed: false,
            },
        );
    }

    /// Removes an edge together with every composed edge.
    pub fn remove(&mut self, from: K, to: K) -> Option<E> {
        let removed = self.edges.get_mut(&from)?.remove(&to)?;
        self.clear_composed();
        Some(removed.value)
    }

    /// Caches a composed edge unless a registered one already exists.
    pub fn cache(&mut self, from: K, to: K, value: E) {
        let targets = self.edges.entry(from).or_default();
        if targets.get(&to).is_some_and(|edge| !edge.composed) {
            return;
        }
        targets.insert(
            to,
            GraphEdge {
                value,
                composed: true,
            },
        );
    }

    fn clear_composed(&mut self) -> usize {
        let mut dropped = 0;
        for targets in self.edges.values_mut() {
            let before = targets.len();
            targets.retain(|_, edge| !edge.composed);
            dropped += before - targets.len();
        }
        dropped
    }

    pub fn edge(&self, from: K, to: K) -> Option<&E> {
        self.edges
            .get(&from)
            .and_then(|targets| targets.get(&to))
            .map(|edge| &edge.value)
    }

    pub fn contains(&self, from: K, to: K) -> bool {
        self.edge(from, to).is_some()
    }

    /// Whether the edge between two nodes was registered rather than composed.
    pub fn is_registered(&self, from: K, to: K) -> bool {
        self.edges
            .get(&from)
            .and_then(|targets| targets.get(&to))
            .is_some_and(|edge| !edge.composed)
    }

    /// Direct successors of a node, in id order.
    pub fn successors(&self, from: K) -> Vec<K> {
        self.edges
            .get(&from)
            .map(|targets| targets.keys().copied().collect())
            .unwrap_or_default()
    }

    pub fn edge_count(&self) -> usize {
        self.edges.values().map(BTreeMap::len).sum()
    }

    /// Shortest path from `start` to the first node satisfying `is_goal`.
    ///
    /// Only registered edges are followed, so a path is a chain of user-provided
    /// transitions. Successors are expanded in id order, which makes the result
    /// deterministic; paths longer than `max_depth` edges are not explored.
    ///
    /// # Returns
    /// The node sequence including both ends, `[start]` if `start` is a goal itself.
    pub fn shortest_path<F>(&self, start: K, is_goal: F, max_depth: usize) -> Option<Vec<K>>
    where
        F: Fn(&K) -> bool,
    {
        if is_goal(&start) {
            return Some(vec![start]);
        }
        let mut visited: BTreeSet<K> = BTreeSet::from([start]);
        let mut parent: HashMap<K, K> = HashMap::new();
        let mut queue: VecDeque<(K, usize)> = VecDeque::from([(start, 0)]);

        while let Some((node, depth)) = queue.pop_front() {
            if depth >= max_depth {
                continue;
            }
            let Some(targets) = self.edges.get(&node) else {
                continue;
            };
            for (next, edge) in targets {
                if edge.composed || !visited.insert(*next) {
                    continue;
                }
                trace!(from = ?node, to = ?next, depth = depth + 1, "expanding transition");
                parent.insert(*next, node);
                if is_goal(next) {
                    let mut path = vec![*next];
                    let mut current = *next;
                    while let Some(previous) = parent.get(&current) {
                        path.push(*previous);
                        current = *previous;
                    }
                    path.reverse();
                    return Some(path);
                }
                queue.push_back((*next, depth + 1));
            }
        }
        None
    }

    /// Values along a path returned by [`TransitionGraph::shortest_path`].
    pub fn path_values(&self, path: &[K]) -> Option<Vec<E>> {
        path.windows(2)
            .map(|pair| self.edge(pair[0], pair[1]).cloned())
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chain() -> TransitionGraph<u32, &'static str> {
        let mut graph = TransitionGraph::new();
        graph.register(0, 1, "a");
        graph.register(1, 2, "b");
        graph.register(2, 3, "c");
        graph.register(0, 4, "d");
        graph.register(4, 3, "e");
        graph
    }

    #[test]
    fn test_shortest_path() {
        let graph = chain();
        assert_eq!(graph.shortest_path(0, |n| *n == 3, 8), Some(vec![0, 4, 3]));
        assert_eq!(graph.shortest_path(2, |n| *n == 2, 8), Some(vec![2]));
        assert_eq!(graph.shortest_path(3, |n| *n == 0, 8), None);
        assert_eq!(
            graph.path_values(&[0, 4, 3]),
            Some(vec!["d", "e"])
        );
    }

    #[test]
    fn test_remove_edge() {
        let mut graph = chain();
        graph.cache(0, 2, "ab");
        assert_eq!(graph.remove(0, 4), Some("d"));
        assert!(!graph.contains(0, 2));
        assert_eq!(graph.remove(0, 4), None);
        assert_eq!(graph.shortest_path(0, |n| *n == 3, 8), Some(vec![0, 1, 2, 3]));
    }

    #[test]
    fn test_depth_cap() {
        let graph = chain();
        assert_eq!(graph.shortest_path(1, |n| *n == 3, 1), None);
        assert_eq!(graph.shortest_path(1, |n| *n == 3, 2), Some(vec![1, 2, 3]));
    }

    #[test]
    fn test_cycle_terminates() {
        let mut graph = chain();
        graph.register(3, 0, "f");
        assert_eq!(graph.shortest_path(1, |n| *n == 9, 100), None);
    }

    #[test]
    fn test_composed_edges() {
        let mut graph = chain();
        graph.cache(1, 3, "bc");
        assert_eq!(graph.edge(1, 3), Some(&"bc"));
        assert!(!graph.is_registered(1, 3));
        // composed edges are not followed by searches
        assert_eq!(graph.shortest_path(1, |n| *n == 3, 8), Some(vec![1, 2, 3]));
        // a registered edge is never replaced by a composed one
        graph.cache(0, 1, "z");
        assert_eq!(graph.edge(0, 1), Some(&"a"));
        // registering drops the cache
        graph.register(3, 4, "g");
        assert!(!graph.contains(1, 3));
        assert_eq!(graph.edge_count(), 6);
    }
}
