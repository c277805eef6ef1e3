use fixedbitset::FixedBitSet;
use flowsched_core::SchedError;
use petgraph::{
    algo::{
        bellman_ford, toposort,
        tred::{dag_to_toposorted_adjacency_list, dag_transitive_reduction_closure},
    },
    graph::{DefaultIx, DiGraph, NodeIndex},
    visit::IntoNeighbors,
};

/// Intra-iteration precedence graph over dense instance indices.
#[derive(Debug, Clone)]
pub struct InstanceGraph {
    graph: DiGraph<usize, ()>,
    labels: Vec<String>,
}

impl InstanceGraph {
    /// One node per label, one edge per (producer, consumer) index pair.
    pub fn new<I>(labels: Vec<String>, edges: I) -> InstanceGraph
    where
        I: IntoIterator<Item = (usize, usize)>,
    {
        let mut graph = DiGraph::with_capacity(labels.len(), labels.len());
        for i in 0..labels.len() {
            graph.add_node(i);
        }
        for (src, dst) in edges {
            graph.update_edge(NodeIndex::new(src), NodeIndex::new(dst), ());
        }
        InstanceGraph { graph, labels }
    }

    pub fn len(&self) -> usize {
        self.labels.len()
    }

    pub fn is_empty(&self) -> bool {
        self.labels.is_empty()
    }

    pub fn edges(&self) -> impl Iterator<Item = (usize, usize)> + '_ {
        self.graph
            .raw_edges()
            .iter()
            .map(|e| (e.source().index(), e.target().index()))
    }

    /// Instances in an order where every producer precedes its consumers.
    pub fn topological_order(&self) -> Result<Vec<usize>, SchedError> {
        toposort(&self.graph, None)
            .map(|order| order.into_iter().map(|n| n.index()).collect())
            .map_err(|cycle| {
                SchedError::CyclicPrecedence(self.labels[cycle.node_id().index()].clone())
            })
    }

    /// Longest path, counted in edges, from any source to each instance.
    pub fn hop_distances(&self) -> Result<Vec<u64>, SchedError> {
        self.longest_paths(|_| 1.0)
            .map(|d| d.into_iter().map(|x| x as u64).collect())
    }

    /// Length of the longest chain of dependent instances, counting their durations.
    pub fn critical_path(&self, durations: &[u64]) -> Result<u64, SchedError> {
        let reach = self.longest_paths(|src| durations[src] as f64)?;
        Ok(reach
            .iter()
            .enumerate()
            .map(|(i, d)| *d as u64 + durations[i])
            .max()
            .unwrap_or(0))
    }

    /// Longest distances from a virtual root linked to every node, as shortest distances over
    /// negated weights.
    fn longest_paths<F>(&self, weight: F) -> Result<Vec<f64>, SchedError>
    where
        F: Fn(usize) -> f64,
    {
        let n = self.labels.len();
        let mut negated: DiGraph<(), f64> = DiGraph::with_capacity(n + 1, self.graph.edge_count() + n);
        for _ in 0..=n {
            negated.add_node(());
        }
        let root = NodeIndex::new(n);
        for i in 0..n {
            negated.add_edge(root, NodeIndex::new(i), 0.0);
        }
        for (src, dst) in self.edges() {
            negated.add_edge(NodeIndex::new(src), NodeIndex::new(dst), -weight(src));
        }
        let paths = bellman_ford(&negated, root).map_err(|_| SchedError::NegativeCycle)?;
        Ok(paths.distances[..n].iter().map(|d| -d).collect())
    }
}

/// Transitive closure of an [InstanceGraph], one successor bitset per instance.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Reachability {
    successors: Vec<FixedBitSet>,
}

impl Reachability {
    pub fn compute(g: &InstanceGraph) -> Result<Reachability, SchedError> {
        let n = g.len();
        let order = toposort(&g.graph, None).map_err(|cycle| {
            SchedError::CyclicPrecedence(g.labels[cycle.node_id().index()].clone())
        })?;
        let (adjacency, revmap) =
            dag_to_toposorted_adjacency_list::<_, DefaultIx>(&g.graph, &order);
        let (_, closure) = dag_transitive_reduction_closure::<(), DefaultIx>(&adjacency);
        let mut successors = vec![FixedBitSet::with_capacity(n); n];
        for (node, reach) in successors.iter_mut().enumerate() {
            for succ in closure.neighbors(revmap[node]) {
                reach.insert(order[succ as usize].index());
            }
        }
        Ok(Reachability { successors })
    }

    /// Whether a non-empty path leads from `a` to `b`.
    pub fn reaches(&self, a: usize, b: usize) -> bool {
        self.successors[a].contains(b)
    }

    /// Whether `a` and `b` can never run concurrently within one iteration.
    pub fn ordered(&self, a: usize, b: usize) -> bool {
        self.reaches(a, b) || self.reaches(b, a)
    }

    pub fn successors(&self, a: usize) -> &FixedBitSet {
        &self.successors[a]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn diamond() -> InstanceGraph {
        InstanceGraph::new(
            ["a", "b", "c", "d", "e"].iter().map(|s| s.to_string()).collect(),
            vec![(0, 1), (0, 2), (1, 3), (2, 3)],
        )
    }

    #[test]
    fn closure_is_transitive_and_irreflexive() {
        let r = Reachability::compute(&diamond()).unwrap();
        assert!(r.reaches(0, 3));
        assert!(!r.reaches(3, 0));
        assert!(!r.reaches(1, 1));
        assert!(!r.ordered(1, 2));
        assert!(r.ordered(3, 0));
        assert!(!r.ordered(4, 0));
    }

    #[test]
    fn hop_distances_follow_longest_path() {
        let g = InstanceGraph::new(
            ["a", "b", "c"].iter().map(|s| s.to_string()).collect(),
            vec![(0, 1), (1, 2), (0, 2)],
        );
        assert_eq!(g.hop_distances().unwrap(), vec![0, 1, 2]);
        assert_eq!(g.critical_path(&[3, 4, 1]).unwrap(), 8);
    }

    #[test]
    fn cycles_are_reported_by_name() {
        let g = InstanceGraph::new(
            ["a", "b"].iter().map(|s| s.to_string()).collect(),
            vec![(0, 1), (1, 0)],
        );
        assert!(matches!(
            g.topological_order(),
            Err(SchedError::CyclicPrecedence(_))
        ));
        assert_eq!(g.hop_distances(), Err(SchedError::NegativeCycle));
        assert!(Reachability::compute(&g).is_err());
    }
}
