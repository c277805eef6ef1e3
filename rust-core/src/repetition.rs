use std::collections::VecDeque;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::SchedError;
use crate::graph::{ActorId, SdfGraph};

pub fn gcd(a: u64, b: u64) -> u64 {
    let (mut a, mut b) = (a, b);
    while b != 0 {
        let t = a % b;
        a = b;
        b = t;
    }
    a
}

pub fn lcm(a: u64, b: u64) -> u64 {
    if a == 0 || b == 0 {
        0
    } else {
        a / gcd(a, b) * b
    }
}

/// Repetition vector of an SDF graph: how many times each actor fires per iteration.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct RepetitionSolution {
    counts: Vec<u64>,
}

impl RepetitionSolution {
    pub fn from_counts(counts: Vec<u64>) -> RepetitionSolution {
        RepetitionSolution { counts }
    }

    /// Solves the balance equations of `graph` for the smallest positive integer solution of
    /// each connected component.
    pub fn compute(graph: &SdfGraph) -> Result<RepetitionSolution, SchedError> {
        let n = graph.num_actors();
        // rational firing ratio of each actor, as (numerator, denominator)
        let mut ratios: Vec<Option<(u64, u64)>> = vec![None; n];
        let mut counts = vec![0u64; n];
        for root in 0..n {
            if ratios[root].is_some() {
                continue;
            }
            ratios[root] = Some((1, 1));
            let mut component = vec![root];
            let mut queue = VecDeque::from([root]);
            while let Some(current) = queue.pop_front() {
                for (_, c) in graph.channels() {
                    let (a, b) = (c.producer().index(), c.consumer().index());
                    if a != current && b != current {
                        continue;
                    }
                    let (na, nb) = (c.production_rate(), c.consumption_rate());
                    match (ratios[a], ratios[b]) {
                        (Some((pa, qa)), None) => {
                            ratios[b] = Some(reduce(pa * na, qa * nb));
                            component.push(b);
                            queue.push_back(b);
                        }
                        (None, Some((pb, qb))) => {
                            ratios[a] = Some(reduce(pb * nb, qb * na));
                            component.push(a);
                            queue.push_back(a);
                        }
                        (Some((pa, qa)), Some((pb, qb))) => {
                            if pa * na * qb != pb * nb * qa {
                                return Err(SchedError::InconsistentRates {
                                    channel: c.name.clone(),
                                    produced: pa * na * qb,
                                    consumed: pb * nb * qa,
                                });
                            }
                        }
                        (None, None) => {}
                    }
                }
            }
            let denominators = component
                .iter()
                .filter_map(|i| ratios[*i].map(|(_, q)| q))
                .fold(1, lcm);
            let mut g = 0;
            for i in &component {
                if let Some((p, q)) = ratios[*i] {
                    counts[*i] = p * (denominators / q);
                    g = gcd(g, counts[*i]);
                }
            }
            for i in &component {
                counts[*i] /= g.max(1);
            }
        }
        Ok(RepetitionSolution { counts })
    }

    pub fn get(&self, actor: ActorId) -> u64 {
        self.counts.get(actor.index()).copied().unwrap_or(0)
    }

    pub fn counts(&self) -> &[u64] {
        &self.counts
    }

    /// Appends the count of an actor added after the solution was computed.
    pub fn push(&mut self, count: u64) -> ActorId {
        self.counts.push(count);
        ActorId(self.counts.len() - 1)
    }

    pub fn total_instances(&self) -> u64 {
        self.counts.iter().sum()
    }

    /// Checks `nA·qA = nB·qB` on every channel and that no actor is left out.
    pub fn verify(&self, graph: &SdfGraph) -> Result<(), SchedError> {
        for (id, a) in graph.actors() {
            if self.get(id) == 0 {
                return Err(SchedError::ZeroRepetition(a.name.clone()));
            }
        }
        for (_, c) in graph.channels() {
            let produced = c.production_rate() * self.get(c.producer());
            let consumed = c.consumption_rate() * self.get(c.consumer());
            if produced != consumed {
                return Err(SchedError::InconsistentRates {
                    channel: c.name.clone(),
                    produced,
                    consumed,
                });
            }
        }
        Ok(())
    }
}

fn reduce(p: u64, q: u64) -> (u64, u64) {
    let g = gcd(p, q).max(1);
    (p / g, q / g)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ActorKind;

    #[test]
    fn solves_a_multirate_chain() {
        let mut g = SdfGraph::new();
        let a = g.add_actor("A", 1, ActorKind::Compute).unwrap();
        let b = g.add_actor("B", 1, ActorKind::Compute).unwrap();
        let c = g.add_actor("C", 1, ActorKind::Compute).unwrap();
        g.add_channel("ab", a, 2, b, 3, 0).unwrap();
        g.add_channel("bc", b, 1, c, 2, 0).unwrap();
        let q = RepetitionSolution::compute(&g).unwrap();
        assert_eq!(q.counts(), &[3, 2, 1]);
        assert!(q.verify(&g).is_ok());
    }

    #[test]
    fn rejects_inconsistent_cycles() {
        let mut g = SdfGraph::new();
        let a = g.add_actor("A", 1, ActorKind::Compute).unwrap();
        let b = g.add_actor("B", 1, ActorKind::Compute).unwrap();
        g.add_channel("ab", a, 2, b, 1, 0).unwrap();
        g.add_channel("ba", b, 1, a, 1, 2).unwrap();
        assert!(matches!(
            RepetitionSolution::compute(&g),
            Err(SchedError::InconsistentRates { .. })
        ));
    }

    #[test]
    fn verify_catches_wrong_counts() {
        let mut g = SdfGraph::new();
        let a = g.add_actor("A", 1, ActorKind::Compute).unwrap();
        let b = g.add_actor("B", 1, ActorKind::Compute).unwrap();
        g.add_channel("ab", a, 2, b, 1, 0).unwrap();
        let q = RepetitionSolution::from_counts(vec![1, 1]);
        assert_eq!(
            q.verify(&g),
            Err(SchedError::InconsistentRates {
                channel: "ab".to_string(),
                produced: 2,
                consumed: 1
            })
        );
    }
}
