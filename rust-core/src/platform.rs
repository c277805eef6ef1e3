use std::collections::BTreeMap;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::errors::SchedError;
use crate::graph::{ActorId, SdfGraph};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Processor {
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct DmaEngine {
    pub name: String,
}

#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct ClusterId(pub usize);

impl ClusterId {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// A group of processors sharing a local memory, plus the DMA engines that move data in and
/// out of that memory.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Cluster {
    pub name: String,
    pub processors: Vec<Processor>,
    #[serde(default)]
    pub dma_engines: Vec<DmaEngine>,
}

impl Cluster {
    /// A cluster whose processors and engines are named after the cluster.
    pub fn uniform(name: &str, processors: usize, dma_engines: usize) -> Cluster {
        Cluster {
            name: name.to_string(),
            processors: (0..processors)
                .map(|i| Processor {
                    name: format!("{}_pe{}", name, i),
                })
                .collect(),
            dma_engines: (0..dma_engines)
                .map(|i| DmaEngine {
                    name: format!("{}_dma{}", name, i),
                })
                .collect(),
        }
    }

    pub fn num_proc_in_cluster(&self) -> usize {
        self.processors.len()
    }

    pub fn num_dma_in_cluster(&self) -> usize {
        self.dma_engines.len()
    }

    pub fn processor(&self, i: usize) -> Option<&Processor> {
        self.processors.get(i)
    }

    pub fn dma_engine(&self, i: usize) -> Option<&DmaEngine> {
        self.dma_engines.get(i)
    }
}

fn default_bandwidth() -> u64 {
    1
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
pub struct Platform {
    pub clusters: Vec<Cluster>,
    /// Fixed cost, in time units, of issuing one DMA transfer.
    #[serde(default)]
    pub dma_setup_time: u64,
    #[serde(default = "default_bandwidth")]
    pub dma_bytes_per_cycle: u64,
}

impl Platform {
    /// A single shared-memory cluster with `processors` processors and no DMA.
    pub fn shared_memory(processors: usize) -> Platform {
        Platform {
            clusters: vec![Cluster::uniform("cluster0", processors, 0)],
            dma_setup_time: 0,
            dma_bytes_per_cycle: 1,
        }
    }

    pub fn dma_setup_time(&self) -> u64 {
        self.dma_setup_time
    }

    /// Duration of a DMA transfer of `bytes` bytes, setup included.
    pub fn transfer_time(&self, bytes: u64) -> u64 {
        let bw = self.dma_bytes_per_cycle.max(1);
        self.dma_setup_time + (bytes + bw - 1) / bw
    }

    pub fn cluster(&self, id: ClusterId) -> &Cluster {
        &self.clusters[id.index()]
    }

    pub fn clusters(&self) -> impl Iterator<Item = (ClusterId, &Cluster)> + '_ {
        self.clusters
            .iter()
            .enumerate()
            .map(|(i, c)| (ClusterId(i), c))
    }

    pub fn get_cluster(&self, name: &str) -> Result<ClusterId, SchedError> {
        self.clusters
            .iter()
            .position(|c| c.name == name)
            .map(ClusterId)
            .ok_or_else(|| SchedError::UnknownCluster(name.to_string()))
    }

    pub fn num_processors(&self) -> usize {
        self.clusters.iter().map(|c| c.num_proc_in_cluster()).sum()
    }
}

/// Static partition of the application actors over the platform clusters.
///
/// On a single-cluster platform actors may be left unallocated; they are placed on that one
/// cluster.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize, JsonSchema)]
pub struct SchedulingConstraints {
    #[serde(default)]
    pub allocation: BTreeMap<String, String>,
}

impl SchedulingConstraints {
    pub fn allocate(&mut self, actor: &str, cluster: &str) -> &mut Self {
        self.allocation
            .insert(actor.to_string(), cluster.to_string());
        self
    }

    pub fn actor_allocated_cluster(
        &self,
        actor: &str,
        platform: &Platform,
    ) -> Result<ClusterId, SchedError> {
        match self.allocation.get(actor) {
            Some(cluster) => platform.get_cluster(cluster),
            None if platform.clusters.len() == 1 => Ok(ClusterId(0)),
            None => Err(SchedError::UnmappedActor(actor.to_string())),
        }
    }

    pub fn actors_mapped_to_cluster(
        &self,
        graph: &SdfGraph,
        platform: &Platform,
        cluster: ClusterId,
    ) -> Result<Vec<ActorId>, SchedError> {
        let mut mapped = vec![];
        for (id, a) in graph.actors() {
            if self.actor_allocated_cluster(&a.name, platform)? == cluster {
                mapped.push(id);
            }
        }
        Ok(mapped)
    }

    /// Checks that every allocation names an existing actor and cluster.
    pub fn validate(&self, graph: &SdfGraph, platform: &Platform) -> Result<(), SchedError> {
        for (actor, cluster) in &self.allocation {
            graph.get_actor(actor)?;
            platform.get_cluster(cluster)?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::ActorKind;

    #[test]
    fn transfer_time_rounds_up() {
        let mut p = Platform::shared_memory(2);
        p.dma_setup_time = 3;
        p.dma_bytes_per_cycle = 4;
        assert_eq!(p.transfer_time(0), 3);
        assert_eq!(p.transfer_time(5), 5);
        assert_eq!(p.transfer_time(8), 5);
    }

    #[test]
    fn unallocated_actor_needs_a_single_cluster() {
        let mut g = SdfGraph::new();
        g.add_actor("A", 1, ActorKind::Compute).unwrap();
        let single = Platform::shared_memory(1);
        let c = SchedulingConstraints::default();
        assert_eq!(c.actor_allocated_cluster("A", &single), Ok(ClusterId(0)));
        let two = Platform {
            clusters: vec![Cluster::uniform("c0", 1, 1), Cluster::uniform("c1", 1, 1)],
            dma_setup_time: 1,
            dma_bytes_per_cycle: 1,
        };
        assert_eq!(
            c.actor_allocated_cluster("A", &two),
            Err(SchedError::UnmappedActor("A".to_string()))
        );
        let mut c = SchedulingConstraints::default();
        c.allocate("A", "c1");
        assert_eq!(c.actors_mapped_to_cluster(&g, &two, ClusterId(1)).unwrap().len(), 1);
        c.allocate("A", "nowhere");
        assert!(c.validate(&g, &two).is_err());
    }
}
