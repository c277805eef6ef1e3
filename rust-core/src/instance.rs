use std::fmt;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::graph::{ActorId, SdfGraph};
use crate::repetition::RepetitionSolution;

/// One firing of an actor within an iteration, `rep` counting from zero.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, JsonSchema,
)]
pub struct ActorInstanceId {
    pub actor: ActorId,
    pub rep: u32,
}

impl ActorInstanceId {
    pub fn new(actor: ActorId, rep: u32) -> ActorInstanceId {
        ActorInstanceId { actor, rep }
    }
}

impl fmt::Display for ActorInstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}_{}", self.actor.index(), self.rep)
    }
}

/// Dense arena position of an actor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstanceIdx(pub usize);

impl InstanceIdx {
    pub fn index(&self) -> usize {
        self.0
    }
}

/// Arena of all actor instances of one iteration, grouped by actor.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct InstanceTable {
    offsets: Vec<usize>,
    instances: Vec<ActorInstanceId>,
}

impl InstanceTable {
    pub fn new(graph: &SdfGraph, repetitions: &RepetitionSolution) -> InstanceTable {
        let mut offsets = Vec::with_capacity(graph.num_actors());
        let mut instances = vec![];
        for (id, _) in graph.actors() {
            offsets.push(instances.len());
            for rep in 0..repetitions.get(id) {
                instances.push(ActorInstanceId::new(id, rep as u32));
            }
        }
        InstanceTable { offsets, instances }
    }

    pub fn len(&self) -> usize {
        self.instances.len()
    }

    pub fn is_empty(&self) -> bool {
        self.instances.is_empty()
    }

    pub fn idx(&self, id: ActorInstanceId) -> InstanceIdx {
        InstanceIdx(self.offsets[id.actor.index()] + id.rep as usize)
    }

    pub fn get(&self, idx: InstanceIdx) -> ActorInstanceId {
        self.instances[idx.index()]
    }

    pub fn iter(&self) -> impl Iterator<Item = (InstanceIdx, ActorInstanceId)> + '_ {
        self.instances
            .iter()
            .enumerate()
            .map(|(i, x)| (InstanceIdx(i), *x))
    }

    /// Instances of `actor`, in firing order.
    pub fn of_actor(&self, actor: ActorId) -> &[ActorInstanceId] {
        let start = self.offsets[actor.index()];
        let end = self
            .offsets
            .get(actor.index() + 1)
            .copied()
            .unwrap_or(self.instances.len());
        &self.instances[start..end]
    }
}
