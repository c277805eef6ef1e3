use std::collections::BTreeMap;

use flowsched_core::{
    ActorInstanceId, ChannelId, InstanceTable, RepetitionSolution, SchedError, SdfGraph,
};
use log::debug;

/// Channel of the homogeneous graph, merging every token that one producer instance sends to
/// one consumer instance over a given SDF channel.
///
/// Both ends of a merged channel move `rate` tokens per firing. `initial_tokens` counts the
/// iterations each token is delayed, summed over the merged tokens, so a channel whose tokens
/// all cross `t` iterations carries `t * rate` initial tokens.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct HsdfChannel {
    pub source: ActorInstanceId,
    pub target: ActorInstanceId,
    pub rate: u64,
    pub initial_tokens: u64,
    pub origin: ChannelId,
}

impl HsdfChannel {
    /// Number of whole iterations between producing and consuming these tokens.
    pub fn iteration_distance(&self) -> u64 {
        self.initial_tokens / self.rate.max(1)
    }

    /// Whether the consumer needs tokens produced within the same iteration.
    pub fn is_intra_iteration(&self) -> bool {
        self.iteration_distance() == 0
    }

    pub fn is_self_edge(&self) -> bool {
        self.source == self.target
    }
}

/// Homogeneous (single-rate) expansion of an SDF graph: one node per actor firing in an
/// iteration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Hsdf {
    pub instances: InstanceTable,
    pub channels: Vec<HsdfChannel>,
}

impl Hsdf {
    /// Unfolds `graph` according to `repetitions`.
    ///
    /// Unit `k` (1-based) of the `i`-th firing of the producer, on a channel with `d` initial
    /// tokens, is consumed by firing
    /// `j = 1 + floor(((d + (i-1)·nA + k - 1) mod (nB·qB)) / nB)` of the consumer,
    /// `t = floor((d + (i-1)·nA + k - 1) / (nB·qB))` iterations later. Units are merged per
    /// (producer firing, consumer firing) pair.
    pub fn unfold(graph: &SdfGraph, repetitions: &RepetitionSolution) -> Result<Hsdf, SchedError> {
        repetitions.verify(graph)?;
        let instances = InstanceTable::new(graph, repetitions);
        let mut channels = vec![];
        for (cid, c) in graph.channels() {
            let n_a = c.production_rate();
            let n_b = c.consumption_rate();
            let q_a = repetitions.get(c.producer());
            let q_b = repetitions.get(c.consumer());
            let d = c.initial_tokens;
            let tokens_per_iteration = n_b * q_b;
            let mut merged: BTreeMap<(u64, u64), (u64, u64)> = BTreeMap::new();
            for i in 0..q_a {
                for k in 0..n_a {
                    let unit = d + i * n_a + k;
                    let j = (unit % tokens_per_iteration) / n_b;
                    let t = unit / tokens_per_iteration;
                    let entry = merged.entry((i, j)).or_insert((0, 0));
                    entry.0 += 1;
                    entry.1 += t;
                }
            }
            for ((i, j), (rate, delay)) in merged {
                channels.push(HsdfChannel {
                    source: ActorInstanceId::new(c.producer(), i as u32),
                    target: ActorInstanceId::new(c.consumer(), j as u32),
                    rate,
                    initial_tokens: delay,
                    origin: cid,
                });
            }
        }
        debug!(
            "unfolded {} actors and {} channels into {} instances and {} channels",
            graph.num_actors(),
            graph.num_channels(),
            instances.len(),
            channels.len()
        );
        Ok(Hsdf {
            instances,
            channels,
        })
    }

    /// Instances without an intra-iteration successor other than themselves.
    pub fn sinks(&self) -> Vec<ActorInstanceId> {
        let mut has_successor = vec![false; self.instances.len()];
        for ch in self
            .channels
            .iter()
            .filter(|ch| ch.is_intra_iteration() && !ch.is_self_edge())
        {
            has_successor[self.instances.idx(ch.source).index()] = true;
        }
        self.instances
            .iter()
            .filter(|(idx, _)| !has_successor[idx.index()])
            .map(|(_, id)| id)
            .collect()
    }

    pub fn channels_of(&self, origin: ChannelId) -> impl Iterator<Item = &HsdfChannel> + '_ {
        self.channels.iter().filter(move |c| c.origin == origin)
    }
}
