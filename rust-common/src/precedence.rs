use flowsched_core::{ActorId, ActorInstanceId, ChannelId, RepetitionSolution, SdfGraph};
use log::debug;

/// For one channel, the producer firings each consumer firing waits for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelPrecedences {
    pub channel: ChannelId,
    pub producer: ActorId,
    pub consumer: ActorId,
    /// Indexed by consumer firing; producer firings in FIFO order.
    pub per_consumer: Vec<Vec<u32>>,
}

impl ChannelPrecedences {
    /// Every (producer instance, consumer instance) dependency of the channel.
    pub fn pairs(&self) -> impl Iterator<Item = (ActorInstanceId, ActorInstanceId)> + '_ {
        self.per_consumer.iter().enumerate().flat_map(move |(j, deps)| {
            deps.iter().map(move |i| {
                (
                    ActorInstanceId::new(self.producer, *i),
                    ActorInstanceId::new(self.consumer, j as u32),
                )
            })
        })
    }
}

/// Producer firings each consumer firing depends on, for a channel with production rate
/// `n_a`, consumption rate `n_b`, repetitions `q_a`/`q_b` and `d` initial tokens.
///
/// Tokens are consumed in FIFO order and initial tokens are consumed before any token
/// produced in the iteration. On a self-loop, firing `i` depends on firing `i - d/n_a`.
pub fn consumer_dependencies(
    n_a: u64,
    n_b: u64,
    q_a: u64,
    q_b: u64,
    d: u64,
    self_loop: bool,
) -> Vec<Vec<u32>> {
    if d == 0 && q_a == q_b {
        return (0..q_b).map(|i| vec![i as u32]).collect();
    }
    if d > 0 && self_loop {
        let offset = d / n_a.max(1);
        return (0..q_b)
            .map(|i| {
                if i >= offset {
                    vec![(i - offset) as u32]
                } else {
                    vec![]
                }
            })
            .collect();
    }
    let mut pool = d;
    let mut src_index = 0u64;
    let mut src_tokens = n_a;
    let mut deps = Vec::with_capacity(q_b as usize);
    for _ in 0..q_b {
        let mut firing_deps = vec![];
        let mut remaining = n_b;
        if pool >= remaining {
            pool -= remaining;
            remaining = 0;
        } else {
            remaining -= pool;
            pool = 0;
        }
        while remaining > 0 && src_index < q_a {
            firing_deps.push(src_index as u32);
            let consumed = remaining.min(src_tokens);
            remaining -= consumed;
            src_tokens -= consumed;
            if src_tokens == 0 {
                src_index += 1;
                src_tokens = n_a;
            }
        }
        deps.push(firing_deps);
    }
    deps
}

/// Derives the dependency lists of every channel of `graph`.
pub fn derive_precedences(
    graph: &SdfGraph,
    repetitions: &RepetitionSolution,
) -> Vec<ChannelPrecedences> {
    let precedences: Vec<ChannelPrecedences> = graph
        .channels()
        .map(|(cid, c)| ChannelPrecedences {
            channel: cid,
            producer: c.producer(),
            consumer: c.consumer(),
            per_consumer: consumer_dependencies(
                c.production_rate(),
                c.consumption_rate(),
                repetitions.get(c.producer()),
                repetitions.get(c.consumer()),
                c.initial_tokens,
                c.is_self_loop(),
            ),
        })
        .collect();
    debug!(
        "derived {} instance dependencies over {} channels",
        precedences.iter().map(|p| p.pairs().count()).sum::<usize>(),
        precedences.len()
    );
    precedences
}
