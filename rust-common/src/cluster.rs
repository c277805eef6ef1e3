use flowsched_core::{
    ActorId, ActorInstanceId, ActorKind, ChannelId, ClusterId, Platform, RepetitionSolution,
    SchedError, SchedulingConstraints, SdfGraph, Term,
};
use log::debug;

use crate::context::SchedulingContext;
use crate::passes::ConstraintPass;
use crate::session::{InstanceRole, ModelSession, VarKey};

/// Synthetic actors and channels standing in for one inter-cluster channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DmaLink {
    /// Name of the original channel.
    pub channel: String,
    pub producer: ActorId,
    pub consumer: ActorId,
    /// Producer-side transfer task, one firing per producer firing.
    pub token_actor: ActorId,
    /// Consumer-side acknowledgement task, one firing per consumer firing.
    pub status_actor: ActorId,
    pub transmit_side: ChannelId,
    pub receive_side: ChannelId,
    pub status_side: ChannelId,
}

/// The application as it is scheduled: the input graph plus DMA tasks, with the cluster of
/// every actor resolved.
#[derive(Debug, Clone)]
pub struct SplicedApplication {
    pub graph: SdfGraph,
    pub repetitions: RepetitionSolution,
    pub allocation: Vec<ClusterId>,
    pub links: Vec<DmaLink>,
}

/// Rewrites every channel whose endpoints sit on different clusters into
/// `A -> <c>_dmaTx -> B -> <c>_dmaStatus`.
///
/// Channels keep their relative order, so the transfers of a producer appear in the order of
/// its output ports. On a single cluster the graph comes back unchanged.
pub fn splice_dma_actors(
    graph: &SdfGraph,
    repetitions: &RepetitionSolution,
    platform: &Platform,
    constraints: &SchedulingConstraints,
) -> Result<SplicedApplication, SchedError> {
    let mut spliced = SdfGraph::new();
    let mut reps = RepetitionSolution::from_counts(vec![]);
    let mut allocation = vec![];
    for (id, a) in graph.actors() {
        spliced.add_actor(&a.name, a.execution_time, a.kind)?;
        reps.push(repetitions.get(id));
        allocation.push(constraints.actor_allocated_cluster(&a.name, platform)?);
    }
    let mut links = vec![];
    for (_, c) in graph.channels() {
        let (src, dst) = (c.producer(), c.consumer());
        let (n_a, n_b) = (c.production_rate(), c.consumption_rate());
        if allocation[src.index()] == allocation[dst.index()] {
            let id = spliced.add_channel(&c.name, src, n_a, dst, n_b, c.initial_tokens)?;
            spliced.set_token_size(id, c.token_size)?;
            continue;
        }
        let transfer = platform.transfer_time(n_a * c.token_size);
        let token_actor = spliced.add_actor(
            &format!("{}_dmaTx", c.name),
            transfer,
            ActorKind::Communication,
        )?;
        reps.push(repetitions.get(src));
        allocation.push(allocation[src.index()]);
        let status_actor = spliced.add_actor(
            &format!("{}_dmaStatus", c.name),
            platform.dma_setup_time(),
            ActorKind::Communication,
        )?;
        reps.push(repetitions.get(dst));
        allocation.push(allocation[dst.index()]);
        let transmit_side =
            spliced.add_channel(&format!("{}_tx", c.name), src, n_a, token_actor, n_a, 0)?;
        let receive_side =
            spliced.add_channel(&c.name, token_actor, n_a, dst, n_b, c.initial_tokens)?;
        let status_side =
            spliced.add_channel(&format!("{}_status", c.name), dst, n_b, status_actor, n_b, 0)?;
        for side in [transmit_side, receive_side] {
            spliced.set_token_size(side, c.token_size)?;
        }
        debug!(
            "channel {} crosses clusters, transfer of {} time units",
            c.name, transfer
        );
        links.push(DmaLink {
            channel: c.name.clone(),
            producer: src,
            consumer: dst,
            token_actor,
            status_actor,
            transmit_side,
            receive_side,
            status_side,
        });
    }
    Ok(SplicedApplication {
        graph: spliced,
        repetitions: reps,
        allocation,
        links,
    })
}

/// Declares the true completion of every firing with DMA fan-out and orders its transfers.
#[derive(Debug, Default)]
pub struct DmaPass;

impl ConstraintPass for DmaPass {
    fn name(&self) -> &'static str {
        "dma"
    }

    fn apply(&self, ctx: &SchedulingContext, session: &mut ModelSession) -> Result<(), SchedError> {
        let setup = ctx.platform.dma_setup_time() as i64;
        for (a, actor) in ctx.graph.actors() {
            if actor.kind != ActorKind::Compute {
                continue;
            }
            let fanout = ctx.dma_fanout(a);
            if fanout.is_empty() {
                continue;
            }
            for rep in 0..ctx.repetitions.get(a) as u32 {
                let mut starts = Vec::with_capacity(fanout.len());
                for tok in &fanout {
                    starts.push(session.term(&VarKey::start(ActorInstanceId::new(*tok, rep)))?);
                }
                if ctx.config.dma_ordering {
                    for pair in starts.windows(2) {
                        session.assert(pair[1].clone().ge(pair[0].clone().plus(setup)));
                    }
                }
                let completion = match (ctx.config.dma_ordering, starts.last()) {
                    (true, Some(last)) => last.clone().plus(setup),
                    _ => Term::max(starts.into_iter().map(|s| s.plus(setup)).collect()),
                };
                let true_end = session.declare_int(
                    &ctx.graph,
                    VarKey::Instance(InstanceRole::TrueEnd, ActorInstanceId::new(a, rep)),
                    Some(0),
                    Some(ctx.time_bound()),
                )?;
                session.assert(Term::Var(true_end).equals(completion));
            }
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use flowsched_core::Cluster;

    fn two_clusters() -> (SdfGraph, Platform, SchedulingConstraints) {
        let mut g = SdfGraph::new();
        let a = g.add_actor("A", 4, ActorKind::Compute).unwrap();
        let b = g.add_actor("B", 2, ActorKind::Compute).unwrap();
        let c = g.add_actor("C", 1, ActorKind::Compute).unwrap();
        let ab = g.add_channel("ab", a, 2, b, 1, 0).unwrap();
        g.set_token_size(ab, 3).unwrap();
        g.add_channel("ac", a, 1, c, 1, 0).unwrap();
        let platform = Platform {
            clusters: vec![Cluster::uniform("left", 2, 1), Cluster::uniform("right", 1, 1)],
            dma_setup_time: 2,
            dma_bytes_per_cycle: 2,
        };
        let mut constraints = SchedulingConstraints::default();
        constraints
            .allocate("A", "left")
            .allocate("B", "right")
            .allocate("C", "left");
        (g, platform, constraints)
    }

    #[test]
    fn cross_cluster_channels_get_dma_tasks() {
        let (g, platform, constraints) = two_clusters();
        let q = RepetitionSolution::compute(&g).unwrap();
        let s = splice_dma_actors(&g, &q, &platform, &constraints).unwrap();
        assert_eq!(s.links.len(), 1);
        let link = &s.links[0];
        let tok = s.graph.actor(link.token_actor);
        assert_eq!(tok.name, "ab_dmaTx");
        assert_eq!(tok.kind, ActorKind::Communication);
        // setup 2 + ceil(2 tokens * 3 bytes / 2 bytes per cycle)
        assert_eq!(tok.execution_time, 5);
        assert_eq!(s.graph.actor(link.status_actor).execution_time, 2);
        assert_eq!(s.repetitions.get(link.token_actor), 1);
        assert_eq!(s.repetitions.get(link.status_actor), 2);
        assert_eq!(s.allocation[link.token_actor.index()], ClusterId(0));
        assert_eq!(s.allocation[link.status_actor.index()], ClusterId(1));
        assert_eq!(s.graph.channel(link.receive_side).name, "ab");
        assert_eq!(s.graph.channel(link.receive_side).token_size, 3);
        assert!(s.repetitions.verify(&s.graph).is_ok());
        assert!(s.graph.get_channel("ac").is_ok());
    }

    #[test]
    fn single_cluster_is_left_untouched() {
        let (g, _, _) = two_clusters();
        let platform = Platform::shared_memory(2);
        let q = RepetitionSolution::compute(&g).unwrap();
        let s = splice_dma_actors(&g, &q, &platform, &SchedulingConstraints::default()).unwrap();
        assert!(s.links.is_empty());
        assert_eq!(s.graph, g);
    }

    #[test]
    fn unmapped_actors_are_rejected_on_several_clusters() {
        let (g, platform, _) = two_clusters();
        let q = RepetitionSolution::compute(&g).unwrap();
        assert_eq!(
            splice_dma_actors(&g, &q, &platform, &SchedulingConstraints::default()).err(),
            Some(SchedError::UnmappedActor("A".to_string()))
        );
    }
}
