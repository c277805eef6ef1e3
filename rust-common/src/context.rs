use std::collections::HashMap;

use flowsched_core::{
    ActorId, ActorInstanceId, ActorKind, ChannelId, ClusterId, InstanceIdx, Platform,
    RepetitionSolution, SchedError, SdfGraph,
};
use log::{debug, warn};

use crate::analysis::{InstanceGraph, Reachability};
use crate::cluster::{splice_dma_actors, DmaLink};
use crate::config::{
    BufferEncoding, Objective, PeriodicFolding, ProcessorBudget, SchedulingConfig,
};
use crate::models::SdfSchedulingProblem;
use crate::precedence::{derive_precedences, ChannelPrecedences};
use crate::strategy::{strategy_for, SchedulingStrategy};
use crate::unfold::Hsdf;

/// Range of global resource indices an actor's instances may be bound to.
///
/// Processors and DMA engines live in two separate index spaces, each numbering the
/// resources of cluster 0 first, then cluster 1, and so on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ResourceWindow {
    pub kind: ActorKind,
    pub cluster: ClusterId,
    pub first: u32,
    pub count: u32,
}

impl ResourceWindow {
    pub fn last(&self) -> u32 {
        self.first + self.count.saturating_sub(1)
    }

    pub fn same_resources(&self, other: &ResourceWindow) -> bool {
        self.kind == other.kind && self.cluster == other.cluster
    }
}

/// Occupancy tracked for one FIFO: a plain channel has one side, a channel split by DMA has
/// its sending and receiving halves.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BufferGroup {
    pub name: String,
    pub sides: Vec<ChannelId>,
    pub production: u64,
    pub consumption: u64,
    pub initial_tokens: u64,
    pub token_size: u64,
}

/// Everything a model build reads: the unfolded application, its dependencies and the
/// resources each actor may use. Built once per exploration session and never mutated.
pub struct SchedulingContext {
    pub config: SchedulingConfig,
    pub graph: SdfGraph,
    pub repetitions: RepetitionSolution,
    pub platform: Platform,
    pub hsdf: Hsdf,
    pub precedences: Vec<ChannelPrecedences>,
    pub instance_graph: InstanceGraph,
    pub reachability: Option<Reachability>,
    pub omega: Option<Vec<u64>>,
    pub order: Vec<InstanceIdx>,
    pub windows: Vec<ResourceWindow>,
    pub dma_links: Vec<DmaLink>,
    pub buffer_groups: Vec<BufferGroup>,
    pub self_loops: Vec<(String, u64)>,
    pub total_work: u64,
    pub horizon: i64,
    pub critical_path: u64,
    pub strategy: Box<dyn SchedulingStrategy>,
}

impl SchedulingContext {
    pub fn new(
        problem: &SdfSchedulingProblem,
        config: &SchedulingConfig,
    ) -> Result<SchedulingContext, SchedError> {
        problem.graph.validate()?;
        problem
            .constraints
            .validate(&problem.graph, &problem.platform)?;
        let mut config = config.clone();
        if config.objective == Objective::ProcessorCount && config.processors != ProcessorBudget::Free
        {
            warn!("minimising the processor count requires a free processor budget, freeing it");
            config.processors = ProcessorBudget::Free;
        }
        if config.objective == Objective::Period && !config.is_pipelined() {
            warn!("the period is only defined for pipelined schedules, minimising latency instead");
            config.objective = Objective::Latency;
        }
        if config.objective == Objective::TotalBuffer && config.buffer_analysis.is_none() {
            warn!("minimising buffers requires a buffer encoding, using the case-split one");
            config.buffer_analysis = Some(BufferEncoding::CaseSplit);
        }
        let repetitions = problem.repetitions()?;
        let spliced = splice_dma_actors(
            &problem.graph,
            &repetitions,
            &problem.platform,
            &problem.constraints,
        )?;
        let graph = spliced.graph;
        let repetitions = spliced.repetitions;
        let hsdf = Hsdf::unfold(&graph, &repetitions)?;
        let precedences = derive_precedences(&graph, &repetitions);
        let labels: Vec<String> = hsdf
            .instances
            .iter()
            .map(|(_, id)| format!("{}_{}", graph.actor(id.actor).name, id.rep))
            .collect();
        let edges: Vec<(usize, usize)> = precedences
            .iter()
            .flat_map(|p| p.pairs())
            .map(|(p, c)| (hsdf.instances.idx(p).index(), hsdf.instances.idx(c).index()))
            .collect();
        let instance_graph = InstanceGraph::new(labels, edges);
        let order = instance_graph
            .topological_order()?
            .into_iter()
            .map(InstanceIdx)
            .collect();
        let reachability = if config.graph_analysis && !config.is_pipelined() {
            Some(Reachability::compute(&instance_graph)?)
        } else {
            None
        };
        let omega = if config.is_pipelined() && config.folding == PeriodicFolding::Omega {
            Some(instance_graph.hop_distances()?)
        } else {
            None
        };
        let windows = resource_windows(&graph, &problem.platform, &spliced.allocation, &config)?;
        let durations: Vec<u64> = hsdf
            .instances
            .iter()
            .map(|(_, id)| graph.actor(id.actor).execution_time)
            .collect();
        let total_work: u64 = durations.iter().sum();
        let critical_path = instance_graph.critical_path(&durations)?;
        let mut buffer_groups = vec![];
        let mut self_loops = vec![];
        for (_, c) in problem.graph.channels() {
            if c.is_self_loop() {
                self_loops.push((c.name.clone(), c.initial_tokens));
                continue;
            }
            let sides = match spliced.links.iter().find(|l| l.channel == c.name) {
                Some(link) => vec![link.transmit_side, link.receive_side],
                None => vec![graph.get_channel(&c.name)?],
            };
            buffer_groups.push(BufferGroup {
                name: c.name.clone(),
                sides,
                production: c.production_rate(),
                consumption: c.consumption_rate(),
                initial_tokens: c.initial_tokens,
                token_size: c.token_size,
            });
        }
        let strategy = strategy_for(&config);
        debug!(
            "scheduling context: {} instances, {} DMA links, total work {}, critical path {}",
            hsdf.instances.len(),
            spliced.links.len(),
            total_work,
            critical_path
        );
        Ok(SchedulingContext {
            config,
            graph,
            repetitions,
            platform: problem.platform.clone(),
            hsdf,
            precedences,
            instance_graph,
            reachability,
            omega,
            order,
            windows,
            dma_links: spliced.links,
            buffer_groups,
            self_loops,
            total_work,
            horizon: total_work.max(1) as i64,
            critical_path,
            strategy,
        })
    }

    pub fn duration(&self, actor: ActorId) -> i64 {
        self.graph.actor(actor).execution_time as i64
    }

    pub fn window(&self, actor: ActorId) -> &ResourceWindow {
        &self.windows[actor.index()]
    }

    pub fn idx(&self, id: ActorInstanceId) -> usize {
        self.hsdf.instances.idx(id).index()
    }

    /// Instances in topological order of the intra-iteration dependencies.
    pub fn instances_in_order(&self) -> impl Iterator<Item = ActorInstanceId> + '_ {
        self.order.iter().map(|i| self.hsdf.instances.get(*i))
    }

    /// Every intra-iteration (producer, consumer) dependency.
    pub fn dependencies(&self) -> impl Iterator<Item = (ActorInstanceId, ActorInstanceId)> + '_ {
        self.precedences.iter().flat_map(|p| p.pairs())
    }

    /// DMA transfer actors fed by `actor`, in output port order.
    pub fn dma_fanout(&self, actor: ActorId) -> Vec<ActorId> {
        self.dma_links
            .iter()
            .filter(|l| l.producer == actor)
            .map(|l| l.token_actor)
            .collect()
    }

    /// Total work of each resource class (cluster and kind), with the window of that class.
    pub fn work_per_resource_class(&self) -> Vec<(ResourceWindow, u64)> {
        let mut work: HashMap<(ActorKind, ClusterId), (ResourceWindow, u64)> = HashMap::new();
        for (_, id) in self.hsdf.instances.iter() {
            let w = *self.window(id.actor);
            let entry = work.entry((w.kind, w.cluster)).or_insert((w, 0));
            entry.1 += self.duration(id.actor) as u64;
        }
        let mut classes: Vec<(ResourceWindow, u64)> = work.into_values().collect();
        classes.sort_by_key(|(w, _)| (w.cluster, w.kind == ActorKind::Communication));
        classes
    }

    /// Lower bound on latency and period from work over resources.
    pub fn work_bound(&self) -> i64 {
        self.work_per_resource_class()
            .iter()
            .map(|(w, work)| {
                let n = w.count.max(1) as u64;
                ((work + n - 1) / n) as i64
            })
            .max()
            .unwrap_or(0)
    }

    /// Smallest period any pipelined schedule can reach.
    pub fn period_lower_bound(&self) -> i64 {
        self.max_duration().max(self.work_bound()).max(1)
    }

    /// Upper bound of absolute start and end times.
    ///
    /// A pipelined iteration may spread over `KMax + 1` periods, so its starts reach up to
    /// `(KMax + 1)·Period - 1 ≤ horizon + Period`, the period itself being at most `horizon`.
    pub fn time_bound(&self) -> i64 {
        if self.config.is_pipelined() {
            2 * self.horizon
        } else {
            self.horizon
        }
    }

    /// Largest iteration offset of a start time, whatever the period.
    pub fn max_offset(&self) -> i64 {
        self.horizon / self.period_lower_bound()
    }

    pub fn max_duration(&self) -> i64 {
        self.hsdf
            .instances
            .iter()
            .map(|(_, id)| self.duration(id.actor))
            .max()
            .unwrap_or(0)
    }

    /// Global index of the first resource of the given kind in `cluster`.
    pub fn cluster_first(&self, kind: ActorKind, cluster: ClusterId) -> u32 {
        self.platform
            .clusters
            .iter()
            .take(cluster.index())
            .map(|c| match kind {
                ActorKind::Compute => c.num_proc_in_cluster() as u32,
                ActorKind::Communication => c.num_dma_in_cluster() as u32,
            })
            .sum()
    }

    /// Name of the resource behind a global index of the given window.
    pub fn resource_name(&self, window: &ResourceWindow, index: i64) -> Result<String, SchedError> {
        let cluster = self.platform.cluster(window.cluster);
        let local = index - self.cluster_first(window.kind, window.cluster) as i64;
        let name = if local < 0 {
            None
        } else {
            match window.kind {
                ActorKind::Compute => cluster.processor(local as usize).map(|p| p.name.clone()),
                ActorKind::Communication => {
                    cluster.dma_engine(local as usize).map(|d| d.name.clone())
                }
            }
        };
        name.ok_or_else(|| SchedError::MissingResource {
            cluster: cluster.name.clone(),
            resource: format!("resource #{}", index),
            actor: String::new(),
        })
    }
}

fn resource_windows(
    graph: &SdfGraph,
    platform: &Platform,
    allocation: &[ClusterId],
    config: &SchedulingConfig,
) -> Result<Vec<ResourceWindow>, SchedError> {
    let mut proc_first = vec![];
    let mut dma_first = vec![];
    let (mut p, mut d) = (0u32, 0u32);
    for c in &platform.clusters {
        proc_first.push(p);
        dma_first.push(d);
        p += c.num_proc_in_cluster() as u32;
        d += c.num_dma_in_cluster() as u32;
    }
    let mut windows = Vec::with_capacity(graph.num_actors());
    for (id, a) in graph.actors() {
        let cluster_id = allocation[id.index()];
        let cluster = platform.cluster(cluster_id);
        let (first, available, resource) = match a.kind {
            ActorKind::Compute => (
                proc_first[cluster_id.index()],
                cluster.num_proc_in_cluster() as u32,
                "processor",
            ),
            ActorKind::Communication => (
                dma_first[cluster_id.index()],
                cluster.num_dma_in_cluster() as u32,
                "DMA engine",
            ),
        };
        let count = match (a.kind, config.processors) {
            (ActorKind::Compute, ProcessorBudget::Fixed(n)) => available.min(n),
            _ => available,
        };
        if count == 0 {
            return Err(SchedError::MissingResource {
                cluster: cluster.name.clone(),
                resource: resource.to_string(),
                actor: a.name.clone(),
            });
        }
        windows.push(ResourceWindow {
            kind: a.kind,
            cluster: cluster_id,
            first,
            count,
        });
    }
    Ok(windows)
}
