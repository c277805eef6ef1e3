use flowsched_bridge_native::NativeFactory;
use flowsched_common::{
    BufferEncoding, Objective, PeriodicFolding, ProcessorBudget, Regime, SchedulingConfig,
    SchedulingConfigBuilder, SdfSchedulingProblem,
};
use flowsched_core::{
    ActorKind, Cluster, Platform, SchedulingConstraints, SdfGraph,
};
use flowsched_orchestration::{
    explore, optimize, pareto_latency_buffer, refine_processors, sweep_processors,
    ExplorationConfiguration, ExplorationMode,
};

fn chain(processors: usize) -> SdfSchedulingProblem {
    let mut g = SdfGraph::new();
    let a = g.add_actor("A", 3, ActorKind::Compute).unwrap();
    let b = g.add_actor("B", 4, ActorKind::Compute).unwrap();
    g.add_channel("ab", a, 1, b, 1, 0).unwrap();
    SdfSchedulingProblem::new(g, Platform::shared_memory(processors))
}

fn feedback() -> SdfSchedulingProblem {
    let mut g = SdfGraph::new();
    let a = g.add_actor("A", 2, ActorKind::Compute).unwrap();
    let b = g.add_actor("B", 3, ActorKind::Compute).unwrap();
    g.add_channel("ab", a, 1, b, 1, 0).unwrap();
    g.add_channel("ba", b, 1, a, 1, 1).unwrap();
    SdfSchedulingProblem::new(g, Platform::shared_memory(2))
}

fn multirate() -> SdfSchedulingProblem {
    let mut g = SdfGraph::new();
    let a = g.add_actor("A", 1, ActorKind::Compute).unwrap();
    let b = g.add_actor("B", 1, ActorKind::Compute).unwrap();
    g.add_channel("ab", a, 2, b, 3, 0).unwrap();
    SdfSchedulingProblem::new(g, Platform::shared_memory(1))
}

fn factory() -> NativeFactory {
    NativeFactory::default()
}

#[test]
fn chain_on_one_processor_runs_back_to_back() {
    let found = optimize(
        &chain(1),
        &SchedulingConfig::default(),
        &factory(),
        &ExplorationConfiguration::default(),
    )
    .unwrap()
    .unwrap();
    assert!(found.proven_optimal);
    let s = found.schedule;
    assert_eq!(s.latency, Some(7));
    assert_eq!(s.firing("A", 0).unwrap().start_time, 0);
    assert_eq!(s.firing("B", 0).unwrap().start_time, 3);
    assert_eq!(s.firing("B", 0).unwrap().resource, "cluster0_pe0");
}

#[test]
fn independent_actors_use_one_processor_each() {
    let mut g = SdfGraph::new();
    g.add_actor("A", 5, ActorKind::Compute).unwrap();
    g.add_actor("B", 5, ActorKind::Compute).unwrap();
    let problem = SdfSchedulingProblem::new(g, Platform::shared_memory(2));
    let found = explore(
        &problem,
        &SchedulingConfig::default(),
        &ExplorationConfiguration::default(),
        ExplorationMode::Optimize,
        &factory(),
    )
    .unwrap();
    assert_eq!(found.len(), 1);
    let s = &found[0].schedule;
    assert_eq!(s.latency, Some(5));
    assert_eq!(s.resources_used().len(), 2);
    assert_eq!(s.processor_count, Some(2));
}

#[test]
fn feedback_loop_bounds_the_period() {
    for folding in [
        PeriodicFolding::Modulo,
        PeriodicFolding::TypeSplit,
        PeriodicFolding::Omega,
    ] {
        let config = SchedulingConfigBuilder::default()
            .regime(Regime::Pipelined)
            .folding(folding)
            .objective(Objective::Period)
            .build()
            .unwrap();
        let found = optimize(
            &feedback(),
            &config,
            &factory(),
            &ExplorationConfiguration::default(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(found.schedule.period, Some(5), "{:?}", folding);
        assert_eq!(found.objective, 5);
    }
}

#[test]
fn multirate_buffer_meets_its_static_bound() {
    let config = SchedulingConfigBuilder::default()
        .objective(Objective::TotalBuffer)
        .buffer_analysis(Some(BufferEncoding::CaseSplit))
        .build()
        .unwrap();
    let found = optimize(
        &multirate(),
        &config,
        &factory(),
        &ExplorationConfiguration::default(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(found.schedule.total_buffer, Some(4));
    assert_eq!(found.schedule.buffer_sizes.get("ab"), Some(&4));
    assert_eq!(found.schedule.firings.len(), 5);
}

#[test]
fn both_buffer_encodings_agree_on_the_multirate_chain() {
    let config = SchedulingConfigBuilder::default()
        .objective(Objective::TotalBuffer)
        .buffer_analysis(Some(BufferEncoding::IndexedFunction))
        .build()
        .unwrap();
    let found = optimize(
        &multirate(),
        &config,
        &factory(),
        &ExplorationConfiguration::default(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(found.schedule.total_buffer, Some(4));
    assert_eq!(found.schedule.buffer_sizes.get("ab"), Some(&4));
}

#[test]
fn pipelined_iterations_may_outlast_the_total_work() {
    // the period-5 schedule puts C in the second period, ending at 10 > 3 + 4 + 2
    let mut g = SdfGraph::new();
    let a = g.add_actor("A", 3, ActorKind::Compute).unwrap();
    let b = g.add_actor("B", 4, ActorKind::Compute).unwrap();
    let c = g.add_actor("C", 2, ActorKind::Compute).unwrap();
    g.add_channel("ab", a, 1, b, 1, 0).unwrap();
    g.add_channel("bc", b, 1, c, 1, 0).unwrap();
    let problem = SdfSchedulingProblem::new(g, Platform::shared_memory(2));
    for folding in [
        PeriodicFolding::Modulo,
        PeriodicFolding::TypeSplit,
        PeriodicFolding::Omega,
    ] {
        let config = SchedulingConfigBuilder::default()
            .regime(Regime::Pipelined)
            .folding(folding)
            .objective(Objective::Period)
            .build()
            .unwrap();
        let found = optimize(
            &problem,
            &config,
            &factory(),
            &ExplorationConfiguration::default(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(found.schedule.period, Some(5), "{:?}", folding);
        assert!(found.schedule.latency.unwrap() > 9, "{:?}", folding);
    }
}

#[test]
fn task_symmetry_keeps_the_optimal_latency() {
    let mut g = SdfGraph::new();
    let a = g.add_actor("A", 2, ActorKind::Compute).unwrap();
    let b = g.add_actor("B", 3, ActorKind::Compute).unwrap();
    g.add_channel("ab", a, 1, b, 2, 0).unwrap();
    let problem = SdfSchedulingProblem::new(g, Platform::shared_memory(2));
    for task_symmetry in [true, false] {
        let config = SchedulingConfigBuilder::default()
            .task_symmetry(task_symmetry)
            .build()
            .unwrap();
        let found = optimize(
            &problem,
            &config,
            &factory(),
            &ExplorationConfiguration::default(),
        )
        .unwrap()
        .unwrap();
        assert_eq!(found.schedule.latency, Some(5), "task symmetry {}", task_symmetry);
    }
}

#[test]
fn cross_cluster_tokens_travel_by_dma() {
    let mut g = SdfGraph::new();
    let a = g.add_actor("A", 2, ActorKind::Compute).unwrap();
    let b = g.add_actor("B", 3, ActorKind::Compute).unwrap();
    let ab = g.add_channel("ab", a, 1, b, 1, 0).unwrap();
    g.set_token_size(ab, 4).unwrap();
    let platform = Platform {
        clusters: vec![Cluster::uniform("c0", 1, 1), Cluster::uniform("c1", 1, 1)],
        dma_setup_time: 1,
        dma_bytes_per_cycle: 2,
    };
    let mut constraints = SchedulingConstraints::default();
    constraints.allocate("A", "c0").allocate("B", "c1");
    let problem = SdfSchedulingProblem::new(g, platform).with_constraints(constraints);
    let found = optimize(
        &problem,
        &SchedulingConfig::default(),
        &factory(),
        &ExplorationConfiguration::default(),
    )
    .unwrap()
    .unwrap();
    let s = found.schedule;
    assert_eq!(s.latency, Some(9));
    let tx = s.firing("ab_dmaTx", 0).unwrap();
    assert_eq!((tx.resource.as_str(), tx.start_time), ("c0_dma0", 2));
    let consumer = s.firing("B", 0).unwrap();
    assert_eq!((consumer.resource.as_str(), consumer.start_time), ("c1_pe0", 5));
    assert_eq!(s.firing("ab_dmaStatus", 0).unwrap().resource, "c1_dma0");
}

/// A on c0 feeds B and C on c1 through two transfers, D shares the processor of A.
fn fan_out_across_clusters() -> SdfSchedulingProblem {
    let mut g = SdfGraph::new();
    let a = g.add_actor("A", 2, ActorKind::Compute).unwrap();
    let b = g.add_actor("B", 1, ActorKind::Compute).unwrap();
    let c = g.add_actor("C", 1, ActorKind::Compute).unwrap();
    g.add_actor("D", 1, ActorKind::Compute).unwrap();
    let ab = g.add_channel("ab", a, 1, b, 1, 0).unwrap();
    let ac = g.add_channel("ac", a, 1, c, 1, 0).unwrap();
    g.set_token_size(ab, 2).unwrap();
    g.set_token_size(ac, 2).unwrap();
    let platform = Platform {
        clusters: vec![Cluster::uniform("c0", 1, 2), Cluster::uniform("c1", 2, 2)],
        dma_setup_time: 1,
        dma_bytes_per_cycle: 2,
    };
    let mut constraints = SchedulingConstraints::default();
    constraints
        .allocate("A", "c0")
        .allocate("D", "c0")
        .allocate("B", "c1")
        .allocate("C", "c1");
    SdfSchedulingProblem::new(g, platform).with_constraints(constraints)
}

#[test]
fn transfers_of_one_firing_follow_port_order() {
    let found = optimize(
        &fan_out_across_clusters(),
        &SchedulingConfig::default(),
        &factory(),
        &ExplorationConfiguration::default(),
    )
    .unwrap()
    .unwrap();
    let s = found.schedule;
    // A 0..2, ab_dmaTx 2..4, ac_dmaTx 3..5, C 5..6, its status 6..7
    assert_eq!(s.latency, Some(7));
    assert_eq!(s.firing("A", 0).unwrap().start_time, 0);
    let first = s.firing("ab_dmaTx", 0).unwrap().start_time;
    let last = s.firing("ac_dmaTx", 0).unwrap().start_time;
    assert!(last >= first + 1);
    // the processor of A stays busy until its last transfer is issued
    assert!(s.firing("D", 0).unwrap().start_time >= last + 1);
}

#[test]
fn unordered_transfers_complete_at_the_latest_issue() {
    let config = SchedulingConfigBuilder::default()
        .dma_ordering(false)
        .build()
        .unwrap();
    let found = optimize(
        &fan_out_across_clusters(),
        &config,
        &factory(),
        &ExplorationConfiguration::default(),
    )
    .unwrap()
    .unwrap();
    let s = found.schedule;
    assert_eq!(s.latency, Some(6));
    let first = s.firing("ab_dmaTx", 0).unwrap().start_time;
    let last = s.firing("ac_dmaTx", 0).unwrap().start_time;
    assert_eq!((first, last), (2, 2));
    assert!(s.firing("D", 0).unwrap().start_time >= first.max(last) + 1);
}

#[test]
fn refinement_packs_a_chain_on_one_processor() {
    let found = refine_processors(
        &chain(3),
        &SchedulingConfig::default(),
        &factory(),
        &ExplorationConfiguration::default(),
    )
    .unwrap()
    .unwrap();
    assert_eq!(found.schedule.processor_count, Some(1));
    assert_eq!(found.schedule.firing("B", 0).unwrap().start_time, 3);
}

#[test]
fn sweep_keeps_only_useful_processor_counts() {
    let mut g = SdfGraph::new();
    g.add_actor("A", 2, ActorKind::Compute).unwrap();
    g.add_actor("B", 2, ActorKind::Compute).unwrap();
    let problem = SdfSchedulingProblem::new(g, Platform::shared_memory(3));
    let config = SchedulingConfigBuilder::default()
        .processors(ProcessorBudget::Fixed(3))
        .build()
        .unwrap();
    let front = sweep_processors(
        &problem,
        &config,
        &factory(),
        &ExplorationConfiguration::default(),
        &[1, 2, 3],
    )
    .unwrap();
    let mut points: Vec<(Option<i64>, Option<i64>)> = front
        .iter()
        .map(|e| (e.schedule.latency, e.schedule.processor_count))
        .collect();
    points.sort();
    assert_eq!(points, vec![(Some(2), Some(2)), (Some(4), Some(1))]);
}

#[test]
fn pareto_front_of_a_multirate_chain_is_a_single_point() {
    let front = pareto_latency_buffer(
        &multirate(),
        &SchedulingConfig::default(),
        &factory(),
        &ExplorationConfiguration::default(),
    )
    .unwrap();
    assert_eq!(front.len(), 1);
    assert_eq!(front[0].schedule.latency, Some(5));
    assert_eq!(front[0].schedule.total_buffer, Some(4));
}
