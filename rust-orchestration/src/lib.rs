pub mod exploration;

use anyhow::{bail, Context};
use flowsched_blueprints::{
    decision_model_schemas, read_problem, write_schedules, ExplorationArgs, ModeArg, SolverArg,
};
use flowsched_bridge_native::NativeFactory;
use flowsched_bridge_smtlib::{is_available, SmtLibFactory};
use flowsched_common::{ProcessorBudget, SchedulingConfig, SdfSchedulingProblem};
use flowsched_core::{SchedError, Schedule, SolverFactory};
use log::{info, warn};

pub use exploration::{
    compute_pareto_solutions, optimize, pareto_dominance_partial_cmp, pareto_latency_buffer,
    refine_processors, sweep_processors, ExplorationConfiguration,
    ExplorationConfigurationBuilder, Explored, Explorer,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExplorationMode {
    Optimize,
    Refine,
    Pareto,
    Sweep,
}

impl From<ModeArg> for ExplorationMode {
    fn from(m: ModeArg) -> Self {
        match m {
            ModeArg::Optimize => ExplorationMode::Optimize,
            ModeArg::Refine => ExplorationMode::Refine,
            ModeArg::Pareto => ExplorationMode::Pareto,
            ModeArg::Sweep => ExplorationMode::Sweep,
        }
    }
}

/// Processor budgets tried by a sweep: up to the given budget, or to the largest cluster.
pub fn sweep_counts(problem: &SdfSchedulingProblem, config: &SchedulingConfig) -> Vec<u32> {
    let largest = problem
        .platform
        .clusters
        .iter()
        .map(|c| c.num_proc_in_cluster() as u32)
        .max()
        .unwrap_or(1);
    let upper = match config.processors {
        ProcessorBudget::Fixed(n) => n.min(largest),
        _ => largest,
    };
    (1..=upper.max(1)).collect()
}

pub fn explore(
    problem: &SdfSchedulingProblem,
    config: &SchedulingConfig,
    exploration: &ExplorationConfiguration,
    mode: ExplorationMode,
    factory: &dyn SolverFactory,
) -> Result<Vec<Explored>, SchedError> {
    info!(
        "exploring with {} in {:?} mode",
        factory.unique_identifier(),
        mode
    );
    match mode {
        ExplorationMode::Optimize => Ok(optimize(problem, config, factory, exploration)?
            .into_iter()
            .collect()),
        ExplorationMode::Refine => Ok(refine_processors(problem, config, factory, exploration)?
            .into_iter()
            .collect()),
        ExplorationMode::Pareto => pareto_latency_buffer(problem, config, factory, exploration),
        ExplorationMode::Sweep => sweep_processors(
            problem,
            config,
            factory,
            exploration,
            &sweep_counts(problem, config),
        ),
    }
}

pub fn solver_factory(args: &ExplorationArgs) -> anyhow::Result<Box<dyn SolverFactory>> {
    match args.solver {
        SolverArg::Native => Ok(Box::new(NativeFactory::default())),
        SolverArg::Smtlib => {
            if !is_available(&args.solver_command) {
                bail!("the SMT-LIB2 solver '{}' cannot be launched", args.solver_command);
            }
            Ok(Box::new(SmtLibFactory {
                command: args.solver_command.clone(),
                args: vec!["-in".to_string()],
            }))
        }
    }
}

/// Runs the command line front end.
pub fn run(args: ExplorationArgs) -> anyhow::Result<Vec<Schedule>> {
    if args.print_schema {
        for schema in decision_model_schemas() {
            println!("{}", schema);
        }
        return Ok(vec![]);
    }
    let problem_path = match &args.problem {
        Some(p) => p.clone(),
        None => bail!("no problem given; pass a problem file or --schemas"),
    };
    let problem = read_problem(&problem_path)?;
    let config = args.scheduling_config()?;
    let exploration = ExplorationConfiguration {
        query_timeout: args.query_timeout,
        total_timeout: args.total_timeout,
        unknown_retries: args.unknown_retries,
        max_sols: args.max_sols,
        ..ExplorationConfiguration::default()
    };
    let factory = solver_factory(&args)?;
    let found = explore(
        &problem,
        &config,
        &exploration,
        args.mode.into(),
        factory.as_ref(),
    )
    .with_context(|| format!("exploring {}", problem_path.display()))?;
    if found.is_empty() {
        warn!("no schedule satisfies the problem within the given limits");
    }
    let schedules: Vec<Schedule> = found.into_iter().map(|e| e.schedule).collect();
    for s in &schedules {
        info!(
            "schedule: {}",
            s.objectives()
                .iter()
                .map(|(k, v)| format!("{}: {}", k, v))
                .reduce(|s1, s2| format!("{}, {}", s1, s2))
                .unwrap_or_else(|| "no objectives".to_owned())
        );
    }
    write_schedules(&schedules, &args.output_path)?;
    Ok(schedules)
}
