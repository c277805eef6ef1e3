use std::path::{Path, PathBuf};

use clap::{Parser, ValueEnum};
use flowsched_common::{
    BufferEncoding, Objective, PeriodicFolding, ProcessorBudget, Regime, SchedulingConfig,
    SdfSchedulingProblem,
};
use flowsched_core::{
    decision_models_schemas_gen, load_decision_model, DecisionModel, Schedule,
};
use log::{debug, info};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CliError {
    #[error("could not read a scheduling problem from {0}")]
    UnreadableProblem(PathBuf),
    #[error("could not read the configuration file {path}: {reason}")]
    UnreadableConfig { path: PathBuf, reason: String },
    #[error("could not write results to {path}: {reason}")]
    Unwritable { path: PathBuf, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RegimeArg {
    NonPipelined,
    Pipelined,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum FoldingArg {
    Modulo,
    TypeSplit,
    Omega,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ObjectiveArg {
    Latency,
    Period,
    Processors,
    Buffer,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EncodingArg {
    CaseSplit,
    Indexed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SolverArg {
    Native,
    Smtlib,
}

/// What the exploration driver does with the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ModeArg {
    /// Minimise the objective.
    Optimize,
    /// Minimise the objective, then the processors used with start times pinned.
    Refine,
    /// Latency and total buffer trade-offs.
    Pareto,
    /// One optimisation per processor count, in parallel.
    Sweep,
}

#[derive(Parser, Debug)]
#[command(author = "FlowSched developers", about = "Constraint-based scheduling of SDF applications")]
pub struct ExplorationArgs {
    #[arg(help = "The scheduling problem, as .json, .msgpack or .cbor.")]
    pub problem: Option<PathBuf>,
    #[arg(
        short = 'o',
        long = "output",
        default_value = "run",
        help = "The directory where the schedules are written."
    )]
    pub output_path: PathBuf,
    #[arg(short = 'c', long = "config", help = "A JSON scheduling configuration to start from.")]
    pub config_path: Option<PathBuf>,
    #[arg(long, value_enum)]
    pub regime: Option<RegimeArg>,
    #[arg(long, value_enum)]
    pub folding: Option<FoldingArg>,
    #[arg(long, value_enum)]
    pub objective: Option<ObjectiveArg>,
    #[arg(long = "buffers", value_enum, help = "Encode buffer sizes with this encoding.")]
    pub encoding: Option<EncodingArg>,
    #[arg(long, help = "Use at most this many processors per cluster.", conflicts_with = "free_processors")]
    pub processors: Option<u32>,
    #[arg(long, help = "Let the number of processors per cluster be decided.")]
    pub free_processors: bool,
    #[arg(long)]
    pub no_task_symmetry: bool,
    #[arg(long)]
    pub no_processor_symmetry: bool,
    #[arg(long, help = "Keep mutual exclusion between instances ordered by precedence.")]
    pub no_graph_analysis: bool,
    #[arg(long)]
    pub no_dma_ordering: bool,
    #[arg(long, value_enum, default_value = "optimize")]
    pub mode: ModeArg,
    #[arg(long, value_enum, default_value = "native")]
    pub solver: SolverArg,
    #[arg(long, default_value = "z3", help = "The SMT-LIB2 solver executable.")]
    pub solver_command: String,
    #[arg(long, default_value = "0", help = "Timeout of one query in milliseconds, 0 for none.")]
    pub query_timeout: u64,
    #[arg(long, default_value = "0", help = "Timeout of the whole exploration in milliseconds, 0 for none.")]
    pub total_timeout: u64,
    #[arg(long, default_value = "2", help = "Retries of a query answered unknown.")]
    pub unknown_retries: u32,
    #[arg(long, default_value = "10", help = "Maximum number of solutions kept.")]
    pub max_sols: u64,
    #[arg(short = 'v', action = clap::ArgAction::Count, help = "Raise the log level; repeat for more.")]
    pub verbosity: u8,
    #[arg(
        long = "schemas",
        help = "Prints the schemas of the problems and schedules.",
        default_value = "false"
    )]
    pub print_schema: bool,
}

/// Initialises `env_logger` at `info`, or `debug`/`trace` with `-v`/`-vv`; `RUST_LOG` wins.
pub fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .try_init();
}

pub fn decision_model_schemas() -> Vec<String> {
    decision_models_schemas_gen![SdfSchedulingProblem, SchedulingConfig, Schedule]
}

pub fn read_problem(path: &Path) -> Result<SdfSchedulingProblem, CliError> {
    let problem: SdfSchedulingProblem = load_decision_model(path)
        .ok_or_else(|| CliError::UnreadableProblem(path.to_path_buf()))?;
    debug!(
        "read problem with {} actors and {} clusters from {}",
        problem.graph.num_actors(),
        problem.platform.clusters.len(),
        path.display()
    );
    Ok(problem)
}

impl ExplorationArgs {
    /// The configuration file, if any, with every flag given on the command line applied over it.
    pub fn scheduling_config(&self) -> Result<SchedulingConfig, CliError> {
        let mut config = match &self.config_path {
            Some(p) => std::fs::read_to_string(p)
                .map_err(|e| e.to_string())
                .and_then(|s| serde_json::from_str(&s).map_err(|e| e.to_string()))
                .map_err(|reason| CliError::UnreadableConfig {
                    path: p.clone(),
                    reason,
                })?,
            None => SchedulingConfig::default(),
        };
        if let Some(r) = self.regime {
            config.regime = match r {
                RegimeArg::NonPipelined => Regime::NonPipelined,
                RegimeArg::Pipelined => Regime::Pipelined,
            };
        }
        if let Some(f) = self.folding {
            config.folding = match f {
                FoldingArg::Modulo => PeriodicFolding::Modulo,
                FoldingArg::TypeSplit => PeriodicFolding::TypeSplit,
                FoldingArg::Omega => PeriodicFolding::Omega,
            };
        }
        if let Some(o) = self.objective {
            config.objective = match o {
                ObjectiveArg::Latency => Objective::Latency,
                ObjectiveArg::Period => Objective::Period,
                ObjectiveArg::Processors => Objective::ProcessorCount,
                ObjectiveArg::Buffer => Objective::TotalBuffer,
            };
        }
        if let Some(e) = self.encoding {
            config.buffer_analysis = Some(match e {
                EncodingArg::CaseSplit => BufferEncoding::CaseSplit,
                EncodingArg::Indexed => BufferEncoding::IndexedFunction,
            });
        }
        if let Some(n) = self.processors {
            config.processors = ProcessorBudget::Fixed(n);
        }
        if self.free_processors {
            config.processors = ProcessorBudget::Free;
        }
        config.task_symmetry &= !self.no_task_symmetry;
        config.processor_symmetry &= !self.no_processor_symmetry;
        config.graph_analysis &= !self.no_graph_analysis;
        config.dma_ordering &= !self.no_dma_ordering;
        Ok(config)
    }
}

/// Writes every schedule under `out`, numbered in the given order.
pub fn write_schedules(schedules: &[Schedule], out: &Path) -> Result<Vec<PathBuf>, CliError> {
    let mut written = vec![];
    for (i, s) in schedules.iter().enumerate() {
        let paths = s
            .write_to_dir(out, format!("{:0>4}", i).as_str(), "flowsched")
            .map_err(|e| CliError::Unwritable {
                path: out.to_path_buf(),
                reason: e.to_string(),
            })?;
        written.extend(paths);
    }
    info!("wrote {} schedules to {}", schedules.len(), out.display());
    Ok(written)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_override_the_defaults() {
        let args = ExplorationArgs::parse_from([
            "flowsched",
            "problem.json",
            "--regime",
            "pipelined",
            "--folding",
            "type-split",
            "--buffers",
            "indexed",
            "--processors",
            "3",
            "--no-task-symmetry",
            "-vv",
        ]);
        let config = args.scheduling_config().unwrap();
        assert_eq!(config.regime, Regime::Pipelined);
        assert_eq!(config.folding, PeriodicFolding::TypeSplit);
        assert_eq!(config.buffer_analysis, Some(BufferEncoding::IndexedFunction));
        assert_eq!(config.processors, ProcessorBudget::Fixed(3));
        assert!(!config.task_symmetry);
        assert!(config.processor_symmetry);
        assert_eq!(args.verbosity, 2);
        assert_eq!(args.mode, ModeArg::Optimize);
    }

    #[test]
    fn schemas_cover_inputs_and_outputs() {
        let schemas = decision_model_schemas();
        assert_eq!(schemas.len(), 3);
        assert!(schemas[0].contains("SdfSchedulingProblem"));
    }
}
