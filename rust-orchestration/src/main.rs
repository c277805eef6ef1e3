use clap::Parser;
use flowsched_blueprints::{init_logging, ExplorationArgs};

fn main() -> anyhow::Result<()> {
    let args = ExplorationArgs::parse();
    init_logging(args.verbosity);
    flowsched_orchestration::run(args)?;
    Ok(())
}
