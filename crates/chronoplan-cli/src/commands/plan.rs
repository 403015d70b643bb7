use chrono::NaiveDate;
use clap::Args;
use std::path::{Path, PathBuf};

#[derive(Args)]
pub struct PlanArgs {
    /// Declaration file (.toml or .json)
    declaration: PathBuf,
    /// First date to plan from (YYYY-MM-DD, defaults to today)
    #[arg(long)]
    start: Option<NaiveDate>,
    /// Write the plan to this file instead of stdout
    #[arg(long, short)]
    output: Option<PathBuf>,
}

pub fn run(args: PlanArgs, config_path: Option<&Path>) -> Result<(), Box<dyn std::error::Error>> {
    let engine = super::engine(&args.declaration, args.start, config_path)?;
    let plan = engine.derive_plan()?;
    match args.output {
        Some(path) => {
            plan.save(&path)?;
            eprintln!("plan with {} task(s) written to {}", plan.len(), path.display());
        }
        None => super::emit(&plan, None)?,
    }
    Ok(())
}
